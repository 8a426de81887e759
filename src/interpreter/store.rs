//! Assignment machinery: raw storage views, implicit conversion, and the
//! reference-kind-specific semantics of `Store` and `CopyObject`.

use tracing::{info, warn};

use crate::error::Status;
use crate::host::Host;
use crate::interpreter::Evaluation;
use crate::object::{
    self, bottom_reference, unwrap_internal, Object, ObjectRef, ReferenceKind,
};

use super::fields;

impl<'a, H: Host> Evaluation<'a, H> {
    /// Copy of the bytes backing a computational object. Integers render at
    /// the revision's width, strings without their terminator unless
    /// `include_null` asks for it.
    pub(crate) fn read_storage(&self, obj: &ObjectRef, include_null: bool) -> Result<Vec<u8>, Status> {
        match &*obj.borrow() {
            Object::Integer(value) => Ok(value.to_le_bytes()[..self.sizeof_int()].to_vec()),
            Object::String(text) => {
                let mut bytes = text.borrow().bytes.clone();
                if include_null {
                    bytes.push(0);
                }
                Ok(bytes)
            }
            Object::Buffer(data) => Ok(data.borrow().clone()),
            Object::Reference(_) => Err(Status::InvalidArgument),
            _ => Err(Status::BadBytecode),
        }
    }

    /// The implicit cast applied by stores: copy `src`'s bytes over `dst`'s
    /// existing storage, truncating or zero-filling to `dst`'s size. In
    /// spite of the name no type conversion happens; this is a byte copy,
    /// which is what the dominant OS driver does.
    pub(crate) fn assign_with_implicit_cast(&mut self, dst: &ObjectRef, src: &ObjectRef) -> Result<(), Status> {
        let src_bytes = self.read_storage(src, false)?;

        let mut dst_obj = dst.borrow_mut();
        match &mut *dst_obj {
            Object::Integer(value) => {
                let width = self.sizeof_int().min(src_bytes.len());
                let mut raw = [0u8; 8];
                raw[..width].copy_from_slice(&src_bytes[..width]);
                *value = u64::from_le_bytes(raw);
            }
            Object::String(text) => {
                let mut text = text.borrow_mut();
                for (i, slot) in text.bytes.iter_mut().enumerate() {
                    *slot = src_bytes.get(i).copied().unwrap_or(0);
                }
            }
            Object::Buffer(data) => {
                let mut data = data.borrow_mut();
                for (i, slot) in data.iter_mut().enumerate() {
                    *slot = src_bytes.get(i).copied().unwrap_or(0);
                }
            }
            Object::BufferField(field) => {
                fields::write_buffer_field(field, &src_bytes);
            }
            Object::BufferIndex(index) => {
                index.write(src_bytes.first().copied().unwrap_or(0));
            }
            _ => return Err(Status::BadBytecode),
        }

        Ok(())
    }

    /// `Store(…, dst)` when `dst` is a reference:
    /// Local and package slots overwrite, unless the slot holds a reference
    /// in which case the referenced object is stored to with implicit
    /// conversion. Args overwrite the referenced object outright. Named
    /// destinations always store with implicit conversion.
    pub(crate) fn store_to_reference(&mut self, dst: &ObjectRef, src: &ObjectRef) -> Result<(), Status> {
        let kind = match &*dst.borrow() {
            Object::Reference(r) => r.kind,
            _ => return Err(Status::InvalidArgument),
        };

        let mut overwrite = false;
        let target = match kind {
            ReferenceKind::Local | ReferenceKind::Arg | ReferenceKind::PkgIndex => {
                let referenced = if kind == ReferenceKind::PkgIndex {
                    match &*dst.borrow() {
                        Object::Reference(r) => r.inner.clone(),
                        _ => unreachable!("checked above"),
                    }
                } else {
                    unwrap_internal(dst)
                };

                if matches!(&*referenced.borrow(), Object::Reference(_)) {
                    overwrite = kind == ReferenceKind::Arg;
                    bottom_reference(&referenced)
                } else {
                    overwrite = true;
                    dst.clone()
                }
            }
            ReferenceKind::Named => bottom_reference(dst),
            ReferenceKind::RefOf => return Err(Status::InvalidArgument),
        };

        let src_obj = unwrap_internal(src);
        let target_inner = match &*target.borrow() {
            Object::Reference(r) => r.inner.clone(),
            _ => return Err(Status::InvalidArgument),
        };
        overwrite |= matches!(&*target_inner.borrow(), Object::Uninitialized);

        if overwrite {
            // A stored reference keeps its identity so every holder keeps
            // observing the same binding; values are copied.
            let fresh = if matches!(&*src_obj.borrow(), Object::Reference(_)) {
                src_obj
            } else {
                object::wrap(src_obj.borrow().deep_copy())
            };
            return object::replace_child(&target, fresh);
        }

        self.assign_with_implicit_cast(&target_inner, &src_obj)
    }

    /// `CopyObject(…, dst)`: overwrite the destination slot. A local or
    /// arg that itself holds a reference is followed to the bottom first,
    /// so copies land in the referenced object (this is how package slots
    /// reached through `Index` get replaced). No implicit conversion ever.
    pub(crate) fn copy_object_to_reference(&mut self, dst: &ObjectRef, src: &ObjectRef) -> Result<(), Status> {
        let kind = match &*dst.borrow() {
            Object::Reference(r) => r.kind,
            _ => return Err(Status::InvalidArgument),
        };

        let target = match kind {
            ReferenceKind::Arg | ReferenceKind::Local => {
                let referenced = unwrap_internal(dst);
                if matches!(&*referenced.borrow(), Object::Reference(_)) {
                    bottom_reference(&referenced)
                } else {
                    dst.clone()
                }
            }
            ReferenceKind::PkgIndex | ReferenceKind::Named => dst.clone(),
            ReferenceKind::RefOf => return Err(Status::InvalidArgument),
        };

        let src_obj = unwrap_internal(src);
        let fresh = object::wrap(src_obj.borrow().deep_copy());
        object::replace_child(&target, fresh)
    }

    /// Store into a Target operand. An Integer `0` destination is the null
    /// target and swallows the store.
    pub(crate) fn store_to_target(&mut self, dst: &ObjectRef, src: &ObjectRef) -> Result<(), Status> {
        enum Route {
            Debug,
            Reference,
            BufferIndex,
            NullTarget,
            Bad,
        }

        let route = match &*dst.borrow() {
            Object::Debug => Route::Debug,
            Object::Reference(_) => Route::Reference,
            Object::BufferIndex(_) => Route::BufferIndex,
            Object::Integer(0) => Route::NullTarget,
            _ => Route::Bad,
        };

        match route {
            Route::Debug => {
                drop_debug(self, src);
                Ok(())
            }
            Route::Reference => self.store_to_reference(dst, src),
            Route::BufferIndex => self.assign_with_implicit_cast(dst, &unwrap_internal(src)),
            Route::NullTarget => Ok(()),
            Route::Bad => Err(Status::BadBytecode),
        }
    }
}

/// Render `src` to the log, the observable effect of a Debug store.
fn drop_debug<H: Host>(ev: &Evaluation<'_, H>, src: &ObjectRef) {
    let src = unwrap_internal(src);
    debug_line(ev, "[AML debug]", &src);

    let elements = match &*src.borrow() {
        Object::Package(elements) => Some(elements.clone()),
        _ => None,
    };
    if let Some(elements) = elements {
        for element in elements.borrow().iter() {
            let shown = match &*element.borrow() {
                Object::Reference(r) if r.kind == ReferenceKind::PkgIndex => r.inner.clone(),
                _ => element.clone(),
            };
            debug_line(ev, "  element:", &shown);
        }
    }
}

fn debug_line<H: Host>(ev: &Evaluation<'_, H>, prefix: &str, obj: &ObjectRef) {
    match &*obj.borrow() {
        Object::Uninitialized => info!("{prefix} Uninitialized"),
        Object::Integer(value) => {
            if ev.rev1 {
                info!("{prefix} Integer => 0x{value:08X}");
            } else {
                info!("{prefix} Integer => 0x{value:016X}");
            }
        }
        Object::String(text) => info!("{prefix} String => \"{}\"", text.borrow().display()),
        Object::Buffer(data) => info!("{prefix} Buffer ({} bytes)", data.borrow().len()),
        Object::Package(elements) => info!("{prefix} Package ({} elements)", elements.borrow().len()),
        Object::Reference(r) => info!("{prefix} Reference ({:?})", r.kind),
        Object::OpRegion(region) => info!(
            "{prefix} OperationRegion ({:?}) 0x{:016X}..0x{:016X}",
            region.space,
            region.offset,
            region.offset + region.length
        ),
        Object::BufferIndex(index) => {
            info!("{prefix} BufferIndex [{}] => 0x{:02X}", index.index, index.read())
        }
        Object::Mutex(mutex) => {
            let mutex = mutex.borrow();
            info!("{prefix} Mutex sync level {} (owner {:?})", mutex.sync_level, mutex.owner)
        }
        Object::Processor(cpu) => info!(
            "{prefix} Processor[{}] 0x{:08X} ({})",
            cpu.id, cpu.block_address, cpu.block_length
        ),
        Object::PowerResource(power) => info!(
            "{prefix} PowerResource {} {}",
            power.system_level, power.resource_order
        ),
        other => info!("{prefix} {}", other.type_of()),
    }
}

/// Log helper for operators that tolerate malformed input with a fallback.
pub(crate) fn warn_invalid_operand(op_name: &str, found: &ObjectRef, expected: &str) {
    warn!(
        "invalid argument for {}: {}, expected {}",
        op_name,
        found.borrow().type_of(),
        expected
    );
}
