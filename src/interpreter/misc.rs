//! Handlers for literals, locals and args, `Index`, `RefOf`/`DerefOf`,
//! object declarations, and the host-backed synchronization opcodes.

use std::rc::Rc;

use tracing::warn;

use crate::consts::MAX_ALLOC_HINT;
use crate::error::Status;
use crate::host::{AddressSpace, Host};
use crate::interpreter::{Evaluation, Item};
use crate::object::{
    self, bottom_object, unwrap_internal, AmlString, BufferIndex, ByteSource, Method, Mutex, Object,
    OpRegion, PowerResource, Processor, ReferenceKind,
};
use crate::opcode::code;

use super::store::warn_invalid_operand;

impl<'a, H: Host> Evaluation<'a, H> {
    /// Local and Arg terms. First touch lazily wraps the slot in an
    /// internal reference of the matching kind over a fresh Uninitialized.
    pub(crate) fn handle_arg_or_local(&mut self) -> Result<(), Status> {
        let opcode = self.cur_op().code;
        let (slot, kind) = if (code::LOCAL0..=code::LOCAL7).contains(&opcode) {
            ((opcode - code::LOCAL0) as usize, ReferenceKind::Local)
        } else {
            ((opcode - code::ARG0) as usize, ReferenceKind::Arg)
        };

        let frame = self.frame_mut();
        let storage = match kind {
            ReferenceKind::Local => &mut frame.locals[slot],
            _ => &mut frame.args[slot],
        };

        let obj = match storage {
            Some(obj) => obj.clone(),
            None => {
                let fresh = object::internal_reference(kind, object::wrap(Object::Uninitialized));
                *storage = Some(fresh.clone());
                fresh
            }
        };

        *self.last_item_mut() = Item::Object(obj);
        Ok(())
    }

    /// Synthesized named-object term: yields the node's binding (shared).
    pub(crate) fn handle_named_object(&mut self) -> Result<(), Status> {
        let node = self.cur_op().node_at(0)?;
        let obj = node.borrow().object.clone().ok_or(Status::InvalidArgument)?;
        *self.last_item_mut() = Item::Object(obj);
        Ok(())
    }

    /// String literal: NUL-terminated bytes at the cursor.
    pub(crate) fn handle_string(&mut self) -> Result<(), Status> {
        let dst = self.cur_op().last_obj()?;

        let frame = self.frame();
        let tail = &frame.code()[frame.code_offset..];
        let len = tail
            .iter()
            .position(|&b| b == 0)
            .ok_or(Status::BadBytecode)?;
        let bytes = tail[..len].to_vec();

        self.frame_mut().code_offset += len + 1;
        *dst.borrow_mut() = Object::string_from(bytes);
        Ok(())
    }

    /// `Buffer(DeclaredSize) { init-bytes }`: allocate the declared size,
    /// copy the possibly-shorter initializer, zero the tail.
    pub(crate) fn handle_buffer(&mut self) -> Result<(), Status> {
        let op = self.cur_op();
        let (_, pkg_end) = op.pkg_at(0);
        let declared = op.int_at(1)?;
        let init_offset = op.imm(2) as usize;
        let dst = op.obj(3)?;

        if pkg_end > self.frame().method.size {
            return Err(Status::BadBytecode);
        }
        if declared > MAX_ALLOC_HINT {
            warn!("buffer is too large ({declared}), assuming corrupted bytestream");
            return Err(Status::BadBytecode);
        }
        if declared == 0 {
            warn!("attempted to create an empty buffer");
            return Err(Status::BadBytecode);
        }

        let init_len = pkg_end.checked_sub(init_offset).ok_or(Status::BadBytecode)?;
        let declared = declared as usize;
        if init_len > declared {
            warn!("too many buffer initializers: {init_len} (size is {declared})");
            return Err(Status::BadBytecode);
        }

        let mut bytes = vec![0u8; declared];
        bytes[..init_len].copy_from_slice(&self.frame().code()[init_offset..init_offset + init_len]);
        *dst.borrow_mut() = Object::buffer(bytes);
        Ok(())
    }

    /// `Package`/`VarPackage`. Items hold (AML offset, element) pairs for
    /// each supplied initializer; elements that are bare name strings stay
    /// unresolved and are stored as lazily-resolved path strings, matching
    /// the dominant OS.
    pub(crate) fn handle_package(&mut self) -> Result<(), Status> {
        let op = self.cur_op();
        let package_obj = op.last_obj()?;

        let declared = if op.code == code::VAR_PACKAGE {
            let count = op.int_at(1)?;
            if count > MAX_ALLOC_HINT {
                warn!("package is too large ({count}), assuming corrupted bytestream");
                return Err(Status::BadBytecode);
            }
            count as usize
        } else {
            op.imm(1) as usize
        };

        let mut supplied = (op.items.len().saturating_sub(3)) / 2;
        if supplied > declared {
            warn!("too many package initializers: {supplied}, truncating to {declared}");
            supplied = declared;
        }

        let elements: Vec<_> = (0..declared)
            .map(|_| object::wrap(Object::Uninitialized))
            .collect();

        for i in 0..supplied {
            let offset_item = 2 + i * 2;
            let op = self.cur_op();
            let recorded_offset = op.imm(offset_item) as usize;

            // A Named reference is demoted to its path; an unresolved name
            // never produced an object at all.
            let supplied_obj = op.items[offset_item + 1].object().cloned();
            let element = match supplied_obj {
                Some(obj) => {
                    let kind = match &*obj.borrow() {
                        Object::Reference(r) => Some(r.kind),
                        _ => None,
                    };
                    match kind {
                        Some(ReferenceKind::Named) => None,
                        Some(_) => Some(unwrap_internal(&obj)),
                        None => Some(obj),
                    }
                }
                None => None,
            };

            let element = match element {
                Some(obj) => obj,
                None => {
                    let path = self.name_string_path_at(recorded_offset)?;
                    object::wrap(Object::String(Rc::new(std::cell::RefCell::new(
                        AmlString::path(path.into_bytes()),
                    ))))
                }
            };

            object::assign(&elements[i], &element, true);
        }

        *package_obj.borrow_mut() = Object::Package(Rc::new(std::cell::RefCell::new(elements)));
        Ok(())
    }

    /// `Index(source, index, target)`.
    /// Buffers and strings yield a byte cursor sharing the payload.
    /// Package slots are lazily wrapped in a self-reference so every
    /// outstanding index sees later mutations of the slot.
    pub(crate) fn handle_index(&mut self) -> Result<(), Status> {
        let op = self.cur_op();
        let src = op.obj(0)?;
        let index = op.int_at(1)? as usize;

        enum Source {
            Bytes(ByteSource, usize),
            Package(object::PackageRef),
        }

        let source = match &*src.borrow() {
            Object::Buffer(data) => {
                let len = data.borrow().len();
                Source::Bytes(ByteSource::Buffer(data.clone()), len)
            }
            Object::String(text) => {
                let len = text.borrow().bytes.len();
                Source::Bytes(ByteSource::String(text.clone()), len)
            }
            Object::Package(elements) => Source::Package(elements.clone()),
            _ => {
                warn_invalid_operand(op.spec.name, &src, "String/Buffer/Package");
                return Err(Status::BadBytecode);
            }
        };

        let result = match source {
            Source::Bytes(backing, len) => {
                ensure_valid_index(index, len)?;
                object::wrap(Object::BufferIndex(BufferIndex { backing, index }))
            }
            Source::Package(elements) => {
                ensure_valid_index(index, elements.borrow().len())?;

                let element = elements.borrow()[index].clone();
                let is_pkg_index = matches!(
                    &*element.borrow(),
                    Object::Reference(r) if r.kind == ReferenceKind::PkgIndex
                );

                if is_pkg_index {
                    element
                } else {
                    let wrapped = object::internal_reference(ReferenceKind::PkgIndex, element);
                    elements.borrow_mut()[index] = wrapped.clone();
                    wrapped
                }
            }
        };

        self.cur_op_mut().items[3] = Item::Object(result);
        Ok(())
    }

    /// `RefOf`, `CondRefOf` and `DerefOf`.
    pub(crate) fn handle_ref_or_deref_of(&mut self) -> Result<(), Status> {
        let op = self.cur_op();
        let opcode = op.code;
        let src = op.obj(0)?;
        let dst = if opcode == code::COND_REF_OF { op.obj(2)? } else { op.obj(1)? };

        if opcode == code::DEREF_OF {
            let was_reference = matches!(&*src.borrow(), Object::Reference(_));
            // The bottom-most object, not one hop: NT semantics, unlike
            // ACPICA's single dereference.
            let target = if was_reference { bottom_object(&src) } else { src.clone() };

            if let Object::BufferIndex(cursor) = &*target.borrow() {
                *dst.borrow_mut() = Object::Integer(cursor.read() as u64);
                return Ok(());
            }

            if !was_reference {
                warn!(
                    "invalid DerefOf argument: {}, expected a reference",
                    target.borrow().type_of()
                );
                return Err(Status::BadBytecode);
            }

            let copied = target.borrow().clone();
            *dst.borrow_mut() = copied;
            return Ok(());
        }

        *dst.borrow_mut() = Object::Reference(object::Reference {
            kind: ReferenceKind::RefOf,
            inner: src,
        });
        Ok(())
    }

    /// `Timer`: host monotonic time in 100 ns ticks.
    pub(crate) fn handle_timer(&mut self) -> Result<(), Status> {
        let dst = self.cur_op().obj(0)?;
        let ticks = self.host.ticks();
        *dst.borrow_mut() = Object::Integer(ticks);
        Ok(())
    }

    /// `Name(NAME, value)`: bind the evaluated object to a fresh node.
    pub(crate) fn handle_create_named(&mut self) -> Result<(), Status> {
        let op = self.cur_op();
        let node = op.node_at(0)?;
        let src = op.obj(1)?;

        node.borrow_mut().object = Some(object::internal_reference(ReferenceKind::Named, src));
        Ok(())
    }

    /// `Method` declaration: capture the body slice and flags, bind the
    /// method object to a fresh node.
    pub(crate) fn handle_create_method(&mut self) -> Result<(), Status> {
        let op = self.cur_op();
        let (_, pkg_end) = op.pkg_at(0);
        let node = op.node_at(1)?;
        let flags = op.imm(2) as u8;
        let body_offset = op.imm(3) as usize;
        let dst = op.obj(4)?;

        if pkg_end < body_offset || pkg_end > self.frame().method.size {
            return Err(Status::BadBytecode);
        }

        let outer = &self.frame().method;
        let serialized = (flags >> 3) & 1 != 0;
        let method = Method {
            code: outer.code.clone(),
            start: outer.start + body_offset,
            size: pkg_end - body_offset,
            args: flags & 0b111,
            serialized,
            sync_level: flags >> 4,
            named_objects_persist: serialized,
        };

        *dst.borrow_mut() = Object::Method(Rc::new(method));
        node.borrow_mut().object = Some(object::internal_reference(ReferenceKind::Named, dst));
        Ok(())
    }

    /// `Mutex(NAME, flags)`: host-backed mutex with a 0-15 sync level.
    pub(crate) fn handle_create_mutex(&mut self) -> Result<(), Status> {
        let op = self.cur_op();
        let node = op.node_at(0)?;
        let sync_level = (op.imm(1) as u8) & 0b1111;
        let dst = op.obj(2)?;

        let handle = self.host.mutex_create();
        *dst.borrow_mut() = Object::Mutex(Rc::new(std::cell::RefCell::new(Mutex {
            handle,
            sync_level,
            owner: None,
        })));
        node.borrow_mut().object = Some(object::internal_reference(ReferenceKind::Named, dst));
        Ok(())
    }

    /// `OperationRegion(NAME, space, offset, length)`.
    pub(crate) fn handle_create_op_region(&mut self) -> Result<(), Status> {
        let op = self.cur_op();
        let node = op.node_at(0)?;
        let space = AddressSpace::from_raw(op.imm(1) as u8)?;
        let offset = op.int_at(2)?;
        let length = op.int_at(3)?;
        let dst = op.obj(4)?;

        *dst.borrow_mut() = Object::OpRegion(OpRegion { space, offset, length });
        // Regions bind their object directly, without the named wrapper.
        node.borrow_mut().object = Some(dst);
        Ok(())
    }

    /// Region field lists are the region backend's concern; the
    /// declaration only has to parse.
    pub(crate) fn handle_create_field(&mut self) -> Result<(), Status> {
        Ok(())
    }

    /// `Alias(source, NAME)`: the new node shares the source's binding.
    pub(crate) fn handle_create_alias(&mut self) -> Result<(), Status> {
        let op = self.cur_op();
        let src = op.node_at(0)?;
        let dst = op.node_at(1)?;

        let binding = src.borrow().object.clone();
        dst.borrow_mut().object = binding;
        Ok(())
    }

    /// Payload for the named scopes that carry one: `Processor`,
    /// `PowerResource` (and the payload-free `Device`/`ThermalZone`).
    pub(crate) fn create_named_scope(&mut self) -> Result<(), Status> {
        let op = self.cur_op();
        let node = op.node_at(1)?;
        let dst = op.last_obj()?;

        match op.code {
            code::PROCESSOR => {
                *dst.borrow_mut() = Object::Processor(Processor {
                    id: op.imm(2) as u8,
                    block_address: op.imm(3) as u32,
                    block_length: op.imm(4) as u8,
                });
            }
            code::POWER_RES => {
                *dst.borrow_mut() = Object::PowerResource(PowerResource {
                    system_level: op.imm(2) as u8,
                    resource_order: op.imm(3) as u16,
                });
            }
            _ => {}
        }

        node.borrow_mut().object = Some(object::internal_reference(ReferenceKind::Named, dst));
        Ok(())
    }

    /// `Acquire(mutex, timeout)`: evaluates to `0` on success and `Ones`
    /// on timeout.
    pub(crate) fn handle_acquire(&mut self) -> Result<(), Status> {
        let op = self.cur_op();
        let src = op.obj(0)?;
        let timeout = op.imm(1) as u16;
        let dst = op.obj(2)?;

        let mutex = self.expect_mutex(&src)?;
        let handle = mutex.borrow().handle;
        let acquired = self.host.mutex_acquire(handle, timeout);
        if acquired {
            mutex.borrow_mut().owner = Some(0);
        }

        let ones = self.ones();
        *dst.borrow_mut() = Object::Integer(if acquired { 0 } else { ones });
        Ok(())
    }

    /// `Release(mutex)`.
    pub(crate) fn handle_release(&mut self) -> Result<(), Status> {
        let src = self.cur_op().obj(0)?;
        let mutex = self.expect_mutex(&src)?;
        let handle = {
            let mut mutex = mutex.borrow_mut();
            mutex.owner = None;
            mutex.handle
        };
        self.host.mutex_release(handle);
        Ok(())
    }

    /// `Notify(object, value)`: forwarded to the host.
    pub(crate) fn handle_notify(&mut self) -> Result<(), Status> {
        let value = self.cur_op().int_at(1)?;
        self.host.notify(value);
        Ok(())
    }

    fn expect_mutex(&self, obj: &object::ObjectRef) -> Result<Rc<std::cell::RefCell<Mutex>>, Status> {
        let target = unwrap_internal(obj);
        let mutex = match &*target.borrow() {
            Object::Mutex(mutex) => mutex.clone(),
            _ => {
                warn_invalid_operand(self.cur_op().spec.name, &target, "Mutex");
                return Err(Status::BadBytecode);
            }
        };
        Ok(mutex)
    }

    /// Replace the last item, which must already exist.
    pub(crate) fn last_item_mut(&mut self) -> &mut Item {
        self.cur_op_mut()
            .items
            .last_mut()
            .expect("op context has no items")
    }
}

fn ensure_valid_index(index: usize, len: usize) -> Result<(), Status> {
    if index < len {
        Ok(())
    } else {
        warn!("invalid index {index}, object has {len} elements");
        Err(Status::BadBytecode)
    }
}
