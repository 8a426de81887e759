//! Dynamic object model: variant-tagged values with refcounted sharing for
//! heap-heavy payloads.
//!
//! Objects are handed around as [`ObjectRef`] (`Rc<RefCell<Object>>`).
//! Buffer bytes, string text, package element lists and mutex state are
//! separately refcounted so that views (buffer fields, buffer indices,
//! aliases) can share a payload without sharing the owning object.

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::Status;
use crate::host::{AddressSpace, MutexHandle};

pub type ObjectRef = Rc<RefCell<Object>>;
pub type BufferRef = Rc<RefCell<Vec<u8>>>;
pub type StringRef = Rc<RefCell<AmlString>>;
pub type PackageRef = Rc<RefCell<Vec<ObjectRef>>>;

/// Object type tags, numbered the way the `ObjectType` operator reports
/// them. `BufferIndex` and `Reference` are internal and never surface
/// through `ObjectType` directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[repr(u8)]
pub enum ObjectType {
    Uninitialized = 0,
    Integer = 1,
    String = 2,
    Buffer = 3,
    Package = 4,
    FieldUnit = 5,
    Device = 6,
    Event = 7,
    Method = 8,
    Mutex = 9,
    OperationRegion = 10,
    PowerResource = 11,
    Processor = 12,
    ThermalZone = 13,
    BufferField = 14,
    DebugObject = 16,
    BufferIndex = 17,
    Reference = 18,
}

/// Binding site a reference was created at. The kind decides the store and
/// copy semantics applied when the reference is used as a destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceKind {
    /// Produced by the `RefOf`/`CondRefOf`/`Index` operators.
    RefOf,
    /// Wraps a method argument slot.
    Arg,
    /// Wraps a method local slot.
    Local,
    /// Wraps the object bound to a namespace node.
    Named,
    /// Wraps a package element in place so every outstanding `Index` result
    /// observes later mutations of the slot.
    PkgIndex,
}

#[derive(Debug, Clone)]
pub struct Reference {
    pub kind: ReferenceKind,
    pub inner: ObjectRef,
}

/// Whether a string payload is ordinary text or an unresolved namespace
/// path stashed by a package initializer for lazy resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringKind {
    Text,
    Path,
}

/// String payload. Bytes exclude the terminating NUL; operators that the
/// encoding defines in terms of NUL-inclusive sizes compensate at the edge.
#[derive(Debug, Clone)]
pub struct AmlString {
    pub bytes: Vec<u8>,
    pub kind: StringKind,
}

impl AmlString {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes, kind: StringKind::Text }
    }

    pub fn path(bytes: Vec<u8>) -> Self {
        Self { bytes, kind: StringKind::Path }
    }

    /// Lossy text rendering for diagnostics.
    pub fn display(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

impl From<&str> for AmlString {
    fn from(text: &str) -> Self {
        Self::new(text.as_bytes().to_vec())
    }
}

/// Bit window into a shared buffer, created by the `CreateField` family.
#[derive(Debug, Clone)]
pub struct BufferField {
    pub backing: BufferRef,
    pub bit_index: u64,
    pub bit_length: u64,
    /// Reads always produce a Buffer regardless of width (set by the
    /// general `CreateField` form).
    pub force_buffer: bool,
}

impl BufferField {
    /// Bytes needed to hold the field's bits.
    pub fn byte_size(&self) -> usize {
        ((self.bit_length + 7) / 8) as usize
    }
}

/// Byte storage a [`BufferIndex`] can point into: buffer data or string
/// text.
#[derive(Debug, Clone)]
pub enum ByteSource {
    Buffer(BufferRef),
    String(StringRef),
}

/// Single-byte cursor into a shared payload, produced by `Index` over a
/// buffer or string.
#[derive(Debug, Clone)]
pub struct BufferIndex {
    pub backing: ByteSource,
    pub index: usize,
}

impl BufferIndex {
    pub fn read(&self) -> u8 {
        match &self.backing {
            ByteSource::Buffer(data) => data.borrow()[self.index],
            ByteSource::String(text) => text.borrow().bytes[self.index],
        }
    }

    pub fn write(&self, value: u8) {
        match &self.backing {
            ByteSource::Buffer(data) => data.borrow_mut()[self.index] = value,
            ByteSource::String(text) => text.borrow_mut().bytes[self.index] = value,
        }
    }
}

/// Externally-backed address window; field access is delegated to the host.
#[derive(Debug, Clone)]
pub struct OpRegion {
    pub space: AddressSpace,
    pub offset: u64,
    pub length: u64,
}

/// Callable AML code blob. `code` is the whole table the method was defined
/// in; `start..start + size` delimits the body.
#[derive(Debug, Clone)]
pub struct Method {
    pub code: Rc<[u8]>,
    pub start: usize,
    pub size: usize,
    pub args: u8,
    pub serialized: bool,
    pub sync_level: u8,
    /// Nodes created while this method runs stay installed after it
    /// returns. Set for table loads and serialized methods.
    pub named_objects_persist: bool,
}

impl Method {
    pub fn new(code: impl Into<Rc<[u8]>>, args: u8) -> Self {
        let code = code.into();
        let size = code.len();
        Self {
            code,
            start: 0,
            size,
            args,
            serialized: false,
            sync_level: 0,
            named_objects_persist: false,
        }
    }

    /// Mark named objects created by this method as permanent, the way a
    /// table load or a serialized method does.
    pub fn persistent(mut self, persist: bool) -> Self {
        self.named_objects_persist = persist;
        self
    }

    pub fn body(&self) -> &[u8] {
        &self.code[self.start..self.start + self.size]
    }
}

#[derive(Debug, Clone)]
pub struct Mutex {
    pub handle: MutexHandle,
    pub sync_level: u8,
    pub owner: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct Processor {
    pub id: u8,
    pub block_address: u32,
    pub block_length: u8,
}

#[derive(Debug, Clone)]
pub struct PowerResource {
    pub system_level: u8,
    pub resource_order: u16,
}

/// An ACPI value. Heap-heavy variants share refcounted payloads; see the
/// module docs for the ownership rules.
#[derive(Debug, Clone, Default)]
pub enum Object {
    #[default]
    Uninitialized,
    Integer(u64),
    String(StringRef),
    Buffer(BufferRef),
    Package(PackageRef),
    Reference(Reference),
    BufferField(BufferField),
    BufferIndex(BufferIndex),
    OpRegion(OpRegion),
    Method(Rc<Method>),
    Mutex(Rc<RefCell<Mutex>>),
    Processor(Processor),
    PowerResource(PowerResource),
    ThermalZone,
    Device,
    Debug,
}

impl Object {
    pub fn type_of(&self) -> ObjectType {
        match self {
            Self::Uninitialized => ObjectType::Uninitialized,
            Self::Integer(_) => ObjectType::Integer,
            Self::String(_) => ObjectType::String,
            Self::Buffer(_) => ObjectType::Buffer,
            Self::Package(_) => ObjectType::Package,
            Self::Reference(_) => ObjectType::Reference,
            Self::BufferField(_) => ObjectType::BufferField,
            Self::BufferIndex(_) => ObjectType::BufferIndex,
            Self::OpRegion(_) => ObjectType::OperationRegion,
            Self::Method(_) => ObjectType::Method,
            Self::Mutex(_) => ObjectType::Mutex,
            Self::Processor(_) => ObjectType::Processor,
            Self::PowerResource(_) => ObjectType::PowerResource,
            Self::ThermalZone => ObjectType::ThermalZone,
            Self::Device => ObjectType::Device,
            Self::Debug => ObjectType::DebugObject,
        }
    }

    /// Fresh object of the given type with an empty payload.
    pub fn alloc(ty: ObjectType) -> Object {
        match ty {
            ObjectType::Uninitialized => Object::Uninitialized,
            ObjectType::Integer => Object::Integer(0),
            ObjectType::String => Object::String(Rc::new(RefCell::new(AmlString::new(Vec::new())))),
            ObjectType::Buffer => Object::Buffer(Rc::new(RefCell::new(Vec::new()))),
            ObjectType::Package => Object::Package(Rc::new(RefCell::new(Vec::new()))),
            ObjectType::BufferField => Object::BufferField(BufferField {
                backing: Rc::new(RefCell::new(Vec::new())),
                bit_index: 0,
                bit_length: 0,
                force_buffer: false,
            }),
            ObjectType::OperationRegion => Object::OpRegion(OpRegion {
                space: AddressSpace::SystemMemory,
                offset: 0,
                length: 0,
            }),
            ObjectType::Method => Object::Method(Rc::new(Method::new(Vec::new(), 0))),
            ObjectType::Mutex => Object::Mutex(Rc::new(RefCell::new(Mutex {
                handle: 0,
                sync_level: 0,
                owner: None,
            }))),
            ObjectType::Processor => Object::Processor(Processor {
                id: 0,
                block_address: 0,
                block_length: 0,
            }),
            ObjectType::PowerResource => Object::PowerResource(PowerResource {
                system_level: 0,
                resource_order: 0,
            }),
            ObjectType::ThermalZone => Object::ThermalZone,
            ObjectType::Device => Object::Device,
            ObjectType::DebugObject => Object::Debug,
            // No payload to pre-allocate for the remaining internal tags.
            ObjectType::BufferIndex | ObjectType::Reference | ObjectType::FieldUnit | ObjectType::Event => {
                Object::Uninitialized
            }
        }
    }

    pub fn integer(value: u64) -> Object {
        Object::Integer(value)
    }

    pub fn string(text: &str) -> Object {
        Object::String(Rc::new(RefCell::new(AmlString::from(text))))
    }

    pub fn string_from(bytes: Vec<u8>) -> Object {
        Object::String(Rc::new(RefCell::new(AmlString::new(bytes))))
    }

    pub fn buffer(bytes: Vec<u8>) -> Object {
        Object::Buffer(Rc::new(RefCell::new(bytes)))
    }

    pub fn as_integer(&self) -> Result<u64, Status> {
        match self {
            Self::Integer(value) => Ok(*value),
            _ => Err(Status::BadBytecode),
        }
    }

    /// Payload-duplicating copy. Strings, buffers and packages get fresh
    /// allocations (packages recursively); references and buffer views keep
    /// sharing their target, methods and mutexes share by design.
    pub fn deep_copy(&self) -> Object {
        match self {
            Self::String(text) => {
                Object::String(Rc::new(RefCell::new(text.borrow().clone())))
            }
            Self::Buffer(bytes) => Object::Buffer(Rc::new(RefCell::new(bytes.borrow().clone()))),
            Self::Package(elements) => {
                let copied = elements
                    .borrow()
                    .iter()
                    .map(|element| Rc::new(RefCell::new(element.borrow().deep_copy())))
                    .collect();
                Object::Package(Rc::new(RefCell::new(copied)))
            }
            other => other.clone(),
        }
    }
}

/// Wrap an object in a shareable handle.
pub fn wrap(object: Object) -> ObjectRef {
    Rc::new(RefCell::new(object))
}

/// Fresh reference object of the given kind over `inner`.
pub fn internal_reference(kind: ReferenceKind, inner: ObjectRef) -> ObjectRef {
    wrap(Object::Reference(Reference { kind, inner }))
}

/// Copy `src`'s value over `dst` in place, so every holder of `dst`
/// observes the new value.
pub fn assign(dst: &ObjectRef, src: &ObjectRef, deep: bool) {
    if Rc::ptr_eq(dst, src) {
        return;
    }
    let new = if deep { src.borrow().deep_copy() } else { src.borrow().clone() };
    *dst.borrow_mut() = new;
}

/// Unwrap chains of Arg/Local/Named references down to the wrapped value.
/// `RefOf` and `PkgIndex` references are values in their own right and stop
/// the walk.
pub fn unwrap_internal(obj: &ObjectRef) -> ObjectRef {
    let mut current = obj.clone();
    loop {
        let inner = match &*current.borrow() {
            Object::Reference(r)
                if matches!(
                    r.kind,
                    ReferenceKind::Arg | ReferenceKind::Local | ReferenceKind::Named
                ) =>
            {
                r.inner.clone()
            }
            _ => return current.clone(),
        };
        current = inner;
    }
}

/// Walk a reference chain and return the deepest reference object (the one
/// whose inner is not itself a reference). `obj` must be a reference.
pub fn bottom_reference(obj: &ObjectRef) -> ObjectRef {
    let mut current = obj.clone();
    loop {
        let inner = match &*current.borrow() {
            Object::Reference(r) => r.inner.clone(),
            _ => return current.clone(),
        };
        let inner_is_ref = matches!(&*inner.borrow(), Object::Reference(_));
        if !inner_is_ref {
            return current.clone();
        }
        current = inner;
    }
}

/// The bottom-most non-reference object of a chain.
pub fn bottom_object(obj: &ObjectRef) -> ObjectRef {
    let parent = bottom_reference(obj);
    let inner = match &*parent.borrow() {
        Object::Reference(r) => r.inner.clone(),
        _ => return parent.clone(),
    };
    inner
}

/// Implicit dereference applied when a reference is the destination of an
/// operator such as `Increment`:
/// `RefOf` follows to the bottom-most referenced object; Arg/Local follow
/// only when the slot itself holds a reference; Named yields the bound
/// object.
pub fn implicit_deref(obj: &ObjectRef) -> ObjectRef {
    let (kind, inner) = match &*obj.borrow() {
        Object::Reference(r) => (r.kind, r.inner.clone()),
        _ => return obj.clone(),
    };

    if kind != ReferenceKind::RefOf {
        let inner_is_ref = matches!(&*inner.borrow(), Object::Reference(_));
        if kind == ReferenceKind::Named || !inner_is_ref {
            return inner;
        }
        return bottom_object(&inner);
    }

    bottom_object(obj)
}

/// Swap the target of a reference object. Holders of the reference observe
/// the new child; holders of the old child keep the old value.
pub fn replace_child(parent: &ObjectRef, new_child: ObjectRef) -> Result<(), Status> {
    match &mut *parent.borrow_mut() {
        Object::Reference(r) => {
            r.inner = new_child;
            Ok(())
        }
        _ => Err(Status::InvalidArgument),
    }
}

/// Break the package → element edges so that packages reachable from their
/// own elements through `PkgIndex` references can be reclaimed.
pub fn package_clear(package: &PackageRef) {
    package.borrow_mut().clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deep_copy_decouples_buffers() {
        let src = wrap(Object::buffer(vec![1, 2, 3]));
        let dst = wrap(Object::Uninitialized);
        assign(&dst, &src, true);

        if let Object::Buffer(bytes) = &*src.borrow() {
            bytes.borrow_mut()[0] = 0xFF;
        }
        match &*dst.borrow() {
            Object::Buffer(bytes) => assert_eq!(*bytes.borrow(), vec![1, 2, 3]),
            other => panic!("expected buffer, got {}", other.type_of()),
        };
    }

    #[test]
    fn shallow_copy_shares_payload() {
        let src = wrap(Object::buffer(vec![1, 2, 3]));
        let dst = wrap(Object::Uninitialized);
        assign(&dst, &src, false);

        if let Object::Buffer(bytes) = &*src.borrow() {
            bytes.borrow_mut()[0] = 0xFF;
        }
        match &*dst.borrow() {
            Object::Buffer(bytes) => assert_eq!(bytes.borrow()[0], 0xFF),
            other => panic!("expected buffer, got {}", other.type_of()),
        };
    }

    #[test]
    fn unwrap_stops_at_refof() {
        let value = wrap(Object::Integer(7));
        let explicit = internal_reference(ReferenceKind::RefOf, value);
        let local = internal_reference(ReferenceKind::Local, explicit.clone());

        let unwrapped = unwrap_internal(&local);
        assert!(Rc::ptr_eq(&unwrapped, &explicit));
    }

    #[test]
    fn bottom_object_unwinds_whole_chain() {
        let value = wrap(Object::Integer(42));
        let one = internal_reference(ReferenceKind::RefOf, value.clone());
        let two = internal_reference(ReferenceKind::RefOf, one);

        assert!(Rc::ptr_eq(&bottom_object(&two), &value));
    }

    #[test]
    fn replace_child_is_visible_through_aliases() {
        let value = wrap(Object::Integer(1));
        let reference = internal_reference(ReferenceKind::Local, value);
        let alias = reference.clone();

        replace_child(&reference, wrap(Object::Integer(2))).unwrap();

        let seen = implicit_deref(&alias);
        assert_eq!(seen.borrow().as_integer().unwrap(), 2);
    }
}
