//! `aml-vm` is an AML (ACPI Machine Language) bytecode evaluator: the
//! execution engine that parses AML from firmware-supplied tables and
//! evaluates it against a hierarchical namespace of objects.
//!
//! The crate implements the AML dialect accepted by mainstream desktop
//! operating systems. Where the formal ACPI specification and observed OS
//! behavior disagree, the OS behavior wins; divergences are noted on the
//! relevant operators.
//!
//! Table loading, operation-region backends and the predefined-namespace
//! bootstrap are the embedder's job. The embedder supplies a [`host::Host`]
//! for the few OS services the evaluator needs (monotonic ticks, mutexes,
//! operation-region access, notify) and drives methods through
//! [`interpreter::Interpreter::evaluate`].

pub mod consts;
pub mod error;
pub mod host;
pub mod interpreter;
pub mod namespace;
pub mod object;
pub mod opcode;
pub mod util;

pub mod prelude {
    pub use crate::error::{InterpreterError, Status};
    pub use crate::host::{Host, NullHost};
    pub use crate::interpreter::Interpreter;
    pub use crate::namespace::{NameSeg, Namespace, NodeRef};
    pub use crate::object::{Method, Object, ObjectRef, ObjectType, ReferenceKind};
    pub use crate::util::Asm;
}
