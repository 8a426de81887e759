//! [`Interpreter`] implementation

use std::rc::Rc;

use crate::error::{InterpreterError, Status};
use crate::host::Host;
use crate::namespace::{Namespace, NodeRef};
use crate::object::{self, Method, Object, ObjectRef, ReferenceKind};

mod alu;
mod convert;
mod executors;
mod fields;
mod flow;
mod frame;
mod misc;
mod name;
mod store;

pub(crate) use frame::{CallFrame, CodeBlock, CodeBlockKind, Item, OpContext};
pub(crate) use name::parse_package_length;

/// AML evaluator.
///
/// Owns the namespace the loaded tables populate and the host services
/// used while methods run. One evaluation at a time: callers serialize
/// concurrent invocations, and methods flagged serialized are additionally
/// guarded by their host mutex at dispatch (an external contract).
#[derive(Debug)]
pub struct Interpreter<H> {
    namespace: Namespace,
    host: H,
    rev1: bool,
}

impl<H> Interpreter<H> {
    /// Evaluator over a fresh namespace, 64-bit integer arithmetic.
    pub fn new(host: H) -> Self {
        Self::with_revision(host, 2)
    }

    /// Evaluator honoring the loaded table's declared revision: revision 1
    /// tables run with 32-bit integer arithmetic.
    pub fn with_revision(host: H, revision: u8) -> Self {
        Self {
            namespace: Namespace::new(),
            host,
            rev1: revision < 2,
        }
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn namespace_mut(&mut self) -> &mut Namespace {
        &mut self.namespace
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }
}

impl<H> Interpreter<H>
where
    H: Host,
{
    /// Execute `method` with `scope` as the base lookup scope.
    ///
    /// `args.len()` must equal the method's declared argument count.
    /// Returns the method's return object, if it produced one.
    pub fn evaluate(
        &mut self,
        scope: &NodeRef,
        method: &Rc<Method>,
        args: &[ObjectRef],
    ) -> Result<Option<ObjectRef>, InterpreterError> {
        if args.len() != method.args as usize {
            return Err(Status::InvalidArgument.into());
        }

        let mut evaluation = Evaluation {
            ns: &mut self.namespace,
            host: &mut self.host,
            rev1: self.rev1,
            call_stack: Vec::new(),
            ret: object::wrap(Object::Uninitialized),
            skip_else: false,
        };

        let mut frame = CallFrame::new(method.clone(), scope.clone());
        for (slot, arg) in frame.args.iter_mut().zip(args) {
            *slot = Some(object::internal_reference(ReferenceKind::Arg, arg.clone()));
        }
        evaluation.call_stack.push(frame);

        let outcome = evaluation.run();
        evaluation.release();

        let ret = evaluation.ret;
        outcome?;
        if matches!(&*ret.borrow(), Object::Uninitialized) {
            Ok(None)
        } else {
            Ok(Some(ret))
        }
    }

    /// Convenience wrapper: run a whole table blob (or a bare method body)
    /// against the namespace root, with named objects persisting.
    pub fn load(&mut self, aml: &[u8]) -> Result<Option<ObjectRef>, InterpreterError> {
        let method = Rc::new(Method::new(aml.to_vec(), 0).persistent(true));
        let root = self.namespace.root();
        self.evaluate(&root, &method, &[])
    }
}

/// Per-invocation execution state: the frame stack plus the result slot.
/// The engine's main loop and the opcode handlers are implemented as
/// `impl` blocks on this type, one file per concern.
pub(crate) struct Evaluation<'a, H> {
    pub(crate) ns: &'a mut Namespace,
    pub(crate) host: &'a mut H,
    pub(crate) rev1: bool,
    pub(crate) call_stack: Vec<CallFrame>,
    pub(crate) ret: ObjectRef,
    pub(crate) skip_else: bool,
}

impl<'a, H> Evaluation<'a, H> {
    /// Integer width in bytes under the active table revision.
    pub(crate) fn sizeof_int(&self) -> usize {
        if self.rev1 {
            4
        } else {
            8
        }
    }

    /// The all-ones constant at the active integer width.
    pub(crate) fn ones(&self) -> u64 {
        if self.rev1 {
            0xFFFF_FFFF
        } else {
            u64::MAX
        }
    }

    pub(crate) fn truncate_if_needed(&self, value: u64) -> u64 {
        if self.rev1 {
            value & 0xFFFF_FFFF
        } else {
            value
        }
    }

    pub(crate) fn frame(&self) -> &CallFrame {
        self.call_stack.last().expect("no active call frame")
    }

    pub(crate) fn frame_mut(&mut self) -> &mut CallFrame {
        self.call_stack.last_mut().expect("no active call frame")
    }

    /// The op context currently driving the parse program.
    pub(crate) fn cur_op(&self) -> &OpContext {
        self.frame().pending_ops.last().expect("no op context")
    }

    pub(crate) fn cur_op_mut(&mut self) -> &mut OpContext {
        self.frame_mut().pending_ops.last_mut().expect("no op context")
    }

    /// Tear the whole invocation down: every pending op is drained, every
    /// temporary node uninstalled, every frame dropped.
    pub(crate) fn release(&mut self) {
        while let Some(mut frame) = self.call_stack.pop() {
            frame.pending_ops.clear();
            for node in frame.temp_nodes.drain(..) {
                self.ns.uninstall(&node);
            }
        }
    }
}
