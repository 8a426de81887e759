//! Control flow: code blocks, `Break`/`Continue`, `Return` and method
//! call dispatch.

use tracing::warn;

use crate::error::Status;
use crate::host::Host;
use crate::interpreter::{CallFrame, CodeBlock, CodeBlockKind, Evaluation};
use crate::namespace::Namespace;
use crate::object::{self, Object, ObjectRef, ReferenceKind};
use crate::opcode::code;

impl<'a, H: Host> Evaluation<'a, H> {
    /// `If`/`While`/`Else` and the scope-opening declarations. Decides
    /// whether the block runs, then either opens it or skips to its end.
    pub(crate) fn handle_code_block(&mut self) -> Result<(), Status> {
        let opcode = self.cur_op().code;
        let (_, pkg_end) = self.cur_op().pkg_at(0);

        let skip_block = match opcode {
            code::ELSE => self.skip_else,
            code::PROCESSOR | code::POWER_RES | code::THERMAL_ZONE | code::DEVICE => {
                self.create_named_scope()?;
                false
            }
            code::SCOPE => false,
            code::IF | code::WHILE => self.cur_op().int_at(1)? == 0,
            _ => return Err(Status::InvalidArgument),
        };

        if skip_block {
            self.frame_mut().code_offset = pkg_end;
            return Ok(());
        }

        self.begin_block_execution()
    }

    /// Open the current op's block: push it on the frame and update the
    /// lookup scope for scope-like blocks.
    fn begin_block_execution(&mut self) -> Result<(), Status> {
        let op = self.cur_op();
        let (pkg_begin, pkg_end) = op.pkg_at(0);

        let (kind, node) = match op.code {
            code::IF => (CodeBlockKind::If, None),
            code::ELSE => (CodeBlockKind::Else, None),
            code::WHILE => (CodeBlockKind::While, None),
            code::SCOPE | code::DEVICE | code::PROCESSOR | code::POWER_RES | code::THERMAL_ZONE => {
                (CodeBlockKind::Scope, Some(op.node_at(1)?))
            }
            _ => return Err(Status::InvalidArgument),
        };

        let frame = self.frame_mut();
        frame.code_blocks.push(CodeBlock {
            kind,
            // One byte back so a `While` re-evaluates the predicate from
            // the opcode itself on re-entry.
            begin: pkg_begin.saturating_sub(1),
            end: pkg_end,
            node,
        });

        self.update_scope();
        Ok(())
    }

    /// Recompute the frame's lookup scope from its innermost scope block.
    pub(crate) fn update_scope(&mut self) {
        let scope = self
            .frame()
            .last_scope()
            .unwrap_or_else(|| self.ns.root());
        self.frame_mut().cur_scope = scope;
    }

    /// Pop the innermost block and refresh derived state.
    pub(crate) fn pop_block(&mut self) {
        let popped = self.frame_mut().code_blocks.pop();
        if popped.map(|b| b.kind) == Some(CodeBlockKind::Scope) {
            self.update_scope();
        }
    }

    /// If the code offset reached the current block's end, close it:
    /// `While` rewinds to its begin, `If` arms the `skip_else` flag.
    /// Returns whether a block was closed.
    pub(crate) fn maybe_end_block(&mut self) -> bool {
        let (kind, begin) = {
            let frame = self.frame();
            match frame.code_blocks.last() {
                Some(block) if frame.code_offset == block.end => (block.kind, block.begin),
                _ => return false,
            }
        };

        self.skip_else = false;
        match kind {
            CodeBlockKind::While => self.frame_mut().code_offset = begin,
            CodeBlockKind::If => self.skip_else = true,
            _ => {}
        }

        self.pop_block();
        true
    }

    /// `Break`/`Continue`: unwind the block stack to the nearest `While`,
    /// then jump to its end or begin.
    pub(crate) fn handle_control_flow(&mut self) -> Result<(), Status> {
        let opcode = self.cur_op().code;

        let Some(last_while) = self.frame().last_while() else {
            warn!("{} outside of a While block", self.cur_op().spec.name);
            return Err(Status::BadBytecode);
        };

        while self.frame().code_blocks.len() - 1 > last_while {
            self.pop_block();
        }

        let block = &self.frame().code_blocks[last_while];
        let target = if opcode == code::BREAK { block.end } else { block.begin };
        self.frame_mut().code_offset = target;
        self.pop_block();
        Ok(())
    }

    /// `Return`: jump the frame to its end and deep-copy the value into
    /// whoever is waiting for it.
    pub(crate) fn handle_return(&mut self) -> Result<(), Status> {
        let value = self.cur_op().obj(0)?;
        let end = self.frame().method.size;
        self.frame_mut().code_offset = end;

        if let Some(target) = self.method_return_slot() {
            // A literal could be moved here; copying is always safe.
            object::assign(&target, &value, true);
        }
        Ok(())
    }

    /// Where the current method's return value lands: the preempting op's
    /// waiting item in the caller, or the evaluation's result slot for the
    /// outermost frame. `None` when nobody consumes the value.
    fn method_return_slot(&self) -> Option<ObjectRef> {
        let depth = self.call_stack.len();
        if depth < 2 {
            return Some(self.ret.clone());
        }

        let caller = &self.call_stack[depth - 2];
        let op = caller.pending_ops.last()?;
        op.items.last()?.object().cloned()
    }

    /// `DispatchMethodCall`: push a frame for the callee held in
    /// `items[0]`, wrapping the evaluated arguments as Arg references.
    pub(crate) fn dispatch_method_call(&mut self) -> Result<(), Status> {
        let op = self.cur_op();
        let node = op.node_at(0)?;

        let method_obj = Namespace::bound_object(&node).ok_or(Status::InvalidArgument)?;
        let method = match &*method_obj.borrow() {
            Object::Method(method) => method.clone(),
            _ => return Err(Status::InvalidArgument),
        };

        let mut frame = CallFrame::new(method, node.clone());
        let arg_items = 2..op.items.len() - 1;
        for (slot, item) in frame.args.iter_mut().zip(op.items[arg_items].iter()) {
            let arg = item.object().cloned().ok_or(Status::InvalidArgument)?;
            *slot = Some(object::internal_reference(ReferenceKind::Arg, arg));
        }

        self.call_stack.push(frame);
        Ok(())
    }

    /// Drop the finished frame: pending ops drain, temporary nodes
    /// uninstall, locals and args die with it.
    pub(crate) fn pop_frame(&mut self) {
        if let Some(mut frame) = self.call_stack.pop() {
            frame.pending_ops.clear();
            for node in frame.temp_nodes.drain(..) {
                self.ns.uninstall(&node);
            }
        }
    }

    /// `Store`/`CopyObject` over an evaluated source and a SuperName
    /// destination.
    pub(crate) fn handle_copy_object_or_store(&mut self) -> Result<(), Status> {
        let (opcode, src, dst) = {
            let op = self.cur_op();
            (op.code, op.obj(0)?, op.obj(1)?)
        };

        if opcode == code::STORE {
            return self.store_to_target(&dst, &src);
        }

        // CopyObject into a byte cursor behaves like a store; anything
        // else non-reference is malformed.
        let is_reference = matches!(&*dst.borrow(), Object::Reference(_));
        if !is_reference {
            if matches!(&*dst.borrow(), Object::BufferIndex(_)) {
                let src = object::unwrap_internal(&src);
                return self.assign_with_implicit_cast(&dst, &src);
            }
            return Err(Status::BadBytecode);
        }
        self.copy_object_to_reference(&dst, &src)
    }
}
