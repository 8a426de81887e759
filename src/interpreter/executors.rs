//! The main loop and the parse-program driver.
//!
//! The engine repeatedly closes finished code blocks, fetches one opcode,
//! and steps its parse program. A program that needs a dynamic
//! sub-expression preempts itself; the nested expression runs as its own
//! op context and hands its result back on completion. Method calls push
//! whole new frames. The host stack never recurses, so AML nesting depth
//! is bounded only by memory.

use tracing::{error, trace, warn};

use crate::consts::EXT_PREFIX;
use crate::error::{InterpreterError, Status};
use crate::host::Host;
use crate::interpreter::{Evaluation, Item, OpContext};
use crate::namespace::Namespace;
use crate::object::{self, implicit_deref, unwrap_internal, Object, ObjectType};
use crate::opcode::{self, code, OpProperties, OpSpec, ParseOp};

use super::name::{parse_package_length, ResolveBehavior};

const SPEC_SIMPLE_NAME: &str = "SimpleName := NameString | ArgObj | LocalObj";
const SPEC_SUPER_NAME: &str = "SuperName := SimpleName | DebugObj | ReferenceTypeOpcode";
const SPEC_TERM_ARG: &str = "TermArg := ExpressionOpcode | DataObject | ArgObj | LocalObj";
const SPEC_TARGET: &str = "Target := SuperName | NullName";
const SPEC_OPERAND: &str = "Operand := TermArg => Integer";
const SPEC_COMPUTATIONAL_DATA: &str =
    "ComputationalData := ByteConst | WordConst | DWordConst | QWordConst | String | ConstObj | RevisionOp | DefBuffer";

/// Preempting parse ops that expect a SuperName-shaped argument.
fn wants_supername(op: ParseOp) -> bool {
    matches!(
        op,
        ParseOp::SimpleName
            | ParseOp::SuperName
            | ParseOp::SuperNameImplicitDeref
            | ParseOp::SuperNameOrUnresolved
            | ParseOp::Target
    )
}

/// Preempting parse ops that expect a value-producing argument.
fn wants_term_arg_or_operand(op: ParseOp) -> bool {
    matches!(
        op,
        ParseOp::TermArg
            | ParseOp::TermArgUnwrapInternal
            | ParseOp::Operand
            | ParseOp::ComputationalData
    )
}

/// Parse ops that tolerate an unresolved name in their argument.
fn allows_unresolved(op: ParseOp) -> bool {
    matches!(
        op,
        ParseOp::SuperNameOrUnresolved
            | ParseOp::TermArgOrNamedObjectOrUnresolved
            | ParseOp::ExistingNameStringOrNull
    )
}

/// Check an op starting in argument position against the preempting op's
/// grammar expectation.
fn op_typecheck(prev: ParseOp, spec: &OpSpec) -> Result<(), Status> {
    let (ok_mask, expected) = match prev {
        ParseOp::SimpleName => (OpProperties::SIMPLE_NAME, SPEC_SIMPLE_NAME),
        ParseOp::Target => (OpProperties::TARGET | OpProperties::SUPER_NAME, SPEC_TARGET),
        ParseOp::SuperName | ParseOp::SuperNameImplicitDeref | ParseOp::SuperNameOrUnresolved => {
            (OpProperties::SUPER_NAME, SPEC_SUPER_NAME)
        }
        ParseOp::TermArg
        | ParseOp::TermArgUnwrapInternal
        | ParseOp::TermArgOrNamedObject
        | ParseOp::TermArgOrNamedObjectOrUnresolved
        | ParseOp::Operand
        | ParseOp::ComputationalData => (OpProperties::TERM_ARG, SPEC_TERM_ARG),
        _ => return Ok(()),
    };

    if spec.props.intersects(ok_mask) {
        Ok(())
    } else {
        warn!("invalid argument: '{}', expected a {}", spec.name, expected);
        Err(Status::BadBytecode)
    }
}

fn typecheck_operand(obj: &object::ObjectRef) -> Result<(), Status> {
    if matches!(&*obj.borrow(), Object::Integer(_)) {
        return Ok(());
    }
    warn!(
        "invalid argument type: {}, expected a {}",
        obj.borrow().type_of(),
        SPEC_OPERAND
    );
    Err(Status::BadBytecode)
}

fn typecheck_computational_data(obj: &object::ObjectRef) -> Result<(), Status> {
    if matches!(
        &*obj.borrow(),
        Object::Integer(_) | Object::String(_) | Object::Buffer(_)
    ) {
        return Ok(());
    }
    warn!(
        "invalid argument type: {}, expected a {}",
        obj.borrow().type_of(),
        SPEC_COMPUTATIONAL_DATA
    );
    Err(Status::BadBytecode)
}

impl<'a, H: Host> Evaluation<'a, H> {
    /// Drive the evaluation to completion. On return the frame stack is
    /// empty and the result slot holds the return value, if any.
    pub(crate) fn run(&mut self) -> Result<(), InterpreterError> {
        loop {
            if !self.has_non_preempted_op() {
                if self.call_stack.is_empty() {
                    return Ok(());
                }
                if self.maybe_end_block() {
                    continue;
                }
                if !self.frame().has_code() {
                    self.pop_frame();
                    continue;
                }

                let (spec, opcode) = self.get_op().map_err(InterpreterError::Evaluation)?;
                trace!("processing op '{}' (0x{:04X})", spec.name, opcode);
                self.frame_mut().pending_ops.push(OpContext::new(spec, opcode));
            }

            if let Err(status) = self.exec_op() {
                let err = match self.call_stack.last().and_then(|f| f.pending_ops.last()) {
                    Some(ctx) => InterpreterError::Opcode {
                        status,
                        code: ctx.code,
                        name: ctx.spec.name,
                    },
                    None => InterpreterError::Evaluation(status),
                };
                return Err(err);
            }

            self.skip_else = false;
        }
    }

    fn has_non_preempted_op(&self) -> bool {
        self.call_stack
            .last()
            .and_then(|frame| frame.pending_ops.last())
            .map(|ctx| !ctx.preempted)
            .unwrap_or(false)
    }

    /// Fetch the next opcode: one byte, or two behind the extended prefix.
    /// Unknown and reserved encodings are hard errors.
    fn get_op(&mut self) -> Result<(&'static OpSpec, u16), Status> {
        let frame = self.frame_mut();
        if !frame.has_code() {
            return Err(Status::OutOfBounds);
        }

        let mut op = frame.code()[frame.code_offset] as u16;
        frame.code_offset += 1;

        if op == EXT_PREFIX as u16 {
            if !frame.has_code() {
                return Err(Status::OutOfBounds);
            }
            op = (op << 8) | frame.code()[frame.code_offset] as u16;
            frame.code_offset += 1;
        }

        opcode::lookup(op).map(|spec| (spec, op)).ok_or(Status::BadBytecode)
    }

    /// The parse op the preempting context is suspended on.
    fn prev_parse_op(&self) -> Option<ParseOp> {
        let ops = &self.frame().pending_ops;
        if ops.len() < 2 {
            return None;
        }
        let prev = &ops[ops.len() - 2];
        prev.spec.program.get(prev.pc).copied()
    }

    /// Step the current op's parse program until it preempts, completes,
    /// or dispatches a method call.
    fn exec_op(&mut self) -> Result<(), Status> {
        let prev_op = self.prev_parse_op();

        loop {
            {
                let ctx = self.cur_op();
                if ctx.pc == 0 {
                    if let Some(prev) = prev_op {
                        op_typecheck(prev, ctx.spec)?;
                    }
                }
            }

            let op = {
                let ctx = self.cur_op_mut();
                let op = *ctx.spec.program.get(ctx.pc).ok_or(Status::InvalidArgument)?;
                ctx.pc += 1;
                op
            };

            match op {
                ParseOp::End => {
                    let frame = self.frame_mut();
                    let ctx = frame.pending_ops.last().ok_or(Status::InvalidArgument)?;
                    if let Some(idx) = ctx.tracked_pkg {
                        let (_, end) = ctx.items[idx].package_length();
                        frame.code_offset = end;
                    }
                    frame.pending_ops.pop();
                    if let Some(parent) = frame.pending_ops.last_mut() {
                        parent.preempted = false;
                        parent.pc += 1;
                    }
                    return Ok(());
                }

                // Yield until the engine has parsed one dynamic
                // sub-expression into the item pushed here.
                ParseOp::SimpleName
                | ParseOp::SuperName
                | ParseOp::SuperNameImplicitDeref
                | ParseOp::SuperNameOrUnresolved
                | ParseOp::TermArg
                | ParseOp::TermArgUnwrapInternal
                | ParseOp::TermArgOrNamedObject
                | ParseOp::TermArgOrNamedObjectOrUnresolved
                | ParseOp::Operand
                | ParseOp::ComputationalData
                | ParseOp::Target => {
                    let ctx = self.cur_op_mut();
                    ctx.items.push(Item::Empty);
                    ctx.preempted = true;
                    ctx.pc -= 1;
                    return Ok(());
                }

                ParseOp::PkgLen | ParseOp::TrackedPkgLen => {
                    let span = parse_package_length(self.frame_mut())?;
                    let ctx = self.cur_op_mut();
                    if op == ParseOp::TrackedPkgLen {
                        ctx.tracked_pkg = Some(ctx.items.len());
                    }
                    let (begin, end) = span;
                    ctx.items.push(Item::PackageLength { begin, end });
                }

                ParseOp::CreateNameString
                | ParseOp::ExistingNameString
                | ParseOp::ExistingNameStringOrNull => {
                    self.parse_op_name_string(op, prev_op)?;
                }

                ParseOp::ConvertNameString => {
                    self.parse_op_convert_name_string(prev_op)?;
                }

                ParseOp::LoadImm(width) | ParseOp::LoadImmAsObject(width) => {
                    let width = width as usize;
                    let value = self.frame().peek_le(width).ok_or(Status::BadBytecode)?;
                    self.frame_mut().code_offset += width;

                    let item = if matches!(op, ParseOp::LoadImm(_)) {
                        Item::Immediate(value)
                    } else {
                        Item::Object(object::wrap(Object::Integer(value)))
                    };
                    self.cur_op_mut().items.push(item);
                }

                ParseOp::LoadInlineImm(value) => {
                    self.cur_op_mut().items.push(Item::Immediate(value));
                }

                ParseOp::LoadInlineImmAsObject(value) => {
                    self.cur_op_mut()
                        .items
                        .push(Item::Object(object::wrap(Object::Integer(value))));
                }

                ParseOp::LoadFalseObject => {
                    self.cur_op_mut()
                        .items
                        .push(Item::Object(object::wrap(Object::Integer(0))));
                }

                ParseOp::LoadTrueObject => {
                    let ones = self.ones();
                    self.cur_op_mut()
                        .items
                        .push(Item::Object(object::wrap(Object::Integer(ones))));
                }

                ParseOp::ObjectAlloc => {
                    self.cur_op_mut()
                        .items
                        .push(Item::Object(object::wrap(Object::Uninitialized)));
                }

                ParseOp::ObjectAllocTyped(ty) => {
                    self.cur_op_mut()
                        .items
                        .push(Item::Object(object::wrap(Object::alloc(ty))));
                }

                ParseOp::EmptyObjectAlloc => {
                    self.cur_op_mut().items.push(Item::Empty);
                }

                ParseOp::ObjectConvertToShallowCopy | ParseOp::ObjectConvertToDeepCopy => {
                    let src = self.cur_op().last_obj()?;
                    let fresh = if op == ParseOp::ObjectConvertToDeepCopy {
                        object::wrap(src.borrow().deep_copy())
                    } else {
                        object::wrap(src.borrow().clone())
                    };
                    *self.last_item_mut() = Item::Object(fresh);
                }

                ParseOp::ObjectTransferToPrev | ParseOp::ObjectCopyToPrev => {
                    self.parse_op_transfer_to_prev(op, prev_op)?;
                }

                ParseOp::StoreToTarget(target) => {
                    let dst = self.cur_op().obj(target as usize)?;
                    let src = self.cur_op().last_obj()?;
                    self.store_to_target(&dst, &src)?;
                }

                ParseOp::StoreToTargetIndirect { target, source } => {
                    let dst = self.cur_op().obj(target as usize)?;
                    let src = self.cur_op().obj(source as usize)?;
                    self.store_to_target(&dst, &src)?;
                }

                ParseOp::InstallNamespaceNode(idx) => {
                    self.parse_op_install_node(idx as usize)?;
                }

                ParseOp::DispatchMethodCall => {
                    self.dispatch_method_call()?;
                    return Ok(());
                }

                ParseOp::RecordAmlPc => {
                    let offset = self.frame().code_offset as u64;
                    self.cur_op_mut().items.push(Item::Immediate(offset));
                }

                ParseOp::AmlPcDecrement => {
                    self.frame_mut().code_offset -= 1;
                }

                ParseOp::ImmDecrement(idx) => {
                    let idx = idx as usize;
                    let value = self.cur_op().imm(idx).wrapping_sub(1);
                    self.cur_op_mut().items[idx] = Item::Immediate(value);
                }

                ParseOp::Typecheck(expected) => {
                    let obj = self.cur_op().last_obj()?;
                    let found = obj.borrow().type_of();
                    if found != expected {
                        warn!("bad object type: expected {expected}, got {found}");
                        return Err(Status::BadBytecode);
                    }
                }

                ParseOp::TruncateNumber => {
                    let obj = self.cur_op().last_obj()?;
                    let truncated = match &*obj.borrow() {
                        Object::Integer(value) => self.truncate_if_needed(*value),
                        _ => continue,
                    };
                    *obj.borrow_mut() = Object::Integer(truncated);
                }

                ParseOp::Jmp(target) => {
                    self.cur_op_mut().pc = target as usize;
                }

                ParseOp::IfEquals { item, value, skip } => {
                    if self.cur_op().imm(item as usize) == value as u64 {
                        self.cur_op_mut().pc += skip as usize;
                    }
                }

                ParseOp::IfNull { item, skip } => {
                    if self.cur_op().items[item as usize].is_null() {
                        self.cur_op_mut().pc += skip as usize;
                    }
                }

                ParseOp::IfNotNull { item, skip } => {
                    if !self.cur_op().items[item as usize].is_null() {
                        self.cur_op_mut().pc += skip as usize;
                    }
                }

                ParseOp::IfHasData { skip } => {
                    let ctx = self.cur_op();
                    let idx = ctx.tracked_pkg.ok_or(Status::InvalidArgument)?;
                    let (_, end) = ctx.items[idx].package_length();
                    if self.frame().code_offset >= end {
                        self.cur_op_mut().pc += skip as usize;
                    }
                }

                ParseOp::InvokeHandler => {
                    self.invoke_handler()?;
                }

                ParseOp::Todo => {
                    warn!("op '{}' not yet implemented", self.cur_op().spec.name);
                    return Err(Status::Unimplemented);
                }

                ParseOp::BadOpcode | ParseOp::Unreachable => {
                    warn!("invalid/unexpected op '{}'", self.cur_op().spec.name);
                    return Err(Status::BadBytecode);
                }
            }
        }
    }

    /// Decode and resolve a NameString item, honoring the unresolved-name
    /// permissions of the surrounding context.
    fn parse_op_name_string(&mut self, op: ParseOp, prev_op: Option<ParseOp>) -> Result<(), Status> {
        let offset = self.frame().code_offset;
        let create = op == ParseOp::CreateNameString;
        let behavior = if create {
            ResolveBehavior::CreateLast
        } else {
            ResolveBehavior::Resolve
        };

        let item = match self.resolve_name_string(behavior) {
            Ok(node) => {
                if create {
                    Item::MethodLocalNode(Some(node))
                } else {
                    Item::Node(Some(node))
                }
            }
            Err(Status::NotFound) => {
                let permitted = match prev_op {
                    Some(prev) => allows_unresolved(prev) && allows_unresolved(op),
                    // The one standalone op allowed to reference missing
                    // names is External.
                    None => self.cur_op().code == code::EXTERNAL,
                };

                if !permitted {
                    let action = if create { "create" } else { "resolve" };
                    self.log_resolve_failure(action, offset, Status::NotFound);
                    return Err(Status::NotFound);
                }
                Item::Node(None)
            }
            Err(status) => {
                let action = if create { "create" } else { "resolve" };
                self.log_resolve_failure(action, offset, status);
                return Err(status);
            }
        };

        self.cur_op_mut().items.push(item);
        Ok(())
    }

    fn log_resolve_failure(&self, action: &str, offset: usize, status: Status) {
        let path = self
            .name_string_path_at(offset)
            .unwrap_or_else(|_| String::from("<unknown>"));
        error!("failed to {action} named object '{path}': {status}");
    }

    /// Rewrite a freshly resolved name into the pseudo-op matching its
    /// binding and the surrounding context: method calls in value
    /// position, typed field reads, or a plain named object.
    fn parse_op_convert_name_string(&mut self, prev_op: Option<ParseOp>) -> Result<(), Status> {
        let node = match self.cur_op().items.last() {
            Some(Item::Node(Some(node))) => node.clone(),
            _ => {
                // Unresolved: permitted contexts leave the empty item in
                // place for the preempting op to inspect.
                if prev_op.map(allows_unresolved) == Some(false) {
                    return Err(Status::NotFound);
                }
                return Ok(());
            }
        };

        let mut new_code = code::INTERNAL_NAMED_OBJECT;
        let bound = Namespace::bound_object(&node);

        if let Some(obj) = &bound {
            match &*obj.borrow() {
                Object::Method(method) => {
                    let invoke = match prev_op {
                        Some(ParseOp::TermArgOrNamedObject)
                        | Some(ParseOp::TermArgOrNamedObjectOrUnresolved) => false,
                        Some(prev) => !wants_supername(prev),
                        None => true,
                    };
                    if invoke {
                        new_code = code::INTERNAL_METHOD_CALL0 + method.args as u16;
                    }
                }
                Object::BufferField(field) => {
                    if prev_op.map(wants_term_arg_or_operand).unwrap_or(false) {
                        new_code = if self.buffer_field_read_type(field) == ObjectType::Buffer {
                            code::INTERNAL_READ_FIELD_AS_BUFFER
                        } else {
                            code::INTERNAL_READ_FIELD_AS_INTEGER
                        };
                    }
                }
                _ => {}
            }
        }

        let spec = opcode::lookup(new_code).ok_or(Status::InvalidArgument)?;
        let ctx = self.cur_op_mut();
        ctx.spec = spec;
        ctx.code = new_code;
        ctx.pc = 0;
        Ok(())
    }

    /// Hand the finished op's result to the preempting op's waiting item,
    /// applying the preempter's unwrap rule and typechecks.
    fn parse_op_transfer_to_prev(&mut self, op: ParseOp, prev_op: Option<ParseOp>) -> Result<(), Status> {
        let Some(prev) = prev_op else {
            return Ok(());
        };

        let src = self.cur_op().last_obj()?;
        let src = match prev {
            ParseOp::TermArgUnwrapInternal | ParseOp::ComputationalData | ParseOp::Operand => {
                let unwrapped = unwrap_internal(&src);
                if prev == ParseOp::Operand {
                    typecheck_operand(&unwrapped)?;
                } else if prev == ParseOp::ComputationalData {
                    typecheck_computational_data(&unwrapped)?;
                }
                unwrapped
            }
            ParseOp::SuperNameImplicitDeref => implicit_deref(&src),
            ParseOp::SuperName
            | ParseOp::SuperNameOrUnresolved
            | ParseOp::SimpleName
            | ParseOp::TermArg
            | ParseOp::TermArgOrNamedObject
            | ParseOp::TermArgOrNamedObjectOrUnresolved
            | ParseOp::Target => src,
            other => {
                warn!("don't know how to transfer an object to {other:?}");
                return Err(Status::InvalidArgument);
            }
        };

        let handed = if op == ParseOp::ObjectCopyToPrev {
            object::wrap(src.borrow().deep_copy())
        } else {
            src
        };

        let frame = self.frame_mut();
        let ops = &mut frame.pending_ops;
        let prev_idx = ops.len() - 2;
        let dst = ops[prev_idx]
            .items
            .last_mut()
            .ok_or(Status::InvalidArgument)?;
        *dst = Item::Object(handed);
        Ok(())
    }

    /// Install a freshly created node under its parent, registering it for
    /// teardown when the running method's named objects are temporary.
    fn parse_op_install_node(&mut self, idx: usize) -> Result<(), Status> {
        let node = match &self.cur_op().items[idx] {
            Item::MethodLocalNode(Some(node)) => node.clone(),
            _ => return Err(Status::InvalidArgument),
        };

        self.ns.install(&node)?;

        if !self.frame().method.named_objects_persist {
            self.frame_mut().temp_nodes.push(node.clone());
        }

        self.cur_op_mut().items[idx] = Item::Node(Some(node));
        Ok(())
    }

    /// Dispatch to the opcode's semantic handler.
    fn invoke_handler(&mut self) -> Result<(), Status> {
        match self.cur_op().code {
            code::LOCAL0..=code::LOCAL7 | code::ARG0..=code::ARG6 => self.handle_arg_or_local(),
            code::INTERNAL_NAMED_OBJECT => self.handle_named_object(),
            code::STRING_PREFIX => self.handle_string(),

            code::ADD
            | code::SUBTRACT
            | code::MULTIPLY
            | code::DIVIDE
            | code::SHIFT_LEFT
            | code::SHIFT_RIGHT
            | code::AND
            | code::NAND
            | code::OR
            | code::NOR
            | code::XOR
            | code::MOD => self.handle_binary_math(),
            code::NOT | code::FIND_SET_LEFT_BIT | code::FIND_SET_RIGHT_BIT => self.handle_unary_math(),
            code::INCREMENT | code::DECREMENT => self.handle_inc_dec(),
            code::LNOT => self.handle_logical_not(),
            code::LEQUAL | code::LGREATER | code::LLESS | code::LAND | code::LOR => {
                self.handle_binary_logic()
            }

            code::IF | code::ELSE | code::WHILE | code::SCOPE | code::DEVICE | code::PROCESSOR
            | code::POWER_RES | code::THERMAL_ZONE => self.handle_code_block(),
            code::BREAK | code::CONTINUE => self.handle_control_flow(),
            code::RETURN => self.handle_return(),

            code::STORE | code::COPY_OBJECT => self.handle_copy_object_or_store(),
            code::REF_OF | code::DEREF_OF | code::COND_REF_OF => self.handle_ref_or_deref_of(),
            code::INDEX => self.handle_index(),

            code::BUFFER => self.handle_buffer(),
            code::PACKAGE | code::VAR_PACKAGE => self.handle_package(),

            code::SIZE_OF => self.handle_sizeof(),
            code::OBJECT_TYPE => self.handle_object_type(),
            code::TIMER => self.handle_timer(),

            code::CONCAT => self.handle_concatenate(),
            code::TO_INTEGER | code::TO_BUFFER | code::TO_DECIMAL_STRING | code::TO_HEX_STRING => {
                self.handle_to()
            }
            code::TO_STRING => self.handle_to_string(),
            code::MID => self.handle_mid(),

            code::NAME => self.handle_create_named(),
            code::METHOD => self.handle_create_method(),
            code::MUTEX => self.handle_create_mutex(),
            code::OP_REGION => self.handle_create_op_region(),
            code::FIELD => self.handle_create_field(),
            code::ALIAS => self.handle_create_alias(),
            code::CREATE_FIELD
            | code::CREATE_BIT_FIELD
            | code::CREATE_BYTE_FIELD
            | code::CREATE_WORD_FIELD
            | code::CREATE_DWORD_FIELD
            | code::CREATE_QWORD_FIELD => self.handle_create_buffer_field(),
            code::INTERNAL_READ_FIELD_AS_INTEGER | code::INTERNAL_READ_FIELD_AS_BUFFER => {
                self.handle_field_read()
            }

            code::ACQUIRE => self.handle_acquire(),
            code::RELEASE => self.handle_release(),
            code::NOTIFY => self.handle_notify(),

            other => {
                warn!("op 0x{other:04X} has no dedicated handler installed");
                Err(Status::Unimplemented)
            }
        }
    }
}
