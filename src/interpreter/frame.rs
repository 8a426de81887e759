//! Call frames, op contexts and the items parse programs operate on.

use std::rc::Rc;

use crate::consts::{ARG_COUNT, LOCAL_COUNT};
use crate::error::Status;
use crate::namespace::NodeRef;
use crate::object::{Method, ObjectRef};
use crate::opcode::OpSpec;

/// One slot of an op context. Items are typed so that teardown releases
/// the right resource: objects drop their refcount, method-local nodes are
/// plain allocations that vanish with the item.
#[derive(Debug, Default)]
pub(crate) enum Item {
    /// Placeholder awaiting the result of a preempted sub-expression.
    #[default]
    Empty,
    Object(ObjectRef),
    /// Resolved namespace node; `None` when the context permitted an
    /// unresolved name.
    Node(Option<NodeRef>),
    /// Freshly allocated node, parented but not installed. Dropped with the
    /// item unless an install step hands it to the namespace.
    MethodLocalNode(Option<NodeRef>),
    PackageLength {
        begin: usize,
        end: usize,
    },
    Immediate(u64),
}

impl Item {
    pub(crate) fn object(&self) -> Option<&ObjectRef> {
        match self {
            Item::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub(crate) fn node(&self) -> Option<&NodeRef> {
        match self {
            Item::Node(Some(node)) | Item::MethodLocalNode(Some(node)) => Some(node),
            _ => None,
        }
    }

    pub(crate) fn immediate(&self) -> u64 {
        match self {
            Item::Immediate(value) => *value,
            _ => 0,
        }
    }

    pub(crate) fn package_length(&self) -> (usize, usize) {
        match self {
            Item::PackageLength { begin, end } => (*begin, *end),
            _ => (0, 0),
        }
    }

    /// Whether the slot holds nothing, as tested by conditional parse ops.
    pub(crate) fn is_null(&self) -> bool {
        matches!(self, Item::Empty | Item::Node(None) | Item::MethodLocalNode(None))
    }
}

/// In-flight parse program for one decoded opcode.
#[derive(Debug)]
pub(crate) struct OpContext {
    pub(crate) spec: &'static OpSpec,
    /// The opcode actually decoded; specs shared between opcodes (locals,
    /// args) need the distinction.
    pub(crate) code: u16,
    /// Index into the parse program.
    pub(crate) pc: usize,
    /// Set while a dynamic sub-expression is being collected for this op.
    pub(crate) preempted: bool,
    /// Item index of the tracked package length, consulted on `End`.
    pub(crate) tracked_pkg: Option<usize>,
    pub(crate) items: Vec<Item>,
}

impl OpContext {
    pub(crate) fn new(spec: &'static OpSpec, code: u16) -> Self {
        Self {
            spec,
            code,
            pc: 0,
            preempted: false,
            tracked_pkg: None,
            items: Vec::new(),
        }
    }

    /// Object at item index `idx`; item layouts are fixed per parse
    /// program, so a miss is an internal inconsistency.
    pub(crate) fn obj(&self, idx: usize) -> Result<ObjectRef, Status> {
        self.items
            .get(idx)
            .and_then(Item::object)
            .cloned()
            .ok_or(Status::InvalidArgument)
    }

    pub(crate) fn last_obj(&self) -> Result<ObjectRef, Status> {
        self.items
            .last()
            .and_then(Item::object)
            .cloned()
            .ok_or(Status::InvalidArgument)
    }

    pub(crate) fn imm(&self, idx: usize) -> u64 {
        self.items.get(idx).map(Item::immediate).unwrap_or(0)
    }

    pub(crate) fn node_at(&self, idx: usize) -> Result<NodeRef, Status> {
        self.items
            .get(idx)
            .and_then(Item::node)
            .cloned()
            .ok_or(Status::InvalidArgument)
    }

    pub(crate) fn pkg_at(&self, idx: usize) -> (usize, usize) {
        self.items.get(idx).map(Item::package_length).unwrap_or((0, 0))
    }

    /// Integer payload of the object at `idx`.
    pub(crate) fn int_at(&self, idx: usize) -> Result<u64, Status> {
        self.obj(idx)?.borrow().as_integer()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CodeBlockKind {
    If,
    Else,
    While,
    Scope,
}

/// Span of code being executed as a block, with the node that becomes the
/// lookup scope for scope-like blocks.
#[derive(Debug)]
pub(crate) struct CodeBlock {
    pub(crate) kind: CodeBlockKind,
    pub(crate) begin: usize,
    pub(crate) end: usize,
    pub(crate) node: Option<NodeRef>,
}

/// One method invocation: locals, args, pending operations, open code
/// blocks and the temporary nodes to unlink on return.
#[derive(Debug)]
pub(crate) struct CallFrame {
    pub(crate) method: Rc<Method>,
    pub(crate) args: [Option<ObjectRef>; ARG_COUNT],
    pub(crate) locals: [Option<ObjectRef>; LOCAL_COUNT],
    pub(crate) pending_ops: Vec<OpContext>,
    pub(crate) code_blocks: Vec<CodeBlock>,
    pub(crate) temp_nodes: Vec<NodeRef>,
    pub(crate) cur_scope: NodeRef,
    /// Offset into the method body.
    pub(crate) code_offset: usize,
}

impl CallFrame {
    /// Frame with the base scope block spanning the whole method.
    pub(crate) fn new(method: Rc<Method>, scope: NodeRef) -> Self {
        let end = method.size;
        Self {
            method,
            args: Default::default(),
            locals: Default::default(),
            pending_ops: Vec::new(),
            code_blocks: vec![CodeBlock {
                kind: CodeBlockKind::Scope,
                begin: 0,
                end,
                node: Some(scope.clone()),
            }],
            temp_nodes: Vec::new(),
            cur_scope: scope,
            code_offset: 0,
        }
    }

    pub(crate) fn code(&self) -> &[u8] {
        self.method.body()
    }

    pub(crate) fn bytes_left(&self) -> usize {
        self.method.size.saturating_sub(self.code_offset)
    }

    pub(crate) fn has_code(&self) -> bool {
        self.bytes_left() > 0
    }

    /// Read `count` little-endian bytes at the cursor, zero-extended.
    pub(crate) fn peek_le(&self, count: usize) -> Option<u64> {
        if self.bytes_left() < count {
            return None;
        }
        let mut value = 0u64;
        for (i, &byte) in self.code()[self.code_offset..self.code_offset + count]
            .iter()
            .enumerate()
        {
            value |= (byte as u64) << (8 * i);
        }
        Some(value)
    }

    /// The innermost open `While` block, if any.
    pub(crate) fn last_while(&self) -> Option<usize> {
        self.code_blocks
            .iter()
            .rposition(|block| block.kind == CodeBlockKind::While)
    }

    /// The innermost open scope block's node, or `None` at the frame's
    /// base.
    pub(crate) fn last_scope(&self) -> Option<NodeRef> {
        self.code_blocks
            .iter()
            .rev()
            .find(|block| block.kind == CodeBlockKind::Scope)
            .and_then(|block| block.node.clone())
    }
}
