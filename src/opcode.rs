//! Opcode catalog.
//!
//! Every AML opcode owns a *parse program*: a short sequence of [`ParseOp`]s
//! the engine interprets to collect the opcode's arguments, allocate result
//! objects, branch, and finally dispatch to the semantic handler. Opcodes
//! that take dynamic sub-expressions encode that as a preempting parse op;
//! the engine suspends the program, evaluates one term from the bytecode,
//! and resumes with the result in place.
//!
//! Item indices named in programs (e.g. `InstallNamespaceNode(1)`) refer to
//! the op context's item list, which grows in program order.

use bitflags::bitflags;

use crate::consts::INTERPRETER_REVISION;
use crate::object::ObjectType as Ty;

bitflags! {
    /// Grammar positions an opcode may legally occupy, consulted when a
    /// preempted op observes a nested op starting.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OpProperties: u8 {
        /// `SimpleName := NameString | ArgObj | LocalObj`
        const SIMPLE_NAME = 1 << 0;
        /// `SuperName := SimpleName | DebugObj | ReferenceTypeOpcode`
        const SUPER_NAME = 1 << 1;
        /// `Target := SuperName | NullName`
        const TARGET = 1 << 2;
        /// `TermArg := ExpressionOpcode | DataObject | ArgObj | LocalObj`
        const TERM_ARG = 1 << 3;
    }
}

/// One instruction of a parse program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseOp {
    /// Pop the op context; if the opcode tracked a package length, advance
    /// the code pointer to its end.
    End,

    // Preempting ops: yield so the engine parses one dynamic sub-expression;
    // the result replaces the item each of these pushes. Each variant
    // carries its own typecheck and unwrapping rule.
    SimpleName,
    SuperName,
    SuperNameImplicitDeref,
    SuperNameOrUnresolved,
    TermArg,
    TermArgUnwrapInternal,
    TermArgOrNamedObject,
    TermArgOrNamedObjectOrUnresolved,
    /// TermArg that must evaluate to an Integer.
    Operand,
    /// TermArg that must evaluate to Integer, String or Buffer.
    ComputationalData,
    Target,

    /// Decode a PkgLength into an item.
    PkgLen,
    /// Like `PkgLen`, and `End` will skip the code pointer to its end.
    TrackedPkgLen,

    /// Resolve-create a NameString: everything but the last segment must
    /// exist, the last must not. Yields an uninstalled node owned by the
    /// item until `InstallNamespaceNode`.
    CreateNameString,
    /// Resolve a NameString; failure is an error.
    ExistingNameString,
    /// Resolve a NameString; unresolved stays a null item when the context
    /// permits it.
    ExistingNameStringOrNull,

    /// Read N little-endian code bytes into an immediate item.
    LoadImm(u8),
    /// Read N little-endian code bytes into a fresh Integer object item.
    LoadImmAsObject(u8),
    /// Materialize a program-supplied constant as an immediate item.
    LoadInlineImm(u64),
    /// Materialize a program-supplied constant as an Integer object item.
    LoadInlineImmAsObject(u64),
    /// Fresh Integer `0` object item.
    LoadFalseObject,
    /// Fresh Integer `Ones` object item (width follows the table revision).
    LoadTrueObject,

    /// Fresh Uninitialized object item.
    ObjectAlloc,
    /// Fresh object item of the given type.
    ObjectAllocTyped(Ty),
    /// Placeholder object item with no object yet.
    EmptyObjectAlloc,

    /// Replace the last item's object with a shallow copy, giving it a
    /// fresh identity.
    ObjectConvertToShallowCopy,
    /// Replace the last item's object with a deep copy.
    ObjectConvertToDeepCopy,

    /// Hand the last item's object to the preempted op's waiting item,
    /// applying the preempter's unwrap rule and typecheck.
    ObjectTransferToPrev,
    /// Like `ObjectTransferToPrev` but hands over a deep copy.
    ObjectCopyToPrev,

    /// Store the last item's object into the target at the given item
    /// index, honoring implicit conversion.
    StoreToTarget(u8),
    /// Store `items[source]` into the target at `items[target]`.
    StoreToTargetIndirect { target: u8, source: u8 },

    /// Install the node at the given item index under its parent; register
    /// it as temporary when the running method's named objects do not
    /// persist.
    InstallNamespaceNode(u8),

    /// Rewrite a just-resolved node item into the matching pseudo-opcode
    /// (named object, method call, field read) based on the node's bound
    /// object and the preempter's expectation.
    ConvertNameString,

    /// Push a frame for the callee held in `items[0]` and hand the
    /// evaluated argument items over as Arg references.
    DispatchMethodCall,

    /// Record the current code offset as an immediate item.
    RecordAmlPc,
    /// Step the code pointer back one byte (used by pseudo-ops whose first
    /// byte is part of the operand).
    AmlPcDecrement,
    /// Decrement the immediate at the given item index.
    ImmDecrement(u8),

    /// Fail with `BadBytecode` unless the last item's object has the given
    /// type.
    Typecheck(Ty),
    /// Mask the last item's Integer to 32 bits under table revision 1.
    TruncateNumber,

    /// Unconditional jump to an absolute program index.
    Jmp(u8),
    /// Skip the next `skip` instructions when the immediate at `item`
    /// equals `value`.
    IfEquals { item: u8, value: u8, skip: u8 },
    /// Skip the next `skip` instructions when `items[item]` holds nothing.
    IfNull { item: u8, skip: u8 },
    /// Skip the next `skip` instructions when `items[item]` holds
    /// something.
    IfNotNull { item: u8, skip: u8 },
    /// Skip the next `skip` instructions once the code pointer has reached
    /// the tracked package's end.
    IfHasData { skip: u8 },

    /// Run the opcode's semantic handler over the collected items.
    InvokeHandler,

    /// Diagnostic sinks.
    Todo,
    BadOpcode,
    Unreachable,
}

/// Static description of one opcode.
#[derive(Debug)]
pub struct OpSpec {
    pub name: &'static str,
    pub code: u16,
    pub props: OpProperties,
    pub program: &'static [ParseOp],
}

/// Opcode values. Extended opcodes carry the `0x5B` prefix in the high
/// byte; internal pseudo-opcodes (never encoded in AML) live at `0xFExx`.
pub mod code {
    pub const ZERO: u16 = 0x00;
    pub const ONE: u16 = 0x01;
    pub const ALIAS: u16 = 0x06;
    pub const NAME: u16 = 0x08;
    pub const BYTE_PREFIX: u16 = 0x0A;
    pub const WORD_PREFIX: u16 = 0x0B;
    pub const DWORD_PREFIX: u16 = 0x0C;
    pub const STRING_PREFIX: u16 = 0x0D;
    pub const QWORD_PREFIX: u16 = 0x0E;
    pub const SCOPE: u16 = 0x10;
    pub const BUFFER: u16 = 0x11;
    pub const PACKAGE: u16 = 0x12;
    pub const VAR_PACKAGE: u16 = 0x13;
    pub const METHOD: u16 = 0x14;
    pub const EXTERNAL: u16 = 0x15;
    pub const LOCAL0: u16 = 0x60;
    pub const LOCAL7: u16 = 0x67;
    pub const ARG0: u16 = 0x68;
    pub const ARG6: u16 = 0x6E;
    pub const STORE: u16 = 0x70;
    pub const REF_OF: u16 = 0x71;
    pub const ADD: u16 = 0x72;
    pub const CONCAT: u16 = 0x73;
    pub const SUBTRACT: u16 = 0x74;
    pub const INCREMENT: u16 = 0x75;
    pub const DECREMENT: u16 = 0x76;
    pub const MULTIPLY: u16 = 0x77;
    pub const DIVIDE: u16 = 0x78;
    pub const SHIFT_LEFT: u16 = 0x79;
    pub const SHIFT_RIGHT: u16 = 0x7A;
    pub const AND: u16 = 0x7B;
    pub const NAND: u16 = 0x7C;
    pub const OR: u16 = 0x7D;
    pub const NOR: u16 = 0x7E;
    pub const XOR: u16 = 0x7F;
    pub const NOT: u16 = 0x80;
    pub const FIND_SET_LEFT_BIT: u16 = 0x81;
    pub const FIND_SET_RIGHT_BIT: u16 = 0x82;
    pub const DEREF_OF: u16 = 0x83;
    pub const CONCAT_RES: u16 = 0x84;
    pub const MOD: u16 = 0x85;
    pub const NOTIFY: u16 = 0x86;
    pub const SIZE_OF: u16 = 0x87;
    pub const INDEX: u16 = 0x88;
    pub const MATCH: u16 = 0x89;
    pub const CREATE_DWORD_FIELD: u16 = 0x8A;
    pub const CREATE_WORD_FIELD: u16 = 0x8B;
    pub const CREATE_BYTE_FIELD: u16 = 0x8C;
    pub const CREATE_BIT_FIELD: u16 = 0x8D;
    pub const OBJECT_TYPE: u16 = 0x8E;
    pub const CREATE_QWORD_FIELD: u16 = 0x8F;
    pub const LAND: u16 = 0x90;
    pub const LOR: u16 = 0x91;
    pub const LNOT: u16 = 0x92;
    pub const LEQUAL: u16 = 0x93;
    pub const LGREATER: u16 = 0x94;
    pub const LLESS: u16 = 0x95;
    pub const TO_BUFFER: u16 = 0x96;
    pub const TO_DECIMAL_STRING: u16 = 0x97;
    pub const TO_HEX_STRING: u16 = 0x98;
    pub const TO_INTEGER: u16 = 0x99;
    pub const TO_STRING: u16 = 0x9C;
    pub const COPY_OBJECT: u16 = 0x9D;
    pub const MID: u16 = 0x9E;
    pub const CONTINUE: u16 = 0x9F;
    pub const IF: u16 = 0xA0;
    pub const ELSE: u16 = 0xA1;
    pub const WHILE: u16 = 0xA2;
    pub const NOOP: u16 = 0xA3;
    pub const RETURN: u16 = 0xA4;
    pub const BREAK: u16 = 0xA5;
    pub const BREAK_POINT: u16 = 0xCC;
    pub const ONES: u16 = 0xFF;

    pub const MUTEX: u16 = 0x5B01;
    pub const EVENT: u16 = 0x5B02;
    pub const COND_REF_OF: u16 = 0x5B12;
    pub const CREATE_FIELD: u16 = 0x5B13;
    pub const LOAD_TABLE: u16 = 0x5B1F;
    pub const LOAD: u16 = 0x5B20;
    pub const STALL: u16 = 0x5B21;
    pub const SLEEP: u16 = 0x5B22;
    pub const ACQUIRE: u16 = 0x5B23;
    pub const SIGNAL: u16 = 0x5B24;
    pub const WAIT: u16 = 0x5B25;
    pub const RESET: u16 = 0x5B26;
    pub const RELEASE: u16 = 0x5B27;
    pub const FROM_BCD: u16 = 0x5B28;
    pub const TO_BCD: u16 = 0x5B29;
    pub const UNLOAD: u16 = 0x5B2A;
    pub const REVISION: u16 = 0x5B30;
    pub const DEBUG: u16 = 0x5B31;
    pub const FATAL: u16 = 0x5B32;
    pub const TIMER: u16 = 0x5B33;
    pub const OP_REGION: u16 = 0x5B80;
    pub const FIELD: u16 = 0x5B81;
    pub const DEVICE: u16 = 0x5B82;
    pub const PROCESSOR: u16 = 0x5B83;
    pub const POWER_RES: u16 = 0x5B84;
    pub const THERMAL_ZONE: u16 = 0x5B85;
    pub const INDEX_FIELD: u16 = 0x5B86;
    pub const BANK_FIELD: u16 = 0x5B87;
    pub const DATA_REGION: u16 = 0x5B88;

    // Internal pseudo-opcodes, produced by `ConvertNameString`.
    pub const INTERNAL_NAMED_OBJECT: u16 = 0xFE00;
    pub const INTERNAL_NAME_STRING: u16 = 0xFE01;
    pub const INTERNAL_METHOD_CALL0: u16 = 0xFE10;
    pub const INTERNAL_METHOD_CALL7: u16 = 0xFE17;
    pub const INTERNAL_READ_FIELD_AS_INTEGER: u16 = 0xFE20;
    pub const INTERNAL_READ_FIELD_AS_BUFFER: u16 = 0xFE21;
}

/// Bytes that begin a NameString when found in opcode position.
pub fn is_name_start(byte: u8) -> bool {
    matches!(byte, 0x2E | 0x2F | b'A'..=b'Z' | b'\\' | b'^' | b'_')
}

const P_NONE: OpProperties = OpProperties::empty();
const P_TERM: OpProperties = OpProperties::TERM_ARG;
const P_SUPER: OpProperties = OpProperties::SUPER_NAME;
const P_TERM_SUPER: OpProperties = OpProperties::TERM_ARG.union(OpProperties::SUPER_NAME);
const P_TERM_TARGET: OpProperties = OpProperties::TERM_ARG.union(OpProperties::TARGET);
const P_NAME_LIKE: OpProperties = OpProperties::SIMPLE_NAME
    .union(OpProperties::SUPER_NAME)
    .union(OpProperties::TERM_ARG);

macro_rules! specs {
    ($($ident:ident: $name:literal, $code:expr, $props:expr => [$($op:expr),* $(,)?];)*) => {
        $(static $ident: OpSpec = OpSpec {
            name: $name,
            code: $code,
            props: $props,
            program: &[$($op),*],
        };)*
    };
}

use ParseOp::*;

specs! {
    // Constants and literals.
    ZERO: "Zero", code::ZERO, P_TERM_TARGET =>
        [LoadFalseObject, ObjectTransferToPrev, End];
    ONE: "One", code::ONE, P_TERM =>
        [LoadInlineImmAsObject(1), ObjectTransferToPrev, End];
    ONES: "Ones", code::ONES, P_TERM =>
        [LoadTrueObject, ObjectTransferToPrev, End];
    BYTE_PREFIX: "ByteConst", code::BYTE_PREFIX, P_TERM =>
        [LoadImmAsObject(1), ObjectTransferToPrev, End];
    WORD_PREFIX: "WordConst", code::WORD_PREFIX, P_TERM =>
        [LoadImmAsObject(2), ObjectTransferToPrev, End];
    DWORD_PREFIX: "DWordConst", code::DWORD_PREFIX, P_TERM =>
        [LoadImmAsObject(4), ObjectTransferToPrev, End];
    QWORD_PREFIX: "QWordConst", code::QWORD_PREFIX, P_TERM =>
        [LoadImmAsObject(8), ObjectTransferToPrev, End];
    STRING_PREFIX: "String", code::STRING_PREFIX, P_TERM =>
        [ObjectAllocTyped(Ty::String), InvokeHandler, ObjectTransferToPrev, End];
    REVISION: "Revision", code::REVISION, P_TERM =>
        [LoadInlineImmAsObject(INTERPRETER_REVISION), ObjectTransferToPrev, End];
    DEBUG: "Debug", code::DEBUG, P_SUPER =>
        [ObjectAllocTyped(Ty::DebugObject), ObjectTransferToPrev, End];

    // Locals, args and names.
    LOCAL: "Local", code::LOCAL0, P_NAME_LIKE =>
        [EmptyObjectAlloc, InvokeHandler, ObjectTransferToPrev, End];
    ARG: "Arg", code::ARG0, P_NAME_LIKE =>
        [EmptyObjectAlloc, InvokeHandler, ObjectTransferToPrev, End];
    NAME_STRING: "NameString", code::INTERNAL_NAME_STRING, P_NAME_LIKE =>
        [AmlPcDecrement, ExistingNameStringOrNull, ConvertNameString, End];
    NAMED_OBJECT: "NamedObject", code::INTERNAL_NAMED_OBJECT, P_NAME_LIKE =>
        [EmptyObjectAlloc, InvokeHandler, ObjectTransferToPrev, End];
    READ_FIELD_AS_INTEGER: "ReadFieldAsInteger", code::INTERNAL_READ_FIELD_AS_INTEGER, P_TERM =>
        [ObjectAllocTyped(Ty::Integer), InvokeHandler, ObjectTransferToPrev, End];
    READ_FIELD_AS_BUFFER: "ReadFieldAsBuffer", code::INTERNAL_READ_FIELD_AS_BUFFER, P_TERM =>
        [ObjectAllocTyped(Ty::Buffer), InvokeHandler, ObjectTransferToPrev, End];
    METHOD_CALL0: "MethodCall0Args", code::INTERNAL_METHOD_CALL0, P_TERM => [
        LoadInlineImm(0),
        IfEquals { item: 1, value: 0, skip: 3 },
        TermArg,
        ImmDecrement(1),
        Jmp(1),
        ObjectAlloc,
        DispatchMethodCall,
        ObjectTransferToPrev,
        End,
    ];
    METHOD_CALL1: "MethodCall1Arg", code::INTERNAL_METHOD_CALL0 + 1, P_TERM => [
        LoadInlineImm(1),
        IfEquals { item: 1, value: 0, skip: 3 },
        TermArg,
        ImmDecrement(1),
        Jmp(1),
        ObjectAlloc,
        DispatchMethodCall,
        ObjectTransferToPrev,
        End,
    ];
    METHOD_CALL2: "MethodCall2Args", code::INTERNAL_METHOD_CALL0 + 2, P_TERM => [
        LoadInlineImm(2),
        IfEquals { item: 1, value: 0, skip: 3 },
        TermArg,
        ImmDecrement(1),
        Jmp(1),
        ObjectAlloc,
        DispatchMethodCall,
        ObjectTransferToPrev,
        End,
    ];
    METHOD_CALL3: "MethodCall3Args", code::INTERNAL_METHOD_CALL0 + 3, P_TERM => [
        LoadInlineImm(3),
        IfEquals { item: 1, value: 0, skip: 3 },
        TermArg,
        ImmDecrement(1),
        Jmp(1),
        ObjectAlloc,
        DispatchMethodCall,
        ObjectTransferToPrev,
        End,
    ];
    METHOD_CALL4: "MethodCall4Args", code::INTERNAL_METHOD_CALL0 + 4, P_TERM => [
        LoadInlineImm(4),
        IfEquals { item: 1, value: 0, skip: 3 },
        TermArg,
        ImmDecrement(1),
        Jmp(1),
        ObjectAlloc,
        DispatchMethodCall,
        ObjectTransferToPrev,
        End,
    ];
    METHOD_CALL5: "MethodCall5Args", code::INTERNAL_METHOD_CALL0 + 5, P_TERM => [
        LoadInlineImm(5),
        IfEquals { item: 1, value: 0, skip: 3 },
        TermArg,
        ImmDecrement(1),
        Jmp(1),
        ObjectAlloc,
        DispatchMethodCall,
        ObjectTransferToPrev,
        End,
    ];
    METHOD_CALL6: "MethodCall6Args", code::INTERNAL_METHOD_CALL0 + 6, P_TERM => [
        LoadInlineImm(6),
        IfEquals { item: 1, value: 0, skip: 3 },
        TermArg,
        ImmDecrement(1),
        Jmp(1),
        ObjectAlloc,
        DispatchMethodCall,
        ObjectTransferToPrev,
        End,
    ];
    METHOD_CALL7: "MethodCall7Args", code::INTERNAL_METHOD_CALL7, P_TERM => [
        LoadInlineImm(7),
        IfEquals { item: 1, value: 0, skip: 3 },
        TermArg,
        ImmDecrement(1),
        Jmp(1),
        ObjectAlloc,
        DispatchMethodCall,
        ObjectTransferToPrev,
        End,
    ];

    // Stores and references.
    STORE: "Store", code::STORE, P_TERM =>
        [TermArg, SuperName, InvokeHandler, ObjectTransferToPrev, End];
    COPY_OBJECT: "CopyObject", code::COPY_OBJECT, P_TERM =>
        [TermArg, SuperName, InvokeHandler, ObjectTransferToPrev, End];
    REF_OF: "RefOf", code::REF_OF, P_TERM_SUPER =>
        [SuperName, ObjectAlloc, InvokeHandler, ObjectTransferToPrev, End];
    DEREF_OF: "DerefOf", code::DEREF_OF, P_TERM_SUPER =>
        [TermArg, ObjectAlloc, InvokeHandler, ObjectTransferToPrev, End];
    COND_REF_OF: "CondRefOf", code::COND_REF_OF, P_TERM => [
        SuperNameOrUnresolved,
        Target,
        IfNull { item: 0, skip: 6 },
        ObjectAlloc,
        InvokeHandler,
        StoreToTargetIndirect { target: 1, source: 2 },
        LoadTrueObject,
        ObjectTransferToPrev,
        End,
        LoadFalseObject,
        ObjectTransferToPrev,
        End,
    ];
    INDEX: "Index", code::INDEX, P_TERM_SUPER => [
        TermArgUnwrapInternal,
        Operand,
        Target,
        EmptyObjectAlloc,
        InvokeHandler,
        StoreToTargetIndirect { target: 2, source: 3 },
        ObjectTransferToPrev,
        End,
    ];

    // Arithmetic.
    ADD: "Add", code::ADD, P_TERM => [
        Operand, Operand, Target,
        ObjectAllocTyped(Ty::Integer),
        InvokeHandler,
        TruncateNumber,
        StoreToTargetIndirect { target: 2, source: 3 },
        ObjectTransferToPrev,
        End,
    ];
    SUBTRACT: "Subtract", code::SUBTRACT, P_TERM => [
        Operand, Operand, Target,
        ObjectAllocTyped(Ty::Integer),
        InvokeHandler,
        TruncateNumber,
        StoreToTargetIndirect { target: 2, source: 3 },
        ObjectTransferToPrev,
        End,
    ];
    MULTIPLY: "Multiply", code::MULTIPLY, P_TERM => [
        Operand, Operand, Target,
        ObjectAllocTyped(Ty::Integer),
        InvokeHandler,
        TruncateNumber,
        StoreToTargetIndirect { target: 2, source: 3 },
        ObjectTransferToPrev,
        End,
    ];
    SHIFT_LEFT: "ShiftLeft", code::SHIFT_LEFT, P_TERM => [
        Operand, Operand, Target,
        ObjectAllocTyped(Ty::Integer),
        InvokeHandler,
        TruncateNumber,
        StoreToTargetIndirect { target: 2, source: 3 },
        ObjectTransferToPrev,
        End,
    ];
    SHIFT_RIGHT: "ShiftRight", code::SHIFT_RIGHT, P_TERM => [
        Operand, Operand, Target,
        ObjectAllocTyped(Ty::Integer),
        InvokeHandler,
        TruncateNumber,
        StoreToTargetIndirect { target: 2, source: 3 },
        ObjectTransferToPrev,
        End,
    ];
    AND: "And", code::AND, P_TERM => [
        Operand, Operand, Target,
        ObjectAllocTyped(Ty::Integer),
        InvokeHandler,
        TruncateNumber,
        StoreToTargetIndirect { target: 2, source: 3 },
        ObjectTransferToPrev,
        End,
    ];
    NAND: "Nand", code::NAND, P_TERM => [
        Operand, Operand, Target,
        ObjectAllocTyped(Ty::Integer),
        InvokeHandler,
        TruncateNumber,
        StoreToTargetIndirect { target: 2, source: 3 },
        ObjectTransferToPrev,
        End,
    ];
    OR: "Or", code::OR, P_TERM => [
        Operand, Operand, Target,
        ObjectAllocTyped(Ty::Integer),
        InvokeHandler,
        TruncateNumber,
        StoreToTargetIndirect { target: 2, source: 3 },
        ObjectTransferToPrev,
        End,
    ];
    NOR: "Nor", code::NOR, P_TERM => [
        Operand, Operand, Target,
        ObjectAllocTyped(Ty::Integer),
        InvokeHandler,
        TruncateNumber,
        StoreToTargetIndirect { target: 2, source: 3 },
        ObjectTransferToPrev,
        End,
    ];
    XOR: "Xor", code::XOR, P_TERM => [
        Operand, Operand, Target,
        ObjectAllocTyped(Ty::Integer),
        InvokeHandler,
        TruncateNumber,
        StoreToTargetIndirect { target: 2, source: 3 },
        ObjectTransferToPrev,
        End,
    ];
    MOD: "Mod", code::MOD, P_TERM => [
        Operand, Operand, Target,
        ObjectAllocTyped(Ty::Integer),
        InvokeHandler,
        TruncateNumber,
        StoreToTargetIndirect { target: 2, source: 3 },
        ObjectTransferToPrev,
        End,
    ];
    DIVIDE: "Divide", code::DIVIDE, P_TERM => [
        Operand, Operand, Target, Target,
        ObjectAllocTyped(Ty::Integer),
        ObjectAllocTyped(Ty::Integer),
        InvokeHandler,
        StoreToTargetIndirect { target: 2, source: 4 },
        StoreToTargetIndirect { target: 3, source: 5 },
        ObjectTransferToPrev,
        End,
    ];
    NOT: "Not", code::NOT, P_TERM => [
        Operand, Target,
        ObjectAllocTyped(Ty::Integer),
        InvokeHandler,
        StoreToTargetIndirect { target: 1, source: 2 },
        ObjectTransferToPrev,
        End,
    ];
    FIND_SET_LEFT_BIT: "FindSetLeftBit", code::FIND_SET_LEFT_BIT, P_TERM => [
        Operand, Target,
        ObjectAllocTyped(Ty::Integer),
        InvokeHandler,
        StoreToTargetIndirect { target: 1, source: 2 },
        ObjectTransferToPrev,
        End,
    ];
    FIND_SET_RIGHT_BIT: "FindSetRightBit", code::FIND_SET_RIGHT_BIT, P_TERM => [
        Operand, Target,
        ObjectAllocTyped(Ty::Integer),
        InvokeHandler,
        StoreToTargetIndirect { target: 1, source: 2 },
        ObjectTransferToPrev,
        End,
    ];
    INCREMENT: "Increment", code::INCREMENT, P_TERM =>
        [SuperNameImplicitDeref, Typecheck(Ty::Integer), InvokeHandler, ObjectTransferToPrev, End];
    DECREMENT: "Decrement", code::DECREMENT, P_TERM =>
        [SuperNameImplicitDeref, Typecheck(Ty::Integer), InvokeHandler, ObjectTransferToPrev, End];

    // Logic.
    LNOT: "LNot", code::LNOT, P_TERM =>
        [Operand, ObjectAlloc, InvokeHandler, ObjectTransferToPrev, End];
    LAND: "LAnd", code::LAND, P_TERM =>
        [ComputationalData, ComputationalData, ObjectAllocTyped(Ty::Integer), InvokeHandler, ObjectTransferToPrev, End];
    LOR: "LOr", code::LOR, P_TERM =>
        [ComputationalData, ComputationalData, ObjectAllocTyped(Ty::Integer), InvokeHandler, ObjectTransferToPrev, End];
    LEQUAL: "LEqual", code::LEQUAL, P_TERM =>
        [ComputationalData, ComputationalData, ObjectAllocTyped(Ty::Integer), InvokeHandler, ObjectTransferToPrev, End];
    LGREATER: "LGreater", code::LGREATER, P_TERM =>
        [ComputationalData, ComputationalData, ObjectAllocTyped(Ty::Integer), InvokeHandler, ObjectTransferToPrev, End];
    LLESS: "LLess", code::LLESS, P_TERM =>
        [ComputationalData, ComputationalData, ObjectAllocTyped(Ty::Integer), InvokeHandler, ObjectTransferToPrev, End];

    // Inspection.
    SIZE_OF: "SizeOf", code::SIZE_OF, P_TERM =>
        [SuperName, ObjectAllocTyped(Ty::Integer), InvokeHandler, ObjectTransferToPrev, End];
    OBJECT_TYPE: "ObjectType", code::OBJECT_TYPE, P_TERM =>
        [SuperName, ObjectAllocTyped(Ty::Integer), InvokeHandler, ObjectTransferToPrev, End];
    TIMER: "Timer", code::TIMER, P_TERM =>
        [ObjectAllocTyped(Ty::Integer), InvokeHandler, ObjectTransferToPrev, End];

    // Conversions.
    CONCAT: "Concatenate", code::CONCAT, P_TERM => [
        ComputationalData, ComputationalData, Target,
        ObjectAllocTyped(Ty::Buffer),
        InvokeHandler,
        StoreToTargetIndirect { target: 2, source: 3 },
        ObjectTransferToPrev,
        End,
    ];
    TO_INTEGER: "ToInteger", code::TO_INTEGER, P_TERM => [
        ComputationalData, Target,
        ObjectAllocTyped(Ty::Integer),
        InvokeHandler,
        StoreToTargetIndirect { target: 1, source: 2 },
        ObjectTransferToPrev,
        End,
    ];
    TO_BUFFER: "ToBuffer", code::TO_BUFFER, P_TERM => [
        ComputationalData, Target,
        ObjectAllocTyped(Ty::Buffer),
        InvokeHandler,
        StoreToTargetIndirect { target: 1, source: 2 },
        ObjectTransferToPrev,
        End,
    ];
    TO_DECIMAL_STRING: "ToDecimalString", code::TO_DECIMAL_STRING, P_TERM => [
        ComputationalData, Target,
        ObjectAllocTyped(Ty::String),
        InvokeHandler,
        StoreToTargetIndirect { target: 1, source: 2 },
        ObjectTransferToPrev,
        End,
    ];
    TO_HEX_STRING: "ToHexString", code::TO_HEX_STRING, P_TERM => [
        ComputationalData, Target,
        ObjectAllocTyped(Ty::String),
        InvokeHandler,
        StoreToTargetIndirect { target: 1, source: 2 },
        ObjectTransferToPrev,
        End,
    ];
    TO_STRING: "ToString", code::TO_STRING, P_TERM => [
        ComputationalData,
        Typecheck(Ty::Buffer),
        Operand,
        Target,
        ObjectAllocTyped(Ty::String),
        InvokeHandler,
        StoreToTargetIndirect { target: 2, source: 3 },
        ObjectTransferToPrev,
        End,
    ];
    MID: "Mid", code::MID, P_TERM => [
        ComputationalData, Operand, Operand, Target,
        ObjectAllocTyped(Ty::Buffer),
        InvokeHandler,
        StoreToTargetIndirect { target: 3, source: 4 },
        ObjectTransferToPrev,
        End,
    ];

    // Literal composites.
    BUFFER: "Buffer", code::BUFFER, P_TERM => [
        TrackedPkgLen,
        Operand,
        RecordAmlPc,
        ObjectAllocTyped(Ty::Buffer),
        InvokeHandler,
        ObjectTransferToPrev,
        End,
    ];
    PACKAGE: "Package", code::PACKAGE, P_TERM => [
        TrackedPkgLen,
        LoadImm(1),
        IfHasData { skip: 3 },
        RecordAmlPc,
        TermArgOrNamedObjectOrUnresolved,
        Jmp(2),
        ObjectAllocTyped(Ty::Package),
        InvokeHandler,
        ObjectTransferToPrev,
        End,
    ];
    VAR_PACKAGE: "VarPackage", code::VAR_PACKAGE, P_TERM => [
        TrackedPkgLen,
        Operand,
        IfHasData { skip: 3 },
        RecordAmlPc,
        TermArgOrNamedObjectOrUnresolved,
        Jmp(2),
        ObjectAllocTyped(Ty::Package),
        InvokeHandler,
        ObjectTransferToPrev,
        End,
    ];

    // Declarations.
    NAME: "Name", code::NAME, P_NONE => [
        CreateNameString,
        TermArgUnwrapInternal,
        ObjectConvertToDeepCopy,
        InvokeHandler,
        InstallNamespaceNode(0),
        End,
    ];
    ALIAS: "Alias", code::ALIAS, P_NONE =>
        [ExistingNameString, CreateNameString, InvokeHandler, InstallNamespaceNode(1), End];
    METHOD: "Method", code::METHOD, P_NONE => [
        TrackedPkgLen,
        CreateNameString,
        LoadImm(1),
        RecordAmlPc,
        ObjectAllocTyped(Ty::Method),
        InvokeHandler,
        InstallNamespaceNode(1),
        End,
    ];
    MUTEX: "Mutex", code::MUTEX, P_NONE =>
        [CreateNameString, LoadImm(1), ObjectAllocTyped(Ty::Mutex), InvokeHandler, InstallNamespaceNode(0), End];
    OP_REGION: "OperationRegion", code::OP_REGION, P_NONE => [
        CreateNameString,
        LoadImm(1),
        Operand,
        Operand,
        ObjectAllocTyped(Ty::OperationRegion),
        InvokeHandler,
        InstallNamespaceNode(0),
        End,
    ];
    // Region fields are an external collaborator's concern; the declaration
    // parses and skips so the decoder stays in sync.
    FIELD: "Field", code::FIELD, P_NONE =>
        [TrackedPkgLen, ExistingNameString, LoadImm(1), InvokeHandler, End];
    CREATE_BIT_FIELD: "CreateBitField", code::CREATE_BIT_FIELD, P_NONE => [
        TermArgUnwrapInternal,
        Typecheck(Ty::Buffer),
        Operand,
        CreateNameString,
        ObjectAllocTyped(Ty::BufferField),
        InvokeHandler,
        InstallNamespaceNode(2),
        End,
    ];
    CREATE_BYTE_FIELD: "CreateByteField", code::CREATE_BYTE_FIELD, P_NONE => [
        TermArgUnwrapInternal,
        Typecheck(Ty::Buffer),
        Operand,
        CreateNameString,
        ObjectAllocTyped(Ty::BufferField),
        InvokeHandler,
        InstallNamespaceNode(2),
        End,
    ];
    CREATE_WORD_FIELD: "CreateWordField", code::CREATE_WORD_FIELD, P_NONE => [
        TermArgUnwrapInternal,
        Typecheck(Ty::Buffer),
        Operand,
        CreateNameString,
        ObjectAllocTyped(Ty::BufferField),
        InvokeHandler,
        InstallNamespaceNode(2),
        End,
    ];
    CREATE_DWORD_FIELD: "CreateDWordField", code::CREATE_DWORD_FIELD, P_NONE => [
        TermArgUnwrapInternal,
        Typecheck(Ty::Buffer),
        Operand,
        CreateNameString,
        ObjectAllocTyped(Ty::BufferField),
        InvokeHandler,
        InstallNamespaceNode(2),
        End,
    ];
    CREATE_QWORD_FIELD: "CreateQWordField", code::CREATE_QWORD_FIELD, P_NONE => [
        TermArgUnwrapInternal,
        Typecheck(Ty::Buffer),
        Operand,
        CreateNameString,
        ObjectAllocTyped(Ty::BufferField),
        InvokeHandler,
        InstallNamespaceNode(2),
        End,
    ];
    CREATE_FIELD: "CreateField", code::CREATE_FIELD, P_NONE => [
        TermArgUnwrapInternal,
        Typecheck(Ty::Buffer),
        Operand,
        Operand,
        CreateNameString,
        ObjectAllocTyped(Ty::BufferField),
        InvokeHandler,
        InstallNamespaceNode(3),
        End,
    ];
    EXTERNAL: "External", code::EXTERNAL, P_NONE =>
        [ExistingNameStringOrNull, LoadImm(1), LoadImm(1), End];

    // Scopes and control flow.
    SCOPE: "Scope", code::SCOPE, P_NONE =>
        [PkgLen, ExistingNameString, InvokeHandler, End];
    DEVICE: "Device", code::DEVICE, P_NONE =>
        [PkgLen, CreateNameString, ObjectAllocTyped(Ty::Device), InvokeHandler, InstallNamespaceNode(1), End];
    PROCESSOR: "Processor", code::PROCESSOR, P_NONE => [
        PkgLen,
        CreateNameString,
        LoadImm(1),
        LoadImm(4),
        LoadImm(1),
        ObjectAllocTyped(Ty::Processor),
        InvokeHandler,
        InstallNamespaceNode(1),
        End,
    ];
    POWER_RES: "PowerResource", code::POWER_RES, P_NONE => [
        PkgLen,
        CreateNameString,
        LoadImm(1),
        LoadImm(2),
        ObjectAllocTyped(Ty::PowerResource),
        InvokeHandler,
        InstallNamespaceNode(1),
        End,
    ];
    THERMAL_ZONE: "ThermalZone", code::THERMAL_ZONE, P_NONE =>
        [PkgLen, CreateNameString, ObjectAllocTyped(Ty::ThermalZone), InvokeHandler, InstallNamespaceNode(1), End];
    IF: "If", code::IF, P_NONE => [PkgLen, Operand, InvokeHandler, End];
    ELSE: "Else", code::ELSE, P_NONE => [PkgLen, InvokeHandler, End];
    WHILE: "While", code::WHILE, P_NONE => [PkgLen, Operand, InvokeHandler, End];
    BREAK: "Break", code::BREAK, P_NONE => [InvokeHandler, End];
    CONTINUE: "Continue", code::CONTINUE, P_NONE => [InvokeHandler, End];
    RETURN: "Return", code::RETURN, P_NONE => [TermArgUnwrapInternal, InvokeHandler, End];
    NOOP: "Noop", code::NOOP, P_NONE => [End];
    BREAK_POINT: "BreakPoint", code::BREAK_POINT, P_NONE => [End];

    // Synchronization and events.
    ACQUIRE: "Acquire", code::ACQUIRE, P_TERM =>
        [SuperName, LoadImm(2), ObjectAllocTyped(Ty::Integer), InvokeHandler, ObjectTransferToPrev, End];
    RELEASE: "Release", code::RELEASE, P_NONE => [SuperName, InvokeHandler, End];
    NOTIFY: "Notify", code::NOTIFY, P_NONE => [SuperName, Operand, InvokeHandler, End];

    // Recognized but unimplemented.
    CONCAT_RES: "ConcatRes", code::CONCAT_RES, P_TERM => [Todo];
    MATCH: "Match", code::MATCH, P_TERM => [Todo];
    EVENT: "Event", code::EVENT, P_NONE => [Todo];
    SIGNAL: "Signal", code::SIGNAL, P_NONE => [Todo];
    WAIT: "Wait", code::WAIT, P_TERM => [Todo];
    RESET: "Reset", code::RESET, P_NONE => [Todo];
    SLEEP: "Sleep", code::SLEEP, P_NONE => [Todo];
    STALL: "Stall", code::STALL, P_NONE => [Todo];
    FATAL: "Fatal", code::FATAL, P_NONE => [Todo];
    LOAD: "Load", code::LOAD, P_NONE => [Todo];
    UNLOAD: "Unload", code::UNLOAD, P_NONE => [Todo];
    LOAD_TABLE: "LoadTable", code::LOAD_TABLE, P_TERM => [Todo];
    FROM_BCD: "FromBCD", code::FROM_BCD, P_TERM => [Todo];
    TO_BCD: "ToBCD", code::TO_BCD, P_TERM => [Todo];
    DATA_REGION: "DataRegion", code::DATA_REGION, P_NONE => [Todo];
    INDEX_FIELD: "IndexField", code::INDEX_FIELD, P_NONE => [Todo];
    BANK_FIELD: "BankField", code::BANK_FIELD, P_NONE => [Todo];
}

/// Catalog lookup. `None` means a reserved or unknown opcode, which is a
/// hard bytecode error.
pub fn lookup(op: u16) -> Option<&'static OpSpec> {
    if op <= 0xFF && is_name_start(op as u8) {
        return Some(&NAME_STRING);
    }

    Some(match op {
        code::ZERO => &ZERO,
        code::ONE => &ONE,
        code::ONES => &ONES,
        code::BYTE_PREFIX => &BYTE_PREFIX,
        code::WORD_PREFIX => &WORD_PREFIX,
        code::DWORD_PREFIX => &DWORD_PREFIX,
        code::QWORD_PREFIX => &QWORD_PREFIX,
        code::STRING_PREFIX => &STRING_PREFIX,
        code::REVISION => &REVISION,
        code::DEBUG => &DEBUG,

        code::LOCAL0..=code::LOCAL7 => &LOCAL,
        code::ARG0..=code::ARG6 => &ARG,

        code::STORE => &STORE,
        code::COPY_OBJECT => &COPY_OBJECT,
        code::REF_OF => &REF_OF,
        code::DEREF_OF => &DEREF_OF,
        code::COND_REF_OF => &COND_REF_OF,
        code::INDEX => &INDEX,

        code::ADD => &ADD,
        code::SUBTRACT => &SUBTRACT,
        code::MULTIPLY => &MULTIPLY,
        code::DIVIDE => &DIVIDE,
        code::SHIFT_LEFT => &SHIFT_LEFT,
        code::SHIFT_RIGHT => &SHIFT_RIGHT,
        code::AND => &AND,
        code::NAND => &NAND,
        code::OR => &OR,
        code::NOR => &NOR,
        code::XOR => &XOR,
        code::MOD => &MOD,
        code::NOT => &NOT,
        code::FIND_SET_LEFT_BIT => &FIND_SET_LEFT_BIT,
        code::FIND_SET_RIGHT_BIT => &FIND_SET_RIGHT_BIT,
        code::INCREMENT => &INCREMENT,
        code::DECREMENT => &DECREMENT,

        code::LNOT => &LNOT,
        code::LAND => &LAND,
        code::LOR => &LOR,
        code::LEQUAL => &LEQUAL,
        code::LGREATER => &LGREATER,
        code::LLESS => &LLESS,

        code::SIZE_OF => &SIZE_OF,
        code::OBJECT_TYPE => &OBJECT_TYPE,
        code::TIMER => &TIMER,

        code::CONCAT => &CONCAT,
        code::TO_INTEGER => &TO_INTEGER,
        code::TO_BUFFER => &TO_BUFFER,
        code::TO_DECIMAL_STRING => &TO_DECIMAL_STRING,
        code::TO_HEX_STRING => &TO_HEX_STRING,
        code::TO_STRING => &TO_STRING,
        code::MID => &MID,

        code::BUFFER => &BUFFER,
        code::PACKAGE => &PACKAGE,
        code::VAR_PACKAGE => &VAR_PACKAGE,

        code::NAME => &NAME,
        code::ALIAS => &ALIAS,
        code::METHOD => &METHOD,
        code::MUTEX => &MUTEX,
        code::OP_REGION => &OP_REGION,
        code::FIELD => &FIELD,
        code::CREATE_BIT_FIELD => &CREATE_BIT_FIELD,
        code::CREATE_BYTE_FIELD => &CREATE_BYTE_FIELD,
        code::CREATE_WORD_FIELD => &CREATE_WORD_FIELD,
        code::CREATE_DWORD_FIELD => &CREATE_DWORD_FIELD,
        code::CREATE_QWORD_FIELD => &CREATE_QWORD_FIELD,
        code::CREATE_FIELD => &CREATE_FIELD,
        code::EXTERNAL => &EXTERNAL,

        code::SCOPE => &SCOPE,
        code::DEVICE => &DEVICE,
        code::PROCESSOR => &PROCESSOR,
        code::POWER_RES => &POWER_RES,
        code::THERMAL_ZONE => &THERMAL_ZONE,
        code::IF => &IF,
        code::ELSE => &ELSE,
        code::WHILE => &WHILE,
        code::BREAK => &BREAK,
        code::CONTINUE => &CONTINUE,
        code::RETURN => &RETURN,
        code::NOOP => &NOOP,
        code::BREAK_POINT => &BREAK_POINT,

        code::ACQUIRE => &ACQUIRE,
        code::RELEASE => &RELEASE,
        code::NOTIFY => &NOTIFY,

        code::CONCAT_RES => &CONCAT_RES,
        code::MATCH => &MATCH,
        code::EVENT => &EVENT,
        code::SIGNAL => &SIGNAL,
        code::WAIT => &WAIT,
        code::RESET => &RESET,
        code::SLEEP => &SLEEP,
        code::STALL => &STALL,
        code::FATAL => &FATAL,
        code::LOAD => &LOAD,
        code::UNLOAD => &UNLOAD,
        code::LOAD_TABLE => &LOAD_TABLE,
        code::FROM_BCD => &FROM_BCD,
        code::TO_BCD => &TO_BCD,
        code::DATA_REGION => &DATA_REGION,
        code::INDEX_FIELD => &INDEX_FIELD,
        code::BANK_FIELD => &BANK_FIELD,

        code::INTERNAL_NAMED_OBJECT => &NAMED_OBJECT,
        code::INTERNAL_NAME_STRING => &NAME_STRING,
        code::INTERNAL_READ_FIELD_AS_INTEGER => &READ_FIELD_AS_INTEGER,
        code::INTERNAL_READ_FIELD_AS_BUFFER => &READ_FIELD_AS_BUFFER,
        code::INTERNAL_METHOD_CALL0 => &METHOD_CALL0,
        c if c == code::INTERNAL_METHOD_CALL0 + 1 => &METHOD_CALL1,
        c if c == code::INTERNAL_METHOD_CALL0 + 2 => &METHOD_CALL2,
        c if c == code::INTERNAL_METHOD_CALL0 + 3 => &METHOD_CALL3,
        c if c == code::INTERNAL_METHOD_CALL0 + 4 => &METHOD_CALL4,
        c if c == code::INTERNAL_METHOD_CALL0 + 5 => &METHOD_CALL5,
        c if c == code::INTERNAL_METHOD_CALL0 + 6 => &METHOD_CALL6,
        code::INTERNAL_METHOD_CALL7 => &METHOD_CALL7,

        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_start_bytes_resolve_to_the_namestring_op() {
        for byte in [0x2Eu8, 0x2F, b'A', b'Z', b'_', b'\\', b'^'] {
            let spec = lookup(byte as u16).unwrap();
            assert_eq!(spec.code, code::INTERNAL_NAME_STRING);
        }
    }

    #[test]
    fn reserved_codes_are_rejected() {
        assert!(lookup(0x02).is_none());
        assert!(lookup(0x5BFF).is_none());
        assert!(lookup(0xB0).is_none());
    }

    #[test]
    fn every_program_terminates() {
        // Every reachable opcode ends in End or a diagnostic sink.
        for op in 0u16..=0x5BFF {
            if let Some(spec) = lookup(op) {
                let last = spec.program.last().unwrap();
                assert!(
                    matches!(last, ParseOp::End | ParseOp::Todo | ParseOp::BadOpcode | ParseOp::Unreachable),
                    "op {} has a fall-through program",
                    spec.name
                );
            }
        }
    }
}
