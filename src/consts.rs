//! AML encoding constants and interpreter limits

/// Extended opcode prefix; a second byte follows and composes a 16-bit
/// opcode `0x5Bxx`.
pub const EXT_PREFIX: u8 = 0x5B;

/// NullName byte inside a NameString: zero name segments follow.
pub const NULL_NAME: u8 = 0x00;

/// DualNamePrefix: exactly two name segments follow.
pub const DUAL_NAME_PREFIX: u8 = 0x2E;

/// MultiNamePrefix: a segment-count byte and that many segments follow.
pub const MULTI_NAME_PREFIX: u8 = 0x2F;

/// Root prefix character in a NameString.
pub const ROOT_CHAR: u8 = b'\\';

/// Parent prefix character in a NameString.
pub const PARENT_CHAR: u8 = b'^';

/// Bytes per name segment.
pub const NAME_SEG_LEN: usize = 4;

/// Locals available to every control method.
pub const LOCAL_COUNT: usize = 8;

/// Arguments a control method may declare.
pub const ARG_COUNT: usize = 7;

/// Declared buffer or package sizes above this are treated as a corrupted
/// bytestream rather than honored.
pub const MAX_ALLOC_HINT: u64 = 0xE000_0000;

/// Value `RevisionOp` evaluates to.
pub const INTERPRETER_REVISION: u64 = 2;
