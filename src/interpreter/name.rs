//! NameString and PkgLength decoding, and name resolution against the
//! namespace.

use crate::consts::{DUAL_NAME_PREFIX, MULTI_NAME_PREFIX, NAME_SEG_LEN, NULL_NAME, PARENT_CHAR, ROOT_CHAR};
use crate::error::Status;
use crate::host::Host;
use crate::interpreter::{CallFrame, Evaluation};
use crate::namespace::{NameSeg, NodeRef};

/// Decode a PkgLength at the frame cursor. The recorded `(begin, end)`
/// range is relative to the start of the PkgLength field itself; the
/// length counts the lead-byte run as part of the span.
///
/// Layout: the lead byte's top two bits give the follow-byte count (0-3).
/// With no follow bytes the low six bits are the length; otherwise the low
/// four bits form the low nibble and the follow bytes stack little-endian
/// above it.
pub(crate) fn parse_package_length(frame: &mut CallFrame) -> Result<(usize, usize), Status> {
    let begin = frame.code_offset;

    if !frame.has_code() {
        return Err(Status::BadBytecode);
    }
    let lead = frame.code()[begin];
    let follow = (lead >> 6) as usize;

    if frame.bytes_left() < 1 + follow {
        return Err(Status::BadBytecode);
    }

    let size = if follow == 0 {
        (lead & 0b11_1111) as usize
    } else {
        let mut size = (lead & 0b1111) as usize;
        for i in 0..follow {
            size |= (frame.code()[begin + 1 + i] as usize) << (4 + 8 * i);
        }
        size
    };

    frame.code_offset += 1 + follow;
    Ok((begin, begin + size))
}

/// Prefix run of a NameString: one `\`, or any number of `^`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NamePrefix {
    None,
    Root,
    Parents(usize),
}

/// Decoded NameString: the prefix, the segments, and how many code bytes
/// the encoding occupied.
#[derive(Debug)]
pub(crate) struct NameString {
    pub(crate) prefix: NamePrefix,
    pub(crate) segments: Vec<NameSeg>,
    pub(crate) encoded_len: usize,
}

impl NameString {
    /// Single unprefixed segment, subject to the ancestor search rule.
    pub(crate) fn is_plain_single(&self) -> bool {
        self.prefix == NamePrefix::None && self.segments.len() == 1
    }

    /// Textual rendering (`\FOO.BAR`, `^^BAZ`, …) for diagnostics and for
    /// the lazy path strings package initializers stash.
    pub(crate) fn to_path(&self) -> String {
        let mut out = String::new();
        match self.prefix {
            NamePrefix::None => {}
            NamePrefix::Root => out.push('\\'),
            NamePrefix::Parents(n) => out.extend(std::iter::repeat('^').take(n)),
        }
        let mut first = true;
        for seg in &self.segments {
            if !first {
                out.push('.');
            }
            out.push_str(&seg.to_string());
            first = false;
        }
        out
    }
}

/// Decode a NameString at `offset` without touching any cursor.
///
/// Grammar: an optional prefix run (one `\` XOR any number of `^`), then
/// NullName, DualNamePrefix + 2 segments, MultiNamePrefix + count +
/// segments, or a single segment. `\` after `^` is invalid.
pub(crate) fn parse_name_string(code: &[u8], offset: usize) -> Result<NameString, Status> {
    let mut at = offset;
    let mut prefix = NamePrefix::None;

    loop {
        let byte = *code.get(at).ok_or(Status::BadBytecode)?;
        match byte {
            ROOT_CHAR => {
                if prefix != NamePrefix::None {
                    return Err(Status::BadBytecode);
                }
                prefix = NamePrefix::Root;
                at += 1;
                break;
            }
            PARENT_CHAR => {
                prefix = match prefix {
                    NamePrefix::None => NamePrefix::Parents(1),
                    NamePrefix::Parents(n) => NamePrefix::Parents(n + 1),
                    NamePrefix::Root => return Err(Status::BadBytecode),
                };
                at += 1;
            }
            _ => break,
        }
    }

    let lead = *code.get(at).ok_or(Status::BadBytecode)?;
    let seg_count = match lead {
        NULL_NAME => {
            at += 1;
            0
        }
        DUAL_NAME_PREFIX => {
            at += 1;
            2
        }
        MULTI_NAME_PREFIX => {
            at += 1;
            let count = *code.get(at).ok_or(Status::BadBytecode)? as usize;
            at += 1;
            count
        }
        // Might be an invalid byte; segment validation below decides.
        _ => 1,
    };

    if code.len().saturating_sub(at) < seg_count * NAME_SEG_LEN {
        return Err(Status::BadBytecode);
    }

    let mut segments = Vec::with_capacity(seg_count);
    for _ in 0..seg_count {
        let raw: [u8; 4] = code[at..at + NAME_SEG_LEN].try_into().expect("sliced to length");
        segments.push(NameSeg::new(raw)?);
        at += NAME_SEG_LEN;
    }

    Ok(NameString {
        prefix,
        segments,
        encoded_len: at - offset,
    })
}

/// How a NameString is matched against the namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ResolveBehavior {
    /// All but the last segment must exist; the last must not. Yields a
    /// fresh node parented but not installed.
    CreateLast,
    /// Every segment must exist; a lone unprefixed segment searches
    /// ancestors toward the root.
    Resolve,
}

impl<'a, H: Host> Evaluation<'a, H> {
    /// Decode the NameString at the frame cursor and resolve it. The
    /// cursor always advances past the whole encoding, including on
    /// `NotFound`, so callers that tolerate unresolved names keep parsing
    /// in sync.
    pub(crate) fn resolve_name_string(&mut self, behavior: ResolveBehavior) -> Result<NodeRef, Status> {
        let frame = self.frame();
        let name = parse_name_string(frame.code(), frame.code_offset)?;
        let scope = frame.cur_scope.clone();
        self.frame_mut().code_offset += name.encoded_len;

        let mut cursor = match name.prefix {
            NamePrefix::None => scope,
            NamePrefix::Root => self.ns.root(),
            NamePrefix::Parents(count) => {
                let mut cursor = scope;
                for _ in 0..count {
                    if self.ns.is_root(&cursor) {
                        return Err(Status::BadBytecode);
                    }
                    let parent = cursor.borrow().parent().ok_or(Status::BadBytecode)?;
                    cursor = parent;
                }
                cursor
            }
        };

        if name.segments.is_empty() {
            // A bare NullName names nothing; with a prefix it names the
            // prefix-walked scope itself.
            if behavior == ResolveBehavior::CreateLast || name.prefix == NamePrefix::None {
                return Err(Status::BadBytecode);
            }
            return Ok(cursor);
        }

        if behavior == ResolveBehavior::Resolve && name.is_plain_single() {
            return self
                .ns
                .search_upward(&cursor, name.segments[0])
                .ok_or(Status::NotFound);
        }

        let (walk, last) = name.segments.split_at(name.segments.len() - 1);
        for seg in walk {
            cursor = self.ns.child(&cursor, *seg).ok_or(Status::NotFound)?;
        }

        let last = last[0];
        match behavior {
            ResolveBehavior::Resolve => self.ns.child(&cursor, last).ok_or(Status::NotFound),
            ResolveBehavior::CreateLast => {
                if self.ns.child(&cursor, last).is_some() {
                    return Err(Status::AlreadyExists);
                }
                Ok(self.ns.alloc(&cursor, last))
            }
        }
    }

    /// Path text of the NameString at `offset`, for error messages and
    /// lazy package paths.
    pub(crate) fn name_string_path_at(&self, offset: usize) -> Result<String, Status> {
        let frame = self.frame();
        Ok(parse_name_string(frame.code(), offset)?.to_path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Method;
    use std::rc::Rc;

    fn frame_over(bytes: &[u8]) -> CallFrame {
        let method = Rc::new(Method::new(bytes.to_vec(), 0));
        let ns = crate::namespace::Namespace::new();
        CallFrame::new(method, ns.root())
    }

    #[test]
    fn one_byte_package_length() {
        let mut frame = frame_over(&[0x2A, 0xFF]);
        let (begin, end) = parse_package_length(&mut frame).unwrap();
        assert_eq!((begin, end), (0, 0x2A));
        assert_eq!(frame.code_offset, 1);
    }

    #[test]
    fn multi_byte_package_length() {
        // Two follow bytes: low nibble 0x4, then 0x23, 0x01.
        let mut frame = frame_over(&[0x84, 0x23, 0x01]);
        let (begin, end) = parse_package_length(&mut frame).unwrap();
        assert_eq!(begin, 0);
        assert_eq!(end, (0x01 << 12) | (0x23 << 4) | 0x4);
        assert_eq!(frame.code_offset, 3);
    }

    #[test]
    fn truncated_package_length_is_rejected() {
        let mut frame = frame_over(&[0xC4]);
        assert_eq!(parse_package_length(&mut frame), Err(Status::BadBytecode));
    }

    #[test]
    fn parses_prefixed_names() {
        let name = parse_name_string(b"\\_SB_", 0).unwrap();
        assert_eq!(name.prefix, NamePrefix::Root);
        assert_eq!(name.segments.len(), 1);
        assert_eq!(name.encoded_len, 5);
        assert_eq!(name.to_path(), "\\_SB_");

        let name = parse_name_string(b"^^FOO0", 0).unwrap();
        assert_eq!(name.prefix, NamePrefix::Parents(2));
        assert_eq!(name.to_path(), "^^FOO0");
    }

    #[test]
    fn parses_dual_and_multi_names() {
        let mut bytes = vec![DUAL_NAME_PREFIX];
        bytes.extend_from_slice(b"_SB_PCI0");
        let name = parse_name_string(&bytes, 0).unwrap();
        assert_eq!(name.segments.len(), 2);
        assert_eq!(name.to_path(), "_SB_.PCI0");

        let mut bytes = vec![MULTI_NAME_PREFIX, 3];
        bytes.extend_from_slice(b"_SB_PCI0ISA_");
        let name = parse_name_string(&bytes, 0).unwrap();
        assert_eq!(name.segments.len(), 3);
        assert_eq!(name.encoded_len, 14);
    }

    #[test]
    fn root_after_parent_is_invalid() {
        assert!(parse_name_string(b"^\\FOO0", 0).is_err());
    }

    #[test]
    fn invalid_segment_characters_are_rejected() {
        assert!(parse_name_string(b"1BAD", 0).is_err());
        assert!(parse_name_string(b"ab cd", 0).is_err());
    }
}
