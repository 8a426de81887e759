//! Conversions between the computational types, plus `Concatenate`, `Mid`
//! and the `To*` operator family.

use itertools::Itertools;
use tracing::warn;

use crate::error::Status;
use crate::host::Host;
use crate::interpreter::Evaluation;
use crate::object::{Object, ObjectRef};
use crate::opcode::code;

use super::store::warn_invalid_operand;

impl<'a, H: Host> Evaluation<'a, H> {
    /// Coerce a computational object to an integer. Buffers contribute at
    /// most `max_buffer_bytes` little-endian bytes; strings parse as
    /// decimal, or hex behind a `0x` prefix; anything else reads as zero.
    pub(crate) fn object_to_integer(&self, obj: &ObjectRef, max_buffer_bytes: usize) -> Result<u64, Status> {
        let value = match &*obj.borrow() {
            Object::Integer(value) => *value,
            Object::Buffer(data) => {
                let data = data.borrow();
                let take = max_buffer_bytes.min(data.len()).min(8);
                let mut raw = [0u8; 8];
                raw[..take].copy_from_slice(&data[..take]);
                u64::from_le_bytes(raw)
            }
            Object::String(text) => parse_integer_prefix(&text.borrow().bytes),
            _ => 0,
        };
        Ok(value)
    }

    /// `ToInteger`, `ToBuffer`, `ToDecimalString`, `ToHexString`:
    /// items are (source, target, result).
    pub(crate) fn handle_to(&mut self) -> Result<(), Status> {
        let op = self.cur_op();
        let opcode = op.code;
        let src = op.obj(0)?;
        let dst = op.obj(2)?;

        match opcode {
            code::TO_INTEGER => {
                // The dominant OS takes the first 8 buffer bytes even under
                // revision 1.
                let value = self.object_to_integer(&src, 8)?;
                *dst.borrow_mut() = Object::Integer(value);
            }
            code::TO_HEX_STRING | code::TO_DECIMAL_STRING => {
                let hex = opcode == code::TO_HEX_STRING;
                let rendered = match &*src.borrow() {
                    Object::Integer(value) => integer_to_string(*value, hex),
                    Object::Buffer(data) => {
                        let data = data.borrow();
                        if data.is_empty() {
                            Vec::new()
                        } else {
                            buffer_to_string(&data, hex)
                        }
                    }
                    // String to string is a plain copy.
                    Object::String(text) => text.borrow().bytes.clone(),
                    _ => return Err(Status::BadBytecode),
                };
                *dst.borrow_mut() = Object::string_from(rendered);
            }
            code::TO_BUFFER => {
                let bytes = self.read_storage(&src, true)?;
                *dst.borrow_mut() = Object::buffer(bytes);
            }
            _ => return Err(Status::InvalidArgument),
        }

        Ok(())
    }

    /// `ToString(buffer, length, target)`: items are (source, length,
    /// target, result). Takes at most `length` bytes, stopping at the
    /// first NUL.
    pub(crate) fn handle_to_string(&mut self) -> Result<(), Status> {
        let op = self.cur_op();
        let src = op.obj(0)?;
        let requested = op.int_at(1)? as usize;
        let dst = op.obj(3)?;

        let data = match &*src.borrow() {
            Object::Buffer(data) => data.clone(),
            _ => return Err(Status::BadBytecode),
        };
        let data = data.borrow();

        let len = requested.min(data.len());
        let len = data[..len].iter().position(|&b| b == 0).unwrap_or(len);

        *dst.borrow_mut() = Object::string_from(data[..len].to_vec());
        Ok(())
    }

    /// `Mid(source, index, length, target)`: items are (source, index,
    /// length, target, result). Out-of-range slices come back empty in the
    /// source's type.
    pub(crate) fn handle_mid(&mut self) -> Result<(), Status> {
        let op = self.cur_op();
        let src = op.obj(0)?;
        let index = op.int_at(1)? as usize;
        let length = op.int_at(2)? as usize;
        let dst = op.obj(4)?;

        let is_string = match src.borrow().type_of() {
            crate::object::ObjectType::String => true,
            crate::object::ObjectType::Buffer => false,
            _ => {
                warn_invalid_operand(op.spec.name, &src, "String/Buffer");
                return Err(Status::BadBytecode);
            }
        };

        let bytes = self.read_storage(&src, false)?;
        let slice = if index >= bytes.len() {
            Vec::new()
        } else {
            bytes[index..(index + length).min(bytes.len())].to_vec()
        };

        *dst.borrow_mut() = if is_string {
            Object::string_from(slice)
        } else {
            Object::buffer(slice)
        };
        Ok(())
    }

    /// `Concatenate`: dispatched on the first operand's type. Integer
    /// operands emit a buffer of two revision-width integers; buffers do a
    /// byte concat; strings render the second operand to text, rejecting
    /// buffers the way the dominant OS does.
    pub(crate) fn handle_concatenate(&mut self) -> Result<(), Status> {
        let op = self.cur_op();
        let lhs = op.obj(0)?;
        let rhs = op.obj(1)?;
        let dst = op.obj(3)?;

        enum First {
            Integer(u64),
            Buffer(Vec<u8>),
            String(Vec<u8>),
        }

        let first = match &*lhs.borrow() {
            Object::Integer(value) => First::Integer(*value),
            Object::Buffer(data) => First::Buffer(data.borrow().clone()),
            Object::String(text) => First::String(text.borrow().bytes.clone()),
            _ => return Err(Status::InvalidArgument),
        };

        match first {
            First::Integer(value) => {
                let width = self.sizeof_int();
                let mut out = Vec::with_capacity(width * 2);
                out.extend_from_slice(&value.to_le_bytes()[..width]);
                let rhs_int = self.object_to_integer(&rhs, 8)?;
                out.extend_from_slice(&rhs_int.to_le_bytes()[..width]);
                *dst.borrow_mut() = Object::buffer(out);
            }
            First::Buffer(mut out) => {
                out.extend_from_slice(&self.read_storage(&rhs, true)?);
                *dst.borrow_mut() = Object::buffer(out);
            }
            First::String(mut out) => {
                match &*rhs.borrow() {
                    Object::Integer(value) => {
                        out.extend_from_slice(format!("{value:x}").as_bytes());
                    }
                    Object::String(text) => out.extend_from_slice(&text.borrow().bytes),
                    // The dominant OS rejects String || Buffer; so do we.
                    _ => {
                        warn!("unsupported Concatenate operand for a string prefix");
                        return Err(Status::InvalidArgument);
                    }
                }
                *dst.borrow_mut() = Object::string_from(out);
            }
        }

        Ok(())
    }
}

/// Leading-prefix integer parse: optional `0x` selects hex, otherwise
/// decimal; parsing stops at the first foreign character.
fn parse_integer_prefix(bytes: &[u8]) -> u64 {
    let text = bytes.strip_prefix(b" ").unwrap_or(bytes);
    let (digits, radix) = match text.strip_prefix(b"0x").or_else(|| text.strip_prefix(b"0X")) {
        Some(rest) => (rest, 16u64),
        None => (text, 10u64),
    };

    let mut value: u64 = 0;
    for &b in digits {
        let digit = match b {
            b'0'..=b'9' => (b - b'0') as u64,
            b'a'..=b'f' if radix == 16 => (b - b'a' + 10) as u64,
            b'A'..=b'F' if radix == 16 => (b - b'A' + 10) as u64,
            _ => break,
        };
        value = value.wrapping_mul(radix).wrapping_add(digit);
    }
    value
}

fn integer_to_string(value: u64, hex: bool) -> Vec<u8> {
    if hex {
        format!("0x{value:X}").into_bytes()
    } else {
        format!("{value}").into_bytes()
    }
}

/// Comma-separated per-byte rendering, `0x%02X` or `%d` per byte.
fn buffer_to_string(bytes: &[u8], hex: bool) -> Vec<u8> {
    let rendered = if hex {
        bytes.iter().map(|b| format!("0x{b:02X}")).join(",")
    } else {
        bytes.iter().map(|b| format!("{b}")).join(",")
    };
    rendered.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_rendering() {
        assert_eq!(integer_to_string(16, true), b"0x10".to_vec());
        assert_eq!(integer_to_string(255, false), b"255".to_vec());
    }

    #[test]
    fn buffer_rendering() {
        assert_eq!(buffer_to_string(&[0, 16, 255], true), b"0x00,0x10,0xFF".to_vec());
        assert_eq!(buffer_to_string(&[0, 16, 255], false), b"0,16,255".to_vec());
    }

    #[test]
    fn string_to_integer_prefixes() {
        assert_eq!(parse_integer_prefix(b"0x10"), 16);
        assert_eq!(parse_integer_prefix(b"123abc"), 123);
        assert_eq!(parse_integer_prefix(b"abc"), 0);
    }
}
