//! Integer arithmetic and logic handlers.

use tracing::warn;

use crate::error::Status;
use crate::host::Host;
use crate::interpreter::Evaluation;
use crate::object::{bottom_object, Object, ObjectRef};
use crate::opcode::code;

impl<'a, H: Host> Evaluation<'a, H> {
    /// Binary math: items are (operand, operand, target, result), with
    /// `Divide` carrying a second target and result for the remainder.
    pub(crate) fn handle_binary_math(&mut self) -> Result<(), Status> {
        let op = self.cur_op();
        let opcode = op.code;
        let lhs = op.int_at(0)?;
        let rhs = op.int_at(1)?;

        if opcode == code::DIVIDE {
            let remainder_obj = op.obj(4)?;
            let quotient_obj = op.obj(5)?;

            let (quotient, remainder) = if rhs == 0 {
                warn!("attempted division by zero");
                (0, 0)
            } else {
                (lhs / rhs, lhs % rhs)
            };
            *remainder_obj.borrow_mut() = Object::Integer(remainder);
            *quotient_obj.borrow_mut() = Object::Integer(quotient);
            return Ok(());
        }

        let max_shift = if self.rev1 { 31 } else { 63 };
        let result = match opcode {
            code::ADD => lhs.wrapping_add(rhs),
            code::SUBTRACT => lhs.wrapping_sub(rhs),
            code::MULTIPLY => lhs.wrapping_mul(rhs),
            code::SHIFT_LEFT if rhs <= max_shift => lhs << rhs,
            code::SHIFT_RIGHT if rhs <= max_shift => lhs >> rhs,
            // Shifts by at least the integer width come out zero.
            code::SHIFT_LEFT | code::SHIFT_RIGHT => 0,
            code::AND => lhs & rhs,
            code::NAND => !(lhs & rhs),
            code::OR => lhs | rhs,
            code::NOR => !(lhs | rhs),
            code::XOR => lhs ^ rhs,
            code::MOD => {
                if rhs == 0 {
                    warn!("attempted division by zero");
                    0
                } else {
                    lhs % rhs
                }
            }
            _ => return Err(Status::InvalidArgument),
        };

        *op.obj(3)?.borrow_mut() = Object::Integer(result);
        Ok(())
    }

    /// `Not`, `FindSetLeftBit`, `FindSetRightBit`: (operand, target,
    /// result).
    pub(crate) fn handle_unary_math(&mut self) -> Result<(), Status> {
        let op = self.cur_op();
        let value = op.int_at(0)?;

        let result = match op.code {
            code::NOT => self.truncate_if_needed(!value),
            // One-based index of the highest/lowest set bit; zero when no
            // bit is set.
            code::FIND_SET_LEFT_BIT => (64 - value.leading_zeros()) as u64,
            code::FIND_SET_RIGHT_BIT => {
                if value == 0 {
                    0
                } else {
                    (value.trailing_zeros() + 1) as u64
                }
            }
            _ => return Err(Status::InvalidArgument),
        };

        *op.obj(2)?.borrow_mut() = Object::Integer(result);
        Ok(())
    }

    /// `Increment`/`Decrement` mutate the implicitly dereferenced Integer
    /// in place.
    pub(crate) fn handle_inc_dec(&mut self) -> Result<(), Status> {
        let op = self.cur_op();
        let target = op.obj(0)?;
        let delta: i64 = if op.code == code::INCREMENT { 1 } else { -1 };

        let value = target.borrow().as_integer()?;
        let value = self.truncate_if_needed(value.wrapping_add_signed(delta));
        *target.borrow_mut() = Object::Integer(value);
        Ok(())
    }

    /// `LNot`: `Ones` when the operand is zero, `0` otherwise.
    pub(crate) fn handle_logical_not(&mut self) -> Result<(), Status> {
        let op = self.cur_op();
        let value = op.int_at(0)?;
        let result = if value == 0 { self.ones() } else { 0 };
        *op.obj(1)?.borrow_mut() = Object::Integer(result);
        Ok(())
    }

    /// `LEqual`/`LLess`/`LGreater` require same-typed operands and compare
    /// strings and buffers bytewise with length as the tiebreak.
    /// `LAnd`/`LOr` coerce each operand through its first 4 bytes, the way
    /// the dominant OS does.
    pub(crate) fn handle_binary_logic(&mut self) -> Result<(), Status> {
        let op = self.cur_op();
        let opcode = op.code;
        let lhs = op.obj(0)?;
        let rhs = op.obj(1)?;
        let dst = op.obj(2)?;

        let truth = match opcode {
            code::LEQUAL | code::LLESS | code::LGREATER => {
                if lhs.borrow().type_of() != rhs.borrow().type_of() {
                    return Err(Status::BadBytecode);
                }
                let ordering = logical_compare(&lhs, &rhs)?;
                match opcode {
                    code::LEQUAL => ordering == std::cmp::Ordering::Equal,
                    code::LLESS => ordering == std::cmp::Ordering::Less,
                    _ => ordering == std::cmp::Ordering::Greater,
                }
            }
            code::LAND => self.object_to_integer(&lhs, 4)? != 0 && self.object_to_integer(&rhs, 4)? != 0,
            code::LOR => self.object_to_integer(&lhs, 4)? != 0 || self.object_to_integer(&rhs, 4)? != 0,
            _ => return Err(Status::InvalidArgument),
        };

        *dst.borrow_mut() = Object::Integer(if truth { self.ones() } else { 0 });
        Ok(())
    }

    /// `SizeOf`: byte length of strings (terminator excluded) and buffers,
    /// element count of packages; references unwrap first.
    pub(crate) fn handle_sizeof(&mut self) -> Result<(), Status> {
        let op = self.cur_op();
        let mut src = op.obj(0)?;
        let dst = op.obj(1)?;

        if matches!(&*src.borrow(), Object::Reference(_)) {
            src = bottom_object(&src);
        }

        let size = match &*src.borrow() {
            Object::String(text) => text.borrow().bytes.len() as u64,
            Object::Buffer(data) => data.borrow().len() as u64,
            Object::Package(elements) => elements.borrow().len() as u64,
            other => {
                warn!(
                    "invalid argument for SizeOf: {}, expected String/Buffer/Package",
                    other.type_of()
                );
                return Err(Status::BadBytecode);
            }
        };

        *dst.borrow_mut() = Object::Integer(size);
        Ok(())
    }

    /// `ObjectType`: numeric tag of the referenced object; buffer indices
    /// report as buffer fields.
    pub(crate) fn handle_object_type(&mut self) -> Result<(), Status> {
        let op = self.cur_op();
        let mut src = op.obj(0)?;
        let dst = op.obj(1)?;

        if matches!(&*src.borrow(), Object::Reference(_)) {
            src = bottom_object(&src);
        }

        let mut tag = src.borrow().type_of();
        if tag == crate::object::ObjectType::BufferIndex {
            tag = crate::object::ObjectType::BufferField;
        }

        *dst.borrow_mut() = Object::Integer(tag as u64);
        Ok(())
    }
}

/// Ordering of two same-typed computational operands.
fn logical_compare(lhs: &ObjectRef, rhs: &ObjectRef) -> Result<std::cmp::Ordering, Status> {
    let lhs = lhs.borrow();
    let rhs = rhs.borrow();
    match (&*lhs, &*rhs) {
        (Object::Integer(a), Object::Integer(b)) => Ok(a.cmp(b)),
        (Object::String(a), Object::String(b)) => Ok(a.borrow().bytes.cmp(&b.borrow().bytes)),
        (Object::Buffer(a), Object::Buffer(b)) => Ok(a.borrow().cmp(&*b.borrow())),
        _ => Err(Status::BadBytecode),
    }
}
