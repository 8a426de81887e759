use aml_vm::prelude::*;

fn eval(asm: Asm) -> Option<ObjectRef> {
    let mut vm = Interpreter::new(NullHost::default());
    vm.load(&asm.build()).expect("evaluation failed")
}

fn eval_int(asm: Asm) -> u64 {
    let ret = eval(asm).expect("no return value");
    let value = ret.borrow().as_integer().expect("return value is not an integer");
    value
}

#[test]
fn add_feeds_comparison_feeds_branch() {
    // If (LEqual (Add (1, 2), 3)) { Return (42) } Else { Return (0) }
    let asm = Asm::new()
        .if_op(
            Asm::new()
                .op(0x93)
                .op(0x72)
                .int(1)
                .int(2)
                .null_target()
                .int(3),
            Asm::new().ret(Asm::new().int(42)),
        )
        .else_op(Asm::new().ret(Asm::new().int(0)));

    assert_eq!(eval_int(asm), 42);
}

#[test]
fn else_taken_when_predicate_fails() {
    let asm = Asm::new()
        .if_op(
            Asm::new().op(0x93).int(1).int(2),
            Asm::new().ret(Asm::new().int(1)),
        )
        .else_op(Asm::new().ret(Asm::new().int(7)));

    assert_eq!(eval_int(asm), 7);
}

#[test]
fn subtract_multiply_mod() {
    // Return (Mod (Multiply (Subtract (10, 3), 6), 5)) == 42 % 5
    let asm = Asm::new().ret(
        Asm::new()
            .op(0x85)
            .op(0x77)
            .op(0x74)
            .int(10)
            .int(3)
            .null_target()
            .int(6)
            .null_target()
            .int(5)
            .null_target(),
    );
    assert_eq!(eval_int(asm), 2);
}

#[test]
fn divide_fills_remainder_then_quotient() {
    // Divide (17, 5, Local0, Local1): Local0 takes the remainder,
    // Local1 the quotient.
    let asm = Asm::new()
        .op(0x78)
        .int(17)
        .int(5)
        .local(0)
        .local(1)
        .ret(Asm::new().local(0));
    assert_eq!(eval_int(asm), 2);

    let asm = Asm::new()
        .op(0x78)
        .int(17)
        .int(5)
        .local(0)
        .local(1)
        .ret(Asm::new().local(1));
    assert_eq!(eval_int(asm), 3);
}

#[test]
fn divide_by_zero_warns_and_yields_zero() {
    let asm = Asm::new()
        .op(0x78)
        .int(17)
        .int(0)
        .local(0)
        .local(1)
        .ret(Asm::new().local(1));
    assert_eq!(eval_int(asm), 0);
}

#[test]
fn shifts_past_integer_width_clear() {
    // Return (ShiftLeft (1, 64))
    let asm = Asm::new().ret(Asm::new().op(0x79).int(1).int(64).null_target());
    assert_eq!(eval_int(asm), 0);

    let asm = Asm::new().ret(Asm::new().op(0x79).int(1).int(40).null_target());
    assert_eq!(eval_int(asm), 1 << 40);
}

#[test]
fn revision1_runs_32bit_math() {
    // Under a revision-1 table a shift by 40 exceeds the integer width.
    let asm = Asm::new().ret(Asm::new().op(0x79).int(1).int(40).null_target());
    let mut vm = Interpreter::with_revision(NullHost::default(), 1);
    let ret = vm.load(&asm.build()).unwrap().unwrap();
    let value = ret.borrow().as_integer().unwrap();
    assert_eq!(value, 0);
}

#[test]
fn revision1_truncates_arithmetic() {
    // 0xFFFF_FFFF + 1 wraps to zero at 32 bits.
    let asm = Asm::new().ret(Asm::new().op(0x72).int(0xFFFF_FFFF).int(1).null_target());
    let mut vm = Interpreter::with_revision(NullHost::default(), 1);
    let ret = vm.load(&asm.build()).unwrap().unwrap();
    let value = ret.borrow().as_integer().unwrap();
    assert_eq!(value, 0);
}

#[test]
fn nand_nor_xor_not() {
    let asm = Asm::new().ret(Asm::new().op(0x7C).int(0xFF).int(0x0F).null_target());
    assert_eq!(eval_int(asm), !0x0Fu64);

    let asm = Asm::new().ret(Asm::new().op(0x7E).int(0).int(0).null_target());
    assert_eq!(eval_int(asm), u64::MAX);

    let asm = Asm::new().ret(Asm::new().op(0x7F).int(0b1010).int(0b0110).null_target());
    assert_eq!(eval_int(asm), 0b1100);

    let asm = Asm::new().ret(Asm::new().op(0x80).int(0).null_target());
    assert_eq!(eval_int(asm), u64::MAX);
}

#[test]
fn find_set_bits_are_one_based() {
    let cases = [(0u64, 0u64, 0u64), (1, 1, 1), (0x80, 8, 8), (0x8001, 16, 1)];
    for (value, left, right) in cases {
        let asm = Asm::new().ret(Asm::new().op(0x81).int(value).null_target());
        assert_eq!(eval_int(asm), left, "FindSetLeftBit({value:#x})");

        let asm = Asm::new().ret(Asm::new().op(0x82).int(value).null_target());
        assert_eq!(eval_int(asm), right, "FindSetRightBit({value:#x})");
    }
}

#[test]
fn increment_and_decrement_mutate_in_place() {
    let asm = Asm::new()
        .op(0x70)
        .int(41)
        .local(0)
        .op(0x75)
        .local(0)
        .ret(Asm::new().local(0));
    assert_eq!(eval_int(asm), 42);

    let asm = Asm::new()
        .op(0x70)
        .int(43)
        .local(0)
        .op(0x76)
        .local(0)
        .ret(Asm::new().local(0));
    assert_eq!(eval_int(asm), 42);
}

#[test]
fn logical_operators_return_ones_or_zero() {
    // LNot (0)
    let asm = Asm::new().ret(Asm::new().op(0x92).int(0));
    assert_eq!(eval_int(asm), u64::MAX);

    // LAnd (1, 0)
    let asm = Asm::new().ret(Asm::new().op(0x90).int(1).int(0));
    assert_eq!(eval_int(asm), 0);

    // LOr (0, 5)
    let asm = Asm::new().ret(Asm::new().op(0x91).int(0).int(5));
    assert_eq!(eval_int(asm), u64::MAX);

    // LNotEqual is encoded as LNot + LEqual.
    let asm = Asm::new().ret(Asm::new().op(0x92).op(0x93).int(3).int(4));
    assert_eq!(eval_int(asm), u64::MAX);
}

#[test]
fn string_comparisons_are_bytewise() {
    let asm = Asm::new().ret(Asm::new().op(0x95).string("abc").string("abd"));
    assert_eq!(eval_int(asm), u64::MAX);

    // Length breaks the tie.
    let asm = Asm::new().ret(Asm::new().op(0x95).string("abc").string("abcd"));
    assert_eq!(eval_int(asm), u64::MAX);

    let asm = Asm::new().ret(Asm::new().op(0x93).string("abc").string("abc"));
    assert_eq!(eval_int(asm), u64::MAX);
}

#[test]
fn comparing_mismatched_types_is_rejected() {
    let asm = Asm::new().ret(Asm::new().op(0x93).string("abc").int(3));
    let mut vm = Interpreter::new(NullHost::default());
    let err = vm.load(&asm.build()).unwrap_err();
    assert_eq!(err.status(), Status::BadBytecode);
}
