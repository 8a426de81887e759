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
fn while_accumulates() {
    // Local0 = 0; Local1 = 0;
    // While (LLess (Local0, 5)) { Local1 += Local0; Local0 += 1 }
    // Return (Local1)
    let asm = Asm::new()
        .op(0x70)
        .int(0)
        .local(0)
        .op(0x70)
        .int(0)
        .local(1)
        .while_op(
            Asm::new().op(0x95).local(0).int(5),
            Asm::new()
                .op(0x72)
                .local(1)
                .local(0)
                .local(1)
                .op(0x72)
                .local(0)
                .int(1)
                .local(0),
        )
        .ret(Asm::new().local(1));

    assert_eq!(eval_int(asm), 10);
}

#[test]
fn break_leaves_the_loop() {
    // Local0 = 0;
    // While (One) { If (LEqual (Local0, 3)) { Break }; Local0 += 1 }
    // Return (Local0)
    let asm = Asm::new()
        .op(0x70)
        .int(0)
        .local(0)
        .while_op(
            Asm::new().int(1),
            Asm::new()
                .if_op(
                    Asm::new().op(0x93).local(0).int(3),
                    Asm::new().op(0xA5),
                )
                .op(0x72)
                .local(0)
                .int(1)
                .local(0),
        )
        .ret(Asm::new().local(0));

    assert_eq!(eval_int(asm), 3);
}

#[test]
fn continue_skips_the_tail() {
    // Count odd numbers below 10 by skipping evens.
    // Local0 = counter, Local1 = odd count.
    let asm = Asm::new()
        .op(0x70)
        .int(0)
        .local(0)
        .op(0x70)
        .int(0)
        .local(1)
        .while_op(
            Asm::new().op(0x95).local(0).int(10),
            Asm::new()
                .op(0x72)
                .local(0)
                .int(1)
                .local(0)
                // If (LEqual (Mod (Local0, 2), 0)) { Continue }
                .if_op(
                    Asm::new().op(0x93).op(0x85).local(0).int(2).null_target().int(0),
                    Asm::new().op(0x9F),
                )
                .op(0x72)
                .local(1)
                .int(1)
                .local(1),
        )
        .ret(Asm::new().local(1));

    assert_eq!(eval_int(asm), 5);
}

#[test]
fn break_outside_a_loop_is_bad_bytecode() {
    let asm = Asm::new().op(0xA5);
    let mut vm = Interpreter::new(NullHost::default());
    let err = vm.load(&asm.build()).unwrap_err();
    assert_eq!(err.status(), Status::BadBytecode);
}

#[test]
fn method_call_squares_its_argument() {
    // Method (FOO_, 1) { Return (Multiply (Arg0, Arg0)) }
    // Return (FOO_ (7))
    let asm = Asm::new()
        .method(
            "FOO_",
            1,
            Asm::new().ret(Asm::new().op(0x77).arg(0).arg(0).null_target()),
        )
        .ret(Asm::new().name("FOO_").int(7));

    assert_eq!(eval_int(asm), 49);
}

#[test]
fn methods_nest() {
    // DBL_ (n) = n * 2; QUAD (n) = DBL_ (DBL_ (n)); Return (QUAD (5))
    let asm = Asm::new()
        .method(
            "DBL_",
            1,
            Asm::new().ret(Asm::new().op(0x77).arg(0).int(2).null_target()),
        )
        .method(
            "QUAD",
            1,
            Asm::new().ret(Asm::new().name("DBL_").name("DBL_").arg(0)),
        )
        .ret(Asm::new().name("QUAD").int(5));

    assert_eq!(eval_int(asm), 20);
}

#[test]
fn method_without_return_yields_nothing() {
    let asm = Asm::new()
        .method("NOP_", 0, Asm::new().op(0x70).int(1).local(0))
        .name("NOP_");
    assert!(eval(asm).is_none());
}

#[test]
fn method_locals_are_private() {
    // The callee clobbers its Local0; the caller's survives.
    let asm = Asm::new()
        .method("CLOB", 0, Asm::new().op(0x70).int(99).local(0))
        .op(0x70)
        .int(5)
        .local(0)
        .name("CLOB")
        .ret(Asm::new().local(0));

    assert_eq!(eval_int(asm), 5);
}

#[test]
fn arguments_pass_by_reference_semantics() {
    // Method (SET_, 1) { Store (42, Arg0) } — storing into an Arg that
    // holds a reference overwrites the referenced object.
    let asm = Asm::new()
        .method("SET_", 1, Asm::new().op(0x70).int(42).arg(0))
        .op(0x70)
        .int(0)
        .local(0)
        .name("SET_")
        .op(0x71)
        .local(0)
        .ret(Asm::new().op(0x83).local(0));

    assert_eq!(eval_int(asm), 42);
}

#[test]
fn scopes_shape_name_resolution() {
    // Device (DEV0) { Name (VAL_, 7) }
    // Return (\DEV0.VAL_)
    let asm = Asm::new()
        .ext_op(0x82)
        .pkg(Asm::new().name("DEV0").name_decl("VAL_", Asm::new().int(7)))
        .ret(Asm::new().name("\\DEV0.VAL_"));

    assert_eq!(eval_int(asm), 7);
}

#[test]
fn upsearch_finds_ancestor_names() {
    // Name (GLOB, 11)
    // Device (DEV0) { Method (GET_, 0) { Return (GLOB) } }
    // Return (\DEV0.GET_ ())
    let asm = Asm::new()
        .name_decl("GLOB", Asm::new().int(11))
        .ext_op(0x82)
        .pkg(
            Asm::new()
                .name("DEV0")
                .method("GET_", 0, Asm::new().ret(Asm::new().name("GLOB"))),
        )
        .ret(Asm::new().name("\\DEV0.GET_"));

    assert_eq!(eval_int(asm), 11);
}

#[test]
fn nested_while_break_only_exits_inner() {
    // Local0 counts outer iterations, Local1 total inner breaks.
    // While (LLess (Local0, 3)) {
    //   While (One) { Break }
    //   Local0 += 1
    // }
    let asm = Asm::new()
        .op(0x70)
        .int(0)
        .local(0)
        .while_op(
            Asm::new().op(0x95).local(0).int(3),
            Asm::new()
                .while_op(Asm::new().int(1), Asm::new().op(0xA5))
                .op(0x72)
                .local(0)
                .int(1)
                .local(0),
        )
        .ret(Asm::new().local(0));

    assert_eq!(eval_int(asm), 3);
}

#[test]
fn evaluate_checks_argument_count() {
    use std::rc::Rc;

    let body = Asm::new().ret(Asm::new().arg(0)).build();
    let method = Rc::new(Method::new(body, 1));

    let mut vm = Interpreter::new(NullHost::default());
    let root = vm.namespace().root();
    let err = vm.evaluate(&root, &method, &[]).unwrap_err();
    assert_eq!(err.status(), Status::InvalidArgument);
}
