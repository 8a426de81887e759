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

fn eval_string(asm: Asm) -> String {
    let ret = eval(asm).expect("no return value");
    let text = match &*ret.borrow() {
        Object::String(text) => text.borrow().display(),
        other => panic!("expected a string, got {}", other.type_of()),
    };
    text
}

#[test]
fn named_integer_round_trips() {
    let asm = Asm::new()
        .name_decl("VAL_", Asm::new().int(1234))
        .ret(Asm::new().name("VAL_"));
    assert_eq!(eval_int(asm), 1234);
}

#[test]
fn store_through_named_object_casts_in_place() {
    let asm = Asm::new()
        .name_decl("VAL_", Asm::new().int(1))
        .op(0x70)
        .int(99)
        .name("VAL_")
        .ret(Asm::new().name("VAL_"));
    assert_eq!(eval_int(asm), 99);
}

#[test]
fn copy_object_through_package_index() {
    // Name (PKG_, Package (3) { 1, 2, 3 })
    // Store (Index (PKG_, 1), Local0)
    // CopyObject (99, Local0)
    // Return (DerefOf (Index (PKG_, 1)))
    let asm = Asm::new()
        .name_decl("PKG_", Asm::new().package(3, Asm::new().int(1).int(2).int(3)))
        .op(0x70)
        .op(0x88)
        .name("PKG_")
        .int(1)
        .null_target()
        .local(0)
        .op(0x9D)
        .int(99)
        .local(0)
        .ret(Asm::new().op(0x83).op(0x88).name("PKG_").int(1).null_target());

    assert_eq!(eval_int(asm), 99);
}

#[test]
fn package_self_reference_round_trip() {
    // Store (Package (2) { 7, 8 }, Local0)
    // Store (Index (Local0, 0), Local1)
    // CopyObject (42, Local1)
    // Return (DerefOf (Index (Local0, 0)))
    let asm = Asm::new()
        .op(0x70)
        .package(2, Asm::new().int(7).int(8))
        .local(0)
        .op(0x70)
        .op(0x88)
        .local(0)
        .int(0)
        .null_target()
        .local(1)
        .op(0x9D)
        .int(42)
        .local(1)
        .ret(Asm::new().op(0x83).op(0x88).local(0).int(0).null_target());

    assert_eq!(eval_int(asm), 42);
}

#[test]
fn store_into_package_slot_casts_in_place() {
    let asm = Asm::new()
        .name_decl("PKG_", Asm::new().package(2, Asm::new().int(5).int(6)))
        .op(0x70)
        .int(70)
        .op(0x88)
        .name("PKG_")
        .int(0)
        .null_target()
        .ret(Asm::new().op(0x83).op(0x88).name("PKG_").int(0).null_target());
    assert_eq!(eval_int(asm), 70);
}

#[test]
fn deref_unwinds_to_the_bottom() {
    // Store (5, Local0); RefOf chain two deep; DerefOf collapses all hops.
    let asm = Asm::new()
        .op(0x70)
        .int(5)
        .local(0)
        .op(0x70)
        .op(0x71)
        .local(0)
        .local(1)
        .op(0x70)
        .op(0x71)
        .local(1)
        .local(2)
        .ret(Asm::new().op(0x83).local(2));

    assert_eq!(eval_int(asm), 5);
}

#[test]
fn deref_of_buffer_index_reads_one_byte() {
    let asm = Asm::new()
        .name_decl("BUF_", Asm::new().buffer(4, &[0x11, 0x22, 0x33, 0x44]))
        .ret(Asm::new().op(0x83).op(0x88).name("BUF_").int(2).null_target());
    assert_eq!(eval_int(asm), 0x33);
}

#[test]
fn buffer_index_write_masks_to_a_byte() {
    // Store (0x1FF, Index (BUF_, 0)): only the low byte lands.
    let asm = Asm::new()
        .name_decl("BUF_", Asm::new().buffer(2, &[0, 0]))
        .op(0x70)
        .int(0x1FF)
        .op(0x88)
        .name("BUF_")
        .int(0)
        .null_target()
        .ret(Asm::new().op(0x83).op(0x88).name("BUF_").int(0).null_target());
    assert_eq!(eval_int(asm), 0xFF);
}

#[test]
fn index_out_of_bounds_is_rejected() {
    let asm = Asm::new()
        .name_decl("BUF_", Asm::new().buffer(2, &[1, 2]))
        .ret(Asm::new().op(0x83).op(0x88).name("BUF_").int(7).null_target());
    let mut vm = Interpreter::new(NullHost::default());
    let err = vm.load(&asm.build()).unwrap_err();
    assert_eq!(err.status(), Status::BadBytecode);
}

#[test]
fn sizeof_counts_the_right_units() {
    let asm = Asm::new()
        .name_decl("STR_", Asm::new().string("abc"))
        .ret(Asm::new().op(0x87).name("STR_"));
    assert_eq!(eval_int(asm), 3);

    let asm = Asm::new()
        .name_decl("BUF_", Asm::new().buffer(5, &[1, 2]))
        .ret(Asm::new().op(0x87).name("BUF_"));
    assert_eq!(eval_int(asm), 5);

    let asm = Asm::new()
        .name_decl("PKG_", Asm::new().package(3, Asm::new().int(1)))
        .ret(Asm::new().op(0x87).name("PKG_"));
    assert_eq!(eval_int(asm), 3);
}

#[test]
fn object_type_reports_variant_tags() {
    let cases: [(&str, Asm, u64); 3] = [
        ("integer", Asm::new().int(3), 1),
        ("string", Asm::new().string("x"), 2),
        ("buffer", Asm::new().buffer(1, &[0]), 3),
    ];
    for (what, value, tag) in cases {
        let asm = Asm::new()
            .name_decl("VAL_", value)
            .ret(Asm::new().op(0x8E).name("VAL_"));
        assert_eq!(eval_int(asm), tag, "ObjectType of {what}");
    }
}

#[test]
fn cond_ref_of_reports_missing_names() {
    // CondRefOf (MISS) is false and has no side effects.
    let asm = Asm::new().ret(Asm::new().ext_op(0x12).name("MISS").null_target());
    assert_eq!(eval_int(asm), 0);

    let asm = Asm::new()
        .name_decl("HIT_", Asm::new().int(5))
        .ret(Asm::new().ext_op(0x12).name("HIT_").null_target());
    assert_eq!(eval_int(asm), u64::MAX);
}

#[test]
fn cond_ref_of_stores_a_usable_reference() {
    let asm = Asm::new()
        .name_decl("HIT_", Asm::new().int(5))
        .ext_op(0x12)
        .name("HIT_")
        .local(0)
        .ret(Asm::new().op(0x83).local(0));
    assert_eq!(eval_int(asm), 5);
}

#[test]
fn to_hex_string_renders_with_prefix() {
    // Return (ToHexString (Add (15, 1)))
    let asm = Asm::new().ret(
        Asm::new()
            .op(0x98)
            .op(0x72)
            .int(15)
            .int(1)
            .null_target()
            .null_target(),
    );
    assert_eq!(eval_string(asm), "0x10");
}

#[test]
fn to_string_conversions() {
    let asm = Asm::new().ret(Asm::new().op(0x97).int(255).null_target());
    assert_eq!(eval_string(asm), "255");

    let asm = Asm::new()
        .name_decl("BUF_", Asm::new().buffer(3, &[0, 16, 255]))
        .ret(Asm::new().op(0x98).name("BUF_").null_target());
    assert_eq!(eval_string(asm), "0x00,0x10,0xFF");

    let asm = Asm::new()
        .name_decl("BUF_", Asm::new().buffer(3, &[0, 16, 255]))
        .ret(Asm::new().op(0x97).name("BUF_").null_target());
    assert_eq!(eval_string(asm), "0,16,255");
}

#[test]
fn to_integer_parses_both_radixes() {
    let asm = Asm::new().ret(Asm::new().op(0x99).string("0x2A").null_target());
    assert_eq!(eval_int(asm), 42);

    let asm = Asm::new().ret(Asm::new().op(0x99).string("42").null_target());
    assert_eq!(eval_int(asm), 42);
}

#[test]
fn concatenate_dispatches_on_first_operand() {
    // String || Integer renders lowercase hex.
    let asm = Asm::new().ret(Asm::new().op(0x73).string("id=").int(0xAB).null_target());
    assert_eq!(eval_string(asm), "id=ab");

    let asm = Asm::new().ret(Asm::new().op(0x73).string("ab").string("cd").null_target());
    assert_eq!(eval_string(asm), "abcd");
}

#[test]
fn concatenate_buffers_appends_bytes() {
    let asm = Asm::new()
        .op(0x70)
        .op(0x73)
        .buffer(2, &[1, 2])
        .buffer(2, &[3, 4])
        .null_target()
        .local(0)
        .ret(Asm::new().op(0x87).local(0));
    assert_eq!(eval_int(asm), 4);
}

#[test]
fn concatenate_string_with_buffer_is_refused() {
    let asm = Asm::new().ret(Asm::new().op(0x73).string("x").buffer(1, &[1]).null_target());
    let mut vm = Interpreter::new(NullHost::default());
    let err = vm.load(&asm.build()).unwrap_err();
    assert_eq!(err.status(), Status::InvalidArgument);
}

#[test]
fn mid_slices_strings_and_buffers() {
    let asm = Asm::new().ret(Asm::new().op(0x9E).string("abcdef").int(1).int(3).null_target());
    assert_eq!(eval_string(asm), "bcd");

    // Out-of-range index comes back empty.
    let asm = Asm::new().ret(Asm::new().op(0x9E).string("abc").int(9).int(2).null_target());
    assert_eq!(eval_string(asm), "");
}

#[test]
fn package_elements_may_forward_reference() {
    // Package { FWD_ } where FWD_ is declared later: the element is kept
    // as a lazily resolved path string.
    let asm = Asm::new()
        .name_decl("PKG_", Asm::new().package(1, Asm::new().name("FWD_")))
        .name_decl("FWD_", Asm::new().int(1))
        .ret(Asm::new().op(0x83).op(0x88).name("PKG_").int(0).null_target());

    let ret = eval(asm).expect("no return value");
    let text = match &*ret.borrow() {
        Object::String(text) => text.borrow().display(),
        other => panic!("expected a path string, got {}", other.type_of()),
    };
    assert_eq!(text, "FWD_");
}

#[test]
fn oversized_buffer_declarations_are_rejected() {
    let asm = Asm::new().ret(Asm::new().buffer(0xF000_0000, &[]));
    let mut vm = Interpreter::new(NullHost::default());
    let err = vm.load(&asm.build()).unwrap_err();
    assert_eq!(err.status(), Status::BadBytecode);
}

#[test]
fn buffer_tail_is_zero_filled() {
    let asm = Asm::new()
        .name_decl("BUF_", Asm::new().buffer(4, &[0xAA]))
        .ret(Asm::new().op(0x83).op(0x88).name("BUF_").int(3).null_target());
    assert_eq!(eval_int(asm), 0);
}

#[test]
fn copy_object_replaces_without_conversion() {
    // CopyObject (a string, VAL_) replaces the named integer wholesale.
    let asm = Asm::new()
        .name_decl("VAL_", Asm::new().int(1))
        .op(0x9D)
        .string("abc")
        .name("VAL_")
        .ret(Asm::new().op(0x8E).name("VAL_"));
    assert_eq!(eval_int(asm), 2);
}

#[test]
fn debug_store_is_side_effect_free() {
    let asm = Asm::new()
        .op(0x70)
        .int(42)
        .ext_op(0x31)
        .ret(Asm::new().int(1));
    assert_eq!(eval_int(asm), 1);
}

#[test]
fn timer_is_monotonic_under_the_null_host() {
    let asm = Asm::new().ret(Asm::new().ext_op(0x33));
    assert!(eval_int(asm) > 0);
}

#[test]
fn acquire_and_release_round_trip() {
    // Mutex (MUT_, 0); Acquire (MUT_, 0xFFFF) succeeds under NullHost.
    let asm = Asm::new()
        .ext_op(0x01)
        .name("MUT_")
        .byte(0)
        .op(0x70)
        .ext_op(0x23)
        .name("MUT_")
        .bytes(&0xFFFFu16.to_le_bytes())
        .local(0)
        .ext_op(0x27)
        .name("MUT_")
        .ret(Asm::new().local(0));
    assert_eq!(eval_int(asm), 0);
}

#[test]
fn unimplemented_opcodes_surface_as_such() {
    // DefEvent is recognized but not implemented.
    let asm = Asm::new().ext_op(0x02).name("EVT_");
    let mut vm = Interpreter::new(NullHost::default());
    let err = vm.load(&asm.build()).unwrap_err();
    assert_eq!(err.status(), Status::Unimplemented);
}

#[test]
fn reserved_opcodes_are_bad_bytecode() {
    let asm = Asm::new().op(0xB0);
    let mut vm = Interpreter::new(NullHost::default());
    let err = vm.load(&asm.build()).unwrap_err();
    assert_eq!(err.status(), Status::BadBytecode);
}

#[test]
fn returned_object_is_released_by_teardown() {
    let mut vm = Interpreter::new(NullHost::default());
    let ret = vm
        .load(&Asm::new().ret(Asm::new().buffer(2, &[1, 2])).build())
        .unwrap()
        .unwrap();

    // Teardown dropped every internal holder; the caller owns the result
    // alone.
    drop(vm);
    assert_eq!(std::rc::Rc::strong_count(&ret), 1);
}

#[test]
fn name_collision_is_reported() {
    let asm = Asm::new()
        .name_decl("DUP_", Asm::new().int(1))
        .name_decl("DUP_", Asm::new().int(2));
    let mut vm = Interpreter::new(NullHost::default());
    let err = vm.load(&asm.build()).unwrap_err();
    assert_eq!(err.status(), Status::AlreadyExists);
}
