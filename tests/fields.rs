use aml_vm::prelude::*;
use quickcheck_macros::quickcheck;

fn eval_int(asm: Asm) -> u64 {
    let mut vm = Interpreter::new(NullHost::default());
    let ret = vm.load(&asm.build()).expect("evaluation failed").expect("no return value");
    let value = ret.borrow().as_integer().expect("return value is not an integer");
    value
}

#[test]
fn word_field_reads_little_endian() {
    // Name (BUF_, Buffer (4) { 0x11, 0x22, 0x33, 0x44 })
    // CreateWordField (BUF_, 1, WRD_)
    // Return (WRD_)
    let asm = Asm::new()
        .name_decl("BUF_", Asm::new().buffer(4, &[0x11, 0x22, 0x33, 0x44]))
        .op(0x8B)
        .name("BUF_")
        .int(1)
        .name("WRD_")
        .ret(Asm::new().name("WRD_"));

    assert_eq!(eval_int(asm), 0x3322);
}

#[test]
fn field_writes_land_in_the_backing_buffer() {
    let asm = Asm::new()
        .name_decl("BUF_", Asm::new().buffer(4, &[0, 0, 0, 0]))
        .op(0x8A)
        .name("BUF_")
        .int(0)
        .name("DWD_")
        .op(0x70)
        .int(0xA1B2_C3D4)
        .name("DWD_")
        .ret(Asm::new().op(0x83).op(0x88).name("BUF_").int(3).null_target());

    assert_eq!(eval_int(asm), 0xA1);
}

#[test]
fn bit_field_isolates_one_bit() {
    // CreateBitField (BUF_, 9, BIT_) over 0b0000_0010 in byte 1.
    let asm = Asm::new()
        .name_decl("BUF_", Asm::new().buffer(2, &[0x00, 0x02]))
        .op(0x8D)
        .name("BUF_")
        .int(9)
        .name("BIT_")
        .ret(Asm::new().name("BIT_"));
    assert_eq!(eval_int(asm), 1);
}

#[test]
fn create_field_spans_arbitrary_bits() {
    // CreateField (BUF_, 4, 8, FLD_): one byte straddling two bytes.
    let asm = Asm::new()
        .name_decl("BUF_", Asm::new().buffer(2, &[0xAB, 0xCD]))
        .ext_op(0x13)
        .name("BUF_")
        .int(4)
        .int(8)
        .name("FLD_")
        .ret(Asm::new().name("FLD_"));

    // CreateField always reads as a buffer; compare through Index.
    let mut vm = Interpreter::new(NullHost::default());
    let ret = vm.load(&asm.build()).unwrap().unwrap();
    match &*ret.borrow() {
        Object::Buffer(data) => assert_eq!(*data.borrow(), vec![0xDA]),
        other => panic!("expected a buffer, got {}", other.type_of()),
    };
}

#[test]
fn qword_field_from_wide_buffer() {
    let bytes = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09];
    let asm = Asm::new()
        .name_decl("BUF_", Asm::new().buffer(9, &bytes))
        .op(0x8F)
        .name("BUF_")
        .int(1)
        .name("QWD_")
        .ret(Asm::new().name("QWD_"));
    assert_eq!(eval_int(asm), 0x0908_0706_0504_0302);
}

#[test]
fn field_beyond_the_buffer_is_rejected() {
    let asm = Asm::new()
        .name_decl("BUF_", Asm::new().buffer(2, &[0, 0]))
        .op(0x8A)
        .name("BUF_")
        .int(1)
        .name("DWD_");
    let mut vm = Interpreter::new(NullHost::default());
    let err = vm.load(&asm.build()).unwrap_err();
    assert_eq!(err.status(), Status::BadBytecode);
}

#[test]
fn create_field_on_a_non_buffer_is_rejected() {
    let asm = Asm::new()
        .name_decl("VAL_", Asm::new().int(3))
        .op(0x8B)
        .name("VAL_")
        .int(0)
        .name("WRD_");
    let mut vm = Interpreter::new(NullHost::default());
    let err = vm.load(&asm.build()).unwrap_err();
    assert_eq!(err.status(), Status::BadBytecode);
}

/// Writing then reading any narrow field returns the written value masked
/// to the field width, without touching neighboring bits.
#[quickcheck]
fn narrow_field_write_read_round_trips(bit_index: u8, bit_length: u8, value: u64) -> bool {
    let bit_index = (bit_index % 96) as u64;
    let bit_length = (bit_length % 63 + 1) as u64;

    // Field must fit an integer read and the 16-byte buffer.
    if bit_index + bit_length > 16 * 8 {
        return true;
    }

    let asm = Asm::new()
        .name_decl("BUF_", Asm::new().buffer(16, &[]))
        .ext_op(0x13)
        .name("BUF_")
        .int(bit_index)
        .int(bit_length)
        .name("FLD_")
        .op(0x70)
        .int(value)
        .name("FLD_")
        .ret(Asm::new().op(0x99).name("FLD_").null_target());

    let mask = (1u64 << bit_length) - 1;
    eval_int(asm) == value & mask
}
