//! Wire-format integration tests driven through hand-written schemas.

use bytes::Bytes;
use hex_literal::hex;
use graphbuf::{io, BufferedOutput, GraphbufError, Input, Output, Result};
use graphbuf::schema::Schema;

// --- MOCK DATA STRUCTURES ---

#[derive(Debug, Default, Clone, PartialEq)]
struct Scalars {
    int32: i32,
    uint32: u32,
    sint32: i32,
    fixed32: u32,
    float: f32,
    int64: i64,
    uint64: u64,
    sint64: i64,
    fixed64: u64,
    double: f64,
    boolean: bool,
    text: String,
    blob: Bytes,
}

struct ScalarsSchema;

impl Schema<Scalars> for ScalarsSchema {
    fn message_name(&self) -> &'static str {
        "Scalars"
    }

    fn new_message(&self) -> Scalars {
        Scalars::default()
    }

    fn is_initialized(&self, _message: &Scalars) -> bool {
        true
    }

    fn write_to<O: Output>(&self, output: &mut O, message: &Scalars) -> Result<()> {
        output.write_int32(1, message.int32, false)?;
        output.write_uint32(2, message.uint32, false)?;
        output.write_sint32(3, message.sint32, false)?;
        output.write_fixed32(4, message.fixed32, false)?;
        output.write_float(5, message.float, false)?;
        output.write_int64(6, message.int64, false)?;
        output.write_uint64(7, message.uint64, false)?;
        output.write_sint64(8, message.sint64, false)?;
        output.write_fixed64(9, message.fixed64, false)?;
        output.write_double(10, message.double, false)?;
        output.write_bool(11, message.boolean, false)?;
        output.write_string(12, &message.text, false)?;
        output.write_bytes(13, &message.blob, false)?;
        Ok(())
    }

    fn merge_from<I: Input>(&self, input: &mut I, message: &mut Scalars) -> Result<()> {
        loop {
            let tag = input.read_tag()?;
            if tag == 0 {
                return Ok(());
            }
            match tag >> 3 {
                1 => message.int32 = input.read_int32()?,
                2 => message.uint32 = input.read_uint32()?,
                3 => message.sint32 = input.read_sint32()?,
                4 => message.fixed32 = input.read_fixed32()?,
                5 => message.float = input.read_float()?,
                6 => message.int64 = input.read_int64()?,
                7 => message.uint64 = input.read_uint64()?,
                8 => message.sint64 = input.read_sint64()?,
                9 => message.fixed64 = input.read_fixed64()?,
                10 => message.double = input.read_double()?,
                11 => message.boolean = input.read_bool()?,
                12 => message.text = input.read_string()?,
                13 => message.blob = input.read_bytes()?,
                _ => input.skip_field(tag)?,
            }
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
struct Leaf {
    value: i32,
}

struct LeafSchema;

impl Schema<Leaf> for LeafSchema {
    fn message_name(&self) -> &'static str {
        "Leaf"
    }

    fn new_message(&self) -> Leaf {
        Leaf::default()
    }

    fn is_initialized(&self, _message: &Leaf) -> bool {
        true
    }

    fn write_to<O: Output>(&self, output: &mut O, message: &Leaf) -> Result<()> {
        if message.value != 0 {
            output.write_int32(1, message.value, false)?;
        }
        Ok(())
    }

    fn merge_from<I: Input>(&self, input: &mut I, message: &mut Leaf) -> Result<()> {
        loop {
            let tag = input.read_tag()?;
            if tag == 0 {
                return Ok(());
            }
            match tag >> 3 {
                1 => message.value = input.read_int32()?,
                _ => input.skip_field(tag)?,
            }
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
struct Mid {
    leaf: Leaf,
    tag: u32,
}

struct MidSchema;

impl Schema<Mid> for MidSchema {
    fn message_name(&self) -> &'static str {
        "Mid"
    }

    fn new_message(&self) -> Mid {
        Mid::default()
    }

    fn is_initialized(&self, _message: &Mid) -> bool {
        true
    }

    fn write_to<O: Output>(&self, output: &mut O, message: &Mid) -> Result<()> {
        output.write_message(1, &message.leaf, &LeafSchema, false)?;
        if message.tag != 0 {
            output.write_uint32(2, message.tag, false)?;
        }
        Ok(())
    }

    fn merge_from<I: Input>(&self, input: &mut I, message: &mut Mid) -> Result<()> {
        loop {
            let tag = input.read_tag()?;
            if tag == 0 {
                return Ok(());
            }
            match tag >> 3 {
                1 => input.merge_message(&mut message.leaf, &LeafSchema)?,
                2 => message.tag = input.read_uint32()?,
                _ => input.skip_field(tag)?,
            }
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
struct Outer {
    mid: Mid,
}

struct OuterSchema;

impl Schema<Outer> for OuterSchema {
    fn message_name(&self) -> &'static str {
        "Outer"
    }

    fn new_message(&self) -> Outer {
        Outer::default()
    }

    fn is_initialized(&self, _message: &Outer) -> bool {
        true
    }

    fn write_to<O: Output>(&self, output: &mut O, message: &Outer) -> Result<()> {
        output.write_message(1, &message.mid, &MidSchema, false)
    }

    fn merge_from<I: Input>(&self, input: &mut I, message: &mut Outer) -> Result<()> {
        loop {
            let tag = input.read_tag()?;
            if tag == 0 {
                return Ok(());
            }
            match tag >> 3 {
                1 => input.merge_message(&mut message.mid, &MidSchema)?,
                _ => input.skip_field(tag)?,
            }
        }
    }
}

fn roundtrip(message: &Scalars) -> Scalars {
    let bytes = io::to_vec(message, &ScalarsSchema).expect("encode");
    let mut restored = Scalars::default();
    io::merge_from(&bytes, &mut restored, &ScalarsSchema).expect("decode");
    restored
}

// --- TESTS ---

#[test]
fn scalar_extremes_roundtrip() {
    for value in [0i32, 1, -1, i32::MIN, i32::MAX] {
        let message = Scalars {
            int32: value,
            sint32: value,
            ..Scalars::default()
        };
        assert_eq!(roundtrip(&message), message);
    }
    for value in [0i64, 1, -1, i64::MIN, i64::MAX] {
        let message = Scalars {
            int64: value,
            sint64: value,
            ..Scalars::default()
        };
        assert_eq!(roundtrip(&message), message);
    }
    let message = Scalars {
        uint32: u32::MAX,
        fixed32: u32::MAX,
        uint64: u64::MAX,
        fixed64: u64::MAX,
        boolean: true,
        float: f32::MIN_POSITIVE,
        double: -f64::MAX,
        text: "déjà vu".to_owned(),
        blob: Bytes::from_static(&[0, 0xff, 0x80]),
        ..Scalars::default()
    };
    assert_eq!(roundtrip(&message), message);
}

#[test]
fn negative_int32_is_sign_extended_to_ten_bytes() {
    let message = Scalars {
        int32: -1,
        ..Scalars::default()
    };
    let bytes = io::to_vec(&message, &ScalarsSchema).expect("encode");
    // field 1 varint tag, then ten bytes of sign extension
    assert_eq!(
        &bytes[..11],
        hex!("08 ffffffffffffffffff01")
    );
    // a reader treating the value as 64-bit sign-extended agrees
    let mut restored = Scalars::default();
    io::merge_from(&bytes, &mut restored, &ScalarsSchema).expect("decode");
    assert_eq!(restored.int32, -1);
}

#[test]
fn float_bits_travel_raw() {
    let message = Scalars {
        float: -0.0,
        double: f64::NEG_INFINITY,
        ..Scalars::default()
    };
    let restored = roundtrip(&message);
    assert_eq!(restored.float.to_bits(), (-0.0f32).to_bits());
    assert_eq!(restored.double, f64::NEG_INFINITY);
}

#[test]
fn three_levels_of_nesting_carry_exact_length_prefixes() {
    let message = Outer {
        mid: Mid {
            leaf: Leaf { value: 150 },
            tag: 1,
        },
    };
    let bytes = io::to_vec(&message, &OuterSchema).expect("encode");
    // outer: field 1, 7 bytes; mid: field 1, 3 bytes + field 2;
    // leaf: field 1 = 150
    assert_eq!(bytes, hex!("0a 07 0a 03 08 9601 10 01"));

    let mut restored = Outer::default();
    io::merge_from(&bytes, &mut restored, &OuterSchema).expect("decode");
    assert_eq!(restored, message);
}

#[test]
fn empty_nested_message_has_zero_length_prefix() {
    let message = Outer::default();
    let bytes = io::to_vec(&message, &OuterSchema).expect("encode");
    // mid is present but empty, its leaf likewise
    assert_eq!(bytes, hex!("0a 02 0a 00"));
    let mut restored = Outer::default();
    io::merge_from(&bytes, &mut restored, &OuterSchema).expect("decode");
    assert_eq!(restored, message);
}

#[test]
fn unknown_fields_between_recognized_ones_are_skipped() {
    // encode with field numbers the Leaf schema does not know
    let mut buffer = BufferedOutput::new();
    buffer.write_int32(1, 41, false).expect("write");
    buffer.write_string(50, "future", false).expect("write");
    buffer.write_fixed64(51, 0xdead_beef, false).expect("write");
    buffer.write_fixed32(52, 7, false).expect("write");
    buffer.write_uint64(53, 1 << 60, false).expect("write");
    buffer.write_int32(1, 42, false).expect("write");
    let bytes = buffer.to_vec().expect("finalize");

    let mut restored = Leaf::default();
    io::merge_from(&bytes, &mut restored, &LeafSchema).expect("decode");
    // the later recognized field still lands after the unknown span
    assert_eq!(restored.value, 42);
}

#[test]
fn unknown_wire_type_is_rejected() {
    // field 2 (unknown to the schema), wire type 3 (group start, unsupported)
    let err = {
        let mut restored = Leaf::default();
        io::merge_from(&[0x13], &mut restored, &LeafSchema).unwrap_err()
    };
    assert!(matches!(err, GraphbufError::UnknownWireType(3)));
}

#[test]
fn truncated_nested_message_is_detected() {
    // outer declares 7 bytes but only 3 follow
    let err = {
        let mut restored = Outer::default();
        io::merge_from(&hex!("0a 07 0a 03 08"), &mut restored, &OuterSchema).unwrap_err()
    };
    assert!(matches!(err, GraphbufError::Truncated));
}

#[test]
fn inner_length_cannot_escape_outer_bound() {
    // outer frame of 2 bytes, inner claims 5
    let err = {
        let mut restored = Outer::default();
        io::merge_from(&hex!("0a 02 0a 05 08 01 08 01"), &mut restored, &OuterSchema)
            .unwrap_err()
    };
    assert!(matches!(err, GraphbufError::Truncated));
}

#[test]
fn large_payload_survives_splice_and_chain_finalize() {
    let blob = Bytes::from((0..10_000u32).map(|i| i as u8).collect::<Vec<u8>>());
    let message = Scalars {
        blob: blob.clone(),
        text: "x".repeat(1000),
        ..Scalars::default()
    };
    let restored = roundtrip(&message);
    assert_eq!(restored.blob, blob);
    assert_eq!(restored.text, message.text);
}
