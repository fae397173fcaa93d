//! Bitfield grouping and value checks.

use datalib::types::BitInfo;
use datalib::{Config, Context, ErrorCode, TypeId, Value};
use pretty_assertions::assert_eq;

const LIBRARY: &str = r#"{
    "types" : {
        "flags" : { "members" : [
            { "name" : "a", "type" : "bitfield:3" },
            { "name" : "b", "type" : "bitfield:3" },
            { "name" : "c", "type" : "bitfield:1" },
            { "name" : "d", "type" : "bitfield:1" },
            { "name" : "e", "type" : "bitfield:8" }
        ] },
        "tail" : { "members" : [
            { "name" : "a", "type" : "bitfield:3" },
            { "name" : "b", "type" : "bitfield:3" },
            { "name" : "c", "type" : "bitfield:1" },
            { "name" : "d", "type" : "bitfield:1" },
            { "name" : "e", "type" : "bitfield:8" },
            { "name" : "f", "type" : "bitfield:2" },
            { "name" : "g", "type" : "bitfield:5" },
            { "name" : "h", "type" : "bitfield:1" }
        ] },
        "straddle" : { "members" : [
            { "name" : "a", "type" : "bitfield", "bits" : 7 },
            { "name" : "b", "type" : "bitfield", "bits" : 3 }
        ] },
        "wide" : { "members" : [
            { "name" : "a", "type" : "bitfield:60" },
            { "name" : "b", "type" : "bitfield:8" },
            { "name" : "x", "type" : "uint8" },
            { "name" : "full", "type" : "bitfield:64" }
        ] }
    }
}"#;

fn context() -> Context {
    let mut ctx = Context::new(Config::new());
    ctx.load_txt_library(LIBRARY).unwrap();
    ctx
}

fn bit(ctx: &Context, type_name: &str, member: &str) -> BitInfo {
    let desc = ctx.library().find_type_by_name(type_name).unwrap();
    desc.member(member).unwrap().bit.unwrap()
}

#[test]
fn test_byte_group_layout() {
    let ctx = context();
    assert_eq!(bit(&ctx, "flags", "a"), BitInfo { bit_offset: 0, bits: 3, storage: 2 });
    assert_eq!(bit(&ctx, "flags", "b"), BitInfo { bit_offset: 3, bits: 3, storage: 2 });
    assert_eq!(bit(&ctx, "flags", "c"), BitInfo { bit_offset: 6, bits: 1, storage: 2 });
    assert_eq!(bit(&ctx, "flags", "d"), BitInfo { bit_offset: 7, bits: 1, storage: 2 });
    assert_eq!(bit(&ctx, "flags", "e"), BitInfo { bit_offset: 8, bits: 8, storage: 2 });

    let id = TypeId::from_name("flags");
    let value = Value::from_fields(vec![
        ("a", 5u8.into()),
        ("b", 2u8.into()),
        ("c", 1u8.into()),
        ("d", 0u8.into()),
        ("e", 0xabu8.into()),
    ]);
    let packed = ctx.store_to_vec(id, &value).unwrap();
    assert_eq!(&packed[16..], &[0x55, 0xab]);
    assert_eq!(ctx.decode(id, &packed).unwrap(), value);

    let loaded = ctx.load_to_vec(id, &packed).unwrap();
    assert_eq!(loaded.view(ctx.library()).unwrap().to_value().unwrap(), value);
}

#[test]
fn test_narrow_fields_after_full_byte() {
    let ctx = context();
    assert_eq!(bit(&ctx, "tail", "e"), BitInfo { bit_offset: 8, bits: 8, storage: 4 });
    assert_eq!(bit(&ctx, "tail", "f"), BitInfo { bit_offset: 16, bits: 2, storage: 4 });
    assert_eq!(bit(&ctx, "tail", "g"), BitInfo { bit_offset: 18, bits: 5, storage: 4 });
    assert_eq!(bit(&ctx, "tail", "h"), BitInfo { bit_offset: 23, bits: 1, storage: 4 });
    assert_eq!(ctx.library().find_type_by_name("tail").unwrap().sizes, [4, 4]);

    let id = TypeId::from_name("tail");
    let value = Value::from_fields(vec![
        ("a", 5u8.into()),
        ("b", 2u8.into()),
        ("c", 1u8.into()),
        ("d", 0u8.into()),
        ("e", 0xabu8.into()),
        ("f", 3u8.into()),
        ("g", 0x11u8.into()),
        ("h", 1u8.into()),
    ]);
    let packed = ctx.store_to_vec(id, &value).unwrap();
    // f = 0b11, g = 0b10001 << 2, h = 1 << 7
    assert_eq!(&packed[16..], &[0x55, 0xab, 0xc7, 0x00]);
    assert_eq!(ctx.decode(id, &packed).unwrap(), value);

    let loaded = ctx.load_to_vec(id, &packed).unwrap();
    let view = loaded.view(ctx.library()).unwrap();
    assert_eq!(view.get("g").unwrap(), Value::UInt(0x11));
    assert_eq!(view.to_value().unwrap(), value);

    let text = ctx.unpack_text(id, &packed).unwrap();
    assert_eq!(ctx.pack_text_to_vec(&text).unwrap(), packed);
}

#[test]
fn test_straddling_field_moves_to_next_byte() {
    let ctx = context();
    assert_eq!(bit(&ctx, "straddle", "b"), BitInfo { bit_offset: 8, bits: 3, storage: 2 });

    let id = TypeId::from_name("straddle");
    let value = Value::from_fields(vec![("a", 0x7fu8.into()), ("b", 5u8.into())]);
    let packed = ctx.store_to_vec(id, &value).unwrap();
    assert_eq!(&packed[16..], &[0x7f, 0x05]);
    assert_eq!(ctx.decode(id, &packed).unwrap(), value);
}

#[test]
fn test_group_split_past_64_bits() {
    let ctx = context();
    assert_eq!(bit(&ctx, "wide", "a"), BitInfo { bit_offset: 0, bits: 60, storage: 8 });
    assert_eq!(bit(&ctx, "wide", "b"), BitInfo { bit_offset: 0, bits: 8, storage: 1 });
    assert_eq!(bit(&ctx, "wide", "full"), BitInfo { bit_offset: 0, bits: 64, storage: 8 });

    let id = TypeId::from_name("wide");
    let value = Value::from_fields(vec![
        ("a", Value::UInt((1 << 60) - 1)),
        ("b", 0x81u8.into()),
        ("x", 7u8.into()),
        ("full", Value::UInt(u64::MAX)),
    ]);
    let packed = ctx.store_to_vec(id, &value).unwrap();
    assert_eq!(ctx.decode(id, &packed).unwrap(), value);
    let loaded = ctx.load_to_vec(id, &packed).unwrap();
    assert_eq!(loaded.view(ctx.library()).unwrap().get("full").unwrap(), Value::UInt(u64::MAX));
}

#[test]
fn test_value_wider_than_field() {
    let ctx = context();
    let id = TypeId::from_name("flags");
    let value = Value::from_fields(vec![
        ("a", 8u8.into()),
        ("b", 0u8.into()),
        ("c", 0u8.into()),
        ("d", 0u8.into()),
        ("e", 0u8.into()),
    ]);
    let err = ctx.store_to_vec(id, &value).unwrap_err();
    assert_eq!(err.code(), ErrorCode::TypeMismatch);

    let negative = Value::from_fields(vec![("a", Value::Int(-1)), ("b", 0u8.into())]);
    let err = ctx.store_to_vec(TypeId::from_name("straddle"), &negative).unwrap_err();
    assert_eq!(err.code(), ErrorCode::TypeMismatch);
}

#[test]
fn test_bad_width_rejected() {
    let mut ctx = context();
    for width in ["0", "65"] {
        let text = format!(
            r#"{{ "types" : {{ "bad" : {{ "members" : [
                {{ "name" : "f", "type" : "bitfield:{}" }}
            ] }} }} }}"#,
            width
        );
        let err = ctx.load_txt_library(&text).unwrap_err();
        assert_eq!(err.code(), ErrorCode::MalformedTypeLibrary);
    }
    assert!(ctx.library().find_type_by_name("bad").is_none());
}
