//! Unions: one active member, named by a tag stored after the largest member.

use datalib::codec::wire::SIZEOF_HEADER;
use datalib::{union_tag, Config, Context, ErrorCode, LayoutKind, TypeId, Value};
use pretty_assertions::assert_eq;

const LIBRARY: &str = r#"{
    "enums" : { "unit" : [ "METER", "FOOT" ] },
    "types" : {
        "point" : { "members" : [
            { "name" : "x", "type" : "int32" },
            { "name" : "y", "type" : "int32" }
        ] },
        "value" : { "union" : true, "members" : [
            { "name" : "int",    "type" : "int64" },
            { "name" : "text",   "type" : "string" },
            { "name" : "points", "type" : "point[]" },
            { "name" : "unit",   "type" : "unit" }
        ] },
        "record" : { "members" : [
            { "name" : "key",   "type" : "string" },
            { "name" : "value", "type" : "value" },
            { "name" : "extra", "type" : "value[]" }
        ] }
    }
}"#;

fn context() -> Context {
    let mut ctx = Context::new(Config::new());
    ctx.load_txt_library(LIBRARY).unwrap();
    ctx
}

fn one(member: &str, v: Value) -> Value {
    Value::from_fields(vec![(member, v)])
}

fn point(x: i32, y: i32) -> Value {
    Value::from_fields(vec![("x", x.into()), ("y", y.into())])
}

fn record(key: &str, value: Value, extra: Vec<Value>) -> Value {
    Value::from_fields(vec![("key", key.into()), ("value", value), ("extra", extra.into())])
}

/// Every way back from a packed record must give `value`.
fn assert_roundtrip(ctx: &Context, value: &Value) {
    let id = TypeId::from_name("record");
    let packed = ctx.store_to_vec(id, value).unwrap();
    assert_eq!(&ctx.decode(id, &packed).unwrap(), value);

    let loaded = ctx.load_to_vec(id, &packed).unwrap();
    let view = loaded.view(ctx.library()).unwrap();
    assert_eq!(&view.to_value().unwrap(), value);
    let mut repacked = vec![0u8; packed.len()];
    ctx.store_instance(&view, &mut repacked).unwrap();
    assert_eq!(repacked, packed);

    let text = ctx.unpack_text(id, &packed).unwrap();
    assert_eq!(ctx.pack_text_to_vec(&text).unwrap(), packed);
}

#[test]
fn test_union_layout() {
    let ctx = context();
    let desc = ctx.library().find_type_by_name("value").unwrap();
    assert!(desc.is_union);
    assert!(desc.members.iter().all(|m| m.offset(LayoutKind::Packed) == 0));
    assert_eq!(desc.tag_offset(LayoutKind::Packed), 8);
    assert_eq!(desc.size(LayoutKind::Packed), 16);

    let id = TypeId::from_name("value");
    let packed = ctx.store_to_vec(id, &one("int", Value::Int(-2))).unwrap();
    let arena = &packed[SIZEOF_HEADER..];
    assert_eq!(&arena[..8], &(-2i64).to_le_bytes());
    assert_eq!(&arena[8..12], &union_tag("int").to_le_bytes());
    assert_eq!(&arena[12..], &[0u8; 4]);
}

#[test]
fn test_every_member_round_trips() {
    let ctx = context();
    let members = [
        one("int", Value::Int(i64::MIN)),
        one("text", "hello".into()),
        one("text", "".into()),
        one("points", vec![point(1, 2), point(-3, 4)].into()),
        one("unit", Value::enumerator("FOOT")),
    ];
    for value in members {
        assert_roundtrip(&ctx, &record("k", value, vec![]));
    }
}

#[test]
fn test_array_of_unions() {
    let ctx = context();
    let extra = vec![
        one("text", "a".into()),
        one("int", Value::Int(7)),
        one("points", vec![point(5, 6)].into()),
        one("text", "bcd".into()),
    ];
    assert_roundtrip(&ctx, &record("list", one("unit", Value::enumerator("METER")), extra));
}

#[test]
fn test_view_reads_active_member_only() {
    let ctx = context();
    let id = TypeId::from_name("value");
    let packed = ctx.store_to_vec(id, &one("text", "on".into())).unwrap();
    let loaded = ctx.load_to_vec(id, &packed).unwrap();
    let view = loaded.view(ctx.library()).unwrap();
    assert_eq!(view.get("text").unwrap(), Value::from("on"));
    assert_eq!(view.get("int").unwrap_err().code(), ErrorCode::TypeMismatch);
}

#[test]
fn test_store_needs_exactly_one_member() {
    let ctx = context();
    let id = TypeId::from_name("value");
    let cases = [
        Value::new_struct(),
        Value::from_fields(vec![("int", Value::Int(1)), ("text", "x".into())]),
        one("missing", Value::Int(1)),
        one("int", "not a number".into()),
    ];
    for value in cases {
        let err = ctx.store_to_vec(id, &value).unwrap_err();
        assert_eq!(err.code(), ErrorCode::TypeMismatch, "{:?}", value);
    }
}

#[test]
fn test_text_form() {
    let ctx = context();
    let id = TypeId::from_name("record");
    let packed = ctx.store_to_vec(id, &record("k", one("text", "hi".into()), vec![])).unwrap();
    let text = ctx.unpack_text(id, &packed).unwrap();
    assert!(text.contains("\"value\" : {\n            \"text\" : \"hi\"\n        }"), "{}", text);
    assert!(!text.contains("\"int\""), "{}", text);

    let both = r#"{ "value" : { "int" : 1, "text" : "x" } }"#;
    assert_eq!(ctx.pack_text_to_vec(both).unwrap_err().code(), ErrorCode::MalformedText);
    let none = r#"{ "value" : {} }"#;
    assert_eq!(ctx.pack_text_to_vec(none).unwrap_err().code(), ErrorCode::MalformedText);
}

#[test]
fn test_unknown_tag_is_corrupt() {
    let ctx = context();
    let id = TypeId::from_name("value");
    let mut packed = ctx.store_to_vec(id, &one("int", Value::Int(3))).unwrap();
    let tag = SIZEOF_HEADER + 8;
    packed[tag..tag + 4].copy_from_slice(&union_tag("float").to_le_bytes());

    let mut out = vec![0u8; 64];
    assert_eq!(ctx.load(id, &packed, &mut out).unwrap_err().code(), ErrorCode::CorruptData);
    assert!(out.iter().all(|b| *b == 0));
    assert_eq!(ctx.decode(id, &packed).unwrap_err().code(), ErrorCode::CorruptData);
}

#[test]
fn test_libraries_keep_unions() {
    let ctx = context();
    let id = TypeId::from_name("record");
    let packed = ctx
        .store_to_vec(id, &record("k", one("points", vec![point(1, 1)].into()), vec![]))
        .unwrap();

    let mut from_binary = Context::new(Config::new());
    from_binary.load_library(&ctx.write_library().unwrap()).unwrap();
    let mut from_text = Context::new(Config::new());
    from_text.load_txt_library(&ctx.write_txt_library().unwrap()).unwrap();

    for copy in [&from_binary, &from_text] {
        assert!(copy.library().find_type_by_name("value").unwrap().is_union);
        assert_eq!(copy.decode(id, &packed).unwrap(), ctx.decode(id, &packed).unwrap());
    }
}
