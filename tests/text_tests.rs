//! Text form: packing instance literals and rendering packed instances.

use datalib::{Config, Context, DlError, ErrorCode, TypeId, Value};
use pretty_assertions::assert_eq;

const LIBRARY: &str = r#"{
    "enums" : { "color" : [ "RED", "GREEN", { "BLUE" : 10 } ] },
    "types" : {
        "pair" : { "members" : [
            { "name" : "a", "type" : "uint8" },
            { "name" : "b", "type" : "string" }
        ] },
        "shape" : { "members" : [
            { "name" : "color",  "type" : "color", "default" : "BLUE" },
            { "name" : "points", "type" : "pair[]" },
            { "name" : "scale",  "type" : "fp32" },
            { "name" : "weight", "type" : "fp64", "default" : -1.5 },
            { "name" : "flags",  "type" : "bitfield:4", "default" : 0 },
            { "name" : "offset", "type" : "int16[2]" }
        ] }
    }
}"#;

fn context() -> Context {
    let mut ctx = Context::new(Config::new());
    ctx.load_txt_library(LIBRARY).unwrap();
    ctx
}

fn text_line(err: DlError) -> usize {
    match err {
        DlError::MalformedText { line, .. } => line,
        other => panic!("expected malformed text, got {:?}", other),
    }
}

#[test]
fn test_unpack_format() {
    let ctx = context();
    let id = TypeId::from_name("pair");
    let packed = ctx
        .store_to_vec(id, &Value::from_fields(vec![("a", 1u8.into()), ("b", "x\"y".into())]))
        .unwrap();
    let text = ctx.unpack_text(id, &packed).unwrap();
    assert_eq!(
        text,
        "{\n    \"pair\" : {\n        \"a\" : 1,\n        \"b\" : \"x\\\"y\"\n    }\n}\n"
    );
}

#[test]
fn test_pack_unpack_pack() {
    let ctx = context();
    let text = r#"
        // a shape with two points
        { "shape" : {
            "points" : [ { "a" : 1, "b" : "one" }, { "a" : 0xff, "b" : "" } ],
            "scale"  : 9,
            "flags"  : 0b1010,
            /* inline array */
            "offset" : [ min, max ]
        } }
    "#;
    let packed = ctx.pack_text_to_vec(text).unwrap();
    assert_eq!(ctx.pack_text(text, &mut []).unwrap(), packed.len());

    let id = TypeId::from_name("shape");
    let value = ctx.decode(id, &packed).unwrap();
    assert_eq!(value.get("color"), Some(&Value::enumerator("BLUE")));
    assert_eq!(value.get("scale"), Some(&Value::Float(9.0)));
    assert_eq!(value.get("weight"), Some(&Value::Float(-1.5)));
    assert_eq!(value.get("flags"), Some(&Value::UInt(10)));
    assert_eq!(
        value.get("offset"),
        Some(&Value::Array(vec![Value::Int(i16::MIN as i64), Value::Int(i16::MAX as i64)]))
    );

    let rendered = ctx.unpack_text(id, &packed).unwrap();
    assert_eq!(ctx.pack_text_to_vec(&rendered).unwrap(), packed);
    assert_eq!(ctx.unpack_text(id, &ctx.pack_text_to_vec(&rendered).unwrap()).unwrap(), rendered);
}

#[test]
fn test_special_floats() {
    let ctx = context();
    let id = TypeId::from_name("shape");
    for word in ["inf", "-inf", "nan"] {
        let text = format!(
            r#"{{ "shape" : {{ "points" : [], "scale" : {}, "offset" : [0, 0] }} }}"#,
            word
        );
        let packed = ctx.pack_text_to_vec(&text).unwrap();
        let rendered = ctx.unpack_text(id, &packed).unwrap();
        assert!(rendered.contains(&format!("\"scale\" : {},", word)), "{}", rendered);
    }
}

#[test]
fn test_float_literal_out_of_range() {
    let ctx = context();
    let shape = |scale: &str| {
        format!(
            concat!(
                "{{ \"shape\" : {{\n",
                "  \"points\" : [],\n",
                "  \"scale\" : {},\n",
                "  \"offset\" : [0, 0]\n",
                "}} }}"
            ),
            scale
        )
    };
    assert!(ctx.pack_text_to_vec(&shape("3.4e38")).is_ok());
    assert_eq!(text_line(ctx.pack_text_to_vec(&shape("1e39")).unwrap_err()), 3);
    assert_eq!(text_line(ctx.pack_text_to_vec(&shape("-1e39")).unwrap_err()), 3);
}

#[test]
fn test_enum_alias_reads_back_as_first_name() {
    let mut ctx = Context::new(Config::new());
    ctx.load_txt_library(
        r#"{
            "enums" : { "level" : { "LOW" : 0, "MIN" : 0, "HIGH" : 1 } },
            "types" : { "gauge" : { "members" : [ { "name" : "level", "type" : "level" } ] } }
        }"#,
    )
    .unwrap();
    let id = TypeId::from_name("gauge");

    let by_alias = ctx.pack_text_to_vec(r#"{ "gauge" : { "level" : "MIN" } }"#).unwrap();
    let by_name = ctx.pack_text_to_vec(r#"{ "gauge" : { "level" : "LOW" } }"#).unwrap();
    assert_eq!(by_alias, by_name);

    // the bytes survive, the spelling does not
    let text = ctx.unpack_text(id, &by_alias).unwrap();
    assert!(text.contains("\"level\" : \"LOW\""), "{}", text);
    assert_eq!(ctx.pack_text_to_vec(&text).unwrap(), by_alias);
    let value = ctx.decode(id, &by_alias).unwrap();
    assert_eq!(value.get("level"), Some(&Value::enumerator("LOW")));
}

#[test]
fn test_enum_by_number() {
    let ctx = context();
    let text = r#"{ "shape" : { "color" : 1, "points" : [], "scale" : 0.5, "offset" : [1, 2] } }"#;
    let packed = ctx.pack_text_to_vec(text).unwrap();
    let value = ctx.decode(TypeId::from_name("shape"), &packed).unwrap();
    assert_eq!(value.get("color"), Some(&Value::enumerator("GREEN")));
}

#[test]
fn test_member_set_twice() {
    let ctx = context();
    let text = "{ \"pair\" : {\n  \"a\" : 1,\n  \"a\" : 2,\n  \"b\" : \"\"\n} }";
    let err = ctx.pack_text_to_vec(text).unwrap_err();
    assert_eq!(text_line(err), 3);
}

#[test]
fn test_missing_member_without_default() {
    let ctx = context();
    let err = ctx.pack_text_to_vec(r#"{ "pair" : { "a" : 1 } }"#).unwrap_err();
    assert_eq!(err.code(), ErrorCode::MalformedText);
}

#[test]
fn test_invalid_member() {
    let ctx = context();
    let text = "{ \"pair\" : {\n  \"a\" : 1,\n  \"b\" : \"x\",\n  \"c\" : 3\n} }";
    assert_eq!(text_line(ctx.pack_text_to_vec(text).unwrap_err()), 4);
}

#[test]
fn test_out_of_range() {
    let ctx = context();
    let err = ctx.pack_text_to_vec(r#"{ "pair" : { "a" : 256, "b" : "" } }"#).unwrap_err();
    assert_eq!(err.code(), ErrorCode::MalformedText);

    let err = ctx
        .pack_text_to_vec(r#"{ "shape" : { "points" : [], "scale" : 1, "offset" : [1] } }"#)
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::MalformedText);
}

#[test]
fn test_unknown_root_type() {
    let ctx = context();
    let err = ctx.pack_text_to_vec(r#"{ "triangle" : { "a" : 1 } }"#).unwrap_err();
    assert_eq!(err.code(), ErrorCode::UnknownType);
}

#[test]
fn test_syntax_error() {
    let ctx = context();
    let text = "{ \"pair\" : {\n  \"a\" : 1\n  \"b\" : \"x\"\n} }";
    assert_eq!(text_line(ctx.pack_text_to_vec(text).unwrap_err()), 3);

    let unterminated = "{ \"pair\" : { \"a\" : 1, \"b\" : \"unterminated } }";
    let err = ctx.pack_text_to_vec(unterminated).unwrap_err();
    assert_eq!(err.code(), ErrorCode::MalformedText);
}

#[test]
fn test_pack_into_small_buffer() {
    let ctx = context();
    let text = r#"{ "pair" : { "a" : 1, "b" : "hello" } }"#;
    let need = ctx.pack_text(text, &mut []).unwrap();
    let mut out = vec![0xeeu8; need - 1];
    let err = ctx.pack_text(text, &mut out).unwrap_err();
    assert!(matches!(err, DlError::BufferTooSmall { need: n, .. } if n == need));
    assert!(out.iter().all(|b| *b == 0xee));
}
