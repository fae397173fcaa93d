//! Binary type libraries: writing, loading and registry conflicts.

use datalib::{Config, Context, ErrorCode, TypeId, Value};
use pretty_assertions::assert_eq;

const LIBRARY: &str = r#"{
    "enums" : { "level" : { "LOW" : 1, "HIGH" : 2 } },
    "types" : {
        "point" : { "members" : [
            { "name" : "x", "type" : "fp64" },
            { "name" : "y", "type" : "fp64", "default" : 0.5 }
        ] },
        "region" : { "members" : [
            { "name" : "name",    "type" : "string", "default" : "none" },
            { "name" : "level",   "type" : "level", "default" : "LOW" },
            { "name" : "bits",    "type" : "bitfield:5" },
            { "name" : "corners", "type" : "point[2]" },
            { "name" : "outline", "type" : "point[]" },
            { "name" : "tags",    "type" : "string[]", "default" : [ "a", "b" ] }
        ] }
    }
}"#;

fn context() -> Context {
    let mut ctx = Context::new(Config::new());
    ctx.load_txt_library(LIBRARY).unwrap();
    ctx
}

fn region() -> Value {
    let point = |x: f64| Value::from_fields(vec![("x", x.into())]);
    Value::from_fields(vec![
        ("bits", 17u8.into()),
        ("corners", vec![point(0.0), point(10.0)].into()),
        ("outline", vec![point(1.0), point(2.0), point(3.0)].into()),
    ])
}

/// Hand-built library: one type whose only member refers to `target`.
fn dangling_library(target: TypeId) -> Vec<u8> {
    let str_bytes = |out: &mut Vec<u8>, s: &str| {
        out.extend_from_slice(&(s.len() as u16).to_le_bytes());
        out.extend_from_slice(s.as_bytes());
    };
    let mut out = Vec::new();
    out.extend_from_slice(b"DLTL");
    out.extend_from_slice(&1u32.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&1u32.to_le_bytes());
    out.extend_from_slice(&TypeId::from_name("holder").0.to_le_bytes());
    str_bytes(&mut out, "holder");
    out.push(0);
    out.extend_from_slice(&1u32.to_le_bytes());
    str_bytes(&mut out, "inner");
    out.push(4);
    out.extend_from_slice(&target.0.to_le_bytes());
    out.push(0);
    out
}

#[test]
fn test_binary_roundtrip() {
    let source = context();
    let bytes = source.write_library().unwrap();
    assert_eq!(&bytes[..4], b"DLTL");

    let mut copy = Context::new(Config::new());
    copy.load_library(&bytes).unwrap();
    assert_eq!(copy.library().type_count(), 2);
    assert_eq!(copy.library().enum_count(), 1);
    assert_eq!(copy.write_library().unwrap(), bytes);

    let id = TypeId::from_name("region");
    let packed = source.store_to_vec(id, &region()).unwrap();
    assert_eq!(copy.store_to_vec(id, &region()).unwrap(), packed);
    assert_eq!(copy.decode(id, &packed).unwrap(), source.decode(id, &packed).unwrap());
    assert_eq!(copy.unpack_text(id, &packed).unwrap(), source.unpack_text(id, &packed).unwrap());

    let decoded = copy.decode(id, &packed).unwrap();
    assert_eq!(decoded.get("level"), Some(&Value::enumerator("LOW")));
    assert_eq!(decoded.get("tags"), Some(&Value::from(vec!["a", "b"])));
}

#[test]
fn test_same_library_loads_twice() {
    let bytes = context().write_library().unwrap();
    let mut ctx = Context::new(Config::new());
    ctx.load_library(&bytes).unwrap();
    ctx.load_library(&bytes).unwrap();
    assert_eq!(ctx.library().type_count(), 2);
}

#[test]
fn test_id_collision_leaves_registry_unchanged() {
    let bytes = context().write_library().unwrap();

    let mut ctx = Context::new(Config::new());
    ctx.load_txt_library(
        r#"{ "types" : { "point" : { "members" : [ { "name" : "x", "type" : "int8" } ] } } }"#,
    )
    .unwrap();
    let err = ctx.load_library(&bytes).unwrap_err();
    assert_eq!(err.code(), ErrorCode::IdCollision);
    assert_eq!(ctx.library().type_count(), 1);
    assert!(ctx.library().find_type_by_name("region").is_none());
}

#[test]
fn test_malformed_header() {
    let bytes = context().write_library().unwrap();
    let mut ctx = Context::new(Config::new());

    let mut bad_magic = bytes.clone();
    bad_magic[0] = b'X';
    let mut bad_version = bytes.clone();
    bad_version[4] = 9;
    let mut trailing = bytes.clone();
    trailing.push(0);

    for blob in [bad_magic, bad_version, trailing, bytes[..bytes.len() / 2].to_vec(), Vec::new()] {
        assert_eq!(ctx.load_library(&blob).unwrap_err().code(), ErrorCode::MalformedTypeLibrary);
    }
    assert_eq!(ctx.library().type_count(), 0);
}

#[test]
fn test_dangling_reference() {
    let mut ctx = Context::new(Config::new());
    let err = ctx.load_library(&dangling_library(TypeId::from_name("missing"))).unwrap_err();
    assert_eq!(err.code(), ErrorCode::UnknownType);
    assert_eq!(ctx.library().type_count(), 0);

    // resolves once the target is registered
    ctx.load_txt_library(
        r#"{ "types" : { "missing" : { "members" : [ { "name" : "v", "type" : "uint8" } ] } } }"#,
    )
    .unwrap();
    ctx.load_library(&dangling_library(TypeId::from_name("missing"))).unwrap();
    assert!(ctx.library().find_type_by_name("holder").is_some());
}
