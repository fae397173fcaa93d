//! Context configuration: allocator, error callback and error codes.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use datalib::{
    error_to_string, Allocator, Config, Context, DlError, ErrorCode, SystemAllocator, TypeId, Value,
};
use pretty_assertions::assert_eq;

const LIBRARY: &str = r#"{ "types" : { "msg" : { "members" : [
    { "name" : "id",   "type" : "uint32" },
    { "name" : "body", "type" : "string" }
] } } }"#;

/// Counts allocations and refuses anything above `limit` bytes.
#[derive(Clone)]
struct CountingAllocator {
    calls: Rc<Cell<usize>>,
    limit: usize,
}

impl Allocator for CountingAllocator {
    fn allocate(&self, size: usize) -> datalib::Result<Vec<u8>> {
        self.calls.set(self.calls.get() + 1);
        if size > self.limit {
            return Err(DlError::AllocationFailure(size));
        }
        SystemAllocator.allocate(size)
    }
}

fn msg(body: &str) -> Value {
    Value::from_fields(vec![("id", 7u32.into()), ("body", body.into())])
}

#[test]
fn test_custom_allocator() {
    let calls = Rc::new(Cell::new(0));
    let allocator = CountingAllocator { calls: calls.clone(), limit: 64 };
    let mut ctx = Context::new(Config::new().allocator(allocator));
    ctx.load_txt_library(LIBRARY).unwrap();
    let id = TypeId::from_name("msg");

    let packed = ctx.store_to_vec(id, &msg("short")).unwrap();
    let loaded = ctx.load_to_vec(id, &packed).unwrap();
    assert_eq!(loaded.type_id(), id);
    // one packed buffer, then the load's validation scratch and its output
    assert_eq!(calls.get(), 3);

    let err = ctx.store_to_vec(id, &msg(&"x".repeat(100))).unwrap_err();
    assert_eq!(err.code(), ErrorCode::AllocationFailure);
    assert_eq!(calls.get(), 4);

    assert!(ctx.decode(id, &packed).is_ok());
    assert!(ctx.unpack_text(id, &packed).is_ok());
    assert_eq!(calls.get(), 6);
}

#[test]
fn test_error_callback() {
    let seen: Rc<RefCell<Vec<(ErrorCode, String)>>> = Rc::default();
    let sink = seen.clone();
    let mut ctx = Context::new(Config::new().error_callback(move |code, message| {
        sink.borrow_mut().push((code, message.to_string()));
    }));
    ctx.load_txt_library(LIBRARY).unwrap();

    assert!(ctx.load_txt_library("{ \"types\" : ").is_err());
    assert!(ctx.store_to_vec(TypeId::from_name("nope"), &msg("")).is_err());
    assert!(ctx.store(TypeId::from_name("msg"), &msg("hello"), &mut [0u8; 4]).is_err());
    assert!(ctx.store_to_vec(TypeId::from_name("msg"), &msg("fine")).is_ok());

    let seen = seen.borrow();
    let codes: Vec<ErrorCode> = seen.iter().map(|(code, _)| *code).collect();
    assert_eq!(
        codes,
        vec![ErrorCode::MalformedText, ErrorCode::UnknownType, ErrorCode::BufferTooSmall]
    );
    assert!(seen[2].1.contains("buffer"), "{}", seen[2].1);
}

#[test]
fn test_error_codes() {
    for (i, code) in ErrorCode::ALL.iter().enumerate() {
        assert_eq!(*code as u32, i as u32 + 1);
        assert_eq!(ErrorCode::from_u32(*code as u32), Some(*code));
        assert_eq!(error_to_string(*code as u32), code.as_str());
    }
    assert_eq!(error_to_string(0), "unknown error code");
    assert_eq!(error_to_string(9), "unknown error code");
    let message = error_to_string(ErrorCode::BufferTooSmall as u32);
    assert_eq!(message, "the provided buffer is too small");
}

#[test]
fn test_error_code_mapping() {
    let cases = [
        (DlError::MalformedTypeLibrary(String::new()), ErrorCode::MalformedTypeLibrary),
        (DlError::IdCollision { id: TypeId(1), name: "a".into() }, ErrorCode::IdCollision),
        (DlError::UnknownType("a".into()), ErrorCode::UnknownType),
        (
            DlError::TypeMismatch { path: "a".into(), expected: "b".into(), actual: "c".into() },
            ErrorCode::TypeMismatch,
        ),
        (DlError::BufferTooSmall { need: 2, have: 1 }, ErrorCode::BufferTooSmall),
        (DlError::CorruptData(String::new()), ErrorCode::CorruptData),
        (DlError::MalformedText { line: 1, message: String::new() }, ErrorCode::MalformedText),
        (DlError::AllocationFailure(1), ErrorCode::AllocationFailure),
    ];
    for (err, code) in cases {
        assert_eq!(err.code(), code);
    }
}

#[test]
fn test_library_load_is_atomic() {
    let mut ctx = Context::new(Config::new());
    ctx.load_txt_library(LIBRARY).unwrap();
    let err = ctx
        .load_txt_library(
            r#"{ "types" : {
                "ok"  : { "members" : [ { "name" : "v", "type" : "uint8" } ] },
                "bad" : { "members" : [ { "name" : "v", "type" : "ghost" } ] }
            } }"#,
        )
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::UnknownType);
    assert!(ctx.library().find_type_by_name("ok").is_none());
    assert_eq!(ctx.library().type_count(), 1);
}
