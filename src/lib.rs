//! Datalib: schema-driven binary serialization.
//!
//! Types are described once in a type library (binary or text). Values of
//! those types are stored into a compact, position-independent packed blob
//! and loaded back into an in-memory layout where dynamic members are real
//! addresses. Packed instances also have a human-editable text form.
//!
//! # Quick Start
//!
//! ```rust
//! use datalib::{Config, Context, TypeId, Value};
//!
//! let mut ctx = Context::new(Config::new());
//! ctx.load_txt_library(r#"{
//!     "types" : {
//!         "person" : { "members" : [
//!             { "name" : "name", "type" : "string" },
//!             { "name" : "age",  "type" : "uint8" },
//!             { "name" : "tags", "type" : "string[]" }
//!         ] }
//!     }
//! }"#).unwrap();
//!
//! let person = TypeId::from_name("person");
//! let value = Value::from_fields(vec![
//!     ("name", "Alice".into()),
//!     ("age", 30u8.into()),
//!     ("tags", vec!["a", "b"].into()),
//! ]);
//!
//! let packed = ctx.store_to_vec(person, &value).unwrap();
//! assert_eq!(ctx.decode(person, &packed).unwrap(), value);
//!
//! let loaded = ctx.load_to_vec(person, &packed).unwrap();
//! let view = loaded.view(ctx.library()).unwrap();
//! assert_eq!(view.get("name").unwrap(), Value::from("Alice"));
//!
//! let text = ctx.unpack_text(person, &packed).unwrap();
//! assert_eq!(ctx.pack_text_to_vec(&text).unwrap(), packed);
//! ```

pub mod error;
pub mod value;
pub mod types;
pub mod layout;
pub mod registry;
pub mod binary_schema;
pub mod codec;
pub mod parser;
pub mod text;
pub mod context;

#[cfg(feature = "serde")]
pub mod serde;

pub use codec::{InstanceInfo, InstanceRef, LoadedInstance};
pub use context::{Allocator, Config, Context, ErrorCallback, SystemAllocator};
pub use error::{error_to_string, DlError, ErrorCode, Result};
pub use registry::TypeLibrary;
pub use types::{
    union_tag, ElemKind, EnumDesc, LayoutKind, Member, MemberKind, ScalarKind, TypeDesc, TypeId,
};
pub use value::Value;
