//! Serde integration.
//!
//! Converts Rust types to and from [`Value`] trees, and stores or decodes them
//! through a [`Context`] with `#[derive(Serialize, Deserialize)]` types. Field
//! names must match member names. Unit enum variants map to enum members by
//! enumerator name. Newtype variants map to unions, the variant naming the
//! active member. `None` fields are left out so the member default applies.
//!
//! # Example
//!
//! ```rust
//! use datalib::{Config, Context, TypeId};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize, Debug, PartialEq)]
//! struct Person {
//!     name: String,
//!     age: u32,
//! }
//!
//! let mut ctx = Context::new(Config::new());
//! ctx.load_txt_library(r#"{ "types" : { "person" : { "members" : [
//!     { "name" : "name", "type" : "string" },
//!     { "name" : "age",  "type" : "uint32" }
//! ] } } }"#).unwrap();
//!
//! let id = TypeId::from_name("person");
//! let person = Person { name: "Alice".into(), age: 30 };
//! let bytes = datalib::serde::to_bytes(&ctx, id, &person).unwrap();
//! let decoded: Person = datalib::serde::from_bytes(&ctx, id, &bytes).unwrap();
//! assert_eq!(person, decoded);
//! ```

mod de;
mod error;
mod ser;

pub use de::ValueDeserializer;
pub use error::SerdeError;
pub use ser::ValueSerializer;

use serde::{Deserialize, Serialize};

use crate::context::Context;
use crate::types::TypeId;
use crate::value::Value;

/// Store `value` as a packed instance of `type_id`.
pub fn to_bytes<T: Serialize + ?Sized>(
    ctx: &Context,
    type_id: TypeId,
    value: &T,
) -> Result<Vec<u8>, SerdeError> {
    let value = ValueSerializer::serialize(value)?;
    Ok(ctx.store_to_vec(type_id, &value)?)
}

/// Decode a packed instance of `type_id` into a Rust type.
pub fn from_bytes<T: for<'de> Deserialize<'de>>(
    ctx: &Context,
    type_id: TypeId,
    data: &[u8],
) -> Result<T, SerdeError> {
    let value = ctx.decode(type_id, data)?;
    ValueDeserializer::deserialize(&value)
}

pub fn to_value<T: Serialize + ?Sized>(value: &T) -> Result<Value, SerdeError> {
    ValueSerializer::serialize(value)
}

pub fn from_value<T: for<'de> Deserialize<'de>>(value: &Value) -> Result<T, SerdeError> {
    ValueDeserializer::deserialize(value)
}
