//! Text codec: the human-readable instance literal.
//!
//! ```text
//! { "TypeName" : { "member" : value, ... } }
//! ```

pub mod pack;
pub mod unpack;

pub use pack::{pack_text, parse_instance};
pub use unpack::{unpack_text, unpack_text_with};
