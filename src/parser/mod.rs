pub mod lexer;
pub mod ast;
pub mod grammar;
pub mod schema_builder;
pub mod schema_writer;

use crate::error::Result;
use crate::registry::TypeLibrary;

/// Parse a text type library into a new library holding only its definitions.
///
/// Use [`crate::Context::load_txt_library`] to add to an existing registry.
pub fn parse(library_text: &str) -> Result<TypeLibrary> {
    schema_builder::build_library(&TypeLibrary::new(), library_text)
}
