//! Syntax tree of the JSON-like text formats.
//!
//! Maps keep their entries in source order and keep duplicates, so the typed
//! layers above can report a key set twice.

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Map(Vec<Entry>),
    List(Vec<Node>),
    Str(String),
    /// Number as written; interpreted against the target type.
    Number(String),
    /// Bare word such as `true`, `max`, `inf` or an enum value.
    Ident(String),
}

/// A key-value pair of a map. Keys may be quoted or bare.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub key: String,
    pub line: usize,
    pub value: Node,
}

impl Node {
    /// Short description used in error messages.
    pub fn describe(&self) -> &'static str {
        match self.kind {
            NodeKind::Map(_) => "an object",
            NodeKind::List(_) => "an array",
            NodeKind::Str(_) => "a string",
            NodeKind::Number(_) => "a number",
            NodeKind::Ident(_) => "a bare word",
        }
    }

    pub fn as_map(&self) -> Option<&[Entry]> {
        match &self.kind {
            NodeKind::Map(entries) => Some(entries),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Node]> {
        match &self.kind {
            NodeKind::List(items) => Some(items),
            _ => None,
        }
    }

    /// Text of a string or a bare word.
    pub fn as_text(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Str(s) | NodeKind::Ident(s) => Some(s),
            _ => None,
        }
    }
}
