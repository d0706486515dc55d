use std::ops::Range;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// `<name ...>`
    Open,
    /// `</name>`
    Close,
    /// `<name ... />`
    Short,
    Text,
}

/// A single markup token. `content` is the exact source text of the token,
/// so concatenating every token's content reproduces the source.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Tag name; empty for text tokens.
    pub name: String,
    pub content: String,
    /// Attributes in source order. Valueless attributes map to an empty string.
    pub attributes: Vec<(String, String)>,
    pub span: Range<usize>,
    pub file_id: usize,
}

impl Token {
    pub fn text(content: impl Into<String>, span: Range<usize>, file_id: usize) -> Self {
        Token {
            kind: TokenKind::Text,
            name: String::new(),
            content: content.into(),
            attributes: Vec::new(),
            span,
            file_id,
        }
    }

    pub fn is_tag(&self) -> bool {
        self.kind != TokenKind::Text
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}
