use std::ops::Range;

use crate::error::TemplateDiagnostic;
use crate::token::{Token, TokenKind};

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Split markup source into open, close, short and text tokens.
///
/// Anything that does not look like a tag (comments, doctypes, processing
/// instructions, a `<` that does not open a well-formed tag) stays text, and
/// consecutive text is kept in a single token. The only error is a comment
/// that is never closed.
pub fn tokenize(source: &str, file_id: usize) -> Result<Vec<Token>, Vec<TemplateDiagnostic>> {
    let mut scanner = Scanner {
        source,
        bytes: source.as_bytes(),
        pos: 0,
        file_id,
    };
    let mut tokens = Vec::new();
    let mut errors = Vec::new();
    let mut text_start = 0;

    while scanner.pos < scanner.bytes.len() {
        if scanner.bytes[scanner.pos] != b'<' {
            scanner.pos += 1;
            continue;
        }

        if source[scanner.pos..].starts_with("<!--") {
            match source[scanner.pos + 4..].find("-->") {
                Some(end) => scanner.pos += 4 + end + 3,
                None => {
                    errors.push(TemplateDiagnostic::error(
                        "unterminated comment",
                        scanner.pos..source.len(),
                        file_id,
                    ));
                    break;
                }
            }
            continue;
        }

        let start = scanner.pos;
        match scanner.scan_tag() {
            Some(tag) => {
                if text_start < start {
                    tokens.push(Token::text(&source[text_start..start], text_start..start, file_id));
                }
                text_start = tag.span.end;
                scanner.pos = tag.span.end;
                tokens.push(tag);
            }
            None => scanner.pos = start + 1,
        }
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    if text_start < source.len() {
        tokens.push(Token::text(&source[text_start..], text_start..source.len(), file_id));
    }
    Ok(tokens)
}

// ---------------------------------------------------------------------------
// Scanner
// ---------------------------------------------------------------------------

struct Scanner<'a> {
    source: &'a str,
    bytes: &'a [u8],
    pos: usize,
    file_id: usize,
}

fn is_name_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

fn is_name_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b':' | b'.')
}

fn is_attribute_char(b: u8) -> bool {
    !b.is_ascii_whitespace() && !matches!(b, b'=' | b'>' | b'/' | b'"' | b'\'' | b'<')
}

impl<'a> Scanner<'a> {
    fn peek(&self, at: usize) -> Option<u8> {
        self.bytes.get(at).copied()
    }

    fn skip_whitespace(&self, mut at: usize) -> usize {
        while self.peek(at).is_some_and(|b| b.is_ascii_whitespace()) {
            at += 1;
        }
        at
    }

    fn take_while(&self, mut at: usize, pred: impl Fn(u8) -> bool) -> usize {
        while self.peek(at).is_some_and(&pred) {
            at += 1;
        }
        at
    }

    /// Scan a tag starting at `self.pos` (which points at `<`).
    ///
    /// Returns `None` when the `<` does not start a well-formed tag: no name
    /// after it, another `<` inside the attribute list, an unclosed quoted
    /// value or the end of input. The `<` then stays text, so comparisons
    /// in inline scripts and prose pass through unchanged.
    fn scan_tag(&self) -> Option<Token> {
        let start = self.pos;
        let mut at = start + 1;

        let closing = self.peek(at) == Some(b'/');
        if closing {
            at += 1;
        }

        if !self.peek(at).is_some_and(is_name_start) {
            return None;
        }
        let name_start = at;
        at = self.take_while(at, is_name_char);
        let name = self.source[name_start..at].to_string();

        if closing {
            at = self.skip_whitespace(at);
            return match self.peek(at) {
                Some(b'>') => Some(self.token(TokenKind::Close, name, Vec::new(), start..at + 1)),
                _ => None,
            };
        }

        let mut attributes = Vec::new();
        loop {
            at = self.skip_whitespace(at);
            match self.peek(at) {
                None => return None,
                Some(b'>') => {
                    return Some(self.token(TokenKind::Open, name, attributes, start..at + 1));
                }
                Some(b'/') if self.peek(at + 1) == Some(b'>') => {
                    return Some(self.token(TokenKind::Short, name, attributes, start..at + 2));
                }
                Some(_) => {}
            }

            let attr_start = at;
            at = self.take_while(at, is_attribute_char);
            if at == attr_start {
                return None;
            }
            let attr_name = self.source[attr_start..at].to_string();

            let after_name = self.skip_whitespace(at);
            if self.peek(after_name) != Some(b'=') {
                attributes.push((attr_name, String::new()));
                continue;
            }

            at = self.skip_whitespace(after_name + 1);
            let value = match self.peek(at)? {
                quote @ (b'"' | b'\'') => {
                    let value_start = at + 1;
                    let len = self.source[value_start..].find(quote as char)?;
                    at = value_start + len + 1;
                    &self.source[value_start..value_start + len]
                }
                _ => {
                    let value_start = at;
                    while let Some(b) = self.peek(at) {
                        let ends_short = b == b'/' && self.peek(at + 1) == Some(b'>');
                        if b.is_ascii_whitespace() || b == b'>' || ends_short {
                            break;
                        }
                        at += 1;
                    }
                    &self.source[value_start..at]
                }
            };
            attributes.push((attr_name, value.to_string()));
        }
    }

    fn token(
        &self,
        kind: TokenKind,
        name: String,
        attributes: Vec<(String, String)>,
        span: Range<usize>,
    ) -> Token {
        Token {
            kind,
            name,
            content: self.source[span.clone()].to_string(),
            attributes,
            span,
            file_id: self.file_id,
        }
    }
}
