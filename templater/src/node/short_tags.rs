use once_cell::sync::Lazy;
use regex::Regex;

static SHORT_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\$\{(?P<name>[a-z0-9_.\-]+)(?: *\| *(?P<default>[^}]+) *)?\}")
        .expect("short tag pattern is valid")
});

/// A run of markup split around `${name}` / `${name|default}` short tags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Piece<'a> {
    Text(&'a str),
    Tag { name: &'a str, default: &'a str },
}

pub fn expand(text: &str) -> Vec<Piece<'_>> {
    let mut pieces = Vec::new();
    let mut last = 0;

    for caps in SHORT_TAG.captures_iter(text) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.name("name")) else {
            continue;
        };
        if last < whole.start() {
            pieces.push(Piece::Text(&text[last..whole.start()]));
        }
        pieces.push(Piece::Tag {
            name: name.as_str(),
            default: caps.name("default").map_or("", |m| m.as_str()),
        });
        last = whole.end();
    }

    if last < text.len() {
        pieces.push(Piece::Text(&text[last..]));
    }
    pieces
}
