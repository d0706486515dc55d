//! Splices attributes built from skipped nodes into compiled markup.
//!
//! A ` node:attributes` marker, optionally written as
//! ` node:attributes="include:a,b|exclude:c"`, is replaced by `name="value"`
//! pairs for every skipped node that passes the filters.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::error::TemplateError;
use crate::node::compile::RenderPass;
use crate::node::{CONTEXT_BLOCK, Node};

static MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i) node:attributes(?:=['"](?:include:(?P<include>[a-z0-9_\-,]+))?\|?(?:exclude:(?P<exclude>[a-z0-9_\-,]+))?['"])?"#,
    )
    .expect("attribute marker pattern is valid")
});

/// Replace every attribute marker in `compiled` using `skipped` nodes.
pub fn inject(compiled: String, skipped: &[Node], pass: &RenderPass) -> Result<String, TemplateError> {
    if !MARKER.is_match(&compiled) {
        return Ok(compiled);
    }

    let mut output = String::with_capacity(compiled.len());
    let mut last = 0;
    for caps in MARKER.captures_iter(&compiled) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        output.push_str(&compiled[last..whole.start()]);
        output.push_str(&render(&caps, skipped, pass)?);
        last = whole.end();
    }
    output.push_str(&compiled[last..]);
    Ok(output)
}

fn list<'c>(caps: &Captures<'c>, group: &str) -> Vec<&'c str> {
    caps.name(group)
        .map(|m| m.as_str().split(',').collect())
        .unwrap_or_default()
}

fn render(caps: &Captures<'_>, skipped: &[Node], pass: &RenderPass) -> Result<String, TemplateError> {
    let include = list(caps, "include");
    let exclude = list(caps, "exclude");

    let mut attributes: Vec<(&str, String)> = Vec::new();
    for node in skipped {
        let name = node.name();
        if node.is_anonymous()
            || exclude.contains(&name)
            || (!include.is_empty() && !include.contains(&name))
        {
            continue;
        }

        let value = node.compile_with(&mut pass.standalone())?;
        match attributes.iter_mut().find(|(existing, _)| *existing == name) {
            Some(slot) => slot.1 = value,
            None => attributes.push((name, value)),
        }
    }
    attributes.retain(|(name, _)| *name != CONTEXT_BLOCK);

    if attributes.is_empty() {
        return Ok(String::new());
    }
    let pairs: Vec<String> = attributes
        .iter()
        .map(|(name, value)| format!("{}=\"{}\"", name, value))
        .collect();
    Ok(format!(" {}", pairs.join(" ")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Options;

    fn skipped() -> Vec<Node> {
        vec![
            Node::with_text("class", "box", Options::new()),
            Node::with_text("id", "5", Options::new()),
            Node::with_text(CONTEXT_BLOCK, "body", Options::new()),
            Node::with_text("", "anonymous", Options::new()),
        ]
    }

    fn run(markup: &str) -> String {
        inject(markup.to_string(), &skipped(), &RenderPass::default()).unwrap()
    }

    #[test]
    fn bare_marker_takes_every_named_node() {
        assert_eq!(run("<div node:attributes>"), "<div class=\"box\" id=\"5\">");
    }

    #[test]
    fn exclude_filter() {
        assert_eq!(run("<div node:attributes='exclude:id'>"), "<div class=\"box\">");
    }

    #[test]
    fn include_filter() {
        assert_eq!(run("<div node:attributes=\"include:id\">"), "<div id=\"5\">");
        assert_eq!(
            run("<div node:attributes=\"include:class,id|exclude:class\">"),
            "<div id=\"5\">"
        );
    }

    #[test]
    fn marker_vanishes_without_candidates() {
        let out = inject("<a node:attributes>".to_string(), &[], &RenderPass::default()).unwrap();
        assert_eq!(out, "<a>");
        assert_eq!(run("<a node:attributes=\"include:missing\">"), "<a>");
    }

    #[test]
    fn text_without_marker_is_untouched() {
        assert_eq!(run("<div class=\"a\">"), "<div class=\"a\">");
    }
}
