pub mod attributes;
pub mod compile;
mod extend;
pub mod short_tags;

use std::collections::BTreeMap;

use crate::behaviour::{Attribute, Behaviour, BehaviourKind, Describe, Scope, Supervisor, TagClass};
use crate::error::{TemplateDiagnostic, TemplateError};
use crate::node::short_tags::Piece;
use crate::token::{Token, TokenKind};

/// Name of the node that receives an import tag's body.
pub const CONTEXT_BLOCK: &str = "context";

/// Name given to the top node of a render.
pub const ROOT_NODE: &str = "root";

/// Opaque per-node configuration handed down by behaviours.
pub type Options = BTreeMap<String, String>;

/// One entry of a node's ordered content.
#[derive(Debug, Clone, PartialEq)]
pub enum Child {
    Text(String),
    Node(Node),
}

/// A named template fragment. Anonymous nodes have an empty name.
///
/// Nodes are built by [`Node::parse`], which resolves `extend` and `import`
/// behaviours while the tree is constructed, and rendered by
/// [`Node::compile`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Node {
    name: String,
    children: Vec<Child>,
    /// Blocks that found no target while extending a parent.
    skipped: Vec<Node>,
    pub options: Options,
    extended: bool,
}

impl Node {
    pub fn new(name: impl Into<String>, options: Options) -> Self {
        Node {
            name: name.into(),
            options,
            ..Node::default()
        }
    }

    /// A node whose only content is `text`.
    pub fn with_text(name: impl Into<String>, text: impl Into<String>, options: Options) -> Self {
        let mut node = Node::new(name, options);
        node.children.push(Child::Text(text.into()));
        node
    }

    /// Parse a full template into a node named `root`.
    pub fn root(tokens: Vec<Token>, supervisor: &mut dyn Supervisor) -> Result<Self, TemplateError> {
        Node::parse(ROOT_NODE, tokens, Options::new(), supervisor, 0)
    }

    /// Build a node from a token stream, consulting `supervisor` for every tag.
    ///
    /// `depth` is the nesting level of the node being built and is checked
    /// against [`Supervisor::max_depth`].
    pub fn parse(
        name: impl Into<String>,
        tokens: Vec<Token>,
        options: Options,
        supervisor: &mut dyn Supervisor,
        depth: usize,
    ) -> Result<Self, TemplateError> {
        let limit = supervisor.max_depth();
        if depth > limit {
            return Err(TemplateError::RecursionLimitExceeded { limit });
        }

        let mut parser = NodeParser {
            node: Node::new(name, options),
            supervisor,
            depth,
            parent: None,
            parent_attributes: Vec::new(),
        };
        parser.run(tokens)?;

        let NodeParser {
            mut node, parent, ..
        } = parser;
        if let Some(parent) = parent {
            node.extend_parent(parent)?;
        }
        Ok(node)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_anonymous(&self) -> bool {
        self.name.is_empty()
    }

    pub fn children(&self) -> &[Child] {
        &self.children
    }

    pub fn skipped(&self) -> &[Node] {
        &self.skipped
    }

    pub fn push(&mut self, child: Child) {
        self.children.push(child);
    }

    /// Direct child nodes, in order.
    pub fn child_nodes(&self) -> impl Iterator<Item = &Node> {
        self.children.iter().filter_map(|child| match child {
            Child::Node(node) => Some(node),
            Child::Text(_) => None,
        })
    }

    /// Depth-first search for a named descendant. Anonymous nodes are
    /// neither matched nor searched; the first match wins.
    pub fn find_node(&self, target: &str) -> Option<&Node> {
        for node in self.child_nodes() {
            if node.is_anonymous() {
                continue;
            }
            if node.name == target {
                return Some(node);
            }
            if let Some(found) = node.find_node(target) {
                return Some(found);
            }
        }
        None
    }

    pub fn find_node_mut(&mut self, target: &str) -> Option<&mut Node> {
        for child in &mut self.children {
            let Child::Node(node) = child else {
                continue;
            };
            if node.is_anonymous() {
                continue;
            }
            if node.name == target {
                return Some(node);
            }
            if let Some(found) = node.find_node_mut(target) {
                return Some(found);
            }
        }
        None
    }

    fn scope(&self, depth: usize) -> Scope<'_> {
        Scope {
            node: &self.name,
            options: &self.options,
            depth,
        }
    }

    /// Append literal text, merging it into a trailing text child.
    fn push_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        match self.children.last_mut() {
            Some(Child::Text(last)) => last.push_str(text),
            _ => self.children.push(Child::Text(text.to_string())),
        }
    }

    /// Append markup, expanding `${name|default}` short tags into child nodes.
    fn push_markup(&mut self, content: &str) {
        for piece in short_tags::expand(content) {
            match piece {
                Piece::Text(text) => self.push_text(text),
                Piece::Tag { name, default } => {
                    let node = Node::with_text(name, default, self.options.clone());
                    self.children.push(Child::Node(node));
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Token stream parser
// ---------------------------------------------------------------------------

/// A behaviour tag whose body is still being collected.
struct OpenTag {
    token: Token,
    behaviour: Behaviour,
    body: Vec<Token>,
    /// Same-name tags opened inside the body and not yet closed.
    level: usize,
}

struct NodeParser<'s> {
    node: Node,
    supervisor: &'s mut dyn Supervisor,
    depth: usize,
    /// Set by an extend behaviour; consumed once parsing is done.
    parent: Option<Node>,
    /// Positions in `node.children` of the nodes added by that extend's attributes.
    parent_attributes: Vec<usize>,
}

impl NodeParser<'_> {
    fn run(&mut self, tokens: Vec<Token>) -> Result<(), TemplateError> {
        let mut open: Option<OpenTag> = None;

        for token in tokens {
            open = match open {
                None => self.free_token(token)?,
                Some(tag) => self.body_token(tag, token)?,
            };
        }

        if let Some(tag) = open {
            self.supervisor.warn(
                TemplateDiagnostic::warning(
                    format!("tag <{}> is never closed", tag.token.name),
                    tag.token.span.clone(),
                    tag.token.file_id,
                )
                .with_note("its content is kept as plain markup"),
            );
            self.node.push_markup(&tag.token.content);
            for token in &tag.body {
                self.node.push_markup(&token.content);
            }
        }
        Ok(())
    }

    /// Handle a token while no behaviour tag is open.
    fn free_token(&mut self, token: Token) -> Result<Option<OpenTag>, TemplateError> {
        match token.kind {
            TokenKind::Open | TokenKind::Short => {
                let describe = self.supervisor.describe_token(&token, &self.node.scope(self.depth))?;
                match describe {
                    Describe::Skip => return Ok(None),
                    Describe::Behaviour(behaviour) if token.kind == TokenKind::Short => {
                        self.register(behaviour, Vec::new(), &token)?;
                        return Ok(None);
                    }
                    Describe::Behaviour(behaviour) => {
                        return Ok(Some(OpenTag {
                            token,
                            behaviour,
                            body: Vec::new(),
                            level: 0,
                        }));
                    }
                    Describe::Plain => {}
                }
            }
            TokenKind::Close => match self.supervisor.classify_token(&token, &self.node.scope(self.depth))? {
                TagClass::Skip => return Ok(None),
                TagClass::Behaviour => {
                    self.supervisor.warn(TemplateDiagnostic::warning(
                        format!("closing tag </{}> has no matching opening tag", token.name),
                        token.span.clone(),
                        token.file_id,
                    ));
                }
                TagClass::Plain => {}
            },
            TokenKind::Text => {}
        }

        self.node.push_markup(&token.content);
        Ok(None)
    }

    /// Handle a token inside the body of an open behaviour tag.
    fn body_token(&mut self, mut tag: OpenTag, token: Token) -> Result<Option<OpenTag>, TemplateError> {
        if token.is_tag() && self.supervisor.classify_token(&token, &self.node.scope(self.depth))? == TagClass::Skip {
            return Ok(Some(tag));
        }

        if token.name == tag.token.name {
            match token.kind {
                TokenKind::Open => tag.level += 1,
                TokenKind::Close if tag.level == 0 => {
                    self.register(tag.behaviour, tag.body, &tag.token)?;
                    return Ok(None);
                }
                TokenKind::Close => tag.level -= 1,
                TokenKind::Short | TokenKind::Text => {}
            }
        }

        tag.body.push(token);
        Ok(Some(tag))
    }

    fn register(&mut self, behaviour: Behaviour, body: Vec<Token>, token: &Token) -> Result<(), TemplateError> {
        let Behaviour {
            kind,
            attributes,
            options,
        } = behaviour;

        match kind {
            BehaviourKind::Block { name } => {
                let block = Node::parse(name, body, options, &mut *self.supervisor, self.depth + 1)?;
                self.node.children.push(Child::Node(block));
            }
            BehaviourKind::Extend { parent } => {
                if self.parent.is_some() {
                    self.supervisor.warn(
                        TemplateDiagnostic::warning(
                            format!("<{}> replaces a parent declared earlier in this node", token.name),
                            token.span.clone(),
                            token.file_id,
                        )
                        .with_note("only the last parent is extended; attributes of earlier ones are dropped"),
                    );
                    for index in std::mem::take(&mut self.parent_attributes).into_iter().rev() {
                        self.node.children.remove(index);
                    }
                }
                self.parent = Some(parent);

                for (name, value) in attributes {
                    let child = match value {
                        Attribute::Literal(text) => Node::with_text(name, text, self.node.options.clone()),
                        Attribute::Behaviour(nested) => Node::new(name, nested.options),
                    };
                    self.parent_attributes.push(self.node.children.len());
                    self.node.children.push(Child::Node(child));
                }
            }
            BehaviourKind::Import {
                mut context,
                extends,
            } => {
                for (name, value) in attributes {
                    let child = match value {
                        Attribute::Literal(text) => Node::with_text(name, text, Options::new()),
                        Attribute::Behaviour(nested) => Node::new(name, nested.options),
                    };
                    context.children.push(Child::Node(child));
                }

                let body = Node::parse(CONTEXT_BLOCK, body, options, &mut *self.supervisor, self.depth + 1)?;
                context.children.push(Child::Node(body));

                if let Some(parent) = extends {
                    context.extend_parent(parent)?;
                }
                self.node.children.push(Child::Node(context));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::tokenize;

    /// `block:NAME` tags define blocks, `drop` tags are skipped, `layout` and
    /// `framed` extend fixed parents, `card` imports a fixed template and
    /// everything else is plain markup. `framed` and `card` carry a nested
    /// `slot` block behaviour as an attribute.
    #[derive(Default)]
    struct TestSupervisor {
        warnings: Vec<TemplateDiagnostic>,
        max_depth: Option<usize>,
    }

    impl Supervisor for TestSupervisor {
        fn describe_token(&mut self, token: &Token, _scope: &Scope<'_>) -> Result<Describe, TemplateError> {
            if let Some(name) = token.name.strip_prefix("block:") {
                let mut behaviour = Behaviour::block(name);
                behaviour.options.insert("tag".into(), token.name.clone());
                return Ok(Describe::Behaviour(behaviour));
            }
            match token.name.as_str() {
                "drop" => Ok(Describe::Skip),
                "framed" => {
                    let parent = parse(self, "<div><block:body/></div>")?;
                    Ok(Describe::Behaviour(Behaviour::extend(parent).with_nested("slot", slot())))
                }
                "card" => {
                    let template = parse(self, "<section>${context}</section>")?;
                    let context = Node::new("", Options::new());
                    let behaviour = Behaviour::import(context, Some(template)).with_nested("slot", slot());
                    Ok(Describe::Behaviour(behaviour))
                }
                "layout" => {
                    let parent = parse(self, "<h1>${title|Untitled}</h1><p><block:body/></p>")?;
                    let mut behaviour = Behaviour::extend(parent);
                    for (name, value) in &token.attributes {
                        behaviour = behaviour.with_attribute(name.as_str(), value.as_str());
                    }
                    Ok(Describe::Behaviour(behaviour))
                }
                _ => Ok(Describe::Plain),
            }
        }

        fn classify_token(&mut self, token: &Token, _scope: &Scope<'_>) -> Result<TagClass, TemplateError> {
            Ok(match token.name.as_str() {
                "drop" => TagClass::Skip,
                "layout" | "framed" | "card" => TagClass::Behaviour,
                name if name.starts_with("block:") => TagClass::Behaviour,
                _ => TagClass::Plain,
            })
        }

        fn warn(&mut self, diagnostic: TemplateDiagnostic) {
            self.warnings.push(diagnostic);
        }

        fn max_depth(&self) -> usize {
            self.max_depth.unwrap_or(crate::DEFAULT_MAX_DEPTH)
        }
    }

    fn slot() -> Behaviour {
        let mut behaviour = Behaviour::block("slot");
        behaviour.options.insert("tag".into(), "nested".into());
        behaviour
    }

    fn nested_options() -> Options {
        let mut options = Options::new();
        options.insert("tag".into(), "nested".into());
        options
    }

    fn parse(supervisor: &mut TestSupervisor, source: &str) -> Result<Node, TemplateError> {
        let tokens = tokenize(source, 0)?;
        Node::root(tokens, supervisor)
    }

    fn render(source: &str) -> String {
        let mut supervisor = TestSupervisor::default();
        parse(&mut supervisor, source)
            .expect("parse failed")
            .compile()
            .expect("compile failed")
    }

    #[test]
    fn plain_markup_round_trips() {
        let source = "<!DOCTYPE html>\n<html><body class=\"x\"><p>Hi &amp; bye</p><br/></body></html>\n";
        assert_eq!(render(source), source);
    }

    #[test]
    fn short_tag_default() {
        assert_eq!(render("a ${x|default} b"), "a default b");
        assert_eq!(render("a ${x} b"), "a  b");
    }

    #[test]
    fn short_tags_inside_plain_tags() {
        assert_eq!(render("<a href=\"${url|/home}\">go</a>"), "<a href=\"/home\">go</a>");
    }

    #[test]
    fn consecutive_text_is_merged() {
        let mut supervisor = TestSupervisor::default();
        let node = parse(&mut supervisor, "a<b>c</b>d").unwrap();
        assert_eq!(node.children(), &[Child::Text("a<b>c</b>d".to_string())]);
    }

    #[test]
    fn blocks_become_named_children() {
        let mut supervisor = TestSupervisor::default();
        let node = parse(&mut supervisor, "x<block:title>Hello ${who|you}</block:title>y").unwrap();
        let title = node.find_node("title").expect("title block");
        assert_eq!(title.options.get("tag").map(String::as_str), Some("block:title"));
        assert_eq!(title.find_node("who").map(|n| n.options.clone()), Some(title.options.clone()));
        assert_eq!(node.compile().unwrap(), "xHello youy");
    }

    #[test]
    fn same_name_nesting_closes_the_outer_block() {
        let mut supervisor = TestSupervisor::default();
        let node = parse(
            &mut supervisor,
            "<block:a>1<block:a>2</block:a>3</block:a>4",
        )
        .unwrap();
        let outer = node.find_node("a").unwrap();
        let inner = outer.find_node("a").unwrap();
        assert_eq!(inner.children(), &[Child::Text("2".to_string())]);
        assert_eq!(node.compile().unwrap(), "1234");
    }

    #[test]
    fn short_block_registers_empty_node() {
        let mut supervisor = TestSupervisor::default();
        let node = parse(&mut supervisor, "a<block:empty/>b").unwrap();
        assert!(node.find_node("empty").unwrap().children().is_empty());
        assert_eq!(node.compile().unwrap(), "ab");
    }

    #[test]
    fn skipped_tags_are_dropped() {
        assert_eq!(render("a<drop/>b<drop>c"), "abc");
        assert_eq!(render("<block:x>1<drop/>2</block:x>"), "12");
    }

    #[test]
    fn stray_closing_tag_warns_and_continues() {
        let mut supervisor = TestSupervisor::default();
        let node = parse(&mut supervisor, "a</block:x>b</div>").unwrap();
        assert_eq!(node.compile().unwrap(), "a</block:x>b</div>");
        assert_eq!(supervisor.warnings.len(), 1);
        assert!(supervisor.warnings[0].message.contains("</block:x>"));
        assert!(supervisor.warnings[0].is_warning());
    }

    #[test]
    fn unclosed_block_is_kept_as_markup() {
        let mut supervisor = TestSupervisor::default();
        let node = parse(&mut supervisor, "a<block:x>b ${c|d}").unwrap();
        assert_eq!(node.compile().unwrap(), "a<block:x>b d");
        assert_eq!(supervisor.warnings.len(), 1);
        assert!(supervisor.warnings[0].message.contains("never closed"));
    }

    #[test]
    fn extend_with_attribute_overrides() {
        assert_eq!(
            render("<layout title=\"Home\"/>ignored<block:body>Text</block:body>"),
            "<h1>Home</h1><p>Text</p>"
        );
        assert_eq!(render("<layout/>"), "<h1>Untitled</h1><p></p>");
    }

    #[test]
    fn unmatched_blocks_are_skipped_after_extend() {
        let mut supervisor = TestSupervisor::default();
        let node = parse(&mut supervisor, "<layout class=\"box\"/><block:extra>e</block:extra>").unwrap();
        let names: Vec<&str> = node.skipped().iter().map(|n| n.name()).collect();
        assert_eq!(names, vec!["class", "extra"]);
        assert_eq!(node.compile().unwrap(), "<h1>Untitled</h1><p></p>");
    }

    #[test]
    fn nested_behaviour_attribute_of_extend_becomes_empty_node() {
        let mut supervisor = TestSupervisor::default();
        let node = parse(&mut supervisor, "<block:page><framed/><block:body>B</block:body></block:page>").unwrap();
        let page = node.find_node("page").unwrap();
        assert_eq!(page.options.get("tag").map(String::as_str), Some("block:page"));

        let slot = &page.skipped()[0];
        assert_eq!(page.skipped().len(), 1);
        assert_eq!(slot.name(), "slot");
        assert_eq!(slot.options, nested_options());
        assert!(slot.children().is_empty());
        assert_eq!(node.compile().unwrap(), "<div>B</div>");
    }

    #[test]
    fn nested_behaviour_attribute_of_import_becomes_empty_node() {
        let mut supervisor = TestSupervisor::default();
        let node = parse(&mut supervisor, "<block:page><card>C</card></block:page>").unwrap();
        let page = node.find_node("page").unwrap();
        let context = page.child_nodes().next().unwrap();
        assert!(context.is_anonymous());

        let slot = &context.skipped()[0];
        assert_eq!(context.skipped().len(), 1);
        assert_eq!(slot.name(), "slot");
        assert_eq!(slot.options, nested_options());
        assert!(slot.children().is_empty());
        assert_eq!(node.compile().unwrap(), "<section>C</section>");
    }

    #[test]
    fn second_extend_drops_attributes_of_the_first() {
        let mut supervisor = TestSupervisor::default();
        let node = parse(
            &mut supervisor,
            "<layout class=\"a\" title=\"First\"/>\n<layout id=\"b\"/><block:body>Text</block:body>",
        )
        .unwrap();
        let names: Vec<&str> = node.skipped().iter().map(|n| n.name()).collect();
        assert_eq!(names, vec!["id"]);
        assert_eq!(node.compile().unwrap(), "<h1>Untitled</h1><p>Text</p>");

        assert_eq!(supervisor.warnings.len(), 1);
        assert!(supervisor.warnings[0].is_warning());
        assert!(supervisor.warnings[0].message.contains("replaces a parent"));
        assert_eq!(supervisor.warnings[0].span(), Some(&(34..50)));
    }

    #[test]
    fn parse_depth_is_limited() {
        let mut supervisor = TestSupervisor {
            max_depth: Some(2),
            ..TestSupervisor::default()
        };
        let result = parse(&mut supervisor, "<block:a><block:b><block:c>x</block:c></block:b></block:a>");
        assert!(matches!(result, Err(TemplateError::RecursionLimitExceeded { limit: 2 })));

        let mut supervisor = TestSupervisor {
            max_depth: Some(2),
            ..TestSupervisor::default()
        };
        assert!(parse(&mut supervisor, "<block:a><block:b>x</block:b></block:a>").is_ok());
    }
}
