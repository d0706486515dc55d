use crate::error::{TemplateDiagnostic, TemplateError};
use crate::node::{Node, Options};
use crate::token::Token;

/// What a tag does to the node tree.
#[derive(Debug)]
pub enum BehaviourKind {
    /// Defines a named block whose body is parsed into a child node.
    Block { name: String },
    /// Grafts the current node's named blocks into `parent`, which then
    /// replaces the current node's content.
    Extend { parent: Node },
    /// Appends `context` to the current node, after attaching the tag's
    /// attributes and body to it and, when `extends` is set, grafting them
    /// into that template.
    Import {
        context: Node,
        extends: Option<Node>,
    },
}

#[derive(Debug)]
pub enum Attribute {
    Literal(String),
    Behaviour(Box<Behaviour>),
}

/// A resolved tag behaviour, produced by a [`Supervisor`].
#[derive(Debug)]
pub struct Behaviour {
    pub kind: BehaviourKind,
    /// Extra child nodes keyed by attribute name, in source order.
    pub attributes: Vec<(String, Attribute)>,
    pub options: Options,
}

impl Behaviour {
    pub fn block(name: impl Into<String>) -> Self {
        Behaviour {
            kind: BehaviourKind::Block { name: name.into() },
            attributes: Vec::new(),
            options: Options::new(),
        }
    }

    pub fn extend(parent: Node) -> Self {
        Behaviour {
            kind: BehaviourKind::Extend { parent },
            attributes: Vec::new(),
            options: Options::new(),
        }
    }

    pub fn import(context: Node, extends: Option<Node>) -> Self {
        Behaviour {
            kind: BehaviourKind::Import { context, extends },
            attributes: Vec::new(),
            options: Options::new(),
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes
            .push((name.into(), Attribute::Literal(value.into())));
        self
    }

    /// Attach a behaviour as an attribute. The attribute becomes an empty
    /// node carrying the nested behaviour's options.
    pub fn with_nested(mut self, name: impl Into<String>, nested: Behaviour) -> Self {
        self.attributes
            .push((name.into(), Attribute::Behaviour(Box::new(nested))));
        self
    }

    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }
}

/// Result of describing an opening or short tag.
#[derive(Debug)]
pub enum Describe {
    /// Drop the token from the output.
    Skip,
    /// Keep the token as literal markup.
    Plain,
    Behaviour(Behaviour),
}

/// Payload-free classification of a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagClass {
    Skip,
    Plain,
    Behaviour,
}

impl From<&Describe> for TagClass {
    fn from(describe: &Describe) -> Self {
        match describe {
            Describe::Skip => TagClass::Skip,
            Describe::Plain => TagClass::Plain,
            Describe::Behaviour(_) => TagClass::Behaviour,
        }
    }
}

/// The node being parsed when a token is described.
#[derive(Debug, Clone, Copy)]
pub struct Scope<'a> {
    pub node: &'a str,
    pub options: &'a Options,
    /// Nesting depth of the node; nodes built for behaviours sit one level deeper.
    pub depth: usize,
}

/// Decides what tags mean. The node parser never interprets tag names itself.
pub trait Supervisor {
    fn describe_token(&mut self, token: &Token, scope: &Scope<'_>) -> Result<Describe, TemplateError>;

    /// Classify a token without materializing its behaviour. Used for closing
    /// tags and for tags inside a body that is still being collected.
    fn classify_token(&mut self, token: &Token, scope: &Scope<'_>) -> Result<TagClass, TemplateError> {
        self.describe_token(token, scope).map(|d| TagClass::from(&d))
    }

    /// Receive a non-fatal diagnostic.
    fn warn(&mut self, diagnostic: TemplateDiagnostic) {
        tracing::warn!("{}", diagnostic);
    }

    fn max_depth(&self) -> usize {
        crate::DEFAULT_MAX_DEPTH
    }
}
