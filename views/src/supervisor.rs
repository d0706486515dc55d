use std::collections::HashMap;

use templater::{
    Behaviour, Describe, Node, Options, ROOT_NODE, Scope, Supervisor, TagClass, TemplateDiagnostic,
    TemplateError, Token, TokenKind,
};

use crate::registry::Views;
use crate::source::normalize_name;

const BLOCK_PREFIX: &str = "block:";
const EXTENDS_TAG: &str = "extends";
const USE_TAG: &str = "use";

/// Option key naming the view a behaviour came from.
pub const VIEW_OPTION: &str = "view";

/// A view whose tokens are being parsed.
struct Frame {
    view: String,
    /// Tag aliases declared with `<use path=".." as=".."/>`, alias → view.
    aliases: HashMap<String, String>,
}

/// Behaviour supervisor backed by a [`Views`] set.
///
/// Recognized tags:
/// - `<block:NAME>` defines a block;
/// - `<extends:VIEW .../>` or `<extends path="VIEW" .../>` extends a view;
/// - `<use path="VIEW" as="ALIAS"/>` declares an alias for the rest of the view;
/// - `<ALIAS ...>body</ALIAS>` imports the aliased view.
pub struct ViewSupervisor<'v> {
    views: &'v mut Views,
    frames: Vec<Frame>,
    warnings: Vec<TemplateDiagnostic>,
}

enum Kind<'t> {
    Block(&'t str),
    Extends,
    Use,
    Import(String),
    Plain,
}

impl<'v> ViewSupervisor<'v> {
    pub fn new(views: &'v mut Views) -> Self {
        ViewSupervisor {
            views,
            frames: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn into_warnings(self) -> Vec<TemplateDiagnostic> {
        self.warnings
    }

    pub fn build_root(&mut self, view: &str) -> Result<Node, TemplateError> {
        self.build(view, ROOT_NODE, 0)
    }

    /// Parse a view into a fresh node named `name`.
    fn build(&mut self, view: &str, name: &str, depth: usize) -> Result<Node, TemplateError> {
        let view = normalize_name(view);
        if self.frames.iter().any(|frame| frame.view == view) {
            let mut chain: Vec<String> = self.frames.iter().map(|f| f.view.clone()).collect();
            chain.push(view);
            return Err(TemplateError::CyclicReference(chain));
        }

        let tokens = self.views.tokens(&view)?;
        tracing::debug!(view = %view, depth, "building view");

        self.frames.push(Frame {
            view: view.clone(),
            aliases: HashMap::new(),
        });
        let result = Node::parse(name, tokens, self.options(), self, depth);
        self.frames.pop();
        result
    }

    fn current_view(&self) -> &str {
        self.frames.last().map_or("", |frame| frame.view.as_str())
    }

    fn options(&self) -> Options {
        let mut options = Options::new();
        options.insert(VIEW_OPTION.to_string(), self.current_view().to_string());
        options
    }

    fn kind<'t>(&self, token: &'t Token) -> Kind<'t> {
        if let Some(name) = token.name.strip_prefix(BLOCK_PREFIX) {
            if !name.is_empty() {
                return Kind::Block(name);
            }
        }
        if token.name == EXTENDS_TAG || token.name.starts_with("extends:") {
            return Kind::Extends;
        }
        if token.name == USE_TAG {
            return Kind::Use;
        }
        match self.frames.last().and_then(|frame| frame.aliases.get(&token.name)) {
            Some(view) => Kind::Import(view.clone()),
            None => Kind::Plain,
        }
    }

    /// Register the alias declared by a `use` tag.
    fn declare_alias(&mut self, token: &Token) -> Result<(), TemplateError> {
        let (Some(path), Some(alias)) = (token.attribute("path"), token.attribute("as")) else {
            return Err(TemplateError::Syntax(vec![
                TemplateDiagnostic::error(
                    "<use> needs both a 'path' and an 'as' attribute",
                    token.span.clone(),
                    token.file_id,
                )
                .with_note("example: <use path=\"partials.card\" as=\"card\"/>"),
            ]));
        };
        let (alias, path) = (alias.to_string(), path.to_string());
        if let Some(frame) = self.frames.last_mut() {
            tracing::debug!(view = %frame.view, alias = %alias, target = %path, "declared alias");
            frame.aliases.insert(alias, path);
        }
        Ok(())
    }

    /// Literal attributes of a tag, minus the ones consumed by the tag itself.
    fn with_attributes(mut behaviour: Behaviour, token: &Token, consumed: &[&str]) -> Behaviour {
        for (name, value) in &token.attributes {
            if !consumed.contains(&name.as_str()) {
                behaviour = behaviour.with_attribute(name.as_str(), value.as_str());
            }
        }
        behaviour
    }

    fn describe_extends(&mut self, token: &Token, depth: usize) -> Result<Describe, TemplateError> {
        let target = match token.name.strip_prefix("extends:") {
            Some(view) => Some(view.to_string()),
            None => token.attribute("path").map(str::to_string),
        };
        let Some(target) = target.filter(|view| !normalize_name(view).is_empty()) else {
            return Err(TemplateError::Syntax(vec![TemplateDiagnostic::error(
                "<extends> needs a view, as <extends:VIEW/> or <extends path=\"VIEW\"/>",
                token.span.clone(),
                token.file_id,
            )]));
        };

        let parent = self.build(&target, &normalize_name(&target), depth + 1)?;
        let behaviour = Behaviour::extend(parent).with_options(self.options());
        Ok(Describe::Behaviour(Self::with_attributes(behaviour, token, &["path"])))
    }

    fn describe_import(&mut self, token: &Token, view: &str, depth: usize) -> Result<Describe, TemplateError> {
        let template = self.build(view, &normalize_name(view), depth + 1)?;
        let context = Node::new("", self.options());
        let behaviour = Behaviour::import(context, Some(template)).with_options(self.options());
        Ok(Describe::Behaviour(Self::with_attributes(behaviour, token, &[])))
    }
}

impl Supervisor for ViewSupervisor<'_> {
    fn describe_token(&mut self, token: &Token, scope: &Scope<'_>) -> Result<Describe, TemplateError> {
        match self.kind(token) {
            Kind::Block(name) => Ok(Describe::Behaviour(
                Behaviour::block(name).with_options(self.options()),
            )),
            Kind::Extends => self.describe_extends(token, scope.depth),
            Kind::Use => {
                if token.kind != TokenKind::Close {
                    self.declare_alias(token)?;
                }
                Ok(Describe::Skip)
            }
            Kind::Import(view) => self.describe_import(token, &view, scope.depth),
            Kind::Plain => Ok(Describe::Plain),
        }
    }

    fn classify_token(&mut self, token: &Token, _scope: &Scope<'_>) -> Result<TagClass, TemplateError> {
        Ok(match self.kind(token) {
            Kind::Use => {
                if token.kind != TokenKind::Close {
                    self.declare_alias(token)?;
                }
                TagClass::Skip
            }
            Kind::Block(_) | Kind::Extends | Kind::Import(_) => TagClass::Behaviour,
            Kind::Plain => TagClass::Plain,
        })
    }

    fn warn(&mut self, diagnostic: TemplateDiagnostic) {
        tracing::debug!(view = %self.current_view(), "{}", diagnostic);
        self.warnings.push(diagnostic);
    }

    fn max_depth(&self) -> usize {
        self.views.config.max_depth
    }
}
