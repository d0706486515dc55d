use std::collections::HashMap;
use std::path::{Path, PathBuf};

use codespan_reporting::files::SimpleFiles;
use templater::tokenizer::tokenize;
use templater::{Node, RenderPass, TemplateDiagnostic, TemplateError, Token};

use crate::config::ViewsConfig;
use crate::source::{ViewSource, normalize_name};
use crate::supervisor::ViewSupervisor;

/// A set of views plus everything cached about them: registered source
/// files (for diagnostics) and token streams. Nodes are never cached; each
/// render builds its own tree.
pub struct Views {
    source: ViewSource,
    pub config: ViewsConfig,
    files: SimpleFiles<String, String>,
    /// Token streams keyed by normalized view name.
    tokens: HashMap<String, Vec<Token>>,
}

/// A parsed view tree with the warnings raised while building it.
#[derive(Debug)]
pub struct Parsed {
    pub node: Node,
    pub warnings: Vec<TemplateDiagnostic>,
}

#[derive(Debug)]
pub struct Rendered {
    pub output: String,
    pub warnings: Vec<TemplateDiagnostic>,
}

impl Views {
    pub fn new(source: ViewSource, config: ViewsConfig) -> Self {
        Views {
            source,
            config,
            files: SimpleFiles::new(),
            tokens: HashMap::new(),
        }
    }

    pub fn directory(root: impl Into<PathBuf>) -> Self {
        Views::new(ViewSource::Directory(root.into()), ViewsConfig::default())
    }

    /// Views under `root`, with the namespaces listed in `config`.
    pub fn configured(root: &Path, config: ViewsConfig) -> Self {
        Views::new(ViewSource::namespaced(root, &config.namespaces), config)
    }

    pub fn memory<I, K, V>(views: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        Views::new(ViewSource::memory(views), ViewsConfig::default())
    }

    /// Source files read so far, for rendering diagnostics.
    pub fn files(&self) -> &SimpleFiles<String, String> {
        &self.files
    }

    /// Tokens of a view, read and tokenized on first use.
    pub fn tokens(&mut self, view: &str) -> Result<Vec<Token>, TemplateError> {
        let name = normalize_name(view);
        if let Some(tokens) = self.tokens.get(&name) {
            return Ok(tokens.clone());
        }

        let (display, source) = self.source.read(&name, &self.config.extension)?;
        let file_id = self.files.add(display, source.clone());
        let tokens = tokenize(&source, file_id)?;
        tracing::debug!(view = %name, tokens = tokens.len(), "tokenized view");

        self.tokens.insert(name, tokens.clone());
        Ok(tokens)
    }

    /// Build the node tree of a view, resolving every extend and import.
    ///
    /// A tree returned here compiles within `config.max_depth`.
    pub fn parse(&mut self, view: &str) -> Result<Parsed, TemplateError> {
        let mut supervisor = ViewSupervisor::new(self);
        let node = supervisor.build_root(view)?;
        let warnings = supervisor.into_warnings();
        node.check_depth(self.config.max_depth)?;
        Ok(Parsed { node, warnings })
    }

    /// Parse and compile a view in a fresh render pass.
    pub fn render(&mut self, view: &str) -> Result<Rendered, TemplateError> {
        let Parsed { node, warnings } = self.parse(view)?;
        let mut pass = RenderPass::new(self.config.max_depth);
        let output = node.compile_with(&mut pass)?;
        Ok(Rendered { output, warnings })
    }
}
