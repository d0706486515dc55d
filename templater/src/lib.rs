pub mod behaviour;
pub mod error;
pub mod node;
pub mod token;
pub mod tokenizer;

pub use behaviour::{Attribute, Behaviour, BehaviourKind, Describe, Scope, Supervisor, TagClass};
pub use error::{TemplateDiagnostic, TemplateError};
pub use node::{CONTEXT_BLOCK, Child, Node, Options, ROOT_NODE};
pub use node::compile::RenderPass;
pub use token::{Token, TokenKind};

/// Recursion limit applied to parsing and compiling when nothing else is configured.
pub const DEFAULT_MAX_DEPTH: usize = 64;
