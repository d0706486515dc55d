use std::fmt;
use std::ops::Range;

use codespan_reporting::diagnostic::{Diagnostic, Label, Severity};

/// A diagnostic with optional source location, rendered through codespan-reporting.
#[derive(Debug, Clone)]
pub struct TemplateDiagnostic {
    pub message: String,
    /// `(file_id, byte span)` of the offending source, when known.
    pub location: Option<(usize, Range<usize>)>,
    pub severity: Severity,
    pub notes: Vec<String>,
}

impl TemplateDiagnostic {
    pub fn error(message: impl Into<String>, span: Range<usize>, file_id: usize) -> Self {
        TemplateDiagnostic {
            message: message.into(),
            location: Some((file_id, span)),
            severity: Severity::Error,
            notes: Vec::new(),
        }
    }

    pub fn warning(message: impl Into<String>, span: Range<usize>, file_id: usize) -> Self {
        TemplateDiagnostic {
            message: message.into(),
            location: Some((file_id, span)),
            severity: Severity::Warning,
            notes: Vec::new(),
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    pub fn is_warning(&self) -> bool {
        self.severity == Severity::Warning
    }

    pub fn span(&self) -> Option<&Range<usize>> {
        self.location.as_ref().map(|(_, span)| span)
    }

    /// Convert to a codespan-reporting Diagnostic for display.
    pub fn to_diagnostic(&self) -> Diagnostic<usize> {
        let labels = match &self.location {
            Some((file_id, span)) => vec![Label::primary(*file_id, span.clone())],
            None => Vec::new(),
        };
        Diagnostic::new(self.severity)
            .with_message(&self.message)
            .with_labels(labels)
            .with_notes(self.notes.clone())
    }
}

impl fmt::Display for TemplateDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

#[derive(Debug)]
pub enum TemplateError {
    /// The tokenizer rejected the source.
    Syntax(Vec<TemplateDiagnostic>),
    RecursionLimitExceeded { limit: usize },
    /// A view was requested while it was still being built; holds the chain.
    CyclicReference(Vec<String>),
    AlreadyExtended(String),
    UndefinedView(String),
    Io(String),
    Custom(String),
}

impl fmt::Display for TemplateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplateError::Syntax(diagnostics) => {
                let messages: Vec<&str> =
                    diagnostics.iter().map(|d| d.message.as_str()).collect();
                write!(f, "syntax error: {}", messages.join("; "))
            }
            TemplateError::RecursionLimitExceeded { limit } => {
                write!(f, "template nesting exceeds the depth limit of {}", limit)
            }
            TemplateError::CyclicReference(chain) => {
                write!(f, "cyclic view reference: {}", chain.join(" -> "))
            }
            TemplateError::AlreadyExtended(name) => {
                write!(f, "node '{}' has already been extended", name)
            }
            TemplateError::UndefinedView(name) => write!(f, "undefined view: {}", name),
            TemplateError::Io(msg) => write!(f, "I/O error: {}", msg),
            TemplateError::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for TemplateError {}

impl From<Vec<TemplateDiagnostic>> for TemplateError {
    fn from(diagnostics: Vec<TemplateDiagnostic>) -> Self {
        TemplateError::Syntax(diagnostics)
    }
}
