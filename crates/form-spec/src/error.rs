use std::fmt;

use thiserror::Error;

/// Authoring defects rejected when a form version is published.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("form '{form}' has no pages")]
    EmptyForm { form: String },
    #[error("field id '{id}' is declared more than once")]
    DuplicateFieldId { id: String },
    #[error("page id '{id}' is declared more than once")]
    DuplicatePageId { id: String },
    #[error("'{owner}' references unknown field '{reference}'")]
    UnknownFieldReference { owner: String, reference: String },
    #[error("'{owner}' uses invalid pattern '{pattern}': {message}")]
    InvalidPattern {
        owner: String,
        pattern: String,
        message: String,
    },
    #[error("field '{field}' has contradictory conditionals: {reason}")]
    ContradictoryConditionals { field: String, reason: String },
    #[error("presentational field '{field}' cannot be required or carry validation rules")]
    PresentationalValidation { field: String },
    #[error("location field '{field}' must declare its parent through a location filter")]
    MissingLocationFilter { field: String },
    #[error("'{owner}' nests an expression {depth} levels deep; the limit is {limit}")]
    ExpressionTooDeep {
        owner: String,
        depth: usize,
        limit: usize,
    },
    #[error("visibility cycle detected: {}", path.join(" -> "))]
    VisibilityCycle { path: Vec<String> },
    #[error("form '{id}' version '{version}' is already published with different content")]
    VersionConflict { id: String, version: String },
}

/// Every schema error found during one publish attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaErrors(pub Vec<SchemaError>);

impl SchemaErrors {
    pub fn iter(&self) -> impl Iterator<Item = &SchemaError> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for SchemaErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages = self.0.iter().map(ToString::to_string).collect::<Vec<_>>();
        write!(f, "schema rejected: {}", messages.join("; "))
    }
}

impl std::error::Error for SchemaErrors {}

impl From<SchemaError> for SchemaErrors {
    fn from(error: SchemaError) -> Self {
        SchemaErrors(vec![error])
    }
}

/// Developer-facing failures raised while evaluating an expression.
///
/// These never describe bad user input; they indicate an authoring defect
/// that slipped past publish-time checks.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    #[error("visibility of '{field}' depends on itself")]
    Cycle { field: String },
    #[error("evaluation exceeded the nesting limit of {limit}")]
    DepthExceeded { limit: usize },
    #[error("pattern '{pattern}' is not a valid regular expression: {message}")]
    InvalidPattern { pattern: String, message: String },
}
