use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::expr::Expr;

/// Which decision a conditional contributes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConditionalKind {
    /// Any true SHOW makes the field visible during entry.
    Show,
    /// Any true HIDE hides the field during entry, overriding SHOW.
    Hide,
    /// Controls the read-only review summary only.
    DisplayOnReview,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Conditional {
    #[serde(rename = "type")]
    pub kind: ConditionalKind,
    pub expression: Expr,
}

impl Conditional {
    pub fn show(expression: Expr) -> Self {
        Self {
            kind: ConditionalKind::Show,
            expression,
        }
    }

    pub fn hide(expression: Expr) -> Self {
        Self {
            kind: ConditionalKind::Hide,
            expression,
        }
    }

    pub fn display_on_review(expression: Expr) -> Self {
        Self {
            kind: ConditionalKind::DisplayOnReview,
            expression,
        }
    }
}

/// A must-hold expression and the message shown when it does not.
///
/// The message is a handlebars template rendered with `field`, `label`, and
/// `value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ValidationRule {
    pub message: String,
    pub expression: Expr,
}

impl ValidationRule {
    pub fn new(message: impl Into<String>, expression: Expr) -> Self {
        Self {
            message: message.into(),
            expression,
        }
    }
}
