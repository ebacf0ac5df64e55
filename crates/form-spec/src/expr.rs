use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::action::ActionType;
use crate::scope::ScopeKind;

/// One side of a comparison: either another field's value or a constant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum Operand {
    Field { field: String },
    Literal { value: Value },
}

impl Operand {
    pub fn field(id: impl Into<String>) -> Self {
        Operand::Field { field: id.into() }
    }

    pub fn literal(value: impl Into<Value>) -> Self {
        Operand::Literal {
            value: value.into(),
        }
    }

    pub fn field_id(&self) -> Option<&str> {
        match self {
            Operand::Field { field } => Some(field),
            Operand::Literal { .. } => None,
        }
    }
}

impl From<&str> for Operand {
    fn from(value: &str) -> Self {
        Operand::literal(value)
    }
}

impl From<String> for Operand {
    fn from(value: String) -> Self {
        Operand::literal(value)
    }
}

impl From<bool> for Operand {
    fn from(value: bool) -> Self {
        Operand::literal(value)
    }
}

impl From<i64> for Operand {
    fn from(value: i64) -> Self {
        Operand::literal(value)
    }
}

impl From<f64> for Operand {
    fn from(value: f64) -> Self {
        Operand::literal(value)
    }
}

/// Which way a day offset shifts from today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Past,
    Future,
}

/// Right-hand side of `is_before` / `is_after`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DateBound {
    /// The evaluation date.
    Now,
    /// The evaluation date shifted by a number of days.
    Days { days: u32, direction: Direction },
    /// A date literal or another date field.
    Date { operand: Operand },
}

/// Conditional expression AST shared by visibility, validation, and action gates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Expr {
    Always,
    Never,
    Eq {
        left: Operand,
        right: Operand,
    },
    /// `null` in `values` matches an absent operand.
    InArray {
        operand: Operand,
        values: Vec<Value>,
    },
    Matches {
        operand: Operand,
        pattern: String,
    },
    IsFalsy {
        operand: Operand,
    },
    IsUndefined {
        operand: Operand,
    },
    IsBefore {
        operand: Operand,
        bound: DateBound,
    },
    IsAfter {
        operand: Operand,
        bound: DateBound,
    },
    IsBetween {
        operand: Operand,
        min: f64,
        max: f64,
    },
    And {
        expressions: Vec<Expr>,
    },
    Or {
        expressions: Vec<Expr>,
    },
    Not {
        expression: Box<Expr>,
    },
    HasScope {
        scope: ScopeKind,
    },
    HasAction {
        #[schemars(with = "String")]
        action: ActionType,
    },
}

impl Expr {
    /// Field ids referenced anywhere in the tree, in first-seen order.
    pub fn field_refs(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_field_refs(&mut out);
        out
    }

    fn collect_field_refs<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Expr::Always | Expr::Never | Expr::HasScope { .. } | Expr::HasAction { .. } => {}
            Expr::Eq { left, right } => {
                push_field(out, left);
                push_field(out, right);
            }
            Expr::InArray { operand, .. }
            | Expr::Matches { operand, .. }
            | Expr::IsFalsy { operand }
            | Expr::IsUndefined { operand }
            | Expr::IsBetween { operand, .. } => push_field(out, operand),
            Expr::IsBefore { operand, bound } | Expr::IsAfter { operand, bound } => {
                push_field(out, operand);
                if let DateBound::Date { operand } = bound {
                    push_field(out, operand);
                }
            }
            Expr::And { expressions } | Expr::Or { expressions } => {
                for expr in expressions {
                    expr.collect_field_refs(out);
                }
            }
            Expr::Not { expression } => expression.collect_field_refs(out),
        }
    }

    /// Regex patterns used anywhere in the tree.
    pub fn patterns(&self) -> Vec<&str> {
        match self {
            Expr::Matches { pattern, .. } => vec![pattern.as_str()],
            Expr::And { expressions } | Expr::Or { expressions } => {
                expressions.iter().flat_map(Expr::patterns).collect()
            }
            Expr::Not { expression } => expression.patterns(),
            _ => Vec::new(),
        }
    }

    /// Nesting depth of the tree; leaves count as one.
    pub fn depth(&self) -> usize {
        match self {
            Expr::And { expressions } | Expr::Or { expressions } => {
                1 + expressions.iter().map(Expr::depth).max().unwrap_or(0)
            }
            Expr::Not { expression } => 1 + expression.depth(),
            _ => 1,
        }
    }
}

fn push_field<'a>(out: &mut Vec<&'a str>, operand: &'a Operand) {
    if let Some(id) = operand.field_id()
        && !out.contains(&id)
    {
        out.push(id);
    }
}
