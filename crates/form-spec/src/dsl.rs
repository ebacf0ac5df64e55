//! Fluent constructors for [`Expr`] trees.
//!
//! ```
//! use form_spec::dsl::{and, field, not};
//!
//! let expr = and([
//!     field("informant.address.country").is_equal_to("FAR"),
//!     not(field("informant.nid").is_equal_to(field("mother.nid"))),
//! ]);
//! assert_eq!(expr.field_refs().len(), 3);
//! ```

use serde_json::Value;

use crate::action::ActionType;
use crate::expr::{DateBound, Direction, Expr, Operand};
use crate::scope::ScopeKind;

/// Reference to a field, the entry point for comparisons.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldRef {
    id: String,
}

pub fn field(id: impl Into<String>) -> FieldRef {
    FieldRef { id: id.into() }
}

impl From<FieldRef> for Operand {
    fn from(field: FieldRef) -> Self {
        Operand::Field { field: field.id }
    }
}

impl FieldRef {
    pub fn id(&self) -> &str {
        &self.id
    }

    fn operand(&self) -> Operand {
        Operand::field(self.id.clone())
    }

    pub fn is_equal_to(&self, other: impl Into<Operand>) -> Expr {
        Expr::Eq {
            left: self.operand(),
            right: other.into(),
        }
    }

    pub fn in_array<I, V>(&self, values: I) -> Expr
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Expr::InArray {
            operand: self.operand(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn matches(&self, pattern: impl Into<String>) -> Expr {
        Expr::Matches {
            operand: self.operand(),
            pattern: pattern.into(),
        }
    }

    pub fn is_falsy(&self) -> Expr {
        Expr::IsFalsy {
            operand: self.operand(),
        }
    }

    pub fn is_undefined(&self) -> Expr {
        Expr::IsUndefined {
            operand: self.operand(),
        }
    }

    pub fn is_between(&self, min: f64, max: f64) -> Expr {
        Expr::IsBetween {
            operand: self.operand(),
            min,
            max,
        }
    }

    pub fn is_before(&self) -> DateComparison {
        DateComparison {
            operand: self.operand(),
            before: true,
        }
    }

    pub fn is_after(&self) -> DateComparison {
        DateComparison {
            operand: self.operand(),
            before: false,
        }
    }
}

/// Half-built `is_before` / `is_after`, completed by choosing the bound.
#[derive(Debug, Clone)]
pub struct DateComparison {
    operand: Operand,
    before: bool,
}

impl DateComparison {
    fn finish(self, bound: DateBound) -> Expr {
        if self.before {
            Expr::IsBefore {
                operand: self.operand,
                bound,
            }
        } else {
            Expr::IsAfter {
                operand: self.operand,
                bound,
            }
        }
    }

    pub fn now(self) -> Expr {
        self.finish(DateBound::Now)
    }

    pub fn date(self, other: impl Into<Operand>) -> Expr {
        self.finish(DateBound::Date {
            operand: other.into(),
        })
    }

    pub fn days(self, days: u32) -> ShiftedDate {
        ShiftedDate {
            comparison: self,
            days,
        }
    }
}

/// `now` shifted by a day count; the qualifier picks the direction.
#[derive(Debug, Clone)]
pub struct ShiftedDate {
    comparison: DateComparison,
    days: u32,
}

impl ShiftedDate {
    pub fn in_past(self) -> Expr {
        self.finish(Direction::Past)
    }

    pub fn in_future(self) -> Expr {
        self.finish(Direction::Future)
    }

    fn finish(self, direction: Direction) -> Expr {
        let days = self.days;
        self.comparison.finish(DateBound::Days { days, direction })
    }
}

pub fn and(expressions: impl IntoIterator<Item = Expr>) -> Expr {
    Expr::And {
        expressions: expressions.into_iter().collect(),
    }
}

pub fn or(expressions: impl IntoIterator<Item = Expr>) -> Expr {
    Expr::Or {
        expressions: expressions.into_iter().collect(),
    }
}

pub fn not(expression: Expr) -> Expr {
    Expr::Not {
        expression: Box::new(expression),
    }
}

pub fn never() -> Expr {
    Expr::Never
}

pub fn always() -> Expr {
    Expr::Always
}

pub fn has_scope(scope: ScopeKind) -> Expr {
    Expr::HasScope { scope }
}

pub fn has_action(action: ActionType) -> Expr {
    Expr::HasAction { action }
}

/// `id` must differ from every counterpart field. Absent counterparts never
/// collide.
pub fn distinct_from<I, S>(id: &str, counterparts: I) -> Expr
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    and(counterparts
        .into_iter()
        .map(|other| not(field(id).is_equal_to(field(other)))))
}
