//! Boolean evaluation of [`Expr`] trees.
//!
//! Evaluation is pure: the result depends only on the expression and the
//! snapshot exposed by the [`EvalContext`]. Absent values are falsy, `and`/`or`
//! stop at the first determining operand, and dates compare at day granularity.

use std::collections::{BTreeMap, HashMap};

use chrono::{Days, NaiveDate};
use regex::Regex;
use serde_json::{Map, Value};

use crate::action::ActionType;
use crate::error::EvalError;
use crate::expr::{DateBound, Direction, Expr, Operand};
use crate::scope::ScopeKind;
use crate::value;

/// Expression trees nested deeper than this are rejected instead of
/// risking unbounded recursion.
pub const MAX_EXPRESSION_DEPTH: usize = 64;

/// What an expression can observe while it is evaluated.
pub trait EvalContext {
    /// Current value of a field, `None` when absent.
    fn field_value(&self, id: &str) -> Result<Option<&Value>, EvalError>;

    /// The day `now` resolves to.
    fn today(&self) -> NaiveDate;

    fn has_scope(&self, _scope: ScopeKind) -> bool {
        false
    }

    fn has_action(&self, _action: &ActionType) -> bool {
        false
    }

    /// Precompiled pattern, if the context carries one.
    fn pattern(&self, _pattern: &str) -> Option<&Regex> {
        None
    }
}

/// Read access to a declaration snapshot.
pub trait RecordAccessor {
    fn value(&self, id: &str) -> Option<&Value>;
}

impl RecordAccessor for Map<String, Value> {
    fn value(&self, id: &str) -> Option<&Value> {
        value::lookup_dotted(id, |key| self.get(key))
    }
}

impl RecordAccessor for BTreeMap<String, Value> {
    fn value(&self, id: &str) -> Option<&Value> {
        value::lookup_dotted(id, |key| self.get(key))
    }
}

impl RecordAccessor for HashMap<String, Value> {
    fn value(&self, id: &str) -> Option<&Value> {
        value::lookup_dotted(id, |key| self.get(key))
    }
}

impl RecordAccessor for Value {
    fn value(&self, id: &str) -> Option<&Value> {
        self.as_object().and_then(|map| map.value(id))
    }
}

/// Plain context over a record snapshot, without scope or action knowledge.
#[derive(Debug, Clone, Copy)]
pub struct RecordContext<'a, R: ?Sized> {
    record: &'a R,
    today: NaiveDate,
}

impl<'a, R: RecordAccessor + ?Sized> RecordContext<'a, R> {
    pub fn new(record: &'a R, today: NaiveDate) -> Self {
        Self { record, today }
    }
}

impl<R: RecordAccessor + ?Sized> EvalContext for RecordContext<'_, R> {
    fn field_value(&self, id: &str) -> Result<Option<&Value>, EvalError> {
        Ok(self.record.value(id))
    }

    fn today(&self) -> NaiveDate {
        self.today
    }
}

/// Evaluates an expression to a boolean.
pub fn evaluate<C: EvalContext + ?Sized>(expr: &Expr, ctx: &C) -> Result<bool, EvalError> {
    eval_at(expr, ctx, 0)
}

impl Expr {
    pub fn evaluate<C: EvalContext + ?Sized>(&self, ctx: &C) -> Result<bool, EvalError> {
        evaluate(self, ctx)
    }
}

fn eval_at<C: EvalContext + ?Sized>(
    expr: &Expr,
    ctx: &C,
    depth: usize,
) -> Result<bool, EvalError> {
    if depth >= MAX_EXPRESSION_DEPTH {
        return Err(EvalError::DepthExceeded {
            limit: MAX_EXPRESSION_DEPTH,
        });
    }
    match expr {
        Expr::Always => Ok(true),
        Expr::Never => Ok(false),
        Expr::Eq { left, right } => {
            let left = resolve(left, ctx)?;
            let right = resolve(right, ctx)?;
            Ok(match (left, right) {
                (Some(left), Some(right)) => value::values_equal(left, right),
                _ => false,
            })
        }
        Expr::InArray { operand, values } => Ok(match resolve(operand, ctx)? {
            Some(current) => values
                .iter()
                .any(|candidate| value::values_equal(current, candidate)),
            None => values.iter().any(Value::is_null),
        }),
        Expr::Matches { operand, pattern } => {
            let Some(text) = resolve(operand, ctx)?.and_then(value::as_text) else {
                return Ok(false);
            };
            match ctx.pattern(pattern) {
                Some(regex) => Ok(regex.is_match(&text)),
                None => Ok(compile_pattern(pattern)?.is_match(&text)),
            }
        }
        Expr::IsFalsy { operand } => Ok(value::is_falsy(resolve(operand, ctx)?)),
        Expr::IsUndefined { operand } => Ok(resolve(operand, ctx)?.is_none()),
        Expr::IsBefore { operand, bound } => {
            compare_dates(operand, bound, ctx, |date, limit| date <= limit)
        }
        Expr::IsAfter { operand, bound } => {
            compare_dates(operand, bound, ctx, |date, limit| date >= limit)
        }
        Expr::IsBetween { operand, min, max } => Ok(resolve(operand, ctx)?
            .and_then(value::as_number)
            .is_some_and(|number| *min <= number && number <= *max)),
        Expr::And { expressions } => {
            for expr in expressions {
                if !eval_at(expr, ctx, depth + 1)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        Expr::Or { expressions } => {
            for expr in expressions {
                if eval_at(expr, ctx, depth + 1)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Expr::Not { expression } => eval_at(expression, ctx, depth + 1).map(|value| !value),
        Expr::HasScope { scope } => Ok(ctx.has_scope(*scope)),
        Expr::HasAction { action } => Ok(ctx.has_action(action)),
    }
}

fn resolve<'c, C: EvalContext + ?Sized>(
    operand: &'c Operand,
    ctx: &'c C,
) -> Result<Option<&'c Value>, EvalError> {
    let value = match operand {
        Operand::Field { field } => ctx.field_value(field)?,
        Operand::Literal { value } => Some(value),
    };
    Ok(value.filter(|value| !value.is_null()))
}

fn compare_dates<C, F>(
    operand: &Operand,
    bound: &DateBound,
    ctx: &C,
    holds: F,
) -> Result<bool, EvalError>
where
    C: EvalContext + ?Sized,
    F: Fn(NaiveDate, NaiveDate) -> bool,
{
    let Some(date) = resolve(operand, ctx)?.and_then(value::as_date) else {
        return Ok(false);
    };
    let limit = match bound {
        DateBound::Now => Some(ctx.today()),
        DateBound::Days { days, direction } => {
            let shift = Days::new(u64::from(*days));
            match direction {
                Direction::Past => ctx.today().checked_sub_days(shift),
                Direction::Future => ctx.today().checked_add_days(shift),
            }
        }
        DateBound::Date { operand } => resolve(operand, ctx)?.and_then(value::as_date),
    };
    Ok(limit.is_some_and(|limit| holds(date, limit)))
}

pub(crate) fn compile_pattern(pattern: &str) -> Result<Regex, EvalError> {
    Regex::new(pattern).map_err(|err| EvalError::InvalidPattern {
        pattern: pattern.to_string(),
        message: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::dsl::{and, field, never, not, or};
    use serde_json::json;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 15).expect("date")
    }

    /// Counts every field lookup so tests can observe short-circuiting.
    struct CountingContext {
        record: Value,
        lookups: Cell<usize>,
    }

    impl EvalContext for CountingContext {
        fn field_value(&self, id: &str) -> Result<Option<&Value>, EvalError> {
            self.lookups.set(self.lookups.get() + 1);
            Ok(self.record.value(id))
        }

        fn today(&self) -> NaiveDate {
            today()
        }
    }

    #[test]
    fn and_short_circuits_on_first_false() {
        let ctx = CountingContext {
            record: json!({ "a": "no", "b": "yes" }),
            lookups: Cell::new(0),
        };
        let expr = and([field("a").is_equal_to("yes"), field("b").is_equal_to("yes")]);
        assert!(!evaluate(&expr, &ctx).expect("eval"));
        assert_eq!(ctx.lookups.get(), 1);
    }

    #[test]
    fn or_short_circuits_on_first_true() {
        let ctx = CountingContext {
            record: json!({ "a": "yes" }),
            lookups: Cell::new(0),
        };
        let expr = or([field("a").is_equal_to("yes"), field("b").is_falsy()]);
        assert!(evaluate(&expr, &ctx).expect("eval"));
        assert_eq!(ctx.lookups.get(), 1);
    }

    #[test]
    fn absent_values_are_falsy_and_never_equal() {
        let record = json!({});
        let ctx = RecordContext::new(&record, today());
        assert!(!evaluate(&field("x").is_equal_to("a"), &ctx).expect("eval"));
        assert!(!evaluate(&field("x").in_array(["a", "b"]), &ctx).expect("eval"));
        assert!(evaluate(&field("x").is_falsy(), &ctx).expect("eval"));
        assert!(evaluate(&field("x").is_undefined(), &ctx).expect("eval"));
        assert!(!evaluate(&field("x").is_equal_to(field("y")), &ctx).expect("eval"));
    }

    #[test]
    fn null_sentinel_in_array_matches_absent() {
        let record = json!({ "present": null });
        let ctx = RecordContext::new(&record, today());
        let expr = field("present").in_array([Value::Null, json!("a")]);
        assert!(evaluate(&expr, &ctx).expect("eval"));
    }

    #[test]
    fn hide_until_chosen_idiom() {
        let expr = or([
            field("kind").is_undefined(),
            not(field("kind").in_array(["A", "B"])),
        ]);
        for (record, hidden) in [
            (json!({}), true),
            (json!({ "kind": "A" }), false),
            (json!({ "kind": "C" }), true),
        ] {
            let ctx = RecordContext::new(&record, today());
            assert_eq!(evaluate(&expr, &ctx).expect("eval"), hidden);
        }
    }

    #[test]
    fn cross_field_comparison() {
        let expr = not(field("x.nid").is_equal_to(field("y.nid")));
        let same = json!({ "x.nid": "123", "y.nid": "123" });
        let different = json!({ "x.nid": "123", "y.nid": "456" });
        assert!(!evaluate(&expr, &RecordContext::new(&same, today())).expect("eval"));
        assert!(evaluate(&expr, &RecordContext::new(&different, today())).expect("eval"));
    }

    #[test]
    fn is_before_now_is_inclusive_of_today() {
        let expr = field("dob").is_before().now();
        let tomorrow = json!({ "dob": "2024-06-16" });
        let same_day = json!({ "dob": "2024-06-15T22:10:00Z" });
        assert!(!evaluate(&expr, &RecordContext::new(&tomorrow, today())).expect("eval"));
        assert!(evaluate(&expr, &RecordContext::new(&same_day, today())).expect("eval"));
    }

    #[test]
    fn shifted_bounds_follow_direction() {
        let older_than_30_days = field("event.date").is_before().days(30).in_past();
        let within_a_week = field("event.date").is_before().days(7).in_future();
        let old = json!({ "event.date": "2024-05-01" });
        let recent = json!({ "event.date": "2024-06-10" });
        assert!(evaluate(&older_than_30_days, &RecordContext::new(&old, today())).expect("eval"));
        assert!(
            !evaluate(&older_than_30_days, &RecordContext::new(&recent, today())).expect("eval")
        );
        assert!(evaluate(&within_a_week, &RecordContext::new(&recent, today())).expect("eval"));
    }

    #[test]
    fn date_bound_can_reference_another_field() {
        let expr = field("end").is_after().date(field("start"));
        let ordered = json!({ "start": "2024-01-01", "end": "2024-01-01" });
        let reversed = json!({ "start": "2024-01-02", "end": "2024-01-01" });
        let missing = json!({ "end": "2024-01-01" });
        assert!(evaluate(&expr, &RecordContext::new(&ordered, today())).expect("eval"));
        assert!(!evaluate(&expr, &RecordContext::new(&reversed, today())).expect("eval"));
        assert!(!evaluate(&expr, &RecordContext::new(&missing, today())).expect("eval"));
    }

    #[test]
    fn matches_and_between() {
        let record = json!({ "nid": "1234567890", "age": "42", "weight": 3.5 });
        let ctx = RecordContext::new(&record, today());
        assert!(evaluate(&field("nid").matches(r"^\d{10}$"), &ctx).expect("eval"));
        assert!(!evaluate(&field("nid").matches(r"^\d{9}$"), &ctx).expect("eval"));
        assert!(evaluate(&field("age").is_between(18.0, 120.0), &ctx).expect("eval"));
        assert!(!evaluate(&field("weight").is_between(4.0, 9.0), &ctx).expect("eval"));
    }

    #[test]
    fn invalid_pattern_fails_loudly() {
        let record = json!({ "nid": "1" });
        let ctx = RecordContext::new(&record, today());
        let err = evaluate(&field("nid").matches("("), &ctx).expect_err("invalid");
        assert!(matches!(err, EvalError::InvalidPattern { .. }));
    }

    #[test]
    fn never_is_always_false() {
        let record = json!({});
        let ctx = RecordContext::new(&record, today());
        assert!(!evaluate(&never(), &ctx).expect("eval"));
        assert!(evaluate(&not(never()), &ctx).expect("eval"));
    }

    #[test]
    fn deep_trees_are_rejected() {
        let mut expr = never();
        for _ in 0..(MAX_EXPRESSION_DEPTH + 1) {
            expr = not(expr);
        }
        let record = json!({});
        let ctx = RecordContext::new(&record, today());
        assert_eq!(
            evaluate(&expr, &ctx),
            Err(EvalError::DepthExceeded {
                limit: MAX_EXPRESSION_DEPTH
            })
        );
    }
}
