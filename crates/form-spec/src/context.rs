//! Evaluation context over a published form and one record snapshot.
//!
//! [`FormContext`] resolves field and page visibility lazily and memoizes the
//! result per slot for the lifetime of the context, which is a single pass
//! over one immutable snapshot. In [`VisibilityMode::Cascade`] a hidden
//! field's value reads as absent, so visibility can depend on visibility;
//! re-entering a slot that is still being resolved is reported as a cycle.

use std::cell::Cell;
use std::fmt;

use chrono::{NaiveDate, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::EvalError;
use crate::eval::{EvalContext, evaluate};
use crate::expr::Expr;
use crate::location::LocationSource;
use crate::publish::PublishedForm;
use crate::record::DeclarationRecord;
use crate::spec::{Conditional, ConditionalKind};
use crate::value;

/// Longest chain of visibility lookups followed before giving up.
pub const MAX_RESOLVE_DEPTH: usize = 256;

/// How values of hidden fields appear to expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisibilityMode {
    /// Hidden fields read as absent, transitively.
    #[default]
    Cascade,
    /// Expressions read the raw snapshot.
    Snapshot,
}

/// Settings shared by every engine entry point.
#[derive(Clone, Copy)]
pub struct EngineOptions<'a> {
    pub today: NaiveDate,
    pub mode: VisibilityMode,
    pub locations: Option<&'a dyn LocationSource>,
}

impl<'a> EngineOptions<'a> {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            today,
            mode: VisibilityMode::default(),
            locations: None,
        }
    }

    pub fn with_mode(mut self, mode: VisibilityMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_locations(mut self, locations: &'a dyn LocationSource) -> Self {
        self.locations = Some(locations);
        self
    }
}

impl Default for EngineOptions<'_> {
    fn default() -> Self {
        Self::new(Utc::now().date_naive())
    }
}

impl fmt::Debug for EngineOptions<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineOptions")
            .field("today", &self.today)
            .field("mode", &self.mode)
            .field("locations", &self.locations.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Unknown,
    Resolving,
    Visible,
    Hidden,
}

pub struct FormContext<'a> {
    form: &'a PublishedForm,
    record: &'a DeclarationRecord,
    today: NaiveDate,
    mode: VisibilityMode,
    fields: Vec<Cell<State>>,
    pages: Vec<Cell<State>>,
    depth: Cell<usize>,
}

impl<'a> FormContext<'a> {
    pub fn new(
        form: &'a PublishedForm,
        record: &'a DeclarationRecord,
        options: &EngineOptions<'_>,
    ) -> Self {
        Self {
            form,
            record,
            today: options.today,
            mode: options.mode,
            fields: vec![Cell::new(State::Unknown); form.index().len()],
            pages: vec![Cell::new(State::Unknown); form.spec().pages.len()],
            depth: Cell::new(0),
        }
    }

    pub fn form(&self) -> &'a PublishedForm {
        self.form
    }

    pub fn record(&self) -> &'a DeclarationRecord {
        self.record
    }

    /// Entry-time visibility of the field in `slot`.
    pub fn is_visible(&self, slot: usize) -> Result<bool, EvalError> {
        let Some(field) = self.form.field_at(slot) else {
            return Ok(false);
        };
        match self.fields[slot].get() {
            State::Visible => return Ok(true),
            State::Hidden => return Ok(false),
            State::Resolving => {
                return Err(EvalError::Cycle {
                    field: field.id.clone(),
                });
            }
            State::Unknown => {}
        }

        self.enter()?;
        self.fields[slot].set(State::Resolving);
        let page_visible = match self.form.index().position(slot) {
            Some((page, _)) => self.is_page_visible(page),
            None => Ok(true),
        };
        let result = page_visible.and_then(|page_visible| {
            if page_visible {
                self.decide(&field.conditionals)
            } else {
                Ok(false)
            }
        });
        self.leave();

        let visible = result?;
        self.fields[slot].set(if visible {
            State::Visible
        } else {
            State::Hidden
        });
        Ok(visible)
    }

    pub fn is_page_visible(&self, page: usize) -> Result<bool, EvalError> {
        let Some(config) = self.form.spec().pages.get(page) else {
            return Ok(false);
        };
        match self.pages[page].get() {
            State::Visible => return Ok(true),
            State::Hidden => return Ok(false),
            State::Resolving => {
                return Err(EvalError::Cycle {
                    field: format!("page:{}", config.id),
                });
            }
            State::Unknown => {}
        }

        self.enter()?;
        self.pages[page].set(State::Resolving);
        let result = self.decide(&config.conditionals);
        self.leave();

        let visible = result?;
        self.pages[page].set(if visible {
            State::Visible
        } else {
            State::Hidden
        });
        Ok(visible)
    }

    /// Review-summary visibility: DISPLAY_ON_REVIEW conditionals when the field
    /// has any, otherwise the entry-time decision.
    pub fn is_review_visible(&self, slot: usize) -> Result<bool, EvalError> {
        let Some(field) = self.form.field_at(slot) else {
            return Ok(false);
        };
        let mut review = field
            .conditionals_of(ConditionalKind::DisplayOnReview)
            .peekable();
        if review.peek().is_none() {
            return self.is_visible(slot);
        }
        for expr in review {
            if evaluate(expr, self)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Any true HIDE hides; otherwise any true SHOW shows; no SHOW shows.
    fn decide(&self, conditionals: &[Conditional]) -> Result<bool, EvalError> {
        let of_kind = |kind: ConditionalKind| {
            conditionals
                .iter()
                .filter(move |conditional| conditional.kind == kind)
                .map(|conditional| &conditional.expression)
        };
        for expr in of_kind(ConditionalKind::Hide) {
            if evaluate(expr, self)? {
                return Ok(false);
            }
        }
        let shows: Vec<&Expr> = of_kind(ConditionalKind::Show).collect();
        if shows.is_empty() {
            return Ok(true);
        }
        for expr in shows {
            if evaluate(expr, self)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn enter(&self) -> Result<(), EvalError> {
        let depth = self.depth.get();
        if depth >= MAX_RESOLVE_DEPTH {
            return Err(EvalError::DepthExceeded {
                limit: MAX_RESOLVE_DEPTH,
            });
        }
        self.depth.set(depth + 1);
        Ok(())
    }

    fn leave(&self) {
        self.depth.set(self.depth.get().saturating_sub(1));
    }
}

impl EvalContext for FormContext<'_> {
    fn field_value(&self, id: &str) -> Result<Option<&Value>, EvalError> {
        let Some((slot, rest)) = self.form.index().owner(id) else {
            return Ok(self.record.get(id));
        };
        if self.mode == VisibilityMode::Cascade && !self.is_visible(slot)? {
            return Ok(None);
        }
        let base = self.record.slot_value(slot);
        Ok(match rest {
            Some(rest) => base.and_then(|base| value::descend(base, rest)),
            None => base,
        })
    }

    fn today(&self) -> NaiveDate {
        self.today
    }

    fn pattern(&self, pattern: &str) -> Option<&Regex> {
        self.form.pattern(pattern)
    }
}
