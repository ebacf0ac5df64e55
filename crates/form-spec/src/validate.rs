use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::{EngineOptions, FormContext};
use crate::error::EvalError;
use crate::eval::evaluate;
use crate::location::{LocationError, resolve_options};
use crate::publish::PublishedForm;
use crate::record::DeclarationRecord;
use crate::spec::{FieldConfig, FieldType};
use crate::template::{MessageContext, MessageRenderer};
use crate::value;

/// Message of the built-in required check.
pub const REQUIRED_MESSAGE: &str = "Required";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Required,
    TypeMismatch,
    InvalidOption,
    Rule,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Required => "required",
            ErrorCode::TypeMismatch => "type_mismatch",
            ErrorCode::InvalidOption => "invalid_option",
            ErrorCode::Rule => "rule",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field_id: String,
    pub message: String,
    pub code: ErrorCode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    /// Every value-bearing field → first failure message, or `None`. Hidden
    /// fields always map to `None`.
    pub fields: BTreeMap<String, Option<String>>,
    pub errors: Vec<FieldError>,
    pub missing_required: Vec<String>,
    pub unknown_fields: Vec<String>,
}

impl ValidationResult {
    pub fn error_for(&self, field_id: &str) -> Option<&FieldError> {
        self.errors.iter().find(|error| error.field_id == field_id)
    }

    pub fn message(&self, field_id: &str) -> Option<&str> {
        self.fields.get(field_id).and_then(|message| message.as_deref())
    }
}

/// Validates every visible field of the record independently.
pub fn validate(
    form: &PublishedForm,
    record: &DeclarationRecord,
    options: &EngineOptions<'_>,
) -> Result<ValidationResult, EvalError> {
    let ctx = FormContext::new(form, record, options);
    let renderer = MessageRenderer::new();

    let mut fields = BTreeMap::new();
    let mut errors = Vec::new();
    let mut missing_required = Vec::new();

    for (slot, id) in form.index().ids().enumerate() {
        let Some(field) = form.field_at(slot) else {
            continue;
        };
        if field.kind.is_presentational() {
            continue;
        }
        let failure = if ctx.is_visible(slot)? {
            check_field(field, record.slot_value(slot), &ctx, options, &renderer)?
        } else {
            None
        };
        if let Some((code, message)) = failure {
            if code == ErrorCode::Required {
                missing_required.push(id.to_string());
            }
            fields.insert(id.to_string(), Some(message.clone()));
            errors.push(FieldError {
                field_id: id.to_string(),
                message,
                code,
            });
        } else {
            fields.insert(id.to_string(), None);
        }
    }

    let unknown_fields = record
        .unknown_fields()
        .map(str::to_string)
        .collect::<Vec<_>>();

    tracing::debug!(
        form = form.id(),
        errors = errors.len(),
        unknown = unknown_fields.len(),
        "record validated"
    );

    Ok(ValidationResult {
        valid: errors.is_empty() && unknown_fields.is_empty(),
        fields,
        errors,
        missing_required,
        unknown_fields,
    })
}

/// First failure for one visible field: required, then shape, then options,
/// then the authored rules in declaration order.
fn check_field(
    field: &FieldConfig,
    current: Option<&Value>,
    ctx: &FormContext<'_>,
    options: &EngineOptions<'_>,
    renderer: &MessageRenderer,
) -> Result<Option<(ErrorCode, String)>, EvalError> {
    if value::is_empty(current) {
        if field.required {
            return Ok(Some((ErrorCode::Required, REQUIRED_MESSAGE.to_string())));
        }
        return Ok(None);
    }
    let Some(current) = current else {
        return Ok(None);
    };

    if !field.kind.accepts(current) {
        return Ok(Some((
            ErrorCode::TypeMismatch,
            format!("Expected a {} value", field.kind.as_str()),
        )));
    }

    if let Some(message) = check_option(field, current, ctx, options)? {
        return Ok(Some((ErrorCode::InvalidOption, message)));
    }

    for rule in &field.validation {
        if !evaluate(&rule.expression, ctx)? {
            let message = renderer.render(
                &rule.message,
                &MessageContext {
                    field: &field.id,
                    label: &field.label,
                    value: Some(current),
                },
            );
            return Ok(Some((ErrorCode::Rule, message)));
        }
    }
    Ok(None)
}

fn check_option(
    field: &FieldConfig,
    current: &Value,
    ctx: &FormContext<'_>,
    options: &EngineOptions<'_>,
) -> Result<Option<String>, EvalError> {
    let allowed = match field.kind {
        FieldType::Select | FieldType::RadioGroup if !field.options.is_empty() => {
            field.options.clone()
        }
        FieldType::Location if options.locations.is_some() => {
            match resolve_options(field, ctx, options) {
                Ok(allowed) => allowed,
                Err(LocationError::Eval(err)) => return Err(err),
                Err(_) => return Ok(None),
            }
        }
        _ => return Ok(None),
    };
    let Some(text) = value::as_text(current) else {
        return Ok(Some("Not one of the available options".to_string()));
    };
    if allowed.iter().any(|option| option.value == text) {
        Ok(None)
    } else {
        Ok(Some(format!("'{text}' is not one of the available options")))
    }
}
