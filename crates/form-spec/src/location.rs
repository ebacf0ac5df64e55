//! Location reference data and option resolution for select-like fields.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::context::{EngineOptions, FormContext};
use crate::error::EvalError;
use crate::eval::EvalContext;
use crate::publish::PublishedForm;
use crate::record::DeclarationRecord;
use crate::spec::{FieldConfig, FieldType, SelectOption};

/// One node of the administrative hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub id: String,
    pub name: String,
    pub location_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub part_of: Option<String>,
}

/// Supplier of location options; the reference-data service lives behind it.
pub trait LocationSource {
    /// Locations of `location_type` directly under `parent`; top-level
    /// locations when `parent` is `None`.
    fn children(&self, location_type: &str, parent: Option<&str>) -> Vec<&Location>;
}

/// In-memory hierarchy, typically loaded from JSON.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocationTree {
    locations: Vec<Location>,
}

impl LocationTree {
    pub fn new(locations: Vec<Location>) -> Self {
        Self { locations }
    }

    pub fn get(&self, id: &str) -> Option<&Location> {
        self.locations.iter().find(|location| location.id == id)
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }
}

impl LocationSource for LocationTree {
    fn children(&self, location_type: &str, parent: Option<&str>) -> Vec<&Location> {
        self.locations
            .iter()
            .filter(|location| {
                location.location_type == location_type && location.part_of.as_deref() == parent
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocationError {
    #[error("field '{0}' is not part of the form")]
    UnknownField(String),
    #[error("field '{0}' needs a location source to resolve its options")]
    NoSource(String),
    #[error(transparent)]
    Eval(#[from] EvalError),
}

/// Options currently offered by a field. Static options come from the schema;
/// location options are filtered by the value of the `part_of` parent field,
/// and are empty while that parent is unset or hidden.
pub fn field_options(
    form: &PublishedForm,
    record: &DeclarationRecord,
    field_id: &str,
    options: &EngineOptions<'_>,
) -> Result<Vec<SelectOption>, LocationError> {
    let field = form
        .field(field_id)
        .ok_or_else(|| LocationError::UnknownField(field_id.to_string()))?;
    let ctx = FormContext::new(form, record, options);
    resolve_options(field, &ctx, options)
}

pub(crate) fn resolve_options(
    field: &FieldConfig,
    ctx: &FormContext<'_>,
    options: &EngineOptions<'_>,
) -> Result<Vec<SelectOption>, LocationError> {
    match field.kind {
        FieldType::Select | FieldType::RadioGroup => Ok(field.options.clone()),
        FieldType::Location => {
            let Some(filter) = &field.location else {
                return Ok(Vec::new());
            };
            let source = options
                .locations
                .ok_or_else(|| LocationError::NoSource(field.id.clone()))?;
            let parent = match &filter.part_of {
                Some(parent_field) => match ctx.field_value(parent_field)?.and_then(|v| v.as_str())
                {
                    Some(parent) => Some(parent),
                    None => return Ok(Vec::new()),
                },
                None => None,
            };
            Ok(source
                .children(&filter.location_type, parent)
                .into_iter()
                .map(|location| SelectOption::new(location.id.clone(), location.name.clone()))
                .collect())
        }
        _ => Ok(Vec::new()),
    }
}
