use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::expr::Expr;
use crate::spec::conditional::{Conditional, ConditionalKind, ValidationRule};
use crate::value;

/// Closed set of field kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Text,
    Number,
    Date,
    Select,
    RadioGroup,
    Checkbox,
    File,
    Address,
    Name,
    Location,
    Divider,
    Paragraph,
}

impl FieldType {
    /// Presentational fields never hold a value and are never validated.
    pub fn is_presentational(&self) -> bool {
        matches!(self, FieldType::Divider | FieldType::Paragraph)
    }

    /// Fields whose value must be one of a finite option list.
    pub fn has_options(&self) -> bool {
        matches!(
            self,
            FieldType::Select | FieldType::RadioGroup | FieldType::Location
        )
    }

    /// Whether a (non-empty) value has the shape this field stores.
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            FieldType::Text | FieldType::Location => value.is_string(),
            FieldType::Number => value.is_number(),
            FieldType::Date => value::as_date(value).is_some(),
            FieldType::Select | FieldType::RadioGroup => {
                value.is_string() || value.is_number() || value.is_boolean()
            }
            FieldType::Checkbox => value.is_boolean(),
            FieldType::File => {
                value.is_object()
                    || value
                        .as_array()
                        .is_some_and(|files| files.iter().all(Value::is_object))
            }
            FieldType::Address | FieldType::Name => value.is_object(),
            FieldType::Divider | FieldType::Paragraph => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Text => "text",
            FieldType::Number => "number",
            FieldType::Date => "date",
            FieldType::Select => "select",
            FieldType::RadioGroup => "radio_group",
            FieldType::Checkbox => "checkbox",
            FieldType::File => "file",
            FieldType::Address => "address",
            FieldType::Name => "name",
            FieldType::Location => "location",
            FieldType::Divider => "divider",
            FieldType::Paragraph => "paragraph",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SelectOption {
    pub value: String,
    pub label: String,
}

impl SelectOption {
    pub fn new(value: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
        }
    }
}

/// Restricts a location field's options to one location type, optionally
/// to the children of the location chosen in a parent field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct LocationFilter {
    pub location_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub part_of: Option<String>,
}

/// One field of a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FieldConfig {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub label: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<SelectOption>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub validation: Vec<ValidationRule>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditionals: Vec<Conditional>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<LocationFilter>,
}

impl FieldConfig {
    pub fn new(id: impl Into<String>, kind: FieldType) -> Self {
        Self {
            id: id.into(),
            kind,
            required: false,
            label: String::new(),
            options: Vec::new(),
            default_value: None,
            validation: Vec::new(),
            conditionals: Vec::new(),
            location: None,
        }
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn options(mut self, options: Vec<SelectOption>) -> Self {
        self.options = options;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    pub fn located_in(mut self, location_type: impl Into<String>, part_of: Option<&str>) -> Self {
        self.location = Some(LocationFilter {
            location_type: location_type.into(),
            part_of: part_of.map(str::to_string),
        });
        self
    }

    pub fn show_when(mut self, expression: Expr) -> Self {
        self.conditionals.push(Conditional::show(expression));
        self
    }

    pub fn hide_when(mut self, expression: Expr) -> Self {
        self.conditionals.push(Conditional::hide(expression));
        self
    }

    pub fn review_when(mut self, expression: Expr) -> Self {
        self.conditionals
            .push(Conditional::display_on_review(expression));
        self
    }

    pub fn validate(mut self, message: impl Into<String>, expression: Expr) -> Self {
        self.validation.push(ValidationRule::new(message, expression));
        self
    }

    pub fn conditionals_of(&self, kind: ConditionalKind) -> impl Iterator<Item = &Expr> {
        self.conditionals
            .iter()
            .filter(move |conditional| conditional.kind == kind)
            .map(|conditional| &conditional.expression)
    }

    /// Every expression attached to the field, with the location parent as a
    /// synthetic reference.
    pub fn referenced_fields(&self) -> Vec<&str> {
        let mut refs = Vec::new();
        let expressions = self
            .conditionals
            .iter()
            .map(|conditional| &conditional.expression)
            .chain(self.validation.iter().map(|rule| &rule.expression));
        for expr in expressions {
            for id in expr.field_refs() {
                if !refs.contains(&id) {
                    refs.push(id);
                }
            }
        }
        if let Some(parent) = self
            .location
            .as_ref()
            .and_then(|filter| filter.part_of.as_deref())
            && !refs.contains(&parent)
        {
            refs.push(parent);
        }
        refs
    }
}
