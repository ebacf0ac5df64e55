use serde_json::{Map, Value, json};

use crate::action::ActionCatalog;
use crate::publish::PublishedForm;
use crate::spec::{FieldConfig, FieldType, FormSpec};
use crate::visibility::VisibilityMap;

/// JSON Schema for records of `form`, limited to the visible fields.
pub fn generate(form: &PublishedForm, visibility: &VisibilityMap) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();

    for field in form.spec().fields() {
        if field.kind.is_presentational() {
            continue;
        }
        if !visibility.get(&field.id).copied().unwrap_or(true) {
            continue;
        }
        properties.insert(field.id.clone(), field_schema(field));
        if field.required {
            required.push(Value::String(field.id.clone()));
        }
    }

    json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": form.spec().title.clone().unwrap_or_else(|| form.id().to_string()),
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false,
    })
}

fn field_schema(field: &FieldConfig) -> Value {
    let mut schema = match field.kind {
        FieldType::Text | FieldType::Location => json!({ "type": "string" }),
        FieldType::Number => json!({ "type": "number" }),
        FieldType::Date => json!({ "type": "string", "format": "date" }),
        FieldType::Select | FieldType::RadioGroup => {
            if field.options.is_empty() {
                json!({ "type": ["string", "number", "boolean"] })
            } else {
                let values = field
                    .options
                    .iter()
                    .map(|option| Value::String(option.value.clone()))
                    .collect::<Vec<_>>();
                json!({ "type": "string", "enum": values })
            }
        }
        FieldType::Checkbox => json!({ "type": "boolean" }),
        FieldType::File => json!({
            "oneOf": [
                { "type": "object" },
                { "type": "array", "items": { "type": "object" } }
            ]
        }),
        FieldType::Address | FieldType::Name => json!({ "type": "object" }),
        FieldType::Divider | FieldType::Paragraph => json!({}),
    };
    if let Value::Object(map) = &mut schema {
        if !field.label.is_empty() {
            map.insert("title".into(), Value::String(field.label.clone()));
        }
        if let Some(default) = &field.default_value {
            map.insert("default".into(), default.clone());
        }
    }
    schema
}

/// JSON Schema of the form authoring surface.
pub fn form_authoring_schema() -> Value {
    schemars::schema_for!(FormSpec).to_value()
}

/// JSON Schema of action catalogs.
pub fn action_catalog_schema() -> Value {
    schemars::schema_for!(ActionCatalog).to_value()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::EngineOptions;
    use crate::dsl::field;
    use crate::publish::publish;
    use crate::spec::{PageConfig, SelectOption};
    use crate::visibility::resolve_visibility;

    #[test]
    fn schema_covers_visible_fields_only() {
        let form = publish(FormSpec {
            id: "s".into(),
            version: "1".into(),
            title: Some("Sample".into()),
            pages: vec![PageConfig::new(
                "main",
                "Main",
                vec![
                    FieldConfig::new("tier", FieldType::Select)
                        .required(true)
                        .options(vec![SelectOption::new("gold", "Gold")]),
                    FieldConfig::new("perk", FieldType::Text)
                        .show_when(field("tier").is_equal_to("gold")),
                    FieldConfig::new("intro", FieldType::Paragraph),
                ],
            )],
        })
        .expect("publish");
        let record = form.record_from_json(&json!({}));
        let visibility =
            resolve_visibility(&form, &record, &EngineOptions::default()).expect("visibility");
        let schema = generate(&form, &visibility);
        let properties = schema["properties"].as_object().expect("properties");
        assert!(properties.contains_key("tier"));
        assert!(!properties.contains_key("perk"));
        assert!(!properties.contains_key("intro"));
        assert_eq!(schema["required"], json!(["tier"]));
        assert_eq!(properties["tier"]["enum"], json!(["gold"]));
    }

    #[test]
    fn authoring_schemas_describe_the_surface() {
        let schema = form_authoring_schema();
        assert_eq!(schema["title"], "FormSpec");
        assert!(schema["properties"]["pages"].is_object());
        assert_eq!(action_catalog_schema()["title"], "ActionCatalog");
    }
}
