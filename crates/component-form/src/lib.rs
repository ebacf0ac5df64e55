use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;

use form_spec::{
    ActionCatalog, DeclarationRecord, EngineOptions, EvalError, EventState, FormSpec,
    LocationError, LocationTree, PublishedForm, SchemaErrors, User, VisibilityMode,
    build_summary, cleared_fields, field_options, get_visible_fields as visible_fields,
    offered_actions, publish, record_schema, render_summary_text, resolve_visibility, validate,
};

const DEFAULT_SPEC: &str = include_str!("../../form-spec/tests/fixtures/membership_form.json");

#[derive(Debug, Error)]
enum ComponentError {
    #[error("failed to parse config/{0}")]
    ConfigParse(#[source] serde_json::Error),
    #[error("failed to parse record: {0}")]
    RecordParse(#[source] serde_json::Error),
    #[error("form '{0}' is not available")]
    FormUnavailable(String),
    #[error("{0}")]
    InvalidForm(#[from] SchemaErrors),
    #[error("evaluation failed: {0}")]
    Eval(#[from] EvalError),
    #[error("options unavailable: {0}")]
    Location(#[from] LocationError),
    #[error("json encode error: {0}")]
    JsonEncode(#[source] serde_json::Error),
}

#[derive(Debug, Deserialize, Serialize, Default)]
struct ComponentConfig {
    #[serde(default)]
    form_json: Option<String>,
    #[serde(default)]
    today: Option<NaiveDate>,
    #[serde(default)]
    mode: Option<VisibilityMode>,
    #[serde(default)]
    locations: Option<LocationTree>,
}

impl ComponentConfig {
    fn parse(config_json: &str) -> Result<Self, ComponentError> {
        if config_json.trim().is_empty() {
            Ok(Self::default())
        } else {
            serde_json::from_str(config_json).map_err(ComponentError::ConfigParse)
        }
    }

    fn options(&self) -> EngineOptions<'_> {
        let mut options = EngineOptions::new(self.today.unwrap_or_else(|| Utc::now().date_naive()))
            .with_mode(self.mode.unwrap_or_default());
        if let Some(locations) = &self.locations {
            options = options.with_locations(locations);
        }
        options
    }
}

fn ensure_form(form_id: &str, config: &ComponentConfig) -> Result<PublishedForm, ComponentError> {
    let spec_json = config.form_json.as_deref().unwrap_or(DEFAULT_SPEC);
    let spec: FormSpec = serde_json::from_str(spec_json).map_err(ComponentError::ConfigParse)?;
    if spec.id != form_id {
        return Err(ComponentError::FormUnavailable(form_id.to_string()));
    }
    Ok(publish(spec)?)
}

fn parse_record(
    form: &PublishedForm,
    record_json: &str,
) -> Result<DeclarationRecord, ComponentError> {
    let values: Value =
        serde_json::from_str(record_json).map_err(ComponentError::RecordParse)?;
    Ok(form.record_from_json(&values))
}

fn parse_json<T: serde::de::DeserializeOwned>(raw: &str) -> Result<T, ComponentError> {
    serde_json::from_str(raw).map_err(ComponentError::ConfigParse)
}

fn respond(result: Result<Value, ComponentError>) -> String {
    match result {
        Ok(value) => serde_json::to_string(&value).unwrap_or_else(|error| {
            json!({"error": format!("json encode: {}", error)}).to_string()
        }),
        Err(err) => {
            tracing::debug!(error = %err, "component call failed");
            json!({ "error": err.to_string() }).to_string()
        }
    }
}

fn respond_string(result: Result<String, ComponentError>) -> String {
    match result {
        Ok(value) => value,
        Err(err) => json!({ "error": err.to_string() }).to_string(),
    }
}

pub fn describe(form_id: &str, config_json: &str) -> String {
    respond(
        ComponentConfig::parse(config_json)
            .and_then(|config| ensure_form(form_id, &config))
            .and_then(|form| serde_json::to_value(form.spec()).map_err(ComponentError::JsonEncode)),
    )
}

/// Visible field ids in display order, plus hidden fields that still hold
/// values and should be cleared by the host.
pub fn get_visible_fields(form_id: &str, config_json: &str, record_json: &str) -> String {
    respond(ComponentConfig::parse(config_json).and_then(|config| {
        let form = ensure_form(form_id, &config)?;
        let record = parse_record(&form, record_json)?;
        let options = config.options();
        let visible = visible_fields(&form, &record, &options)?;
        let cleared = cleared_fields(&form, &record, &options)?;
        Ok(json!({ "visible": visible, "cleared": cleared }))
    }))
}

pub fn validate_record(form_id: &str, config_json: &str, record_json: &str) -> String {
    respond(ComponentConfig::parse(config_json).and_then(|config| {
        let form = ensure_form(form_id, &config)?;
        let record = parse_record(&form, record_json)?;
        let result = validate(&form, &record, &config.options())?;
        serde_json::to_value(result).map_err(ComponentError::JsonEncode)
    }))
}

pub fn get_offered_actions(
    catalog_json: &str,
    user_json: &str,
    event_json: &str,
    config_json: &str,
) -> String {
    respond(ComponentConfig::parse(config_json).and_then(|config| {
        let catalog: ActionCatalog = parse_json(catalog_json)?;
        let user: User = parse_json(user_json)?;
        let event: EventState = parse_json(event_json)?;
        let today = config.options().today;
        let offered = offered_actions(&catalog, &user, &event, today)?;
        serde_json::to_value(offered).map_err(ComponentError::JsonEncode)
    }))
}

pub fn get_field_options(
    form_id: &str,
    config_json: &str,
    record_json: &str,
    field_id: &str,
) -> String {
    respond(ComponentConfig::parse(config_json).and_then(|config| {
        let form = ensure_form(form_id, &config)?;
        let record = parse_record(&form, record_json)?;
        let options = field_options(&form, &record, field_id, &config.options())?;
        serde_json::to_value(options).map_err(ComponentError::JsonEncode)
    }))
}

pub fn get_record_schema(form_id: &str, config_json: &str, record_json: &str) -> String {
    respond(ComponentConfig::parse(config_json).and_then(|config| {
        let form = ensure_form(form_id, &config)?;
        let record = parse_record(&form, record_json)?;
        let visibility = resolve_visibility(&form, &record, &config.options())?;
        Ok(record_schema(&form, &visibility))
    }))
}

pub fn review_summary(form_id: &str, config_json: &str, record_json: &str) -> String {
    respond(ComponentConfig::parse(config_json).and_then(|config| {
        let form = ensure_form(form_id, &config)?;
        let record = parse_record(&form, record_json)?;
        let summary = build_summary(&form, &record, &config.options())?;
        serde_json::to_value(summary).map_err(ComponentError::JsonEncode)
    }))
}

pub fn render_review_text(form_id: &str, config_json: &str, record_json: &str) -> String {
    respond_string(ComponentConfig::parse(config_json).and_then(|config| {
        let form = ensure_form(form_id, &config)?;
        let record = parse_record(&form, record_json)?;
        let summary = build_summary(&form, &record, &config.options())?;
        Ok(render_summary_text(&summary))
    }))
}
