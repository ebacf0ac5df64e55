use serde::Serialize;
use serde_json::Value;

use crate::context::{EngineOptions, FormContext};
use crate::error::EvalError;
use crate::location::{LocationError, resolve_options};
use crate::publish::PublishedForm;
use crate::record::DeclarationRecord;
use crate::spec::{FieldConfig, FieldType};
use crate::validate::validate;

/// One row of the review summary.
#[derive(Debug, Clone, Serialize)]
pub struct SummaryEntry {
    pub id: String,
    pub label: String,
    #[serde(rename = "type")]
    pub kind: FieldType,
    pub value: Option<Value>,
    /// Value as shown to a reviewer; option labels replace option values.
    pub display: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SummaryPage {
    pub id: String,
    pub title: String,
    /// No visible field on the page fails validation.
    pub complete: bool,
    pub entries: Vec<SummaryEntry>,
}

/// Read-only summary shown before submission.
#[derive(Debug, Clone, Serialize)]
pub struct ReviewSummary {
    pub form_id: String,
    pub form_version: String,
    pub form_title: Option<String>,
    pub complete: bool,
    pub pages: Vec<SummaryPage>,
}

/// Collects review-visible entries per page. A page appears when at least
/// one of its fields is review-visible, whatever its entry-time visibility.
pub fn build_summary(
    form: &PublishedForm,
    record: &DeclarationRecord,
    options: &EngineOptions<'_>,
) -> Result<ReviewSummary, EvalError> {
    let validation = validate(form, record, options)?;
    let ctx = FormContext::new(form, record, options);
    let index = form.index();

    let mut pages = Vec::new();
    for page in &form.spec().pages {
        let mut entries = Vec::new();
        let mut complete = true;
        for config in &page.fields {
            let Some(slot) = index.slot(&config.id) else {
                continue;
            };
            let error = validation.message(&config.id).map(str::to_string);
            complete &= error.is_none();
            if !ctx.is_review_visible(slot)? {
                continue;
            }
            let value = record.slot_value(slot).cloned();
            let display = match &value {
                Some(value) => Some(display_value(config, value, &ctx, options)?),
                None => None,
            };
            entries.push(SummaryEntry {
                id: config.id.clone(),
                label: config.label.clone(),
                kind: config.kind,
                value,
                display,
                error,
            });
        }
        if entries.is_empty() {
            continue;
        }
        pages.push(SummaryPage {
            id: page.id.clone(),
            title: page.title.clone(),
            complete,
            entries,
        });
    }

    Ok(ReviewSummary {
        form_id: form.id().to_string(),
        form_version: form.version().to_string(),
        form_title: form.spec().title.clone(),
        complete: validation.errors.is_empty(),
        pages,
    })
}

fn display_value(
    config: &FieldConfig,
    value: &Value,
    ctx: &FormContext<'_>,
    options: &EngineOptions<'_>,
) -> Result<String, EvalError> {
    if config.kind.has_options()
        && let Some(raw) = value.as_str()
    {
        let choices = match resolve_options(config, ctx, options) {
            Ok(choices) => choices,
            Err(LocationError::Eval(err)) => return Err(err),
            Err(_) => Vec::new(),
        };
        if let Some(choice) = choices.iter().find(|choice| choice.value == raw) {
            return Ok(choice.label.clone());
        }
    }
    Ok(value_to_display(value))
}

fn value_to_display(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Bool(flag) => String::from(if *flag { "Yes" } else { "No" }),
        Value::Number(num) => num.to_string(),
        Value::Object(map) => map
            .values()
            .filter(|member| !member.is_null())
            .map(value_to_display)
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join(" "),
        other => other.to_string(),
    }
}

/// Renders the summary as human-friendly text.
pub fn render_summary_text(summary: &ReviewSummary) -> String {
    let mut lines = Vec::new();
    match &summary.form_title {
        Some(title) => lines.push(format!(
            "Form: {} ({} v{})",
            title, summary.form_id, summary.form_version
        )),
        None => lines.push(format!(
            "Form: {} v{}",
            summary.form_id, summary.form_version
        )),
    }
    lines.push(format!(
        "Status: {}",
        if summary.complete {
            "complete"
        } else {
            "incomplete"
        }
    ));

    for page in &summary.pages {
        let marker = if page.complete { "" } else { " [incomplete]" };
        lines.push(format!("{}{}", page.title, marker));
        for entry in &page.entries {
            if entry.kind.is_presentational() {
                if !entry.label.is_empty() {
                    lines.push(format!("  {}", entry.label));
                }
                continue;
            }
            let label = if entry.label.is_empty() {
                entry.id.as_str()
            } else {
                entry.label.as_str()
            };
            let mut line = format!(
                "  {}: {}",
                label,
                entry.display.as_deref().unwrap_or("-")
            );
            if let Some(error) = &entry.error {
                line.push_str(&format!(" ({error})"));
            }
            lines.push(line);
        }
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::field;
    use crate::publish::publish;
    use crate::spec::{FormSpec, PageConfig, SelectOption};
    use serde_json::json;

    fn form() -> PublishedForm {
        publish(FormSpec {
            id: "summary".into(),
            version: "2".into(),
            title: Some("Membership".into()),
            pages: vec![PageConfig::new(
                "main",
                "Applicant",
                vec![
                    FieldConfig::new("name", FieldType::Text)
                        .label("Name")
                        .required(true),
                    FieldConfig::new("tier", FieldType::Select)
                        .label("Tier")
                        .options(vec![
                            SelectOption::new("gold", "Gold"),
                            SelectOption::new("basic", "Basic"),
                        ]),
                    FieldConfig::new("internal", FieldType::Text)
                        .label("Internal note")
                        .review_when(field("tier").is_equal_to("gold")),
                ],
            )],
        })
        .expect("publish")
    }

    #[test]
    fn summary_lists_review_entries_and_completeness() {
        let form = form();
        let record = form.record_from_json(&json!({ "tier": "basic", "internal": "x" }));
        let summary = build_summary(&form, &record, &EngineOptions::default()).expect("summary");
        assert!(!summary.complete);
        let page = &summary.pages[0];
        assert!(!page.complete);
        let ids = page.entries.iter().map(|e| e.id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["name", "tier"]);
        assert_eq!(page.entries[1].display.as_deref(), Some("Basic"));

        let text = render_summary_text(&summary);
        assert!(text.contains("Form: Membership (summary v2)"));
        assert!(text.contains("Applicant [incomplete]"));
        assert!(text.contains("  Name: - (Required)"));
        assert!(text.contains("  Tier: Basic"));
    }
}
