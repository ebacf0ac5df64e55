use crate::context::{EngineOptions, FormContext};
use crate::error::EvalError;
use crate::publish::PublishedForm;
use crate::record::DeclarationRecord;

/// Field id → visible, for every field of the form.
pub type VisibilityMap = std::collections::BTreeMap<String, bool>;

/// Entry-time visibility of every field, including presentational ones.
pub fn resolve_visibility(
    form: &PublishedForm,
    record: &DeclarationRecord,
    options: &EngineOptions<'_>,
) -> Result<VisibilityMap, EvalError> {
    let ctx = FormContext::new(form, record, options);
    resolve_with(&ctx)
}

pub(crate) fn resolve_with(ctx: &FormContext<'_>) -> Result<VisibilityMap, EvalError> {
    let index = ctx.form().index();
    let mut map = VisibilityMap::new();
    for (slot, id) in index.ids().enumerate() {
        let visible = ctx.is_visible(slot)?;
        tracing::trace!(field = id, visible, "visibility resolved");
        map.insert(id.to_string(), visible);
    }
    Ok(map)
}

/// Ids of the fields currently shown, in display order.
pub fn get_visible_fields(
    form: &PublishedForm,
    record: &DeclarationRecord,
    options: &EngineOptions<'_>,
) -> Result<Vec<String>, EvalError> {
    let ctx = FormContext::new(form, record, options);
    let mut visible = Vec::new();
    for (slot, id) in form.index().ids().enumerate() {
        if ctx.is_visible(slot)? {
            visible.push(id.to_string());
        }
    }
    Ok(visible)
}

/// Visibility of a single field; unknown ids are never visible.
pub fn is_field_visible(
    form: &PublishedForm,
    record: &DeclarationRecord,
    field_id: &str,
    options: &EngineOptions<'_>,
) -> Result<bool, EvalError> {
    let Some(slot) = form.index().slot(field_id) else {
        return Ok(false);
    };
    FormContext::new(form, record, options).is_visible(slot)
}

/// Review-time visibility of every field.
pub fn review_visibility(
    form: &PublishedForm,
    record: &DeclarationRecord,
    options: &EngineOptions<'_>,
) -> Result<VisibilityMap, EvalError> {
    let ctx = FormContext::new(form, record, options);
    let mut map = VisibilityMap::new();
    for (slot, id) in form.index().ids().enumerate() {
        map.insert(id.to_string(), ctx.is_review_visible(slot)?);
    }
    Ok(map)
}

/// Hidden fields that still hold a value. Submission drops these values.
pub fn cleared_fields(
    form: &PublishedForm,
    record: &DeclarationRecord,
    options: &EngineOptions<'_>,
) -> Result<Vec<String>, EvalError> {
    let ctx = FormContext::new(form, record, options);
    let mut cleared = Vec::new();
    for (slot, id) in form.index().ids().enumerate() {
        if record.slot_value(slot).is_some() && !ctx.is_visible(slot)? {
            cleared.push(id.to_string());
        }
    }
    Ok(cleared)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::VisibilityMode;
    use crate::dsl::{and, field, not};
    use crate::publish::publish;
    use crate::spec::{Conditional, FieldConfig, FieldType, FormSpec, PageConfig};
    use chrono::NaiveDate;
    use serde_json::json;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 15).expect("date")
    }

    fn chain_form() -> PublishedForm {
        publish(FormSpec {
            id: "chain".into(),
            version: "1".into(),
            title: None,
            pages: vec![PageConfig::new(
                "main",
                "Main",
                vec![
                    FieldConfig::new("hasSpouse", FieldType::Checkbox),
                    FieldConfig::new("spouse.name", FieldType::Text)
                        .show_when(field("hasSpouse").is_equal_to(true)),
                    FieldConfig::new("spouse.nid", FieldType::Text)
                        .show_when(not(field("spouse.name").is_falsy())),
                ],
            )],
        })
        .expect("publish")
    }

    #[test]
    fn cascade_hides_dependents_of_hidden_fields() {
        let form = chain_form();
        let record = form.record_from_json(&json!({
            "hasSpouse": false,
            "spouse.name": "Jane"
        }));
        let cascade = EngineOptions::new(today());
        let map = resolve_visibility(&form, &record, &cascade).expect("resolve");
        assert_eq!(map["spouse.name"], false);
        assert_eq!(map["spouse.nid"], false);

        let snapshot = cascade.with_mode(VisibilityMode::Snapshot);
        let map = resolve_visibility(&form, &record, &snapshot).expect("resolve");
        assert_eq!(map["spouse.name"], false);
        assert_eq!(map["spouse.nid"], true);

        assert_eq!(
            cleared_fields(&form, &record, &cascade).expect("cleared"),
            vec!["spouse.name".to_string()]
        );
    }

    #[test]
    fn hidden_page_hides_its_fields() {
        let mut page = PageConfig::new(
            "spouse",
            "Spouse",
            vec![FieldConfig::new("spouse.dob", FieldType::Date)],
        );
        page.conditionals
            .push(Conditional::show(field("married").is_equal_to(true)));
        let form = publish(FormSpec {
            id: "paged".into(),
            version: "1".into(),
            title: None,
            pages: vec![
                PageConfig::new(
                    "main",
                    "Main",
                    vec![FieldConfig::new("married", FieldType::Checkbox)],
                ),
                page,
            ],
        })
        .expect("publish");

        let options = EngineOptions::new(today());
        let single = form.record_from_json(&json!({ "married": false }));
        assert!(!is_field_visible(&form, &single, "spouse.dob", &options).expect("eval"));
        let married = form.record_from_json(&json!({ "married": true }));
        assert_eq!(
            get_visible_fields(&form, &married, &options).expect("eval"),
            vec!["married".to_string(), "spouse.dob".to_string()]
        );
    }

    #[test]
    fn hide_wins_over_show() {
        let form = publish(FormSpec {
            id: "both".into(),
            version: "1".into(),
            title: None,
            pages: vec![PageConfig::new(
                "main",
                "Main",
                vec![
                    FieldConfig::new("a", FieldType::Text),
                    FieldConfig::new("b", FieldType::Text),
                    FieldConfig::new("c", FieldType::Text)
                        .show_when(not(field("a").is_falsy()))
                        .hide_when(and(vec![
                            not(field("a").is_falsy()),
                            not(field("b").is_falsy()),
                        ])),
                ],
            )],
        })
        .expect("publish");
        let options = EngineOptions::new(today());
        let only_a = form.record_from_json(&json!({ "a": "x" }));
        assert!(is_field_visible(&form, &only_a, "c", &options).expect("eval"));
        let both = form.record_from_json(&json!({ "a": "x", "b": "y" }));
        assert!(!is_field_visible(&form, &both, "c", &options).expect("eval"));
    }

    #[test]
    fn review_uses_display_on_review_when_present() {
        let form = publish(FormSpec {
            id: "review".into(),
            version: "1".into(),
            title: None,
            pages: vec![PageConfig::new(
                "main",
                "Main",
                vec![
                    FieldConfig::new("reason", FieldType::Text),
                    FieldConfig::new("notice", FieldType::Paragraph)
                        .review_when(not(field("reason").is_falsy())),
                ],
            )],
        })
        .expect("publish");
        let options = EngineOptions::new(today());
        let record = form.record_from_json(&json!({}));
        let entry = resolve_visibility(&form, &record, &options).expect("entry");
        let review = review_visibility(&form, &record, &options).expect("review");
        assert!(entry["notice"]);
        assert!(!review["notice"]);
        assert!(review["reason"]);
    }
}
