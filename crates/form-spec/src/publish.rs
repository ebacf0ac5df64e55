//! Publish-time checks and the immutable published form.
//!
//! Everything an author can get statically wrong is rejected here so that it
//! never reaches evaluation: duplicate ids, dangling references, bad patterns,
//! conditionals that contradict each other, over-deep expressions, and
//! visibility cycles.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use regex::Regex;
use serde_json::Value;

use crate::error::{SchemaError, SchemaErrors};
use crate::eval::MAX_EXPRESSION_DEPTH;
use crate::expr::Expr;
use crate::record::{DeclarationRecord, FieldIndex};
use crate::spec::{Conditional, ConditionalKind, FieldConfig, FieldType, FormSpec, PageConfig};

/// A form version that passed every publish check.
#[derive(Debug, Clone)]
pub struct PublishedForm {
    spec: FormSpec,
    index: Arc<FieldIndex>,
    patterns: HashMap<String, Regex>,
}

impl PublishedForm {
    pub fn spec(&self) -> &FormSpec {
        &self.spec
    }

    pub fn id(&self) -> &str {
        &self.spec.id
    }

    pub fn version(&self) -> &str {
        &self.spec.version
    }

    pub fn index(&self) -> &Arc<FieldIndex> {
        &self.index
    }

    pub fn pattern(&self, pattern: &str) -> Option<&Regex> {
        self.patterns.get(pattern)
    }

    /// Field stored in a slot.
    pub fn field_at(&self, slot: usize) -> Option<&FieldConfig> {
        let (page, field) = self.index.position(slot)?;
        self.spec.pages.get(page)?.fields.get(field)
    }

    pub fn page_of(&self, slot: usize) -> Option<&PageConfig> {
        let (page, _) = self.index.position(slot)?;
        self.spec.pages.get(page)
    }

    pub fn field(&self, id: &str) -> Option<&FieldConfig> {
        self.index.slot(id).and_then(|slot| self.field_at(slot))
    }

    /// Empty record seeded with every field's default value.
    pub fn new_record(&self) -> DeclarationRecord {
        let mut record = DeclarationRecord::new(Arc::clone(&self.index));
        for field in self.spec.fields() {
            if let Some(default) = &field.default_value
                && !field.kind.is_presentational()
            {
                record.set(&field.id, default.clone());
            }
        }
        record
    }

    /// Record holding exactly the values in `json`, without defaults.
    pub fn record_from_json(&self, json: &Value) -> DeclarationRecord {
        DeclarationRecord::from_json(Arc::clone(&self.index), json)
    }
}

/// Runs every publish check and freezes the form.
pub fn publish(spec: FormSpec) -> Result<PublishedForm, SchemaErrors> {
    let mut errors = Vec::new();

    if spec.pages.is_empty() {
        errors.push(SchemaError::EmptyForm {
            form: spec.id.clone(),
        });
    }
    check_duplicates(&spec, &mut errors);

    let index = FieldIndex::build(&spec);
    check_references(&spec, &index, &mut errors);
    check_fields(&spec, &mut errors);
    check_depth(&spec, &mut errors);
    let patterns = compile_patterns(&spec, &mut errors);
    if let Some(path) = find_visibility_cycle(&spec, &index) {
        errors.push(SchemaError::VisibilityCycle { path });
    }

    if !errors.is_empty() {
        tracing::warn!(
            form = %spec.id,
            version = %spec.version,
            errors = errors.len(),
            "form rejected at publish"
        );
        return Err(SchemaErrors(errors));
    }

    tracing::debug!(
        form = %spec.id,
        version = %spec.version,
        fields = index.len(),
        "form published"
    );
    Ok(PublishedForm {
        spec,
        index: Arc::new(index),
        patterns,
    })
}

fn check_duplicates(spec: &FormSpec, errors: &mut Vec<SchemaError>) {
    let mut pages = HashSet::new();
    let mut fields = HashSet::new();
    for page in &spec.pages {
        if !pages.insert(page.id.as_str()) {
            errors.push(SchemaError::DuplicatePageId {
                id: page.id.clone(),
            });
        }
        for field in &page.fields {
            if !fields.insert(field.id.as_str()) {
                errors.push(SchemaError::DuplicateFieldId {
                    id: field.id.clone(),
                });
            }
        }
    }
}

fn page_owner(page: &PageConfig) -> String {
    format!("page:{}", page.id)
}

fn check_references(spec: &FormSpec, index: &FieldIndex, errors: &mut Vec<SchemaError>) {
    let mut report = |owner: String, reference: &str| {
        if index.owner(reference).is_none() {
            errors.push(SchemaError::UnknownFieldReference {
                owner,
                reference: reference.to_string(),
            });
        }
    };
    for page in &spec.pages {
        for conditional in &page.conditionals {
            for reference in conditional.expression.field_refs() {
                report(page_owner(page), reference);
            }
        }
        for field in &page.fields {
            for reference in field.referenced_fields() {
                report(field.id.clone(), reference);
            }
        }
    }
}

fn check_fields(spec: &FormSpec, errors: &mut Vec<SchemaError>) {
    for page in &spec.pages {
        if let Some(reason) = contradiction(&page.conditionals) {
            errors.push(SchemaError::ContradictoryConditionals {
                field: page_owner(page),
                reason,
            });
        }
        for field in &page.fields {
            if field.kind.is_presentational() && (field.required || !field.validation.is_empty())
            {
                errors.push(SchemaError::PresentationalValidation {
                    field: field.id.clone(),
                });
            }
            if field.kind == FieldType::Location && field.location.is_none() {
                errors.push(SchemaError::MissingLocationFilter {
                    field: field.id.clone(),
                });
            }
            if let Some(reason) = contradiction(&field.conditionals) {
                errors.push(SchemaError::ContradictoryConditionals {
                    field: field.id.clone(),
                    reason,
                });
            }
        }
    }
}

/// Statically visible contradictions that leave an entry permanently hidden.
fn contradiction(conditionals: &[Conditional]) -> Option<String> {
    let of_kind = |kind: ConditionalKind| {
        conditionals
            .iter()
            .filter(move |conditional| conditional.kind == kind)
            .map(|conditional| &conditional.expression)
    };
    let shows = of_kind(ConditionalKind::Show).collect::<Vec<_>>();
    let hides = of_kind(ConditionalKind::Hide).collect::<Vec<_>>();

    if !shows.is_empty() && shows.iter().all(|expr| matches!(expr, Expr::Never)) {
        return Some("every SHOW conditional is never()".into());
    }
    if hides.iter().any(|expr| matches!(expr, Expr::Always)) {
        return Some("a HIDE conditional is always()".into());
    }
    if shows.iter().any(|show| hides.contains(show)) {
        return Some("a SHOW and a HIDE conditional share the same expression".into());
    }
    None
}

fn all_expressions(spec: &FormSpec) -> impl Iterator<Item = (String, &Expr)> {
    spec.pages.iter().flat_map(|page| {
        let page_exprs = page
            .conditionals
            .iter()
            .map(move |conditional| (page_owner(page), &conditional.expression));
        let field_exprs = page.fields.iter().flat_map(|field| {
            field
                .conditionals
                .iter()
                .map(|conditional| &conditional.expression)
                .chain(field.validation.iter().map(|rule| &rule.expression))
                .map(move |expr| (field.id.clone(), expr))
        });
        page_exprs.chain(field_exprs)
    })
}

fn check_depth(spec: &FormSpec, errors: &mut Vec<SchemaError>) {
    for (owner, expr) in all_expressions(spec) {
        let depth = expr.depth();
        if depth > MAX_EXPRESSION_DEPTH {
            errors.push(SchemaError::ExpressionTooDeep {
                owner,
                depth,
                limit: MAX_EXPRESSION_DEPTH,
            });
        }
    }
}

fn compile_patterns(spec: &FormSpec, errors: &mut Vec<SchemaError>) -> HashMap<String, Regex> {
    let mut patterns = HashMap::new();
    for (owner, expr) in all_expressions(spec) {
        for pattern in expr.patterns() {
            if patterns.contains_key(pattern) {
                continue;
            }
            match Regex::new(pattern) {
                Ok(regex) => {
                    patterns.insert(pattern.to_string(), regex);
                }
                Err(err) => errors.push(SchemaError::InvalidPattern {
                    owner: owner.clone(),
                    pattern: pattern.to_string(),
                    message: err.to_string(),
                }),
            }
        }
    }
    patterns
}

/// Slots whose visibility a slot's SHOW/HIDE decision reads, including
/// those read by its page's conditionals.
fn visibility_edges(spec: &FormSpec, index: &FieldIndex) -> Vec<Vec<usize>> {
    let mut edges = vec![Vec::new(); index.len()];
    for (slot, targets) in edges.iter_mut().enumerate() {
        let Some((page_idx, field_idx)) = index.position(slot) else {
            continue;
        };
        let page = &spec.pages[page_idx];
        let field = &page.fields[field_idx];
        let conditionals = page.conditionals.iter().chain(field.conditionals.iter());
        for conditional in conditionals {
            if conditional.kind == ConditionalKind::DisplayOnReview {
                continue;
            }
            for reference in conditional.expression.field_refs() {
                if let Some((target, _)) = index.owner(reference)
                    && !targets.contains(&target)
                {
                    targets.push(target);
                }
            }
        }
    }
    edges
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    Active,
    Done,
}

/// First visibility cycle found by depth-first search, as a closed path of
/// field ids.
pub fn find_visibility_cycle(spec: &FormSpec, index: &FieldIndex) -> Option<Vec<String>> {
    let edges = visibility_edges(spec, index);
    let mut marks = vec![Mark::Unvisited; edges.len()];
    let mut stack = Vec::new();

    for start in 0..edges.len() {
        if marks[start] == Mark::Unvisited
            && let Some(cycle) = visit(start, &edges, &mut marks, &mut stack)
        {
            return Some(
                cycle
                    .into_iter()
                    .filter_map(|slot| index.id(slot).map(str::to_string))
                    .collect(),
            );
        }
    }
    None
}

fn visit(
    slot: usize,
    edges: &[Vec<usize>],
    marks: &mut [Mark],
    stack: &mut Vec<usize>,
) -> Option<Vec<usize>> {
    marks[slot] = Mark::Active;
    stack.push(slot);
    for &next in &edges[slot] {
        match marks[next] {
            Mark::Active => {
                let start = stack.iter().position(|entry| *entry == next).unwrap_or(0);
                let mut cycle = stack[start..].to_vec();
                cycle.push(next);
                return Some(cycle);
            }
            Mark::Unvisited => {
                if let Some(cycle) = visit(next, edges, marks, stack) {
                    return Some(cycle);
                }
            }
            Mark::Done => {}
        }
    }
    stack.pop();
    marks[slot] = Mark::Done;
    None
}

/// Published forms keyed by `(id, version)`. A version, once published,
/// cannot be replaced with different content.
#[derive(Debug, Default)]
pub struct FormRegistry {
    forms: BTreeMap<(String, String), Arc<PublishedForm>>,
}

impl FormRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&mut self, spec: FormSpec) -> Result<Arc<PublishedForm>, SchemaErrors> {
        let key = (spec.id.clone(), spec.version.clone());
        if let Some(existing) = self.forms.get(&key) {
            if existing.spec == spec {
                return Ok(Arc::clone(existing));
            }
            return Err(SchemaError::VersionConflict {
                id: key.0,
                version: key.1,
            }
            .into());
        }
        let published = Arc::new(publish(spec)?);
        self.forms.insert(key, Arc::clone(&published));
        Ok(published)
    }

    pub fn get(&self, id: &str, version: &str) -> Option<Arc<PublishedForm>> {
        self.forms
            .get(&(id.to_string(), version.to_string()))
            .cloned()
    }

    pub fn versions(&self, id: &str) -> Vec<&str> {
        self.forms
            .keys()
            .filter(|(form_id, _)| form_id == id)
            .map(|(_, version)| version.as_str())
            .collect()
    }
}
