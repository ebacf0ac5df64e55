//! Declaration records stored as an arena of slots indexed by field id.
//!
//! A [`FieldIndex`] is built once per published form and shared; every
//! record for that form is a flat `Vec` of slot values, so repeated full
//! re-evaluation only does indexed reads.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::eval::RecordAccessor;
use crate::spec::form::FormSpec;
use crate::value;

/// Stable field id → slot mapping for one form version.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FieldIndex {
    ids: Vec<String>,
    slots: HashMap<String, usize>,
    positions: Vec<(usize, usize)>,
}

impl FieldIndex {
    /// Indexes fields in display order. A repeated id keeps its first slot;
    /// publishing rejects such forms before an index is ever shared.
    pub fn build(spec: &FormSpec) -> Self {
        let mut index = FieldIndex::default();
        for (page_idx, page) in spec.pages.iter().enumerate() {
            for (field_idx, field) in page.fields.iter().enumerate() {
                if index.slots.contains_key(&field.id) {
                    continue;
                }
                index.slots.insert(field.id.clone(), index.ids.len());
                index.ids.push(field.id.clone());
                index.positions.push((page_idx, field_idx));
            }
        }
        index
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn slot(&self, id: &str) -> Option<usize> {
        self.slots.get(id).copied()
    }

    pub fn id(&self, slot: usize) -> Option<&str> {
        self.ids.get(slot).map(String::as_str)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }

    /// `(page, field)` position of a slot within the form.
    pub fn position(&self, slot: usize) -> Option<(usize, usize)> {
        self.positions.get(slot).copied()
    }

    /// Slot owning `id`: the field itself, or the composite field whose id is
    /// the longest dotted prefix, together with the remaining sub-path.
    pub fn owner<'i>(&self, id: &'i str) -> Option<(usize, Option<&'i str>)> {
        if let Some(slot) = self.slot(id) {
            return Some((slot, None));
        }
        let mut split = id.len();
        while let Some(dot) = id[..split].rfind('.') {
            if let Some(slot) = self.slot(&id[..dot]) {
                return Some((slot, Some(&id[dot + 1..])));
            }
            split = dot;
        }
        None
    }
}

/// Current values of one in-progress declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct DeclarationRecord {
    index: Arc<FieldIndex>,
    values: Vec<Option<Value>>,
    extra: BTreeMap<String, Value>,
}

impl DeclarationRecord {
    pub fn new(index: Arc<FieldIndex>) -> Self {
        let values = vec![None; index.len()];
        Self {
            index,
            values,
            extra: BTreeMap::new(),
        }
    }

    /// Loads a flat JSON object keyed by field id. Keys that are not fields of
    /// the form are kept aside and reported by [`Self::unknown_fields`].
    pub fn from_json(index: Arc<FieldIndex>, json: &Value) -> Self {
        let mut record = Self::new(index);
        if let Some(map) = json.as_object() {
            for (key, value) in map {
                record.set(key, value.clone());
            }
        }
        record
    }

    pub fn index(&self) -> &FieldIndex {
        &self.index
    }

    pub fn slot_value(&self, slot: usize) -> Option<&Value> {
        self.values.get(slot).and_then(Option::as_ref)
    }

    pub fn get(&self, id: &str) -> Option<&Value> {
        match self.index.owner(id) {
            Some((slot, None)) => self.slot_value(slot),
            Some((slot, Some(rest))) => self
                .slot_value(slot)
                .and_then(|base| value::descend(base, rest)),
            None => value::lookup_dotted(id, |key| self.extra.get(key)),
        }
    }

    /// Stores a value; `null` clears the field. A sub-path of a composite
    /// field (`applicant.name.firstname`) is merged into that field's value.
    pub fn set(&mut self, id: &str, value: Value) {
        if value.is_null() {
            self.clear(id);
            return;
        }
        match self.index.owner(id) {
            Some((slot, None)) => self.values[slot] = Some(value),
            Some((slot, Some(rest))) => {
                let base = self.values[slot].get_or_insert_with(|| Value::Object(Map::new()));
                value::assign(base, rest, value);
            }
            None => {
                self.extra.insert(id.to_string(), value);
            }
        }
    }

    pub fn clear(&mut self, id: &str) -> Option<Value> {
        match self.index.owner(id) {
            Some((slot, None)) => self.values[slot].take(),
            Some((slot, Some(rest))) => self.values[slot]
                .as_mut()
                .and_then(|base| value::remove(base, rest)),
            None => self.extra.remove(id),
        }
    }

    /// Keys that do not belong to any field of the form.
    pub fn unknown_fields(&self) -> impl Iterator<Item = &str> {
        self.extra.keys().map(String::as_str)
    }

    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        for (slot, value) in self.values.iter().enumerate() {
            if let (Some(value), Some(id)) = (value, self.index.id(slot)) {
                map.insert(id.to_string(), value.clone());
            }
        }
        for (key, value) in &self.extra {
            map.insert(key.clone(), value.clone());
        }
        Value::Object(map)
    }
}

impl RecordAccessor for DeclarationRecord {
    fn value(&self, id: &str) -> Option<&Value> {
        self.get(id)
    }
}
