use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::spec::conditional::Conditional;
use crate::spec::field::FieldConfig;

/// One page: an ordered field list shown under a title.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PageConfig {
    pub id: String,
    pub title: String,
    /// SHOW/HIDE conditionals for the whole page.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditionals: Vec<Conditional>,
    pub fields: Vec<FieldConfig>,
}

impl PageConfig {
    pub fn new(id: impl Into<String>, title: impl Into<String>, fields: Vec<FieldConfig>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            conditionals: Vec::new(),
            fields,
        }
    }
}

/// Top-level versioned form definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FormSpec {
    pub id: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub pages: Vec<PageConfig>,
}

impl FormSpec {
    /// Every field in display order.
    pub fn fields(&self) -> impl Iterator<Item = &FieldConfig> {
        self.pages.iter().flat_map(|page| page.fields.iter())
    }

    pub fn field(&self, id: &str) -> Option<&FieldConfig> {
        self.fields().find(|field| field.id == id)
    }
}
