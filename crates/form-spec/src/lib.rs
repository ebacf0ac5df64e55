#![allow(missing_docs)]

pub mod action;
pub mod address;
pub mod context;
pub mod dsl;
pub mod error;
pub mod eval;
pub mod expr;
pub mod location;
pub mod persist;
pub mod publish;
pub mod record;
pub mod record_schema;
pub mod scope;
pub mod spec;
pub mod summary;
pub mod template;
pub mod validate;
pub mod value;
pub mod visibility;

pub use action::{
    ActionCatalog, ActionConfig, ActionContext, ActionRecord, ActionStatus, ActionType,
    EventState, User, default_gate, offered_actions,
};
pub use address::{AddressConfig, address_fields};
pub use context::{EngineOptions, FormContext, VisibilityMode};
pub use error::{EvalError, SchemaError, SchemaErrors};
pub use eval::{EvalContext, RecordAccessor, RecordContext, evaluate};
pub use expr::{DateBound, Direction, Expr, Operand};
pub use location::{Location, LocationError, LocationSource, LocationTree, field_options};
pub use persist::{PersistError, PersistFormat};
pub use publish::{FormRegistry, PublishedForm, publish};
pub use record::{DeclarationRecord, FieldIndex};
pub use record_schema::generate as record_schema;
pub use scope::{Allow, Scope, ScopeKind, ScopeParseError, ScopeRequest, ScopeSet};
pub use spec::{
    Conditional, ConditionalKind, FieldConfig, FieldType, FormSpec, LocationFilter, PageConfig,
    SelectOption, ValidationRule,
};
pub use summary::{ReviewSummary, SummaryEntry, SummaryPage, build_summary, render_summary_text};
pub use validate::{ErrorCode, FieldError, ValidationResult, validate};
pub use visibility::{
    VisibilityMap, cleared_fields, get_visible_fields, is_field_visible, resolve_visibility,
    review_visibility,
};
