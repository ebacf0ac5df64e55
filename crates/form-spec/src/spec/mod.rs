pub mod conditional;
pub mod field;
pub mod form;

pub use conditional::{Conditional, ConditionalKind, ValidationRule};
pub use field::{FieldConfig, FieldType, LocationFilter, SelectOption};
pub use form::{FormSpec, PageConfig};
