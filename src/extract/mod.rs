pub mod details;
pub mod field;
pub mod selectors;
pub mod statics;
pub mod variants;

pub use field::{FieldSpec, FieldStrategy, ValueSource};
pub use variants::{VariantConfig, VariantMachine};
