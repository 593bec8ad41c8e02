//! Schema-driven resolution
//!
//! - [`query`] rewrites a friendly filter tree into one directory filter
//!   per schema alias.
//! - [`values`] converts whole attribute sets for writes and raw records
//!   for reads.

pub mod query;
pub mod values;

pub use query::{OperatorCollection, QueryResolver, ResolvedFilter};
pub use values::ValueResolver;
