//! # Directory Toolkit
//!
//! Translates between a friendly object/attribute model and the wire
//! representation of a directory service: attribute names, filter syntax and
//! encoded values.
//!
//! ## Architecture
//!
//! - [`filter`] - Filter expression tree rendered to RFC 4515 text
//! - [`schema`] - Per-object-type attribute maps with converter bindings
//! - [`convert`] - Bidirectional value converters, including bitmask
//!   aggregation over shared flag attributes
//! - [`resolver`] - Rewrites filters per schema alias and converts attribute
//!   sets for writes and reads
//! - [`sort`] - Stable, multi-key, alias-aware result sorting
//!
//! The directory itself is reached through the [`DirectoryConnection`]
//! collaborator, which the `dirkit-ldap` crate implements on top of `ldap3`.
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use dirkit::prelude::*;
//!
//! let user = Arc::new(
//!     Schema::new("ad", "user")
//!         .with_base_filter(FilterNode::eq("objectClass", "user"))
//!         .map("firstName", "givenName")
//!         .map_converted("hideFromGAL", "msExchHideFromAddressLists", Arc::new(BooleanConverter)),
//! );
//!
//! let mut collection = OperatorCollection::new();
//! collection.add_schema(user).unwrap();
//! collection.add(FilterNode::eq("firstName", "Amy"));
//! collection.add(FilterNode::eq("hideFromGAL", false));
//!
//! let resolved = QueryResolver::new(OperationType::SearchTo).resolve(&collection).unwrap();
//! assert_eq!(
//!     resolved.to_filter(None).unwrap(),
//!     "(&(objectClass=user)(givenName=Amy)(msExchHideFromAddressLists=FALSE))"
//! );
//! ```
//!
//! ## Crate Organization
//!
//! - [`error`] - Error types with transient/permanent classification
//! - [`record`] - Attribute values and directory records
//! - [`operation`] - Query and add operations handed to the connection
//! - [`traits`] - The connection collaborator trait

pub mod convert;
pub mod error;
pub mod filter;
pub mod operation;
pub mod record;
pub mod resolver;
pub mod schema;
pub mod sort;
pub mod traits;

pub use error::{DirectoryError, DirectoryResult};
pub use traits::DirectoryConnection;

/// Prelude module for convenient imports.
///
/// ```
/// use dirkit::prelude::*;
/// ```
pub mod prelude {
    // Error handling
    pub use crate::error::{DirectoryError, DirectoryResult};

    // Values and records
    pub use crate::record::{AttributeLookup, AttributeMap, AttributeValue, DirectoryRecord};

    // Filters
    pub use crate::filter::{escape_filter_value, Comparison, FilterNode, Operator};

    // Schema
    pub use crate::schema::{AttributeBinding, Schema, SchemaRegistry};

    // Converters
    pub use crate::convert::{
        AttributeConverter, BitmaskConverter, BitmaskOptions, BooleanConverter, ConversionContext,
        FlagGroup, GeneralizedTimeConverter, OperationType, WindowsTimeConverter,
    };

    // Resolution
    pub use crate::resolver::{OperatorCollection, QueryResolver, ResolvedFilter, ValueResolver};

    // Operations and the connection collaborator
    pub use crate::operation::{AddOperation, LdapControl, QueryOperation, SearchScope};
    pub use crate::traits::DirectoryConnection;

    // Sorting
    pub use crate::sort::{ResultSorter, SortDirection, SortKey};
}

#[cfg(test)]
mod tests {
    use super::prelude::*;

    #[test]
    fn test_prelude_imports() {
        // Verify all prelude types are accessible
        let _filter = FilterNode::eq("cn", "test");
        let _schema = Schema::new("ad", "user");
        let _ctx = ConversionContext::new(OperationType::SearchTo);
        let _query = QueryOperation::new("(cn=test)");
        let _add = AddOperation::new().with_dn("cn=test,dc=example,dc=com");
        let _sorter = ResultSorter::new(vec![SortKey::asc("cn")]);
        let _attrs = AttributeMap::new().with("name", "test");
    }
}
