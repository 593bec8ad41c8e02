//! Attribute converters
//!
//! Bidirectional value codecs selected per attribute through the schema.
//! Converters are stateless; anything that has to survive between calls for
//! one entry (the running value of an aggregated attribute) lives in the
//! caller-owned [`ConversionContext`].
//!
//! Aggregation is not transactional: the read-back and the eventual write
//! are separate round trips, so two writers aggregating the same attribute
//! of the same entry concurrently can lose an update. Callers needing
//! atomicity must serialize writes per entry.

pub mod bitmask;
pub mod boolean;
pub mod time;

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::{DirectoryError, DirectoryResult};
use crate::filter::{Comparison, FilterNode};
use crate::operation::{QueryOperation, SearchScope};
use crate::record::AttributeValue;
use crate::traits::DirectoryConnection;

pub use bitmask::{BitmaskConverter, BitmaskOptions, FlagGroup};
pub use boolean::BooleanConverter;
pub use time::{GeneralizedTimeConverter, WindowsTimeConverter};

/// The operation a conversion is performed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    /// Reading filter criteria back out of the directory representation.
    SearchFrom,
    /// Building filter criteria for a search.
    SearchTo,
    /// Creating an entry.
    Create,
    /// Modifying an existing entry.
    Modify,
}

impl OperationType {
    /// Check if this is one of the search directions.
    pub fn is_search(self) -> bool {
        matches!(self, OperationType::SearchFrom | OperationType::SearchTo)
    }

    /// Check if this operation mutates stored state.
    pub fn is_write(self) -> bool {
        !self.is_search()
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationType::SearchFrom => write!(f, "search_from"),
            OperationType::SearchTo => write!(f, "search_to"),
            OperationType::Create => write!(f, "create"),
            OperationType::Modify => write!(f, "modify"),
        }
    }
}

/// A bidirectional codec between a domain value and its wire representation.
pub trait AttributeConverter: fmt::Debug + Send + Sync {
    /// Convert a domain value to the directory representation.
    fn to_directory(
        &self,
        value: &AttributeValue,
        ctx: &mut ConversionContext<'_>,
    ) -> DirectoryResult<String>;

    /// Convert a stored wire value to its domain value.
    fn from_directory(
        &self,
        value: &str,
        ctx: &ConversionContext<'_>,
    ) -> DirectoryResult<AttributeValue>;

    /// Whether converting for `operation` needs the attribute's current
    /// stored value to be read back first.
    fn aggregates(&self, _operation: OperationType) -> bool {
        false
    }

    /// The wire value a brand-new entry starts from, for aggregating converters.
    fn default_value(&self) -> Option<&str> {
        None
    }

    /// Build the search filter for a comparison on this attribute.
    ///
    /// The default converts the value and keeps the operator.
    fn to_search_filter(
        &self,
        comparison: &Comparison,
        ctx: &mut ConversionContext<'_>,
    ) -> DirectoryResult<FilterNode> {
        let value = self.to_directory(&comparison.value, ctx)?;
        Ok(FilterNode::Comparison(Comparison::new(
            ctx.wire_attribute(),
            comparison.operator.clone(),
            value,
        )))
    }
}

/// Per-entry state and collaborators available to a converter.
pub struct ConversionContext<'a> {
    operation: OperationType,
    attribute: String,
    wire_attribute: String,
    dn: Option<String>,
    connection: Option<&'a dyn DirectoryConnection>,
    pending: HashMap<String, String>,
}

impl<'a> ConversionContext<'a> {
    /// Create a context for the given operation.
    pub fn new(operation: OperationType) -> Self {
        Self {
            operation,
            attribute: String::new(),
            wire_attribute: String::new(),
            dn: None,
            connection: None,
            pending: HashMap::new(),
        }
    }

    /// Set the DN of the entry being converted.
    pub fn with_dn(mut self, dn: impl Into<String>) -> Self {
        self.dn = Some(dn.into());
        self
    }

    /// Set the connection used for read-backs.
    pub fn with_connection(mut self, connection: &'a dyn DirectoryConnection) -> Self {
        self.connection = Some(connection);
        self
    }

    /// Point the context at the attribute about to be converted.
    pub fn set_attribute(&mut self, attribute: impl Into<String>, wire_attribute: impl Into<String>) {
        self.attribute = attribute.into();
        self.wire_attribute = wire_attribute.into();
    }

    /// Point the context at an attribute using builder pattern.
    pub fn for_attribute(
        mut self,
        attribute: impl Into<String>,
        wire_attribute: impl Into<String>,
    ) -> Self {
        self.set_attribute(attribute, wire_attribute);
        self
    }

    /// Change the operation type.
    pub fn set_operation(&mut self, operation: OperationType) {
        self.operation = operation;
    }

    /// The operation being performed.
    pub fn operation(&self) -> OperationType {
        self.operation
    }

    /// The friendly attribute name being converted.
    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    /// The directory attribute name being converted.
    pub fn wire_attribute(&self) -> &str {
        &self.wire_attribute
    }

    /// The DN of the entry being converted, if known.
    pub fn dn(&self) -> Option<&str> {
        self.dn.as_deref()
    }

    /// The value most recently produced for the current wire attribute by an
    /// aggregating conversion within this context.
    pub fn pending_value(&self) -> Option<&str> {
        self.pending
            .get(&self.wire_attribute.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Seed the running value of a wire attribute, so aggregation starts
    /// from it instead of reading the entry back.
    pub fn seed_value(&mut self, wire_attribute: &str, value: impl Into<String>) {
        self.pending
            .insert(wire_attribute.to_ascii_lowercase(), value.into());
    }

    /// Remember the value produced for the current wire attribute.
    pub fn record_value(&mut self, value: impl Into<String>) {
        self.pending
            .insert(self.wire_attribute.to_ascii_lowercase(), value.into());
    }

    /// The current stored value to aggregate against.
    ///
    /// Returns the pending value when an earlier conversion in this context
    /// already produced one; otherwise reads the attribute back from the
    /// directory, using `default` when the entry has no value for it.
    ///
    /// # Errors
    /// - configuration error when no DN or no connection is available
    /// - not-found error when the entry cannot be resolved to exactly one result
    pub fn current_value(&self, default: Option<&str>) -> DirectoryResult<String> {
        if let Some(pending) = self.pending_value() {
            return Ok(pending.to_string());
        }

        match self.query_current_value(&self.wire_attribute)? {
            Some(value) => Ok(value),
            None => default.map(str::to_string).ok_or_else(|| {
                DirectoryError::configuration(format!(
                    "no current or default value available for the \"{}\" attribute",
                    self.wire_attribute
                ))
            }),
        }
    }

    /// Read the stored value of `attribute` for the context's entry.
    ///
    /// `Ok(None)` means the entry exists but has no value for the attribute.
    #[instrument(skip(self), fields(dn = ?self.dn))]
    pub fn query_current_value(&self, attribute: &str) -> DirectoryResult<Option<String>> {
        let dn = self.dn.as_deref().ok_or_else(|| {
            DirectoryError::configuration(format!(
                "Unable to query for the current \"{attribute}\" attribute."
            ))
        })?;
        let connection = self.connection.ok_or_else(|| {
            DirectoryError::configuration(format!(
                "no directory connection available to query the current \"{attribute}\" attribute"
            ))
        })?;

        let filter = FilterNode::and(vec![FilterNode::eq("distinguishedName", dn)]);
        let query = QueryOperation::new(filter.to_string())
            .with_attributes([attribute])
            .with_scope(SearchScope::Subtree);

        debug!(dn = %dn, attribute = %attribute, "Reading current attribute value");

        let mut records = connection.search(&query)?;
        if records.len() != 1 {
            debug!(dn = %dn, matches = records.len(), "Read-back did not resolve to one entry");
            return Err(DirectoryError::not_found(dn));
        }
        let record = records.remove(0);

        Ok(record.get_string(attribute).map(str::to_string))
    }
}

impl fmt::Debug for ConversionContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionContext")
            .field("operation", &self.operation)
            .field("attribute", &self.attribute)
            .field("wire_attribute", &self.wire_attribute)
            .field("dn", &self.dn)
            .field("connection", &self.connection.is_some())
            .field("pending", &self.pending)
            .finish()
    }
}

/// Shared test double for the connection collaborator.
#[cfg(test)]
pub(crate) mod testing {
    use std::cell::RefCell;

    use crate::error::DirectoryResult;
    use crate::operation::{AddOperation, QueryOperation};
    use crate::record::DirectoryRecord;
    use crate::traits::DirectoryConnection;

    /// Returns canned records and remembers every query it receives.
    #[derive(Default)]
    pub struct RecordingConnection {
        pub records: Vec<DirectoryRecord>,
        pub queries: RefCell<Vec<QueryOperation>>,
        pub adds: RefCell<Vec<AddOperation>>,
    }

    impl RecordingConnection {
        pub fn returning(records: Vec<DirectoryRecord>) -> Self {
            Self {
                records,
                ..Self::default()
            }
        }
    }

    impl DirectoryConnection for RecordingConnection {
        fn search(&self, query: &QueryOperation) -> DirectoryResult<Vec<DirectoryRecord>> {
            self.queries.borrow_mut().push(query.clone());
            Ok(self.records.clone())
        }

        fn add(&self, operation: &AddOperation) -> DirectoryResult<()> {
            self.adds.borrow_mut().push(operation.clone());
            Ok(())
        }
    }
}
