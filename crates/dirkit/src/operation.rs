//! Directory operation types
//!
//! The requests this toolkit hands to the connection collaborator: searches
//! (including aggregation read-backs) and entry creation, with optional
//! request controls.

use serde::{Deserialize, Serialize};

use crate::error::{DirectoryError, DirectoryResult};

/// Attribute names whose values never appear in logs.
pub const SENSITIVE_ATTRIBUTES: &[&str] = &["unicodePwd", "userPassword"];

const MASKED_VALUE: &str = "******";

/// Search scope relative to the base DN.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchScope {
    /// Only the base entry itself.
    Base,
    /// Immediate children of the base entry.
    OneLevel,
    /// The base entry and everything below it.
    #[default]
    Subtree,
}

/// A request control attached to an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LdapControl {
    /// The OID identifying the control.
    pub oid: String,
    /// Whether the server must reject the operation if it does not support the control.
    #[serde(default)]
    pub criticality: bool,
    /// The control value, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl LdapControl {
    /// Create a non-critical control without a value.
    pub fn new(oid: impl Into<String>) -> Self {
        Self {
            oid: oid.into(),
            criticality: false,
            value: None,
        }
    }

    /// Set the criticality.
    #[must_use]
    pub fn with_criticality(mut self, criticality: bool) -> Self {
        self.criticality = criticality;
        self
    }

    /// Set the control value.
    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }
}

/// A search request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryOperation {
    /// Base DN to search from; `None` lets the connection use its default.
    pub base_dn: Option<String>,
    /// Rendered filter string.
    pub filter: String,
    /// Attributes to return (empty means all user attributes).
    pub attributes: Vec<String>,
    /// Search scope.
    pub scope: SearchScope,
    /// Maximum number of entries to return.
    pub size_limit: Option<u32>,
    /// Request controls.
    pub controls: Vec<LdapControl>,
}

impl QueryOperation {
    /// Create a subtree search with the given filter.
    pub fn new(filter: impl Into<String>) -> Self {
        Self {
            base_dn: None,
            filter: filter.into(),
            attributes: Vec::new(),
            scope: SearchScope::default(),
            size_limit: None,
            controls: Vec::new(),
        }
    }

    /// Set the base DN.
    pub fn with_base_dn(mut self, base_dn: impl Into<String>) -> Self {
        self.base_dn = Some(base_dn.into());
        self
    }

    /// Set the attributes to return.
    pub fn with_attributes<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes = attributes.into_iter().map(Into::into).collect();
        self
    }

    /// Set the search scope.
    #[must_use]
    pub fn with_scope(mut self, scope: SearchScope) -> Self {
        self.scope = scope;
        self
    }

    /// Set the size limit.
    #[must_use]
    pub fn with_size_limit(mut self, size_limit: u32) -> Self {
        self.size_limit = Some(size_limit);
        self
    }

    /// Attach a request control.
    #[must_use]
    pub fn with_control(mut self, control: LdapControl) -> Self {
        self.controls.push(control);
        self
    }
}

/// A request to create an entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddOperation {
    /// DN of the entry to create; required before the operation can run.
    pub dn: Option<String>,
    /// Wire attributes and their values.
    pub attributes: Vec<(String, Vec<String>)>,
    /// Container the entry is placed in, when the DN is built from it.
    pub location: Option<String>,
    /// Request controls.
    pub controls: Vec<LdapControl>,
}

impl AddOperation {
    /// Create an add operation without a DN.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the DN.
    pub fn with_dn(mut self, dn: impl Into<String>) -> Self {
        self.dn = Some(dn.into());
        self
    }

    /// Replace all attributes.
    pub fn with_attributes(mut self, attributes: Vec<(String, Vec<String>)>) -> Self {
        self.attributes = attributes;
        self
    }

    /// Append an attribute with its values.
    pub fn with_attribute<I, S>(mut self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes
            .push((name.into(), values.into_iter().map(Into::into).collect()));
        self
    }

    /// Set the location (container DN).
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Attach a request control.
    #[must_use]
    pub fn with_control(mut self, control: LdapControl) -> Self {
        self.controls.push(control);
        self
    }

    /// The name of the operation.
    pub fn name(&self) -> &'static str {
        "Add"
    }

    /// The DN and attributes, in the order the wire call expects them.
    ///
    /// # Errors
    /// Returns a configuration error if no DN has been set.
    pub fn arguments(&self) -> DirectoryResult<(&str, &[(String, Vec<String>)])> {
        let dn = self.dn.as_deref().ok_or_else(|| {
            DirectoryError::configuration("an add operation requires a DN to be set")
        })?;
        Ok((dn, &self.attributes))
    }

    /// Attributes safe for logging, with sensitive values masked.
    pub fn log_attributes(&self) -> Vec<(String, Vec<String>)> {
        self.attributes
            .iter()
            .map(|(name, values)| {
                if is_sensitive_attribute(name) {
                    (name.clone(), vec![MASKED_VALUE.to_string(); values.len()])
                } else {
                    (name.clone(), values.clone())
                }
            })
            .collect()
    }
}

/// Check whether an attribute's values must be kept out of logs.
pub fn is_sensitive_attribute(name: &str) -> bool {
    SENSITIVE_ATTRIBUTES
        .iter()
        .any(|sensitive| sensitive.eq_ignore_ascii_case(name))
}
