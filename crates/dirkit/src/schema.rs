//! Schema registry
//!
//! A [`Schema`] maps the friendly attribute names of one object type to the
//! directory attribute names that store them, and to the converter applied
//! to their values. Schemas are built once by the host's loader, registered
//! in a [`SchemaRegistry`] and shared read-only behind `Arc` afterwards.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::convert::AttributeConverter;
use crate::error::{DirectoryError, DirectoryResult};
use crate::filter::FilterNode;

/// Where a friendly attribute lives in the directory.
#[derive(Clone)]
pub struct AttributeBinding {
    wire_names: Vec<String>,
    converter: Option<Arc<dyn AttributeConverter>>,
}

impl AttributeBinding {
    /// Bind to a single directory attribute.
    pub fn new(wire_name: impl Into<String>) -> Self {
        Self {
            wire_names: vec![wire_name.into()],
            converter: None,
        }
    }

    /// Bind to several directory attributes; searches match any of them.
    pub fn multi<I, S>(wire_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            wire_names: wire_names.into_iter().map(Into::into).collect(),
            converter: None,
        }
    }

    /// Attach a converter.
    pub fn with_converter(mut self, converter: Arc<dyn AttributeConverter>) -> Self {
        self.converter = Some(converter);
        self
    }

    /// All directory attribute names, in declaration order.
    pub fn wire_names(&self) -> &[String] {
        &self.wire_names
    }

    /// The primary directory attribute name, used for writes.
    pub fn wire_name(&self) -> &str {
        self.wire_names.first().map(String::as_str).unwrap_or_default()
    }

    /// The converter for this attribute, if values need converting.
    pub fn converter(&self) -> Option<&dyn AttributeConverter> {
        self.converter.as_deref()
    }
}

impl fmt::Debug for AttributeBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttributeBinding")
            .field("wire_names", &self.wire_names)
            .field("converter", &self.converter)
            .finish()
    }
}

/// The attribute map and base predicate of one object type.
#[derive(Debug, Clone)]
pub struct Schema {
    context: String,
    object_type: String,
    base_filter: Option<FilterNode>,
    attributes: Vec<(String, AttributeBinding)>,
    index: HashMap<String, usize>,
}

impl Schema {
    /// Create an empty schema for an object type within a context (e.g. `ad`).
    #[must_use]
    pub fn new(context: impl Into<String>, object_type: impl Into<String>) -> Self {
        Self {
            context: context.into(),
            object_type: object_type.into(),
            base_filter: None,
            attributes: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Set the predicate conjoined into every filter for this type.
    #[must_use]
    pub fn with_base_filter(mut self, filter: FilterNode) -> Self {
        self.base_filter = Some(filter);
        self
    }

    /// Map a friendly name to a binding, replacing any earlier mapping.
    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, binding: AttributeBinding) -> Self {
        let name = name.into();
        let key = name.to_lowercase();
        match self.index.get(&key) {
            Some(&position) => self.attributes[position] = (name, binding),
            None => {
                self.index.insert(key, self.attributes.len());
                self.attributes.push((name, binding));
            }
        }
        self
    }

    /// Map a friendly name to a directory attribute without conversion.
    #[must_use]
    pub fn map(self, name: impl Into<String>, wire_name: impl Into<String>) -> Self {
        self.with_attribute(name, AttributeBinding::new(wire_name))
    }

    /// Map a friendly name to a directory attribute through a converter.
    #[must_use]
    pub fn map_converted(
        self,
        name: impl Into<String>,
        wire_name: impl Into<String>,
        converter: Arc<dyn AttributeConverter>,
    ) -> Self {
        self.with_attribute(name, AttributeBinding::new(wire_name).with_converter(converter))
    }

    /// The schema context.
    pub fn context(&self) -> &str {
        &self.context
    }

    /// The object type this schema describes.
    pub fn object_type(&self) -> &str {
        &self.object_type
    }

    /// The base predicate, if any.
    pub fn base_filter(&self) -> Option<&FilterNode> {
        self.base_filter.as_ref()
    }

    /// Look up a friendly attribute (case-insensitive), returning its
    /// declared name and binding.
    pub fn binding(&self, name: &str) -> Option<(&str, &AttributeBinding)> {
        self.index
            .get(&name.to_lowercase())
            .map(|&position| {
                let (declared, binding) = &self.attributes[position];
                (declared.as_str(), binding)
            })
    }

    /// Check if a friendly attribute is defined.
    pub fn has_attribute(&self, name: &str) -> bool {
        self.index.contains_key(&name.to_lowercase())
    }

    /// All friendly attributes in declaration order.
    pub fn attributes(&self) -> impl Iterator<Item = (&str, &AttributeBinding)> {
        self.attributes
            .iter()
            .map(|(name, binding)| (name.as_str(), binding))
    }
}

/// Registered schemas, keyed by context and object type (case-insensitive).
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: HashMap<(String, String), Arc<Schema>>,
}

impl SchemaRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a schema, replacing any schema with the same key.
    #[must_use]
    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.register(schema);
        self
    }

    /// Register a schema, replacing any schema with the same key.
    pub fn register(&mut self, schema: Schema) {
        let key = registry_key(schema.context(), schema.object_type());
        self.schemas.insert(key, Arc::new(schema));
    }

    /// Get a schema.
    ///
    /// # Errors
    /// Resolution error when nothing is registered for the pair.
    pub fn get(&self, context: &str, object_type: &str) -> DirectoryResult<Arc<Schema>> {
        self.schemas
            .get(&registry_key(context, object_type))
            .cloned()
            .ok_or_else(|| {
                DirectoryError::resolution(format!(
                    "no schema registered for object type '{object_type}' in context '{context}'"
                ))
            })
    }

    /// Find a schema by object type in any context.
    pub fn find_by_object_type(&self, object_type: &str) -> Option<Arc<Schema>> {
        self.schemas
            .values()
            .find(|schema| schema.object_type().eq_ignore_ascii_case(object_type))
            .cloned()
    }

    /// Number of registered schemas.
    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    /// Check if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

fn registry_key(context: &str, object_type: &str) -> (String, String) {
    (context.to_lowercase(), object_type.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::BooleanConverter;

    fn user_schema() -> Schema {
        Schema::new("ad", "user")
            .with_base_filter(FilterNode::and(vec![
                FilterNode::eq("objectCategory", "person"),
                FilterNode::eq("objectClass", "user"),
            ]))
            .map("firstName", "givenName")
            .map("name", "cn")
            .map_converted(
                "exchangeHideFromGAL",
                "msExchHideFromAddressLists",
                Arc::new(BooleanConverter),
            )
            .with_attribute("emailAddress", AttributeBinding::multi(["mail", "proxyAddresses"]))
    }

    #[test]
    fn test_binding_lookup_is_case_insensitive() {
        let schema = user_schema();
        let (declared, binding) = schema.binding("FIRSTNAME").unwrap();
        assert_eq!(declared, "firstName");
        assert_eq!(binding.wire_name(), "givenName");
        assert!(binding.converter().is_none());

        let (_, binding) = schema.binding("exchangehidefromgal").unwrap();
        assert!(binding.converter().is_some());
        assert!(!schema.has_attribute("lastName"));
    }

    #[test]
    fn test_remapping_replaces_binding() {
        let schema = user_schema().map("FirstName", "gn");
        assert_eq!(schema.attributes().count(), 4);
        let (declared, binding) = schema.binding("firstName").unwrap();
        assert_eq!(declared, "FirstName");
        assert_eq!(binding.wire_name(), "gn");
    }

    #[test]
    fn test_registry() {
        let registry = SchemaRegistry::new().with_schema(user_schema());
        assert_eq!(registry.len(), 1);

        let schema = registry.get("AD", "User").unwrap();
        assert_eq!(schema.object_type(), "user");
        assert_eq!(
            schema.base_filter().unwrap().to_string(),
            "(&(objectCategory=person)(objectClass=user))"
        );
        assert!(registry.find_by_object_type("USER").is_some());

        let err = registry.get("ad", "contact").unwrap_err();
        assert_eq!(err.error_code(), "RESOLUTION_FAILED");
    }
}
