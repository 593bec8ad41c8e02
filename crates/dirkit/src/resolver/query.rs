//! Query resolution
//!
//! An [`OperatorCollection`] pairs the caller's filter nodes with the
//! schemas the query spans, each under an alias. [`QueryResolver`] walks the
//! nodes once per alias, renames friendly attributes to their wire names,
//! converts values, and conjoins the alias's base predicate.
//!
//! Leaf rules:
//! - `alias.attribute` applies to that alias only; an unknown alias is a
//!   resolution error, an attribute the alias's schema does not define is
//!   passed through unconverted.
//! - a bare `attribute` applies to every alias whose schema defines it, and
//!   is a resolution error when none does.

use std::sync::Arc;

use tracing::{debug, instrument};

use crate::convert::{ConversionContext, OperationType};
use crate::error::{DirectoryError, DirectoryResult};
use crate::filter::{Comparison, FilterNode, Operator};
use crate::schema::{AttributeBinding, Schema};

/// Filter nodes plus the aliased schemas they are resolved against.
#[derive(Debug, Clone, Default)]
pub struct OperatorCollection {
    nodes: Vec<FilterNode>,
    aliases: Vec<(String, Arc<Schema>)>,
}

impl OperatorCollection {
    /// Create an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a top-level node; top-level nodes are conjoined.
    pub fn add(&mut self, node: FilterNode) {
        self.nodes.push(node);
    }

    /// Add a top-level node using builder pattern.
    #[must_use]
    pub fn with(mut self, node: FilterNode) -> Self {
        self.add(node);
        self
    }

    /// Register a schema under its object type name.
    ///
    /// # Errors
    /// Configuration error if the alias is already taken.
    pub fn add_schema(&mut self, schema: Arc<Schema>) -> DirectoryResult<()> {
        let alias = schema.object_type().to_string();
        self.add_alias(alias, schema)
    }

    /// Register a schema under an explicit alias.
    ///
    /// # Errors
    /// Configuration error if the alias is empty, contains a `.`, or is
    /// already taken.
    pub fn add_alias(
        &mut self,
        alias: impl Into<String>,
        schema: Arc<Schema>,
    ) -> DirectoryResult<()> {
        let alias = alias.into();
        if alias.is_empty() || alias.contains('.') {
            return Err(DirectoryError::configuration(format!(
                "invalid query alias '{alias}'"
            )));
        }
        if self.schema(&alias).is_some() {
            return Err(DirectoryError::configuration(format!(
                "query alias '{alias}' is already registered"
            )));
        }
        self.aliases.push((alias, schema));
        Ok(())
    }

    /// The schema registered under an alias (case-insensitive).
    pub fn schema(&self, alias: &str) -> Option<&Arc<Schema>> {
        self.aliases
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(alias))
            .map(|(_, schema)| schema)
    }

    /// Registered aliases in registration order.
    pub fn aliases(&self) -> impl Iterator<Item = (&str, &Arc<Schema>)> {
        self.aliases
            .iter()
            .map(|(alias, schema)| (alias.as_str(), schema))
    }

    /// The top-level nodes in insertion order.
    pub fn nodes(&self) -> &[FilterNode] {
        &self.nodes
    }
}

/// One resolved filter per alias.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedFilter {
    filters: Vec<(String, FilterNode)>,
}

impl ResolvedFilter {
    /// The filter for one alias (case-insensitive).
    ///
    /// # Errors
    /// Resolution error for an alias the query does not span.
    pub fn filter(&self, alias: &str) -> DirectoryResult<&FilterNode> {
        self.filters
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(alias))
            .map(|(_, filter)| filter)
            .ok_or_else(|| {
                DirectoryError::resolution(format!("alias '{alias}' is not part of the query"))
            })
    }

    /// All per-alias filters OR-combined; a single non-empty filter is
    /// returned as is.
    pub fn merged(&self) -> FilterNode {
        let mut filters: Vec<FilterNode> = self
            .filters
            .iter()
            .filter(|(_, filter)| !filter.render(None).is_empty())
            .map(|(_, filter)| filter.clone())
            .collect();
        if filters.len() == 1 {
            return filters.remove(0);
        }
        FilterNode::or(filters)
    }

    /// Render the filter for `alias`, or the merged filter for `None`.
    pub fn to_filter(&self, alias: Option<&str>) -> DirectoryResult<String> {
        match alias {
            Some(alias) => Ok(self.filter(alias)?.to_string()),
            None => Ok(self.merged().to_string()),
        }
    }

    /// Aliases in registration order.
    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.filters.iter().map(|(alias, _)| alias.as_str())
    }
}

/// Resolves an [`OperatorCollection`] for one operation type.
#[derive(Debug, Clone, Copy)]
pub struct QueryResolver {
    operation: OperationType,
}

impl Default for QueryResolver {
    fn default() -> Self {
        Self::new(OperationType::SearchTo)
    }
}

impl QueryResolver {
    /// Create a resolver converting values for `operation`.
    pub fn new(operation: OperationType) -> Self {
        Self { operation }
    }

    /// Resolve every alias of the collection.
    ///
    /// # Errors
    /// - resolution error for an empty collection, an unknown alias prefix
    ///   or a bare attribute no schema defines
    /// - any error raised by a converter
    #[instrument(skip(self, collection), fields(operation = %self.operation))]
    pub fn resolve(&self, collection: &OperatorCollection) -> DirectoryResult<ResolvedFilter> {
        if collection.aliases.is_empty() {
            return Err(DirectoryError::resolution(
                "a query needs at least one schema to resolve against",
            ));
        }
        for node in collection.nodes() {
            validate(node, collection)?;
        }

        let mut filters = Vec::with_capacity(collection.aliases.len());
        for (alias, schema) in collection.aliases() {
            let mut ctx = ConversionContext::new(self.operation);
            let mut children: Vec<FilterNode> =
                schema.base_filter().into_iter().cloned().collect();
            for node in collection.nodes() {
                if let Some(resolved) = self.resolve_node(node, alias, schema, &mut ctx)? {
                    children.push(resolved);
                }
            }
            let filter = FilterNode::and(children);
            debug!(alias = %alias, filter = %filter, "Resolved alias filter");
            filters.push((alias.to_string(), filter));
        }

        Ok(ResolvedFilter { filters })
    }

    fn resolve_node(
        &self,
        node: &FilterNode,
        alias: &str,
        schema: &Schema,
        ctx: &mut ConversionContext<'_>,
    ) -> DirectoryResult<Option<FilterNode>> {
        match node {
            FilterNode::Comparison(comparison) => {
                if let Some(own) = comparison.alias() {
                    if !own.eq_ignore_ascii_case(alias) {
                        return Ok(None);
                    }
                }
                match schema.binding(comparison.bare_attribute()) {
                    Some((declared, binding)) => {
                        self.convert_leaf(comparison, declared, binding, ctx).map(Some)
                    }
                    None if comparison.alias().is_some() => {
                        Ok(Some(FilterNode::Comparison(Comparison::new(
                            comparison.bare_attribute(),
                            comparison.operator.clone(),
                            comparison.value.clone(),
                        ))))
                    }
                    None => Ok(None),
                }
            }
            FilterNode::And(children) | FilterNode::Or(children) => {
                let mut resolved = Vec::with_capacity(children.len());
                for child in children {
                    if let Some(child) = self.resolve_node(child, alias, schema, ctx)? {
                        resolved.push(child);
                    }
                }
                if resolved.is_empty() {
                    return Ok(None);
                }
                Ok(Some(match node {
                    FilterNode::And(_) => FilterNode::and(resolved),
                    _ => FilterNode::or(resolved),
                }))
            }
            FilterNode::Not(child) => Ok(self
                .resolve_node(child, alias, schema, ctx)?
                .map(FilterNode::negate)),
        }
    }

    fn convert_leaf(
        &self,
        comparison: &Comparison,
        declared: &str,
        binding: &AttributeBinding,
        ctx: &mut ConversionContext<'_>,
    ) -> DirectoryResult<FilterNode> {
        let mut nodes = Vec::with_capacity(binding.wire_names().len());
        for wire_name in binding.wire_names() {
            ctx.set_attribute(declared, wire_name.as_str());
            let node = match (&comparison.operator, binding.converter()) {
                (Operator::Present, _) | (_, None) => FilterNode::Comparison(Comparison::new(
                    wire_name.as_str(),
                    comparison.operator.clone(),
                    comparison.value.clone(),
                )),
                (_, Some(converter)) => converter.to_search_filter(comparison, ctx)?,
            };
            nodes.push(node);
        }

        if nodes.len() == 1 {
            return Ok(nodes.remove(0));
        }
        Ok(FilterNode::or(nodes))
    }
}

fn validate(node: &FilterNode, collection: &OperatorCollection) -> DirectoryResult<()> {
    let FilterNode::Comparison(comparison) = node else {
        return node
            .children()
            .iter()
            .try_for_each(|child| validate(child, collection));
    };

    match comparison.alias() {
        Some(alias) if collection.schema(alias).is_none() => Err(DirectoryError::resolution(
            format!(
                "unknown alias '{alias}' in attribute reference '{}'",
                comparison.attribute
            ),
        )),
        Some(_) => Ok(()),
        None => {
            let attribute = comparison.bare_attribute();
            if collection
                .aliases()
                .any(|(_, schema)| schema.has_attribute(attribute))
            {
                Ok(())
            } else {
                Err(DirectoryError::resolution(format!(
                    "attribute '{attribute}' is not defined by any schema in the query"
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::{BooleanConverter, GeneralizedTimeConverter};
    use chrono::{FixedOffset, TimeZone};

    fn user_schema() -> Arc<Schema> {
        Arc::new(
            Schema::new("ad", "user")
                .with_base_filter(FilterNode::and(vec![
                    FilterNode::eq("objectCategory", "person"),
                    FilterNode::eq("objectClass", "user"),
                ]))
                .map("name", "cn")
                .map("firstName", "givenName")
                .map("username", "sAMAccountName")
                .map_converted("created", "whenCreated", Arc::new(GeneralizedTimeConverter))
                .map_converted(
                    "exchangeHideFromGAL",
                    "msExchHideFromAddressLists",
                    Arc::new(BooleanConverter),
                )
                .with_attribute(
                    "emailAddress",
                    AttributeBinding::multi(["mail", "proxyAddresses"]),
                ),
        )
    }

    fn ou_schema() -> Arc<Schema> {
        Arc::new(
            Schema::new("ad", "ou")
                .with_base_filter(FilterNode::eq("objectClass", "organizationalUnit"))
                .map("name", "ou")
                .map("description", "description"),
        )
    }

    fn collection() -> OperatorCollection {
        let mut collection = OperatorCollection::new();
        collection.add_schema(user_schema()).unwrap();
        collection.add_schema(ou_schema()).unwrap();
        collection
    }

    #[test]
    fn test_converts_attributes_and_values() {
        let collection = collection()
            .with(FilterNode::eq("exchangeHideFromGAL", false))
            .with(FilterNode::eq("username", "foo"));

        let resolved = QueryResolver::default().resolve(&collection).unwrap();
        assert_eq!(
            resolved.to_filter(Some("user")).unwrap(),
            "(&(&(objectCategory=person)(objectClass=user))(msExchHideFromAddressLists=FALSE)(sAMAccountName=foo))"
        );
    }

    #[test]
    fn test_converts_nested_operators_in_insertion_order() {
        let new_year = FixedOffset::west_opt(5 * 3600)
            .unwrap()
            .with_ymd_and_hms(2016, 1, 1, 0, 0, 0)
            .unwrap();
        let collection = collection()
            .with(FilterNode::eq("username", "foo"))
            .with(FilterNode::or(vec![FilterNode::eq("created", new_year)]));

        let resolved = QueryResolver::default().resolve(&collection).unwrap();
        assert_eq!(
            resolved.to_filter(Some("user")).unwrap(),
            "(&(&(objectCategory=person)(objectClass=user))(sAMAccountName=foo)(|(whenCreated=20160101000000.0-0500)))"
        );
    }

    #[test]
    fn test_resolves_multiple_aliases() {
        let collection = collection()
            .with(FilterNode::eq("name", "foo"))
            .with(FilterNode::eq("user.firstName", "bar"))
            .with(FilterNode::eq("ou.description", "foobar"));

        let resolved = QueryResolver::default().resolve(&collection).unwrap();
        let user = "(&(&(objectCategory=person)(objectClass=user))(cn=foo)(givenName=bar))";
        let ou = "(&(objectClass=organizationalUnit)(ou=foo)(description=foobar))";
        assert_eq!(resolved.to_filter(Some("user")).unwrap(), user);
        assert_eq!(resolved.to_filter(Some("OU")).unwrap(), ou);
        assert_eq!(resolved.to_filter(None).unwrap(), format!("(|{user}{ou})"));

        let err = resolved.to_filter(Some("group")).unwrap_err();
        assert_eq!(err.error_code(), "RESOLUTION_FAILED");
    }

    #[test]
    fn test_single_alias_is_not_wrapped() {
        let mut collection = OperatorCollection::new();
        collection.add_schema(ou_schema()).unwrap();
        collection.add(FilterNode::starts_with("name", "Acc"));

        let resolved = QueryResolver::default().resolve(&collection).unwrap();
        assert_eq!(
            resolved.to_filter(None).unwrap(),
            "(&(objectClass=organizationalUnit)(ou=Acc*))"
        );
    }

    #[test]
    fn test_multiple_wire_names_expand_to_or() {
        let mut collection = OperatorCollection::new();
        collection.add_schema(user_schema()).unwrap();
        collection.add(FilterNode::eq("emailAddress", "a@b.c"));

        let resolved = QueryResolver::default().resolve(&collection).unwrap();
        assert_eq!(
            resolved.to_filter(None).unwrap(),
            "(&(&(objectCategory=person)(objectClass=user))(|(mail=a@b.c)(proxyAddresses=a@b.c)))"
        );
    }

    #[test]
    fn test_presence_is_renamed_without_conversion() {
        let mut collection = OperatorCollection::new();
        collection.add_schema(user_schema()).unwrap();
        collection.add(FilterNode::negate(FilterNode::present("created")));

        let resolved = QueryResolver::default().resolve(&collection).unwrap();
        assert_eq!(
            resolved.to_filter(None).unwrap(),
            "(&(&(objectCategory=person)(objectClass=user))(!(whenCreated=*)))"
        );
    }

    #[test]
    fn test_aliased_unknown_attribute_passes_through() {
        let collection = collection().with(FilterNode::eq("ou.street", "Main"));

        let resolved = QueryResolver::default().resolve(&collection).unwrap();
        assert_eq!(
            resolved.to_filter(Some("ou")).unwrap(),
            "(&(objectClass=organizationalUnit)(street=Main))"
        );
        assert_eq!(
            resolved.to_filter(Some("user")).unwrap(),
            "(&(&(objectCategory=person)(objectClass=user)))"
        );
    }

    #[test]
    fn test_resolution_errors() {
        let resolver = QueryResolver::default();

        let unknown_alias = collection().with(FilterNode::eq("group.name", "foo"));
        let err = resolver.resolve(&unknown_alias).unwrap_err();
        assert!(matches!(err, DirectoryError::Resolution { .. }));

        let unknown_attribute = collection()
            .with(FilterNode::or(vec![FilterNode::eq("shoeSize", "9")]));
        let err = resolver.resolve(&unknown_attribute).unwrap_err();
        assert!(err.to_string().contains("shoeSize"));

        let empty = OperatorCollection::new().with(FilterNode::eq("name", "foo"));
        assert!(resolver.resolve(&empty).is_err());
    }

    #[test]
    fn test_duplicate_alias_is_rejected() {
        let mut collection = collection();
        assert!(collection.add_schema(user_schema()).is_err());
        assert!(collection.add_alias("u.x", user_schema()).is_err());
        collection.add_alias("person", user_schema()).unwrap();
        assert_eq!(collection.aliases().count(), 3);
    }
}
