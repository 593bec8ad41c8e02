//! Filter expression tree
//!
//! Comparisons and logical combinators that render to the directory's
//! textual filter grammar (RFC 4515). Leaves may reference attributes through
//! an alias prefix (`user.firstName`); rendering for a given alias drops the
//! leaves scoped to other aliases.

use std::fmt;

use crate::error::{DirectoryError, DirectoryResult};
use crate::record::AttributeValue;

/// OID of the bitwise-AND extensible matching rule.
pub const MATCHING_RULE_BIT_AND: &str = "1.2.840.113556.1.4.803";

/// Comparison operator of a filter leaf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operator {
    /// `(attr=value)`
    Equal,
    /// `(attr~=value)`
    ApproxEqual,
    /// `(attr>=value)`
    GreaterOrEqual,
    /// `(attr<=value)`
    LessOrEqual,
    /// `(attr=*)`, the value is ignored.
    Present,
    /// `(attr=*value*)`
    Contains,
    /// `(attr=value*)`
    StartsWith,
    /// `(attr=*value)`
    EndsWith,
    /// Extensible match `(attr:oid:=value)`.
    MatchingRule(String),
}

/// A single attribute comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    /// Attribute reference, optionally alias-qualified (`alias.attribute`).
    pub attribute: String,
    /// The comparison operator.
    pub operator: Operator,
    /// The value compared against; escaped at render time.
    pub value: AttributeValue,
}

impl Comparison {
    /// Create a new comparison.
    pub fn new(
        attribute: impl Into<String>,
        operator: Operator,
        value: impl Into<AttributeValue>,
    ) -> Self {
        Self {
            attribute: attribute.into(),
            operator,
            value: value.into(),
        }
    }

    /// The alias prefix of the attribute reference, if any.
    pub fn alias(&self) -> Option<&str> {
        split_alias(&self.attribute).0
    }

    /// The attribute name without its alias prefix.
    pub fn bare_attribute(&self) -> &str {
        split_alias(&self.attribute).1
    }

    fn render(&self, alias: Option<&str>) -> String {
        if let (Some(own), Some(requested)) = (self.alias(), alias) {
            if !own.eq_ignore_ascii_case(requested) {
                return String::new();
            }
        }

        let attribute = self.bare_attribute();
        let value = escape_filter_value(&self.value.to_wire_string());
        match &self.operator {
            Operator::Equal => format!("({attribute}={value})"),
            Operator::ApproxEqual => format!("({attribute}~={value})"),
            Operator::GreaterOrEqual => format!("({attribute}>={value})"),
            Operator::LessOrEqual => format!("({attribute}<={value})"),
            Operator::Present => format!("({attribute}=*)"),
            Operator::Contains => format!("({attribute}=*{value}*)"),
            Operator::StartsWith => format!("({attribute}={value}*)"),
            Operator::EndsWith => format!("({attribute}=*{value})"),
            Operator::MatchingRule(oid) => format!("({attribute}:{oid}:={value})"),
        }
    }
}

/// Split `alias.attribute` into its optional alias and bare name.
pub fn split_alias(reference: &str) -> (Option<&str>, &str) {
    match reference.split_once('.') {
        Some((alias, name)) if !alias.is_empty() && !name.is_empty() => (Some(alias), name),
        _ => (None, reference),
    }
}

/// A node of a filter expression tree.
///
/// Children keep their insertion order, which only affects rendering order.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterNode {
    /// A leaf comparison.
    Comparison(Comparison),
    /// Logical AND of the children.
    And(Vec<FilterNode>),
    /// Logical OR of the children.
    Or(Vec<FilterNode>),
    /// Logical NOT of exactly one child.
    Not(Box<FilterNode>),
}

impl FilterNode {
    /// Create an equality comparison.
    pub fn eq(attribute: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        FilterNode::Comparison(Comparison::new(attribute, Operator::Equal, value))
    }

    /// Create an approximate-match comparison.
    pub fn approx(attribute: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        FilterNode::Comparison(Comparison::new(attribute, Operator::ApproxEqual, value))
    }

    /// Create a greater-or-equal comparison.
    pub fn gte(attribute: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        FilterNode::Comparison(Comparison::new(attribute, Operator::GreaterOrEqual, value))
    }

    /// Create a less-or-equal comparison.
    pub fn lte(attribute: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        FilterNode::Comparison(Comparison::new(attribute, Operator::LessOrEqual, value))
    }

    /// Create a presence check.
    pub fn present(attribute: impl Into<String>) -> Self {
        FilterNode::Comparison(Comparison::new(
            attribute,
            Operator::Present,
            AttributeValue::Null,
        ))
    }

    /// Create a substring match anywhere in the value.
    pub fn contains(attribute: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        FilterNode::Comparison(Comparison::new(attribute, Operator::Contains, value))
    }

    /// Create a prefix match.
    pub fn starts_with(attribute: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        FilterNode::Comparison(Comparison::new(attribute, Operator::StartsWith, value))
    }

    /// Create a suffix match.
    pub fn ends_with(attribute: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        FilterNode::Comparison(Comparison::new(attribute, Operator::EndsWith, value))
    }

    /// Create an extensible match using the given matching rule OID.
    pub fn matching_rule(
        attribute: impl Into<String>,
        oid: impl Into<String>,
        value: impl Into<AttributeValue>,
    ) -> Self {
        FilterNode::Comparison(Comparison::new(
            attribute,
            Operator::MatchingRule(oid.into()),
            value,
        ))
    }

    /// Create an AND combinator.
    pub fn and(children: Vec<FilterNode>) -> Self {
        FilterNode::And(children)
    }

    /// Create an OR combinator.
    pub fn or(children: Vec<FilterNode>) -> Self {
        FilterNode::Or(children)
    }

    /// Negate a single node.
    pub fn negate(child: FilterNode) -> Self {
        FilterNode::Not(Box::new(child))
    }

    /// Create a NOT combinator from a list of children.
    ///
    /// Fails unless exactly one child is supplied.
    pub fn not(mut children: Vec<FilterNode>) -> DirectoryResult<Self> {
        if children.len() != 1 {
            return Err(DirectoryError::invalid_filter(format!(
                "a NOT combinator takes exactly one child, got {}",
                children.len()
            )));
        }
        Ok(Self::negate(children.remove(0)))
    }

    /// Append children to an AND or OR combinator.
    pub fn add(&mut self, nodes: impl IntoIterator<Item = FilterNode>) -> DirectoryResult<()> {
        match self {
            FilterNode::And(children) | FilterNode::Or(children) => {
                children.extend(nodes);
                Ok(())
            }
            FilterNode::Not(_) => Err(DirectoryError::invalid_filter(
                "a NOT combinator cannot take additional children",
            )),
            FilterNode::Comparison(_) => Err(DirectoryError::invalid_filter(
                "a comparison cannot contain other nodes",
            )),
        }
    }

    /// The children of a combinator (a NOT has one, a comparison none).
    pub fn children(&self) -> &[FilterNode] {
        match self {
            FilterNode::And(children) | FilterNode::Or(children) => children,
            FilterNode::Not(child) => std::slice::from_ref(child.as_ref()),
            FilterNode::Comparison(_) => &[],
        }
    }

    /// Check if this node has any children.
    pub fn has_children(&self) -> bool {
        !self.children().is_empty()
    }

    /// Render the tree, keeping only leaves that are unscoped or scoped to `alias`.
    ///
    /// Combinators whose children all render empty render empty themselves,
    /// so parents omit them instead of emitting `()`.
    pub fn render(&self, alias: Option<&str>) -> String {
        match self {
            FilterNode::Comparison(comparison) => comparison.render(alias),
            FilterNode::And(children) => render_combinator('&', children, alias),
            FilterNode::Or(children) => render_combinator('|', children, alias),
            FilterNode::Not(child) => {
                render_combinator('!', std::slice::from_ref(child.as_ref()), alias)
            }
        }
    }
}

impl fmt::Display for FilterNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(None))
    }
}

fn render_combinator(symbol: char, children: &[FilterNode], alias: Option<&str>) -> String {
    let inner: String = children.iter().map(|child| child.render(alias)).collect();
    if inner.is_empty() {
        return String::new();
    }
    format!("({symbol}{inner})")
}

/// Escape special characters in filter values (RFC 4515).
pub fn escape_filter_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\\' => escaped.push_str("\\5c"),
            '*' => escaped.push_str("\\2a"),
            '(' => escaped.push_str("\\28"),
            ')' => escaped.push_str("\\29"),
            '\0' => escaped.push_str("\\00"),
            _ => escaped.push(ch),
        }
    }
    escaped
}
