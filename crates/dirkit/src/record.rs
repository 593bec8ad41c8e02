//! Attribute values and directory records
//!
//! Records are the unit handed back by the connection collaborator and the
//! unit acted on by converters on the read path and by the result sorter.

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

use crate::convert::time::format_generalized_time;

/// A value for an attribute, which may be single or multi-valued.
///
/// Raw records coming from the directory only carry `String` and `Array`
/// values; converters produce the richer variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    /// No value (null).
    Null,
    /// A single boolean value.
    Boolean(bool),
    /// A single integer value.
    Integer(i64),
    /// A point in time, kept with the offset it was read or supplied with.
    DateTime(DateTime<FixedOffset>),
    /// A single string value.
    String(String),
    /// Multiple values.
    Array(Vec<AttributeValue>),
}

impl AttributeValue {
    /// Check if this is a null value.
    pub fn is_null(&self) -> bool {
        matches!(self, AttributeValue::Null)
    }

    /// Get as a string if this is a single string value.
    pub fn as_string(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get as strings (works for both single and multi-valued).
    pub fn as_strings(&self) -> Vec<&str> {
        match self {
            AttributeValue::String(s) => vec![s.as_str()],
            AttributeValue::Array(arr) => arr.iter().filter_map(|v| v.as_string()).collect(),
            _ => vec![],
        }
    }

    /// Get as an integer if this is an integer value.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            AttributeValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Get as a boolean if this is a boolean value.
    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            AttributeValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as a date/time if this is a date/time value.
    pub fn as_datetime(&self) -> Option<&DateTime<FixedOffset>> {
        match self {
            AttributeValue::DateTime(dt) => Some(dt),
            _ => None,
        }
    }

    /// The first scalar value: the value itself, or the first element of an array.
    pub fn first(&self) -> Option<&AttributeValue> {
        match self {
            AttributeValue::Null => None,
            AttributeValue::Array(arr) => arr.first().and_then(AttributeValue::first),
            scalar => Some(scalar),
        }
    }

    /// Render the value the way the directory stores it, one string per value.
    pub fn wire_values(&self) -> Vec<String> {
        match self {
            AttributeValue::Null => vec![],
            AttributeValue::Boolean(b) => vec![if *b { "TRUE" } else { "FALSE" }.to_string()],
            AttributeValue::Integer(i) => vec![i.to_string()],
            AttributeValue::DateTime(dt) => vec![format_generalized_time(dt)],
            AttributeValue::String(s) => vec![s.clone()],
            AttributeValue::Array(arr) => arr.iter().flat_map(AttributeValue::wire_values).collect(),
        }
    }

    /// Render a single-valued value as a wire string (empty for null).
    pub fn to_wire_string(&self) -> String {
        self.wire_values().into_iter().next().unwrap_or_default()
    }

    /// Compare two values by the natural order of their underlying type.
    ///
    /// Text compares lexicographically, date/times by instant regardless of
    /// offset, numbers numerically. Multi-valued attributes compare on their
    /// first value; mismatched types fall back to their wire representation.
    pub fn compare(&self, other: &AttributeValue) -> Ordering {
        let (Some(left), Some(right)) = (self.first(), other.first()) else {
            return self.is_empty_value().cmp(&other.is_empty_value());
        };
        match (left, right) {
            (AttributeValue::String(a), AttributeValue::String(b)) => a.cmp(b),
            (AttributeValue::Integer(a), AttributeValue::Integer(b)) => a.cmp(b),
            (AttributeValue::Boolean(a), AttributeValue::Boolean(b)) => a.cmp(b),
            (AttributeValue::DateTime(a), AttributeValue::DateTime(b)) => a.cmp(b),
            (a, b) => a.to_wire_string().cmp(&b.to_wire_string()),
        }
    }

    fn is_empty_value(&self) -> bool {
        self.first().is_none()
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        AttributeValue::String(s)
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        AttributeValue::String(s.to_string())
    }
}

impl From<i64> for AttributeValue {
    fn from(i: i64) -> Self {
        AttributeValue::Integer(i)
    }
}

impl From<i32> for AttributeValue {
    fn from(i: i32) -> Self {
        AttributeValue::Integer(i64::from(i))
    }
}

impl From<bool> for AttributeValue {
    fn from(b: bool) -> Self {
        AttributeValue::Boolean(b)
    }
}

impl From<DateTime<FixedOffset>> for AttributeValue {
    fn from(dt: DateTime<FixedOffset>) -> Self {
        AttributeValue::DateTime(dt)
    }
}

impl From<DateTime<Utc>> for AttributeValue {
    fn from(dt: DateTime<Utc>) -> Self {
        AttributeValue::DateTime(dt.fixed_offset())
    }
}

impl<T: Into<AttributeValue>> From<Vec<T>> for AttributeValue {
    fn from(vec: Vec<T>) -> Self {
        AttributeValue::Array(vec.into_iter().map(Into::into).collect())
    }
}

/// Attribute lookup by name, shared by every record representation the
/// sorter and the read path accept.
///
/// Directory attribute names are case-insensitive, so implementations match
/// names ignoring ASCII case.
pub trait AttributeLookup {
    /// Get the value of an attribute.
    fn attribute(&self, name: &str) -> Option<&AttributeValue>;

    /// The object type label of the record, when known.
    fn object_type(&self) -> Option<&str> {
        None
    }
}

/// An insertion-ordered attribute map with case-insensitive names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeMap {
    entries: Vec<(String, AttributeValue)>,
}

impl AttributeMap {
    /// Create a new empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an attribute value, replacing any value stored under the same
    /// name in a different case.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<AttributeValue>) {
        let name = name.into();
        let value = value.into();
        match self
            .entries
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(&name))
        {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    /// Set an attribute using builder pattern.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.set(name, value);
        self
    }

    /// Get an attribute value.
    pub fn get(&self, name: &str) -> Option<&AttributeValue> {
        self.entries
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
    }

    /// Get a single-valued string attribute.
    pub fn get_string(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|v| v.first()).and_then(|v| v.as_string())
    }

    /// Check if an attribute exists.
    pub fn has(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Remove an attribute.
    pub fn remove(&mut self, name: &str) -> Option<AttributeValue> {
        let index = self
            .entries
            .iter()
            .position(|(existing, _)| existing.eq_ignore_ascii_case(name))?;
        Some(self.entries.remove(index).1)
    }

    /// Get all attribute names, in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    /// Iterate over all attributes, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttributeValue)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Get the number of attributes.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the map is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<AttributeValue>> FromIterator<(K, V)> for AttributeMap {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut map = AttributeMap::new();
        for (name, value) in iter {
            map.set(name, value);
        }
        map
    }
}

impl AttributeLookup for AttributeMap {
    fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.get(name)
    }
}

impl AttributeLookup for HashMap<String, AttributeValue> {
    fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.get(name).or_else(|| {
            self.iter()
                .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
                .map(|(_, value)| value)
        })
    }
}

/// A directory entry: its identity, an optional object type label and its
/// attributes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DirectoryRecord {
    /// Distinguished name, when the record came from (or targets) the directory.
    pub dn: Option<String>,
    /// Object type label (e.g. "user"), set once a record is tied to a schema.
    pub object_type: Option<String>,
    /// The attributes of the entry.
    pub attributes: AttributeMap,
}

impl DirectoryRecord {
    /// Create a new empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the distinguished name.
    pub fn with_dn(mut self, dn: impl Into<String>) -> Self {
        self.dn = Some(dn.into());
        self
    }

    /// Tag the record with an object type.
    pub fn with_object_type(mut self, object_type: impl Into<String>) -> Self {
        self.object_type = Some(object_type.into());
        self
    }

    /// Set an attribute using builder pattern.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.set(name, value);
        self
    }

    /// Set an attribute value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<AttributeValue>) {
        self.attributes.set(name, value);
    }

    /// Get an attribute value.
    pub fn get(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }

    /// Get a single-valued string attribute.
    pub fn get_string(&self, name: &str) -> Option<&str> {
        self.attributes.get_string(name)
    }
}

impl AttributeLookup for DirectoryRecord {
    fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }

    fn object_type(&self) -> Option<&str> {
        self.object_type.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_attribute_map_is_case_insensitive() {
        let mut attrs = AttributeMap::new().with("givenName", "Amy");
        attrs.set("GIVENNAME", "Bob");

        assert_eq!(attrs.len(), 1);
        assert_eq!(attrs.get_string("givenname"), Some("Bob"));
        assert_eq!(attrs.names().collect::<Vec<_>>(), vec!["givenName"]);
    }

    #[test]
    fn test_attribute_map_preserves_insertion_order() {
        let attrs: AttributeMap = vec![
            ("sn", "Feng"),
            ("cn", "Amy Feng"),
            ("mail", "amy@example.com"),
        ]
        .into_iter()
        .collect();

        assert_eq!(attrs.names().collect::<Vec<_>>(), vec!["sn", "cn", "mail"]);
    }

    #[test]
    fn test_remove_attribute() {
        let mut attrs = AttributeMap::new().with("description", "Tech People");
        assert_eq!(
            attrs.remove("DESCRIPTION"),
            Some(AttributeValue::from("Tech People"))
        );
        assert!(attrs.is_empty());
    }

    #[test]
    fn test_wire_values() {
        assert_eq!(AttributeValue::from(true).wire_values(), vec!["TRUE"]);
        assert_eq!(AttributeValue::from(false).to_wire_string(), "FALSE");
        assert_eq!(AttributeValue::from(514i64).to_wire_string(), "514");
        assert_eq!(
            AttributeValue::from(vec!["a", "b"]).wire_values(),
            vec!["a".to_string(), "b".to_string()]
        );
        assert!(AttributeValue::Null.wire_values().is_empty());
    }

    #[test]
    fn test_datetime_compares_by_instant() {
        let new_york = FixedOffset::west_opt(5 * 3600).unwrap();
        let midnight_new_york = new_york.with_ymd_and_hms(2016, 1, 1, 0, 0, 0).unwrap();
        // 04:00 UTC is an hour before midnight in New York
        let four_utc = Utc.with_ymd_and_hms(2016, 1, 1, 4, 0, 0).unwrap();

        let a = AttributeValue::from(midnight_new_york);
        let b = AttributeValue::from(four_utc);
        assert_eq!(a.compare(&b), Ordering::Greater);
    }

    #[test]
    fn test_compare_multi_valued_uses_first_value() {
        let a = AttributeValue::from(vec!["Accounting", "Zeta"]);
        let b = AttributeValue::from("Finance");
        assert_eq!(a.compare(&b), Ordering::Less);
    }

    #[test]
    fn test_record_lookup() {
        let record = DirectoryRecord::new()
            .with_dn("CN=Developers,OU=Groups,DC=example,DC=com")
            .with_object_type("group")
            .with("groupType", "-2147483646");

        assert_eq!(
            record.attribute("GROUPTYPE").and_then(|v| v.as_string()),
            Some("-2147483646")
        );
        assert_eq!(AttributeLookup::object_type(&record), Some("group"));
    }

    #[test]
    fn test_hash_map_lookup_ignores_case() {
        let mut raw: HashMap<String, AttributeValue> = HashMap::new();
        raw.insert("firstName".to_string(), "Amy".into());

        assert_eq!(raw.attribute("FIRSTNAME"), Some(&AttributeValue::from("Amy")));
        assert_eq!(raw.object_type(), None);
    }
}
