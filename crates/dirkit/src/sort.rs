//! Result sorting
//!
//! Stable, multi-key ordering of query results. Keys may be alias-qualified
//! (`user.firstName`), in which case they only apply to records of the
//! alias's object type, plus untyped records. A record whose value for a key
//! is missing, or to which the key does not apply, sorts after every record
//! that has one, whichever the direction.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{DirectoryError, DirectoryResult};
use crate::filter::split_alias;
use crate::record::{AttributeLookup, AttributeValue};
use crate::schema::{Schema, SchemaRegistry};

/// Sort direction for one key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl FromStr for SortDirection {
    type Err = DirectoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ASC" => Ok(SortDirection::Asc),
            "DESC" => Ok(SortDirection::Desc),
            _ => Err(DirectoryError::configuration(format!(
                "invalid sort direction '{s}', expected ASC or DESC"
            ))),
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortDirection::Asc => write!(f, "ASC"),
            SortDirection::Desc => write!(f, "DESC"),
        }
    }
}

/// One attribute reference to order by.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    pub attribute: String,
    #[serde(default)]
    pub direction: SortDirection,
}

impl SortKey {
    pub fn new(attribute: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            attribute: attribute.into(),
            direction,
        }
    }

    pub fn asc(attribute: impl Into<String>) -> Self {
        Self::new(attribute, SortDirection::Asc)
    }

    pub fn desc(attribute: impl Into<String>) -> Self {
        Self::new(attribute, SortDirection::Desc)
    }
}

/// Orders records by a list of keys.
#[derive(Debug, Clone, Default)]
pub struct ResultSorter {
    keys: Vec<SortKey>,
    aliases: Vec<(String, Arc<Schema>)>,
    registry: Option<SchemaRegistry>,
}

impl ResultSorter {
    /// Create a sorter for the given keys.
    pub fn new(keys: Vec<SortKey>) -> Self {
        Self {
            keys,
            aliases: Vec::new(),
            registry: None,
        }
    }

    /// Create a sorter from `(attribute, "ASC" | "DESC")` pairs.
    pub fn from_pairs<'a, I>(pairs: I) -> DirectoryResult<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let keys = pairs
            .into_iter()
            .map(|(attribute, direction)| Ok(SortKey::new(attribute, direction.parse()?)))
            .collect::<DirectoryResult<Vec<_>>>()?;
        Ok(Self::new(keys))
    }

    /// Resolve an alias prefix to a schema's object type.
    ///
    /// An alias without a schema is taken to be an object type name itself.
    #[must_use]
    pub fn with_alias(mut self, alias: impl Into<String>, schema: Arc<Schema>) -> Self {
        self.aliases.push((alias.into(), schema));
        self
    }

    /// Resolve alias prefixes against the object types of a registry.
    ///
    /// Aliases registered with [`with_alias`](Self::with_alias) take
    /// precedence. Once a registry is set, a key whose alias names neither
    /// applies to no typed record.
    #[must_use]
    pub fn with_registry(mut self, registry: &SchemaRegistry) -> Self {
        self.registry = Some(registry.clone());
        self
    }

    /// The keys, in priority order.
    pub fn keys(&self) -> &[SortKey] {
        &self.keys
    }

    /// Return a sorted copy of `records`; equal records keep their order.
    pub fn sort<R>(&self, records: &[R]) -> Vec<R>
    where
        R: AttributeLookup + Clone,
    {
        let mut sorted = records.to_vec();
        sorted.sort_by(|a, b| self.compare(a, b));
        sorted
    }

    /// Compare two records key by key.
    pub fn compare<A, B>(&self, a: &A, b: &B) -> Ordering
    where
        A: AttributeLookup + ?Sized,
        B: AttributeLookup + ?Sized,
    {
        for key in &self.keys {
            let (alias, attribute) = split_alias(&key.attribute);
            let left = self.value_for(a, alias, attribute);
            let right = self.value_for(b, alias, attribute);

            let ordering = match (left, right) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Greater,
                (Some(_), None) => Ordering::Less,
                (Some(left), Some(right)) => match key.direction {
                    SortDirection::Asc => left.compare(right),
                    SortDirection::Desc => right.compare(left),
                },
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }

    fn value_for<'r, R>(
        &self,
        record: &'r R,
        alias: Option<&str>,
        attribute: &str,
    ) -> Option<&'r AttributeValue>
    where
        R: AttributeLookup + ?Sized,
    {
        if let (Some(alias), Some(object_type)) = (alias, record.object_type()) {
            if !self.alias_matches(alias, object_type) {
                return None;
            }
        }
        record.attribute(attribute).filter(|value| value.first().is_some())
    }

    fn alias_matches(&self, alias: &str, object_type: &str) -> bool {
        if let Some((_, schema)) = self
            .aliases
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(alias))
        {
            return schema.object_type().eq_ignore_ascii_case(object_type);
        }
        match &self.registry {
            Some(registry) => registry
                .find_by_object_type(alias)
                .is_some_and(|schema| schema.object_type().eq_ignore_ascii_case(object_type)),
            None => alias.eq_ignore_ascii_case(object_type),
        }
    }
}
