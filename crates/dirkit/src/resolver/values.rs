//! Attribute value resolution for the write and read paths.
//!
//! Writes turn a friendly attribute set into wire attributes. Flags that
//! share a wire attribute are aggregated in the order given and collapse
//! into a single wire value. Reads turn a raw record into a friendly, typed
//! record tagged with the schema's object type.

use tracing::debug;

use crate::convert::{AttributeConverter, ConversionContext, OperationType};
use crate::error::{DirectoryError, DirectoryResult};
use crate::operation::AddOperation;
use crate::record::{AttributeMap, AttributeValue, DirectoryRecord};
use crate::schema::Schema;

/// Converts attribute values through one schema.
#[derive(Debug, Clone, Copy)]
pub struct ValueResolver<'s> {
    schema: &'s Schema,
}

impl<'s> ValueResolver<'s> {
    /// Create a resolver for `schema`.
    pub fn new(schema: &'s Schema) -> Self {
        Self { schema }
    }

    /// Convert friendly attributes to wire attributes.
    ///
    /// Attributes the schema does not define are written under their own
    /// name. On a create, aggregated attributes start from the converter's
    /// default value rather than reading back an entry that does not exist
    /// yet.
    pub fn to_directory(
        &self,
        attributes: &AttributeMap,
        ctx: &mut ConversionContext<'_>,
    ) -> DirectoryResult<Vec<(String, Vec<String>)>> {
        if ctx.operation().is_search() {
            return Err(DirectoryError::configuration(format!(
                "attribute values cannot be written during a {} operation",
                ctx.operation()
            )));
        }

        let mut wire: Vec<(String, Vec<String>)> = Vec::with_capacity(attributes.len());
        for (name, value) in attributes.iter() {
            let Some((declared, binding)) = self.schema.binding(name) else {
                upsert(&mut wire, name, value.wire_values());
                continue;
            };

            let wire_name = binding.wire_name();
            ctx.set_attribute(declared, wire_name);
            let values = match binding.converter() {
                None => value.wire_values(),
                Some(converter) if converter.aggregates(ctx.operation()) => {
                    if ctx.operation() == OperationType::Create && ctx.pending_value().is_none() {
                        if let Some(default) = converter.default_value() {
                            ctx.seed_value(wire_name, default);
                        }
                    }
                    vec![converter.to_directory(value, ctx)?]
                }
                Some(converter) => write_values(converter, value, ctx)?,
            };
            upsert(&mut wire, wire_name, values);
        }

        debug!(
            object_type = %self.schema.object_type(),
            attributes = wire.len(),
            "Converted attributes for write"
        );
        Ok(wire)
    }

    /// Build an add operation for a new entry.
    pub fn add_operation(
        &self,
        dn: impl Into<String>,
        attributes: &AttributeMap,
        ctx: &mut ConversionContext<'_>,
    ) -> DirectoryResult<AddOperation> {
        ctx.set_operation(OperationType::Create);
        let wire = self.to_directory(attributes, ctx)?;
        Ok(AddOperation::new().with_dn(dn).with_attributes(wire))
    }

    /// Convert a raw record to a friendly one.
    ///
    /// Only attributes the schema defines are kept. A friendly attribute
    /// bound to several wire names reads from the first one present.
    pub fn from_directory(
        &self,
        record: &DirectoryRecord,
        ctx: &mut ConversionContext<'_>,
    ) -> DirectoryResult<DirectoryRecord> {
        let mut friendly = DirectoryRecord::new().with_object_type(self.schema.object_type());
        friendly.dn = record.dn.clone();

        for (declared, binding) in self.schema.attributes() {
            let Some((wire_name, raw)) = binding
                .wire_names()
                .iter()
                .find_map(|wire_name| record.get(wire_name).map(|raw| (wire_name, raw)))
            else {
                continue;
            };

            let value = match binding.converter() {
                None => raw.clone(),
                Some(converter) => {
                    ctx.set_attribute(declared, wire_name.as_str());
                    read_value(converter, raw, ctx)?
                }
            };
            friendly.set(declared, value);
        }

        Ok(friendly)
    }

    /// Convert a batch of raw records.
    pub fn from_directory_all(
        &self,
        records: &[DirectoryRecord],
        ctx: &mut ConversionContext<'_>,
    ) -> DirectoryResult<Vec<DirectoryRecord>> {
        records
            .iter()
            .map(|record| self.from_directory(record, ctx))
            .collect()
    }
}

fn write_values(
    converter: &dyn AttributeConverter,
    value: &AttributeValue,
    ctx: &mut ConversionContext<'_>,
) -> DirectoryResult<Vec<String>> {
    match value {
        AttributeValue::Null => Ok(Vec::new()),
        AttributeValue::Array(items) => items
            .iter()
            .map(|item| converter.to_directory(item, ctx))
            .collect(),
        single => Ok(vec![converter.to_directory(single, ctx)?]),
    }
}

fn read_value(
    converter: &dyn AttributeConverter,
    raw: &AttributeValue,
    ctx: &ConversionContext<'_>,
) -> DirectoryResult<AttributeValue> {
    match raw {
        AttributeValue::String(text) => converter.from_directory(text, ctx),
        AttributeValue::Array(items) => items
            .iter()
            .map(|item| read_value(converter, item, ctx))
            .collect::<DirectoryResult<Vec<_>>>()
            .map(AttributeValue::Array),
        typed => Ok(typed.clone()),
    }
}

fn upsert(wire: &mut Vec<(String, Vec<String>)>, name: &str, values: Vec<String>) {
    match wire
        .iter_mut()
        .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
    {
        Some((_, existing)) => *existing = values,
        None => wire.push((name.to_string(), values)),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::convert::testing::RecordingConnection;
    use crate::convert::{
        BitmaskConverter, BitmaskOptions, BooleanConverter, FlagGroup, GeneralizedTimeConverter,
    };

    fn group_schema() -> Schema {
        let group_type: Arc<dyn AttributeConverter> = Arc::new(
            BitmaskConverter::new(
                BitmaskOptions::new([
                    ("typeBuiltin", 1),
                    ("typeSecurity", 2_147_483_648),
                    ("typeDistribution", 2_147_483_648),
                    ("scopeDomainLocal", 4),
                    ("scopeGlobal", 2),
                    ("scopeUniversal", 8),
                ])
                .with_default_value("-2147483646")
                .with_inverted("typeDistribution")
                .with_group(
                    FlagGroup::new(
                        "scope",
                        ["scopeDomainLocal", "scopeGlobal", "scopeUniversal"],
                    )
                    .required(),
                )
                .with_group(FlagGroup::new(
                    "type",
                    ["typeBuiltin", "typeSecurity", "typeDistribution"],
                )),
            )
            .unwrap(),
        );

        let mut schema = Schema::new("ad", "group")
            .map("name", "cn")
            .map("members", "member")
            .map_converted("created", "whenCreated", Arc::new(GeneralizedTimeConverter))
            .map_converted("mailEnabled", "mailEnabled", Arc::new(BooleanConverter));
        for flag in [
            "typeBuiltin",
            "typeSecurity",
            "typeDistribution",
            "scopeDomainLocal",
            "scopeGlobal",
            "scopeUniversal",
        ] {
            schema = schema.map_converted(flag, "groupType", group_type.clone());
        }
        schema
    }

    #[test]
    fn test_modify_collapses_flags_into_one_wire_value() {
        let schema = group_schema();
        let connection = RecordingConnection::returning(vec![DirectoryRecord::new()
            .with_dn("CN=foo,DC=foo,DC=bar")
            .with("groupType", "-2147483646")]);
        let mut ctx = ConversionContext::new(OperationType::Modify)
            .with_dn("cn=foo,dc=foo,dc=bar")
            .with_connection(&connection);

        let attributes = AttributeMap::new()
            .with("typeDistribution", true)
            .with("name", "foo")
            .with("scopeUniversal", true)
            .with("typeSecurity", true);
        let wire = ValueResolver::new(&schema)
            .to_directory(&attributes, &mut ctx)
            .unwrap();

        assert_eq!(
            wire,
            vec![
                ("groupType".to_string(), vec!["-2147483640".to_string()]),
                ("cn".to_string(), vec!["foo".to_string()]),
            ]
        );
        assert_eq!(connection.queries.borrow().len(), 1);
    }

    #[test]
    fn test_add_operation_starts_from_default() {
        let schema = group_schema();
        let connection = RecordingConnection::default();
        let mut ctx = ConversionContext::new(OperationType::Create)
            .with_dn("cn=Accounting,dc=example,dc=com")
            .with_connection(&connection);

        let attributes = AttributeMap::new()
            .with("name", "Accounting")
            .with("scopeUniversal", true)
            .with("members", vec!["cn=a,dc=example,dc=com", "cn=b,dc=example,dc=com"])
            .with("mailEnabled", false)
            .with("description", "Accounting staff");
        let add = ValueResolver::new(&schema)
            .add_operation("cn=Accounting,dc=example,dc=com", &attributes, &mut ctx)
            .unwrap();

        let (dn, wire) = add.arguments().unwrap();
        assert_eq!(dn, "cn=Accounting,dc=example,dc=com");
        assert_eq!(wire[0], ("cn".to_string(), vec!["Accounting".to_string()]));
        assert_eq!(wire[1], ("groupType".to_string(), vec!["-2147483640".to_string()]));
        assert_eq!(wire[2].1.len(), 2);
        assert_eq!(wire[3], ("mailEnabled".to_string(), vec!["FALSE".to_string()]));
        assert_eq!(wire[4].0, "description");
        assert!(connection.queries.borrow().is_empty());
    }

    #[test]
    fn test_search_operations_cannot_write() {
        let schema = group_schema();
        let mut ctx = ConversionContext::new(OperationType::SearchTo);
        let err = ValueResolver::new(&schema)
            .to_directory(&AttributeMap::new().with("name", "x"), &mut ctx)
            .unwrap_err();
        assert_eq!(err.error_code(), "INVALID_CONFIG");
    }

    #[test]
    fn test_read_path_produces_typed_friendly_record() {
        let schema = group_schema();
        let raw = DirectoryRecord::new()
            .with_dn("CN=foo,DC=foo,DC=bar")
            .with("cn", "foo")
            .with("groupType", "-2147483646")
            .with("whenCreated", "20160101050000.0Z")
            .with("member", vec!["cn=a", "cn=b"])
            .with("objectGUID", "ignored");
        let mut ctx = ConversionContext::new(OperationType::SearchFrom);

        let record = ValueResolver::new(&schema)
            .from_directory(&raw, &mut ctx)
            .unwrap();

        assert_eq!(record.dn.as_deref(), Some("CN=foo,DC=foo,DC=bar"));
        assert_eq!(record.object_type.as_deref(), Some("group"));
        assert_eq!(record.get_string("name"), Some("foo"));
        assert_eq!(record.get("typeSecurity"), Some(&AttributeValue::Boolean(true)));
        assert_eq!(record.get("typeDistribution"), Some(&AttributeValue::Boolean(false)));
        assert_eq!(record.get("scopeGlobal"), Some(&AttributeValue::Boolean(true)));
        assert_eq!(record.get("scopeUniversal"), Some(&AttributeValue::Boolean(false)));
        assert!(record.get("created").unwrap().as_datetime().is_some());
        assert_eq!(record.get("members").unwrap().as_strings(), vec!["cn=a", "cn=b"]);
        assert!(record.get("objectGUID").is_none());
        assert!(record.get("mailEnabled").is_none());
    }

    #[test]
    fn test_read_path_surfaces_conversion_errors() {
        let schema = group_schema();
        let raw = DirectoryRecord::new().with("whenCreated", "last tuesday");
        let mut ctx = ConversionContext::new(OperationType::SearchFrom);

        let err = ValueResolver::new(&schema)
            .from_directory(&raw, &mut ctx)
            .unwrap_err();
        assert!(matches!(err, DirectoryError::Conversion { ref attribute, .. } if attribute == "created"));
    }
}
