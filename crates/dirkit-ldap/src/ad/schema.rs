//! Active Directory default schemas
//!
//! Friendly attribute maps for users, groups and organizational units. The
//! `groupType` and `userAccountControl` attributes are exposed as individual
//! boolean flags aggregated through [`BitmaskConverter`].

use std::sync::Arc;

use dirkit::convert::{
    AttributeConverter, BitmaskConverter, BitmaskOptions, BooleanConverter, FlagGroup,
    GeneralizedTimeConverter, WindowsTimeConverter,
};
use dirkit::error::DirectoryResult;
use dirkit::filter::FilterNode;
use dirkit::schema::{AttributeBinding, Schema, SchemaRegistry};

/// Schema context for Active Directory.
pub const AD_CONTEXT: &str = "ad";

/// `groupType` bits.
pub mod group_type {
    /// Group created by the system.
    pub const BUILTIN_LOCAL: u32 = 0x1;
    /// Global scope.
    pub const GLOBAL: u32 = 0x2;
    /// Domain local scope.
    pub const DOMAIN_LOCAL: u32 = 0x4;
    /// Universal scope.
    pub const UNIVERSAL: u32 = 0x8;
    /// Security group; distribution groups have this bit clear.
    pub const SECURITY_ENABLED: u32 = 0x8000_0000;
    /// A global security group, as stored.
    pub const DEFAULT_VALUE: &str = "-2147483646";
}

/// `userAccountControl` bits.
pub mod user_account_control {
    pub const ACCOUNTDISABLE: u32 = 0x2;
    pub const LOCKOUT: u32 = 0x10;
    pub const PASSWD_NOTREQD: u32 = 0x20;
    pub const ENCRYPTED_TEXT_PWD_ALLOWED: u32 = 0x80;
    pub const NORMAL_ACCOUNT: u32 = 0x200;
    pub const DONT_EXPIRE_PASSWORD: u32 = 0x1_0000;
    pub const SMARTCARD_REQUIRED: u32 = 0x4_0000;
    pub const TRUSTED_FOR_DELEGATION: u32 = 0x8_0000;
    /// An enabled normal account, as stored.
    pub const DEFAULT_VALUE: &str = "512";
}

/// Flag configuration for `groupType`.
///
/// `typeDistribution` shares the security bit and reads true when it is
/// clear. Scope flags are exclusive and a group always keeps one.
pub fn group_type_options() -> BitmaskOptions {
    use group_type::*;

    BitmaskOptions::new([
        ("typeBuiltin", BUILTIN_LOCAL),
        ("typeSecurity", SECURITY_ENABLED),
        ("typeDistribution", SECURITY_ENABLED),
        ("scopeDomainLocal", DOMAIN_LOCAL),
        ("scopeGlobal", GLOBAL),
        ("scopeUniversal", UNIVERSAL),
    ])
    .with_default_value(DEFAULT_VALUE)
    .with_inverted("typeDistribution")
    .with_group(
        FlagGroup::new("scope", ["scopeDomainLocal", "scopeGlobal", "scopeUniversal"]).required(),
    )
    .with_group(FlagGroup::new(
        "type",
        ["typeBuiltin", "typeSecurity", "typeDistribution"],
    ))
}

/// Flag configuration for `userAccountControl`.
pub fn user_account_control_options() -> BitmaskOptions {
    use user_account_control::*;

    BitmaskOptions::new([
        ("disabled", ACCOUNTDISABLE),
        ("enabled", ACCOUNTDISABLE),
        ("locked", LOCKOUT),
        ("passwordIsReversible", ENCRYPTED_TEXT_PWD_ALLOWED),
        ("passwordNotRequired", PASSWD_NOTREQD),
        ("passwordNeverExpires", DONT_EXPIRE_PASSWORD),
        ("smartCardRequired", SMARTCARD_REQUIRED),
        ("trustedForAllDelegation", TRUSTED_FOR_DELEGATION),
    ])
    .with_default_value(DEFAULT_VALUE)
    .with_inverted("enabled")
}

fn map_flags(
    mut schema: Schema,
    wire_name: &str,
    options: &BitmaskOptions,
    converter: &Arc<dyn AttributeConverter>,
) -> Schema {
    for flag in options.flags.keys() {
        schema = schema.with_attribute(
            flag.as_str(),
            AttributeBinding::new(wire_name).with_converter(converter.clone()),
        );
    }
    schema
}

fn with_common_attributes(schema: Schema) -> Schema {
    schema
        .map("dn", "distinguishedName")
        .map("guid", "objectGuid")
        .map("description", "description")
        .map_converted("created", "whenCreated", Arc::new(GeneralizedTimeConverter))
        .map_converted("modified", "whenChanged", Arc::new(GeneralizedTimeConverter))
}

/// The `user` schema.
pub fn ad_user_schema() -> DirectoryResult<Schema> {
    let options = user_account_control_options();
    let converter: Arc<dyn AttributeConverter> = Arc::new(BitmaskConverter::new(options.clone())?);

    let schema = with_common_attributes(
        Schema::new(AD_CONTEXT, "user").with_base_filter(FilterNode::and(vec![
            FilterNode::eq("objectCategory", "person"),
            FilterNode::eq("objectClass", "user"),
        ])),
    )
    .map("name", "cn")
    .map("firstName", "givenName")
    .map("lastName", "sn")
    .map("displayName", "displayName")
    .map("username", "sAMAccountName")
    .map("upn", "userPrincipalName")
    .map("title", "title")
    .map("department", "department")
    .map("phoneNumber", "telephoneNumber")
    .map("manager", "manager")
    .map("groups", "memberOf")
    .with_attribute("emailAddress", AttributeBinding::multi(["mail", "proxyAddresses"]))
    .map_converted(
        "exchangeHideFromGAL",
        "msExchHideFromAddressLists",
        Arc::new(BooleanConverter),
    )
    .map_converted("accountExpirationDate", "accountExpires", Arc::new(WindowsTimeConverter))
    .map_converted("passwordLastSet", "pwdLastSet", Arc::new(WindowsTimeConverter))
    .map_converted("lastLogon", "lastLogonTimestamp", Arc::new(WindowsTimeConverter));

    Ok(map_flags(schema, "userAccountControl", &options, &converter))
}

/// The `group` schema.
pub fn ad_group_schema() -> DirectoryResult<Schema> {
    let options = group_type_options();
    let converter: Arc<dyn AttributeConverter> = Arc::new(BitmaskConverter::new(options.clone())?);

    let schema = with_common_attributes(
        Schema::new(AD_CONTEXT, "group").with_base_filter(FilterNode::eq("objectClass", "group")),
    )
    .map("name", "cn")
    .map("displayName", "displayName")
    .map("username", "sAMAccountName")
    .map("emailAddress", "mail")
    .map("members", "member")
    .map("groups", "memberOf")
    .map("managedBy", "managedBy");

    Ok(map_flags(schema, "groupType", &options, &converter))
}

/// The `ou` schema.
pub fn ad_ou_schema() -> Schema {
    with_common_attributes(
        Schema::new(AD_CONTEXT, "ou")
            .with_base_filter(FilterNode::eq("objectClass", "organizationalUnit")),
    )
    .map("name", "ou")
    .map("street", "street")
    .map("city", "l")
    .map("state", "st")
    .map("postalCode", "postalCode")
    .map("country", "c")
    .map("managedBy", "managedBy")
}

/// A registry holding every Active Directory default schema.
pub fn ad_registry() -> DirectoryResult<SchemaRegistry> {
    Ok(SchemaRegistry::new()
        .with_schema(ad_user_schema()?)
        .with_schema(ad_group_schema()?)
        .with_schema(ad_ou_schema()))
}

#[cfg(test)]
mod tests {
    use chrono::{FixedOffset, TimeZone};
    use dirkit::convert::{ConversionContext, OperationType};
    use dirkit::record::{AttributeMap, AttributeValue, DirectoryRecord};
    use dirkit::resolver::{OperatorCollection, QueryResolver, ValueResolver};

    use super::*;

    fn collection(types: &[&str]) -> OperatorCollection {
        let registry = ad_registry().unwrap();
        let mut collection = OperatorCollection::new();
        for object_type in types {
            collection
                .add_schema(registry.get(AD_CONTEXT, object_type).unwrap())
                .unwrap();
        }
        collection
    }

    #[test]
    fn test_registry_contents() {
        let registry = ad_registry().unwrap();
        assert_eq!(registry.len(), 3);
        assert!(registry.get("AD", "User").is_ok());
        assert!(registry.get("ad", "computer").is_err());
    }

    #[test]
    fn test_user_filter_with_converted_values() {
        let new_year = FixedOffset::west_opt(5 * 3600)
            .unwrap()
            .with_ymd_and_hms(2016, 1, 1, 0, 0, 0)
            .unwrap();
        let collection = collection(&["user"])
            .with(FilterNode::eq("exchangeHideFromGAL", false))
            .with(FilterNode::eq("created", new_year))
            .with(FilterNode::eq("disabled", true));

        let filter = QueryResolver::default()
            .resolve(&collection)
            .unwrap()
            .to_filter(Some("user"))
            .unwrap();
        assert_eq!(
            filter,
            "(&(&(objectCategory=person)(objectClass=user))(msExchHideFromAddressLists=FALSE)(whenCreated=20160101000000.0-0500)(userAccountControl:1.2.840.113556.1.4.803:=2))"
        );
    }

    #[test]
    fn test_user_and_ou_merged_filter() {
        let collection = collection(&["user", "ou"])
            .with(FilterNode::eq("name", "foo"))
            .with(FilterNode::eq("user.firstName", "bar"))
            .with(FilterNode::eq("ou.description", "foobar"));

        let resolved = QueryResolver::default().resolve(&collection).unwrap();
        assert_eq!(
            resolved.to_filter(None).unwrap(),
            "(|(&(&(objectCategory=person)(objectClass=user))(cn=foo)(givenName=bar))(&(objectClass=organizationalUnit)(ou=foo)(description=foobar)))"
        );
    }

    #[test]
    fn test_group_flags_read_back() {
        let schema = ad_group_schema().unwrap();
        let raw = DirectoryRecord::new()
            .with_dn("CN=foo,DC=foo,DC=bar")
            .with("cn", "foo")
            .with("groupType", "-2147483644");
        let mut ctx = ConversionContext::new(OperationType::SearchFrom);

        let group = ValueResolver::new(&schema).from_directory(&raw, &mut ctx).unwrap();
        assert_eq!(group.get("typeSecurity"), Some(&AttributeValue::Boolean(true)));
        assert_eq!(group.get("typeDistribution"), Some(&AttributeValue::Boolean(false)));
        assert_eq!(group.get("scopeDomainLocal"), Some(&AttributeValue::Boolean(true)));
        assert_eq!(group.get("scopeGlobal"), Some(&AttributeValue::Boolean(false)));
        assert_eq!(group.get("typeBuiltin"), Some(&AttributeValue::Boolean(false)));
    }

    #[test]
    fn test_new_user_account_control() {
        let schema = ad_user_schema().unwrap();
        let mut ctx = ConversionContext::new(OperationType::Create);
        let attributes = AttributeMap::new()
            .with("username", "jdoe")
            .with("disabled", true)
            .with("passwordNeverExpires", true);

        let add = ValueResolver::new(&schema)
            .add_operation("cn=John Doe,ou=Users,dc=example,dc=com", &attributes, &mut ctx)
            .unwrap();
        assert_eq!(
            add.attributes,
            vec![
                ("sAMAccountName".to_string(), vec!["jdoe".to_string()]),
                ("userAccountControl".to_string(), vec!["66050".to_string()]),
            ]
        );
    }

    #[test]
    fn test_enabled_reads_inverse_of_disabled() {
        let schema = ad_user_schema().unwrap();
        let raw = DirectoryRecord::new().with("userAccountControl", "514");
        let mut ctx = ConversionContext::new(OperationType::SearchFrom);

        let user = ValueResolver::new(&schema).from_directory(&raw, &mut ctx).unwrap();
        assert_eq!(user.get("disabled"), Some(&AttributeValue::Boolean(true)));
        assert_eq!(user.get("enabled"), Some(&AttributeValue::Boolean(false)));
        assert_eq!(user.get("locked"), Some(&AttributeValue::Boolean(false)));
    }
}
