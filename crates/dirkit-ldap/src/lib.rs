//! # dirkit LDAP
//!
//! LDAP and Active Directory backend for dirkit.
//!
//! This crate connects dirkit's schema-driven queries and writes to a real
//! directory server through `ldap3`, and ships the default Active Directory
//! schemas.
//!
//! ## Features
//!
//! - Simple bind over LDAP, LDAPS or STARTTLS
//! - Search with size limits and request controls
//! - Entry creation
//! - Default `user`, `group` and `ou` schemas with `groupType` and
//!   `userAccountControl` flags
//!
//! ## Example
//!
//! ```ignore
//! use dirkit::prelude::*;
//! use dirkit_ldap::{ad_registry, LdapConfig, LdapConnection, AD_CONTEXT};
//!
//! let config = LdapConfig::from_domain("example.com", "cn=svc,dc=example,dc=com", "secret");
//! let connection = LdapConnection::connect(config)?;
//!
//! let registry = ad_registry()?;
//! let mut collection = OperatorCollection::new();
//! collection.add_schema(registry.get(AD_CONTEXT, "group")?)?;
//! collection.add(FilterNode::eq("scopeUniversal", true));
//!
//! let filter = QueryResolver::default().resolve(&collection)?.to_filter(Some("group"))?;
//! let records = connection.search(&QueryOperation::new(filter))?;
//! ```

pub mod ad;
pub mod config;
pub mod connection;

pub use ad::{
    ad_group_schema, ad_ou_schema, ad_registry, ad_user_schema, group_type,
    group_type_options, user_account_control, user_account_control_options, AD_CONTEXT,
};
pub use config::{domain_to_base_dn, LdapConfig};
pub use connection::{entry_to_record, LdapConnection};
