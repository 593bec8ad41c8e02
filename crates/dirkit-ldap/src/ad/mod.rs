//! Active Directory specific modules

pub mod schema;

pub use schema::{
    ad_group_schema, ad_ou_schema, ad_registry, ad_user_schema, group_type,
    group_type_options, user_account_control, user_account_control_options, AD_CONTEXT,
};
