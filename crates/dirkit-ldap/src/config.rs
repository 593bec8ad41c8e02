//! LDAP connection configuration
//!
//! Configuration for reaching an LDAP/Active Directory server. Loadable from
//! JSON with serde; the bind password never appears in `Debug` output.

use std::time::Duration;

use dirkit::error::{DirectoryError, DirectoryResult};
use serde::{Deserialize, Serialize};

const REDACTED: &str = "***REDACTED***";

/// Configuration for an LDAP connection.
#[derive(Clone, Serialize, Deserialize)]
pub struct LdapConfig {
    /// LDAP server hostname or IP address.
    pub host: String,

    /// LDAP server port (389 for LDAP, 636 for LDAPS).
    #[serde(default = "default_ldap_port")]
    pub port: u16,

    /// Use SSL/TLS (LDAPS).
    #[serde(default)]
    pub use_ssl: bool,

    /// Use STARTTLS upgrade on plain LDAP connection.
    #[serde(default)]
    pub use_starttls: bool,

    /// Base DN for searches (e.g., "dc=example,dc=com").
    pub base_dn: String,

    /// Bind DN for authentication (e.g., "cn=admin,dc=example,dc=com").
    pub bind_dn: String,

    /// Bind password.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind_password: Option<String>,

    /// Connection timeout in seconds.
    #[serde(default = "default_connection_timeout_secs")]
    pub connection_timeout_secs: u64,

    /// Entries per page for searches without an explicit size limit;
    /// `0` disables paging.
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl std::fmt::Debug for LdapConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LdapConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("use_ssl", &self.use_ssl)
            .field("use_starttls", &self.use_starttls)
            .field("base_dn", &self.base_dn)
            .field("bind_dn", &self.bind_dn)
            .field("bind_password", &self.bind_password.as_ref().map(|_| REDACTED))
            .field("connection_timeout_secs", &self.connection_timeout_secs)
            .field("page_size", &self.page_size)
            .finish()
    }
}

fn default_ldap_port() -> u16 {
    389
}

fn default_connection_timeout_secs() -> u64 {
    30
}

fn default_page_size() -> u32 {
    1000
}

impl LdapConfig {
    /// Create a new LDAP config with required fields.
    pub fn new(
        host: impl Into<String>,
        base_dn: impl Into<String>,
        bind_dn: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port: default_ldap_port(),
            use_ssl: false,
            use_starttls: false,
            base_dn: base_dn.into(),
            bind_dn: bind_dn.into(),
            bind_password: None,
            connection_timeout_secs: default_connection_timeout_secs(),
            page_size: default_page_size(),
        }
    }

    /// Create a config for an Active Directory domain, deriving the base DN
    /// from the domain name and connecting over LDAPS.
    pub fn from_domain(
        domain: &str,
        bind_dn: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self::new(domain, domain_to_base_dn(domain), bind_dn)
            .with_password(password)
            .with_ssl()
    }

    /// Set bind password.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.bind_password = Some(password.into());
        self
    }

    /// Enable SSL (LDAPS).
    #[must_use]
    pub fn with_ssl(mut self) -> Self {
        self.use_ssl = true;
        self.port = 636;
        self
    }

    /// Enable STARTTLS.
    #[must_use]
    pub fn with_starttls(mut self) -> Self {
        self.use_starttls = true;
        self
    }

    /// Set the connection timeout.
    #[must_use]
    pub fn with_connection_timeout(mut self, secs: u64) -> Self {
        self.connection_timeout_secs = secs;
        self
    }

    /// Get the LDAP URL.
    #[must_use]
    pub fn url(&self) -> String {
        let scheme = if self.use_ssl { "ldaps" } else { "ldap" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }

    /// The connection timeout as a duration.
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> DirectoryResult<()> {
        if self.host.is_empty() {
            return Err(DirectoryError::configuration("host is required"));
        }

        if self.base_dn.is_empty() {
            return Err(DirectoryError::configuration("base_dn is required"));
        }

        if self.bind_dn.is_empty() {
            return Err(DirectoryError::configuration("bind_dn is required"));
        }

        if self.use_ssl && self.use_starttls {
            return Err(DirectoryError::configuration(
                "cannot use both SSL and STARTTLS",
            ));
        }

        if self.connection_timeout_secs == 0 {
            return Err(DirectoryError::configuration(
                "connection_timeout_secs must be greater than zero",
            ));
        }

        if i32::try_from(self.page_size).is_err() {
            return Err(DirectoryError::configuration(format!(
                "page_size must not exceed {}",
                i32::MAX
            )));
        }

        Ok(())
    }

    /// A copy safe to serialize into logs or API responses.
    #[must_use]
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        if config.bind_password.is_some() {
            config.bind_password = Some(REDACTED.to_string());
        }
        config
    }

    /// Parse a config from JSON and validate it.
    pub fn from_json(json: &str) -> DirectoryResult<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| {
            DirectoryError::configuration(format!("invalid LDAP configuration: {e}"))
        })?;
        config.validate()?;
        Ok(config)
    }
}

/// Convert a DNS domain to its base DN (`example.com` -> `dc=example,dc=com`).
pub fn domain_to_base_dn(domain: &str) -> String {
    domain
        .split('.')
        .filter(|part| !part.is_empty())
        .map(|part| format!("dc={part}"))
        .collect::<Vec<_>>()
        .join(",")
}
