//! LDAP connection
//!
//! A blocking [`DirectoryConnection`] over `ldap3`'s synchronous client. The
//! connection is bound once in [`LdapConnection::connect`] and serialized
//! behind a mutex, since every `ldap3` request needs exclusive access.
//!
//! Searches without an explicit size limit are paged with the simple paged
//! results control, so the whole result set is returned. A search the server
//! truncates anyway fails instead of returning a partial set.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

use dirkit::error::{DirectoryError, DirectoryResult};
use dirkit::operation::{AddOperation, LdapControl, QueryOperation, SearchScope};
use dirkit::record::{AttributeValue, DirectoryRecord};
use dirkit::traits::DirectoryConnection;
use ldap3::adapters::{Adapter, EntriesOnly, PagedResults};
use ldap3::controls::RawControl;
use ldap3::{
    LdapConn, LdapConnSettings, LdapError, LdapResult, ResultEntry, Scope,
    SearchEntry, SearchOptions,
};
use tracing::{debug, info, instrument, warn};

use crate::config::LdapConfig;

/// LDAP result code for a search truncated by its size limit.
const RC_SIZE_LIMIT_EXCEEDED: u32 = 4;
/// LDAP result code for invalid credentials.
const RC_INVALID_CREDENTIALS: u32 = 49;
/// LDAP result code for an add targeting an existing entry.
const RC_ALREADY_EXISTS: u32 = 68;

/// A bound connection to an LDAP server.
pub struct LdapConnection {
    config: LdapConfig,
    ldap: Mutex<LdapConn>,
}

impl std::fmt::Debug for LdapConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LdapConnection")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl LdapConnection {
    /// Connect and bind.
    ///
    /// # Errors
    /// Configuration error for an invalid config; connection error when the
    /// server cannot be reached or rejects the bind.
    #[instrument(skip(config), fields(url = %config.url()))]
    pub fn connect(config: LdapConfig) -> DirectoryResult<Self> {
        config.validate()?;
        let url = config.url();

        debug!("Connecting to LDAP server");

        let settings = LdapConnSettings::new()
            .set_conn_timeout(config.connection_timeout())
            .set_starttls(config.use_starttls);

        let mut ldap = LdapConn::with_settings(settings, &url).map_err(|e| {
            DirectoryError::connection_with_source(
                format!("Failed to connect to LDAP server at {url}"),
                e,
            )
        })?;

        let bind_dn = &config.bind_dn;
        let bind_password = config.bind_password.as_deref().unwrap_or("");

        debug!(bind_dn = %bind_dn, "Performing LDAP bind");

        let result = ldap.simple_bind(bind_dn, bind_password).map_err(|e| {
            DirectoryError::connection_with_source(format!("LDAP bind failed for {bind_dn}"), e)
        })?;

        if result.rc == RC_INVALID_CREDENTIALS {
            return Err(DirectoryError::connection(format!(
                "invalid credentials for {bind_dn}"
            )));
        }
        if result.rc != 0 {
            return Err(DirectoryError::connection(format!(
                "LDAP bind failed with code {}: {}",
                result.rc, result.text
            )));
        }

        info!(host = %config.host, "LDAP connection established successfully");

        Ok(Self {
            config,
            ldap: Mutex::new(ldap),
        })
    }

    /// The configuration this connection was made with.
    pub fn config(&self) -> &LdapConfig {
        &self.config
    }

    /// Unbind and drop the connection.
    pub fn close(self) -> DirectoryResult<()> {
        let mut ldap = self
            .ldap
            .into_inner()
            .map_err(|_| DirectoryError::connection("LDAP connection lock poisoned"))?;
        if let Err(e) = ldap.unbind() {
            warn!(error = %e, "Error during LDAP unbind");
        }
        info!(host = %self.config.host, "LDAP connection closed");
        Ok(())
    }

    fn lock(&self) -> DirectoryResult<MutexGuard<'_, LdapConn>> {
        self.ldap
            .lock()
            .map_err(|_| DirectoryError::connection("LDAP connection lock poisoned"))
    }

    fn page_size(&self) -> Option<i32> {
        match self.config.page_size {
            0 => None,
            size => Some(i32::try_from(size).unwrap_or(i32::MAX)),
        }
    }
}

impl DirectoryConnection for LdapConnection {
    #[instrument(skip(self, query), fields(filter = %query.filter))]
    fn search(&self, query: &QueryOperation) -> DirectoryResult<Vec<DirectoryRecord>> {
        let base = query.base_dn.as_deref().unwrap_or(&self.config.base_dn);
        let attributes: Vec<&str> = query.attributes.iter().map(String::as_str).collect();

        debug!(base = %base, scope = ?query.scope, attributes = ?attributes, "Searching LDAP");

        let scope = to_scope(query.scope);
        let size_limit = query
            .size_limit
            .map(|limit| i32::try_from(limit).unwrap_or(i32::MAX));

        let mut ldap = self.lock()?;
        if !query.controls.is_empty() {
            ldap.with_controls(to_raw_controls(&query.controls));
        }

        let (entries, status) = match (size_limit, self.page_size()) {
            (None, Some(page_size)) => {
                paged_search(&mut ldap, base, scope, &query.filter, attributes, page_size)?
            }
            _ => {
                if let Some(limit) = size_limit {
                    ldap.with_search_options(SearchOptions::new().sizelimit(limit));
                }
                let ldap3::SearchResult(entries, status) = ldap
                    .search(base, scope, &query.filter, attributes)
                    .map_err(|e| search_error(base, e))?;
                (entries, status)
            }
        };

        check_search_status(status.rc, &status.text, size_limit.is_some())?;
        if status.rc == RC_SIZE_LIMIT_EXCEEDED {
            debug!(returned = entries.len(), "LDAP search stopped at the requested size limit");
        }

        let records: Vec<DirectoryRecord> = entries
            .into_iter()
            .map(|entry| entry_to_record(SearchEntry::construct(entry)))
            .collect();

        debug!(count = records.len(), "LDAP search completed");
        Ok(records)
    }

    #[instrument(skip(self, operation), fields(dn = ?operation.dn))]
    fn add(&self, operation: &AddOperation) -> DirectoryResult<()> {
        let (dn, attributes) = operation.arguments()?;

        debug!(attributes = ?operation.log_attributes(), "Creating LDAP entry");

        let ldap_attrs: Vec<(&str, HashSet<&str>)> = attributes
            .iter()
            .filter(|(_, values)| !values.is_empty())
            .map(|(name, values)| (name.as_str(), values.iter().map(String::as_str).collect()))
            .collect();

        let mut ldap = self.lock()?;
        if !operation.controls.is_empty() {
            ldap.with_controls(to_raw_controls(&operation.controls));
        }

        let result = ldap.add(dn, ldap_attrs).map_err(|e| {
            DirectoryError::connection_with_source(format!("Failed to create entry: {dn}"), e)
        })?;

        if result.rc == RC_ALREADY_EXISTS {
            return Err(DirectoryError::configuration(format!(
                "entry already exists: {dn}"
            )));
        }
        if result.rc != 0 {
            return Err(DirectoryError::connection(format!(
                "LDAP add failed with code {}: {}",
                result.rc, result.text
            )));
        }

        info!(dn = %dn, "LDAP entry created successfully");
        Ok(())
    }
}

fn search_error(base: &str, e: LdapError) -> DirectoryError {
    DirectoryError::connection_with_source(format!("LDAP search failed in {base}"), e)
}

/// Run a search with the simple paged results control, collecting every page.
fn paged_search(
    ldap: &mut LdapConn,
    base: &str,
    scope: Scope,
    filter: &str,
    attributes: Vec<&str>,
    page_size: i32,
) -> DirectoryResult<(Vec<ResultEntry>, LdapResult)> {
    let adapters: Vec<Box<dyn Adapter<'_, &str, Vec<&str>> + '_>> = vec![
        Box::new(EntriesOnly::new()),
        Box::new(PagedResults::new(page_size)),
    ];
    let mut stream = ldap
        .streaming_search_with(adapters, base, scope, filter, attributes)
        .map_err(|e| search_error(base, e))?;

    let mut entries = Vec::new();
    while let Some(entry) = stream.next().map_err(|e| search_error(base, e))? {
        entries.push(entry);
    }
    let status = stream.result();

    debug!(page_size, returned = entries.len(), "LDAP paged search finished");
    Ok((entries, status))
}

/// Map a search result code to an error.
///
/// Hitting the size limit is only acceptable when the caller asked for one;
/// otherwise the server truncated the result on its own.
fn check_search_status(rc: u32, text: &str, limited: bool) -> DirectoryResult<()> {
    match rc {
        0 => Ok(()),
        RC_SIZE_LIMIT_EXCEEDED if limited => Ok(()),
        RC_SIZE_LIMIT_EXCEEDED => Err(DirectoryError::connection(format!(
            "LDAP search result was truncated by the server: {text}"
        ))),
        rc => Err(DirectoryError::connection(format!(
            "LDAP search failed with code {rc}: {text}"
        ))),
    }
}

fn to_scope(scope: SearchScope) -> Scope {
    match scope {
        SearchScope::Base => Scope::Base,
        SearchScope::OneLevel => Scope::OneLevel,
        SearchScope::Subtree => Scope::Subtree,
    }
}

fn to_raw_controls(controls: &[LdapControl]) -> Vec<RawControl> {
    controls
        .iter()
        .map(|control| RawControl {
            ctype: control.oid.clone(),
            crit: control.criticality,
            val: control.value.as_ref().map(|value| value.as_bytes().to_vec()),
        })
        .collect()
}

/// Convert an LDAP search entry to a raw record.
///
/// Single values become strings and multiple values arrays. Binary
/// attributes (such as `objectGUID`) are not carried over.
pub fn entry_to_record(entry: SearchEntry) -> DirectoryRecord {
    let mut record = DirectoryRecord::new().with_dn(entry.dn);

    for (name, mut values) in entry.attrs {
        match values.len() {
            0 => {}
            1 => record.set(name, values.remove(0)),
            _ => record.set(
                name,
                AttributeValue::Array(values.into_iter().map(AttributeValue::String).collect()),
            ),
        }
    }

    if !entry.bin_attrs.is_empty() {
        debug!(
            attributes = ?entry.bin_attrs.keys().collect::<Vec<_>>(),
            "Skipping binary attributes"
        );
    }

    record
}
