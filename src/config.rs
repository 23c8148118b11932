use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per-account policy, keyed by login UID (SIP2 field `CN`) in
/// [`ServerConfig::accounts`].
///
/// Loading this from disk/env/whatever is out of scope for this crate; an
/// embedder builds this struct however it likes and hands it to
/// [`ServerConfig`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    /// Plaintext login password (SIP2 field `CO`). Only algorithm `0`
    /// (plaintext) is supported by the Login handler.
    pub password: String,
    /// ILS-facing account id, distinct from the login UID.
    pub id: String,
    /// Institution id (SIP2 field `AO`) this account is scoped to.
    pub institution: String,
    /// Max characters of a print line (`AG`) this account's terminal can
    /// display; `0` means unconstrained.
    pub print_width: u16,
}

/// Server-wide policy (§6.5).
///
/// The field delimiter is configured per-server, never per-account, because
/// login happens before an account is selected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Variable-field delimiter. Defaults to `|`.
    pub delimiter: char,
    /// Advertised in ACS Status as informational only; idle-timeout policy
    /// enforcement (§5) is the connection loop's job, not this struct's.
    pub timeout_secs: u32,
    /// Advertised in ACS Status as informational only.
    pub retries: u16,
    /// ACS-side renewal policy advertised in ACS Status.
    pub renewal_policy_ok: bool,
    /// Accounts this server will accept logins from, keyed by login UID.
    pub accounts: HashMap<String, AccountConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            delimiter: '|',
            timeout_secs: 60,
            retries: 3,
            renewal_policy_ok: true,
            accounts: HashMap::new(),
        }
    }
}

impl ServerConfig {
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }

    pub fn authenticate(&self, uid: &str, pwd: &str) -> Option<&AccountConfig> {
        self.accounts
            .get(uid)
            .filter(|account| constant_time_eq(account.password.as_bytes(), pwd.as_bytes()))
    }
}

/// Compares two byte strings in time independent of where they first differ.
/// Still short-circuits on length, since SIP2 passwords aren't length-secret.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[derive(Debug, Default)]
pub struct ServerConfigBuilder {
    delimiter: Option<char>,
    timeout_secs: Option<u32>,
    retries: Option<u16>,
    renewal_policy_ok: Option<bool>,
    accounts: HashMap<String, AccountConfig>,
}

impl ServerConfigBuilder {
    pub fn delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = Some(delimiter);
        self
    }

    pub fn timeout_secs(mut self, timeout_secs: u32) -> Self {
        self.timeout_secs = Some(timeout_secs);
        self
    }

    pub fn retries(mut self, retries: u16) -> Self {
        self.retries = Some(retries);
        self
    }

    pub fn renewal_policy_ok(mut self, ok: bool) -> Self {
        self.renewal_policy_ok = Some(ok);
        self
    }

    pub fn account(mut self, uid: impl Into<String>, account: AccountConfig) -> Self {
        self.accounts.insert(uid.into(), account);
        self
    }

    pub fn build(self) -> ServerConfig {
        let defaults = ServerConfig::default();
        ServerConfig {
            delimiter: self.delimiter.unwrap_or(defaults.delimiter),
            timeout_secs: self.timeout_secs.unwrap_or(defaults.timeout_secs),
            retries: self.retries.unwrap_or(defaults.retries),
            renewal_policy_ok: self.renewal_policy_ok.unwrap_or(defaults.renewal_policy_ok),
            accounts: self.accounts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authenticate_checks_password() {
        let cfg = ServerConfig::builder()
            .account(
                "term1",
                AccountConfig {
                    password: "secret".into(),
                    id: "acct1".into(),
                    institution: "EXAMPLE".into(),
                    print_width: 40,
                },
            )
            .build();

        assert!(cfg.authenticate("term1", "secret").is_some());
        assert!(cfg.authenticate("term1", "wrong").is_none());
        assert!(cfg.authenticate("nobody", "secret").is_none());
    }

    #[test]
    fn round_trips_through_json() {
        let cfg = ServerConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: ServerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.delimiter, cfg.delimiter);
    }
}
