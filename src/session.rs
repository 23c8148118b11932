//! Per-connection mutable state (§3, §4.5).
//!
//! Every field that would otherwise live as a module-global is a field on
//! [`Session`] here instead; a `Session` is owned exclusively by the
//! connection task that created it and is never shared across tasks.

use crate::config::{AccountConfig, ServerConfig};
use crate::ils::Ils;
use std::sync::Arc;

/// Negotiated SIP2 protocol version for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolVersion {
    V1,
    V2,
}

impl ProtocolVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProtocolVersion::V1 => "1.00",
            ProtocolVersion::V2 => "2.00",
        }
    }
}

/// Why a connection task ended, used for logging only.
#[derive(Debug, Clone, Copy)]
pub enum DisconnectReason {
    PeerClosed,
    Io,
    IdleTimeout,
    ProtocolViolation,
}

/// The account a terminal authenticated as via Login (§4.6).
#[derive(Debug, Clone)]
pub struct Account {
    pub uid: String,
    pub config: AccountConfig,
}

/// Per-connection session state. Lifetime: one connection (§3).
pub struct Session {
    id: u64,
    pub delimiter: char,
    pub error_detection: bool,
    pub protocol_version: ProtocolVersion,
    pub account: Option<Account>,
    pub last_response: Option<String>,
    /// Set by the connection loop when it wants the next inbound code
    /// pinned to a specific value (§4.5); "97" always bypasses this.
    pub expected_reply: Option<String>,
    pub ils: Arc<dyn Ils>,
    /// Server-wide policy (§6.5): read-only from a session's perspective,
    /// shared across every connection the same listener accepted.
    pub policy: Arc<ServerConfig>,
}

impl Session {
    pub fn new(id: u64, policy: Arc<ServerConfig>, ils: Arc<dyn Ils>) -> Self {
        let delimiter = policy.delimiter;
        Self {
            id,
            delimiter,
            error_detection: false,
            protocol_version: ProtocolVersion::V1,
            account: None,
            last_response: None,
            expected_reply: None,
            ils,
            policy,
        }
    }

    /// §4.5: whether `code` may be dispatched given any pending
    /// expected-reply pairing. "97" (request-ACS-resend) always passes.
    pub fn admits(&self, code: &str) -> bool {
        match &self.expected_reply {
            Some(expected) => code == expected || code == "97",
            None => true,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_logged_in(&self) -> bool {
        self.account.is_some()
    }

    /// §4.3 step 1: the first observed Login code upgrades the session to
    /// 2.00 before schema lookup. Modeled as "still negotiating 1.00" so
    /// the upgrade is idempotent across repeated Login attempts.
    pub fn observe_code_for_version_upgrade(&mut self, code: &str) {
        if self.protocol_version == ProtocolVersion::V1 && code == "93" {
            self.protocol_version = ProtocolVersion::V2;
        }
    }

    pub fn institution(&self) -> Option<&str> {
        self.account.as_ref().map(|a| a.config.institution.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ils::tests::StubIls;

    #[test]
    fn login_upgrades_version_exactly_once() {
        let mut session = Session::new(1, Arc::new(ServerConfig::default()), Arc::new(StubIls::default()));
        assert_eq!(session.protocol_version, ProtocolVersion::V1);
        session.observe_code_for_version_upgrade("93");
        assert_eq!(session.protocol_version, ProtocolVersion::V2);
        // A later SC Status can't downgrade it back.
        session.observe_code_for_version_upgrade("99");
        assert_eq!(session.protocol_version, ProtocolVersion::V2);
    }

    #[test]
    fn non_login_codes_never_upgrade() {
        let mut session = Session::new(1, Arc::new(ServerConfig::default()), Arc::new(StubIls::default()));
        session.observe_code_for_version_upgrade("99");
        assert_eq!(session.protocol_version, ProtocolVersion::V1);
    }
}
