//! The message parser (§4.3): turns a raw frame (trailer already stripped
//! by the envelope) into a [`ParsedMessage`] against the schema registry.

use crate::schema::{self, MessageSchema};
use crate::session::{ProtocolVersion, Session};
use std::collections::HashMap;
use tracing::warn;

/// A parsed request or response. Field IDs are kept as plain strings
/// rather than a closed enum: new field IDs show up in the schema table
/// alone, not in a match arm here.
#[derive(Debug, Clone, Default)]
pub struct ParsedMessage {
    pub code: String,
    pub fixed: Vec<String>,
    pub fields: HashMap<String, String>,
}

impl ParsedMessage {
    pub fn field(&self, id: &str) -> Option<&str> {
        self.fields.get(id).map(|s| s.as_str())
    }

    pub fn fixed_at(&self, idx: usize) -> &str {
        self.fixed.get(idx).map(|s| s.as_str()).unwrap_or("")
    }
}

/// Parses `frame` (no trailing `\r`, no error-detection trailer) against
/// `session`'s negotiated protocol version, mutating the session's version
/// on the first observed Login (§4.3 step 1).
///
/// Returns `None` when the code is unknown under the negotiated version;
/// the caller keeps the connection open and drops the frame (§7a).
pub fn parse(frame: &str, session: &mut Session) -> Option<ParsedMessage> {
    if frame.len() < 2 {
        warn!(frame_len = frame.len(), "frame too short to carry a message code");
        return None;
    }
    let code = &frame[0..2];
    session.observe_code_for_version_upgrade(code);

    let schema = match schema::registry().lookup(code, session.protocol_version) {
        Some(s) => s,
        None => {
            warn!(code, version = session.protocol_version.as_str(), "unknown message code, dropping frame");
            return None;
        }
    };

    let body = &frame[2..];
    if body.len() < schema.fixed_len {
        warn!(code, expected = schema.fixed_len, got = body.len(), "frame shorter than fixed template");
        return None;
    }

    let fixed = slice_fixed(body, schema);
    let rest = &body[schema.fixed_len..];
    let fields = tokenize_fields(rest, session.delimiter, schema, code);

    Some(ParsedMessage {
        code: code.to_string(),
        fixed,
        fields,
    })
}

fn slice_fixed(body: &str, schema: &MessageSchema) -> Vec<String> {
    let mut out = Vec::with_capacity(schema.fixed_template.len());
    let mut offset = 0;
    for &width in schema.fixed_template {
        out.push(body[offset..offset + width].to_string());
        offset += width;
    }
    out
}

fn tokenize_fields(
    rest: &str,
    delimiter: char,
    schema: &MessageSchema,
    code: &str,
) -> HashMap<String, String> {
    let mut fields = HashMap::new();
    let bytes = rest.as_bytes();
    let mut pos = 0usize;

    while pos + 2 <= bytes.len() {
        let id = &rest[pos..pos + 2];
        let value_start = pos + 2;
        let value_end = rest[value_start..]
            .find(delimiter)
            .map(|i| value_start + i);

        let (value, next) = match value_end {
            Some(end) => (&rest[value_start..end], end + 1),
            None => {
                warn!(code, id, "unterminated variable field, treating end-of-frame as terminator");
                (&rest[value_start..], bytes.len())
            }
        };

        if !schema.allows(id) {
            warn!(code, id, "field id not recognized for this message/version, skipping");
            pos = next;
            continue;
        }

        if fields.contains_key(id) {
            warn!(code, id, "duplicate field, keeping first occurrence");
            pos = next;
            continue;
        }

        fields.insert(id.to_string(), value.to_string());
        pos = next;
    }

    fields
}

/// Closed enumeration of SIP2 message codes mentioned by name in this
/// crate's handlers (§3). Parsing itself works off the raw two-character
/// string above; this exists for handlers/dispatch to match on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageCode {
    BlockPatron,
    CheckinRequest,
    CheckinResponse,
    CheckoutRequest,
    CheckoutResponse,
    HoldRequest,
    HoldResponse,
    ItemInformationRequest,
    ItemInformationResponse,
    ItemStatusUpdateRequest,
    ItemStatusUpdateResponse,
    PatronStatusRequest,
    PatronStatusResponse,
    PatronEnableRequest,
    PatronEnableResponse,
    RenewRequest,
    RenewResponse,
    EndPatronSession,
    EndSessionResponse,
    FeePaid,
    FeePaidResponse,
    PatronInformation,
    PatronInformationResponse,
    RenewAllRequest,
    RenewAllResponse,
    LoginRequest,
    LoginResponse,
    RequestAcsResend,
    RequestScResend,
    AcsStatus,
    ScStatus,
    Unknown,
}

impl MessageCode {
    pub fn from_code(code: &str) -> Self {
        match code {
            "01" => MessageCode::BlockPatron,
            "09" => MessageCode::CheckinRequest,
            "10" => MessageCode::CheckinResponse,
            "11" => MessageCode::CheckoutRequest,
            "12" => MessageCode::CheckoutResponse,
            "15" => MessageCode::HoldRequest,
            "16" => MessageCode::HoldResponse,
            "17" => MessageCode::ItemInformationRequest,
            "18" => MessageCode::ItemInformationResponse,
            "19" => MessageCode::ItemStatusUpdateRequest,
            "20" => MessageCode::ItemStatusUpdateResponse,
            "23" => MessageCode::PatronStatusRequest,
            "24" => MessageCode::PatronStatusResponse,
            "25" => MessageCode::PatronEnableRequest,
            "26" => MessageCode::PatronEnableResponse,
            "29" => MessageCode::RenewRequest,
            "30" => MessageCode::RenewResponse,
            "35" => MessageCode::EndPatronSession,
            "36" => MessageCode::EndSessionResponse,
            "37" => MessageCode::FeePaid,
            "38" => MessageCode::FeePaidResponse,
            "63" => MessageCode::PatronInformation,
            "64" => MessageCode::PatronInformationResponse,
            "65" => MessageCode::RenewAllRequest,
            "66" => MessageCode::RenewAllResponse,
            "93" => MessageCode::LoginRequest,
            "94" => MessageCode::LoginResponse,
            "96" => MessageCode::RequestScResend,
            "97" => MessageCode::RequestAcsResend,
            "98" => MessageCode::AcsStatus,
            "99" => MessageCode::ScStatus,
            _ => MessageCode::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::ils::tests::StubIls;
    use std::sync::Arc;

    fn session() -> Session {
        Session::new(1, Arc::new(ServerConfig::default()), Arc::new(StubIls::default()))
    }

    #[test]
    fn parses_fixed_and_variable_fields() {
        let mut s = session();
        let frame = "2300120060101    084237AOinst|AAuid|AC|";
        let parsed = parse(frame, &mut s).expect("known code");
        assert_eq!(parsed.code, "23");
        assert_eq!(parsed.fixed[0], "001");
        assert_eq!(parsed.field("AO"), Some("inst"));
        assert_eq!(parsed.field("AA"), Some("uid"));
        assert_eq!(parsed.field("AC"), Some(""));
    }

    #[test]
    fn fields_not_in_schema_are_subset_of_allowed() {
        let mut s = session();
        let frame = "2300120060101    084237AOinst|AAuid|ZZbogus|";
        let parsed = parse(frame, &mut s).expect("known code");
        assert!(!parsed.fields.contains_key("ZZ"));
        let schema = schema::registry()
            .lookup("23", s.protocol_version)
            .unwrap();
        for key in parsed.fields.keys() {
            assert!(schema.allows(key));
        }
    }

    #[test]
    fn duplicate_fields_keep_first_occurrence() {
        let mut s = session();
        let frame = "2300120060101    084237AOfirst|AOsecond|AAuid|";
        let parsed = parse(frame, &mut s).expect("known code");
        assert_eq!(parsed.field("AO"), Some("first"));
    }

    #[test]
    fn unterminated_field_consumes_to_end_of_frame() {
        let mut s = session();
        let frame = "2300120060101    084237AAuid";
        let parsed = parse(frame, &mut s).expect("known code");
        assert_eq!(parsed.field("AA"), Some("uid"));
    }

    #[test]
    fn login_upgrades_session_before_schema_lookup() {
        let mut s = session();
        assert_eq!(s.protocol_version, ProtocolVersion::V1);
        let frame = "9300CNuid|COpwd|";
        let parsed = parse(frame, &mut s);
        assert!(parsed.is_some());
        assert_eq!(s.protocol_version, ProtocolVersion::V2);
    }

    #[test]
    fn unknown_code_returns_none_and_leaves_session_open() {
        let mut s = session();
        assert!(parse("ZZsomegarbage", &mut s).is_none());
    }
}
