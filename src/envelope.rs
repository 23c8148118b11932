//! Error-detection envelope (§4.4): strips/verifies the inbound
//! sequence-number + checksum trailer, attaches it on the way out, and
//! arbitrates resend requests.

use crate::codec;
use crate::session::Session;

/// Inbound trailer pattern is exactly nine characters: `AY{digit}AZ{4 hex}`.
const TRAILER_LEN: usize = 9;

pub enum Inbound {
    /// The frame carried no usable body; the caller should go back to
    /// reading without invoking a handler.
    NoHandler,
    /// The frame's inner body is ready for the parser.
    Handle { body: String },
}

/// Processes one raw inbound frame (trailer still attached, `\r` already
/// stripped by the line reader). Mutates `session.error_detection` and
/// `session` appropriately; returns `Some(reply)` when the envelope itself
/// produced a response (checksum failure) without reaching the handler.
pub fn accept(session: &mut Session, frame: &str) -> (Inbound, Option<String>) {
    if frame == "97" {
        session.error_detection = true;
        return (
            Inbound::Handle {
                body: frame.to_string(),
            },
            None,
        );
    }

    if frame.len() > 11 && has_trailer_shape(&frame[frame.len() - TRAILER_LEN..]) {
        session.error_detection = true;
        if !codec::verify_checksum(frame.as_bytes()) {
            return (Inbound::NoHandler, Some(emit_plain("96")));
        }
        let body = frame[..frame.len() - TRAILER_LEN].to_string();
        return (Inbound::Handle { body }, None);
    }

    if session.error_detection {
        tracing::warn!("protocol violation: error detection was enabled but frame carries no trailer");
        session.error_detection = false;
    }

    (
        Inbound::Handle {
            body: frame.to_string(),
        },
        None,
    )
}

fn has_trailer_shape(tail: &str) -> bool {
    let bytes = tail.as_bytes();
    bytes.len() == TRAILER_LEN
        && bytes[0] == b'A'
        && bytes[1] == b'Y'
        && bytes[3] == b'A'
        && bytes[4] == b'Z'
        && bytes[2].is_ascii_digit()
        && bytes[5..9].iter().all(|b| b.is_ascii_hexdigit())
}

fn sequence_digit(frame: &str) -> Option<char> {
    if frame.len() < TRAILER_LEN {
        return None;
    }
    let tail = &frame[frame.len() - TRAILER_LEN..];
    if has_trailer_shape(tail) {
        tail.as_bytes().get(2).map(|&b| b as char)
    } else {
        None
    }
}

fn emit_plain(body: &str) -> String {
    format!("{}\r", body)
}

/// Terminates `body` with `\r`, appending the error-detection trailer when
/// enabled, and records the emitted frame as `last_response`.
pub fn emit(session: &mut Session, body: &str, inbound_frame: &str) -> String {
    let out = if session.error_detection {
        let seq = sequence_digit(inbound_frame).unwrap_or('0');
        let prefix = format!("{}AY{}AZ", body, seq);
        let cksum = codec::checksum_hex(prefix.as_bytes());
        format!("{}{}\r", prefix, cksum)
    } else {
        format!("{}\r", body)
    };
    session.last_response = Some(out.clone());
    out
}

/// Resend arbitration for handler "97" (§4.4).
pub fn resend(session: &Session) -> String {
    match &session.last_response {
        None => emit_plain("96"),
        Some(prev) => {
            let body = prev.strip_suffix('\r').unwrap_or(prev);
            match strip_trailer(body) {
                Some(stripped) => format!("{}\r", stripped),
                None => prev.clone(),
            }
        }
    }
}

fn strip_trailer(body: &str) -> Option<&str> {
    if body.len() > TRAILER_LEN && has_trailer_shape(&body[body.len() - TRAILER_LEN..]) {
        Some(&body[..body.len() - TRAILER_LEN])
    } else {
        None
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
    fn checksum_mismatch_yields_96_and_no_handler() {
        let mut s = session();
        let body = "9900 001     0300";
        let prefix = format!("{}AY4AZ", body);
        let good = codec::checksum_hex(prefix.as_bytes());
        let mut tampered = format!("{}{}", prefix, good);
        // Corrupt one hex digit of the checksum itself.
        let last = tampered.len() - 1;
        let bad_char = if tampered.as_bytes()[last] == b'0' { '1' } else { '0' };
        tampered.replace_range(last.., &bad_char.to_string());

        let (inbound, reply) = accept(&mut s, &tampered);
        assert!(matches!(inbound, Inbound::NoHandler));
        assert_eq!(reply, Some("96\r".to_string()));
    }

    #[test]
    fn valid_trailer_strips_to_inner_body() {
        let mut s = session();
        let body = "9900 001     0300";
        let prefix = format!("{}AY4AZ", body);
        let cksum = codec::checksum_hex(prefix.as_bytes());
        let frame = format!("{}{}", prefix, cksum);

        let (inbound, reply) = accept(&mut s, &frame);
        assert!(reply.is_none());
        match inbound {
            Inbound::Handle { body: inner } => assert_eq!(inner, body),
            Inbound::NoHandler => panic!("expected handler body"),
        }
        assert!(s.error_detection);
    }

    #[test]
    fn resend_without_prior_response_is_96() {
        let s = session();
        assert_eq!(resend(&s), "96\r");
    }

    #[test]
    fn resend_is_idempotent_and_strips_trailer() {
        let mut s = session();
        s.error_detection = true;
        let out = emit(&mut s, "9400", "97AY5AZ1234");
        assert!(out.contains("AY5AZ"));
        let first = resend(&s);
        let second = resend(&s);
        assert_eq!(first, second);
        assert!(!first.contains("AY"));
        // last_response unchanged by resend itself.
        assert_eq!(s.last_response.as_deref(), Some(out.as_str()));
    }
}
