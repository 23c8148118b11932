//! Connection loop (§4.6.5, §5): reads frames, routes them through
//! envelope → parser → dispatcher → envelope, writes responses, and
//! enforces login gating.

use crate::config::ServerConfig;
use crate::envelope::{self, Inbound};
use crate::handlers;
use crate::ils::Ils;
use crate::message;
use crate::session::{DisconnectReason, Session};
use bytes::BytesMut;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::{self, Duration, Instant};
use tracing::{info, warn};

fn log_disconnect(conn_id: u64, reason: DisconnectReason) {
    info!(conn_id, ?reason, "connection ending");
}

/// Codes a session may dispatch before `session.account` is set (§4.6
/// Login: "the connection loop refuses to dispatch any non-Login,
/// non-SC-Status handler until `session.account` is set").
fn allowed_before_login(code: &str) -> bool {
    matches!(code, "93" | "99" | "97")
}

/// Drives one accepted connection to completion. Generic over the stream
/// type so tests can drive it over `tokio::io::duplex` instead of a real
/// socket.
pub async fn handle_connection<S>(mut stream: S, conn_id: u64, policy: Arc<ServerConfig>, ils: Arc<dyn Ils>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut session = Session::new(conn_id, policy.clone(), ils);
    let mut read_buf = BytesMut::with_capacity(8 * 1024);
    let idle_timeout = Duration::from_secs(policy.timeout_secs.max(1) as u64);
    let mut last_activity = Instant::now();

    loop {
        let remaining = idle_timeout.saturating_sub(last_activity.elapsed());
        tokio::select! {
            res = stream.read_buf(&mut read_buf) => {
                match res {
                    Ok(0) => {
                        log_disconnect(conn_id, DisconnectReason::PeerClosed);
                        break;
                    }
                    Ok(_) => {
                        last_activity = Instant::now();
                        while let Some(frame) = extract_frame(&mut read_buf) {
                            if let Some(reply) = process_frame(&frame, &mut session).await {
                                if stream.write_all(reply.as_bytes()).await.is_err() {
                                    log_disconnect(conn_id, DisconnectReason::Io);
                                    return;
                                }
                            }
                        }
                    }
                    Err(e) => {
                        warn!(conn_id, error = %e, "read error");
                        log_disconnect(conn_id, DisconnectReason::Io);
                        break;
                    }
                }
            }
            _ = time::sleep(remaining) => {
                log_disconnect(conn_id, DisconnectReason::IdleTimeout);
                break;
            }
        }
    }
}

/// Pulls one `\r`-terminated frame out of the buffer, if a full one is
/// present (§6.1: every frame ends in a single carriage return).
fn extract_frame(buf: &mut BytesMut) -> Option<String> {
    let pos = memchr::memchr(b'\r', &buf[..])?;
    let frame = buf.split_to(pos + 1);
    let text = String::from_utf8_lossy(&frame[..pos]).into_owned();
    Some(text)
}

async fn process_frame(frame: &str, session: &mut Session) -> Option<String> {
    let (inbound, early_reply) = envelope::accept(session, frame);
    if let Some(reply) = early_reply {
        return Some(reply);
    }

    let body = match inbound {
        Inbound::NoHandler => return None,
        Inbound::Handle { body } => body,
    };

    if body == "97" {
        let reply = envelope::resend(session);
        return Some(reply);
    }

    let parsed = message::parse(&body, session)?;

    if !session.is_logged_in() && !allowed_before_login(&parsed.code) {
        warn!(code = %parsed.code, "dropping request before login completes");
        return None;
    }

    if !session.admits(&parsed.code) {
        warn!(code = %parsed.code, expected = ?session.expected_reply, "code does not match pending expected reply, acknowledged but unhandled");
        return None;
    }
    session.expected_reply = None;

    let response_body = handlers::dispatch(&parsed, session).await;
    if response_body.is_empty() {
        return None;
    }
    Some(envelope::emit(session, &response_body, frame))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ils::tests::StubIls;
    use tokio::io::duplex;

    #[tokio::test]
    async fn sc_status_round_trips_over_a_duplex_stream() {
        let (client, server) = duplex(4096);
        let policy = Arc::new(ServerConfig::default());
        let ils: Arc<dyn Ils> = Arc::new(StubIls::default());

        let handle = tokio::spawn(handle_connection(server, 1, policy, ils));

        let mut client = client;
        client.write_all(b"99 0402.00\r").await.unwrap();

        let mut buf = [0u8; 256];
        let n = client.read(&mut buf).await.unwrap();
        let reply = String::from_utf8_lossy(&buf[..n]);
        assert!(reply.starts_with("98"));

        drop(client);
        let _ = handle.await;
    }
}
