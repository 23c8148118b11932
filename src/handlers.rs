//! One handler per message code (§4.6): each reads `fields`/`fixed`, calls
//! the ILS at most once, and composes a response body. The envelope
//! attaches the trailer; handlers only ever return the bare response
//! string starting with its two-character code.

use crate::codec::{self, add_count, add_field, boolspace, denied, maybe_add, sipbool};
use crate::ils::{Item, Patron, TransactionStatus};
use crate::message::ParsedMessage;
use crate::session::{Account, ProtocolVersion, Session};

/// Routes a parsed message to its handler. The connection loop is
/// responsible for login gating and the expected-reply gate (§4.5); by the
/// time a message reaches here it is always dispatched.
pub async fn dispatch(msg: &ParsedMessage, session: &mut Session) -> String {
    match msg.code.as_str() {
        "23" => handle_patron_status(msg, session).await,
        "11" => handle_checkout(msg, session).await,
        "09" => handle_checkin(msg, session).await,
        "01" => handle_block_patron(msg, session).await,
        "99" => handle_sc_status(msg, session).await,
        "93" => handle_login(msg, session).await,
        "63" => handle_patron_info(msg, session).await,
        "35" => handle_end_patron_session(msg, session).await,
        "37" => handle_fee_paid(msg, session).await,
        "17" => handle_item_information(msg, session).await,
        "19" => handle_item_status_update(msg, session).await,
        "25" => handle_patron_enable(msg, session).await,
        "15" => handle_hold(msg, session).await,
        "29" => handle_renew(msg, session).await,
        "65" => handle_renew_all(msg, session).await,
        other => {
            tracing::warn!(code = other, "no handler registered for dispatched code");
            String::new()
        }
    }
}

fn is_v2(session: &Session) -> bool {
    session.protocol_version == ProtocolVersion::V2
}

/// §4.7: the 14-character patron status string.
fn patron_status_string(patron: &dyn Patron) -> String {
    let mut s = String::with_capacity(14);
    s.push(denied(patron.charge_ok()));
    s.push(denied(patron.renew_ok()));
    s.push(denied(patron.recall_ok()));
    s.push(denied(patron.hold_ok()));
    s.push(boolspace(patron.card_lost()));
    s.push(boolspace(patron.too_many_charged()));
    s.push(boolspace(patron.too_many_overdue()));
    s.push(boolspace(patron.too_many_renewal()));
    s.push(boolspace(patron.too_many_claim_return()));
    s.push(boolspace(patron.too_many_lost()));
    s.push(boolspace(patron.excessive_fines()));
    s.push(boolspace(patron.excessive_fees()));
    s.push(boolspace(patron.recall_overdue()));
    s.push(boolspace(patron.too_many_billed()));
    s
}

fn invalid_patron_status_string() -> String {
    format!("YYYY{}", " ".repeat(10))
}

/// Truncates `line` to `width` characters, unless `width` is 0 (unconstrained).
fn truncate_print_line(line: &str, width: u16) -> String {
    if width == 0 {
        line.to_string()
    } else {
        line.chars().take(width as usize).collect()
    }
}

/// §4.7: the ACS Status response body. `message`, if any, becomes both the
/// AF screen message and the AG print line (the latter truncated to the
/// logged-in account's `print_width`, if one is set).
fn acs_status_body(session: &Session, message: Option<&str>) -> String {
    let d = session.delimiter;
    let ils = &session.ils;
    let mut out = String::new();
    out.push('Y'); // online
    out.push(sipbool(ils.checkin_ok()));
    out.push(sipbool(ils.checkout_ok()));
    out.push(sipbool(session.policy.renewal_policy_ok));
    out.push(sipbool(ils.status_update_ok()));
    out.push(sipbool(ils.offline_ok()));
    out.push_str(&format!("{:03}", session.policy.timeout_secs.min(999)));
    out.push_str(&format!("{:03}", session.policy.retries.min(999)));
    out.push_str(&codec::timestamp_now());
    out.push_str(session.protocol_version.as_str());
    out.push_str(&add_field(d, "AO", ils.institution()));

    if is_v2(session) {
        out.push_str("BX");
        out.push_str(&"Y".repeat(16));
        out.push(d);
    }

    out.push_str(&maybe_add(d, "AF", message));
    let print_width = session.account.as_ref().map(|a| a.config.print_width).unwrap_or(0);
    let ag_value = message.map(|m| truncate_print_line(m, print_width));
    out.push_str(&maybe_add(d, "AG", ag_value.as_deref()));

    out
}

async fn handle_patron_status(msg: &ParsedMessage, session: &mut Session) -> String {
    let d = session.delimiter;
    let lang = msg.fixed_at(0);
    let date = msg.fixed_at(1);
    let patron_id = msg.field("AA").unwrap_or("");
    let patron_pwd = msg.field("AD");
    let institution = msg.field("AO").unwrap_or("");

    let patron = session.ils.find_patron(patron_id).await;
    patron_status_response(&patron, lang, date, patron_id, patron_pwd, institution, d, session)
}

fn patron_status_response(
    patron: &Option<std::sync::Arc<dyn Patron>>,
    lang: &str,
    date: &str,
    patron_id: &str,
    patron_pwd: Option<&str>,
    institution: &str,
    d: char,
    session: &Session,
) -> String {
    let mut out = String::from("24");
    match patron {
        Some(p) => {
            out.push_str(&patron_status_string(p.as_ref()));
            out.push_str(lang);
            out.push_str(date);
            out.push_str(&add_field(d, "AE", p.name()));
            out.push_str(&add_field(d, "AA", p.id()));
            if is_v2(session) {
                out.push_str(&add_field(d, "BL", &sipbool(true).to_string()));
                if let Some(pwd) = patron_pwd {
                    out.push_str(&add_field(d, "CQ", &sipbool(p.check_password(pwd)).to_string()));
                }
                out.push_str(&maybe_add(d, "BH", p.currency()));
                out.push_str(&maybe_add(d, "BV", p.fee_amount()));
            }
            out.push_str(&maybe_add(d, "AF", None));
            out.push_str(&maybe_add(d, "AG", None));
        }
        None => {
            out.push_str(&invalid_patron_status_string());
            out.push_str(lang);
            out.push_str(date);
            out.push_str(&add_field(d, "AE", ""));
            out.push_str(&add_field(d, "AA", patron_id));
            if is_v2(session) {
                out.push_str(&add_field(d, "BL", &sipbool(false).to_string()));
            }
        }
    }
    out.push_str(&add_field(d, "AO", institution));
    out
}

async fn handle_checkout(msg: &ParsedMessage, session: &mut Session) -> String {
    let d = session.delimiter;
    let no_block = msg.fixed_at(1) == "Y";
    let nb_due_date = msg.fixed_at(3);
    let institution = msg.field("AO").unwrap_or("");
    let patron_id = msg.field("AA").unwrap_or("");
    let item_id = msg.field("AB").unwrap_or("");
    let terminal_pwd = msg.field("AC").unwrap_or("");
    let patron_pwd = msg.field("AD");

    let status = if no_block {
        session.ils.checkout_no_block(patron_id, item_id, nb_due_date).await
    } else {
        session
            .ils
            .checkout(patron_id, item_id, terminal_pwd, patron_pwd.unwrap_or(""))
            .await
    };

    let mut out = String::from("12");
    let ts = codec::timestamp_now();
    if status.ok {
        out.push('1');
        out.push(sipbool(status.renew_ok));
        out.push(status.item.as_ref().map(|i| if i.magnetic() { 'Y' } else { 'N' }).unwrap_or('U'));
        out.push(sipbool(status.desensitize));
        out.push_str(&ts);
        out.push_str(&add_field(d, "AO", institution));
        out.push_str(&add_field(d, "AA", patron_id));
        out.push_str(&add_field(d, "AB", item_id));
        out.push_str(&add_field(d, "AJ", status.item.as_ref().map(|i| i.title_id()).unwrap_or("")));
        out.push_str(&add_field(d, "AH", status.item.as_ref().and_then(|i| i.due_date()).unwrap_or("")));

        if is_v2(session) {
            if session.ils.supports("security inhibit") {
                out.push_str(&maybe_add(d, "CI", status.security_inhibit.as_deref()));
            }
            out.push_str(&maybe_add(d, "CK", status.media_type.as_deref()));
            out.push_str(&maybe_add(d, "CH", status.item_properties.as_deref()));
            append_fee_quartet(&mut out, &status, d);
        }
    } else {
        out.push('0');
        out.push('N');
        out.push('U');
        out.push('N');
        out.push_str(&ts);
        out.push_str(&add_field(d, "AO", institution));
        out.push_str(&add_field(d, "AA", patron_id));
        out.push_str(&add_field(d, "AB", item_id));
        out.push_str(&add_field(d, "AJ", status.item.as_ref().map(|i| i.title_id()).unwrap_or("")));
        out.push_str(&add_field(d, "AH", ""));

        if is_v2(session) {
            out.push_str(&add_field(d, "BL", &sipbool(status.patron.is_some()).to_string()));
            if let Some(p) = &status.patron {
                if let Some(pwd) = patron_pwd {
                    out.push_str(&add_field(d, "CQ", &sipbool(p.check_password(pwd)).to_string()));
                }
            }
        }
    }
    out
}

fn append_fee_quartet(out: &mut String, status: &TransactionStatus, d: char) {
    if let Some(amount) = &status.fee_amount {
        let amount_is_nonzero = amount.trim().parse::<f64>().map(|v| v != 0.0).unwrap_or(!amount.trim().is_empty());
        if amount_is_nonzero {
            out.push_str(&add_field(d, "BV", amount));
            out.push_str(&maybe_add(d, "BH", status.currency.as_deref()));
            out.push_str(&maybe_add(d, "BT", status.fee_type.as_deref()));
            out.push_str(&maybe_add(d, "BK", status.transaction_id.as_deref()));
        }
    }
}

async fn handle_checkin(msg: &ParsedMessage, session: &mut Session) -> String {
    let d = session.delimiter;
    let no_block = msg.fixed_at(0) == "Y";
    let return_date = msg.fixed_at(2);
    let institution = msg.field("AO").unwrap_or("");
    let item_id = msg.field("AB").unwrap_or("");
    let terminal_pwd = msg.field("AC").unwrap_or("");

    let status = if no_block {
        session.ils.checkin_no_block(item_id, return_date).await
    } else {
        session.ils.checkin(item_id, terminal_pwd, institution).await
    };

    let mut out = String::from("10");
    out.push(sipbool(status.ok));
    out.push(sipbool(status.resensitize));
    out.push(status.item.as_ref().map(|i| if i.magnetic() { 'Y' } else { 'N' }).unwrap_or('U'));
    out.push_str(status.alert.as_deref().unwrap_or("N"));
    out.push_str(&codec::timestamp_now());
    out.push_str(&add_field(d, "AO", institution));
    out.push_str(&add_field(d, "AB", item_id));
    out.push_str(&add_field(d, "AQ", status.permanent_location.as_deref().unwrap_or("")));
    out.push_str(&maybe_add(d, "AJ", status.item.as_ref().map(|i| i.title_id())));

    if is_v2(session) {
        out.push_str(&maybe_add(d, "CL", status.sort_bin.as_deref()));
        out.push_str(&maybe_add(d, "AA", status.patron.as_ref().map(|p| p.id())));
        out.push_str(&maybe_add(d, "CK", status.media_type.as_deref()));
        out.push_str(&maybe_add(d, "CH", status.item_properties.as_deref()));
    }
    out
}

async fn handle_block_patron(msg: &ParsedMessage, session: &mut Session) -> String {
    let d = session.delimiter;
    let card_retained = msg.fixed_at(0) == "Y";
    let institution = msg.field("AO").unwrap_or("");
    let patron_id = msg.field("AA").unwrap_or("");
    let blocked_msg = msg.field("AL");

    let patron = session.ils.find_patron(patron_id).await;
    if let Some(p) = &patron {
        p.block(card_retained, blocked_msg);
    }
    patron_status_response(&patron, "000", &codec::timestamp_now(), patron_id, None, institution, d, session)
}

async fn handle_sc_status(msg: &ParsedMessage, session: &mut Session) -> String {
    let status_code = msg.fixed_at(0);
    let message = match status_code {
        "1" => {
            tracing::warn!(session = session.id(), "SC reports out of paper");
            Some("SC out of paper")
        }
        "2" => {
            tracing::warn!(session = session.id(), "SC reports shutting down");
            Some("SC shutting down")
        }
        _ => None,
    };

    let sc_version = msg.fixed_at(2);
    if sc_version.trim() == "2.00" {
        session.protocol_version = ProtocolVersion::V2;
    } else if sc_version.trim() == "1.00" {
        session.protocol_version = ProtocolVersion::V1;
    }

    format!("98{}", acs_status_body(session, message))
}

async fn handle_login(msg: &ParsedMessage, session: &mut Session) -> String {
    let uid_algorithm = msg.fixed_at(0);
    let pwd_algorithm = msg.fixed_at(1);
    let uid = msg.field("CN").unwrap_or("");
    let pwd = msg.field("CO").unwrap_or("");

    let plaintext = uid_algorithm == "0" && pwd_algorithm == "0";
    let success = plaintext
        && session
            .policy
            .authenticate(uid, pwd)
            .map(|account| {
                session.account = Some(Account {
                    uid: uid.to_string(),
                    config: account.clone(),
                });
                true
            })
            .unwrap_or(false);

    format!("94{}", if success { '1' } else { '0' })
}

async fn handle_patron_info(msg: &ParsedMessage, session: &mut Session) -> String {
    let d = session.delimiter;
    let lang = msg.fixed_at(0);
    let date = msg.fixed_at(1);
    let summary = msg.fixed_at(2);
    let patron_id = msg.field("AA").unwrap_or("");
    let patron_pwd = msg.field("AD");
    let institution = msg.field("AO").unwrap_or("");

    let patron = session.ils.find_patron(patron_id).await;
    let mut out = String::from("64");

    match &patron {
        None => {
            out.push_str(&invalid_patron_status_string());
            out.push_str(lang);
            out.push_str(date);
            for _ in 0..6 {
                out.push_str(&add_count(0));
            }
            out.push_str(&add_field(d, "AA", patron_id));
            out.push_str(&add_field(d, "AE", ""));
        }
        Some(p) => {
            out.push_str(&patron_status_string(p.as_ref()));
            out.push_str(lang);
            out.push_str(date);

            // Summary position → (count, lines, detail field id), in the
            // fixed order hold/overdue/charged/fine/recall/unavailable.
            let lists: [(&[String], &str); 6] = [
                (p.hold_items(), "AS"),
                (p.overdue_items(), "AT"),
                (p.charged_items(), "AU"),
                (p.fine_items(), "AV"),
                (p.recall_items(), "BU"),
                (p.unavailable_hold_items(), "CD"),
            ];
            for (items, _) in &lists {
                out.push_str(&add_count(items.len()));
            }

            out.push_str(&add_field(d, "AA", p.id()));
            out.push_str(&add_field(d, "AE", p.name()));
            out.push_str(&maybe_add(d, "BD", p.home_address()));
            out.push_str(&maybe_add(d, "BE", p.email_address()));
            out.push_str(&maybe_add(d, "BF", p.home_phone()));

            let summary_bytes = summary.as_bytes();
            for (pos, (items, field_id)) in lists.iter().enumerate() {
                if summary_bytes.get(pos) == Some(&b'Y') {
                    for line in items.iter() {
                        out.push_str(&add_field(d, field_id, line));
                    }
                }
            }

            out.push_str(&add_field(d, "BL", &sipbool(true).to_string()));
            if let Some(pwd) = patron_pwd {
                out.push_str(&add_field(d, "CQ", &sipbool(p.check_password(pwd)).to_string()));
            }
            out.push_str(&maybe_add(d, "PB", p.birth_date()));
            out.push_str(&maybe_add(d, "PC", p.patron_class()));
        }
    }
    out.push_str(&add_field(d, "AO", institution));
    out
}

async fn handle_end_patron_session(msg: &ParsedMessage, session: &mut Session) -> String {
    let d = session.delimiter;
    let institution = msg.field("AO").unwrap_or("");
    let patron_id = msg.field("AA").unwrap_or("");

    let status = session.ils.end_patron_session(patron_id).await;

    let mut out = String::from("36");
    out.push(sipbool(status.ok));
    out.push_str(&codec::timestamp_now());
    out.push_str(&add_field(d, "AO", institution));
    out.push_str(&add_field(d, "AA", patron_id));
    out.push_str(&maybe_add(d, "AF", status.screen_msg.as_deref()));
    out.push_str(&maybe_add(d, "AG", status.print_line.as_deref()));
    out
}

async fn handle_fee_paid(msg: &ParsedMessage, session: &mut Session) -> String {
    let d = session.delimiter;
    let trans_date = msg.fixed_at(0);
    let fee_type = msg.fixed_at(1);
    let pay_type = msg.fixed_at(2);
    let currency = msg.fixed_at(3);
    let institution = msg.field("AO").unwrap_or("");
    let patron_id = msg.field("AA").unwrap_or("");
    let amount = msg.field("BV");

    let status = session
        .ils
        .pay_fee(patron_id, trans_date, fee_type, pay_type, currency, amount)
        .await;

    let mut out = String::from("38");
    out.push(sipbool(status.ok));
    out.push_str(&codec::timestamp_now());
    out.push_str(&add_field(d, "AO", institution));
    out.push_str(&add_field(d, "AA", patron_id));
    out.push_str(&maybe_add(d, "BK", status.transaction_id.as_deref()));
    out.push_str(&maybe_add(d, "AF", status.screen_msg.as_deref()));
    out.push_str(&maybe_add(d, "AG", status.print_line.as_deref()));
    out
}

async fn handle_item_information(msg: &ParsedMessage, session: &mut Session) -> String {
    let d = session.delimiter;
    let item_id = msg.field("AB").unwrap_or("");

    let item = session.ils.find_item(item_id).await;
    let mut out = String::from("18");
    match item {
        Some(item) => {
            out.push_str(item.circulation_status());
            out.push_str(item.security_marker());
            out.push_str(item.fee_type_code());
            out.push_str(&codec::timestamp_now());
            out.push_str(&add_field(d, "AB", item_id));
            out.push_str(&add_field(d, "AJ", item.title_id()));

            if is_v2(session) {
                out.push_str(&maybe_add(d, "CK", item.sip_media_type()));
            }
            out.push_str(&maybe_add(d, "AQ", item.owner()));
            out.push_str(&maybe_add(d, "AP", None));
            out.push_str(&maybe_add(d, "CH", item.sip_item_properties()));
            if item.fee() != 0.0 {
                out.push_str(&add_field(d, "BH", item.currency().unwrap_or("")));
                out.push_str(&add_field(d, "BV", &format!("{:.2}", item.fee())));
            }
            out.push_str(&maybe_add(d, "BG", item.owner()));
            if item.hold_queue() > 0 {
                out.push_str(&add_field(d, "CF", &item.hold_queue().to_string()));
            }
            if let Some(due) = item.due_date() {
                out.push_str(&add_field(d, "AH", due));
            }
            if let Some(recall) = item.recall_date() {
                out.push_str(&add_field(d, "CJ", recall));
            }
            if let Some(pickup) = item.hold_pickup_date() {
                out.push_str(&add_field(d, "CM", pickup));
            }
            out.push_str(&maybe_add(d, "AF", None));
            out.push_str(&maybe_add(d, "AG", None));
        }
        None => {
            out.push_str("010101");
            out.push_str(&codec::timestamp_now());
            out.push_str(&add_field(d, "AB", item_id));
            out.push_str(&add_field(d, "AJ", ""));
        }
    }
    out
}

async fn handle_item_status_update(msg: &ParsedMessage, session: &mut Session) -> String {
    let d = session.delimiter;
    let institution = msg.field("AO").unwrap_or("");
    let item_id = msg.field("AB").unwrap_or("");
    let item_props = msg.field("CH");

    let item = session.ils.find_item(item_id).await;
    let mut out = String::from("20");
    match item {
        Some(item) => {
            let _ = session.ils.check_inst_id(institution, "item status update");
            out.push(sipbool(true));
            out.push_str(&codec::timestamp_now());
            out.push_str(&add_field(d, "AB", item_id));
            out.push_str(&add_field(d, "AJ", item.title_id()));
            out.push_str(&maybe_add(d, "CH", item_props.or(item.sip_item_properties())));
            out.push_str(&maybe_add(d, "AF", None));
            out.push_str(&maybe_add(d, "AG", None));
        }
        None => {
            out.push('0');
            out.push_str(&codec::timestamp_now());
            out.push_str(&add_field(d, "AB", item_id));
        }
    }
    out
}

async fn handle_patron_enable(msg: &ParsedMessage, session: &mut Session) -> String {
    let d = session.delimiter;
    let institution = msg.field("AO").unwrap_or("");
    let patron_id = msg.field("AA").unwrap_or("");
    let patron_pwd = msg.field("AD").unwrap_or("");

    let patron = session.ils.find_patron(patron_id).await;
    let mut out = String::from("26");
    match &patron {
        Some(p) if p.check_password(patron_pwd) => {
            p.enable();
            out.push_str(&patron_status_string(p.as_ref()));
            out.push_str("000");
            out.push_str(&codec::timestamp_now());
            out.push_str(&add_field(d, "AA", p.id()));
            out.push_str(&add_field(d, "AE", p.name()));
            out.push_str(&add_field(d, "CQ", &sipbool(true).to_string()));
            out.push_str(&add_field(d, "BL", &sipbool(true).to_string()));
            out.push_str(&maybe_add(d, "AF", None));
            out.push_str(&maybe_add(d, "AG", None));
        }
        _ => {
            out.push_str(&invalid_patron_status_string());
            out.push_str("000");
            out.push_str(&codec::timestamp_now());
            out.push_str(&add_field(d, "AA", patron_id));
            out.push_str(&add_field(d, "AE", ""));
            out.push_str(&add_field(d, "BL", &sipbool(false).to_string()));
            out.push_str(&add_field(d, "CQ", &sipbool(false).to_string()));
        }
    }
    out.push_str(&add_field(d, "AO", institution));
    out
}

async fn handle_hold(msg: &ParsedMessage, session: &mut Session) -> String {
    let d = session.delimiter;
    let hold_mode = msg.fixed_at(0);
    let institution = msg.field("AO").unwrap_or("");
    let patron_id = msg.field("AA").unwrap_or("");
    let item_id = msg.field("AB");
    let title = msg.field("AJ");
    let pickup_locn = msg.field("BS");

    let status = match hold_mode {
        "+" => session.ils.add_hold(patron_id, item_id, title, pickup_locn).await,
        "-" => session.ils.cancel_hold(patron_id, item_id).await,
        "*" => session.ils.alter_hold(patron_id, item_id, pickup_locn).await,
        _ => {
            tracing::warn!(hold_mode, "unrecognized hold mode");
            TransactionStatus::default()
        }
    };

    let mut out = String::from("16");
    out.push(sipbool(status.ok));
    out.push(sipbool(status.item_available));
    out.push_str(&codec::timestamp_now());
    if status.ok {
        out.push_str(&add_field(d, "AA", patron_id));
        out.push_str(&maybe_add(d, "BW", status.expiration.as_deref()));
        out.push_str(&maybe_add(d, "BR", status.queue_position.as_deref()));
        out.push_str(&maybe_add(d, "BS", status.pickup_location.as_deref()));
        out.push_str(&maybe_add(d, "AB", item_id));
        out.push_str(&maybe_add(d, "AJ", title));
    } else {
        out.push_str(&add_field(d, "AA", patron_id));
    }
    out.push_str(&add_field(d, "AO", institution));
    out.push_str(&maybe_add(d, "AF", status.screen_msg.as_deref()));
    out.push_str(&maybe_add(d, "AG", status.print_line.as_deref()));
    out
}

async fn handle_renew(msg: &ParsedMessage, session: &mut Session) -> String {
    let d = session.delimiter;
    let no_block = msg.fixed_at(1) == "Y";
    let nb_due_date = msg.fixed_at(3);
    let institution = msg.field("AO").unwrap_or("");
    let patron_id = msg.field("AA").unwrap_or("");
    let item_id = msg.field("AB").unwrap_or("");
    let terminal_pwd = msg.field("AC").unwrap_or("");

    let status = session
        .ils
        .renew(patron_id, item_id, terminal_pwd, no_block, nb_due_date)
        .await;

    let mut out = String::from("30");
    let ts = codec::timestamp_now();
    if status.ok {
        out.push('1');
        out.push(sipbool(status.renew_ok));
        out.push(status.item.as_ref().map(|i| if i.magnetic() { 'Y' } else { 'N' }).unwrap_or('U'));
        out.push(sipbool(status.desensitize));
        out.push_str(&ts);
        out.push_str(&add_field(d, "AA", patron_id));
        out.push_str(&add_field(d, "AB", item_id));
        out.push_str(&add_field(d, "AJ", status.item.as_ref().map(|i| i.title_id()).unwrap_or("")));
        out.push_str(&add_field(d, "AH", status.item.as_ref().and_then(|i| i.due_date()).unwrap_or("")));
        if session.ils.supports("security inhibit") {
            out.push_str(&maybe_add(d, "CI", status.security_inhibit.as_deref()));
        }
        out.push_str(&maybe_add(d, "CK", status.media_type.as_deref()));
        out.push_str(&maybe_add(d, "CH", status.item_properties.as_deref()));
        append_fee_quartet(&mut out, &status, d);
    } else {
        out.push('0');
        out.push('N');
        out.push('U');
        out.push_str(&ts);
        out.push_str(&add_field(d, "AA", patron_id));
        out.push_str(&add_field(d, "AB", item_id));
        out.push_str(&add_field(d, "AJ", status.item.as_ref().map(|i| i.title_id()).unwrap_or("")));
        out.push_str(&add_field(d, "AH", status.item.as_ref().and_then(|i| i.due_date()).unwrap_or("")));
        append_fee_quartet(&mut out, &status, d);
    }
    out.push_str(&add_field(d, "AO", institution));
    out.push_str(&maybe_add(d, "AF", status.screen_msg.as_deref()));
    out.push_str(&maybe_add(d, "AG", status.print_line.as_deref()));
    out
}

async fn handle_renew_all(msg: &ParsedMessage, session: &mut Session) -> String {
    let d = session.delimiter;
    let institution = msg.field("AO").unwrap_or("");
    let patron_id = msg.field("AA").unwrap_or("");
    let terminal_pwd = msg.field("AC").unwrap_or("");

    let status = session.ils.renew_all(patron_id, terminal_pwd).await;

    let mut out = String::from("66");
    out.push(sipbool(status.ok));
    out.push_str(&add_count(status.renewed_items.len()));
    out.push_str(&add_count(status.unrenewed_items.len()));
    out.push_str(&codec::timestamp_now());
    out.push_str(&add_field(d, "AO", institution));
    for item in &status.renewed_items {
        out.push_str(&add_field(d, "BM", item));
    }
    for item in &status.unrenewed_items {
        out.push_str(&add_field(d, "BN", item));
    }
    out.push_str(&maybe_add(d, "AF", status.screen_msg.as_deref()));
    out.push_str(&maybe_add(d, "AG", status.print_line.as_deref()));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::ils::tests::StubIls;
    use crate::message::parse;
    use std::sync::Arc;

    fn session() -> Session {
        Session::new(1, Arc::new(ServerConfig::default()), Arc::new(StubIls::default()))
    }

    #[tokio::test]
    async fn unknown_patron_status_has_24_prefix_and_invalid_shape() {
        let mut s = session();
        let frame = "2300120060101    084237AOinst|AAbad_userid|";
        let parsed = parse(frame, &mut s).unwrap();
        let reply = dispatch(&parsed, &mut s).await;
        assert!(reply.starts_with("24"));
        assert!(reply.contains("AAbad_userid|"));
        assert!(reply.contains("AE|"));
    }

    #[tokio::test]
    async fn login_with_unknown_account_fails_but_keeps_connection() {
        let mut s = session();
        let frame = "9300CNnobody|COwhatever|";
        let parsed = parse(frame, &mut s).unwrap();
        let reply = dispatch(&parsed, &mut s).await;
        assert_eq!(reply, "940");
        assert!(s.account.is_none());
    }

    #[tokio::test]
    async fn sc_status_reply_has_98_prefix() {
        let mut s = session();
        let frame = "99 0402.00";
        let parsed = parse(frame, &mut s).unwrap();
        let reply = dispatch(&parsed, &mut s).await;
        assert!(reply.starts_with("98"));
    }
}
