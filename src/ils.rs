//! The ILS collaborator interface (§6.4) and the opaque Patron/Item/
//! TransactionStatus data it hands back (§3).
//!
//! Everything in this module is a trait: the circulation backend, the
//! patron record, the item record. This crate never implements them for a
//! real ILS; an embedder supplies that, but it does read the documented
//! accessors to compose responses, and it never calls a mutator except the
//! two the handlers are explicitly told to call (`Patron::block`,
//! `Patron::enable`).

use async_trait::async_trait;
use std::sync::Arc;

/// A patron record. Accessors are read-only data; `block`/`enable` are the
/// only mutations a handler performs directly on a `Patron` (Block Patron
/// and Patron Enable, §4.6); everything else goes through [`Ils`].
pub trait Patron: Send + Sync {
    fn id(&self) -> &str;
    fn name(&self) -> &str;

    fn charge_ok(&self) -> bool;
    fn renew_ok(&self) -> bool;
    fn recall_ok(&self) -> bool;
    fn hold_ok(&self) -> bool;

    fn card_lost(&self) -> bool;
    fn too_many_charged(&self) -> bool;
    fn too_many_overdue(&self) -> bool;
    fn too_many_renewal(&self) -> bool;
    fn too_many_claim_return(&self) -> bool;
    fn too_many_lost(&self) -> bool;
    fn excessive_fines(&self) -> bool;
    fn excessive_fees(&self) -> bool;
    fn recall_overdue(&self) -> bool;
    fn too_many_billed(&self) -> bool;

    fn check_password(&self, password: &str) -> bool;

    fn home_address(&self) -> Option<&str> {
        None
    }
    fn email_address(&self) -> Option<&str> {
        None
    }
    fn home_phone(&self) -> Option<&str> {
        None
    }
    fn birth_date(&self) -> Option<&str> {
        None
    }
    fn patron_class(&self) -> Option<&str> {
        None
    }
    fn currency(&self) -> Option<&str> {
        None
    }
    fn fee_amount(&self) -> Option<&str> {
        None
    }

    /// Summary lists selected by Patron Info's `summary` bitmap (§4.6,
    /// §4.9 DESIGN NOTES' `UNIVERSAL::can` replacement): hold (AS),
    /// overdue (AT), charged (AU), fine (AV), recall (BU), unavailable
    /// hold (CD), in that position order.
    fn hold_items(&self) -> &[String] {
        &[]
    }
    fn overdue_items(&self) -> &[String] {
        &[]
    }
    fn charged_items(&self) -> &[String] {
        &[]
    }
    fn fine_items(&self) -> &[String] {
        &[]
    }
    fn recall_items(&self) -> &[String] {
        &[]
    }
    fn unavailable_hold_items(&self) -> &[String] {
        &[]
    }

    /// Block Patron ("01"): mark the card retained and/or set a blocked
    /// message. Takes effect before the caller re-reads this patron's
    /// status fields.
    fn block(&self, card_retained: bool, blocked_card_msg: Option<&str>);

    /// Patron Enable ("25"): clear whatever made this patron disabled.
    fn enable(&self);
}

/// An item record (§3, §4.6 Item Information / Checkout / Checkin).
pub trait Item: Send + Sync {
    fn title_id(&self) -> &str;
    fn magnetic(&self) -> bool;
    fn due_date(&self) -> Option<&str> {
        None
    }
    fn sip_media_type(&self) -> Option<&str> {
        None
    }
    fn sip_item_properties(&self) -> Option<&str> {
        None
    }
    fn fee(&self) -> f64 {
        0.0
    }
    fn currency(&self) -> Option<&str> {
        None
    }
    fn owner(&self) -> Option<&str> {
        None
    }
    fn hold_queue(&self) -> usize {
        0
    }
    fn recall_date(&self) -> Option<&str> {
        None
    }
    fn hold_pickup_date(&self) -> Option<&str> {
        None
    }

    /// Item Information's 2-char circulation status code.
    fn circulation_status(&self) -> &str;
    /// Item Information's 1-char security marker code.
    fn security_marker(&self) -> &str;
    /// Item Information's 1-char fee type code.
    fn fee_type_code(&self) -> &str;
}

/// Outcome of an ILS operation (§3, §4.6). The core only reads these
/// fields; it never constructs meaning beyond what's here.
#[derive(Clone, Default)]
pub struct TransactionStatus {
    pub ok: bool,
    pub renew_ok: bool,
    pub desensitize: bool,
    pub resensitize: bool,
    pub screen_msg: Option<String>,
    pub print_line: Option<String>,

    pub fee_amount: Option<String>,
    pub currency: Option<String>,
    pub fee_type: Option<String>,
    pub transaction_id: Option<String>,

    pub security_inhibit: Option<String>,
    pub media_type: Option<String>,
    pub item_properties: Option<String>,

    pub alert: Option<String>,
    pub sort_bin: Option<String>,
    pub permanent_location: Option<String>,

    pub item_available: bool,
    pub expiration: Option<String>,
    pub queue_position: Option<String>,
    pub pickup_location: Option<String>,

    pub renewed_items: Vec<String>,
    pub unrenewed_items: Vec<String>,

    pub patron: Option<Arc<dyn Patron>>,
    pub item: Option<Arc<dyn Item>>,
}

/// The abstract circulation backend (§6.4). A server wires one
/// implementation of this in behind `Arc<dyn Ils>` and shares it across
/// every connection; implementations must be safe for concurrent use
/// (§5).
#[async_trait]
pub trait Ils: Send + Sync {
    fn institution(&self) -> &str;

    /// Whether `institution` matches this ILS's configured id. `label`
    /// identifies the caller for diagnostics only.
    fn check_inst_id(&self, institution: &str, label: &str) -> bool {
        let _ = label;
        institution == self.institution()
    }

    fn status_update_ok(&self) -> bool {
        false
    }
    fn offline_ok(&self) -> bool {
        false
    }
    fn checkin_ok(&self) -> bool {
        true
    }
    fn checkout_ok(&self) -> bool {
        true
    }

    /// Capability flags such as "magnetic media", "security inhibit"
    /// (§6.4, §9 DESIGN NOTES).
    fn supports(&self, capability: &str) -> bool {
        let _ = capability;
        false
    }

    async fn find_patron(&self, barcode: &str) -> Option<Arc<dyn Patron>>;
    async fn find_item(&self, barcode: &str) -> Option<Arc<dyn Item>>;

    async fn checkout(
        &self,
        patron_id: &str,
        item_id: &str,
        terminal_pwd: &str,
        patron_pwd: &str,
    ) -> TransactionStatus;

    async fn checkout_no_block(
        &self,
        patron_id: &str,
        item_id: &str,
        nb_due_date: &str,
    ) -> TransactionStatus;

    async fn checkin(
        &self,
        item_id: &str,
        terminal_pwd: &str,
        current_location: &str,
    ) -> TransactionStatus;

    async fn checkin_no_block(&self, item_id: &str, return_date: &str) -> TransactionStatus;

    async fn pay_fee(
        &self,
        patron_id: &str,
        trans_date: &str,
        fee_type: &str,
        pay_type: &str,
        currency: &str,
        amount: Option<&str>,
    ) -> TransactionStatus;

    async fn end_patron_session(&self, patron_id: &str) -> TransactionStatus;

    async fn add_hold(
        &self,
        patron_id: &str,
        item_id: Option<&str>,
        title: Option<&str>,
        pickup_locn: Option<&str>,
    ) -> TransactionStatus;

    async fn cancel_hold(&self, patron_id: &str, item_id: Option<&str>) -> TransactionStatus;

    async fn alter_hold(
        &self,
        patron_id: &str,
        item_id: Option<&str>,
        pickup_locn: Option<&str>,
    ) -> TransactionStatus;

    async fn renew(
        &self,
        patron_id: &str,
        item_id: &str,
        terminal_pwd: &str,
        no_block: bool,
        nb_due_date: &str,
    ) -> TransactionStatus;

    async fn renew_all(&self, patron_id: &str, terminal_pwd: &str) -> TransactionStatus;
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Minimal `Ils` that knows nothing and denies everything; enough to
    /// satisfy constructors in tests that don't exercise ILS behavior.
    #[derive(Default)]
    pub(crate) struct StubIls;

    #[async_trait]
    impl Ils for StubIls {
        fn institution(&self) -> &str {
            "STUB"
        }

        async fn find_patron(&self, _barcode: &str) -> Option<Arc<dyn Patron>> {
            None
        }

        async fn find_item(&self, _barcode: &str) -> Option<Arc<dyn Item>> {
            None
        }

        async fn checkout(&self, _: &str, _: &str, _: &str, _: &str) -> TransactionStatus {
            TransactionStatus::default()
        }

        async fn checkout_no_block(&self, _: &str, _: &str, _: &str) -> TransactionStatus {
            TransactionStatus::default()
        }

        async fn checkin(&self, _: &str, _: &str, _: &str) -> TransactionStatus {
            TransactionStatus::default()
        }

        async fn checkin_no_block(&self, _: &str, _: &str) -> TransactionStatus {
            TransactionStatus::default()
        }

        async fn pay_fee(&self, _: &str, _: &str, _: &str, _: &str, _: &str, _: Option<&str>) -> TransactionStatus {
            TransactionStatus::default()
        }

        async fn end_patron_session(&self, _: &str) -> TransactionStatus {
            TransactionStatus::default()
        }

        async fn add_hold(
            &self,
            _: &str,
            _: Option<&str>,
            _: Option<&str>,
            _: Option<&str>,
        ) -> TransactionStatus {
            TransactionStatus::default()
        }

        async fn cancel_hold(&self, _: &str, _: Option<&str>) -> TransactionStatus {
            TransactionStatus::default()
        }

        async fn alter_hold(
            &self,
            _: &str,
            _: Option<&str>,
            _: Option<&str>,
        ) -> TransactionStatus {
            TransactionStatus::default()
        }

        async fn renew(
            &self,
            _: &str,
            _: &str,
            _: &str,
            _: bool,
            _: &str,
        ) -> TransactionStatus {
            TransactionStatus::default()
        }

        async fn renew_all(&self, _: &str, _: &str) -> TransactionStatus {
            TransactionStatus::default()
        }
    }
}
