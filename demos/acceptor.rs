//! Toy ACS acceptor: an in-memory ILS backing a handful of patrons and
//! items, wired into `sip2acs::handle_connection`. Good enough to poke at
//! with `nc` or a real self-check terminal in a lab, not a real backend.

use async_trait::async_trait;
use sip2acs::{handle_connection, Ils, Item, Patron, ServerConfig, TransactionStatus};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;

struct DemoPatron {
    id: String,
    name: String,
    password: String,
    blocked: AtomicBool,
}

impl Patron for DemoPatron {
    fn id(&self) -> &str {
        &self.id
    }
    fn name(&self) -> &str {
        &self.name
    }
    fn charge_ok(&self) -> bool {
        !self.blocked.load(Ordering::Relaxed)
    }
    fn renew_ok(&self) -> bool {
        !self.blocked.load(Ordering::Relaxed)
    }
    fn recall_ok(&self) -> bool {
        true
    }
    fn hold_ok(&self) -> bool {
        true
    }
    fn card_lost(&self) -> bool {
        false
    }
    fn too_many_charged(&self) -> bool {
        false
    }
    fn too_many_overdue(&self) -> bool {
        false
    }
    fn too_many_renewal(&self) -> bool {
        false
    }
    fn too_many_claim_return(&self) -> bool {
        false
    }
    fn too_many_lost(&self) -> bool {
        false
    }
    fn excessive_fines(&self) -> bool {
        false
    }
    fn excessive_fees(&self) -> bool {
        false
    }
    fn recall_overdue(&self) -> bool {
        false
    }
    fn too_many_billed(&self) -> bool {
        false
    }
    fn check_password(&self, password: &str) -> bool {
        self.password == password
    }
    fn block(&self, _card_retained: bool, _blocked_card_msg: Option<&str>) {
        self.blocked.store(true, Ordering::Relaxed);
    }
    fn enable(&self) {
        self.blocked.store(false, Ordering::Relaxed);
    }
}

struct DemoItem {
    title_id: String,
    magnetic: bool,
    due_date: Option<String>,
}

impl Item for DemoItem {
    fn title_id(&self) -> &str {
        &self.title_id
    }
    fn magnetic(&self) -> bool {
        self.magnetic
    }
    fn due_date(&self) -> Option<&str> {
        self.due_date.as_deref()
    }
    fn circulation_status(&self) -> &str {
        "03"
    }
    fn security_marker(&self) -> &str {
        "02"
    }
    fn fee_type_code(&self) -> &str {
        "01"
    }
}

struct DemoIls {
    institution: String,
    patrons: HashMap<String, Arc<DemoPatron>>,
    items: HashMap<String, Arc<DemoItem>>,
}

#[async_trait]
impl Ils for DemoIls {
    fn institution(&self) -> &str {
        &self.institution
    }

    fn checkin_ok(&self) -> bool {
        true
    }
    fn checkout_ok(&self) -> bool {
        true
    }
    fn status_update_ok(&self) -> bool {
        true
    }
    fn offline_ok(&self) -> bool {
        true
    }

    async fn find_patron(&self, barcode: &str) -> Option<Arc<dyn Patron>> {
        self.patrons.get(barcode).map(|p| p.clone() as Arc<dyn Patron>)
    }

    async fn find_item(&self, barcode: &str) -> Option<Arc<dyn Item>> {
        self.items.get(barcode).map(|i| i.clone() as Arc<dyn Item>)
    }

    async fn checkout(
        &self,
        patron_id: &str,
        item_id: &str,
        _terminal_pwd: &str,
        _patron_pwd: &str,
    ) -> TransactionStatus {
        let patron = self.patrons.get(patron_id).cloned();
        let item = self.items.get(item_id).cloned();
        let ok = patron.is_some() && item.is_some();
        TransactionStatus {
            ok,
            desensitize: ok,
            patron: patron.map(|p| p as Arc<dyn Patron>),
            item: item.map(|i| i as Arc<dyn Item>),
            ..Default::default()
        }
    }

    async fn checkout_no_block(
        &self,
        patron_id: &str,
        item_id: &str,
        _nb_due_date: &str,
    ) -> TransactionStatus {
        self.checkout(patron_id, item_id, "", "").await
    }

    async fn checkin(
        &self,
        item_id: &str,
        _terminal_pwd: &str,
        _current_location: &str,
    ) -> TransactionStatus {
        let item = self.items.get(item_id).cloned();
        TransactionStatus {
            ok: item.is_some(),
            resensitize: item.is_some(),
            permanent_location: Some(self.institution.clone()),
            item: item.map(|i| i as Arc<dyn Item>),
            ..Default::default()
        }
    }

    async fn checkin_no_block(&self, item_id: &str, return_date: &str) -> TransactionStatus {
        self.checkin(item_id, "", return_date).await
    }

    async fn pay_fee(
        &self,
        _patron_id: &str,
        _trans_date: &str,
        _fee_type: &str,
        _pay_type: &str,
        _currency: &str,
        _amount: Option<&str>,
    ) -> TransactionStatus {
        TransactionStatus {
            ok: true,
            ..Default::default()
        }
    }

    async fn end_patron_session(&self, _patron_id: &str) -> TransactionStatus {
        TransactionStatus {
            ok: true,
            ..Default::default()
        }
    }

    async fn add_hold(
        &self,
        patron_id: &str,
        _item_id: Option<&str>,
        _title: Option<&str>,
        _pickup_locn: Option<&str>,
    ) -> TransactionStatus {
        TransactionStatus {
            ok: self.patrons.contains_key(patron_id),
            ..Default::default()
        }
    }

    async fn cancel_hold(&self, patron_id: &str, _item_id: Option<&str>) -> TransactionStatus {
        TransactionStatus {
            ok: self.patrons.contains_key(patron_id),
            ..Default::default()
        }
    }

    async fn alter_hold(
        &self,
        patron_id: &str,
        _item_id: Option<&str>,
        _pickup_locn: Option<&str>,
    ) -> TransactionStatus {
        TransactionStatus {
            ok: self.patrons.contains_key(patron_id),
            ..Default::default()
        }
    }

    async fn renew(
        &self,
        patron_id: &str,
        item_id: &str,
        terminal_pwd: &str,
        _no_block: bool,
        _nb_due_date: &str,
    ) -> TransactionStatus {
        self.checkout(patron_id, item_id, terminal_pwd, "").await
    }

    async fn renew_all(&self, patron_id: &str, _terminal_pwd: &str) -> TransactionStatus {
        TransactionStatus {
            ok: self.patrons.contains_key(patron_id),
            ..Default::default()
        }
    }
}

fn demo_ils() -> DemoIls {
    let mut patrons = HashMap::new();
    patrons.insert(
        "1234".to_string(),
        Arc::new(DemoPatron {
            id: "1234".to_string(),
            name: "David J. Fiander".to_string(),
            password: "6789".to_string(),
            blocked: AtomicBool::new(false),
        }),
    );

    let mut items = HashMap::new();
    items.insert(
        "3010046845387".to_string(),
        Arc::new(DemoItem {
            title_id: "Example Book".to_string(),
            magnetic: false,
            due_date: None,
        }),
    );

    DemoIls {
        institution: "EXAMPLE".to_string(),
        patrons,
        items,
    }
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt::init();

    let listener = TcpListener::bind(("127.0.0.1", 6001)).await?;
    println!("sip2acs demo listening on 127.0.0.1:6001");

    let policy = Arc::new(ServerConfig::default());
    let ils: Arc<dyn Ils> = Arc::new(demo_ils());
    let mut next_id = 0u64;

    loop {
        let (socket, addr) = listener.accept().await?;
        next_id += 1;
        println!("accepted connection {} from {}", next_id, addr);
        tokio::spawn(handle_connection(socket, next_id, policy.clone(), ils.clone()));
    }
}
