use std::sync::Arc;
use std::time::Duration;

use tracing::{error, warn};
use uuid::Uuid;

use volante_core::error::{Error, Result};
use volante_core::events::DomainEvent;
use volante_core::models::{
    Driver, PaymentStatus, RideRequest, Transaction, TransactionKind,
};
use volante_core::store::{EntityStore, Predicate, Repository};
use volante_core::sync::{LockGuard, LockRegistry};
use volante_notify::NotificationDispatcher;

use crate::methods::PaymentMethodService;
use crate::wallet::{WalletService, ledger_entry};

/// Simulated card-network settlement latency.
const CARD_SETTLEMENT_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FundingSource {
    /// Internal balance; funds move at preauthorization time.
    Wallet,
    /// Stored card; `None` selects the payer's default card.
    Card(Option<Uuid>),
}

/// Moves funds into a paid-but-held state before the ride and reconciles
/// the hold when the ride completes (or releases it on cancellation).
pub struct EscrowProcessor {
    rides: Repository<RideRequest>,
    drivers: Repository<Driver>,
    wallets: Arc<WalletService>,
    methods: Arc<PaymentMethodService>,
    dispatcher: Arc<NotificationDispatcher>,
    ride_locks: Arc<LockRegistry>,
}

impl EscrowProcessor {
    pub fn new(
        store: Arc<dyn EntityStore>,
        wallets: Arc<WalletService>,
        methods: Arc<PaymentMethodService>,
        dispatcher: Arc<NotificationDispatcher>,
        ride_locks: Arc<LockRegistry>,
    ) -> Self {
        EscrowProcessor {
            rides: Repository::new(Arc::clone(&store)),
            drivers: Repository::new(store),
            wallets,
            methods,
            dispatcher,
            ride_locks,
        }
    }

    /// Holds the offered price against the ride. Wallet holds debit
    /// immediately (optimistic hold); card holds settle against the stored
    /// method without touching any wallet. Flips the ride to `PaidEscrow`
    /// only after the funds have moved.
    pub async fn preauthorize(&self, ride_id: Uuid, source: FundingSource) -> Result<Transaction> {
        let _guard = self.ride_locks.acquire(ride_id).await;
        let ride = self.rides.get(ride_id).await?;
        if ride.payment_status != PaymentStatus::Unpaid {
            return Err(Error::validation(
                "payment_status",
                "ride is already funded",
            ));
        }

        let description = format!("Pagamento de corrida - {}", ride.vehicle_plate);
        let entry = match source {
            FundingSource::Wallet => {
                self.wallets
                    .debit(
                        &ride.created_by,
                        ride.offered_price,
                        description,
                        Some(("ride", Some(ride.id))),
                    )
                    .await?
            }
            FundingSource::Card(selected) => {
                let method = match selected {
                    Some(id) => self.methods.get_owned(&ride.created_by, id).await?,
                    None => self
                        .methods
                        .default_method(&ride.created_by)
                        .await?
                        .ok_or_else(|| {
                            Error::validation("payment_method", "no default card on file")
                        })?,
                };

                tokio::time::sleep(CARD_SETTLEMENT_DELAY).await;

                self.wallets
                    .transactions()
                    .create(&ledger_entry(
                        &ride.created_by,
                        TransactionKind::Debit,
                        ride.offered_price,
                        description,
                        Some(("ride", Some(ride.id))),
                        Some(method.id),
                        None,
                    ))
                    .await?
            }
        };

        let mut funded = self.rides.get(ride_id).await?;
        funded.payment_status = PaymentStatus::PaidEscrow;
        if let Err(err) = self.rides.update(&funded).await {
            // Funds moved but the ride was not marked: manual reconciliation.
            error!(
                "ride {ride_id} funded by transaction {} but not marked paid_escrow: {err}",
                entry.id
            );
            return Err(Error::Unavailable(format!(
                "escrow hold recorded but ride not updated: {err}"
            )));
        }

        Ok(entry)
    }

    /// Reconciles the hold at completion: flips `PaidEscrow` to `Paid` and
    /// notifies the driver. The wallet debit already happened at
    /// preauthorization, so no further funds move here. Takes the ride's
    /// lock guard and reads the id from it, so capture cannot race a
    /// transition the caller has not locked out.
    pub async fn capture(&self, guard: &LockGuard) -> Result<Transaction> {
        let ride = self.rides.get(guard.id()).await?;
        if ride.payment_status != PaymentStatus::PaidEscrow {
            return Err(Error::validation(
                "payment_status",
                "ride has no escrowed funds to capture",
            ));
        }

        let entry = self.escrow_entry(&ride).await?;

        let mut paid = ride.clone();
        paid.payment_status = PaymentStatus::Paid;
        self.rides.update(&paid).await?;

        if let Some(driver_id) = ride.driver_id {
            match self.drivers.get(driver_id).await {
                Ok(driver) => {
                    let event = DomainEvent::PaymentReceived {
                        ride_id: ride.id,
                        driver_owner: driver.created_by,
                        amount: ride.offered_price,
                        vehicle_plate: ride.vehicle_plate.clone(),
                    };
                    if let Err(err) = self.dispatcher.emit(&event).await {
                        warn!("payment-received notification dropped: {err}");
                    }
                }
                Err(err) => warn!("driver lookup failed after capture: {err}"),
            }
        }

        Ok(entry)
    }

    /// Refund-on-cancel: returns a wallet hold to the payer's balance, or
    /// books a refund credit against the card. No-op on unfunded rides.
    /// Takes the ride's lock guard, like [`capture`](Self::capture).
    pub async fn release(&self, guard: &LockGuard) -> Result<Option<Transaction>> {
        let ride_id = guard.id();
        let ride = self.rides.get(ride_id).await?;
        if ride.payment_status != PaymentStatus::PaidEscrow {
            return Ok(None);
        }

        let held = self.escrow_entry(&ride).await?;
        let description = format!("Estorno de corrida - {}", ride.vehicle_plate);

        let refund = match held.payment_method_id {
            Some(method_id) => {
                self.wallets
                    .transactions()
                    .create(&ledger_entry(
                        &ride.created_by,
                        TransactionKind::Credit,
                        held.amount,
                        description,
                        Some(("ride", Some(ride.id))),
                        Some(method_id),
                        None,
                    ))
                    .await?
            }
            None => {
                self.wallets
                    .credit(
                        &ride.created_by,
                        held.amount,
                        description,
                        Some(("ride", Some(ride.id))),
                    )
                    .await?
            }
        };

        let mut released = self.rides.get(ride_id).await?;
        released.payment_status = PaymentStatus::Unpaid;
        if let Err(err) = self.rides.update(&released).await {
            // Refund booked but the ride still reads paid_escrow: a blind
            // retry would credit it twice. Manual reconciliation.
            error!(
                "ride {ride_id} refunded by transaction {} but not returned to unpaid: {err}",
                refund.id
            );
            return Err(Error::Unavailable(format!(
                "refund recorded but ride not updated: {err}"
            )));
        }

        Ok(Some(refund))
    }

    /// The debit that funded this ride's hold.
    async fn escrow_entry(&self, ride: &RideRequest) -> Result<Transaction> {
        let predicate = Predicate::default()
            .field("reference_id", ride.id.to_string())
            .field("type", "debit");
        self.wallets
            .transactions()
            .find_one(&predicate)
            .await?
            .ok_or_else(|| Error::not_found("Transaction", ride.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{NaiveDate, Utc};
    use rust_decimal::Decimal;
    use serde_json::Value;
    use std::sync::atomic::{AtomicBool, Ordering};
    use volante_core::models::{Notification, RideStatus};
    use volante_core::store::Entity;
    use volante_store::MemoryStore;

    use crate::methods::CardInput;

    struct Fixture {
        store: Arc<dyn EntityStore>,
        wallets: Arc<WalletService>,
        methods: Arc<PaymentMethodService>,
        escrow: EscrowProcessor,
        rides: Repository<RideRequest>,
        locks: Arc<LockRegistry>,
    }

    fn fixture() -> Fixture {
        fixture_over(Arc::new(MemoryStore::new()))
    }

    fn fixture_over(store: Arc<dyn EntityStore>) -> Fixture {
        let dispatcher = Arc::new(NotificationDispatcher::new(Arc::clone(&store)));
        let wallets = Arc::new(WalletService::new(
            Arc::clone(&store),
            Arc::clone(&dispatcher),
            Arc::new(LockRegistry::new()),
        ));
        let methods = Arc::new(PaymentMethodService::new(Arc::clone(&store)));
        let locks = Arc::new(LockRegistry::new());
        let escrow = EscrowProcessor::new(
            Arc::clone(&store),
            Arc::clone(&wallets),
            Arc::clone(&methods),
            dispatcher,
            Arc::clone(&locks),
        );
        let rides = Repository::new(Arc::clone(&store));
        Fixture {
            store,
            wallets,
            methods,
            escrow,
            rides,
            locks,
        }
    }

    async fn pending_ride(fix: &Fixture, price: Decimal, driver_id: Option<Uuid>) -> RideRequest {
        let now = Utc::now();
        let ride = RideRequest {
            id: Uuid::new_v4(),
            created_by: "ana@example.com".to_string(),
            requester_name: "Ana".to_string(),
            requester_phone: "+55 11 99999-0000".to_string(),
            origin_address: "Av. Paulista, 1000".to_string(),
            destination_address: "Rua Augusta, 100".to_string(),
            vehicle_model: "Fiat Argo".to_string(),
            vehicle_plate: "ABC1D23".to_string(),
            offered_price: price,
            driver_id,
            status: RideStatus::Pending,
            payment_status: PaymentStatus::Unpaid,
            is_emergency: false,
            share_code: "AB12CD".to_string(),
            security_code: "1234".to_string(),
            created_date: now,
            updated_date: now,
        };
        fix.rides.create(&ride).await.expect("create ride")
    }

    async fn seeded_driver(fix: &Fixture) -> Driver {
        let now = Utc::now();
        let driver = Driver {
            id: Uuid::new_v4(),
            created_by: "motorista@example.com".to_string(),
            full_name: "Carlos Souza".to_string(),
            city: "São Paulo".to_string(),
            cnh_category: "B".to_string(),
            cnh_expiry: NaiveDate::from_ymd_opt(2030, 1, 1).expect("date"),
            cnh_photo: None,
            profile_photo: None,
            lat: None,
            lng: None,
            rating: 5.0,
            total_rides: 0,
            is_available: true,
            is_verified: true,
            created_date: now,
            updated_date: now,
        };
        let drivers: Repository<Driver> = Repository::new(Arc::clone(&fix.store));
        drivers.create(&driver).await.expect("create driver")
    }

    #[tokio::test]
    async fn wallet_hold_debits_exactly_the_price() {
        let fix = fixture();
        fix.wallets
            .top_up("ana@example.com", Decimal::new(8000, 2))
            .await
            .expect("top up");
        let ride = pending_ride(&fix, Decimal::new(8000, 2), None).await;

        let entry = fix
            .escrow
            .preauthorize(ride.id, FundingSource::Wallet)
            .await
            .expect("preauthorize");
        assert_eq!(entry.balance_before, Some(Decimal::new(8000, 2)));
        assert_eq!(entry.balance_after, Some(Decimal::ZERO));

        let funded = fix.rides.get(ride.id).await.expect("ride");
        assert_eq!(funded.payment_status, PaymentStatus::PaidEscrow);
        assert_eq!(
            fix.wallets.balance("ana@example.com").await.expect("balance"),
            Decimal::ZERO
        );

        // The wallet is now empty; another hold must be rejected whole.
        let second = pending_ride(&fix, Decimal::new(5000, 2), None).await;
        let err = fix
            .escrow
            .preauthorize(second.id, FundingSource::Wallet)
            .await
            .expect_err("empty wallet");
        assert!(matches!(err, Error::InsufficientFunds { .. }));
        let untouched = fix.rides.get(second.id).await.expect("ride");
        assert_eq!(untouched.payment_status, PaymentStatus::Unpaid);
    }

    #[tokio::test]
    async fn double_preauthorize_is_rejected() {
        let fix = fixture();
        fix.wallets
            .top_up("ana@example.com", Decimal::from(200))
            .await
            .expect("top up");
        let ride = pending_ride(&fix, Decimal::from(60), None).await;

        fix.escrow
            .preauthorize(ride.id, FundingSource::Wallet)
            .await
            .expect("first hold");
        let err = fix
            .escrow
            .preauthorize(ride.id, FundingSource::Wallet)
            .await
            .expect_err("already funded");
        assert!(matches!(err, Error::Validation { field: "payment_status", .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn card_hold_references_the_method_and_skips_the_wallet() {
        let fix = fixture();
        fix.methods
            .add(
                "ana@example.com",
                CardInput {
                    card_number: "4111111111111111".to_string(),
                    cardholder_name: "ANA M SILVA".to_string(),
                    expiry_month: 12,
                    expiry_year: 2030,
                    cvv: "123".to_string(),
                },
            )
            .await
            .expect("add card");
        let ride = pending_ride(&fix, Decimal::from(70), None).await;

        let entry = fix
            .escrow
            .preauthorize(ride.id, FundingSource::Card(None))
            .await
            .expect("card hold");
        assert!(entry.payment_method_id.is_some());
        assert_eq!(entry.balance_before, None);
        assert_eq!(entry.balance_after, None);
        assert_eq!(
            fix.wallets.balance("ana@example.com").await.expect("balance"),
            Decimal::ZERO
        );
    }

    #[tokio::test]
    async fn card_hold_without_a_stored_card_is_rejected() {
        let fix = fixture();
        let ride = pending_ride(&fix, Decimal::from(70), None).await;
        let err = fix
            .escrow
            .preauthorize(ride.id, FundingSource::Card(None))
            .await
            .expect_err("no card");
        assert!(matches!(err, Error::Validation { field: "payment_method", .. }));
    }

    #[tokio::test]
    async fn capture_flips_the_hold_and_notifies_the_driver() {
        let fix = fixture();
        let driver = seeded_driver(&fix).await;
        fix.wallets
            .top_up("ana@example.com", Decimal::from(100))
            .await
            .expect("top up");
        let ride = pending_ride(&fix, Decimal::from(60), Some(driver.id)).await;

        fix.escrow
            .preauthorize(ride.id, FundingSource::Wallet)
            .await
            .expect("hold");
        let guard = fix.locks.acquire(ride.id).await;
        let entry = fix.escrow.capture(&guard).await.expect("capture");
        assert_eq!(entry.kind, TransactionKind::Debit);

        let paid = fix.rides.get(ride.id).await.expect("ride");
        assert_eq!(paid.payment_status, PaymentStatus::Paid);

        let notifications: Repository<Notification> = Repository::new(Arc::clone(&fix.store));
        let inbox = notifications
            .filter(&Predicate::default().field("recipient_user_id", "motorista@example.com"))
            .await
            .expect("inbox");
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].kind, "payment");
    }

    #[tokio::test]
    async fn capture_without_a_hold_is_rejected() {
        let fix = fixture();
        let ride = pending_ride(&fix, Decimal::from(60), None).await;
        let guard = fix.locks.acquire(ride.id).await;
        let err = fix.escrow.capture(&guard).await.expect_err("no hold");
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[tokio::test]
    async fn release_refunds_a_wallet_hold() {
        let fix = fixture();
        fix.wallets
            .top_up("ana@example.com", Decimal::from(100))
            .await
            .expect("top up");
        let ride = pending_ride(&fix, Decimal::from(60), None).await;

        fix.escrow
            .preauthorize(ride.id, FundingSource::Wallet)
            .await
            .expect("hold");
        assert_eq!(
            fix.wallets.balance("ana@example.com").await.expect("balance"),
            Decimal::from(40)
        );

        let guard = fix.locks.acquire(ride.id).await;
        let refund = fix
            .escrow
            .release(&guard)
            .await
            .expect("release")
            .expect("refund entry");
        assert_eq!(refund.kind, TransactionKind::Credit);
        assert_eq!(
            fix.wallets.balance("ana@example.com").await.expect("balance"),
            Decimal::from(100)
        );
        let released = fix.rides.get(ride.id).await.expect("ride");
        assert_eq!(released.payment_status, PaymentStatus::Unpaid);
    }

    #[tokio::test]
    async fn release_of_an_unfunded_ride_is_a_no_op() {
        let fix = fixture();
        let ride = pending_ride(&fix, Decimal::from(60), None).await;
        let guard = fix.locks.acquire(ride.id).await;
        let refund = fix.escrow.release(&guard).await.expect("release");
        assert!(refund.is_none());
    }

    /// Store double that can be switched to fail ride updates, leaving every
    /// other collection working.
    struct RideUpdateOutage {
        inner: MemoryStore,
        failing: AtomicBool,
    }

    impl RideUpdateOutage {
        fn new() -> Self {
            RideUpdateOutage {
                inner: MemoryStore::new(),
                failing: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl EntityStore for RideUpdateOutage {
        async fn filter(&self, collection: &str, predicate: &Predicate) -> Result<Vec<Value>> {
            self.inner.filter(collection, predicate).await
        }
        async fn get(&self, collection: &str, id: Uuid) -> Result<Option<Value>> {
            self.inner.get(collection, id).await
        }
        async fn create(&self, collection: &str, record: Value) -> Result<Value> {
            self.inner.create(collection, record).await
        }
        async fn update(&self, collection: &str, id: Uuid, record: Value) -> Result<Value> {
            if collection == RideRequest::COLLECTION && self.failing.load(Ordering::SeqCst) {
                return Err(Error::Unavailable("store down".to_string()));
            }
            self.inner.update(collection, id, record).await
        }
        async fn delete(&self, collection: &str, id: Uuid) -> Result<()> {
            self.inner.delete(collection, id).await
        }
    }

    #[tokio::test]
    async fn release_surfaces_unavailable_when_the_ride_flip_fails() {
        let outage = Arc::new(RideUpdateOutage::new());
        let fix = fixture_over(Arc::clone(&outage) as Arc<dyn EntityStore>);
        fix.wallets
            .top_up("ana@example.com", Decimal::from(100))
            .await
            .expect("top up");
        let ride = pending_ride(&fix, Decimal::from(60), None).await;
        fix.escrow
            .preauthorize(ride.id, FundingSource::Wallet)
            .await
            .expect("hold");

        outage.failing.store(true, Ordering::SeqCst);
        let guard = fix.locks.acquire(ride.id).await;
        let err = fix.escrow.release(&guard).await.expect_err("flip failed");
        assert!(matches!(err, Error::Unavailable(_)));

        // The refund itself is durable; the ride still reads paid_escrow and
        // must not be blindly retried.
        assert_eq!(
            fix.wallets.balance("ana@example.com").await.expect("balance"),
            Decimal::from(100)
        );
        outage.failing.store(false, Ordering::SeqCst);
        let stuck = fix.rides.get(ride.id).await.expect("ride");
        assert_eq!(stuck.payment_status, PaymentStatus::PaidEscrow);
    }
}
