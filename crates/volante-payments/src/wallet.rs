use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::warn;
use uuid::Uuid;

use volante_core::error::{Error, Result};
use volante_core::events::DomainEvent;
use volante_core::models::{Transaction, TransactionKind, TransactionStatus, Wallet};
use volante_core::store::{EntityStore, Predicate, Repository};
use volante_core::sync::LockRegistry;
use volante_notify::NotificationDispatcher;

/// Smallest accepted top-up, in currency units.
pub const MIN_TOP_UP: Decimal = Decimal::from_parts(10, 0, 0, false, 0);

/// One wallet per user identity. Wallet locks are keyed by the owner string
/// (as a UUIDv5) rather than the wallet id, so the guard can span the
/// find-or-create of a first-touch operation: two concurrent first top-ups
/// cannot both observe "no wallet" and each create one. Every balance
/// mutation happens under that lock and is paired with an immutable ledger
/// entry carrying the before/after balances.
pub struct WalletService {
    wallets: Repository<Wallet>,
    transactions: Repository<Transaction>,
    dispatcher: Arc<NotificationDispatcher>,
    locks: Arc<LockRegistry>,
}

impl WalletService {
    pub fn new(
        store: Arc<dyn EntityStore>,
        dispatcher: Arc<NotificationDispatcher>,
        locks: Arc<LockRegistry>,
    ) -> Self {
        WalletService {
            wallets: Repository::new(Arc::clone(&store)),
            transactions: Repository::new(store),
            dispatcher,
            locks,
        }
    }

    pub async fn get_or_create(&self, owner: &str) -> Result<Wallet> {
        let _guard = self.locks.acquire(owner_lock_id(owner)).await;
        self.load_or_create(owner).await
    }

    /// Callers must hold the owner's lock.
    async fn load_or_create(&self, owner: &str) -> Result<Wallet> {
        let predicate = Predicate::default().field("created_by", owner);
        match self.wallets.find_one(&predicate).await? {
            Some(wallet) => Ok(wallet),
            None => self.wallets.create(&Wallet::empty(owner)).await,
        }
    }

    pub async fn balance(&self, owner: &str) -> Result<Decimal> {
        Ok(self.get_or_create(owner).await?.balance)
    }

    pub async fn history(&self, owner: &str) -> Result<Vec<Transaction>> {
        let predicate = Predicate::default().field("user_id", owner);
        let mut entries = self.transactions.filter(&predicate).await?;
        entries.sort_by(|a, b| b.created_date.cmp(&a.created_date));
        Ok(entries)
    }

    /// Deposits credits into the owner's wallet and notifies them.
    pub async fn top_up(&self, owner: &str, amount: Decimal) -> Result<Transaction> {
        if amount < MIN_TOP_UP {
            return Err(Error::validation(
                "amount",
                format!("minimum top-up is R$ {MIN_TOP_UP:.2}"),
            ));
        }

        let _guard = self.locks.acquire(owner_lock_id(owner)).await;
        let wallet = self.load_or_create(owner).await?;
        let before = wallet.balance;
        let after = before + amount;

        let mut updated = wallet;
        updated.balance = after;
        updated.total_received += amount;
        self.wallets.update(&updated).await?;

        let entry = self
            .transactions
            .create(&ledger_entry(
                owner,
                TransactionKind::Deposit,
                amount,
                "Adição de créditos".to_string(),
                Some(("topup", None)),
                None,
                Some((before, after)),
            ))
            .await?;

        let event = DomainEvent::WalletTopUp {
            owner: owner.to_string(),
            amount,
            new_balance: after,
        };
        if let Err(err) = self.dispatcher.emit(&event).await {
            // The deposit itself is durable; only the inbox entry was lost.
            warn!("top-up notification dropped: {err}");
        }

        Ok(entry)
    }

    /// Moves funds out of the wallet. Fails with `InsufficientFunds` and
    /// leaves the balance untouched when it would go negative.
    pub async fn debit(
        &self,
        owner: &str,
        amount: Decimal,
        description: String,
        reference: Option<(&str, Option<Uuid>)>,
    ) -> Result<Transaction> {
        ensure_positive(amount)?;
        let _guard = self.locks.acquire(owner_lock_id(owner)).await;
        let wallet = self.load_or_create(owner).await?;
        if wallet.balance < amount {
            return Err(Error::InsufficientFunds {
                balance: wallet.balance,
                required: amount,
            });
        }

        let before = wallet.balance;
        let after = before - amount;

        let mut updated = wallet;
        updated.balance = after;
        updated.total_spent += amount;
        self.wallets.update(&updated).await?;

        self.transactions
            .create(&ledger_entry(
                owner,
                TransactionKind::Debit,
                amount,
                description,
                reference,
                None,
                Some((before, after)),
            ))
            .await
    }

    /// Returns funds to the wallet (refunds).
    pub async fn credit(
        &self,
        owner: &str,
        amount: Decimal,
        description: String,
        reference: Option<(&str, Option<Uuid>)>,
    ) -> Result<Transaction> {
        ensure_positive(amount)?;
        let _guard = self.locks.acquire(owner_lock_id(owner)).await;
        let wallet = self.load_or_create(owner).await?;
        let before = wallet.balance;
        let after = before + amount;

        let mut updated = wallet;
        updated.balance = after;
        self.wallets.update(&updated).await?;

        self.transactions
            .create(&ledger_entry(
                owner,
                TransactionKind::Credit,
                amount,
                description,
                reference,
                None,
                Some((before, after)),
            ))
            .await
    }

    pub(crate) fn transactions(&self) -> &Repository<Transaction> {
        &self.transactions
    }
}

/// Stable lock key for an owner identity; wallets are keyed by owner, so a
/// first-touch operation can be serialized before any wallet id exists.
fn owner_lock_id(owner: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, owner.as_bytes())
}

fn ensure_positive(amount: Decimal) -> Result<()> {
    if amount <= Decimal::ZERO {
        return Err(Error::validation("amount", "amount must be positive"));
    }
    Ok(())
}

/// Builds an immutable ledger row. `balances` is `(before, after)` for
/// wallet-funded entries and `None` for card-funded ones.
pub(crate) fn ledger_entry(
    owner: &str,
    kind: TransactionKind,
    amount: Decimal,
    description: String,
    reference: Option<(&str, Option<Uuid>)>,
    payment_method_id: Option<Uuid>,
    balances: Option<(Decimal, Decimal)>,
) -> Transaction {
    let now = Utc::now();
    Transaction {
        id: Uuid::new_v4(),
        created_by: owner.to_string(),
        user_id: owner.to_string(),
        kind,
        amount,
        description,
        reference_type: reference.map(|(kind, _)| kind.to_string()),
        reference_id: reference.and_then(|(_, id)| id),
        payment_method_id,
        balance_before: balances.map(|(before, _)| before),
        balance_after: balances.map(|(_, after)| after),
        status: TransactionStatus::Completed,
        created_date: now,
        updated_date: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use volante_store::MemoryStore;

    fn service() -> WalletService {
        let store: Arc<dyn EntityStore> = Arc::new(MemoryStore::new());
        let dispatcher = Arc::new(NotificationDispatcher::new(Arc::clone(&store)));
        WalletService::new(store, dispatcher, Arc::new(LockRegistry::new()))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_top_ups_create_a_single_wallet() {
        let store: Arc<dyn EntityStore> = Arc::new(MemoryStore::new());
        let dispatcher = Arc::new(NotificationDispatcher::new(Arc::clone(&store)));
        let wallets = Arc::new(WalletService::new(
            Arc::clone(&store),
            dispatcher,
            Arc::new(LockRegistry::new()),
        ));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let wallets = Arc::clone(&wallets);
            handles.push(tokio::spawn(async move {
                wallets.top_up("ana@example.com", Decimal::from(10)).await
            }));
        }
        for handle in handles {
            handle.await.expect("join").expect("top up");
        }

        let rows: Repository<Wallet> = Repository::new(store);
        let owned = rows
            .filter(&Predicate::default().field("created_by", "ana@example.com"))
            .await
            .expect("filter");
        assert_eq!(owned.len(), 1, "one wallet per owner");
        assert_eq!(owned[0].balance, Decimal::from(80));
    }

    #[tokio::test]
    async fn get_or_create_is_idempotent() {
        let wallets = service();
        let first = wallets.get_or_create("ana@example.com").await.expect("create");
        let second = wallets.get_or_create("ana@example.com").await.expect("fetch");
        assert_eq!(first.id, second.id);
        assert_eq!(first.balance, Decimal::ZERO);
    }

    #[tokio::test]
    async fn top_up_below_minimum_is_rejected() {
        let wallets = service();
        let err = wallets
            .top_up("ana@example.com", Decimal::new(999, 2))
            .await
            .expect_err("below minimum");
        assert!(matches!(err, Error::Validation { field: "amount", .. }));
    }

    #[tokio::test]
    async fn top_up_records_before_and_after_balances() {
        let wallets = service();
        let entry = wallets
            .top_up("ana@example.com", Decimal::new(5000, 2))
            .await
            .expect("top up");

        assert_eq!(entry.kind, TransactionKind::Deposit);
        assert_eq!(entry.balance_before, Some(Decimal::ZERO));
        assert_eq!(entry.balance_after, Some(Decimal::new(5000, 2)));
        assert_eq!(entry.status, TransactionStatus::Completed);
        assert_eq!(
            wallets.balance("ana@example.com").await.expect("balance"),
            Decimal::new(5000, 2)
        );
    }

    #[tokio::test]
    async fn debit_exceeding_balance_leaves_balance_unchanged() {
        let wallets = service();
        wallets
            .top_up("ana@example.com", Decimal::from(30))
            .await
            .expect("top up");

        let err = wallets
            .debit("ana@example.com", Decimal::from(40), "x".to_string(), None)
            .await
            .expect_err("over-debit");
        assert!(matches!(err, Error::InsufficientFunds { .. }));
        assert_eq!(
            wallets.balance("ana@example.com").await.expect("balance"),
            Decimal::from(30)
        );
    }

    #[tokio::test]
    async fn balance_equals_initial_minus_debits_plus_credits() {
        let wallets = service();
        wallets
            .top_up("ana@example.com", Decimal::from(100))
            .await
            .expect("top up");
        wallets
            .debit("ana@example.com", Decimal::from(60), "ride".to_string(), None)
            .await
            .expect("debit");
        wallets
            .credit("ana@example.com", Decimal::from(15), "refund".to_string(), None)
            .await
            .expect("credit");
        wallets
            .debit("ana@example.com", Decimal::from(5), "ride".to_string(), None)
            .await
            .expect("debit");

        assert_eq!(
            wallets.balance("ana@example.com").await.expect("balance"),
            Decimal::from(50)
        );
    }

    #[tokio::test]
    async fn exact_balance_debit_reaches_zero_and_second_debit_fails() {
        let wallets = service();
        wallets
            .top_up("ana@example.com", Decimal::new(8000, 2))
            .await
            .expect("top up");

        let entry = wallets
            .debit(
                "ana@example.com",
                Decimal::new(8000, 2),
                "ride".to_string(),
                None,
            )
            .await
            .expect("debit");
        assert_eq!(entry.balance_before, Some(Decimal::new(8000, 2)));
        assert_eq!(entry.balance_after, Some(Decimal::ZERO));

        let err = wallets
            .debit("ana@example.com", Decimal::new(100, 2), "ride".to_string(), None)
            .await
            .expect_err("empty wallet");
        assert!(matches!(err, Error::InsufficientFunds { .. }));
    }

    #[tokio::test]
    async fn zero_or_negative_amounts_are_rejected() {
        let wallets = service();
        let err = wallets
            .debit("ana@example.com", Decimal::ZERO, "x".to_string(), None)
            .await
            .expect_err("zero amount");
        assert!(matches!(err, Error::Validation { .. }));
    }
}
