use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::store::Entity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RideStatus {
    Pending,
    Accepted,
    InProgress,
    Completed,
    Cancelled,
}

impl RideStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, RideStatus::Completed | RideStatus::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RideStatus::Pending => "pending",
            RideStatus::Accepted => "accepted",
            RideStatus::InProgress => "in_progress",
            RideStatus::Completed => "completed",
            RideStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for RideStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Unpaid,
    PaidEscrow,
    Paid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Debit,
    Credit,
    Deposit,
    Withdrawal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationPriority {
    Normal,
    High,
    Urgent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Driver {
    pub id: Uuid,
    pub created_by: String,
    pub full_name: String,
    pub city: String,
    pub cnh_category: String,
    pub cnh_expiry: NaiveDate,
    pub cnh_photo: Option<String>,
    pub profile_photo: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub rating: f64,
    pub total_rides: u32,
    pub is_available: bool,
    pub is_verified: bool,
    pub created_date: DateTime<Utc>,
    pub updated_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RideRequest {
    pub id: Uuid,
    pub created_by: String,
    pub requester_name: String,
    pub requester_phone: String,
    pub origin_address: String,
    pub destination_address: String,
    pub vehicle_model: String,
    pub vehicle_plate: String,
    pub offered_price: Decimal,
    pub driver_id: Option<Uuid>,
    pub status: RideStatus,
    pub payment_status: PaymentStatus,
    pub is_emergency: bool,
    pub share_code: String,
    pub security_code: String,
    pub created_date: DateTime<Utc>,
    pub updated_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    pub id: Uuid,
    pub created_by: String,
    pub balance: Decimal,
    pub total_spent: Decimal,
    pub total_received: Decimal,
    pub created_date: DateTime<Utc>,
    pub updated_date: DateTime<Utc>,
}

impl Wallet {
    pub fn empty(owner: &str) -> Self {
        let now = Utc::now();
        Wallet {
            id: Uuid::new_v4(),
            created_by: owner.to_string(),
            balance: Decimal::ZERO,
            total_spent: Decimal::ZERO,
            total_received: Decimal::ZERO,
            created_date: now,
            updated_date: now,
        }
    }
}

/// Immutable ledger row. `balance_before`/`balance_after` are present on
/// wallet-funded entries and absent on card-funded ones.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub created_by: String,
    pub user_id: String,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub amount: Decimal,
    pub description: String,
    pub reference_type: Option<String>,
    pub reference_id: Option<Uuid>,
    pub payment_method_id: Option<Uuid>,
    pub balance_before: Option<Decimal>,
    pub balance_after: Option<Decimal>,
    pub status: TransactionStatus,
    pub created_date: DateTime<Utc>,
    pub updated_date: DateTime<Utc>,
}

/// Derived card metadata only. The full card number and CVV are validated
/// at intake and never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentMethod {
    pub id: Uuid,
    pub created_by: String,
    pub card_brand: String,
    pub card_last4: String,
    pub cardholder_name: String,
    pub expiry_month: u8,
    pub expiry_year: u16,
    pub is_default: bool,
    pub created_date: DateTime<Utc>,
    pub updated_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub created_by: String,
    pub recipient_user_id: String,
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub priority: NotificationPriority,
    pub reference_type: Option<String>,
    pub reference_id: Option<Uuid>,
    pub is_read: bool,
    pub action_url: Option<String>,
    pub created_date: DateTime<Utc>,
    pub updated_date: DateTime<Utc>,
}

impl Entity for Driver {
    const COLLECTION: &'static str = "Driver";
    fn id(&self) -> Uuid {
        self.id
    }
}

impl Entity for RideRequest {
    const COLLECTION: &'static str = "RideRequest";
    fn id(&self) -> Uuid {
        self.id
    }
}

impl Entity for Wallet {
    const COLLECTION: &'static str = "Wallet";
    fn id(&self) -> Uuid {
        self.id
    }
}

impl Entity for Transaction {
    const COLLECTION: &'static str = "Transaction";
    fn id(&self) -> Uuid {
        self.id
    }
}

impl Entity for PaymentMethod {
    const COLLECTION: &'static str = "PaymentMethod";
    fn id(&self) -> Uuid {
        self.id
    }
}

impl Entity for Notification {
    const COLLECTION: &'static str = "Notification";
    fn id(&self) -> Uuid {
        self.id
    }
}
