pub mod error;
pub mod events;
pub mod models;
pub mod store;
pub mod sync;

pub use error::{Error, Result};
pub use events::DomainEvent;
pub use models::{
    Driver, Notification, NotificationPriority, PaymentMethod, PaymentStatus, RideRequest,
    RideStatus, Transaction, TransactionKind, TransactionStatus, Wallet,
};
pub use store::{Entity, EntityStore, FileStore, Predicate, Repository, Uploaded};
pub use sync::{LockGuard, LockRegistry};
