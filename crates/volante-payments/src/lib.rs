//! Wallets, stored cards, and escrow-style ride settlement.
//!
//! Money never moves without a matching ledger row: every balance change is
//! paired with an immutable [`Transaction`](volante_core::models::Transaction)
//! carrying the before/after balances. Ride funds are held in escrow at
//! request time and only captured when the ride completes.

pub mod escrow;
pub mod methods;
pub mod wallet;

pub use escrow::{EscrowProcessor, FundingSource};
pub use methods::{CardInput, PaymentMethodService};
pub use wallet::{MIN_TOP_UP, WalletService};
