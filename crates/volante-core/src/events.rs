use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Domain events consumed by the notification dispatcher. Each variant
/// carries exactly the fields needed to render the recipient's inbox entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// A ride was created with the driver as candidate.
    RideRequested {
        ride_id: Uuid,
        driver_owner: String,
        requester_name: String,
        destination_address: String,
        offered_price: Decimal,
        is_emergency: bool,
    },
    /// The candidate driver confirmed the ride.
    RideAccepted {
        ride_id: Uuid,
        requester: String,
        driver_name: String,
    },
    /// Escrowed funds were captured at ride completion.
    PaymentReceived {
        ride_id: Uuid,
        driver_owner: String,
        amount: Decimal,
        vehicle_plate: String,
    },
    /// A wallet deposit settled.
    WalletTopUp {
        owner: String,
        amount: Decimal,
        new_balance: Decimal,
    },
}
