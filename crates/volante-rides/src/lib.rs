//! Ride lifecycle engine: driver registration, the request state machine,
//! and the advisory emergency re-scan loop.
//!
//! Transitions are serialized per ride id through a shared
//! [`LockRegistry`](volante_core::sync::LockRegistry), so a driver `accept`
//! and a requester `cancel` can never both win on the same record.

pub mod drivers;
pub mod rescan;
pub mod service;

pub use drivers::{DriverRegistry, NewDriver, PhotoUpload};
pub use rescan::EmergencyRescan;
pub use service::{MIN_EMERGENCY_PRICE, MIN_PRICE, NewRideRequest, RideService};
