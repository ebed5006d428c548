use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use rand::Rng;
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use tracing::{error, warn};
use uuid::Uuid;

use volante_core::error::{Error, Result};
use volante_core::events::DomainEvent;
use volante_core::models::{Driver, PaymentStatus, RideRequest, RideStatus};
use volante_core::store::{EntityStore, Predicate, Repository};
use volante_core::sync::LockRegistry;
use volante_geo::GeoPoint;
use volante_notify::NotificationDispatcher;
use volante_payments::EscrowProcessor;

use crate::rescan::EmergencyRescan;

/// Creation-time price floor for normal requests, in currency units.
pub const MIN_PRICE: Decimal = Decimal::from_parts(50, 0, 0, false, 0);
/// Creation-time price floor for emergency (blitz) requests.
pub const MIN_EMERGENCY_PRICE: Decimal = Decimal::from_parts(100, 0, 0, false, 0);

const SHARE_CODE_LEN: usize = 6;
const SHARE_CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Ride intake form. `candidate` is the driver pre-selected from ranking;
/// `None` opens a broadcast request any driver may accept.
#[derive(Debug, Clone)]
pub struct NewRideRequest {
    pub requester_name: String,
    pub requester_phone: String,
    pub origin_address: String,
    pub destination_address: String,
    pub vehicle_model: String,
    pub vehicle_plate: String,
    pub offered_price: Decimal,
    pub is_emergency: bool,
    pub candidate: Option<Uuid>,
}

/// The authoritative ride state machine. Every transition runs under the
/// ride's lock (shared with the escrow processor), so concurrent accept and
/// cancel cannot both win.
pub struct RideService {
    rides: Repository<RideRequest>,
    drivers: Repository<Driver>,
    escrow: Arc<EscrowProcessor>,
    dispatcher: Arc<NotificationDispatcher>,
    locks: Arc<LockRegistry>,
    rescans: Mutex<HashMap<Uuid, EmergencyRescan>>,
}

impl RideService {
    pub fn new(
        store: Arc<dyn EntityStore>,
        escrow: Arc<EscrowProcessor>,
        dispatcher: Arc<NotificationDispatcher>,
        locks: Arc<LockRegistry>,
    ) -> Self {
        RideService {
            rides: Repository::new(Arc::clone(&store)),
            drivers: Repository::new(store),
            escrow,
            dispatcher,
            locks,
            rescans: Mutex::new(HashMap::new()),
        }
    }

    /// Creates a `Pending` request and notifies the candidate driver. The
    /// price floor applies at creation only; later transitions never
    /// re-validate it.
    pub async fn create(&self, owner: &str, form: NewRideRequest) -> Result<RideRequest> {
        validate_form(&form)?;

        let candidate = match form.candidate {
            Some(driver_id) => Some(self.drivers.get(driver_id).await?),
            None => None,
        };

        // ThreadRng is not Send; keep it out of scope before the awaits.
        let (share, security) = {
            let mut rng = rand::thread_rng();
            (share_code(&mut rng), security_code(&mut rng))
        };
        let now = Utc::now();
        let ride = RideRequest {
            id: Uuid::new_v4(),
            created_by: owner.to_string(),
            requester_name: form.requester_name.trim().to_string(),
            requester_phone: form.requester_phone.trim().to_string(),
            origin_address: form.origin_address.trim().to_string(),
            destination_address: form.destination_address.trim().to_string(),
            vehicle_model: form.vehicle_model.trim().to_string(),
            vehicle_plate: form.vehicle_plate.trim().to_string(),
            offered_price: form.offered_price,
            driver_id: candidate.as_ref().map(|driver| driver.id),
            status: RideStatus::Pending,
            payment_status: PaymentStatus::Unpaid,
            is_emergency: form.is_emergency,
            share_code: share,
            security_code: security,
            created_date: now,
            updated_date: now,
        };
        let stored = self.rides.create(&ride).await?;

        if let Some(driver) = candidate {
            let event = DomainEvent::RideRequested {
                ride_id: stored.id,
                driver_owner: driver.created_by,
                requester_name: stored.requester_name.clone(),
                destination_address: stored.destination_address.clone(),
                offered_price: stored.offered_price,
                is_emergency: stored.is_emergency,
            };
            if let Err(err) = self.dispatcher.emit(&event).await {
                // The request itself is durable; only the inbox entry was lost.
                warn!("ride-requested notification dropped: {err}");
            }
        }

        Ok(stored)
    }

    /// Driver confirmation. Only the candidate may accept a bound request;
    /// an unbound (broadcast) request is first-come-first-served.
    pub async fn accept(&self, ride_id: Uuid, driver_id: Uuid) -> Result<RideRequest> {
        let _guard = self.locks.acquire(ride_id).await;
        let ride = self.rides.get(ride_id).await?;
        if ride.status != RideStatus::Pending {
            return Err(Error::InvalidTransition {
                from: ride.status,
                action: "accept",
            });
        }
        if let Some(candidate) = ride.driver_id {
            if candidate != driver_id {
                return Err(Error::InvalidTransition {
                    from: ride.status,
                    action: "accept",
                });
            }
        }

        let driver = self.drivers.get(driver_id).await?;
        let mut accepted = ride;
        accepted.driver_id = Some(driver_id);
        accepted.status = RideStatus::Accepted;
        let stored = self.rides.update(&accepted).await?;

        self.stop_rescan(ride_id).await;

        let event = DomainEvent::RideAccepted {
            ride_id: stored.id,
            requester: stored.created_by.clone(),
            driver_name: driver.full_name,
        };
        if let Err(err) = self.dispatcher.emit(&event).await {
            warn!("ride-accepted notification dropped: {err}");
        }

        Ok(stored)
    }

    /// Driver-initiated departure.
    pub async fn start(&self, ride_id: Uuid, driver_id: Uuid) -> Result<RideRequest> {
        let _guard = self.locks.acquire(ride_id).await;
        let ride = self.rides.get(ride_id).await?;
        if ride.status != RideStatus::Accepted || ride.driver_id != Some(driver_id) {
            return Err(Error::InvalidTransition {
                from: ride.status,
                action: "start",
            });
        }

        let mut started = ride;
        started.status = RideStatus::InProgress;
        self.rides.update(&started).await
    }

    /// Settles the ride: escrow capture runs first, then the status flip,
    /// then the driver's ride counter. A failure after capture leaves funds
    /// moved but the ride unsettled, so it is logged for reconciliation and
    /// surfaced as `Unavailable` rather than retried here.
    pub async fn complete(&self, ride_id: Uuid, driver_id: Uuid) -> Result<RideRequest> {
        let guard = self.locks.acquire(ride_id).await;
        let ride = self.rides.get(ride_id).await?;
        if ride.status != RideStatus::InProgress || ride.driver_id != Some(driver_id) {
            return Err(Error::InvalidTransition {
                from: ride.status,
                action: "complete",
            });
        }

        self.escrow.capture(&guard).await?;

        let mut completed = self.rides.get(ride_id).await?;
        completed.status = RideStatus::Completed;
        let stored = match self.rides.update(&completed).await {
            Ok(stored) => stored,
            Err(err) => {
                error!("ride {ride_id} captured but not marked completed: {err}");
                return Err(Error::Unavailable(format!(
                    "payment captured but ride not settled: {err}"
                )));
            }
        };

        match self.drivers.get(driver_id).await {
            Ok(mut driver) => {
                driver.total_rides += 1;
                if let Err(err) = self.drivers.update(&driver).await {
                    error!("ride {ride_id} settled but driver counter not bumped: {err}");
                    return Err(Error::Unavailable(format!(
                        "ride settled but driver record stale: {err}"
                    )));
                }
            }
            Err(err) => {
                error!("ride {ride_id} settled but driver lookup failed: {err}");
                return Err(Error::Unavailable(format!(
                    "ride settled but driver record stale: {err}"
                )));
            }
        }

        Ok(stored)
    }

    /// Short-circuit from `Pending`/`Accepted`. Any escrow hold is refunded
    /// before the ride is marked cancelled.
    pub async fn cancel(&self, ride_id: Uuid) -> Result<RideRequest> {
        let guard = self.locks.acquire(ride_id).await;
        let ride = self.rides.get(ride_id).await?;
        if !matches!(ride.status, RideStatus::Pending | RideStatus::Accepted) {
            return Err(Error::InvalidTransition {
                from: ride.status,
                action: "cancel",
            });
        }

        self.escrow.release(&guard).await?;

        let mut cancelled = self.rides.get(ride_id).await?;
        cancelled.status = RideStatus::Cancelled;
        let stored = self.rides.update(&cancelled).await?;

        self.stop_rescan(ride_id).await;
        Ok(stored)
    }

    /// Unauthenticated share-code lookup for third-party tracking.
    pub async fn track(&self, share_code: &str) -> Result<RideRequest> {
        let predicate = Predicate::default().field("share_code", share_code);
        self.rides
            .find_one(&predicate)
            .await?
            .ok_or_else(|| Error::not_found("RideRequest", share_code))
    }

    pub async fn list_for_requester(&self, owner: &str) -> Result<Vec<RideRequest>> {
        let predicate = Predicate::default().field("created_by", owner);
        let mut rides = self.rides.filter(&predicate).await?;
        rides.sort_by(|a, b| b.created_date.cmp(&a.created_date));
        Ok(rides)
    }

    /// Pending rides the driver can act on: bound to them, or open broadcast.
    pub async fn open_requests_for_driver(&self, driver_id: Uuid) -> Result<Vec<RideRequest>> {
        let bound = Predicate::default()
            .field("status", "pending")
            .field("driver_id", driver_id.to_string());
        let broadcast = Predicate::default()
            .field("status", "pending")
            .field("driver_id", serde_json::Value::Null);

        let mut rides = self.rides.filter(&bound).await?;
        rides.extend(self.rides.filter(&broadcast).await?);
        rides.sort_by(|a, b| b.created_date.cmp(&a.created_date));
        Ok(rides)
    }

    /// Starts the advisory re-ranking loop for an emergency request and
    /// returns a receiver of pool snapshots. The task stops on its own when
    /// the ride leaves `Pending`; transitions also abort it eagerly.
    pub async fn watch_emergency(
        &self,
        ride_id: Uuid,
        origin: GeoPoint,
    ) -> Result<tokio::sync::watch::Receiver<Vec<volante_geo::RankedDriver>>> {
        let ride = self.rides.get(ride_id).await?;
        if ride.status != RideStatus::Pending {
            return Err(Error::InvalidTransition {
                from: ride.status,
                action: "watch",
            });
        }

        let rescan = EmergencyRescan::spawn(
            self.rides.clone(),
            self.drivers.clone(),
            ride_id,
            origin,
        );
        let receiver = rescan.snapshots();
        self.rescans.lock().await.insert(ride_id, rescan);
        Ok(receiver)
    }

    async fn stop_rescan(&self, ride_id: Uuid) {
        if let Some(rescan) = self.rescans.lock().await.remove(&ride_id) {
            rescan.abort();
        }
    }
}

fn validate_form(form: &NewRideRequest) -> Result<()> {
    let required: [(&'static str, &str); 6] = [
        ("requester_name", &form.requester_name),
        ("requester_phone", &form.requester_phone),
        ("origin_address", &form.origin_address),
        ("destination_address", &form.destination_address),
        ("vehicle_model", &form.vehicle_model),
        ("vehicle_plate", &form.vehicle_plate),
    ];
    for (field, value) in required {
        if value.trim().is_empty() {
            return Err(Error::Validation {
                field,
                message: "required field is missing".to_string(),
            });
        }
    }

    let floor = if form.is_emergency {
        MIN_EMERGENCY_PRICE
    } else {
        MIN_PRICE
    };
    if form.offered_price < floor {
        return Err(Error::validation(
            "offered_price",
            format!("minimum price is R$ {floor:.2}"),
        ));
    }
    Ok(())
}

fn share_code(rng: &mut impl Rng) -> String {
    (0..SHARE_CODE_LEN)
        .map(|_| SHARE_CODE_ALPHABET[rng.gen_range(0..SHARE_CODE_ALPHABET.len())] as char)
        .collect()
}

fn security_code(rng: &mut impl Rng) -> String {
    rng.gen_range(1000..10_000).to_string()
}
