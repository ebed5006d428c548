use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use volante_core::models::{Driver, RideRequest, RideStatus};
use volante_core::store::Repository;
use volante_geo::{DriverFilters, GeoPoint, RankMode, RankedDriver, rank};

const RESCAN_PERIOD: Duration = Duration::from_secs(10);

/// Advisory re-ranking loop for an open emergency request. While the ride
/// stays `Pending` it publishes a fresh emergency-ranked pool snapshot every
/// ten seconds; it never mutates the ride. The ride's status is re-checked
/// after every ranking pass so a snapshot computed against a stale pending
/// state is discarded instead of published.
pub struct EmergencyRescan {
    handle: JoinHandle<()>,
    snapshots: watch::Receiver<Vec<RankedDriver>>,
}

impl EmergencyRescan {
    pub fn spawn(
        rides: Repository<RideRequest>,
        drivers: Repository<Driver>,
        ride_id: Uuid,
        origin: GeoPoint,
    ) -> Self {
        let (tx, rx) = watch::channel(Vec::new());
        let handle = tokio::spawn(run(rides, drivers, ride_id, origin, tx));
        EmergencyRescan {
            handle,
            snapshots: rx,
        }
    }

    pub fn snapshots(&self) -> watch::Receiver<Vec<RankedDriver>> {
        self.snapshots.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub fn abort(&self) {
        self.handle.abort();
    }
}

impl Drop for EmergencyRescan {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn run(
    rides: Repository<RideRequest>,
    drivers: Repository<Driver>,
    ride_id: Uuid,
    origin: GeoPoint,
    tx: watch::Sender<Vec<RankedDriver>>,
) {
    let mut rng = StdRng::from_entropy();
    let mut ticker = tokio::time::interval(RESCAN_PERIOD);
    let filters = DriverFilters {
        available_only: true,
        ..DriverFilters::default()
    };

    loop {
        ticker.tick().await;

        match rides.get(ride_id).await {
            Ok(ride) if ride.status == RideStatus::Pending => {}
            Ok(_) => break,
            Err(err) => {
                warn!("emergency re-scan for ride {ride_id} stopped: {err}");
                break;
            }
        }

        let pool = match drivers.all().await {
            Ok(pool) => pool,
            Err(err) => {
                warn!("emergency re-scan skipped a pass: {err}");
                continue;
            }
        };
        let ranked = rank(&pool, origin, RankMode::Emergency, &filters, &mut rng);

        // The pool read races the state machine; drop the snapshot if the
        // ride moved on while we were ranking.
        match rides.get(ride_id).await {
            Ok(ride) if ride.status == RideStatus::Pending => {
                debug!(
                    "emergency re-scan for ride {ride_id}: {} candidates",
                    ranked.len()
                );
                if tx.send(ranked).is_err() {
                    break;
                }
            }
            _ => break,
        }
    }
}
