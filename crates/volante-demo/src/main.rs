use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rust_decimal::Decimal;
use tracing::info;

use volante_core::sync::LockRegistry;
use volante_geo::{DriverFilters, GeoPoint, RankMode, rank};
use volante_notify::{NotificationDispatcher, NotificationInbox};
use volante_payments::{EscrowProcessor, FundingSource, PaymentMethodService, WalletService};
use volante_rides::{DriverRegistry, NewDriver, NewRideRequest, RideService};
use volante_store::{MemoryFileStore, StoreConfig};

const REQUESTER: &str = "ana@example.com";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "volante=info,volante_demo=info".to_string()),
        )
        .init();

    let config = StoreConfig::from_env()?;
    let store = config.connect()?;

    let dispatcher = Arc::new(NotificationDispatcher::new(Arc::clone(&store)));
    let wallets = Arc::new(WalletService::new(
        Arc::clone(&store),
        Arc::clone(&dispatcher),
        Arc::new(LockRegistry::new()),
    ));
    let methods = Arc::new(PaymentMethodService::new(Arc::clone(&store)));
    let ride_locks = Arc::new(LockRegistry::new());
    let escrow = Arc::new(EscrowProcessor::new(
        Arc::clone(&store),
        Arc::clone(&wallets),
        methods,
        Arc::clone(&dispatcher),
        Arc::clone(&ride_locks),
    ));
    let rides = RideService::new(
        Arc::clone(&store),
        Arc::clone(&escrow),
        Arc::clone(&dispatcher),
        ride_locks,
    );
    let registry = DriverRegistry::new(Arc::clone(&store), Arc::new(MemoryFileStore::new()));
    let inbox = NotificationInbox::new(Arc::clone(&store));

    // Seed a small pool around Avenida Paulista.
    let seeds = [
        ("carlos@example.com", "Carlos Souza", -23.5510, -46.6340),
        ("beatriz@example.com", "Beatriz Lima", -23.5620, -46.6550),
        ("rafael@example.com", "Rafael Costa", -23.6000, -46.7000),
    ];
    for (owner, name, lat, lng) in seeds {
        let driver = registry
            .register(
                owner,
                NewDriver {
                    full_name: name.to_string(),
                    city: "São Paulo".to_string(),
                    cnh_category: "B".to_string(),
                    cnh_expiry: NaiveDate::from_ymd_opt(2030, 1, 1)
                        .context("invalid seed date")?,
                    cnh_photo: None,
                    profile_photo: None,
                    lat: Some(lat),
                    lng: Some(lng),
                },
            )
            .await?;
        registry.set_availability(driver.id, true).await?;
        registry.set_verified(driver.id, true).await?;
        info!("registered driver {}", driver.full_name);
    }

    let entry = wallets.top_up(REQUESTER, Decimal::new(15000, 2)).await?;
    info!(
        "wallet funded: R$ {} (balance R$ {})",
        entry.amount,
        entry.balance_after.unwrap_or_default()
    );

    let origin = GeoPoint {
        lat: -23.5614,
        lng: -46.6559,
    };
    let pool = registry.list().await?;
    let mut rng = StdRng::seed_from_u64(42);
    let ranked = rank(
        &pool,
        origin,
        RankMode::Normal,
        &DriverFilters::default(),
        &mut rng,
    );
    for candidate in &ranked {
        info!(
            "candidate {} at {:.1} km",
            candidate.driver.full_name, candidate.distance_km
        );
    }
    let best = ranked.first().context("no drivers available")?;
    let driver_id = best.driver.id;

    let ride = rides
        .create(
            REQUESTER,
            NewRideRequest {
                requester_name: "Ana Martins".to_string(),
                requester_phone: "+55 11 99999-0000".to_string(),
                origin_address: "Av. Paulista, 1578".to_string(),
                destination_address: "Rua Augusta, 100".to_string(),
                vehicle_model: "Fiat Argo".to_string(),
                vehicle_plate: "ABC1D23".to_string(),
                offered_price: Decimal::new(7500, 2),
                is_emergency: false,
                candidate: Some(driver_id),
            },
        )
        .await?;
    info!(
        "ride {} created for {} (share code {})",
        ride.id, best.driver.full_name, ride.share_code
    );

    let hold = escrow.preauthorize(ride.id, FundingSource::Wallet).await?;
    info!(
        "escrow hold of R$ {} placed (balance R$ {})",
        hold.amount,
        hold.balance_after.unwrap_or_default()
    );

    rides.accept(ride.id, driver_id).await?;
    info!("driver accepted");
    rides.start(ride.id, driver_id).await?;
    info!("ride in progress");
    let done = rides.complete(ride.id, driver_id).await?;
    info!(
        "ride completed: status={} payment={:?}",
        done.status, done.payment_status
    );

    let settled = registry.get(driver_id).await?;
    info!(
        "driver {} now has {} completed rides",
        settled.full_name, settled.total_rides
    );
    info!(
        "requester has {} unread notifications, driver owner has {}",
        inbox.unread_count(REQUESTER).await,
        inbox.unread_count(&settled.created_by).await
    );

    Ok(())
}
