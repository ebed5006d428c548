use rand::Rng;

use volante_core::models::Driver;

use crate::point::{GeoPoint, fallback_position, haversine_km};

/// Distance beyond which proximity contributes nothing to the emergency
/// score.
pub const EMERGENCY_DISTANCE_CAP_KM: f64 = 50.0;

const DISTANCE_WEIGHT: f64 = 0.6;
const RATING_WEIGHT: f64 = 0.4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankMode {
    /// Nearest first.
    Normal,
    /// Available drivers only, weighted by proximity and rating.
    Emergency,
}

/// Post-filters applied conjunctively after ordering.
#[derive(Debug, Clone, Default)]
pub struct DriverFilters {
    /// Case-insensitive substring match on the driver's city.
    pub city: Option<String>,
    /// Exact CNH category match.
    pub cnh_category: Option<String>,
    pub min_rating: Option<f64>,
    pub available_only: bool,
    pub max_distance_km: Option<f64>,
    /// Free-text search over name and city, case-insensitive.
    pub search: Option<String>,
}

impl DriverFilters {
    fn accepts(&self, candidate: &RankedDriver) -> bool {
        let driver = &candidate.driver;

        if self.available_only && !driver.is_available {
            return false;
        }
        if let Some(max) = self.max_distance_km {
            if candidate.distance_km > max {
                return false;
            }
        }
        if let Some(city) = &self.city {
            if !driver.city.to_lowercase().contains(&city.to_lowercase()) {
                return false;
            }
        }
        if let Some(category) = &self.cnh_category {
            if driver.cnh_category != *category {
                return false;
            }
        }
        if let Some(min) = self.min_rating {
            if driver.rating < min {
                return false;
            }
        }
        if let Some(search) = &self.search {
            let needle = search.to_lowercase();
            if !driver.full_name.to_lowercase().contains(&needle)
                && !driver.city.to_lowercase().contains(&needle)
            {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone)]
pub struct RankedDriver {
    pub driver: Driver,
    /// Live position used for ranking; synthetic when the driver reported
    /// no coordinates.
    pub position: GeoPoint,
    pub distance_km: f64,
    /// Present in emergency mode only.
    pub score: Option<f64>,
}

/// Normalized proximity+rating score, higher is better. Non-increasing in
/// distance and non-decreasing in rating.
pub fn emergency_score(distance_km: f64, rating: f64) -> f64 {
    let proximity = (1.0 - distance_km / EMERGENCY_DISTANCE_CAP_KM).max(0.0);
    DISTANCE_WEIGHT * proximity + RATING_WEIGHT * (rating / 5.0)
}

/// Orders the driver pool for a requester at `origin`. Pure over its inputs
/// plus the supplied RNG: a fixed seed yields a deterministic total order
/// even when drivers are missing coordinates. An empty pool is an empty
/// result, never an error.
pub fn rank(
    pool: &[Driver],
    origin: GeoPoint,
    mode: RankMode,
    filters: &DriverFilters,
    rng: &mut impl Rng,
) -> Vec<RankedDriver> {
    let mut candidates: Vec<RankedDriver> = pool
        .iter()
        .map(|driver| {
            let position = match (driver.lat, driver.lng) {
                (Some(lat), Some(lng)) => GeoPoint { lat, lng },
                _ => fallback_position(rng),
            };
            RankedDriver {
                driver: driver.clone(),
                position,
                distance_km: haversine_km(origin, position),
                score: None,
            }
        })
        .collect();

    match mode {
        RankMode::Normal => {
            // Stable sort: equidistant drivers keep their input order.
            candidates.sort_by(|a, b| {
                a.distance_km
                    .partial_cmp(&b.distance_km)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        }
        RankMode::Emergency => {
            candidates.retain(|candidate| candidate.driver.is_available);
            for candidate in &mut candidates {
                candidate.score = Some(emergency_score(
                    candidate.distance_km,
                    candidate.driver.rating,
                ));
            }
            // Stable sort keeps emergency dispatch deterministic on ties.
            candidates.sort_by(|a, b| {
                b.score
                    .partial_cmp(&a.score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        }
    }

    candidates.retain(|candidate| filters.accepts(candidate));
    candidates
}
