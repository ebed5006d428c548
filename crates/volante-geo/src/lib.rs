//! Driver ranking: great-circle distances plus the two ordering policies
//! (nearest-first and emergency proximity+rating).

pub mod point;
pub mod rank;

pub use point::{FALLBACK_JITTER_DEG, GeoPoint, REFERENCE_POINT, fallback_position, haversine_km};
pub use rank::{
    DriverFilters, EMERGENCY_DISTANCE_CAP_KM, RankMode, RankedDriver, emergency_score, rank,
};
