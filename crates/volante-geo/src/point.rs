use rand::Rng;
use serde::{Deserialize, Serialize};

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Reference point for drivers with no reported position (central São Paulo).
pub const REFERENCE_POINT: GeoPoint = GeoPoint {
    lat: -23.5505,
    lng: -46.6333,
};

/// Maximum jitter, in degrees, applied around the reference point when a
/// driver's position is unknown. A stand-in policy, not a precision claim.
pub const FALLBACK_JITTER_DEG: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

/// Great-circle (haversine) distance in kilometers.
pub fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let (lat1, lon1) = (a.lat.to_radians(), a.lng.to_radians());
    let (lat2, lon2) = (b.lat.to_radians(), b.lng.to_radians());
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let sin_dlat = (dlat * 0.5).sin();
    let sin_dlon = (dlon * 0.5).sin();
    let h = sin_dlat * sin_dlat + lat1.cos() * lat2.cos() * sin_dlon * sin_dlon;
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_KM * c
}

/// Synthetic nearby position for a driver whose coordinates are unknown.
pub fn fallback_position(rng: &mut impl Rng) -> GeoPoint {
    GeoPoint {
        lat: REFERENCE_POINT.lat + rng.gen_range(-FALLBACK_JITTER_DEG..=FALLBACK_JITTER_DEG),
        lng: REFERENCE_POINT.lng + rng.gen_range(-FALLBACK_JITTER_DEG..=FALLBACK_JITTER_DEG),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn haversine_of_identical_points_is_zero() {
        let p = GeoPoint { lat: -23.55, lng: -46.63 };
        assert!(haversine_km(p, p).abs() < 1e-9);
    }

    #[test]
    fn haversine_matches_known_distance() {
        // São Paulo to Rio de Janeiro, roughly 360 km.
        let sp = GeoPoint { lat: -23.5505, lng: -46.6333 };
        let rio = GeoPoint { lat: -22.9068, lng: -43.1729 };
        let d = haversine_km(sp, rio);
        assert!((d - 360.0).abs() < 10.0, "got {d} km");
    }

    #[test]
    fn fallback_position_stays_within_jitter_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let p = fallback_position(&mut rng);
            assert!((p.lat - REFERENCE_POINT.lat).abs() <= FALLBACK_JITTER_DEG);
            assert!((p.lng - REFERENCE_POINT.lng).abs() <= FALLBACK_JITTER_DEG);
        }
    }

    #[test]
    fn fallback_position_is_deterministic_for_a_fixed_seed() {
        let mut a = StdRng::seed_from_u64(42);
        let mut b = StdRng::seed_from_u64(42);
        assert_eq!(fallback_position(&mut a), fallback_position(&mut b));
    }
}
