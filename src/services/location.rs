// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Location provider boundary and great-circle distance helpers.

use crate::models::PositionSample;
use futures_util::stream::BoxStream;
use geo::{Distance, Haversine};
use std::future::Future;

/// Minimum movement before the provider delivers a new fix (meters).
pub const DEFAULT_DISTANCE_FILTER_METERS: f64 = 5.0;

/// Platform location permission state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationPermission {
    Granted,
    Denied,
    /// The user must change the setting outside the app.
    DeniedForever,
}

/// How the provider should sample positions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocationSettings {
    pub distance_filter_meters: f64,
    pub high_accuracy: bool,
}

impl Default for LocationSettings {
    fn default() -> Self {
        Self {
            distance_filter_meters: DEFAULT_DISTANCE_FILTER_METERS,
            high_accuracy: true,
        }
    }
}

/// Device GPS collaborator.
pub trait LocationProvider: Send + Sync + 'static {
    fn check_permission(&self) -> impl Future<Output = LocationPermission> + Send;

    /// Prompt the user. Only called after `check_permission` said `Denied`.
    fn request_permission(&self) -> impl Future<Output = LocationPermission> + Send;

    fn is_service_enabled(&self) -> impl Future<Output = bool> + Send;

    /// Lazy, potentially infinite stream of fixes.
    fn position_stream(&self, settings: LocationSettings) -> BoxStream<'static, PositionSample>;
}

/// Great-circle distance between two fixes in meters.
pub fn distance_between(from: &PositionSample, to: &PositionSample) -> f64 {
    Haversine.distance(from.point(), to.point())
}

/// Sum of distances between consecutive fixes.
pub fn path_distance_meters(samples: &[PositionSample]) -> f64 {
    samples
        .windows(2)
        .map(|pair| distance_between(&pair[0], &pair[1]))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn at(lat: f64, lon: f64) -> PositionSample {
        PositionSample::new(lat, lon, Utc::now())
    }

    #[test]
    fn test_distance_one_millidegree_latitude() {
        // 0.001 degrees of latitude is roughly 111 m anywhere on Earth
        let d = distance_between(&at(37.0, -122.0), &at(37.001, -122.0));
        assert!((d - 111.2).abs() < 0.5, "got {}", d);
    }

    #[test]
    fn test_distance_is_symmetric_and_zero_for_same_point() {
        let a = at(51.5007, -0.1246);
        let b = at(40.6892, -74.0445);
        assert!((distance_between(&a, &b) - distance_between(&b, &a)).abs() < 1e-6);
        assert_eq!(distance_between(&a, &a), 0.0);
    }

    #[test]
    fn test_path_distance_sums_segments() {
        let path = [at(0.0, 0.0), at(0.001, 0.0), at(0.001, 0.001)];
        let expected = distance_between(&path[0], &path[1]) + distance_between(&path[1], &path[2]);
        assert!((path_distance_meters(&path) - expected).abs() < 1e-9);
        assert_eq!(path_distance_meters(&path[..1]), 0.0);
        assert_eq!(path_distance_meters(&[]), 0.0);
    }
}
