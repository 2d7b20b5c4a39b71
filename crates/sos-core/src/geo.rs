//! Geo-dispatch: nearest responder station and throttled address lookup.
//!
//! Station selection uses planar distance on raw degrees with the first
//! listed station winning exact ties. Address lookups are throttled; samples
//! inside the throttle window reuse the last resolved address.

use std::time::Duration;

use async_trait::async_trait;
use sos_types::{Coord, Station};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::GeoConfig;
use crate::error::LookupError;

/// Placeholder used when the very first lookup fails
pub const ADDRESS_UNAVAILABLE: &str = "Address unavailable";

/// Reverse-geocoding capability
#[async_trait]
pub trait ReverseGeocoder: Send + Sync {
    /// Resolve a coordinate to a short human-readable address
    async fn reverse(&self, coord: Coord) -> Result<String, LookupError>;
}

/// Address as currently known to the resolver
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressState {
    /// No lookup has completed yet
    Pending,
    /// Last resolved address (or the unavailable placeholder)
    Resolved(String),
}

impl AddressState {
    pub fn display(&self) -> &str {
        match self {
            AddressState::Pending => "Locating address...",
            AddressState::Resolved(address) => address,
        }
    }
}

/// Outcome of feeding one positioning sample to the resolver
#[derive(Debug, Clone)]
pub struct GeoUpdate {
    /// Nearest station, `None` only when no stations are configured
    pub station: Option<Station>,
    /// Address to display for this sample
    pub address: AddressState,
    /// Set when the throttle allows a new lookup for this coordinate
    pub lookup: Option<Coord>,
}

/// Pick the station closest to `coord`, first-listed on exact ties
pub fn nearest_station<'a>(stations: &'a [Station], coord: &Coord) -> Option<&'a Station> {
    let mut best: Option<(&Station, f64)> = None;
    for station in stations {
        let distance = station.coord().planar_distance(coord);
        match best {
            Some((_, best_distance)) if distance >= best_distance => {}
            _ => best = Some((station, distance)),
        }
    }
    best.map(|(station, _)| station)
}

/// Keep the first three comma-separated parts of a geocoder display name
pub fn shorten_address(display_name: &str) -> String {
    display_name
        .split(',')
        .take(3)
        .collect::<Vec<_>>()
        .join(",")
}

/// Owns the station set and the throttled address state
#[derive(Debug, Clone)]
pub struct GeoResolver {
    stations: Vec<Station>,
    throttle: Duration,
    last_lookup: Option<Instant>,
    address: AddressState,
}

impl GeoResolver {
    pub fn new(config: &GeoConfig) -> Self {
        Self {
            stations: config.stations.clone(),
            throttle: config.lookup_throttle(),
            last_lookup: None,
            address: AddressState::Pending,
        }
    }

    /// Resolve station and address for a new sample at `now`
    pub fn update(&mut self, coord: Coord, now: Instant) -> GeoUpdate {
        let station = nearest_station(&self.stations, &coord).cloned();

        let due = match self.last_lookup {
            None => true,
            Some(last) => now.duration_since(last) >= self.throttle,
        };
        let lookup = if due {
            self.last_lookup = Some(now);
            debug!(lat = coord.lat, lng = coord.lng, "Address lookup issued");
            Some(coord)
        } else {
            None
        };

        GeoUpdate {
            station,
            address: self.address.clone(),
            lookup,
        }
    }

    /// Apply a finished lookup; returns the address if it changed
    pub fn apply_lookup(&mut self, result: Result<String, LookupError>) -> Option<String> {
        let next = match result {
            Ok(address) => address,
            Err(e) => match self.address {
                AddressState::Pending => {
                    warn!(error = %e, "First address lookup failed");
                    ADDRESS_UNAVAILABLE.to_string()
                }
                AddressState::Resolved(_) => {
                    debug!(error = %e, "Address lookup failed, keeping previous address");
                    return None;
                }
            },
        };

        if self.address == AddressState::Resolved(next.clone()) {
            return None;
        }
        self.address = AddressState::Resolved(next.clone());
        Some(next)
    }

    pub fn address(&self) -> &AddressState {
        &self.address
    }

    pub fn stations(&self) -> &[Station] {
        &self.stations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_stations;
    use proptest::prelude::*;

    fn resolver() -> GeoResolver {
        GeoResolver::new(&GeoConfig::default())
    }

    #[test]
    fn test_nearest_default_stations() {
        let stations = default_stations();
        let near_thane = Coord::new(19.20, 72.97);
        assert_eq!(
            nearest_station(&stations, &near_thane).unwrap().name,
            "Thane Police Station"
        );
        let near_mumbai = Coord::new(18.95, 72.83);
        assert_eq!(
            nearest_station(&stations, &near_mumbai).unwrap().name,
            "Mumbai Central Control"
        );
    }

    #[test]
    fn test_tie_goes_to_first_listed() {
        let stations = vec![
            Station::new("East", 0.0, 1.0),
            Station::new("West", 0.0, -1.0),
        ];
        let origin = Coord::new(0.0, 0.0);
        assert_eq!(nearest_station(&stations, &origin).unwrap().name, "East");
    }

    #[test]
    fn test_planar_not_great_circle() {
        // At high latitude a longitude degree is short on the ground, but
        // planar selection still treats it as a full degree.
        let stations = vec![
            Station::new("LngOffset", 80.0, 1.5),
            Station::new("LatOffset", 81.0, 0.0),
        ];
        let here = Coord::new(80.0, 0.0);
        assert_eq!(nearest_station(&stations, &here).unwrap().name, "LatOffset");
    }

    #[test]
    fn test_no_stations() {
        assert!(nearest_station(&[], &Coord::new(0.0, 0.0)).is_none());
    }

    #[test]
    fn test_shorten_address() {
        assert_eq!(
            shorten_address("12 Main Rd,Thane West,Thane,Maharashtra,India"),
            "12 Main Rd,Thane West,Thane"
        );
        assert_eq!(shorten_address("Somewhere"), "Somewhere");
    }

    #[test]
    fn test_lookup_throttle() {
        let start = Instant::now();
        let mut geo = resolver();
        let here = Coord::new(19.2, 73.0);

        assert!(geo.update(here, start).lookup.is_some());
        assert!(geo.update(here, start + Duration::from_secs(3)).lookup.is_none());
        assert!(geo
            .update(here, start + Duration::from_millis(9_999))
            .lookup
            .is_none());
        assert!(geo.update(here, start + Duration::from_secs(10)).lookup.is_some());
        assert!(geo.update(here, start + Duration::from_secs(15)).lookup.is_none());
    }

    #[test]
    fn test_address_reused_inside_window() {
        let start = Instant::now();
        let mut geo = resolver();
        let here = Coord::new(19.2, 73.0);

        assert_eq!(geo.update(here, start).address, AddressState::Pending);
        assert_eq!(
            geo.apply_lookup(Ok("Thane West".to_string())),
            Some("Thane West".to_string())
        );
        let update = geo.update(Coord::new(19.3, 73.1), start + Duration::from_secs(2));
        assert_eq!(update.address, AddressState::Resolved("Thane West".to_string()));
    }

    #[test]
    fn test_first_failure_falls_back_to_placeholder() {
        let mut geo = resolver();
        let changed = geo.apply_lookup(Err(LookupError::LookupFailed("offline".into())));
        assert_eq!(changed.as_deref(), Some(ADDRESS_UNAVAILABLE));
        assert_eq!(geo.address().display(), ADDRESS_UNAVAILABLE);
    }

    #[test]
    fn test_later_failure_keeps_previous() {
        let mut geo = resolver();
        geo.apply_lookup(Ok("Dombivali East".to_string()));
        assert!(geo
            .apply_lookup(Err(LookupError::LookupFailed("timeout".into())))
            .is_none());
        assert_eq!(geo.address().display(), "Dombivali East");
    }

    proptest! {
        #[test]
        fn property_nearest_is_minimal_and_first(
            stations in proptest::collection::vec((-5i32..5, -5i32..5), 1..8),
            lat in -5i32..5,
            lng in -5i32..5,
        ) {
            let stations: Vec<Station> = stations
                .iter()
                .enumerate()
                .map(|(i, (a, b))| Station::new(format!("S{}", i), *a as f64, *b as f64))
                .collect();
            let here = Coord::new(lat as f64, lng as f64);

            let chosen = nearest_station(&stations, &here).unwrap();
            let chosen_index = stations.iter().position(|s| s.name == chosen.name).unwrap();
            let chosen_distance = chosen.coord().planar_distance(&here);

            for (i, station) in stations.iter().enumerate() {
                let d = station.coord().planar_distance(&here);
                prop_assert!(d >= chosen_distance);
                if i < chosen_index {
                    prop_assert!(d > chosen_distance);
                }
            }
        }
    }
}
