//! Great-circle helpers for the "tours within" and "distances" queries.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Mean earth radius in metres used for distance output.
const EARTH_RADIUS_M: f64 = 6_378_100.0;

/// Distance unit accepted in the URL (`/unit/mi`, `/unit/km`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    Mi,
    Km,
}

impl Unit {
    /// Earth radius expressed in this unit.
    pub fn earth_radius(self) -> f64 {
        match self {
            Self::Mi => 3963.2,
            Self::Km => 6378.1,
        }
    }

    /// Factor converting metres into this unit.
    pub fn multiplier(self) -> f64 {
        match self {
            Self::Mi => 0.000621371,
            Self::Km => 0.001,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mi => "mi",
            Self::Km => "km",
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Unit {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mi" => Ok(Self::Mi),
            "km" => Ok(Self::Km),
            other => Err(ValidationError::InvalidVariant {
                field: "unit",
                value: other.to_owned(),
                allowed: "mi, km",
            }),
        }
    }
}

/// A latitude/longitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lng: f64) -> Result<Self, ValidationError> {
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
            return Err(Self::invalid(&lat.to_string(), &lng.to_string()));
        }
        Ok(Self { lat, lng })
    }

    /// Parse the `lat,lng` path segment.
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        let (lat, lng) = s.split_once(',').unwrap_or((s, ""));
        let (lat, lng) = (lat.trim(), lng.trim());
        match (lat.parse::<f64>(), lng.parse::<f64>()) {
            (Ok(la), Ok(lo)) if la.is_finite() && lo.is_finite() => {
                Self::new(la, lo).map_err(|_| Self::invalid(lat, lng))
            }
            _ => Err(Self::invalid(lat, lng)),
        }
    }

    fn invalid(lat: &str, lng: &str) -> ValidationError {
        ValidationError::custom(format!(
            "latitude \"{}\" or longitude \"{}\" are invalid",
            lat, lng
        ))
    }
}

/// Central angle in radians between two points (haversine).
pub fn central_angle(a: Coordinates, b: Coordinates) -> f64 {
    let (phi1, phi2) = (a.lat.to_radians(), b.lat.to_radians());
    let d_phi = (b.lat - a.lat).to_radians();
    let d_lambda = (b.lng - a.lng).to_radians();

    let h = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    2.0 * h.sqrt().min(1.0).asin()
}

/// Whether `point` lies inside the spherical cap of `distance` around `center`.
pub fn within(center: Coordinates, point: Coordinates, distance: f64, unit: Unit) -> bool {
    let radius = distance / unit.earth_radius();
    central_angle(center, point) <= radius
}

/// Distance between two points expressed in `unit`.
pub fn distance(center: Coordinates, point: Coordinates, unit: Unit) -> f64 {
    central_angle(center, point) * EARTH_RADIUS_M * unit.multiplier()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn los_angeles() -> Coordinates {
        Coordinates::new(34.111745, -118.113491).unwrap()
    }

    fn miami() -> Coordinates {
        Coordinates::new(25.774, -80.19).unwrap()
    }

    #[test]
    fn parses_lat_lng() {
        let c = Coordinates::parse("34.111745,-118.113491").unwrap();
        assert_eq!(c.lat, 34.111745);
        assert_eq!(c.lng, -118.113491);
    }

    #[test]
    fn rejects_garbage_coordinates() {
        let err = Coordinates::parse("abc,-118").unwrap_err();
        assert_eq!(err.to_string(), "latitude \"abc\" or longitude \"-118\" are invalid");

        let err = Coordinates::parse("34.1").unwrap_err();
        assert_eq!(err.to_string(), "latitude \"34.1\" or longitude \"\" are invalid");

        assert!(Coordinates::parse("95,10").is_err());
    }

    #[test]
    fn unit_parsing() {
        assert_eq!("mi".parse::<Unit>().unwrap(), Unit::Mi);
        assert_eq!("km".parse::<Unit>().unwrap(), Unit::Km);
        assert!("parsec".parse::<Unit>().is_err());
    }

    #[test]
    fn la_to_miami_distance() {
        let km = distance(los_angeles(), miami(), Unit::Km);
        // Roughly 3760 km between the two cities.
        assert!((3700.0..3800.0).contains(&km), "got {km}");

        let mi = distance(los_angeles(), miami(), Unit::Mi);
        assert!((km * 0.6213 - mi).abs() < 1.0);
    }

    #[test]
    fn within_radius() {
        assert!(within(los_angeles(), miami(), 2400.0, Unit::Mi));
        assert!(!within(los_angeles(), miami(), 200.0, Unit::Mi));
        assert!(within(los_angeles(), los_angeles(), 0.0, Unit::Km));
    }
}
