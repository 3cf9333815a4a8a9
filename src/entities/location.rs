use geo_types::{Geometry, Point};
use serde::{Deserialize, Serialize};

use crate::error::{invalid_input_error, Error};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    pub fn validate(&self) -> Result<(), Error> {
        let lat_ok = (-90.0..=90.0).contains(&self.lat);
        let lng_ok = (-180.0..=180.0).contains(&self.lng);

        if !lat_ok || !lng_ok {
            return Err(invalid_input_error());
        }

        Ok(())
    }
}

impl From<Coordinates> for Geometry<f64> {
    fn from(coordinates: Coordinates) -> Self {
        // WKB points are (x, y), i.e. longitude first
        Geometry::Point(Point::new(coordinates.lng, coordinates.lat))
    }
}

#[test]
fn coordinates_bounds() {
    assert!(Coordinates { lat: 6.5, lng: 3.4 }.validate().is_ok());
    assert!(Coordinates { lat: 91.0, lng: 0.0 }.validate().is_err());
    assert!(Coordinates { lat: 0.0, lng: -181.0 }.validate().is_err());
}

#[test]
fn coordinates_into_point_is_lng_lat() {
    let geometry: Geometry<f64> = Coordinates { lat: 1.0, lng: 2.0 }.into();

    match geometry {
        Geometry::Point(point) => {
            assert_eq!(point.x(), 2.0);
            assert_eq!(point.y(), 1.0);
        }
        _ => panic!("expected a point"),
    }
}
