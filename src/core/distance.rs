use crate::models::{BoundingBox, GeoPoint};

/// Earth's radius in kilometers
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Kilometers per degree of latitude
const KM_PER_DEGREE: f64 = 111.0;

/// Calculate the Haversine distance between two points in kilometers
///
/// # Arguments
/// * `lat1` - Latitude of first point in degrees
/// * `lon1` - Longitude of first point in degrees
/// * `lat2` - Latitude of second point in degrees
/// * `lon2` - Longitude of second point in degrees
#[inline]
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lon = (lon2 - lon1).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().min(1.0).asin();

    EARTH_RADIUS_KM * c
}

impl GeoPoint {
    /// Great-circle distance to another point in kilometers
    #[inline]
    pub fn distance_km(&self, other: &GeoPoint) -> f64 {
        haversine_distance(self.lat, self.lon, other.lat, other.lon)
    }
}

impl BoundingBox {
    /// Box enclosing every point within `radius_km` of `center`
    ///
    /// Much cheaper than Haversine, so it runs first. When the box would
    /// cross the antimeridian or a pole the longitude check is disabled
    /// instead of wrapping, which keeps the box a superset of the circle.
    pub fn around(center: GeoPoint, radius_km: f64) -> Self {
        let lat_delta = radius_km / KM_PER_DEGREE;
        let lon_scale = KM_PER_DEGREE * center.lat.to_radians().cos().abs();

        let (min_lon, max_lon) = if lon_scale <= f64::EPSILON {
            (f64::NEG_INFINITY, f64::INFINITY)
        } else {
            let lon_delta = radius_km / lon_scale;
            let (min, max) = (center.lon - lon_delta, center.lon + lon_delta);
            if min < -180.0 || max > 180.0 || center.lat.abs() + lat_delta >= 90.0 {
                (f64::NEG_INFINITY, f64::INFINITY)
            } else {
                (min, max)
            }
        };

        BoundingBox {
            min_lat: center.lat - lat_delta,
            max_lat: center.lat + lat_delta,
            min_lon,
            max_lon,
        }
    }

    #[inline]
    pub fn contains(&self, point: &GeoPoint) -> bool {
        point.lat >= self.min_lat
            && point.lat <= self.max_lat
            && point.lon >= self.min_lon
            && point.lon <= self.max_lon
    }
}
