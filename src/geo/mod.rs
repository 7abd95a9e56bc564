use crate::models::position::GeoPoint;

const EARTH_RADIUS_KM: f64 = 6_371.0;

pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lng = (b.lng - a.lng).to_radians();

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lng = (delta_lng / 2.0).sin();

    let haversine = sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lng * sin_lng;
    let central_angle = 2.0 * haversine.min(1.0).sqrt().asin();

    EARTH_RADIUS_KM * central_angle
}

/// Ray casting over (lng, lat) treated as planar coordinates.
/// The ring is implicitly closed; fewer than three vertices never contain anything.
pub fn point_in_polygon(point: &GeoPoint, vertices: &[GeoPoint]) -> bool {
    if vertices.len() < 3 {
        return false;
    }

    let (x, y) = (point.lng, point.lat);
    let mut inside = false;
    let mut j = vertices.len() - 1;

    for i in 0..vertices.len() {
        let (xi, yi) = (vertices[i].lng, vertices[i].lat);
        let (xj, yj) = (vertices[j].lng, vertices[j].lat);

        if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }

    inside
}

#[cfg(test)]
mod tests {
    use super::{haversine_km, point_in_polygon};
    use crate::models::position::GeoPoint;

    fn p(lat: f64, lng: f64) -> GeoPoint {
        GeoPoint::new(lat, lng)
    }

    #[test]
    fn zero_distance_for_same_point() {
        let a = p(53.5511, 9.9937);
        let distance = haversine_km(&a, &a);
        assert!(distance < 1e-9);
    }

    #[test]
    fn london_to_paris_is_around_343_km() {
        let london = p(51.5074, -0.1278);
        let paris = p(48.8566, 2.3522);
        let distance = haversine_km(&london, &paris);
        assert!((distance - 343.0).abs() < 5.0);
    }

    #[test]
    fn distance_is_symmetric() {
        let a = p(40.0, -3.0);
        let b = p(40.1, -3.1);
        assert!((haversine_km(&a, &b) - haversine_km(&b, &a)).abs() < 1e-9);
    }

    #[test]
    fn triangle_inequality_holds() {
        let a = p(40.0, -3.0);
        let b = p(41.3, 2.1);
        let c = p(38.7, -9.1);
        let ab = haversine_km(&a, &b);
        let bc = haversine_km(&b, &c);
        let ac = haversine_km(&a, &c);
        assert!(ac <= ab + bc + 1e-9);
        assert!(ab <= ac + bc + 1e-9);
        assert!(bc <= ab + ac + 1e-9);
    }

    #[test]
    fn square_contains_center_but_not_outside_point() {
        let square = vec![p(0.0, 0.0), p(0.0, 1.0), p(1.0, 1.0), p(1.0, 0.0)];
        assert!(point_in_polygon(&p(0.5, 0.5), &square));
        assert!(!point_in_polygon(&p(1.5, 0.5), &square));
        assert!(!point_in_polygon(&p(0.5, -0.1), &square));
    }

    #[test]
    fn concave_polygon_excludes_notch() {
        // U shape opening north; the notch spans lng 1..2, lat 1..3.
        let u_shape = vec![
            p(0.0, 0.0),
            p(0.0, 3.0),
            p(3.0, 3.0),
            p(3.0, 2.0),
            p(1.0, 2.0),
            p(1.0, 1.0),
            p(3.0, 1.0),
            p(3.0, 0.0),
        ];
        assert!(point_in_polygon(&p(2.0, 0.5), &u_shape));
        assert!(!point_in_polygon(&p(2.0, 1.5), &u_shape));
    }

    #[test]
    fn degenerate_polygon_contains_nothing() {
        let line = vec![p(0.0, 0.0), p(1.0, 1.0)];
        assert!(!point_in_polygon(&p(0.5, 0.5), &line));
    }
}
