//! Containment tests for geofence shapes.
//!
//! Pure functions. Degenerate shapes (polygon with fewer than 3 vertices,
//! non-positive radius, non-finite coordinates) never contain anything.

use crate::models::{GeoPoint, Geofence, GeofenceShape};

/// Mean Earth radius (IUGG), meters.
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Great-circle distance in meters.
pub fn haversine_m(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let dlat = (b.latitude - a.latitude).to_radians();
    let dlon = (b.longitude - a.longitude).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().min(1.0).asin()
}

/// Even-odd ray casting over the vertices in stored order, last vertex
/// implicitly joined to the first. Longitude is x, latitude is y.
pub fn polygon_contains(vertices: &[GeoPoint], point: GeoPoint) -> bool {
    if vertices.len() < 3 || !point.is_finite() || vertices.iter().any(|v| !v.is_finite()) {
        return false;
    }

    let (x, y) = (point.longitude, point.latitude);
    let mut inside = false;
    let mut j = vertices.len() - 1;

    for i in 0..vertices.len() {
        let (xi, yi) = (vertices[i].longitude, vertices[i].latitude);
        let (xj, yj) = (vertices[j].longitude, vertices[j].latitude);

        if (yi > y) != (yj > y) {
            let x_cross = (xj - xi) * (y - yi) / (yj - yi) + xi;
            if x < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }

    inside
}

pub fn circle_contains(center: GeoPoint, radius_meters: f64, point: GeoPoint) -> bool {
    if !(radius_meters.is_finite() && radius_meters > 0.0) {
        return false;
    }
    if !center.is_finite() || !point.is_finite() {
        return false;
    }
    haversine_m(center, point) <= radius_meters
}

pub fn contains(geofence: &Geofence, point: GeoPoint) -> bool {
    match &geofence.shape {
        GeofenceShape::Polygon { vertices } => polygon_contains(vertices, point),
        GeofenceShape::Circle {
            center,
            radius_meters,
        } => circle_contains(*center, *radius_meters, point),
    }
}

/// Distance from the geofence's reference center, used to rank overlaps.
pub fn distance_to_center(geofence: &Geofence, point: GeoPoint) -> f64 {
    let d = haversine_m(geofence.center(), point);
    if d.is_nan() { f64::INFINITY } else { d }
}

/// Among the geofences containing `point`, the one whose center is nearest;
/// ties go to the lowest id.
pub fn best_match(geofences: &[Geofence], point: GeoPoint) -> Option<&Geofence> {
    geofences
        .iter()
        .filter(|g| g.is_active && contains(g, point))
        .map(|g| (distance_to_center(g, point), g))
        .min_by(|(da, a), (db, b)| da.total_cmp(db).then(a.id.cmp(&b.id)))
        .map(|(_, g)| g)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn office_triangle() -> Vec<GeoPoint> {
        vec![
            GeoPoint::new(1.2990, 103.7990),
            GeoPoint::new(1.2990, 103.8010),
            GeoPoint::new(1.3010, 103.8000),
        ]
    }

    #[test]
    fn polygon_inside_and_far_outside() {
        let tri = office_triangle();
        assert!(polygon_contains(&tri, GeoPoint::new(1.2995, 103.8000)));
        assert!(!polygon_contains(&tri, GeoPoint::new(1.40, 103.90)));
        assert!(!polygon_contains(&tri, GeoPoint::new(-1.30, -103.80)));
    }

    #[test]
    fn polygon_concave_notch_is_outside() {
        // U shape opening north; the notch is outside
        let u = vec![
            GeoPoint::new(0.0, 0.0),
            GeoPoint::new(0.0, 3.0),
            GeoPoint::new(3.0, 3.0),
            GeoPoint::new(3.0, 2.0),
            GeoPoint::new(1.0, 2.0),
            GeoPoint::new(1.0, 1.0),
            GeoPoint::new(3.0, 1.0),
            GeoPoint::new(3.0, 0.0),
        ];
        assert!(polygon_contains(&u, GeoPoint::new(0.5, 1.5)));
        assert!(!polygon_contains(&u, GeoPoint::new(2.0, 1.5)));
        assert!(polygon_contains(&u, GeoPoint::new(2.0, 0.5)));
    }

    #[test]
    fn degenerate_shapes_contain_nothing() {
        let two = vec![GeoPoint::new(0.0, 0.0), GeoPoint::new(1.0, 1.0)];
        assert!(!polygon_contains(&two, GeoPoint::new(0.5, 0.5)));
        assert!(!polygon_contains(&[], GeoPoint::new(0.0, 0.0)));

        let c = GeoPoint::new(1.30, 103.80);
        assert!(!circle_contains(c, 0.0, c));
        assert!(!circle_contains(c, -5.0, c));
        assert!(!circle_contains(c, f64::NAN, c));
    }

    #[test]
    fn circle_boundary_with_epsilon() {
        let center = GeoPoint::new(1.30, 103.80);
        let radius = 200.0;
        // move due north; 1 degree of latitude on this sphere
        let meters_per_deg = EARTH_RADIUS_M * std::f64::consts::PI / 180.0;
        let eps = 0.5;

        let just_inside = GeoPoint::new(1.30 + (radius - eps) / meters_per_deg, 103.80);
        let just_outside = GeoPoint::new(1.30 + (radius + eps) / meters_per_deg, 103.80);

        assert!(circle_contains(center, radius, just_inside));
        assert!(!circle_contains(center, radius, just_outside));
    }

    #[test]
    fn haversine_known_distance() {
        // one degree of longitude on the equator
        let d = haversine_m(GeoPoint::new(0.0, 0.0), GeoPoint::new(0.0, 1.0));
        assert!((d - 111_195.0).abs() < 10.0, "got {d}");
    }

    #[test]
    fn overlapping_geofences_prefer_nearest_center_then_lowest_id() {
        let p = GeoPoint::new(1.3000, 103.8000);
        let far = Geofence::circle(1, "Campus", GeoPoint::new(1.3010, 103.8000), 500.0);
        let near = Geofence::circle(2, "Lab", GeoPoint::new(1.3001, 103.8000), 100.0);
        let all = vec![far.clone(), near.clone()];
        assert_eq!(best_match(&all, p).map(|g| g.id), Some(2));

        let twin_a = Geofence::circle(9, "A", GeoPoint::new(1.3001, 103.8000), 100.0);
        let twin_b = Geofence::circle(4, "B", GeoPoint::new(1.3001, 103.8000), 100.0);
        assert_eq!(best_match(&[twin_a, twin_b], p).map(|g| g.id), Some(4));
    }
}
