use crate::errors::{AppError, AppResult};
use serde::{Deserialize, Serialize};

pub type GeofenceId = i64;

/// A WGS84 position. Wire formats carry points as `[lon, lat]` pairs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    pub fn from_lon_lat(pair: [f64; 2]) -> Self {
        Self::new(pair[1], pair[0])
    }

    pub fn to_lon_lat(self) -> [f64; 2] {
        [self.longitude, self.latitude]
    }

    pub fn is_finite(&self) -> bool {
        self.latitude.is_finite() && self.longitude.is_finite()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GeofenceShape {
    Polygon { vertices: Vec<GeoPoint> },
    Circle { center: GeoPoint, radius_meters: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Geofence {
    pub id: GeofenceId,
    pub name: String,
    pub shape: GeofenceShape,
    pub is_active: bool,
}

impl Geofence {
    pub fn polygon(id: GeofenceId, name: &str, vertices: Vec<GeoPoint>) -> Self {
        Self {
            id,
            name: name.to_string(),
            shape: GeofenceShape::Polygon { vertices },
            is_active: true,
        }
    }

    pub fn circle(id: GeofenceId, name: &str, center: GeoPoint, radius_meters: f64) -> Self {
        Self {
            id,
            name: name.to_string(),
            shape: GeofenceShape::Circle {
                center,
                radius_meters,
            },
            is_active: true,
        }
    }

    pub fn kind_str(&self) -> &'static str {
        match self.shape {
            GeofenceShape::Polygon { .. } => "Polygon",
            GeofenceShape::Circle { .. } => "Circle",
        }
    }

    /// Reference point used to rank overlapping geofences.
    /// Circles use their center, polygons the mean of their vertices.
    pub fn center(&self) -> GeoPoint {
        match &self.shape {
            GeofenceShape::Circle { center, .. } => *center,
            GeofenceShape::Polygon { vertices } => {
                if vertices.is_empty() {
                    return GeoPoint::new(f64::NAN, f64::NAN);
                }
                let n = vertices.len() as f64;
                let lat = vertices.iter().map(|v| v.latitude).sum::<f64>() / n;
                let lon = vertices.iter().map(|v| v.longitude).sum::<f64>() / n;
                GeoPoint::new(lat, lon)
            }
        }
    }

    /// Polygon: at least 3 distinct finite vertices. Circle: finite center, radius > 0.
    pub fn validate(&self) -> AppResult<()> {
        let invalid = |reason: &str| AppError::GeometryInputInvalid {
            id: self.id,
            reason: reason.to_string(),
        };

        match &self.shape {
            GeofenceShape::Polygon { vertices } => {
                if vertices.iter().any(|v| !v.is_finite()) {
                    return Err(invalid("polygon has non-finite coordinates"));
                }
                let mut distinct: Vec<&GeoPoint> = Vec::new();
                for v in vertices {
                    if !distinct.contains(&v) {
                        distinct.push(v);
                    }
                }
                if distinct.len() < 3 {
                    return Err(invalid("polygon needs at least 3 distinct vertices"));
                }
            }
            GeofenceShape::Circle {
                center,
                radius_meters,
            } => {
                if !center.is_finite() {
                    return Err(invalid("circle center is not finite"));
                }
                if !(radius_meters.is_finite() && *radius_meters > 0.0) {
                    return Err(invalid("circle radius must be > 0"));
                }
            }
        }
        Ok(())
    }
}

/// Geofence as exchanged with `GET /api/locations/geofences`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeofenceRecord {
    pub id: GeofenceId,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Vec<[f64; 2]>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub center: Option<[f64; 2]>,
    #[serde(default, alias = "radiusMeters", skip_serializing_if = "Option::is_none")]
    pub radius: Option<f64>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl TryFrom<GeofenceRecord> for Geofence {
    type Error = AppError;

    fn try_from(rec: GeofenceRecord) -> AppResult<Self> {
        let shape = match rec.kind.to_lowercase().as_str() {
            "polygon" => {
                let mut vertices: Vec<GeoPoint> = rec
                    .coordinates
                    .unwrap_or_default()
                    .into_iter()
                    .map(GeoPoint::from_lon_lat)
                    .collect();
                // closed rings repeat the first vertex at the end
                if vertices.len() > 1 && vertices.first() == vertices.last() {
                    vertices.pop();
                }
                GeofenceShape::Polygon { vertices }
            }
            "circle" => {
                let center = rec.center.ok_or_else(|| AppError::GeometryInputInvalid {
                    id: rec.id,
                    reason: "circle without center".into(),
                })?;
                GeofenceShape::Circle {
                    center: GeoPoint::from_lon_lat(center),
                    radius_meters: rec.radius.unwrap_or(0.0),
                }
            }
            other => {
                return Err(AppError::GeometryInputInvalid {
                    id: rec.id,
                    reason: format!("unknown geofence type '{}'", other),
                });
            }
        };

        let geofence = Geofence {
            id: rec.id,
            name: rec.name,
            shape,
            is_active: rec.is_active,
        };
        geofence.validate()?;
        Ok(geofence)
    }
}

impl From<&Geofence> for GeofenceRecord {
    fn from(g: &Geofence) -> Self {
        match &g.shape {
            GeofenceShape::Polygon { vertices } => GeofenceRecord {
                id: g.id,
                name: g.name.clone(),
                kind: "Polygon".into(),
                coordinates: Some(vertices.iter().map(|v| v.to_lon_lat()).collect()),
                center: None,
                radius: None,
                is_active: g.is_active,
            },
            GeofenceShape::Circle {
                center,
                radius_meters,
            } => GeofenceRecord {
                id: g.id,
                name: g.name.clone(),
                kind: "Circle".into(),
                coordinates: None,
                center: Some(center.to_lon_lat()),
                radius: Some(*radius_meters),
                is_active: g.is_active,
            },
        }
    }
}
