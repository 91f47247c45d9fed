//! Route distance and fiber-cut model for fiber-optic network routes.
//!
//! A [`Route`] is an ordered list of labeled GPS waypoints from a headend to a
//! terminus. Construction derives the cumulative great-circle distance of every
//! waypoint; [`cut::resolve_cut`] turns a reported cut distance into an
//! interpolated position and a bipartition of the route into intact and
//! affected segments.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod cache;
pub mod cut;
pub mod report;
pub mod source;

pub use cache::RouteCache;
pub use cut::{resolve_cut, CutEvent, CutPosition, CutResolution, Segment, SegmentState};
pub use report::{build_report, report_for_cut, ReportParams, RouteReport};
pub use source::{parse_routes, select_route, RouteSpec, WaypointSpec};

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Distances closer than this are treated as the same point along a route.
pub const DISTANCE_EPS_M: f64 = 1e-9;

#[derive(Error, Debug)]
pub enum RouteError {
    #[error("route has no waypoints")]
    EmptyRoute,
    #[error("unsupported route format: {0}")]
    UnsupportedFormat(String),
    #[error("failed to parse JSON route: {0}")]
    JsonParse(String),
    #[error("failed to parse CSV route: {0}")]
    CsvParse(String),
    #[error("failed to parse GPX route: {0}")]
    GpxParse(String),
    #[error("invalid coordinate for '{label}': ({lat}, {lon})")]
    InvalidCoordinate { label: String, lat: f64, lon: f64 },
    #[error("cut distance {distance} m outside route length [0, {total_length}] m")]
    CutOutOfRange { distance: f64, total_length: f64 },
    #[error("route not found: {0}")]
    RouteNotFound(String),
}

/// A WGS84 position in decimal degrees, treated as a point on a sphere.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Whether the pair is finite and inside the geographic range.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }

    /// Planar interpolation on the lat/lon pair, not along the geodesic.
    pub fn lerp(self, other: Coordinate, ratio: f64) -> Coordinate {
        Coordinate {
            lat: self.lat + ratio * (other.lat - self.lat),
            lon: self.lon + ratio * (other.lon - self.lon),
        }
    }
}

/// Great-circle surface distance in meters (haversine, mean Earth radius).
pub fn haversine_distance(a: Coordinate, b: Coordinate) -> f64 {
    let to_rad = |deg: f64| deg.to_radians();
    let dlat = to_rad(b.lat - a.lat);
    let dlon = to_rad(b.lon - a.lon);
    let h = (dlat / 2.0).sin().powi(2)
        + to_rad(a.lat).cos() * to_rad(b.lat).cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_M * c
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct Waypoint {
    label: String,
    coordinate: Coordinate,
    cumulative_distance: f64,
}

impl Waypoint {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn coordinate(&self) -> Coordinate {
        self.coordinate
    }

    /// Along-route distance from the origin in meters.
    pub fn cumulative_distance(&self) -> f64 {
        self.cumulative_distance
    }
}

/// Ordered, immutable polyline of waypoints with derived along-route distances.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct Route {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    color: Option<[u8; 3]>,
    waypoints: Vec<Waypoint>,
}

impl Route {
    /// Build a route from ordered `(label, coordinate)` pairs.
    ///
    /// Coordinates are not validated here; see [`RouteSpec::build`] for the
    /// checked path used by the input sources.
    pub fn new<S: Into<String>>(
        name: impl Into<String>,
        points: impl IntoIterator<Item = (S, Coordinate)>,
    ) -> Result<Self, RouteError> {
        let mut waypoints: Vec<Waypoint> = Vec::new();
        let mut cumulative = 0.0;
        for (label, coordinate) in points {
            if let Some(prev) = waypoints.last() {
                cumulative += haversine_distance(prev.coordinate, coordinate);
            }
            waypoints.push(Waypoint {
                label: label.into(),
                coordinate,
                cumulative_distance: cumulative,
            });
        }
        if waypoints.is_empty() {
            return Err(RouteError::EmptyRoute);
        }
        Ok(Self {
            name: name.into(),
            color: None,
            waypoints,
        })
    }

    /// Attach an RGB rendering hint for map front ends.
    pub fn with_color(mut self, color: Option<[u8; 3]>) -> Self {
        self.color = color;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn color(&self) -> Option<[u8; 3]> {
        self.color
    }

    pub fn waypoints(&self) -> &[Waypoint] {
        &self.waypoints
    }

    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    /// Always false; construction rejects empty input.
    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }

    /// Total along-route length in meters (0 for a single waypoint).
    pub fn total_length(&self) -> f64 {
        self.waypoints
            .last()
            .map(|w| w.cumulative_distance)
            .unwrap_or(0.0)
    }

    /// Consecutive waypoint pairs, one per leg of the route.
    pub fn legs(&self) -> impl Iterator<Item = (&Waypoint, &Waypoint)> {
        self.waypoints.windows(2).map(|w| (&w[0], &w[1]))
    }

    /// Caller-side check of the cut contract `0 <= distance <= total_length`.
    pub fn check_cut_distance(&self, distance: f64) -> Result<(), RouteError> {
        let total_length = self.total_length();
        if distance.is_finite() && (0.0..=total_length).contains(&distance) {
            Ok(())
        } else {
            Err(RouteError::CutOutOfRange {
                distance,
                total_length,
            })
        }
    }
}
