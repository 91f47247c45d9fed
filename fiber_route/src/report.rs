// Serializable view of a route and its resolved cut, consumed by map/table
// front ends.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cut::{resolve_cut, CutPosition, Segment};
use crate::{Route, RouteError};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ReportParams {
    /// Reported cut distance in meters; `None` when no cut is active.
    pub cut_distance: Option<f64>,
    /// Clamp the cut distance into `[0, total_length]` instead of rejecting it.
    pub clamp_cut: bool,
}

impl ReportParams {
    /// The cut distance handed to [`resolve_cut`] after enforcing its range contract.
    pub fn effective_cut(&self, route: &Route) -> Result<Option<f64>, RouteError> {
        let Some(distance) = self.cut_distance else {
            return Ok(None);
        };
        if self.clamp_cut && !distance.is_nan() {
            return Ok(Some(distance.clamp(0.0, route.total_length())));
        }
        route.check_cut_distance(distance)?;
        Ok(Some(distance))
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct WaypointRow {
    pub label: String,
    pub lat: f64,
    pub lon: f64,
    pub cumulative_distance: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CutMarker {
    pub lat: f64,
    pub lon: f64,
    pub distance: f64,
}

/// Full description of a cut, including the closures on either side of it.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CutDetail {
    pub distance: f64,
    pub lat: f64,
    pub lon: f64,
    pub position: CutPosition,
    pub from_label: String,
    pub to_label: String,
    /// Distance past `from_label` along the route.
    pub offset_from_previous: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RouteReport {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<[u8; 3]>,
    pub fingerprint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<DateTime<Utc>>,
    pub total_length: f64,
    pub intact_length: f64,
    pub affected_length: f64,
    pub waypoints: Vec<WaypointRow>,
    pub segments: Vec<Segment>,
    pub cut_marker: Option<CutMarker>,
    pub cut: Option<CutDetail>,
}

/// Resolve `params` against `route` and assemble the serializable report.
pub fn build_report(route: &Route, params: &ReportParams) -> Result<RouteReport, RouteError> {
    let cut_distance = params.effective_cut(route)?;
    Ok(report_for_cut(route, cut_distance))
}

/// Assemble the report for a cut that already passed [`ReportParams::effective_cut`].
pub fn report_for_cut(route: &Route, cut_distance: Option<f64>) -> RouteReport {
    let resolution = resolve_cut(route, cut_distance);
    let total_length = route.total_length();
    let wps = route.waypoints();

    let waypoints = wps
        .iter()
        .map(|w| WaypointRow {
            label: w.label().to_string(),
            lat: w.coordinate().lat,
            lon: w.coordinate().lon,
            cumulative_distance: w.cumulative_distance(),
        })
        .collect();

    let cut_marker = resolution.cut.as_ref().and_then(|event| {
        event.marker().map(|point| CutMarker {
            lat: point.lat,
            lon: point.lon,
            distance: event.distance,
        })
    });

    let cut = resolution.cut.as_ref().map(|event| {
        let (before, after) = match event.position {
            CutPosition::WithinSegment { leg, .. } => (leg, leg + 1),
            CutPosition::AtWaypoint { index } => (index, index),
        };
        CutDetail {
            distance: event.distance,
            lat: event.coordinate.lat,
            lon: event.coordinate.lon,
            position: event.position,
            from_label: wps[before].label().to_string(),
            to_label: wps[after].label().to_string(),
            offset_from_previous: event.distance - wps[before].cumulative_distance(),
        }
    });

    let intact_length = cut_distance.unwrap_or(total_length);
    RouteReport {
        name: route.name().to_string(),
        color: route.color(),
        fingerprint: route.fingerprint(),
        generated_at: None,
        total_length,
        intact_length,
        affected_length: total_length - intact_length,
        waypoints,
        segments: resolution.segments,
        cut_marker,
        cut,
    }
}
