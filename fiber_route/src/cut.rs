// Cut-point resolution: maps a reported along-route cut distance onto the route
// geometry and classifies every leg as lying before (intact) or after (affected)
// the break.

use serde::{Deserialize, Serialize};

use crate::{Coordinate, Route, DISTANCE_EPS_M};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SegmentState {
    Intact,
    Affected,
}

impl SegmentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SegmentState::Intact => "intact",
            SegmentState::Affected => "affected",
        }
    }
}

/// Straight chord between two points of the route, tagged with its cut state.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Segment {
    pub from: Coordinate,
    pub to: Coordinate,
    pub state: SegmentState,
    /// Index of the route leg (waypoint `leg` to `leg + 1`) this segment lies on.
    pub leg: usize,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CutPosition {
    /// Strictly inside leg `leg`, `ratio` of the way from its start.
    WithinSegment { leg: usize, ratio: f64 },
    /// Exactly on waypoint `index`.
    AtWaypoint { index: usize },
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CutEvent {
    pub distance: f64,
    pub coordinate: Coordinate,
    pub position: CutPosition,
}

impl CutEvent {
    /// The interpolated marker position, present only for cuts inside a leg.
    pub fn marker(&self) -> Option<Coordinate> {
        match self.position {
            CutPosition::WithinSegment { .. } => Some(self.coordinate),
            CutPosition::AtWaypoint { .. } => None,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct CutResolution {
    pub segments: Vec<Segment>,
    pub cut: Option<CutEvent>,
}

impl CutResolution {
    pub fn intact(&self) -> impl Iterator<Item = &Segment> {
        self.segments
            .iter()
            .filter(|s| s.state == SegmentState::Intact)
    }

    pub fn affected(&self) -> impl Iterator<Item = &Segment> {
        self.segments
            .iter()
            .filter(|s| s.state == SegmentState::Affected)
    }
}

/// Resolve a reported cut against `route`.
///
/// `cut` is `None` when no cut is reported, in which case every leg is intact.
/// `Some(d)` requires `0 <= d <= route.total_length()`; values outside that
/// range are a caller bug and are not clamped (use
/// [`Route::check_cut_distance`] first). A cut at `0` marks the whole route
/// affected, a cut at `total_length` leaves it intact.
pub fn resolve_cut(route: &Route, cut: Option<f64>) -> CutResolution {
    let Some(d) = cut else {
        let segments = route
            .legs()
            .enumerate()
            .map(|(leg, (a, b))| Segment {
                from: a.coordinate(),
                to: b.coordinate(),
                state: SegmentState::Intact,
                leg,
            })
            .collect();
        return CutResolution {
            segments,
            cut: None,
        };
    };
    debug_assert!(
        route.check_cut_distance(d).is_ok(),
        "cut distance {} outside [0, {}]",
        d,
        route.total_length()
    );

    let mut segments = Vec::with_capacity(route.len());
    let mut event: Option<CutEvent> = None;

    for (leg, (start, end)) in route.legs().enumerate() {
        let d_start = start.cumulative_distance();
        let d_end = end.cumulative_distance();
        let from = start.coordinate();
        let to = end.coordinate();

        if d_start < d && d < d_end {
            let ratio = (d - d_start) / (d_end - d_start);
            let point = from.lerp(to, ratio);
            segments.push(Segment {
                from,
                to: point,
                state: SegmentState::Intact,
                leg,
            });
            segments.push(Segment {
                from: point,
                to,
                state: SegmentState::Affected,
                leg,
            });
            event = Some(CutEvent {
                distance: d,
                coordinate: point,
                position: CutPosition::WithinSegment { leg, ratio },
            });
            continue;
        }

        let state = if d_end > d_start {
            if d_end <= d {
                SegmentState::Intact
            } else {
                SegmentState::Affected
            }
        } else {
            // Zero-length leg: compare the cut to its single position.
            zero_length_state(d_start, d)
        };
        segments.push(Segment {
            from,
            to,
            state,
            leg,
        });
    }

    if event.is_none() {
        event = route
            .waypoints()
            .iter()
            .position(|w| (w.cumulative_distance() - d).abs() <= DISTANCE_EPS_M)
            .map(|index| CutEvent {
                distance: d,
                coordinate: route.waypoints()[index].coordinate(),
                position: CutPosition::AtWaypoint { index },
            });
    }

    CutResolution {
        segments,
        cut: event,
    }
}

fn zero_length_state(at: f64, d: f64) -> SegmentState {
    if at < d {
        SegmentState::Intact
    } else if at > d || d == 0.0 {
        SegmentState::Affected
    } else {
        SegmentState::Intact
    }
}
