// Route input sources: JSON catalogs, CSV waypoint tables and GPX files are
// turned into validated route specifications before the model is built.

use std::io::Cursor;

use serde::{Deserialize, Serialize};

use crate::{Coordinate, Route, RouteError};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct WaypointSpec {
    pub label: String,
    pub lat: f64,
    pub lon: f64,
}

/// Ordered waypoint list for one fiber route, as read from an input file.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RouteSpec {
    pub name: String,
    /// RGB rendering hint for the route line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<[u8; 3]>,
    pub waypoints: Vec<WaypointSpec>,
}

impl RouteSpec {
    /// Validate every coordinate and build the route model.
    pub fn build(&self) -> Result<Route, RouteError> {
        let mut points = Vec::with_capacity(self.waypoints.len());
        for wp in &self.waypoints {
            let coordinate = Coordinate::new(wp.lat, wp.lon);
            if !coordinate.is_valid() {
                return Err(RouteError::InvalidCoordinate {
                    label: wp.label.clone(),
                    lat: wp.lat,
                    lon: wp.lon,
                });
            }
            points.push((wp.label.as_str(), coordinate));
        }
        Ok(Route::new(self.name.as_str(), points)?.with_color(self.color))
    }

    /// Stable key over the name, color and ordered `(label, lat, lon)` input.
    pub fn fingerprint(&self) -> String {
        crate::cache::route_fingerprint(
            &self.name,
            self.color,
            self.waypoints
                .iter()
                .map(|wp| (wp.label.as_str(), Coordinate::new(wp.lat, wp.lon))),
        )
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum JsonRoutes {
    Catalog { routes: Vec<RouteSpec> },
    Many(Vec<RouteSpec>),
    One(RouteSpec),
}

/// Parse route specifications from bytes using the provided format hint
/// (extension or bare format name).
///
/// `default_name` names routes whose source carries no name (CSV, unnamed
/// GPX routes and tracks).
pub fn parse_routes(
    input: &[u8],
    format: &str,
    default_name: &str,
) -> Result<Vec<RouteSpec>, RouteError> {
    let format_lc = format.to_ascii_lowercase();
    let is_format = |ext: &str| format_lc == ext || format_lc.ends_with(&format!(".{}", ext));
    if is_format("json") {
        parse_json_routes(input)
    } else if is_format("csv") {
        parse_csv_route(input, default_name).map(|route| vec![route])
    } else if is_format("gpx") {
        parse_gpx_routes(input, default_name)
    } else {
        Err(RouteError::UnsupportedFormat(format.to_string()))
    }
}

fn parse_json_routes(input: &[u8]) -> Result<Vec<RouteSpec>, RouteError> {
    let parsed: JsonRoutes =
        serde_json::from_slice(input).map_err(|e| RouteError::JsonParse(e.to_string()))?;
    Ok(match parsed {
        JsonRoutes::Catalog { routes } => routes,
        JsonRoutes::Many(routes) => routes,
        JsonRoutes::One(route) => vec![route],
    })
}

fn parse_csv_route(input: &[u8], name: &str) -> Result<RouteSpec, RouteError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(input);
    let mut waypoints = Vec::new();
    for row in reader.deserialize::<WaypointSpec>() {
        waypoints.push(row.map_err(|e| RouteError::CsvParse(e.to_string()))?);
    }
    Ok(RouteSpec {
        name: name.to_string(),
        color: None,
        waypoints,
    })
}

fn parse_gpx_routes(input: &[u8], default_name: &str) -> Result<Vec<RouteSpec>, RouteError> {
    let mut cursor = Cursor::new(input);
    let gpx = gpx::read(&mut cursor).map_err(|e| RouteError::GpxParse(e.to_string()))?;

    let mut named: Vec<(Option<String>, Vec<WaypointSpec>)> = Vec::new();
    for route in &gpx.routes {
        named.push((route.name.clone(), gpx_points(&route.points)));
    }
    for track in &gpx.tracks {
        let points: Vec<gpx::Waypoint> = track
            .segments
            .iter()
            .flat_map(|segment| segment.points.iter().cloned())
            .collect();
        named.push((track.name.clone(), gpx_points(&points)));
    }
    if named.is_empty() && !gpx.waypoints.is_empty() {
        named.push((None, gpx_points(&gpx.waypoints)));
    }

    let unnamed = named.iter().filter(|(name, _)| name.is_none()).count();
    let mut counter = 0;
    Ok(named
        .into_iter()
        .map(|(name, waypoints)| {
            let name = name.unwrap_or_else(|| {
                counter += 1;
                if unnamed > 1 {
                    format!("{}#{}", default_name, counter)
                } else {
                    default_name.to_string()
                }
            });
            RouteSpec {
                name,
                color: None,
                waypoints,
            }
        })
        .collect())
}

fn gpx_points(points: &[gpx::Waypoint]) -> Vec<WaypointSpec> {
    points
        .iter()
        .enumerate()
        .map(|(idx, point)| {
            let geo = point.point();
            WaypointSpec {
                label: point
                    .name
                    .clone()
                    .unwrap_or_else(|| format!("P{}", idx + 1)),
                lat: geo.y(),
                lon: geo.x(),
            }
        })
        .collect()
}

/// Pick a route by case-insensitive name, or the first one when no name is given.
pub fn select_route<'a>(
    specs: &'a [RouteSpec],
    name: Option<&str>,
) -> Result<&'a RouteSpec, RouteError> {
    match name {
        Some(wanted) => specs
            .iter()
            .find(|spec| spec.name.eq_ignore_ascii_case(wanted))
            .ok_or_else(|| RouteError::RouteNotFound(wanted.to_string())),
        None => specs
            .first()
            .ok_or_else(|| RouteError::RouteNotFound("<first>".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG: &str = r#"{
        "routes": [
            {
                "name": "TR-S-DER-02",
                "color": [0, 200, 255],
                "waypoints": [
                    {"label": "DATACENTER", "lat": -32.925539, "lon": -68.857414},
                    {"label": "FUSION 1", "lat": -32.926744, "lon": -68.857481}
                ]
            },
            {
                "name": "TR1-SUR",
                "waypoints": [
                    {"label": "DATACENTER", "lat": -35.470812, "lon": -69.577695},
                    {"label": "FOSC 01", "lat": -35.470874, "lon": -69.577691},
                    {"label": "FOSC 02", "lat": -35.470914, "lon": -69.578495}
                ]
            }
        ]
    }"#;

    #[test]
    fn json_catalog_single_and_array_forms() {
        let routes = parse_routes(CATALOG.as_bytes(), "routes.json", "unused").unwrap();
        assert_eq!(routes.len(), 2);
        assert_eq!(routes[0].name, "TR-S-DER-02");
        assert_eq!(routes[1].waypoints[2].label, "FOSC 02");

        let one = r#"{"name": "solo", "waypoints": [{"label": "A", "lat": 1.0, "lon": 2.0}]}"#;
        let routes = parse_routes(one.as_bytes(), "json", "unused").unwrap();
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].waypoints[0].lon, 2.0);

        let many = format!("[{}]", one);
        assert_eq!(parse_routes(many.as_bytes(), "JSON", "x").unwrap().len(), 1);
    }

    #[test]
    fn json_color_hint_survives_parse_and_build() {
        let routes = parse_routes(CATALOG.as_bytes(), "json", "unused").unwrap();
        assert_eq!(routes[0].color, Some([0, 200, 255]));
        assert_eq!(routes[1].color, None);
        assert_eq!(routes[0].build().unwrap().color(), Some([0, 200, 255]));

        let one = r#"{"name":"solo","color":[0,200,255],"waypoints":[{"label":"A","lat":1.0,"lon":2.0}]}"#;
        let solo = parse_routes(one.as_bytes(), "json", "unused").unwrap();
        let json = serde_json::to_string(&solo[0]).unwrap();
        assert!(json.contains(r#""color":[0,200,255]"#));
        assert!(!serde_json::to_string(&routes[1]).unwrap().contains("color"));
    }

    #[test]
    fn csv_route_uses_default_name() {
        let csv = "label,lat,lon\nDATACENTER, -32.925539, -68.857414\nFUSION 1,-32.926744,-68.857481\n";
        let routes = parse_routes(csv.as_bytes(), "feeder.csv", "feeder").unwrap();
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].name, "feeder");
        assert_eq!(routes[0].waypoints.len(), 2);
        assert_eq!(routes[0].waypoints[0].label, "DATACENTER");
        assert_eq!(routes[0].waypoints[0].lat, -32.925539);
    }

    #[test]
    fn csv_with_bad_number_is_rejected() {
        let csv = "label,lat,lon\nA,north,-68.0\n";
        assert!(matches!(
            parse_routes(csv.as_bytes(), "csv", "r"),
            Err(RouteError::CsvParse(_))
        ));
    }

    #[test]
    fn gpx_route_points_become_waypoints() {
        let gpx = r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="test" xmlns="http://www.topografix.com/GPX/1/1">
  <rte>
    <name>TR1-SUR</name>
    <rtept lat="-35.470812" lon="-69.577695"><name>DATACENTER</name></rtept>
    <rtept lat="-35.470874" lon="-69.577691"></rtept>
  </rte>
  <trk>
    <trkseg>
      <trkpt lat="-32.925539" lon="-68.857414"></trkpt>
      <trkpt lat="-32.926744" lon="-68.857481"></trkpt>
    </trkseg>
    <trkseg>
      <trkpt lat="-32.928124" lon="-68.857580"></trkpt>
    </trkseg>
  </trk>
</gpx>"#;
        let routes = parse_routes(gpx.as_bytes(), "survey.gpx", "survey").unwrap();
        assert_eq!(routes.len(), 2);
        assert_eq!(routes[0].name, "TR1-SUR");
        assert_eq!(routes[0].waypoints[0].label, "DATACENTER");
        assert_eq!(routes[0].waypoints[1].label, "P2");
        assert_eq!(routes[0].waypoints[0].lat, -35.470812);
        assert_eq!(routes[0].waypoints[0].lon, -69.577695);
        assert_eq!(routes[1].name, "survey");
        assert_eq!(routes[1].waypoints.len(), 3);
    }

    #[test]
    fn gpx_waypoint_list_is_the_fallback_route() {
        let gpx = r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="test" xmlns="http://www.topografix.com/GPX/1/1">
  <wpt lat="-32.925539" lon="-68.857414"></wpt>
  <wpt lat="-32.926744" lon="-68.857481"><name>FUSION 1</name></wpt>
</gpx>"#;
        let routes = parse_routes(gpx.as_bytes(), "survey.gpx", "survey").unwrap();
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].name, "survey");
        assert_eq!(routes[0].waypoints[0].label, "P1");
        assert_eq!(routes[0].waypoints[1].label, "FUSION 1");
    }

    #[test]
    fn gpx_unnamed_routes_are_numbered() {
        let gpx = r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="test" xmlns="http://www.topografix.com/GPX/1/1">
  <wpt lat="10.0" lon="10.0"><name>IGNORED</name></wpt>
  <rte>
    <rtept lat="-35.470812" lon="-69.577695"></rtept>
    <rtept lat="-35.470874" lon="-69.577691"></rtept>
  </rte>
  <rte>
    <rtept lat="-32.925539" lon="-68.857414"></rtept>
  </rte>
</gpx>"#;
        let routes = parse_routes(gpx.as_bytes(), "survey.gpx", "survey").unwrap();
        let names: Vec<&str> = routes.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["survey#1", "survey#2"]);
        assert!(routes
            .iter()
            .flat_map(|r| &r.waypoints)
            .all(|wp| wp.label != "IGNORED"));
    }

    #[test]
    fn kmz_is_not_a_route_source() {
        assert!(matches!(
            parse_routes(b"PK", "trazas.kmz", "x"),
            Err(RouteError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn build_rejects_out_of_range_coordinates() {
        let spec = RouteSpec {
            name: "bad".into(),
            color: None,
            waypoints: vec![
                WaypointSpec {
                    label: "A".into(),
                    lat: 0.0,
                    lon: 0.0,
                },
                WaypointSpec {
                    label: "B".into(),
                    lat: 95.0,
                    lon: 0.0,
                },
            ],
        };
        match spec.build() {
            Err(RouteError::InvalidCoordinate { label, .. }) => assert_eq!(label, "B"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn build_rejects_empty_waypoint_list() {
        let spec = RouteSpec {
            name: "empty".into(),
            color: None,
            waypoints: Vec::new(),
        };
        assert!(matches!(spec.build(), Err(RouteError::EmptyRoute)));
    }

    #[test]
    fn select_route_by_name() {
        let routes = parse_routes(CATALOG.as_bytes(), "json", "x").unwrap();
        assert_eq!(select_route(&routes, Some("tr1-sur")).unwrap().name, "TR1-SUR");
        assert_eq!(select_route(&routes, None).unwrap().name, "TR-S-DER-02");
        assert!(matches!(
            select_route(&routes, Some("TR9")),
            Err(RouteError::RouteNotFound(_))
        ));
    }
}
