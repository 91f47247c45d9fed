// Memoized route construction keyed on a SHA-256 fingerprint of the input.

use std::collections::HashMap;
use std::sync::Arc;

use sha2::{Digest, Sha256};

use crate::{Coordinate, Route, RouteError, RouteSpec};

/// SHA-256 over the route name, its color hint and its ordered
/// `(label, lat, lon)` points.
pub fn route_fingerprint<'a>(
    name: &str,
    color: Option<[u8; 3]>,
    points: impl IntoIterator<Item = (&'a str, Coordinate)>,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(name.as_bytes());
    hasher.update([0u8]);
    match color {
        Some(rgb) => {
            hasher.update([1u8]);
            hasher.update(rgb);
        }
        None => hasher.update([0u8]),
    }
    for (label, coordinate) in points {
        hasher.update(label.as_bytes());
        hasher.update([0u8]);
        hasher.update(coordinate.lat.to_le_bytes());
        hasher.update(coordinate.lon.to_le_bytes());
    }
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest {
        use std::fmt::Write;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

impl Route {
    pub fn fingerprint(&self) -> String {
        route_fingerprint(
            self.name(),
            self.color(),
            self.waypoints()
                .iter()
                .map(|w| (w.label(), w.coordinate())),
        )
    }
}

/// Memoizes route construction keyed on the input fingerprint.
///
/// Routes never change once built, so a session can keep handing out the same
/// `Arc<Route>` for every cut it resolves.
#[derive(Debug, Default)]
pub struct RouteCache {
    routes: HashMap<String, Arc<Route>>,
    hits: usize,
    misses: usize,
}

impl RouteCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_build(&mut self, spec: &RouteSpec) -> Result<Arc<Route>, RouteError> {
        let key = spec.fingerprint();
        if let Some(route) = self.routes.get(&key) {
            self.hits += 1;
            return Ok(Arc::clone(route));
        }
        let route = Arc::new(spec.build()?);
        self.misses += 1;
        self.routes.insert(key, Arc::clone(&route));
        Ok(route)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn hits(&self) -> usize {
        self.hits
    }

    pub fn misses(&self) -> usize {
        self.misses
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::WaypointSpec;

    fn spec(name: &str, lon_b: f64) -> RouteSpec {
        RouteSpec {
            name: name.to_string(),
            color: None,
            waypoints: vec![
                WaypointSpec {
                    label: "DATACENTER".into(),
                    lat: -32.925539,
                    lon: -68.857414,
                },
                WaypointSpec {
                    label: "FUSION 1".into(),
                    lat: -32.926744,
                    lon: lon_b,
                },
            ],
        }
    }

    #[test]
    fn fingerprint_matches_between_spec_and_route() {
        let s = spec("TR-S-DER-02", -68.857481);
        let route = s.build().unwrap();
        assert_eq!(s.fingerprint(), route.fingerprint());
        assert_eq!(route.fingerprint().len(), 64);
    }

    #[test]
    fn fingerprint_tracks_coordinates_and_name() {
        let base = spec("TR-S-DER-02", -68.857481).fingerprint();
        assert_ne!(base, spec("TR-S-DER-02", -68.857482).fingerprint());
        assert_ne!(base, spec("TR1-SUR", -68.857481).fingerprint());
    }

    #[test]
    fn repeated_specs_share_one_route() {
        let mut cache = RouteCache::new();
        let a = cache.get_or_build(&spec("TR-S-DER-02", -68.857481)).unwrap();
        let b = cache.get_or_build(&spec("TR-S-DER-02", -68.857481)).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!((cache.hits(), cache.misses()), (1, 1));

        cache.get_or_build(&spec("TR-S-DER-02", -68.8575)).unwrap();
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn color_hint_keeps_routes_apart() {
        let mut cache = RouteCache::new();
        let plain = cache.get_or_build(&spec("TR-S-DER-02", -68.857481)).unwrap();
        let mut tinted = spec("TR-S-DER-02", -68.857481);
        tinted.color = Some([0, 200, 255]);
        let tinted = cache.get_or_build(&tinted).unwrap();
        assert!(!Arc::ptr_eq(&plain, &tinted));
        assert_eq!(plain.color(), None);
        assert_eq!(tinted.color(), Some([0, 200, 255]));
    }

    #[test]
    fn failed_builds_are_not_cached() {
        let mut cache = RouteCache::new();
        assert!(cache.get_or_build(&spec("bad", 500.0)).is_err());
        assert!(cache.is_empty());
    }
}
