use common_types::{Centroids, Pt, RequiredList, Route, RouteError};
use log::{info, warn};

/// Visiting order plus the required regions that could not be placed.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteOrder {
    pub route: Route,
    /// Required regions with no centroid on the map.
    pub skipped: Vec<String>,
}

/// The single region whose name contains "entrance" (any case).
pub fn find_entrance(centroids: &Centroids) -> Result<String, RouteError> {
    let found: Vec<&String> = centroids
        .keys()
        .filter(|name| name.to_lowercase().contains("entrance"))
        .collect();
    match found.as_slice() {
        [] => Err(RouteError::MissingEntrance),
        [one] => Ok((*one).clone()),
        many => Err(RouteError::AmbiguousEntrance(
            many.iter().map(|s| (*s).clone()).collect(),
        )),
    }
}

/// Region used for the checkout stop: an exact "checkout" region, else the
/// first one mentioning checkout, else the bare name.
pub fn find_checkout(centroids: &Centroids) -> String {
    if centroids.contains_key("checkout") {
        return "checkout".to_string();
    }
    centroids
        .keys()
        .find(|name| name.to_lowercase().contains("checkout"))
        .cloned()
        .unwrap_or_else(|| "checkout".to_string())
}

/// Greedy nearest-neighbor tour from the entrance over the required regions,
/// closed by checkout and a return to the entrance.
///
/// This is a heuristic: no backtracking and no 2-opt pass, so the tour can be
/// longer than optimal. Distance ties go to the region that sorts first.
pub fn shopping_order(centroids: &Centroids, required: &RequiredList) -> Result<RouteOrder, RouteError> {
    let entrance = find_entrance(centroids)?;
    let checkout = find_checkout(centroids);

    let mut candidates: Vec<(&str, Pt)> = Vec::new();
    let mut skipped = Vec::new();
    for name in required.required_regions() {
        if name == entrance || name == checkout {
            continue;
        }
        match centroids.get(name) {
            Some(&c) => candidates.push((name, c)),
            None => {
                warn!("Required region '{}' is not on the map; skipping", name);
                skipped.push(name.to_string());
            }
        }
    }

    let mut current = *centroids
        .get(&entrance)
        .ok_or_else(|| RouteError::UnknownStop(entrance.clone()))?;
    let mut stops = Vec::with_capacity(candidates.len() + 3);
    stops.push(entrance.clone());

    while !candidates.is_empty() {
        let best = nearest(&candidates, current);
        let (name, c) = candidates.remove(best);
        stops.push(name.to_string());
        current = c;
    }

    stops.push(checkout);
    stops.push(entrance);
    info!("Route: {}", stops.join(" -> "));

    Ok(RouteOrder {
        route: Route { stops },
        skipped,
    })
}

/// Index of the candidate closest to `from`; the first one wins a tie.
fn nearest(candidates: &[(&str, Pt)], from: Pt) -> usize {
    let mut best = 0usize;
    let mut best_d = f64::INFINITY;
    for (i, (_, c)) in candidates.iter().enumerate() {
        let d = from.distance(c);
        if d < best_d {
            best = i;
            best_d = d;
        }
    }
    best
}
