use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

use common_types::{
    BarrierGrid, Centroids, Degradation, PathSegment, PixelPt, Pt, Route, RouteError, SearchFailure,
};
use log::{debug, info, warn};
use serde::Deserialize;

pub mod order;
pub mod render;

pub use order::{find_entrance, shopping_order, RouteOrder};
pub use render::{draw_route, RenderSettings};

/// Public settings for the segment search
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct PlannerSettings {
    pub max_expansions: usize, // A* node budget per segment
}

impl Default for PlannerSettings {
    fn default() -> Self {
        Self { max_expansions: 50_000 }
    }
}

/// Segments for a whole route plus everything that had to be approximated.
#[derive(Debug, Clone, Default)]
pub struct RoutePlan {
    pub segments: Vec<PathSegment>,
    pub degradations: Vec<Degradation>,
}

impl RoutePlan {
    pub fn fallback_count(&self) -> usize {
        self.segments.iter().filter(|s| s.fallback).count()
    }

    /// Walked distance over every segment, fallbacks included.
    pub fn total_length(&self) -> f64 {
        self.segments.iter().map(|s| polyline_length(&s.points)).sum()
    }
}

const DIRS8: [(i64, i64); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

#[inline]
fn clamp_i64(v: i64, lo: i64, hi: i64) -> i64 {
    v.max(lo).min(hi)
}

/// Move `p` onto the nearest free cell.
///
/// Rings of growing Chebyshev radius are scanned row-major; the first free
/// cell wins. Returns `Err` with the truncated (clamped) position when the
/// grid has no free cell within its larger dimension.
pub fn snap_to_free(grid: &BarrierGrid, p: Pt) -> Result<PixelPt, PixelPt> {
    let (w, h) = grid.dimensions();
    if w == 0 || h == 0 {
        return Err(PixelPt::new(0, 0));
    }
    let x = clamp_i64(p.x as i64, 0, w as i64 - 1);
    let y = clamp_i64(p.y as i64, 0, h as i64 - 1);
    let origin = PixelPt::new(x as u32, y as u32);
    if grid.is_free(origin.x, origin.y) {
        return Ok(origin);
    }

    let max_r = w.max(h) as i64;
    for r in 1..=max_r {
        for dy in -r..=r {
            let ny = y + dy;
            if ny < 0 || ny >= h as i64 {
                continue;
            }
            // interior rows only touch the ring at its two side columns
            let step = if dy.abs() == r { 1 } else { 2 * r as usize };
            for dx in (-r..=r).step_by(step) {
                let nx = x + dx;
                if grid.contains(nx, ny) && grid.is_free(nx as u32, ny as u32) {
                    return Ok(PixelPt::new(nx as u32, ny as u32));
                }
            }
        }
    }
    Err(origin)
}

#[derive(Clone, Copy)]
struct Node {
    f: f64,
    h: f64,
    g: f64,
    idx: usize,
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Node {}

impl PartialOrd for Node {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Node {
    // BinaryHeap is a max-heap: lowest f (then lowest h) pops first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .f
            .total_cmp(&self.f)
            .then_with(|| other.h.total_cmp(&self.h))
            .then_with(|| other.idx.cmp(&self.idx))
    }
}

#[inline]
fn euclid(ax: u32, ay: u32, bx: u32, by: u32) -> f64 {
    (ax as f64 - bx as f64).hypot(ay as f64 - by as f64)
}

/// A* over the free cells of `grid` with 8-directional moves.
///
/// Orthogonal steps cost 1 and diagonal steps √2, so the Euclidean heuristic
/// never overestimates. At most `max_expansions` nodes are expanded, and
/// bookkeeping only covers the cells the search touches.
pub fn astar(
    grid: &BarrierGrid,
    start: PixelPt,
    goal: PixelPt,
    max_expansions: usize,
) -> Result<Vec<PixelPt>, SearchFailure> {
    if grid.is_occupied(start.x, start.y) || grid.is_occupied(goal.x, goal.y) {
        return Err(SearchFailure::EndpointBlocked);
    }
    if start == goal {
        return Ok(vec![start]);
    }

    let w = grid.width() as usize;
    let at = |idx: usize| PixelPt::new((idx % w) as u32, (idx / w) as u32);

    let mut best_g: HashMap<usize, f64> = HashMap::new();
    let mut came_from: HashMap<usize, usize> = HashMap::new();
    let mut closed: HashSet<usize> = HashSet::new();
    let mut open = BinaryHeap::new();

    let start_idx = grid.index(start.x, start.y);
    let goal_idx = grid.index(goal.x, goal.y);
    let h0 = euclid(start.x, start.y, goal.x, goal.y);
    best_g.insert(start_idx, 0.0);
    open.push(Node { f: h0, h: h0, g: 0.0, idx: start_idx });

    let mut expansions = 0usize;
    while let Some(Node { g, idx, .. }) = open.pop() {
        if closed.contains(&idx) {
            continue;
        }
        if idx == goal_idx {
            let mut path = vec![at(idx)];
            let mut cur = idx;
            while let Some(&prev) = came_from.get(&cur) {
                cur = prev;
                path.push(at(cur));
            }
            path.reverse();
            debug!("A* reached {} after {} expansions", goal, expansions);
            return Ok(path);
        }
        if expansions >= max_expansions {
            return Err(SearchFailure::BudgetExhausted { expansions });
        }
        expansions += 1;
        closed.insert(idx);

        let p = at(idx);
        for (dx, dy) in DIRS8 {
            let nx = p.x as i64 + dx;
            let ny = p.y as i64 + dy;
            if !grid.contains(nx, ny) {
                continue;
            }
            let (nx, ny) = (nx as u32, ny as u32);
            if grid.is_occupied(nx, ny) {
                continue;
            }
            let nidx = grid.index(nx, ny);
            if closed.contains(&nidx) {
                continue;
            }
            let step = if dx != 0 && dy != 0 { std::f64::consts::SQRT_2 } else { 1.0 };
            let ng = g + step;
            if ng < best_g.get(&nidx).copied().unwrap_or(f64::INFINITY) {
                best_g.insert(nidx, ng);
                came_from.insert(nidx, idx);
                let h = euclid(nx, ny, goal.x, goal.y);
                open.push(Node { f: ng + h, h, g: ng, idx: nidx });
            }
        }
    }
    Err(SearchFailure::Disconnected)
}

/// Plan every leg of `route` over `grid`.
///
/// Stops are snapped to free cells first. A leg whose search fails is
/// replaced by a direct line and reported in [`RoutePlan::degradations`];
/// only a stop with no centroid at all is fatal.
pub fn plan_route(
    route: &Route,
    centroids: &Centroids,
    grid: &BarrierGrid,
    cfg: &PlannerSettings,
) -> Result<RoutePlan, RouteError> {
    let mut plan = RoutePlan::default();
    let mut snapped: HashMap<&str, PixelPt> = HashMap::new();

    for name in &route.stops {
        if snapped.contains_key(name.as_str()) {
            continue;
        }
        let c = centroids
            .get(name)
            .ok_or_else(|| RouteError::UnknownStop(name.clone()))?;
        let p = match snap_to_free(grid, *c) {
            Ok(p) => p,
            Err(at) => {
                warn!("No walkable point found near '{}' at {}", name, at);
                plan.degradations.push(Degradation::SnapFailure {
                    region: name.clone(),
                    at,
                });
                at
            }
        };
        snapped.insert(name.as_str(), p);
    }

    for (from, to) in route.legs() {
        let start = snapped[from];
        let end = snapped[to];
        let segment = match astar(grid, start, end, cfg.max_expansions) {
            Ok(points) => PathSegment {
                from: from.to_string(),
                to: to.to_string(),
                start,
                end,
                points,
                fallback: false,
            },
            Err(reason) => {
                warn!(
                    "Could not find path between '{}' and '{}' ({}); drawing direct line",
                    from, to, reason
                );
                plan.degradations.push(Degradation::UnreachableSegment {
                    from: from.to_string(),
                    to: to.to_string(),
                    reason,
                });
                PathSegment {
                    from: from.to_string(),
                    to: to.to_string(),
                    start,
                    end,
                    points: vec![start, end],
                    fallback: true,
                }
            }
        };
        plan.segments.push(segment);
    }

    info!(
        "Planned {} segments ({} fallbacks), {:.1} px walked",
        plan.segments.len(),
        plan.fallback_count(),
        plan.total_length()
    );
    Ok(plan)
}

/// Euclidean length of a pixel polyline
pub fn polyline_length(pts: &[PixelPt]) -> f64 {
    pts.windows(2)
        .map(|w| euclid(w[0].x, w[0].y, w[1].x, w[1].y))
        .sum()
}
