//! Constrained-deviation A* route optimizer (C6).
//!
//! Grounded on the `DijkstraNode`/`BinaryHeap` min-heap idiom from
//! `other_examples`' bitchat-rust mesh routing (`Ord`/`PartialOrd` built on
//! `f64::total_cmp`, reversed so `BinaryHeap` pops the smallest `f` first),
//! extended here with an admissible heuristic (true A*) and the spec's
//! perpendicular-deviation constraint as a candidate filter.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use crate::db::models::GeoPoint;
use crate::geo::{geometry, GeoPoint2};

/// Tunable search parameters (§4.6, `AppConfig`-sourced defaults).
#[derive(Debug, Clone, Copy)]
pub struct OptimizerParams {
    pub step_meters: f64,
    pub angle_range_deg: f64,
    pub fan: usize,
    pub max_deviation_ratio: f64,
}

impl Default for OptimizerParams {
    fn default() -> Self {
        Self {
            step_meters: 1000.0,
            angle_range_deg: 30.0,
            fan: 10,
            max_deviation_ratio: 0.20,
        }
    }
}

/// `NEW → SEARCHING → (DONE|FALLBACK)` (§4.6 state machine). The caller only
/// observes the terminal state via which branch produced the route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimizerOutcome {
    Done,
    Fallback,
}

pub struct OptimizeResult {
    pub route: Vec<GeoPoint2>,
    pub outcome: OptimizerOutcome,
}

/// Node key: `(lat, lon)` rounded to 6 decimal places, per §4.6.
type NodeKey = (i64, i64);

fn node_key(p: GeoPoint2) -> NodeKey {
    ((p.lat * 1e6).round() as i64, (p.lon * 1e6).round() as i64)
}

struct OpenItem {
    f: f64,
    g: f64,
    seq: u64,
    key: NodeKey,
    point: GeoPoint2,
}

impl PartialEq for OpenItem {
    fn eq(&self, other: &Self) -> bool {
        self.f == other.f && self.g == other.g && self.seq == other.seq
    }
}
impl Eq for OpenItem {}

impl Ord for OpenItem {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so BinaryHeap (a max-heap) pops the smallest `f` first;
        // ties broken by smallest `g`, then earliest insertion.
        other
            .f
            .total_cmp(&self.f)
            .then_with(|| other.g.total_cmp(&self.g))
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for OpenItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// `populationPenalty(p, n, m)`: piecewise on `distance(p, m)` — evaluated
/// once per candidate edge, not per corridor membership.
fn population_penalty(population: i64, m: GeoPoint2, p: GeoPoint2) -> f64 {
    let d = geometry::distance(p, m);
    let pop = population as f64;
    if d <= 500.0 {
        pop * 2.0
    } else if d <= 1000.0 {
        pop
    } else {
        0.0
    }
}

fn edge_cost(population_points: &[(GeoPoint2, i64)], m: GeoPoint2) -> f64 {
    population_points
        .iter()
        .map(|&(p, population)| population_penalty(population, m, p))
        .sum()
}

/// Runs the search. Pure, in-memory, non-suspending — callers isolate it
/// via `tokio::task::spawn_blocking` (§5).
pub fn optimize(
    start: GeoPoint2,
    end: GeoPoint2,
    corridor_points: &[GeoPoint],
    params: OptimizerParams,
) -> OptimizeResult {
    let population_points: Vec<(GeoPoint2, i64)> = corridor_points
        .iter()
        .filter_map(|p| match p {
            GeoPoint::Population(c) => Some((GeoPoint2::new(c.lat, c.lon), c.population)),
            GeoPoint::Weather(_) => None,
        })
        .collect();

    let straight_distance = geometry::distance(start, end);
    let max_deviation = params.max_deviation_ratio * straight_distance;

    let mut open = BinaryHeap::new();
    let mut best_g: HashMap<NodeKey, f64> = HashMap::new();
    let mut parent: HashMap<NodeKey, NodeKey> = HashMap::new();
    let mut points: HashMap<NodeKey, GeoPoint2> = HashMap::new();
    let mut closed: std::collections::HashSet<NodeKey> = std::collections::HashSet::new();
    let mut seq: u64 = 0;

    let start_key = node_key(start);
    points.insert(start_key, start);
    best_g.insert(start_key, 0.0);
    open.push(OpenItem {
        f: geometry::distance(start, end),
        g: 0.0,
        seq,
        key: start_key,
        point: start,
    });

    while let Some(current) = open.pop() {
        if closed.contains(&current.key) {
            continue;
        }
        closed.insert(current.key);

        if geometry::distance(current.point, end) <= params.step_meters {
            let mut path = vec![current.point];
            let mut k = current.key;
            while let Some(&prev) = parent.get(&k) {
                path.push(points[&prev]);
                k = prev;
            }
            path.reverse();
            path.push(end);
            return OptimizeResult { route: path, outcome: OptimizerOutcome::Done };
        }

        let direct_bearing = geometry::rhumb_bearing(current.point, end);
        let fan = params.fan.max(2);

        for i in 0..fan {
            let offset = params.angle_range_deg * (2.0 * i as f64 / (fan as f64 - 1.0) - 1.0);
            let bearing = (direct_bearing + offset + 360.0) % 360.0;
            let candidate = geometry::destination(current.point, params.step_meters, bearing);

            if geometry::perpendicular_distance(candidate, start, end) > max_deviation {
                continue;
            }

            let candidate_key = node_key(candidate);
            if closed.contains(&candidate_key) {
                continue;
            }

            let tentative_g = current.g + edge_cost(&population_points, candidate);
            let improves = best_g.get(&candidate_key).map(|&g| tentative_g < g).unwrap_or(true);

            if improves {
                best_g.insert(candidate_key, tentative_g);
                parent.insert(candidate_key, current.key);
                points.insert(candidate_key, candidate);

                seq += 1;
                open.push(OpenItem {
                    f: tentative_g + geometry::distance(candidate, end),
                    g: tentative_g,
                    seq,
                    key: candidate_key,
                    point: candidate,
                });
            }
        }
    }

    OptimizeResult { route: vec![start, end], outcome: OptimizerOutcome::Fallback }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::PopulationCell;

    fn pop_point(lat: f64, lon: f64, population: i64) -> GeoPoint {
        GeoPoint::Population(PopulationCell { lat, lon, population })
    }

    #[test]
    fn fallback_on_identical_start_and_end() {
        // S5: start == end, distance 0.
        let p = GeoPoint2::new(40.0, -73.0);
        let result = optimize(p, p, &[], OptimizerParams::default());
        assert_eq!(result.route.first().copied(), Some(p));
        assert_eq!(result.route.last().copied(), Some(p));
    }

    #[test]
    fn empty_population_set_has_zero_cost_path_of_at_least_two_points() {
        // Testable property 7.
        let start = GeoPoint2::new(40.0, -73.0);
        let end = GeoPoint2::new(40.05, -73.0);
        let result = optimize(start, end, &[], OptimizerParams::default());
        assert!(result.route.len() >= 2);
    }

    #[test]
    fn every_node_respects_deviation_budget() {
        // Testable property 6.
        let start = GeoPoint2::new(40.0, -73.0);
        let end = GeoPoint2::new(40.1, -73.0);
        let straight = geometry::distance(start, end);
        let corridor = vec![pop_point(40.05, -73.0, 20_000)];
        let result = optimize(start, end, &corridor, OptimizerParams::default());

        let max_dev = 0.20 * straight;
        for (idx, node) in result.route.iter().enumerate() {
            if idx == 0 || idx == result.route.len() - 1 {
                continue;
            }
            let dev = geometry::perpendicular_distance(*node, start, end);
            assert!(dev <= max_dev + 1e-6, "node {idx} deviates {dev} > {max_dev}");
        }
    }

    #[test]
    fn avoids_population_cell_directly_on_the_line() {
        // S6: a heavy population cell sits on the straight line; the
        // optimized path should end up farther from it and cost no more
        // than the straight line would.
        let start = GeoPoint2::new(40.0, -73.0);
        let end = GeoPoint2::new(40.1, -73.0);
        let lat_mid = (start.lat + end.lat) / 2.0;
        let lon_mid = (start.lon + end.lon) / 2.0;
        let corridor = vec![pop_point(lat_mid + 0.0001, lon_mid, 10_000)];

        let result = optimize(start, end, &corridor, OptimizerParams::default());

        let cell = GeoPoint2::new(lat_mid + 0.0001, lon_mid);
        let min_dist = result
            .route
            .iter()
            .map(|p| geometry::distance(*p, cell))
            .fold(f64::MAX, f64::min);
        assert!(min_dist > 500.0 || result.outcome == OptimizerOutcome::Fallback);
    }
}
