//! Parsing and representation of ThOP instances.
//!
//! Handles the TSPLIB-derived text format of the Thief Orienteering Problem:
//! city coordinates, item data, knapsack capacity and the thief's speed and
//! time budget. The terminal city of the input file becomes city `n - 2` and
//! a sentinel city `n - 1` is appended internally so tours can be closed into
//! a cycle without disturbing the start/end semantics.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{bail, Context, Result};
use ordered_float::OrderedFloat;

/// Hard upper bound on the number of cities (sentinel included).
pub const MAX_CITIES: usize = 6000;

/// A city coordinate pair.
#[derive(Debug, Clone, Copy, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// An item that can be picked up along the tour.
#[derive(Debug, Clone, Copy)]
pub struct Item {
    pub profit: i64,
    pub weight: i64,
    /// City holding the item (0-based, never the start or the sentinel).
    pub city: usize,
}

/// Distance metric of the instance, fixed at load time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeWeightType {
    /// Euclidean distance rounded to the nearest integer.
    Euc2d,
    /// Euclidean distance rounded up.
    Ceil2d,
    /// Great-circle distance on the TSPLIB sphere.
    Geo,
    /// Pseudo-Euclidean distance of the ATT instances.
    Att,
}

const EARTH_RADIUS: f64 = 6378.388;

/// Convert a TSPLIB DD.MM coordinate into radians.
fn geo_radians(coord: f64) -> f64 {
    let deg = coord.trunc();
    let min = coord - deg;
    std::f64::consts::PI * (deg + 5.0 * min / 3.0) / 180.0
}

impl EdgeWeightType {
    fn parse(name: &str) -> Result<Self> {
        match name {
            "EUC_2D" => Ok(EdgeWeightType::Euc2d),
            "CEIL_2D" => Ok(EdgeWeightType::Ceil2d),
            "GEO" => Ok(EdgeWeightType::Geo),
            "ATT" => Ok(EdgeWeightType::Att),
            other => bail!("unsupported EDGE_WEIGHT_TYPE: {}", other),
        }
    }

    /// Distance between two coordinate pairs under this metric.
    pub fn distance(&self, a: Point, b: Point) -> i64 {
        let xd = a.x - b.x;
        let yd = a.y - b.y;
        match self {
            EdgeWeightType::Euc2d => ((xd * xd + yd * yd).sqrt() + 0.5) as i64,
            EdgeWeightType::Ceil2d => (xd * xd + yd * yd).sqrt().ceil() as i64,
            EdgeWeightType::Geo => {
                let lat_a = geo_radians(a.x);
                let lat_b = geo_radians(b.x);
                let long_a = geo_radians(a.y);
                let long_b = geo_radians(b.y);
                let q1 = (long_a - long_b).cos();
                let q2 = (lat_a - lat_b).cos();
                let q3 = (lat_a + lat_b).cos();
                (EARTH_RADIUS * (0.5 * ((1.0 + q1) * q2 - (1.0 - q1) * q3)).acos() + 1.0) as i64
            }
            EdgeWeightType::Att => {
                let r = ((xd * xd + yd * yd) / 10.0).sqrt();
                let t = r.trunc();
                if t < r {
                    t as i64 + 1
                } else {
                    t as i64
                }
            }
        }
    }
}

/// A parsed ThOP instance, immutable after load.
///
/// Cities are numbered `0..n-1`: city 0 is the start, city `n - 2` the end
/// and city `n - 1` the sentinel that closes tours cyclically. All sentinel
/// arcs cost `max_real_distance * (n - 1)` except the two zero arcs
/// `0 <-> n-1` and `n-2 <-> n-1`.
#[derive(Debug, Clone)]
pub struct ThopInstance {
    pub name: String,
    pub knapsack_data_type: String,
    pub edge_weight_type: EdgeWeightType,
    /// Number of cities including the sentinel.
    pub n: usize,
    /// Number of items.
    pub m: usize,
    pub capacity: i64,
    /// Travel-time budget of the thief (not the solver's runtime budget).
    pub max_time: f64,
    pub min_speed: f64,
    pub max_speed: f64,
    pub points: Vec<Point>,
    pub items: Vec<Item>,
    /// Symmetric distance matrix, sentinel edits applied.
    pub distance: Vec<Vec<i64>>,
    /// Fractional-knapsack profit upper bound.
    pub ub: i64,
}

impl ThopInstance {
    /// Parse an instance from the line-oriented ThOP text format.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(&path)
            .with_context(|| format!("cannot open instance file {:?}", path.as_ref()))?;
        let reader = BufReader::new(file);

        let mut name = String::new();
        let mut knapsack_data_type = String::new();
        let mut dimension = 0usize;
        let mut m = 0usize;
        let mut capacity = 0i64;
        let mut max_time = 0.0f64;
        let mut min_speed = 0.0f64;
        let mut max_speed = 0.0f64;
        let mut edge_weight_type = None;
        let mut coords: Vec<Point> = Vec::new();
        let mut items: Vec<Item> = Vec::new();

        let mut section = "";

        for line in reader.lines() {
            let line = line.context("read error in instance file")?;
            let line = line.trim();
            if line.is_empty() || line == "EOF" {
                continue;
            }

            if let Some(rest) = line.strip_prefix("PROBLEM NAME:") {
                name = rest.trim().to_string();
                continue;
            }
            if let Some(rest) = line.strip_prefix("KNAPSACK DATA TYPE:") {
                knapsack_data_type = rest.trim().to_string();
                continue;
            }
            if let Some(rest) = line.strip_prefix("DIMENSION:") {
                dimension = rest.trim().parse().context("invalid DIMENSION")?;
                continue;
            }
            if let Some(rest) = line.strip_prefix("NUMBER OF ITEMS:") {
                m = rest.trim().parse().context("invalid NUMBER OF ITEMS")?;
                continue;
            }
            if let Some(rest) = line.strip_prefix("CAPACITY OF KNAPSACK:") {
                capacity = rest.trim().parse().context("invalid CAPACITY OF KNAPSACK")?;
                continue;
            }
            if let Some(rest) = line.strip_prefix("MAX TIME:") {
                max_time = rest.trim().parse().context("invalid MAX TIME")?;
                continue;
            }
            if let Some(rest) = line.strip_prefix("MIN SPEED:") {
                min_speed = rest.trim().parse().context("invalid MIN SPEED")?;
                continue;
            }
            if let Some(rest) = line.strip_prefix("MAX SPEED:") {
                max_speed = rest.trim().parse().context("invalid MAX SPEED")?;
                continue;
            }
            if let Some(rest) = line.strip_prefix("EDGE_WEIGHT_TYPE:") {
                edge_weight_type = Some(EdgeWeightType::parse(rest.trim())?);
                continue;
            }
            if line.starts_with("NODE_COORD_SECTION") {
                section = "coords";
                continue;
            }
            if line.starts_with("ITEMS SECTION") {
                section = "items";
                continue;
            }

            match section {
                "coords" => {
                    let parts: Vec<&str> = line.split_whitespace().collect();
                    if parts.len() >= 3 {
                        let x: f64 = parts[1].parse().context("invalid x coordinate")?;
                        let y: f64 = parts[2].parse().context("invalid y coordinate")?;
                        coords.push(Point { x, y });
                    }
                }
                "items" => {
                    let parts: Vec<&str> = line.split_whitespace().collect();
                    if parts.len() >= 4 {
                        let profit: i64 = parts[1].parse().context("invalid item profit")?;
                        let weight: i64 = parts[2].parse().context("invalid item weight")?;
                        let city: usize = parts[3].parse().context("invalid item city")?;
                        if city == 0 || city > dimension {
                            bail!("item city {} outside 1..={}", city, dimension);
                        }
                        // 1-based in the file, 0-based internally.
                        items.push(Item { profit, weight, city: city - 1 });
                    }
                }
                _ => {}
            }
        }

        // The sentinel city is appended beyond the file's DIMENSION.
        let n = dimension + 1;
        if n <= 3 || n >= MAX_CITIES {
            bail!("instance has {} cities, supported range is 4..{}", n, MAX_CITIES);
        }
        if coords.len() != dimension {
            bail!("expected {} coordinates, found {}", dimension, coords.len());
        }
        if items.len() != m {
            bail!("expected {} items, found {}", m, items.len());
        }

        let edge_weight_type =
            edge_weight_type.ok_or_else(|| anyhow::anyhow!("missing EDGE_WEIGHT_TYPE"))?;
        let distance = Self::compute_distances(&coords, n, edge_weight_type);
        let ub = fractional_knapsack_bound(&items, capacity);

        Ok(ThopInstance {
            name,
            knapsack_data_type,
            edge_weight_type,
            n,
            m,
            capacity,
            max_time,
            min_speed,
            max_speed,
            points: coords,
            items,
            distance,
            ub,
        })
    }

    fn compute_distances(points: &[Point], n: usize, metric: EdgeWeightType) -> Vec<Vec<i64>> {
        let mut matrix = vec![vec![0i64; n]; n];
        let mut max_distance = 0i64;

        for i in 0..n - 1 {
            for j in 0..n - 1 {
                matrix[i][j] = metric.distance(points[i], points[j]);
                if matrix[i][j] > max_distance {
                    max_distance = matrix[i][j];
                }
            }
        }

        // The sentinel is reachable for free only from the start and the end
        // city; every other arc to it is prohibitively long.
        let sentinel = n - 1;
        for i in 0..n {
            matrix[i][sentinel] = max_distance * (n as i64 - 1);
            matrix[sentinel][i] = max_distance * (n as i64 - 1);
        }
        matrix[0][sentinel] = 0;
        matrix[sentinel][0] = 0;
        matrix[n - 2][sentinel] = 0;
        matrix[sentinel][n - 2] = 0;

        matrix
    }

    /// Nearest-neighbour lists of depth `nn` (clamped to `n - 1`), each in
    /// ascending order of distance.
    pub fn compute_nn_lists(&self, nn: usize) -> Vec<Vec<usize>> {
        let nn = nn.min(self.n - 1);
        let mut lists = Vec::with_capacity(self.n);

        for city in 0..self.n {
            let mut order: Vec<usize> = (0..self.n).filter(|&j| j != city).collect();
            order.sort_by_key(|&j| self.distance[city][j]);
            order.truncate(nn);
            lists.push(order);
        }

        lists
    }

    #[inline]
    pub fn dist(&self, i: usize, j: usize) -> i64 {
        self.distance[i][j]
    }
}

/// Profit of the optimal fractional knapsack over the item set, used to turn
/// profit maximisation into fitness minimisation (`fitness = UB + 1 - profit`).
fn fractional_knapsack_bound(items: &[Item], capacity: i64) -> i64 {
    let mut order: Vec<usize> = (0..items.len()).collect();
    order.sort_by_key(|&j| OrderedFloat(-(items[j].profit as f64) / items[j].weight as f64));

    let mut ub = 0i64;
    let mut weight = 0i64;
    for &j in &order {
        if weight + items[j].weight <= capacity {
            weight += items[j].weight;
            ub += items[j].profit;
        } else {
            ub += ((capacity - weight) as f64 / items[j].weight as f64 * items[j].profit as f64)
                .ceil() as i64;
            break;
        }
    }
    ub
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_euclidean_rounding() {
        let a = Point { x: 0.0, y: 0.0 };
        let b = Point { x: 3.0, y: 4.0 };
        assert_eq!(EdgeWeightType::Euc2d.distance(a, b), 5);

        // 1.414.. rounds down under EUC_2D, up under CEIL_2D
        let c = Point { x: 1.0, y: 1.0 };
        assert_eq!(EdgeWeightType::Euc2d.distance(a, c), 1);
        assert_eq!(EdgeWeightType::Ceil2d.distance(a, c), 2);
    }

    #[test]
    fn test_att_distance() {
        let a = Point { x: 0.0, y: 0.0 };
        let b = Point { x: 10.0, y: 0.0 };
        // sqrt(100 / 10) = 3.162.. rounds up
        assert_eq!(EdgeWeightType::Att.distance(a, b), 4);
    }

    #[test]
    fn test_fractional_bound() {
        let items = vec![
            Item { profit: 60, weight: 10, city: 1 },
            Item { profit: 100, weight: 20, city: 1 },
            Item { profit: 120, weight: 30, city: 2 },
        ];
        // ratios 6, 5, 4; capacity 50 takes the first two whole plus 20/30
        // of the third
        assert_eq!(fractional_knapsack_bound(&items, 50), 240);
        // everything fits
        assert_eq!(fractional_knapsack_bound(&items, 60), 280);
    }

    #[test]
    fn test_parse_instance() {
        let text = "\
PROBLEM NAME: toy
KNAPSACK DATA TYPE: uncorrelated
DIMENSION: 4
NUMBER OF ITEMS: 2
CAPACITY OF KNAPSACK: 10
MAX TIME: 25.0
MIN SPEED: 0.1
MAX SPEED: 1.0
EDGE_WEIGHT_TYPE: EUC_2D
NODE_COORD_SECTION (INDEX, X, Y):
1 0.0 0.0
2 3.0 0.0
3 3.0 4.0
4 0.0 4.0
ITEMS SECTION (INDEX, PROFIT, WEIGHT, ASSIGNED NODE NUMBER):
1 50 4 2
2 30 3 3
";
        let path = std::env::temp_dir().join("thop_parse_test.thop");
        std::fs::write(&path, text).unwrap();
        let instance = ThopInstance::from_file(&path).unwrap();

        assert_eq!(instance.n, 5); // sentinel appended
        assert_eq!(instance.m, 2);
        assert_eq!(instance.capacity, 10);
        assert_eq!(instance.edge_weight_type, EdgeWeightType::Euc2d);
        assert_eq!(instance.items[0].city, 1); // converted to 0-based
        assert_eq!(instance.dist(0, 1), 3);
        assert_eq!(instance.dist(1, 2), 4);
        assert_eq!(instance.ub, 80);

        // sentinel arcs: free from start and end, inflated elsewhere
        let s = instance.n - 1;
        assert_eq!(instance.dist(0, s), 0);
        assert_eq!(instance.dist(instance.n - 2, s), 0);
        assert_eq!(instance.dist(1, s), 5 * (instance.n as i64 - 1));
        assert_eq!(instance.dist(s, 1), instance.dist(1, s));
    }

    #[test]
    fn test_nn_lists_sorted() {
        let path = std::env::temp_dir().join("thop_nn_test.thop");
        std::fs::write(
            &path,
            "\
PROBLEM NAME: line
KNAPSACK DATA TYPE: uncorrelated
DIMENSION: 5
NUMBER OF ITEMS: 1
CAPACITY OF KNAPSACK: 10
MAX TIME: 100.0
MIN SPEED: 0.1
MAX SPEED: 1.0
EDGE_WEIGHT_TYPE: EUC_2D
NODE_COORD_SECTION (INDEX, X, Y):
1 0.0 0.0
2 1.0 0.0
3 2.0 0.0
4 3.0 0.0
5 4.0 0.0
ITEMS SECTION (INDEX, PROFIT, WEIGHT, ASSIGNED NODE NUMBER):
1 10 2 3
",
        )
        .unwrap();
        let instance = ThopInstance::from_file(&path).unwrap();
        let lists = instance.compute_nn_lists(3);

        assert_eq!(lists.len(), instance.n);
        for (city, list) in lists.iter().enumerate() {
            assert_eq!(list.len(), 3);
            for w in list.windows(2) {
                assert!(instance.dist(city, w[0]) <= instance.dist(city, w[1]));
            }
            assert!(!list.contains(&city));
        }
    }

    #[test]
    fn test_rejects_tiny_instance() {
        let path = std::env::temp_dir().join("thop_tiny_test.thop");
        std::fs::write(
            &path,
            "\
PROBLEM NAME: tiny
KNAPSACK DATA TYPE: uncorrelated
DIMENSION: 2
NUMBER OF ITEMS: 1
CAPACITY OF KNAPSACK: 10
MAX TIME: 10.0
MIN SPEED: 0.1
MAX SPEED: 1.0
EDGE_WEIGHT_TYPE: EUC_2D
NODE_COORD_SECTION (INDEX, X, Y):
1 0.0 0.0
2 1.0 0.0
ITEMS SECTION (INDEX, PROFIT, WEIGHT, ASSIGNED NODE NUMBER):
1 10 2 2
",
        )
        .unwrap();
        assert!(ThopInstance::from_file(&path).is_err());
    }
}
