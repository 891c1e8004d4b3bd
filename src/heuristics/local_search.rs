//! Tour-level local search: 2-opt, 2.5-opt and 3-opt.
//!
//! All variants are first-improvement descents over neighbour-restricted
//! candidate moves, with don't-look bits and a randomised scan order. The
//! tour is treated as a fixed-endpoint path over positions `0..=n-2`: the
//! start city, the end city and the sentinel never move, so every reversal
//! and reinsertion stays strictly between them and the closing arcs are
//! never touched.

use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;

use crate::instance::ThopInstance;

/// Which move neighbourhood to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LsVariant {
    TwoOpt,
    TwoHalfOpt,
    ThreeOpt,
}

impl LsVariant {
    /// Map the `--localsearch` flag value; 0 disables local search.
    pub fn from_flag(flag: u8) -> Option<Self> {
        match flag {
            1 => Some(LsVariant::TwoOpt),
            2 => Some(LsVariant::TwoHalfOpt),
            3 => Some(LsVariant::ThreeOpt),
            _ => None,
        }
    }
}

/// Configured local-search operator.
#[derive(Debug, Clone, Copy)]
pub struct LocalSearch {
    pub variant: LsVariant,
    /// Candidate moves are restricted to this many nearest neighbours.
    pub nn_ls: usize,
    /// Whether to honour don't-look bits.
    pub use_dlb: bool,
}

impl LocalSearch {
    /// Drive `tour` to a local optimum of the configured neighbourhood.
    pub fn optimize(
        &self,
        tour: &mut [usize],
        instance: &ThopInstance,
        nn_list: &[Vec<usize>],
        rng: &mut ChaCha8Rng,
    ) {
        match self.variant {
            LsVariant::TwoOpt => self.descend(tour, instance, nn_list, rng, false),
            LsVariant::TwoHalfOpt => self.descend(tour, instance, nn_list, rng, true),
            LsVariant::ThreeOpt => self.three_opt_first(tour, instance, nn_list, rng),
        }
    }

    /// Shared 2-opt / 2.5-opt driver; the insertion move is what upgrades
    /// 2-opt into 2.5-opt.
    fn descend(
        &self,
        tour: &mut [usize],
        instance: &ThopInstance,
        nn_list: &[Vec<usize>],
        rng: &mut ChaCha8Rng,
        with_insertion: bool,
    ) {
        let n = instance.n;
        let mut pos = vec![0usize; n];
        for (p, &city) in tour.iter().enumerate().take(n) {
            pos[city] = p;
        }
        let mut dlb = vec![false; n];
        let mut scan: Vec<usize> = (1..=n - 3).collect();
        scan.shuffle(rng);

        let mut improvement = true;
        while improvement {
            improvement = false;
            for &c1 in &scan {
                if self.use_dlb && dlb[c1] {
                    continue;
                }
                if self.improve_city(tour, &mut pos, &mut dlb, instance, nn_list, c1, with_insertion)
                {
                    improvement = true;
                } else {
                    dlb[c1] = true;
                }
            }
        }
    }

    /// Try the moves anchored at `c1`, apply the first improving one.
    fn improve_city(
        &self,
        tour: &mut [usize],
        pos: &mut [usize],
        dlb: &mut [bool],
        instance: &ThopInstance,
        nn_list: &[Vec<usize>],
        c1: usize,
        with_insertion: bool,
    ) -> bool {
        let last = instance.n - 2;
        let neighbours = &nn_list[c1][..self.nn_ls.min(nn_list[c1].len())];

        // exchange the successor edges of c1 and c2
        let p1 = pos[c1];
        let s1 = tour[p1 + 1];
        let radius = instance.dist(c1, s1);
        for &c2 in neighbours {
            if instance.dist(c1, c2) >= radius {
                break;
            }
            let p2 = pos[c2];
            if p2 >= last {
                continue;
            }
            let s2 = tour[p2 + 1];
            if s2 == c1 {
                continue;
            }
            let gain = instance.dist(c1, c2) + instance.dist(s1, s2)
                - radius
                - instance.dist(c2, s2);
            if gain < 0 {
                let (i, j) = (p1.min(p2), p1.max(p2));
                reverse_segment(tour, pos, i + 1, j);
                for city in [c1, s1, c2, s2] {
                    dlb[city] = false;
                }
                return true;
            }
        }

        // exchange the predecessor edges of c1 and c2
        let pr1 = tour[p1 - 1];
        let radius = instance.dist(pr1, c1);
        for &c2 in neighbours {
            if instance.dist(c1, c2) >= radius {
                break;
            }
            let p2 = pos[c2];
            if p2 == 0 || p2 > last {
                continue;
            }
            let pr2 = tour[p2 - 1];
            if pr2 == c1 || pr1 == c2 {
                continue;
            }
            let gain = instance.dist(c1, c2) + instance.dist(pr1, pr2)
                - radius
                - instance.dist(pr2, c2);
            if gain < 0 {
                let (i, j) = ((p1 - 1).min(p2 - 1), (p1 - 1).max(p2 - 1));
                reverse_segment(tour, pos, i + 1, j);
                for city in [pr1, c1, pr2, c2] {
                    dlb[city] = false;
                }
                return true;
            }
        }

        if !with_insertion {
            return false;
        }

        // relocate c1 between c2 and its successor
        let s1 = tour[p1 + 1];
        let removal = instance.dist(pr1, c1) + instance.dist(c1, s1) - instance.dist(pr1, s1);
        for &c2 in neighbours {
            let p2 = pos[c2];
            if p2 >= last || c2 == pr1 {
                continue;
            }
            let s2 = tour[p2 + 1];
            if s2 == c1 {
                continue;
            }
            let insertion =
                instance.dist(c2, c1) + instance.dist(c1, s2) - instance.dist(c2, s2);
            if insertion - removal < 0 {
                if p2 > p1 {
                    tour[p1..=p2].rotate_left(1);
                    refresh_positions(tour, pos, p1, p2);
                } else {
                    tour[p2 + 1..=p1].rotate_right(1);
                    refresh_positions(tour, pos, p2 + 1, p1);
                }
                for city in [pr1, c1, s1, c2, s2] {
                    dlb[city] = false;
                }
                return true;
            }
        }

        false
    }

    /// 3-opt, first improvement over the seven reconnections of each removed
    /// edge triple.
    fn three_opt_first(
        &self,
        tour: &mut [usize],
        instance: &ThopInstance,
        nn_list: &[Vec<usize>],
        rng: &mut ChaCha8Rng,
    ) {
        let n = instance.n;
        let last = n - 2;
        let mut pos = vec![0usize; n];
        for (p, &city) in tour.iter().enumerate().take(n) {
            pos[city] = p;
        }
        let mut dlb = vec![false; n];
        let mut scan: Vec<usize> = (1..=n - 3).collect();
        scan.shuffle(rng);

        let mut improvement = true;
        while improvement {
            improvement = false;
            'cities: for &c1 in &scan {
                if self.use_dlb && dlb[c1] {
                    continue;
                }
                let p1 = pos[c1];
                let s1 = tour[p1 + 1];
                let radius = instance.dist(c1, s1);
                for &c2 in nn_list[c1].iter().take(self.nn_ls) {
                    if instance.dist(c1, c2) >= radius {
                        break;
                    }
                    let p2 = pos[c2];
                    if p2 >= last {
                        continue;
                    }
                    for &c3 in nn_list[c2].iter().take(self.nn_ls) {
                        let p3 = pos[c3];
                        if p3 >= last || p3 == p1 || p3 == p2 || p1 == p2 {
                            continue;
                        }
                        let mut edges = [p1, p2, p3];
                        edges.sort_unstable();
                        let [i, j, k] = edges;
                        if self.try_reconnect(tour, &mut pos, &mut dlb, instance, i, j, k) {
                            improvement = true;
                            continue 'cities;
                        }
                    }
                }
                dlb[c1] = true;
            }
        }
    }

    /// Evaluate the seven reconnections of the removed edges at positions
    /// `i < j < k`; apply the first one that shortens the path.
    fn try_reconnect(
        &self,
        tour: &mut [usize],
        pos: &mut [usize],
        dlb: &mut [bool],
        instance: &ThopInstance,
        i: usize,
        j: usize,
        k: usize,
    ) -> bool {
        let a = tour[i];
        let b0 = tour[i + 1];
        let b1 = tour[j];
        let c0 = tour[j + 1];
        let c1 = tour[k];
        let d0 = tour[k + 1];

        let d = |x: usize, y: usize| instance.dist(x, y);
        let old = d(a, b0) + d(b1, c0) + d(c1, d0);

        // (new boundary edges, reversed B, reversed C, segments swapped)
        let modes: [(i64, bool, bool, bool); 7] = [
            (d(a, b1) + d(b0, c0) + d(c1, d0), true, false, false),
            (d(a, b0) + d(b1, c1) + d(c0, d0), false, true, false),
            (d(a, b1) + d(b0, c1) + d(c0, d0), true, true, false),
            (d(a, c0) + d(c1, b0) + d(b1, d0), false, false, true),
            (d(a, c0) + d(c1, b1) + d(b0, d0), true, false, true),
            (d(a, c1) + d(c0, b0) + d(b1, d0), false, true, true),
            (d(a, c1) + d(c0, b1) + d(b0, d0), true, true, true),
        ];

        for &(new, rev_b, rev_c, swap) in &modes {
            if new - old < 0 {
                if swap {
                    let mut seg_b: Vec<usize> = tour[i + 1..=j].to_vec();
                    let mut seg_c: Vec<usize> = tour[j + 1..=k].to_vec();
                    if rev_b {
                        seg_b.reverse();
                    }
                    if rev_c {
                        seg_c.reverse();
                    }
                    let mut p = i + 1;
                    for &city in seg_c.iter().chain(seg_b.iter()) {
                        tour[p] = city;
                        p += 1;
                    }
                    refresh_positions(tour, pos, i + 1, k);
                } else {
                    if rev_b {
                        reverse_segment(tour, pos, i + 1, j);
                    }
                    if rev_c {
                        reverse_segment(tour, pos, j + 1, k);
                    }
                }
                for city in [a, b0, b1, c0, c1, d0] {
                    dlb[city] = false;
                }
                return true;
            }
        }
        false
    }
}

fn reverse_segment(tour: &mut [usize], pos: &mut [usize], from: usize, to: usize) {
    tour[from..=to].reverse();
    refresh_positions(tour, pos, from, to);
}

fn refresh_positions(tour: &[usize], pos: &mut [usize], from: usize, to: usize) {
    for p in from..=to {
        pos[tour[p]] = p;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::{EdgeWeightType, Item, Point, ThopInstance};
    use rand::SeedableRng;

    fn line_instance(cities: usize) -> ThopInstance {
        let points: Vec<Point> = (0..cities - 1)
            .map(|i| Point { x: i as f64, y: 0.0 })
            .collect();
        let n = cities;
        let mut distance = vec![vec![0i64; n]; n];
        let mut max_d = 0;
        for i in 0..n - 1 {
            for j in 0..n - 1 {
                distance[i][j] = EdgeWeightType::Euc2d.distance(points[i], points[j]);
                max_d = max_d.max(distance[i][j]);
            }
        }
        for i in 0..n {
            distance[i][n - 1] = max_d * (n as i64 - 1);
            distance[n - 1][i] = max_d * (n as i64 - 1);
        }
        distance[0][n - 1] = 0;
        distance[n - 1][0] = 0;
        distance[n - 2][n - 1] = 0;
        distance[n - 1][n - 2] = 0;

        ThopInstance {
            name: "line".to_string(),
            knapsack_data_type: "test".to_string(),
            edge_weight_type: EdgeWeightType::Euc2d,
            n,
            m: 1,
            capacity: 10,
            max_time: 1000.0,
            min_speed: 0.1,
            max_speed: 1.0,
            points,
            items: vec![Item { profit: 10, weight: 2, city: 1 }],
            distance,
            ub: 10,
        }
    }

    fn path_length(tour: &[usize], instance: &ThopInstance) -> i64 {
        (0..instance.n - 2)
            .map(|p| instance.dist(tour[p], tour[p + 1]))
            .sum()
    }

    fn assert_pinned_permutation(tour: &[usize], n: usize) {
        let mut seen = vec![false; n];
        for &city in &tour[..n] {
            assert!(!seen[city]);
            seen[city] = true;
        }
        assert!(seen.iter().all(|&s| s));
        assert_eq!(tour[0], 0);
        assert_eq!(tour[n - 2], n - 2);
        assert_eq!(tour[n - 1], n - 1);
        assert_eq!(tour[n], 0);
    }

    fn run_variant(variant: LsVariant) {
        let instance = line_instance(7);
        // free cities out of order: path 0-3-1-2-4-5 has length 9, the
        // sorted path has length 5
        let mut tour = vec![0, 3, 1, 2, 4, 5, 6, 0];
        let ls = LocalSearch { variant, nn_ls: 6, use_dlb: true };
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let before = path_length(&tour, &instance);

        ls.optimize(&mut tour, &instance, &instance.compute_nn_lists(6), &mut rng);

        assert_pinned_permutation(&tour, instance.n);
        assert!(path_length(&tour, &instance) < before);
        assert_eq!(path_length(&tour, &instance), 5);
    }

    #[test]
    fn test_two_opt_uncrosses_path() {
        run_variant(LsVariant::TwoOpt);
    }

    #[test]
    fn test_two_half_opt_uncrosses_path() {
        run_variant(LsVariant::TwoHalfOpt);
    }

    #[test]
    fn test_three_opt_uncrosses_path() {
        run_variant(LsVariant::ThreeOpt);
    }

    #[test]
    fn test_local_optimum_is_stable() {
        let instance = line_instance(7);
        let mut tour = vec![0, 1, 2, 3, 4, 5, 6, 0];
        let ls = LocalSearch { variant: LsVariant::TwoOpt, nn_ls: 6, use_dlb: true };
        let mut rng = ChaCha8Rng::seed_from_u64(11);

        ls.optimize(&mut tour, &instance, &instance.compute_nn_lists(6), &mut rng);
        assert_eq!(tour, vec![0, 1, 2, 3, 4, 5, 6, 0]);
    }

    #[test]
    fn test_two_half_opt_restores_sorted_path() {
        let instance = line_instance(8);
        // city 4 is parked between 1 and 2
        let mut tour = vec![0, 1, 4, 2, 3, 5, 6, 7, 0];
        let ls = LocalSearch { variant: LsVariant::TwoHalfOpt, nn_ls: 7, use_dlb: true };
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let before = path_length(&tour, &instance);

        ls.optimize(&mut tour, &instance, &instance.compute_nn_lists(7), &mut rng);

        assert_pinned_permutation(&tour, instance.n);
        assert!(path_length(&tour, &instance) < before);
        assert_eq!(tour, vec![0, 1, 2, 3, 4, 5, 6, 7, 0]);
    }
}
