use rayon::prelude::*;

use super::CostVolume;
use crate::config::SgmPaths;

/// Scan directions per path count: the unit axes, then the diagonals, then
/// the knight moves. Aggregation always runs them in this order so results
/// stay deterministic even when the saturating accumulation clips.
pub fn directions(paths: SgmPaths) -> &'static [(i32, i32)] {
    const DIRS: [(i32, i32); 16] = [
        (1, 0),
        (-1, 0),
        (0, 1),
        (0, -1),
        (1, 1),
        (-1, -1),
        (1, -1),
        (-1, 1),
        (2, 1),
        (-2, -1),
        (2, -1),
        (-2, 1),
        (1, 2),
        (-1, -2),
        (1, -2),
        (-1, 2),
    ];
    &DIRS[..paths.count()]
}

/// Directional dynamic-programming aggregation.
///
/// For every path direction `r` the per-pixel recurrence is
/// `L(p, d) = C(p, d) + min(L(p-r, d), L(p-r, d-1) + P1, L(p-r, d+1) + P1,
/// min_k L(p-r, k) + P2) - min_k L(p-r, k)`, which keeps each path value in
/// `[0, MAX_COST + P2]`. Path values accumulate into the output volume with
/// saturating `u16` adds.
pub struct SgmAggregator {
    p1: u16,
    p2: u16,
    paths: SgmPaths,
}

/// Reusable previous/current recurrence vectors for one scanline.
struct Scanline {
    prev: Vec<u16>,
    cur: Vec<u16>,
}

impl Scanline {
    fn new(range: usize) -> Self {
        Self {
            prev: vec![0; range],
            cur: vec![0; range],
        }
    }
}

impl SgmAggregator {
    pub fn new(p1: u16, p2: u16, paths: SgmPaths) -> Self {
        Self { p1, p2, paths }
    }

    pub fn paths(&self) -> SgmPaths {
        self.paths
    }

    /// Computes the aggregated volume `out` from the cost volume. The two
    /// horizontal directions run as one parallel pass over rows; every other
    /// direction walks its entry rays serially in the fixed order of
    /// [`directions`].
    pub fn process(&self, costs: &CostVolume, out: &mut CostVolume, concurrent: bool) {
        out.reshape(costs.width, costs.height, costs.range);
        out.data.fill(0);

        self.aggregate_horizontal(costs, out, concurrent);

        let mut scanline = Scanline::new(costs.range);
        for &dir in directions(self.paths) {
            if dir == (1, 0) || dir == (-1, 0) {
                continue;
            }
            self.aggregate_direction(costs, out, dir, &mut scanline);
        }
    }

    /// Forward and backward horizontal paths, row by row.
    fn aggregate_horizontal(&self, costs: &CostVolume, out: &mut CostVolume, concurrent: bool) {
        let range = costs.range;
        let row_len = costs.width * range;
        let p1 = self.p1;
        let p2 = self.p2;

        let scan_both = |scanline: &mut Scanline, crow: &[u16], srow: &mut [u16]| {
            scan_row(crow, srow, range, false, scanline, p1, p2);
            scan_row(crow, srow, range, true, scanline, p1, p2);
        };

        if concurrent {
            out.data
                .par_chunks_mut(row_len)
                .zip(costs.data.par_chunks(row_len))
                .for_each_init(
                    || Scanline::new(range),
                    |scanline, (srow, crow)| scan_both(scanline, crow, srow),
                );
        } else {
            let mut scanline = Scanline::new(range);
            for (srow, crow) in out.data.chunks_mut(row_len).zip(costs.data.chunks(row_len)) {
                scan_both(&mut scanline, crow, srow);
            }
        }
    }

    /// Walks every ray of direction `(dx, dy)`: a ray starts at each pixel
    /// whose predecessor along the direction falls outside the image.
    fn aggregate_direction(
        &self,
        costs: &CostVolume,
        out: &mut CostVolume,
        (dx, dy): (i32, i32),
        scanline: &mut Scanline,
    ) {
        let width = costs.width as i32;
        let height = costs.height as i32;

        for y in 0..height {
            for x in 0..width {
                let px = x - dx;
                let py = y - dy;
                if px >= 0 && px < width && py >= 0 && py < height {
                    continue;
                }
                self.walk_ray(costs, out, x, y, dx, dy, scanline);
            }
        }
    }

    fn walk_ray(
        &self,
        costs: &CostVolume,
        out: &mut CostVolume,
        x0: i32,
        y0: i32,
        dx: i32,
        dy: i32,
        scanline: &mut Scanline,
    ) {
        let width = costs.width as i32;
        let height = costs.height as i32;
        let range = costs.range;

        // Path entry: L equals the raw cost.
        let mut idx = costs.index(y0 as usize, x0 as usize);
        scanline.prev.copy_from_slice(&costs.data[idx..idx + range]);
        let mut min_prev = accumulate(&mut out.data[idx..idx + range], &scanline.prev);

        let mut x = x0 + dx;
        let mut y = y0 + dy;
        while x >= 0 && x < width && y >= 0 && y < height {
            idx = costs.index(y as usize, x as usize);
            let crow = &costs.data[idx..idx + range];
            let next_min = recurrence_step(
                crow,
                &scanline.prev,
                &mut scanline.cur,
                min_prev,
                self.p1,
                self.p2,
            );
            accumulate(&mut out.data[idx..idx + range], &scanline.cur);
            std::mem::swap(&mut scanline.prev, &mut scanline.cur);
            min_prev = next_min;

            x += dx;
            y += dy;
        }
    }
}

/// One horizontal scanline pass over a row of the volume, in either
/// direction.
fn scan_row(crow: &[u16], srow: &mut [u16], range: usize, reverse: bool, scanline: &mut Scanline, p1: u16, p2: u16) {
    let width = crow.len() / range;
    let column = |i: usize| if reverse { width - 1 - i } else { i };

    let base = column(0) * range;
    scanline.prev.copy_from_slice(&crow[base..base + range]);
    let mut min_prev = accumulate(&mut srow[base..base + range], &scanline.prev);

    for i in 1..width {
        let base = column(i) * range;
        let next_min = recurrence_step(
            &crow[base..base + range],
            &scanline.prev,
            &mut scanline.cur,
            min_prev,
            p1,
            p2,
        );
        accumulate(&mut srow[base..base + range], &scanline.cur);
        std::mem::swap(&mut scanline.prev, &mut scanline.cur);
        min_prev = next_min;
    }
}

/// The SGM recurrence for one pixel. Candidate order on ties: same
/// disparity, `d-1`, `d+1`, then the global minimum.
fn recurrence_step(
    crow: &[u16],
    prev: &[u16],
    cur: &mut [u16],
    min_prev: u16,
    p1: u16,
    p2: u16,
) -> u16 {
    let range = crow.len();
    let p1 = p1 as u32;
    let jump = min_prev as u32 + p2 as u32;
    let mut next_min = u16::MAX;

    for d in 0..range {
        let mut best = prev[d] as u32;
        if d > 0 {
            let c = prev[d - 1] as u32 + p1;
            if c < best {
                best = c;
            }
        }
        if d + 1 < range {
            let c = prev[d + 1] as u32 + p1;
            if c < best {
                best = c;
            }
        }
        if jump < best {
            best = jump;
        }
        // Stays within MAX_COST + P2, which the config validated against
        // u16::MAX.
        let value = (crow[d] as u32 + best - min_prev as u32) as u16;
        cur[d] = value;
        if value < next_min {
            next_min = value;
        }
    }
    next_min
}

/// Saturating add of the path values into the aggregated slice; returns the
/// minimum path value for the renormalization of the next step.
fn accumulate(out: &mut [u16], values: &[u16]) -> u16 {
    let mut min_value = u16::MAX;
    for (o, &v) in out.iter_mut().zip(values) {
        *o = o.saturating_add(v);
        if v < min_value {
            min_value = v;
        }
    }
    min_value
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sgm::MAX_COST;

    fn volume(width: usize, height: usize, range: usize, f: impl Fn(usize, usize, usize) -> u16) -> CostVolume {
        let mut vol = CostVolume::new();
        vol.reshape(width, height, range);
        for y in 0..height {
            for x in 0..width {
                for d in 0..range {
                    let idx = vol.index(y, x) + d;
                    vol.data[idx] = f(x, y, d);
                }
            }
        }
        vol
    }

    #[test]
    fn test_zero_penalties_reduce_to_path_count_times_cost() {
        // With P1 = P2 = 0 the recurrence collapses to the raw cost, so the
        // aggregation is the cost scaled by the number of paths.
        let costs = volume(9, 7, 5, |x, y, d| ((x * 3 + y * 5 + d * 7) % 50) as u16);
        let mut out = CostVolume::new();
        SgmAggregator::new(0, 0, SgmPaths::Paths8).process(&costs, &mut out, false);

        for (i, (&s, &c)) in out.data.iter().zip(&costs.data).enumerate() {
            assert_eq!(s, c * 8, "flat volume mismatch at {i}");
        }
    }

    #[test]
    fn test_penalties_smooth_an_outlier() {
        // A single pixel prefers d=3 while everything else prefers d=1;
        // with a large P2 the aggregation pulls the outlier toward d=1.
        let width = 15;
        let costs = volume(width, 5, 5, |x, y, d| {
            let preferred = if x == 7 && y == 2 { 3 } else { 1 };
            if d == preferred {
                0
            } else {
                100
            }
        });

        let wta = |vol: &CostVolume, x: usize, y: usize| {
            let idx = vol.index(y, x);
            (0..vol.range)
                .min_by_key(|&d| vol.data[idx + d])
                .unwrap()
        };

        let mut weak = CostVolume::new();
        SgmAggregator::new(0, 0, SgmPaths::Paths8).process(&costs, &mut weak, false);
        assert_eq!(wta(&weak, 7, 2), 3, "no penalties keep the outlier");

        let mut strong = CostVolume::new();
        SgmAggregator::new(50, 500, SgmPaths::Paths8).process(&costs, &mut strong, false);
        assert_eq!(wta(&strong, 7, 2), 1, "penalties must smooth the outlier");
    }

    #[test]
    fn test_path_values_bounded_by_max_cost_plus_p2() {
        let p2 = 300u16;
        let costs = volume(12, 9, 6, |x, y, d| {
            ((x * 11 + y * 13 + d * 17) % (MAX_COST as usize + 1)) as u16
        });
        let mut out = CostVolume::new();
        SgmAggregator::new(40, p2, SgmPaths::Paths16).process(&costs, &mut out, false);

        let bound = 16 * (MAX_COST as u32 + p2 as u32);
        for &s in &out.data {
            assert!((s as u32) <= bound);
        }
    }

    #[test]
    fn test_serial_and_concurrent_agree() {
        let costs = volume(20, 12, 8, |x, y, d| ((x * 7 + y * 3 + d * 5) % 900) as u16);
        let mut serial = CostVolume::new();
        let mut parallel = CostVolume::new();
        let agg = SgmAggregator::new(15, 150, SgmPaths::Paths8);
        agg.process(&costs, &mut serial, false);
        agg.process(&costs, &mut parallel, true);
        assert_eq!(serial.data, parallel.data);
    }

    #[test]
    fn test_direction_count() {
        assert_eq!(directions(SgmPaths::Paths4).len(), 4);
        assert_eq!(directions(SgmPaths::Paths8).len(), 8);
        assert_eq!(directions(SgmPaths::Paths16).len(), 16);
    }
}
