use rayon::prelude::*;

use super::{CostVolume, MAX_COST};
use crate::score::HammingPixel;
use cv_core::{GrayU8, Image};

use super::hmi::StereoMutualInformation;

/// Fills one cost row given a per-pixel error function of the left pixel
/// value and the right column index.
fn fill_rows<F>(left: &GrayU8, d_min: usize, vol: &mut CostVolume, concurrent: bool, cost_at: F)
where
    F: Fn(usize, usize, usize) -> u16 + Send + Sync,
{
    let width = left.width;
    let range = vol.range;
    let row_len = width * range;

    let fill_row = |y: usize, row: &mut [u16]| {
        for x in 0..width {
            let cell = &mut row[x * range..(x + 1) * range];
            for (d, out) in cell.iter_mut().enumerate() {
                let reach = d_min + d;
                *out = if x >= reach {
                    cost_at(y, x, x - reach)
                } else {
                    MAX_COST
                };
            }
        }
    };

    if concurrent {
        vol.data
            .par_chunks_mut(row_len)
            .enumerate()
            .for_each(|(y, row)| fill_row(y, row));
    } else {
        for (y, row) in vol.data.chunks_mut(row_len).enumerate() {
            fill_row(y, row);
        }
    }
}

/// Absolute-difference cost: `MAX_COST * |left - right| / 255`.
pub fn compute_cost_ad(
    left: &GrayU8,
    right: &GrayU8,
    d_min: usize,
    range: usize,
    vol: &mut CostVolume,
    concurrent: bool,
) {
    vol.reshape(left.width, left.height, range);
    fill_rows(left, d_min, vol, concurrent, |y, x, xr| {
        let l = left.get(x, y) as i32;
        let r = right.get(xr, y) as i32;
        (MAX_COST as i32 * (l - r).abs() / 255) as u16
    });
}

/// Hamming cost on census words: `MAX_COST * popcount(l ^ r) / bits`, where
/// `bits` is the transform's comparison count.
pub fn compute_cost_hamming<T: HammingPixel>(
    left: &Image<T>,
    right: &Image<T>,
    bits: u32,
    d_min: usize,
    range: usize,
    vol: &mut CostVolume,
    concurrent: bool,
) {
    vol.reshape(left.width, left.height, range);
    let width = left.width;
    let row_len = width * range;

    let fill_row = |y: usize, row: &mut [u16]| {
        let lrow = left.row(y);
        let rrow = right.row(y);
        for x in 0..width {
            let cell = &mut row[x * range..(x + 1) * range];
            for (d, out) in cell.iter_mut().enumerate() {
                let reach = d_min + d;
                *out = if x >= reach {
                    (MAX_COST as u32 * lrow[x].hamming(rrow[x - reach]) as u32 / bits) as u16
                } else {
                    MAX_COST
                };
            }
        }
    };

    if concurrent {
        vol.data
            .par_chunks_mut(row_len)
            .enumerate()
            .for_each(|(y, row)| fill_row(y, row));
    } else {
        for (y, row) in vol.data.chunks_mut(row_len).enumerate() {
            fill_row(y, row);
        }
    }
}

/// Mutual-information cost from a precomputed table.
pub fn compute_cost_mi(
    left: &GrayU8,
    right: &GrayU8,
    mi: &StereoMutualInformation,
    d_min: usize,
    range: usize,
    vol: &mut CostVolume,
    concurrent: bool,
) {
    vol.reshape(left.width, left.height, range);
    fill_rows(left, d_min, vol, concurrent, |y, x, xr| {
        mi.cost(left.get(x, y), right.get(xr, y))
    });
}

/// Box-mean smoothing of the cost volume over a
/// `(2*rx + 1) x (2*ry + 1)` window per disparity plane. Window samples
/// clamp to the image edge and the result is divided by the window area, so
/// smoothed costs stay within `[0, MAX_COST]`.
pub fn block_mean_costs(
    vol: &CostVolume,
    radius_x: usize,
    radius_y: usize,
    tmp: &mut Vec<u32>,
    out: &mut CostVolume,
) {
    let width = vol.width;
    let height = vol.height;
    let range = vol.range;
    out.reshape(width, height, range);
    tmp.clear();
    tmp.resize(width * height * range, 0);

    let rx = radius_x as isize;
    let ry = radius_y as isize;
    let clamp_x = |x: isize| x.clamp(0, width as isize - 1) as usize;
    let clamp_y = |y: isize| y.clamp(0, height as isize - 1) as usize;

    // Horizontal pass: rolling sums along x for every (y, d).
    for y in 0..height {
        let row = &vol.data[vol.index(y, 0)..vol.index(y, 0) + width * range];
        let trow = &mut tmp[y * width * range..(y + 1) * width * range];
        for d in 0..range {
            let mut sum = 0u32;
            for i in -rx..=rx {
                sum += row[clamp_x(i) * range + d] as u32;
            }
            trow[d] = sum;
            for x in 1..width as isize {
                sum += row[clamp_x(x + rx) * range + d] as u32;
                sum -= row[clamp_x(x - rx - 1) * range + d] as u32;
                trow[x as usize * range + d] = sum;
            }
        }
    }

    // Vertical pass: rolling column sums over whole rows.
    let area = ((2 * rx + 1) * (2 * ry + 1)) as u32;
    let row_len = width * range;
    let mut col_sum = vec![0u32; row_len];
    for i in -ry..=ry {
        let src = &tmp[clamp_y(i) * row_len..(clamp_y(i) + 1) * row_len];
        for (acc, &v) in col_sum.iter_mut().zip(src) {
            *acc += v;
        }
    }
    for (o, &s) in out.data[..row_len].iter_mut().zip(col_sum.iter()) {
        *o = (s / area) as u16;
    }
    for y in 1..height as isize {
        let add = clamp_y(y + ry) * row_len;
        let sub = clamp_y(y - ry - 1) * row_len;
        for i in 0..row_len {
            col_sum[i] = col_sum[i] + tmp[add + i] - tmp[sub + i];
        }
        let dst = &mut out.data[y as usize * row_len..(y as usize + 1) * row_len];
        for (o, &s) in dst.iter_mut().zip(col_sum.iter()) {
            *o = (s / area) as u16;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ad_cost_scaling_endpoints() {
        let left = GrayU8::from_fn(6, 2, |_, _| 255);
        let right = GrayU8::from_fn(6, 2, |_, _| 0);
        let mut vol = CostVolume::new();
        compute_cost_ad(&left, &right, 0, 4, &mut vol, false);

        // Max-contrast pair: every reachable cost is MAX_COST, and so are
        // the unreachable sentinels.
        for x in 0..6 {
            for d in 0..4 {
                let c = vol.data[vol.index(0, x) + d];
                assert_eq!(c, MAX_COST);
            }
        }

        let mut vol_zero = CostVolume::new();
        compute_cost_ad(&left, &left, 0, 4, &mut vol_zero, false);
        for x in 1..6 {
            assert_eq!(vol_zero.data[vol_zero.index(1, x)], 0);
        }
    }

    #[test]
    fn test_unreachable_columns_get_max_cost() {
        let left = GrayU8::from_fn(8, 1, |x, _| x as u8);
        let mut vol = CostVolume::new();
        compute_cost_ad(&left, &left, 2, 4, &mut vol, false);

        // x = 3 with d_min = 2: only d = 0 and d = 1 reach the right image.
        let cell = &vol.data[vol.index(0, 3)..vol.index(0, 3) + 4];
        assert_eq!(cell[0], (MAX_COST as u32 * 2 / 255) as u16);
        assert_eq!(cell[1], (MAX_COST as u32 * 3 / 255) as u16);
        assert_eq!(cell[2], MAX_COST);
        assert_eq!(cell[3], MAX_COST);
    }

    #[test]
    fn test_hamming_cost_uses_transform_bits() {
        // Words differing in exactly 6 of 24 bits -> MAX_COST * 6 / 24.
        let left = Image::<i32>::from_fn(4, 1, |_, _| 0b111111);
        let right = Image::<i32>::from_fn(4, 1, |_, _| 0);
        let mut vol = CostVolume::new();
        compute_cost_hamming(&left, &right, 24, 0, 2, &mut vol, false);
        assert_eq!(vol.data[vol.index(0, 2)], MAX_COST * 6 / 24);
    }

    #[test]
    fn test_serial_and_concurrent_fill_agree() {
        let left = GrayU8::from_fn(20, 10, |x, y| ((x * 13 + y * 7) % 256) as u8);
        let right = GrayU8::from_fn(20, 10, |x, y| ((x * 11 + y * 3) % 256) as u8);
        let mut a = CostVolume::new();
        let mut b = CostVolume::new();
        compute_cost_ad(&left, &right, 1, 8, &mut a, false);
        compute_cost_ad(&left, &right, 1, 8, &mut b, true);
        assert_eq!(a.data, b.data);
    }

    #[test]
    fn test_block_mean_preserves_constant_volume() {
        let mut vol = CostVolume::new();
        vol.reshape(9, 6, 3);
        vol.data.fill(600);
        let mut tmp = Vec::new();
        let mut out = CostVolume::new();
        block_mean_costs(&vol, 2, 1, &mut tmp, &mut out);
        assert!(out.data.iter().all(|&v| v == 600));
    }

    #[test]
    fn test_block_mean_bounded_by_max_cost() {
        let mut vol = CostVolume::new();
        vol.reshape(12, 8, 4);
        for (i, v) in vol.data.iter_mut().enumerate() {
            *v = ((i * 37) % (MAX_COST as usize + 1)) as u16;
        }
        let mut tmp = Vec::new();
        let mut out = CostVolume::new();
        block_mean_costs(&vol, 3, 2, &mut tmp, &mut out);
        assert!(out.data.iter().all(|&v| v <= MAX_COST));
    }
}
