use std::marker::PhantomData;
use std::ops::{Add, Sub};

use cv_core::{GrayF32, Image, Pixel};
use cv_imgproc::{pixel_pow2, stdev_from_means, MeanFilter};
use wide::f32x8;

/// Element type of a match-score buffer. All score families are
/// smaller-is-better; NCC achieves this by negating the correlation during
/// normalization, so `WORST` is always the maximum of the type.
pub trait ScoreElement:
    Copy + PartialOrd + Add<Output = Self> + Sub<Output = Self> + Send + Sync + 'static
{
    const WORST: Self;
    fn zero() -> Self;
    /// Addition that cannot wrap past `WORST`; used where `WORST` sentinels
    /// may flow through arithmetic.
    fn sat_add(self, other: Self) -> Self;
    fn to_f64(self) -> f64;
    fn from_f64(v: f64) -> Self;
}

impl ScoreElement for i32 {
    const WORST: i32 = i32::MAX;

    fn zero() -> i32 {
        0
    }

    fn sat_add(self, other: i32) -> i32 {
        self.saturating_add(other)
    }

    fn to_f64(self) -> f64 {
        self as f64
    }

    fn from_f64(v: f64) -> i32 {
        v.min(i32::MAX as f64) as i32
    }
}

impl ScoreElement for f32 {
    const WORST: f32 = f32::MAX;

    fn zero() -> f32 {
        0.0
    }

    fn sat_add(self, other: f32) -> f32 {
        (self + other).min(f32::MAX)
    }

    fn to_f64(self) -> f64 {
        self as f64
    }

    fn from_f64(v: f64) -> f32 {
        v as f32
    }
}

/// Census word element that supports Hamming distances.
pub trait HammingPixel: Pixel {
    fn hamming(self, other: Self) -> i32;
}

impl HammingPixel for u8 {
    fn hamming(self, other: u8) -> i32 {
        (self ^ other).count_ones() as i32
    }
}

impl HammingPixel for i32 {
    fn hamming(self, other: i32) -> i32 {
        (self ^ other).count_ones() as i32
    }
}

impl HammingPixel for i64 {
    fn hamming(self, other: i64) -> i32 {
        (self ^ other).count_ones() as i32
    }
}

/// Per-row, per-disparity match scores for the block matcher.
///
/// `score_row` receives grown rows (index `i` holds the pixel of column
/// `i - radius_x`) and writes the windowed sum for column `x` at disparity
/// `d` to `out[(d - d_min) * width + x]`, for `x in d..width`. Entries for
/// `x < d` are never written and never read.
pub trait BlockRowScore<I: Pixel, S: ScoreElement>: Send + Sync {
    /// Called once per `process()` before any row is scored.
    fn set_input(&mut self, left: &Image<I>, right: &Image<I>);

    fn score_row(
        &self,
        left_row: &[I],
        right_row: &[I],
        out: &mut [S],
        d_min: usize,
        d_max: usize,
        region_width: usize,
        element: &mut [S],
    );

    fn requires_normalize(&self) -> bool {
        false
    }

    /// Rewrites region sums into comparable scores; only NCC needs this.
    #[allow(unused_variables)]
    fn normalize_region_scores(
        &self,
        row: usize,
        scores: &[S],
        d_min: usize,
        d_max: usize,
        region_width: usize,
        region_height: usize,
        out: &mut [S],
    ) {
    }

    /// Largest possible per-pixel error, used to scale the max-error check.
    /// `None` disables the check for this score.
    fn max_per_pixel_error(&self) -> Option<i32> {
        None
    }
}

/// Shared running-sum pass: fills per-pixel errors for each disparity, then
/// produces the width-`region_width` window sums in O(1) per column.
fn fill_and_window<S, F>(
    width: usize,
    radius_x: usize,
    d_min: usize,
    d_max: usize,
    region_width: usize,
    out: &mut [S],
    element: &mut [S],
    fill: F,
) where
    S: ScoreElement,
    F: Fn(usize, usize, &mut [S]),
{
    for d in d_min..=d_max {
        let drel = d - d_min;
        let count = width - d + 2 * radius_x;
        fill(d, count, element);

        let out_row = &mut out[drel * width..(drel + 1) * width];
        let mut sum = S::zero();
        for i in 0..region_width {
            sum = sum + element[i];
        }
        out_row[d] = sum;
        for x in (d + 1)..width {
            let k = x - d;
            sum = sum + element[k + region_width - 1] - element[k - 1];
            out_row[x] = sum;
        }
    }
}

/// Sum of absolute differences on `u8` pixels.
pub struct SadRowScoreU8 {
    width: usize,
}

impl SadRowScoreU8 {
    pub fn new() -> Self {
        Self { width: 0 }
    }
}

impl Default for SadRowScoreU8 {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockRowScore<u8, i32> for SadRowScoreU8 {
    fn set_input(&mut self, left: &Image<u8>, _right: &Image<u8>) {
        self.width = left.width;
    }

    fn score_row(
        &self,
        left_row: &[u8],
        right_row: &[u8],
        out: &mut [i32],
        d_min: usize,
        d_max: usize,
        region_width: usize,
        element: &mut [i32],
    ) {
        fill_and_window(
            self.width,
            region_width / 2,
            d_min,
            d_max,
            region_width,
            out,
            element,
            |d, count, element| {
                for k in 0..count {
                    element[k] = (left_row[k + d] as i32 - right_row[k] as i32).abs();
                }
            },
        );
    }

    fn max_per_pixel_error(&self) -> Option<i32> {
        Some(255)
    }
}

/// Sum of squared differences on `u8` pixels.
pub struct SsdRowScoreU8 {
    width: usize,
}

impl SsdRowScoreU8 {
    pub fn new() -> Self {
        Self { width: 0 }
    }
}

impl Default for SsdRowScoreU8 {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockRowScore<u8, i32> for SsdRowScoreU8 {
    fn set_input(&mut self, left: &Image<u8>, _right: &Image<u8>) {
        self.width = left.width;
    }

    fn score_row(
        &self,
        left_row: &[u8],
        right_row: &[u8],
        out: &mut [i32],
        d_min: usize,
        d_max: usize,
        region_width: usize,
        element: &mut [i32],
    ) {
        fill_and_window(
            self.width,
            region_width / 2,
            d_min,
            d_max,
            region_width,
            out,
            element,
            |d, count, element| {
                for k in 0..count {
                    let diff = left_row[k + d] as i32 - right_row[k] as i32;
                    element[k] = diff * diff;
                }
            },
        );
    }

    fn max_per_pixel_error(&self) -> Option<i32> {
        Some(255 * 255)
    }
}

/// Sum of absolute differences on `f32` pixels, eight lanes at a time.
pub struct SadRowScoreF32 {
    width: usize,
}

impl SadRowScoreF32 {
    pub fn new() -> Self {
        Self { width: 0 }
    }
}

impl Default for SadRowScoreF32 {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockRowScore<f32, f32> for SadRowScoreF32 {
    fn set_input(&mut self, left: &Image<f32>, _right: &Image<f32>) {
        self.width = left.width;
    }

    fn score_row(
        &self,
        left_row: &[f32],
        right_row: &[f32],
        out: &mut [f32],
        d_min: usize,
        d_max: usize,
        region_width: usize,
        element: &mut [f32],
    ) {
        fill_and_window(
            self.width,
            region_width / 2,
            d_min,
            d_max,
            region_width,
            out,
            element,
            |d, count, element| {
                let left = &left_row[d..d + count];
                let right = &right_row[..count];
                let mut k = 0;
                while k + 8 <= count {
                    let lv = f32x8::from([
                        left[k],
                        left[k + 1],
                        left[k + 2],
                        left[k + 3],
                        left[k + 4],
                        left[k + 5],
                        left[k + 6],
                        left[k + 7],
                    ]);
                    let rv = f32x8::from([
                        right[k],
                        right[k + 1],
                        right[k + 2],
                        right[k + 3],
                        right[k + 4],
                        right[k + 5],
                        right[k + 6],
                        right[k + 7],
                    ]);
                    element[k..k + 8].copy_from_slice(&(lv - rv).abs().to_array());
                    k += 8;
                }
                for i in k..count {
                    element[i] = (left[i] - right[i]).abs();
                }
            },
        );
    }
}

/// Hamming distance between census words.
pub struct CensusRowScore<T: HammingPixel> {
    bits: u32,
    width: usize,
    _marker: PhantomData<T>,
}

impl<T: HammingPixel> CensusRowScore<T> {
    pub fn new(bits: u32) -> Self {
        Self {
            bits,
            width: 0,
            _marker: PhantomData,
        }
    }
}

impl<T: HammingPixel> BlockRowScore<T, i32> for CensusRowScore<T> {
    fn set_input(&mut self, left: &Image<T>, _right: &Image<T>) {
        self.width = left.width;
    }

    fn score_row(
        &self,
        left_row: &[T],
        right_row: &[T],
        out: &mut [i32],
        d_min: usize,
        d_max: usize,
        region_width: usize,
        element: &mut [i32],
    ) {
        fill_and_window(
            self.width,
            region_width / 2,
            d_min,
            d_max,
            region_width,
            out,
            element,
            |d, count, element| {
                for k in 0..count {
                    element[k] = left_row[k + d].hamming(right_row[k]);
                }
            },
        );
    }

    fn max_per_pixel_error(&self) -> Option<i32> {
        Some(self.bits as i32)
    }
}

/// Normalized cross-correlation on `f32` pixels.
///
/// `score_row` accumulates raw `L*R` products; `normalize_region_scores`
/// turns the vertical region sums into negated NCC values using mean and
/// standard-deviation images computed once per `set_input`.
pub struct NccRowScoreF32 {
    eps: f32,
    width: usize,
    mean_l: GrayF32,
    mean_r: GrayF32,
    stdev_l: GrayF32,
    stdev_r: GrayF32,
    filter: MeanFilter,
    pow2: GrayF32,
    mean_pow: GrayF32,
}

impl NccRowScoreF32 {
    pub fn new(radius_x: usize, radius_y: usize, eps: f32) -> Self {
        Self {
            eps,
            width: 0,
            mean_l: GrayF32::new(0, 0),
            mean_r: GrayF32::new(0, 0),
            stdev_l: GrayF32::new(0, 0),
            stdev_r: GrayF32::new(0, 0),
            filter: MeanFilter::new(radius_x, radius_y),
            pow2: GrayF32::new(0, 0),
            mean_pow: GrayF32::new(0, 0),
        }
    }
}

impl BlockRowScore<f32, f32> for NccRowScoreF32 {
    fn set_input(&mut self, left: &Image<f32>, right: &Image<f32>) {
        self.width = left.width;

        self.filter.process(left, &mut self.mean_l);
        pixel_pow2(left, &mut self.pow2);
        self.filter.process(&self.pow2, &mut self.mean_pow);
        stdev_from_means(&self.mean_l, &self.mean_pow, &mut self.stdev_l);

        self.filter.process(right, &mut self.mean_r);
        pixel_pow2(right, &mut self.pow2);
        self.filter.process(&self.pow2, &mut self.mean_pow);
        stdev_from_means(&self.mean_r, &self.mean_pow, &mut self.stdev_r);
    }

    fn score_row(
        &self,
        left_row: &[f32],
        right_row: &[f32],
        out: &mut [f32],
        d_min: usize,
        d_max: usize,
        region_width: usize,
        element: &mut [f32],
    ) {
        fill_and_window(
            self.width,
            region_width / 2,
            d_min,
            d_max,
            region_width,
            out,
            element,
            |d, count, element| {
                for k in 0..count {
                    element[k] = left_row[k + d] * right_row[k];
                }
            },
        );
    }

    fn requires_normalize(&self) -> bool {
        true
    }

    fn normalize_region_scores(
        &self,
        row: usize,
        scores: &[f32],
        d_min: usize,
        d_max: usize,
        region_width: usize,
        region_height: usize,
        out: &mut [f32],
    ) {
        let width = self.width;
        let area = (region_width * region_height) as f32;
        let r = region_width / 2;

        let mean_l = self.mean_l.row(row);
        let mean_r = self.mean_r.row(row);
        let stdev_l = self.stdev_l.row(row);
        let stdev_r = self.stdev_r.row(row);

        for d in d_min..=d_max {
            let base = (d - d_min) * width;
            for x in d..width {
                let correlation = scores[base + x] / area;
                // A smaller support region at the ends of the valid span
                // makes spurious peaks likelier; damp them harder.
                let eps = if x < d + r || x + r >= width {
                    self.eps + 1.0
                } else {
                    self.eps
                };
                let xr = x - d;
                let value = (correlation - mean_l[x] * mean_r[xr])
                    / (eps + stdev_l[x] * stdev_r[xr]);
                out[base + x] = -value;
            }
        }
    }
}
