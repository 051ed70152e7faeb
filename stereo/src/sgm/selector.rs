use rayon::prelude::*;

use super::CostVolume;
use cv_core::{GrayF32, GrayU8};

use crate::select::subpixel_offset;

/// Winner-take-all over the aggregated volume plus the validity checks, in
/// the same order as the block-matching selector: max error, right-to-left
/// consistency, texture. Candidate disparities at column `x` are limited to
/// those whose right-image column `x - d_min - d` exists.
#[derive(Debug, Clone)]
pub struct SgmDisparitySelector {
    d_min: usize,
    range: usize,
    max_error: u32,
    validate_rtol: i32,
    texture: f64,
}

impl SgmDisparitySelector {
    /// `max_error < 0` disables the error check; otherwise the per-pixel cap
    /// is scaled by the number of aggregated paths.
    pub fn new(d_min: usize, range: usize, max_error: i32, paths: usize, validate_rtol: i32, texture: f64) -> Self {
        let max_error = if max_error < 0 {
            u32::MAX
        } else {
            (max_error as u32).saturating_mul(paths as u32)
        };
        Self {
            d_min,
            range,
            max_error,
            validate_rtol,
            texture,
        }
    }

    pub fn invalid_code(&self) -> u8 {
        self.range as u8
    }

    pub fn select(&self, aggregated: &CostVolume, out: &mut GrayU8, concurrent: bool) {
        out.reshape(aggregated.width, aggregated.height);
        let row_len = aggregated.width * aggregated.range;
        if concurrent {
            out.data
                .par_chunks_mut(aggregated.width)
                .zip(aggregated.data.par_chunks(row_len))
                .for_each(|(out_row, s_row)| self.select_row(s_row, out_row));
        } else {
            for (out_row, s_row) in out.data.chunks_mut(aggregated.width).zip(aggregated.data.chunks(row_len)) {
                self.select_row(s_row, out_row);
            }
        }
    }

    pub fn select_subpixel(&self, aggregated: &CostVolume, out: &mut GrayF32, concurrent: bool) {
        out.reshape(aggregated.width, aggregated.height);
        let row_len = aggregated.width * aggregated.range;
        if concurrent {
            out.data
                .par_chunks_mut(aggregated.width)
                .zip(aggregated.data.par_chunks(row_len))
                .for_each(|(out_row, s_row)| self.select_row_subpixel(s_row, out_row));
        } else {
            for (out_row, s_row) in out.data.chunks_mut(aggregated.width).zip(aggregated.data.chunks(row_len)) {
                self.select_row_subpixel(s_row, out_row);
            }
        }
    }

    /// Returns the winning relative disparity and the candidate count, or
    /// `None` when the pixel fails a check.
    fn select_at(&self, s_row: &[u16], width: usize, x: usize) -> Option<(usize, usize)> {
        if x < self.d_min {
            return None;
        }
        let local_max = (x - self.d_min + 1).min(self.range);
        let cell = &s_row[x * self.range..(x + 1) * self.range];

        let mut best = cell[0];
        let mut best_rel = 0usize;
        for (d, &s) in cell.iter().enumerate().take(local_max).skip(1) {
            if s < best {
                best = s;
                best_rel = d;
            }
        }

        if best as u32 > self.max_error {
            return None;
        }

        if self.validate_rtol >= 0 {
            let xr = x - (self.d_min + best_rel);
            let mut right_best = u16::MAX;
            let mut right_rel = 0usize;
            for d in 0..self.range {
                let xl = xr + self.d_min + d;
                if xl >= width {
                    break;
                }
                let s = s_row[xl * self.range + d];
                if s < right_best {
                    right_best = s;
                    right_rel = d;
                }
            }
            if (right_rel as i32 - best_rel as i32).abs() > self.validate_rtol {
                return None;
            }
        }

        if self.texture > 0.0 && local_max >= 3 {
            let mut second = u16::MAX;
            for (d, &s) in cell.iter().enumerate().take(local_max) {
                if d + 1 >= best_rel && d <= best_rel + 1 {
                    continue;
                }
                if s < second {
                    second = s;
                }
            }
            if second < u16::MAX
                && (second as f64 - best as f64) <= best as f64 * self.texture
            {
                return None;
            }
        }

        Some((best_rel, local_max))
    }

    fn select_row(&self, s_row: &[u16], out_row: &mut [u8]) {
        let width = out_row.len();
        for (x, out) in out_row.iter_mut().enumerate() {
            *out = match self.select_at(s_row, width, x) {
                Some((best_rel, _)) => best_rel as u8,
                None => self.invalid_code(),
            };
        }
    }

    fn select_row_subpixel(&self, s_row: &[u16], out_row: &mut [f32]) {
        let width = out_row.len();
        for (x, out) in out_row.iter_mut().enumerate() {
            *out = match self.select_at(s_row, width, x) {
                Some((best_rel, local_max)) => {
                    let cell = &s_row[x * self.range..(x + 1) * self.range];
                    let delta = if best_rel > 0 && best_rel + 1 < local_max {
                        subpixel_offset(
                            cell[best_rel - 1] as f64,
                            cell[best_rel] as f64,
                            cell[best_rel + 1] as f64,
                        )
                    } else {
                        0.0
                    };
                    (self.d_min + best_rel) as f32 + delta as f32
                }
                None => self.range as f32,
            };
        }
    }
}
