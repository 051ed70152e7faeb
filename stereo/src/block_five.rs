use cv_core::{check_same_shape, Error, GrayF32, GrayU8, Image, Pixel, Result};
use cv_imgproc::{BorderMode, ImageBorder};
use cv_runtime::{loop_blocks_sliced, ScratchPool};

use crate::config::DisparityConfig;
use crate::score::{BlockRowScore, ScoreElement};
use crate::select::{DisparitySelect, SelectErrorSubpixel, SelectErrorWithChecks};

/// Block-matching disparity with best-of-five region aggregation.
///
/// Row scores are computed once per image row and reused through two rolling
/// windows: a horizontal ring of the last `2*ry + 1` row scores, and the
/// matching ring of vertically summed region scores. The final score for a
/// pixel combines its centered region with the two best of four corner
/// regions offset by `±rx, ±ry`.
///
/// Rows are processed in bands; each worker owns a [`WorkSpace`] checked out
/// of a scratch pool and writes a disjoint slice of the output.
pub struct DisparityBlockMatchBestFive<I: Pixel, S: ScoreElement> {
    cfg: DisparityConfig,
    radius_x: usize,
    radius_y: usize,
    use_concurrent: bool,
    score_rows: Box<dyn BlockRowScore<I, S>>,
    border: ImageBorder<I>,
    pool: ScratchPool<WorkSpace<I, S>>,
}

struct WorkSpace<I, S> {
    /// Per-pixel errors for one (row, disparity) pass.
    element_score: Vec<S>,
    /// Ring of per-row window sums, one entry per ring slot.
    horizontal_score: Vec<Vec<S>>,
    /// Ring of vertically summed region scores.
    vertical_score: Vec<Vec<S>>,
    /// Normalized copies of `vertical_score` (NCC only).
    vertical_score_norm: Vec<Vec<S>>,
    /// Which ring slot is being filled.
    active_vertical_score: usize,
    /// Combined five-region score handed to the selector.
    five_score: Vec<S>,
    left_row: Vec<I>,
    right_row: Vec<I>,
}

impl<I: Pixel, S: ScoreElement> WorkSpace<I, S> {
    fn empty() -> Self {
        Self {
            element_score: Vec::new(),
            horizontal_score: Vec::new(),
            vertical_score: Vec::new(),
            vertical_score_norm: Vec::new(),
            active_vertical_score: 0,
            five_score: Vec::new(),
            left_row: Vec::new(),
            right_row: Vec::new(),
        }
    }

    fn check_size(
        &mut self,
        length_horizontal: usize,
        region_height: usize,
        grown_len: usize,
        needs_norm: bool,
    ) {
        let resize_rings = self.horizontal_score.len() != region_height
            || self.five_score.len() != length_horizontal;
        if resize_rings {
            self.horizontal_score = vec![vec![S::zero(); length_horizontal]; region_height];
            self.vertical_score = vec![vec![S::zero(); length_horizontal]; region_height];
            self.five_score = vec![S::zero(); length_horizontal];
        }
        if needs_norm && (resize_rings || self.vertical_score_norm.len() != region_height) {
            self.vertical_score_norm = vec![vec![S::zero(); length_horizontal]; region_height];
        }
        if self.element_score.len() != grown_len {
            self.element_score = vec![S::zero(); grown_len];
            self.left_row = vec![I::default(); grown_len];
            self.right_row = vec![I::default(); grown_len];
        }
    }
}

/// Borrows ring slot `write` mutably and `read` immutably.
fn two_slots<T>(ring: &mut [Vec<T>], write: usize, read: usize) -> (&mut [T], &[T]) {
    debug_assert_ne!(write, read);
    if write < read {
        let (lo, hi) = ring.split_at_mut(read);
        (&mut lo[write], &hi[0])
    } else {
        let (lo, hi) = ring.split_at_mut(write);
        (&mut hi[0], &lo[read])
    }
}

impl<I: Pixel, S: ScoreElement> DisparityBlockMatchBestFive<I, S> {
    pub fn new(
        cfg: DisparityConfig,
        radius_x: usize,
        radius_y: usize,
        use_concurrent: bool,
        score_rows: Box<dyn BlockRowScore<I, S>>,
    ) -> Self {
        Self {
            cfg,
            radius_x,
            radius_y,
            use_concurrent,
            score_rows,
            border: ImageBorder::new(BorderMode::Replicate),
            pool: ScratchPool::new(WorkSpace::empty),
        }
    }

    pub fn disparity_min(&self) -> usize {
        self.cfg.disparity_min
    }

    pub fn disparity_range(&self) -> usize {
        self.cfg.disparity_range
    }

    fn region_width(&self) -> usize {
        2 * self.radius_x + 1
    }

    fn region_height(&self) -> usize {
        2 * self.radius_y + 1
    }

    /// Threshold for the selector's max-error check: the configured
    /// per-pixel cap over the three summed regions, bounded by what the
    /// score can actually produce. `None` disables the check.
    fn max_region_error(&self) -> Option<S> {
        if self.cfg.max_error < 0 {
            return None;
        }
        let per_pixel = self
            .score_rows
            .max_per_pixel_error()
            .map(|m| m.min(self.cfg.max_error))?;
        let area = 3 * self.region_width() * self.region_height();
        Some(S::from_f64(per_pixel as f64 * area as f64))
    }

    /// Computes integer disparity: `v < range` encodes `disparity_min + v`,
    /// `v == range` marks the pixel invalid.
    pub fn process(&mut self, left: &Image<I>, right: &Image<I>, disparity: &mut GrayU8) -> Result<()> {
        let select =
            SelectErrorWithChecks::<S>::new(self.cfg.validate_rtol, self.cfg.texture);
        self.process_with(left, right, disparity, select)
    }

    /// Computes sub-pixel disparity; `range as f32` marks invalid pixels.
    pub fn process_subpixel(
        &mut self,
        left: &Image<I>,
        right: &Image<I>,
        disparity: &mut GrayF32,
    ) -> Result<()> {
        let select = SelectErrorSubpixel::<S>::new(self.cfg.validate_rtol, self.cfg.texture);
        self.process_with(left, right, disparity, select)
    }

    fn process_with<D, Sel>(
        &mut self,
        left: &Image<I>,
        right: &Image<I>,
        disparity: &mut Image<D>,
        mut select: Sel,
    ) -> Result<()>
    where
        D: Pixel,
        Sel: DisparitySelect<S, D>,
    {
        check_same_shape(left, right)?;
        let width = left.width;
        let height = left.height;
        let d_max = self.cfg.disparity_max();
        if d_max >= width {
            return Err(Error::InvalidConfiguration(format!(
                "Maximum disparity {} is too large for image width {}",
                d_max, width
            )));
        }
        disparity.reshape_like(left);

        self.score_rows.set_input(left, right);
        select.configure(width, self.cfg.disparity_min, d_max, self.radius_x * 2, self.max_region_error());

        let this = &*self;
        let out = &mut disparity.data[..];
        loop_blocks_sliced(
            self.use_concurrent,
            0,
            height,
            this.region_height(),
            width,
            out,
            &this.pool,
            |ws, lo, hi, band| {
                this.compute_block(ws, lo, hi, band, left, right, &select);
            },
        );
        Ok(())
    }

    fn compute_block<D, Sel>(
        &self,
        ws: &mut WorkSpace<I, S>,
        band_lo: usize,
        band_hi: usize,
        band_out: &mut [D],
        left: &Image<I>,
        right: &Image<I>,
        select_template: &Sel,
    ) where
        D: Pixel,
        Sel: DisparitySelect<S, D>,
    {
        let width = left.width;
        let length_horizontal = width * self.cfg.disparity_range;
        let grown_len = width + 2 * self.radius_x;
        let needs_norm = self.score_rows.requires_normalize();
        ws.check_size(length_horizontal, self.region_height(), grown_len, needs_norm);

        let mut select = select_template.clone();
        let row0 = band_lo as isize - 2 * self.radius_y as isize;
        let row1 = band_hi as isize + 2 * self.radius_y as isize;

        self.compute_first_row(row0, ws, left, right);
        self.compute_remaining_rows(row0, row1, ws, left, right, &mut select, band_out, band_lo);
    }

    /// Scores the first `region_height` rows of the band and seeds ring
    /// slot 0 with their vertical sum.
    fn compute_first_row(
        &self,
        row0: isize,
        ws: &mut WorkSpace<I, S>,
        left: &Image<I>,
        right: &Image<I>,
    ) {
        let d_min = self.cfg.disparity_min;
        let d_max = self.cfg.disparity_max();
        let rx = self.radius_x;
        let ry = self.radius_y;
        ws.active_vertical_score = 1;

        for r in 0..self.region_height() {
            self.border.grow_row(left, row0 + r as isize, rx, rx, &mut ws.left_row);
            self.border.grow_row(right, row0 + r as isize, rx, rx, &mut ws.right_row);
            self.score_rows.score_row(
                &ws.left_row,
                &ws.right_row,
                &mut ws.horizontal_score[r],
                d_min,
                d_max,
                self.region_width(),
                &mut ws.element_score,
            );
        }

        let first = &mut ws.vertical_score[0];
        first.copy_from_slice(&ws.horizontal_score[0]);
        for r in 1..self.region_height() {
            for (sum, v) in first.iter_mut().zip(&ws.horizontal_score[r]) {
                *sum = *sum + *v;
            }
        }

        if self.score_rows.requires_normalize() && row0 + ry as isize >= 0 {
            self.score_rows.normalize_region_scores(
                (row0 + ry as isize) as usize,
                &ws.vertical_score[0],
                d_min,
                d_max,
                self.region_width(),
                self.region_height(),
                &mut ws.vertical_score_norm[0],
            );
        }
    }

    /// Rolls the vertical window down the remaining rows, combining the five
    /// regions and selecting disparities once enough rows are buffered.
    #[allow(clippy::too_many_arguments)]
    fn compute_remaining_rows<D, Sel>(
        &self,
        row0: isize,
        row1: isize,
        ws: &mut WorkSpace<I, S>,
        left: &Image<I>,
        right: &Image<I>,
        select: &mut Sel,
        band_out: &mut [D],
        band_lo: usize,
    ) where
        D: Pixel,
        Sel: DisparitySelect<S, D>,
    {
        let width = left.width;
        let height = left.height;
        let d_min = self.cfg.disparity_min;
        let d_max = self.cfg.disparity_max();
        let rx = self.radius_x;
        let ry = self.radius_y;
        let region_height = self.region_height();
        let needs_norm = self.score_rows.requires_normalize();

        for row in (row0 + region_height as isize)..row1 {
            let active = ws.active_vertical_score;
            let active_idx = active % region_height;
            let prev_idx = (active - 1) % region_height;
            let old_row = ((row - row0) as usize) % region_height;

            // Drop the row that leaves the window.
            {
                let (active_buf, prev_buf) =
                    two_slots(&mut ws.vertical_score, active_idx, prev_idx);
                active_buf.copy_from_slice(prev_buf);
            }
            {
                let active_buf = &mut ws.vertical_score[active_idx];
                for (sum, v) in active_buf.iter_mut().zip(&ws.horizontal_score[old_row]) {
                    *sum = *sum - *v;
                }
            }

            // Score the row that enters the window.
            self.border.grow_row(left, row, rx, rx, &mut ws.left_row);
            self.border.grow_row(right, row, rx, rx, &mut ws.right_row);
            self.score_rows.score_row(
                &ws.left_row,
                &ws.right_row,
                &mut ws.horizontal_score[old_row],
                d_min,
                d_max,
                self.region_width(),
                &mut ws.element_score,
            );
            {
                let active_buf = &mut ws.vertical_score[active_idx];
                for (sum, v) in active_buf.iter_mut().zip(&ws.horizontal_score[old_row]) {
                    *sum = *sum + *v;
                }
            }

            if needs_norm && row >= ry as isize && row < (height + ry) as isize {
                self.score_rows.normalize_region_scores(
                    (row - ry as isize) as usize,
                    &ws.vertical_score[active_idx],
                    d_min,
                    d_max,
                    self.region_width(),
                    self.region_height(),
                    &mut ws.vertical_score_norm[active_idx],
                );
            }

            if active >= 2 * ry {
                let disparity_y = (row - 2 * ry as isize) as usize;

                // Always sample vertical sums computed from rows inside the
                // image; near the seams shift the offsets onto the nearest
                // valid ring entries.
                let mut off0 = -2 * (ry as i32);
                let off1 = -(ry as i32);
                let mut off2 = 0i32;
                if (disparity_y as i32) < ry as i32 {
                    off0 -= disparity_y as i32 - ry as i32;
                }
                if disparity_y + ry >= height {
                    off2 -= (disparity_y + ry - height) as i32 + 1;
                }

                let ring = |off: i32| {
                    (active as i32 + off).rem_euclid(region_height as i32) as usize
                };
                let source = if needs_norm {
                    &ws.vertical_score_norm
                } else {
                    &ws.vertical_score
                };
                let top = &source[ring(off0)];
                let middle = &source[ring(off1)];
                let bottom = &source[ring(off2)];

                self.compute_score_five(top, middle, bottom, &mut ws.five_score, width);

                let out_start = (disparity_y - band_lo) * width;
                select.process(&ws.five_score, &mut band_out[out_start..out_start + width]);
            }

            ws.active_vertical_score += 1;
        }
    }

    /// Combines the centered region with the two best of the four corner
    /// regions. Corner samples that fall outside the computed span get the
    /// worst score so they are never picked. The comparison sequence is
    /// order-sensitive and must not be "simplified".
    fn compute_score_five(&self, top: &[S], middle: &[S], bottom: &[S], score: &mut [S], width: usize) {
        let d_min = self.cfg.disparity_min;
        let d_max = self.cfg.disparity_max();
        let rx = self.radius_x;

        for d in d_min..=d_max {
            let base = (d - d_min) * width;
            for x in d..width {
                let mut val0 = S::WORST;
                let mut val1 = S::WORST;
                let mut val2 = S::WORST;
                let mut val3 = S::WORST;

                if x + rx < width {
                    val1 = top[base + x + rx];
                    val3 = bottom[base + x + rx];
                }
                if x >= d + rx {
                    val0 = top[base + x - rx];
                    val2 = bottom[base + x - rx];
                }

                if val0 > val1 {
                    std::mem::swap(&mut val0, &mut val1);
                }
                if val2 > val3 {
                    std::mem::swap(&mut val2, &mut val3);
                }

                let s = if val0 > val3 {
                    val2.sat_add(val3)
                } else if val1 > val2 {
                    val2.sat_add(val0)
                } else {
                    val0.sat_add(val1)
                };
                score[base + x] = s.sat_add(middle[base + x]);
            }
        }
    }
}
