use super::MAX_COST;
use cv_core::{GrayF32, GrayU8};
use cv_imgproc::MeanFilter;

/// Mutual-information pixel cost learned from a prior disparity estimate.
///
/// A joint histogram of corresponding left/right intensities is collected
/// over the valid prior pixels, quantized to `gray_levels` bins and box
/// smoothed. The per-pixel cost is the joint entropy term minus both
/// marginal terms, rescaled onto `[0, MAX_COST]` and cached as a 256x256
/// lookup table.
pub struct StereoMutualInformation {
    gray_levels: usize,
    smooth: MeanFilter,
    joint: GrayF32,
    smoothed: GrayF32,
    cost_table: Vec<u16>,
}

impl StereoMutualInformation {
    pub fn new(gray_levels: usize, smoothing_radius: usize) -> Self {
        Self {
            gray_levels,
            smooth: MeanFilter::new(smoothing_radius, smoothing_radius),
            joint: GrayF32::new(0, 0),
            smoothed: GrayF32::new(0, 0),
            cost_table: Vec::new(),
        }
    }

    #[inline]
    fn quantize(&self, v: u8) -> usize {
        v as usize * self.gray_levels / 256
    }

    /// Rebuilds the cost table. `disparity` holds relative values against
    /// `d_min`; values `>= range` are invalid and skipped.
    pub fn process(
        &mut self,
        left: &GrayU8,
        right: &GrayU8,
        d_min: usize,
        range: usize,
        disparity: &GrayU8,
    ) {
        let levels = self.gray_levels;
        self.joint.reshape(levels, levels);
        self.joint.fill(0.0);

        let mut total = 0u64;
        for y in 0..left.height {
            for x in 0..left.width {
                let v = disparity.get(x, y) as usize;
                if v >= range {
                    continue;
                }
                let d = d_min + v;
                if x < d {
                    continue;
                }
                let l = self.quantize(left.get(x, y));
                let r = self.quantize(right.get(x - d, y));
                let idx = self.joint.index(r, l);
                self.joint.data[idx] += 1.0;
                total += 1;
            }
        }
        if total == 0 {
            // Degenerate prior: fall back to a uniform joint distribution.
            self.joint.fill(1.0);
            total = (levels * levels) as u64;
        }

        let scale = 1.0 / total as f32;
        for v in &mut self.joint.data {
            *v *= scale;
        }
        self.smooth.process(&self.joint, &mut self.smoothed);

        // Marginals from the smoothed joint probabilities.
        let mut p_left = vec![0.0f32; levels];
        let mut p_right = vec![0.0f32; levels];
        for l in 0..levels {
            let row = self.smoothed.row(l);
            for (r, &p) in row.iter().enumerate() {
                p_left[l] += p;
                p_right[r] += p;
            }
        }

        const EPS: f32 = 1e-7;
        let h_left: Vec<f32> = p_left.iter().map(|&p| -(p + EPS).ln()).collect();
        let h_right: Vec<f32> = p_right.iter().map(|&p| -(p + EPS).ln()).collect();

        // Raw information cost per bin pair, then affine rescale to u16.
        let mut raw = vec![0.0f32; levels * levels];
        let mut lo = f32::INFINITY;
        let mut hi = f32::NEG_INFINITY;
        for l in 0..levels {
            for r in 0..levels {
                let h_joint = -(self.smoothed.get(r, l) + EPS).ln();
                let v = h_joint - h_left[l] - h_right[r];
                raw[l * levels + r] = v;
                lo = lo.min(v);
                hi = hi.max(v);
            }
        }
        let span = (hi - lo).max(EPS);

        self.cost_table.clear();
        self.cost_table.resize(256 * 256, 0);
        for l in 0..256 {
            let ql = self.quantize(l as u8);
            for r in 0..256 {
                let qr = self.quantize(r as u8);
                let v = (raw[ql * levels + qr] - lo) / span;
                self.cost_table[l * 256 + r] = (v * MAX_COST as f32) as u16;
            }
        }
    }

    #[inline]
    pub fn cost(&self, l: u8, r: u8) -> u16 {
        self.cost_table[l as usize * 256 + r as usize]
    }
}

/// Half-resolution image: each output pixel averages a 2x2 block.
pub fn half_scale(src: &GrayU8) -> GrayU8 {
    let width = (src.width / 2).max(1);
    let height = (src.height / 2).max(1);
    GrayU8::from_fn(width, height, |x, y| {
        let x0 = (2 * x).min(src.width - 1);
        let x1 = (2 * x + 1).min(src.width - 1);
        let y0 = (2 * y).min(src.height - 1);
        let y1 = (2 * y + 1).min(src.height - 1);
        let sum = src.get(x0, y0) as u32
            + src.get(x1, y0) as u32
            + src.get(x0, y1) as u32
            + src.get(x1, y1) as u32;
        ((sum + 2) / 4) as u8
    })
}

/// Doubles a coarse disparity image onto a finer level's geometry,
/// re-encoding against the finer level's `d_min`/`range`.
pub fn upscale_disparity(
    coarse: &GrayU8,
    coarse_d_min: usize,
    coarse_range: usize,
    fine_d_min: usize,
    fine_range: usize,
    fine_width: usize,
    fine_height: usize,
) -> GrayU8 {
    GrayU8::from_fn(fine_width, fine_height, |x, y| {
        let cx = (x / 2).min(coarse.width - 1);
        let cy = (y / 2).min(coarse.height - 1);
        let v = coarse.get(cx, cy) as usize;
        if v >= coarse_range {
            return fine_range as u8;
        }
        let absolute = (coarse_d_min + v) * 2;
        if absolute < fine_d_min {
            return fine_range as u8;
        }
        (absolute - fine_d_min).min(fine_range - 1) as u8
    })
}
