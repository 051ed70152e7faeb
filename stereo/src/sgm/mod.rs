pub mod aggregation;
pub mod cost;
pub mod hmi;
pub mod selector;

pub use aggregation::{directions, SgmAggregator};
pub use hmi::StereoMutualInformation;
pub use selector::SgmDisparitySelector;

use cv_core::{check_same_shape, Error, GrayF32, GrayU8, Result};
use cv_imgproc::{census_transform, CensusImage};

use crate::config::{SgmConfig, SgmError};

/// Ceiling of a single pixel cost. Chosen so that a path value plus the
/// large-change penalty still fits `u16` with headroom.
pub const MAX_COST: u16 = 2048;

/// Flat `u16` volume in `(y, x, d)` order: the costs for all disparities of
/// a pixel are contiguous.
#[derive(Debug, Clone, Default)]
pub struct CostVolume {
    pub data: Vec<u16>,
    pub width: usize,
    pub height: usize,
    pub range: usize,
}

impl CostVolume {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resizes the volume; contents are unspecified until written.
    pub fn reshape(&mut self, width: usize, height: usize, range: usize) {
        self.width = width;
        self.height = height;
        self.range = range;
        self.data.resize(width * height * range, 0);
    }

    /// Index of disparity 0 for pixel `(x, y)`.
    #[inline]
    pub fn index(&self, y: usize, x: usize) -> usize {
        (y * self.width + x) * self.range
    }

    #[inline]
    pub fn get(&self, y: usize, x: usize, d: usize) -> u16 {
        self.data[self.index(y, x) + d]
    }
}

/// Semi-global matching: per-pixel costs, multi-path aggregation, then
/// winner-take-all selection with checks.
///
/// The cost and aggregation volumes are owned and reused across calls; they
/// are also exposed read-only for tools that persist or inspect them.
pub struct StereoSgm {
    cfg: SgmConfig,
    aggregator: SgmAggregator,
    costs: CostVolume,
    smoothed: CostVolume,
    smooth_tmp: Vec<u32>,
    aggregated: CostVolume,
}

impl StereoSgm {
    pub fn new(cfg: SgmConfig) -> Result<Self> {
        cfg.validate()?;
        let aggregator = SgmAggregator::new(cfg.p1, cfg.p2, cfg.paths);
        Ok(Self {
            cfg,
            aggregator,
            costs: CostVolume::new(),
            smoothed: CostVolume::new(),
            smooth_tmp: Vec::new(),
            aggregated: CostVolume::new(),
        })
    }

    pub fn config(&self) -> &SgmConfig {
        &self.cfg
    }

    /// Raw cost volume of the most recent pass.
    pub fn cost_volume(&self) -> &CostVolume {
        &self.costs
    }

    /// Aggregated volume of the most recent pass.
    pub fn aggregated_volume(&self) -> &CostVolume {
        &self.aggregated
    }

    /// Computes integer disparity: `v < range` encodes `disparity_min + v`,
    /// `v == range` marks the pixel invalid.
    pub fn process(&mut self, left: &GrayU8, right: &GrayU8, disparity: &mut GrayU8) -> Result<()> {
        self.compute_aggregated(left, right)?;
        let selector = self.selector(
            self.cfg.disparity.disparity_min,
            self.cfg.disparity.disparity_range,
        );
        selector.select(&self.aggregated, disparity, self.cfg.use_concurrent);
        Ok(())
    }

    /// Computes sub-pixel disparity; `range as f32` marks invalid pixels.
    pub fn process_subpixel(
        &mut self,
        left: &GrayU8,
        right: &GrayU8,
        disparity: &mut GrayF32,
    ) -> Result<()> {
        self.compute_aggregated(left, right)?;
        let selector = self.selector(
            self.cfg.disparity.disparity_min,
            self.cfg.disparity.disparity_range,
        );
        selector.select_subpixel(&self.aggregated, disparity, self.cfg.use_concurrent);
        Ok(())
    }

    fn selector(&self, d_min: usize, range: usize) -> SgmDisparitySelector {
        SgmDisparitySelector::new(
            d_min,
            range,
            self.cfg.disparity.max_error,
            self.cfg.paths.count(),
            self.cfg.disparity.validate_rtol,
            self.cfg.disparity.texture,
        )
    }

    fn compute_aggregated(&mut self, left: &GrayU8, right: &GrayU8) -> Result<()> {
        check_same_shape(left, right)?;
        let d_max = self.cfg.disparity.disparity_max();
        if d_max >= left.width {
            return Err(Error::InvalidConfiguration(format!(
                "Maximum disparity {} is too large for image width {}",
                d_max, left.width
            )));
        }

        let d_min = self.cfg.disparity.disparity_min;
        let range = self.cfg.disparity.disparity_range;
        let error = self.cfg.error.clone();
        match error {
            SgmError::AbsoluteDifference => {
                self.run_pass_ad(left, right, d_min, range);
                Ok(())
            }
            SgmError::Census(variant) => {
                let census_left = census_transform(left, variant);
                let census_right = census_transform(right, variant);
                self.run_pass_census(&census_left, &census_right, variant.bits(), d_min, range)
            }
            SgmError::Hmi(hmi_cfg) => self.compute_hmi(left, right, &hmi_cfg),
        }
    }

    /// Optional block-cost smoothing, then path aggregation.
    fn finish_pass(&mut self) {
        if self.cfg.region_radius_x > 0 || self.cfg.region_radius_y > 0 {
            cost::block_mean_costs(
                &self.costs,
                self.cfg.region_radius_x,
                self.cfg.region_radius_y,
                &mut self.smooth_tmp,
                &mut self.smoothed,
            );
            std::mem::swap(&mut self.costs, &mut self.smoothed);
        }
        self.aggregator
            .process(&self.costs, &mut self.aggregated, self.cfg.use_concurrent);
    }

    fn run_pass_ad(&mut self, left: &GrayU8, right: &GrayU8, d_min: usize, range: usize) {
        cost::compute_cost_ad(left, right, d_min, range, &mut self.costs, self.cfg.use_concurrent);
        self.finish_pass();
    }

    fn run_pass_census(
        &mut self,
        left: &CensusImage,
        right: &CensusImage,
        bits: u32,
        d_min: usize,
        range: usize,
    ) -> Result<()> {
        let concurrent = self.cfg.use_concurrent;
        match (left, right) {
            (CensusImage::U8(l), CensusImage::U8(r)) => {
                cost::compute_cost_hamming(l, r, bits, d_min, range, &mut self.costs, concurrent)
            }
            (CensusImage::S32(l), CensusImage::S32(r)) => {
                cost::compute_cost_hamming(l, r, bits, d_min, range, &mut self.costs, concurrent)
            }
            (CensusImage::S64(l), CensusImage::S64(r)) => {
                cost::compute_cost_hamming(l, r, bits, d_min, range, &mut self.costs, concurrent)
            }
            _ => {
                return Err(Error::Unsupported(
                    "Census images of the stereo pair have different element types".to_string(),
                ))
            }
        }
        self.finish_pass();
        Ok(())
    }

    fn run_pass_mi(
        &mut self,
        left: &GrayU8,
        right: &GrayU8,
        mi: &StereoMutualInformation,
        d_min: usize,
        range: usize,
    ) {
        cost::compute_cost_mi(left, right, mi, d_min, range, &mut self.costs, self.cfg.use_concurrent);
        self.finish_pass();
    }

    /// Hierarchical mutual information: bootstrap with absolute-difference
    /// SGM at the coarsest pyramid level, then walk up re-learning the MI
    /// table from each level's disparity. Extra iterations repeat the
    /// learn-and-solve step at full resolution.
    fn compute_hmi(
        &mut self,
        left: &GrayU8,
        right: &GrayU8,
        hmi_cfg: &crate::config::HmiConfig,
    ) -> Result<()> {
        let d_min = self.cfg.disparity.disparity_min;
        let range = self.cfg.disparity.disparity_range;
        let concurrent = self.cfg.use_concurrent;

        let mut levels: Vec<(GrayU8, GrayU8)> = vec![(left.clone(), right.clone())];
        while levels.len() < hmi_cfg.pyramid_layers {
            let Some((prev_left, prev_right)) = levels.last() else {
                break;
            };
            if prev_left.width < 32 || prev_left.height < 32 {
                break;
            }
            levels.push((hmi::half_scale(prev_left), hmi::half_scale(prev_right)));
        }
        let coarsest = levels.len() - 1;

        let scaled = |level: usize| {
            let width = levels[level].0.width;
            let dm = (d_min >> level).min(width - 1);
            let r = (range >> level).max(1).min(width - dm);
            (dm, r)
        };

        // Bootstrap prior from absolute differences at the coarsest level.
        let (dm_c, r_c) = scaled(coarsest);
        {
            let (coarse_left, coarse_right) = &levels[coarsest];
            self.run_pass_ad(coarse_left, coarse_right, dm_c, r_c);
        }
        let mut prior = GrayU8::new(1, 1);
        self.selector(dm_c, r_c)
            .select(&self.aggregated, &mut prior, concurrent);
        let mut prior_dm = dm_c;
        let mut prior_range = r_c;

        let mut mi = StereoMutualInformation::new(hmi_cfg.gray_levels, hmi_cfg.smoothing_radius);
        for level in (0..=coarsest).rev() {
            let (dm, r) = scaled(level);
            let (level_left, level_right) = &levels[level];
            let level_prior = if level == coarsest {
                prior.clone()
            } else {
                hmi::upscale_disparity(
                    &prior,
                    prior_dm,
                    prior_range,
                    dm,
                    r,
                    level_left.width,
                    level_left.height,
                )
            };
            mi.process(level_left, level_right, dm, r, &level_prior);
            self.run_pass_mi(level_left, level_right, &mi, dm, r);

            if level > 0 {
                self.selector(dm, r)
                    .select(&self.aggregated, &mut prior, concurrent);
                prior_dm = dm;
                prior_range = r;
            }
        }

        for _ in 0..hmi_cfg.extra_iterations {
            self.selector(d_min, range)
                .select(&self.aggregated, &mut prior, concurrent);
            mi.process(left, right, d_min, range, &prior);
            self.run_pass_mi(left, right, &mi, d_min, range);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DisparityConfig, SgmPaths};

    fn ramp_pair(width: usize, height: usize, shift: usize) -> (GrayU8, GrayU8) {
        // Left column x appears at right column x - shift.
        let left = GrayU8::from_fn(width, height, |x, _| (x * 5 % 256) as u8);
        let right = GrayU8::from_fn(width, height, |x, _| ((x + shift) * 5 % 256) as u8);
        (left, right)
    }

    fn config(range: usize) -> SgmConfig {
        SgmConfig {
            disparity: DisparityConfig {
                disparity_range: range,
                validate_rtol: -1,
                ..Default::default()
            },
            use_concurrent: false,
            ..Default::default()
        }
    }

    #[test]
    fn test_recovers_ramp_shift() {
        let (left, right) = ramp_pair(40, 12, 3);
        let mut sgm = StereoSgm::new(config(8).with_penalties(10, 40)).unwrap();
        let mut disparity = GrayU8::new(1, 1);
        sgm.process(&left, &right, &mut disparity).unwrap();

        for y in 0..12 {
            for x in 8..38 {
                assert_eq!(disparity.get(x, y), 3, "({x},{y})");
            }
        }
    }

    #[test]
    fn test_zero_penalties_match_cost_wta() {
        let left = GrayU8::from_fn(24, 10, |x, y| ((x * 17 + y * 29) % 256) as u8);
        let right = GrayU8::from_fn(24, 10, |x, y| ((x * 5 + y * 11) % 256) as u8);
        let mut sgm = StereoSgm::new(config(6).with_penalties(0, 0)).unwrap();
        let mut disparity = GrayU8::new(1, 1);
        sgm.process(&left, &right, &mut disparity).unwrap();

        let costs = sgm.cost_volume();
        for y in 0..10 {
            for x in 0..24 {
                let local_max = (x + 1).min(6);
                let mut best = u16::MAX;
                let mut best_d = 0;
                for d in 0..local_max {
                    let c = costs.get(y, x, d);
                    if c < best {
                        best = c;
                        best_d = d;
                    }
                }
                assert_eq!(
                    disparity.get(x, y),
                    best_d as u8,
                    "({x},{y}): SGM with zero penalties must reduce to cost WTA"
                );
            }
        }
    }

    #[test]
    fn test_idempotent_when_serial() {
        let (left, right) = ramp_pair(32, 10, 2);
        let mut sgm = StereoSgm::new(config(8)).unwrap();
        let mut a = GrayU8::new(1, 1);
        let mut b = GrayU8::new(1, 1);
        sgm.process(&left, &right, &mut a).unwrap();
        sgm.process(&left, &right, &mut b).unwrap();
        assert_eq!(a.data, b.data);
    }

    #[test]
    fn test_block_cost_smoothing_keeps_answer() {
        let (left, right) = ramp_pair(40, 14, 4);
        let mut cfg = config(8);
        cfg.region_radius_x = 1;
        cfg.region_radius_y = 1;
        let mut sgm = StereoSgm::new(cfg).unwrap();
        let mut disparity = GrayU8::new(1, 1);
        sgm.process(&left, &right, &mut disparity).unwrap();

        for x in 10..36 {
            assert_eq!(disparity.get(x, 7), 4, "x={x}");
        }
    }

    #[test]
    fn test_hmi_recovers_shift() {
        let (left, right) = ramp_pair(96, 48, 3);
        let mut cfg = config(8);
        cfg.error = SgmError::Hmi(crate::config::HmiConfig {
            pyramid_layers: 2,
            extra_iterations: 1,
            smoothing_radius: 1,
            gray_levels: 64,
        });
        let mut sgm = StereoSgm::new(cfg).unwrap();
        let mut disparity = GrayU8::new(1, 1);
        sgm.process(&left, &right, &mut disparity).unwrap();

        let mut correct = 0;
        let mut counted = 0;
        for y in 0..48 {
            for x in 10..90 {
                counted += 1;
                if disparity.get(x, y) == 3 {
                    correct += 1;
                }
            }
        }
        assert!(
            correct * 10 >= counted * 9,
            "HMI should recover the shift on at least 90% of interior pixels ({correct}/{counted})"
        );
    }

    #[test]
    fn test_rejects_oversized_disparity() {
        let left = GrayU8::new(10, 6);
        let mut sgm = StereoSgm::new(config(16)).unwrap();
        let mut disparity = GrayU8::new(1, 1);
        assert!(sgm.process(&left, &left, &mut disparity).is_err());
    }

    #[test]
    fn test_aggregated_bounded_for_small_p2() {
        let (left, right) = ramp_pair(30, 10, 2);
        let mut sgm = StereoSgm::new(config(8).with_penalties(10, 100).with_paths(SgmPaths::Paths4)).unwrap();
        let mut disparity = GrayU8::new(1, 1);
        sgm.process(&left, &right, &mut disparity).unwrap();

        let bound = 4 * (MAX_COST as u32 + 100);
        assert!(sgm
            .aggregated_volume()
            .data
            .iter()
            .all(|&s| (s as u32) <= bound));
    }
}
