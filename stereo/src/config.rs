use cv_core::{Error, Result};
use cv_imgproc::CensusVariant;

use crate::sgm::MAX_COST;

/// Settings shared by every disparity selector.
#[derive(Debug, Clone)]
pub struct DisparityConfig {
    /// Minimum disparity considered, in pixels.
    pub disparity_min: usize,
    /// Number of disparity values considered, starting at `disparity_min`.
    pub disparity_range: usize,
    /// Largest allowed per-pixel matching error. Negative disables the check.
    pub max_error: i32,
    /// Right-to-left consistency tolerance in disparity steps. Negative
    /// disables the check.
    pub validate_rtol: i32,
    /// Winner-vs-second-best relative margin. Values `<= 0` disable the
    /// check.
    pub texture: f64,
    /// Selects the sub-pixel (`f32`) output path in the convenience
    /// front-ends.
    pub subpixel: bool,
}

impl Default for DisparityConfig {
    fn default() -> Self {
        Self {
            disparity_min: 0,
            disparity_range: 64,
            max_error: -1,
            validate_rtol: 1,
            texture: 0.0,
            subpixel: false,
        }
    }
}

impl DisparityConfig {
    /// Maximum disparity considered, inclusive.
    pub fn disparity_max(&self) -> usize {
        self.disparity_min + self.disparity_range - 1
    }

    pub fn validate(&self) -> Result<()> {
        if self.disparity_range == 0 {
            return Err(Error::InvalidConfiguration(
                "disparity_range must be >= 1".to_string(),
            ));
        }
        if self.disparity_range > 255 {
            return Err(Error::InvalidConfiguration(format!(
                "disparity_range {} exceeds the 255 encodable values",
                self.disparity_range
            )));
        }
        Ok(())
    }
}

/// Pixel similarity used by the block matcher.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BmScore {
    /// Sum of absolute differences.
    Sad,
    /// Sum of squared differences.
    Ssd,
    /// Normalized cross-correlation with the given divide-by-zero guard.
    Ncc { eps: f32 },
    /// Hamming distance between census words.
    Census(CensusVariant),
}

/// Block-matching configuration.
#[derive(Debug, Clone)]
pub struct BmConfig {
    pub disparity: DisparityConfig,
    pub radius_x: usize,
    pub radius_y: usize,
    pub score: BmScore,
    pub use_concurrent: bool,
}

impl Default for BmConfig {
    fn default() -> Self {
        Self {
            disparity: DisparityConfig::default(),
            radius_x: 3,
            radius_y: 3,
            score: BmScore::Sad,
            use_concurrent: true,
        }
    }
}

impl BmConfig {
    pub fn with_disparity_range(mut self, min: usize, range: usize) -> Self {
        self.disparity.disparity_min = min;
        self.disparity.disparity_range = range;
        self
    }

    pub fn with_radius(mut self, radius_x: usize, radius_y: usize) -> Self {
        self.radius_x = radius_x;
        self.radius_y = radius_y;
        self
    }

    pub fn with_score(mut self, score: BmScore) -> Self {
        self.score = score;
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.disparity.validate()?;
        if self.radius_x == 0 || self.radius_y == 0 {
            return Err(Error::InvalidConfiguration(
                "five-region matching requires radius_x and radius_y >= 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Number of aggregation paths used by SGM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SgmPaths {
    Paths4,
    Paths8,
    Paths16,
}

impl SgmPaths {
    pub fn count(&self) -> usize {
        match self {
            SgmPaths::Paths4 => 4,
            SgmPaths::Paths8 => 8,
            SgmPaths::Paths16 => 16,
        }
    }
}

/// Mutual-information bootstrap settings.
#[derive(Debug, Clone)]
pub struct HmiConfig {
    /// Number of pyramid levels, full resolution included.
    pub pyramid_layers: usize,
    /// Additional full-resolution refinement passes.
    pub extra_iterations: usize,
    /// Box-smoothing radius applied to the probability histograms.
    pub smoothing_radius: usize,
    /// Histogram quantization of the 256 gray values.
    pub gray_levels: usize,
}

impl Default for HmiConfig {
    fn default() -> Self {
        Self {
            pyramid_layers: 3,
            extra_iterations: 0,
            smoothing_radius: 3,
            gray_levels: 256,
        }
    }
}

/// Per-pixel error used to fill the SGM cost volume.
#[derive(Debug, Clone)]
pub enum SgmError {
    AbsoluteDifference,
    Census(CensusVariant),
    /// Hierarchical mutual information.
    Hmi(HmiConfig),
}

/// Semi-global matching configuration.
#[derive(Debug, Clone)]
pub struct SgmConfig {
    pub disparity: DisparityConfig,
    /// Penalty for a one-step disparity change along a path.
    pub p1: u16,
    /// Penalty for larger disparity changes along a path.
    pub p2: u16,
    pub paths: SgmPaths,
    pub error: SgmError,
    /// Optional cost-volume smoothing radii. Zero disables block costs.
    pub region_radius_x: usize,
    pub region_radius_y: usize,
    pub use_concurrent: bool,
}

impl Default for SgmConfig {
    fn default() -> Self {
        Self {
            disparity: DisparityConfig::default(),
            p1: 10,
            p2: 120,
            paths: SgmPaths::Paths8,
            error: SgmError::AbsoluteDifference,
            region_radius_x: 0,
            region_radius_y: 0,
            use_concurrent: true,
        }
    }
}

impl SgmConfig {
    pub fn with_disparity_range(mut self, min: usize, range: usize) -> Self {
        self.disparity.disparity_min = min;
        self.disparity.disparity_range = range;
        self
    }

    pub fn with_penalties(mut self, p1: u16, p2: u16) -> Self {
        self.p1 = p1;
        self.p2 = p2;
        self
    }

    pub fn with_paths(mut self, paths: SgmPaths) -> Self {
        self.paths = paths;
        self
    }

    pub fn with_error(mut self, error: SgmError) -> Self {
        self.error = error;
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.disparity.validate()?;
        if self.p1 > self.p2 {
            return Err(Error::InvalidConfiguration(format!(
                "p1 ({}) must not exceed p2 ({})",
                self.p1, self.p2
            )));
        }
        if MAX_COST as u32 + self.p2 as u32 > u16::MAX as u32 {
            return Err(Error::InvalidConfiguration(format!(
                "p2 ({}) leaves no u16 headroom above MAX_COST",
                self.p2
            )));
        }
        if let SgmError::Hmi(hmi) = &self.error {
            if hmi.pyramid_layers == 0 {
                return Err(Error::InvalidConfiguration(
                    "pyramid_layers must be >= 1".to_string(),
                ));
            }
            if hmi.gray_levels == 0 || hmi.gray_levels > 256 {
                return Err(Error::InvalidConfiguration(format!(
                    "gray_levels {} must be in 1..=256",
                    hmi.gray_levels
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disparity_range_bounds() {
        let mut cfg = DisparityConfig::default();
        assert!(cfg.validate().is_ok());
        cfg.disparity_range = 0;
        assert!(cfg.validate().is_err());
        cfg.disparity_range = 256;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_sgm_penalty_order() {
        let cfg = SgmConfig::default().with_penalties(50, 20);
        assert!(cfg.validate().is_err());
        let cfg = SgmConfig::default().with_penalties(20, 50);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_sgm_penalty_headroom() {
        let cfg = SgmConfig::default().with_penalties(10, u16::MAX - 100);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_disparity_max_inclusive() {
        let cfg = DisparityConfig {
            disparity_min: 5,
            disparity_range: 16,
            ..Default::default()
        };
        assert_eq!(cfg.disparity_max(), 20);
    }
}
