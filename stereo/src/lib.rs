//! Dense stereo disparity estimation.
//!
//! Two algorithm families share this crate: block matching with best-of-five
//! region aggregation, and semi-global matching with pluggable per-pixel
//! costs (absolute difference, census Hamming, mutual information). Both
//! consume rectified grayscale pairs and produce integer or sub-pixel
//! disparity images.

pub mod block_five;
pub mod config;
pub mod factory;
pub mod score;
pub mod select;
pub mod sgm;

pub use block_five::*;
pub use config::*;
pub use factory::*;
pub use score::*;
pub use select::*;
pub use sgm::{
    CostVolume, SgmAggregator, SgmDisparitySelector, StereoMutualInformation, StereoSgm, MAX_COST,
};

pub use cv_core::{Error, Result};
