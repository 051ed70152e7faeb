use cv_core::{Error, GrayF32, GrayU8, Result};
use cv_imgproc::{census_transform, CensusImage, CensusVariant};

use crate::block_five::DisparityBlockMatchBestFive;
use crate::config::{BmConfig, BmScore, SgmConfig};
use crate::score::{
    BlockRowScore, CensusRowScore, NccRowScoreF32, SadRowScoreF32, SadRowScoreU8, SsdRowScoreU8,
};
use crate::sgm::StereoSgm;

/// Best-of-five block matching on `u8` images with SAD or SSD scores.
pub fn block_match_u8(cfg: &BmConfig) -> Result<DisparityBlockMatchBestFive<u8, i32>> {
    cfg.validate()?;
    let score: Box<dyn BlockRowScore<u8, i32>> = match cfg.score {
        BmScore::Sad => Box::new(SadRowScoreU8::new()),
        BmScore::Ssd => Box::new(SsdRowScoreU8::new()),
        BmScore::Ncc { .. } => {
            return Err(Error::Unsupported(
                "NCC requires f32 images; use block_match_f32".to_string(),
            ))
        }
        BmScore::Census(_) => {
            return Err(Error::Unsupported(
                "Census matching uses the census front-end; use block_match_census".to_string(),
            ))
        }
    };
    Ok(DisparityBlockMatchBestFive::new(
        cfg.disparity.clone(),
        cfg.radius_x,
        cfg.radius_y,
        cfg.use_concurrent,
        score,
    ))
}

/// Best-of-five block matching on `f32` images with SAD or NCC scores.
pub fn block_match_f32(cfg: &BmConfig) -> Result<DisparityBlockMatchBestFive<f32, f32>> {
    cfg.validate()?;
    let score: Box<dyn BlockRowScore<f32, f32>> = match cfg.score {
        BmScore::Sad => Box::new(SadRowScoreF32::new()),
        BmScore::Ncc { eps } => Box::new(NccRowScoreF32::new(cfg.radius_x, cfg.radius_y, eps)),
        _ => {
            return Err(Error::Unsupported(
                "f32 block matching supports SAD and NCC scores".to_string(),
            ))
        }
    };
    Ok(DisparityBlockMatchBestFive::new(
        cfg.disparity.clone(),
        cfg.radius_x,
        cfg.radius_y,
        cfg.use_concurrent,
        score,
    ))
}

enum CensusEngine {
    U8(DisparityBlockMatchBestFive<u8, i32>),
    S32(DisparityBlockMatchBestFive<i32, i32>),
    S64(DisparityBlockMatchBestFive<i64, i32>),
}

/// Best-of-five block matching over census-transformed inputs. The engine's
/// element type follows the transform's output width.
pub struct CensusBlockMatch {
    variant: CensusVariant,
    inner: CensusEngine,
}

impl CensusBlockMatch {
    pub fn variant(&self) -> CensusVariant {
        self.variant
    }

    pub fn process(&mut self, left: &GrayU8, right: &GrayU8, disparity: &mut GrayU8) -> Result<()> {
        let census_left = census_transform(left, self.variant);
        let census_right = census_transform(right, self.variant);
        match (&mut self.inner, census_left, census_right) {
            (CensusEngine::U8(alg), CensusImage::U8(l), CensusImage::U8(r)) => {
                alg.process(&l, &r, disparity)
            }
            (CensusEngine::S32(alg), CensusImage::S32(l), CensusImage::S32(r)) => {
                alg.process(&l, &r, disparity)
            }
            (CensusEngine::S64(alg), CensusImage::S64(l), CensusImage::S64(r)) => {
                alg.process(&l, &r, disparity)
            }
            _ => Err(Error::Unsupported(
                "census transform output does not match the configured engine".to_string(),
            )),
        }
    }

    pub fn process_subpixel(
        &mut self,
        left: &GrayU8,
        right: &GrayU8,
        disparity: &mut GrayF32,
    ) -> Result<()> {
        let census_left = census_transform(left, self.variant);
        let census_right = census_transform(right, self.variant);
        match (&mut self.inner, census_left, census_right) {
            (CensusEngine::U8(alg), CensusImage::U8(l), CensusImage::U8(r)) => {
                alg.process_subpixel(&l, &r, disparity)
            }
            (CensusEngine::S32(alg), CensusImage::S32(l), CensusImage::S32(r)) => {
                alg.process_subpixel(&l, &r, disparity)
            }
            (CensusEngine::S64(alg), CensusImage::S64(l), CensusImage::S64(r)) => {
                alg.process_subpixel(&l, &r, disparity)
            }
            _ => Err(Error::Unsupported(
                "census transform output does not match the configured engine".to_string(),
            )),
        }
    }
}

/// Builds the census block matcher for the configured variant.
pub fn block_match_census(cfg: &BmConfig) -> Result<CensusBlockMatch> {
    cfg.validate()?;
    let BmScore::Census(variant) = cfg.score else {
        return Err(Error::Unsupported(
            "block_match_census requires a census score".to_string(),
        ));
    };
    let bits = variant.bits();
    let inner = match variant {
        CensusVariant::Block3x3 => CensusEngine::U8(DisparityBlockMatchBestFive::new(
            cfg.disparity.clone(),
            cfg.radius_x,
            cfg.radius_y,
            cfg.use_concurrent,
            Box::new(CensusRowScore::<u8>::new(bits)),
        )),
        CensusVariant::Block5x5 => CensusEngine::S32(DisparityBlockMatchBestFive::new(
            cfg.disparity.clone(),
            cfg.radius_x,
            cfg.radius_y,
            cfg.use_concurrent,
            Box::new(CensusRowScore::<i32>::new(bits)),
        )),
        _ => CensusEngine::S64(DisparityBlockMatchBestFive::new(
            cfg.disparity.clone(),
            cfg.radius_x,
            cfg.radius_y,
            cfg.use_concurrent,
            Box::new(CensusRowScore::<i64>::new(bits)),
        )),
    };
    Ok(CensusBlockMatch { variant, inner })
}

/// Builds the semi-global matcher.
pub fn sgm_disparity(cfg: &SgmConfig) -> Result<StereoSgm> {
    StereoSgm::new(cfg.clone())
}

/// Disparity image in the encoding picked by `DisparityConfig::subpixel`.
#[derive(Debug, Clone)]
pub enum DisparityImage {
    Integer(GrayU8),
    Subpixel(GrayF32),
}

impl DisparityImage {
    /// Grayscale rendering for visualization. Integer disparities map
    /// directly; sub-pixel disparities are normalized by the observed range.
    pub fn to_gray(&self) -> image::GrayImage {
        match self {
            DisparityImage::Integer(img) => img.to_gray(),
            DisparityImage::Subpixel(img) => img.to_gray_normalized(),
        }
    }
}

/// One-call block matching on `u8` images, honoring `cfg.disparity.subpixel`.
pub fn stereo_block_match(left: &GrayU8, right: &GrayU8, cfg: &BmConfig) -> Result<DisparityImage> {
    let subpixel = cfg.disparity.subpixel;
    match cfg.score {
        BmScore::Census(_) => {
            let mut alg = block_match_census(cfg)?;
            if subpixel {
                let mut disparity = GrayF32::new(1, 1);
                alg.process_subpixel(left, right, &mut disparity)?;
                Ok(DisparityImage::Subpixel(disparity))
            } else {
                let mut disparity = GrayU8::new(1, 1);
                alg.process(left, right, &mut disparity)?;
                Ok(DisparityImage::Integer(disparity))
            }
        }
        _ => {
            let mut alg = block_match_u8(cfg)?;
            if subpixel {
                let mut disparity = GrayF32::new(1, 1);
                alg.process_subpixel(left, right, &mut disparity)?;
                Ok(DisparityImage::Subpixel(disparity))
            } else {
                let mut disparity = GrayU8::new(1, 1);
                alg.process(left, right, &mut disparity)?;
                Ok(DisparityImage::Integer(disparity))
            }
        }
    }
}

/// One-call semi-global matching, honoring `cfg.disparity.subpixel`.
pub fn stereo_sgm(left: &GrayU8, right: &GrayU8, cfg: &SgmConfig) -> Result<DisparityImage> {
    let mut sgm = sgm_disparity(cfg)?;
    if cfg.disparity.subpixel {
        let mut disparity = GrayF32::new(1, 1);
        sgm.process_subpixel(left, right, &mut disparity)?;
        Ok(DisparityImage::Subpixel(disparity))
    } else {
        let mut disparity = GrayU8::new(1, 1);
        sgm.process(left, right, &mut disparity)?;
        Ok(DisparityImage::Integer(disparity))
    }
}
