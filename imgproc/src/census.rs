use cv_core::{GrayS32, GrayS64, GrayU8, Image};

/// Census transform block sizes. The output element type is chosen by the
/// number of comparison bits: 3x3 fits in `u8`, 5x5 in `i32`, the wider
/// blocks in `i64`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CensusVariant {
    Block3x3,
    Block5x5,
    Block7x7,
    Block9x7,
    Block13x5,
}

impl CensusVariant {
    /// Sampled block as `(width, height)`.
    pub fn block(&self) -> (usize, usize) {
        match self {
            CensusVariant::Block3x3 => (3, 3),
            CensusVariant::Block5x5 => (5, 5),
            CensusVariant::Block7x7 => (7, 7),
            CensusVariant::Block9x7 => (9, 7),
            CensusVariant::Block13x5 => (13, 5),
        }
    }

    /// Number of comparison bits: every block pixel except the center.
    pub fn bits(&self) -> u32 {
        let (w, h) = self.block();
        (w * h - 1) as u32
    }
}

/// Census-transformed image, tagged by the element width the variant needs.
#[derive(Debug, Clone)]
pub enum CensusImage {
    U8(GrayU8),
    S32(GrayS32),
    S64(GrayS64),
}

impl CensusImage {
    pub fn width(&self) -> usize {
        match self {
            CensusImage::U8(img) => img.width,
            CensusImage::S32(img) => img.width,
            CensusImage::S64(img) => img.width,
        }
    }

    pub fn height(&self) -> usize {
        match self {
            CensusImage::U8(img) => img.height,
            CensusImage::S32(img) => img.height,
            CensusImage::S64(img) => img.height,
        }
    }
}

/// Applies the census transform: each output word encodes, one bit per
/// neighbor in row-major block order (center excluded), whether that neighbor
/// is darker than the center pixel. Out-of-image neighbors clamp to the edge.
pub fn census_transform(src: &GrayU8, variant: CensusVariant) -> CensusImage {
    let (bw, bh) = variant.block();
    let half_x = (bw / 2) as isize;
    let half_y = (bh / 2) as isize;
    match variant {
        CensusVariant::Block3x3 => {
            CensusImage::U8(transform_with(src, half_x, half_y, |w| w as u8))
        }
        CensusVariant::Block5x5 => {
            CensusImage::S32(transform_with(src, half_x, half_y, |w| w as i32))
        }
        _ => CensusImage::S64(transform_with(src, half_x, half_y, |w| w as i64)),
    }
}

fn transform_with<T: cv_core::Pixel, F: Fn(u64) -> T>(
    src: &GrayU8,
    half_x: isize,
    half_y: isize,
    cast: F,
) -> Image<T> {
    let mut out = Image::<T>::new(src.width, src.height);
    let w = src.width as isize;
    let h = src.height as isize;

    for y in 0..src.height {
        for x in 0..src.width {
            let center = src.get(x, y);
            let mut word = 0u64;
            let mut bit = 0u32;
            for dy in -half_y..=half_y {
                let yy = (y as isize + dy).clamp(0, h - 1) as usize;
                let row = src.row(yy);
                for dx in -half_x..=half_x {
                    if dx == 0 && dy == 0 {
                        continue;
                    }
                    let xx = (x as isize + dx).clamp(0, w - 1) as usize;
                    if row[xx] < center {
                        word |= 1u64 << bit;
                    }
                    bit += 1;
                }
            }
            out.set(x, y, cast(word));
        }
    }
    out
}
