pub mod image;

pub use image::*;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("Runtime error: {0}")]
    RuntimeError(String),
}

/// Fails with [`Error::DimensionMismatch`] unless both images have the same
/// width and height.
pub fn check_same_shape<A: Pixel, B: Pixel>(a: &Image<A>, b: &Image<B>) -> Result<()> {
    if a.width != b.width || a.height != b.height {
        return Err(Error::DimensionMismatch(format!(
            "Images must have the same shape: {}x{} vs {}x{}",
            a.width, a.height, b.width, b.height
        )));
    }
    Ok(())
}
