use cv_core::{Image, Pixel};

/// Policy for pixels sampled outside the image bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BorderMode<T> {
    Constant(T),
    Replicate,
    Reflect,
}

/// Materializes padded image rows under a border policy chosen at
/// construction.
///
/// Rows requested outside `[0, height)` are resolved with the same policy,
/// so callers can walk virtual rows above and below the image.
#[derive(Debug, Clone)]
pub struct ImageBorder<T> {
    mode: BorderMode<T>,
}

impl<T: Pixel> ImageBorder<T> {
    pub fn new(mode: BorderMode<T>) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> BorderMode<T> {
        self.mode
    }

    fn map_coord(&self, coord: isize, len: usize) -> Option<usize> {
        let n = len as isize;
        if coord >= 0 && coord < n {
            return Some(coord as usize);
        }
        match self.mode {
            BorderMode::Constant(_) => None,
            BorderMode::Replicate => Some(coord.clamp(0, n - 1) as usize),
            BorderMode::Reflect => {
                if n == 1 {
                    return Some(0);
                }
                let reflected = if coord < 0 { -coord - 1 } else { 2 * n - 1 - coord };
                Some(reflected.clamp(0, n - 1) as usize)
            }
        }
    }

    /// Writes row `y` of `img`, padded by `l_pad` pixels on the left and
    /// `r_pad` on the right, into `out`. `out[i]` holds the sample for
    /// column `i - l_pad`; `out.len()` must be `width + l_pad + r_pad`.
    pub fn grow_row(&self, img: &Image<T>, y: isize, l_pad: usize, r_pad: usize, out: &mut [T]) {
        let width = img.width;
        assert_eq!(out.len(), width + l_pad + r_pad);

        let row = match self.map_coord(y, img.height) {
            Some(yy) => img.row(yy),
            None => {
                let BorderMode::Constant(fill) = self.mode else {
                    unreachable!()
                };
                out.fill(fill);
                return;
            }
        };

        for (i, slot) in out.iter_mut().enumerate() {
            let x = i as isize - l_pad as isize;
            *slot = match self.map_coord(x, width) {
                Some(xx) => row[xx],
                None => {
                    let BorderMode::Constant(fill) = self.mode else {
                        unreachable!()
                    };
                    fill
                }
            };
        }
    }
}
