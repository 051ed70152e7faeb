use cv_core::GrayF32;

/// Box mean filter with reusable intermediate storage.
///
/// Border samples clamp to the image edge, so every output pixel is the mean
/// of a full `(2*rx+1) x (2*ry+1)` window.
pub struct MeanFilter {
    radius_x: usize,
    radius_y: usize,
    tmp: GrayF32,
}

impl MeanFilter {
    pub fn new(radius_x: usize, radius_y: usize) -> Self {
        Self {
            radius_x,
            radius_y,
            tmp: GrayF32::new(0, 0),
        }
    }

    pub fn process(&mut self, src: &GrayF32, dst: &mut GrayF32) {
        let width = src.width;
        let height = src.height;
        self.tmp.reshape(width, height);
        dst.reshape_like(src);
        if width == 0 || height == 0 {
            return;
        }

        let rx = self.radius_x as isize;
        let ry = self.radius_y as isize;
        let clamp_x = |x: isize| x.clamp(0, width as isize - 1) as usize;
        let clamp_y = |y: isize| y.clamp(0, height as isize - 1) as usize;

        // Horizontal pass: rolling window sums per row.
        for y in 0..height {
            let row = src.row(y);
            let out = self.tmp.row_mut(y);
            let mut sum = 0.0f32;
            for i in -rx..=rx {
                sum += row[clamp_x(i)];
            }
            out[0] = sum;
            for x in 1..width as isize {
                sum += row[clamp_x(x + rx)] - row[clamp_x(x - rx - 1)];
                out[x as usize] = sum;
            }
        }

        // Vertical pass: rolling column sums over whole rows.
        let area = ((2 * rx + 1) * (2 * ry + 1)) as f32;
        let mut col_sum = vec![0.0f32; width];
        for i in -ry..=ry {
            let row = self.tmp.row(clamp_y(i));
            for (acc, v) in col_sum.iter_mut().zip(row) {
                *acc += v;
            }
        }
        write_scaled(&col_sum, dst.row_mut(0), area);
        for y in 1..height as isize {
            let add_row = self.tmp.row(clamp_y(y + ry));
            let sub_row = self.tmp.row(clamp_y(y - ry - 1));
            for x in 0..width {
                col_sum[x] += add_row[x] - sub_row[x];
            }
            write_scaled(&col_sum, dst.row_mut(y as usize), area);
        }
    }
}

fn write_scaled(sums: &[f32], out: &mut [f32], area: f32) {
    for (o, s) in out.iter_mut().zip(sums) {
        *o = s / area;
    }
}

/// Element-wise product of an image with itself.
pub fn pixel_pow2(src: &GrayF32, dst: &mut GrayF32) {
    dst.reshape_like(src);
    for y in 0..src.height {
        let s = src.row(y);
        let d = dst.row_mut(y);
        for (o, v) in d.iter_mut().zip(s) {
            *o = v * v;
        }
    }
}

/// Standard deviation image from the mean and mean-of-squares images:
/// `sqrt(max(0, E[x^2] - E[x]^2))`.
pub fn stdev_from_means(mean: &GrayF32, mean_sq: &GrayF32, dst: &mut GrayF32) {
    assert!(mean.same_shape(mean_sq));
    dst.reshape_like(mean);
    for y in 0..mean.height {
        let m = mean.row(y);
        let m2 = mean_sq.row(y);
        let d = dst.row_mut(y);
        for x in 0..mean.width {
            d[x] = (m2[x] - m[x] * m[x]).max(0.0).sqrt();
        }
    }
}
