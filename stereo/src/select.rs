use crate::score::ScoreElement;

/// Selects one disparity per column from a row of region scores.
///
/// Scores arrive in `[(d - d_min) * width + x]` order; entries with `x < d`
/// were never written and must not be read. Implementations are cloned per
/// worker, so `process` may keep per-row state.
pub trait DisparitySelect<S: ScoreElement, D: Copy>: Clone + Send + Sync {
    fn configure(
        &mut self,
        width: usize,
        d_min: usize,
        d_max: usize,
        radius: usize,
        max_region_error: Option<S>,
    );

    fn process(&mut self, scores: &[S], out_row: &mut [D]);
}

/// Winner-take-all plus the validity checks, in their fixed order: max
/// error, right-to-left consistency, texture. Returns the winning relative
/// disparity and the number of candidates, or `None` when the pixel is
/// invalid.
#[allow(clippy::too_many_arguments)]
fn select_at<S: ScoreElement>(
    scores: &[S],
    width: usize,
    x: usize,
    d_min: usize,
    range: usize,
    radius: usize,
    max_region_error: Option<S>,
    validate_rtol: i32,
    texture: f64,
) -> Option<(usize, usize)> {
    if x < d_min + radius || x + radius >= width {
        return None;
    }
    let local_max = (x - d_min - radius + 1).min(range);

    let mut best = scores[x];
    let mut best_rel = 0usize;
    for drel in 1..local_max {
        let s = scores[drel * width + x];
        if s < best {
            best = s;
            best_rel = drel;
        }
    }

    if let Some(max_error) = max_region_error {
        if best > max_error {
            return None;
        }
    }

    if validate_rtol >= 0 {
        // Winner seen from the right image's column x - d*.
        let xr = x - (d_min + best_rel);
        let mut right_best = S::WORST;
        let mut right_rel = 0usize;
        for drel in 0..range {
            let xl = xr + d_min + drel;
            if xl >= width {
                break;
            }
            let s = scores[drel * width + xl];
            if s < right_best {
                right_best = s;
                right_rel = drel;
            }
        }
        if (right_rel as i32 - best_rel as i32).abs() > validate_rtol {
            return None;
        }
    }

    if texture > 0.0 && local_max >= 3 {
        let mut second = S::WORST;
        for drel in 0..local_max {
            // Skip the winner and its immediate neighbors.
            if drel + 1 >= best_rel && drel <= best_rel + 1 {
                continue;
            }
            let s = scores[drel * width + x];
            if s < second {
                second = s;
            }
        }
        if second < S::WORST && (second.to_f64() - best.to_f64()) <= best.to_f64() * texture {
            return None;
        }
    }

    Some((best_rel, local_max))
}

/// Integer disparity selection with validity checks. Invalid pixels are
/// written as `disparity_range`.
#[derive(Debug, Clone)]
pub struct SelectErrorWithChecks<S: ScoreElement> {
    width: usize,
    d_min: usize,
    range: usize,
    radius: usize,
    max_region_error: Option<S>,
    validate_rtol: i32,
    texture: f64,
    invalid: u8,
}

impl<S: ScoreElement> SelectErrorWithChecks<S> {
    pub fn new(validate_rtol: i32, texture: f64) -> Self {
        Self {
            width: 0,
            d_min: 0,
            range: 0,
            radius: 0,
            max_region_error: None,
            validate_rtol,
            texture,
            invalid: 0,
        }
    }
}

impl<S: ScoreElement> DisparitySelect<S, u8> for SelectErrorWithChecks<S> {
    fn configure(
        &mut self,
        width: usize,
        d_min: usize,
        d_max: usize,
        radius: usize,
        max_region_error: Option<S>,
    ) {
        self.width = width;
        self.d_min = d_min;
        self.range = d_max - d_min + 1;
        self.radius = radius;
        self.max_region_error = max_region_error;
        self.invalid = self.range as u8;
    }

    fn process(&mut self, scores: &[S], out_row: &mut [u8]) {
        for (x, out) in out_row.iter_mut().enumerate() {
            *out = match select_at(
                scores,
                self.width,
                x,
                self.d_min,
                self.range,
                self.radius,
                self.max_region_error,
                self.validate_rtol,
                self.texture,
            ) {
                Some((best_rel, _)) => best_rel as u8,
                None => self.invalid,
            };
        }
    }
}

/// Sub-pixel disparity selection: the integer checks, then a parabola fit
/// through the winner and its neighbors. Invalid pixels are written as
/// `disparity_range as f32`.
#[derive(Debug, Clone)]
pub struct SelectErrorSubpixel<S: ScoreElement> {
    width: usize,
    d_min: usize,
    range: usize,
    radius: usize,
    max_region_error: Option<S>,
    validate_rtol: i32,
    texture: f64,
    invalid: f32,
}

impl<S: ScoreElement> SelectErrorSubpixel<S> {
    pub fn new(validate_rtol: i32, texture: f64) -> Self {
        Self {
            width: 0,
            d_min: 0,
            range: 0,
            radius: 0,
            max_region_error: None,
            validate_rtol,
            texture,
            invalid: 0.0,
        }
    }
}

/// Offset of the parabola vertex through `(s_minus, s0, s_plus)`, clamped to
/// the open unit cell around the winner.
pub(crate) fn subpixel_offset(s_minus: f64, s0: f64, s_plus: f64) -> f64 {
    let denom = s_minus - 2.0 * s0 + s_plus;
    if denom <= 0.0 {
        return 0.0;
    }
    let delta = 0.5 * (s_minus - s_plus) / denom;
    delta.clamp(-0.499_999, 0.499_999)
}

impl<S: ScoreElement> DisparitySelect<S, f32> for SelectErrorSubpixel<S> {
    fn configure(
        &mut self,
        width: usize,
        d_min: usize,
        d_max: usize,
        radius: usize,
        max_region_error: Option<S>,
    ) {
        self.width = width;
        self.d_min = d_min;
        self.range = d_max - d_min + 1;
        self.radius = radius;
        self.max_region_error = max_region_error;
        self.invalid = self.range as f32;
    }

    fn process(&mut self, scores: &[S], out_row: &mut [f32]) {
        for (x, out) in out_row.iter_mut().enumerate() {
            let selected = select_at(
                scores,
                self.width,
                x,
                self.d_min,
                self.range,
                self.radius,
                self.max_region_error,
                self.validate_rtol,
                self.texture,
            );
            *out = match selected {
                Some((best_rel, local_max)) => {
                    let delta = if best_rel > 0 && best_rel + 1 < local_max {
                        subpixel_offset(
                            scores[(best_rel - 1) * self.width + x].to_f64(),
                            scores[best_rel * self.width + x].to_f64(),
                            scores[(best_rel + 1) * self.width + x].to_f64(),
                        )
                    } else {
                        0.0
                    };
                    (self.d_min + best_rel) as f32 + delta as f32
                }
                None => self.invalid,
            };
        }
    }
}
