use super::basic_parameter::{BasicParameter, BasicParameterMap};
use super::image::Image;
use super::point::{CausalArea, Point};
use super::template_patch::TemplatePatch;

/// Minimum per-sample variance floor, preventing a perfectly-flat local
/// neighborhood from producing an infinite regression weight.
const MIN_SQUARED_ERROR: f64 = 1.0 / 64.0;
/// Ridge regularization strength added to the normal equations' diagonal.
const REGULARIZATION_LAMBDA: f64 = 1.0 / 60.0;
/// Training samples are capped to the `MAX_TRAIN_SAMPLES` with the
/// largest regression weight before the normal equations are built.
const MAX_TRAIN_SAMPLES: usize = 128;

fn clip(v: f64, lo: f64, hi: f64) -> f64 {
    v.max(lo).min(hi)
}

/// Samples `q`, zero-padding template taps that fall outside the image
/// (the first row/column's out-of-image offsets) instead of clamping
/// them onto the image edge, which could otherwise land on a pixel
/// ahead of the causal scan order.
fn template_value_clipped(image: &Image<u8>, q: Point) -> f64 {
    if image.contains(q) {
        *image.get(q) as f64
    } else {
        0.0
    }
}

/// Template taps only, without the affine-bias feature appended.
fn template_values(image: &Image<u8>, center: Point, template: &TemplatePatch) -> Vec<f64> {
    template
        .points()
        .iter()
        .map(|&offset| template_value_clipped(image, center + offset))
        .collect()
}

/// Affine bias feature value appended to every regressor vector, so the
/// fitted coefficient for it acts as an affine offset term (`pred = Σ
/// β_j f_p[j]`, with the last `f_p[j] = AFFINE_BIAS_FEATURE` for every
/// pixel), so the fit can carry a DC offset independent of the template
/// taps' own magnitudes.
const AFFINE_BIAS_FEATURE: f64 = 128.0;

/// Template taps plus the constant affine-bias feature: `L = template
/// size + 1`.
fn feature_vector(image: &Image<u8>, center: Point, template: &TemplatePatch) -> Vec<f64> {
    let mut v = template_values(image, center, template);
    v.push(AFFINE_BIAS_FEATURE);
    v
}

/// Solves `a * x = b` via Gauss-Jordan elimination with partial row
/// pivoting. Returns `None` if `a` is (numerically) singular, bailing out
/// of a degenerate fit.
fn gauss_jordan_solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Option<Vec<f64>> {
    let n = b.len();
    for col in 0..n {
        let mut pivot_row = col;
        let mut max_val = a[col][col].abs();
        for row in (col + 1)..n {
            if a[row][col].abs() > max_val {
                max_val = a[row][col].abs();
                pivot_row = row;
            }
        }
        if max_val < 1e-12 {
            return None;
        }
        a.swap(col, pivot_row);
        b.swap(col, pivot_row);

        let pivot = a[col][col];
        for j in 0..n {
            a[col][j] /= pivot;
        }
        b[col] /= pivot;

        for row in 0..n {
            if row == col {
                continue;
            }
            let factor = a[row][col];
            if factor == 0.0 {
                continue;
            }
            for j in 0..n {
                a[row][j] -= factor * a[col][j];
            }
            b[row] -= factor * b[col];
        }
    }
    Some(b)
}

/// A single fixed-shape linear predictor: fits a weighted least squares
/// model over `template`'s causal offsets against nearby causal training
/// samples, then predicts the current pixel.
pub struct Predictor {
    template: TemplatePatch,
}

impl Predictor {
    pub fn new(template: TemplatePatch) -> Self {
        Predictor { template }
    }

    pub fn template(&self) -> &TemplatePatch {
        &self.template
    }

    /// Gathers causal training samples around `p` (within `train_window`),
    /// fits the weighted least squares regression, and inserts the
    /// resulting `(cost, peak, flag=1)` candidate into `map`.
    pub fn estimate(&self, image: &Image<u8>, map: &BasicParameterMap, p: Point, train_window: i32) {
        let area = CausalArea::locate(p, train_window, image.size());
        if self.template.is_empty() {
            return;
        }
        // template taps plus the affine bias feature
        let k = self.template.len() + 1;

        let p_taps = template_values(image, p, &self.template);

        let mut samples: Vec<(Vec<f64>, f64, f64)> = Vec::new();
        area.for_each(|q| {
            if q == p {
                return;
            }
            let q_taps = template_values(image, q, &self.template);
            let target = template_value_clipped(image, q);

            // weight: inverse mean squared error between p's template and
            // q's template over the shared taps, floored so a flat local
            // neighborhood doesn't produce an infinite weight.
            let mut sq_err = 0.0;
            for i in 0..p_taps.len() {
                let d = q_taps[i] - p_taps[i];
                sq_err += d * d;
            }
            let mse = sq_err / (self.template.len() as f64);
            let weight = 1.0 / mse.max(MIN_SQUARED_ERROR);

            let mut x = q_taps;
            x.push(AFFINE_BIAS_FEATURE);

            samples.push((x, target, weight));
        });

        if samples.len() < 3 {
            return;
        }

        samples.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap());
        samples.truncate(MAX_TRAIN_SAMPLES);

        // normal equations: (X^T W X + lambda I) beta = X^T W y
        let mut ata = vec![vec![0.0; k]; k];
        let mut atb = vec![0.0; k];
        for (x, y, w) in &samples {
            for i in 0..k {
                atb[i] += w * x[i] * y;
                for j in 0..k {
                    ata[i][j] += w * x[i] * x[j];
                }
            }
        }
        for i in 0..k {
            ata[i][i] += REGULARIZATION_LAMBDA;
        }

        let beta = match gauss_jordan_solve(ata, atb) {
            Some(b) => b,
            None => return,
        };

        // weighted RMSE of the fit over the training samples
        let mut sq_err_sum = 0.0;
        let mut weight_sum = 0.0;
        for (x, y, w) in &samples {
            let pred: f64 = beta.iter().zip(x).map(|(b, v)| b * v).sum();
            sq_err_sum += w * (y - pred).powi(2);
            weight_sum += w;
        }
        let cost = (sq_err_sum / weight_sum).sqrt();

        let p_vals = feature_vector(image, p, &self.template);
        let predicted: f64 = beta.iter().zip(&p_vals).map(|(b, v)| b * v).sum();
        let peak = clip(predicted, 0.0, 256.0);

        map.insert(p, BasicParameter::new(cost, peak, 1));
    }
}

/// The fixed bank of 25 template shapes evaluated by every pixel: one
/// diamond, one small and one tiny near-circular ellipse, and three
/// families of rotated elongated ellipses (9, 9, and 4 orientations).
pub fn predictor_shapes(weight_sd_scale: f64) -> Vec<TemplatePatch> {
    use std::f64::consts::PI;

    let mut shapes = Vec::with_capacity(25);

    shapes.push(TemplatePatch::diamond(3, 3.0 * weight_sd_scale));

    for k in 0..9 {
        shapes.push(TemplatePatch::ellipse(
            6.7,
            1.3,
            (k as f64) * PI / 9.0,
            6.7 * weight_sd_scale,
        ));
    }

    shapes.push(TemplatePatch::ellipse(2.5, 2.5, 0.0, 2.5 * weight_sd_scale));

    for k in 0..9 {
        shapes.push(TemplatePatch::ellipse(
            4.9,
            0.99,
            (k as f64) * PI / 9.0,
            4.9 * weight_sd_scale,
        ));
    }

    shapes.push(TemplatePatch::ellipse(1.5, 1.5, 0.0, 1.5 * weight_sd_scale));

    for k in 0..4 {
        shapes.push(TemplatePatch::ellipse(
            3.0,
            0.99,
            (k as f64) * PI / 4.0,
            3.0 * weight_sd_scale,
        ));
    }

    debug_assert_eq!(shapes.len(), 25);
    shapes
}

/// Owns the 25 fixed predictors and drives all of them for a given pixel.
pub struct AdaptivePrediction {
    predictors: Vec<Predictor>,
}

impl AdaptivePrediction {
    pub fn new(weight_sd_scale: f64) -> Self {
        AdaptivePrediction {
            predictors: predictor_shapes(weight_sd_scale)
                .into_iter()
                .map(Predictor::new)
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.predictors.len()
    }

    /// Runs every predictor against pixel `p`, inserting each candidate
    /// into `map`. When the `use_rayon` feature is enabled the 25
    /// predictors run concurrently (their shared `BasicParameterMap`
    /// insert is internally mutex-serialized, so results are
    /// order-independent); otherwise they run sequentially.
    #[cfg(feature = "use_rayon")]
    pub fn estimate(&self, image: &Image<u8>, map: &BasicParameterMap, p: Point, train_window: i32) {
        rayon_core::scope(|s| {
            for predictor in &self.predictors {
                s.spawn(move |_| predictor.estimate(image, map, p, train_window));
            }
        });
    }

    #[cfg(not(feature = "use_rayon"))]
    pub fn estimate(&self, image: &Image<u8>, map: &BasicParameterMap, p: Point, train_window: i32) {
        for predictor in &self.predictors {
            predictor.estimate(image, map, p, train_window);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_predictor_shapes_bank_has_25_entries() {
        let shapes = predictor_shapes(1.0);
        assert_eq!(shapes.len(), 25);
        for s in &shapes {
            assert!(!s.is_empty());
        }
    }

    #[test]
    fn test_gauss_jordan_solves_identity() {
        let a = vec![vec![2.0, 0.0], vec![0.0, 4.0]];
        let b = vec![4.0, 8.0];
        let x = gauss_jordan_solve(a, b).unwrap();
        assert!((x[0] - 2.0).abs() < 1e-9);
        assert!((x[1] - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_predictor_fits_constant_image_exactly() {
        let image: Image<u8> = {
            let data = vec![100u8; 64];
            Image::from_vec(8, 8, data)
        };
        let predictor = Predictor::new(TemplatePatch::diamond(2, 2.0));
        let map = BasicParameterMap::new(8, 8, 4);
        predictor.estimate(&image, &map, Point::new(5, 5), 6);
        if let Some(best) = map.best(Point::new(5, 5)) {
            assert!((best.peak - 100.0).abs() < 1.0);
        }
    }
}
