use super::point::Point;

/// A fixed, causal-only neighborhood shape used by both the example-search
/// estimator and each of the 25 adaptive-prediction predictors: a diamond
/// or a (possibly rotated) ellipse, enumerated in strict row-major order
/// (`y` from `-range` to `0`, `x` from `-range` to `range`) with a
/// Gaussian weight per point normalized to sum to 1.
///
/// Enumeration order is load-bearing: it is the order the adaptive
/// predictor's weighted least squares sees its regressors in, and must
/// match bit-for-bit between encoder and decoder.
#[derive(Debug, Clone)]
pub struct TemplatePatch {
    points: Vec<Point>,
    weights: Vec<f64>,
}

impl TemplatePatch {
    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// A diamond of taxicab radius `radius`: `|x| + |y| <= radius`.
    pub fn diamond(radius: i32, weight_sd: f64) -> TemplatePatch {
        Self::build(radius, weight_sd, |x, y| x.abs() + y.abs() <= radius)
    }

    /// An ellipse with semi-axes `(rx, ry)` rotated by `angle` radians
    /// (applied as an inverse rotation to the test point, so the ellipse
    /// itself rotates by `+angle`).
    pub fn ellipse(rx: f64, ry: f64, angle: f64, weight_sd: f64) -> TemplatePatch {
        let range = rx.max(ry).ceil() as i32;
        let (s, c) = angle.sin_cos();
        Self::build(range, weight_sd, |x, y| {
            let xf = x as f64;
            let yf = y as f64;
            // rotate by -angle to test against the axis-aligned ellipse
            let xr = xf * c + yf * s;
            let yr = -xf * s + yf * c;
            (xr * xr) / (rx * rx) + (yr * yr) / (ry * ry) <= 1.0
        })
    }

    fn build(range: i32, weight_sd: f64, test: impl Fn(i32, i32) -> bool) -> TemplatePatch {
        let mut points = Vec::new();
        let mut weights = Vec::new();
        let scale = 1.0 / (2.0 * weight_sd * weight_sd);

        for y in -range..=0 {
            for x in -range..=range {
                let causal = y < 0 || (y == 0 && x < 0);
                if !causal {
                    continue;
                }
                if !test(x, y) {
                    continue;
                }
                points.push(Point::new(x, y));
                // r is taxicab distance, per the weight formula's `r = |x|+|y|`.
                let r = (x.abs() + y.abs()) as f64;
                weights.push((-r * r * scale).exp());
            }
        }

        let sum: f64 = weights.iter().sum();
        assert!(sum > 0.0, "template patch must contain at least one point");
        for w in &mut weights {
            *w /= sum;
        }

        TemplatePatch { points, weights }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_diamond_is_causal_and_normalized() {
        let tp = TemplatePatch::diamond(3, 3.0);
        assert!(!tp.is_empty());
        for p in tp.points() {
            assert!(p.y < 0 || (p.y == 0 && p.x < 0));
            assert!(p.x.abs() + p.y.abs() <= 3);
        }
        let sum: f64 = tp.weights().iter().sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_ellipse_is_causal_and_normalized() {
        let tp = TemplatePatch::ellipse(6.7, 1.3, std::f64::consts::PI / 9.0, 2.0);
        assert!(!tp.is_empty());
        for p in tp.points() {
            assert!(p.y < 0 || (p.y == 0 && p.x < 0));
        }
        let sum: f64 = tp.weights().iter().sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_enumeration_order_is_row_major() {
        let tp = TemplatePatch::diamond(2, 2.0);
        let mut last = (i32::MIN, i32::MIN);
        for p in tp.points() {
            assert!((p.y, p.x) > last);
            last = (p.y, p.x);
        }
    }
}
