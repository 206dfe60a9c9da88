use super::basic_parameter::{BasicParameter, BasicParameterMap};
use super::image::Image;
use super::point::{CausalArea, Point};
use super::template_patch::TemplatePatch;

/// The pixel immediately preceding `p` in raster-scan order, i.e. the
/// most recently coded pixel at the point `p` is being estimated.
/// `None` for the very first pixel of the image, which has no
/// predecessor.
fn latest_coded_point(p: Point, width: i32) -> Option<Point> {
    if p.x > 0 {
        Some(Point::new(p.x - 1, p.y))
    } else if p.y > 0 {
        Some(Point::new(width - 1, p.y - 1))
    } else {
        None
    }
}

/// Samples `q`. A template tap landing outside the image only happens at
/// the first row/column, where it would otherwise have to clip onto a
/// pixel that is in-bounds but not yet coded (e.g. a tap at `(+2,-1)` from
/// a first-row pixel clips to `(p.x+2, 0)`, a pixel to its right on the
/// same row). Falling back to the most recently coded pixel instead keeps
/// every sample causal.
fn template_value_clipped(image: &Image<u8>, q: Point, latest: Option<Point>) -> f64 {
    if image.contains(q) {
        *image.get(q) as f64
    } else {
        match latest {
            Some(lp) => *image.get(lp) as f64,
            None => 0.0,
        }
    }
}

fn weighted_template_values(
    image: &Image<u8>,
    center: Point,
    template: &TemplatePatch,
    latest: Option<Point>,
) -> Vec<f64> {
    template
        .points()
        .iter()
        .map(|&offset| template_value_clipped(image, center + offset, latest))
        .collect()
}

/// Nonlocal example-search estimator: for each causal candidate location
/// within a search window, scores how well its causal neighborhood
/// matches the current pixel's, and offers the candidate's (bias
/// corrected) value as a prediction.
pub struct ExampleSearch {
    template: TemplatePatch,
}

impl ExampleSearch {
    pub fn new(radius: i32, weight_sd: f64) -> Self {
        ExampleSearch {
            template: TemplatePatch::diamond(radius, weight_sd),
        }
    }

    /// Searches the causal window around `p` and inserts every candidate
    /// into `map`'s bounded, cost-sorted list for pixel `p`. `penalty`
    /// scales the squared-distance term added to the template
    /// dissimilarity cost (the `-w`/`--tp_wgt` CLI parameter).
    pub fn estimate(&self, image: &Image<u8>, map: &BasicParameterMap, p: Point, window_size: i32, penalty: f64) {
        let area = CausalArea::locate(p, window_size, image.size());
        let latest = latest_coded_point(p, image.width());
        let p_vals = weighted_template_values(image, p, &self.template, latest);
        let weights = self.template.weights();
        let p_mean: f64 = p_vals.iter().zip(weights).map(|(v, w)| v * w).sum();
        // demeaned: f_p[i] = image[p+r_i] - mean_p
        let f_p: Vec<f64> = p_vals.iter().map(|&v| v - p_mean).collect();

        area.for_each(|q| {
            if q == p {
                return;
            }

            let q_vals = weighted_template_values(image, q, &self.template, latest);
            let q_mean: f64 = q_vals.iter().zip(weights).map(|(v, w)| v * w).sum();
            let f_q: Vec<f64> = q_vals.iter().map(|&v| v - q_mean).collect();

            let mut weighted_sq = 0.0;
            for i in 0..f_p.len() {
                let d = f_q[i] - f_p[i];
                weighted_sq += weights[i] * d * d;
            }

            let dx = (p.x - q.x).abs() as f64;
            let dy = (p.y - q.y).abs() as f64;
            let cost = weighted_sq.sqrt() + penalty * (dx + dy);

            // mean-corrected match value: shift q's raw value by the
            // difference between the two neighborhoods' weighted means
            let peak = template_value_clipped(image, q, latest) - q_mean + p_mean;

            map.insert(p, BasicParameter::new(cost, peak, 0));
        });
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_finds_exact_repeat_as_zero_cost_candidate() {
        let mut data = vec![0u8; 64];
        for y in 0..8i32 {
            for x in 0..8i32 {
                data[(y * 8 + x) as usize] = ((x + y) % 7) as u8 * 10;
            }
        }
        let image = Image::from_vec(8, 8, data);
        let search = ExampleSearch::new(2, 2.0);
        let map = BasicParameterMap::new(8, 8, 8);

        // a periodic pattern repeating every row means row 6 should find
        // an excellent match against row 1..5 at the same column.
        search.estimate(&image, &map, Point::new(3, 6), 6, 0.01);
        let best = map.best(Point::new(3, 6)).unwrap();
        assert!(best.cost < 1.0);
    }

    #[test]
    fn test_no_candidates_near_origin_does_not_panic() {
        let image: Image<u8> = Image::new(8, 8);
        let search = ExampleSearch::new(2, 2.0);
        let map = BasicParameterMap::new(8, 8, 8);
        search.estimate(&image, &map, Point::new(0, 0), 6, 0.01);
        assert!(map.best(Point::new(0, 0)).is_none());
    }
}
