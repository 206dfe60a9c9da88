use super::image::Image;
use super::point::Point;
use super::template_patch::TemplatePatch;

/// Per-pixel entropy estimate and the feature derived from neighboring
/// entropies, used to pick which `ModelParameterUnit` a pixel's mixture
/// distribution comes from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContextParameterUnit {
    /// `-log2(probability)` of the coded/decoded symbol at this pixel, in bits.
    pub entropy: f64,
    /// Weighted average of causal-neighbor entropies, used as the context
    /// feature fed into `ModelParameterMap::set_unit`.
    pub feature: f64,
}

impl Default for ContextParameterUnit {
    fn default() -> Self {
        // Maximal uncertainty for an 8-bit pixel before anything has been
        // coded: `log2(256) == 8` bits.
        ContextParameterUnit {
            entropy: 8.0,
            feature: 8.0,
        }
    }
}

/// Grid of per-pixel `ContextParameterUnit`s.
pub struct ContextParameterMap {
    units: Image<ContextParameterUnit>,
}

impl ContextParameterMap {
    pub fn new(width: i32, height: i32) -> Self {
        ContextParameterMap {
            units: Image::new(width, height),
        }
    }

    pub fn get(&self, p: Point) -> ContextParameterUnit {
        *self.units.get(p)
    }

    pub fn set_entropy(&mut self, p: Point, entropy: f64) {
        self.units.get_mut(p).entropy = entropy;
    }

    /// Recomputes `feature` at `p` as the template-weighted average of
    /// causal-neighbor entropies, clipped to image bounds; points outside
    /// the image fall back to the default 8-bit entropy, matching
    /// `ContextParameterMap_<T>::update_feature`.
    pub fn update_feature(&mut self, p: Point, template: &TemplatePatch) {
        let mut feature = 0.0;
        for (&offset, &weight) in template.points().iter().zip(template.weights()) {
            let q = p + offset;
            let entropy = if self.units.contains(q) {
                self.units.get(q).entropy
            } else {
                8.0
            };
            feature += weight * entropy;
        }
        self.units.get_mut(p).feature = feature;
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_default_entropy_is_eight_bits() {
        let map = ContextParameterMap::new(4, 4);
        assert_eq!(map.get(Point::new(0, 0)).entropy, 8.0);
    }

    #[test]
    fn test_feature_is_weighted_average_of_neighbors() {
        let mut map = ContextParameterMap::new(4, 4);
        map.set_entropy(Point::new(0, 0), 2.0);
        map.set_entropy(Point::new(1, 0), 4.0);

        let template = TemplatePatch::diamond(1, 1.0);
        map.update_feature(Point::new(1, 1), &template);

        let feature = map.get(Point::new(1, 1)).feature;
        assert!(feature > 0.0);
        assert!(feature <= 8.0);
    }

    #[test]
    fn test_feature_defaults_to_eight_near_border() {
        let mut map = ContextParameterMap::new(4, 4);
        let template = TemplatePatch::diamond(2, 1.0);
        map.update_feature(Point::new(0, 0), &template);
        assert_eq!(map.get(Point::new(0, 0)).feature, 8.0);
    }
}
