use std::sync::Mutex;

use super::image::Image;
use super::point::Point;

/// A single estimator result: a dissimilarity `cost`, the resulting
/// predicted value `peak`, and which estimator produced it (`flag`: `0`
/// for example search, `1` for adaptive prediction).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BasicParameter {
    pub cost: f64,
    pub peak: f64,
    pub flag: u8,
}

impl BasicParameter {
    pub fn new(cost: f64, peak: f64, flag: u8) -> Self {
        BasicParameter { cost, peak, flag }
    }
}

/// A bounded, cost-sorted (ascending) candidate list for a single pixel,
/// shared across estimator threads behind a mutex.
#[derive(Debug, Default)]
pub struct BasicParameterUnit {
    params: Mutex<Vec<BasicParameter>>,
}

impl BasicParameterUnit {
    pub fn new() -> Self {
        BasicParameterUnit {
            params: Mutex::new(Vec::new()),
        }
    }

    /// Inserts `param` maintaining ascending-cost order, capped at
    /// `max_num_params`: once full, a candidate is only admitted if its
    /// cost is <= the current worst (last) entry, which is then evicted.
    pub fn insert(&self, param: BasicParameter, max_num_params: usize) {
        let mut params = self.params.lock().unwrap();

        if params.len() >= max_num_params {
            if let Some(worst) = params.last() {
                if param.cost > worst.cost {
                    return;
                }
            }
            params.pop();
        }

        let pos = params.partition_point(|p| p.cost <= param.cost);
        params.insert(pos, param);
    }

    pub fn params(&self) -> Vec<BasicParameter> {
        self.params.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.params.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn best(&self) -> Option<BasicParameter> {
        self.params.lock().unwrap().first().copied()
    }
}

/// Per-pixel grid of `BasicParameterUnit`s, one per pixel in the image.
pub struct BasicParameterMap {
    units: Image<BasicParameterUnitCell>,
    max_num_params: usize,
}

/// `Image<T>` requires `Default`; `BasicParameterUnit` wraps a mutex so it
/// can't derive `Clone`, which `Image::new` needs for its fill value. This
/// thin cell sidesteps that by constructing each cell lazily via
/// `from_vec` instead of `new`.
#[derive(Debug, Default)]
pub struct BasicParameterUnitCell(BasicParameterUnit);

impl Clone for BasicParameterUnitCell {
    fn clone(&self) -> Self {
        BasicParameterUnitCell(BasicParameterUnit::new())
    }
}

impl BasicParameterMap {
    pub fn new(width: i32, height: i32, max_num_params: usize) -> Self {
        let count = (width as usize) * (height as usize);
        let data = (0..count)
            .map(|_| BasicParameterUnitCell(BasicParameterUnit::new()))
            .collect();
        BasicParameterMap {
            units: Image::from_vec(width, height, data),
            max_num_params,
        }
    }

    pub fn insert(&self, p: Point, param: BasicParameter) {
        self.units.get(p).0.insert(param, self.max_num_params);
    }

    pub fn unit(&self, p: Point) -> &BasicParameterUnit {
        &self.units.get(p).0
    }

    pub fn best(&self, p: Point) -> Option<BasicParameter> {
        self.unit(p).best()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_bounded_sorted_insert() {
        let unit = BasicParameterUnit::new();
        for cost in [5.0, 1.0, 3.0, 2.0, 4.0] {
            unit.insert(BasicParameter::new(cost, 0.0, 0), 3);
        }
        let params = unit.params();
        assert_eq!(params.len(), 3);
        let costs: Vec<f64> = params.iter().map(|p| p.cost).collect();
        assert_eq!(costs, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_rejects_worse_than_full_capacity() {
        let unit = BasicParameterUnit::new();
        unit.insert(BasicParameter::new(1.0, 0.0, 0), 1);
        unit.insert(BasicParameter::new(5.0, 0.0, 0), 1);
        assert_eq!(unit.best().unwrap().cost, 1.0);
    }

    #[test]
    fn test_map_per_pixel_independence() {
        let map = BasicParameterMap::new(4, 4, 2);
        map.insert(Point::new(0, 0), BasicParameter::new(1.0, 10.0, 0));
        map.insert(Point::new(1, 0), BasicParameter::new(2.0, 20.0, 1));
        assert_eq!(map.best(Point::new(0, 0)).unwrap().peak, 10.0);
        assert_eq!(map.best(Point::new(1, 0)).unwrap().peak, 20.0);
    }
}
