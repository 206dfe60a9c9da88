use super::point::Point;

/// Flat row-major pixel buffer (no PNM probing here — that lives in
/// `pnm.rs`).
#[derive(Debug, Clone)]
pub struct Image<T> {
    width: i32,
    height: i32,
    data: Vec<T>,
}

impl<T: Clone + Default> Image<T> {
    pub fn new(width: i32, height: i32) -> Self {
        assert!(width > 0 && height > 0, "image dimensions must be positive");
        Image {
            width,
            height,
            data: vec![T::default(); (width as usize) * (height as usize)],
        }
    }
}

impl<T> Image<T> {
    pub fn from_vec(width: i32, height: i32, data: Vec<T>) -> Self {
        assert_eq!(data.len(), (width as usize) * (height as usize));
        Image {
            width,
            height,
            data,
        }
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn size(&self) -> Point {
        Point::new(self.width, self.height)
    }

    pub fn contains(&self, p: Point) -> bool {
        p.isin(Point::new(0, 0), self.size())
    }

    fn index(&self, p: Point) -> usize {
        debug_assert!(self.contains(p), "pixel access out of bounds: {:?}", p);
        (p.y as usize) * (self.width as usize) + (p.x as usize)
    }

    pub fn get(&self, p: Point) -> &T {
        &self.data[self.index(p)]
    }

    pub fn get_mut(&mut self, p: Point) -> &mut T {
        let idx = self.index(p);
        &mut self.data[idx]
    }

    pub fn set(&mut self, p: Point, value: T) {
        let idx = self.index(p);
        self.data[idx] = value;
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }
}

impl<T> std::ops::Index<Point> for Image<T> {
    type Output = T;
    fn index(&self, p: Point) -> &T {
        self.get(p)
    }
}

impl<T> std::ops::IndexMut<Point> for Image<T> {
    fn index_mut(&mut self, p: Point) -> &mut T {
        self.get_mut(p)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_get_set_roundtrip() {
        let mut img: Image<u8> = Image::new(4, 4);
        img.set(Point::new(2, 3), 42);
        assert_eq!(*img.get(Point::new(2, 3)), 42);
        assert_eq!(*img.get(Point::new(0, 0)), 0);
    }

    #[test]
    fn test_from_vec_roundtrip() {
        let data: Vec<u8> = (0..16).collect();
        let img = Image::from_vec(4, 4, data.clone());
        for y in 0..4 {
            for x in 0..4 {
                assert_eq!(*img.get(Point::new(x, y)), data[(y * 4 + x) as usize]);
            }
        }
    }
}
