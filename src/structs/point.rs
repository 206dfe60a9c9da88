/// Integer 2D coordinate, causal raster order (`y` increases downward).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Point { x, y }
    }

    /// Clips each coordinate to be >= the corresponding coordinate of `lo`.
    pub fn clip_min(self, lo: Point) -> Point {
        Point::new(self.x.max(lo.x), self.y.max(lo.y))
    }

    /// Clips each coordinate to be <= the corresponding coordinate of `hi`.
    pub fn clip_max(self, hi: Point) -> Point {
        Point::new(self.x.min(hi.x), self.y.min(hi.y))
    }

    /// Half-open containment test: `tl <= self < br` componentwise.
    pub fn isin(self, tl: Point, br: Point) -> bool {
        self.x >= tl.x && self.x < br.x && self.y >= tl.y && self.y < br.y
    }

}

impl std::ops::Add for Point {
    type Output = Point;
    fn add(self, rhs: Point) -> Point {
        Point::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl std::ops::Sub for Point {
    type Output = Point;
    fn sub(self, rhs: Point) -> Point {
        Point::new(self.x - rhs.x, self.y - rhs.y)
    }
}

/// Half-open axis-aligned rectangle `[begin, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub begin: Point,
    pub end: Point,
}

impl Rect {
    pub fn new(begin: Point, end: Point) -> Self {
        Rect { begin, end }
    }

    pub fn width(&self) -> i32 {
        (self.end.x - self.begin.x).max(0)
    }

    pub fn height(&self) -> i32 {
        (self.end.y - self.begin.y).max(0)
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }
}

/// The causal neighborhood of a pixel under raster-scan order: the
/// rectangle of already-coded rows strictly above, plus the run of
/// already-coded pixels on the same row to the left. Both sub-rectangles
/// are clipped to image bounds and a `window_size`-wide/tall box centered
/// on `p`.
pub struct CausalArea {
    pub window_above: Rect,
    pub window_left: Rect,
}

impl CausalArea {
    /// `window_size` is the side length of the (square) search window;
    /// the above-window spans the full horizontal window width, the
    /// left-window is restricted to the current row.
    pub fn locate(p: Point, window_size: i32, image_size: Point) -> CausalArea {
        let half = window_size / 2;

        let above_begin = Point::new(p.x - half, p.y - window_size).clip_min(Point::new(0, 0));
        let above_end = Point::new(p.x + half + 1, p.y).clip_max(image_size);
        let window_above = Rect::new(above_begin, above_end.clip_min(above_begin));

        let left_begin = Point::new((p.x - window_size).max(0), p.y);
        let left_end = Point::new(p.x, p.y + 1);
        let window_left = Rect::new(left_begin, left_end.clip_min(left_begin));

        CausalArea {
            window_above,
            window_left,
        }
    }

    /// Total number of pixels covered by both sub-rectangles.
    pub fn size(&self) -> usize {
        (self.window_above.width() * self.window_above.height()
            + self.window_left.width() * self.window_left.height()) as usize
    }

    /// Visits every point in the causal area, above-window first, then
    /// left-window, both in row-major order.
    pub fn for_each<F: FnMut(Point)>(&self, mut f: F) {
        for y in self.window_above.begin.y..self.window_above.end.y {
            for x in self.window_above.begin.x..self.window_above.end.x {
                f(Point::new(x, y));
            }
        }
        for y in self.window_left.begin.y..self.window_left.end.y {
            for x in self.window_left.begin.x..self.window_left.end.x {
                f(Point::new(x, y));
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_isin() {
        let p = Point::new(2, 3);
        assert!(p.isin(Point::new(0, 0), Point::new(10, 10)));
        assert!(!p.isin(Point::new(3, 0), Point::new(10, 10)));
        assert!(!p.isin(Point::new(0, 0), Point::new(2, 10)));
    }

    #[test]
    fn test_causal_area_excludes_future() {
        let image_size = Point::new(16, 16);
        let p = Point::new(8, 8);
        let area = CausalArea::locate(p, 6, image_size);
        let mut count = 0;
        area.for_each(|q| {
            assert!(q.y < p.y || (q.y == p.y && q.x < p.x));
            count += 1;
        });
        assert_eq!(count, area.size());
    }

    #[test]
    fn test_causal_area_clips_to_bounds() {
        let image_size = Point::new(16, 16);
        let p = Point::new(0, 0);
        let area = CausalArea::locate(p, 6, image_size);
        assert_eq!(area.size(), 0);
    }
}
