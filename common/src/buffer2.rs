use std::ops::{Deref, DerefMut, Index, IndexMut};
use std::slice;

/// Row-major 2D raster.
///
/// Pixel `(x, y)` lives at `y * width + x`. Used for micrographs, filter-bank
/// bands, particle patches, polar images and correlation maps alike.
#[derive(Debug, Clone, PartialEq)]
pub struct Buffer2<T> {
    pixels: Vec<T>,
    width: usize,
    height: usize,
}

impl<T> Buffer2<T> {
    pub fn new(width: usize, height: usize, pixels: Vec<T>) -> Self {
        assert_eq!(
            pixels.len(),
            width * height,
            "pixels length must equal width * height"
        );
        Self {
            pixels,
            width,
            height,
        }
    }

    pub fn from_fn(width: usize, height: usize, mut f: impl FnMut(usize, usize) -> T) -> Self {
        let mut pixels = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                pixels.push(f(x, y));
            }
        }
        Self {
            pixels,
            width,
            height,
        }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> &T {
        debug_assert!(x < self.width && y < self.height);
        &self.pixels[y * self.width + x]
    }

    #[inline]
    pub fn get_mut(&mut self, x: usize, y: usize) -> &mut T {
        debug_assert!(x < self.width && y < self.height);
        &mut self.pixels[y * self.width + x]
    }

    #[inline]
    pub fn row(&self, y: usize) -> &[T] {
        let start = y * self.width;
        &self.pixels[start..start + self.width]
    }

    #[inline]
    pub fn row_mut(&mut self, y: usize) -> &mut [T] {
        let start = y * self.width;
        &mut self.pixels[start..start + self.width]
    }

    pub fn rows(&self) -> slice::Chunks<'_, T> {
        // `chunks(0)` panics, empty rasters have no rows anyway
        self.pixels.chunks(self.width.max(1))
    }

    #[inline]
    pub fn pixels(&self) -> &[T] {
        &self.pixels
    }

    #[inline]
    pub fn pixels_mut(&mut self) -> &mut [T] {
        &mut self.pixels
    }

    #[inline]
    pub fn into_vec(self) -> Vec<T> {
        self.pixels
    }

    pub fn map<U>(&self, f: impl FnMut(&T) -> U) -> Buffer2<U> {
        Buffer2 {
            pixels: self.pixels.iter().map(f).collect(),
            width: self.width,
            height: self.height,
        }
    }
}

impl<T: Default + Clone> Buffer2<T> {
    pub fn new_default(width: usize, height: usize) -> Self {
        Self {
            pixels: vec![T::default(); width * height],
            width,
            height,
        }
    }
}

impl<T: Clone> Buffer2<T> {
    pub fn new_filled(width: usize, height: usize, value: T) -> Self {
        Self {
            pixels: vec![value; width * height],
            width,
            height,
        }
    }

    /// Copies the `width x height` window whose top-left corner is `(x0, y0)`.
    ///
    /// # Panics
    ///
    /// Panics if the window does not fit inside the raster.
    pub fn window(&self, x0: usize, y0: usize, width: usize, height: usize) -> Self {
        assert!(
            x0 + width <= self.width && y0 + height <= self.height,
            "window {}x{} at ({}, {}) exceeds raster {}x{}",
            width,
            height,
            x0,
            y0,
            self.width,
            self.height
        );
        let mut pixels = Vec::with_capacity(width * height);
        for y in y0..y0 + height {
            let start = y * self.width + x0;
            pixels.extend_from_slice(&self.pixels[start..start + width]);
        }
        Self {
            pixels,
            width,
            height,
        }
    }
}

impl Buffer2<f64> {
    /// Bilinear sample at a fractional position, clamped to the raster edge.
    pub fn sample_bilinear(&self, x: f64, y: f64) -> f64 {
        debug_assert!(self.width > 0 && self.height > 0);
        let max_x = (self.width - 1) as f64;
        let max_y = (self.height - 1) as f64;
        let x = x.clamp(0.0, max_x);
        let y = y.clamp(0.0, max_y);

        let x0 = x.floor() as usize;
        let y0 = y.floor() as usize;
        let x1 = (x0 + 1).min(self.width - 1);
        let y1 = (y0 + 1).min(self.height - 1);
        let fx = x - x0 as f64;
        let fy = y - y0 as f64;

        let top = self[(x0, y0)] * (1.0 - fx) + self[(x1, y0)] * fx;
        let bottom = self[(x0, y1)] * (1.0 - fx) + self[(x1, y1)] * fx;
        top * (1.0 - fy) + bottom * fy
    }

    pub fn max_value(&self) -> f64 {
        self.pixels.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    }
}

impl<T> Index<(usize, usize)> for Buffer2<T> {
    type Output = T;

    #[inline]
    fn index(&self, (x, y): (usize, usize)) -> &Self::Output {
        &self.pixels[y * self.width + x]
    }
}

impl<T> IndexMut<(usize, usize)> for Buffer2<T> {
    #[inline]
    fn index_mut(&mut self, (x, y): (usize, usize)) -> &mut Self::Output {
        &mut self.pixels[y * self.width + x]
    }
}

impl<T> Deref for Buffer2<T> {
    type Target = [T];

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.pixels
    }
}

impl<T> DerefMut for Buffer2<T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.pixels
    }
}

impl<T> From<Buffer2<T>> for Vec<T> {
    #[inline]
    fn from(buffer: Buffer2<T>) -> Self {
        buffer.pixels
    }
}
