//! Owned RGB raster surface.
//!
//! All drawing and sampling goes through this value type; there is no
//! implicit canvas or global 2D context anywhere in the pipeline.

use image::{DynamicImage, ImageBuffer, ImageError, ImageFormat, Rgb, RgbImage};
use std::io::Cursor;

/// An owned 8-bit RGB image (`width * height * 3` bytes, row-major).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Raster {
    data: Vec<u8>,
    width: u32,
    height: u32,
}

impl Raster {
    /// Create a black raster of the given dimensions.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            data: vec![0u8; width as usize * height as usize * 3],
            width,
            height,
        }
    }

    /// Wrap an existing RGB8 buffer. Returns `None` if the length does not
    /// match `width * height * 3`.
    pub fn from_rgb8(data: Vec<u8>, width: u32, height: u32) -> Option<Self> {
        if data.len() != width as usize * height as usize * 3 {
            return None;
        }
        Some(Self {
            data,
            width,
            height,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Raw RGB8 bytes, row-major.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Read a pixel; out-of-bounds reads return black.
    pub fn get_pixel(&self, x: u32, y: u32) -> [u8; 3] {
        if x >= self.width || y >= self.height {
            return [0, 0, 0];
        }
        let i = (y as usize * self.width as usize + x as usize) * 3;
        [self.data[i], self.data[i + 1], self.data[i + 2]]
    }

    /// Write a pixel; out-of-bounds writes are ignored.
    pub fn put_pixel(&mut self, x: u32, y: u32, rgb: [u8; 3]) {
        if x >= self.width || y >= self.height {
            return;
        }
        let i = (y as usize * self.width as usize + x as usize) * 3;
        self.data[i..i + 3].copy_from_slice(&rgb);
    }

    /// Bilinear sample at sub-pixel coordinates. Out-of-bounds contributions
    /// are black, matching the warp fill policy.
    pub fn sample(&self, x: f64, y: f64) -> [f64; 3] {
        let x0 = x.floor() as i64;
        let y0 = y.floor() as i64;
        let fx = x - x0 as f64;
        let fy = y - y0 as f64;

        let tap = |px: i64, py: i64| -> [f64; 3] {
            if px < 0 || py < 0 || px >= self.width as i64 || py >= self.height as i64 {
                return [0.0; 3];
            }
            let p = self.get_pixel(px as u32, py as u32);
            [p[0] as f64, p[1] as f64, p[2] as f64]
        };

        let tl = tap(x0, y0);
        let tr = tap(x0 + 1, y0);
        let bl = tap(x0, y0 + 1);
        let br = tap(x0 + 1, y0 + 1);

        let mut out = [0.0f64; 3];
        for c in 0..3 {
            let top = tl[c] * (1.0 - fx) + tr[c] * fx;
            let bot = bl[c] * (1.0 - fx) + br[c] * fx;
            out[c] = top * (1.0 - fy) + bot * fy;
        }
        out
    }

    /// Return a horizontally mirrored copy (selfie orientation).
    pub fn mirrored_horizontal(&self) -> Raster {
        let mut out = Raster::new(self.width, self.height);
        for y in 0..self.height {
            for x in 0..self.width {
                out.put_pixel(self.width - 1 - x, y, self.get_pixel(x, y));
            }
        }
        out
    }

    /// Crop a rectangle, clamped to the image bounds. A fully out-of-bounds
    /// request yields an empty raster.
    pub fn crop(&self, x: i64, y: i64, w: u32, h: u32) -> Raster {
        let x0 = x.clamp(0, self.width as i64) as u32;
        let y0 = y.clamp(0, self.height as i64) as u32;
        let x1 = (x + w as i64).clamp(0, self.width as i64) as u32;
        let y1 = (y + h as i64).clamp(0, self.height as i64) as u32;

        let cw = x1.saturating_sub(x0);
        let ch = y1.saturating_sub(y0);
        let mut out = Raster::new(cw, ch);
        for oy in 0..ch {
            for ox in 0..cw {
                out.put_pixel(ox, oy, self.get_pixel(x0 + ox, y0 + oy));
            }
        }
        out
    }

    /// Decode an encoded image (PNG, JPEG, ...) into an RGB raster.
    pub fn decode(bytes: &[u8]) -> Result<Raster, ImageError> {
        let img = image::load_from_memory(bytes)?;
        let rgb: RgbImage = img.to_rgb8();
        let (width, height) = rgb.dimensions();
        Ok(Raster {
            data: rgb.into_raw(),
            width,
            height,
        })
    }

    /// Encode as PNG.
    pub fn to_encoded_bytes(&self) -> Result<Vec<u8>, ImageError> {
        let buf: RgbImage =
            ImageBuffer::<Rgb<u8>, _>::from_raw(self.width, self.height, self.data.clone())
                .expect("raster buffer length is width * height * 3 by construction");
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(buf).write_to(&mut out, ImageFormat::Png)?;
        Ok(out.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get_pixel() {
        let mut r = Raster::new(4, 4);
        r.put_pixel(2, 1, [10, 20, 30]);
        assert_eq!(r.get_pixel(2, 1), [10, 20, 30]);
        assert_eq!(r.get_pixel(0, 0), [0, 0, 0]);
    }

    #[test]
    fn test_out_of_bounds_reads_black() {
        let r = Raster::new(2, 2);
        assert_eq!(r.get_pixel(5, 5), [0, 0, 0]);
    }

    #[test]
    fn test_sample_at_pixel_center() {
        let mut r = Raster::new(3, 3);
        r.put_pixel(1, 1, [100, 100, 100]);
        let s = r.sample(1.0, 1.0);
        assert!((s[0] - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_sample_midpoint_interpolates() {
        let mut r = Raster::new(2, 1);
        r.put_pixel(0, 0, [0, 0, 0]);
        r.put_pixel(1, 0, [200, 200, 200]);
        let s = r.sample(0.5, 0.0);
        assert!((s[0] - 100.0).abs() < 1e-9, "got {}", s[0]);
    }

    #[test]
    fn test_mirror() {
        let mut r = Raster::new(3, 1);
        r.put_pixel(0, 0, [1, 1, 1]);
        r.put_pixel(2, 0, [3, 3, 3]);
        let m = r.mirrored_horizontal();
        assert_eq!(m.get_pixel(0, 0), [3, 3, 3]);
        assert_eq!(m.get_pixel(2, 0), [1, 1, 1]);
    }

    #[test]
    fn test_crop_clamped() {
        let mut r = Raster::new(4, 4);
        r.put_pixel(3, 3, [9, 9, 9]);
        let c = r.crop(2, 2, 10, 10);
        assert_eq!(c.width(), 2);
        assert_eq!(c.height(), 2);
        assert_eq!(c.get_pixel(1, 1), [9, 9, 9]);
    }

    #[test]
    fn test_crop_fully_outside() {
        let r = Raster::new(4, 4);
        let c = r.crop(100, 100, 10, 10);
        assert!(c.is_empty());
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let mut r = Raster::new(8, 8);
        r.put_pixel(4, 4, [255, 0, 0]);
        let bytes = r.to_encoded_bytes().unwrap();
        let back = Raster::decode(&bytes).unwrap();
        assert_eq!(back.width(), 8);
        assert_eq!(back.get_pixel(4, 4), [255, 0, 0]);
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(Raster::decode(&[1, 2, 3, 4]).is_err());
    }

    #[test]
    fn test_from_rgb8_length_check() {
        assert!(Raster::from_rgb8(vec![0u8; 12], 2, 2).is_some());
        assert!(Raster::from_rgb8(vec![0u8; 11], 2, 2).is_none());
    }
}
