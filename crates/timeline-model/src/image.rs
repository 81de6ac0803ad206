//! Owned raster images and the handful of operations the timeline needs.
//!
//! Decoders hand the player RGB24 or RGBA frames; subtitles arrive as RGBA.
//! Anything outside that contract is a programming error and panics.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    Rgb24,
    Rgba,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgb24 => 3,
            PixelFormat::Rgba => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn ratio(&self) -> f64 {
        f64::from(self.width) / f64::from(self.height.max(1))
    }

    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    /// The largest size with `ratio` that fits inside `self`.
    pub fn fit_ratio_within(&self, ratio: f64) -> Size {
        if ratio > self.ratio() {
            Size::new(self.width, (f64::from(self.width) / ratio).round() as u32)
        } else {
            Size::new((f64::from(self.height) * ratio).round() as u32, self.height)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Pixels to remove from each edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Crop {
    pub left: u32,
    pub right: u32,
    pub top: u32,
    pub bottom: u32,
}

impl Crop {
    pub fn apply(&self, size: Size) -> Size {
        Size::new(
            size.width.saturating_sub(self.left + self.right),
            size.height.saturating_sub(self.top + self.bottom),
        )
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Image {
    format: PixelFormat,
    size: Size,
    data: Vec<u8>,
}

impl std::fmt::Debug for Image {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Image")
            .field("format", &self.format)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

impl Image {
    /// A black (and, for RGBA, fully transparent) image.
    pub fn black(format: PixelFormat, size: Size) -> Self {
        Self {
            format,
            size,
            data: vec![0; size.area() as usize * format.bytes_per_pixel()],
        }
    }

    pub fn from_data(format: PixelFormat, size: Size, data: Vec<u8>) -> Self {
        assert_eq!(
            data.len(),
            size.area() as usize * format.bytes_per_pixel(),
            "image data does not match {:?} {:?}",
            format,
            size
        );
        Self { format, size, data }
    }

    /// Every pixel set to one colour.
    pub fn filled(format: PixelFormat, size: Size, pixel: &[u8]) -> Self {
        assert_eq!(pixel.len(), format.bytes_per_pixel());
        let data = pixel
            .iter()
            .copied()
            .cycle()
            .take(size.area() as usize * format.bytes_per_pixel())
            .collect();
        Self { format, size, data }
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn pixel(&self, x: u32, y: u32) -> &[u8] {
        let bpp = self.format.bytes_per_pixel();
        let at = (y as usize * self.size.width as usize + x as usize) * bpp;
        &self.data[at..at + bpp]
    }

    pub fn make_black(&mut self) {
        self.data.fill(0);
    }

    pub fn crop(&self, crop: &Crop) -> Image {
        let out_size = crop.apply(self.size);
        let bpp = self.format.bytes_per_pixel();
        let mut data = Vec::with_capacity(out_size.area() as usize * bpp);
        for y in 0..out_size.height {
            let row = (y + crop.top) as usize * self.size.width as usize;
            let start = (row + crop.left as usize) * bpp;
            data.extend_from_slice(&self.data[start..start + out_size.width as usize * bpp]);
        }
        Image::from_data(self.format, out_size, data)
    }

    /// Nearest-neighbour resize.
    pub fn scale(&self, size: Size) -> Image {
        if size == self.size {
            return self.clone();
        }
        let bpp = self.format.bytes_per_pixel();
        let mut data = Vec::with_capacity(size.area() as usize * bpp);
        for y in 0..size.height {
            let sy = (u64::from(y) * u64::from(self.size.height) / u64::from(size.height.max(1)))
                as u32;
            for x in 0..size.width {
                let sx = (u64::from(x) * u64::from(self.size.width)
                    / u64::from(size.width.max(1))) as u32;
                data.extend_from_slice(self.pixel(sx, sy));
            }
        }
        Image::from_data(self.format, size, data)
    }

    /// Multiply colour channels by `amount` in `[0, 1]`.
    pub fn fade(&mut self, amount: f64) {
        let amount = amount.clamp(0.0, 1.0);
        let bpp = self.format.bytes_per_pixel();
        for (i, byte) in self.data.iter_mut().enumerate() {
            // leave alpha alone
            if bpp == 4 && i % 4 == 3 {
                continue;
            }
            *byte = (f64::from(*byte) * amount).round() as u8;
        }
    }

    /// Paste `self` centred on a black canvas of `size`.
    pub fn centred_on(&self, size: Size) -> Image {
        let mut canvas = Image::black(self.format, size);
        let x = (i64::from(size.width) - i64::from(self.size.width)) / 2;
        let y = (i64::from(size.height) - i64::from(self.size.height)) / 2;
        canvas.copy_at(self, Position::new(x as i32, y as i32));
        canvas
    }

    fn copy_at(&mut self, other: &Image, at: Position) {
        assert_eq!(self.format, other.format, "copy between pixel formats");
        let bpp = self.format.bytes_per_pixel();
        for oy in 0..other.size.height {
            let ty = at.y + oy as i32;
            if ty < 0 || ty >= self.size.height as i32 {
                continue;
            }
            for ox in 0..other.size.width {
                let tx = at.x + ox as i32;
                if tx < 0 || tx >= self.size.width as i32 {
                    continue;
                }
                let dst = (ty as usize * self.size.width as usize + tx as usize) * bpp;
                self.data[dst..dst + bpp].copy_from_slice(other.pixel(ox, oy));
            }
        }
    }

    /// Composite an RGBA `overlay` onto this image with its top-left at `at`.
    pub fn alpha_blend(&mut self, overlay: &Image, at: Position) {
        assert_eq!(
            overlay.format,
            PixelFormat::Rgba,
            "alpha_blend needs an RGBA overlay, got {:?}",
            overlay.format
        );
        let bpp = self.format.bytes_per_pixel();
        for oy in 0..overlay.size.height {
            let ty = at.y + oy as i32;
            if ty < 0 || ty >= self.size.height as i32 {
                continue;
            }
            for ox in 0..overlay.size.width {
                let tx = at.x + ox as i32;
                if tx < 0 || tx >= self.size.width as i32 {
                    continue;
                }
                let src = overlay.pixel(ox, oy);
                let alpha = u32::from(src[3]);
                let dst = (ty as usize * self.size.width as usize + tx as usize) * bpp;
                for c in 0..3 {
                    let d = u32::from(self.data[dst + c]);
                    let s = u32::from(src[c]);
                    self.data[dst + c] = ((s * alpha + d * (255 - alpha)) / 255) as u8;
                }
                if bpp == 4 {
                    let d = u32::from(self.data[dst + 3]);
                    self.data[dst + 3] = (alpha + d * (255 - alpha) / 255).min(255) as u8;
                }
            }
        }
    }

    /// Identical format, size and pixels.
    pub fn same_pixels(&self, other: &Image) -> bool {
        self == other
    }
}

/// An image placed at a position on some canvas.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionImage {
    pub image: Arc<Image>,
    pub position: Position,
}

impl PositionImage {
    pub fn new(image: Arc<Image>, position: Position) -> Self {
        Self { image, position }
    }

    pub fn same(&self, other: &PositionImage) -> bool {
        self.position == other.position
            && (Arc::ptr_eq(&self.image, &other.image) || self.image.same_pixels(&other.image))
    }
}

/// Flatten several RGBA images into one covering their bounding box.
///
/// Panics if `images` is empty.
pub fn merge(images: &[PositionImage]) -> PositionImage {
    assert!(!images.is_empty(), "merge of no images");
    if images.len() == 1 {
        return images[0].clone();
    }

    let left = images.iter().map(|i| i.position.x).min().unwrap_or(0);
    let top = images.iter().map(|i| i.position.y).min().unwrap_or(0);
    let right = images
        .iter()
        .map(|i| i.position.x + i.image.size().width as i32)
        .max()
        .unwrap_or(0);
    let bottom = images
        .iter()
        .map(|i| i.position.y + i.image.size().height as i32)
        .max()
        .unwrap_or(0);

    let mut merged = Image::black(
        PixelFormat::Rgba,
        Size::new((right - left) as u32, (bottom - top) as u32),
    );
    for part in images {
        merged.alpha_blend(
            &part.image,
            Position::new(part.position.x - left, part.position.y - top),
        );
    }
    PositionImage::new(Arc::new(merged), Position::new(left, top))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crop_reduces_size() {
        let image = Image::filled(PixelFormat::Rgb24, Size::new(8, 6), &[10, 20, 30]);
        let crop = Crop {
            left: 1,
            right: 2,
            top: 1,
            bottom: 1,
        };
        let cropped = image.crop(&crop);
        assert_eq!(cropped.size(), Size::new(5, 4));
        assert_eq!(cropped.pixel(0, 0), &[10, 20, 30]);
    }

    #[test]
    fn test_scale_nearest() {
        let image = Image::filled(PixelFormat::Rgb24, Size::new(2, 2), &[1, 2, 3]);
        let scaled = image.scale(Size::new(4, 6));
        assert_eq!(scaled.size(), Size::new(4, 6));
        assert_eq!(scaled.pixel(3, 5), &[1, 2, 3]);
    }

    #[test]
    fn test_fade_halves() {
        let mut image = Image::filled(PixelFormat::Rgb24, Size::new(1, 1), &[200, 100, 50]);
        image.fade(0.5);
        assert_eq!(image.pixel(0, 0), &[100, 50, 25]);
    }

    #[test]
    fn test_alpha_blend_opaque_and_clear() {
        let mut base = Image::black(PixelFormat::Rgb24, Size::new(2, 1));
        let overlay = Image::from_data(
            PixelFormat::Rgba,
            Size::new(2, 1),
            vec![255, 255, 255, 255, 255, 255, 255, 0],
        );
        base.alpha_blend(&overlay, Position::new(0, 0));
        assert_eq!(base.pixel(0, 0), &[255, 255, 255]);
        assert_eq!(base.pixel(1, 0), &[0, 0, 0]);
    }

    #[test]
    #[should_panic]
    fn test_alpha_blend_rejects_rgb_overlay() {
        let mut base = Image::black(PixelFormat::Rgb24, Size::new(2, 2));
        let overlay = Image::black(PixelFormat::Rgb24, Size::new(1, 1));
        base.alpha_blend(&overlay, Position::default());
    }

    #[test]
    fn test_merge_bounding_box() {
        let a = PositionImage::new(
            Arc::new(Image::filled(PixelFormat::Rgba, Size::new(2, 2), &[255, 0, 0, 255])),
            Position::new(10, 10),
        );
        let b = PositionImage::new(
            Arc::new(Image::filled(PixelFormat::Rgba, Size::new(2, 2), &[0, 255, 0, 255])),
            Position::new(13, 11),
        );
        let merged = merge(&[a, b]);
        assert_eq!(merged.position, Position::new(10, 10));
        assert_eq!(merged.image.size(), Size::new(5, 3));
        assert_eq!(merged.image.pixel(0, 0), &[255, 0, 0, 255]);
        assert_eq!(merged.image.pixel(4, 2), &[0, 255, 0, 255]);
        assert_eq!(merged.image.pixel(2, 0)[3], 0);
    }

    #[test]
    fn test_centred_on_letterboxes() {
        let image = Image::filled(PixelFormat::Rgb24, Size::new(2, 2), &[9, 9, 9]);
        let canvas = image.centred_on(Size::new(4, 2));
        assert_eq!(canvas.pixel(0, 0), &[0, 0, 0]);
        assert_eq!(canvas.pixel(1, 0), &[9, 9, 9]);
        assert_eq!(canvas.pixel(3, 1), &[0, 0, 0]);
    }

    #[test]
    fn test_fit_ratio_within() {
        let container = Size::new(1998, 1080);
        assert_eq!(container.fit_ratio_within(2.39), Size::new(1998, 836));
        assert_eq!(container.fit_ratio_within(1.0), Size::new(1080, 1080));
    }
}
