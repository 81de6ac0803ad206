//! A frame as the player hands it on: a recipe, rendered on demand.

use cadence_model::{ColourConversion, Crop, Eyes, Image, PixelFormat, PositionImage, Size};
use std::fmt;
use std::sync::Arc;

/// Compressed frame data, shared without copying.
#[derive(Clone, PartialEq, Eq)]
pub struct EncodedData(Arc<[u8]>);

impl EncodedData {
    pub fn new(data: Vec<u8>) -> Self {
        Self(data.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for EncodedData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncodedData({} bytes)", self.0.len())
    }
}

/// Source image plus everything needed to turn it into an output frame.
///
/// Rendering (crop → scale → centre on the output canvas → fade → subtitle)
/// is deferred to [`image`](Self::image) so that frames the encoder can skip
/// are never rendered.
#[derive(Debug, Clone)]
pub struct PlayerVideo {
    pub source: Arc<Image>,
    pub crop: Crop,
    pub fade: Option<f64>,
    /// Size the cropped image is scaled to.
    pub inter_size: Size,
    /// Size of the output canvas.
    pub out_size: Size,
    pub eyes: Eyes,
    pub colour_conversion: Option<ColourConversion>,
    pub subtitle: Option<PositionImage>,
    pub encoded: Option<EncodedData>,
}

impl PlayerVideo {
    /// A black frame filling `size`.
    pub fn black(image: Arc<Image>, eyes: Eyes) -> Self {
        let size = image.size();
        Self {
            source: image,
            crop: Crop::default(),
            fade: None,
            inter_size: size,
            out_size: size,
            eyes,
            colour_conversion: None,
            subtitle: None,
            encoded: None,
        }
    }

    pub fn black_image(size: Size) -> Arc<Image> {
        Arc::new(Image::black(PixelFormat::Rgb24, size))
    }

    pub fn with_eyes(&self, eyes: Eyes) -> Self {
        Self {
            eyes,
            ..self.clone()
        }
    }

    pub fn set_subtitle(&mut self, subtitle: PositionImage) {
        self.subtitle = Some(subtitle);
    }

    pub fn has_encoded(&self) -> bool {
        self.encoded.is_some()
    }

    /// Render the output frame.
    pub fn image(&self) -> Image {
        let cropped = self.source.crop(&self.crop);
        let mut out = cropped.scale(self.inter_size).centred_on(self.out_size);
        if let Some(fade) = self.fade {
            out.fade(fade);
        }
        if let Some(subtitle) = &self.subtitle {
            out.alpha_blend(&subtitle.image, subtitle.position);
        }
        out
    }

    /// True when both recipes render to identical pixels.
    pub fn same(&self, other: &PlayerVideo) -> bool {
        if self.crop != other.crop
            || self.fade != other.fade
            || self.inter_size != other.inter_size
            || self.out_size != other.out_size
            || self.eyes != other.eyes
            || self.colour_conversion != other.colour_conversion
        {
            return false;
        }

        match (&self.subtitle, &other.subtitle) {
            (None, None) => {}
            (Some(a), Some(b)) if a.same(b) => {}
            _ => return false,
        }

        Arc::ptr_eq(&self.source, &other.source) || self.source.same_pixels(&other.source)
    }
}
