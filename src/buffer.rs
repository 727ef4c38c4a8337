use tiff::{
    decoder::{Decoder as TiffDecoder, DecodingResult},
    encoder::{colortype, TiffEncoder},
    ColorType,
};

use super::*;

/// A fixed-size grid of RGBA float pixels stored row-major.
///
/// Depending on where it sits in the pipeline a pixel is either
/// `(radiance, opacity)` for scenes or `(radiance, transmittance)` for
/// cascades.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterBuffer {
    size: UVec2,
    pixels: Vec<Vec4>,
}

impl RasterBuffer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            size: UVec2::new(width, height),
            pixels: vec![Vec4::ZERO; width as usize * height as usize],
        }
    }
    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(UVec2) -> Vec4) -> Self {
        let pixels = (0..height)
            .flat_map(|y| (0..width).map(move |x| UVec2::new(x, y)))
            .map(&mut f)
            .collect();
        Self {
            size: UVec2::new(width, height),
            pixels,
        }
    }
    pub fn from_pixels(width: u32, height: u32, pixels: Vec<Vec4>) -> Result<Self> {
        if pixels.len() != width as usize * height as usize {
            return Err(ConfigError::SizeMismatch {
                expected: [width, height],
                found: [pixels.len() as u32, 1],
            }
            .into());
        }
        Ok(Self {
            size: UVec2::new(width, height),
            pixels,
        })
    }

    pub fn width(&self) -> u32 {
        self.size.x
    }
    pub fn height(&self) -> u32 {
        self.size.y
    }
    pub fn size(&self) -> UVec2 {
        self.size
    }
    pub fn len(&self) -> usize {
        self.pixels.len()
    }
    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }
    pub fn pixels(&self) -> &[Vec4] {
        &self.pixels
    }
    pub fn pixels_mut(&mut self) -> &mut [Vec4] {
        &mut self.pixels
    }

    fn index(&self, coord: UVec2) -> usize {
        coord.x as usize + coord.y as usize * self.size.x as usize
    }
    pub fn contains(&self, coord: IVec2) -> bool {
        coord.x >= 0
            && coord.y >= 0
            && (coord.x as u32) < self.size.x
            && (coord.y as u32) < self.size.y
    }

    /// Reads a pixel, treating everything outside the buffer as zero.
    /// Scenes are sampled this way so that rays leaving the image see
    /// empty space.
    pub fn get(&self, coord: IVec2) -> Vec4 {
        if self.contains(coord) {
            self.pixels[self.index(coord.as_uvec2())]
        } else {
            Vec4::ZERO
        }
    }

    /// Reads a pixel, snapping out-of-bounds coordinates to the nearest edge.
    /// Cascade buffers are sampled this way.
    pub fn get_clamped(&self, coord: IVec2) -> Vec4 {
        let max = self.size.as_ivec2() - IVec2::ONE;
        let coord = coord.max(IVec2::ZERO).min(max).as_uvec2();
        self.pixels[self.index(coord)]
    }

    pub fn set(&mut self, coord: UVec2, value: Vec4) {
        let index = self.index(coord);
        self.pixels[index] = value;
    }

    pub fn fill(&mut self, value: Vec4) {
        self.pixels.fill(value);
    }

    /// Converts stored values into an 8-bit display image. Linear buffers get
    /// the sRGB transfer function applied here; quantized buffers are already
    /// encoded.
    pub fn to_rgba8(&self, policy: ColorPolicy) -> image::RgbaImage {
        image::RgbaImage::from_fn(self.width(), self.height(), |x, y| {
            let rgb = policy.to_display(self.pixels[self.index(UVec2::new(x, y))]);
            let [r, g, b] = rgb.to_array().map(color::unorm8);
            image::Rgba([r, g, b, u8::MAX])
        })
    }

    pub fn load_tiff(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let mut file = TiffDecoder::new(file)?;
        let (width, height) = file.dimensions()?;
        let color_type = file.colortype()?;
        if color_type != ColorType::RGBA(32) {
            return Err(tiff::TiffError::UnsupportedError(
                tiff::TiffUnsupportedError::UnsupportedColorType(color_type),
            )
            .into());
        }
        let DecodingResult::F32(image) = file.read_image()? else {
            return Err(tiff::TiffError::UnsupportedError(
                tiff::TiffUnsupportedError::UnsupportedColorType(color_type),
            )
            .into());
        };
        let pixels = image.chunks_exact(4).map(Vec4::from_slice).collect();
        Self::from_pixels(width, height, pixels)
    }

    pub fn save_tiff(&self, path: impl AsRef<Path>) -> Result<()> {
        let data = self
            .pixels
            .iter()
            .flat_map(|pixel| pixel.to_array())
            .collect::<Vec<_>>();
        let file = File::create(path.as_ref())?;
        let mut file = TiffEncoder::new(file)?;
        file.write_image::<colortype::RGBA32Float>(self.width(), self.height(), &data)?;
        Ok(())
    }
}
