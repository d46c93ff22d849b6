//!
//! Compositing a render over the base photo, aligned on the anchor
//!

use std::io::Cursor;

use base64::{engine::general_purpose::STANDARD, Engine};
use image::imageops::{self, FilterType};
use image::{ImageFormat, Rgb, RgbImage, RgbaImage};
use nalgebra::{Point2, Vector2};

use crate::render::RenderFrame;
use error::OverlayError;

pub mod error;
pub mod mask;

const DATA_URI_PREFIX: &str = "data:image/jpeg;base64,";

///
/// Converts a view scale into the factor the render raster is resized by. The relation is
/// empirical: the perceived overlay size matches the requested scale split evenly over both axes.
///
/// # Parameters:
/// - `view_scale`: The `scale` view parameter
///
/// # Returns:
/// - `sqrt(view_scale² / 2)`
///
pub fn overlay_scale(view_scale: f64) -> f64 {
    (view_scale * view_scale / 2.).sqrt()
}

///
/// A base photo with a render pasted over it.
///
/// # Fields:
/// - `image`: The blended raster, the size of the base photo
/// - `offset`: Where the top-left corner of the resized render was pasted, in photo pixels
/// - `factor`: The factor the render was resized by
///
#[derive(getset::Getters, Debug, Clone)]
#[get = "pub"]
pub struct CompositeImage {
    image: RgbaImage,
    offset: (i64, i64),
    factor: f64,
}

impl CompositeImage {
    ///
    /// Maps a pixel position of the original render into the photo.
    ///
    pub fn to_photo(&self, render_point: Point2<f64>) -> Point2<f64> {
        Point2::new(self.offset.0 as f64, self.offset.1 as f64) + render_point.coords * self.factor
    }

    ///
    /// Drops the alpha channel, weighting each colour by its alpha as if laid over black.
    ///
    /// # Returns:
    /// - An opaque copy of the composite
    ///
    pub fn flatten(&self) -> RgbImage {
        RgbImage::from_fn(self.image.width(), self.image.height(), |x, y| {
            let pixel = self.image.get_pixel(x, y);
            let alpha = pixel[3] as u32;
            let weight = |channel: u8| ((channel as u32 * alpha + 127) / 255) as u8;
            Rgb([weight(pixel[0]), weight(pixel[1]), weight(pixel[2])])
        })
    }

    ///
    /// Encodes the flattened composite as a JPEG data URI.
    ///
    /// # Returns:
    /// - `data:image/jpeg;base64,...`
    /// - `Encoding` if the JPEG encoder fails
    ///
    pub fn to_data_uri(&self) -> Result<String, OverlayError> {
        let mut bytes = Cursor::new(vec![]);
        self.flatten().write_to(&mut bytes, ImageFormat::Jpeg)?;

        Ok(format!("{}{}", DATA_URI_PREFIX, STANDARD.encode(bytes.into_inner())))
    }

    pub fn into_image(self) -> RgbaImage {
        self.image
    }
}

///
/// The top-left corner at which a render resized by `factor` must be pasted so its anchor lands
/// on `anchor`. Offsets are truncated towards zero, as whole pixels.
///
pub fn paste_offset(render_anchor: Point2<f64>, anchor: Point2<f64>, factor: f64) -> (i64, i64) {
    let corner: Vector2<f64> = anchor.coords - render_anchor.coords * factor;
    (corner.x.trunc() as i64, corner.y.trunc() as i64)
}

///
/// Resizes a render by the overlay scale and alpha-blends it over the base photo so that its
/// anchor lands on the given anchor. No rotation is applied here; that is part of the render.
///
/// # Parameters:
/// - `base`: The photo of the printer
/// - `frame`: The render to lay over it
/// - `anchor`: Where the render's anchor should land, in photo pixels
/// - `view_scale`: The `scale` view parameter
///
/// # Returns:
/// - The blended image with the placement used
///
pub fn composite(base: &RgbaImage, frame: &RenderFrame, anchor: Point2<f64>, view_scale: f64) -> CompositeImage {
    composite_with_factor(base, frame, anchor, overlay_scale(view_scale))
}

///
/// As `composite`, with the resize factor given directly.
///
pub fn composite_with_factor(base: &RgbaImage, frame: &RenderFrame, anchor: Point2<f64>, factor: f64) -> CompositeImage {
    let mut image = base.clone();
    let offset = paste_offset(frame.anchor, anchor, factor);

    let width = (frame.image.width() as f64 * factor) as u32;
    let height = (frame.image.height() as f64 * factor) as u32;

    if width > 0 && height > 0 {
        if (width, height) == frame.image.dimensions() {
            imageops::overlay(&mut image, &frame.image, offset.0, offset.1);
        } else {
            let scaled = imageops::resize(&frame.image, width, height, FilterType::Lanczos3);
            imageops::overlay(&mut image, &scaled, offset.0, offset.1);
        }
    }

    CompositeImage { image, offset, factor }
}
