use thiserror::Error;

///
/// All errors emitted from the overlay module.
///
/// - `Encoding`: When the composite could not be encoded for transport
///
#[derive(Error, Debug)]
pub enum OverlayError {
    #[error("The composite image could not be encoded: {}", .0)]
    Encoding(#[from] image::ImageError),
}
