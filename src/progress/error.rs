use thiserror::Error;

///
/// All errors emitted from the progress module.
///
/// - `EmptyRegion`: When the render has nothing drawn, or its region falls outside the photo
/// - `RegionTooSmall`: When the region is smaller than the similarity window
///     Parameters:
///     - `width`: The width of the cropped region
///     - `height`: The height of the cropped region
///
#[derive(Error, Debug)]
pub enum ProgressError {
    #[error("There is no region to compare: the render is empty or lies outside the photo")]
    EmptyRegion,

    #[error("The compared region is {}x{} pixels, too small to score", .width, .height)]
    RegionTooSmall { width: u32, height: u32 },
}
