use thiserror::Error;

///
/// All errors emitted from the render module.
/// The error messages can be displayed to users on the frontend.
///
/// - `UnknownGeometrySource`: When the toolpath file is missing or can not be read
///     Parameters:
///     - `path`: The path which was requested
///     - `reason`: Why it could not be read
/// - `EmptyToolpath`: When a toolpath holds no extruding moves, so there is nothing to render
/// - `InvalidColor`: When a render colour isn't a `#rrggbb` hex string
///
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("The toolpath at {} could not be read: {}", .path, .reason)]
    UnknownGeometrySource { path: String, reason: String },

    #[error("The toolpath contains no extruding moves")]
    EmptyToolpath,

    #[error("`{}` is not a valid colour, expected #rrggbb", .0)]
    InvalidColor(String),
}
