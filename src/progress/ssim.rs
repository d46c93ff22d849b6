use image::RgbaImage;
use nalgebra::DMatrix;

/// Side of the square sliding window.
pub const WINDOW: usize = 7;

const K1: f64 = 0.01;
const K2: f64 = 0.03;

///
/// Converts a region of an image to luminance in [0, 1], using the ITU-R 709 weights.
///
/// # Parameters:
/// - `image`: The source image
/// - `rect`: The region as (x, y, width, height), which must lie inside the image
///
/// # Returns:
/// - A `height` x `width` matrix
///
pub fn luminance(image: &RgbaImage, rect: (u32, u32, u32, u32)) -> DMatrix<f64> {
    let (x0, y0, width, height) = rect;

    DMatrix::from_fn(height as usize, width as usize, |row, col| {
        let pixel = image.get_pixel(x0 + col as u32, y0 + row as u32);
        (0.2125 * pixel[0] as f64 + 0.7154 * pixel[1] as f64 + 0.0721 * pixel[2] as f64) / 255.
    })
}

///
/// Summed-area table with a zero first row and column.
///
fn integral(values: &DMatrix<f64>) -> DMatrix<f64> {
    let mut table = DMatrix::zeros(values.nrows() + 1, values.ncols() + 1);
    for row in 0..values.nrows() {
        for col in 0..values.ncols() {
            table[(row + 1, col + 1)] = values[(row, col)] + table[(row, col + 1)] + table[(row + 1, col)] - table[(row, col)];
        }
    }
    table
}

fn window_sum(table: &DMatrix<f64>, row: usize, col: usize) -> f64 {
    table[(row + WINDOW, col + WINDOW)] - table[(row, col + WINDOW)] - table[(row + WINDOW, col)] + table[(row, col)]
}

///
/// Mean structural similarity of two equally sized luminance images, over every 7 x 7 window that
/// fits inside them. Local statistics use uniform weights and sample covariance; the data range
/// is taken from the joint extent of both images.
///
/// # Returns:
/// - The mean SSIM, or `None` if the images differ in size or are smaller than the window
///
pub fn structural_similarity(first: &DMatrix<f64>, second: &DMatrix<f64>) -> Option<f64> {
    if first.shape() != second.shape() || first.nrows() < WINDOW || first.ncols() < WINDOW {
        return None;
    }

    let data_range = first.max().max(second.max()) - first.min().min(second.min());
    if data_range == 0. {
        // both images are the same flat value
        return Some(1.);
    }

    let c1 = (K1 * data_range).powi(2);
    let c2 = (K2 * data_range).powi(2);
    let samples = (WINDOW * WINDOW) as f64;
    let covariance_norm = samples / (samples - 1.);

    let sum_x = integral(first);
    let sum_y = integral(second);
    let sum_xx = integral(&first.component_mul(first));
    let sum_yy = integral(&second.component_mul(second));
    let sum_xy = integral(&first.component_mul(second));

    let rows = first.nrows() - WINDOW + 1;
    let cols = first.ncols() - WINDOW + 1;
    let mut total = 0.;

    for row in 0..rows {
        for col in 0..cols {
            let ux = window_sum(&sum_x, row, col) / samples;
            let uy = window_sum(&sum_y, row, col) / samples;
            let vx = covariance_norm * (window_sum(&sum_xx, row, col) / samples - ux * ux);
            let vy = covariance_norm * (window_sum(&sum_yy, row, col) / samples - uy * uy);
            let vxy = covariance_norm * (window_sum(&sum_xy, row, col) / samples - ux * uy);

            total += ((2. * ux * uy + c1) * (2. * vxy + c2)) / ((ux * ux + uy * uy + c1) * (vx + vy + c2));
        }
    }

    Some(total / (rows * cols) as f64)
}
