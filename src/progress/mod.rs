//!
//! Scoring how closely the live print follows the expected render
//!
//! At each 5 % of progress the composite and the live photo are cropped to the render's region
//! of interest and compared with SSIM. The score at 0 % is kept as the baseline that later scores
//! are measured against.
//!

use image::{Rgb, RgbImage, RgbaImage};
use imageproc::drawing::draw_line_segment_mut;
use tracing::{debug, info};

use crate::overlay::CompositeImage;
use crate::render::{RenderFrame, Roi};
use error::ProgressError;

pub mod error;
pub mod ssim;

/// Spacing of the checkpoints, in percent of print progress.
pub const CHECKPOINT_INTERVAL: u32 = 5;

///
/// Maps a render-local ROI into photo pixels, with the same placement the composite used.
///
/// # Parameters:
/// - `roi`: The region in render pixels
/// - `composite`: The composite built from the render
///
/// # Returns:
/// - The region in photo pixels
///
pub fn translate_roi(roi: &Roi, composite: &CompositeImage) -> Roi {
    let top_left = composite.to_photo(nalgebra::Point2::new(roi.left, roi.top));
    let bottom_right = composite.to_photo(nalgebra::Point2::new(roi.right, roi.bottom));

    Roi { left: top_left.x, top: top_left.y, right: bottom_right.x, bottom: bottom_right.y }
}

///
/// Rescales a raw similarity so the baseline reads as zero and a perfect match as one.
///
/// # Parameters:
/// - `raw`: The raw SSIM
/// - `baseline`: The raw SSIM taken at 0 %, if any
///
/// # Returns:
/// - `(raw - baseline) / (1 - baseline)`, or `raw` when there is no baseline
///
pub fn remap(raw: f64, baseline: Option<f64>) -> f64 {
    match baseline {
        None => raw,
        Some(base) if raw == base => 0.,
        Some(base) if (1. - base).abs() < f64::EPSILON => raw - base,
        Some(base) => (raw - base) / (1. - base),
    }
}

///
/// Computes the raw similarity between the composite and the live photo over the render's ROI.
///
/// # Parameters:
/// - `frame`: The render the composite was built from
/// - `composite`: The composite
/// - `photo`: The live photo, the same size as the composite
///
/// # Returns:
/// - The mean SSIM of the two luminance crops
/// - `EmptyRegion` if there is no ROI inside the photo, `RegionTooSmall` if it can't hold a window
///
pub fn similarity(frame: &RenderFrame, composite: &CompositeImage, photo: &RgbaImage) -> Result<f64, ProgressError> {
    let roi = frame.roi.ok_or(ProgressError::EmptyRegion)?;
    let translated = translate_roi(&roi, composite);

    let width = photo.width().min(composite.image().width());
    let height = photo.height().min(composite.image().height());
    let rect = translated.to_pixel_rect(width, height).ok_or(ProgressError::EmptyRegion)?;

    let expected = ssim::luminance(composite.image(), rect);
    let actual = ssim::luminance(photo, rect);

    ssim::structural_similarity(&expected, &actual).ok_or(ProgressError::RegionTooSmall { width: rect.2, height: rect.3 })
}

///
/// Scores a composite against the live photo, relative to a baseline if one is given.
///
pub fn score(frame: &RenderFrame, composite: &CompositeImage, photo: &RgbaImage, baseline: Option<f64>) -> Result<f64, ProgressError> {
    Ok(remap(similarity(frame, composite, photo)?, baseline))
}

///
/// Tracks the scores of one print. Checkpoints only move forward; the series is append only and
/// is cleared when a new print starts.
///
#[derive(Debug, Clone, Default)]
pub struct ProgressTracker {
    baseline: Option<f64>,
    checkpoints: Vec<u32>,
    series: Vec<f64>,
}

impl ProgressTracker {
    pub fn new() -> ProgressTracker {
        ProgressTracker::default()
    }

    ///
    /// Starts over for a new print.
    ///
    pub fn reset(&mut self) {
        self.baseline = None;
        self.checkpoints.clear();
        self.series.clear();
    }

    ///
    /// Works out whether a progress report crosses a checkpoint that hasn't been scored yet.
    ///
    /// # Parameters:
    /// - `progress`: Print progress in percent
    ///
    /// # Returns:
    /// - The checkpoint, a multiple of 5 in [0, 100], or `None`
    ///
    pub fn due_checkpoint(&self, progress: f64) -> Option<u32> {
        if !progress.is_finite() || progress < 0. {
            return None;
        }

        let checkpoint = ((progress.min(100.) as u32) / CHECKPOINT_INTERVAL) * CHECKPOINT_INTERVAL;
        match self.checkpoints.last() {
            Some(last) if *last >= checkpoint => None,
            _ => Some(checkpoint),
        }
    }

    ///
    /// Records the raw score of a checkpoint. The 0 % checkpoint, or the first one recorded if the
    /// print was joined late, sets the baseline.
    ///
    /// # Returns:
    /// - The remapped score that was appended to the series
    ///
    pub fn record(&mut self, checkpoint: u32, raw: f64) -> f64 {
        if checkpoint == 0 || self.baseline.is_none() {
            info!(checkpoint, raw, "similarity baseline set");
            self.baseline = Some(raw);
        }

        let value = remap(raw, self.baseline);
        debug!(checkpoint, raw, value, "similarity checkpoint");

        self.checkpoints.push(checkpoint);
        self.series.push(value);
        value
    }

    pub fn baseline(&self) -> Option<f64> {
        self.baseline
    }

    pub fn checkpoints(&self) -> &[u32] {
        &self.checkpoints
    }

    pub fn series(&self) -> &[f64] {
        &self.series
    }
}

///
/// Draws a score series as a line chart: white background, black axes and a blue polyline. The
/// vertical range is [min(0, lowest score), max(1, highest score)].
///
/// # Parameters:
/// - `series`: The scores, in checkpoint order
/// - `width`, `height`: The chart size in pixels
///
/// # Returns:
/// - The chart
///
pub fn render_chart(series: &[f64], width: u32, height: u32) -> RgbImage {
    const MARGIN: f32 = 20.;
    const AXES: Rgb<u8> = Rgb([0, 0, 0]);
    const LINE: Rgb<u8> = Rgb([31, 119, 180]);

    let mut chart = RgbImage::from_pixel(width, height, Rgb([255, 255, 255]));
    let (left, top) = (MARGIN, MARGIN);
    let right = (width as f32 - MARGIN).max(left + 1.);
    let bottom = (height as f32 - MARGIN).max(top + 1.);

    draw_line_segment_mut(&mut chart, (left, top), (left, bottom), AXES);
    draw_line_segment_mut(&mut chart, (left, bottom), (right, bottom), AXES);

    let finite: Vec<f64> = series.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        return chart;
    }

    let low = finite.iter().copied().fold(0., f64::min);
    let high = finite.iter().copied().fold(1., f64::max);
    let steps = (finite.len().max(2) - 1) as f32;

    let points: Vec<(f32, f32)> = finite
        .iter()
        .enumerate()
        .map(|(i, v)| {
            let x = left + (right - left) * i as f32 / steps;
            let y = bottom - (bottom - top) * ((v - low) / (high - low)) as f32;
            (x, y)
        })
        .collect();

    if let [only] = points.as_slice() {
        draw_line_segment_mut(&mut chart, *only, *only, LINE);
    }
    for pair in points.windows(2) {
        draw_line_segment_mut(&mut chart, pair[0], pair[1], LINE);
    }

    chart
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay;
    use image::Rgba;
    use nalgebra::Point2;

    fn textured(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_fn(width, height, |x, y| {
            let v = ((x * 13 + y * 7) % 255) as u8;
            Rgba([v, v / 2, 255 - v, 255])
        })
    }

    fn boxed_frame() -> RenderFrame {
        let mut image = RgbaImage::from_pixel(80, 60, Rgba([0, 0, 0, 0]));
        for x in 20..50 {
            for y in 10..40 {
                if (x + y) % 3 == 0 {
                    image.put_pixel(x, y, Rgba([255, 255, 255, 255]));
                }
            }
        }
        let roi = crate::render::opaque_bounds(&image);
        RenderFrame { image, anchor: Point2::new(40., 30.), roi }
    }

    #[test]
    fn roi_follows_the_composite_placement() {
        let base = textured(200, 150);
        let frame = boxed_frame();
        let composite = overlay::composite_with_factor(&base, &frame, Point2::new(100., 80.), 0.5);
        let roi = Roi { left: 10., top: 20., right: 30., bottom: 40. };

        // offset = (100 - 20, 80 - 15)
        let translated = translate_roi(&roi, &composite);
        assert_eq!(translated, Roi { left: 85., top: 75., right: 95., bottom: 85. });
    }

    #[test]
    fn remap_baseline_is_zero() {
        for raw in [-0.4, 0., 0.37, 0.99] {
            assert_eq!(remap(raw, Some(raw)), 0.);
        }
        assert!((remap(1., Some(0.6)) - 1.).abs() < 1e-12);
        assert!((remap(0.8, Some(0.6)) - 0.5).abs() < 1e-12);
        assert_eq!(remap(0.3, None), 0.3);
    }

    #[test]
    fn photo_matching_the_composite_is_perfect() {
        let base = textured(120, 90);
        let frame = boxed_frame();
        let composite = overlay::composite_with_factor(&base, &frame, Point2::new(60., 45.), 1.);

        let raw = similarity(&frame, &composite, composite.image()).unwrap();
        assert!((raw - 1.).abs() < 1e-9);
        assert!(similarity(&frame, &composite, &base).unwrap() < raw);
    }

    #[test]
    fn empty_render_has_no_region() {
        let base = textured(50, 50);
        let frame = RenderFrame { image: RgbaImage::new(20, 20), anchor: Point2::new(10., 10.), roi: None };
        let composite = overlay::composite_with_factor(&base, &frame, Point2::new(25., 25.), 1.);

        assert!(matches!(similarity(&frame, &composite, &base), Err(ProgressError::EmptyRegion)));
    }

    #[test]
    fn region_outside_the_photo_is_empty() {
        let base = textured(50, 50);
        let frame = boxed_frame();
        let composite = overlay::composite_with_factor(&base, &frame, Point2::new(-500., -500.), 1.);

        assert!(matches!(similarity(&frame, &composite, &base), Err(ProgressError::EmptyRegion)));
    }

    #[test]
    fn tiny_region_is_rejected() {
        let base = textured(50, 50);
        let mut image = RgbaImage::new(20, 20);
        image.put_pixel(5, 5, Rgba([255, 0, 0, 255]));
        let roi = crate::render::opaque_bounds(&image);
        let frame = RenderFrame { image, anchor: Point2::new(0., 0.), roi };
        let composite = overlay::composite_with_factor(&base, &frame, Point2::new(10., 10.), 1.);

        assert!(matches!(similarity(&frame, &composite, &base), Err(ProgressError::RegionTooSmall { .. })));
    }

    #[test]
    fn checkpoints_every_five_percent() {
        let mut tracker = ProgressTracker::new();

        assert_eq!(tracker.due_checkpoint(0.), Some(0));
        tracker.record(0, 0.4);
        assert_eq!(tracker.due_checkpoint(3.9), None);
        assert_eq!(tracker.due_checkpoint(5.), Some(5));
        assert_eq!(tracker.due_checkpoint(17.2), Some(15));
        tracker.record(15, 0.7);
        assert_eq!(tracker.due_checkpoint(16.), None);
        assert_eq!(tracker.due_checkpoint(140.), Some(100));
        assert_eq!(tracker.due_checkpoint(-1.), None);
    }

    #[test]
    fn baseline_checkpoint_reads_zero_drift() {
        let mut tracker = ProgressTracker::new();

        assert_eq!(tracker.record(0, 0.42), 0.);
        let later = tracker.record(5, 0.71);

        assert_eq!(tracker.baseline(), Some(0.42));
        assert!((later - 0.29 / 0.58).abs() < 1e-12);
        assert_eq!(tracker.series().len(), 2);
        assert_eq!(tracker.checkpoints(), &[0, 5]);
    }

    #[test]
    fn reset_starts_a_new_print() {
        let mut tracker = ProgressTracker::new();
        tracker.record(0, 0.5);
        tracker.record(5, 0.6);
        tracker.reset();

        assert!(tracker.series().is_empty());
        assert_eq!(tracker.baseline(), None);
        assert_eq!(tracker.due_checkpoint(0.), Some(0));
    }

    #[test]
    fn late_join_uses_first_checkpoint_as_baseline() {
        let mut tracker = ProgressTracker::new();
        assert_eq!(tracker.record(35, 0.3), 0.);
        assert_eq!(tracker.baseline(), Some(0.3));
    }

    #[test]
    fn chart_draws_axes_and_series() {
        let chart = render_chart(&[0., 0.5, 1.], 200, 100);
        let blue = |p: &Rgb<u8>| p[2] as i32 > p[0] as i32 + 50;

        assert_eq!(chart.dimensions(), (200, 100));
        assert_eq!(*chart.get_pixel(0, 0), Rgb([255, 255, 255]));
        assert_eq!(*chart.get_pixel(20, 50), Rgb([0, 0, 0]));
        assert!(chart.pixels().any(blue));

        let empty = render_chart(&[], 200, 100);
        assert!(!empty.pixels().any(blue));
    }
}
