use image::{GrayImage, Luma, RgbaImage};
use imageproc::drawing::draw_polygon_mut;
use imageproc::geometry::convex_hull;
use imageproc::point::Point;
use tracing::debug;

use crate::hardware::ExtruderEnvelope;
use crate::hardware::position::MachinePosition;
use crate::projection::Projector;
use crate::render::RenderFrame;

///
/// Projects the extruder box at the machine position and takes the convex hull of its corners.
///
/// # Parameters:
/// - `envelope`: The extruder's extent around the toolhead
/// - `position`: The current machine position
/// - `projector`: The projector the render was made with
///
/// # Returns:
/// - The hull in whole render pixels; fewer than three points when the box projects to a line
///
pub fn extruder_hull(envelope: &ExtruderEnvelope, position: &MachinePosition, projector: &Projector) -> Vec<Point<i32>> {
    let mut corners: Vec<Point<i32>> = envelope
        .corners_at(position)
        .iter()
        .map(|corner| projector.project(corner))
        .filter(|p| p.x.is_finite() && p.y.is_finite())
        .map(|p| Point::new(p.x.round() as i32, p.y.round() as i32))
        .collect();

    corners.sort_by_key(|p| (p.x, p.y));
    corners.dedup();

    if corners.len() < 3 {
        return corners;
    }

    convex_hull(corners)
}

///
/// Rasterises a hull into a mask the size of a render. Pixels on the hull's edges count as inside.
///
/// # Returns:
/// - A mask that is 255 inside the hull and 0 elsewhere
///
pub fn hull_mask(width: u32, height: u32, hull: &[Point<i32>]) -> GrayImage {
    let mut mask = GrayImage::new(width, height);

    // the polygon must be open and enclose an area
    if hull.len() >= 3 && hull[0] != hull[hull.len() - 1] {
        draw_polygon_mut(&mut mask, hull, Luma([255]));
    }

    mask
}

///
/// Makes every pixel under the hull fully transparent. Colour channels are left alone, so pixels
/// that were already transparent don't change.
///
/// # Returns:
/// - The number of pixels that were cleared
///
pub fn clear_hull(image: &mut RgbaImage, hull: &[Point<i32>]) -> usize {
    let mask = hull_mask(image.width(), image.height(), hull);

    let mut cleared = 0;
    for (pixel, inside) in image.pixels_mut().zip(mask.pixels()) {
        if inside[0] != 0 && pixel[3] != 0 {
            pixel[3] = 0;
            cleared += 1;
        }
    }

    cleared
}

///
/// Punches the area the physical extruder covers out of a render, so printed material it hides
/// isn't drawn over it. The ROI is kept as rendered.
///
/// # Parameters:
/// - `frame`: The render to mask
/// - `envelope`: The extruder's extent around the toolhead
/// - `position`: The current machine position
/// - `projector`: The projector the render was made with
///
/// # Returns:
/// - The masked frame
///
pub fn mask(frame: &RenderFrame, envelope: &ExtruderEnvelope, position: &MachinePosition, projector: &Projector) -> RenderFrame {
    let hull = extruder_hull(envelope, position, projector);
    let mut masked = frame.clone();
    let cleared = clear_hull(&mut masked.image, &hull);

    debug!("masked {} pixels under the extruder", cleared);

    masked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::BedVolume;
    use crate::projection::{ProjectionContext, ViewParameters, Viewport};
    use crate::render::{self, Bounds, GeometrySource, Segment};
    use image::Rgba;
    use nalgebra::Point3;

    struct Plate;

    impl GeometrySource for Plate {
        fn layer_count(&self) -> usize {
            1
        }

        fn bounds(&self) -> Bounds {
            Bounds { min: Point3::new(0., 0., 0.), max: Point3::new(200., 200., 0.) }
        }

        fn layer_segments(&self, _: usize, _: usize) -> Vec<Segment> {
            (0..=20)
                .map(|i| {
                    let y = 50. + i as f64 * 5.;
                    Segment { start: Point3::new(50., y, 0.), end: Point3::new(150., y, 0.) }
                })
                .collect()
        }
    }

    fn setup() -> (BedVolume, Viewport, ViewParameters) {
        (BedVolume::new(200., 200., 200.), Viewport::default(), ViewParameters::new(35., -60., 0., 0.6, 1.))
    }

    fn square(side: i32, offset: i32) -> Vec<Point<i32>> {
        vec![
            Point::new(offset, offset),
            Point::new(offset + side, offset),
            Point::new(offset + side, offset + side),
            Point::new(offset, offset + side),
        ]
    }

    #[test]
    fn hull_drops_interior_points() {
        let mut points = square(4, 0);
        points.push(Point::new(2, 2));
        points.push(Point::new(1, 3));
        points.push(Point::new(3, 1));

        let hull = convex_hull(points);
        assert_eq!(hull.len(), 4);
        for corner in square(4, 0) {
            assert!(hull.contains(&corner));
        }
    }

    #[test]
    fn mask_covers_the_hull_and_its_edges() {
        let mask = hull_mask(20, 20, &square(10, 5));

        assert_eq!(mask.get_pixel(10, 10)[0], 255);
        assert_eq!(mask.get_pixel(5, 10)[0], 255);
        assert_eq!(mask.get_pixel(15, 15)[0], 255);
        assert_eq!(mask.get_pixel(4, 10)[0], 0);
        assert_eq!(mask.get_pixel(16, 10)[0], 0);
    }

    #[test]
    fn degenerate_hull_masks_nothing() {
        let line = vec![Point::new(0, 0), Point::new(10, 10)];
        let mut image = RgbaImage::from_pixel(20, 20, Rgba([9, 9, 9, 255]));

        assert_eq!(clear_hull(&mut image, &line), 0);
        assert_eq!(clear_hull(&mut image, &[]), 0);
    }

    #[test]
    fn clears_only_inside_the_hull() {
        let mut image = RgbaImage::from_pixel(20, 20, Rgba([9, 9, 9, 255]));

        assert_eq!(clear_hull(&mut image, &square(10, 5)), 121);
        assert_eq!(image.get_pixel(10, 10)[3], 0);
        assert_eq!(image.get_pixel(10, 10)[0], 9);
        assert_eq!(image.get_pixel(4, 10)[3], 255);
        assert_eq!(image.get_pixel(16, 10)[3], 255);

        // already transparent pixels are not counted again
        assert_eq!(clear_hull(&mut image, &square(10, 5)), 0);
    }

    #[test]
    fn hull_has_eight_or_fewer_vertices_and_covers_the_nozzle() {
        let (bed, viewport, view) = setup();
        let projector = ProjectionContext::new(&bed, viewport).projector(&view);
        let position = MachinePosition { x: 100., y: 100., z: 5., e: 0. };

        let hull = extruder_hull(&ExtruderEnvelope::default(), &position, &projector);
        let nozzle = projector.project(&Point3::new(100., 100., 5.));
        let mask = hull_mask(viewport.width, viewport.height, &hull);

        assert!(hull.len() >= 4 && hull.len() <= 8);
        assert_eq!(mask.get_pixel(nozzle.x.round() as u32, nozzle.y.round() as u32)[0], 255);
    }

    #[test]
    fn masking_over_the_print_clears_pixels() {
        let (bed, viewport, view) = setup();
        let frame = render::render_toolpath(&Plate, -1, &view, &bed, viewport, Rgba([255, 255, 255, 255]));
        let projector = ProjectionContext::new(&bed, viewport).projector(&view);
        let position = MachinePosition { x: 100., y: 100., z: 0., e: 0. };

        let masked = mask(&frame, &ExtruderEnvelope::default(), &position, &projector);
        let opaque = |image: &RgbaImage| image.pixels().filter(|p| p[3] > 0).count();

        assert!(opaque(&masked.image) < opaque(&frame.image));
        assert_eq!(masked.roi, frame.roi);
        assert_eq!(masked.anchor, frame.anchor);
    }

    #[test]
    fn masking_away_from_the_print_is_a_no_op() {
        let (bed, viewport, view) = setup();
        let frame = render::render_toolpath(&Plate, -1, &view, &bed, viewport, Rgba([255, 255, 255, 255]));
        let projector = ProjectionContext::new(&bed, viewport).projector(&view);
        let envelope = ExtruderEnvelope::new((-5., 5.), (-5., 5.), (0., 10.));
        let position = MachinePosition { x: 10., y: 190., z: 150., e: 0. };

        let once = mask(&frame, &envelope, &position, &projector);
        let twice = mask(&once, &envelope, &position, &projector);

        assert_eq!(once.image, frame.image);
        assert_eq!(twice.image, once.image);
    }
}
