use std::path::Path;

use nalgebra::Point3;
use tracing::debug;

use super::error::RenderError;
use super::{Bounds, GeometrySource, Segment};

/// Two Z heights closer than this belong to the same layer, in millimetres.
const LAYER_EPSILON: f64 = 1e-4;

///
/// A layer of extruding moves at a single Z height.
///
#[derive(Debug, Clone)]
struct Layer {
    z: f64,
    segments: Vec<Segment>,
}

///
/// A toolpath read from G-code. Only extruding linear moves are kept, grouped into layers by the
/// Z height they print at.
///
#[derive(Debug, Clone)]
pub struct GcodeToolpath {
    layers: Vec<Layer>,
    bounds: Bounds,
}

///
/// Modal state needed to follow the toolhead through a file.
///
struct MotionState {
    position: Point3<f64>,
    extruder: f64,
    absolute_position: bool,
    absolute_extruder: bool,
}

impl GcodeToolpath {
    ///
    /// Reads a toolpath from a G-code file on disk.
    ///
    /// # Parameters:
    /// - `path`: The path of the G-code file
    ///
    /// # Returns:
    /// - The parsed toolpath
    /// - `UnknownGeometrySource` if the file can't be read, `EmptyToolpath` if nothing extrudes
    ///
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<GcodeToolpath, RenderError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|err| RenderError::UnknownGeometrySource {
            path: path.display().to_string(),
            reason: err.to_string(),
        })?;

        GcodeToolpath::parse(&content)
    }

    ///
    /// Parses a toolpath from G-code text.
    ///
    /// # Parameters:
    /// - `content`: The G-code program
    ///
    /// # Returns:
    /// - The parsed toolpath
    /// - `EmptyToolpath` if the program holds no extruding moves
    ///
    pub fn parse(content: &str) -> Result<GcodeToolpath, RenderError> {
        let mut state = MotionState {
            position: Point3::origin(),
            extruder: 0.,
            absolute_position: true,
            absolute_extruder: true,
        };
        let mut layers: Vec<Layer> = vec![];

        for raw_line in content.lines() {
            // comments and `*` checksums end the code part of a line
            let line = raw_line.split([';', '*']).next().unwrap_or_default();

            let mut words = line.split_whitespace().skip_while(|word| is_line_number(word));
            let Some(command) = words.next() else {
                continue;
            };

            let mut axes: [Option<f64>; 4] = [None; 4];
            for word in words {
                let (letter, value) = word.split_at(word.chars().next().map_or(0, char::len_utf8));
                let slot = match letter.to_ascii_uppercase().as_str() {
                    "X" => 0,
                    "Y" => 1,
                    "Z" => 2,
                    "E" => 3,
                    _ => continue,
                };
                if let Ok(parsed) = value.parse::<f64>() {
                    axes[slot] = Some(parsed);
                }
            }

            match command.to_ascii_uppercase().as_str() {
                "G0" | "G00" | "G1" | "G01" => state.apply_move(axes, &mut layers),
                "G90" => state.absolute_position = true,
                "G91" => state.absolute_position = false,
                "M82" => state.absolute_extruder = true,
                "M83" => state.absolute_extruder = false,
                "G92" => state.apply_reset(axes),
                _ => {}
            }
        }

        let bounds = Bounds::enclosing(layers.iter().flat_map(|layer| layer.segments.iter()).flat_map(|seg| [seg.start, seg.end]))
            .ok_or(RenderError::EmptyToolpath)?;

        debug!("parsed toolpath with {} layers", layers.len());

        Ok(GcodeToolpath { layers, bounds })
    }

    ///
    /// # Returns:
    /// - The Z height of each layer, bottom up
    ///
    pub fn layer_heights(&self) -> Vec<f64> {
        self.layers.iter().map(|layer| layer.z).collect()
    }
}

impl MotionState {
    fn apply_move(&mut self, axes: [Option<f64>; 4], layers: &mut Vec<Layer>) {
        let mut target = self.position;
        for axis in 0..3 {
            if let Some(value) = axes[axis] {
                target[axis] = if self.absolute_position { value } else { target[axis] + value };
            }
        }

        let extruded = match axes[3] {
            Some(value) if self.absolute_extruder => {
                let delta = value - self.extruder;
                self.extruder = value;
                delta
            }
            Some(value) => value,
            None => 0.,
        };

        if extruded > 0. && target != self.position {
            let segment = Segment { start: self.position, end: target };
            match layers.last_mut() {
                Some(layer) if (layer.z - target.z).abs() < LAYER_EPSILON => layer.segments.push(segment),
                _ => layers.push(Layer { z: target.z, segments: vec![segment] }),
            }
        }

        self.position = target;
    }

    fn apply_reset(&mut self, axes: [Option<f64>; 4]) {
        for axis in 0..3 {
            if let Some(value) = axes[axis] {
                self.position[axis] = value;
            }
        }
        if let Some(value) = axes[3] {
            self.extruder = value;
        }
    }
}

impl GeometrySource for GcodeToolpath {
    fn layer_count(&self) -> usize {
        self.layers.len()
    }

    fn bounds(&self) -> Bounds {
        self.bounds
    }

    fn layer_segments(&self, min_layer: usize, max_layer: usize) -> Vec<Segment> {
        if self.layers.is_empty() || min_layer > max_layer {
            return vec![];
        }

        let upper = max_layer.min(self.layers.len() - 1);
        self.layers
            .get(min_layer..=upper)
            .unwrap_or(&[])
            .iter()
            .flat_map(|layer| layer.segments.iter().copied())
            .collect()
    }
}

fn is_line_number(word: &str) -> bool {
    word.strip_prefix(['N', 'n']).is_some_and(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const PROGRAM: &str = "\
G90
M82
G92 E0
G1 Z0.2 F3000 ; move to first layer
G1 X10 Y10
G1 X20 Y10 E1.0
G1 X20 Y20 E2.0
G1 Z0.4
G1 X10 Y20 E3.0 ; second layer
G0 X0 Y0
G92 E0
G1 X5 Y0 E0.5
";

    #[test]
    fn groups_extrusion_by_height() {
        let toolpath = GcodeToolpath::parse(PROGRAM).unwrap();

        assert_eq!(toolpath.layer_count(), 2);
        assert_eq!(toolpath.layer_heights(), vec![0.2, 0.4]);
        assert_eq!(toolpath.layer_segments(0, 0).len(), 2);
        assert_eq!(toolpath.layer_segments(1, 1).len(), 2);
    }

    #[test]
    fn travel_moves_are_not_segments() {
        let toolpath = GcodeToolpath::parse(PROGRAM).unwrap();
        let all = toolpath.layer_segments(0, 10);

        assert_eq!(all.len(), 4);
        assert!(all.iter().all(|seg| seg.start.z == seg.end.z));
    }

    #[test]
    fn bounds_cover_extrusion_only() {
        let toolpath = GcodeToolpath::parse(PROGRAM).unwrap();
        let bounds = toolpath.bounds();

        assert_eq!(bounds.min, Point3::new(0., 0., 0.2));
        assert_eq!(bounds.max, Point3::new(20., 20., 0.4));
    }

    #[test]
    fn relative_extrusion_is_followed() {
        let toolpath = GcodeToolpath::parse("M83\nG1 Z1\nG1 X10 E0.5\nG1 X20 E0.5\nG1 X30 E-1\n").unwrap();
        assert_eq!(toolpath.layer_segments(0, 0).len(), 2);
    }

    #[test]
    fn numbered_lines_with_checksums_are_read() {
        let toolpath = GcodeToolpath::parse("N10 G1 Z0.2*41\nN11 G1 X0 Y0*33\nN12 G1 X10 Y0 E1 *57\nn13 g1 X10 Y10 E2*7\n").unwrap();
        let segments = toolpath.layer_segments(0, 0);

        assert_eq!(toolpath.layer_heights(), vec![0.2]);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].start, Point3::new(0., 0., 0.2));
        assert_eq!(segments[0].end, Point3::new(10., 0., 0.2));
        assert_eq!(segments[1].end, Point3::new(10., 10., 0.2));
    }

    #[test]
    fn program_without_extrusion_is_rejected() {
        assert!(matches!(GcodeToolpath::parse("G1 X10 Y10\nG1 X20\n"), Err(RenderError::EmptyToolpath)));
    }

    #[test]
    fn missing_file_is_unknown_source() {
        let result = GcodeToolpath::from_file("/definitely/not/here.gcode");
        assert!(matches!(result, Err(RenderError::UnknownGeometrySource { .. })));
    }

    #[test]
    fn reads_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(PROGRAM.as_bytes()).unwrap();

        let toolpath = GcodeToolpath::from_file(file.path()).unwrap();
        assert_eq!(toolpath.layer_count(), 2);
    }
}
