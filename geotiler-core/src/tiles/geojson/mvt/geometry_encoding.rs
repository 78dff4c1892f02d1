//! MVT geometry command encoding.
//!
//! See <https://github.com/mapbox/vector-tile-spec/tree/master/2.1#43-geometry-encoding>.

use crate::tiles::geojson::{GeoJsonError, GeoJsonResult};

#[derive(Clone, Copy, Debug)]
enum Command {
    MoveTo = 1,
    LineTo = 2,
    ClosePath = 7,
}

/// Largest repeat count a command integer can hold.
const MAX_COMMAND_COUNT: usize = (1 << 29) - 1;

fn command_integer(command: Command, count: usize) -> GeoJsonResult<u32> {
    if count > MAX_COMMAND_COUNT {
        return Err(GeoJsonError::MvtEncoding(format!(
            "{count} repetitions of {command:?} do not fit into a command integer"
        )));
    }
    #[allow(clippy::cast_possible_truncation)]
    Ok(((count as u32) << 3) | command as u32)
}

fn parameter_integer(value: i32) -> u32 {
    #[allow(clippy::cast_sign_loss)]
    let zigzag = ((value << 1) ^ (value >> 31)) as u32;
    zigzag
}

/// Writes command integers with delta-encoded parameters, optionally rescaling coordinates.
pub(crate) struct GeometryEncoder {
    encoded: Vec<u32>,
    cursor: [i32; 2],
    scale: Option<f64>,
}

impl GeometryEncoder {
    /// `scale` multiplies every coordinate before encoding, `None` keeps them unchanged.
    pub fn new(scale: Option<f64>) -> Self {
        Self {
            encoded: Vec::new(),
            cursor: [0, 0],
            scale,
        }
    }

    fn scaled(&self, point: [i32; 2]) -> [i32; 2] {
        match self.scale {
            None => point,
            #[allow(clippy::cast_possible_truncation)]
            Some(scale) => [
                (f64::from(point[0]) * scale).round() as i32,
                (f64::from(point[1]) * scale).round() as i32,
            ],
        }
    }

    fn push_point(&mut self, point: [i32; 2]) {
        let [x, y] = self.scaled(point);
        self.encoded.push(parameter_integer(x - self.cursor[0]));
        self.encoded.push(parameter_integer(y - self.cursor[1]));
        self.cursor = [x, y];
    }

    pub fn points(mut self, points: &[[i32; 2]]) -> GeoJsonResult<Vec<u32>> {
        self.encoded.reserve(points.len() * 2 + 1);
        self.encoded
            .push(command_integer(Command::MoveTo, points.len())?);
        for point in points {
            self.push_point(*point);
        }
        Ok(self.encoded)
    }

    pub fn lines(mut self, lines: &[Vec<[i32; 2]>]) -> GeoJsonResult<Vec<u32>> {
        for line in lines {
            let Some((first, rest)) = line.split_first() else {
                continue;
            };
            self.encoded.push(command_integer(Command::MoveTo, 1)?);
            self.push_point(*first);
            self.encoded.push(command_integer(Command::LineTo, rest.len())?);
            for point in rest {
                self.push_point(*point);
            }
        }
        Ok(self.encoded)
    }

    /// Rings must be closed; the closing vertex is replaced by a `ClosePath` command.
    pub fn rings(mut self, rings: &[Vec<[i32; 2]>]) -> GeoJsonResult<Vec<u32>> {
        for ring in rings {
            if ring.len() < 4 {
                continue;
            }
            let open = &ring[..ring.len() - 1];
            self.encoded.push(command_integer(Command::MoveTo, 1)?);
            self.push_point(open[0]);
            self.encoded
                .push(command_integer(Command::LineTo, open.len() - 1)?);
            for point in &open[1..] {
                self.push_point(*point);
            }
            self.encoded.push(command_integer(Command::ClosePath, 1)?);
        }
        Ok(self.encoded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_point() {
        assert_eq!(
            GeometryEncoder::new(None).points(&[[25, 17]]).unwrap(),
            vec![9, 50, 34]
        );
    }

    #[test]
    fn encodes_multipoint() {
        assert_eq!(
            GeometryEncoder::new(None)
                .points(&[[5, 7], [3, 2]])
                .unwrap(),
            vec![17, 10, 14, 3, 9]
        );
    }

    #[test]
    fn encodes_linestring() {
        assert_eq!(
            GeometryEncoder::new(None)
                .lines(&[vec![[2, 2], [2, 10], [10, 10]]])
                .unwrap(),
            vec![9, 4, 4, 18, 0, 16, 16, 0]
        );
    }

    #[test]
    fn encodes_multilinestring() {
        let lines = [vec![[2, 2], [2, 10], [10, 10]], vec![[1, 1], [3, 5]]];
        assert_eq!(
            GeometryEncoder::new(None).lines(&lines).unwrap(),
            vec![9, 4, 4, 18, 0, 16, 16, 0, 9, 17, 17, 10, 4, 8]
        );
    }

    #[test]
    fn encodes_polygon() {
        let rings = [vec![[3, 6], [8, 12], [20, 34], [3, 6]]];
        assert_eq!(
            GeometryEncoder::new(None).rings(&rings).unwrap(),
            vec![9, 6, 12, 18, 10, 12, 24, 44, 15]
        );
    }

    #[test]
    fn encodes_polygon_with_hole() {
        let rings = [
            vec![[11, 11], [20, 11], [20, 20], [11, 20], [11, 11]],
            vec![[13, 13], [13, 17], [17, 17], [17, 13], [13, 13]],
        ];
        assert_eq!(
            GeometryEncoder::new(None).rings(&rings).unwrap(),
            vec![
                9, 22, 22, 26, 18, 0, 0, 18, 17, 0, 15, 9, 4, 13, 26, 0, 8, 8, 0, 0, 7, 15
            ]
        );
    }

    #[test]
    fn rescales_coordinates() {
        assert_eq!(
            GeometryEncoder::new(Some(0.5)).points(&[[50, 34]]).unwrap(),
            vec![9, 50, 34]
        );
    }
}
