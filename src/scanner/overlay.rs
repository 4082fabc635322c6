use anyhow::{bail, Context, Result};
use image::{Rgba, RgbaImage};

use super::decoder::Point;

/// Outline drawn around a detected symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Overlay {
    pub color: Rgba<u8>,
    pub line_width: u32,
}

impl Overlay {
    pub fn new(color: &str, line_width: u32) -> Result<Self> {
        Ok(Self {
            color: parse_hex_color(color)?,
            line_width: line_width.max(1),
        })
    }

    /// Connects the corners in order and closes the loop back to the first one.
    pub fn draw_quad(&self, surface: &mut RgbaImage, corners: &[Point; 4]) {
        for i in 0..corners.len() {
            let begin = corners[i];
            let end = corners[(i + 1) % corners.len()];
            self.draw_line(surface, begin, end);
        }
    }

    pub fn draw_line(&self, surface: &mut RgbaImage, begin: Point, end: Point) {
        let (mut x0, mut y0) = (begin.x.round() as i64, begin.y.round() as i64);
        let (x1, y1) = (end.x.round() as i64, end.y.round() as i64);
        let dx = (x1 - x0).abs();
        let dy = -(y1 - y0).abs();
        let sx = if x0 < x1 { 1 } else { -1 };
        let sy = if y0 < y1 { 1 } else { -1 };
        let mut err = dx + dy;

        loop {
            self.stamp(surface, x0, y0);
            if x0 == x1 && y0 == y1 {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x0 += sx;
            }
            if e2 <= dx {
                err += dx;
                y0 += sy;
            }
        }
    }

    // Square brush centred on the path; pixels off the surface are clipped.
    fn stamp(&self, surface: &mut RgbaImage, cx: i64, cy: i64) {
        let width = i64::from(self.line_width);
        let start = -(width / 2);
        let (w, h) = (i64::from(surface.width()), i64::from(surface.height()));
        for oy in start..start + width {
            for ox in start..start + width {
                let (x, y) = (cx + ox, cy + oy);
                if (0..w).contains(&x) && (0..h).contains(&y) {
                    surface.put_pixel(x as u32, y as u32, self.color);
                }
            }
        }
    }
}

/// Parses `#RRGGBB` (the leading `#` is optional) into an opaque color.
pub fn parse_hex_color(value: &str) -> Result<Rgba<u8>> {
    let hex = value.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.is_ascii() {
        bail!("expected a #RRGGBB color, got {value:?}");
    }
    let channel = |range: std::ops::Range<usize>| {
        u8::from_str_radix(&hex[range], 16).with_context(|| format!("invalid color {value:?}"))
    };
    Ok(Rgba([channel(0..2)?, channel(2..4)?, channel(4..6)?, 255]))
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: Rgba<u8> = Rgba([0xFF, 0x3B, 0x58, 255]);

    #[test]
    fn parses_outline_color() {
        assert_eq!(parse_hex_color("#FF3B58").unwrap(), RED);
        assert_eq!(parse_hex_color("ff3b58").unwrap(), RED);
        assert!(parse_hex_color("#FF3B5").is_err());
        assert!(parse_hex_color("#GG3B58").is_err());
    }

    #[test]
    fn quad_outline_touches_every_corner_and_leaves_centre() {
        let overlay = Overlay::new("#FF3B58", 1).unwrap();
        let mut surface = RgbaImage::new(20, 20);
        let corners = [
            Point { x: 2.0, y: 2.0 },
            Point { x: 17.0, y: 2.0 },
            Point { x: 17.0, y: 17.0 },
            Point { x: 2.0, y: 17.0 },
        ];
        overlay.draw_quad(&mut surface, &corners);

        for corner in corners {
            assert_eq!(surface.get_pixel(corner.x as u32, corner.y as u32), &RED);
        }
        assert_eq!(surface.get_pixel(10, 2), &RED);
        assert_eq!(surface.get_pixel(2, 10), &RED);
        assert_eq!(surface.get_pixel(10, 10), &Rgba([0, 0, 0, 0]));
    }

    #[test]
    fn thick_lines_clip_at_the_edges() {
        let overlay = Overlay::new("#FF3B58", 4).unwrap();
        let mut surface = RgbaImage::new(10, 10);
        overlay.draw_line(&mut surface, Point { x: 0.0, y: 0.0 }, Point { x: 9.0, y: 0.0 });

        assert_eq!(surface.get_pixel(5, 0), &RED);
        assert_eq!(surface.get_pixel(5, 1), &RED);
        assert_eq!(surface.get_pixel(5, 3), &Rgba([0, 0, 0, 0]));
    }
}
