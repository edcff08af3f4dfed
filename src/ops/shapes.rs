//! Pixel rasterization used by the drawing tools.
//!
//! Everything here works in palette-index space on [`Surface`]s or returns
//! plain point lists; nothing allocates per-pixel history.

use std::collections::BTreeMap;

use crate::canvas::{Point, RasterBuffer, Rect, Surface};
use crate::error::DocResult;

/// Outline or solid interior for rectangle and ellipse tools.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShapeFillMode {
    Outline,
    Filled,
}

impl ShapeFillMode {
    pub fn from_filled(filled: bool) -> Self {
        if filled {
            ShapeFillMode::Filled
        } else {
            ShapeFillMode::Outline
        }
    }
}

/// Square brush footprint of `size`×`size` centred on `center`.
/// Even sizes extend one pixel further right/down than left/up.
pub fn square_tip(center: Point, size: u32) -> Rect {
    let size = size.max(1);
    let half = (size as i32 - 1) / 2;
    Rect::new(center.x - half, center.y - half, size, size)
}

/// Bresenham line between `a` and `b`, both endpoints included.
///
/// The major axis picks the stepping direction (`dx >= dy` steps in x).
/// Endpoints are put into a canonical order first, so `a→b` and `b→a`
/// produce the same pixels.
pub fn line_points(a: Point, b: Point) -> Vec<Point> {
    let dx = (b.x - a.x).abs();
    let dy = (b.y - a.y).abs();
    let mut points = Vec::with_capacity(dx.max(dy) as usize + 1);

    if dx >= dy {
        let (s, e) = if (a.x, a.y) <= (b.x, b.y) { (a, b) } else { (b, a) };
        let step = if e.y >= s.y { 1 } else { -1 };
        let mut err = 2 * dy - dx;
        let mut y = s.y;
        for x in s.x..=e.x {
            points.push(Point::new(x, y));
            if err > 0 {
                y += step;
                err -= 2 * dx;
            }
            err += 2 * dy;
        }
    } else {
        let (s, e) = if (a.y, a.x) <= (b.y, b.x) { (a, b) } else { (b, a) };
        let step = if e.x >= s.x { 1 } else { -1 };
        let mut err = 2 * dx - dy;
        let mut x = s.x;
        for y in s.y..=e.y {
            points.push(Point::new(x, y));
            if err > 0 {
                x += step;
                err -= 2 * dy;
            }
            err += 2 * dx;
        }
    }
    points
}

/// Rectangle spanning the two corners (in any order), inclusive.
pub fn rect_points(a: Point, b: Point, mode: ShapeFillMode) -> Vec<Point> {
    let (x0, x1) = (a.x.min(b.x), a.x.max(b.x));
    let (y0, y1) = (a.y.min(b.y), a.y.max(b.y));
    let mut points = Vec::new();
    for y in y0..=y1 {
        for x in x0..=x1 {
            let on_edge = x == x0 || x == x1 || y == y0 || y == y1;
            if mode == ShapeFillMode::Filled || on_edge {
                points.push(Point::new(x, y));
            }
        }
    }
    points
}

/// Midpoint ellipse inscribed in the box spanned by the two corners.
///
/// Walks one quadrant with an integer decision variable and reflects each
/// step into the other three quadrants. Degenerate boxes (zero width or
/// height) collapse to a line.
pub fn ellipse_points(a: Point, b: Point, mode: ShapeFillMode) -> Vec<Point> {
    if a.x == b.x || a.y == b.y {
        return line_points(a, b);
    }

    let mut outline: Vec<Point> = Vec::new();
    let mut plot4 = |xa: i64, xb: i64, ya: i64, yb: i64| {
        outline.push(Point::new(xb as i32, ya as i32));
        outline.push(Point::new(xa as i32, ya as i32));
        outline.push(Point::new(xa as i32, yb as i32));
        outline.push(Point::new(xb as i32, yb as i32));
    };

    let (mut x0, mut x1) = (a.x.min(b.x) as i64, a.x.max(b.x) as i64);
    let mut y0 = a.y.min(b.y) as i64;
    let w = x1 - x0;
    let h = (a.y - b.y).abs() as i64;
    let h_odd = h & 1;

    let mut dx = 4 * (1 - w) * h * h;
    let mut dy = 4 * (h_odd + 1) * w * w;
    let mut err = dx + dy + h_odd * w * w;
    y0 += (h + 1) / 2;
    let mut y1 = y0 - h_odd;
    let step_x = 8 * w * w;
    let step_y = 8 * h * h;

    loop {
        plot4(x0, x1, y0, y1);
        let e2 = 2 * err;
        if e2 <= dy {
            y0 += 1;
            y1 -= 1;
            dy += step_x;
            err += dy;
        }
        if e2 >= dx || 2 * err > dy {
            x0 += 1;
            x1 -= 1;
            dx += step_y;
            err += dx;
        }
        if x0 > x1 {
            break;
        }
    }
    // Flat ellipses stop early; finish the tips.
    while y0 - y1 <= h {
        plot4(x0 - 1, x1 + 1, y0, y1);
        y0 += 1;
        y1 -= 1;
    }

    outline.sort_by_key(|p| (p.y, p.x));
    outline.dedup();

    match mode {
        ShapeFillMode::Outline => outline,
        ShapeFillMode::Filled => {
            let mut spans: BTreeMap<i32, (i32, i32)> = BTreeMap::new();
            for p in &outline {
                let span = spans.entry(p.y).or_insert((p.x, p.x));
                span.0 = span.0.min(p.x);
                span.1 = span.1.max(p.x);
            }
            spans
                .into_iter()
                .flat_map(|(y, (lo, hi))| (lo..=hi).map(move |x| Point::new(x, y)))
                .collect()
        }
    }
}

/// 4-connected flood fill with an explicit stack.
///
/// Replaces every pixel reachable from `seed` whose value equals the seed's
/// original value. Returns the number of pixels changed; a seed outside the
/// surface or a seed already holding `replacement` changes nothing.
pub fn flood_fill(surface: &mut dyn Surface, seed: Point, replacement: i32) -> DocResult<usize> {
    if !surface.contains(seed) {
        return Ok(0);
    }
    let target = surface.get_pixel(seed)?;
    if target == replacement {
        return Ok(0);
    }

    let mut changed = 0;
    let mut stack = Vec::with_capacity(256);
    stack.push(seed);

    while let Some(p) = stack.pop() {
        if surface.get_pixel(p)? != target {
            continue;
        }
        surface.set_pixel(p, replacement)?;
        changed += 1;

        for n in [p.offset(-1, 0), p.offset(1, 0), p.offset(0, -1), p.offset(0, 1)] {
            if surface.contains(n) && surface.get_pixel(n)? == target {
                stack.push(n);
            }
        }
    }
    Ok(changed)
}

/// Translate all content by (`dx`, `dy`) with toroidal wraparound.
pub fn shift_wrapped(source: &RasterBuffer, dx: i32, dy: i32) -> DocResult<RasterBuffer> {
    let size = source.size();
    if size.is_empty() {
        return Ok(source.clone());
    }
    let (w, h) = (size.w as i64, size.h as i64);
    let src = source.data();
    let mut shifted = vec![0; src.len()];
    for y in 0..h {
        let ny = (y + dy as i64).rem_euclid(h);
        for x in 0..w {
            let nx = (x + dx as i64).rem_euclid(w);
            shifted[(ny * w + nx) as usize] = src[(y * w + x) as usize];
        }
    }
    RasterBuffer::from_raw(size, shifted)
}

/// Write `value` at each point, skipping points outside the surface.
/// Returns how many pixels were written.
pub fn plot_clipped(
    surface: &mut dyn Surface,
    points: impl IntoIterator<Item = Point>,
    value: i32,
    clip: Option<Rect>,
) -> DocResult<usize> {
    let mut written = 0;
    for p in points {
        if !surface.contains(p) || clip.is_some_and(|c| !c.contains(p)) {
            continue;
        }
        surface.set_pixel(p, value)?;
        written += 1;
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::{Size, TRANSPARENT};
    use std::collections::HashSet;

    fn set(points: Vec<Point>) -> HashSet<Point> {
        points.into_iter().collect()
    }

    #[test]
    fn line_is_endpoint_order_independent() {
        let a = Point::new(0, 0);
        let b = Point::new(5, 2);
        assert_eq!(set(line_points(a, b)), set(line_points(b, a)));
        let c = Point::new(-3, 7);
        let d = Point::new(2, -4);
        assert_eq!(set(line_points(c, d)), set(line_points(d, c)));
    }

    #[test]
    fn line_hits_both_endpoints_and_steps_major_axis() {
        let pts = line_points(Point::new(0, 0), Point::new(5, 2));
        assert_eq!(pts.len(), 6);
        assert_eq!(pts.first(), Some(&Point::new(0, 0)));
        assert_eq!(pts.last(), Some(&Point::new(5, 2)));

        let steep = line_points(Point::new(1, 0), Point::new(2, 6));
        assert_eq!(steep.len(), 7);
        assert!(steep.contains(&Point::new(2, 6)));
    }

    #[test]
    fn rect_outline_and_fill() {
        let outline = rect_points(Point::new(3, 3), Point::new(0, 0), ShapeFillMode::Outline);
        assert_eq!(outline.len(), 12);
        assert!(!outline.contains(&Point::new(1, 1)));
        let filled = rect_points(Point::new(0, 0), Point::new(3, 3), ShapeFillMode::Filled);
        assert_eq!(filled.len(), 16);
    }

    #[test]
    fn ellipse_stays_in_box_and_is_symmetric() {
        let (a, b) = (Point::new(2, 1), Point::new(9, 8));
        let pts = set(ellipse_points(a, b, ShapeFillMode::Outline));
        for p in &pts {
            assert!(p.x >= 2 && p.x <= 9 && p.y >= 1 && p.y <= 8);
            assert!(pts.contains(&Point::new(11 - p.x, p.y)));
            assert!(pts.contains(&Point::new(p.x, 9 - p.y)));
        }
        let square = set(ellipse_points(Point::new(0, 0), Point::new(4, 4), ShapeFillMode::Outline));
        for p in [Point::new(2, 0), Point::new(0, 2), Point::new(4, 2), Point::new(2, 4)] {
            assert!(square.contains(&p));
        }
        assert!(!square.contains(&Point::new(0, 0)));
    }

    #[test]
    fn filled_ellipse_covers_center() {
        let pts = set(ellipse_points(Point::new(0, 0), Point::new(6, 4), ShapeFillMode::Filled));
        assert!(pts.contains(&Point::new(3, 2)));
        assert!(!pts.contains(&Point::new(0, 0)));
    }

    #[test]
    fn flood_fill_whole_uniform_grid() {
        let mut buf = RasterBuffer::filled(Size::new(5, 5), 0);
        let changed = flood_fill(&mut buf, Point::new(0, 0), 1).unwrap();
        assert_eq!(changed, 25);
        assert!(buf.data().iter().all(|&v| v == 1));
    }

    #[test]
    fn flood_fill_respects_walls_and_noop_when_same_color() {
        let mut buf = RasterBuffer::new(Size::new(5, 5));
        for y in 0..5 {
            buf.set_pixel(Point::new(2, y), 3).unwrap();
        }
        let changed = flood_fill(&mut buf, Point::new(0, 0), 4).unwrap();
        assert_eq!(changed, 10);
        assert_eq!(buf.get_pixel(Point::new(4, 4)).unwrap(), TRANSPARENT);
        assert_eq!(buf.get_pixel(Point::new(2, 2)).unwrap(), 3);

        assert_eq!(flood_fill(&mut buf, Point::new(0, 0), 4).unwrap(), 0);
        assert_eq!(flood_fill(&mut buf, Point::new(9, 9), 1).unwrap(), 0);
    }

    #[test]
    fn shift_wraps_around_edges() {
        let mut buf = RasterBuffer::new(Size::new(3, 2));
        buf.set_pixel(Point::new(2, 1), 5).unwrap();
        let shifted = shift_wrapped(&buf, 1, 1).unwrap();
        assert_eq!(shifted.get_pixel(Point::new(0, 0)).unwrap(), 5);
        let back = shift_wrapped(&shifted, -1, -1).unwrap();
        assert_eq!(back, buf);
        assert_eq!(
            shift_wrapped(&buf, 7, -4).unwrap(),
            shift_wrapped(&buf, 1, 0).unwrap()
        );
    }

    #[test]
    fn square_tip_sizes() {
        assert_eq!(square_tip(Point::new(5, 5), 1), Rect::new(5, 5, 1, 1));
        assert_eq!(square_tip(Point::new(5, 5), 3), Rect::new(4, 4, 3, 3));
        assert_eq!(square_tip(Point::new(5, 5), 2), Rect::new(5, 5, 2, 2));
    }
}
