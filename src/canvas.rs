use std::ops::{Add, Sub};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{DocError, DocResult};

/// Palette index meaning "no colour".
pub const TRANSPARENT: i32 = -1;

// ============================================================================
// GEOMETRY
// ============================================================================

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn offset(self, dx: i32, dy: i32) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }
}

impl Add for Point {
    type Output = Point;
    fn add(self, rhs: Point) -> Point {
        Point::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Point {
    type Output = Point;
    fn sub(self, rhs: Point) -> Point {
        Point::new(self.x - rhs.x, self.y - rhs.y)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size {
    pub w: u32,
    pub h: u32,
}

impl Size {
    pub const fn new(w: u32, h: u32) -> Self {
        Self { w, h }
    }

    pub fn area(&self) -> usize {
        self.w as usize * self.h as usize
    }

    pub fn is_empty(&self) -> bool {
        self.w == 0 || self.h == 0
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= 0 && p.y >= 0 && (p.x as u32) < self.w && (p.y as u32) < self.h
    }
}

/// Selection bounds as drawn: an anchor corner plus a signed extent to the
/// opposite corner. Width/height may be negative; call [`Bounds::normalized`]
/// before treating them as dimensions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounds {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl Bounds {
    pub fn from_corners(anchor: Point, far: Point) -> Self {
        Self {
            x: anchor.x,
            y: anchor.y,
            w: far.x - anchor.x,
            h: far.y - anchor.y,
        }
    }

    pub fn anchor(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn far_corner(&self) -> Point {
        Point::new(self.x + self.w, self.y + self.h)
    }

    pub fn translated(&self, dx: i32, dy: i32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            ..*self
        }
    }

    /// Both corners are inside the result, so a zero extent covers one pixel.
    pub fn normalized(&self) -> Rect {
        let a = self.anchor();
        let b = self.far_corner();
        Rect {
            x: a.x.min(b.x),
            y: a.y.min(b.y),
            w: self.w.unsigned_abs() + 1,
            h: self.h.unsigned_abs() + 1,
        }
    }
}

/// Normalized pixel rectangle, `w`×`h` pixels starting at (`x`, `y`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub w: u32,
    pub h: u32,
}

impl Rect {
    pub fn new(x: i32, y: i32, w: u32, h: u32) -> Self {
        Self { x, y, w, h }
    }

    pub fn min(&self) -> Point {
        Point::new(self.x, self.y)
    }

    /// Inclusive bottom-right pixel.
    pub fn max(&self) -> Point {
        Point::new(self.x + self.w as i32 - 1, self.y + self.h as i32 - 1)
    }

    pub fn size(&self) -> Size {
        Size::new(self.w, self.h)
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x
            && p.y >= self.y
            && p.x < self.x + self.w as i32
            && p.y < self.y + self.h as i32
    }

    /// Intersection with a `size` canvas anchored at the origin.
    pub fn clamp_to(&self, size: Size) -> Option<Rect> {
        let x0 = self.x.max(0);
        let y0 = self.y.max(0);
        let x1 = (self.x + self.w as i32).min(size.w as i32);
        let y1 = (self.y + self.h as i32).min(size.h as i32);
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some(Rect::new(x0, y0, (x1 - x0) as u32, (y1 - y0) as u32))
    }

    /// Row-major iteration over every pixel of the rectangle.
    pub fn points(self) -> impl Iterator<Item = Point> {
        let (x, w) = (self.x, self.w as i32);
        (self.y..self.y + self.h as i32).flat_map(move |y| (x..x + w).map(move |x| Point::new(x, y)))
    }
}

// ============================================================================
// RASTER BUFFER
// ============================================================================

/// Row-major grid of palette indices, `TRANSPARENT` where nothing is painted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RasterBuffer {
    width: u32,
    height: u32,
    data: Vec<i32>,
}

/// Immutable deep copy of a buffer, captured for history records.
///
/// A snapshot can be restored into a live buffer but never mutated in place.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BufferSnapshot {
    width: u32,
    height: u32,
    data: Arc<[i32]>,
}

impl BufferSnapshot {
    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub fn data(&self) -> &[i32] {
        &self.data
    }

    pub fn to_buffer(&self) -> RasterBuffer {
        RasterBuffer {
            width: self.width,
            height: self.height,
            data: self.data.to_vec(),
        }
    }

    pub fn memory_size(&self) -> usize {
        self.data.len() * std::mem::size_of::<i32>()
    }
}

/// On-disk encoding: `{ "w", "h", "data": { "data": [...] } }`.
#[derive(Serialize, Deserialize)]
pub(crate) struct RasterJson {
    w: u32,
    h: u32,
    data: RasterJsonData,
}

#[derive(Serialize, Deserialize)]
struct RasterJsonData {
    data: Vec<i32>,
}

impl RasterBuffer {
    /// A fully transparent buffer.
    pub fn new(size: Size) -> Self {
        Self::filled(size, TRANSPARENT)
    }

    pub fn filled(size: Size, value: i32) -> Self {
        Self {
            width: size.w,
            height: size.h,
            data: vec![value; size.area()],
        }
    }

    pub fn from_raw(size: Size, data: Vec<i32>) -> DocResult<Self> {
        if data.len() != size.area() {
            return Err(DocError::InvalidFormat(format!(
                "raster data has {} cells, expected {}×{} = {}",
                data.len(),
                size.w,
                size.h,
                size.area()
            )));
        }
        Ok(Self {
            width: size.w,
            height: size.h,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[i32] {
        &self.data
    }

    /// True when every pixel is transparent.
    pub fn is_blank(&self) -> bool {
        self.data.iter().all(|&v| v == TRANSPARENT)
    }

    #[inline]
    fn index(&self, p: Point) -> DocResult<usize> {
        if !Surface::size(self).contains(p) {
            return Err(DocError::OutOfBounds {
                x: p.x,
                y: p.y,
                width: self.width,
                height: self.height,
            });
        }
        Ok(p.y as usize * self.width as usize + p.x as usize)
    }

    /// Copy of this buffer at `size`: overlapping content kept, new area transparent.
    pub fn resized(&self, size: Size) -> RasterBuffer {
        let mut out = RasterBuffer::new(size);
        let copy_w = self.width.min(size.w) as usize;
        let copy_h = self.height.min(size.h) as usize;
        for y in 0..copy_h {
            let src = y * self.width as usize;
            let dst = y * size.w as usize;
            out.data[dst..dst + copy_w].copy_from_slice(&self.data[src..src + copy_w]);
        }
        out
    }

    /// Overwrite this buffer with `snapshot`. Sizes must match.
    pub fn restore(&mut self, snapshot: &BufferSnapshot) -> DocResult<()> {
        check_same_size(Surface::size(self), snapshot.size())?;
        self.data.copy_from_slice(&snapshot.data);
        Ok(())
    }

    /// Sub-buffer covering `rect`; pixels of `rect` outside this buffer read as transparent.
    pub fn crop(&self, rect: Rect) -> RasterBuffer {
        let mut out = RasterBuffer::new(rect.size());
        for p in rect.points() {
            if let Ok(i) = self.index(p) {
                let local = (p.y - rect.y) as usize * rect.w as usize + (p.x - rect.x) as usize;
                out.data[local] = self.data[i];
            }
        }
        out
    }

    pub(crate) fn to_json(&self) -> RasterJson {
        RasterJson {
            w: self.width,
            h: self.height,
            data: RasterJsonData {
                data: self.data.clone(),
            },
        }
    }

    pub(crate) fn from_json(json: RasterJson) -> DocResult<Self> {
        Self::from_raw(Size::new(json.w, json.h), json.data.data)
    }
}

fn check_same_size(expected: Size, found: Size) -> DocResult<()> {
    if expected != found {
        return Err(DocError::SizeMismatch {
            expected: (expected.w, expected.h),
            found: (found.w, found.h),
        });
    }
    Ok(())
}

// ============================================================================
// PIXEL SURFACE
// ============================================================================

/// Read/write contract shared by live layer buffers and tool scratch buffers.
///
/// `get_pixel`/`set_pixel` are bounds checked and never wrap; tools that want
/// wraparound compute wrapped coordinates themselves.
pub trait Surface {
    fn size(&self) -> Size;

    fn get_pixel(&self, p: Point) -> DocResult<i32>;

    fn set_pixel(&mut self, p: Point, value: i32) -> DocResult<()>;

    /// Visits every pixel exactly once in row-major order (y outer, x inner).
    fn for_each(&self, f: &mut dyn FnMut(i32, Point));

    /// For every point where `predicate(source_value, point)` holds, copy the
    /// source pixel into this surface.
    fn copy_pixels_from(
        &mut self,
        source: &RasterBuffer,
        predicate: &dyn Fn(i32, Point) -> bool,
    ) -> DocResult<()>;

    fn clone_data(&self) -> BufferSnapshot;

    fn fill_all(&mut self, value: i32);

    fn contains(&self, p: Point) -> bool {
        self.size().contains(p)
    }
}

impl Surface for RasterBuffer {
    fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    fn get_pixel(&self, p: Point) -> DocResult<i32> {
        let i = self.index(p)?;
        Ok(self.data[i])
    }

    fn set_pixel(&mut self, p: Point, value: i32) -> DocResult<()> {
        let i = self.index(p)?;
        self.data[i] = value;
        Ok(())
    }

    fn for_each(&self, f: &mut dyn FnMut(i32, Point)) {
        let w = self.width as usize;
        for (i, &v) in self.data.iter().enumerate() {
            f(v, Point::new((i % w) as i32, (i / w) as i32));
        }
    }

    fn copy_pixels_from(
        &mut self,
        source: &RasterBuffer,
        predicate: &dyn Fn(i32, Point) -> bool,
    ) -> DocResult<()> {
        check_same_size(Surface::size(self), Surface::size(source))?;
        let w = self.width as usize;
        for (i, (dst, &src)) in self.data.iter_mut().zip(source.data.iter()).enumerate() {
            if predicate(src, Point::new((i % w) as i32, (i / w) as i32)) {
                *dst = src;
            }
        }
        Ok(())
    }

    fn clone_data(&self) -> BufferSnapshot {
        BufferSnapshot {
            width: self.width,
            height: self.height,
            data: Arc::from(self.data.as_slice()),
        }
    }

    fn fill_all(&mut self, value: i32) {
        self.data.fill(value);
    }
}

/// Identifies the buffer of one (layer, frame) pair.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferKey {
    pub layer: String,
    pub frame: String,
}

impl BufferKey {
    pub fn new(layer: impl Into<String>, frame: impl Into<String>) -> Self {
        Self {
            layer: layer.into(),
            frame: frame.into(),
        }
    }

    /// `"<layerId>_<frameId>"`, the key used in project files.
    pub fn storage_key(&self) -> String {
        format!("{}_{}", self.layer, self.frame)
    }
}

/// A [`Surface`] bound to the live buffer of one (layer, frame) pair.
pub struct PixelSurface<'a> {
    key: BufferKey,
    buffer: &'a mut RasterBuffer,
}

impl<'a> PixelSurface<'a> {
    pub(crate) fn new(key: BufferKey, buffer: &'a mut RasterBuffer) -> Self {
        Self { key, buffer }
    }

    pub fn key(&self) -> &BufferKey {
        &self.key
    }

    pub fn buffer(&self) -> &RasterBuffer {
        self.buffer
    }
}

impl Surface for PixelSurface<'_> {
    fn size(&self) -> Size {
        Surface::size(&*self.buffer)
    }

    fn get_pixel(&self, p: Point) -> DocResult<i32> {
        self.buffer.get_pixel(p)
    }

    fn set_pixel(&mut self, p: Point, value: i32) -> DocResult<()> {
        self.buffer.set_pixel(p, value)
    }

    fn for_each(&self, f: &mut dyn FnMut(i32, Point)) {
        self.buffer.for_each(f)
    }

    fn copy_pixels_from(
        &mut self,
        source: &RasterBuffer,
        predicate: &dyn Fn(i32, Point) -> bool,
    ) -> DocResult<()> {
        self.buffer.copy_pixels_from(source, predicate)
    }

    fn clone_data(&self) -> BufferSnapshot {
        self.buffer.clone_data()
    }

    fn fill_all(&mut self, value: i32) {
        self.buffer.fill_all(value)
    }
}
