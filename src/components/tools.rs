use crate::canvas::{
    BufferKey, BufferSnapshot, Bounds, Point, RasterBuffer, Rect, Surface, TRANSPARENT,
};
use crate::components::colors::Palette;
use crate::components::history::{AreaChange, CompositeChange};
use crate::error::{DocError, DocResult};
use crate::ops::shapes::{
    ShapeFillMode, ellipse_points, flood_fill, line_points, plot_clipped, rect_points,
    shift_wrapped, square_tip,
};
use crate::props::{Entity, PropDef, PropKind};
use crate::settings::{EditorSettings, FreehandCommit};
use crate::sprite::SpriteImage;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum ToolKind {
    #[default]
    Pencil,
    Eraser,
    Line,
    Rect,
    Ellipse,
    Fill,
    Shift,
    Move,
    Select,
}

impl ToolKind {
    pub fn label(&self) -> &'static str {
        match self {
            ToolKind::Pencil => "Pencil",
            ToolKind::Eraser => "Eraser",
            ToolKind::Line => "Line",
            ToolKind::Rect => "Rectangle",
            ToolKind::Ellipse => "Ellipse",
            ToolKind::Fill => "Fill",
            ToolKind::Shift => "Shift",
            ToolKind::Move => "Move",
            ToolKind::Select => "Select",
        }
    }

    pub fn all() -> &'static [ToolKind] {
        &[
            ToolKind::Pencil,
            ToolKind::Eraser,
            ToolKind::Line,
            ToolKind::Rect,
            ToolKind::Ellipse,
            ToolKind::Fill,
            ToolKind::Shift,
            ToolKind::Move,
            ToolKind::Select,
        ]
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Key {
    Left,
    Right,
    Up,
    Down,
    Escape,
    Delete,
}

impl Key {
    fn arrow_delta(&self) -> Option<(i32, i32)> {
        match self {
            Key::Left => Some((-1, 0)),
            Key::Right => Some((1, 0)),
            Key::Up => Some((0, -1)),
            Key::Down => Some((0, 1)),
            Key::Escape | Key::Delete => None,
        }
    }
}

/// Visual feedback for the renderer, in image coordinates.
#[derive(Clone, Debug, PartialEq)]
pub enum Overlay {
    /// Cursor position and the pixels the tip would cover.
    Crosshair { at: Point, tip: Rect },
    MarchingAnts(Rect),
    /// Pixels an in-progress shape will write on release.
    ShapePreview { points: Vec<Point>, rgba: [u8; 4] },
    /// Lifted selection content; `TRANSPARENT` cells are see-through.
    FloatingPixels { origin: Point, pixels: RasterBuffer },
}

// ============================================================================
// TOOL CONTEXT
// ============================================================================

/// Everything a tool may read or change while handling one event.
pub struct ToolContext<'a> {
    image: &'a mut SpriteImage,
    layer: Option<&'a str>,
    frame: Option<&'a str>,
    color: i32,
    palette: &'a Palette,
    selection: Option<Bounds>,
    dirty: bool,
}

impl<'a> ToolContext<'a> {
    pub fn new(image: &'a mut SpriteImage, palette: &'a Palette) -> Self {
        Self {
            image,
            layer: None,
            frame: None,
            color: 0,
            palette,
            selection: None,
            dirty: false,
        }
    }

    pub fn with_layer(mut self, layer: Option<&'a str>) -> Self {
        self.layer = layer;
        self
    }

    pub fn with_frame(mut self, frame: Option<&'a str>) -> Self {
        self.frame = frame;
        self
    }

    pub fn with_color(mut self, color: i32) -> Self {
        self.color = color;
        self
    }

    pub fn with_selection(mut self, selection: Option<Bounds>) -> Self {
        self.selection = selection;
        self
    }

    pub fn image(&self) -> &SpriteImage {
        &*self.image
    }

    pub fn color(&self) -> i32 {
        self.color
    }

    pub fn palette(&self) -> &Palette {
        self.palette
    }

    /// Selection as drawn (extent may be negative).
    pub fn selection(&self) -> Option<Bounds> {
        self.selection
    }

    /// Selection normalized and clipped to the image.
    pub fn selection_rect(&self) -> Option<Rect> {
        self.selection
            .and_then(|b| b.normalized().clamp_to(self.image.size()))
    }

    pub fn set_selection_rect(&mut self, selection: Option<Bounds>) {
        self.selection = selection;
        self.dirty = true;
    }

    /// Request a redraw without committing anything.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Buffer of the active (layer, frame).
    ///
    /// `Ok(None)` when either is unset or no longer exists: tools treat that
    /// as nothing to draw on. An active object layer is an error.
    fn target(&self) -> DocResult<Option<BufferKey>> {
        let (Some(layer), Some(frame)) = (self.layer, self.frame) else {
            return Ok(None);
        };
        if self.image.layer(layer).is_none() || self.image.frame(frame).is_none() {
            return Ok(None);
        }
        self.image.pixel_key(layer, frame).map(Some)
    }

    fn snapshot(&mut self, key: &BufferKey) -> BufferSnapshot {
        self.image.surface_for(key).clone_data()
    }
}

// ============================================================================
// SETTINGS
// ============================================================================

const SETTINGS_CLASS: &str = "ToolSettings";

fn tool_settings(kind: ToolKind, settings: &EditorSettings) -> DocResult<Entity> {
    let tip = settings.default_tip_size.max(1) as i64;
    match kind {
        // The configured tip size is an initial value: default factories cannot capture.
        ToolKind::Pencil | ToolKind::Eraser | ToolKind::Line => Entity::new(
            SETTINGS_CLASS,
            vec![PropDef::new("tip_size", PropKind::Int, || 1.into())],
            vec![("tip_size", tip.into())],
        ),
        ToolKind::Rect | ToolKind::Ellipse => Entity::new(
            SETTINGS_CLASS,
            vec![PropDef::new("filled", PropKind::Bool, || false.into())],
            vec![],
        ),
        ToolKind::Shift => Entity::new(
            SETTINGS_CLASS,
            vec![PropDef::new("scope", PropKind::Str, || {
                ShiftScope::Current.as_str().into()
            })],
            vec![],
        ),
        ToolKind::Fill | ToolKind::Move | ToolKind::Select => {
            Entity::new(SETTINGS_CLASS, Vec::<PropDef>::new(), vec![])
        }
    }
}

fn tip_size(settings: &Entity) -> DocResult<u32> {
    let tip = settings.get_int("tip_size")?;
    if tip < 1 {
        return Err(DocError::InvalidArgument(format!("tip size {}", tip)));
    }
    Ok(tip as u32)
}

/// Stamp a square tip at every point of the segment `from`..`to`.
fn stamp_segment(
    ctx: &mut ToolContext,
    key: &BufferKey,
    from: Point,
    to: Point,
    tip: u32,
    clip: Option<Rect>,
) -> DocResult<()> {
    let value = ctx.color;
    let mut surface = ctx.image.surface_for(key);
    for p in line_points(from, to) {
        plot_clipped(&mut surface, square_tip(p, tip).points(), value, clip)?;
    }
    Ok(())
}

fn crosshair(at: Point, tip: u32) -> Overlay {
    Overlay::Crosshair {
        at,
        tip: square_tip(at, tip),
    }
}

// ============================================================================
// PENCIL / ERASER
// ============================================================================

/// Clip to pass to `stamp_segment`, or `None` when the stroke may not write.
fn writable(clip: Option<Option<Rect>>) -> Option<Option<Rect>> {
    match clip {
        None => Some(None),
        Some(None) => None,
        Some(rect) => Some(rect),
    }
}

struct Stroke {
    key: BufferKey,
    last: Point,
    /// Stroke start state, only kept for per-gesture commits.
    before: Option<BufferSnapshot>,
}

/// Square-tip freehand drawing. The eraser variant is confined to the selection.
pub struct FreehandTool {
    settings: Entity,
    erase: bool,
    commit: FreehandCommit,
    stroke: Option<Stroke>,
}

impl FreehandTool {
    fn new(settings: Entity, erase: bool, commit: FreehandCommit) -> Self {
        Self {
            settings,
            erase,
            commit,
            stroke: None,
        }
    }

    fn label(&self) -> &'static str {
        if self.erase { "Eraser" } else { "Pencil" }
    }

    /// Eraser writes are confined to the selection. `Some(None)` means a
    /// selection exists but misses the image, so nothing may be written.
    fn clip(&self, ctx: &ToolContext) -> Option<Option<Rect>> {
        if !self.erase {
            return None;
        }
        ctx.selection
            .map(|b| b.normalized().clamp_to(ctx.image.size()))
    }

    pub fn commit_policy(&self) -> FreehandCommit {
        self.commit
    }

    pub fn set_commit_policy(&mut self, commit: FreehandCommit) {
        self.commit = commit;
    }

    fn mouse_down(&mut self, ctx: &mut ToolContext, p: Point) -> DocResult<()> {
        let Some(key) = ctx.target()? else { return Ok(()) };
        let tip = tip_size(&self.settings)?;
        let clip = self.clip(ctx);
        let before = ctx.snapshot(&key);
        if let Some(clip) = writable(clip) {
            stamp_segment(ctx, &key, p, p, tip, clip)?;
        }
        let before = match self.commit {
            FreehandCommit::PerSample => {
                ctx.image.commit_change(&key, before, self.label())?;
                None
            }
            FreehandCommit::PerGesture => Some(before),
        };
        self.stroke = Some(Stroke { key, last: p, before });
        ctx.mark_dirty();
        Ok(())
    }

    fn mouse_move(&mut self, ctx: &mut ToolContext, p: Point) -> DocResult<()> {
        let tip = tip_size(&self.settings)?;
        let clip = self.clip(ctx);
        let label = self.label();
        let Some(stroke) = self.stroke.as_mut() else { return Ok(()) };
        let before = match self.commit {
            FreehandCommit::PerSample => Some(ctx.snapshot(&stroke.key)),
            FreehandCommit::PerGesture => None,
        };
        if let Some(clip) = writable(clip) {
            stamp_segment(ctx, &stroke.key, stroke.last, p, tip, clip)?;
        }
        if let Some(before) = before {
            ctx.image.commit_change(&stroke.key, before, label)?;
        }
        stroke.last = p;
        ctx.mark_dirty();
        Ok(())
    }

    fn mouse_up(&mut self, ctx: &mut ToolContext) -> DocResult<()> {
        if let Some(Stroke {
            key,
            before: Some(before),
            ..
        }) = self.stroke.take()
        {
            ctx.image.commit_change(&key, before, self.label())?;
        }
        Ok(())
    }
}

// ============================================================================
// LINE / RECTANGLE / ELLIPSE
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShapeKind {
    Line,
    Rect,
    Ellipse,
}

/// Drag-to-size shapes, written to the buffer only on release.
pub struct ShapeTool {
    shape: ShapeKind,
    settings: Entity,
    drag: Option<(Point, Point)>,
}

impl ShapeTool {
    fn new(shape: ShapeKind, settings: Entity) -> Self {
        Self {
            shape,
            settings,
            drag: None,
        }
    }

    fn label(&self) -> &'static str {
        match self.shape {
            ShapeKind::Line => "Line",
            ShapeKind::Rect => "Rectangle",
            ShapeKind::Ellipse => "Ellipse",
        }
    }

    /// Pixels the shape from `a` to `b` covers with the current settings.
    pub fn pixels(&self, a: Point, b: Point) -> DocResult<Vec<Point>> {
        Ok(match self.shape {
            ShapeKind::Line => {
                let tip = tip_size(&self.settings)?;
                let line = line_points(a, b);
                if tip == 1 {
                    line
                } else {
                    let mut pts: Vec<Point> = line
                        .into_iter()
                        .flat_map(|p| square_tip(p, tip).points())
                        .collect();
                    pts.sort_by_key(|p| (p.y, p.x));
                    pts.dedup();
                    pts
                }
            }
            ShapeKind::Rect | ShapeKind::Ellipse => {
                let mode = ShapeFillMode::from_filled(self.settings.get_bool("filled")?);
                if self.shape == ShapeKind::Rect {
                    rect_points(a, b, mode)
                } else {
                    ellipse_points(a, b, mode)
                }
            }
        })
    }

    fn mouse_down(&mut self, ctx: &mut ToolContext, p: Point) -> DocResult<()> {
        if ctx.target()?.is_none() {
            return Ok(());
        }
        self.drag = Some((p, p));
        ctx.mark_dirty();
        Ok(())
    }

    fn mouse_move(&mut self, ctx: &mut ToolContext, p: Point) -> DocResult<()> {
        if let Some((anchor, _)) = self.drag {
            self.drag = Some((anchor, p));
            ctx.mark_dirty();
        }
        Ok(())
    }

    fn mouse_up(&mut self, ctx: &mut ToolContext, p: Point) -> DocResult<()> {
        let Some((anchor, _)) = self.drag.take() else { return Ok(()) };
        ctx.mark_dirty();
        let Some(key) = ctx.target()? else { return Ok(()) };
        let points = self.pixels(anchor, p)?;
        let before = ctx.snapshot(&key);
        let value = ctx.color;
        plot_clipped(&mut ctx.image.surface_for(&key), points, value, None)?;
        ctx.image.commit_change(&key, before, self.label())?;
        Ok(())
    }
}

// ============================================================================
// FILL
// ============================================================================

pub struct FillTool {
    settings: Entity,
}

impl FillTool {
    fn mouse_down(&mut self, ctx: &mut ToolContext, p: Point) -> DocResult<()> {
        let Some(key) = ctx.target()? else { return Ok(()) };
        if !ctx.image.size().contains(p) {
            return Ok(());
        }
        let before = ctx.snapshot(&key);
        let value = ctx.color;
        flood_fill(&mut ctx.image.surface_for(&key), p, value)?;
        ctx.image.commit_change(&key, before, "Fill")?;
        ctx.mark_dirty();
        Ok(())
    }
}

// ============================================================================
// SHIFT
// ============================================================================

/// Which buffers the shift tool moves.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ShiftScope {
    /// Active layer, active frame.
    #[default]
    Current,
    /// Every pixel layer, active frame.
    Layers,
    /// Active layer, every frame.
    Frames,
    All,
}

impl ShiftScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShiftScope::Current => "current",
            ShiftScope::Layers => "layers",
            ShiftScope::Frames => "frames",
            ShiftScope::All => "all",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "current" => Some(ShiftScope::Current),
            "layers" => Some(ShiftScope::Layers),
            "frames" => Some(ShiftScope::Frames),
            "all" => Some(ShiftScope::All),
            _ => None,
        }
    }
}

struct ShiftDrag {
    anchor: Point,
    originals: Vec<(BufferKey, BufferSnapshot)>,
}

/// Wrap-around translation of whole buffers.
pub struct ShiftTool {
    settings: Entity,
    drag: Option<ShiftDrag>,
}

impl ShiftTool {
    pub fn scope(&self) -> DocResult<ShiftScope> {
        let raw = self.settings.get_str("scope")?;
        ShiftScope::parse(&raw)
            .ok_or_else(|| DocError::InvalidArgument(format!("shift scope '{}'", raw)))
    }

    pub fn set_scope(&self, scope: ShiftScope) -> DocResult<()> {
        self.settings.set("scope", scope.as_str())
    }

    /// Existing buffers in scope. Never-written buffers are transparent and
    /// shifting them changes nothing.
    fn targets(&self, ctx: &ToolContext) -> DocResult<Vec<BufferKey>> {
        let Some(current) = ctx.target()? else { return Ok(Vec::new()) };
        let keys = match self.scope()? {
            ShiftScope::Current => vec![current],
            ShiftScope::Layers => ctx
                .image
                .pixel_keys()
                .into_iter()
                .filter(|k| k.frame == current.frame)
                .collect(),
            ShiftScope::Frames => ctx
                .image
                .pixel_keys()
                .into_iter()
                .filter(|k| k.layer == current.layer)
                .collect(),
            ShiftScope::All => ctx.image.pixel_keys(),
        };
        Ok(keys
            .into_iter()
            .filter(|k| ctx.image.buffers().contains(k))
            .collect())
    }

    fn capture(&self, ctx: &mut ToolContext) -> DocResult<Vec<(BufferKey, BufferSnapshot)>> {
        let keys = self.targets(ctx)?;
        Ok(keys
            .into_iter()
            .map(|k| {
                let snap = ctx.snapshot(&k);
                (k, snap)
            })
            .collect())
    }

    /// Replace each buffer with its original shifted by `delta`.
    fn apply(
        ctx: &mut ToolContext,
        originals: &[(BufferKey, BufferSnapshot)],
        delta: Point,
    ) -> DocResult<()> {
        for (key, original) in originals {
            let shifted = shift_wrapped(&original.to_buffer(), delta.x, delta.y)?;
            ctx.image
                .surface_for(key)
                .copy_pixels_from(&shifted, &|_, _| true)?;
        }
        Ok(())
    }

    fn record(ctx: &mut ToolContext, originals: Vec<(BufferKey, BufferSnapshot)>) {
        let mut parts: Vec<AreaChange> = originals
            .into_iter()
            .map(|(key, before)| {
                let after = ctx.snapshot(&key);
                AreaChange::new(key, before, after, "Shift")
            })
            .filter(|c| !c.is_noop())
            .collect();
        match parts.len() {
            0 => {}
            1 => {
                if let Some(part) = parts.pop() {
                    ctx.image.append_history(Box::new(part));
                }
            }
            _ => ctx
                .image
                .append_history(Box::new(CompositeChange::new(parts, "Shift"))),
        }
    }

    fn mouse_down(&mut self, ctx: &mut ToolContext, p: Point) -> DocResult<()> {
        let originals = self.capture(ctx)?;
        if originals.is_empty() {
            return Ok(());
        }
        self.drag = Some(ShiftDrag {
            anchor: p,
            originals,
        });
        Ok(())
    }

    fn mouse_move(&mut self, ctx: &mut ToolContext, p: Point) -> DocResult<()> {
        let Some(drag) = &self.drag else { return Ok(()) };
        Self::apply(ctx, &drag.originals, p - drag.anchor)?;
        ctx.mark_dirty();
        Ok(())
    }

    fn mouse_up(&mut self, ctx: &mut ToolContext, p: Point) -> DocResult<()> {
        let Some(drag) = self.drag.take() else { return Ok(()) };
        Self::apply(ctx, &drag.originals, p - drag.anchor)?;
        Self::record(ctx, drag.originals);
        ctx.mark_dirty();
        Ok(())
    }

    fn key_down(&mut self, ctx: &mut ToolContext, key: Key) -> DocResult<()> {
        let Some((dx, dy)) = key.arrow_delta() else { return Ok(()) };
        if self.drag.is_some() {
            return Ok(());
        }
        let originals = self.capture(ctx)?;
        Self::apply(ctx, &originals, Point::new(dx, dy))?;
        Self::record(ctx, originals);
        ctx.mark_dirty();
        Ok(())
    }
}

// ============================================================================
// MOVE
// ============================================================================

struct Lifted {
    key: BufferKey,
    before: BufferSnapshot,
    source: Rect,
    scratch: RasterBuffer,
    /// Press point relative to the selection's top-left.
    grab: Point,
    origin: Point,
}

/// Drags the selected pixels. The source area becomes transparent on drop.
pub struct MoveTool {
    settings: Entity,
    lifted: Option<Lifted>,
}

impl MoveTool {
    fn bounds_at(origin: Point, size: Rect) -> Bounds {
        Bounds::from_corners(
            origin,
            origin.offset(size.w as i32 - 1, size.h as i32 - 1),
        )
    }

    fn mouse_down(&mut self, ctx: &mut ToolContext, p: Point) -> DocResult<()> {
        let Some(selection) = ctx.selection else { return Ok(()) };
        let rect = selection.normalized();
        if !rect.contains(p) {
            return Ok(());
        }
        let Some(key) = ctx.target()? else { return Ok(()) };
        let surface = ctx.image.surface_for(&key);
        let scratch = surface.buffer().crop(rect);
        let before = surface.clone_data();
        self.lifted = Some(Lifted {
            key,
            before,
            source: rect,
            scratch,
            grab: p - rect.min(),
            origin: rect.min(),
        });
        ctx.mark_dirty();
        Ok(())
    }

    fn mouse_move(&mut self, ctx: &mut ToolContext, p: Point) -> DocResult<()> {
        let Some(lifted) = self.lifted.as_mut() else { return Ok(()) };
        lifted.origin = p - lifted.grab;
        ctx.set_selection_rect(Some(Self::bounds_at(lifted.origin, lifted.source)));
        Ok(())
    }

    fn mouse_up(&mut self, ctx: &mut ToolContext, p: Point) -> DocResult<()> {
        let Some(lifted) = self.lifted.take() else { return Ok(()) };
        let origin = p - lifted.grab;

        let mut opaque = Vec::new();
        lifted.scratch.for_each(&mut |v, q| {
            if v != TRANSPARENT {
                opaque.push((origin + q, v));
            }
        });

        let mut surface = ctx.image.surface_for(&lifted.key);
        plot_clipped(&mut surface, lifted.source.points(), TRANSPARENT, None)?;
        for (q, v) in opaque {
            if surface.contains(q) {
                surface.set_pixel(q, v)?;
            }
        }
        ctx.image.commit_change(&lifted.key, lifted.before, "Move")?;
        ctx.set_selection_rect(Some(Self::bounds_at(origin, lifted.source)));
        Ok(())
    }

    fn key_down(&mut self, ctx: &mut ToolContext, key: Key) -> DocResult<()> {
        let Some((dx, dy)) = key.arrow_delta() else { return Ok(()) };
        if self.lifted.is_some() {
            return Ok(());
        }
        if let Some(selection) = ctx.selection {
            ctx.set_selection_rect(Some(selection.translated(dx, dy)));
        }
        Ok(())
    }
}

// ============================================================================
// SELECT
// ============================================================================

/// Rectangle marquee. Stores the selection un-normalized, anchor first.
pub struct SelectTool {
    settings: Entity,
    anchor: Option<Point>,
}

impl SelectTool {
    fn mouse_down(&mut self, ctx: &mut ToolContext, p: Point) -> DocResult<()> {
        self.anchor = Some(p);
        ctx.set_selection_rect(Some(Bounds::from_corners(p, p)));
        Ok(())
    }

    fn mouse_move(&mut self, ctx: &mut ToolContext, p: Point) -> DocResult<()> {
        if let Some(anchor) = self.anchor {
            ctx.set_selection_rect(Some(Bounds::from_corners(anchor, p)));
        }
        Ok(())
    }

    fn mouse_up(&mut self, ctx: &mut ToolContext, p: Point) -> DocResult<()> {
        if let Some(anchor) = self.anchor.take() {
            ctx.set_selection_rect(Some(Bounds::from_corners(anchor, p)));
        }
        Ok(())
    }

    fn key_down(&mut self, ctx: &mut ToolContext, key: Key) -> DocResult<()> {
        match key {
            Key::Escape => {
                self.anchor = None;
                ctx.set_selection_rect(None);
            }
            Key::Delete => {
                let Some(rect) = ctx.selection_rect() else { return Ok(()) };
                let Some(target) = ctx.target()? else { return Ok(()) };
                let before = ctx.snapshot(&target);
                plot_clipped(
                    &mut ctx.image.surface_for(&target),
                    rect.points(),
                    TRANSPARENT,
                    None,
                )?;
                ctx.image.commit_change(&target, before, "Delete")?;
                ctx.mark_dirty();
            }
            _ => {}
        }
        Ok(())
    }
}

// ============================================================================
// TOOL
// ============================================================================

pub enum Tool {
    Pencil(FreehandTool),
    Eraser(FreehandTool),
    Line(ShapeTool),
    Rect(ShapeTool),
    Ellipse(ShapeTool),
    Fill(FillTool),
    Shift(ShiftTool),
    Move(MoveTool),
    Select(SelectTool),
}

impl Tool {
    pub fn new(kind: ToolKind, settings: &EditorSettings) -> DocResult<Self> {
        let entity = tool_settings(kind, settings)?;
        let commit = settings.freehand_commit;
        Ok(match kind {
            ToolKind::Pencil => Tool::Pencil(FreehandTool::new(entity, false, commit)),
            ToolKind::Eraser => Tool::Eraser(FreehandTool::new(entity, true, commit)),
            ToolKind::Line => Tool::Line(ShapeTool::new(ShapeKind::Line, entity)),
            ToolKind::Rect => Tool::Rect(ShapeTool::new(ShapeKind::Rect, entity)),
            ToolKind::Ellipse => Tool::Ellipse(ShapeTool::new(ShapeKind::Ellipse, entity)),
            ToolKind::Fill => Tool::Fill(FillTool { settings: entity }),
            ToolKind::Shift => Tool::Shift(ShiftTool {
                settings: entity,
                drag: None,
            }),
            ToolKind::Move => Tool::Move(MoveTool {
                settings: entity,
                lifted: None,
            }),
            ToolKind::Select => Tool::Select(SelectTool {
                settings: entity,
                anchor: None,
            }),
        })
    }

    pub fn kind(&self) -> ToolKind {
        match self {
            Tool::Pencil(_) => ToolKind::Pencil,
            Tool::Eraser(_) => ToolKind::Eraser,
            Tool::Line(_) => ToolKind::Line,
            Tool::Rect(_) => ToolKind::Rect,
            Tool::Ellipse(_) => ToolKind::Ellipse,
            Tool::Fill(_) => ToolKind::Fill,
            Tool::Shift(_) => ToolKind::Shift,
            Tool::Move(_) => ToolKind::Move,
            Tool::Select(_) => ToolKind::Select,
        }
    }

    /// The tool's own configuration (tip size, filled, shift scope).
    pub fn settings(&self) -> &Entity {
        match self {
            Tool::Pencil(t) | Tool::Eraser(t) => &t.settings,
            Tool::Line(t) | Tool::Rect(t) | Tool::Ellipse(t) => &t.settings,
            Tool::Fill(t) => &t.settings,
            Tool::Shift(t) => &t.settings,
            Tool::Move(t) => &t.settings,
            Tool::Select(t) => &t.settings,
        }
    }

    /// True while a drag gesture is in progress.
    pub fn is_active(&self) -> bool {
        match self {
            Tool::Pencil(t) | Tool::Eraser(t) => t.stroke.is_some(),
            Tool::Line(t) | Tool::Rect(t) | Tool::Ellipse(t) => t.drag.is_some(),
            Tool::Fill(_) => false,
            Tool::Shift(t) => t.drag.is_some(),
            Tool::Move(t) => t.lifted.is_some(),
            Tool::Select(t) => t.anchor.is_some(),
        }
    }

    /// End any in-progress gesture. Pixels already written to the buffer
    /// (freehand strokes, shift drags) are committed to history; previews
    /// that never touched the buffer are dropped.
    pub fn finish(&mut self, ctx: &mut ToolContext) -> DocResult<()> {
        match self {
            Tool::Pencil(t) | Tool::Eraser(t) => t.mouse_up(ctx),
            Tool::Line(t) | Tool::Rect(t) | Tool::Ellipse(t) => {
                t.drag = None;
                Ok(())
            }
            Tool::Fill(_) => Ok(()),
            Tool::Shift(t) => {
                if let Some(drag) = t.drag.take() {
                    ShiftTool::record(ctx, drag.originals);
                }
                Ok(())
            }
            Tool::Move(t) => {
                t.lifted = None;
                Ok(())
            }
            Tool::Select(t) => {
                t.anchor = None;
                Ok(())
            }
        }
    }

    pub fn mouse_down(&mut self, ctx: &mut ToolContext, p: Point) -> DocResult<()> {
        match self {
            Tool::Pencil(t) | Tool::Eraser(t) => t.mouse_down(ctx, p),
            Tool::Line(t) | Tool::Rect(t) | Tool::Ellipse(t) => t.mouse_down(ctx, p),
            Tool::Fill(t) => t.mouse_down(ctx, p),
            Tool::Shift(t) => t.mouse_down(ctx, p),
            Tool::Move(t) => t.mouse_down(ctx, p),
            Tool::Select(t) => t.mouse_down(ctx, p),
        }
    }

    pub fn mouse_move(&mut self, ctx: &mut ToolContext, p: Point) -> DocResult<()> {
        match self {
            Tool::Pencil(t) | Tool::Eraser(t) => t.mouse_move(ctx, p),
            Tool::Line(t) | Tool::Rect(t) | Tool::Ellipse(t) => t.mouse_move(ctx, p),
            Tool::Fill(_) => Ok(()),
            Tool::Shift(t) => t.mouse_move(ctx, p),
            Tool::Move(t) => t.mouse_move(ctx, p),
            Tool::Select(t) => t.mouse_move(ctx, p),
        }
    }

    pub fn mouse_up(&mut self, ctx: &mut ToolContext, p: Point) -> DocResult<()> {
        match self {
            Tool::Pencil(t) | Tool::Eraser(t) => t.mouse_up(ctx),
            Tool::Line(t) | Tool::Rect(t) | Tool::Ellipse(t) => t.mouse_up(ctx, p),
            Tool::Fill(_) => Ok(()),
            Tool::Shift(t) => t.mouse_up(ctx, p),
            Tool::Move(t) => t.mouse_up(ctx, p),
            Tool::Select(t) => t.mouse_up(ctx, p),
        }
    }

    pub fn key_down(&mut self, ctx: &mut ToolContext, key: Key) -> DocResult<()> {
        match self {
            Tool::Shift(t) => t.key_down(ctx, key),
            Tool::Move(t) => t.key_down(ctx, key),
            Tool::Select(t) => t.key_down(ctx, key),
            _ => Ok(()),
        }
    }

    /// Feedback to draw over the canvas for the current state.
    pub fn overlays(&self, ctx: &ToolContext, cursor: Option<Point>) -> Vec<Overlay> {
        let mut out = Vec::new();
        let rgba = ctx.palette().rgba(ctx.color());
        match self {
            Tool::Pencil(t) | Tool::Eraser(t) => {
                if let Some(at) = cursor {
                    out.push(crosshair(at, tip_size(&t.settings).unwrap_or(1)));
                }
            }
            Tool::Line(t) | Tool::Rect(t) | Tool::Ellipse(t) => {
                if let Some((a, b)) = t.drag
                    && let Ok(points) = t.pixels(a, b)
                {
                    out.push(Overlay::ShapePreview { points, rgba });
                }
                if let Some(at) = cursor {
                    out.push(crosshair(at, 1));
                }
            }
            Tool::Fill(_) | Tool::Shift(_) => {
                if let Some(at) = cursor {
                    out.push(crosshair(at, 1));
                }
            }
            Tool::Move(t) => {
                if let Some(lifted) = &t.lifted {
                    out.push(Overlay::FloatingPixels {
                        origin: lifted.origin,
                        pixels: lifted.scratch.clone(),
                    });
                }
            }
            Tool::Select(_) => {}
        }
        if matches!(self, Tool::Move(_) | Tool::Select(_))
            && let Some(selection) = ctx.selection()
        {
            out.push(Overlay::MarchingAnts(selection.normalized()));
        }
        out
    }
}

// ============================================================================
// TOOLBOX
// ============================================================================

/// One instance of every tool; exactly one is active.
pub struct Toolbox {
    tools: Vec<Tool>,
    active: ToolKind,
}

impl Toolbox {
    pub fn new(settings: &EditorSettings) -> DocResult<Self> {
        let tools = ToolKind::all()
            .iter()
            .map(|&kind| Tool::new(kind, settings))
            .collect::<DocResult<Vec<_>>>()?;
        Ok(Self {
            tools,
            active: ToolKind::default(),
        })
    }

    fn index(kind: ToolKind) -> usize {
        ToolKind::all().iter().position(|&k| k == kind).unwrap_or(0)
    }

    pub fn active_kind(&self) -> ToolKind {
        self.active
    }

    pub fn active(&self) -> &Tool {
        &self.tools[Self::index(self.active)]
    }

    pub fn active_mut(&mut self) -> &mut Tool {
        &mut self.tools[Self::index(self.active)]
    }

    pub fn tool(&self, kind: ToolKind) -> &Tool {
        &self.tools[Self::index(kind)]
    }

    /// Switch tools, finishing the previous tool's gesture first.
    pub fn change_tool(&mut self, kind: ToolKind, ctx: &mut ToolContext) -> DocResult<()> {
        if kind != self.active {
            self.active_mut().finish(ctx)?;
            self.active = kind;
        }
        Ok(())
    }

    /// Apply the editor's freehand commit policy to pencil and eraser.
    pub fn set_freehand_commit(&mut self, commit: FreehandCommit) {
        for tool in &mut self.tools {
            if let Tool::Pencil(t) | Tool::Eraser(t) = tool {
                t.set_commit_policy(commit);
            }
        }
    }
}
