use crate::error::{DocError, DocResult};
use crate::props::{Entity, EntityClass, PropDef, PropKind, PropValue};

/// Default frame display time in milliseconds.
pub const DEFAULT_FRAME_DURATION: i64 = 100;

fn format_percent(v: &PropValue) -> String {
    match v {
        PropValue::Float(f) => format!("{:.0}%", f * 100.0),
        other => other.to_string(),
    }
}

fn format_ms(v: &PropValue) -> String {
    match v {
        PropValue::Int(ms) => format!("{} ms", ms),
        other => other.to_string(),
    }
}

/// Properties every layer kind carries.
fn layer_common_defs(default_name: fn() -> PropValue) -> Vec<PropDef> {
    vec![
        PropDef::new("name", PropKind::Str, default_name),
        PropDef::new("opacity", PropKind::Float, || 1.0.into()).with_format(format_percent),
        PropDef::new("visible", PropKind::Bool, || true.into()),
    ]
}

fn clamp_opacity(opacity: f64) -> f64 {
    if opacity.is_finite() {
        opacity.clamp(0.0, 1.0)
    } else {
        1.0
    }
}

// ============================================================================
// PIXEL LAYER
// ============================================================================

/// A raster layer. Its pixels live in the owning image's buffer arena,
/// one buffer per frame.
#[derive(Clone, Debug, PartialEq)]
pub struct PixelLayer(Entity);

impl EntityClass for PixelLayer {
    const CLASS: &'static str = "PixelLayer";

    fn prop_defs() -> Vec<PropDef> {
        layer_common_defs(|| "Layer".into())
    }
}

impl PixelLayer {
    pub fn new(name: &str) -> DocResult<Self> {
        Ok(Self(Entity::of::<Self>(vec![("name", name.into())])?))
    }
}

// ============================================================================
// OBJECT LAYER
// ============================================================================

/// A layer of positioned vector objects. Has no pixel buffers.
#[derive(Clone, Debug, PartialEq)]
pub struct ObjectLayer(Entity);

impl EntityClass for ObjectLayer {
    const CLASS: &'static str = "ObjectLayer";

    fn prop_defs() -> Vec<PropDef> {
        let mut defs = layer_common_defs(|| "Objects".into());
        defs.push(
            PropDef::new("objects", PropKind::Entities, || PropValue::Entities(Vec::new()))
                .expandable()
                .watch_children(),
        );
        defs
    }
}

impl ObjectLayer {
    pub fn new(name: &str) -> DocResult<Self> {
        Ok(Self(Entity::of::<Self>(vec![("name", name.into())])?))
    }

    pub fn objects(&self) -> Vec<TextObject> {
        self.0
            .get_entities("objects")
            .unwrap_or_default()
            .into_iter()
            .filter(|e| e.is_class::<TextObject>())
            .map(TextObject)
            .collect()
    }

    pub fn add_object(&self, object: &TextObject) -> DocResult<()> {
        let mut list = self.0.get_entities("objects")?;
        list.push(object.0.clone());
        self.0.set("objects", list)
    }

    pub fn remove_object(&self, id: &str) -> DocResult<bool> {
        let mut list = self.0.get_entities("objects")?;
        let before = list.len();
        list.retain(|e| e.id() != id);
        if list.len() == before {
            return Ok(false);
        }
        self.0.set("objects", list)?;
        Ok(true)
    }
}

// ============================================================================
// LAYER
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LayerKind {
    Pixel,
    Object,
}

impl LayerKind {
    pub fn name(&self) -> &'static str {
        match self {
            LayerKind::Pixel => "pixel",
            LayerKind::Object => "object",
        }
    }
}

/// Closed set of layer kinds an image can hold.
#[derive(Clone, Debug, PartialEq)]
pub enum Layer {
    Pixel(PixelLayer),
    Object(ObjectLayer),
}

impl Layer {
    pub fn pixel(name: &str) -> DocResult<Self> {
        Ok(Layer::Pixel(PixelLayer::new(name)?))
    }

    pub fn object(name: &str) -> DocResult<Self> {
        Ok(Layer::Object(ObjectLayer::new(name)?))
    }

    /// Wrap an entity of one of the layer classes.
    pub fn from_entity(entity: Entity) -> DocResult<Self> {
        if entity.is_class::<PixelLayer>() {
            Ok(Layer::Pixel(PixelLayer(entity)))
        } else if entity.is_class::<ObjectLayer>() {
            Ok(Layer::Object(ObjectLayer(entity)))
        } else {
            Err(DocError::UnsupportedLayerKind(entity.class()))
        }
    }

    pub fn entity(&self) -> &Entity {
        match self {
            Layer::Pixel(l) => &l.0,
            Layer::Object(l) => &l.0,
        }
    }

    pub fn kind(&self) -> LayerKind {
        match self {
            Layer::Pixel(_) => LayerKind::Pixel,
            Layer::Object(_) => LayerKind::Object,
        }
    }

    pub fn is_pixel(&self) -> bool {
        matches!(self, Layer::Pixel(_))
    }

    pub fn id(&self) -> String {
        self.entity().id()
    }

    pub fn name(&self) -> String {
        self.entity().get_str("name").unwrap_or_default()
    }

    pub fn set_name(&self, name: &str) -> DocResult<()> {
        self.entity().set("name", name)
    }

    /// 0.0 (invisible) to 1.0 (opaque).
    pub fn opacity(&self) -> f64 {
        self.entity().get_float("opacity").unwrap_or(1.0)
    }

    pub fn set_opacity(&self, opacity: f64) -> DocResult<()> {
        self.entity().set("opacity", clamp_opacity(opacity))
    }

    pub fn visible(&self) -> bool {
        self.entity().get_bool("visible").unwrap_or(true)
    }

    pub fn set_visible(&self, visible: bool) -> DocResult<()> {
        self.entity().set("visible", visible)
    }
}

// ============================================================================
// FRAME
// ============================================================================

/// One animation step. Every pixel layer has one buffer per frame.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame(Entity);

impl EntityClass for Frame {
    const CLASS: &'static str = "Frame";

    fn prop_defs() -> Vec<PropDef> {
        vec![
            PropDef::new("name", PropKind::Str, || "Frame".into()),
            PropDef::new("group", PropKind::Str, || "".into()),
            PropDef::new("duration", PropKind::Int, || DEFAULT_FRAME_DURATION.into())
                .with_format(format_ms),
        ]
    }
}

impl Frame {
    pub fn new(name: &str, duration_ms: i64) -> DocResult<Self> {
        if duration_ms < 0 {
            return Err(DocError::InvalidArgument(format!(
                "frame duration {} ms",
                duration_ms
            )));
        }
        Ok(Self(Entity::of::<Self>(vec![
            ("name", name.into()),
            ("duration", duration_ms.into()),
        ])?))
    }

    pub fn from_entity(entity: Entity) -> DocResult<Self> {
        if entity.is_class::<Frame>() {
            Ok(Frame(entity))
        } else {
            Err(DocError::InvalidFormat(format!(
                "expected Frame, found {}",
                entity.class()
            )))
        }
    }

    pub fn entity(&self) -> &Entity {
        &self.0
    }

    pub fn id(&self) -> String {
        self.0.id()
    }

    pub fn name(&self) -> String {
        self.0.get_str("name").unwrap_or_default()
    }

    pub fn set_name(&self, name: &str) -> DocResult<()> {
        self.0.set("name", name)
    }

    /// Grouping tag, e.g. the animation this frame belongs to.
    pub fn group(&self) -> String {
        self.0.get_str("group").unwrap_or_default()
    }

    pub fn set_group(&self, group: &str) -> DocResult<()> {
        self.0.set("group", group)
    }

    pub fn duration(&self) -> i64 {
        self.0
            .get_int("duration")
            .unwrap_or(DEFAULT_FRAME_DURATION)
    }

    pub fn set_duration(&self, duration_ms: i64) -> DocResult<()> {
        if duration_ms < 0 {
            return Err(DocError::InvalidArgument(format!(
                "frame duration {} ms",
                duration_ms
            )));
        }
        self.0.set("duration", duration_ms)
    }
}

// ============================================================================
// TEXT OBJECT
// ============================================================================

#[derive(Clone, Debug, PartialEq)]
pub struct TextObject(Entity);

impl EntityClass for TextObject {
    const CLASS: &'static str = "TextObject";

    fn prop_defs() -> Vec<PropDef> {
        vec![
            PropDef::new("x", PropKind::Int, || 0.into()),
            PropDef::new("y", PropKind::Int, || 0.into()),
            PropDef::new("text", PropKind::Str, || "".into()),
            // Palette index.
            PropDef::new("color", PropKind::Int, || 0.into()),
        ]
    }
}

impl TextObject {
    pub fn new(x: i32, y: i32, text: &str, color: i32) -> DocResult<Self> {
        Ok(Self(Entity::of::<Self>(vec![
            ("x", x.into()),
            ("y", y.into()),
            ("text", text.into()),
            ("color", color.into()),
        ])?))
    }

    pub fn entity(&self) -> &Entity {
        &self.0
    }

    pub fn text(&self) -> String {
        self.0.get_str("text").unwrap_or_default()
    }

    pub fn position(&self) -> (i64, i64) {
        (
            self.0.get_int("x").unwrap_or(0),
            self.0.get_int("y").unwrap_or(0),
        )
    }

    pub fn set_position(&self, x: i32, y: i32) -> DocResult<()> {
        self.0.set("x", x)?;
        self.0.set("y", y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn layer_from_entity_dispatches_on_class() {
        let pixel = Layer::pixel("Ink").unwrap();
        let again = Layer::from_entity(pixel.entity().clone()).unwrap();
        assert_eq!(again.kind(), LayerKind::Pixel);
        assert_eq!(again.name(), "Ink");

        let frame = Frame::new("f", 100).unwrap();
        assert!(matches!(
            Layer::from_entity(frame.entity().clone()),
            Err(DocError::UnsupportedLayerKind(_))
        ));
    }

    #[test]
    fn opacity_clamped_and_formatted() {
        let layer = Layer::pixel("a").unwrap();
        layer.set_opacity(1.7).unwrap();
        assert_eq!(layer.opacity(), 1.0);
        layer.set_opacity(0.25).unwrap();
        assert_eq!(layer.entity().display("opacity").unwrap(), "25%");
    }

    #[test]
    fn object_layer_bubbles_text_changes() {
        let layer = ObjectLayer::new("Labels").unwrap();
        let text = TextObject::new(1, 2, "HP", 3).unwrap();
        layer.add_object(&text).unwrap();

        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        layer
            .0
            .subscribe_any(Rc::new(move |_: &Entity| h.set(h.get() + 1)));
        text.set_position(4, 4).unwrap();
        // x and y are two writes
        assert_eq!(hits.get(), 2);

        assert!(layer.remove_object(&text.entity().id()).unwrap());
        assert!(layer.objects().is_empty());
    }

    #[test]
    fn frame_rejects_negative_duration() {
        assert!(Frame::new("f", -1).is_err());
        let f = Frame::new("f", 80).unwrap();
        assert_eq!(f.entity().display("duration").unwrap(), "80 ms");
        assert_eq!(f.group(), "");
    }
}
