//! The layered, framed sprite image.
//!
//! A [`SpriteImage`] is an `SImage` entity (name, size, layers, frames) plus
//! the two things that are not plain properties: the [`BufferArena`] holding
//! one raster buffer per (pixel layer, frame) pair, and the image's
//! [`HistoryManager`].

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::canvas::{BufferKey, BufferSnapshot, PixelSurface, RasterBuffer, RasterJson, Size, Surface};
use crate::components::history::{AreaChange, Command, HistoryManager};
use crate::components::layers::{DEFAULT_FRAME_DURATION, Frame, Layer};
use crate::error::{DocError, DocResult};
use crate::props::{Entity, EntityClass, PropDef, PropKind, PropValue, deserialize_entity};
use crate::registry::ClassRegistry;
use crate::{log_info, log_warn};

// ============================================================================
// BUFFER ARENA
// ============================================================================

/// Raster buffers keyed by (layer id, frame id), all of one size.
///
/// Buffers are created on first access by [`materialize`](Self::materialize);
/// a missing entry reads as fully transparent.
#[derive(Clone, Debug)]
pub struct BufferArena {
    size: Size,
    buffers: HashMap<BufferKey, RasterBuffer>,
}

impl BufferArena {
    pub fn new(size: Size) -> Self {
        Self {
            size,
            buffers: HashMap::new(),
        }
    }

    pub fn size(&self) -> Size {
        self.size
    }

    /// The buffer for `key`, created transparent if absent.
    pub fn materialize(&mut self, key: &BufferKey) -> &mut RasterBuffer {
        let size = self.size;
        self.buffers
            .entry(key.clone())
            .or_insert_with(|| RasterBuffer::new(size))
    }

    pub fn get(&self, key: &BufferKey) -> Option<&RasterBuffer> {
        self.buffers.get(key)
    }

    pub fn get_mut(&mut self, key: &BufferKey) -> Option<&mut RasterBuffer> {
        self.buffers.get_mut(key)
    }

    pub fn contains(&self, key: &BufferKey) -> bool {
        self.buffers.contains_key(key)
    }

    pub fn insert(&mut self, key: BufferKey, buffer: RasterBuffer) -> DocResult<()> {
        let found = buffer.size();
        if found != self.size {
            return Err(DocError::SizeMismatch {
                expected: (self.size.w, self.size.h),
                found: (found.w, found.h),
            });
        }
        self.buffers.insert(key, buffer);
        Ok(())
    }

    pub fn remove_layer(&mut self, layer_id: &str) {
        self.buffers.retain(|k, _| k.layer != layer_id);
    }

    pub fn remove_frame(&mut self, frame_id: &str) {
        self.buffers.retain(|k, _| k.frame != frame_id);
    }

    /// Resize every buffer: overlapping content kept, new area transparent.
    pub fn resize(&mut self, size: Size) {
        for buffer in self.buffers.values_mut() {
            *buffer = buffer.resized(size);
        }
        self.size = size;
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &BufferKey> {
        self.buffers.keys()
    }
}

// ============================================================================
// SPRITE IMAGE
// ============================================================================

pub struct SpriteImage {
    entity: Entity,
    buffers: BufferArena,
    history: HistoryManager,
}

impl EntityClass for SpriteImage {
    const CLASS: &'static str = "SImage";

    fn prop_defs() -> Vec<PropDef> {
        vec![
            PropDef::new("name", PropKind::Str, || "Sprite".into()),
            PropDef::new("size", PropKind::Size, || Size::new(32, 32).into()).read_only(),
            PropDef::new("layers", PropKind::Entities, || PropValue::Entities(Vec::new()))
                .hidden()
                .expandable()
                .watch_children(),
            PropDef::new("frames", PropKind::Entities, || PropValue::Entities(Vec::new()))
                .hidden()
                .expandable()
                .watch_children(),
        ]
    }
}

fn check_size(size: Size) -> DocResult<()> {
    if size.is_empty() {
        return Err(DocError::InvalidArgument(format!(
            "image size {}×{}",
            size.w, size.h
        )));
    }
    Ok(())
}

fn move_item(list: &mut Vec<Entity>, from: usize, to: usize, what: &str) -> DocResult<()> {
    if from >= list.len() || to >= list.len() {
        return Err(DocError::InvalidArgument(format!(
            "cannot move {} {} to {} (have {})",
            what,
            from,
            to,
            list.len()
        )));
    }
    let item = list.remove(from);
    list.insert(to, item);
    Ok(())
}

impl SpriteImage {
    /// An image with no layers and no frames.
    pub fn new(name: &str, size: Size) -> DocResult<Self> {
        check_size(size)?;
        let entity = Entity::of::<Self>(vec![("name", name.into()), ("size", size.into())])?;
        Ok(Self {
            entity,
            buffers: BufferArena::new(size),
            history: HistoryManager::new(),
        })
    }

    /// The image's property entity; subscribe here for change notifications.
    pub fn entity(&self) -> &Entity {
        &self.entity
    }

    pub fn id(&self) -> String {
        self.entity.id()
    }

    pub fn name(&self) -> String {
        self.entity.get_str("name").unwrap_or_default()
    }

    pub fn set_name(&self, name: &str) -> DocResult<()> {
        self.entity.set("name", name)
    }

    pub fn size(&self) -> Size {
        self.buffers.size()
    }

    /// Layers bottom to top.
    pub fn layers(&self) -> Vec<Layer> {
        self.entity
            .get_entities("layers")
            .unwrap_or_default()
            .into_iter()
            .filter_map(|e| Layer::from_entity(e).ok())
            .collect()
    }

    pub fn frames(&self) -> Vec<Frame> {
        self.entity
            .get_entities("frames")
            .unwrap_or_default()
            .into_iter()
            .filter_map(|e| Frame::from_entity(e).ok())
            .collect()
    }

    pub fn layer(&self, id: &str) -> Option<Layer> {
        self.layers().into_iter().find(|l| l.id() == id)
    }

    pub fn frame(&self, id: &str) -> Option<Frame> {
        self.frames().into_iter().find(|f| f.id() == id)
    }

    pub fn layer_index(&self, id: &str) -> Option<usize> {
        self.layers().iter().position(|l| l.id() == id)
    }

    pub fn frame_index(&self, id: &str) -> Option<usize> {
        self.frames().iter().position(|f| f.id() == id)
    }

    pub fn append_layer(&mut self, layer: Layer) -> DocResult<()> {
        let mut list = self.entity.get_entities("layers")?;
        list.push(layer.entity().clone());
        self.entity.set("layers", list)
    }

    pub fn append_frame(&mut self, frame: Frame) -> DocResult<()> {
        let mut list = self.entity.get_entities("frames")?;
        list.push(frame.entity().clone());
        self.entity.set("frames", list)
    }

    /// Append `Frame N` with the default duration. Its buffers are created lazily.
    pub fn add_empty_frame(&mut self) -> DocResult<Frame> {
        let frame = Frame::new(
            &format!("Frame {}", self.frames().len() + 1),
            DEFAULT_FRAME_DURATION,
        )?;
        self.append_frame(frame.clone())?;
        Ok(frame)
    }

    /// Reorder layers. Buffers are keyed by id, so all stay addressable.
    pub fn move_layer(&mut self, from: usize, to: usize) -> DocResult<()> {
        let mut list = self.entity.get_entities("layers")?;
        move_item(&mut list, from, to, "layer")?;
        self.entity.set("layers", list)
    }

    pub fn move_frame(&mut self, from: usize, to: usize) -> DocResult<()> {
        let mut list = self.entity.get_entities("frames")?;
        move_item(&mut list, from, to, "frame")?;
        self.entity.set("frames", list)
    }

    /// Remove a layer and every buffer it owned.
    pub fn remove_layer(&mut self, id: &str) -> DocResult<Layer> {
        let mut list = self.entity.get_entities("layers")?;
        let index = list
            .iter()
            .position(|e| e.id() == id)
            .ok_or_else(|| DocError::UnknownLayer(id.to_string()))?;
        let removed = Layer::from_entity(list.remove(index))?;
        self.buffers.remove_layer(id);
        self.entity.set("layers", list)?;
        Ok(removed)
    }

    /// Remove a frame and every layer's buffer for it.
    pub fn remove_frame(&mut self, id: &str) -> DocResult<Frame> {
        let mut list = self.entity.get_entities("frames")?;
        let index = list
            .iter()
            .position(|e| e.id() == id)
            .ok_or_else(|| DocError::UnknownFrame(id.to_string()))?;
        let removed = Frame::from_entity(list.remove(index))?;
        self.buffers.remove_frame(id);
        self.entity.set("frames", list)?;
        Ok(removed)
    }

    /// Validate a (layer, frame) pair for pixel access.
    pub fn pixel_key(&self, layer_id: &str, frame_id: &str) -> DocResult<BufferKey> {
        let layer = self
            .layer(layer_id)
            .ok_or_else(|| DocError::UnknownLayer(layer_id.to_string()))?;
        if !layer.is_pixel() {
            return Err(DocError::UnsupportedLayerKind(layer.kind().name().to_string()));
        }
        if self.frame(frame_id).is_none() {
            return Err(DocError::UnknownFrame(frame_id.to_string()));
        }
        Ok(BufferKey::new(layer_id, frame_id))
    }

    /// Surface over the buffer of `(layer_id, frame_id)`, creating it if needed.
    ///
    /// Writes through the surface do not notify; call
    /// [`commit_change`](Self::commit_change) or [`mark_changed`](Self::mark_changed)
    /// afterwards.
    pub fn get_pixel_surface(&mut self, layer_id: &str, frame_id: &str) -> DocResult<PixelSurface<'_>> {
        let key = self.pixel_key(layer_id, frame_id)?;
        let buffer = self.buffers.materialize(&key);
        Ok(PixelSurface::new(key, buffer))
    }

    pub(crate) fn surface_for(&mut self, key: &BufferKey) -> PixelSurface<'_> {
        let buffer = self.buffers.materialize(key);
        PixelSurface::new(key.clone(), buffer)
    }

    /// Read-only buffer access for renderers. `None` means never written (transparent).
    pub fn buffer(&self, layer_id: &str, frame_id: &str) -> Option<&RasterBuffer> {
        self.buffers.get(&BufferKey::new(layer_id, frame_id))
    }

    pub fn buffers(&self) -> &BufferArena {
        &self.buffers
    }

    /// Keys of every (pixel layer, frame) pair, layers outer, in display order.
    pub fn pixel_keys(&self) -> Vec<BufferKey> {
        let frames = self.frames();
        self.layers()
            .iter()
            .filter(|l| l.is_pixel())
            .flat_map(|l| {
                let layer_id = l.id();
                frames
                    .iter()
                    .map(move |f| BufferKey::new(layer_id.clone(), f.id()))
            })
            .collect()
    }

    /// Resize every buffer, then publish the new size.
    ///
    /// Not recorded in history: records captured at the old size fail to
    /// undo with `SizeMismatch` afterwards.
    pub fn resize(&mut self, size: Size) -> DocResult<()> {
        check_size(size)?;
        if size == self.size() {
            return Ok(());
        }
        self.buffers.resize(size);
        self.entity.set_owned("size", size)
    }

    pub fn history(&self) -> &HistoryManager {
        &self.history
    }

    pub fn undo(&mut self) -> DocResult<Option<String>> {
        let done = self.history.undo(&mut self.buffers)?;
        if let Some(desc) = &done {
            log_info!("Undo: {}", desc);
        }
        self.entity.notify_any();
        Ok(done)
    }

    pub fn redo(&mut self) -> DocResult<Option<String>> {
        let done = self.history.redo(&mut self.buffers)?;
        if let Some(desc) = &done {
            log_info!("Redo: {}", desc);
        }
        self.entity.notify_any();
        Ok(done)
    }

    /// Append an already applied edit; the redoable tail is discarded.
    pub fn append_history(&mut self, command: Box<dyn Command>) {
        self.history.push(command);
        self.entity.notify_any();
    }

    /// Record the edit of `key` since `before` was captured.
    ///
    /// Returns `false` (and records nothing) when no pixel changed.
    pub fn commit_change(
        &mut self,
        key: &BufferKey,
        before: BufferSnapshot,
        label: &str,
    ) -> DocResult<bool> {
        let after = self.buffers.materialize(key).clone_data();
        let change = AreaChange::new(key.clone(), before, after, label);
        if change.is_noop() {
            return Ok(false);
        }
        self.append_history(Box::new(change));
        Ok(true)
    }

    /// Notify observers that pixels changed without a history record.
    pub fn mark_changed(&self) {
        self.entity.notify_any();
    }

    /// Entity envelope plus a `buffers` map keyed `"<layerId>_<frameId>"`.
    pub fn serialize(&self, registry: &ClassRegistry, omit_empty: bool) -> DocResult<Value> {
        let mut json = self.entity.serialize(registry)?;
        let mut buffers = Map::new();
        for key in self.pixel_keys() {
            let Some(buffer) = self.buffers.get(&key) else { continue };
            if omit_empty && buffer.is_blank() {
                continue;
            }
            buffers.insert(key.storage_key(), serde_json::to_value(buffer.to_json())?);
        }
        if let Value::Object(map) = &mut json {
            map.insert("buffers".to_string(), Value::Object(buffers));
        }
        Ok(json)
    }

    /// Rebuild an image. Buffers absent from the file are recreated on first access.
    pub fn deserialize(registry: &ClassRegistry, json: &Value) -> DocResult<Self> {
        let entity = deserialize_entity(registry, json)?;
        if !entity.is_class::<SpriteImage>() {
            return Err(DocError::InvalidFormat(format!(
                "expected SImage, found {}",
                entity.class()
            )));
        }
        let size = entity.get_size("size")?;
        check_size(size)?;

        let mut image = Self {
            entity,
            buffers: BufferArena::new(size),
            history: HistoryManager::new(),
        };

        let known: HashMap<String, BufferKey> = image
            .pixel_keys()
            .into_iter()
            .map(|k| (k.storage_key(), k))
            .collect();

        if let Some(Value::Object(stored)) = json.get("buffers") {
            for (name, raw) in stored {
                let Some(key) = known.get(name) else {
                    log_warn!("Image {}: ignoring buffer for unknown key '{}'", image.id(), name);
                    continue;
                };
                let buffer = RasterBuffer::from_json(RasterJson::deserialize(raw)?)?;
                image.buffers.insert(key.clone(), buffer)?;
            }
        }
        Ok(image)
    }
}
