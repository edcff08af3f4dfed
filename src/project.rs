use std::cell::Cell;
use std::path::PathBuf;
use std::rc::Rc;

use uuid::Uuid;

use crate::components::colors::Palette;
use crate::components::layers::{Frame, Layer};
use crate::error::{DocError, DocResult};
use crate::props::{AnyListener, Entity, EntityClass, PropDef, PropKind, PropValue};
use crate::settings::EditorSettings;
use crate::sprite::SpriteImage;

/// Document root entity: project name and the shared palette.
pub struct Doc;

impl EntityClass for Doc {
    const CLASS: &'static str = "Doc";

    fn prop_defs() -> Vec<PropDef> {
        vec![
            PropDef::new("name", PropKind::Str, || "Untitled".into()),
            PropDef::new("palette", PropKind::Entity, || PropValue::Null)
                .expandable()
                .watch_children(),
        ]
    }
}

/// Single open document.
pub struct Project {
    pub id: Uuid,
    doc: Entity,
    images: Vec<SpriteImage>,
    /// `None` for unsaved/untitled files.
    pub path: Option<PathBuf>,
    dirty: Rc<Cell<bool>>,
    on_change: AnyListener,
}

impl Project {
    /// A fresh document with one image holding one layer and one frame.
    pub fn new_untitled(untitled_counter: usize, settings: &EditorSettings) -> DocResult<Self> {
        let palette = Palette::default_palette()?;
        let doc = Entity::of::<Doc>(vec![
            ("name", format!("Untitled-{}", untitled_counter).into()),
            ("palette", palette.entity().clone().into()),
        ])?;

        let mut image = SpriteImage::new("Sprite", settings.default_size())?;
        image.append_layer(Layer::pixel("Layer 1")?)?;
        image.append_frame(Frame::new("Frame 1", settings.default_frame_duration)?)?;

        let mut project = Self::from_parts(doc, Vec::new(), None)?;
        project.add_image(image);
        project.mark_clean();
        Ok(project)
    }

    /// Assemble a loaded document. Starts clean.
    pub fn from_parts(doc: Entity, images: Vec<SpriteImage>, path: Option<PathBuf>) -> DocResult<Self> {
        if !doc.is_class::<Doc>() {
            return Err(DocError::InvalidFormat(format!(
                "expected Doc, found {}",
                doc.class()
            )));
        }
        let dirty = Rc::new(Cell::new(false));
        let flag = Rc::clone(&dirty);
        let on_change: AnyListener = Rc::new(move |_: &Entity| flag.set(true));
        doc.subscribe_any(Rc::clone(&on_change));

        let mut project = Self {
            id: Uuid::new_v4(),
            doc,
            images: Vec::new(),
            path,
            dirty,
            on_change,
        };
        for image in images {
            project.add_image(image);
        }
        project.mark_clean();
        Ok(project)
    }

    pub fn doc(&self) -> &Entity {
        &self.doc
    }

    pub fn name(&self) -> String {
        self.doc.get_str("name").unwrap_or_default()
    }

    pub fn set_name(&self, name: &str) -> DocResult<()> {
        self.doc.set("name", name)
    }

    /// Tab title: the file name when saved, the document name otherwise,
    /// with a trailing `*` while there are unsaved changes.
    pub fn display_title(&self) -> String {
        let base = self
            .path
            .as_ref()
            .and_then(|p| p.file_name())
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| self.name());
        if self.is_dirty() {
            format!("{}*", base)
        } else {
            base
        }
    }

    /// The document palette; a document saved without one gets the default.
    pub fn palette(&self) -> DocResult<Palette> {
        match self.doc.get_entity("palette")? {
            Some(entity) => Palette::from_entity(entity),
            None => Palette::default_palette(),
        }
    }

    pub fn set_palette(&self, palette: &Palette) -> DocResult<()> {
        self.doc.set("palette", palette.entity().clone())
    }

    pub fn images(&self) -> &[SpriteImage] {
        &self.images
    }

    pub fn image(&self, index: usize) -> Option<&SpriteImage> {
        self.images.get(index)
    }

    pub fn image_mut(&mut self, index: usize) -> Option<&mut SpriteImage> {
        self.images.get_mut(index)
    }

    /// Add an image; its edits mark the project dirty from now on.
    pub fn add_image(&mut self, image: SpriteImage) -> usize {
        image.entity().subscribe_any(Rc::clone(&self.on_change));
        self.images.push(image);
        self.dirty.set(true);
        self.images.len() - 1
    }

    pub fn remove_image(&mut self, index: usize) -> DocResult<SpriteImage> {
        if index >= self.images.len() {
            return Err(DocError::InvalidArgument(format!(
                "image index {} (have {})",
                index,
                self.images.len()
            )));
        }
        let image = self.images.remove(index);
        image.entity().unsubscribe_any(&self.on_change);
        self.dirty.set(true);
        Ok(image)
    }

    pub fn mark_dirty(&self) {
        self.dirty.set(true);
    }

    pub fn mark_clean(&self) {
        self.dirty.set(false);
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.get()
    }
}
