//! Class registry for polymorphic entity (de)serialization.
//!
//! Maps the `class` string stored in an entity envelope to the property
//! definitions used to rebuild it. Old class names found in earlier project
//! files are remapped through [`LEGACY_CLASS_NAMES`] before lookup.
//!
//! There is no global instance: build one with
//! [`ClassRegistry::with_builtin_classes`] at start-up and pass it to every
//! serialize / deserialize call.

use std::collections::HashMap;
use std::rc::Rc;

use crate::components::colors::Palette;
use crate::components::layers::{Frame, ObjectLayer, PixelLayer, TextObject};
use crate::error::{DocError, DocResult};
use crate::log_info;
use crate::project::Doc;
use crate::props::{Entity, EntityClass, PropDef, PropValue};
use crate::sprite::SpriteImage;

/// Old serialized class name → current name.
pub const LEGACY_CLASS_NAMES: &[(&str, &str)] = &[
    ("Doc2", "Doc"),
    ("SImage2", "SImage"),
    ("ImageLayer", "PixelLayer"),
    ("AnimFrame", "Frame"),
];

/// A registered class: its serialization name and property definitions.
#[derive(Clone, Debug)]
pub struct ClassInfo {
    name: &'static str,
    defs: Rc<[PropDef]>,
}

impl ClassInfo {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn defs(&self) -> Rc<[PropDef]> {
        Rc::clone(&self.defs)
    }
}

#[derive(Default)]
pub struct ClassRegistry {
    classes: HashMap<&'static str, ClassInfo>,
}

impl ClassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every document class of the editor.
    pub fn with_builtin_classes() -> DocResult<Self> {
        let mut registry = Self::new();
        registry.register_class::<SpriteImage>()?;
        registry.register_class::<PixelLayer>()?;
        registry.register_class::<ObjectLayer>()?;
        registry.register_class::<Frame>()?;
        registry.register_class::<TextObject>()?;
        registry.register_class::<Palette>()?;
        registry.register_class::<Doc>()?;
        Ok(registry)
    }

    pub fn register(&mut self, name: &'static str, defs: fn() -> Vec<PropDef>) -> DocResult<()> {
        if self.classes.contains_key(name) {
            return Err(DocError::DuplicateClass(name.to_string()));
        }
        self.classes.insert(
            name,
            ClassInfo {
                name,
                defs: defs().into(),
            },
        );
        Ok(())
    }

    pub fn register_class<T: EntityClass>(&mut self) -> DocResult<()> {
        self.register(T::CLASS, T::prop_defs)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&ClassInfo> {
        self.classes.get(name)
    }

    /// Look up `name`, applying the legacy remap first.
    pub fn resolve(&self, name: &str) -> DocResult<&ClassInfo> {
        let current = match LEGACY_CLASS_NAMES.iter().find(|(old, _)| *old == name) {
            Some((old, new)) => {
                log_info!("Remapping legacy class '{}' to '{}'", old, new);
                *new
            }
            None => name,
        };
        self.classes
            .get(current)
            .ok_or_else(|| DocError::UnregisteredClass(current.to_string()))
    }

    /// Fresh entity of a registered class, using the class's shared definitions.
    pub fn instantiate(&self, name: &str, initial: Vec<(&str, PropValue)>) -> DocResult<Entity> {
        let info = self.resolve(name)?;
        Entity::new(info.name, info.defs(), initial)
    }
}
