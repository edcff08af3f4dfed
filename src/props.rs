//! Observable typed property records.
//!
//! An [`Entity`] is a shared handle to a property bag whose keys are fixed by
//! a list of [`PropDef`]s. Writes fire per-property listeners, then the
//! entity's any-change listeners. A property defined with
//! [`PropDef::watch_children`] also re-fires the parent's any-change event
//! whenever one of the child entities stored in it changes.
//!
//! Entities serialize to `{ "class", "id", "props" }` envelopes and come back
//! through [`deserialize_entity`] using a [`ClassRegistry`].

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::canvas::{Point, Size};
use crate::error::{DocError, DocResult};
use crate::registry::ClassRegistry;
use crate::log_warn;

pub type PropListener = Rc<dyn Fn(&PropValue)>;
pub type AnyListener = Rc<dyn Fn(&Entity)>;

pub type Encoder = fn(&PropValue, &ClassRegistry) -> DocResult<Value>;
pub type Decoder = fn(&Value, &ClassRegistry) -> DocResult<PropValue>;
pub type Formatter = fn(&PropValue) -> String;

// ============================================================================
// VALUES
// ============================================================================

/// Type tag of a property definition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PropKind {
    Bool,
    Int,
    Float,
    Str,
    Point,
    Size,
    IntList,
    /// A single child entity, or `Null`.
    Entity,
    Entities,
}

impl PropKind {
    pub fn accepts(&self, value: &PropValue) -> bool {
        matches!(
            (self, value),
            (PropKind::Bool, PropValue::Bool(_))
                | (PropKind::Int, PropValue::Int(_))
                | (PropKind::Float, PropValue::Float(_))
                | (PropKind::Str, PropValue::Str(_))
                | (PropKind::Point, PropValue::Point(_))
                | (PropKind::Size, PropValue::Size(_))
                | (PropKind::IntList, PropValue::IntList(_))
                | (PropKind::Entity, PropValue::Entity(_))
                | (PropKind::Entity, PropValue::Null)
                | (PropKind::Entities, PropValue::Entities(_))
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            PropKind::Bool => "bool",
            PropKind::Int => "int",
            PropKind::Float => "float",
            PropKind::Str => "string",
            PropKind::Point => "point",
            PropKind::Size => "size",
            PropKind::IntList => "int list",
            PropKind::Entity => "entity",
            PropKind::Entities => "entity list",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum PropValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Point(Point),
    Size(Size),
    IntList(Vec<i64>),
    Entity(Entity),
    Entities(Vec<Entity>),
}

impl PropValue {
    /// Child entities for change watching: every element of a list, or the
    /// single entity.
    fn children(&self) -> &[Entity] {
        match self {
            PropValue::Entities(list) => list,
            PropValue::Entity(e) => std::slice::from_ref(e),
            _ => &[],
        }
    }

    /// Default JSON encoding for the value's variant.
    pub fn to_json(&self, registry: &ClassRegistry) -> DocResult<Value> {
        Ok(match self {
            PropValue::Null => Value::Null,
            PropValue::Bool(b) => Value::Bool(*b),
            PropValue::Int(i) => Value::from(*i),
            PropValue::Float(f) => Value::from(*f),
            PropValue::Str(s) => Value::String(s.clone()),
            PropValue::Point(p) => serde_json::to_value(p)?,
            PropValue::Size(s) => serde_json::to_value(s)?,
            PropValue::IntList(list) => Value::from(list.clone()),
            PropValue::Entity(e) => e.serialize(registry)?,
            PropValue::Entities(list) => Value::Array(
                list.iter()
                    .map(|e| e.serialize(registry))
                    .collect::<DocResult<Vec<_>>>()?,
            ),
        })
    }

    /// Default JSON decoding for a definition of `kind`.
    pub fn from_json(kind: PropKind, json: &Value, registry: &ClassRegistry) -> DocResult<Self> {
        let bad = || DocError::InvalidFormat(format!("expected {}, found {}", kind.name(), json));
        Ok(match kind {
            PropKind::Bool => PropValue::Bool(json.as_bool().ok_or_else(bad)?),
            PropKind::Int => PropValue::Int(json.as_i64().ok_or_else(bad)?),
            PropKind::Float => PropValue::Float(json.as_f64().ok_or_else(bad)?),
            PropKind::Str => PropValue::Str(json.as_str().ok_or_else(bad)?.to_string()),
            PropKind::Point => PropValue::Point(serde_json::from_value(json.clone())?),
            PropKind::Size => PropValue::Size(serde_json::from_value(json.clone())?),
            PropKind::IntList => PropValue::IntList(
                json.as_array()
                    .ok_or_else(bad)?
                    .iter()
                    .map(|v| v.as_i64().ok_or_else(bad))
                    .collect::<DocResult<Vec<_>>>()?,
            ),
            PropKind::Entity => {
                if json.is_null() {
                    PropValue::Null
                } else {
                    PropValue::Entity(deserialize_entity(registry, json)?)
                }
            }
            PropKind::Entities => PropValue::Entities(
                json.as_array()
                    .ok_or_else(bad)?
                    .iter()
                    .map(|v| deserialize_entity(registry, v))
                    .collect::<DocResult<Vec<_>>>()?,
            ),
        })
    }
}

impl fmt::Display for PropValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropValue::Null => Ok(()),
            PropValue::Bool(b) => write!(f, "{}", b),
            PropValue::Int(i) => write!(f, "{}", i),
            PropValue::Float(v) => write!(f, "{}", v),
            PropValue::Str(s) => f.write_str(s),
            PropValue::Point(p) => write!(f, "({}, {})", p.x, p.y),
            PropValue::Size(s) => write!(f, "{}×{}", s.w, s.h),
            PropValue::IntList(list) => write!(f, "[{} values]", list.len()),
            PropValue::Entity(e) => write!(f, "{}", e.class()),
            PropValue::Entities(list) => write!(f, "{} items", list.len()),
        }
    }
}

impl From<bool> for PropValue {
    fn from(v: bool) -> Self {
        PropValue::Bool(v)
    }
}

impl From<i64> for PropValue {
    fn from(v: i64) -> Self {
        PropValue::Int(v)
    }
}

impl From<i32> for PropValue {
    fn from(v: i32) -> Self {
        PropValue::Int(v as i64)
    }
}

impl From<f64> for PropValue {
    fn from(v: f64) -> Self {
        PropValue::Float(v)
    }
}

impl From<&str> for PropValue {
    fn from(v: &str) -> Self {
        PropValue::Str(v.to_string())
    }
}

impl From<String> for PropValue {
    fn from(v: String) -> Self {
        PropValue::Str(v)
    }
}

impl From<Point> for PropValue {
    fn from(v: Point) -> Self {
        PropValue::Point(v)
    }
}

impl From<Size> for PropValue {
    fn from(v: Size) -> Self {
        PropValue::Size(v)
    }
}

impl From<Entity> for PropValue {
    fn from(v: Entity) -> Self {
        PropValue::Entity(v)
    }
}

impl From<Vec<Entity>> for PropValue {
    fn from(v: Vec<Entity>) -> Self {
        PropValue::Entities(v)
    }
}

// ============================================================================
// DEFINITIONS
// ============================================================================

/// Declarative rules for one property: type, default, codec, display format
/// and inspector flags.
#[derive(Clone)]
pub struct PropDef {
    name: &'static str,
    kind: PropKind,
    default: fn() -> PropValue,
    encode: Option<Encoder>,
    decode: Option<Decoder>,
    format: Option<Formatter>,
    editable: bool,
    hidden: bool,
    expandable: bool,
    watch_children: bool,
    skip_persist: bool,
}

impl PropDef {
    pub fn new(name: &'static str, kind: PropKind, default: fn() -> PropValue) -> Self {
        Self {
            name,
            kind,
            default,
            encode: None,
            decode: None,
            format: None,
            editable: true,
            hidden: false,
            expandable: false,
            watch_children: false,
            skip_persist: false,
        }
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    pub fn read_only(mut self) -> Self {
        self.editable = false;
        self
    }

    pub fn expandable(mut self) -> Self {
        self.expandable = true;
        self
    }

    pub fn watch_children(mut self) -> Self {
        self.watch_children = true;
        self
    }

    pub fn skip_persist(mut self) -> Self {
        self.skip_persist = true;
        self
    }

    pub fn with_codec(mut self, encode: Encoder, decode: Decoder) -> Self {
        self.encode = Some(encode);
        self.decode = Some(decode);
        self
    }

    pub fn with_format(mut self, format: Formatter) -> Self {
        self.format = Some(format);
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn kind(&self) -> PropKind {
        self.kind
    }

    pub fn default_value(&self) -> PropValue {
        (self.default)()
    }

    pub fn is_editable(&self) -> bool {
        self.editable
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    pub fn is_expandable(&self) -> bool {
        self.expandable
    }

    pub fn watches_children(&self) -> bool {
        self.watch_children
    }

    pub fn skips_persist(&self) -> bool {
        self.skip_persist
    }

    pub fn encode(&self, value: &PropValue, registry: &ClassRegistry) -> DocResult<Value> {
        match self.encode {
            Some(encode) => encode(value, registry),
            None => value.to_json(registry),
        }
    }

    pub fn decode(&self, json: &Value, registry: &ClassRegistry) -> DocResult<PropValue> {
        match self.decode {
            Some(decode) => decode(json, registry),
            None => PropValue::from_json(self.kind, json, registry),
        }
    }

    pub fn format(&self, value: &PropValue) -> String {
        match self.format {
            Some(format) => format(value),
            None => value.to_string(),
        }
    }
}

impl fmt::Debug for PropDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropDef")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// Implemented by typed wrappers around an [`Entity`] of one class.
pub trait EntityClass {
    const CLASS: &'static str;

    fn prop_defs() -> Vec<PropDef>;
}

// ============================================================================
// ENTITY
// ============================================================================

struct Props {
    class: String,
    id: String,
    defs: Rc<[PropDef]>,
    values: HashMap<&'static str, PropValue>,
    listeners: HashMap<&'static str, Vec<PropListener>>,
    any_listeners: Vec<AnyListener>,
    /// Children we subscribed to, per watched property, so the exact
    /// listener can be removed again when the property is replaced.
    child_watch: HashMap<&'static str, Vec<(Entity, AnyListener)>>,
}

impl Props {
    fn def(&self, name: &str) -> Option<&PropDef> {
        self.defs.iter().find(|d| d.name == name)
    }
}

/// Shared handle to an observable property record.
///
/// Cloning the handle does not copy the record. Equality is identity.
#[derive(Clone)]
pub struct Entity(Rc<RefCell<Props>>);

/// Non-owning handle, used by children to reach a watching parent.
#[derive(Clone)]
pub struct WeakEntity(Weak<RefCell<Props>>);

impl WeakEntity {
    pub fn upgrade(&self) -> Option<Entity> {
        self.0.upgrade().map(Entity)
    }
}

#[derive(Serialize)]
struct EntityEnvelope<'a> {
    class: &'a str,
    id: &'a str,
    props: Map<String, Value>,
}

impl Entity {
    /// Create an entity; properties missing from `initial` take their default.
    pub fn new(
        class: &str,
        defs: impl Into<Rc<[PropDef]>>,
        initial: Vec<(&str, PropValue)>,
    ) -> DocResult<Self> {
        let defs: Rc<[PropDef]> = defs.into();
        let mut values: HashMap<&'static str, PropValue> =
            defs.iter().map(|d| (d.name, d.default_value())).collect();

        for (name, value) in initial {
            let def = defs
                .iter()
                .find(|d| d.name == name)
                .ok_or_else(|| DocError::UnknownProperty(name.to_string()))?;
            check_kind(def, &value)?;
            values.insert(def.name, value);
        }

        Ok(Self::from_values(class, defs, values))
    }

    /// Create an entity of a typed class.
    pub fn of<T: EntityClass>(initial: Vec<(&str, PropValue)>) -> DocResult<Self> {
        Self::new(T::CLASS, T::prop_defs(), initial)
    }

    fn from_values(
        class: &str,
        defs: Rc<[PropDef]>,
        values: HashMap<&'static str, PropValue>,
    ) -> Self {
        let entity = Entity(Rc::new(RefCell::new(Props {
            class: class.to_string(),
            id: Uuid::new_v4().to_string(),
            defs: Rc::clone(&defs),
            values,
            listeners: HashMap::new(),
            any_listeners: Vec::new(),
            child_watch: HashMap::new(),
        })));

        for def in defs.iter().filter(|d| d.watch_children) {
            let value = entity.0.borrow().values.get(def.name).cloned();
            if let Some(value) = value {
                entity.watch_children(def.name, &value);
            }
        }
        entity
    }

    pub fn id(&self) -> String {
        self.0.borrow().id.clone()
    }

    pub(crate) fn set_id(&self, id: &str) {
        self.0.borrow_mut().id = id.to_string();
    }

    pub fn class(&self) -> String {
        self.0.borrow().class.clone()
    }

    pub fn is_class<T: EntityClass>(&self) -> bool {
        self.0.borrow().class == T::CLASS
    }

    pub fn defs(&self) -> Rc<[PropDef]> {
        Rc::clone(&self.0.borrow().defs)
    }

    pub fn def(&self, name: &str) -> DocResult<PropDef> {
        self.0
            .borrow()
            .def(name)
            .cloned()
            .ok_or_else(|| DocError::UnknownProperty(name.to_string()))
    }

    /// Definitions an inspector should show.
    pub fn visible_defs(&self) -> Vec<PropDef> {
        self.defs().iter().filter(|d| !d.hidden).cloned().collect()
    }

    pub fn ptr_eq(&self, other: &Entity) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn downgrade(&self) -> WeakEntity {
        WeakEntity(Rc::downgrade(&self.0))
    }

    pub fn get(&self, name: &str) -> DocResult<PropValue> {
        self.0
            .borrow()
            .values
            .get(name)
            .cloned()
            .ok_or_else(|| DocError::UnknownProperty(name.to_string()))
    }

    pub fn get_bool(&self, name: &str) -> DocResult<bool> {
        match self.get(name)? {
            PropValue::Bool(v) => Ok(v),
            other => Err(wrong_type(name, "bool", &other)),
        }
    }

    pub fn get_int(&self, name: &str) -> DocResult<i64> {
        match self.get(name)? {
            PropValue::Int(v) => Ok(v),
            other => Err(wrong_type(name, "int", &other)),
        }
    }

    pub fn get_float(&self, name: &str) -> DocResult<f64> {
        match self.get(name)? {
            PropValue::Float(v) => Ok(v),
            PropValue::Int(v) => Ok(v as f64),
            other => Err(wrong_type(name, "float", &other)),
        }
    }

    pub fn get_str(&self, name: &str) -> DocResult<String> {
        match self.get(name)? {
            PropValue::Str(v) => Ok(v),
            other => Err(wrong_type(name, "string", &other)),
        }
    }

    pub fn get_size(&self, name: &str) -> DocResult<Size> {
        match self.get(name)? {
            PropValue::Size(v) => Ok(v),
            other => Err(wrong_type(name, "size", &other)),
        }
    }

    pub fn get_int_list(&self, name: &str) -> DocResult<Vec<i64>> {
        match self.get(name)? {
            PropValue::IntList(v) => Ok(v),
            other => Err(wrong_type(name, "int list", &other)),
        }
    }

    pub fn get_entity(&self, name: &str) -> DocResult<Option<Entity>> {
        match self.get(name)? {
            PropValue::Entity(e) => Ok(Some(e)),
            PropValue::Null => Ok(None),
            other => Err(wrong_type(name, "entity", &other)),
        }
    }

    pub fn get_entities(&self, name: &str) -> DocResult<Vec<Entity>> {
        match self.get(name)? {
            PropValue::Entities(v) => Ok(v),
            other => Err(wrong_type(name, "entity list", &other)),
        }
    }

    /// Current value rendered with the definition's format function.
    pub fn display(&self, name: &str) -> DocResult<String> {
        let def = self.def(name)?;
        Ok(def.format(&self.get(name)?))
    }

    /// Store `value`, re-wire child watching if the definition asks for it,
    /// then notify `name` listeners followed by any-change listeners.
    ///
    /// Read-only properties are rejected; their owning type keeps them in
    /// step with its own state through [`set_owned`](Self::set_owned).
    pub fn set(&self, name: &str, value: impl Into<PropValue>) -> DocResult<()> {
        if !self.def(name)?.is_editable() {
            return Err(DocError::InvalidArgument(format!(
                "property '{}' is read-only",
                name
            )));
        }
        self.set_owned(name, value)
    }

    pub(crate) fn set_owned(&self, name: &str, value: impl Into<PropValue>) -> DocResult<()> {
        let value = value.into();
        let (key, watch, listeners) = {
            let mut props = self.0.borrow_mut();
            let def = props
                .def(name)
                .ok_or_else(|| DocError::UnknownProperty(name.to_string()))?;
            check_kind(def, &value)?;
            let (key, watch) = (def.name, def.watch_children);
            props.values.insert(key, value.clone());
            let listeners = props.listeners.get(key).cloned().unwrap_or_default();
            (key, watch, listeners)
        };

        if watch {
            self.unwatch_children(key);
            self.watch_children(key, &value);
        }

        for listener in listeners {
            listener(&value);
        }
        self.notify_any();
        Ok(())
    }

    pub fn subscribe(&self, name: &str, listener: PropListener) -> DocResult<()> {
        let mut props = self.0.borrow_mut();
        let key = props
            .def(name)
            .map(|d| d.name)
            .ok_or_else(|| DocError::UnknownProperty(name.to_string()))?;
        props.listeners.entry(key).or_default().push(listener);
        Ok(())
    }

    /// Remove exactly `listener`; unknown listeners are ignored.
    pub fn unsubscribe(&self, name: &str, listener: &PropListener) {
        if let Some(list) = self.0.borrow_mut().listeners.get_mut(name) {
            list.retain(|l| !Rc::ptr_eq(l, listener));
        }
    }

    pub fn subscribe_any(&self, listener: AnyListener) {
        self.0.borrow_mut().any_listeners.push(listener);
    }

    /// Remove exactly `listener`; unknown listeners are ignored.
    pub fn unsubscribe_any(&self, listener: &AnyListener) {
        self.0
            .borrow_mut()
            .any_listeners
            .retain(|l| !Rc::ptr_eq(l, listener));
    }

    pub fn any_listener_count(&self) -> usize {
        self.0.borrow().any_listeners.len()
    }

    /// Fire any-change listeners without writing a property.
    pub fn notify_any(&self) {
        let listeners = self.0.borrow().any_listeners.clone();
        for listener in listeners {
            listener(self);
        }
    }

    fn watch_children(&self, key: &'static str, value: &PropValue) {
        let children = value.children();
        if children.is_empty() {
            return;
        }
        let parent = self.downgrade();
        let mut subs = Vec::with_capacity(children.len());
        for child in children {
            let parent = parent.clone();
            let listener: AnyListener = Rc::new(move |_child: &Entity| {
                if let Some(parent) = parent.upgrade() {
                    parent.notify_any();
                }
            });
            child.subscribe_any(Rc::clone(&listener));
            subs.push((child.clone(), listener));
        }
        self.0.borrow_mut().child_watch.insert(key, subs);
    }

    fn unwatch_children(&self, key: &'static str) {
        let previous = self.0.borrow_mut().child_watch.remove(key);
        for (child, listener) in previous.into_iter().flatten() {
            child.unsubscribe_any(&listener);
        }
    }

    /// Encode as `{ class, id, props }`. Properties marked skip-persist are left out.
    pub fn serialize(&self, registry: &ClassRegistry) -> DocResult<Value> {
        let (class, id, defs) = {
            let props = self.0.borrow();
            (props.class.clone(), props.id.clone(), Rc::clone(&props.defs))
        };
        if !registry.contains(&class) {
            return Err(DocError::UnregisteredClass(class));
        }

        let mut encoded = Map::new();
        for def in defs.iter().filter(|d| !d.skip_persist) {
            let value = self.get(def.name)?;
            encoded.insert(def.name.to_string(), def.encode(&value, registry)?);
        }

        Ok(serde_json::to_value(EntityEnvelope {
            class: &class,
            id: &id,
            props: encoded,
        })?)
    }
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_borrow() {
            Ok(props) => write!(f, "Entity({}#{})", props.class, props.id),
            Err(_) => f.write_str("Entity(<borrowed>)"),
        }
    }
}

fn check_kind(def: &PropDef, value: &PropValue) -> DocResult<()> {
    if def.kind.accepts(value) {
        Ok(())
    } else {
        Err(DocError::InvalidArgument(format!(
            "property '{}' expects {}, got {:?}",
            def.name,
            def.kind.name(),
            value
        )))
    }
}

fn wrong_type(name: &str, expected: &str, found: &PropValue) -> DocError {
    DocError::InvalidArgument(format!(
        "property '{}' is not a {} (found {:?})",
        name, expected, found
    ))
}

/// Rebuild an entity from its `{ class, id, props }` envelope.
///
/// The class name goes through the registry's legacy remapping. Properties
/// absent from the JSON fall back to their default (logged, not an error).
/// The stored id replaces the freshly generated one.
pub fn deserialize_entity(registry: &ClassRegistry, json: &Value) -> DocResult<Entity> {
    let class_name = json
        .get("class")
        .and_then(Value::as_str)
        .ok_or_else(|| DocError::InvalidFormat("entity without 'class'".into()))?;
    let id = json
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| DocError::InvalidFormat(format!("{} entity without 'id'", class_name)))?;
    let empty = Map::new();
    let props = match json.get("props") {
        Some(Value::Object(map)) => map,
        Some(_) => {
            return Err(DocError::InvalidFormat(format!(
                "{} entity 'props' is not an object",
                class_name
            )));
        }
        None => &empty,
    };

    let info = registry.resolve(class_name)?;
    let defs = info.defs();
    let mut values = HashMap::with_capacity(defs.len());
    for def in defs.iter() {
        let value = match props.get(def.name) {
            Some(raw) if !def.skip_persist => def.decode(raw, registry)?,
            _ => {
                if !def.skip_persist {
                    log_warn!(
                        "{} {}: property '{}' missing, using default",
                        info.name(),
                        id,
                        def.name
                    );
                }
                def.default_value()
            }
        };
        values.insert(def.name, value);
    }

    let entity = Entity::from_values(info.name(), defs, values);
    entity.set_id(id);
    Ok(entity)
}
