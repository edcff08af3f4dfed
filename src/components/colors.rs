use serde_json::Value;

use crate::error::{DocError, DocResult};
use crate::props::{Entity, EntityClass, PropDef, PropKind, PropValue};
use crate::registry::ClassRegistry;

/// Packed 0xRRGGBBAA.
pub type PackedRgba = u32;

/// 16-colour starter palette.
const DEFAULT_COLORS: [PackedRgba; 16] = [
    0x000000ff, 0x1d2b53ff, 0x7e2553ff, 0x008751ff, 0xab5236ff, 0x5f574fff, 0xc2c3c7ff,
    0xfff1e8ff, 0xff004dff, 0xffa300ff, 0xffec27ff, 0x00e436ff, 0x29adffff, 0x83769cff,
    0xff77a8ff, 0xffccaaff,
];

pub fn rgba_to_hex(c: PackedRgba) -> String {
    format!("#{:08x}", c)
}

/// Parse `#rrggbbaa` or `#rrggbb` (opaque).
pub fn hex_to_rgba(s: &str) -> Option<PackedRgba> {
    let hex = s.strip_prefix('#')?;
    match hex.len() {
        8 => u32::from_str_radix(hex, 16).ok(),
        6 => u32::from_str_radix(hex, 16).ok().map(|rgb| (rgb << 8) | 0xff),
        _ => None,
    }
}

pub fn unpack(c: PackedRgba) -> [u8; 4] {
    c.to_be_bytes()
}

fn encode_colors(value: &PropValue, _: &ClassRegistry) -> DocResult<Value> {
    match value {
        PropValue::IntList(list) => Ok(Value::Array(
            list.iter()
                .map(|&c| Value::String(rgba_to_hex(c as PackedRgba)))
                .collect(),
        )),
        other => Err(DocError::InvalidArgument(format!(
            "palette colors must be an int list, got {:?}",
            other
        ))),
    }
}

fn decode_colors(json: &Value, _: &ClassRegistry) -> DocResult<PropValue> {
    let items = json
        .as_array()
        .ok_or_else(|| DocError::InvalidFormat("palette colors must be an array".into()))?;
    items
        .iter()
        .map(|item| {
            item.as_str()
                .and_then(hex_to_rgba)
                .map(|c| c as i64)
                .ok_or_else(|| DocError::InvalidFormat(format!("bad palette color {}", item)))
        })
        .collect::<DocResult<Vec<_>>>()
        .map(PropValue::IntList)
}

fn format_colors(value: &PropValue) -> String {
    match value {
        PropValue::IntList(list) => format!("{} colors", list.len()),
        other => other.to_string(),
    }
}

/// Indexed colour table. Pixel values are indices into it.
#[derive(Clone, Debug, PartialEq)]
pub struct Palette(Entity);

impl EntityClass for Palette {
    const CLASS: &'static str = "Palette";

    fn prop_defs() -> Vec<PropDef> {
        vec![
            PropDef::new("name", PropKind::Str, || "Palette".into()),
            PropDef::new("colors", PropKind::IntList, || PropValue::IntList(Vec::new()))
                .with_codec(encode_colors, decode_colors)
                .with_format(format_colors),
        ]
    }
}

impl Palette {
    pub fn new(name: &str, colors: &[PackedRgba]) -> DocResult<Self> {
        Ok(Self(Entity::of::<Self>(vec![
            ("name", name.into()),
            (
                "colors",
                PropValue::IntList(colors.iter().map(|&c| c as i64).collect()),
            ),
        ])?))
    }

    pub fn default_palette() -> DocResult<Self> {
        Self::new("Default", &DEFAULT_COLORS)
    }

    pub fn from_entity(entity: Entity) -> DocResult<Self> {
        if entity.is_class::<Palette>() {
            Ok(Palette(entity))
        } else {
            Err(DocError::InvalidFormat(format!(
                "expected Palette, found {}",
                entity.class()
            )))
        }
    }

    pub fn entity(&self) -> &Entity {
        &self.0
    }

    pub fn name(&self) -> String {
        self.0.get_str("name").unwrap_or_default()
    }

    pub fn colors(&self) -> Vec<PackedRgba> {
        self.0
            .get_int_list("colors")
            .unwrap_or_default()
            .into_iter()
            .map(|c| c as PackedRgba)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.colors().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// RGBA for a pixel value. `TRANSPARENT` and unknown indices give `[0, 0, 0, 0]`.
    pub fn rgba(&self, index: i32) -> [u8; 4] {
        if index < 0 {
            return [0, 0, 0, 0];
        }
        self.colors()
            .get(index as usize)
            .map(|&c| unpack(c))
            .unwrap_or([0, 0, 0, 0])
    }

    /// Lookup table for hot loops: one entry per palette index.
    pub fn lut(&self) -> Vec<[u8; 4]> {
        self.colors().into_iter().map(unpack).collect()
    }

    pub fn set_color(&self, index: usize, color: PackedRgba) -> DocResult<()> {
        let mut colors = self.0.get_int_list("colors")?;
        let slot = colors.get_mut(index).ok_or_else(|| {
            DocError::InvalidArgument(format!("palette index {} out of range", index))
        })?;
        *slot = color as i64;
        self.0.set("colors", PropValue::IntList(colors))
    }

    /// Append a colour, returning its index.
    pub fn push_color(&self, color: PackedRgba) -> DocResult<usize> {
        let mut colors = self.0.get_int_list("colors")?;
        colors.push(color as i64);
        let index = colors.len() - 1;
        self.0.set("colors", PropValue::IntList(colors))?;
        Ok(index)
    }
}
