// ============================================================================
// IMAGE-LEVEL OPERATIONS — add / delete / duplicate layers and frames, compositing
// ============================================================================

use image::RgbaImage;
use rayon::prelude::*;

use crate::canvas::{RasterBuffer, Surface};
use crate::components::colors::Palette;
use crate::components::layers::{Frame, Layer};
use crate::error::{DocError, DocResult};
use crate::sprite::SpriteImage;

/// Add a new transparent pixel layer on top.
pub fn add_layer(image: &mut SpriteImage) -> DocResult<Layer> {
    let layer = Layer::pixel(&format!("Layer {}", image.layers().len() + 1))?;
    image.append_layer(layer.clone())?;
    Ok(layer)
}

/// Add an empty object layer on top.
pub fn add_object_layer(image: &mut SpriteImage) -> DocResult<Layer> {
    let layer = Layer::object(&format!("Objects {}", image.layers().len() + 1))?;
    image.append_layer(layer.clone())?;
    Ok(layer)
}

/// Delete a layer (must keep at least one layer).
pub fn delete_layer(image: &mut SpriteImage, id: &str) -> DocResult<Layer> {
    if image.layers().len() <= 1 {
        return Err(DocError::InvalidArgument("cannot delete the last layer".into()));
    }
    image.remove_layer(id)
}

/// Delete a frame (must keep at least one frame).
pub fn delete_frame(image: &mut SpriteImage, id: &str) -> DocResult<Frame> {
    if image.frames().len() <= 1 {
        return Err(DocError::InvalidArgument("cannot delete the last frame".into()));
    }
    image.remove_frame(id)
}

/// Copy `source` into a freshly created buffer.
fn copy_buffer(image: &mut SpriteImage, source: &RasterBuffer, layer: &str, frame: &str) -> DocResult<()> {
    image
        .get_pixel_surface(layer, frame)?
        .copy_pixels_from(source, &|_, _| true)
}

/// Duplicate a pixel layer with all its frame buffers, placed directly above it.
pub fn duplicate_layer(image: &mut SpriteImage, id: &str) -> DocResult<Layer> {
    let index = image
        .layer_index(id)
        .ok_or_else(|| DocError::UnknownLayer(id.to_string()))?;
    let Some(Layer::Pixel(_)) = image.layer(id) else {
        return Err(DocError::UnsupportedLayerKind("object".into()));
    };
    let src = image.layers()[index].clone();

    let dup = Layer::pixel(&format!("{} Copy", src.name()))?;
    dup.set_opacity(src.opacity())?;
    dup.set_visible(src.visible())?;
    image.append_layer(dup.clone())?;

    let dup_id = dup.id();
    for frame in image.frames() {
        let frame_id = frame.id();
        if let Some(buffer) = image.buffer(id, &frame_id).cloned() {
            copy_buffer(image, &buffer, &dup_id, &frame_id)?;
        }
    }

    let top = image.layers().len() - 1;
    image.move_layer(top, index + 1)?;
    Ok(dup)
}

/// Duplicate a frame with every layer's buffer for it, placed directly after it.
pub fn duplicate_frame(image: &mut SpriteImage, id: &str) -> DocResult<Frame> {
    let index = image
        .frame_index(id)
        .ok_or_else(|| DocError::UnknownFrame(id.to_string()))?;
    let src = image.frames()[index].clone();

    let dup = Frame::new(&format!("{} Copy", src.name()), src.duration())?;
    dup.set_group(&src.group())?;
    image.append_frame(dup.clone())?;

    let dup_id = dup.id();
    for layer in image.layers().iter().filter(|l| l.is_pixel()) {
        let layer_id = layer.id();
        if let Some(buffer) = image.buffer(&layer_id, id).cloned() {
            copy_buffer(image, &buffer, &layer_id, &dup_id)?;
        }
    }

    let last = image.frames().len() - 1;
    image.move_frame(last, index + 1)?;
    Ok(dup)
}

/// Source-over blend of one straight-alpha pixel onto `dst`.
#[inline]
fn blend_over(dst: &mut [u8], src: [u8; 4], opacity: f32) {
    let sa = src[3] as f32 / 255.0 * opacity;
    if sa <= 0.0 {
        return;
    }
    let da = dst[3] as f32 / 255.0;
    let out_a = sa + da * (1.0 - sa);
    for c in 0..3 {
        let v = (src[c] as f32 * sa + dst[c] as f32 * da * (1.0 - sa)) / out_a;
        dst[c] = (v + 0.5).clamp(0.0, 255.0) as u8;
    }
    dst[3] = (out_a * 255.0 + 0.5).clamp(0.0, 255.0) as u8;
}

/// Flatten one frame to RGBA: visible pixel layers bottom to top, each at its opacity.
///
/// Object layers are not rasterized. Rows are blended in parallel.
pub fn composite_frame(image: &SpriteImage, frame_id: &str, palette: &Palette) -> DocResult<RgbaImage> {
    if image.frame(frame_id).is_none() {
        return Err(DocError::UnknownFrame(frame_id.to_string()));
    }
    let size = image.size();
    let lut = palette.lut();
    let layers = image.layers();
    let sources: Vec<(&RasterBuffer, f32)> = layers
        .iter()
        .filter(|l| l.is_pixel() && l.visible())
        .filter_map(|l| {
            image
                .buffer(&l.id(), frame_id)
                .map(|b| (b, l.opacity() as f32))
        })
        .collect();

    let mut out = RgbaImage::new(size.w, size.h);
    let row_len = size.w as usize;
    out.par_chunks_mut(row_len * 4)
        .enumerate()
        .for_each(|(y, row)| {
            for (buffer, opacity) in &sources {
                let cells = &buffer.data()[y * row_len..(y + 1) * row_len];
                for (x, &v) in cells.iter().enumerate() {
                    let Some(&rgba) = usize::try_from(v).ok().and_then(|i| lut.get(i)) else {
                        continue;
                    };
                    blend_over(&mut row[x * 4..x * 4 + 4], rgba, *opacity);
                }
            }
        });
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::{Point, Size};

    fn image() -> SpriteImage {
        let mut img = SpriteImage::new("c", Size::new(2, 2)).unwrap();
        add_layer(&mut img).unwrap();
        img.add_empty_frame().unwrap();
        img
    }

    #[test]
    fn auto_names_and_last_layer_guard() {
        let mut img = image();
        let second = add_layer(&mut img).unwrap();
        assert_eq!(second.name(), "Layer 2");
        delete_layer(&mut img, &second.id()).unwrap();
        let only = img.layers()[0].id();
        assert!(delete_layer(&mut img, &only).is_err());
    }

    #[test]
    fn duplicate_layer_copies_buffers_above_source() {
        let mut img = image();
        add_layer(&mut img).unwrap();
        let (l0, f0) = (img.layers()[0].id(), img.frames()[0].id());
        img.get_pixel_surface(&l0, &f0)
            .unwrap()
            .set_pixel(Point::new(1, 1), 4)
            .unwrap();

        let dup = duplicate_layer(&mut img, &l0).unwrap();
        assert_eq!(img.layer_index(&dup.id()), Some(1));
        assert_eq!(dup.name(), "Layer 1 Copy");
        assert_eq!(img.buffer(&dup.id(), &f0), img.buffer(&l0, &f0));
    }

    #[test]
    fn duplicate_frame_inserts_after_source() {
        let mut img = image();
        img.add_empty_frame().unwrap();
        let (l0, f0) = (img.layers()[0].id(), img.frames()[0].id());
        img.get_pixel_surface(&l0, &f0).unwrap().fill_all(3);

        let dup = duplicate_frame(&mut img, &f0).unwrap();
        assert_eq!(img.frame_index(&dup.id()), Some(1));
        assert_eq!(img.frames().len(), 3);
        assert_eq!(img.buffer(&l0, &dup.id()).unwrap().data(), &[3, 3, 3, 3]);
    }

    #[test]
    fn composite_respects_visibility_and_opacity() {
        let mut img = image();
        let top = add_layer(&mut img).unwrap();
        let (l0, f0) = (img.layers()[0].id(), img.frames()[0].id());
        let palette = Palette::new("p", &[0xff0000ff, 0x0000ffff]).unwrap();

        img.get_pixel_surface(&l0, &f0).unwrap().fill_all(0);
        img.get_pixel_surface(&top.id(), &f0)
            .unwrap()
            .set_pixel(Point::new(0, 0), 1)
            .unwrap();

        let out = composite_frame(&img, &f0, &palette).unwrap();
        assert_eq!(out.get_pixel(0, 0).0, [0, 0, 255, 255]);
        assert_eq!(out.get_pixel(1, 1).0, [255, 0, 0, 255]);

        top.set_opacity(0.5).unwrap();
        let out = composite_frame(&img, &f0, &palette).unwrap();
        assert_eq!(out.get_pixel(0, 0).0, [128, 0, 128, 255]);

        top.set_visible(false).unwrap();
        let out = composite_frame(&img, &f0, &palette).unwrap();
        assert_eq!(out.get_pixel(0, 0).0, [255, 0, 0, 255]);
    }

    #[test]
    fn composite_of_empty_frame_is_transparent() {
        let img = image();
        let f0 = img.frames()[0].id();
        let palette = Palette::default_palette().unwrap();
        let out = composite_frame(&img, &f0, &palette).unwrap();
        assert!(out.pixels().all(|p| p.0 == [0, 0, 0, 0]));
        assert!(composite_frame(&img, "nope", &palette).is_err());
    }
}
