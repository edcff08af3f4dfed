use std::borrow::Cow;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use image::ImageEncoder;
use image::codecs::png::PngEncoder;
use serde_json::Value;

use crate::components::colors::Palette;
use crate::error::{DocError, DocResult};
use crate::ops::canvas_ops::composite_frame;
use crate::project::Project;
use crate::props::deserialize_entity;
use crate::registry::ClassRegistry;
use crate::sprite::SpriteImage;
use crate::{log_err, log_info};

/// Extension used for project files.
pub const PROJECT_EXTENSION: &str = "sfe";

/// Maximum image dimension a GIF can hold (per axis).
const MAX_GIF_DIM: u32 = u16::MAX as u32;

// ============================================================================
// PROJECT FILES
// ============================================================================

/// Encode a project: the `Doc` envelope with an extra top-level `images` array.
pub fn project_to_json(
    project: &Project,
    registry: &ClassRegistry,
    omit_empty_buffers: bool,
) -> DocResult<Value> {
    let mut json = project.doc().serialize(registry)?;
    let images = project
        .images()
        .iter()
        .map(|image| image.serialize(registry, omit_empty_buffers))
        .collect::<DocResult<Vec<_>>>()?;
    match &mut json {
        Value::Object(map) => {
            map.insert("images".to_string(), Value::Array(images));
        }
        _ => return Err(DocError::InvalidFormat("document envelope is not an object".into())),
    }
    Ok(json)
}

/// Rebuild a project from its JSON form. A missing `images` array loads as
/// a document without images.
pub fn project_from_json(
    registry: &ClassRegistry,
    json: &Value,
    path: Option<PathBuf>,
) -> DocResult<Project> {
    let doc = deserialize_entity(registry, json)?;
    let images = match json.get("images") {
        Some(Value::Array(list)) => list
            .iter()
            .map(|raw| SpriteImage::deserialize(registry, raw))
            .collect::<DocResult<Vec<_>>>()?,
        Some(other) => {
            return Err(DocError::InvalidFormat(format!(
                "'images' must be an array, found {}",
                other
            )));
        }
        None => Vec::new(),
    };
    Project::from_parts(doc, images, path)
}

/// Save a project as JSON and mark it clean.
pub fn save_project(
    project: &mut Project,
    registry: &ClassRegistry,
    path: &Path,
    omit_empty_buffers: bool,
) -> DocResult<()> {
    let json = project_to_json(project, registry, omit_empty_buffers)?;
    let result = File::create(path)
        .map_err(DocError::from)
        .and_then(|file| Ok(serde_json::to_writer(BufWriter::new(file), &json)?));
    match result {
        Ok(()) => {
            log_info!("Saved project '{}' to {}", project.name(), path.display());
            project.path = Some(path.to_path_buf());
            project.mark_clean();
            Ok(())
        }
        Err(e) => {
            log_err!("Failed to save {}: {}", path.display(), e);
            Err(e)
        }
    }
}

/// Load a project file.
pub fn load_project(registry: &ClassRegistry, path: &Path) -> DocResult<Project> {
    let result = File::open(path)
        .map_err(DocError::from)
        .and_then(|file| Ok(serde_json::from_reader::<_, Value>(BufReader::new(file))?))
        .and_then(|json| project_from_json(registry, &json, Some(path.to_path_buf())));
    match &result {
        Ok(project) => {
            log_info!(
                "Loaded project '{}' ({} images) from {}",
                project.name(),
                project.images().len(),
                path.display()
            );
        }
        Err(e) => {
            log_err!("Failed to load {}: {}", path.display(), e);
        }
    }
    result
}

// ============================================================================
// PNG EXPORT
// ============================================================================

/// Composite one frame and write it as an RGBA PNG.
pub fn export_png(image: &SpriteImage, frame_id: &str, palette: &Palette, path: &Path) -> DocResult<()> {
    let rgba = composite_frame(image, frame_id, palette)?;
    let file = File::create(path)?;
    let encoder = PngEncoder::new(BufWriter::new(file));
    encoder.write_image(
        rgba.as_raw(),
        rgba.width(),
        rgba.height(),
        image::ColorType::Rgba8,
    )?;
    log_info!("Exported frame {} of '{}' to {}", frame_id, image.name(), path.display());
    Ok(())
}

/// Export every frame as `<stem>_<NNN>.png` in `dir`; returns the written paths.
pub fn export_frames_png(
    image: &SpriteImage,
    palette: &Palette,
    dir: &Path,
    stem: &str,
) -> DocResult<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)?;
    let mut written = Vec::new();
    for (i, frame) in image.frames().iter().enumerate() {
        let path = dir.join(format!("{}_{:03}.png", stem, i));
        export_png(image, &frame.id(), palette, &path)?;
        written.push(path);
    }
    Ok(written)
}

// ============================================================================
// GIF EXPORT
// ============================================================================

/// Flatten one frame in palette-index space: the topmost visible pixel layer
/// holding a valid index wins; everything else becomes `transparent_index`.
fn flatten_indexed(image: &SpriteImage, frame_id: &str, colors: usize, transparent_index: u8) -> Vec<u8> {
    let size = image.size();
    let mut out = vec![transparent_index; size.area()];
    let mut filled = vec![false; size.area()];
    for layer in image.layers().iter().rev() {
        if !layer.is_pixel() || !layer.visible() {
            continue;
        }
        let Some(buffer) = image.buffer(&layer.id(), frame_id) else { continue };
        for (i, &v) in buffer.data().iter().enumerate() {
            if filled[i] || v < 0 || v as usize >= colors {
                continue;
            }
            out[i] = v as u8;
            filled[i] = true;
        }
    }
    out
}

/// Write every frame as an animated GIF with per-frame delays.
///
/// The document palette becomes the global colour table directly, with one
/// extra slot for transparency, so no quantization happens. Layer opacity is
/// not representable and is ignored.
pub fn export_gif(image: &SpriteImage, palette: &Palette, path: &Path, repeat: bool) -> DocResult<()> {
    let size = image.size();
    if size.w > MAX_GIF_DIM || size.h > MAX_GIF_DIM {
        return Err(DocError::Gif(format!(
            "image dimensions {}×{} exceed GIF maximum (65535×65535)",
            size.w, size.h
        )));
    }
    let colors = palette.colors();
    if colors.len() > 255 {
        return Err(DocError::Gif(format!(
            "palette has {} colours; GIF export supports at most 255",
            colors.len()
        )));
    }
    let frames = image.frames();
    if frames.is_empty() {
        return Err(DocError::Gif("no frames to encode".into()));
    }

    let transparent_index = colors.len() as u8;
    let mut global_palette: Vec<u8> = colors
        .iter()
        .flat_map(|&c| {
            let [r, g, b, _] = c.to_be_bytes();
            [r, g, b]
        })
        .collect();
    global_palette.extend_from_slice(&[0, 0, 0]);

    let (w, h) = (size.w as u16, size.h as u16);
    let file = File::create(path)?;
    let mut encoder = gif::Encoder::new(BufWriter::new(file), w, h, &global_palette)?;
    if repeat {
        encoder.set_repeat(gif::Repeat::Infinite)?;
    }

    for frame in &frames {
        let indexed = flatten_indexed(image, &frame.id(), colors.len(), transparent_index);
        let delay = (frame.duration() / 10).clamp(0, u16::MAX as i64) as u16;
        let gif_frame = gif::Frame {
            width: w,
            height: h,
            delay,
            dispose: gif::DisposalMethod::Background,
            transparent: Some(transparent_index),
            buffer: Cow::Owned(indexed),
            ..Default::default()
        };
        encoder.write_frame(&gif_frame)?;
    }

    log_info!(
        "Exported {} frames of '{}' to {}",
        frames.len(),
        image.name(),
        path.display()
    );
    Ok(())
}

/// Summary lines for `--info`.
pub fn describe_project(project: &Project) -> Vec<String> {
    let mut lines = vec![format!(
        "{}: {} image(s), palette of {} colours",
        project.name(),
        project.images().len(),
        project.palette().map(|p| p.len()).unwrap_or(0)
    )];
    for (i, image) in project.images().iter().enumerate() {
        let size = image.size();
        lines.push(format!(
            "  [{}] {} {}×{}, {} layer(s), {} frame(s), {} buffer(s)",
            i,
            image.name(),
            size.w,
            size.h,
            image.layers().len(),
            image.frames().len(),
            image.buffers().len()
        ));
        for layer in image.layers() {
            lines.push(format!(
                "      layer {} ({}, {}){}",
                layer.name(),
                layer.kind().name(),
                layer.entity().display("opacity").unwrap_or_default(),
                if layer.visible() { "" } else { " hidden" }
            ));
        }
    }
    lines
}
