// ============================================================================
// SpriteFE CLI — inspect and export project files without an editor window
// ============================================================================
//
// Usage examples:
//   spritefe --input hero.sfe --info
//   spritefe -i hero.sfe --format gif --output-dir out/
//   spritefe -i "sprites/*.sfe" --format png --image 1 --output-dir frames/
//
// All processing runs synchronously on the current thread; only frame
// compositing fans out over rayon.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;

use crate::error::{DocError, DocResult};
use crate::io::{describe_project, export_frames_png, export_gif, load_project};
use crate::registry::ClassRegistry;
use crate::settings::EditorSettings;

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// SpriteFE headless project tool.
#[derive(Parser, Debug)]
#[command(
    name = "spritefe",
    about = "SpriteFE headless project inspector and exporter",
    long_about = "Print a summary of SpriteFE project files, or export one image of\n\
                  each project as per-frame PNGs or an animated GIF.\n\n\
                  Example:\n  \
                  spritefe --input hero.sfe --info\n  \
                  spritefe -i *.sfe --format gif --output-dir out/"
)]
pub struct CliArgs {
    /// Input project file(s). Glob patterns accepted (e.g. "*.sfe").
    #[arg(short, long, required = true, num_args = 1..)]
    pub input: Vec<String>,

    /// Print a summary of each project instead of exporting.
    #[arg(long)]
    pub info: bool,

    /// Export format: png (one file per frame) or gif (animated).
    #[arg(short, long, default_value = "png", value_name = "FORMAT")]
    pub format: String,

    /// Output directory. Defaults to the directory of each input file.
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Index of the image to export within each project.
    #[arg(long, default_value_t = 0, value_name = "N")]
    pub image: usize,

    /// Echo log lines to stderr and print per-file timing.
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportFormat {
    Png,
    Gif,
}

impl ExportFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "png" => Some(ExportFormat::Png),
            "gif" => Some(ExportFormat::Gif),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Png => "png",
            ExportFormat::Gif => "gif",
        }
    }
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run all CLI processing and return an OS exit code.
/// `0` = all files succeeded, `1` = one or more files failed.
pub fn run(args: CliArgs) -> ExitCode {
    let Some(format) = ExportFormat::parse(&args.format) else {
        eprintln!("error: unknown format '{}' (expected png or gif).", args.format);
        return ExitCode::FAILURE;
    };

    let inputs = resolve_inputs(&args.input);
    if inputs.is_empty() {
        eprintln!("error: no input files matched the given pattern(s).");
        return ExitCode::FAILURE;
    }

    if let Some(dir) = &args.output_dir
        && let Err(e) = std::fs::create_dir_all(dir)
    {
        eprintln!(
            "error: could not create output directory '{}': {}",
            dir.display(),
            e
        );
        return ExitCode::FAILURE;
    }

    let registry = match ClassRegistry::with_builtin_classes() {
        Ok(registry) => registry,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let settings = EditorSettings::load();
    let total = inputs.len();
    let multi = total > 1;
    let mut any_failure = false;

    for (idx, input_path) in inputs.iter().enumerate() {
        if multi || args.verbose {
            println!("[{}/{}] {}", idx + 1, total, input_path.display());
        }
        let file_start = Instant::now();

        let result = if args.info {
            info_one(&registry, input_path)
        } else {
            export_one(&registry, &settings, input_path, &args, format)
        };

        match result {
            Ok(written) => {
                for path in &written {
                    println!("  → {}", path.display());
                }
                if args.verbose {
                    println!(
                        "  done ({:.0}ms)",
                        file_start.elapsed().as_secs_f64() * 1000.0
                    );
                }
            }
            Err(e) => {
                eprintln!("  error: {}", e);
                any_failure = true;
            }
        }
    }

    if any_failure { ExitCode::FAILURE } else { ExitCode::SUCCESS }
}

// ============================================================================
// Per-file processing
// ============================================================================

fn info_one(registry: &ClassRegistry, input: &Path) -> DocResult<Vec<PathBuf>> {
    let project = load_project(registry, input)?;
    for line in describe_project(&project) {
        println!("{}", line);
    }
    Ok(Vec::new())
}

fn export_one(
    registry: &ClassRegistry,
    settings: &EditorSettings,
    input: &Path,
    args: &CliArgs,
    format: ExportFormat,
) -> DocResult<Vec<PathBuf>> {
    let project = load_project(registry, input)?;
    let image = project.image(args.image).ok_or_else(|| {
        DocError::InvalidArgument(format!(
            "image index {} out of range ({} images)",
            args.image,
            project.images().len()
        ))
    })?;
    let palette = project.palette()?;
    let dir = output_dir_for(input, args.output_dir.as_deref());
    let stem = output_stem(input, args.image);

    match format {
        ExportFormat::Png => export_frames_png(image, &palette, &dir, &stem),
        ExportFormat::Gif => {
            std::fs::create_dir_all(&dir)?;
            let path = dir.join(format!("{}.{}", stem, format.extension()));
            export_gif(image, &palette, &path, settings.gif_repeat)?;
            Ok(vec![path])
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Expand glob patterns and literal paths into a deduplicated, ordered list.
fn resolve_inputs(patterns: &[String]) -> Vec<PathBuf> {
    let mut result: Vec<PathBuf> = Vec::new();

    for pattern in patterns {
        let as_path = Path::new(pattern);

        if as_path.exists() {
            if !result.iter().any(|p| p.as_path() == as_path) {
                result.push(as_path.to_path_buf());
            }
            continue;
        }

        match glob::glob(pattern) {
            Ok(entries) => {
                let mut matched = false;
                for entry in entries.flatten() {
                    if !result.contains(&entry) {
                        result.push(entry);
                    }
                    matched = true;
                }
                if !matched {
                    eprintln!("warning: pattern '{}' matched no files.", pattern);
                }
            }
            Err(e) => {
                eprintln!("warning: invalid glob '{}': {}", pattern, e);
            }
        }
    }

    result
}

/// `--output-dir` when given, otherwise the input's own directory.
fn output_dir_for(input: &Path, output_dir: Option<&Path>) -> PathBuf {
    match output_dir {
        Some(dir) => dir.to_path_buf(),
        None => input
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."))
            .to_path_buf(),
    }
}

/// Input stem, suffixed with the image index when it is not the first image.
fn output_stem(input: &Path, image: usize) -> String {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "sprite".to_string());
    if image == 0 {
        stem
    } else {
        format!("{}_img{}", stem, image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flags() {
        let args = CliArgs::try_parse_from([
            "spritefe", "-i", "a.sfe", "b.sfe", "--format", "gif", "--image", "2", "--info",
        ])
        .unwrap();
        assert_eq!(args.input, vec!["a.sfe".to_string(), "b.sfe".to_string()]);
        assert_eq!(ExportFormat::parse(&args.format), Some(ExportFormat::Gif));
        assert_eq!(args.image, 2);
        assert!(args.info);
        assert!(CliArgs::try_parse_from(["spritefe"]).is_err());
    }

    #[test]
    fn output_naming() {
        let input = Path::new("art/hero.sfe");
        assert_eq!(output_dir_for(input, None), PathBuf::from("art"));
        assert_eq!(output_dir_for(Path::new("hero.sfe"), None), PathBuf::from("."));
        assert_eq!(output_stem(input, 0), "hero");
        assert_eq!(output_stem(input, 3), "hero_img3");
        assert_eq!(ExportFormat::parse("JPG"), None);
    }

    #[test]
    fn missing_inputs_fail() {
        let args = CliArgs::try_parse_from(["spritefe", "-i", "/definitely/not/here-*.sfe"]).unwrap();
        assert_eq!(run(args), ExitCode::FAILURE);
    }
}
