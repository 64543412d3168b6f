//! Packs a directory of individual sprite images into one atlas PNG
//! plus a sibling JSON descriptor mapping sprite name to pixel rect.
//! Auxiliary to the map engine core: the core only ever reads the
//! output of this tool, never links against it.

mod pack;
mod pipeline;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use image::{DynamicImage, GenericImage};
use serde::Serialize;

use pack::pack_sprites;
use pipeline::{load_process_config, run_pipeline, ProcessStep};

#[derive(Parser)]
#[command(author, version, about = "Pack sprite images into a texture atlas")]
struct Arguments {
    /// Directory of source sprite images (png/jpg/jpeg).
    #[arg(short = 'i', long = "input")]
    input: PathBuf,
    /// Output path without extension; writes `<base>.png` and `<base>.json`.
    #[arg(short = 'o', long = "output-base")]
    output_base: PathBuf,
    /// Pixels of empty space reserved around each packed sprite.
    #[arg(short = 'p', long = "padding", default_value_t = 1)]
    padding: u32,
    /// Maximum atlas width in pixels.
    #[arg(short = 'w', long = "width", default_value_t = 2048)]
    width: u32,
    /// Maximum atlas height in pixels.
    #[arg(short = 'h', long = "height", default_value_t = 2048)]
    height: u32,
    /// Write the JSON descriptor without indentation.
    #[arg(short = 'm', long = "minify")]
    minify: bool,
    /// Emit debug-level logging.
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,
    /// Number of sprites to decode and process concurrently.
    #[arg(short = 'j', long = "jobs", default_value_t = 1)]
    jobs: usize,
    /// Optional JSON array of processing steps applied to every sprite
    /// before packing.
    #[arg(short = 'c', long = "process-config")]
    process_config: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct SpriteRect {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
}

fn main() -> Result<()> {
    let arguments = Arguments::parse();

    let log_level = if arguments.verbose { log::LevelFilter::Debug } else { log::LevelFilter::Info };
    env_logger::Builder::new().filter_level(log_level).init();

    run(&arguments)
}

fn run(arguments: &Arguments) -> Result<()> {
    let sprite_paths = collect_sprite_paths(&arguments.input)?;
    if sprite_paths.is_empty() {
        anyhow::bail!("no sprite images found under {}", arguments.input.display());
    }
    log::info!("packing {} sprites from {}", sprite_paths.len(), arguments.input.display());

    let steps = match &arguments.process_config {
        Some(config_path) => load_process_config(config_path)?,
        None => Vec::new(),
    };
    let config_dir = arguments
        .process_config
        .as_deref()
        .and_then(Path::parent)
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();

    let processed = decode_and_process(&sprite_paths, &steps, &config_dir, arguments.jobs.max(1))?;

    let sizes: Vec<(String, u32, u32)> = processed
        .iter()
        .map(|(name, image)| (name.clone(), image.width(), image.height()))
        .collect();
    let packed = pack_sprites(&sizes, arguments.padding, arguments.width, arguments.height)?;

    let mut atlas = DynamicImage::new_rgba8(packed.atlas_width, packed.atlas_height);
    let mut descriptor: BTreeMap<String, SpriteRect> = BTreeMap::new();
    let images_by_name: BTreeMap<&str, &DynamicImage> =
        processed.iter().map(|(name, image)| (name.as_str(), image)).collect();

    for (name, rect) in &packed.placements {
        let sprite_image = images_by_name
            .get(name.as_str())
            .with_context(|| format!("missing decoded image for sprite '{name}'"))?;
        atlas.copy_from(*sprite_image, rect.x, rect.y)?;
        descriptor.insert(
            name.clone(),
            SpriteRect { x: rect.x, y: rect.y, width: rect.width, height: rect.height },
        );
    }

    write_outputs(arguments, &atlas, &descriptor)?;
    log::info!(
        "wrote {}x{} atlas with {} sprites to {}.png/.json",
        packed.atlas_width,
        packed.atlas_height,
        descriptor.len(),
        arguments.output_base.display()
    );
    Ok(())
}

fn collect_sprite_paths(input_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in walkdir::WalkDir::new(input_dir) {
        let entry = entry.with_context(|| format!("walk {}", input_dir.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let is_image = matches!(
            entry.path().extension().and_then(|ext| ext.to_str()).map(str::to_ascii_lowercase).as_deref(),
            Some("png") | Some("jpg") | Some("jpeg")
        );
        if is_image {
            paths.push(entry.path().to_path_buf());
        }
    }
    Ok(paths)
}

fn sprite_name(path: &Path) -> String {
    path.file_stem().map(|stem| stem.to_string_lossy().to_string()).unwrap_or_default()
}

fn decode_and_process(
    paths: &[PathBuf],
    steps: &[ProcessStep],
    config_dir: &Path,
    jobs: usize,
) -> Result<Vec<(String, DynamicImage)>> {
    let chunk_size = paths.len().div_ceil(jobs).max(1);
    let chunks: Vec<&[PathBuf]> = paths.chunks(chunk_size).collect();

    std::thread::scope(|scope| {
        let handles: Vec<_> = chunks
            .into_iter()
            .map(|chunk| {
                scope.spawn(move || -> Result<Vec<(String, DynamicImage)>> {
                    let mut results = Vec::with_capacity(chunk.len());
                    for path in chunk {
                        let name = sprite_name(path);
                        let decoded = image::open(path)
                            .with_context(|| format!("decode sprite {}", path.display()))?;
                        let processed = run_pipeline(decoded, steps, config_dir)
                            .with_context(|| format!("process sprite {}", path.display()))?;
                        log::debug!("processed '{name}' ({}x{})", processed.width(), processed.height());
                        results.push((name, processed));
                    }
                    Ok(results)
                })
            })
            .collect();

        let mut all_results = Vec::with_capacity(paths.len());
        for handle in handles {
            let chunk_results = handle.join().expect("sprite worker thread panicked")?;
            all_results.extend(chunk_results);
        }
        Ok(all_results)
    })
}

fn write_outputs(
    arguments: &Arguments,
    atlas: &DynamicImage,
    descriptor: &BTreeMap<String, SpriteRect>,
) -> Result<()> {
    if let Some(parent) = arguments.output_base.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output directory {}", parent.display()))?;
    }

    let png_path = arguments.output_base.with_extension("png");
    atlas.save(&png_path).with_context(|| format!("write atlas {}", png_path.display()))?;

    let json_path = arguments.output_base.with_extension("json");
    let json = if arguments.minify {
        serde_json::to_string(descriptor)
    } else {
        serde_json::to_string_pretty(descriptor)
    }
    .context("serialize atlas descriptor")?;
    std::fs::write(&json_path, json).with_context(|| format!("write descriptor {}", json_path.display()))?;

    Ok(())
}
