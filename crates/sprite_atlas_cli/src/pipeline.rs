//! Process-config pipeline: a JSON array of named image-processing
//! steps, applied in order to every sprite before it is packed into the
//! atlas. Paths referenced by a step (a mask, a background, …) are
//! resolved relative to the process-config file's own directory.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::{imageops, DynamicImage, Rgba};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "name")]
pub enum ProcessStep {
    Grayscale,
    InvertColor,
    Colorize { r: u8, g: u8, b: u8 },
    AddBackground { path: PathBuf },
    AddForeground { path: PathBuf },
    MaskImage { path: PathBuf },
    BlendImages { path: PathBuf, alpha: f32 },
    CombineImages { path: PathBuf },
    Resize { width: u32, height: u32 },
}

pub fn load_process_config(path: &Path) -> Result<Vec<ProcessStep>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("read process config {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parse process config {}", path.display()))
}

/// Runs every step in `steps` over `image`, in order. `config_dir` is
/// where auxiliary image paths (`AddBackground`, `MaskImage`, …) are
/// resolved relative to.
pub fn run_pipeline(
    mut image: DynamicImage,
    steps: &[ProcessStep],
    config_dir: &Path,
) -> Result<DynamicImage> {
    for step in steps {
        image = apply_step(image, step, config_dir)?;
    }
    Ok(image)
}

fn apply_step(image: DynamicImage, step: &ProcessStep, config_dir: &Path) -> Result<DynamicImage> {
    match step {
        ProcessStep::Grayscale => Ok(DynamicImage::ImageLuma8(imageops::grayscale(&image)).to_rgba8().into()),
        ProcessStep::InvertColor => {
            let mut rgba = image.to_rgba8();
            imageops::invert(&mut rgba);
            Ok(rgba.into())
        }
        ProcessStep::Colorize { r, g, b } => {
            let mut rgba = image.to_rgba8();
            for pixel in rgba.pixels_mut() {
                let luma = (0.299 * pixel[0] as f32 + 0.587 * pixel[1] as f32 + 0.114 * pixel[2] as f32) / 255.0;
                pixel[0] = (*r as f32 * luma) as u8;
                pixel[1] = (*g as f32 * luma) as u8;
                pixel[2] = (*b as f32 * luma) as u8;
            }
            Ok(rgba.into())
        }
        ProcessStep::AddBackground { path } => {
            let background = open_auxiliary(config_dir, path, image.width(), image.height())?;
            let mut canvas = background.to_rgba8();
            imageops::overlay(&mut canvas, &image.to_rgba8(), 0, 0);
            Ok(canvas.into())
        }
        ProcessStep::AddForeground { path } => {
            let foreground = open_auxiliary(config_dir, path, image.width(), image.height())?;
            let mut canvas = image.to_rgba8();
            imageops::overlay(&mut canvas, &foreground.to_rgba8(), 0, 0);
            Ok(canvas.into())
        }
        ProcessStep::MaskImage { path } => {
            let mask = open_auxiliary(config_dir, path, image.width(), image.height())?.to_luma8();
            let mut rgba = image.to_rgba8();
            for (x, y, pixel) in rgba.enumerate_pixels_mut() {
                let mask_value = mask.get_pixel(x, y)[0];
                pixel[3] = ((pixel[3] as u16 * mask_value as u16) / 255) as u8;
            }
            Ok(rgba.into())
        }
        ProcessStep::BlendImages { path, alpha } => {
            let other = open_auxiliary(config_dir, path, image.width(), image.height())?.to_rgba8();
            let base = image.to_rgba8();
            let alpha = alpha.clamp(0.0, 1.0);
            let mut blended = image::ImageBuffer::new(base.width(), base.height());
            for (x, y, pixel) in blended.enumerate_pixels_mut() {
                let a = base.get_pixel(x, y);
                let b = other.get_pixel(x, y);
                *pixel = Rgba([
                    lerp_u8(a[0], b[0], alpha),
                    lerp_u8(a[1], b[1], alpha),
                    lerp_u8(a[2], b[2], alpha),
                    lerp_u8(a[3], b[3], alpha),
                ]);
            }
            Ok(blended.into())
        }
        ProcessStep::CombineImages { path } => {
            let other = open_auxiliary(config_dir, path, image.width(), image.height())?;
            let mut canvas = image.to_rgba8();
            imageops::overlay(&mut canvas, &other.to_rgba8(), 0, 0);
            Ok(canvas.into())
        }
        ProcessStep::Resize { width, height } => {
            Ok(image.resize_exact(*width, *height, imageops::FilterType::Lanczos3))
        }
    }
}

fn lerp_u8(a: u8, b: u8, t: f32) -> u8 {
    (a as f32 + (b as f32 - a as f32) * t).round().clamp(0.0, 255.0) as u8
}

fn open_auxiliary(config_dir: &Path, path: &Path, width: u32, height: u32) -> Result<DynamicImage> {
    let resolved = if path.is_absolute() { path.to_path_buf() } else { config_dir.join(path) };
    let opened = image::open(&resolved).with_context(|| format!("open auxiliary image {}", resolved.display()))?;
    if opened.width() == width && opened.height() == height {
        Ok(opened)
    } else {
        Ok(opened.resize_exact(width, height, imageops::FilterType::Triangle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_mixed_pipeline_from_json() {
        let raw = r#"[
            {"name": "Grayscale"},
            {"name": "InvertColor"},
            {"name": "Resize", "width": 32, "height": 32}
        ]"#;
        let steps: Vec<ProcessStep> = serde_json::from_str(raw).unwrap();
        assert_eq!(steps.len(), 3);
        assert!(matches!(steps[2], ProcessStep::Resize { width: 32, height: 32 }));
    }

    #[test]
    fn grayscale_then_invert_round_trips_sizes() {
        let image = DynamicImage::ImageRgba8(image::ImageBuffer::from_pixel(4, 4, Rgba([10, 20, 30, 255])));
        let processed = run_pipeline(
            image,
            &[ProcessStep::Grayscale, ProcessStep::InvertColor],
            Path::new("."),
        )
        .unwrap();
        assert_eq!((processed.width(), processed.height()), (4, 4));
    }

    #[test]
    fn resize_step_changes_dimensions() {
        let image = DynamicImage::ImageRgba8(image::ImageBuffer::from_pixel(4, 4, Rgba([0, 0, 0, 255])));
        let processed = run_pipeline(image, &[ProcessStep::Resize { width: 8, height: 2 }], Path::new(".")).unwrap();
        assert_eq!((processed.width(), processed.height()), (8, 2));
    }
}
