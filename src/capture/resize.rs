// Adaptive resizer - derives fixed-size platform images from one source
//
// Ratio-driven crop or scale, then a centered fill that pins the exact
// target size, then a light unsharp mask. Each target starts from the
// untouched source image.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat, ImageReader};
use tracing::{debug, info};

use super::errors::CaptureError;
use super::models::PlatformTarget;
use super::utils::{derived_file_name, write_atomically_blocking};

const SHARPEN_SIGMA: f32 = 0.5;
const FILTER: FilterType = FilterType::Lanczos3;

/// First-pass decision for a source/target pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CropPlan {
    /// Keep the top `height` rows at full width
    CropTop { width: u32, height: u32 },
    /// Keep the left `width` columns at full height
    CropLeft { width: u32, height: u32 },
    /// Scale uniformly to the target width
    ScaleToWidth,
    /// Scale uniformly to the target height
    ScaleToHeight,
    /// Ratios match; scale straight to the target
    ScaleExact,
}

/// Pick the first pass from the two aspect ratios
pub fn plan(source_width: u32, source_height: u32, target_width: u32, target_height: u32) -> CropPlan {
    let target_ratio = f64::from(target_width) / f64::from(target_height);
    let source_ratio = f64::from(source_width) / f64::from(source_height);

    if source_ratio > target_ratio {
        let needed_height = (f64::from(source_width) / target_ratio) as u32;
        if needed_height <= source_height {
            CropPlan::CropTop {
                width: source_width,
                height: needed_height.max(1),
            }
        } else {
            CropPlan::ScaleToWidth
        }
    } else if source_ratio < target_ratio {
        let needed_width = (f64::from(source_height) * target_ratio) as u32;
        if needed_width <= source_width {
            CropPlan::CropLeft {
                width: needed_width.max(1),
                height: source_height,
            }
        } else {
            CropPlan::ScaleToHeight
        }
    } else {
        CropPlan::ScaleExact
    }
}

/// Produce an image of exactly `target_width` x `target_height`
pub fn smart_crop(
    source: &DynamicImage,
    target_width: u32,
    target_height: u32,
) -> Result<DynamicImage, CaptureError> {
    let (width, height) = source.dimensions();
    if target_width == 0 || target_height == 0 {
        return Err(CaptureError::InvalidDimensions {
            width: target_width,
            height: target_height,
        });
    }
    if width == 0 || height == 0 {
        return Err(CaptureError::InvalidDimensions { width, height });
    }

    let first_pass = match plan(width, height, target_width, target_height) {
        CropPlan::CropTop { width, height } | CropPlan::CropLeft { width, height } => {
            source.crop_imm(0, 0, width, height)
        }
        CropPlan::ScaleToWidth => {
            let scaled_height = scaled(height, target_width, width);
            source.resize_exact(target_width, scaled_height, FILTER)
        }
        CropPlan::ScaleToHeight => {
            let scaled_width = scaled(width, target_height, height);
            source.resize_exact(scaled_width, target_height, FILTER)
        }
        CropPlan::ScaleExact => source.resize_exact(target_width, target_height, FILTER),
    };

    let filled = fill_center(&first_pass, target_width, target_height);
    Ok(filled.unsharpen(SHARPEN_SIGMA, 0))
}

/// `value * numerator / denominator`, rounded, never zero
fn scaled(value: u32, numerator: u32, denominator: u32) -> u32 {
    let result = (f64::from(value) * f64::from(numerator) / f64::from(denominator)).round();
    (result as u32).max(1)
}

/// Centered window with the target's aspect ratio, scaled to the target.
///
/// The overflow is cut evenly from both sides before scaling, so memory
/// stays bounded by the input and the target whatever the aspect ratios.
fn fill_center(img: &DynamicImage, target_width: u32, target_height: u32) -> DynamicImage {
    let (width, height) = img.dimensions();
    if width == target_width && height == target_height {
        return img.clone();
    }

    let (window_width, window_height) = fill_window(width, height, target_width, target_height);
    let x = (width - window_width) / 2;
    let y = (height - window_height) / 2;
    img.crop_imm(x, y, window_width, window_height)
        .resize_exact(target_width, target_height, FILTER)
}

/// Largest `target`-ratio box inside `width` x `height`
fn fill_window(width: u32, height: u32, target_width: u32, target_height: u32) -> (u32, u32) {
    let source_ratio = f64::from(width) / f64::from(height);
    let target_ratio = f64::from(target_width) / f64::from(target_height);

    if source_ratio < target_ratio {
        (width, scaled(width, target_height, target_width).min(height))
    } else {
        (scaled(height, target_width, target_height).min(width), height)
    }
}

/// Decode an image by content, whatever its extension claims
pub fn open_image(path: &Path) -> Result<DynamicImage, CaptureError> {
    let reader = ImageReader::open(path)
        .map_err(|e| CaptureError::io(format!("failed to open image {}", path.display()), e))?
        .with_guessed_format()
        .map_err(|e| CaptureError::io(format!("failed to read image {}", path.display()), e))?;
    Ok(reader.decode()?)
}

/// Write one derived PNG per target next to `original`.
///
/// Returns the written paths in target order.
pub fn derive_targets(
    original: &Path,
    base_name: &str,
    targets: &[PlatformTarget],
) -> Result<Vec<PathBuf>, CaptureError> {
    let source = open_image(original)?;
    let dir = original.parent().unwrap_or_else(|| Path::new("."));
    debug!(
        path = %original.display(),
        width = source.width(),
        height = source.height(),
        "deriving platform images"
    );

    let mut written = Vec::with_capacity(targets.len());
    for target in targets {
        let derived = smart_crop(&source, target.width, target.height)?;

        let mut encoded = Cursor::new(Vec::new());
        derived.write_to(&mut encoded, ImageFormat::Png)?;

        let path = dir.join(derived_file_name(base_name, target));
        write_atomically_blocking(&path, encoded.get_ref())?;
        info!(target = target.key, path = %path.display(), "derived image written");
        written.push(path);
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::models::PLATFORM_TARGETS;
    use image::{Rgb, RgbImage};

    const LEFT: Rgb<u8> = Rgb([255, 0, 0]);
    const RIGHT: Rgb<u8> = Rgb([0, 0, 255]);
    const TOP: Rgb<u8> = Rgb([0, 255, 0]);

    /// Striped image with solid left, right and top bands
    fn test_image(width: u32, height: u32) -> DynamicImage {
        let band = (width / 10).max(1);
        let top = (height / 10).max(1);
        let img = RgbImage::from_fn(width, height, |x, y| {
            if y < top {
                TOP
            } else if x < band {
                LEFT
            } else if x >= width - band {
                RIGHT
            } else if (x + y) % 20 < 10 {
                Rgb([100, 150, 200])
            } else {
                Rgb([200, 100, 50])
            }
        });
        DynamicImage::ImageRgb8(img)
    }

    fn close_to(pixel: [u8; 3], expected: Rgb<u8>) -> bool {
        pixel
            .iter()
            .zip(expected.0.iter())
            .all(|(a, b)| (i16::from(*a) - i16::from(*b)).abs() < 60)
    }

    #[test]
    fn test_output_matches_target_exactly() {
        let cases = [
            (1920, 1080, 1200, 628),
            (1000, 1000, 1200, 627),
            (600, 800, 1200, 628),
            (400, 300, 1200, 628),
            (1200, 628, 1200, 628),
            (5000, 10, 1200, 628),
            (10, 5000, 1200, 627),
            (1, 1, 1200, 628),
            (800, 600, 3, 2),
        ];

        for (sw, sh, tw, th) in cases {
            let out = smart_crop(&test_image(sw, sh), tw, th).unwrap();
            assert_eq!(out.dimensions(), (tw, th), "source {}x{}", sw, sh);
        }
    }

    #[test]
    fn test_fill_window_stays_inside_source() {
        assert_eq!(fill_window(1200, 4, 1200, 628), (8, 4));
        assert_eq!(fill_window(1, 900, 1200, 628), (1, 1));
        assert_eq!(fill_window(1200, 700, 1200, 628), (1200, 628));
        assert_eq!(fill_window(1300, 628, 1200, 628), (1200, 628));
    }

    #[test]
    fn test_extreme_aspect_source() {
        let started = std::time::Instant::now();

        let out = smart_crop(&test_image(3000, 10), 1200, 628).unwrap();

        assert_eq!(out.dimensions(), (1200, 628));
        assert!(started.elapsed() < std::time::Duration::from_secs(20));
    }

    #[test]
    fn test_plan_choices() {
        // narrower than 1200x628: the crop would need more width than exists
        assert_eq!(plan(1920, 1080, 1200, 628), CropPlan::ScaleToHeight);
        assert_eq!(plan(600, 800, 1200, 628), CropPlan::ScaleToHeight);
        // wider than target
        assert_eq!(plan(4000, 1000, 1200, 628), CropPlan::ScaleToWidth);
        assert_eq!(plan(2400, 1256, 1200, 628), CropPlan::ScaleExact);
        // near-equal ratios where truncation lets the crop fit
        assert_eq!(
            plan(1201, 628, 1200, 628),
            CropPlan::CropTop {
                width: 1201,
                height: 628
            }
        );
        assert_eq!(
            plan(1199, 628, 1200, 628),
            CropPlan::CropLeft {
                width: 1199,
                height: 628
            }
        );
    }

    #[test]
    fn test_wide_screenshot_keeps_full_width() {
        let out = smart_crop(&test_image(1920, 1080), 1200, 628).unwrap().to_rgb8();
        let mid = out.height() / 2;

        assert!(close_to(out.get_pixel(2, mid).0, LEFT));
        assert!(close_to(out.get_pixel(out.width() - 3, mid).0, RIGHT));
    }

    #[test]
    fn test_portrait_source_is_upscaled() {
        let source = test_image(600, 800);
        let out = smart_crop(&source, 1200, 628).unwrap().to_rgb8();

        assert_eq!(out.dimensions(), (1200, 628));
        // upscaled, not cropped: both side bands survive
        let mid = out.height() / 2;
        assert!(close_to(out.get_pixel(2, mid).0, LEFT));
        assert!(close_to(out.get_pixel(out.width() - 3, mid).0, RIGHT));
    }

    #[test]
    fn test_targets_are_independent() {
        let source = test_image(1024, 768);
        let twitter = PLATFORM_TARGETS[0];
        let linkedin = PLATFORM_TARGETS[1];

        let first = smart_crop(&source, twitter.width, twitter.height).unwrap();
        let _ = smart_crop(&source, linkedin.width, linkedin.height).unwrap();
        let again = smart_crop(&source, twitter.width, twitter.height).unwrap();

        assert_eq!(first.as_bytes(), again.as_bytes());
    }

    #[test]
    fn test_zero_target_rejected() {
        let err = smart_crop(&test_image(10, 10), 0, 628).unwrap_err();
        assert!(matches!(err, CaptureError::InvalidDimensions { width: 0, height: 628 }));
    }

    #[test]
    fn test_derive_targets_writes_named_pngs() {
        let dir = tempfile::tempdir().unwrap();
        let original = dir.path().join("day-4-screenshot.png");
        // thumbnails arrive as JPEG bytes under a .png name
        let mut jpeg = Cursor::new(Vec::new());
        test_image(480, 360)
            .write_to(&mut jpeg, ImageFormat::Jpeg)
            .unwrap();
        std::fs::write(&original, jpeg.get_ref()).unwrap();

        let written = derive_targets(&original, "day-4-screenshot", &PLATFORM_TARGETS).unwrap();

        assert_eq!(
            written,
            vec![
                dir.path().join("day-4-screenshot-twitter.png"),
                dir.path().join("day-4-screenshot-linkedin.png"),
            ]
        );
        let twitter = image::open(&written[0]).unwrap();
        assert_eq!(twitter.dimensions(), (1200, 628));
        let linkedin = image::open(&written[1]).unwrap();
        assert_eq!(linkedin.dimensions(), (1200, 627));
    }

    #[test]
    fn test_derive_targets_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = derive_targets(&dir.path().join("nope.png"), "nope", &PLATFORM_TARGETS).unwrap_err();
        assert!(err.to_string().starts_with("failed to open image"));
    }
}
