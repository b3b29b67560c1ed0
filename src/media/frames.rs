//! Input frame reading and preprocessing.
//!
//! Frames come from a video file, a directory of images (sorted by file
//! name) or a single image repeated over time. Every frame is composited onto
//! white, cropped to a square and resized to the model resolution.

use std::path::{Path, PathBuf};

use image::{imageops, imageops::FilterType, Rgb, RgbImage, Rgba, RgbaImage};
use tracing::{debug, info, warn};

use super::ffmpeg;
use crate::error::{Sv4dError, Sv4dResult};

const IMAGE_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "webp", "bmp", "tiff"];
const VIDEO_EXTENSIONS: [&str; 6] = ["mp4", "mov", "avi", "mkv", "webm", "gif"];

/// Largest per-channel distance from the border colour still keyed out.
const KEY_TOLERANCE: u8 = 24;

#[derive(Debug, Clone, PartialEq)]
pub struct FrameOptions {
    pub width: u32,
    pub height: u32,
    pub n_frames: usize,
    /// Key out the background before cropping.
    pub remove_bg: bool,
    /// Fraction of the output side the foreground should span.
    pub image_frame_ratio: Option<f32>,
}

impl FrameOptions {
    fn validate(&self) -> Sv4dResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(Sv4dError::validation("frame size must be non-zero"));
        }
        if self.n_frames == 0 {
            return Err(Sv4dError::validation("n_frames must be non-zero"));
        }
        if let Some(ratio) = self.image_frame_ratio {
            if !(ratio > 0.0 && ratio <= 1.0) {
                return Err(Sv4dError::validation(format!(
                    "image_frame_ratio must be in (0, 1], got {ratio}"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InputKind {
    Directory,
    Video,
    Image,
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| extensions.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn input_kind(path: &Path) -> Sv4dResult<InputKind> {
    if path.is_dir() {
        Ok(InputKind::Directory)
    } else if !path.is_file() {
        Err(Sv4dError::validation(format!(
            "input '{}' does not exist",
            path.display()
        )))
    } else if has_extension(path, &VIDEO_EXTENSIONS) {
        Ok(InputKind::Video)
    } else if has_extension(path, &IMAGE_EXTENSIONS) {
        Ok(InputKind::Image)
    } else {
        Err(Sv4dError::validation(format!(
            "unsupported input '{}'",
            path.display()
        )))
    }
}

/// Image files of `dir`, sorted by file name.
pub fn image_files(dir: &Path) -> Sv4dResult<Vec<PathBuf>> {
    let mut files = std::fs::read_dir(dir)?
        .map(|entry| entry.map(|entry| entry.path()))
        .collect::<Result<Vec<_>, _>>()?;
    files.retain(|path| path.is_file() && has_extension(path, &IMAGE_EXTENSIONS));
    files.sort();
    Ok(files)
}

fn open_rgba(path: &Path) -> Sv4dResult<RgbaImage> {
    let image = image::open(path)
        .map_err(|e| Sv4dError::media(format!("failed to read '{}': {e}", path.display())))?;
    Ok(image.to_rgba8())
}

fn load_raw(path: &Path, n_frames: usize) -> Sv4dResult<Vec<RgbaImage>> {
    let frames = match input_kind(path)? {
        InputKind::Directory => {
            let files = image_files(path)?;
            files
                .iter()
                .take(n_frames)
                .map(|file| open_rgba(file))
                .collect::<Sv4dResult<Vec<_>>>()?
        }
        InputKind::Video => ffmpeg::decode_video_frames(path, n_frames)?,
        InputKind::Image => {
            warn!(
                path = %path.display(),
                n_frames,
                "single input image, repeating it over time"
            );
            vec![open_rgba(path)?; n_frames]
        }
    };

    if frames.len() < n_frames {
        return Err(Sv4dError::validation(format!(
            "'{}' holds {} frames, at least {n_frames} are needed",
            path.display(),
            frames.len()
        )));
    }
    Ok(frames)
}

/// Reads the first `n_frames` frames of `path`, preprocessed to `width x height`.
pub fn read_frames(path: &Path, options: &FrameOptions) -> Sv4dResult<Vec<RgbImage>> {
    options.validate()?;
    let raw = load_raw(path, options.n_frames)?;
    info!(
        path = %path.display(),
        frames = raw.len(),
        "read input frames"
    );
    Ok(raw.iter().map(|frame| preprocess(frame, options)).collect())
}

/// Background removal, square crop and resize of one frame.
pub fn preprocess(frame: &RgbaImage, options: &FrameOptions) -> RgbImage {
    let keyed;
    let frame = if options.remove_bg {
        keyed = remove_background(frame);
        &keyed
    } else {
        frame
    };

    let square = match options.image_frame_ratio {
        Some(ratio) => crop_to_foreground(frame, ratio),
        None => center_square(frame),
    };
    let image = composite_on_white(&square);
    imageops::resize(&image, options.width, options.height, FilterType::Lanczos3)
}

fn has_transparency(image: &RgbaImage) -> bool {
    image.pixels().any(|pixel| pixel[3] < u8::MAX)
}

/// Mean colour of the outermost pixel ring.
fn border_color(image: &RgbaImage) -> [u8; 3] {
    let (width, height) = image.dimensions();
    let mut sum = [0u64; 3];
    let mut count = 0u64;
    for (x, y, pixel) in image.enumerate_pixels() {
        if x == 0 || y == 0 || x + 1 == width || y + 1 == height {
            for channel in 0..3 {
                sum[channel] += pixel[channel] as u64;
            }
            count += 1;
        }
    }
    let count = count.max(1);
    sum.map(|total| (total / count) as u8)
}

/// Foreground as alpha. An existing alpha channel is kept; opaque images are
/// keyed against their border colour.
pub fn remove_background(image: &RgbaImage) -> RgbaImage {
    if has_transparency(image) {
        return image.clone();
    }
    let key = border_color(image);
    let mut keyed = image.clone();
    for pixel in keyed.pixels_mut() {
        let is_background =
            (0..3).all(|channel| pixel[channel].abs_diff(key[channel]) <= KEY_TOLERANCE);
        if is_background {
            pixel[3] = 0;
        }
    }
    keyed
}

fn composite_on_white(image: &RgbaImage) -> RgbImage {
    RgbImage::from_fn(image.width(), image.height(), |x, y| {
        let pixel = image.get_pixel(x, y);
        let alpha = pixel[3] as f32 / 255.0;
        Rgb([0, 1, 2].map(|channel| {
            (pixel[channel] as f32 * alpha + 255.0 * (1.0 - alpha)).round() as u8
        }))
    })
}

fn center_square(image: &RgbaImage) -> RgbaImage {
    let (width, height) = image.dimensions();
    let side = width.min(height);
    imageops::crop_imm(image, (width - side) / 2, (height - side) / 2, side, side).to_image()
}

/// `(x0, y0, x1, y1)` of the non-transparent pixels, exclusive upper bounds.
fn foreground_bounds(image: &RgbaImage) -> Option<(u32, u32, u32, u32)> {
    image
        .enumerate_pixels()
        .filter(|(_, _, pixel)| pixel[3] > 0)
        .fold(None, |bounds, (x, y, _)| match bounds {
            None => Some((x, y, x + 1, y + 1)),
            Some((x0, y0, x1, y1)) => Some((x0.min(x), y0.min(y), x1.max(x + 1), y1.max(y + 1))),
        })
}

/// Square canvas centred on the foreground, sized so the foreground spans
/// `ratio` of its side. Areas outside the frame are transparent.
fn crop_to_foreground(image: &RgbaImage, ratio: f32) -> RgbaImage {
    let Some((x0, y0, x1, y1)) = foreground_bounds(image) else {
        debug!("no foreground found, falling back to a centre crop");
        return center_square(image);
    };
    let extent = (x1 - x0).max(y1 - y0);
    let side = ((extent as f32 / ratio).round() as u32).max(1);
    let center_x = (x0 + x1) as i64 / 2;
    let center_y = (y0 + y1) as i64 / 2;

    let mut canvas = RgbaImage::from_pixel(side, side, Rgba([255, 255, 255, 0]));
    let offset = side as i64 / 2;
    imageops::overlay(&mut canvas, image, offset - center_x, offset - center_y);
    canvas
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(n_frames: usize) -> FrameOptions {
        FrameOptions {
            width: 8,
            height: 8,
            n_frames,
            remove_bg: false,
            image_frame_ratio: None,
        }
    }

    /// Grey background with a red square in the top-left quadrant.
    fn object_on_grey(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_fn(width, height, |x, y| {
            if (2..6).contains(&x) && (2..6).contains(&y) {
                Rgba([220, 10, 10, 255])
            } else {
                Rgba([90, 90, 90, 255])
            }
        })
    }

    #[test]
    fn directory_frames_are_sorted_and_truncated() {
        let dir = tempfile::tempdir().unwrap();
        for (name, value) in [("b.png", 200u8), ("a.png", 10), ("c.png", 100)] {
            RgbImage::from_pixel(4, 4, Rgb([value; 3]))
                .save(dir.path().join(name))
                .unwrap();
        }
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let frames = read_frames(dir.path(), &options(2)).unwrap();

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].dimensions(), (8, 8));
        assert!(frames[0].get_pixel(4, 4)[0].abs_diff(10) <= 1);
        assert!(frames[1].get_pixel(4, 4)[0].abs_diff(200) <= 1);
    }

    #[test]
    fn too_few_frames_is_a_validation_error() {
        let dir = tempfile::tempdir().unwrap();
        RgbImage::new(4, 4).save(dir.path().join("only.png")).unwrap();

        let err = read_frames(dir.path(), &options(3)).unwrap_err();

        assert!(err.is_validation());
    }

    #[test]
    fn single_image_is_repeated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("still.png");
        RgbImage::from_pixel(6, 4, Rgb([30, 60, 90])).save(&path).unwrap();

        let frames = read_frames(&path, &options(5)).unwrap();

        assert_eq!(frames.len(), 5);
        assert!(frames.iter().all(|frame| frame == &frames[0]));
    }

    #[test]
    fn missing_input_is_rejected() {
        let err = read_frames(Path::new("no/such/input.png"), &options(1)).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn center_square_keeps_the_middle() {
        let image = RgbaImage::from_fn(6, 2, |x, _| Rgba([x as u8, 0, 0, 255]));

        let square = center_square(&image);

        assert_eq!(square.dimensions(), (2, 2));
        assert_eq!(square.get_pixel(0, 0)[0], 2);
    }

    #[test]
    fn border_keying_turns_background_white() {
        let keyed = remove_background(&object_on_grey(8, 8));
        let image = composite_on_white(&keyed);

        assert_eq!(image.get_pixel(0, 0), &Rgb([255, 255, 255]));
        assert_eq!(image.get_pixel(3, 3), &Rgb([220, 10, 10]));
    }

    #[test]
    fn existing_alpha_is_kept() {
        let mut image = object_on_grey(4, 4);
        image.put_pixel(0, 0, Rgba([0, 0, 0, 0]));

        let keyed = remove_background(&image);

        assert_eq!(keyed, image);
    }

    #[test]
    fn frame_ratio_sizes_the_canvas_around_the_foreground() {
        let keyed = remove_background(&object_on_grey(12, 12));

        let square = crop_to_foreground(&keyed, 0.5);

        // 4 px foreground spanning half the side
        assert_eq!(square.dimensions(), (8, 8));
        assert_eq!(foreground_bounds(&square), Some((2, 2, 6, 6)));
    }

    #[test]
    fn invalid_frame_ratio_is_rejected() {
        let mut options = options(1);
        options.image_frame_ratio = Some(1.5);
        assert!(options.validate().unwrap_err().is_validation());
    }
}
