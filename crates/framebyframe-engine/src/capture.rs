use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use framebyframe_contracts::slots::CapturedImage;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, Rgba, RgbaImage};
use sha2::{Digest, Sha256};

/// Where captures come from. `None` means the shutter fired but nothing usable
/// was produced; the session ignores such events.
pub trait CaptureSource {
    fn take_snapshot(&mut self) -> Option<CapturedImage>;
}

/// Yields one file, once.
#[derive(Debug, Clone)]
pub struct FileCapture {
    path: Option<PathBuf>,
}

impl FileCapture {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }
}

impl CaptureSource for FileCapture {
    fn take_snapshot(&mut self) -> Option<CapturedImage> {
        let path = self.path.take()?;
        load_captured_image(&path).ok()
    }
}

/// Yields queued files in order, one per shutter press.
#[derive(Debug, Clone, Default)]
pub struct QueuedCapture {
    queue: VecDeque<PathBuf>,
}

impl QueuedCapture {
    pub fn new<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            queue: paths.into_iter().map(Into::into).collect(),
        }
    }

    pub fn push(&mut self, path: impl Into<PathBuf>) {
        self.queue.push_back(path.into());
    }

    pub fn remaining(&self) -> usize {
        self.queue.len()
    }
}

impl CaptureSource for QueuedCapture {
    fn take_snapshot(&mut self) -> Option<CapturedImage> {
        let path = self.queue.pop_front()?;
        load_captured_image(&path).ok()
    }
}

pub fn load_captured_image(path: &Path) -> Result<CapturedImage> {
    let bytes = fs::read(path).with_context(|| format!("failed reading {}", path.display()))?;
    if bytes.is_empty() {
        anyhow::bail!("{} is empty", path.display());
    }
    Ok(CapturedImage::new(bytes, guess_image_mime(path)))
}

pub fn guess_image_mime(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        _ => "image/png",
    }
}

pub fn image_fingerprint(image: &CapturedImage) -> String {
    let mut hasher = Sha256::new();
    hasher.update(image.bytes());
    hex::encode(hasher.finalize())
}

/// Encodes a capture as a `data:` URL for upload, downscaled to fit `max_dim`
/// and flattened onto white. Bytes the decoder cannot read are sent as-is.
pub fn upload_data_url(image: &CapturedImage, max_dim: u32) -> String {
    let (bytes, mime) = prepare_upload_image(image, max_dim)
        .unwrap_or_else(|| (image.bytes().to_vec(), image.mime_type().to_string()));
    format!("data:{mime};base64,{}", BASE64.encode(bytes))
}

fn prepare_upload_image(image: &CapturedImage, max_dim: u32) -> Option<(Vec<u8>, String)> {
    let dim = max_dim.max(128);
    let decoded = image::load_from_memory(image.bytes()).ok()?;
    let rgba = decoded.to_rgba8();
    let mut flattened = RgbaImage::new(rgba.width(), rgba.height());
    for (x, y, pixel) in rgba.enumerate_pixels() {
        let alpha = u16::from(pixel[3]);
        let blend = |channel: u8| -> u8 {
            (((u16::from(channel) * alpha) + (255 * (255 - alpha))) / 255) as u8
        };
        flattened.put_pixel(
            x,
            y,
            Rgba([blend(pixel[0]), blend(pixel[1]), blend(pixel[2]), 255]),
        );
    }
    let flattened = DynamicImage::ImageRgba8(flattened);
    let fitted = if flattened.width() > dim || flattened.height() > dim {
        flattened.resize(dim, dim, FilterType::Triangle)
    } else {
        flattened
    };
    let mut bytes = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut bytes, 90);
    encoder.encode_image(&fitted.to_rgb8()).ok()?;
    Some((bytes, "image/jpeg".to_string()))
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use base64::Engine as _;
    use framebyframe_contracts::slots::CapturedImage;
    use image::{Rgba, RgbaImage};

    use super::{
        guess_image_mime, image_fingerprint, upload_data_url, CaptureSource, FileCapture,
        QueuedCapture, BASE64,
    };

    fn write_png(path: &Path, width: u32, height: u32) -> anyhow::Result<()> {
        let mut image = RgbaImage::new(width, height);
        for pixel in image.pixels_mut() {
            *pixel = Rgba([200, 40, 40, 128]);
        }
        image.save(path)?;
        Ok(())
    }

    #[test]
    fn file_capture_yields_once() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("frame.png");
        write_png(&path, 8, 8)?;

        let mut source = FileCapture::new(&path);
        let image = source.take_snapshot().expect("first snapshot");
        assert_eq!(image.mime_type(), "image/png");
        assert!(!image.is_empty());
        assert!(source.take_snapshot().is_none());
        Ok(())
    }

    #[test]
    fn unreadable_files_yield_nothing() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let empty = temp.path().join("empty.jpg");
        std::fs::write(&empty, b"")?;

        let mut source = QueuedCapture::new([temp.path().join("missing.png"), empty]);
        assert!(source.take_snapshot().is_none());
        assert!(source.take_snapshot().is_none());
        assert_eq!(source.remaining(), 0);
        Ok(())
    }

    #[test]
    fn queued_capture_keeps_order() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let first = temp.path().join("a.png");
        let second = temp.path().join("b.png");
        write_png(&first, 4, 4)?;
        write_png(&second, 6, 6)?;

        let mut source = QueuedCapture::new([&first, &second]);
        let a = source.take_snapshot().expect("first");
        let b = source.take_snapshot().expect("second");
        assert_ne!(image_fingerprint(&a), image_fingerprint(&b));
        assert_eq!(image_fingerprint(&a).len(), 64);
        Ok(())
    }

    #[test]
    fn mime_follows_extension() {
        assert_eq!(guess_image_mime(Path::new("a.JPG")), "image/jpeg");
        assert_eq!(guess_image_mime(Path::new("a.webp")), "image/webp");
        assert_eq!(guess_image_mime(Path::new("a")), "image/png");
    }

    #[test]
    fn upload_url_downscales_decodable_images() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("big.png");
        write_png(&path, 600, 300)?;
        let image = CapturedImage::new(std::fs::read(&path)?, "image/png");

        let url = upload_data_url(&image, 256);
        let encoded = url
            .strip_prefix("data:image/jpeg;base64,")
            .expect("jpeg data url");
        let decoded = image::load_from_memory(&BASE64.decode(encoded)?)?;
        assert_eq!((decoded.width(), decoded.height()), (256, 128));
        Ok(())
    }

    #[test]
    fn upload_url_passes_through_undecodable_bytes() {
        let image = CapturedImage::new(vec![1, 2, 3], "image/webp");
        assert_eq!(upload_data_url(&image, 512), "data:image/webp;base64,AQID");
    }
}
