// # Screenshot Encoding
//
// Writes captured images to disk, choosing the encoder from the destination
// file extension.

use std::path::Path;

use image::{DynamicImage, ImageFormat};

use crate::error::{CaptureError, CaptureResult};

/// Encoder for `path`'s extension: PNG, JPEG, BMP or GIF. Anything else is PNG.
pub fn output_format_for(path: &Path) -> ImageFormat {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);

    match extension.as_deref() {
        Some("jpg") | Some("jpeg") => ImageFormat::Jpeg,
        Some("bmp") => ImageFormat::Bmp,
        Some("gif") => ImageFormat::Gif,
        _ => ImageFormat::Png,
    }
}

/// Saves `image` to `path`, creating missing parent directories.
///
/// Blocking; call from `spawn_blocking` in async code.
pub fn save_image(image: &DynamicImage, path: &Path) -> CaptureResult<()> {
    if path.as_os_str().is_empty() {
        return Err(CaptureError::validation("file_path", "must not be empty", ""));
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| {
            CaptureError::io_at("create screenshot directory", parent.display().to_string(), e)
        })?;
    }

    let format = output_format_for(path);
    match format {
        // JPEG has no alpha channel.
        ImageFormat::Jpeg => DynamicImage::ImageRgb8(image.to_rgb8()).save_with_format(path, format)?,
        _ => image.save_with_format(path, format)?,
    }
    log::debug!("saved {} as {:?}", path.display(), format);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn sample() -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 4, Rgba([10, 200, 30, 255])))
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(output_format_for(Path::new("x.jpg")), ImageFormat::Jpeg);
        assert_eq!(output_format_for(Path::new("x.JPEG")), ImageFormat::Jpeg);
        assert_eq!(output_format_for(Path::new("shots/x.bmp")), ImageFormat::Bmp);
        assert_eq!(output_format_for(Path::new("x.gif")), ImageFormat::Gif);
        assert_eq!(output_format_for(Path::new("x.png")), ImageFormat::Png);
        assert_eq!(output_format_for(Path::new("x.unknown")), ImageFormat::Png);
        assert_eq!(output_format_for(Path::new("screenshot")), ImageFormat::Png);
    }

    #[test]
    fn test_save_creates_directories_and_encodes_jpeg() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deeper/shot.jpg");

        save_image(&sample(), &path).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(image::guess_format(&bytes).unwrap(), ImageFormat::Jpeg);
    }

    #[test]
    fn test_unknown_extension_is_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shot.unknown");

        save_image(&sample(), &path).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(image::guess_format(&bytes).unwrap(), ImageFormat::Png);
    }

    #[test]
    fn test_empty_path_is_rejected() {
        let err = save_image(&sample(), Path::new("")).unwrap_err();
        assert_eq!(err.category(), "validation");
    }
}
