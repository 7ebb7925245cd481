//! Image saving utilities.

use std::path::Path;

use image::{imageops::FilterType, DynamicImage, ImageBuffer, Rgb, RgbImage};

use crate::error::{Error, Result};

use super::ImageTensor;

/// Save a tensor as an image file.
///
/// The tensor is:
/// 1. Scaled from [0, 1] to [0, 255], clipping anything the optimizer pushed
///    outside the valid range
/// 2. Resized to the original dimensions if provided
/// 3. Saved to the specified path (format inferred from extension)
///
/// # Arguments
///
/// * `tensor` - NCHW tensor with batch size 1 and 3 channels
/// * `path` - Output file path
/// * `original_dims` - Optional dimensions to resize to
/// * `quality` - JPEG quality (1-100), ignored for other formats
///
/// # Errors
///
/// Returns an error if the image cannot be saved.
pub fn save_image<P: AsRef<Path>>(
    tensor: &ImageTensor,
    path: P,
    original_dims: Option<(u32, u32)>,
    quality: u8,
) -> Result<()> {
    let path = path.as_ref();

    let img = DynamicImage::ImageRgb8(tensor_to_image(tensor)?);

    let final_img = match original_dims {
        Some((width, height)) if (width, height) != (img.width(), img.height()) => {
            img.resize_exact(width, height, FilterType::Lanczos3)
        }
        _ => img,
    };

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("png")
        .to_lowercase();

    match extension.as_str() {
        "jpg" | "jpeg" => {
            let mut output = std::fs::File::create(path)?;
            let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut output, quality);
            final_img
                .write_with_encoder(encoder)
                .map_err(|source| Error::ImageSave {
                    path: path.to_path_buf(),
                    source,
                })?;
        }
        _ => {
            final_img.save(path).map_err(|source| Error::ImageSave {
                path: path.to_path_buf(),
                source,
            })?;
        }
    }

    Ok(())
}

/// Convert a unit-range NCHW tensor to an RGB image.
#[allow(clippy::cast_possible_truncation)]
fn tensor_to_image(tensor: &ImageTensor) -> Result<RgbImage> {
    let (batch, channels, height, width) = tensor.dim();
    if batch != 1 || channels != 3 {
        return Err(Error::ShapeMismatch {
            expected: "(1, 3, H, W)".to_string(),
            actual: format!("{:?}", tensor.dim()),
        });
    }

    // Safe: dimensions originate from a u32 image size
    let img = ImageBuffer::from_fn(width as u32, height as u32, |x, y| {
        let (x, y) = (x as usize, y as usize);
        Rgb([
            denormalize(tensor[[0, 0, y, x]]),
            denormalize(tensor[[0, 1, y, x]]),
            denormalize(tensor[[0, 2, y, x]]),
        ])
    });

    Ok(img)
}

/// Map a value from [0, 1] to [0, 255], rounding and clamping.
#[inline]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn denormalize(value: f32) -> u8 {
    // Safe: clamped to [0, 255] range before casting
    value.mul_add(255.0, 0.5).clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array4;

    #[test]
    fn test_denormalize() {
        assert_eq!(denormalize(0.0), 0);
        assert_eq!(denormalize(0.5), 128);
        assert_eq!(denormalize(1.0), 255);
    }

    #[test]
    fn test_denormalize_clamp() {
        assert_eq!(denormalize(-0.7), 0);
        assert_eq!(denormalize(3.0), 255);
        assert_eq!(denormalize(f32::NAN), 0);
    }

    #[test]
    fn test_save_restores_original_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.png");
        let tensor = Array4::<f32>::from_elem((1, 3, 32, 32), 0.25);

        save_image(&tensor, &path, Some((48, 20)), 95).unwrap();

        let saved = image::open(&path).unwrap();
        assert_eq!((saved.width(), saved.height()), (48, 20));
    }

    #[test]
    fn test_save_jpeg_without_resize() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.jpg");
        let tensor = Array4::<f32>::from_elem((1, 3, 16, 16), 0.5);

        save_image(&tensor, &path, None, 90).unwrap();

        let saved = image::open(&path).unwrap();
        assert_eq!((saved.width(), saved.height()), (16, 16));
    }

    #[test]
    fn test_rejects_non_rgb_tensor() {
        let tensor = Array4::<f32>::zeros((1, 1, 4, 4));
        assert!(matches!(
            tensor_to_image(&tensor),
            Err(Error::ShapeMismatch { .. })
        ));
    }
}
