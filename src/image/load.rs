//! Image loading utilities.

use std::path::Path;

use image::{imageops::FilterType, DynamicImage, GenericImageView};
use ndarray::Array4;

use crate::error::{Error, Result};

use super::{ImageTensor, RGB_CHANNELS};

/// Load an image from disk and convert to a normalized tensor.
///
/// The image is:
/// 1. Decoded from the specified path
/// 2. Converted to RGB if necessary
/// 3. Resized (not cropped) to `size`x`size` with a bilinear filter
/// 4. Scaled to the [0, 1] range
/// 5. Returned as NCHW tensor (1, 3, size, size)
///
/// The original dimensions are returned alongside so the result can be
/// restored to them on save.
///
/// # Errors
///
/// Returns an error if the image cannot be read or decoded.
pub fn load_image<P: AsRef<Path>>(path: P, size: u32) -> Result<(ImageTensor, (u32, u32))> {
    let path = path.as_ref();

    let img = image::open(path).map_err(|source| Error::ImageLoad {
        path: path.to_path_buf(),
        source,
    })?;

    let original_dims = img.dimensions();

    let tensor = image_to_tensor(&img, size);

    Ok((tensor, original_dims))
}

/// Convert a `DynamicImage` to a unit-range NCHW tensor.
fn image_to_tensor(img: &DynamicImage, size: u32) -> ImageTensor {
    let rgb = img.to_rgb8();

    // Already at the working size: sample pixels directly so loading is idempotent
    let rgb = if rgb.dimensions() == (size, size) {
        rgb
    } else {
        image::imageops::resize(&rgb, size, size, FilterType::Triangle)
    };

    let side = size as usize;
    let mut tensor = Array4::<f32>::zeros((1, RGB_CHANNELS, side, side));

    for (x, y, pixel) in rgb.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        for c in 0..RGB_CHANNELS {
            tensor[[0, c, y, x]] = f32::from(pixel[c]) / 255.0;
        }
    }

    tensor
}
