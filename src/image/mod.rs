//! Image loading, saving, and device transfer utilities.

mod load;
mod save;

pub use load::load_image;
pub use save::save_image;

use candle_core::{Device, Tensor};
use ndarray::Array4;

use crate::error::{Error, Result};

/// Image tensor in NCHW format (batch, channels, height, width).
/// Values are in the [0, 1] range expected by the feature extractor.
pub type ImageTensor = Array4<f32>;

/// Default square working resolution.
pub const DEFAULT_IMAGE_SIZE: u32 = 356;

/// Number of channels in RGB images.
pub const RGB_CHANNELS: usize = 3;

/// Copy a host image tensor onto `device`.
///
/// # Errors
///
/// Returns an error if the device allocation fails.
pub fn to_device(tensor: &ImageTensor, device: &Device) -> Result<Tensor> {
    let data: Vec<f32> = tensor.iter().copied().collect();
    Ok(Tensor::from_vec(data, tensor.dim(), device)?)
}

/// Copy a device tensor of shape (1, 3, H, W) back to the host.
///
/// # Errors
///
/// Returns an error if the tensor is not 4D or cannot be read back.
pub fn from_device(tensor: &Tensor) -> Result<ImageTensor> {
    let dims = tensor.dims4()?;
    let data = tensor
        .to_device(&Device::Cpu)?
        .flatten_all()?
        .to_vec1::<f32>()?;

    Array4::from_shape_vec(dims, data).map_err(|_| Error::ShapeMismatch {
        expected: format!("{dims:?}"),
        actual: "reshape failed".to_string(),
    })
}
