use burn::tensor::{backend::Backend, Data, Shape, Tensor};
use image::RgbImage;

use crate::error::{Sv4dError, Sv4dResult};

/// RGB8 image to a `[3, H, W]` tensor in `[-1, 1]`.
pub fn image_to_tensor<B: Backend>(image: &RgbImage, device: &B::Device) -> Tensor<B, 3> {
    let (width, height) = image.dimensions();
    let (width, height) = (width as usize, height as usize);
    let plane = width * height;

    let mut values = vec![0f32; 3 * plane];
    for (index, pixel) in image.pixels().enumerate() {
        for channel in 0..3 {
            values[channel * plane + index] = pixel[channel] as f32 / 127.5 - 1.0;
        }
    }

    let data = Data::new(values, Shape::new([3, height, width]));
    Tensor::from_data(data.convert::<B::FloatElem>(), device)
}

/// `[3, H, W]` tensor in `[-1, 1]` to an RGB8 image, clamping out-of-range values.
pub fn tensor_to_image<B: Backend>(tensor: Tensor<B, 3>) -> Sv4dResult<RgbImage> {
    let [channels, height, width] = tensor.dims();
    if channels != 3 {
        return Err(Sv4dError::media(format!(
            "expected an RGB tensor, got {channels} channels"
        )));
    }

    let values: Vec<f32> = tensor.into_data().convert::<f32>().value;
    let plane = width * height;
    let mut bytes = Vec::with_capacity(3 * plane);
    for index in 0..plane {
        for channel in 0..3 {
            let value = (values[channel * plane + index] + 1.0) * 127.5;
            bytes.push(value.round().clamp(0.0, 255.0) as u8);
        }
    }

    RgbImage::from_raw(width as u32, height as u32, bytes)
        .ok_or_else(|| Sv4dError::media("tensor does not match its image buffer"))
}
