use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

/// Nearest-neighbour upsampling of `[batch, channels, height, width]` by an
/// integer `factor` on both spatial axes.
pub fn upsample_nearest2d<B: Backend>(tensor: Tensor<B, 4>, factor: usize) -> Tensor<B, 4> {
    if factor == 1 {
        return tensor;
    }
    let [batch_size, channels, height, width] = tensor.dims();
    tensor
        .reshape([batch_size, channels, height, 1, width, 1])
        .repeat(3, factor)
        .repeat(5, factor)
        .reshape([batch_size, channels, height * factor, width * factor])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TestBackend;
    use burn::tensor::Data;

    #[test]
    fn test_upsample_nearest2d() {
        let device = Default::default();
        let tensor: Tensor<TestBackend, 4> =
            Tensor::from_floats([[[[1.0, 2.0], [3.0, 4.0]]]], &device);

        let upsampled = upsample_nearest2d(tensor, 2);

        assert_eq!(upsampled.dims(), [1, 1, 4, 4]);
        upsampled.to_data().assert_approx_eq(
            &Data::from([[[
                [1.0, 1.0, 2.0, 2.0],
                [1.0, 1.0, 2.0, 2.0],
                [3.0, 3.0, 4.0, 4.0],
                [3.0, 3.0, 4.0, 4.0],
            ]]]),
            3,
        );
    }
}
