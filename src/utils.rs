use burn::tensor::backend::Backend;
use burn::tensor::{Element, Numeric, Tensor};

pub mod upsample;

pub(crate) fn pad_with_zeros<B, const D: usize, K>(
    tensor: Tensor<B, D, K>,
    dim: usize,
    left: usize,
    right: usize,
) -> Tensor<B, D, K>
where
    B: Backend,
    K: Numeric<B>,
    K::Elem: Element,
{
    assert!(
        dim < D,
        "dim must be less than the number of dimensions of the tensor"
    );
    if left == 0 && right == 0 {
        return tensor;
    }

    let device = tensor.device();
    let mut dims = tensor.dims();
    let mut parts = Vec::with_capacity(3);
    if left > 0 {
        dims[dim] = left;
        parts.push(Tensor::zeros(dims, &device));
    }
    parts.push(tensor);
    if right > 0 {
        dims[dim] = right;
        parts.push(Tensor::zeros(dims, &device));
    }
    Tensor::cat(parts, dim)
}

/// Circularly shifts `tensor` by `shift` positions along its last dimension,
/// like `torch.roll`.
pub(crate) fn roll_last_dim<B: Backend, const D: usize>(
    tensor: Tensor<B, D>,
    shift: isize,
) -> Tensor<B, D> {
    let dims = tensor.dims();
    let size = dims[D - 1];
    if size == 0 {
        return tensor;
    }
    let shift = shift.rem_euclid(size as isize) as usize;
    if shift == 0 {
        return tensor;
    }

    let split = size - shift;
    let mut head = dims.map(|d| 0..d);
    let mut tail = head.clone();
    head[D - 1] = split..size;
    tail[D - 1] = 0..split;

    Tensor::cat(vec![tensor.clone().slice(head), tensor.slice(tail)], D - 1)
}

/// Circularly shifts a `[n, ...]` batch by `shift` positions along dim 0.
pub(crate) fn roll_batch<B: Backend, const D: usize>(
    tensor: Tensor<B, D>,
    shift: isize,
) -> Tensor<B, D> {
    let dims = tensor.dims();
    let size = dims[0];
    if size == 0 {
        return tensor;
    }
    let shift = shift.rem_euclid(size as isize) as usize;
    if shift == 0 {
        return tensor;
    }

    let split = size - shift;
    let mut head = dims.map(|d| 0..d);
    let mut tail = head.clone();
    head[0] = split..size;
    tail[0] = 0..split;

    Tensor::cat(vec![tensor.clone().slice(head), tensor.slice(tail)], 0)
}
