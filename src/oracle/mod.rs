//! # Diffusion oracles
//!
//! The pretrained networks sit behind [`DiffusionOracle`]; the sampler only
//! decides which slots to synthesize and what to condition them on.

use burn::tensor::{backend::Backend, Tensor};

use crate::camera::CameraTrajectory;
use crate::error::Sv4dResult;

pub mod preview;

pub use preview::PreviewOracle;

/// Multi-view model variant producing the frame-0 orbit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Sv3dVersion {
    /// Fixed orbit at zero elevation; requested camera angles are ignored.
    #[default]
    Sv3dU,
    /// Orbit follows the requested elevations and azimuths.
    Sv3dP,
}

/// Scalar conditioning shared by every call of a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MicroConditioning {
    pub fps_id: usize,
    pub motion_bucket_id: usize,
    /// Standard deviation of the noise added to conditioning images.
    pub cond_aug: f64,
}

/// Inputs of one video diffusion call covering `frames × views` slots.
#[derive(Debug, Clone)]
pub struct Conditioning<B: Backend> {
    /// View 0 at the reference frame, `[3, H, W]` in `[-1, 1]`.
    pub image: Tensor<B, 3>,
    /// View 0 at each covered frame, `[frames, 3, H, W]`.
    pub cond_motion: Tensor<B, 4>,
    /// Reference frame at each covered view, `[views, 3, H, W]`.
    pub cond_view: Tensor<B, 4>,
    /// `frames * views` polar angles, frame-major.
    pub polars_rad: Vec<f64>,
    /// `frames * views` azimuths relative to view 0, frame-major.
    pub azimuths_rad: Vec<f64>,
    pub frames: usize,
    pub views: usize,
    pub micro: MicroConditioning,
}

/// The four model capabilities the sampler relies on.
///
/// Image batches returned by [`sample`](DiffusionOracle::sample) and
/// [`decode`](DiffusionOracle::decode) are in `[0, 1]`; the sampler maps
/// them into the `[-1, 1]` range of the grid.
pub trait DiffusionOracle<B: Backend> {
    /// Orbit of `camera.n_views()` views around a single image, `[n, 3, H, W]`
    /// in `[-1, 1]`. The last view is the input camera.
    fn sample_multiview(
        &self,
        image: Tensor<B, 3>,
        camera: &CameraTrajectory,
        micro: &MicroConditioning,
    ) -> Sv4dResult<Tensor<B, 4>>;

    /// Full sampling loop, `[frames * views, 3, H, W]` in `[0, 1]`, frame-major.
    fn sample(&self, cond: &Conditioning<B>) -> Sv4dResult<Tensor<B, 4>>;

    /// One denoising step on `[frames * views, C, H/F, W/F]` latents.
    ///
    /// At `step == 0` the latents are unit-variance noise.
    fn step(
        &self,
        cond: &Conditioning<B>,
        step: usize,
        noisy_latents: Tensor<B, 4>,
    ) -> Sv4dResult<Tensor<B, 4>>;

    /// Latents `[n, C, H/F, W/F]` to images `[n, 3, H, W]` in `[0, 1]`.
    fn decode(&self, latents: Tensor<B, 4>) -> Sv4dResult<Tensor<B, 4>>;
}
