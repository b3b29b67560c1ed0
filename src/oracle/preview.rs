//! Weight-free oracle for dry runs.
//!
//! Stands in for the pretrained networks so a whole sampling run, including
//! video output, can be exercised without model weights. The "denoiser"
//! predicts each slot as its view-conditioning image shifted by the motion of
//! view 0 relative to the reference frame; the "VAE" is average pooling by the
//! latent factor with zero-padded channels, decoded by nearest upsampling.

use std::f64::consts::TAU;

use burn::tensor::{backend::Backend, module::avg_pool2d, Distribution, Tensor};
use tracing::debug;

use super::{Conditioning, DiffusionOracle, MicroConditioning, Sv3dVersion};
use crate::camera::CameraTrajectory;
use crate::error::{Sv4dError, Sv4dResult};
use crate::pipelines::sv4d::Sv4dConfig;
use crate::schedulers::{EdmConfig, EdmScheduler};
use crate::utils::{pad_with_zeros, roll_last_dim, upsample::upsample_nearest2d};

#[derive(Debug, Clone)]
pub struct PreviewOracle<B: Backend> {
    scheduler: EdmScheduler<B>,
    latent_channels: usize,
    vae_factor: usize,
    sv3d_version: Sv3dVersion,
}

impl<B: Backend> PreviewOracle<B> {
    pub fn new(config: &Sv4dConfig, edm: &EdmConfig) -> Sv4dResult<Self> {
        if config.latent_channels < 3 {
            return Err(Sv4dError::validation(format!(
                "the preview oracle needs at least 3 latent channels, got {}",
                config.latent_channels
            )));
        }
        if config.vae_factor == 0 {
            return Err(Sv4dError::validation("vae factor must be non-zero"));
        }

        Ok(Self {
            scheduler: EdmScheduler::new(config.num_steps, edm),
            latent_channels: config.latent_channels,
            vae_factor: config.vae_factor,
            sv3d_version: Sv3dVersion::default(),
        })
    }

    pub fn with_sv3d_version(mut self, sv3d_version: Sv3dVersion) -> Self {
        self.sv3d_version = sv3d_version;
        self
    }

    pub fn sv3d_version(&self) -> Sv3dVersion {
        self.sv3d_version
    }

    pub fn scheduler(&self) -> &EdmScheduler<B> {
        &self.scheduler
    }

    /// `[n, 3, H, W]` in `[-1, 1]` to `[n, C, H/F, W/F]`.
    pub fn encode(&self, images: Tensor<B, 4>) -> Tensor<B, 4> {
        let factor = self.vae_factor;
        let pooled = avg_pool2d(images, [factor, factor], [factor, factor], [0, 0], true);
        pad_with_zeros(pooled, 1, 0, self.latent_channels - 3)
    }

    fn decode_to_unit(&self, latents: Tensor<B, 4>) -> Tensor<B, 4> {
        let [n, _, height, width] = latents.dims();
        let rgb = latents.slice([0..n, 0..3, 0..height, 0..width]);
        upsample_nearest2d(rgb, self.vae_factor)
            .add_scalar(1.0)
            .div_scalar(2.0)
            .clamp(0.0, 1.0)
    }

    /// Images each slot of the call should converge to, `[frames * views, 3, H, W]`.
    fn targets(&self, cond: &Conditioning<B>) -> Sv4dResult<Tensor<B, 4>> {
        let [frames, channels, height, width] = cond.cond_motion.dims();
        let [views, ..] = cond.cond_view.dims();
        if frames != cond.frames || views != cond.views {
            return Err(Sv4dError::oracle(format!(
                "conditioning holds {frames}x{views} images for a {}x{} call",
                cond.frames, cond.views
            )));
        }

        let mut reference = cond.image.clone().unsqueeze::<4>();
        if cond.micro.cond_aug > 0.0 {
            let noise = Tensor::random(
                reference.shape(),
                Distribution::Normal(0.0, cond.micro.cond_aug),
                &reference.device(),
            );
            reference = reference + noise;
        }

        let motion = (cond.cond_motion.clone() - reference.repeat(0, frames))
            .unsqueeze_dim::<5>(1)
            .repeat(1, views);
        let view = cond.cond_view.clone().unsqueeze::<5>().repeat(0, frames);

        Ok((view + motion)
            .reshape([frames * views, channels, height, width])
            .clamp(-1.0, 1.0))
    }
}

impl<B: Backend> DiffusionOracle<B> for PreviewOracle<B> {
    fn sample_multiview(
        &self,
        image: Tensor<B, 3>,
        camera: &CameraTrajectory,
        _micro: &MicroConditioning,
    ) -> Sv4dResult<Tensor<B, 4>> {
        let [_, _, width] = image.dims();
        let fixed;
        let orbit = match self.sv3d_version {
            Sv3dVersion::Sv3dP => camera,
            Sv3dVersion::Sv3dU => {
                fixed = CameraTrajectory::from_degrees(&[0.0], None, camera.n_views())?;
                &fixed
            }
        };
        let views = orbit
            .azimuths_rad()
            .iter()
            .map(|azimuth| {
                let shift = (azimuth / TAU * width as f64).round() as isize;
                roll_last_dim(image.clone(), shift).unsqueeze::<4>()
            })
            .collect();
        Ok(Tensor::cat(views, 0))
    }

    fn sample(&self, cond: &Conditioning<B>) -> Sv4dResult<Tensor<B, 4>> {
        let denoised = self.encode(self.targets(cond)?);
        let mut latents = Tensor::random(
            denoised.shape(),
            Distribution::Normal(0.0, 1.0),
            &denoised.device(),
        )
        .mul_scalar(self.scheduler.init_noise_sigma());

        for step in 0..self.scheduler.num_steps() {
            latents = self.scheduler.step(denoised.clone(), latents, step);
        }
        debug!(slots = cond.frames * cond.views, "preview sample");

        Ok(self.decode_to_unit(latents))
    }

    fn step(
        &self,
        cond: &Conditioning<B>,
        step: usize,
        noisy_latents: Tensor<B, 4>,
    ) -> Sv4dResult<Tensor<B, 4>> {
        if step >= self.scheduler.num_steps() {
            return Err(Sv4dError::oracle(format!(
                "step {step} outside a {}-step schedule",
                self.scheduler.num_steps()
            )));
        }
        let denoised = self.encode(self.targets(cond)?);
        if denoised.dims() != noisy_latents.dims() {
            return Err(Sv4dError::oracle(format!(
                "latents of shape {:?} do not match the expected {:?}",
                noisy_latents.dims(),
                denoised.dims()
            )));
        }

        let latents = if step == 0 {
            noisy_latents.mul_scalar(self.scheduler.init_noise_sigma())
        } else {
            noisy_latents
        };
        Ok(self.scheduler.step(denoised, latents, step))
    }

    fn decode(&self, latents: Tensor<B, 4>) -> Sv4dResult<Tensor<B, 4>> {
        let [_, channels, _, _] = latents.dims();
        if channels != self.latent_channels {
            return Err(Sv4dError::oracle(format!(
                "expected {} latent channels, got {channels}",
                self.latent_channels
            )));
        }
        Ok(self.decode_to_unit(latents))
    }
}
