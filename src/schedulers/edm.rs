use std::marker::PhantomData;

use burn::{config::Config, tensor::backend::Backend, tensor::Tensor};

/// The configuration for the EDM (Karras) discretization.
#[derive(Config, Debug)]
pub struct EdmConfig {
    /// Smallest noise level of the schedule.
    #[config(default = 0.002)]
    pub sigma_min: f64,
    /// Largest noise level, used to scale the initial noise.
    #[config(default = 700.0)]
    pub sigma_max: f64,
    /// Curvature of the schedule; higher spends more steps at low noise.
    #[config(default = 7.0)]
    pub rho: f64,
}

/// Noise levels for a fixed number of Euler steps.
///
/// `sigmas` has `num_steps + 1` entries, the last one being zero.
#[derive(Debug, Clone)]
pub struct EdmScheduler<B: Backend> {
    sigmas: Vec<f64>,
    init_noise_sigma: f64,
    __phantom: PhantomData<B>,
}

impl<B: Backend> EdmScheduler<B> {
    pub fn new(num_steps: usize, config: &EdmConfig) -> Self {
        let min_inv_rho = config.sigma_min.powf(1.0 / config.rho);
        let max_inv_rho = config.sigma_max.powf(1.0 / config.rho);
        let denominator = num_steps.saturating_sub(1).max(1) as f64;

        let mut sigmas: Vec<f64> = (0..num_steps)
            .map(|i| {
                let ramp = i as f64 / denominator;
                (max_inv_rho + ramp * (min_inv_rho - max_inv_rho)).powf(config.rho)
            })
            .collect();
        sigmas.push(0.0);

        let init_noise_sigma = (1.0 + sigmas[0] * sigmas[0]).sqrt();

        Self {
            sigmas,
            init_noise_sigma,
            __phantom: PhantomData,
        }
    }

    pub fn num_steps(&self) -> usize {
        self.sigmas.len() - 1
    }

    pub fn sigmas(&self) -> &[f64] {
        &self.sigmas
    }

    /// Scale applied to unit-variance noise before the first step.
    pub fn init_noise_sigma(&self) -> f64 {
        self.init_noise_sigma
    }

    // Euler step of the probability-flow ODE from sigma[step] to sigma[step + 1]
    pub fn step<const D: usize>(
        &self,
        denoised: Tensor<B, D>,
        sample: Tensor<B, D>,
        step: usize,
    ) -> Tensor<B, D> {
        let sigma = self.sigmas[step];
        let sigma_next = self.sigmas[step + 1];
        let derivative = (sample.clone() - denoised).div_scalar(sigma);

        sample + derivative.mul_scalar(sigma_next - sigma)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TestBackend;
    use burn::tensor::Data;

    #[test]
    fn sigmas_run_from_max_to_zero() {
        let scheduler = EdmScheduler::<TestBackend>::new(20, &EdmConfig::new());
        let sigmas = scheduler.sigmas();

        assert_eq!(sigmas.len(), 21);
        assert!((sigmas[0] - 700.0).abs() < 1e-9);
        assert!((sigmas[19] - 0.002).abs() < 1e-9);
        assert_eq!(sigmas[20], 0.0);
        assert!(sigmas.windows(2).all(|pair| pair[0] > pair[1]));
        assert!((scheduler.init_noise_sigma() - (1.0f64 + 700.0 * 700.0).sqrt()).abs() < 1e-9);
    }

    #[test]
    fn final_step_lands_on_denoised() {
        let device = Default::default();
        let scheduler = EdmScheduler::<TestBackend>::new(2, &EdmConfig::new());

        let denoised: Tensor<TestBackend, 2> =
            Tensor::from_floats([[0.5, -0.25], [1.0, 0.0]], &device);
        let sample: Tensor<TestBackend, 2> =
            Tensor::from_floats([[3.0, 2.0], [-4.0, 8.0]], &device);

        let out = scheduler.step(denoised, sample, 1);

        out.to_data()
            .assert_approx_eq(&Data::from([[0.5, -0.25], [1.0, 0.0]]), 3);
    }

    #[test]
    fn step_shrinks_distance_by_sigma_ratio() {
        let device = Default::default();
        let config = EdmConfig::new().with_sigma_max(10.0).with_sigma_min(1.0);
        let scheduler = EdmScheduler::<TestBackend>::new(3, &config);
        let ratio = scheduler.sigmas()[1] / scheduler.sigmas()[0];

        let denoised: Tensor<TestBackend, 1> = Tensor::from_floats([1.0], &device);
        let sample: Tensor<TestBackend, 1> = Tensor::from_floats([11.0], &device);
        let out = scheduler.step(denoised, sample, 0);

        let expected = 1.0 + 10.0 * ratio;
        out.to_data()
            .assert_approx_eq(&Data::from([expected as f32]), 3);
    }
}
