#![allow(dead_code)]

use std::cell::{Cell, RefCell};

use burn::tensor::{backend::Backend, Tensor};
use sv4d_burn::{
    camera::CameraTrajectory,
    oracle::{Conditioning, DiffusionOracle, MicroConditioning},
    pipelines::sv4d::{SampleSink, Sv4dConfig, VideoKind},
    schedule::DenseWindow,
    Sv4dResult,
};

pub type TestBackend = burn::backend::NdArray<f32>;

pub const HEIGHT: usize = 4;
pub const WIDTH: usize = 4;
pub const VAE_FACTOR: usize = 2;

/// Value written by `sample`, in the `[0, 1]` oracle range.
pub const SAMPLED: f32 = 1.0;
/// Value written by `decode`, in the `[0, 1]` oracle range.
pub const DECODED: f32 = 0.0;

/// 7 frames, 3 views, 3 frames per call.
pub fn small_config() -> Sv4dConfig {
    Sv4dConfig::new(vec![0, 1, 2])
        .with_frames_per_call(3)
        .with_views_per_call(2)
        .with_n_frames(7)
        .with_n_views_source(3)
        .with_latent_channels(2)
        .with_vae_factor(VAE_FACTOR)
        .with_height(HEIGHT)
        .with_width(WIDTH)
        .with_num_steps(3)
        .with_decode_batch(4)
}

/// `n_frames` frames with `frames_per_call` frames and `views_per_call`
/// novel views per call, two denoising steps.
pub fn geometry_config(n_frames: usize, frames_per_call: usize, views_per_call: usize) -> Sv4dConfig {
    Sv4dConfig::new((0..=views_per_call).collect())
        .with_frames_per_call(frames_per_call)
        .with_views_per_call(views_per_call)
        .with_n_frames(n_frames)
        .with_n_views_source(views_per_call + 1)
        .with_latent_channels(2)
        .with_vae_factor(VAE_FACTOR)
        .with_height(HEIGHT)
        .with_width(WIDTH)
        .with_num_steps(2)
        .with_decode_batch(3)
}

/// Input frame `t` is a constant image of value `t / 100`.
pub fn frame_value(frame: usize) -> f32 {
    frame as f32 / 100.0
}

pub fn input_frames(
    n_frames: usize,
    device: &<TestBackend as Backend>::Device,
) -> Vec<Tensor<TestBackend, 3>> {
    (0..n_frames)
        .map(|frame| Tensor::ones([3, HEIGHT, WIDTH], device).mul_scalar(frame_value(frame)))
        .collect()
}

pub fn mean(tensor: Tensor<TestBackend, 3>) -> f32 {
    let values: Vec<f32> = tensor.into_data().value;
    values.iter().sum::<f32>() / values.len() as f32
}

fn frame_of(value: f32) -> usize {
    (value * 100.0).round() as usize
}

/// One recorded `step` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepCall {
    pub step: usize,
    pub reference: usize,
    pub frames: Vec<usize>,
}

/// Counts oracle calls and recovers the frames each call covers from the
/// constant-valued view 0 images.
#[derive(Default)]
pub struct CountingOracle {
    pub multiview_calls: Cell<usize>,
    pub sample_calls: Cell<usize>,
    pub step_calls: RefCell<Vec<StepCall>>,
    pub decode_calls: RefCell<Vec<usize>>,
}

impl CountingOracle {
    pub fn total_calls(&self) -> usize {
        self.multiview_calls.get()
            + self.sample_calls.get()
            + self.step_calls.borrow().len()
            + self.decode_calls.borrow().len()
    }

    fn covered_frames(cond: &Conditioning<TestBackend>) -> Vec<usize> {
        let [frames, channels, height, width] = cond.cond_motion.dims();
        (0..frames)
            .map(|index| {
                let image = cond
                    .cond_motion
                    .clone()
                    .slice([index..index + 1])
                    .reshape([channels, height, width]);
                frame_of(mean(image))
            })
            .collect()
    }
}

impl DiffusionOracle<TestBackend> for CountingOracle {
    fn sample_multiview(
        &self,
        image: Tensor<TestBackend, 3>,
        camera: &CameraTrajectory,
        _micro: &MicroConditioning,
    ) -> Sv4dResult<Tensor<TestBackend, 4>> {
        self.multiview_calls.set(self.multiview_calls.get() + 1);
        let device = image.device();
        // source view `s` is a constant image of value `s / 10`
        let views = (0..camera.n_views())
            .map(|view| Tensor::ones([1, 3, HEIGHT, WIDTH], &device).mul_scalar(view as f32 / 10.0))
            .collect();
        Ok(Tensor::cat(views, 0))
    }

    fn sample(&self, cond: &Conditioning<TestBackend>) -> Sv4dResult<Tensor<TestBackend, 4>> {
        self.sample_calls.set(self.sample_calls.get() + 1);
        Ok(Tensor::ones([cond.frames * cond.views, 3, HEIGHT, WIDTH], &cond.image.device())
            .mul_scalar(SAMPLED))
    }

    fn step(
        &self,
        cond: &Conditioning<TestBackend>,
        step: usize,
        noisy_latents: Tensor<TestBackend, 4>,
    ) -> Sv4dResult<Tensor<TestBackend, 4>> {
        self.step_calls.borrow_mut().push(StepCall {
            step,
            reference: frame_of(mean(cond.image.clone())),
            frames: Self::covered_frames(cond),
        });
        Ok(noisy_latents)
    }

    fn decode(&self, latents: Tensor<TestBackend, 4>) -> Sv4dResult<Tensor<TestBackend, 4>> {
        let [n, _, height, width] = latents.dims();
        self.decode_calls.borrow_mut().push(n);
        Ok(Tensor::ones(
            [n, 3, height * VAE_FACTOR, width * VAE_FACTOR],
            &latents.device(),
        )
        .mul_scalar(DECODED))
    }
}

/// Remembers which videos were written and how the dense pass progressed.
#[derive(Default)]
pub struct RecordingSink {
    pub videos: Vec<(VideoKind, usize)>,
    pub windows: Vec<(usize, Vec<usize>, usize)>,
    pub steps: Vec<(usize, usize)>,
}

impl<B: Backend> SampleSink<B> for RecordingSink {
    fn write_video(&mut self, kind: VideoKind, frames: &[Tensor<B, 3>]) -> Sv4dResult<()> {
        self.videos.push((kind, frames.len()));
        Ok(())
    }

    fn dense_window_started(&mut self, index: usize, window: &DenseWindow, total: usize) {
        self.windows.push((index, window.frames.clone(), total));
    }

    fn dense_step_finished(&mut self, step: usize, num_steps: usize) {
        self.steps.push((step, num_steps));
    }
}
