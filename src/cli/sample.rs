use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, ValueEnum};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tracing::info;

use burn::tensor::{backend::Backend, Tensor};
use sv4d_burn::{
    camera::CameraTrajectory,
    media::{self, FrameOptions, Mp4Sink},
    oracle::{PreviewOracle, Sv3dVersion},
    pipelines::sv4d::{SampleSink, Sv4dConfig, Sv4dPipeline, VideoKind},
    schedule::DenseWindow,
    schedulers::EdmConfig,
    Sv4dResult,
};

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum DeviceKind {
    Cpu,
    Cuda,
    Gpu,
}

/// Multi-view model used for frame 0.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum Sv3dVersionArg {
    #[value(name = "sv3d_u")]
    Sv3dU,
    #[value(name = "sv3d_p")]
    Sv3dP,
}

impl From<Sv3dVersionArg> for Sv3dVersion {
    fn from(value: Sv3dVersionArg) -> Self {
        match value {
            Sv3dVersionArg::Sv3dU => Sv3dVersion::Sv3dU,
            Sv3dVersionArg::Sv3dP => Sv3dVersion::Sv3dP,
        }
    }
}

#[derive(Args, Debug)]
pub struct SampleArgs {
    /// Input video, folder of image frames, or single image.
    #[arg(long, value_name = "PATH", default_value = "assets/sv4d_videos/test_video1.mp4")]
    pub input: PathBuf,

    #[arg(long, value_name = "DIR", default_value = "outputs/sv4d")]
    pub output_folder: PathBuf,

    /// Number of diffusion steps per call.
    #[arg(long, default_value_t = 20)]
    pub num_steps: usize,

    /// `sv3d_u` ignores the camera angles for frame 0, `sv3d_p` follows them.
    #[arg(long, value_enum, default_value = "sv3d_u")]
    pub sv3d_version: Sv3dVersionArg,

    #[arg(long, default_value_t = 6)]
    pub fps_id: usize,

    #[arg(long, default_value_t = 127)]
    pub motion_bucket_id: usize,

    /// Noise added to the conditioning image.
    #[arg(long, default_value_t = 1e-5)]
    pub cond_aug: f64,

    #[arg(long, default_value_t = 23)]
    pub seed: u64,

    /// Number of latents decoded at once. Lower it when running out of memory.
    #[arg(long, default_value_t = 14)]
    pub decoding_t: usize,

    #[arg(long, value_enum, default_value = "cpu")]
    pub device: DeviceKind,

    /// Camera elevation in degrees: one value, or one per multi-view output.
    #[arg(long, num_args = 1.., default_values_t = [10.0])]
    pub elevations_deg: Vec<f64>,

    /// Camera azimuths in degrees, one per multi-view output.
    #[arg(long, num_args = 1..)]
    pub azimuths_deg: Option<Vec<f64>>,

    /// Crop so the foreground spans this fraction of the frame.
    #[arg(long)]
    pub image_frame_ratio: Option<f32>,

    /// Key out the background of the input frames.
    #[arg(long, action)]
    pub remove_bg: bool,

    /// Frame rate of the written videos.
    #[arg(long, default_value_t = 7)]
    pub fps: u32,

    #[arg(long)]
    pub height: Option<usize>,

    #[arg(long)]
    pub width: Option<usize>,

    /// Debug logging.
    #[arg(long, action)]
    pub verbose: bool,
}

impl SampleArgs {
    pub fn config(&self) -> Sv4dConfig {
        let defaults = Sv4dConfig::sv4d();
        let height = self.height.unwrap_or(defaults.height);
        let width = self.width.unwrap_or(defaults.width);
        defaults
            .with_num_steps(self.num_steps)
            .with_fps_id(self.fps_id)
            .with_motion_bucket_id(self.motion_bucket_id)
            .with_cond_aug(self.cond_aug)
            .with_seed(self.seed)
            .with_decode_batch(self.decoding_t)
            .with_height(height)
            .with_width(width)
    }
}

#[cfg(feature = "wgpu")]
mod backend {
    use super::DeviceKind;
    use burn::backend::wgpu::WgpuDevice;

    pub type Backend = burn::backend::Wgpu;

    pub fn device(kind: DeviceKind) -> anyhow::Result<WgpuDevice> {
        Ok(match kind {
            DeviceKind::Cpu => WgpuDevice::Cpu,
            DeviceKind::Cuda | DeviceKind::Gpu => WgpuDevice::BestAvailable,
        })
    }
}

#[cfg(all(feature = "torch", not(feature = "wgpu")))]
mod backend {
    use super::DeviceKind;
    use burn::backend::libtorch::LibTorchDevice;

    pub type Backend = burn::backend::LibTorch<f32>;

    pub fn device(kind: DeviceKind) -> anyhow::Result<LibTorchDevice> {
        Ok(match kind {
            DeviceKind::Cpu => LibTorchDevice::Cpu,
            DeviceKind::Cuda | DeviceKind::Gpu => LibTorchDevice::Cuda(0),
        })
    }
}

#[cfg(not(any(feature = "torch", feature = "wgpu")))]
mod backend {
    use super::DeviceKind;
    use burn::backend::ndarray::NdArrayDevice;

    pub type Backend = burn::backend::NdArray<f32>;

    pub fn device(kind: DeviceKind) -> anyhow::Result<NdArrayDevice> {
        match kind {
            DeviceKind::Cpu => Ok(NdArrayDevice::Cpu),
            other => anyhow::bail!(
                "device {other:?} needs the `torch` or `wgpu` feature, this build only runs on the cpu"
            ),
        }
    }
}

/// Forwards videos to an [`Mp4Sink`] and shows dense pass progress.
struct ProgressSink {
    inner: Mp4Sink,
    bars: MultiProgress,
    windows: Option<ProgressBar>,
    steps: Option<ProgressBar>,
}

impl ProgressSink {
    fn new(inner: Mp4Sink) -> Self {
        Self {
            inner,
            bars: MultiProgress::new(),
            windows: None,
            steps: None,
        }
    }

    fn bar(&self, len: usize, template: &str) -> ProgressBar {
        let bar = self.bars.add(ProgressBar::new(len as u64));
        if let Ok(style) = ProgressStyle::default_bar().template(template) {
            bar.set_style(style.progress_chars("#>-"));
        }
        bar
    }

    fn finish(&self) {
        for bar in [&self.steps, &self.windows].into_iter().flatten() {
            bar.finish_and_clear();
        }
    }
}

impl<B: Backend> SampleSink<B> for ProgressSink {
    fn write_video(&mut self, kind: VideoKind, frames: &[Tensor<B, 3>]) -> Sv4dResult<()> {
        self.inner.write_video(kind, frames)
    }

    fn dense_window_started(&mut self, index: usize, window: &DenseWindow, total: usize) {
        if self.windows.is_none() {
            self.windows = Some(self.bar(total, "windows [{bar:30.cyan/blue}] {pos}/{len} {msg}"));
        }
        if let Some(windows) = &self.windows {
            windows.set_position(index as u64);
            windows.set_message(format!("frames {:?}", window.frames));
        }
        if let Some(steps) = self.steps.take() {
            steps.finish_and_clear();
        }
    }

    fn dense_step_finished(&mut self, step: usize, num_steps: usize) {
        if self.steps.is_none() {
            self.steps = Some(self.bar(num_steps, "steps   [{bar:30.green/white}] {pos}/{len}"));
        }
        if let Some(steps) = &self.steps {
            steps.set_position(step as u64 + 1);
        }
        if step + 1 == num_steps {
            if let Some(windows) = &self.windows {
                windows.inc(1);
            }
        }
    }
}

pub fn handle_sample(args: &SampleArgs) -> Result<()> {
    type B = backend::Backend;

    let config = args.config();
    config.validate().context("invalid sampling configuration")?;
    CameraTrajectory::from_degrees(
        &args.elevations_deg,
        args.azimuths_deg.as_deref(),
        config.n_views_source,
    )
    .context("invalid camera angles")?;
    let device = backend::device(args.device)?;

    let options = FrameOptions {
        width: u32::try_from(config.width).context("width out of range")?,
        height: u32::try_from(config.height).context("height out of range")?,
        n_frames: config.n_frames,
        remove_bg: args.remove_bg,
        image_frame_ratio: args.image_frame_ratio,
    };
    let images = media::read_frames(&args.input, &options)
        .with_context(|| format!("failed to read input '{}'", args.input.display()))?;
    let frames: Vec<Tensor<B, 3>> = images
        .iter()
        .map(|image| media::image_to_tensor(image, &device))
        .collect();

    let sink = Mp4Sink::next_in(&args.output_folder, config.n_views(), args.fps)
        .context("failed to prepare the output folder")?;
    let config_json = serde_json::to_string_pretty(&config)?;
    std::fs::write(sink.config_path(), config_json)
        .with_context(|| format!("failed to write {}", sink.config_path().display()))?;
    info!(run = sink.run(), folder = %sink.folder().display(), "starting run");

    let oracle = PreviewOracle::<B>::new(&config, &EdmConfig::new())?
        .with_sv3d_version(args.sv3d_version.into());
    let pipeline = Sv4dPipeline::new(config, oracle, device)?;

    let mut sink = ProgressSink::new(sink);
    let result = pipeline.run(
        frames,
        &args.elevations_deg,
        args.azimuths_deg.as_deref(),
        &mut sink,
    );
    sink.finish();
    let grid = result?;

    if !grid.is_complete() {
        bail!("sampling finished with {} empty slots", grid.empty_slots().len());
    }
    info!(run = sink.inner.run(), "done");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Wrapper {
        #[clap(flatten)]
        args: SampleArgs,
    }

    #[test]
    fn defaults_match_the_released_model() {
        let wrapper = Wrapper::parse_from(["sv4d"]);
        let config = wrapper.args.config();

        assert_eq!(wrapper.args.elevations_deg, vec![10.0]);
        assert!(wrapper.args.azimuths_deg.is_none());
        assert_eq!(config.num_steps, 20);
        assert_eq!(config.decode_batch, 14);
        assert_eq!(config.seed, 23);
        assert_eq!(wrapper.args.sv3d_version, Sv3dVersionArg::Sv3dU);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn bad_angles_fail_before_reading_or_writing_anything() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out");
        let output_arg = output.to_string_lossy().into_owned();
        let wrapper = Wrapper::parse_from([
            "sv4d",
            "--input",
            "missing/input.mp4",
            "--output-folder",
            output_arg.as_str(),
            "--azimuths-deg",
            "0",
            "90",
        ]);

        let err = handle_sample(&wrapper.args).unwrap_err();

        assert!(format!("{err:#}").contains("azimuths_deg"), "{err:#}");
        assert!(!output.exists());
    }

    #[test]
    fn sv3d_version_parses_script_names() {
        let wrapper = Wrapper::parse_from(["sv4d", "--sv3d-version", "sv3d_p"]);
        assert_eq!(
            Sv3dVersion::from(wrapper.args.sv3d_version),
            Sv3dVersion::Sv3dP
        );
    }

    #[test]
    fn overrides_reach_the_config() {
        let wrapper = Wrapper::parse_from([
            "sv4d",
            "--num-steps",
            "4",
            "--height",
            "64",
            "--width",
            "128",
            "--elevations-deg",
            "5",
            "15",
        ]);
        let config = wrapper.args.config();

        assert_eq!(config.num_steps, 4);
        assert_eq!((config.height, config.width), (64, 128));
        assert_eq!(wrapper.args.elevations_deg, vec![5.0, 15.0]);
    }
}
