//! Interleaved multi-view/multi-frame sampling.
//!
//! A run fills a `(frame, view)` grid in four stages: the input video
//! provides view 0, a multi-view pass provides frame 0, an anchor pass fills
//! every `T-1`th frame for all views with one full sampling call per group of
//! anchors, and a dense pass refines windows of `T` frames step by step,
//! alternating traversal direction, before decoding what is still missing.

use burn::{
    config::Config,
    tensor::{backend::Backend, Distribution, Tensor},
};
use tracing::{debug, info, instrument};

use crate::camera::CameraTrajectory;
use crate::error::{Sv4dError, Sv4dResult};
use crate::grid::{Grid, Slot};
use crate::oracle::{Conditioning, DiffusionOracle, MicroConditioning};
use crate::schedule::{DenseWindow, SamplingPlan, TraversalPolicy};

/// The 9 of 21 multi-view outputs kept as grid views, evenly spread.
pub const SV4D_SUBSAMPLED_VIEWS: [usize; 9] = [0, 2, 5, 7, 9, 12, 14, 16, 19];

#[derive(Config, Debug)]
pub struct Sv4dConfig {
    /// Source views kept as grid views, `views_per_call + 1` entries starting at 0.
    pub subsampled_views: Vec<usize>,
    /// Frames per diffusion call (`T`).
    #[config(default = 5)]
    pub frames_per_call: usize,
    /// Novel views per diffusion call (`V`).
    #[config(default = 8)]
    pub views_per_call: usize,
    #[config(default = 21)]
    pub n_frames: usize,
    /// Number of views produced by the multi-view model.
    #[config(default = 21)]
    pub n_views_source: usize,
    #[config(default = 4)]
    pub latent_channels: usize,
    /// Spatial downscaling between images and latents.
    #[config(default = 8)]
    pub vae_factor: usize,
    #[config(default = 576)]
    pub height: usize,
    #[config(default = 576)]
    pub width: usize,
    #[config(default = 20)]
    pub num_steps: usize,
    #[config(default = 6)]
    pub fps_id: usize,
    #[config(default = 127)]
    pub motion_bucket_id: usize,
    #[config(default = 1e-5)]
    pub cond_aug: f64,
    #[config(default = 23)]
    pub seed: u64,
    /// Latents decoded per `decode` call. Lower it when running out of memory.
    #[config(default = 14)]
    pub decode_batch: usize,
}

impl Sv4dConfig {
    /// The released SV4D geometry: 21 frames, 9 views, 576x576.
    pub fn sv4d() -> Self {
        Self::new(SV4D_SUBSAMPLED_VIEWS.to_vec())
    }

    pub fn n_views(&self) -> usize {
        self.views_per_call + 1
    }

    /// Grid views synthesized by the diffusion calls, `1..=V`.
    pub fn novel_views(&self) -> Vec<usize> {
        (1..=self.views_per_call).collect()
    }

    pub fn latent_dims(&self) -> [usize; 3] {
        [
            self.latent_channels,
            self.height / self.vae_factor,
            self.width / self.vae_factor,
        ]
    }

    pub fn micro_conditioning(&self) -> MicroConditioning {
        MicroConditioning {
            fps_id: self.fps_id,
            motion_bucket_id: self.motion_bucket_id,
            cond_aug: self.cond_aug,
        }
    }

    pub fn plan(&self) -> Sv4dResult<SamplingPlan> {
        SamplingPlan::new(self.n_frames, self.n_views(), self.frames_per_call)
    }

    pub fn validate(&self) -> Sv4dResult<()> {
        self.plan()?;
        if self.views_per_call == 0 {
            return Err(Sv4dError::validation("views per call must be non-zero"));
        }
        if self.subsampled_views.len() != self.n_views() {
            return Err(Sv4dError::validation(format!(
                "expected {} subsampled views, got {}",
                self.n_views(),
                self.subsampled_views.len()
            )));
        }
        if self.subsampled_views.first() != Some(&0) {
            return Err(Sv4dError::validation(
                "the first subsampled view must be the input camera (0)",
            ));
        }
        if let Some(view) = self
            .subsampled_views
            .iter()
            .find(|&&view| view >= self.n_views_source)
        {
            return Err(Sv4dError::validation(format!(
                "subsampled view {view} outside the {} source views",
                self.n_views_source
            )));
        }
        if self.vae_factor == 0 || self.height % self.vae_factor != 0 || self.width % self.vae_factor != 0
        {
            return Err(Sv4dError::validation(format!(
                "{}x{} frames are not divisible by the vae factor {}",
                self.width, self.height, self.vae_factor
            )));
        }
        if self.num_steps == 0 {
            return Err(Sv4dError::validation("num_steps must be non-zero"));
        }
        if self.decode_batch == 0 {
            return Err(Sv4dError::validation("decode batch must be non-zero"));
        }
        Ok(())
    }
}

/// Videos emitted by a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VideoKind {
    /// Frame 0 at every grid view, written before sampling starts.
    AnchorViews,
    /// The input video, written before sampling starts.
    InputView,
    /// One novel view across time.
    View(usize),
    /// One frame per time step, walking through the views.
    Diagonal,
}

impl VideoKind {
    pub fn file_stem(&self, run: usize) -> String {
        match self {
            VideoKind::AnchorViews => format!("{run:06}_t000"),
            VideoKind::InputView => format!("{run:06}_v000"),
            VideoKind::View(view) => format!("{run:06}_v{view:03}"),
            VideoKind::Diagonal => format!("{run:06}_diag"),
        }
    }
}

/// Receives the videos of a run, plus optional progress notifications.
pub trait SampleSink<B: Backend> {
    /// `frames` are `[3, H, W]` images in `[-1, 1]`.
    fn write_video(&mut self, kind: VideoKind, frames: &[Tensor<B, 3>]) -> Sv4dResult<()>;

    fn dense_window_started(&mut self, _index: usize, _window: &DenseWindow, _total: usize) {}

    fn dense_step_finished(&mut self, _step: usize, _num_steps: usize) {}
}

/// Collects nothing. Useful when only the returned grid matters.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardSink;

impl<B: Backend> SampleSink<B> for DiscardSink {
    fn write_video(&mut self, _kind: VideoKind, _frames: &[Tensor<B, 3>]) -> Sv4dResult<()> {
        Ok(())
    }
}

pub type ImageGrid<B> = Grid<Tensor<B, 3>>;

pub struct Sv4dPipeline<B: Backend, O> {
    config: Sv4dConfig,
    oracle: O,
    traversal: TraversalPolicy,
    device: B::Device,
}

impl<B: Backend, O: DiffusionOracle<B>> Sv4dPipeline<B, O> {
    pub fn new(config: Sv4dConfig, oracle: O, device: B::Device) -> Sv4dResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            oracle,
            traversal: TraversalPolicy::default(),
            device,
        })
    }

    pub fn with_traversal(mut self, traversal: TraversalPolicy) -> Self {
        self.traversal = traversal;
        self
    }

    pub fn config(&self) -> &Sv4dConfig {
        &self.config
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    /// Runs every pass and writes the output videos into `sink`.
    ///
    /// `frames` are the input video, `[3, H, W]` in `[-1, 1]`. All validation
    /// happens before the first oracle call.
    pub fn run(
        &self,
        frames: Vec<Tensor<B, 3>>,
        elevations_deg: &[f64],
        azimuths_deg: Option<&[f64]>,
        sink: &mut impl SampleSink<B>,
    ) -> Sv4dResult<ImageGrid<B>> {
        let plan = self.config.plan()?;
        let camera =
            CameraTrajectory::from_degrees(elevations_deg, azimuths_deg, self.config.n_views_source)?;
        self.check_frames(&frames)?;

        B::seed(self.config.seed);

        info!(
            n_frames = self.config.n_frames,
            n_views = self.config.n_views(),
            "sampling multi-view images of frame 0"
        );
        let multiview = self.oracle.sample_multiview(
            frames[0].clone(),
            &camera,
            &self.config.micro_conditioning(),
        )?;

        let mut grid = self.initialize_grid(frames, multiview)?;
        self.write_seed_videos(&grid, sink)?;

        self.anchor_pass(&mut grid, &camera, &plan)?;
        self.dense_pass(&mut grid, &camera, &plan, sink)?;
        self.write_outputs(&grid, &plan, sink)?;

        Ok(grid)
    }

    fn check_frames(&self, frames: &[Tensor<B, 3>]) -> Sv4dResult<()> {
        if frames.len() != self.config.n_frames {
            return Err(Sv4dError::validation(format!(
                "expected {} input frames, got {}",
                self.config.n_frames,
                frames.len()
            )));
        }
        let expected = [3, self.config.height, self.config.width];
        if let Some(frame) = frames.iter().find(|frame| frame.dims() != expected) {
            return Err(Sv4dError::validation(format!(
                "input frames must be {expected:?}, got {:?}",
                frame.dims()
            )));
        }
        Ok(())
    }

    /// View 0 from the input video, frame 0 from the subsampled multi-view
    /// orbit rolled so that the input camera comes first.
    pub fn initialize_grid(
        &self,
        frames: Vec<Tensor<B, 3>>,
        multiview: Tensor<B, 4>,
    ) -> Sv4dResult<ImageGrid<B>> {
        self.check_frames(&frames)?;
        let [n_source, channels, height, width] = multiview.dims();
        if n_source != self.config.n_views_source {
            return Err(Sv4dError::validation(format!(
                "expected {} multi-view images, got {n_source}",
                self.config.n_views_source
            )));
        }
        let multiview = crate::utils::roll_batch(multiview, 1);

        let mut grid = Grid::new(self.config.n_frames, self.config.n_views());
        for (view, &source) in self.config.subsampled_views.iter().enumerate() {
            let image = multiview
                .clone()
                .slice([source..source + 1])
                .reshape([channels, height, width]);
            grid.set(0, view, image);
        }
        for (frame, image) in frames.into_iter().enumerate() {
            grid.set(frame, 0, image);
        }

        debug!(filled = grid.filled_count(), "grid initialized");
        Ok(grid)
    }

    fn write_seed_videos(&self, grid: &ImageGrid<B>, sink: &mut impl SampleSink<B>) -> Sv4dResult<()> {
        let views = track(grid.frame_views(0), |view| (0, view))?;
        sink.write_video(VideoKind::AnchorViews, &views)?;
        let frames = track(grid.view_track(0), |frame| (frame, 0))?;
        sink.write_video(VideoKind::InputView, &frames)
    }

    /// Reference image, motion and view conditioning read from the current grid.
    fn conditioning(
        &self,
        grid: &ImageGrid<B>,
        camera: &CameraTrajectory,
        reference_frame: usize,
        frames: &[usize],
    ) -> Sv4dResult<Conditioning<B>> {
        let novel_views = self.config.novel_views();
        let image = grid
            .get(reference_frame, 0)
            .cloned()
            .ok_or_else(|| empty_slot(reference_frame, 0))?;
        let motion = collect(grid, frames.iter().map(|&frame| (frame, 0)))?;
        let views = collect(grid, novel_views.iter().map(|&view| (reference_frame, view)))?;

        let angles = camera.conditioning_angles(
            &self.config.subsampled_views[1..],
            frames.len(),
            self.config.subsampled_views[0],
        );

        Ok(Conditioning {
            image,
            cond_motion: stack(motion),
            cond_view: stack(views),
            polars_rad: angles.polars_rad,
            azimuths_rad: angles.azimuths_rad,
            frames: frames.len(),
            views: novel_views.len(),
            micro: self.config.micro_conditioning(),
        })
    }

    /// Fills the anchor frames of every novel view, never overwriting a slot.
    #[instrument(skip_all)]
    pub fn anchor_pass(
        &self,
        grid: &mut ImageGrid<B>,
        camera: &CameraTrajectory,
        plan: &SamplingPlan,
    ) -> Sv4dResult<()> {
        let novel_views = self.config.novel_views();
        for window in &plan.anchor {
            info!(frames = ?window.frames, "sampling anchor frames");
            let cond = self.conditioning(grid, camera, window.reference_frame, &window.frames)?;
            let samples = self.oracle.sample(&cond)?;
            let expected = [window.frames.len() * novel_views.len(), 3, self.config.height, self.config.width];
            if samples.dims() != expected {
                return Err(Sv4dError::oracle(format!(
                    "sample returned {:?}, expected {expected:?}",
                    samples.dims()
                )));
            }

            for (i, &frame) in window.frames.iter().enumerate() {
                for (j, &view) in novel_views.iter().enumerate() {
                    if grid.is_filled(frame, view) {
                        continue;
                    }
                    let index = i * novel_views.len() + j;
                    grid.set(frame, view, to_signed(take(&samples, index)));
                }
            }
        }
        Ok(())
    }

    /// Refines each window step by step over a fresh latent buffer, then
    /// decodes the window slots that are still empty.
    #[instrument(skip_all)]
    pub fn dense_pass(
        &self,
        grid: &mut ImageGrid<B>,
        camera: &CameraTrajectory,
        plan: &SamplingPlan,
        sink: &mut impl SampleSink<B>,
    ) -> Sv4dResult<()> {
        let novel_views = self.config.novel_views();
        let [channels, height, width] = self.config.latent_dims();

        for (index, window) in plan.dense.iter().enumerate() {
            info!(frames = ?window.frames, "sampling dense frames");
            sink.dense_window_started(index, window, plan.dense.len());

            let mut latents: Tensor<B, 5> = Tensor::random(
                [self.config.n_frames, self.config.n_views(), channels, height, width],
                Distribution::Normal(0.0, 1.0),
                &self.device,
            );
            let mut order = window.frames.clone();

            for step in 0..self.config.num_steps {
                order = self.traversal.order(&window.frames, step);
                let cond = self.conditioning(grid, camera, order[0], &order)?;
                let noisy = gather_latents(&latents, &order, novel_views.len());
                let next = self.oracle.step(&cond, step, noisy)?;
                if next.dims() != [order.len() * novel_views.len(), channels, height, width] {
                    return Err(Sv4dError::oracle(format!(
                        "step {step} returned latents of shape {:?}",
                        next.dims()
                    )));
                }
                latents = scatter_latents(latents, &order, next);

                debug!(step, order = ?order, "dense step");
                sink.dense_step_finished(step, self.config.num_steps);
            }

            let pending: Vec<(usize, usize)> = order
                .iter()
                .flat_map(|&frame| novel_views.iter().map(move |&view| (frame, view)))
                .filter(|&(frame, view)| !(frame == 0 && view == 0) && !grid.is_filled(frame, view))
                .collect();
            self.decode_into(grid, &latents, &pending)?;
        }
        Ok(())
    }

    fn decode_into(
        &self,
        grid: &mut ImageGrid<B>,
        latents: &Tensor<B, 5>,
        slots: &[(usize, usize)],
    ) -> Sv4dResult<()> {
        let [channels, height, width] = self.config.latent_dims();
        for chunk in slots.chunks(self.config.decode_batch) {
            let batch = chunk
                .iter()
                .map(|&(frame, view)| {
                    latents
                        .clone()
                        .slice([frame..frame + 1, view..view + 1])
                        .reshape([1, channels, height, width])
                })
                .collect();
            let images = self.oracle.decode(Tensor::cat(batch, 0))?;
            let [decoded, ..] = images.dims();
            if decoded != chunk.len() {
                return Err(Sv4dError::oracle(format!(
                    "decode returned {decoded} images for {} latents",
                    chunk.len()
                )));
            }
            for (index, &(frame, view)) in chunk.iter().enumerate() {
                grid.fill_if_empty(frame, view, to_signed(take(&images, index)));
            }
            debug!(decoded, "decoded latents");
        }
        Ok(())
    }

    fn write_outputs(
        &self,
        grid: &ImageGrid<B>,
        plan: &SamplingPlan,
        sink: &mut impl SampleSink<B>,
    ) -> Sv4dResult<()> {
        for view in self.config.novel_views() {
            let frames = track(grid.view_track(view), |frame| (frame, view))?;
            sink.write_video(VideoKind::View(view), &frames)?;
        }
        let diagonal = collect(
            grid,
            plan.diagonal.iter().enumerate().map(|(frame, &view)| (frame, view)),
        )?;
        sink.write_video(VideoKind::Diagonal, &diagonal)
    }
}

fn empty_slot(frame: usize, view: usize) -> Sv4dError {
    Sv4dError::schedule(format!("slot ({frame}, {view}) is empty"))
}

fn collect<B: Backend>(
    grid: &ImageGrid<B>,
    coords: impl IntoIterator<Item = (usize, usize)>,
) -> Sv4dResult<Vec<Tensor<B, 3>>> {
    grid.collect_filled(coords)
        .map_err(|(frame, view)| empty_slot(frame, view))
}

/// Images of a row or column of slots; `coord` maps a position to its slot.
fn track<'a, B: Backend>(
    slots: impl Iterator<Item = &'a Slot<Tensor<B, 3>>>,
    coord: impl Fn(usize) -> (usize, usize),
) -> Sv4dResult<Vec<Tensor<B, 3>>> {
    slots
        .enumerate()
        .map(|(index, slot)| {
            slot.as_ref().cloned().ok_or_else(|| {
                let (frame, view) = coord(index);
                empty_slot(frame, view)
            })
        })
        .collect()
}

fn stack<B: Backend>(images: Vec<Tensor<B, 3>>) -> Tensor<B, 4> {
    Tensor::cat(images.into_iter().map(|image| image.unsqueeze::<4>()).collect(), 0)
}

/// Image `index` of a `[n, 3, H, W]` batch.
fn take<B: Backend>(batch: &Tensor<B, 4>, index: usize) -> Tensor<B, 3> {
    let [_, channels, height, width] = batch.dims();
    batch
        .clone()
        .slice([index..index + 1])
        .reshape([channels, height, width])
}

/// `[0, 1]` oracle output to the `[-1, 1]` grid range.
fn to_signed<B: Backend, const D: usize>(image: Tensor<B, D>) -> Tensor<B, D> {
    image.mul_scalar(2.0).sub_scalar(1.0)
}

/// Latents at `frames × views 1..=n_novel`, flattened frame-major.
fn gather_latents<B: Backend>(
    latents: &Tensor<B, 5>,
    frames: &[usize],
    n_novel: usize,
) -> Tensor<B, 4> {
    let [_, _, channels, height, width] = latents.dims();
    let rows = frames
        .iter()
        .map(|&frame| latents.clone().slice([frame..frame + 1, 1..n_novel + 1]))
        .collect();
    Tensor::cat(rows, 0).reshape([frames.len() * n_novel, channels, height, width])
}

/// Inverse of [`gather_latents`].
fn scatter_latents<B: Backend>(
    latents: Tensor<B, 5>,
    frames: &[usize],
    values: Tensor<B, 4>,
) -> Tensor<B, 5> {
    let [total, channels, height, width] = values.dims();
    let n_novel = total / frames.len();
    let values = values.reshape([frames.len(), n_novel, channels, height, width]);

    frames.iter().enumerate().fold(latents, |latents, (i, &frame)| {
        latents.slice_assign(
            [frame..frame + 1, 1..n_novel + 1],
            values.clone().slice([i..i + 1]),
        )
    })
}
