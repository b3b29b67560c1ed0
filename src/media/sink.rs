use std::path::{Path, PathBuf};

use burn::tensor::{backend::Backend, Tensor};
use tracing::info;

use super::{convert::tensor_to_image, ffmpeg::encode_mp4};
use crate::error::Sv4dResult;
use crate::pipelines::sv4d::{SampleSink, VideoKind};

/// Run index of the next run in `folder`: finished runs leave `files_per_run`
/// MP4 files behind.
pub fn next_run(folder: &Path, files_per_run: usize) -> Sv4dResult<usize> {
    if !folder.is_dir() {
        return Ok(0);
    }
    let mut videos = 0;
    for entry in std::fs::read_dir(folder)? {
        let path = entry?.path();
        let is_mp4 = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("mp4"));
        if is_mp4 && path.is_file() {
            videos += 1;
        }
    }
    Ok(videos / files_per_run.max(1))
}

/// Writes every video of a run as `{run:06}_<kind>.mp4` into one folder.
#[derive(Debug, Clone)]
pub struct Mp4Sink {
    folder: PathBuf,
    run: usize,
    fps: u32,
}

impl Mp4Sink {
    pub fn new(folder: impl Into<PathBuf>, run: usize, fps: u32) -> Self {
        Self {
            folder: folder.into(),
            run,
            fps,
        }
    }

    /// A sink numbered after the runs already present in `folder`.
    pub fn next_in(folder: impl Into<PathBuf>, n_views: usize, fps: u32) -> Sv4dResult<Self> {
        let folder = folder.into();
        std::fs::create_dir_all(&folder)?;
        // one video per view plus the diagonal and the frame-0 orbit
        let run = next_run(&folder, n_views + 2)?;
        Ok(Self::new(folder, run, fps))
    }

    pub fn run(&self) -> usize {
        self.run
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    pub fn path_for(&self, kind: VideoKind) -> PathBuf {
        self.folder.join(format!("{}.mp4", kind.file_stem(self.run)))
    }

    pub fn config_path(&self) -> PathBuf {
        self.folder.join(format!("{:06}_config.json", self.run))
    }
}

impl<B: Backend> SampleSink<B> for Mp4Sink {
    fn write_video(&mut self, kind: VideoKind, frames: &[Tensor<B, 3>]) -> Sv4dResult<()> {
        let images = frames
            .iter()
            .map(|frame| tensor_to_image(frame.clone()))
            .collect::<Sv4dResult<Vec<_>>>()?;
        let path = self.path_for(kind);
        encode_mp4(&path, &images, self.fps)?;
        info!(path = %path.display(), frames = images.len(), "saved video");
        Ok(())
    }
}
