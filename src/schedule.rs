//! # Schedule
//!
//! Index arithmetic deciding which `(frame, view)` slots each diffusion call
//! covers and in which order. Nothing in here touches tensors.

use crate::error::{Sv4dError, Sv4dResult};

/// One `sample` call of the anchor pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnchorWindow {
    /// Frame whose views condition the call.
    pub reference_frame: usize,
    /// The `T` anchor frames synthesized by the call.
    pub frames: Vec<usize>,
}

/// One step-wise refinement loop of the dense pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DenseWindow {
    pub start: usize,
    /// `T` consecutive frames starting at `start`, ascending.
    pub frames: Vec<usize>,
}

/// Frame traversal order of the dense pass across denoising steps.
///
/// `Alternating` reverses the order every step so that temporal
/// conditioning does not always propagate in the same direction. It is an
/// empirical policy; visual quality depends on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TraversalPolicy {
    /// Even steps ascending, odd steps descending.
    #[default]
    Alternating,
    /// Always ascending.
    Forward,
}

impl TraversalPolicy {
    pub fn order(&self, window: &[usize], step: usize) -> Vec<usize> {
        let descending = match self {
            TraversalPolicy::Alternating => step % 2 == 1,
            TraversalPolicy::Forward => false,
        };
        if descending {
            window.iter().rev().copied().collect()
        } else {
            window.to_vec()
        }
    }
}

/// Checks that windows of `frames_per_call` frames with stride
/// `frames_per_call - 1` tile `n_frames` exactly, and that anchor frames
/// group into whole calls.
pub fn validate_geometry(n_frames: usize, frames_per_call: usize) -> Sv4dResult<()> {
    if frames_per_call < 2 {
        return Err(Sv4dError::validation(format!(
            "frames per call must be at least 2, got {frames_per_call}"
        )));
    }
    let stride = frames_per_call - 1;
    let span = stride * frames_per_call;
    if n_frames < 2 || (n_frames - 1) % span != 0 {
        return Err(Sv4dError::validation(format!(
            "n_frames - 1 must be a positive multiple of {span} for {frames_per_call} frames per call, got n_frames = {n_frames}"
        )));
    }
    Ok(())
}

/// Frames `T-1, 2(T-1), ...` below `n_frames`.
pub fn anchor_frame_indices(n_frames: usize, frames_per_call: usize) -> Vec<usize> {
    let stride = frames_per_call - 1;
    (stride..n_frames).step_by(stride).collect()
}

/// Start frame of every dense window, stride `T-1`, ending before the last frame.
pub fn dense_window_starts(n_frames: usize, frames_per_call: usize) -> Vec<usize> {
    let stride = frames_per_call - 1;
    (0..n_frames.saturating_sub(1)).step_by(stride).collect()
}

/// Groups anchor frames into calls of `frames_per_call`, each conditioned on
/// the frame right before its first anchor.
pub fn anchor_windows(n_frames: usize, frames_per_call: usize) -> Vec<AnchorWindow> {
    let stride = frames_per_call - 1;
    anchor_frame_indices(n_frames, frames_per_call)
        .chunks(frames_per_call)
        .map(|frames| AnchorWindow {
            reference_frame: frames[0] - stride,
            frames: frames.to_vec(),
        })
        .collect()
}

pub fn dense_windows(n_frames: usize, frames_per_call: usize) -> Vec<DenseWindow> {
    dense_window_starts(n_frames, frames_per_call)
        .into_iter()
        .map(|start| DenseWindow {
            start,
            frames: (start..start + frames_per_call).collect(),
        })
        .collect()
}

/// View shown at each frame of the diagonal video: `floor(t * n_views / n_frames) mod n_views`.
pub fn diagonal_views(n_frames: usize, n_views: usize) -> Vec<usize> {
    (0..n_frames)
        .map(|frame| (frame * n_views / n_frames) % n_views)
        .collect()
}

/// Full plan of a sampling run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamplingPlan {
    pub anchor: Vec<AnchorWindow>,
    pub dense: Vec<DenseWindow>,
    pub diagonal: Vec<usize>,
}

impl SamplingPlan {
    pub fn new(n_frames: usize, n_views: usize, frames_per_call: usize) -> Sv4dResult<Self> {
        validate_geometry(n_frames, frames_per_call)?;
        if n_views == 0 {
            return Err(Sv4dError::validation("n_views must be non-zero"));
        }
        Ok(Self {
            anchor: anchor_windows(n_frames, frames_per_call),
            dense: dense_windows(n_frames, frames_per_call),
            diagonal: diagonal_views(n_frames, n_views),
        })
    }
}
