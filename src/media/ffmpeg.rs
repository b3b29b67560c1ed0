//! Video decode/encode through the system `ffmpeg` and `ffprobe` binaries.

use std::io::{Read, Write};
use std::path::Path;
use std::process::{Command, Stdio};

use image::{RgbImage, RgbaImage};
use tracing::debug;

use crate::error::{Sv4dError, Sv4dResult};

pub fn is_ffmpeg_on_path() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok_and(|status| status.success())
}

/// Width and height of the first video stream.
pub fn probe_video(path: &Path) -> Sv4dResult<(u32, u32)> {
    #[derive(serde::Deserialize)]
    struct ProbeStream {
        codec_type: Option<String>,
        width: Option<u32>,
        height: Option<u32>,
    }
    #[derive(serde::Deserialize)]
    struct ProbeOut {
        streams: Vec<ProbeStream>,
    }

    let out = Command::new("ffprobe")
        .args(["-v", "error", "-print_format", "json", "-show_streams"])
        .arg(path)
        .output()
        .map_err(|e| Sv4dError::media(format!("failed to run ffprobe: {e}")))?;
    if !out.status.success() {
        return Err(Sv4dError::media(format!(
            "ffprobe failed for '{}': {}",
            path.display(),
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }

    let parsed: ProbeOut = serde_json::from_slice(&out.stdout)
        .map_err(|e| Sv4dError::media(format!("ffprobe json parse failed: {e}")))?;
    let stream = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| Sv4dError::media(format!("no video stream in '{}'", path.display())))?;
    match (stream.width, stream.height) {
        (Some(width), Some(height)) if width > 0 && height > 0 => Ok((width, height)),
        _ => Err(Sv4dError::media("ffprobe reported no video dimensions")),
    }
}

/// Decodes up to `max_frames` leading frames as RGBA8.
pub fn decode_video_frames(path: &Path, max_frames: usize) -> Sv4dResult<Vec<RgbaImage>> {
    if max_frames == 0 {
        return Ok(Vec::new());
    }
    let (width, height) = probe_video(path)?;

    let out = Command::new("ffmpeg")
        .args(["-v", "error", "-i"])
        .arg(path)
        .args([
            "-frames:v",
            &max_frames.to_string(),
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgba",
            "pipe:1",
        ])
        .output()
        .map_err(|e| Sv4dError::media(format!("failed to run ffmpeg for video decode: {e}")))?;
    if !out.status.success() {
        return Err(Sv4dError::media(format!(
            "ffmpeg video decode failed for '{}': {}",
            path.display(),
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }

    let frame_len = width as usize * height as usize * 4;
    if out.stdout.len() % frame_len != 0 {
        return Err(Sv4dError::media(format!(
            "decoded video has invalid size: got {} bytes, expected multiples of {frame_len}",
            out.stdout.len()
        )));
    }

    let frames = out
        .stdout
        .chunks_exact(frame_len)
        .take(max_frames)
        .filter_map(|chunk| RgbaImage::from_raw(width, height, chunk.to_vec()))
        .collect::<Vec<_>>();
    debug!(count = frames.len(), width, height, "decoded video frames");
    Ok(frames)
}

/// Encodes `frames` as an H.264/yuv420p MP4 at `fps` frames per second.
pub fn encode_mp4(path: &Path, frames: &[RgbImage], fps: u32) -> Sv4dResult<()> {
    let Some(first) = frames.first() else {
        return Err(Sv4dError::media("cannot encode a video without frames"));
    };
    let (width, height) = first.dimensions();
    if fps == 0 {
        return Err(Sv4dError::validation("fps must be non-zero"));
    }
    if width % 2 != 0 || height % 2 != 0 {
        return Err(Sv4dError::validation(format!(
            "video width/height must be even for yuv420p output, got {width}x{height}"
        )));
    }
    if frames.iter().any(|frame| frame.dimensions() != (width, height)) {
        return Err(Sv4dError::validation("all video frames must share one size"));
    }
    if !is_ffmpeg_on_path() {
        return Err(Sv4dError::media(
            "ffmpeg is required for MP4 encoding, but was not found on PATH",
        ));
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut child = Command::new("ffmpeg")
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .args([
            "-y",
            "-loglevel",
            "error",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgb24",
            "-s",
            &format!("{width}x{height}"),
            "-framerate",
            &fps.to_string(),
            "-i",
            "pipe:0",
            "-an",
            "-c:v",
            "libx264",
            "-pix_fmt",
            "yuv420p",
            "-movflags",
            "+faststart",
        ])
        .arg(path)
        .spawn()
        .map_err(|e| {
            Sv4dError::media(format!(
                "failed to spawn ffmpeg (is it installed and on PATH?): {e}"
            ))
        })?;

    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| Sv4dError::media("failed to open ffmpeg stdin"))?;
    let mut stderr = child
        .stderr
        .take()
        .ok_or_else(|| Sv4dError::media("failed to open ffmpeg stderr"))?;
    let stderr_drain = std::thread::spawn(move || {
        let mut bytes = Vec::new();
        stderr.read_to_end(&mut bytes).map(|_| bytes)
    });

    let written = frames
        .iter()
        .try_for_each(|frame| stdin.write_all(frame.as_raw()));
    drop(stdin);

    let status = child
        .wait()
        .map_err(|e| Sv4dError::media(format!("failed to wait for ffmpeg to finish: {e}")))?;
    let stderr_bytes = stderr_drain
        .join()
        .map_err(|_| Sv4dError::media("ffmpeg stderr drain thread panicked"))??;

    if !status.success() {
        return Err(Sv4dError::media(format!(
            "ffmpeg exited with {status}: {}",
            String::from_utf8_lossy(&stderr_bytes).trim()
        )));
    }
    written.map_err(|e| Sv4dError::media(format!("failed to write frames to ffmpeg: {e}")))?;

    debug!(path = %path.display(), frames = frames.len(), "encoded mp4");
    Ok(())
}
