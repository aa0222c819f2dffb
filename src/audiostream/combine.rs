use std::io::Write;
use std::path::Path;

use tokio::process::Command;
use tracing::info;

use crate::error::{AppError, AppResult};

/// Combine independently-encoded mp3 segments into one single-channel mp3.
///
/// Chunk boundaries come from separate encoder invocations, so raw byte
/// concatenation is not valid mp3; each chunk goes to its own scratch file
/// and ffmpeg's concat demuxer decodes and re-encodes them into one stream.
/// Scratch files are owned by RAII guards and released on every exit path.
pub async fn combine_chunks(chunks: &[Vec<u8>]) -> AppResult<Vec<u8>> {
    if chunks.is_empty() {
        return Err(AppError::InvalidInput("no chunks to combine".to_string()));
    }

    let ffmpeg = which::which("ffmpeg")
        .map_err(|_| AppError::CombineFailed("ffmpeg not found on PATH".to_string()))?;

    let mut segment_files = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        let mut file = tempfile::Builder::new()
            .prefix("qs-chunk-")
            .suffix(".mp3")
            .tempfile()?;
        file.write_all(chunk)?;
        file.flush()?;
        segment_files.push(file);
    }

    let mut manifest = tempfile::Builder::new()
        .prefix("qs-concat-")
        .suffix(".txt")
        .tempfile()?;
    manifest.write_all(concat_manifest(segment_files.iter().map(|f| f.path())).as_bytes())?;
    manifest.flush()?;

    let out_dir = tempfile::tempdir()?;
    let out_path = out_dir.path().join("combined.mp3");

    info!("combining {} chunks via ffmpeg concat", chunks.len());

    let output = Command::new(&ffmpeg)
        .arg("-f")
        .arg("concat")
        .arg("-safe")
        .arg("0")
        .arg("-i")
        .arg(manifest.path())
        .arg("-c:a")
        .arg("libmp3lame")
        .arg("-q:a")
        .arg("1")
        .arg("-ac")
        .arg("1")
        .arg(&out_path)
        .output()
        .await?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(AppError::CombineFailed(format!(
            "ffmpeg exited with {}: {}",
            output.status,
            stderr.trim()
        )));
    }

    let combined = tokio::fs::read(&out_path).await?;
    info!("combined audio is {} bytes", combined.len());
    Ok(combined)
}

/// ffmpeg concat demuxer manifest: one `file '<path>'` line per segment.
fn concat_manifest<'a>(paths: impl Iterator<Item = &'a Path>) -> String {
    let mut manifest = String::new();
    for path in paths {
        manifest.push_str(&format!("file '{}'\n", path.display()));
    }
    manifest
}
