use std::path::Path;

use tokio::process::Command;

use crate::error::{AppError, AppResult};

const SUPPORTED_EXTENSIONS: &[&str] = &["mp3", "m4a", "wav"];

/// Probe the duration of a decoded audio file in seconds.
///
/// Runs a null decode and reads the `Duration: HH:MM:SS.cc` line ffmpeg
/// prints for any container it recognizes.
pub async fn probe_duration_secs(path: &Path) -> AppResult<f64> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    if !SUPPORTED_EXTENSIONS.contains(&extension.as_str()) {
        return Err(AppError::UnsupportedFormat(format!(
            "{} (expected one of {})",
            path.display(),
            SUPPORTED_EXTENSIONS.join(", ")
        )));
    }

    let ffmpeg = which::which("ffmpeg")
        .map_err(|_| AppError::ExternalProvider("ffmpeg not found on PATH".to_string()))?;

    let output = Command::new(&ffmpeg)
        .arg("-i")
        .arg(path)
        .arg("-f")
        .arg("null")
        .arg("-")
        .output()
        .await?;

    let stderr = String::from_utf8_lossy(&output.stderr);
    parse_duration_line(&stderr)
        .ok_or_else(|| AppError::UnsupportedFormat(path.display().to_string()))
}

/// Parse `Duration: HH:MM:SS.cc` out of ffmpeg's stderr. `Duration: N/A`
/// means the container was not recognized.
fn parse_duration_line(stderr: &str) -> Option<f64> {
    for line in stderr.lines() {
        let Some(rest) = line.split("Duration:").nth(1) else {
            continue;
        };
        let time_str = rest.split(',').next()?.trim();
        let parts: Vec<&str> = time_str.split(':').collect();
        if parts.len() != 3 {
            continue;
        }
        let hours: f64 = parts[0].parse().ok()?;
        let minutes: f64 = parts[1].parse().ok()?;
        let seconds: f64 = parts[2].parse().ok()?;
        return Some(hours * 3600.0 + minutes * 60.0 + seconds);
    }
    None
}
