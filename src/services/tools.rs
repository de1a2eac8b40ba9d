//! Discovery of the external tools the bundled collaborators shell out to.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::ToolsConfig;

/// Availability of one tool, as reported by `check-tools`.
#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub available: bool,
    /// First line of the tool's version output.
    pub version: Option<String>,
    pub path: Option<PathBuf>,
}

/// Resolve a tool: an existing configured path wins, then `PATH`, then the
/// bare name (so the spawn error names the missing tool).
pub fn resolve(name: &str, configured: Option<&Path>) -> PathBuf {
    locate(name, configured).unwrap_or_else(|| PathBuf::from(name))
}

fn locate(name: &str, configured: Option<&Path>) -> Option<PathBuf> {
    match configured {
        Some(p) if p.exists() => Some(p.to_path_buf()),
        Some(p) => {
            tracing::warn!(tool = name, path = %p.display(), "Configured tool path does not exist, searching PATH");
            which::which(name).ok()
        }
        None => which::which(name).ok(),
    }
}

/// Check demucs, ffmpeg and ffprobe.
pub fn check_tools(config: &ToolsConfig) -> Vec<ToolInfo> {
    [
        ("demucs", config.demucs_path.as_deref()),
        ("ffmpeg", config.ffmpeg_path.as_deref()),
        ("ffprobe", config.ffprobe_path.as_deref()),
    ]
    .into_iter()
    .map(|(name, configured)| match locate(name, configured) {
        Some(path) => ToolInfo {
            name: name.to_string(),
            available: true,
            version: detect_version(name, &path),
            path: Some(path),
        },
        None => ToolInfo {
            name: name.to_string(),
            available: false,
            version: None,
            path: None,
        },
    })
    .collect()
}

fn detect_version(name: &str, path: &Path) -> Option<String> {
    let version_arg = match name {
        "ffmpeg" | "ffprobe" => "-version",
        _ => "--help",
    };

    let output = std::process::Command::new(path)
        .arg(version_arg)
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }

    String::from_utf8_lossy(&output.stdout)
        .lines()
        .find(|l| !l.trim().is_empty())
        .map(|s| s.trim().to_string())
}
