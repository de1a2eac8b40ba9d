//! Mixing, loudness normalization and video rendering through `ffmpeg`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use stemforge_common::paths::{is_image_file, sanitize_file_name};
use stemforge_common::StemType;

use super::{RenderJob, Renderer, StemMixer, ToolCommand, ToolError, TrackMetadata};
use crate::config::ChannelConfig;

/// Integrated loudness target for every delivered stem.
pub const LOUDNORM_FILTER: &str = "loudnorm=I=-14:TP=-2:LRA=11";

/// Gain applied to each source before summing, to leave headroom.
const MIX_GAIN_DB: i32 = -2;

const VIDEO_SIZE: &str = "1280x720";

#[derive(Debug, Clone)]
pub struct FfmpegMedia {
    program: PathBuf,
    timeout: Duration,
}

impl FfmpegMedia {
    pub fn new(program: PathBuf) -> Self {
        Self {
            program,
            timeout: Duration::from_secs(600),
        }
    }

    fn command(&self) -> ToolCommand {
        let mut cmd = ToolCommand::new(self.program.clone());
        cmd.args(["-y", "-hide_banner", "-loglevel", "error"])
            .timeout(self.timeout);
        cmd
    }

    async fn run(&self, cmd: &ToolCommand, output: &Path) -> Result<(), ToolError> {
        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ToolError::other("ffmpeg", e.to_string()))?;
        }
        cmd.execute().await?;
        if !output.exists() {
            return Err(ToolError::other(
                "ffmpeg",
                format!("no output written to {}", output.display()),
            ));
        }
        Ok(())
    }
}

/// Filter graph that attenuates every input and sums them.
pub fn mix_filter(inputs: usize) -> String {
    let mut graph = String::new();
    let mut labels = String::new();
    for i in 0..inputs {
        graph.push_str(&format!("[{i}:a]volume={MIX_GAIN_DB}dB[a{i}];"));
        labels.push_str(&format!("[a{i}]"));
    }
    graph.push_str(&format!(
        "{labels}amix=inputs={inputs}:duration=longest:normalize=0[out]"
    ));
    graph
}

fn stem_color(stem: StemType) -> &'static str {
    match stem {
        StemType::Acapella => "0xE91E63",
        StemType::Drums => "0xFF9800",
        StemType::Bass => "0x3F51B5",
        StemType::Melody => "0x4CAF50",
        StemType::Instrumental => "0x9C27B0",
    }
}

#[async_trait]
impl StemMixer for FfmpegMedia {
    async fn mix(&self, inputs: &[PathBuf], output: &Path) -> Result<(), ToolError> {
        let mut cmd = self.command();
        match inputs {
            [] => return Err(ToolError::other("ffmpeg", "nothing to mix")),
            [single] => {
                cmd.arg("-i").path_arg(single);
            }
            many => {
                for input in many {
                    cmd.arg("-i").path_arg(input);
                }
                cmd.arg("-filter_complex")
                    .arg(mix_filter(many.len()))
                    .args(["-map", "[out]"]);
            }
        }
        cmd.args(["-ac", "2", "-ar", "44100"]).path_arg(output);
        self.run(&cmd, output).await
    }

    async fn normalize(&self, input: &Path, output: &Path) -> Result<(), ToolError> {
        let mut cmd = self.command();
        cmd.arg("-i")
            .path_arg(input)
            .args(["-af", LOUDNORM_FILTER, "-ac", "2", "-ar", "44100"])
            .path_arg(output);
        self.run(&cmd, output).await
    }
}

#[async_trait]
impl Renderer for FfmpegMedia {
    async fn background(&self, track: &TrackMetadata, dir: &Path) -> Result<PathBuf, ToolError> {
        let name = sanitize_file_name(track.track_id.as_str(), "track");
        let output = dir.join(format!("background_{name}.mp4"));
        let seconds = format!("{:.3}", track.duration_ms.max(1000) as f64 / 1000.0);

        let artwork = track
            .artwork
            .as_deref()
            .map(Path::new)
            .filter(|p| p.exists() && is_image_file(p));

        let mut cmd = self.command();
        match artwork {
            Some(image) => {
                cmd.args(["-loop", "1", "-framerate", "1", "-i"])
                    .path_arg(image)
                    .arg("-vf")
                    .arg("scale=1280:720:force_original_aspect_ratio=decrease,pad=1280:720:(ow-iw)/2:(oh-ih)/2");
            }
            None => {
                cmd.args(["-f", "lavfi", "-i"])
                    .arg(format!("color=c=black:s={VIDEO_SIZE}:r=1"));
            }
        }
        cmd.args(["-t", seconds.as_str(), "-pix_fmt", "yuv420p"])
            .path_arg(&output);
        self.run(&cmd, &output).await?;
        Ok(output)
    }

    async fn overlay(&self, channel: &ChannelConfig, dir: &Path) -> Result<PathBuf, ToolError> {
        let name = sanitize_file_name(&channel.name, "channel");
        let output = dir.join(format!("overlay_{name}.png"));

        let mut cmd = self.command();
        match channel.watermark.as_deref().filter(|p| p.exists()) {
            Some(watermark) => {
                cmd.arg("-i").path_arg(watermark).args(["-vf", "scale=200:-1"]);
            }
            None => {
                cmd.args(["-f", "lavfi", "-i", "color=c=black@0.0:s=16x16,format=rgba"]);
            }
        }
        cmd.args(["-frames:v", "1"]).path_arg(&output);
        self.run(&cmd, &output).await?;
        Ok(output)
    }

    async fn icon(&self, stem: StemType, dir: &Path) -> Result<PathBuf, ToolError> {
        let output = dir.join(format!("icon_{stem}.png"));
        let mut cmd = self.command();
        cmd.args(["-f", "lavfi", "-i"])
            .arg(format!("color=c={}:s=96x96", stem_color(stem)))
            .args(["-frames:v", "1"])
            .path_arg(&output);
        self.run(&cmd, &output).await?;
        Ok(output)
    }

    async fn render(&self, job: &RenderJob) -> Result<PathBuf, ToolError> {
        let mut cmd = self.command();
        cmd.arg("-i")
            .path_arg(&job.background)
            .arg("-i")
            .path_arg(&job.overlay)
            .arg("-i")
            .path_arg(&job.icon)
            .arg("-i")
            .path_arg(&job.audio)
            .arg("-filter_complex")
            .arg("[0:v][1:v]overlay=W-w-20:20[v1];[v1][2:v]overlay=20:H-h-20[v]")
            .args(["-map", "[v]", "-map", "3:a"])
            .args(["-c:v", "libx264", "-pix_fmt", "yuv420p", "-c:a", "aac", "-shortest"])
            .arg("-metadata")
            .arg(format!("title={}", job.title))
            .path_arg(&job.output);
        self.run(&cmd, &job.output).await?;
        Ok(job.output.clone())
    }
}
