//! Separation engine backed by the `demucs` command line tool.
//!
//! demucs writes `<out>/<model>/<input stem>/<source>.mp3`. An accelerator
//! out-of-memory failure is recognised from the tool output and reported as
//! [`SeparationError::ResourceExhausted`] so the caller can retry on the
//! fallback device.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;

use super::{SeparationEngine, SeparationError, SeparationOutput, SeparationRequest};
use super::{ToolCommand, ToolError};

const OOM_MARKERS: &[&str] = &["cuda out of memory", "cuda error", "out of memory"];

/// Whether tool output reports accelerator memory exhaustion.
pub fn is_resource_exhausted(output: &str) -> bool {
    let lower = output.to_lowercase();
    OOM_MARKERS.iter().any(|m| lower.contains(m))
}

#[derive(Debug, Clone)]
pub struct DemucsEngine {
    program: PathBuf,
    shifts: u32,
    timeout: Duration,
}

impl DemucsEngine {
    pub fn new(program: PathBuf) -> Self {
        Self {
            program,
            shifts: 0,
            timeout: Duration::from_secs(3600),
        }
    }

    pub fn shifts(mut self, shifts: u32) -> Self {
        self.shifts = shifts;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn command(&self, request: &SeparationRequest) -> ToolCommand {
        let mut cmd = ToolCommand::new(self.program.clone());
        cmd.arg("--mp3")
            .args(["-n", request.model.as_str()])
            .args(["--shifts".to_string(), self.shifts.to_string()])
            .args(["-d", request.device.as_str()])
            .arg("-o")
            .path_arg(&request.output_dir)
            .path_arg(&request.input)
            .timeout(self.timeout);
        cmd
    }
}

/// Directory demucs writes the sources of `input` to.
fn model_output_dir(output_dir: &Path, model: &str, input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    output_dir.join(model).join(stem)
}

#[async_trait]
impl SeparationEngine for DemucsEngine {
    async fn separate(
        &self,
        request: &SeparationRequest,
    ) -> Result<SeparationOutput, SeparationError> {
        tokio::fs::create_dir_all(&request.output_dir)
            .await
            .map_err(|e| SeparationError::Failed(format!("cannot create output dir: {e}")))?;

        match self.command(request).execute().await {
            Ok(_) => {}
            Err(ToolError::Failed { output, .. }) if is_resource_exhausted(&output) => {
                return Err(SeparationError::ResourceExhausted(format!(
                    "{} on {}",
                    request.model, request.device
                )));
            }
            Err(e) => return Err(SeparationError::Failed(e.to_string())),
        }

        let dir = model_output_dir(&request.output_dir, &request.model, &request.input);
        let mut output = SeparationOutput::default();
        for source in &request.sources {
            let path = dir.join(format!("{}.mp3", source.file_stem()));
            if path.exists() {
                output.sources.insert(*source, path);
            }
        }
        Ok(output)
    }
}
