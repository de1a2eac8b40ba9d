//! Model/device fallback chain for source separation.
//!
//! Models are tried in configured order. Each model runs on the preferred
//! device first; only a resource-exhaustion failure earns a second try on
//! the fallback device. Any other failure moves on to the next model. With N
//! models there are at most 2N attempts.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use stemforge_common::SourceKind;
use tokio::sync::Semaphore;

use super::{PipelineError, TrackWorkspace};
use crate::services::{SeparationEngine, SeparationError, SeparationRequest};

/// Inputs of one fallback run.
#[derive(Debug, Clone)]
pub struct SeparationPlan<'a> {
    pub input: &'a Path,
    pub models: &'a [String],
    pub preferred_device: &'a str,
    pub fallback_device: &'a str,
    pub sources: BTreeSet<SourceKind>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Succeeded,
    ResourceExhausted(String),
    Failed(String),
}

/// One (model, device) attempt and how it ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptRecord {
    pub model: String,
    pub device: String,
    pub outcome: AttemptOutcome,
}

#[derive(Debug, Clone)]
pub struct SeparationSuccess {
    pub model: String,
    pub device: String,
    pub sources: BTreeMap<SourceKind, PathBuf>,
    pub attempts: Vec<AttemptRecord>,
}

/// Every model failed.
#[derive(Debug, Clone, thiserror::Error)]
#[error("separation exhausted after {} attempts", .attempts.len())]
pub struct SeparationExhausted {
    pub attempts: Vec<AttemptRecord>,
}

impl From<SeparationExhausted> for PipelineError {
    fn from(e: SeparationExhausted) -> Self {
        PipelineError::SeparationExhausted {
            attempts: e.attempts.len() as u32,
        }
    }
}

async fn discard(dir: &Path) {
    if let Err(e) = tokio::fs::remove_dir_all(dir).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %dir.display(), error = %e, "Failed to remove failed attempt output");
        }
    }
}

async fn attempt(
    engine: &dyn SeparationEngine,
    accelerator: &Semaphore,
    workspace: &TrackWorkspace,
    plan: &SeparationPlan<'_>,
    model: &str,
    device: &str,
) -> (AttemptOutcome, BTreeMap<SourceKind, PathBuf>) {
    let request = SeparationRequest {
        input: plan.input.to_path_buf(),
        output_dir: workspace.separation_dir(model, device),
        model: model.to_string(),
        device: device.to_string(),
        sources: plan.sources.clone(),
    };

    let result = if device == plan.preferred_device {
        // One separation on the accelerator at a time.
        let _permit = accelerator.acquire().await.ok();
        engine.separate(&request).await
    } else {
        engine.separate(&request).await
    };

    let outcome = match result {
        Ok(output) => {
            let missing: Vec<String> = plan
                .sources
                .iter()
                .filter(|s| !output.sources.get(s).is_some_and(|p| p.exists()))
                .map(|s| s.to_string())
                .collect();
            if missing.is_empty() {
                return (AttemptOutcome::Succeeded, output.sources);
            }
            AttemptOutcome::Failed(format!("missing sources: {}", missing.join(", ")))
        }
        Err(SeparationError::ResourceExhausted(msg)) => AttemptOutcome::ResourceExhausted(msg),
        Err(SeparationError::Failed(msg)) => AttemptOutcome::Failed(msg),
    };

    discard(&request.output_dir).await;
    (outcome, BTreeMap::new())
}

/// Run the fallback chain until one attempt yields every requested source.
pub async fn separate_with_fallback(
    engine: &dyn SeparationEngine,
    accelerator: &Semaphore,
    workspace: &TrackWorkspace,
    plan: &SeparationPlan<'_>,
) -> Result<SeparationSuccess, SeparationExhausted> {
    let mut attempts = Vec::new();

    for model in plan.models {
        let mut device = plan.preferred_device;
        loop {
            tracing::info!(
                model = %model,
                device,
                attempt = attempts.len() + 1,
                sources = ?plan.sources,
                "Starting separation attempt"
            );

            let (outcome, sources) = attempt(engine, accelerator, workspace, plan, model, device).await;
            attempts.push(AttemptRecord {
                model: model.clone(),
                device: device.to_string(),
                outcome: outcome.clone(),
            });

            match outcome {
                AttemptOutcome::Succeeded => {
                    tracing::info!(model = %model, device, attempts = attempts.len(), "Separation succeeded");
                    return Ok(SeparationSuccess {
                        model: model.clone(),
                        device: device.to_string(),
                        sources,
                        attempts,
                    });
                }
                AttemptOutcome::ResourceExhausted(msg)
                    if device == plan.preferred_device
                        && plan.fallback_device != plan.preferred_device =>
                {
                    tracing::warn!(
                        model = %model,
                        device,
                        fallback = plan.fallback_device,
                        error = %msg,
                        "Device out of resources, retrying on fallback device"
                    );
                    device = plan.fallback_device;
                }
                AttemptOutcome::ResourceExhausted(msg) | AttemptOutcome::Failed(msg) => {
                    tracing::warn!(model = %model, device, error = %msg, "Separation attempt failed, trying next model");
                    break;
                }
            }
        }
    }

    tracing::error!(attempts = attempts.len(), "Every separation model failed");
    Err(SeparationExhausted { attempts })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::SeparationOutput;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use stemforge_common::TrackId;

    /// Engine that fails with a fixed error for every attempt.
    struct AlwaysFails {
        error: SeparationError,
        calls: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl SeparationEngine for AlwaysFails {
        async fn separate(
            &self,
            request: &SeparationRequest,
        ) -> Result<SeparationOutput, SeparationError> {
            self.calls
                .lock()
                .push((request.model.clone(), request.device.clone()));
            tokio::fs::create_dir_all(&request.output_dir).await.unwrap();
            Err(self.error.clone())
        }
    }

    /// Engine that "succeeds" without writing the requested files.
    struct EmptyOutput;

    #[async_trait]
    impl SeparationEngine for EmptyOutput {
        async fn separate(
            &self,
            _request: &SeparationRequest,
        ) -> Result<SeparationOutput, SeparationError> {
            Ok(SeparationOutput::default())
        }
    }

    fn models(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn oom_everywhere_uses_two_attempts_per_model() {
        let dir = tempfile::tempdir().unwrap();
        let ws = TrackWorkspace::new(dir.path(), &TrackId::from("T1"));
        let engine = AlwaysFails {
            error: SeparationError::ResourceExhausted("oom".into()),
            calls: Mutex::new(Vec::new()),
        };
        let chain = models(&["a", "b", "c"]);
        let plan = SeparationPlan {
            input: Path::new("/in.mp3"),
            models: &chain,
            preferred_device: "fast",
            fallback_device: "slow",
            sources: BTreeSet::from([SourceKind::Vocals]),
        };

        let err = separate_with_fallback(&engine, &Semaphore::new(1), &ws, &plan)
            .await
            .unwrap_err();
        assert_eq!(err.attempts.len(), 6);
        assert_eq!(engine.calls.lock()[1], ("a".to_string(), "slow".to_string()));
        // Failed attempts leave nothing behind.
        assert!(!ws.separation_dir("a", "fast").exists());
    }

    #[tokio::test]
    async fn generic_failure_skips_fallback_device() {
        let dir = tempfile::tempdir().unwrap();
        let ws = TrackWorkspace::new(dir.path(), &TrackId::from("T1"));
        let engine = AlwaysFails {
            error: SeparationError::Failed("corrupt input".into()),
            calls: Mutex::new(Vec::new()),
        };
        let chain = models(&["a", "b"]);
        let plan = SeparationPlan {
            input: Path::new("/in.mp3"),
            models: &chain,
            preferred_device: "fast",
            fallback_device: "slow",
            sources: BTreeSet::from([SourceKind::Drums]),
        };

        let err = separate_with_fallback(&engine, &Semaphore::new(1), &ws, &plan)
            .await
            .unwrap_err();
        assert_eq!(err.attempts.len(), 2);
        assert!(engine.calls.lock().iter().all(|(_, device)| device == "fast"));
        assert_eq!(
            PipelineError::from(err).kind(),
            super::super::ErrorKind::SeparationExhausted
        );
    }

    #[tokio::test]
    async fn missing_sources_count_as_failure() {
        let dir = tempfile::tempdir().unwrap();
        let ws = TrackWorkspace::new(dir.path(), &TrackId::from("T1"));
        let chain = models(&["a"]);
        let plan = SeparationPlan {
            input: Path::new("/in.mp3"),
            models: &chain,
            preferred_device: "fast",
            fallback_device: "slow",
            sources: BTreeSet::from([SourceKind::Vocals, SourceKind::Bass]),
        };

        let err = separate_with_fallback(&EmptyOutput, &Semaphore::new(1), &ws, &plan)
            .await
            .unwrap_err();
        assert_eq!(err.attempts.len(), 1);
        assert!(matches!(
            &err.attempts[0].outcome,
            AttemptOutcome::Failed(msg) if msg.contains("vocals")
        ));
    }
}
