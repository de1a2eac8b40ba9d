use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use stemforge_common::StemType;

use crate::pipeline::Profile;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub separation: SeparationConfig,

    #[serde(default)]
    pub resilience: ResilienceConfig,

    #[serde(default)]
    pub validation: ValidationConfig,

    #[serde(default)]
    pub tools: ToolsConfig,

    #[serde(default)]
    pub sources: SourcesConfig,

    #[serde(default = "default_channels")]
    pub channels: Vec<ChannelConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pipeline: PipelineConfig::default(),
            separation: SeparationConfig::default(),
            resilience: ResilienceConfig::default(),
            validation: ValidationConfig::default(),
            tools: ToolsConfig::default(),
            sources: SourcesConfig::default(),
            channels: default_channels(),
        }
    }
}

impl Config {
    /// Look up a channel by name.
    pub fn channel(&self, name: &str) -> Option<&ChannelConfig> {
        self.channels.iter().find(|c| c.name == name)
    }

    /// Path of the checkpoint database.
    pub fn database_path(&self) -> PathBuf {
        self.pipeline
            .database
            .clone()
            .unwrap_or_else(|| self.pipeline.data_dir.join("stemforge.db"))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    /// Root directory for checkpoints and scratch files.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Checkpoint database; defaults to `<data_dir>/stemforge.db`.
    #[serde(default)]
    pub database: Option<PathBuf>,

    /// Number of tracks of one playlist processed at the same time.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    #[serde(default)]
    pub profile: Profile,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./stemforge-data")
}

fn default_concurrency() -> usize {
    1
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            database: None,
            concurrency: default_concurrency(),
            profile: Profile::default(),
        }
    }
}

impl PipelineConfig {
    /// Scratch directory for one track's intermediate files.
    pub fn work_dir(&self) -> PathBuf {
        self.data_dir.join("work")
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SeparationConfig {
    /// Models to try, highest quality first. Never reordered at runtime.
    #[serde(default = "default_models")]
    pub models: Vec<String>,

    #[serde(default = "default_preferred_device")]
    pub preferred_device: String,

    #[serde(default = "default_fallback_device")]
    pub fallback_device: String,

    /// Number of random shifts passed to the separation engine.
    #[serde(default)]
    pub shifts: u32,

    /// Per-attempt timeout in seconds.
    #[serde(default = "default_separation_timeout")]
    pub timeout_secs: u64,
}

fn default_models() -> Vec<String> {
    vec![
        "htdemucs_6s".to_string(),
        "htdemucs_ft".to_string(),
        "htdemucs".to_string(),
    ]
}

fn default_preferred_device() -> String {
    "cuda".to_string()
}

fn default_fallback_device() -> String {
    "cpu".to_string()
}

fn default_separation_timeout() -> u64 {
    3600
}

impl Default for SeparationConfig {
    fn default() -> Self {
        Self {
            models: default_models(),
            preferred_device: default_preferred_device(),
            fallback_device: default_fallback_device(),
            shifts: 0,
            timeout_secs: default_separation_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResilienceConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ValidationConfig {
    /// Smallest acceptable stem file (bytes).
    #[serde(default = "default_min_stem_bytes")]
    pub min_stem_bytes: u64,

    /// Largest acceptable stem file (bytes).
    #[serde(default = "default_max_stem_bytes")]
    pub max_stem_bytes: u64,

    /// Acquired audio smaller than this is treated as a broken download.
    #[serde(default = "default_min_source_bytes")]
    pub min_source_bytes: u64,
}

fn default_min_stem_bytes() -> u64 {
    100 * 1024
}

fn default_max_stem_bytes() -> u64 {
    5 * 1024 * 1024 * 1024
}

fn default_min_source_bytes() -> u64 {
    150_000
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            min_stem_bytes: default_min_stem_bytes(),
            max_stem_bytes: default_max_stem_bytes(),
            min_source_bytes: default_min_source_bytes(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ToolsConfig {
    #[serde(default)]
    pub demucs_path: Option<PathBuf>,

    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,

    #[serde(default)]
    pub ffprobe_path: Option<PathBuf>,
}

/// Locations used by the bundled file-backed collaborators.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourcesConfig {
    /// TOML manifest describing catalog tracks.
    #[serde(default)]
    pub catalog_manifest: Option<PathBuf>,

    /// Directory searched for source audio.
    #[serde(default)]
    pub audio_dir: Option<PathBuf>,

    /// Directory published items are written to.
    #[serde(default)]
    pub outbox_dir: Option<PathBuf>,

    /// Allowed difference between catalog and candidate duration.
    #[serde(default = "default_duration_tolerance")]
    pub duration_tolerance_secs: u64,
}

fn default_duration_tolerance() -> u64 {
    10
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            catalog_manifest: None,
            audio_dir: None,
            outbox_dir: None,
            duration_tolerance_secs: default_duration_tolerance(),
        }
    }
}

/// A publishing destination and the stems it receives.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ChannelConfig {
    pub name: String,

    /// Stems this channel publishes. Each one is required for the track to complete.
    #[serde(default)]
    pub stems: Vec<StemType>,

    /// Stems published when they validate; a failure does not fail the track.
    #[serde(default)]
    pub optional_stems: Vec<StemType>,

    /// Leave the musical key out of titles (drum-focused channels).
    #[serde(default)]
    pub hide_key: bool,

    /// Watermark image drawn over every video of this channel.
    #[serde(default)]
    pub watermark: Option<PathBuf>,

    #[serde(default)]
    pub description: Option<String>,

    /// Extra tags appended after the default set.
    #[serde(default)]
    pub tags: Vec<String>,
}

impl ChannelConfig {
    pub fn new(name: impl Into<String>, stems: Vec<StemType>) -> Self {
        Self {
            name: name.into(),
            stems,
            optional_stems: Vec::new(),
            hide_key: false,
            watermark: None,
            description: None,
            tags: Vec::new(),
        }
    }

    /// Every stem this channel may publish, required ones first.
    pub fn all_stems(&self) -> impl Iterator<Item = StemType> + '_ {
        self.stems
            .iter()
            .chain(self.optional_stems.iter())
            .copied()
    }
}

fn default_channels() -> Vec<ChannelConfig> {
    use StemType::*;

    let mut drums = ChannelConfig::new("son_got_drums", vec![Drums]);
    drums.hide_key = true;

    vec![
        ChannelConfig::new(
            "main_channel",
            vec![Acapella, Drums, Bass, Melody, Instrumental],
        ),
        ChannelConfig::new("son_got_acapellas", vec![Acapella]),
        drums,
        ChannelConfig::new("sgs_2", vec![Acapella, Instrumental]),
        ChannelConfig::new("sample_split", vec![Melody, Bass]),
    ]
}
