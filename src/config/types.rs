use fragforge_media::FragmentOptions;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub codec: CodecConfig,

    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CodecConfig {
    /// Upper bound on data-offset recomputation passes per fragment
    #[serde(default = "default_max_offset_iterations")]
    pub max_offset_iterations: usize,

    /// Collapse uniform per-sample values into track fragment defaults on rewrite
    #[serde(default)]
    pub set_sample_defaults: bool,
}

fn default_max_offset_iterations() -> usize {
    fragforge_media::fragment::DEFAULT_MAX_OFFSET_ITERATIONS
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            max_offset_iterations: default_max_offset_iterations(),
            set_sample_defaults: false,
        }
    }
}

impl CodecConfig {
    pub fn fragment_options(&self) -> FragmentOptions {
        FragmentOptions {
            max_offset_iterations: self.max_offset_iterations,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OutputConfig {
    /// Allow `rewrite` to replace an existing output file
    #[serde(default)]
    pub overwrite: bool,
}
