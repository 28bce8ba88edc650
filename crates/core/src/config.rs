//! Configuration management for CycleCare.
//!
//! Configuration is layered, later sources winning:
//! - Built-in defaults
//! - Config file (`.cyclecare/config.yaml` or `CYCLECARE_CONFIG`)
//! - Environment variables
//! - Command-line flags (`with_overrides`)
//!
//! State lives under the workspace's `.cyclecare/` directory.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};

/// Name of the per-workspace state directory.
pub const STATE_DIR: &str = ".cyclecare";

const KNOWN_PROVIDERS: [&str; 3] = ["ollama", "gemini", "mock"];
const KNOWN_SCHEMES: [&str; 3] = ["hashed", "ollama", "gemini"];

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the workspace root (contains .cyclecare/)
    pub workspace: PathBuf,

    /// Optional config file path
    pub config_file: Option<PathBuf>,

    /// Generation provider ("ollama", "gemini", "mock")
    pub provider: String,

    /// Generation model identifier
    pub model: String,

    /// Explicit API key for the generation provider
    pub api_key: Option<String>,

    /// Log level override
    pub log_level: Option<String>,

    /// Verbose mode (enables debug logging)
    pub verbose: bool,

    /// Disable colored output
    pub no_color: bool,

    pub generation: GenerationConfig,

    pub embedding: EmbeddingConfig,

    pub rag: RagConfig,
}

/// Settings for the answer-generating model.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GenerationConfig {
    /// Base URL override for the provider API
    pub endpoint: Option<String>,

    /// Environment variable holding the provider API key
    pub api_key_env: String,

    pub temperature: f32,

    pub max_output_tokens: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key_env: "GOOGLE_API_KEY".to_string(),
            temperature: 0.3,
            max_output_tokens: 1024,
        }
    }
}

/// The embedding scheme shared by every vector in one index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EmbeddingConfig {
    /// "hashed", "ollama" or "gemini"
    pub scheme: String,

    /// Model name; each scheme has a default
    pub model: Option<String>,

    /// Vector length; each scheme has a default
    pub dimensions: Option<usize>,

    /// Base URL override for the embedding service
    pub endpoint: Option<String>,

    /// Environment variable holding the API key for hosted schemes
    pub api_key_env: String,

    /// Inputs longer than this many characters are rejected
    pub max_input_chars: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            scheme: "hashed".to_string(),
            model: None,
            dimensions: None,
            endpoint: None,
            api_key_env: "GOOGLE_API_KEY".to_string(),
            max_input_chars: 8192,
        }
    }
}

impl EmbeddingConfig {
    pub fn model_name(&self) -> String {
        match &self.model {
            Some(model) => model.clone(),
            None => match self.scheme.as_str() {
                "ollama" => "nomic-embed-text".to_string(),
                "gemini" => "models/embedding-001".to_string(),
                _ => "trigram-hash".to_string(),
            },
        }
    }

    pub fn resolved_dimensions(&self) -> usize {
        self.dimensions.unwrap_or(match self.scheme.as_str() {
            "ollama" | "gemini" => 768,
            _ => 384,
        })
    }

    pub fn validate(&self) -> AppResult<()> {
        if !KNOWN_SCHEMES.contains(&self.scheme.as_str()) {
            return Err(AppError::Config(format!(
                "Unknown embedding scheme: {}. Supported: {}",
                self.scheme,
                KNOWN_SCHEMES.join(", ")
            )));
        }
        if self.resolved_dimensions() == 0 {
            return Err(AppError::Config(
                "Embedding dimensions must be positive".to_string(),
            ));
        }
        if self.max_input_chars == 0 {
            return Err(AppError::Config(
                "embedding.maxInputChars must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Retrieval, prompt and resource settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RagConfig {
    /// Chunk length in characters
    pub chunk_size: usize,

    /// Characters shared by consecutive chunks
    pub chunk_overlap: usize,

    /// Default number of passages retrieved per question
    pub top_k: usize,

    /// Inline prompt template; overrides `prompt_id`
    pub prompt_template: Option<String>,

    /// Template loaded from `.cyclecare/prompts/<id>.yml`
    pub prompt_id: Option<String>,

    /// Upper bound on the assembled prompt, in characters
    pub max_prompt_chars: usize,

    /// Language the answer should be written in
    pub language: String,

    /// Timeout applied to each embedding or generation call
    pub request_timeout_ms: u64,

    /// Maximum in-flight calls to external model services
    pub max_concurrent_external_calls: usize,

    /// Index storage directory, relative to the workspace unless absolute
    pub index_dir: Option<PathBuf>,

    /// Default source for `ingest`
    pub documents_dir: Option<PathBuf>,

    /// JSON clinic directory
    pub clinics_file: Option<PathBuf>,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            top_k: 5,
            prompt_template: None,
            prompt_id: None,
            max_prompt_chars: 12_000,
            language: "English".to_string(),
            request_timeout_ms: 30_000,
            max_concurrent_external_calls: 4,
            index_dir: None,
            documents_dir: None,
            clinics_file: None,
        }
    }
}

impl RagConfig {
    pub fn validate(&self) -> AppResult<()> {
        if self.chunk_size == 0 {
            return Err(AppError::Config("rag.chunkSize must be positive".to_string()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(AppError::Config(format!(
                "rag.chunkOverlap ({}) must be smaller than rag.chunkSize ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.top_k == 0 {
            return Err(AppError::Config("rag.topK must be positive".to_string()));
        }
        if self.max_prompt_chars == 0 {
            return Err(AppError::Config(
                "rag.maxPromptChars must be positive".to_string(),
            ));
        }
        if self.request_timeout_ms == 0 {
            return Err(AppError::Config(
                "rag.requestTimeoutMs must be positive".to_string(),
            ));
        }
        if self.max_concurrent_external_calls == 0 {
            return Err(AppError::Config(
                "rag.maxConcurrentExternalCalls must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Full configuration file structure.
#[derive(Debug, Clone, Default, Deserialize)]
struct ConfigFile {
    workspace: Option<WorkspaceSection>,
    logging: Option<LoggingSection>,
    generation: Option<GenerationSection>,
    embedding: Option<EmbeddingConfig>,
    rag: Option<RagConfig>,
}

#[derive(Debug, Clone, Deserialize)]
struct WorkspaceSection {
    path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct LoggingSection {
    level: Option<String>,
    color: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
struct GenerationSection {
    provider: Option<String>,
    model: Option<String>,
    #[serde(flatten)]
    settings: GenerationConfig,
}

/// Default generation model for a provider.
pub fn default_model_for(provider: &str) -> &'static str {
    match provider {
        "gemini" => "gemini-2.0-flash",
        "mock" => "mock-model",
        _ => "llama3.2",
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workspace: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            config_file: None,
            provider: "ollama".to_string(),
            model: default_model_for("ollama").to_string(),
            api_key: None,
            log_level: None,
            verbose: false,
            no_color: false,
            generation: GenerationConfig::default(),
            embedding: EmbeddingConfig::default(),
            rag: RagConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, the config file and the environment.
    ///
    /// Environment variables:
    /// - `CYCLECARE_WORKSPACE`: Override workspace path
    /// - `CYCLECARE_CONFIG`: Path to config file
    /// - `CYCLECARE_PROVIDER`: Generation provider
    /// - `CYCLECARE_MODEL`: Generation model
    /// - `CYCLECARE_API_KEY`: API key
    /// - `RUST_LOG`: Log level
    /// - `NO_COLOR`: Disable colored output
    pub fn load() -> AppResult<Self> {
        let mut config = Self::default();

        if let Ok(workspace) = std::env::var("CYCLECARE_WORKSPACE") {
            config.workspace = PathBuf::from(workspace);
        }

        if let Ok(config_file) = std::env::var("CYCLECARE_CONFIG") {
            config.config_file = Some(PathBuf::from(config_file));
        }

        if !config.workspace.exists() {
            return Err(AppError::Config(format!(
                "Workspace directory does not exist: {:?}",
                config.workspace
            )));
        }

        let config_path = config
            .config_file
            .clone()
            .unwrap_or_else(|| config.state_dir().join("config.yaml"));

        if config_path.exists() {
            config = config.merge_yaml(&config_path)?;
        } else if config.config_file.is_some() {
            return Err(AppError::Config(format!(
                "Config file not found: {:?}",
                config_path
            )));
        }

        if let Ok(provider) = std::env::var("CYCLECARE_PROVIDER") {
            config.set_provider(provider);
        }

        if let Ok(model) = std::env::var("CYCLECARE_MODEL") {
            config.model = model;
        }

        if let Ok(key) = std::env::var("CYCLECARE_API_KEY") {
            config.api_key = Some(key);
        }

        if config.log_level.is_none() {
            config.log_level = std::env::var("RUST_LOG").ok();
        }

        if std::env::var_os("NO_COLOR").is_some() {
            config.no_color = true;
        }

        Ok(config)
    }

    /// Merge a YAML configuration file into a copy of this config.
    pub fn merge_yaml(&self, path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let file: ConfigFile = serde_yaml::from_str(&contents).map_err(|e| {
            AppError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })?;

        let mut result = self.clone();

        if let Some(path) = file.workspace.and_then(|ws| ws.path) {
            result.workspace = PathBuf::from(path);
        }

        if let Some(logging) = file.logging {
            if let Some(level) = logging.level {
                result.log_level = Some(level);
            }
            if let Some(color) = logging.color {
                result.no_color = !color;
            }
        }

        if let Some(generation) = file.generation {
            if let Some(provider) = generation.provider {
                result.set_provider(provider);
            }
            if let Some(model) = generation.model {
                result.model = model;
            }
            result.generation = generation.settings;
        }

        if let Some(embedding) = file.embedding {
            result.embedding = embedding;
        }

        if let Some(rag) = file.rag {
            result.rag = rag;
        }

        Ok(result)
    }

    /// Apply CLI overrides; flags take precedence over everything else.
    #[allow(clippy::too_many_arguments)]
    pub fn with_overrides(
        mut self,
        workspace: Option<PathBuf>,
        config_file: Option<PathBuf>,
        provider: Option<String>,
        model: Option<String>,
        log_level: Option<String>,
        verbose: bool,
        no_color: bool,
    ) -> Self {
        if let Some(workspace) = workspace {
            self.workspace = workspace;
        }

        if let Some(config_file) = config_file {
            self.config_file = Some(config_file);
        }

        if let Some(provider) = provider {
            self.set_provider(provider);
        }

        if let Some(model) = model {
            self.model = model;
        }

        if let Some(log_level) = log_level {
            self.log_level = Some(log_level);
        }

        if verbose {
            self.verbose = true;
            if self.log_level.is_none() {
                self.log_level = Some("debug".to_string());
            }
        }

        if no_color {
            self.no_color = true;
        }

        self
    }

    /// Switch provider, resetting the model to that provider's default.
    fn set_provider(&mut self, provider: String) {
        if provider != self.provider {
            self.model = default_model_for(&provider).to_string();
        }
        self.provider = provider;
    }

    /// Path to the .cyclecare directory.
    pub fn state_dir(&self) -> PathBuf {
        self.workspace.join(STATE_DIR)
    }

    /// Ensure the .cyclecare directory exists.
    pub fn ensure_state_dir(&self) -> AppResult<()> {
        let dir = self.state_dir();
        if !dir.exists() {
            std::fs::create_dir_all(&dir).map_err(|e| {
                AppError::Config(format!("Failed to create {} directory: {}", STATE_DIR, e))
            })?;
        }
        Ok(())
    }

    /// Resolved index storage directory.
    pub fn index_dir(&self) -> PathBuf {
        match &self.rag.index_dir {
            Some(dir) => self.resolve(dir),
            None => self.state_dir().join("index"),
        }
    }

    pub fn documents_dir(&self) -> Option<PathBuf> {
        self.rag.documents_dir.as_ref().map(|dir| self.resolve(dir))
    }

    pub fn clinics_file(&self) -> Option<PathBuf> {
        self.rag.clinics_file.as_ref().map(|file| self.resolve(file))
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workspace.join(path)
        }
    }

    /// Resolve the generation API key.
    ///
    /// An explicit key wins over the environment variable named by
    /// `generation.apiKeyEnv`.
    pub fn resolve_api_key(&self) -> Option<String> {
        if let Some(ref key) = self.api_key {
            return Some(key.clone());
        }
        std::env::var(&self.generation.api_key_env).ok()
    }

    /// Validate the whole configuration. Any error is fatal at startup.
    pub fn validate(&self) -> AppResult<()> {
        if !KNOWN_PROVIDERS.contains(&self.provider.as_str()) {
            return Err(AppError::Config(format!(
                "Unknown provider: {}. Supported: {}",
                self.provider,
                KNOWN_PROVIDERS.join(", ")
            )));
        }

        if self.model.trim().is_empty() {
            return Err(AppError::Config("Generation model must not be empty".to_string()));
        }

        if self.provider == "gemini" && self.resolve_api_key().is_none() {
            return Err(AppError::Config(format!(
                "API key not found in environment variable: {}",
                self.generation.api_key_env
            )));
        }

        if !(0.0..=2.0).contains(&self.generation.temperature) {
            return Err(AppError::Config(format!(
                "generation.temperature must be within 0.0..=2.0, got {}",
                self.generation.temperature
            )));
        }

        self.embedding.validate()?;
        self.rag.validate()?;

        if self.rag.chunk_size > self.embedding.max_input_chars {
            return Err(AppError::Config(format!(
                "rag.chunkSize ({}) exceeds embedding.maxInputChars ({})",
                self.rag.chunk_size, self.embedding.max_input_chars
            )));
        }

        Ok(())
    }
}
