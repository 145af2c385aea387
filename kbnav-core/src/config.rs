// User configuration stored as JSON under ~/.config/kbnav

use crate::error::{ConfigError, DiagramError};
use crate::links::{DEFAULT_DOCUMENT_EXTENSION, LinkResolver};
use crate::render::RenderPipeline;
use crate::render::diagram::{DiagramRenderer, KrokiRenderer, SourceRenderer};
use crate::render::math::MathMlRenderer;
use kbnav_client::{ApiClient, ClientError, Credentials};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_CONFIG_PATH: &str = "~/.config/kbnav/config.json";

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagramBackend {
    /// Show diagram source as-is; no network.
    #[default]
    Source,
    /// Base URL of a Kroki server.
    Kroki(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server_url: String,
    pub username: String,
    pub password: String,
    pub request_timeout_secs: u64,
    pub autosave_debounce_ms: u64,
    pub diagram_renderer: DiagramBackend,
    pub document_extension: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:8080".to_string(),
            username: "admin".to_string(),
            password: String::new(),
            request_timeout_secs: 10,
            autosave_debounce_ms: 1000,
            diagram_renderer: DiagramBackend::Source,
            document_extension: DEFAULT_DOCUMENT_EXTENSION.to_string(),
        }
    }
}

/// Values given on the command line or through the environment.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub server_url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

pub fn default_path() -> PathBuf {
    PathBuf::from(shellexpand::tilde(DEFAULT_CONFIG_PATH).as_ref())
}

impl Config {
    /// Read the config file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&raw)?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json + "\n")?;
        Ok(())
    }

    /// Write a default config file, refusing to clobber one unless `force`.
    pub fn init(path: &Path, force: bool) -> Result<Self, ConfigError> {
        if path.exists() && !force {
            return Err(ConfigError::AlreadyExists(path.display().to_string()));
        }
        let config = Self::default();
        config.save(path)?;
        Ok(config)
    }

    pub fn apply_overrides(&mut self, overrides: Overrides) {
        if let Some(server_url) = overrides.server_url {
            self.server_url = server_url;
        }
        if let Some(username) = overrides.username {
            self.username = username;
        }
        if let Some(password) = overrides.password {
            self.password = password;
        }
    }

    pub fn credentials(&self) -> Result<Credentials, ConfigError> {
        if self.username.is_empty() {
            return Err(ConfigError::Missing("username"));
        }
        Ok(Credentials::new(&self.username, &self.password))
    }

    pub fn client(&self) -> Result<ApiClient, ConfigError> {
        let credentials = self.credentials()?;
        ApiClient::with_timeout(&self.server_url, credentials, self.request_timeout_secs).map_err(
            |e| match e {
                ClientError::InvalidUrl(url) => ConfigError::InvalidUrl(url),
                other => ConfigError::InvalidUrl(other.to_string()),
            },
        )
    }

    pub fn autosave_debounce(&self) -> Duration {
        Duration::from_millis(self.autosave_debounce_ms)
    }

    pub fn link_resolver(&self) -> LinkResolver {
        LinkResolver::new(&self.document_extension)
    }

    pub fn render_pipeline(&self) -> Result<RenderPipeline, DiagramError> {
        let diagrams: Arc<dyn DiagramRenderer> = match &self.diagram_renderer {
            DiagramBackend::Source => Arc::new(SourceRenderer),
            DiagramBackend::Kroki(url) => {
                Arc::new(KrokiRenderer::new(url, self.request_timeout_secs)?)
            }
        };
        Ok(RenderPipeline::new(Arc::new(MathMlRenderer), diagrams))
    }
}
