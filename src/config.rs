use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

const DEFAULT_API_BASE_URL: &str = "http://localhost:3000";
const DEFAULT_TIMEOUT_SECS: u64 = 10;

// Portal configuration sourced from environment variables, optionally
// overridden by a TOML file named in PORTAL_CONFIG.
#[derive(Debug, Clone, PartialEq)]
pub struct PortalConfig {
    pub api_base_url: String,
    pub auth_base_url: String,
    pub state_dir: PathBuf,
    pub request_timeout: Duration,
}

#[derive(Debug, Default, Deserialize)]
struct PortalConfigOverride {
    api_base_url: Option<String>,
    auth_base_url: Option<String>,
    state_dir: Option<PathBuf>,
    request_timeout_secs: Option<u64>,
}

impl PortalConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_env_or_file() -> anyhow::Result<Self> {
        let mut config = Self::from_env()?;
        if let Ok(path) = std::env::var("PORTAL_CONFIG") {
            config.apply_file(Path::new(&path))?;
        }
        Ok(config)
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let api_base_url =
            lookup("PORTAL_API_BASE_URL").unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());
        let auth_base_url = lookup("PORTAL_AUTH_BASE_URL").unwrap_or_else(|| api_base_url.clone());
        let state_dir = match lookup("PORTAL_STATE_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => default_state_dir()?,
        };
        let request_timeout = match lookup("PORTAL_HTTP_TIMEOUT_SECS") {
            Some(raw) => Duration::from_secs(
                raw.parse()
                    .with_context(|| format!("parse PORTAL_HTTP_TIMEOUT_SECS: {raw}"))?,
            ),
            None => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        };
        Ok(Self {
            api_base_url,
            auth_base_url,
            state_dir,
            request_timeout,
        })
    }

    fn apply_file(&mut self, path: &Path) -> anyhow::Result<()> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("read PORTAL_CONFIG: {}", path.display()))?;
        self.apply_toml(&contents)
            .with_context(|| format!("parse {}", path.display()))
    }

    fn apply_toml(&mut self, contents: &str) -> anyhow::Result<()> {
        let overrides: PortalConfigOverride = toml::from_str(contents)?;
        if let Some(value) = overrides.api_base_url {
            self.api_base_url = value;
        }
        if let Some(value) = overrides.auth_base_url {
            self.auth_base_url = value;
        }
        if let Some(value) = overrides.state_dir {
            self.state_dir = value;
        }
        if let Some(value) = overrides.request_timeout_secs {
            self.request_timeout = Duration::from_secs(value);
        }
        Ok(())
    }
}

fn default_state_dir() -> anyhow::Result<PathBuf> {
    if let Some(data_dir) = dirs::data_dir() {
        return Ok(data_dir.join("campus-portal"));
    }
    if let Some(home) = dirs::home_dir() {
        return Ok(home.join(".campus-portal"));
    }
    anyhow::bail!("could not determine a state directory; set PORTAL_STATE_DIR")
}
