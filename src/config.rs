//! TOML configuration.
//!
//! ```toml
//! [db]
//! path = "./data/tsh.sqlite"
//!
//! [graph]
//! tenant_id = "00000000-0000-0000-0000-000000000000"
//! client_id = "11111111-1111-1111-1111-111111111111"
//! site_hostname = "contoso.sharepoint.com"
//! site_path = "/sites/Engineering"
//! library = "Documents"
//! folder_path = "Recordings"
//!
//! [openai]
//! endpoint = "https://contoso.openai.azure.com"
//! deployment = "gpt-4o"
//! ```
//!
//! Secrets never live in the file. They are read from the environment:
//! `GRAPH_CLIENT_SECRET` and `AZURE_OPENAI_API_KEY`.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const GRAPH_SECRET_ENV: &str = "GRAPH_CLIENT_SECRET";
pub const OPENAI_KEY_ENV: &str = "AZURE_OPENAI_API_KEY";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub graph: GraphConfig,
    #[serde(default)]
    pub openai: Option<OpenAiConfig>,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

/// Microsoft Graph connection and drive scoping.
///
/// The drive is either given directly as `drive_id`, or resolved from
/// `site_hostname` + `site_path` + `library`.
#[derive(Debug, Deserialize, Clone)]
pub struct GraphConfig {
    pub tenant_id: String,
    pub client_id: String,
    #[serde(default)]
    pub drive_id: Option<String>,
    #[serde(default)]
    pub site_hostname: Option<String>,
    #[serde(default)]
    pub site_path: Option<String>,
    #[serde(default = "default_library")]
    pub library: String,
    /// Folder inside the drive to scan. Empty means the drive root.
    #[serde(default)]
    pub folder_path: String,
    #[serde(default = "default_authority_url")]
    pub authority_url: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// No timeout unless set; a stalled call stalls the scan.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

fn default_library() -> String {
    "Documents".to_string()
}
fn default_authority_url() -> String {
    "https://login.microsoftonline.com".to_string()
}
fn default_api_base() -> String {
    "https://graph.microsoft.com/v1.0".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct OpenAiConfig {
    pub endpoint: String,
    pub deployment: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_openai_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_api_version() -> String {
    "2024-06-01".to_string()
}
fn default_max_input_chars() -> usize {
    100_000
}
fn default_max_tokens() -> u32 {
    1500
}
fn default_temperature() -> f32 {
    0.3
}
fn default_openai_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}

impl GraphConfig {
    /// Folder path without surrounding slashes.
    pub fn normalized_folder(&self) -> &str {
        self.folder_path.trim_matches('/')
    }
}

impl Config {
    /// The OpenAI section, or an error explaining that summaries are off.
    pub fn openai(&self) -> Result<&OpenAiConfig> {
        self.openai
            .as_ref()
            .context("summaries are disabled: no [openai] section in config")
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    let graph = &config.graph;
    if graph.tenant_id.trim().is_empty() {
        bail!("graph.tenant_id must not be empty");
    }
    if graph.client_id.trim().is_empty() {
        bail!("graph.client_id must not be empty");
    }
    let has_drive = graph.drive_id.as_deref().is_some_and(|d| !d.trim().is_empty());
    let has_site = graph
        .site_hostname
        .as_deref()
        .is_some_and(|h| !h.trim().is_empty());
    if !has_drive && !has_site {
        bail!("graph.drive_id or graph.site_hostname must be set");
    }
    if graph.timeout_secs == Some(0) {
        bail!("graph.timeout_secs must be > 0 when set");
    }

    if let Some(openai) = &config.openai {
        if !(openai.endpoint.starts_with("https://") || openai.endpoint.starts_with("http://")) {
            bail!("openai.endpoint must be an http(s) URL");
        }
        if openai.deployment.trim().is_empty() {
            bail!("openai.deployment must not be empty");
        }
        if openai.max_input_chars == 0 {
            bail!("openai.max_input_chars must be > 0");
        }
        if !(0.0..=2.0).contains(&openai.temperature) {
            bail!("openai.temperature must be in [0.0, 2.0]");
        }
    }

    Ok(config)
}

/// Read a required secret from the environment.
pub fn secret_from_env(var: &str) -> Result<String> {
    let value = std::env::var(var).with_context(|| format!("{} environment variable not set", var))?;
    if value.trim().is_empty() {
        bail!("{} environment variable is empty", var);
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[db]
path = "./data/tsh.sqlite"

[graph]
tenant_id = "tenant"
client_id = "client"
drive_id = "b!abc"
"#;

    #[test]
    fn minimal_config_uses_defaults() {
        let cfg = parse_config(MINIMAL).unwrap();
        assert_eq!(cfg.graph.library, "Documents");
        assert_eq!(cfg.graph.api_base, "https://graph.microsoft.com/v1.0");
        assert_eq!(cfg.graph.folder_path, "");
        assert!(cfg.graph.timeout_secs.is_none());
        assert_eq!(cfg.server.bind, "127.0.0.1:7341");
        assert!(cfg.openai.is_none());
        assert!(cfg.openai().is_err());
    }

    #[test]
    fn requires_drive_or_site() {
        let content = MINIMAL.replace("drive_id = \"b!abc\"", "");
        let err = parse_config(&content).unwrap_err();
        assert!(err.to_string().contains("drive_id or graph.site_hostname"));
    }

    #[test]
    fn site_hostname_is_enough() {
        let content = MINIMAL.replace(
            "drive_id = \"b!abc\"",
            "site_hostname = \"contoso.sharepoint.com\"\nsite_path = \"/sites/eng\"",
        );
        let cfg = parse_config(&content).unwrap();
        assert_eq!(cfg.graph.site_hostname.as_deref(), Some("contoso.sharepoint.com"));
    }

    #[test]
    fn rejects_empty_tenant() {
        let content = MINIMAL.replace("tenant_id = \"tenant\"", "tenant_id = \" \"");
        assert!(parse_config(&content).is_err());
    }

    #[test]
    fn validates_openai_section() {
        let content = format!(
            "{}\n[openai]\nendpoint = \"contoso.openai.azure.com\"\ndeployment = \"gpt\"\n",
            MINIMAL
        );
        let err = parse_config(&content).unwrap_err();
        assert!(err.to_string().contains("openai.endpoint"));

        let content = format!(
            "{}\n[openai]\nendpoint = \"https://contoso.openai.azure.com\"\ndeployment = \"gpt\"\n",
            MINIMAL
        );
        let cfg = parse_config(&content).unwrap();
        let openai = cfg.openai().unwrap();
        assert_eq!(openai.api_version, "2024-06-01");
        assert_eq!(openai.max_input_chars, 100_000);
    }

    #[test]
    fn folder_path_is_trimmed() {
        let content = MINIMAL.replace(
            "drive_id = \"b!abc\"",
            "drive_id = \"b!abc\"\nfolder_path = \"/Recordings/2024/\"",
        );
        let cfg = parse_config(&content).unwrap();
        assert_eq!(cfg.graph.normalized_folder(), "Recordings/2024");
    }
}
