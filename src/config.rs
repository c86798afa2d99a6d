//! Configuration: `~/.dispogen/config.json`.
//!
//! One small file, read once at startup. Only the template path is
//! required; artifact staging and the catalog database have sensible
//! defaults under `~/.dispogen/`.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// The `.docx` template the composer fills in.
    pub template_path: String,
    /// Where generated artifacts are staged before delivery.
    /// Defaults to `~/.dispogen/reports`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<String>,
    /// Catalog database override. Defaults to `~/.dispogen/dispogen.db`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_path: Option<String>,
}

impl Config {
    pub fn template_path(&self) -> PathBuf {
        PathBuf::from(&self.template_path)
    }

    pub fn output_dir(&self) -> Result<PathBuf, String> {
        match &self.output_dir {
            Some(dir) => Ok(PathBuf::from(dir)),
            None => Ok(state_dir()?.join("reports")),
        }
    }

    pub fn db_path(&self) -> Option<PathBuf> {
        self.db_path.as_ref().map(PathBuf::from)
    }
}

/// Get the state directory (~/.dispogen)
fn state_dir() -> Result<PathBuf, String> {
    let home = dirs::home_dir().ok_or("Could not find home directory")?;
    Ok(home.join(".dispogen"))
}

/// Get the canonical config file path (~/.dispogen/config.json)
pub fn config_path() -> Result<PathBuf, String> {
    Ok(state_dir()?.join("config.json"))
}

/// Load configuration from ~/.dispogen/config.json
pub fn load_config() -> Result<Config, String> {
    let path = config_path()?;

    if !path.exists() {
        return Err(format!(
            "Config file not found at {}. Create it with: {{ \"templatePath\": \"/path/to/template.docx\" }}",
            path.display()
        ));
    }

    let content =
        std::fs::read_to_string(&path).map_err(|e| format!("Failed to read config: {}", e))?;

    let config: Config =
        serde_json::from_str(&content).map_err(|e| format!("Failed to parse config: {}", e))?;

    // Validate the template exists up front — a missing template should fail
    // at startup, not on the first generation request.
    if !config.template_path().exists() {
        return Err(format!(
            "Template does not exist: {}",
            config.template_path
        ));
    }

    Ok(config)
}
