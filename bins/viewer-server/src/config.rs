use clap::{Args, Parser, Subcommand};
use serde::Deserialize;

pub use viewer_engine::DatasetSource;

#[derive(Parser)]
#[command(name = "viewer-server", about = "Data viewer backend: paged access to tabular datasets")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve the configured datasets
    Serve(ServeArgs),
    /// Load every configured dataset and report it, without serving
    Check(ServeArgs),
}

#[derive(Args, Clone, Debug)]
pub struct ServeArgs {
    /// Path to the TOML config file
    #[arg(long, default_value = "config.toml", env = "CONFIG_PATH")]
    pub config: String,
}

// ---- TOML Config ----

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_api_port")]
    pub api_port: u16,
    /// Channel namespace datasets are opened under.
    #[serde(default = "default_target_name")]
    pub target_name: String,
    /// Outbound queue size per viewer connection.
    #[serde(default = "default_ws_buffer")]
    pub ws_buffer: usize,
    #[serde(default)]
    pub datasets: Vec<DatasetSource>,
}

fn default_api_port() -> u16 {
    9300
}
fn default_target_name() -> String {
    viewer_engine::DEFAULT_TARGET_NAME.to_string()
}
fn default_ws_buffer() -> usize {
    1024
}

impl ServerConfig {
    pub fn load(path: &str) -> Result<Self, crate::error::ServerError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::error::ServerError::Config { context: "read", detail: format!("'{path}': {e}") })?;
        Self::parse(&content)
            .map_err(|detail| crate::error::ServerError::Config { context: "parse", detail: format!("'{path}': {detail}") })
    }

    fn parse(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
    }
}
