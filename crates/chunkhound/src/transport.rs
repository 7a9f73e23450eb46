//! Transport types for the ChunkHound tool server
//!
//! One JSON-RPC message per line over stdio, or an HTTP/SSE listener when
//! configured.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Transport mechanism for MCP protocol communication
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// Standard input/output transport - default for local processes
    #[value(name = "stdio")]
    #[default]
    Stdio,

    /// HTTP transport with SSE event streaming
    #[value(name = "http")]
    Http,
}

impl std::fmt::Display for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stdio => write!(f, "stdio"),
            Self::Http => write!(f, "http"),
        }
    }
}

impl std::str::FromStr for Transport {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "stdio" => Ok(Self::Stdio),
            "http" => Ok(Self::Http),
            _ => Err(format!(
                "Invalid transport: '{s}'. Valid options are: stdio, http"
            )),
        }
    }
}
