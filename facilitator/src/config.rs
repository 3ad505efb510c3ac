//! Configuration module for the x402 facilitator server.

use clap::Parser;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::IpAddr;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use x402_chain_solana::chain as solana;
use x402_chain_solana::chain::config::{SolanaChainConfig, SolanaChainConfigInner};
use x402_types::chain::ChainId;

/// CLI arguments for the x402 facilitator server.
#[derive(Parser, Debug)]
#[command(name = "x402-facilitator")]
#[command(about = "x402 prepare/settle facilitator for Solana")]
struct CliArgs {
    /// Path to the JSON configuration file
    #[arg(long, short, env = "CONFIG", default_value = "config.json")]
    config: PathBuf,
}

/// Server configuration.
///
/// Fields use serde defaults that fall back to environment variables,
/// then to hardcoded defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct Config<TChainsConfig = ChainsConfig> {
    #[serde(default = "config_defaults::default_port")]
    port: u16,
    #[serde(default = "config_defaults::default_host")]
    host: IpAddr,
    #[serde(default)]
    chains: TChainsConfig,
}

/// Solana clusters served by this facilitator, keyed by CAIP-2 id in the config file:
///
/// ```json
/// {
///   "chains": {
///     "solana:EtWTRABZaYq6iMfeYKouRu166VU2xqa1": { "signer": "$SOLANA_DEVNET_SIGNER" }
///   }
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct ChainsConfig(pub Vec<SolanaChainConfig>);

impl Deref for ChainsConfig {
    type Target = Vec<SolanaChainConfig>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Serialize for ChainsConfig {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeMap;

        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for config in &self.0 {
            map.serialize_entry(&config.chain_id(), &config.inner)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ChainsConfig {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::{MapAccess, Visitor};
        use std::fmt;

        struct ChainsVisitor;

        impl<'de> Visitor<'de> for ChainsVisitor {
            type Value = ChainsConfig;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a map of CAIP-2 Solana chain ids to chain configurations")
            }

            fn visit_map<M>(self, mut access: M) -> Result<Self::Value, M::Error>
            where
                M: MapAccess<'de>,
            {
                let mut chains = Vec::with_capacity(access.size_hint().unwrap_or(0));

                while let Some(chain_id) = access.next_key::<ChainId>()? {
                    let namespace = chain_id.namespace();
                    if namespace != solana::SOLANA_NAMESPACE {
                        return Err(serde::de::Error::custom(format!(
                            "Unexpected namespace: {}",
                            namespace
                        )));
                    }
                    let inner: SolanaChainConfigInner = access.next_value()?;
                    chains.push(SolanaChainConfig {
                        chain_reference: chain_id
                            .try_into()
                            .map_err(|e| serde::de::Error::custom(format!("{}", e)))?,
                        inner,
                    });
                }

                Ok(ChainsConfig(chains))
            }
        }

        deserializer.deserialize_map(ChainsVisitor)
    }
}

impl<TChainsConfig> Default for Config<TChainsConfig>
where
    TChainsConfig: Default,
{
    fn default() -> Self {
        Config {
            port: config_defaults::default_port(),
            host: config_defaults::default_host(),
            chains: TChainsConfig::default(),
        }
    }
}

pub mod config_defaults {
    use std::env;
    use std::net::{IpAddr, Ipv4Addr};

    pub const DEFAULT_PORT: u16 = 8080;

    /// Returns the default port value with fallback: $PORT env var -> 8080
    pub fn default_port() -> u16 {
        env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_PORT)
    }

    /// Returns the default host value with fallback: $HOST env var -> "0.0.0.0"
    pub fn default_host() -> IpAddr {
        env::var("HOST")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {0}: {1}")]
    FileRead(PathBuf, std::io::Error),
    #[error("Failed to parse config file: {0}")]
    JsonParse(#[from] serde_json::Error),
}

impl<TChainsConfig> Config<TChainsConfig> {
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn host(&self) -> IpAddr {
        self.host
    }

    /// Keys are CAIP-2 chain identifiers, e.g. "solana:5eykt4UsFv8P8NJdTREpY1vzqKqZKvdp".
    pub fn chains(&self) -> &TChainsConfig {
        &self.chains
    }
}

impl<TChainsConfig> Config<TChainsConfig>
where
    TChainsConfig: Default + for<'de> Deserialize<'de>,
{
    /// Load configuration from CLI arguments and JSON file.
    ///
    /// The config file path is determined by:
    /// 1. `--config <path>` CLI argument
    /// 2. `$CONFIG`
    /// 3. `./config.json`
    pub fn load() -> Result<Self, ConfigError> {
        let cli_args = CliArgs::parse();
        let config_path = Path::new(&cli_args.config)
            .canonicalize()
            .map_err(|e| ConfigError::FileRead(cli_args.config, e))?;
        Self::load_from_path(config_path)
    }

    fn load_from_path(path: PathBuf) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(&path).map_err(|e| ConfigError::FileRead(path, e))?;
        let config: Config<TChainsConfig> = serde_json::from_str(&content)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const KEY: &str = "2Ana1pUpv2ZbMVkwF5FXapYeBEjdxDatLn7nvJkhgTSdZd8hbDHTd21as7EAsg7ypityqfsw2pMQKJcVDVcAEsd";

    #[test]
    fn chains_are_keyed_by_caip2_id() {
        let config: Config = serde_json::from_value(json!({
            "port": 3000,
            "host": "127.0.0.1",
            "chains": {
                "solana:EtWTRABZaYq6iMfeYKouRu166VU2xqa1": {
                    "signer": KEY,
                    "custodian": { "url": "https://custodian.example.com" }
                }
            }
        }))
        .unwrap();
        assert_eq!(config.port(), 3000);
        assert_eq!(config.chains().len(), 1);
        let chain = &config.chains()[0];
        assert_eq!(chain.chain_id().to_string(), "solana:EtWTRABZaYq6iMfeYKouRu166VU2xqa1");
        assert!(chain.custodian().is_some());
    }

    #[test]
    fn foreign_namespace_is_rejected() {
        let result: Result<Config, _> = serde_json::from_value(json!({
            "chains": { "eip155:8453": { "signer": KEY } }
        }));
        assert!(result.is_err());
    }
}
