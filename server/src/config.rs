use clap::parser::ValueSource;
use clap::{ArgMatches, CommandFactory, FromArgMatches, Parser};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Anchorvault storage server
#[derive(Parser, Serialize, Deserialize, Clone, Debug)]
#[command(name = "anchorvault-server", version, about = "Encrypting, ledger-anchored file vault")]
pub struct Config {
    /// Port to listen on
    #[arg(long, env = "ANCHORVAULT_PORT", default_value = "3000")]
    pub port: u16,

    /// Bind address
    #[arg(long, env = "ANCHORVAULT_BIND_ADDRESS", default_value = "0.0.0.0")]
    pub bind_address: String,

    /// Path to TOML config file
    #[arg(long, default_value = "./anchorvault.toml")]
    pub config: String,

    /// Enable structured JSON logging (for Docker/production)
    #[arg(long, env = "ANCHORVAULT_JSON_LOGS")]
    pub json_logs: bool,

    /// Output a commented TOML config template and exit
    #[arg(long)]
    pub generate_config: bool,

    /// Data directory for persistent state (DB, keys, local uploads)
    #[arg(long, env = "ANCHORVAULT_DATA_DIR", default_value = "./data")]
    pub data_dir: String,

    /// Hex-encoded 256-bit payload key. When unset, a key file in the data
    /// directory is loaded or generated.
    #[arg(long, env = "ANCHORVAULT_CIPHER_KEY", hide_env_values = true)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cipher_key: Option<String>,

    /// Maximum upload size in megabytes
    #[arg(long, env = "ANCHORVAULT_MAX_UPLOAD_SIZE_MB", default_value = "100")]
    pub max_upload_size_mb: u32,

    /// Object storage configuration (loaded from [storage] section in TOML)
    #[arg(skip)]
    #[serde(default, skip_serializing)]
    pub storage: StorageConfig,

    /// Policy record configuration (loaded from [metadata] section in TOML)
    #[arg(skip)]
    #[serde(default, skip_serializing)]
    pub metadata: MetadataConfig,

    /// Ledger configuration (loaded from [ledger] section in TOML)
    #[arg(skip)]
    #[serde(default, skip_serializing)]
    pub ledger: LedgerConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Local,
    Ipfs,
    Memory,
}

/// Where sealed payloads live.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_backend")]
    pub backend: StorageBackend,

    /// Upload directory for the local backend (default: {data_dir}/uploads)
    #[serde(default)]
    pub upload_dir: Option<String>,

    /// IPFS RPC API root (default: http://127.0.0.1:5001)
    #[serde(default = "default_ipfs_api_url")]
    pub ipfs_api_url: String,

    /// Per-request timeout against the IPFS node in seconds (default: 60)
    #[serde(default = "default_ipfs_timeout")]
    pub ipfs_timeout_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Local,
            upload_dir: None,
            ipfs_api_url: default_ipfs_api_url(),
            ipfs_timeout_secs: default_ipfs_timeout(),
        }
    }
}

fn default_storage_backend() -> StorageBackend {
    StorageBackend::Local
}

fn default_ipfs_api_url() -> String {
    "http://127.0.0.1:5001".to_string()
}

fn default_ipfs_timeout() -> u64 {
    60
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetadataBackend {
    Sqlite,
    Remote,
    Memory,
}

/// Where policy records live.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataConfig {
    #[serde(default = "default_metadata_backend")]
    pub backend: MetadataBackend,

    /// Base URL of a remote policy record service (backend = "remote")
    #[serde(default = "default_metadata_url")]
    pub remote_url: String,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            backend: MetadataBackend::Sqlite,
            remote_url: default_metadata_url(),
        }
    }
}

fn default_metadata_backend() -> MetadataBackend {
    MetadataBackend::Sqlite
}

fn default_metadata_url() -> String {
    "http://localhost:4000/metadata".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerBackend {
    Sqlite,
    Rpc,
    Memory,
}

/// Where anchors are written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(default = "default_ledger_backend")]
    pub backend: LedgerBackend,

    /// JSON-RPC endpoint of the ledger gateway (backend = "rpc")
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,

    /// Bearer token for the gateway, if it requires one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,

    /// Hex Ed25519 seed used to sign anchors. When unset, a key file in the
    /// data directory is loaded or generated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signer_key: Option<String>,

    /// Seconds to wait for ledger confirmation before reporting the anchor missing
    #[serde(default = "default_anchor_timeout")]
    pub anchor_timeout_secs: u64,

    /// Milliseconds between confirmation polls (backend = "rpc")
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Per-call timeout against the gateway in seconds (backend = "rpc")
    #[serde(default = "default_rpc_timeout")]
    pub rpc_timeout_secs: u64,

    /// Version string anchored when an upload does not name one
    #[serde(default = "default_version")]
    pub default_version: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            backend: LedgerBackend::Sqlite,
            rpc_url: default_rpc_url(),
            api_token: None,
            signer_key: None,
            anchor_timeout_secs: default_anchor_timeout(),
            poll_interval_ms: default_poll_interval(),
            rpc_timeout_secs: default_rpc_timeout(),
            default_version: default_version(),
        }
    }
}

fn default_ledger_backend() -> LedgerBackend {
    LedgerBackend::Sqlite
}

fn default_rpc_url() -> String {
    "http://127.0.0.1:8545".to_string()
}

fn default_anchor_timeout() -> u64 {
    30
}

fn default_poll_interval() -> u64 {
    500
}

fn default_rpc_timeout() -> u64 {
    10
}

fn default_version() -> String {
    crate::pipeline::DEFAULT_VERSION.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            bind_address: "0.0.0.0".to_string(),
            config: "./anchorvault.toml".to_string(),
            json_logs: false,
            generate_config: false,
            data_dir: "./data".to_string(),
            cipher_key: None,
            max_upload_size_mb: 100,
            storage: StorageConfig::default(),
            metadata: MetadataConfig::default(),
            ledger: LedgerConfig::default(),
        }
    }
}

impl Config {
    /// Load config with layered precedence:
    /// built-in defaults < TOML file < env vars (ANCHORVAULT_*) < CLI args
    ///
    /// Sections are never serialized, so only TOML and env can set them.
    pub fn load() -> Result<Self, figment::Error> {
        Self::from_matches(&Config::command().get_matches())
    }

    fn from_matches(matches: &ArgMatches) -> Result<Self, figment::Error> {
        let cli = Config::from_arg_matches(matches).unwrap_or_else(|e| e.exit());

        Self::figment(&cli.config)
            .merge(Serialized::defaults(explicit_args(&cli, matches)))
            .extract()
    }

    /// Everything below the CLI layer. Nested keys use `__` in env names,
    /// e.g. `ANCHORVAULT_LEDGER__RPC_URL`.
    fn figment(config_path: &str) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(config_path))
            .merge(Env::prefixed("ANCHORVAULT_").split("__"))
    }

    /// Upload directory for the local backend.
    pub fn upload_dir(&self) -> String {
        self.storage.upload_dir.clone().unwrap_or_else(|| {
            std::path::Path::new(&self.data_dir)
                .join("uploads")
                .to_string_lossy()
                .into_owned()
        })
    }
}

/// The CLI layer, minus values clap filled in from `default_value`. Those
/// would otherwise mask the TOML file.
fn explicit_args(cli: &Config, matches: &ArgMatches) -> Map<String, Value> {
    let mut args = match serde_json::to_value(cli) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    };
    args.retain(|id, _| {
        matches!(
            matches.value_source(id),
            Some(ValueSource::CommandLine | ValueSource::EnvVariable)
        )
    });
    args
}

/// Generate a commented TOML config template
pub fn generate_config_template() -> String {
    r#"# Anchorvault Server Configuration
# Place this file at ./anchorvault.toml or specify with --config <path>
# All settings can be overridden via environment variables (ANCHORVAULT_PORT,
# ANCHORVAULT_LEDGER__RPC_URL, etc.) or CLI flags (--port, etc.)

# Server port (default: 3000)
# port = 3000

# Bind address (default: 0.0.0.0, all interfaces)
# bind_address = "0.0.0.0"

# Enable structured JSON logging for Docker/production
# json_logs = false

# Data directory for the SQLite database, key files and local uploads
# data_dir = "./data"

# Hex-encoded 256-bit payload key. Prefer ANCHORVAULT_CIPHER_KEY over writing
# it here. When unset, {data_dir}/cipher_key is loaded or generated.
# cipher_key = ""

# Maximum upload size in megabytes (default: 100)
# max_upload_size_mb = 100

# ---- Object Storage ----
# [storage]
# backend = "local"            # local | ipfs | memory
# upload_dir = "./data/uploads"  # stored records point here; move the files
#                                 # along with any change to this path
# ipfs_api_url = "http://127.0.0.1:5001"
# ipfs_timeout_secs = 60

# ---- Policy Records ----
# [metadata]
# backend = "sqlite"           # sqlite | remote | memory
# remote_url = "http://localhost:4000/metadata"

# ---- Ledger ----
# [ledger]
# backend = "sqlite"           # sqlite | rpc | memory
# rpc_url = "http://127.0.0.1:8545"
# api_token = ""               # prefer ANCHORVAULT_LEDGER__API_TOKEN
# signer_key = ""              # hex Ed25519 seed; default {data_dir}/ledger_signer.key
# anchor_timeout_secs = 30
# poll_interval_ms = 500
# rpc_timeout_secs = 10
# default_version = "v1.0"
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_parses_as_defaults() {
        let parsed: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::string(&generate_config_template()))
            .extract()
            .unwrap();
        assert_eq!(parsed.port, 3000);
        assert_eq!(parsed.storage.backend, StorageBackend::Local);
        assert_eq!(parsed.ledger.default_version, "v1.0");
    }

    #[test]
    fn test_toml_sections_override_defaults() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "anchorvault.toml",
                r#"
                port = 8080
                [storage]
                backend = "ipfs"
                [ledger]
                backend = "rpc"
                anchor_timeout_secs = 5
                "#,
            )?;
            jail.set_env("ANCHORVAULT_LEDGER__RPC_URL", "http://ledger:9000");

            let config: Config = Config::figment("anchorvault.toml").extract()?;
            assert_eq!(config.port, 8080);
            assert_eq!(config.storage.backend, StorageBackend::Ipfs);
            assert_eq!(config.ledger.backend, LedgerBackend::Rpc);
            assert_eq!(config.ledger.anchor_timeout_secs, 5);
            assert_eq!(config.ledger.rpc_url, "http://ledger:9000");
            assert_eq!(config.metadata.backend, MetadataBackend::Sqlite);
            Ok(())
        });
    }

    fn load_with(args: &[&str]) -> Result<Config, figment::Error> {
        let matches = Config::command()
            .try_get_matches_from(std::iter::once("anchorvault-server").chain(args.iter().copied()))
            .unwrap();
        Config::from_matches(&matches)
    }

    #[test]
    fn test_toml_top_level_survives_cli_defaults() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "anchorvault.toml",
                r#"
                port = 8080
                data_dir = "/srv/vault"
                json_logs = true
                max_upload_size_mb = 5
                "#,
            )?;

            let config = load_with(&[])?;
            assert_eq!(config.port, 8080);
            assert_eq!(config.data_dir, "/srv/vault");
            assert!(config.json_logs);
            assert_eq!(config.max_upload_size_mb, 5);
            assert_eq!(config.bind_address, "0.0.0.0");
            Ok(())
        });
    }

    #[test]
    fn test_env_and_cli_override_toml() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("custom.toml", "port = 8080\ndata_dir = \"/srv/vault\"\n")?;
            jail.set_env("ANCHORVAULT_DATA_DIR", "/env/vault");

            let config = load_with(&["--config", "custom.toml", "--port", "9000"])?;
            assert_eq!(config.port, 9000);
            assert_eq!(config.data_dir, "/env/vault");
            Ok(())
        });
    }

    #[test]
    fn test_upload_dir_defaults_under_data_dir() {
        let config = Config {
            data_dir: "/var/lib/anchorvault".to_string(),
            ..Config::default()
        };
        assert_eq!(config.upload_dir(), "/var/lib/anchorvault/uploads");
    }
}
