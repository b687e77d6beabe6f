//! CLI module for Relay
//!
//! Command-line interface definitions and handlers for the Relay inference
//! gateway.
//!
//! # Commands
//!
//! - `keys` - Manage tenant provider keys (add, list, promote, revoke)
//! - `usage` - Show metered token usage for a tenant
//! - `chat` - Send a chat completion through the gateway
//! - `embed` - Generate an embedding vector
//! - `answer` - Ask an agent a question
//! - `generate` - Run multi-section generation for an agent
//! - `register` - Push a tenant's provider key to the backend
//! - `health` - Show backend health
//! - `config` - Configuration utilities (init)
//! - `completions` - Generate shell completions
//!
//! # Example
//!
//! ```bash
//! # Store a key for tenant 7 and make it the default
//! relay keys add 7 openai --label prod --default "$OPENAI_KEY"
//!
//! # Show today's usage
//! relay usage 7 --date 2026-01-15 --json
//! ```

pub mod completions;
pub mod config;
pub mod dispatch;
pub mod health;
pub mod keys;
pub mod output;
pub mod usage;

pub use completions::handle_completions;
pub use config::handle_config_init;

use crate::app::Gateway;
use crate::config::{ConfigError, RelayConfig};
use crate::resolver::{ModelRef, ProviderRef};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};

/// Relay - multi-tenant inference gateway
#[derive(Parser, Debug)]
#[command(
    name = "relay",
    version,
    about = "Multi-tenant gateway in front of an LLM inference backend"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage tenant provider keys
    #[command(subcommand)]
    Keys(KeysCommands),
    /// Show metered token usage
    Usage(UsageArgs),
    /// Send a chat completion
    Chat(ChatArgs),
    /// Generate an embedding
    Embed(EmbedArgs),
    /// Ask an agent a question
    Answer(AnswerArgs),
    /// Generate multi-section content with an agent
    Generate(GenerateArgs),
    /// Register a tenant's provider key with the backend
    Register(RegisterArgs),
    /// Show backend health
    Health(HealthArgs),
    /// Configuration utilities
    #[command(subcommand)]
    Config(ConfigCommands),
    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Subcommand, Debug)]
pub enum KeysCommands {
    /// Encrypt and store a provider key
    Add(KeysAddArgs),
    /// List a tenant's keys (masked)
    List(KeysListArgs),
    /// Make a key the default for its provider
    Promote(KeyIdArgs),
    /// Delete a key
    Revoke(KeyIdArgs),
}

#[derive(Args, Debug)]
pub struct KeysAddArgs {
    /// Tenant id
    pub tenant: i64,

    /// Provider id or slug (e.g. 1, openai)
    pub provider: String,

    /// The API key
    #[arg(env = "RELAY_KEY", hide_env_values = true)]
    pub key: String,

    /// Human-readable label
    #[arg(short, long, default_value = "default")]
    pub label: String,

    /// Make this key the provider default
    #[arg(short, long)]
    pub default: bool,

    /// Expire the key after this many days
    #[arg(long)]
    pub expires_in_days: Option<i64>,

    /// Path to configuration file
    #[arg(short, long, default_value = "relay.toml")]
    pub config: PathBuf,
}

#[derive(Args, Debug)]
pub struct KeysListArgs {
    /// Tenant id
    pub tenant: i64,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Path to configuration file
    #[arg(short, long, default_value = "relay.toml")]
    pub config: PathBuf,
}

#[derive(Args, Debug)]
pub struct KeyIdArgs {
    /// Tenant id
    pub tenant: i64,

    /// Credential id
    pub id: i64,

    /// Path to configuration file
    #[arg(short, long, default_value = "relay.toml")]
    pub config: PathBuf,
}

#[derive(Args, Debug)]
pub struct UsageArgs {
    /// Tenant id
    pub tenant: i64,

    /// Only this UTC date (YYYY-MM-DD)
    #[arg(short, long)]
    pub date: Option<chrono::NaiveDate>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Path to configuration file
    #[arg(short, long, default_value = "relay.toml")]
    pub config: PathBuf,
}

/// Provider/model selection shared by the inference commands.
#[derive(Args, Debug, Clone, Default)]
pub struct TargetArgs {
    /// Provider id or slug; the configured default when omitted
    #[arg(short, long)]
    pub provider: Option<String>,

    /// Model id or slug, or the auto sentinel
    #[arg(short, long)]
    pub model: Option<String>,
}

#[derive(Args, Debug)]
pub struct ChatArgs {
    /// Tenant id
    pub tenant: i64,

    /// User message
    pub message: String,

    /// Optional system prompt
    #[arg(short, long)]
    pub system: Option<String>,

    #[command(flatten)]
    pub target: TargetArgs,

    /// Sampling temperature
    #[arg(short, long)]
    pub temperature: Option<f32>,

    /// Maximum tokens to generate
    #[arg(long)]
    pub max_tokens: Option<u32>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Path to configuration file
    #[arg(short, long, default_value = "relay.toml")]
    pub config: PathBuf,
}

#[derive(Args, Debug)]
pub struct EmbedArgs {
    /// Tenant id
    pub tenant: i64,

    /// Text to embed
    pub text: String,

    #[command(flatten)]
    pub target: TargetArgs,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Path to configuration file
    #[arg(short, long, default_value = "relay.toml")]
    pub config: PathBuf,
}

#[derive(Args, Debug)]
pub struct AnswerArgs {
    /// Tenant id
    pub tenant: i64,

    /// Agent id
    pub agent: i64,

    /// The question
    pub question: String,

    /// Knowledge base the question is asked against
    #[arg(short, long)]
    pub knowledge_base: Option<i64>,

    #[command(flatten)]
    pub target: TargetArgs,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Path to configuration file
    #[arg(short, long, default_value = "relay.toml")]
    pub config: PathBuf,
}

#[derive(Args, Debug)]
pub struct GenerateArgs {
    /// Tenant id
    pub tenant: i64,

    /// Agent id
    pub agent: i64,

    /// What to write
    pub query: String,

    /// Number of sections
    #[arg(short = 'n', long, default_value = "3")]
    pub sections: u32,

    /// Maximum tokens per section
    #[arg(long)]
    pub max_tokens: Option<u32>,

    /// Knowledge base to draw context from
    #[arg(short, long)]
    pub knowledge_base: Option<i64>,

    #[command(flatten)]
    pub target: TargetArgs,

    /// Path to configuration file
    #[arg(short, long, default_value = "relay.toml")]
    pub config: PathBuf,
}

#[derive(Args, Debug)]
pub struct RegisterArgs {
    /// Tenant id
    pub tenant: i64,

    /// Provider id or slug
    pub provider: String,

    /// Path to configuration file
    #[arg(short, long, default_value = "relay.toml")]
    pub config: PathBuf,
}

#[derive(Args, Debug)]
pub struct HealthArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Path to configuration file
    #[arg(short, long, default_value = "relay.toml")]
    pub config: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Initialize a new configuration file
    Init(ConfigInitArgs),
}

#[derive(Args, Debug)]
pub struct ConfigInitArgs {
    /// Output file path
    #[arg(short, long, default_value = "relay.toml")]
    pub output: PathBuf,

    /// Overwrite existing file
    #[arg(short, long)]
    pub force: bool,
}

#[derive(Args, Debug)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: clap_complete::Shell,
}

/// Load the config file when present, else defaults, then apply `RELAY_*`
/// overrides.
pub fn load_config(path: &Path) -> Result<RelayConfig, ConfigError> {
    let config = if path.exists() {
        RelayConfig::load(Some(path))?
    } else {
        tracing::debug!(path = %path.display(), "Config file not found, using defaults");
        RelayConfig::default()
    };
    Ok(config.with_env_overrides())
}

pub async fn build_gateway(config: RelayConfig) -> Result<Gateway, Box<dyn std::error::Error>> {
    Ok(Gateway::from_config(config).await?)
}

impl TargetArgs {
    pub fn provider_ref(&self) -> ProviderRef {
        self.provider.clone().into()
    }

    pub fn model_ref(&self, auto_sentinel: &str) -> ModelRef {
        ModelRef::parse(self.model.clone().into(), auto_sentinel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_target_refs() {
        let target = TargetArgs {
            provider: Some("2".to_string()),
            model: Some("AUTO".to_string()),
        };
        assert_eq!(target.provider_ref().as_numeric_id(), Some(2));
        assert_eq!(target.model_ref("auto"), ModelRef::Auto);
        assert_eq!(TargetArgs::default().provider_ref(), ProviderRef::Missing);
        assert_eq!(TargetArgs::default().model_ref("auto"), ModelRef::Unspecified);
    }

    #[test]
    fn test_load_config_missing_file_uses_defaults() {
        let config = load_config(Path::new("/nonexistent/relay.toml")).unwrap();
        assert_eq!(config.providers.len(), 5);
    }

    #[test]
    fn test_cli_parse_keys_add() {
        let cli = Cli::try_parse_from([
            "relay", "keys", "add", "7", "openai", "sk-test", "--label", "prod", "--default",
        ])
        .unwrap();
        match cli.command {
            Commands::Keys(KeysCommands::Add(args)) => {
                assert_eq!(args.tenant, 7);
                assert_eq!(args.provider, "openai");
                assert_eq!(args.key, "sk-test");
                assert_eq!(args.label, "prod");
                assert!(args.default);
                assert_eq!(args.config, PathBuf::from("relay.toml"));
            }
            _ => panic!("Expected Keys Add command"),
        }
    }

    #[test]
    fn test_cli_parse_keys_list_json() {
        let cli = Cli::try_parse_from(["relay", "keys", "list", "3", "--json"]).unwrap();
        match cli.command {
            Commands::Keys(KeysCommands::List(args)) => {
                assert_eq!(args.tenant, 3);
                assert!(args.json);
            }
            _ => panic!("Expected Keys List command"),
        }
    }

    #[test]
    fn test_cli_parse_keys_revoke() {
        let cli = Cli::try_parse_from(["relay", "keys", "revoke", "3", "12", "-c", "x.toml"]).unwrap();
        match cli.command {
            Commands::Keys(KeysCommands::Revoke(args)) => {
                assert_eq!(args.id, 12);
                assert_eq!(args.config, PathBuf::from("x.toml"));
            }
            _ => panic!("Expected Keys Revoke command"),
        }
    }

    #[test]
    fn test_cli_parse_usage_with_date() {
        let cli = Cli::try_parse_from(["relay", "usage", "3", "--date", "2026-01-15"]).unwrap();
        match cli.command {
            Commands::Usage(args) => {
                assert_eq!(args.date.unwrap().to_string(), "2026-01-15");
            }
            _ => panic!("Expected Usage command"),
        }
    }

    #[test]
    fn test_cli_parse_usage_rejects_bad_date() {
        assert!(Cli::try_parse_from(["relay", "usage", "3", "--date", "yesterday"]).is_err());
    }

    #[test]
    fn test_cli_parse_chat_target() {
        let cli = Cli::try_parse_from([
            "relay", "chat", "1", "hello", "-p", "anthropic", "-m", "auto", "-t", "0.2",
        ])
        .unwrap();
        match cli.command {
            Commands::Chat(args) => {
                assert_eq!(args.message, "hello");
                assert_eq!(args.target.provider.as_deref(), Some("anthropic"));
                assert_eq!(args.target.model.as_deref(), Some("auto"));
                assert_eq!(args.temperature, Some(0.2));
            }
            _ => panic!("Expected Chat command"),
        }
    }

    #[test]
    fn test_cli_parse_generate_defaults() {
        let cli = Cli::try_parse_from(["relay", "generate", "1", "4", "Write a guide"]).unwrap();
        match cli.command {
            Commands::Generate(args) => {
                assert_eq!(args.agent, 4);
                assert_eq!(args.sections, 3);
                assert!(args.knowledge_base.is_none());
            }
            _ => panic!("Expected Generate command"),
        }
    }

    #[test]
    fn test_cli_parse_health() {
        let cli = Cli::try_parse_from(["relay", "health"]).unwrap();
        assert!(matches!(cli.command, Commands::Health(_)));
    }
}
