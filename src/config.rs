use crate::ai::{AIConfig, AIProvider};
use crate::error::{Error, Result};
use clap::Parser;
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Command-line flags, each with an environment fallback.
#[derive(Parser, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[arg(long, env = "SNOWFLAKE_USER")]
    pub user: String,

    #[arg(long, env = "SNOWFLAKE_PASSWORD", hide_env_values = true)]
    pub password: String,

    #[arg(long, env = "SNOWFLAKE_ACCOUNT")]
    pub account: String,

    #[arg(long, env = "SNOWFLAKE_ROLE")]
    pub role: String,

    #[arg(long, env = "SNOWFLAKE_WAREHOUSE")]
    pub warehouse: String,

    #[arg(long, env = "SNOWFLAKE_DATABASE")]
    pub database: String,

    #[arg(long, env = "SNOWFLAKE_SCHEMA", default_value = "FACT")]
    pub schema: String,

    /// Comma-separated `DATABASE.SCHEMA` entries whose tables are exposed to the model
    #[arg(long, env = "SNOWBOT_SCHEMAS", value_delimiter = ',', required = true)]
    pub schemas: Vec<String>,

    /// Request timeout for warehouse calls, in seconds
    #[arg(long, env = "SNOWBOT_QUERY_TIMEOUT", default_value_t = 60)]
    pub query_timeout_secs: u64,

    #[arg(long, env = "SNOWBOT_AI_PROVIDER", default_value = "openai")]
    pub ai_provider: String,

    #[arg(long, env = "SNOWBOT_MODEL")]
    pub model: Option<String>,

    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub api_key: String,

    /// Token endpoint for the single-sign-on request issued before connecting
    #[arg(long, env = "SNOWBOT_SSO_TOKEN_URL")]
    pub sso_token_url: Option<String>,

    #[arg(long, env = "SNOWBOT_SSO_AUTHORIZATION", hide_env_values = true)]
    pub sso_authorization: Option<String>,

    #[arg(long, env = "SNOWBOT_BIND", default_value = "127.0.0.1:8501")]
    pub bind: SocketAddr,

    /// Seconds a chat session may sit unused before it is dropped
    #[arg(long, env = "SNOWBOT_SESSION_IDLE", default_value_t = 3600)]
    pub session_idle_secs: u64,

    /// Default log level; `RUST_LOG` takes precedence when set
    #[arg(long, env = "SNOWBOT_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[arg(long)]
    pub env_file: Option<PathBuf>,
}

#[derive(Clone)]
pub struct SnowflakeSettings {
    pub user: String,
    pub password: String,
    pub account: String,
    pub role: String,
    pub warehouse: String,
    pub database: String,
    pub schema: String,
    pub query_timeout_secs: u64,
}

impl fmt::Debug for SnowflakeSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnowflakeSettings")
            .field("user", &self.user)
            .field("account", &self.account)
            .field("role", &self.role)
            .field("warehouse", &self.warehouse)
            .field("database", &self.database)
            .field("schema", &self.schema)
            .finish()
    }
}

#[derive(Clone)]
pub struct SsoSettings {
    pub token_url: String,
    pub authorization: Option<String>,
}

impl fmt::Debug for SsoSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SsoSettings")
            .field("token_url", &self.token_url)
            .finish_non_exhaustive()
    }
}

/// A `DATABASE.SCHEMA` pair whose tables are described to the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaRef {
    pub database: String,
    pub schema: String,
}

impl SchemaRef {
    pub fn parse(raw: &str) -> Result<Self> {
        let parts: Vec<&str> = raw.trim().split('.').collect();
        match parts.as_slice() {
            [database, schema] if !database.is_empty() && !schema.is_empty() => Ok(Self {
                database: database.to_uppercase(),
                schema: schema.to_uppercase(),
            }),
            _ => Err(Error::Config(format!(
                "schema `{}` must look like DATABASE.SCHEMA",
                raw
            ))),
        }
    }
}

impl fmt::Display for SchemaRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.schema)
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub snowflake: SnowflakeSettings,
    pub sso: Option<SsoSettings>,
    pub schemas: Vec<SchemaRef>,
    pub ai: AIConfig,
    pub bind: SocketAddr,
    pub session_idle: Duration,
}

impl Config {
    /// Validate raw flags into a ready-to-use configuration.
    pub fn from_args(args: Args) -> Result<Self> {
        let required = [
            ("SNOWFLAKE_USER", &args.user),
            ("SNOWFLAKE_PASSWORD", &args.password),
            ("SNOWFLAKE_ACCOUNT", &args.account),
            ("SNOWFLAKE_ROLE", &args.role),
            ("SNOWFLAKE_WAREHOUSE", &args.warehouse),
            ("SNOWFLAKE_DATABASE", &args.database),
            ("OPENAI_API_KEY", &args.api_key),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(Error::Config(format!("{} cannot be empty", name)));
            }
        }

        let schemas = args
            .schemas
            .iter()
            .filter(|s| !s.trim().is_empty())
            .map(|s| SchemaRef::parse(s))
            .collect::<Result<Vec<_>>>()?;
        if schemas.is_empty() {
            return Err(Error::Config("SNOWBOT_SCHEMAS lists no schema".into()));
        }

        let provider = AIProvider::parse(&args.ai_provider)?;
        let model = args
            .model
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| provider.default_model().to_string());

        let sso = args
            .sso_token_url
            .filter(|url| !url.trim().is_empty())
            .map(|token_url| SsoSettings {
                token_url,
                authorization: args.sso_authorization,
            });

        Ok(Self {
            snowflake: SnowflakeSettings {
                user: args.user,
                password: args.password,
                account: args.account,
                role: args.role,
                warehouse: args.warehouse,
                database: args.database,
                schema: args.schema,
                query_timeout_secs: args.query_timeout_secs,
            },
            sso,
            schemas,
            ai: AIConfig {
                provider,
                api_key: args.api_key,
                model,
            },
            bind: args.bind,
            session_idle: Duration::from_secs(args.session_idle_secs),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> Args {
        Args::parse_from([
            "snowbot",
            "--user",
            "analyst",
            "--password",
            "hunter2",
            "--account",
            "xy12345",
            "--role",
            "REPORTING",
            "--warehouse",
            "COMPUTE_WH",
            "--database",
            "ABC",
            "--schemas",
            "abc.raw,abc.curated",
            "--api-key",
            "sk-test",
        ])
    }

    #[test]
    fn schemas_are_upper_cased() {
        let config = Config::from_args(args()).unwrap();
        assert_eq!(
            config.schemas,
            vec![
                SchemaRef { database: "ABC".into(), schema: "RAW".into() },
                SchemaRef { database: "ABC".into(), schema: "CURATED".into() },
            ]
        );
        assert_eq!(config.ai.provider, AIProvider::OpenAI);
        assert_eq!(config.ai.model, "gpt-4");
        assert!(config.sso.is_none());
        assert_eq!(config.session_idle, Duration::from_secs(3600));
    }

    #[test]
    fn rejects_malformed_schema() {
        let mut raw = args();
        raw.schemas = vec!["ABC".into()];
        assert!(matches!(Config::from_args(raw), Err(Error::Config(_))));
    }

    #[test]
    fn rejects_blank_credentials() {
        let mut raw = args();
        raw.password = "  ".into();
        let err = Config::from_args(raw).unwrap_err();
        assert!(err.to_string().contains("SNOWFLAKE_PASSWORD"));
    }

    #[test]
    fn debug_output_hides_secrets() {
        let config = Config::from_args(args()).unwrap();
        let printed = format!("{:?}", config);
        assert!(!printed.contains("hunter2"));
        assert!(!printed.contains("sk-test"));
    }
}
