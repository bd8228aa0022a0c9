//! Server configuration from environment variables

use std::time::Duration;

use thiserror::Error;

/// Default per-request generation deadline
const DEFAULT_GENERATION_TIMEOUT_SECS: u64 = 12;

/// USDC on Base Sepolia
const DEFAULT_X402_ASSET: &str = "0x036CbD53842c5426634e7929541eC2318f3dCF7e";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {0}")]
    Missing(&'static str),
    #[error("Invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
    #[error("Insecure configuration: {0}")]
    Insecure(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Production,
    Development,
    Test,
}

impl Environment {
    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }

    fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_lowercase().as_str() {
            "production" | "prod" => Ok(Environment::Production),
            "development" | "dev" => Ok(Environment::Development),
            "test" => Ok(Environment::Test),
            other => Err(ConfigError::Invalid {
                var: "APP_ENV",
                reason: format!("unknown environment '{other}'"),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Micropayment parameters
#[derive(Debug, Clone)]
pub struct X402Config {
    pub recipient: String,
    pub facilitator_url: String,
    pub network: String,
    pub asset: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub environment: Environment,
    pub bind_address: String,
    pub database_url: String,

    /// Payments globally enabled
    pub paid_enabled: bool,
    /// Honor flat-rate plans at the payment gate
    pub require_plan: bool,

    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_jwt_secret: String,

    pub x402: X402Config,
    /// Base for absolute resource URLs in payment instructions
    pub public_base_url: String,

    pub openai_api_key: String,
    pub openai_model: String,
    pub openai_base_url: String,
    pub generation_timeout: Duration,

    /// token -> user id pairs for the test identity provider
    pub test_identity_tokens: Vec<(String, String)>,
    pub admin_uids: Vec<String>,
    pub allowed_origins: Vec<String>,
    pub log_format: LogFormat,
}

impl Config {
    /// Read configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let get_or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let environment = match get("APP_ENV") {
            Some(v) => Environment::parse(&v)?,
            None => Environment::Development,
        };

        let generation_timeout = match get("GENERATION_TIMEOUT_SECS") {
            Some(v) => Duration::from_secs(v.trim().parse().map_err(|_| ConfigError::Invalid {
                var: "GENERATION_TIMEOUT_SECS",
                reason: format!("'{v}' is not a whole number of seconds"),
            })?),
            None => Duration::from_secs(DEFAULT_GENERATION_TIMEOUT_SECS),
        };

        let log_format = match get("LOG_FORMAT").as_deref().map(str::to_lowercase).as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        let config = Self {
            environment,
            bind_address: get_or("BIND_ADDRESS", "0.0.0.0:8080"),
            database_url: get_or("DATABASE_URL", "sqlite:habitpay.db?mode=rwc"),
            paid_enabled: parse_flag(get("PAID_ENABLED")),
            require_plan: parse_flag(get("REQUIRE_PLAN")),
            supabase_url: get_or("SUPABASE_URL", "").trim_end_matches('/').to_string(),
            supabase_anon_key: get_or("SUPABASE_ANON_KEY", ""),
            supabase_jwt_secret: get_or("SUPABASE_JWT_SECRET", ""),
            x402: X402Config {
                recipient: get_or("X402_RECIPIENT", ""),
                facilitator_url: get_or("X402_FACILITATOR", "").trim_end_matches('/').to_string(),
                network: get_or("X402_NETWORK", "base-sepolia"),
                asset: get_or("X402_ASSET", DEFAULT_X402_ASSET),
            },
            public_base_url: get_or("PUBLIC_BASE_URL", "http://localhost:8080")
                .trim_end_matches('/')
                .to_string(),
            openai_api_key: get_or("OPENAI_API_KEY", ""),
            openai_model: get_or("OPENAI_MODEL", "gpt-4o-mini"),
            openai_base_url: get_or("OPENAI_BASE_URL", "https://api.openai.com")
                .trim_end_matches('/')
                .to_string(),
            generation_timeout,
            test_identity_tokens: parse_token_pairs(get("TEST_IDENTITY_TOKENS").as_deref())?,
            admin_uids: parse_list(get("ADMIN_UIDS").as_deref()),
            allowed_origins: match get("ALLOWED_ORIGINS") {
                Some(v) => parse_list(Some(&v)),
                None => vec![
                    "http://localhost:3000".to_string(),
                    "http://127.0.0.1:3000".to_string(),
                ],
            },
            log_format,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.environment.is_production() {
            if !self.test_identity_tokens.is_empty() {
                return Err(ConfigError::Insecure(
                    "TEST_IDENTITY_TOKENS must not be set in production",
                ));
            }
            if self.supabase_url.is_empty() {
                return Err(ConfigError::Missing("SUPABASE_URL"));
            }
        }

        if self.paid_enabled {
            if self.x402.recipient.is_empty() {
                return Err(ConfigError::Missing("X402_RECIPIENT"));
            }
            if self.x402.facilitator_url.is_empty() {
                return Err(ConfigError::Missing("X402_FACILITATOR"));
            }
            url::Url::parse(&self.x402.facilitator_url).map_err(|e| ConfigError::Invalid {
                var: "X402_FACILITATOR",
                reason: e.to_string(),
            })?;
        }

        if !self.supabase_url.is_empty() {
            url::Url::parse(&self.supabase_url).map_err(|e| ConfigError::Invalid {
                var: "SUPABASE_URL",
                reason: e.to_string(),
            })?;
        }

        Ok(())
    }

    pub fn is_admin(&self, user_id: &str) -> bool {
        self.admin_uids.iter().any(|uid| uid == user_id)
    }
}

fn parse_flag(value: Option<String>) -> bool {
    matches!(
        value.as_deref().map(|v| v.trim().to_lowercase()).as_deref(),
        Some("true" | "1" | "yes")
    )
}

fn parse_list(value: Option<&str>) -> Vec<String> {
    value
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// `token:user,token:user`
fn parse_token_pairs(value: Option<&str>) -> Result<Vec<(String, String)>, ConfigError> {
    parse_list(value)
        .into_iter()
        .map(|pair| match pair.split_once(':') {
            Some((token, user)) if !token.is_empty() && !user.is_empty() => {
                Ok((token.to_string(), user.to_string()))
            }
            _ => Err(ConfigError::Invalid {
                var: "TEST_IDENTITY_TOKENS",
                reason: "expected token:user pairs".to_string(),
            }),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::collections::HashMap;

    fn from_map(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = from_map(&[]).unwrap();
        assert_eq!(config.environment, Environment::Development);
        assert!(!config.paid_enabled);
        assert!(!config.require_plan);
        assert_eq!(config.generation_timeout, Duration::from_secs(12));
        assert_eq!(config.x402.network, "base-sepolia");
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert_eq!(config.allowed_origins.len(), 2);
    }

    #[test]
    fn test_paid_requires_recipient_and_facilitator() {
        let err = from_map(&[("PAID_ENABLED", "true")]).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("X402_RECIPIENT")));

        let err = from_map(&[
            ("PAID_ENABLED", "true"),
            ("X402_RECIPIENT", "0xabc"),
            ("X402_FACILITATOR", "not a url"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "X402_FACILITATOR", .. }));
    }

    #[test]
    fn test_production_rejects_test_identities() {
        let err = from_map(&[
            ("APP_ENV", "production"),
            ("SUPABASE_URL", "https://x.supabase.co"),
            ("TEST_IDENTITY_TOKENS", "tok:alice"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::Insecure(_)));
    }

    #[test]
    fn test_production_requires_identity_provider() {
        let err = from_map(&[("APP_ENV", "production")]).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("SUPABASE_URL")));
    }

    #[test]
    fn test_token_pairs_and_admins() {
        let config = from_map(&[
            ("TEST_IDENTITY_TOKENS", "tok-a:alice, tok-b:bob"),
            ("ADMIN_UIDS", "alice"),
        ])
        .unwrap();
        assert_eq!(
            config.test_identity_tokens,
            vec![
                ("tok-a".to_string(), "alice".to_string()),
                ("tok-b".to_string(), "bob".to_string())
            ]
        );
        assert!(config.is_admin("alice"));
        assert!(!config.is_admin("bob"));

        assert!(from_map(&[("TEST_IDENTITY_TOKENS", "no-colon")]).is_err());
    }

    #[test]
    #[serial]
    fn test_from_env_reads_process_environment() {
        std::env::set_var("GENERATION_TIMEOUT_SECS", "3");
        std::env::set_var("REQUIRE_PLAN", "TRUE");
        let config = Config::from_env();
        std::env::remove_var("GENERATION_TIMEOUT_SECS");
        std::env::remove_var("REQUIRE_PLAN");

        let config = config.unwrap();
        assert_eq!(config.generation_timeout, Duration::from_secs(3));
        assert!(config.require_plan);
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_bad_timeout() {
        std::env::set_var("GENERATION_TIMEOUT_SECS", "soon");
        let result = Config::from_env();
        std::env::remove_var("GENERATION_TIMEOUT_SECS");

        assert!(matches!(
            result.unwrap_err(),
            ConfigError::Invalid { var: "GENERATION_TIMEOUT_SECS", .. }
        ));
    }
}
