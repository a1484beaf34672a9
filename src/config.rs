//! Configuration types.

use std::path::PathBuf;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Default HTTP port for the webhook and liveness routes.
pub const DEFAULT_PORT: u16 = 8080;

/// Currency used by `/invoice` when no code is given.
pub const DEFAULT_CURRENCY: &str = "RUB";

const DEFAULT_PAYMENT_DETAILS: &str =
    "Payment details will be sent to you by your manager in a separate message.";

/// Bot configuration, read once at process start.
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Telegram Bot API token.
    pub bot_token: SecretString,
    /// Staff chat that receives summaries and counts as privileged.
    pub admin_group_id: Option<i64>,
    /// Staff username treated as privileged (leading `@` optional).
    pub admin_username: Option<String>,
    /// Public base URL; webhook mode when set, long polling otherwise.
    pub public_url: Option<String>,
    pub port: u16,
    pub db_path: PathBuf,
    /// Public offer PDF sent on "📄 Offer".
    pub offer_path: PathBuf,
    pub default_currency: String,
    /// Free text appended to every invoice.
    pub payment_details: String,
}

impl BotConfig {
    /// Build the config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let bot_token = std::env::var("BOT_TOKEN")
            .ok()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar("BOT_TOKEN".into()))?;

        let admin_group_id = std::env::var("ADMIN_GROUP_ID")
            .ok()
            .and_then(|raw| parse_admin_group_id(&raw));

        let port: u16 = std::env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_PORT);

        Ok(Self {
            bot_token: SecretString::from(bot_token),
            admin_group_id,
            admin_username: non_empty(std::env::var("ADMIN_USERNAME").ok()),
            public_url: non_empty(std::env::var("PUBLIC_URL").ok())
                .map(|u| u.trim_end_matches('/').to_string()),
            port,
            db_path: std::env::var("TRIPBUDDY_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./data/tripbuddy.db")),
            offer_path: std::env::var("TRIPBUDDY_OFFER_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("public_offer_tripbuddy.pdf")),
            default_currency: non_empty(std::env::var("TRIPBUDDY_DEFAULT_CURRENCY").ok())
                .map(|c| c.to_uppercase())
                .unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
            payment_details: non_empty(std::env::var("TRIPBUDDY_PAYMENT_DETAILS").ok())
                .unwrap_or_else(|| DEFAULT_PAYMENT_DETAILS.to_string()),
        })
    }

    /// Config for tests and local tooling: no staff chat, no admin username.
    pub fn for_token(token: &str) -> Self {
        Self {
            bot_token: SecretString::from(token.to_string()),
            admin_group_id: None,
            admin_username: None,
            public_url: None,
            port: DEFAULT_PORT,
            db_path: PathBuf::from("./data/tripbuddy.db"),
            offer_path: PathBuf::from("public_offer_tripbuddy.pdf"),
            default_currency: DEFAULT_CURRENCY.to_string(),
            payment_details: DEFAULT_PAYMENT_DETAILS.to_string(),
        }
    }
}

/// Parse `ADMIN_GROUP_ID`; garbage is logged and treated as unset.
fn parse_admin_group_id(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    match raw.parse::<i64>() {
        Ok(id) => Some(id),
        Err(e) => {
            tracing::warn!(value = raw, "Ignoring unparsable ADMIN_GROUP_ID: {e}");
            None
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
