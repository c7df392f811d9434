use std::{env, str::FromStr};
use tracing::warn;

/// Parses an environment variable, ignoring unset or malformed values.
pub fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse::<T>().ok())
}

/// Reads a non-empty, trimmed environment variable.
pub fn env_string(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn parse_env_bool(key: &str) -> bool {
    env::var(key)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

/// API credentials for the three external platforms.
///
/// Missing values are not fatal at startup; each client reports a
/// configuration error on first use instead.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub shopify_api_key: Option<String>,
    pub shopify_api_secret: Option<String>,
    pub twelvelabs_api_key: Option<String>,
    pub backboard_api_key: Option<String>,
}

impl Credentials {
    pub fn from_env() -> Self {
        Self {
            shopify_api_key: env_string("SHOPIFY_API_KEY"),
            shopify_api_secret: env_string("SHOPIFY_API_SECRET"),
            twelvelabs_api_key: env_string("TWELVELABS_API_KEY"),
            backboard_api_key: env_string("BACKBOARD_API_KEY"),
        }
    }

    pub fn missing(&self) -> Vec<&'static str> {
        [
            ("SHOPIFY_API_KEY", &self.shopify_api_key),
            ("SHOPIFY_API_SECRET", &self.shopify_api_secret),
            ("TWELVELABS_API_KEY", &self.twelvelabs_api_key),
            ("BACKBOARD_API_KEY", &self.backboard_api_key),
        ]
        .into_iter()
        .filter(|(_, value)| value.is_none())
        .map(|(name, _)| name)
        .collect()
    }

    pub fn log_missing(&self) {
        for name in self.missing() {
            warn!(
                target = "brandcast.config",
                credential = name,
                "credential_missing"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_lists_every_unset_credential() {
        let creds = Credentials {
            twelvelabs_api_key: Some("tl".into()),
            ..Credentials::default()
        };
        assert_eq!(
            creds.missing(),
            vec!["SHOPIFY_API_KEY", "SHOPIFY_API_SECRET", "BACKBOARD_API_KEY"]
        );
    }

    #[test]
    fn env_parse_ignores_garbage() {
        assert_eq!(env_parse::<u64>("BRANDCAST_TEST_UNSET_VARIABLE"), None);
    }
}
