//! Process configuration read from the environment (and `.env`).

use std::{net::SocketAddr, time::Duration};

use thiserror::Error;

use crate::{news::NewsConfig, trending::TrendingOptions};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{key} has an invalid value {value:?}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendConfig {
    Supabase {
        url: String,
        anon_key: String,
        media_bucket: String,
    },
    Local {
        database_url: String,
        media_dir: String,
    },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub backend: BackendConfig,
    pub bind: SocketAddr,
    /// Base URL the service is reachable at, used for local media links.
    pub public_url: String,
    pub news: NewsConfig,
    pub trending: TrendingOptions,
}

impl Config {
    /// Loads `.env` if present, then reads the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Err(err) = dotenv::dotenv() {
            tracing::debug!("no .env loaded: {err}");
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &'static str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &'static str| var(key).ok_or(ConfigError::Missing(key));
        let or = |key: &'static str, default: &str| var(key).unwrap_or_else(|| default.to_owned());

        let backend = match or("ECHOES_BACKEND", "supabase").as_str() {
            "supabase" => BackendConfig::Supabase {
                url: required("SUPABASE_URL")?,
                anon_key: required("SUPABASE_ANON_KEY")?,
                media_bucket: or("SUPABASE_MEDIA_BUCKET", "media"),
            },
            "local" => BackendConfig::Local {
                database_url: or("DATABASE_URL", "sqlite://echoes.db"),
                media_dir: or("ECHOES_MEDIA_DIR", "media"),
            },
            other => {
                return Err(ConfigError::Invalid {
                    key: "ECHOES_BACKEND",
                    value: other.to_owned(),
                });
            }
        };

        let bind: SocketAddr = parse(&lookup, "ECHOES_BIND", "127.0.0.1:3000")?;
        let public_url = or("ECHOES_PUBLIC_URL", &format!("http://{bind}"));

        // without a key the provider refuses every fetch and the panel stays empty
        let news_key = var("GNEWS_API_KEY").unwrap_or_default();
        if news_key.is_empty() {
            tracing::warn!("GNEWS_API_KEY is not set, news will be empty");
        }
        let mut news = NewsConfig::new(news_key);
        if let Some(base_url) = var("GNEWS_BASE_URL") {
            news.base_url = base_url;
        }
        if let Some(lang) = var("NEWS_LANG") {
            news.lang = lang;
        }

        let defaults = TrendingOptions::default();
        let trending = TrendingOptions {
            interval: Duration::from_secs(parse(
                &lookup,
                "TRENDING_INTERVAL_SECS",
                &defaults.interval.as_secs().to_string(),
            )?),
            hashtag_limit: parse(&lookup, "TRENDING_LIMIT", &defaults.hashtag_limit.to_string())?,
            news_max: parse(&lookup, "NEWS_MAX", &defaults.news_max.to_string())?,
        };
        if trending.interval.is_zero() {
            return Err(ConfigError::Invalid { key: "TRENDING_INTERVAL_SECS", value: "0".into() });
        }

        Ok(Self { backend, bind, public_url, news, trending })
    }
}

fn parse<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: &str,
) -> Result<T, ConfigError> {
    let value = lookup(key)
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_owned());
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid { key, value })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn supabase_is_the_default_backend() {
        let config = config(&[
            ("SUPABASE_URL", "https://abc.supabase.co"),
            ("SUPABASE_ANON_KEY", "anon"),
            ("GNEWS_API_KEY", "key"),
        ])
        .unwrap();

        assert_eq!(
            config.backend,
            BackendConfig::Supabase {
                url: "https://abc.supabase.co".into(),
                anon_key: "anon".into(),
                media_bucket: "media".into(),
            }
        );
        assert_eq!(config.bind.to_string(), "127.0.0.1:3000");
        assert_eq!(config.public_url, "http://127.0.0.1:3000");
        assert_eq!(config.news.lang, "en");
        assert_eq!(config.trending.interval, Duration::from_secs(300));
        assert_eq!(config.trending.hashtag_limit, 5);
    }

    #[test]
    fn local_backend_needs_no_supabase() {
        let config = config(&[
            ("ECHOES_BACKEND", "local"),
            ("GNEWS_API_KEY", "key"),
            ("NEWS_MAX", "3"),
            ("TRENDING_INTERVAL_SECS", "60"),
        ])
        .unwrap();

        assert!(matches!(config.backend, BackendConfig::Local { .. }));
        assert_eq!(config.trending.news_max, 3);
        assert_eq!(config.trending.interval, Duration::from_secs(60));
    }

    #[test]
    fn news_key_is_optional() {
        let config = config(&[("ECHOES_BACKEND", "local")]).unwrap();
        assert_eq!(config.news.api_key, "");
    }

    #[test]
    fn reports_missing_and_invalid_values() {
        assert_eq!(
            config(&[("GNEWS_API_KEY", "key")]).unwrap_err(),
            ConfigError::Missing("SUPABASE_URL")
        );
        assert_eq!(
            config(&[("ECHOES_BACKEND", "local"), ("GNEWS_API_KEY", "k"), ("NEWS_MAX", "lots")])
                .unwrap_err(),
            ConfigError::Invalid { key: "NEWS_MAX", value: "lots".into() }
        );
        assert!(matches!(
            config(&[("ECHOES_BACKEND", "firebase")]),
            Err(ConfigError::Invalid { key: "ECHOES_BACKEND", .. })
        ));
    }
}
