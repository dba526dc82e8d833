use std::str::FromStr;

use crate::engine::{IntervalPolicy, RegistryConfig, SuggestMode, SuggestOptions, DEFAULT_MAX_ATTEMPTS};
use crate::limits::*;

const PREFIX: &str = "CALCLASH_";

/// Server settings read from `CALCLASH_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub port: u16,
    pub bind: String,
    pub password: String,
    pub max_connections: usize,
    pub metrics_port: Option<u16>,
    pub tls_cert: Option<String>,
    pub tls_key: Option<String>,
    pub registry: RegistryConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 5433,
            bind: "0.0.0.0".into(),
            password: "calclash".into(),
            max_connections: 256,
            metrics_port: None,
            tls_cert: None,
            tls_key: None,
            registry: RegistryConfig::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any key lookup. Keys are the suffix after `CALCLASH_`.
    /// Values that fail to parse keep the default and log a warning.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |name: &str| lookup(&format!("{PREFIX}{name}")).filter(|v| !v.trim().is_empty());
        let defaults = Config::default();

        let suggest_defaults = SuggestOptions::default();
        let max_attempts = parsed(&get, "SUGGEST_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS).clamp(1, MAX_SUGGEST_ATTEMPTS);
        let mode = match get("SUGGEST_MODE").map(|v| v.to_ascii_lowercase()) {
            None => SuggestMode::Validated { max_attempts },
            Some(v) if v == "validated" => SuggestMode::Validated { max_attempts },
            Some(v) if v == "fixed" => SuggestMode::Fixed,
            Some(v) => {
                tracing::warn!("{PREFIX}SUGGEST_MODE: unknown mode {v:?}, using validated");
                SuggestMode::Validated { max_attempts }
            }
        };

        let buffer_minutes: i64 = parsed(&get, "BUFFER_MINUTES", defaults.registry.buffer_minutes);
        let clamped = buffer_minutes.clamp(0, MAX_BUFFER_MINUTES);
        if clamped != buffer_minutes {
            tracing::warn!("{PREFIX}BUFFER_MINUTES={buffer_minutes} out of range, using {clamped}");
        }

        Self {
            port: parsed(&get, "PORT", defaults.port),
            bind: get("BIND").unwrap_or(defaults.bind),
            password: get("PASSWORD").unwrap_or(defaults.password),
            max_connections: parsed(&get, "MAX_CONNECTIONS", defaults.max_connections).max(1),
            metrics_port: get("METRICS_PORT").and_then(|v| parse_or_warn("METRICS_PORT", &v)),
            tls_cert: get("TLS_CERT"),
            tls_key: get("TLS_KEY"),
            registry: RegistryConfig {
                buffer_minutes: clamped,
                interval_policy: parsed(&get, "INTERVAL_POLICY", IntervalPolicy::default()),
                suggest: SuggestOptions {
                    count: parsed(&get, "SUGGEST_COUNT", suggest_defaults.count).clamp(1, MAX_SUGGESTIONS),
                    step_minutes: parsed(&get, "SUGGEST_STEP_MINUTES", suggest_defaults.step_minutes)
                        .clamp(1, MAX_STEP_MINUTES),
                    mode,
                },
            },
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

fn parsed<T, G>(get: &G, name: &str, default: T) -> T
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    get(name).and_then(|v| parse_or_warn(name, &v)).unwrap_or(default)
}

fn parse_or_warn<T>(name: &str, value: &str) -> Option<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match value.trim().parse() {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::warn!("{PREFIX}{name}={value:?} ignored: {e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|k| vars.get(k).cloned())
    }

    #[test]
    fn empty_environment_gives_defaults() {
        let c = config(&[]);
        assert_eq!(c, Config::default());
        assert_eq!(c.addr(), "0.0.0.0:5433");
        assert_eq!(c.registry.suggest.mode, SuggestMode::Validated { max_attempts: 48 });
    }

    #[test]
    fn reads_server_settings() {
        let c = config(&[
            ("CALCLASH_PORT", "6000"),
            ("CALCLASH_BIND", "127.0.0.1"),
            ("CALCLASH_PASSWORD", "s3cret"),
            ("CALCLASH_MAX_CONNECTIONS", "8"),
            ("CALCLASH_METRICS_PORT", "9100"),
            ("CALCLASH_TLS_CERT", "/etc/cert.pem"),
            ("CALCLASH_TLS_KEY", "/etc/key.pem"),
        ]);
        assert_eq!(c.addr(), "127.0.0.1:6000");
        assert_eq!(c.password, "s3cret");
        assert_eq!(c.max_connections, 8);
        assert_eq!(c.metrics_port, Some(9100));
        assert_eq!(c.tls_cert.as_deref(), Some("/etc/cert.pem"));
        assert_eq!(c.tls_key.as_deref(), Some("/etc/key.pem"));
    }

    #[test]
    fn reads_registry_settings() {
        let c = config(&[
            ("CALCLASH_BUFFER_MINUTES", "15"),
            ("CALCLASH_INTERVAL_POLICY", "Permissive"),
            ("CALCLASH_SUGGEST_MODE", "fixed"),
            ("CALCLASH_SUGGEST_COUNT", "5"),
            ("CALCLASH_SUGGEST_STEP_MINUTES", "15"),
        ]);
        assert_eq!(c.registry.buffer_minutes, 15);
        assert_eq!(c.registry.interval_policy, IntervalPolicy::Permissive);
        assert_eq!(c.registry.suggest.mode, SuggestMode::Fixed);
        assert_eq!(c.registry.suggest.count, 5);
        assert_eq!(c.registry.suggest.step_minutes, 15);
    }

    #[test]
    fn max_attempts_applies_to_validated_mode() {
        let c = config(&[("CALCLASH_SUGGEST_MAX_ATTEMPTS", "10")]);
        assert_eq!(c.registry.suggest.mode, SuggestMode::Validated { max_attempts: 10 });
    }

    #[test]
    fn unparseable_values_fall_back_to_defaults() {
        let c = config(&[
            ("CALCLASH_PORT", "not-a-port"),
            ("CALCLASH_MAX_CONNECTIONS", "-3"),
            ("CALCLASH_METRICS_PORT", "99999"),
            ("CALCLASH_INTERVAL_POLICY", "lenient"),
            ("CALCLASH_SUGGEST_MODE", "random"),
        ]);
        assert_eq!(c.port, 5433);
        assert_eq!(c.max_connections, 256);
        assert_eq!(c.metrics_port, None);
        assert_eq!(c.registry.interval_policy, IntervalPolicy::Strict);
        assert_eq!(c.registry.suggest.mode, SuggestMode::Validated { max_attempts: 48 });
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let c = config(&[
            ("CALCLASH_BUFFER_MINUTES", "-5"),
            ("CALCLASH_SUGGEST_COUNT", "0"),
            ("CALCLASH_SUGGEST_STEP_MINUTES", "999999"),
            ("CALCLASH_MAX_CONNECTIONS", "0"),
        ]);
        assert_eq!(c.registry.buffer_minutes, 0);
        assert_eq!(c.registry.suggest.count, 1);
        assert_eq!(c.registry.suggest.step_minutes, MAX_STEP_MINUTES);
        assert_eq!(c.max_connections, 1);

        let c = config(&[("CALCLASH_BUFFER_MINUTES", "100000")]);
        assert_eq!(c.registry.buffer_minutes, MAX_BUFFER_MINUTES);
    }

    #[test]
    fn blank_values_are_unset() {
        let c = config(&[("CALCLASH_PASSWORD", "  "), ("CALCLASH_TLS_CERT", "")]);
        assert_eq!(c.password, "calclash");
        assert_eq!(c.tls_cert, None);
    }
}
