//! `main.cf`-style configuration: flat `key = value` pairs, parsed once at
//! startup into typed fields. Unlike a fail-fast parser, bad values are
//! accumulated as warnings so that one bad line does not prevent startup
//! with every other parameter still usable (mirrors Postfix's own
//! tolerance of unknown/bad parameters outside of `-n`/syntax-check mode).

use ahash::AHashMap;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct ConfigWarning {
    pub key: String,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct Config {
    values: AHashMap<String, String>,
    pub warnings: Vec<ConfigWarning>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses `key = value` lines, skipping blank lines and `#` comments.
    pub fn parse_str(text: &str) -> Self {
        let mut config = Config::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match line.split_once('=') {
                Some((key, value)) => {
                    config
                        .values
                        .insert(key.trim().to_string(), value.trim().to_string());
                }
                None => config.warnings.push(ConfigWarning {
                    key: line.to_string(),
                    message: "missing '=' separator".to_string(),
                }),
            }
        }
        config
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn value(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(|s| s.as_str())
    }

    /// Typed lookup. Records a warning and returns `None` on parse failure,
    /// rather than failing the whole load.
    pub fn property<T>(&mut self, key: &str) -> Option<T>
    where
        T: FromStr,
    {
        let raw = self.values.get(key)?;
        match raw.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                self.warnings.push(ConfigWarning {
                    key: key.to_string(),
                    message: format!("could not parse value {raw:?}"),
                });
                None
            }
        }
    }

    pub fn new_build_error(&mut self, key: &str, err: impl std::fmt::Display) {
        self.warnings.push(ConfigWarning {
            key: key.to_string(),
            message: err.to_string(),
        });
    }
}
