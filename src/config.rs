use derive_getters::Getters;
use thiserror::Error;

/// Codec policy shared by encoders, decoders and streams of one session.
#[derive(Debug, Clone, PartialEq, Eq, Getters)]
pub struct CodecConfig {
    /// Largest VarChar payload (in bytes) accepted on encode and decode.
    max_varchar_len: u32,
    /// Largest record frame accepted on write and read.
    max_record_len: u32,
    /// Stream header carries one type tag per column after the column count.
    typed_header: bool,
}

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("ConfigError - invalid value '{1}' for {0}")]
    InvalidValue(String, String),
}

impl CodecConfig {
    pub const DEFAULT_MAX_VARCHAR_LEN: u32 = 1 << 30; // 1 GiB
    pub const DEFAULT_MAX_RECORD_LEN: u32 = 1 << 31; // 2 GiB

    pub const ENV_MAX_VARCHAR_LEN: &'static str = "PG_STREAM_COPY_MAX_VARCHAR_LEN";
    pub const ENV_MAX_RECORD_LEN: &'static str = "PG_STREAM_COPY_MAX_RECORD_LEN";
    pub const ENV_TYPED_HEADER: &'static str = "PG_STREAM_COPY_TYPED_HEADER";

    pub fn new() -> Self {
        Self {
            max_varchar_len: Self::DEFAULT_MAX_VARCHAR_LEN,
            max_record_len: Self::DEFAULT_MAX_RECORD_LEN,
            typed_header: false,
        }
    }

    pub fn with_max_varchar_len(mut self, max_varchar_len: u32) -> Self {
        self.max_varchar_len = max_varchar_len;
        self
    }

    // u32::MAX is reserved for the stream trailer
    pub fn with_max_record_len(mut self, max_record_len: u32) -> Self {
        self.max_record_len = max_record_len.min(u32::MAX - 1);
        self
    }

    pub fn with_typed_header(mut self, typed_header: bool) -> Self {
        self.typed_header = typed_header;
        self
    }

    /// Defaults overridden by the `PG_STREAM_COPY_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::new();

        if let Some(raw) = lookup(Self::ENV_MAX_VARCHAR_LEN) {
            config = config.with_max_varchar_len(parse_len(Self::ENV_MAX_VARCHAR_LEN, &raw)?);
        }
        if let Some(raw) = lookup(Self::ENV_MAX_RECORD_LEN) {
            config = config.with_max_record_len(parse_len(Self::ENV_MAX_RECORD_LEN, &raw)?);
        }
        if let Some(raw) = lookup(Self::ENV_TYPED_HEADER) {
            let typed = match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => return Err(ConfigError::InvalidValue(Self::ENV_TYPED_HEADER.to_string(), raw)),
            };
            config = config.with_typed_header(typed);
        }

        Ok(config)
    }
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_len(key: &str, raw: &str) -> Result<u32, ConfigError> {
    raw.trim()
        .parse::<u32>()
        .map_err(|_| ConfigError::InvalidValue(key.to_string(), raw.to_string()))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn should_use_defaults_when_nothing_is_set() {
        let config = CodecConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config, CodecConfig::default());
        assert_eq!(*config.max_varchar_len(), 1 << 30);
        assert!(!*config.typed_header());
    }

    #[test]
    fn should_override_from_lookup() {
        let config = CodecConfig::from_lookup(lookup_from(&[
            ("PG_STREAM_COPY_MAX_VARCHAR_LEN", "128"),
            ("PG_STREAM_COPY_MAX_RECORD_LEN", " 4096 "),
            ("PG_STREAM_COPY_TYPED_HEADER", "yes"),
        ]))
        .unwrap();

        assert_eq!(*config.max_varchar_len(), 128);
        assert_eq!(*config.max_record_len(), 4096);
        assert!(*config.typed_header());
    }

    #[test]
    fn should_reject_unparsable_values() {
        let result = CodecConfig::from_lookup(lookup_from(&[("PG_STREAM_COPY_MAX_VARCHAR_LEN", "lots")]));
        assert_eq!(
            result.unwrap_err(),
            ConfigError::InvalidValue("PG_STREAM_COPY_MAX_VARCHAR_LEN".to_string(), "lots".to_string())
        );

        let result = CodecConfig::from_lookup(lookup_from(&[("PG_STREAM_COPY_TYPED_HEADER", "maybe")]));
        assert!(matches!(result, Err(ConfigError::InvalidValue(key, _)) if key == "PG_STREAM_COPY_TYPED_HEADER"));
    }

    #[test]
    fn should_never_allow_the_trailer_as_record_length() {
        let config = CodecConfig::new().with_max_record_len(u32::MAX);
        assert_eq!(*config.max_record_len(), u32::MAX - 1);
    }
}
