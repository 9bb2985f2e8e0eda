//! Typed views of the annotation ledger.
//!
//! Role annotations hold comma-joined channel names and the extra-env
//! annotation holds a JSON object. Both are parsed into these types on read
//! and serialized back only when written.

use std::collections::BTreeMap;
use std::fmt;

/// Ordered, duplicate-free set of channel names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelSet(Vec<String>);

impl ChannelSet {
    /// Parse an annotation value. Blank entries are dropped.
    pub fn parse(raw: &str) -> Self {
        let mut set = Self::default();
        for name in raw.split(',') {
            set.insert(name.trim());
        }
        set
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|n| n == name)
    }

    /// Append a name. Returns false if it was already present or blank.
    pub fn insert(&mut self, name: &str) -> bool {
        if name.is_empty() || self.contains(name) {
            return false;
        }
        self.0.push(name.to_string());
        true
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl fmt::Display for ChannelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(","))
    }
}

/// Normalize a setting key: upper case, dashes become underscores.
pub fn env_name(raw: &str) -> String {
    raw.to_uppercase().replace('-', "_")
}

/// Worker settings accumulated during materialization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtraSettings(BTreeMap<String, String>);

impl ExtraSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a setting under its normalized key. Empty keys or values are ignored.
    pub fn insert(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        if key.is_empty() || value.is_empty() {
            return;
        }
        self.0.insert(env_name(key), value);
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(&env_name(key)).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.0)
    }

    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        Ok(Self(serde_json::from_str(raw)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_set_parse_and_append() {
        let mut set = ChannelSet::parse("a, b,,a");
        assert_eq!(set.to_string(), "a,b");
        assert!(set.insert("c"));
        assert!(!set.insert("b"));
        assert!(!set.insert(""));
        assert_eq!(set.to_string(), "a,b,c");
        assert!(set.contains("c"));
        assert!(!set.contains("d"));
    }

    #[test]
    fn test_channel_set_empty() {
        assert!(ChannelSet::parse("").is_empty());
        assert_eq!(ChannelSet::default().to_string(), "");
    }

    #[test]
    fn test_env_name() {
        assert_eq!(env_name("udf_sync-tables"), "UDF_SYNC_TABLES");
    }

    #[test]
    fn test_extra_settings_normalizes_and_skips_empty() {
        let mut settings = ExtraSettings::new();
        settings.insert("log-level", "info");
        settings.insert("empty", "");
        settings.insert("", "value");
        assert_eq!(settings.len(), 1);
        assert_eq!(settings.get("LOG_LEVEL"), Some("info"));
        assert_eq!(settings.to_json().unwrap(), r#"{"LOG_LEVEL":"info"}"#);
    }

    #[test]
    fn test_extra_settings_later_write_wins() {
        let mut settings = ExtraSettings::new();
        settings.insert("SOURCE_PORT", "3306");
        settings.insert("source-port", "3307");
        assert_eq!(settings.get("SOURCE_PORT"), Some("3307"));
        let parsed = ExtraSettings::from_json(&settings.to_json().unwrap()).unwrap();
        assert_eq!(parsed, settings);
    }
}
