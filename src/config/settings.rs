use std::{
    path::PathBuf,
    time::Duration,
};

use indexmap::IndexMap;
use tracing::warn;

use crate::{
    agent::DEFAULT_MODEL,
    anki::{
        migrate::{
            default_field_mapping,
            DEFAULT_NEW_NOTE_TYPE,
            DEFAULT_OLD_NOTE_TYPE,
        },
        DEFAULT_ANKI_CONNECT_URL,
    },
    core::ConfigError,
};

pub const DEFAULT_CONFIG_TTL: Duration = Duration::from_secs(300);
pub const DEFAULT_AGENT_TIMEOUT: Duration = Duration::from_secs(180);
pub const DEFAULT_ANKI_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_AGENT_CLI: &str = "claude";

const CONFIG_FILE_NAME: &str = "anki_config.json";

#[derive(Debug, Clone, PartialEq)]
pub struct MigrationSettings {
    pub old_note_type: String,
    pub new_note_type: String,
    /// Old field name to new field name, in display order.
    pub field_mapping: IndexMap<String, String>,
}

impl Default for MigrationSettings {
    fn default() -> Self {
        Self {
            old_note_type: DEFAULT_OLD_NOTE_TYPE.to_string(),
            new_note_type: DEFAULT_NEW_NOTE_TYPE.to_string(),
            field_mapping: default_field_mapping(),
        }
    }
}

/// Process settings, read once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub config_path: PathBuf,
    pub config_ttl: Duration,
    pub model: String,
    pub agent_cli: PathBuf,
    /// `None` when `AGENT_TIMEOUT=0`.
    pub agent_timeout: Option<Duration>,
    pub anki_url: String,
    pub anki_timeout: Duration,
    pub migration: MigrationSettings,
    pub debug: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            config_path: default_config_path(),
            config_ttl: DEFAULT_CONFIG_TTL,
            model: DEFAULT_MODEL.to_string(),
            agent_cli: PathBuf::from(DEFAULT_AGENT_CLI),
            agent_timeout: Some(DEFAULT_AGENT_TIMEOUT),
            anki_url: DEFAULT_ANKI_CONNECT_URL.to_string(),
            anki_timeout: DEFAULT_ANKI_TIMEOUT,
            migration: MigrationSettings::default(),
            debug: false,
        }
    }
}

pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join("kotoba-cards").join(CONFIG_FILE_NAME))
        .unwrap_or_else(|| PathBuf::from("config").join(CONFIG_FILE_NAME))
}

fn is_truthy(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes")
}

fn invalid(name: &'static str, value: &str) -> ConfigError {
    ConfigError::InvalidSetting { name, value: value.to_string() }
}

fn parse_secs(name: &'static str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse().map_err(|_| invalid(name, value))
}

fn parse_float_secs(name: &'static str, value: &str) -> Result<Duration, ConfigError> {
    let secs: f64 = value.trim().parse().map_err(|_| invalid(name, value))?;
    if secs <= 0.0 {
        return Err(invalid(name, value));
    }
    Duration::try_from_secs_f64(secs).map_err(|_| invalid(name, value))
}

fn parse_field_mapping(value: &str) -> IndexMap<String, String> {
    match serde_json::from_str::<IndexMap<String, String>>(value) {
        Ok(mapping) => mapping,
        Err(e) => {
            warn!(error = %e, "MIGRATE_FIELD_MAPPING is not a JSON object of strings, using the default mapping");
            default_field_mapping()
        }
    }
}

impl Settings {
    /// Reads `.env` (if any) and the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut settings = Settings::default();

        if let Some(path) = lookup("CONFIG_PATH").filter(|p| !p.trim().is_empty()) {
            settings.config_path = PathBuf::from(path);
        }
        if let Some(ttl) = lookup("CONFIG_TTL") {
            settings.config_ttl = Duration::from_secs(parse_secs("CONFIG_TTL", &ttl)?);
        }
        if let Some(model) = lookup("CLAUDE_MODEL") {
            settings.model = model;
        }
        if let Some(cli) = lookup("CLAUDE_CLI_PATH").filter(|p| !p.trim().is_empty()) {
            settings.agent_cli = PathBuf::from(cli);
        }
        if let Some(timeout) = lookup("AGENT_TIMEOUT") {
            settings.agent_timeout = match parse_secs("AGENT_TIMEOUT", &timeout)? {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            };
        }
        if let Some(url) = lookup("ANKI_CONNECT_URL").filter(|u| !u.trim().is_empty()) {
            settings.anki_url = url.trim().to_string();
        }
        if let Some(timeout) = lookup("ANKI_CONNECT_TIMEOUT") {
            settings.anki_timeout = parse_float_secs("ANKI_CONNECT_TIMEOUT", &timeout)?;
        }
        if let Some(old) = lookup("MIGRATE_OLD_NOTE_TYPE") {
            settings.migration.old_note_type = old;
        }
        if let Some(new) = lookup("MIGRATE_NEW_NOTE_TYPE") {
            settings.migration.new_note_type = new;
        }
        if let Some(mapping) = lookup("MIGRATE_FIELD_MAPPING") {
            settings.migration.field_mapping = parse_field_mapping(&mapping);
        }
        settings.debug = lookup("DEBUG").is_some_and(|v| is_truthy(&v));

        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn settings_with(vars: &[(&str, &str)]) -> Result<Settings, ConfigError> {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Settings::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_without_environment() {
        let settings = settings_with(&[]).unwrap();
        assert_eq!(settings.config_ttl, Duration::from_secs(300));
        assert_eq!(settings.model, DEFAULT_MODEL);
        assert_eq!(settings.anki_url, "http://localhost:8765");
        assert_eq!(settings.anki_timeout, Duration::from_secs(30));
        assert_eq!(settings.agent_timeout, Some(Duration::from_secs(180)));
        assert_eq!(settings.migration.field_mapping.len(), 11);
        assert!(settings.config_path.ends_with(CONFIG_FILE_NAME));
        assert!(!settings.debug);
    }

    #[test]
    fn overrides_are_applied() {
        let settings = settings_with(&[
            ("CONFIG_PATH", "/tmp/cards.json"),
            ("CONFIG_TTL", "0"),
            ("CLAUDE_MODEL", ""),
            ("AGENT_TIMEOUT", "0"),
            ("ANKI_CONNECT_TIMEOUT", "2.5"),
            ("MIGRATE_OLD_NOTE_TYPE", "  Old Type  "),
            ("MIGRATE_FIELD_MAPPING", r#"{"Front": "Hiragana/Katakana"}"#),
            ("DEBUG", "Yes"),
        ])
        .unwrap();

        assert_eq!(settings.config_path, PathBuf::from("/tmp/cards.json"));
        assert_eq!(settings.config_ttl, Duration::ZERO);
        assert_eq!(settings.model, "");
        assert_eq!(settings.agent_timeout, None);
        assert_eq!(settings.anki_timeout, Duration::from_millis(2500));
        assert_eq!(settings.migration.old_note_type, "  Old Type  ");
        assert_eq!(settings.migration.field_mapping.get("Front").unwrap(), "Hiragana/Katakana");
        assert!(settings.debug);
    }

    #[test]
    fn unparseable_numbers_are_rejected() {
        for (name, value) in [
            ("CONFIG_TTL", "five"),
            ("CONFIG_TTL", "-1"),
            ("ANKI_CONNECT_TIMEOUT", "soon"),
            ("ANKI_CONNECT_TIMEOUT", "-3"),
            ("AGENT_TIMEOUT", "1.5"),
        ] {
            let err = settings_with(&[(name, value)]).unwrap_err();
            assert!(
                matches!(&err, ConfigError::InvalidSetting { name: n, .. } if *n == name),
                "{name}={value} gave {err:?}"
            );
        }
    }

    #[test]
    fn bad_field_mapping_falls_back_to_default() {
        for value in ["not json", "[1, 2]", r#"{"Kana": 3}"#] {
            let settings = settings_with(&[("MIGRATE_FIELD_MAPPING", value)]).unwrap();
            assert_eq!(settings.migration.field_mapping, default_field_mapping());
        }
    }

    #[test]
    fn debug_only_for_truthy_values() {
        for (value, expected) in [("1", true), ("TRUE", true), ("0", false), ("no", false)] {
            assert_eq!(settings_with(&[("DEBUG", value)]).unwrap().debug, expected, "{value}");
        }
    }
}
