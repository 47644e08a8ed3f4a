//! Global settings loaded from TOML.
//!
//! - `init_custom(toml_content)` sets a custom TOML before first `settings()` call
//! - `settings()` returns `&'static Settings` (lazy-init singleton)
//! - Default values are embedded via `include_str!("default_settings.toml")`
//!
//! The chart never reads the global directly: it receives a `&SearchSettings`,
//! so callers can decode with different knobs side by side.

use std::sync::OnceLock;

use serde::Deserialize;

pub const DEFAULT_SETTINGS_TOML: &str = include_str!("default_settings.toml");

static CUSTOM_TOML: OnceLock<String> = OnceLock::new();

/// Set custom TOML before first `settings()` call.
pub fn init_custom(toml_content: String) -> Result<(), SettingsError> {
    parse_settings_toml(&toml_content)?;
    CUSTOM_TOML
        .set(toml_content)
        .map_err(|_| SettingsError::AlreadyInitialized)
}

/// Get or initialize the global settings singleton.
pub fn settings() -> &'static Settings {
    static INSTANCE: OnceLock<Settings> = OnceLock::new();
    INSTANCE.get_or_init(|| {
        let toml_str = CUSTOM_TOML
            .get()
            .map(|s| s.as_str())
            .unwrap_or(DEFAULT_SETTINGS_TOML);
        parse_settings_toml(toml_str).expect("settings TOML must be valid")
    })
}

/// Returns the embedded default settings TOML content.
pub fn default_toml() -> &'static str {
    DEFAULT_SETTINGS_TOML
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("TOML parse error: {0}")]
    Parse(String),
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
    #[error("settings already initialized")]
    AlreadyInitialized,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub search: SearchSettings,
    pub lm: LmSettings,
    pub output: OutputSettings,
}

/// Knobs of the chart parser.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchSettings {
    /// Combinations popped from one rule's cube before giving up on it.
    /// Trades search completeness for latency.
    pub pop_limit: usize,
    /// Nodes kept per (span, label); the lowest-scoring node is evicted beyond this.
    pub beam_width: usize,
    pub goal_symbol: String,
    pub default_nonterminal: String,
    pub oov_rules: bool,
    pub mark_oovs: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LmSettings {
    pub unknown_logprob: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputSettings {
    pub strip_markers: bool,
    pub nbest: usize,
    pub unique_nbest: bool,
}

pub fn parse_settings_toml(toml_str: &str) -> Result<Settings, SettingsError> {
    let s: Settings = toml::from_str(toml_str).map_err(|e| SettingsError::Parse(e.to_string()))?;
    validate(&s)?;
    Ok(s)
}

fn validate(s: &Settings) -> Result<(), SettingsError> {
    macro_rules! check_positive_usize {
        ($section:ident . $field:ident) => {
            if s.$section.$field == 0 {
                return Err(SettingsError::InvalidValue {
                    field: concat!(stringify!($section), ".", stringify!($field)).to_string(),
                    reason: "must be positive".to_string(),
                });
            }
        };
    }
    macro_rules! check_symbol {
        ($section:ident . $field:ident) => {
            let v = &s.$section.$field;
            if v.is_empty() || v.chars().any(|c| c.is_whitespace() || c == '[' || c == ']') {
                return Err(SettingsError::InvalidValue {
                    field: concat!(stringify!($section), ".", stringify!($field)).to_string(),
                    reason: "must be a bare label without brackets or whitespace".to_string(),
                });
            }
        };
    }

    check_positive_usize!(search.pop_limit);
    check_positive_usize!(search.beam_width);
    check_symbol!(search.goal_symbol);
    check_symbol!(search.default_nonterminal);
    check_positive_usize!(output.nbest);

    if !(s.lm.unknown_logprob <= 0.0) {
        return Err(SettingsError::InvalidValue {
            field: "lm.unknown_logprob".to_string(),
            reason: "must be a log probability (<= 0)".to_string(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_default_toml() {
        let s = parse_settings_toml(DEFAULT_SETTINGS_TOML).unwrap();
        assert_eq!(s.search.pop_limit, 100);
        assert_eq!(s.search.beam_width, 20);
        assert_eq!(s.search.goal_symbol, "GOAL");
        assert_eq!(s.search.default_nonterminal, "X");
        assert!(!s.search.oov_rules);
        assert!(!s.search.mark_oovs);
        assert!((s.lm.unknown_logprob + 100.0).abs() < f32::EPSILON);
        assert!(s.output.strip_markers);
        assert_eq!(s.output.nbest, 1);
        assert!(s.output.unique_nbest);
    }

    #[test]
    fn parse_valid_custom_toml() {
        let toml = r#"
[search]
pop_limit = 10
beam_width = 5
goal_symbol = "S"
default_nonterminal = "X"
oov_rules = true
mark_oovs = true

[lm]
unknown_logprob = -7.0

[output]
strip_markers = false
nbest = 10
unique_nbest = false
"#;
        let s = parse_settings_toml(toml).unwrap();
        assert_eq!(s.search.pop_limit, 10);
        assert_eq!(s.search.goal_symbol, "S");
        assert!(s.search.oov_rules);
        assert_eq!(s.output.nbest, 10);
        assert!(!s.output.unique_nbest);
    }

    #[test]
    fn error_zero_pop_limit() {
        let toml = DEFAULT_SETTINGS_TOML.replace("pop_limit = 100", "pop_limit = 0");
        let err = parse_settings_toml(&toml).unwrap_err();
        assert!(matches!(err, SettingsError::InvalidValue { .. }));
        assert!(err.to_string().contains("search.pop_limit"));
    }

    #[test]
    fn error_zero_beam() {
        let toml = DEFAULT_SETTINGS_TOML.replace("beam_width = 20", "beam_width = 0");
        let err = parse_settings_toml(&toml).unwrap_err();
        assert!(err.to_string().contains("search.beam_width"));
    }

    #[test]
    fn error_bracketed_goal() {
        let toml = DEFAULT_SETTINGS_TOML.replace("goal_symbol = \"GOAL\"", "goal_symbol = \"[GOAL]\"");
        let err = parse_settings_toml(&toml).unwrap_err();
        assert!(err.to_string().contains("search.goal_symbol"));
    }

    #[test]
    fn error_positive_unknown_logprob() {
        let toml = DEFAULT_SETTINGS_TOML.replace("unknown_logprob = -100.0", "unknown_logprob = 0.5");
        let err = parse_settings_toml(&toml).unwrap_err();
        assert!(err.to_string().contains("lm.unknown_logprob"));
    }

    #[test]
    fn error_invalid_toml() {
        let err = parse_settings_toml("not valid toml {{{").unwrap_err();
        assert!(matches!(err, SettingsError::Parse(_)));
    }

    #[test]
    fn error_missing_section() {
        let toml = r#"
[search]
pop_limit = 100
beam_width = 20
goal_symbol = "GOAL"
default_nonterminal = "X"
oov_rules = false
mark_oovs = false
"#;
        let err = parse_settings_toml(toml).unwrap_err();
        assert!(matches!(err, SettingsError::Parse(_)));
    }
}
