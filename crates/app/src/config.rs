use std::path::PathBuf;
use std::time::Duration;

use quiz_core::model::{SetId, UserId};
use thiserror::Error;

const DEFAULT_DB_URL: &str = "sqlite://quiz.sqlite3";
const DEFAULT_DRAFT_DIR: &str = ".quiz-drafts";
const DEFAULT_TICK_MS: u64 = 250;

#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("{flag} requires a value")]
    MissingValue { flag: &'static str },
    #[error("unknown argument: {0}")]
    UnknownArg(String),
    #[error("invalid {source_name} value: {raw}")]
    Invalid {
        source_name: &'static str,
        raw: String,
    },
    #[error("help requested")]
    HelpRequested,
}

/// Runtime configuration for one attempt run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub db_url: String,
    pub draft_dir: PathBuf,
    pub user_id: UserId,
    pub set_id: SetId,
    /// Attempt id to resume, as typed by the user. Validated by the loader.
    pub attempt_hint: Option<String>,
    pub tick_interval: Duration,
}

impl AppConfig {
    /// Reads `.env` (if present), then `QUIZ_*` variables, then CLI flags.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` for unknown flags or unparsable values.
    pub fn from_env_and_args(args: impl IntoIterator<Item = String>) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_sources(|key| std::env::var(key).ok(), args)
    }

    /// Same as [`AppConfig::from_env_and_args`] with an injectable environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` for unknown flags or unparsable values.
    pub fn from_sources(
        env: impl Fn(&str) -> Option<String>,
        args: impl IntoIterator<Item = String>,
    ) -> Result<Self, ConfigError> {
        let mut config = Self {
            db_url: env("QUIZ_DB_URL").unwrap_or_else(|| DEFAULT_DB_URL.into()),
            draft_dir: env("QUIZ_DRAFT_DIR")
                .map_or_else(|| PathBuf::from(DEFAULT_DRAFT_DIR), PathBuf::from),
            user_id: UserId::new(1),
            set_id: SetId::new(1),
            attempt_hint: env("QUIZ_ATTEMPT_ID").filter(|v| !v.trim().is_empty()),
            tick_interval: Duration::from_millis(DEFAULT_TICK_MS),
        };
        if let Some(raw) = env("QUIZ_USER_ID") {
            config.user_id = UserId::new(parse_u64("QUIZ_USER_ID", &raw)?);
        }
        if let Some(raw) = env("QUIZ_SET_ID") {
            config.set_id = SetId::new(parse_u64("QUIZ_SET_ID", &raw)?);
        }
        if let Some(raw) = env("QUIZ_TICK_MS") {
            config.tick_interval = Duration::from_millis(parse_u64("QUIZ_TICK_MS", &raw)?);
        }

        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(&mut args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ConfigError::Invalid {
                            source_name: "--db",
                            raw: value,
                        });
                    }
                    config.db_url = value;
                }
                "--drafts" => {
                    config.draft_dir = PathBuf::from(require_value(&mut args, "--drafts")?);
                }
                "--user" => {
                    let value = require_value(&mut args, "--user")?;
                    config.user_id = UserId::new(parse_u64("--user", &value)?);
                }
                "--set" => {
                    let value = require_value(&mut args, "--set")?;
                    config.set_id = SetId::new(parse_u64("--set", &value)?);
                }
                "--attempt" => {
                    config.attempt_hint = Some(require_value(&mut args, "--attempt")?);
                }
                "--tick-ms" => {
                    let value = require_value(&mut args, "--tick-ms")?;
                    config.tick_interval = Duration::from_millis(parse_u64("--tick-ms", &value)?);
                }
                "--help" | "-h" => return Err(ConfigError::HelpRequested),
                _ => return Err(ConfigError::UnknownArg(arg)),
            }
        }

        Ok(config)
    }
}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ConfigError> {
    args.next().ok_or(ConfigError::MissingValue { flag })
}

fn parse_u64(source_name: &'static str, raw: &str) -> Result<u64, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::Invalid {
        source_name,
        raw: raw.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn parse(env: &[(&str, &str)], args: &[&str]) -> Result<AppConfig, ConfigError> {
        let env: HashMap<String, String> = env
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        AppConfig::from_sources(
            |key| env.get(key).cloned(),
            args.iter().map(|a| (*a).to_string()),
        )
    }

    #[test]
    fn defaults_apply_without_env_or_flags() {
        let config = parse(&[], &[]).unwrap();
        assert_eq!(config.db_url, DEFAULT_DB_URL);
        assert_eq!(config.draft_dir, PathBuf::from(DEFAULT_DRAFT_DIR));
        assert_eq!(config.user_id, UserId::new(1));
        assert_eq!(config.set_id, SetId::new(1));
        assert_eq!(config.attempt_hint, None);
        assert_eq!(config.tick_interval, Duration::from_millis(250));
    }

    #[test]
    fn flags_override_environment() {
        let config = parse(
            &[("QUIZ_SET_ID", "4"), ("QUIZ_USER_ID", "9"), ("QUIZ_TICK_MS", "100")],
            &["--set", "12", "--tick-ms", "50", "--attempt", "abc"],
        )
        .unwrap();
        assert_eq!(config.set_id, SetId::new(12));
        assert_eq!(config.user_id, UserId::new(9));
        assert_eq!(config.tick_interval, Duration::from_millis(50));
        assert_eq!(config.attempt_hint.as_deref(), Some("abc"));
    }

    #[test]
    fn blank_attempt_env_is_ignored() {
        let config = parse(&[("QUIZ_ATTEMPT_ID", "  ")], &[]).unwrap();
        assert_eq!(config.attempt_hint, None);
    }

    #[test]
    fn bad_values_are_reported() {
        assert_eq!(
            parse(&[("QUIZ_SET_ID", "x")], &[]),
            Err(ConfigError::Invalid {
                source_name: "QUIZ_SET_ID",
                raw: "x".into()
            })
        );
        assert_eq!(
            parse(&[], &["--user"]),
            Err(ConfigError::MissingValue { flag: "--user" })
        );
        assert_eq!(
            parse(&[], &["--verbose"]),
            Err(ConfigError::UnknownArg("--verbose".into()))
        );
        assert_eq!(parse(&[], &["-h"]), Err(ConfigError::HelpRequested));
    }
}
