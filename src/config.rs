//! Application-level configuration loading: group rosters, countdown length
//! and the admin token.

use std::{env, fs, io::ErrorKind, path::PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::state::race::GroupId;

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "RACE_TIMER_CONFIG_PATH";
/// Environment variable that overrides the admin token of the file.
const ADMIN_TOKEN_ENV: &str = "RACE_TIMER_ADMIN_TOKEN";
/// Countdown length used when the file does not set one.
pub const DEFAULT_COUNTDOWN_SECS: u32 = 120;
/// Groups served when no usable configuration is found.
const DEFAULT_GROUPS: [&str; 4] = ["lowerPrimary", "minis", "junior", "senior"];

/// One class of a group roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ClassRoster {
    /// Class label.
    pub name: String,
    /// Students in display order.
    #[serde(default)]
    pub students: Vec<String>,
}

/// Students taking part in one group, organised by class.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct GroupRoster {
    /// Classes in display order.
    #[serde(default)]
    pub classes: Vec<ClassRoster>,
}

impl GroupRoster {
    /// Every student of the group, class after class.
    pub fn students(&self) -> impl Iterator<Item = &str> {
        self.classes
            .iter()
            .flat_map(|class| class.students.iter().map(String::as_str))
    }
}

#[derive(Debug, Clone, PartialEq)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    groups: IndexMap<GroupId, GroupRoster>,
    countdown_secs: u32,
    admin_token: String,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to the
    /// built-in groups, then resolve the admin token.
    pub fn load() -> Self {
        let path = resolve_config_path();
        let mut config = match fs::read_to_string(&path) {
            Ok(contents) => match Self::from_json_str(&contents) {
                Ok(config) => {
                    info!(
                        path = %path.display(),
                        groups = config.groups.len(),
                        "loaded group rosters from config"
                    );
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        };

        let env_token = env::var(ADMIN_TOKEN_ENV).ok();
        let (token, source) = resolve_admin_token(env_token, config.admin_token.clone());
        match source {
            TokenSource::Environment => info!("admin token taken from {ADMIN_TOKEN_ENV}"),
            TokenSource::File => info!("admin token taken from config file"),
            TokenSource::Generated => {
                warn!(token = %token, "no admin token configured; generated one for this run")
            }
        }
        config.admin_token = token;
        config
    }

    /// Parse the JSON configuration format. The admin token is left as found
    /// in the document; [`AppConfig::load`] resolves the final one.
    pub fn from_json_str(contents: &str) -> serde_json::Result<Self> {
        serde_json::from_str::<RawConfig>(contents).map(Self::from)
    }

    /// Configured groups with their rosters, in file order.
    pub fn groups(&self) -> &IndexMap<GroupId, GroupRoster> {
        &self.groups
    }

    /// Roster of one group.
    pub fn group(&self, group: &GroupId) -> Option<&GroupRoster> {
        self.groups.get(group)
    }

    /// Countdown length applied when a start request does not override it.
    pub fn countdown_secs(&self) -> u32 {
        self.countdown_secs
    }

    /// Token expected in the `x-admin-token` header and the WebSocket login.
    pub fn admin_token(&self) -> &str {
        &self.admin_token
    }

    /// Replace the admin token.
    pub fn with_admin_token(mut self, token: impl Into<String>) -> Self {
        self.admin_token = token.into();
        self
    }

    /// Students of every group whose name contains `query`, ignoring case.
    pub fn search_students(&self, query: &str) -> Vec<(GroupId, String)> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }
        self.groups
            .iter()
            .flat_map(|(group, roster)| {
                roster
                    .students()
                    .filter(|student| student.to_lowercase().contains(&needle))
                    .map(move |student| (group.clone(), student.to_string()))
            })
            .collect()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::from(RawConfig::default())
    }
}

#[derive(Debug, Default, Deserialize)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    #[serde(default)]
    groups: IndexMap<String, GroupRoster>,
    countdown_secs: Option<u32>,
    admin_token: Option<String>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let groups: IndexMap<GroupId, GroupRoster> = if value.groups.is_empty() {
            DEFAULT_GROUPS
                .into_iter()
                .map(|group| (GroupId::from(group), GroupRoster::default()))
                .collect()
        } else {
            value
                .groups
                .into_iter()
                .map(|(group, roster)| (GroupId::new(group), roster))
                .collect()
        };

        Self {
            groups,
            countdown_secs: value
                .countdown_secs
                .filter(|secs| *secs > 0)
                .unwrap_or(DEFAULT_COUNTDOWN_SECS),
            admin_token: value
                .admin_token
                .filter(|token| !token.trim().is_empty())
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum TokenSource {
    Environment,
    File,
    Generated,
}

/// Pick the admin token: environment first, then the file, otherwise a fresh one.
fn resolve_admin_token(env_token: Option<String>, file_token: String) -> (String, TokenSource) {
    if let Some(token) = env_token.filter(|token| !token.trim().is_empty()) {
        return (token, TokenSource::Environment);
    }
    if !file_token.is_empty() {
        return (file_token, TokenSource::File);
    }
    (Uuid::new_v4().simple().to_string(), TokenSource::Generated)
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> AppConfig {
        AppConfig::from_json_str(json).unwrap()
    }

    #[test]
    fn parses_group_rosters_in_file_order() {
        let config = parse(
            r#"{
                "groups": {
                    "senior": {"classes": [{"name": "6A", "students": ["Zoe", "Adam"]}]},
                    "junior": {"classes": [
                        {"name": "3A", "students": ["Alice"]},
                        {"name": "3B", "students": ["Bob", "Carol"]}
                    ]}
                },
                "countdown_secs": 30
            }"#,
        );

        let groups: Vec<&str> = config.groups().keys().map(GroupId::as_str).collect();
        assert_eq!(groups, vec!["senior", "junior"]);
        let junior: Vec<&str> = config
            .group(&GroupId::from("junior"))
            .unwrap()
            .students()
            .collect();
        assert_eq!(junior, vec!["Alice", "Bob", "Carol"]);
        assert_eq!(config.countdown_secs(), 30);
    }

    #[test]
    fn empty_config_uses_default_groups() {
        let config = parse("{}");
        let groups: Vec<&str> = config.groups().keys().map(GroupId::as_str).collect();
        assert_eq!(groups, DEFAULT_GROUPS.to_vec());
        assert_eq!(config.countdown_secs(), DEFAULT_COUNTDOWN_SECS);
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn zero_countdown_falls_back_to_default() {
        let config = parse(r#"{"countdown_secs": 0}"#);
        assert_eq!(config.countdown_secs(), DEFAULT_COUNTDOWN_SECS);
    }

    #[test]
    fn admin_token_prefers_environment_then_file() {
        assert_eq!(
            resolve_admin_token(Some("env".into()), "file".into()),
            ("env".to_string(), TokenSource::Environment)
        );
        assert_eq!(
            resolve_admin_token(Some("  ".into()), "file".into()),
            ("file".to_string(), TokenSource::File)
        );

        let (generated, source) = resolve_admin_token(None, String::new());
        assert_eq!(source, TokenSource::Generated);
        assert_eq!(generated.len(), 32);
    }

    #[test]
    fn student_search_spans_groups_and_ignores_case() {
        let config = parse(
            r#"{"groups": {
                "minis": {"classes": [{"name": "1A", "students": ["Anna", "Ben"]}]},
                "junior": {"classes": [{"name": "3A", "students": ["Joanna"]}]}
            }}"#,
        );
        let matches = config.search_students("ANN");
        assert_eq!(
            matches,
            vec![
                (GroupId::from("minis"), "Anna".to_string()),
                (GroupId::from("junior"), "Joanna".to_string()),
            ]
        );
        assert!(config.search_students("   ").is_empty());
    }
}
