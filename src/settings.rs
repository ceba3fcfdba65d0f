use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment};
use serde::Deserialize;

use crate::error::{Result, SyncError};

const BRANCH_REF_PREFIX: &str = "refs/heads/";

/// Run settings. CI variables are read unprefixed (`GITHUB_TOKEN`,
/// `GITHUB_REF`, ...); tuning knobs use the `AIRSYNC_` prefix.
#[derive(Clone, Deserialize)]
pub struct Settings {
    pub gcp_service_account_json: Option<String>,
    pub github_token: Option<String>,
    pub github_ref: Option<String>,
    pub github_repository: String,
    pub airports_csv_url: String,
    pub airlines_wiki_url: String,
    pub github_api_url: String,
    pub config_collection: String,
    pub default_branch: String,
}

impl Settings {
    pub fn load() -> Result<Self> {
        let builder = Config::builder()
            .add_source(Environment::default())
            .add_source(Environment::with_prefix("AIRSYNC"));
        Self::from_builder(builder)
    }

    fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self> {
        builder
            .set_default("github_repository", "ramanan-ramesh/wandrr")
            .and_then(|b| {
                b.set_default(
                    "airports_csv_url",
                    "https://davidmegginson.github.io/ourairports-data/airports.csv",
                )
            })
            .and_then(|b| {
                b.set_default(
                    "airlines_wiki_url",
                    "https://en.wikipedia.org/wiki/List_of_airline_codes",
                )
            })
            .and_then(|b| b.set_default("github_api_url", "https://api.github.com"))
            .and_then(|b| b.set_default("config_collection", "apiServices"))
            .and_then(|b| b.set_default("default_branch", "master"))
            .and_then(|b| b.build())
            .and_then(|c| c.try_deserialize::<Settings>())
            .map_err(|e| SyncError::Settings(e.to_string()))
    }

    /// Target branch for commits.
    pub fn branch(&self) -> String {
        branch_from_ref(self.github_ref.as_deref(), &self.default_branch)
    }

    /// `(owner, repo)` from `GITHUB_REPOSITORY`.
    pub fn repository(&self) -> Result<(&str, &str)> {
        match self.github_repository.split_once('/') {
            Some((owner, repo)) if !owner.is_empty() && !repo.is_empty() && !repo.contains('/') => {
                Ok((owner, repo))
            }
            _ => Err(SyncError::Settings(format!(
                "GITHUB_REPOSITORY must be owner/repo, got {:?}",
                self.github_repository
            ))),
        }
    }

    pub fn github_token(&self) -> Result<&str> {
        non_empty(self.github_token.as_deref(), "GITHUB_TOKEN")
    }

    pub fn service_account_json(&self) -> Result<&str> {
        non_empty(
            self.gcp_service_account_json.as_deref(),
            "GCP_SERVICE_ACCOUNT_JSON",
        )
    }
}

fn non_empty<'a>(value: Option<&'a str>, name: &str) -> Result<&'a str> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(SyncError::Settings(format!("{} is not set", name))),
    }
}

/// Branch named by a `refs/heads/...` ref, else the default.
pub fn branch_from_ref(git_ref: Option<&str>, default: &str) -> String {
    git_ref
        .and_then(|r| r.strip_prefix(BRANCH_REF_PREFIX))
        .filter(|b| !b.is_empty())
        .unwrap_or(default)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings_with(overrides: &[(&str, &str)]) -> Settings {
        let mut builder = Config::builder();
        for (k, v) in overrides {
            builder = builder.set_override(*k, *v).unwrap();
        }
        Settings::from_builder(builder).unwrap()
    }

    #[test]
    fn branch_from_heads_ref() {
        assert_eq!(branch_from_ref(Some("refs/heads/main"), "master"), "main");
        assert_eq!(
            branch_from_ref(Some("refs/heads/feature/airports"), "master"),
            "feature/airports"
        );
    }

    #[test]
    fn branch_falls_back_to_default() {
        assert_eq!(branch_from_ref(None, "master"), "master");
        assert_eq!(branch_from_ref(Some("refs/tags/v1.0"), "master"), "master");
        assert_eq!(branch_from_ref(Some("refs/heads/"), "master"), "master");
    }

    #[test]
    fn defaults_apply() {
        let s = settings_with(&[]);
        assert_eq!(s.config_collection, "apiServices");
        assert_eq!(s.branch(), "master");
        assert_eq!(s.repository().unwrap(), ("ramanan-ramesh", "wandrr"));
        assert!(s.airports_csv_url.ends_with("airports.csv"));
    }

    #[test]
    fn overrides_win() {
        let s = settings_with(&[
            ("github_ref", "refs/heads/staging"),
            ("github_repository", "acme/travel"),
            ("github_token", "t0k"),
        ]);
        assert_eq!(s.branch(), "staging");
        assert_eq!(s.repository().unwrap(), ("acme", "travel"));
        assert_eq!(s.github_token().unwrap(), "t0k");
    }

    #[test]
    fn missing_credentials_are_settings_errors() {
        let s = settings_with(&[("github_token", "  ")]);
        assert!(matches!(s.github_token(), Err(SyncError::Settings(_))));
        assert!(matches!(s.service_account_json(), Err(SyncError::Settings(_))));
    }

    #[test]
    fn malformed_repository_rejected() {
        let s = settings_with(&[("github_repository", "no-slash")]);
        assert!(s.repository().is_err());
    }
}
