use std::env;

use super::error::{CouchDaoError, CouchResult};

const DEFAULT_DATABASE: &str = "langar_seva_users";

/// How to reach the CouchDB database holding user documents.
#[derive(Debug, Clone)]
pub struct CouchConfig {
    pub base_url: String,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl CouchConfig {
    /// Configuration without credentials; a blank `database` selects the default one.
    pub fn new(base_url: impl Into<String>, database: Option<String>) -> Self {
        Self {
            base_url: base_url.into(),
            database: database
                .filter(|name| !name.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_DATABASE.to_owned()),
            username: None,
            password: None,
        }
    }

    /// Read `COUCH_BASE_URL` (required), `COUCH_DB`, and the optional
    /// `COUCH_USERNAME` / `COUCH_PASSWORD` pair. Credentials are only used when both are set.
    pub fn from_env() -> CouchResult<Self> {
        let base_url = non_blank("COUCH_BASE_URL").ok_or(CouchDaoError::MissingEnvVar {
            var: "COUCH_BASE_URL",
        })?;
        let mut config = Self::new(base_url, non_blank("COUCH_DB"));
        if let (Some(username), Some(password)) =
            (non_blank("COUCH_USERNAME"), env::var("COUCH_PASSWORD").ok())
        {
            config.username = Some(username);
            config.password = Some(password);
        }
        Ok(config)
    }
}

fn non_blank(var: &str) -> Option<String> {
    env::var(var).ok().filter(|value| !value.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_database_falls_back_to_default() {
        let config = CouchConfig::new("http://couch:5984", Some("  ".into()));
        assert_eq!(config.database, DEFAULT_DATABASE);
        assert!(config.username.is_none());

        let named = CouchConfig::new("http://couch:5984", Some("seva".into()));
        assert_eq!(named.database, "seva");
    }
}
