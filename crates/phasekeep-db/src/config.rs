use std::env;

/// Database configuration.
///
/// Reads from the `PHASEKEEP_DATABASE_URL` environment variable, falling back to
/// `postgresql://localhost:5432/phasekeep` when unset.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Full PostgreSQL connection URL.
    pub database_url: String,
}

impl DbConfig {
    /// The default connection URL used when no environment variable is set.
    pub const DEFAULT_URL: &str = "postgresql://localhost:5432/phasekeep";

    /// Build a config from the environment.
    ///
    /// Priority: `PHASEKEEP_DATABASE_URL` env var, then the compile-time default.
    pub fn from_env() -> Self {
        let database_url = env::var("PHASEKEEP_DATABASE_URL")
            .unwrap_or_else(|_| Self::DEFAULT_URL.to_owned());
        Self { database_url }
    }

    /// Build a config from an explicit URL (useful for tests and CLI flags).
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
        }
    }

    /// Extract the database name from the URL, ignoring any query string
    /// (`?sslmode=require` and friends).
    ///
    /// Returns `None` if the URL has no path component.
    pub fn database_name(&self) -> Option<&str> {
        let without_query = self
            .database_url
            .split_once('?')
            .map_or(self.database_url.as_str(), |(base, _)| base);
        without_query.rsplit('/').next().filter(|s| !s.is_empty())
    }

    /// Return a URL pointing at the `postgres` maintenance database on the
    /// same host. Used to issue `CREATE DATABASE` when the target DB does not
    /// yet exist.
    pub fn maintenance_url(&self) -> String {
        self.for_database("postgres").database_url
    }

    /// A config for another database on the same server.
    pub fn for_database(&self, name: &str) -> Self {
        match self.database_url.rfind('/') {
            Some(pos) => Self::new(format!("{}/{name}", &self.database_url[..pos])),
            None => self.clone(),
        }
    }
}

impl Default for DbConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_url() {
        let cfg = DbConfig::new(DbConfig::DEFAULT_URL);
        assert_eq!(cfg.database_url, "postgresql://localhost:5432/phasekeep");
        assert_eq!(cfg.database_name(), Some("phasekeep"));
    }

    #[test]
    fn database_name_extraction() {
        let cfg = DbConfig::new("postgresql://localhost:5432/mydb");
        assert_eq!(cfg.database_name(), Some("mydb"));
    }

    #[test]
    fn maintenance_url_replaces_db() {
        let cfg = DbConfig::new("postgresql://localhost:5432/phasekeep");
        assert_eq!(cfg.maintenance_url(), "postgresql://localhost:5432/postgres");
    }

    #[test]
    fn for_database_keeps_host() {
        let cfg = DbConfig::new("postgresql://u:p@remotehost:5433/phasekeep");
        let other = cfg.for_database("phasekeep_test_1");
        assert_eq!(
            other.database_url,
            "postgresql://u:p@remotehost:5433/phasekeep_test_1"
        );
    }

    #[test]
    fn database_name_ignores_query_string() {
        let cfg = DbConfig::new("postgresql://db.internal:5432/plans?sslmode=require");
        assert_eq!(cfg.database_name(), Some("plans"));
    }

    #[test]
    fn explicit_new() {
        let cfg = DbConfig::new("postgresql://remotehost:5433/other");
        assert_eq!(cfg.database_url, "postgresql://remotehost:5433/other");
        assert_eq!(cfg.database_name(), Some("other"));
    }
}
