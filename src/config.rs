use std::time::Duration;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}

/// Runtime configuration, read once at startup.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    /// Elevated credential; only the admin scope uses it.
    pub database_service_url: String,
    pub auth_url: String,
    pub auth_anon_key: String,
    pub cors_origins: Vec<String>,
    pub rate_limit_window: Duration,
    pub rate_limit_max: usize,
    pub port: u16,
    pub production: bool,
    pub enable_hsts: bool,
    pub run_migrations: bool,
}

/// Split a comma separated origin list, dropping blanks.
pub fn parse_origins(csv: &str) -> Vec<String> {
    csv.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect()
}

fn flag(value: Option<String>) -> bool {
    value.is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| {
            lookup(name).filter(|v| !v.trim().is_empty()).ok_or(ConfigError::Missing(name))
        };
        fn parsed<T: std::str::FromStr>(name: &'static str, raw: String) -> Result<T, ConfigError> {
            raw.trim().parse().map_err(|_| ConfigError::Invalid { name, value: raw })
        }

        let cors_raw = required("CORS_ORIGIN")?;
        let cors_origins = parse_origins(&cors_raw);
        if cors_origins.is_empty() {
            return Err(ConfigError::Invalid { name: "CORS_ORIGIN", value: cors_raw });
        }
        if let Some(bad) = cors_origins.iter().find(|o| reqwest::Url::parse(o).is_err()) {
            return Err(ConfigError::Invalid { name: "CORS_ORIGIN", value: bad.clone() });
        }

        let auth_url = required("AUTH_URL")?;
        if reqwest::Url::parse(&auth_url).is_err() {
            return Err(ConfigError::Invalid { name: "AUTH_URL", value: auth_url });
        }

        let window_ms: u64 = parsed("RATE_LIMIT_WINDOW_MS", required("RATE_LIMIT_WINDOW_MS")?)?;
        let rate_limit_max: usize = parsed("RATE_LIMIT_MAX", required("RATE_LIMIT_MAX")?)?;
        if window_ms == 0 || rate_limit_max == 0 {
            return Err(ConfigError::Invalid {
                name: if window_ms == 0 { "RATE_LIMIT_WINDOW_MS" } else { "RATE_LIMIT_MAX" },
                value: "0".into(),
            });
        }

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            database_service_url: required("DATABASE_SERVICE_URL")?,
            auth_url,
            auth_anon_key: required("AUTH_ANON_KEY")?,
            cors_origins,
            rate_limit_window: Duration::from_millis(window_ms),
            rate_limit_max,
            port: parsed("PORT", required("PORT")?)?,
            production: lookup("APP_ENV").is_some_and(|v| v.eq_ignore_ascii_case("production")),
            enable_hsts: flag(lookup("ENABLE_HSTS")),
            run_migrations: flag(lookup("RUN_MIGRATIONS")),
        })
    }
}
