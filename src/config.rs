use anyhow::{Context, Result, anyhow};
use dotenvy::dotenv;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Account created, or promoted, as admin at startup.
#[derive(Clone, Debug, PartialEq)]
pub struct AdminBootstrap {
    pub username: String,
    pub password: String,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub server_addr: String,
    pub access_token_ttl: usize,
    pub refresh_token_ttl: usize,
    pub run_migrations: bool,

    // Rate limiting
    pub rate_login_per_min: u32,
    pub rate_register_per_min: u32,
    pub rate_refresh_per_min: u32,
    pub rate_protected_per_min: u32,

    pub api_prefix: String,

    // Scanner
    pub scan_debounce_ms: u64,
    pub scan_session_idle_secs: u64,
    pub attendance_daily_guard: bool,
    pub beep_asset: String,

    pub admin: Option<AdminBootstrap>,

    // Logging
    pub log_dir: String,
    pub log_level: String,
}

fn required(key: &str) -> Result<String> {
    env::var(key).map_err(|_| anyhow!("{key} must be set"))
}

fn parsed_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} has an invalid value: {raw:?}")),
        Err(_) => Ok(default),
    }
}

fn string_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Both credentials or neither.
fn admin_bootstrap(
    username: Option<String>,
    password: Option<String>,
) -> Result<Option<AdminBootstrap>> {
    match (username, password) {
        (Some(username), Some(password)) => Ok(Some(AdminBootstrap {
            username: username.trim().to_lowercase(),
            password,
        })),
        (None, None) => Ok(None),
        _ => Err(anyhow!("ADMIN_USERNAME and ADMIN_PASSWORD must be set together")),
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        Ok(Self {
            server_addr: required("SERVER_ADDR")?,
            database_url: required("DATABASE_URL")?,
            jwt_secret: required("JWT_SECRET")?,
            access_token_ttl: parsed_or("ACCESS_TOKEN_TTL", 900)?, // 15 min
            refresh_token_ttl: parsed_or("REFRESH_TOKEN_TTL", 604_800)?, // 7 days
            run_migrations: parsed_or("RUN_MIGRATIONS", true)?,

            rate_login_per_min: parsed_or("RATE_LOGIN_PER_MIN", 60)?,
            rate_register_per_min: parsed_or("RATE_REGISTER_PER_MIN", 30)?,
            rate_refresh_per_min: parsed_or("RATE_REFRESH_PER_MIN", 30)?,
            rate_protected_per_min: parsed_or("RATE_PROTECTED_PER_MIN", 1000)?,

            api_prefix: string_or("API_PREFIX", "/api"),

            scan_debounce_ms: parsed_or("SCAN_DEBOUNCE_MS", 500)?,
            scan_session_idle_secs: parsed_or("SCAN_SESSION_IDLE_SECS", 3600)?,
            attendance_daily_guard: parsed_or("ATTENDANCE_DAILY_GUARD", false)?,
            beep_asset: string_or("BEEP_ASSET", "/beep.mp3"),

            admin: admin_bootstrap(optional("ADMIN_USERNAME"), optional("ADMIN_PASSWORD"))?,

            log_dir: string_or("LOG_DIR", "logs"),
            log_level: string_or("LOG_LEVEL", "debug"),
        })
    }

    pub fn scan_debounce(&self) -> Duration {
        Duration::from_millis(self.scan_debounce_ms)
    }

    pub fn scan_session_idle(&self) -> Duration {
        Duration::from_secs(self.scan_session_idle_secs)
    }
}

#[cfg(test)]
impl Config {
    /// Config for handler tests; never touches the environment.
    pub fn for_tests() -> Self {
        Self {
            database_url: "mysql://localhost/smart_scan_test".to_string(),
            jwt_secret: "test-secret".to_string(),
            server_addr: "127.0.0.1:0".to_string(),
            access_token_ttl: 900,
            refresh_token_ttl: 604_800,
            run_migrations: false,
            rate_login_per_min: 60,
            rate_register_per_min: 30,
            rate_refresh_per_min: 30,
            rate_protected_per_min: 1000,
            api_prefix: "/api".to_string(),
            scan_debounce_ms: 500,
            scan_session_idle_secs: 3600,
            attendance_daily_guard: false,
            beep_asset: "/beep.mp3".to_string(),
            admin: None,
            log_dir: "logs".to_string(),
            log_level: "debug".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_to_default_when_unset() {
        let value: u64 = parsed_or("SMART_SCAN_TEST_UNSET_MS", 500).unwrap();
        assert_eq!(value, 500);
        assert_eq!(string_or("SMART_SCAN_TEST_UNSET_DIR", "logs"), "logs");
    }

    #[test]
    fn malformed_value_names_the_variable() {
        // SAFETY: the key is unique to this test.
        unsafe { env::set_var("SMART_SCAN_TEST_BAD_FLAG", "sometimes") };

        let err = parsed_or("SMART_SCAN_TEST_BAD_FLAG", false).unwrap_err();
        assert!(err.to_string().contains("SMART_SCAN_TEST_BAD_FLAG"));
    }

    #[test]
    fn parses_trimmed_values() {
        // SAFETY: the key is unique to this test.
        unsafe { env::set_var("SMART_SCAN_TEST_DEBOUNCE", " 250 ") };

        let value: u64 = parsed_or("SMART_SCAN_TEST_DEBOUNCE", 500).unwrap();
        assert_eq!(value, 250);
    }

    #[test]
    fn admin_bootstrap_needs_both_credentials() {
        assert_eq!(admin_bootstrap(None, None).unwrap(), None);

        let admin = admin_bootstrap(Some(" Registrar ".into()), Some("s3cret".into()))
            .unwrap()
            .unwrap();
        assert_eq!(admin.username, "registrar");
        assert_eq!(admin.password, "s3cret");

        let err = admin_bootstrap(Some("registrar".into()), None).unwrap_err();
        assert!(err.to_string().contains("ADMIN_PASSWORD"));
        assert!(admin_bootstrap(None, Some("s3cret".into())).is_err());
    }

    #[test]
    fn blank_admin_variables_count_as_unset() {
        // SAFETY: the key is unique to this test.
        unsafe { env::set_var("SMART_SCAN_TEST_BLANK_ADMIN", "   ") };

        assert_eq!(optional("SMART_SCAN_TEST_BLANK_ADMIN"), None);
        assert_eq!(optional("SMART_SCAN_TEST_UNSET_ADMIN"), None);
    }

    #[test]
    fn required_reports_missing_key() {
        let err = required("SMART_SCAN_TEST_MISSING").unwrap_err();
        assert_eq!(err.to_string(), "SMART_SCAN_TEST_MISSING must be set");
    }
}
