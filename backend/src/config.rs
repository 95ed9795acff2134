use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    pub max_lifetime_secs: u64,
    pub test_before_acquire: bool,
}

/// AI engine configuration
#[derive(Debug, Clone)]
pub struct PredictorConfig {
    pub ai_engine_url: String,
    pub timeout_secs: u64,
}

/// Session token configuration
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub session_secret: String,
    pub session_max_age_secs: u64,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub predictor: PredictorConfig,
    pub auth: AuthConfig,
    pub log_level: String,
    pub log_format: String,
    pub http_port: u16,
    pub ws_port: Option<u16>,
    pub environment: String,
    pub audit_log_dir: PathBuf,
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|s| s.parse::<T>().ok())
}

impl DatabaseConfig {
    /// Create database config from environment variables
    pub fn from_env() -> Result<Self, String> {
        let url = env::var("DATABASE_URL")
            .map_err(|_| "DATABASE_URL environment variable is required")?;

        let max_connections = env_parse::<u32>("DATABASE_MAX_CONNECTIONS").unwrap_or(10);
        let acquire_timeout_secs = env_parse::<u64>("DATABASE_ACQUIRE_TIMEOUT_SECS").unwrap_or(30);
        let idle_timeout_secs = env_parse::<u64>("DATABASE_IDLE_TIMEOUT_SECS").unwrap_or(600); // 10 minutes
        let max_lifetime_secs = env_parse::<u64>("DATABASE_MAX_LIFETIME_SECS").unwrap_or(1800); // 30 minutes
        let test_before_acquire = env_parse::<bool>("DATABASE_TEST_BEFORE_ACQUIRE").unwrap_or(true);

        if max_connections == 0 {
            return Err("DATABASE_MAX_CONNECTIONS must be greater than 0".to_string());
        }

        if acquire_timeout_secs == 0 {
            return Err("DATABASE_ACQUIRE_TIMEOUT_SECS must be greater than 0".to_string());
        }

        Ok(Self {
            url,
            max_connections,
            acquire_timeout_secs,
            idle_timeout_secs,
            max_lifetime_secs,
            test_before_acquire,
        })
    }

    /// Get acquire timeout as Duration
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }

    /// Get idle timeout as Duration
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    /// Get max lifetime as Duration
    pub fn max_lifetime(&self) -> Duration {
        Duration::from_secs(self.max_lifetime_secs)
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgresql://localhost/carbonsmart".to_string(),
            max_connections: 10,
            acquire_timeout_secs: 30,
            idle_timeout_secs: 600,
            max_lifetime_secs: 1800,
            test_before_acquire: true,
        }
    }
}

impl PredictorConfig {
    pub fn from_env() -> Result<Self, String> {
        let ai_engine_url = env::var("AI_ENGINE_URL")
            .unwrap_or_else(|_| "http://127.0.0.1:8002/predict".to_string());

        let timeout_secs = env_parse::<u64>("AI_ENGINE_TIMEOUT_SECS").unwrap_or(10);
        if timeout_secs == 0 {
            return Err("AI_ENGINE_TIMEOUT_SECS must be greater than 0".to_string());
        }

        Ok(Self {
            ai_engine_url,
            timeout_secs,
        })
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            ai_engine_url: "http://127.0.0.1:8002/predict".to_string(),
            timeout_secs: 10,
        }
    }
}

impl AuthConfig {
    pub fn from_env(environment: &str) -> Result<Self, String> {
        let session_secret = match env::var("SESSION_SECRET") {
            Ok(secret) => secret,
            Err(_) if environment == "production" => {
                return Err("SESSION_SECRET is required in production".to_string())
            }
            Err(_) => "carbonsmart-development-secret".to_string(),
        };

        if session_secret.len() < 16 {
            return Err("SESSION_SECRET must be at least 16 characters".to_string());
        }

        let session_max_age_secs =
            env_parse::<u64>("SESSION_MAX_AGE_SECS").unwrap_or(30 * 24 * 60 * 60); // 30 days

        Ok(Self {
            session_secret,
            session_max_age_secs,
        })
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_secret: "carbonsmart-development-secret".to_string(),
            session_max_age_secs: 30 * 24 * 60 * 60,
        }
    }
}

impl AppConfig {
    /// Create application config from environment variables
    pub fn from_env() -> Result<Self, String> {
        let database = DatabaseConfig::from_env()?;
        let predictor = PredictorConfig::from_env()?;

        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let log_format = env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

        let http_port = env_parse::<u16>("HTTP_PORT").unwrap_or(8000);
        let ws_port = env_parse::<u16>("WS_PORT");

        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let audit_log_dir =
            PathBuf::from(env::var("AUDIT_LOG_DIR").unwrap_or_else(|_| "./logs".to_string()));

        // Validate log level
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&log_level.to_lowercase().as_str()) {
            return Err(format!(
                "Invalid LOG_LEVEL: {}. Must be one of: {:?}",
                log_level, valid_log_levels
            ));
        }

        let valid_log_formats = ["pretty", "json"];
        if !valid_log_formats.contains(&log_format.to_lowercase().as_str()) {
            return Err(format!(
                "Invalid LOG_FORMAT: {}. Must be one of: {:?}",
                log_format, valid_log_formats
            ));
        }

        // Validate environment
        let valid_environments = ["development", "staging", "production"];
        if !valid_environments.contains(&environment.to_lowercase().as_str()) {
            return Err(format!(
                "Invalid ENVIRONMENT: {}. Must be one of: {:?}",
                environment, valid_environments
            ));
        }

        if ws_port == Some(http_port) {
            return Err("WS_PORT must differ from HTTP_PORT".to_string());
        }

        let environment = environment.to_lowercase();
        let auth = AuthConfig::from_env(&environment)?;

        Ok(Self {
            database,
            predictor,
            auth,
            log_level: log_level.to_lowercase(),
            log_format: log_format.to_lowercase(),
            http_port,
            ws_port,
            environment,
            audit_log_dir,
        })
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Check if logs should be emitted as JSON lines
    pub fn json_logs(&self) -> bool {
        self.log_format == "json"
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            predictor: PredictorConfig::default(),
            auth: AuthConfig::default(),
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            http_port: 8000,
            ws_port: None,
            environment: "development".to_string(),
            audit_log_dir: PathBuf::from("./logs"),
        }
    }
}
