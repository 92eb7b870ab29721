use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// Default request body ceiling (25 MiB), roughly what providers accept per message.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_security: SmtpSecurity,
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub expose_send_results: bool,
    pub cors_allow_origin: Option<String>,
}

/// How the submission connection is secured. Certificates are always verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmtpSecurity {
    /// Implicit TLS from the first byte (port 465).
    Tls,
    /// Plain connect upgraded with STARTTLS (port 587).
    StartTls,
}

impl SmtpSecurity {
    pub fn default_port(self) -> u16 {
        match self {
            SmtpSecurity::Tls => 465,
            SmtpSecurity::StartTls => 587,
        }
    }
}

impl FromStr for SmtpSecurity {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tls" | "ssl" | "wrapper" => Ok(SmtpSecurity::Tls),
            "starttls" => Ok(SmtpSecurity::StartTls),
            other => Err(ConfigError::InvalidSmtpSecurity(other.to_string())),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let smtp_security = match lookup("SMTP_SECURITY") {
            Some(raw) => raw.parse()?,
            None => SmtpSecurity::Tls,
        };

        let server_port = lookup("SERVER_PORT")
            .or_else(|| lookup("PORT"))
            .unwrap_or_else(|| "3000".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidPort("SERVER_PORT"))?;

        let smtp_port = match lookup("SMTP_PORT") {
            Some(raw) => raw
                .parse()
                .map_err(|_| ConfigError::InvalidPort("SMTP_PORT"))?,
            None => smtp_security.default_port(),
        };

        let max_upload_bytes = match lookup("MAX_UPLOAD_BYTES") {
            Some(raw) => raw
                .parse()
                .map_err(|_| ConfigError::InvalidNumber("MAX_UPLOAD_BYTES"))?,
            None => DEFAULT_MAX_UPLOAD_BYTES,
        };

        let expose_send_results = match lookup("EXPOSE_SEND_RESULTS") {
            Some(raw) => parse_bool(&raw).ok_or(ConfigError::InvalidBool("EXPOSE_SEND_RESULTS"))?,
            None => false,
        };

        Ok(Config {
            server_host: lookup("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            server_port,
            smtp_host: lookup("SMTP_HOST").unwrap_or_else(|| "smtp.gmail.com".to_string()),
            smtp_port,
            smtp_security,
            upload_dir: lookup("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("uploads")),
            max_upload_bytes,
            expose_send_results,
            cors_allow_origin: lookup("CORS_ALLOW_ORIGIN").filter(|o| o.trim() != "*"),
        })
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid port in {0}")]
    InvalidPort(&'static str),
    #[error("Invalid number in {0}")]
    InvalidNumber(&'static str),
    #[error("Invalid boolean in {0}")]
    InvalidBool(&'static str),
    #[error("Unknown SMTP_SECURITY mode: {0} (expected tls or starttls)")]
    InvalidSmtpSecurity(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).expect("defaults should load");

        assert_eq!(config.server_addr(), "0.0.0.0:3000");
        assert_eq!(config.smtp_host, "smtp.gmail.com");
        assert_eq!(config.smtp_security, SmtpSecurity::Tls);
        assert_eq!(config.smtp_port, 465);
        assert_eq!(config.upload_dir, PathBuf::from("uploads"));
        assert_eq!(config.max_upload_bytes, DEFAULT_MAX_UPLOAD_BYTES);
        assert!(!config.expose_send_results);
        assert!(config.cors_allow_origin.is_none());
    }

    #[test]
    fn test_starttls_changes_default_port() {
        let config = config_from(&[("SMTP_SECURITY", "STARTTLS")]).unwrap();
        assert_eq!(config.smtp_security, SmtpSecurity::StartTls);
        assert_eq!(config.smtp_port, 587);

        let config = config_from(&[("SMTP_SECURITY", "starttls"), ("SMTP_PORT", "2525")]).unwrap();
        assert_eq!(config.smtp_port, 2525);
    }

    #[test]
    fn test_port_fallback_and_flags() {
        let config = config_from(&[
            ("PORT", "8081"),
            ("EXPOSE_SEND_RESULTS", "true"),
            ("CORS_ALLOW_ORIGIN", "https://app.example.com"),
        ])
        .unwrap();

        assert_eq!(config.server_port, 8081);
        assert!(config.expose_send_results);
        assert_eq!(
            config.cors_allow_origin.as_deref(),
            Some("https://app.example.com")
        );

        let config = config_from(&[("PORT", "8081"), ("SERVER_PORT", "9000")]).unwrap();
        assert_eq!(config.server_port, 9000);
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            config_from(&[("SERVER_PORT", "http")]),
            Err(ConfigError::InvalidPort("SERVER_PORT"))
        ));
        assert!(matches!(
            config_from(&[("SMTP_SECURITY", "none")]),
            Err(ConfigError::InvalidSmtpSecurity(_))
        ));
        assert!(matches!(
            config_from(&[("EXPOSE_SEND_RESULTS", "maybe")]),
            Err(ConfigError::InvalidBool(_))
        ));
    }
}
