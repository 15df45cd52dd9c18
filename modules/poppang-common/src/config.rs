use std::path::PathBuf;

use crate::error::PoppangError;

/// Secrets and environment-specific values. Tunables live in the TOML [`FileConfig`].
///
/// [`FileConfig`]: crate::FileConfig
#[derive(Debug, Clone)]
pub struct AppConfig {
    // Database
    pub database_url: String,

    // Extraction oracle
    pub openai_api_key: String,

    // Feed
    pub instagram_access_token: String,
    pub ig_user_id: String,

    // Geocoding
    pub naver_client_id: String,
    pub naver_client_secret: String,

    // Moderation
    pub google_vision_api_key: String,

    // Push
    pub fcm_credentials_path: String,

    pub data_dir: Option<String>,
}

impl AppConfig {
    /// Load from the process environment (after reading `.env` if present).
    ///
    /// Every missing required variable is reported in a single error so a
    /// misconfigured deploy fails once, before any stage runs.
    pub fn from_env() -> Result<Self, PoppangError> {
        dotenvy::dotenv().ok();
        let config = Self::from_lookup(|key| std::env::var(key).ok())?;
        config.log_keys();
        Ok(config)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, PoppangError> {
        let mut missing = Vec::new();
        let mut required = |key: &'static str| -> String {
            match lookup(key).filter(|v| !v.trim().is_empty()) {
                Some(v) => v,
                None => {
                    missing.push(key);
                    String::new()
                }
            }
        };

        let database_url = required("DATABASE_URL");
        let openai_api_key = required("OPENAI_API_KEY");
        let instagram_access_token = required("INSTAGRAM_ACCESS_TOKEN");
        let ig_user_id = required("IG_USER_ID");
        let naver_client_id = required("NAVER_CLIENT_ID");
        let naver_client_secret = required("NAVER_CLIENT_SECRET");
        let google_vision_api_key = required("GOOGLE_VISION_API_KEY");
        let fcm_credentials_path = required("FCM_CREDENTIALS_PATH");

        if !missing.is_empty() {
            return Err(PoppangError::Config(format!(
                "missing required environment variables: {}",
                missing.join(", ")
            )));
        }

        Ok(Self {
            database_url,
            openai_api_key,
            instagram_access_token,
            ig_user_id,
            naver_client_id,
            naver_client_secret,
            google_vision_api_key,
            fcm_credentials_path,
            data_dir: lookup("DATA_DIR").filter(|v| !v.is_empty()),
        })
    }

    /// Root for run logs, checkpoints and snapshots (default `data`).
    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(self.data_dir.as_deref().unwrap_or("data"))
    }

    fn log_keys(&self) {
        fn preview(val: &str) -> String {
            let n = val
                .char_indices()
                .nth(5)
                .map(|(i, _)| i)
                .unwrap_or(val.len());
            format!("{}...({} chars)", &val[..n], val.chars().count())
        }

        tracing::info!("Config loaded:");
        tracing::info!("  OPENAI_API_KEY: {}", preview(&self.openai_api_key));
        tracing::info!("  INSTAGRAM_ACCESS_TOKEN: {}", preview(&self.instagram_access_token));
        tracing::info!("  IG_USER_ID: {}", self.ig_user_id);
        tracing::info!("  NAVER_CLIENT_ID: {}", preview(&self.naver_client_id));
        tracing::info!("  GOOGLE_VISION_API_KEY: {}", preview(&self.google_vision_api_key));
        tracing::info!("  FCM_CREDENTIALS_PATH: {}", self.fcm_credentials_path);
        tracing::info!(
            "  DATA_DIR: {}",
            self.data_dir.as_deref().unwrap_or("<not set>")
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn full_env() -> HashMap<&'static str, String> {
        [
            ("DATABASE_URL", "postgres://localhost/poppang"),
            ("OPENAI_API_KEY", "sk-test"),
            ("INSTAGRAM_ACCESS_TOKEN", "ig-token"),
            ("IG_USER_ID", "1784"),
            ("NAVER_CLIENT_ID", "naver-id"),
            ("NAVER_CLIENT_SECRET", "naver-secret"),
            ("GOOGLE_VISION_API_KEY", "vision-key"),
            ("FCM_CREDENTIALS_PATH", "/etc/poppang/fcm.json"),
        ]
        .into_iter()
        .map(|(k, v)| (k, v.to_string()))
        .collect()
    }

    #[test]
    fn loads_when_everything_is_present() {
        let env = full_env();
        let config = AppConfig::from_lookup(|k| env.get(k).cloned()).unwrap();
        assert_eq!(config.ig_user_id, "1784");
        assert!(config.data_dir.is_none());
    }

    #[test]
    fn reports_every_missing_variable_at_once() {
        let mut env = full_env();
        env.remove("OPENAI_API_KEY");
        env.insert("NAVER_CLIENT_SECRET", "  ".to_string());

        let err = AppConfig::from_lookup(|k| env.get(k).cloned()).unwrap_err();
        let msg = err.to_string();
        assert!(matches!(err, PoppangError::Config(_)));
        assert!(msg.contains("OPENAI_API_KEY"));
        assert!(msg.contains("NAVER_CLIENT_SECRET"));
        assert!(!msg.contains("DATABASE_URL"));
    }
}
