use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::ai::{DEFAULT_API_BASE_URL, DEFAULT_MODEL};
use crate::app::StaleReplyPolicy;
use crate::autosave::{AutosaveTiming, SwitchPolicy};
use crate::error::ConfigError;

pub const APP_CONFIG_ENV_PREFIX: &str = "GEMINI_NOTEPAD_";

// Login name used as the profile id when nothing else names one.
const LOGIN_VAR: &str = "USER";

// Unprefixed variables the AI key is also read from, weakest first.
const API_KEY_VARS: [&str; 2] = ["API_KEY", "GEMINI_API_KEY"];

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Directory holding one `<storage key>.json` per user.
    pub data_dir: PathBuf,
    pub quiet_period_ms: u64,
    pub feedback_delay_ms: u64,
    /// How long a simulated AI reply takes when no API key is configured.
    pub simulated_delay_ms: u64,
    pub model: String,
    pub api_base_url: String,
    pub api_key: Option<String>,
    pub request_timeout_secs: u64,
    pub switch_policy: SwitchPolicy,
    pub stale_reply_policy: StaleReplyPolicy,
    /// Local profile the command-line front end signs in as.
    pub profile_id: Option<String>,
    pub profile_name: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            data_dir: PathBuf::from("notepad-data"),
            quiet_period_ms: 2000,
            feedback_delay_ms: 1000,
            simulated_delay_ms: 1000,
            model: DEFAULT_MODEL.to_string(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            api_key: None,
            request_timeout_secs: 30,
            switch_policy: SwitchPolicy::default(),
            stale_reply_policy: StaleReplyPolicy::default(),
            profile_id: None,
            profile_name: None,
        }
    }
}

impl AppConfig {
    /// Defaults and the login name, then the TOML file if given, then the
    /// environment.
    pub fn figment(config_file: Option<&Path>) -> Figment {
        let mut figment = Figment::new()
            .merge(Serialized::defaults(AppConfig::default()))
            .merge(Env::raw().only(&[LOGIN_VAR]).map(|_| "profile_id".into()));
        if let Some(config_file) = config_file {
            figment = figment.merge(Toml::file_exact(config_file));
        }
        for var in API_KEY_VARS {
            figment = figment.merge(Env::raw().only(&[var]).map(|_| "api_key".into()));
        }
        figment.merge(Env::prefixed(APP_CONFIG_ENV_PREFIX))
    }

    pub fn load(config_file: Option<&Path>) -> Result<AppConfig, ConfigError> {
        Ok(Self::figment(config_file).extract()?)
    }

    pub fn timing(&self) -> AutosaveTiming {
        AutosaveTiming {
            quiet_period: Duration::from_millis(self.quiet_period_ms),
            feedback_delay: Duration::from_millis(self.feedback_delay_ms),
        }
    }

    pub fn simulated_delay(&self) -> Duration {
        Duration::from_millis(self.simulated_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn defaults_match_reference_timings() {
        let config = AppConfig::default();
        assert_eq!(config.timing(), AutosaveTiming::default());
        assert_eq!(config.simulated_delay(), Duration::from_secs(1));
        assert_eq!(config.model, "gemini-2.5-flash");
        assert_eq!(config.switch_policy, SwitchPolicy::Flush);
        assert_eq!(config.stale_reply_policy, StaleReplyPolicy::Discard);
    }

    #[test]
    fn file_and_environment_layer_over_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "notepad.toml",
                r#"
                    data_dir = "/var/lib/notepad"
                    quiet_period_ms = 500
                    switch_policy = "discard"
                    model = "from-file"
                "#,
            )?;
            jail.set_env("GEMINI_NOTEPAD_MODEL", "from-env");
            jail.set_env("GEMINI_NOTEPAD_STALE_REPLY_POLICY", "apply_to_active");

            let config = AppConfig::load(Some(Path::new("notepad.toml")))
                .map_err(|e| e.to_string())?;
            assert_eq!(config.data_dir, PathBuf::from("/var/lib/notepad"));
            assert_eq!(config.timing().quiet_period, Duration::from_millis(500));
            assert_eq!(config.switch_policy, SwitchPolicy::Discard);
            assert_eq!(config.model, "from-env");
            assert_eq!(config.stale_reply_policy, StaleReplyPolicy::ApplyToActive);
            Ok(())
        });
    }

    #[test]
    fn api_key_is_read_from_plain_and_prefixed_variables() {
        Jail::expect_with(|jail| {
            jail.set_env("API_KEY", "plain");
            let config = AppConfig::load(None).map_err(|e| e.to_string())?;
            assert_eq!(config.api_key.as_deref(), Some("plain"));

            jail.set_env("GEMINI_NOTEPAD_API_KEY", "prefixed");
            let config = AppConfig::load(None).map_err(|e| e.to_string())?;
            assert_eq!(config.api_key.as_deref(), Some("prefixed"));
            Ok(())
        });
    }

    #[test]
    fn profile_id_falls_back_to_login_name() {
        Jail::expect_with(|jail| {
            jail.set_env("USER", "alice");
            let config = AppConfig::load(None).map_err(|e| e.to_string())?;
            assert_eq!(config.profile_id.as_deref(), Some("alice"));

            jail.create_file("notepad.toml", r#"profile_id = "bob""#)?;
            let config = AppConfig::load(Some(Path::new("notepad.toml")))
                .map_err(|e| e.to_string())?;
            assert_eq!(config.profile_id.as_deref(), Some("bob"));

            jail.set_env("GEMINI_NOTEPAD_PROFILE_ID", "carol");
            let config = AppConfig::load(Some(Path::new("notepad.toml")))
                .map_err(|e| e.to_string())?;
            assert_eq!(config.profile_id.as_deref(), Some("carol"));
            Ok(())
        });
    }

    #[test]
    fn missing_config_file_is_an_error() {
        Jail::expect_with(|_jail| {
            assert!(AppConfig::load(Some(Path::new("absent.toml"))).is_err());
            Ok(())
        });
    }
}
