use crate::config::AppConfig;
use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use std::path::Path;

pub struct ConfigLoader;

impl ConfigLoader {
    /// Environment prefix; nested keys are split on `__`.
    pub const ENV_PREFIX: &'static str = "TRAILSTOP_";

    /// Loads `config/Config.toml` merged with the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration files cannot be parsed or fail validation.
    pub fn load() -> Result<AppConfig> {
        Self::load_from(Path::new("config/Config.toml"), None)
    }

    /// Loads application configuration with a specific profile.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration files cannot be parsed or fail validation.
    pub fn load_with_profile(profile: &str) -> Result<AppConfig> {
        Self::load_from(Path::new("config/Config.toml"), Some(profile))
    }

    /// Merges `path`, then `Config.{profile}.toml` beside it, then `TRAILSTOP_*`
    /// variables. Missing files fall back to defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration files cannot be parsed or fail validation.
    pub fn load_from(path: &Path, profile: Option<&str>) -> Result<AppConfig> {
        let mut figment = Figment::new().merge(Toml::file(path));

        if let Some(profile) = profile {
            let profile_file = path.with_file_name(format!("Config.{profile}.toml"));
            figment = figment.merge(Toml::file(profile_file));
        }

        let config: AppConfig = figment
            .merge(Env::prefixed(Self::ENV_PREFIX).split("__"))
            .extract()
            .context("failed to parse configuration")?;

        config.validate()?;
        Ok(config)
    }
}
