//! Facilities for reading runtime configuration values
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::Deserialize;
use tracing::*;

#[derive(Debug, Deserialize)]
/// Decoder configuration
pub struct Config {
    /// Directory where extracted bodies and attachments are written
    #[serde(default = "Config::default_output_path")]
    pub output_path: String,
    /// Single part limit (the part is marked TOOBIG if exceeded)
    #[serde(default = "Config::default_max_child_output_size")]
    pub max_child_output_size: u64,
    /// Maximum number of parts to extract per message
    #[serde(default = "Config::default_max_children")]
    pub max_children: u32,
    /// Overall extraction limit per message
    #[serde(default = "Config::default_max_processed_size")]
    pub max_processed_size: u64,
    /// Maximum nesting depth of attachments and embedded messages
    #[serde(default = "Config::default_max_depth")]
    pub max_depth: usize,
}

impl Config {
    /// Loads the configuration from `msgdecode.toml` and `MSGDECODE__*`
    /// environment variables
    pub fn new() -> Result<Self, Box<dyn std::error::Error>> {
        let config: Self = Figment::new()
            .merge(Toml::file("msgdecode.toml"))
            .merge(Env::prefixed("MSGDECODE__").split("__"))
            .extract()
            .map_err(|err| {
                error!("Failed to load configuration: {}", err);
                err
            })?;
        config.validate()?;
        trace!("final config: {config:#?}");
        Ok(config)
    }

    fn validate(&self) -> Result<(), String> {
        macro_rules! check_higher_bound {
            ($var:ident, $limit:expr) => {
                if self.$var >= $limit as _ {
                    let msg = format!(
                        "Invalid configuration: {} should be less than {}",
                        stringify!($var),
                        $limit
                    );
                    error!("{msg}");
                    return Err(msg);
                }
            };
        }
        check_higher_bound!(max_child_output_size, i64::MAX);
        check_higher_bound!(max_processed_size, i64::MAX);
        check_higher_bound!(max_depth, 64);
        Ok(())
    }

    fn default_output_path() -> String {
        ".".to_string()
    }

    fn default_max_child_output_size() -> u64 {
        40 * 1024 * 1024
    }

    fn default_max_children() -> u32 {
        1000
    }

    fn default_max_processed_size() -> u64 {
        200 * 1024 * 1024
    }

    fn default_max_depth() -> usize {
        8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_and_bounds() {
        let config: Config = Figment::new().extract().unwrap();
        assert_eq!(config.output_path, ".");
        assert_eq!(config.max_depth, 8);
        assert!(config.validate().is_ok());

        let config: Config = Figment::new()
            .merge(figment::providers::Serialized::default("max_depth", 100))
            .extract()
            .unwrap();
        assert!(config.validate().is_err());
    }
}
