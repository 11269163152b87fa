mod settings;

use config::{Config, ConfigError, Environment, File};

use settings::PartialSettings;

pub use settings::{
    AckPolicy, AuthBackend, AuthSettings, BrokerSettings, IngressSettings, LoggingSettings,
    ServerSettings, Settings, WorkerSettings,
};

/// Environment variables look like `AUTHRELAY__BROKER__MESSAGE_TTL_MS`.
pub const ENV_PREFIX: &str = "AUTHRELAY";

/// Loads the configuration from the default file and environment variables.
pub fn load_config() -> Result<Settings, ConfigError> {
    load_config_from(None)
}

/// Loads the configuration from `path` (required when given, otherwise the
/// optional `config/default` file) and environment variables, merged over
/// `Settings::default()`.
pub fn load_config_from(path: Option<&str>) -> Result<Settings, ConfigError> {
    let file = match path {
        Some(path) => File::with_name(path).required(true),
        None => File::with_name("config/default").required(false),
    };

    let builder = Config::builder().add_source(file).add_source(
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;

    // Try to deserialize what is available
    let partial: PartialSettings = config.try_deserialize()?;

    Ok(partial.merge_onto(Settings::default()))
}
