// Constants shared across the gateway crates

/// The default configuration file name for the application.
/// This constant is used to specify the default configuration file
/// that the application will attempt to load at startup.
pub const DEFAULT_CONFIG_FILE_NAME: &str = "gateway.toml";

/// Prefix of environment variables overriding configuration values,
/// e.g. `VT__DEVICE__ENDPOINT`.
pub const ENV_PREFIX: &str = "VT";

/// Default location of the tag-definition document, relative to the runtime dir.
pub const DEFAULT_MAPPING_PATH: &str = "SPSData/Mapping_Ventiltester.xml";
