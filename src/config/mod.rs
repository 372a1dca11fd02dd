//! Runtime configuration for the Firefly III connection

mod settings;

pub use settings::{
    ConfigurationError, EnvLookup, SettingsResolver, ACCESS_TOKEN_ENV, ACCESS_TOKEN_KEY,
    BASE_URL_ENV, BASE_URL_KEY,
};
