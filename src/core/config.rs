mod parsing;
mod settings;
mod types;

pub use types::{
    ApiSettings, BaseUrl, ConfigError, Environment, RetrySettings, RuntimeSettings, Settings,
    TelemetrySettings, TimerSettings,
};
