use super::parsing::{
    env_optional, env_or_default, normalize_prefix, parse_bool, parse_environment, parse_u32,
    parse_u64,
};
use super::types::{
    ApiSettings, BaseUrl, ConfigError, RetrySettings, RuntimeSettings, Settings,
    TelemetrySettings, TimerSettings,
};

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        let environment =
            parse_environment(env_optional("PICRETE_ENV").or_else(|| env_optional("ENVIRONMENT")));
        let strict_config =
            env_optional("PICRETE_STRICT_CONFIG").map(|value| parse_bool(&value)).unwrap_or(false)
                || environment.is_production();

        let base_url = env_or_default("PICRETE_API_BASE_URL", "http://localhost:8000");
        let prefix = normalize_prefix(env_or_default("PICRETE_API_PREFIX", "/api/v1"));
        let token = env_optional("PICRETE_API_TOKEN");
        let timeout_seconds = parse_u64(
            "PICRETE_API_TIMEOUT_SECONDS",
            env_or_default("PICRETE_API_TIMEOUT_SECONDS", "30"),
        )?;
        let connect_timeout_seconds = parse_u64(
            "PICRETE_API_CONNECT_TIMEOUT_SECONDS",
            env_or_default("PICRETE_API_CONNECT_TIMEOUT_SECONDS", "10"),
        )?;

        let max_attempts = parse_u32(
            "PICRETE_RETRY_MAX_ATTEMPTS",
            env_or_default("PICRETE_RETRY_MAX_ATTEMPTS", "3"),
        )?;
        let base_delay_ms = parse_u64(
            "PICRETE_RETRY_BASE_DELAY_MS",
            env_or_default("PICRETE_RETRY_BASE_DELAY_MS", "500"),
        )?;
        let max_delay_ms = parse_u64(
            "PICRETE_RETRY_MAX_DELAY_MS",
            env_or_default("PICRETE_RETRY_MAX_DELAY_MS", "8000"),
        )?;

        let tick_ms =
            parse_u64("PICRETE_TIMER_TICK_MS", env_or_default("PICRETE_TIMER_TICK_MS", "1000"))?;
        let warning_seconds = parse_u64(
            "PICRETE_TIMER_WARNING_SECONDS",
            env_or_default("PICRETE_TIMER_WARNING_SECONDS", "120"),
        )?;

        let log_level = env_or_default("PICRETE_LOG_LEVEL", "info");
        let json = env_optional("PICRETE_LOG_JSON").map(|value| parse_bool(&value)).unwrap_or(false);
        let prometheus_enabled =
            env_optional("PROMETHEUS_ENABLED").map(|value| parse_bool(&value)).unwrap_or(false);

        let settings = Self {
            runtime: RuntimeSettings { environment, strict_config },
            api: ApiSettings {
                base_url: BaseUrl::parse(base_url)?,
                prefix,
                token,
                timeout_seconds,
                connect_timeout_seconds,
            },
            retry: RetrySettings { max_attempts, base_delay_ms, max_delay_ms },
            timer: TimerSettings { tick_ms, warning_seconds },
            telemetry: TelemetrySettings { log_level, json, prometheus_enabled },
        };

        settings.validate()?;

        Ok(settings)
    }

    pub fn api(&self) -> &ApiSettings {
        &self.api
    }

    pub fn retry(&self) -> &RetrySettings {
        &self.retry
    }

    pub fn timer(&self) -> &TimerSettings {
        &self.timer
    }

    pub fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    pub fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "PICRETE_RETRY_MAX_ATTEMPTS",
                value: String::from("0"),
            });
        }
        if self.retry.max_delay_ms < self.retry.base_delay_ms {
            return Err(ConfigError::InvalidValue {
                field: "PICRETE_RETRY_MAX_DELAY_MS",
                value: self.retry.max_delay_ms.to_string(),
            });
        }
        if self.timer.tick_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "PICRETE_TIMER_TICK_MS",
                value: String::from("0"),
            });
        }
        if self.api.timeout_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "PICRETE_API_TIMEOUT_SECONDS",
                value: String::from("0"),
            });
        }

        if !(self.runtime.strict_config || self.runtime.environment.is_production()) {
            return Ok(());
        }

        if self.api.token.is_none() {
            return Err(ConfigError::MissingSecret("PICRETE_API_TOKEN"));
        }

        Ok(())
    }
}

impl ApiSettings {
    /// Joins the backend origin, the API prefix and `path`.
    pub(crate) fn endpoint(&self, path: &str) -> String {
        format!("{}{}/{}", self.base_url.0, self.prefix, path.trim_start_matches('/'))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url.0
    }
}

impl BaseUrl {
    fn parse(value: String) -> Result<Self, ConfigError> {
        let trimmed = value.trim().trim_end_matches('/');
        let parsed = reqwest::Url::parse(trimmed)
            .map_err(|_| ConfigError::InvalidBaseUrl(value.clone()))?;
        if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
            return Err(ConfigError::InvalidBaseUrl(value));
        }
        Ok(Self(trimmed.to_string()))
    }
}
