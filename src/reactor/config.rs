const DEFAULT_REACTOR_NAME: &str = "minitimer";

/// What the tokio driver does when a callback returns an error.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ErrorPolicy {
    /// Log the failure and keep serving other registrations.
    #[default]
    Log,
    /// Stop the driver and return the failure from [`Driver::run`](super::Driver::run).
    Stop,
}

#[derive(Debug, Clone)]
pub struct ReactorConfig {
    /// Shows up as the `reactor` field of every log record.
    pub name: String,
    pub error_policy: ErrorPolicy,
}

impl Default for ReactorConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_REACTOR_NAME.to_string(),
            error_policy: ErrorPolicy::default(),
        }
    }
}

impl ReactorConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_error_policy(mut self, error_policy: ErrorPolicy) -> Self {
        self.error_policy = error_policy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ReactorConfig::default();
        assert_eq!(config.name, "minitimer");
        assert_eq!(config.error_policy, ErrorPolicy::Log);
    }

    #[test]
    fn test_builder_overrides() {
        let config = ReactorConfig::default()
            .with_name("io-loop")
            .with_error_policy(ErrorPolicy::Stop);
        assert_eq!(config.name, "io-loop");
        assert_eq!(config.error_policy, ErrorPolicy::Stop);
    }
}
