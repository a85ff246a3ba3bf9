use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub presentation: PresentationConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone)]
pub struct PresentationConfig {
    /// Capacity of the live transfer event channel (default: 64, floor: 16)
    pub event_channel_capacity: usize,
    /// Seconds to wait for the verifier acknowledgment after a response was sent.
    /// `None` waits until the session ends.
    pub ack_timeout_secs: Option<u64>,
}

impl PresentationConfig {
    pub fn ack_timeout(&self) -> Option<Duration> {
        self.ack_timeout_secs.map(Duration::from_secs)
    }
}

impl Default for PresentationConfig {
    fn default() -> Self {
        Self {
            event_channel_capacity: 64,
            ack_timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl std::str::FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            other => Err(anyhow::anyhow!("unknown log format: {}", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// Fallback filter directive when RUST_LOG is unset
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Json,
            filter: "info".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        Ok(Config {
            presentation: PresentationConfig {
                event_channel_capacity: env::var("PRESENTATION_EVENT_CHANNEL_CAPACITY")
                    .unwrap_or_else(|_| "64".to_string())
                    .parse()?,
                ack_timeout_secs: match env::var("PRESENTATION_ACK_TIMEOUT_SECS") {
                    Ok(value) if !value.trim().is_empty() => Some(value.trim().parse()?),
                    _ => None,
                },
            },
            logging: LoggingConfig {
                format: env::var("LOG_FORMAT")
                    .unwrap_or_else(|_| "json".to_string())
                    .parse()?,
                filter: env::var("LOG_FILTER").unwrap_or_else(|_| "info".to_string()),
            },
        })
    }
}
