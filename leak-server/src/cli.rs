use std::net::SocketAddr;
use std::num::NonZeroUsize;
use std::time::Duration;

use clap::ArgAction;
use clap::Parser;
use humantime::parse_duration;
use leak_limit::ConfigError;
use leak_limit::LimiterConfig;

/// Settings for one server process.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    pub bind: SocketAddr,
    pub limiter: LimiterConfig,
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Round robin leaky bucket admission service", long_about = None)]
pub struct Cli {
    /// Address to listen on.
    #[arg(long, env = "LEAK_BIND", default_value = "127.0.0.1:8000")]
    pub bind: SocketAddr,

    /// Number of channels, one leaky bucket each.
    #[arg(long, env = "LEAK_CHANNELS", default_value = "4")]
    pub channels: NonZeroUsize,

    /// Maximum occupancy of each channel.
    #[arg(long, env = "LEAK_CAPACITY", default_value_t = 500.0, allow_negative_numbers = true)]
    pub capacity: f64,

    /// Units drained per second from each channel.
    #[arg(long, env = "LEAK_RATE", default_value_t = 250.0, allow_negative_numbers = true)]
    pub leak_rate: f64,

    /// Period of the background leak (e.g. "1s", "250ms").
    #[arg(long, env = "LEAK_INTERVAL", value_parser = parse_duration, default_value = "1s")]
    pub leak_interval: Duration,

    /// Period between status feed messages.
    #[arg(long, env = "LEAK_STATUS_INTERVAL", value_parser = parse_duration, default_value = "1s")]
    pub status_interval: Duration,

    /// Explicit log filter (e.g. "leak_server=debug,leak_limit=debug").
    #[arg(long, env = "LEAK_LOG_FILTER", value_name = "FILTER")]
    pub log_filter: Option<String>,

    /// Emit JSON logs (requires `--features json-logs`).
    #[arg(long, action = ArgAction::SetTrue)]
    pub json_logs: bool,
}

impl Cli {
    /// Build and validate the service settings.
    pub fn service_config(&self) -> Result<ServiceConfig, ConfigError> {
        let limiter = LimiterConfig {
            channels: self.channels,
            capacity: self.capacity,
            leak_rate: self.leak_rate,
            leak_interval: self.leak_interval,
            status_interval: self.status_interval,
        };
        limiter.validate()?;

        Ok(ServiceConfig {
            bind: self.bind,
            limiter,
        })
    }
}
