use std::time::Duration;

use log::*;

const DEFAULT_RETRY_INTERVAL_SECONDS: u64 = 10;
const DEFAULT_ALARM_THRESHOLD: u32 = 30;
const DEFAULT_PUBLISH_TIMEOUT_SECONDS: u64 = 5;
pub const DEFAULT_NOTIFY_TOPIC: &str = "order.status_changed";
pub const DEFAULT_ALARM_CHANNEL: &str = "pg:alarms";

#[derive(Debug, Clone)]
pub struct NotificationConfig {
    /// How often the queue is retried while the message bus is failing.
    pub retry_interval: Duration,
    /// Raise an operational alarm each time this many consecutive retry ticks end with undelivered notifications.
    /// Zero disables alarms.
    pub alarm_threshold: u32,
    pub topic: String,
    pub alarm_channel: String,
    /// The longest a single publish may wait for a broker acknowledgement.
    pub publish_timeout: Duration,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            retry_interval: Duration::from_secs(DEFAULT_RETRY_INTERVAL_SECONDS),
            alarm_threshold: DEFAULT_ALARM_THRESHOLD,
            topic: DEFAULT_NOTIFY_TOPIC.to_string(),
            alarm_channel: DEFAULT_ALARM_CHANNEL.to_string(),
            publish_timeout: Duration::from_secs(DEFAULT_PUBLISH_TIMEOUT_SECONDS),
        }
    }
}

fn env_number<T: std::str::FromStr>(key: &str) -> Option<T>
where T::Err: std::fmt::Display {
    let value = std::env::var(key).ok()?;
    value.parse::<T>().map_err(|e| warn!("🪛️ Invalid value for {key} ({value}): {e}. Using the default instead.")).ok()
}

impl NotificationConfig {
    pub fn from_env_or_defaults() -> Self {
        let defaults = Self::default();
        let retry_interval =
            env_number::<u64>("PG_NOTIFY_RETRY_INTERVAL").map(Duration::from_secs).unwrap_or(defaults.retry_interval);
        if retry_interval.is_zero() {
            error!("🪛️ PG_NOTIFY_RETRY_INTERVAL cannot be zero. Using the default instead.");
        }
        let retry_interval = if retry_interval.is_zero() { defaults.retry_interval } else { retry_interval };
        let alarm_threshold = env_number::<u32>("PG_NOTIFY_ALARM_THRESHOLD").unwrap_or(defaults.alarm_threshold);
        let topic = std::env::var("PG_NOTIFY_TOPIC").ok().filter(|s| !s.is_empty()).unwrap_or(defaults.topic);
        let alarm_channel =
            std::env::var("PG_NOTIFY_ALARM_CHANNEL").ok().filter(|s| !s.is_empty()).unwrap_or(defaults.alarm_channel);
        let publish_timeout = env_number::<u64>("PG_BUS_PUBLISH_TIMEOUT")
            .map(Duration::from_secs)
            .unwrap_or(defaults.publish_timeout);
        Self { retry_interval, alarm_threshold, topic, alarm_channel, publish_timeout }
    }
}
