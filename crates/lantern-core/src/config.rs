//! Engine configuration
//!
//! All protocol constants and tunables in one place. The defaults are the
//! interoperable values; changing the wire-affecting ones (TTL, text limit)
//! only makes sense across an entire deployment.

use std::time::Duration;

// ----------------------------------------------------------------------------
// Engine Configuration
// ----------------------------------------------------------------------------

/// Configuration for the message engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Hop budget stamped on freshly composed envelopes
    pub default_ttl: u8,
    /// Maximum message length in Unicode scalar values
    pub max_text_len: usize,
    /// Base delay for send retries; attempt n waits `base * 2^n`
    pub retry_base: Duration,
    /// Retry attempts before a message is marked failed
    pub max_retries: u32,
    /// Duplicate-cache entry lifetime
    pub dedup_ttl: Duration,
    /// Duplicate-cache soft capacity; oldest entries evicted beyond this
    pub dedup_capacity: usize,
    /// Interval of the internal tick driving retries and cache sweeps
    pub tick_interval: Duration,
    /// How often a scan request is re-issued to the transport
    pub scan_interval: Duration,
    /// Upper bound on a transport connection attempt
    pub connect_timeout: Duration,
    /// Capacity of the engine event channel toward the application
    pub event_channel_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_ttl: 10,
            max_text_len: 500,
            retry_base: Duration::from_secs(1),
            max_retries: 3,
            dedup_ttl: Duration::from_secs(300),
            dedup_capacity: 1_000,
            tick_interval: Duration::from_secs(1),
            scan_interval: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(3),
            event_channel_capacity: 1_024,
        }
    }
}

impl EngineConfig {
    /// Number of ticks between scan requests, at least one
    pub fn scan_interval_ticks(&self) -> u64 {
        let ticks = self.scan_interval.as_millis() / self.tick_interval.as_millis().max(1);
        (ticks as u64).max(1)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_matches_protocol_constants() {
        let config = EngineConfig::default();
        assert_eq!(config.default_ttl, 10);
        assert_eq!(config.max_text_len, 500);
        assert_eq!(config.retry_base, Duration::from_secs(1));
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.dedup_ttl, Duration::from_secs(300));
        assert_eq!(config.dedup_capacity, 1_000);
    }

    #[test]
    fn test_scan_interval_ticks() {
        let config = EngineConfig::default();
        assert_eq!(config.scan_interval_ticks(), 5);

        let fast = EngineConfig {
            scan_interval: Duration::from_millis(100),
            ..EngineConfig::default()
        };
        assert_eq!(fast.scan_interval_ticks(), 1);
    }
}
