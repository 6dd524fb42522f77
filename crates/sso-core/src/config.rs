//! Ticket policy and maintenance configuration.

use serde::{Deserialize, Serialize};

/// Configuration for ticket lifetimes and registry maintenance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TicketConfig {
    /// Ticket-granting ticket settings (also applied to proxy-granting tickets).
    #[serde(default)]
    pub tgt: TicketGrantingConfig,
    /// Service ticket settings.
    #[serde(default)]
    pub st: ServiceTicketConfig,
    /// Proxy ticket settings.
    #[serde(default)]
    pub pt: ProxyTicketConfig,
    /// Background reaper settings.
    #[serde(default)]
    pub reaper: ReaperConfig,
}

/// Lifetime settings for ticket-granting and proxy-granting tickets.
///
/// ## NIST 800-63B Session Management
///
/// Sessions are bounded by both an idle timeout and an absolute maximum
/// lifetime; remember-me sessions trade the idle bound for a longer
/// fixed lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketGrantingConfig {
    /// Maximum idle time before the ticket expires, in seconds.
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: i64,
    /// Hard upper bound on the ticket lifetime, in seconds.
    #[serde(default = "default_max_lifetime")]
    pub max_lifetime_secs: i64,
    /// Fixed lifetime for remember-me sessions, in seconds.
    #[serde(default = "default_remember_me_lifetime")]
    pub remember_me_lifetime_secs: i64,
}

/// Lifetime settings for service tickets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceTicketConfig {
    /// Time to live from creation, in seconds.
    #[serde(default = "default_grant_ttl")]
    pub time_to_live_secs: i64,
    /// Number of times the ticket may be used before it expires.
    #[serde(default = "default_max_uses")]
    pub max_uses: u64,
}

/// Lifetime settings for proxy tickets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyTicketConfig {
    /// Time to live from creation, in seconds.
    #[serde(default = "default_grant_ttl")]
    pub time_to_live_secs: i64,
    /// Number of times the ticket may be used before it expires.
    #[serde(default = "default_max_uses")]
    pub max_uses: u64,
}

/// Schedule for the background expired-ticket reaper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReaperConfig {
    /// Whether the reaper runs at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Interval between sweep passes, in seconds.
    #[serde(default = "default_reaper_interval")]
    pub interval_secs: u64,
    /// Delay before the first sweep after startup, in seconds.
    #[serde(default = "default_reaper_start_delay")]
    pub start_delay_secs: u64,
    /// How long a pass waits for the cluster sweep lock, in milliseconds.
    #[serde(default = "default_lock_wait_timeout")]
    pub lock_wait_timeout_ms: u64,
}

impl Default for TicketGrantingConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout(),
            max_lifetime_secs: default_max_lifetime(),
            remember_me_lifetime_secs: default_remember_me_lifetime(),
        }
    }
}

impl Default for ServiceTicketConfig {
    fn default() -> Self {
        Self {
            time_to_live_secs: default_grant_ttl(),
            max_uses: default_max_uses(),
        }
    }
}

impl Default for ProxyTicketConfig {
    fn default() -> Self {
        Self {
            time_to_live_secs: default_grant_ttl(),
            max_uses: default_max_uses(),
        }
    }
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_reaper_interval(),
            start_delay_secs: default_reaper_start_delay(),
            lock_wait_timeout_ms: default_lock_wait_timeout(),
        }
    }
}

impl TicketConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the ticket-granting ticket idle timeout.
    #[must_use]
    pub const fn tgt_idle_timeout_secs(mut self, secs: i64) -> Self {
        self.tgt.idle_timeout_secs = secs;
        self
    }

    /// Sets the ticket-granting ticket maximum lifetime.
    #[must_use]
    pub const fn tgt_max_lifetime_secs(mut self, secs: i64) -> Self {
        self.tgt.max_lifetime_secs = secs;
        self
    }

    /// Sets the service ticket time to live.
    #[must_use]
    pub const fn st_time_to_live_secs(mut self, secs: i64) -> Self {
        self.st.time_to_live_secs = secs;
        self
    }

    /// Sets the reaper sweep interval.
    #[must_use]
    pub const fn reaper_interval_secs(mut self, secs: u64) -> Self {
        self.reaper.interval_secs = secs;
        self
    }
}

const fn default_idle_timeout() -> i64 {
    1800
}

const fn default_max_lifetime() -> i64 {
    36_000
}

const fn default_remember_me_lifetime() -> i64 {
    1_209_600
}

const fn default_grant_ttl() -> i64 {
    10
}

const fn default_max_uses() -> u64 {
    1
}

const fn default_true() -> bool {
    true
}

const fn default_reaper_interval() -> u64 {
    120
}

const fn default_reaper_start_delay() -> u64 {
    20
}

const fn default_lock_wait_timeout() -> u64 {
    2000
}
