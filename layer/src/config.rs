//! Runtime configuration read from the process environment.

use std::sync::LazyLock;
use std::time::Duration;

/// Default capacity of each handle table.
pub const DEFAULT_REGISTRY_CAPACITY: usize = 16384;
/// Smallest handle table the layer will build.
pub const MIN_REGISTRY_CAPACITY: usize = 64;
const MAX_REGISTRY_CAPACITY: usize = 1 << 22;

/// Default fence wait before a warning is logged.
pub const DEFAULT_FENCE_TIMEOUT: Duration = Duration::from_secs(10);

/// Layer configuration.
///
/// Built once per process by [`LayerConfig::global`]; tests construct their
/// own with [`LayerConfig::new`] and the `with_*` setters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerConfig {
    /// `env_logger` filter string.
    pub log_filter: String,
    /// Pass every call straight through without augmentation.
    pub disabled: bool,
    /// Use `VK_KHR_push_descriptor` when the device supports it.
    pub push_descriptors: bool,
    /// Slot count of each handle table (power of two).
    pub registry_capacity: usize,
    /// Timeout for fence waits.
    pub fence_timeout: Duration,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            log_filter: "info".to_string(),
            disabled: false,
            push_descriptors: true,
            registry_capacity: DEFAULT_REGISTRY_CAPACITY,
            fence_timeout: DEFAULT_FENCE_TIMEOUT,
        }
    }
}

static GLOBAL: LazyLock<LayerConfig> = LazyLock::new(LayerConfig::from_env);

impl LayerConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide configuration, read from the environment on first use.
    pub fn global() -> &'static LayerConfig {
        &GLOBAL
    }

    /// Read the configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(filter) = lookup("REDLILIUM_LAYER_LOG").or_else(|| lookup("RUST_LOG")) {
            config.log_filter = filter;
        }
        if let Some(value) = lookup("DISABLE_REDLILIUM_LAYER") {
            config.disabled = parse_flag(&value).unwrap_or(!value.is_empty());
        }
        if let Some(flag) = lookup("REDLILIUM_LAYER_PUSH_DESCRIPTORS").and_then(|v| parse_flag(&v)) {
            config.push_descriptors = flag;
        }
        if let Some(capacity) =
            lookup("REDLILIUM_LAYER_REGISTRY_CAPACITY").and_then(|v| v.trim().parse::<usize>().ok())
        {
            config = config.with_registry_capacity(capacity);
        }
        if let Some(ms) =
            lookup("REDLILIUM_LAYER_FENCE_TIMEOUT_MS").and_then(|v| v.trim().parse::<u64>().ok())
        {
            config.fence_timeout = Duration::from_millis(ms);
        }

        config
    }

    /// Set the log filter.
    pub fn with_log_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = filter.into();
        self
    }

    /// Enable or disable pass-through mode.
    pub fn with_disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    /// Allow or forbid push descriptors.
    pub fn with_push_descriptors(mut self, enabled: bool) -> Self {
        self.push_descriptors = enabled;
        self
    }

    /// Set the handle table capacity, rounded up to a power of two.
    pub fn with_registry_capacity(mut self, capacity: usize) -> Self {
        self.registry_capacity = capacity
            .clamp(MIN_REGISTRY_CAPACITY, MAX_REGISTRY_CAPACITY)
            .next_power_of_two();
        self
    }

    /// Set the fence wait timeout.
    pub fn with_fence_timeout(mut self, timeout: Duration) -> Self {
        self.fence_timeout = timeout;
        self
    }

    /// Fence timeout in nanoseconds, as the native wait expects.
    pub fn fence_timeout_ns(&self) -> u64 {
        u64::try_from(self.fence_timeout.as_nanos()).unwrap_or(u64::MAX)
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_environment() {
        let config = LayerConfig::from_lookup(|_| None);
        assert_eq!(config, LayerConfig::default());
        assert_eq!(config.registry_capacity, DEFAULT_REGISTRY_CAPACITY);
        assert!(config.push_descriptors);
    }

    #[test]
    fn test_environment_overrides() {
        let config = LayerConfig::from_lookup(lookup_from(&[
            ("REDLILIUM_LAYER_LOG", "debug"),
            ("DISABLE_REDLILIUM_LAYER", "1"),
            ("REDLILIUM_LAYER_PUSH_DESCRIPTORS", "off"),
            ("REDLILIUM_LAYER_FENCE_TIMEOUT_MS", "250"),
        ]));
        assert_eq!(config.log_filter, "debug");
        assert!(config.disabled);
        assert!(!config.push_descriptors);
        assert_eq!(config.fence_timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_layer_log_wins_over_rust_log() {
        let config = LayerConfig::from_lookup(lookup_from(&[
            ("RUST_LOG", "warn"),
            ("REDLILIUM_LAYER_LOG", "trace"),
        ]));
        assert_eq!(config.log_filter, "trace");
    }

    #[test]
    fn test_registry_capacity_is_clamped_to_power_of_two() {
        let config = LayerConfig::from_lookup(lookup_from(&[(
            "REDLILIUM_LAYER_REGISTRY_CAPACITY",
            "1000",
        )]));
        assert_eq!(config.registry_capacity, 1024);

        assert_eq!(
            LayerConfig::new().with_registry_capacity(3).registry_capacity,
            MIN_REGISTRY_CAPACITY
        );
    }

    #[test]
    fn test_garbage_values_are_ignored() {
        let config = LayerConfig::from_lookup(lookup_from(&[
            ("REDLILIUM_LAYER_REGISTRY_CAPACITY", "lots"),
            ("REDLILIUM_LAYER_PUSH_DESCRIPTORS", "maybe"),
        ]));
        assert_eq!(config.registry_capacity, DEFAULT_REGISTRY_CAPACITY);
        assert!(config.push_descriptors);
    }
}
