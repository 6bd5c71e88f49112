//! Engine configuration.

use serde::{Deserialize, Serialize};

/// Tunable engine parameters with serde-friendly defaults.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Auto-context skeleton budget for a fresh context (0 disables).
    pub auto_context_budget: usize,
    /// Concurrent context-mutation tasks.
    pub context_workers: usize,
    /// Concurrent background tasks.
    pub background_workers: usize,
    /// Broadcast channel capacity for engine events.
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            auto_context_budget: 10,
            context_workers: 2,
            background_workers: 12,
            event_capacity: 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.auto_context_budget, 10);
        assert_eq!(config.context_workers, 2);
        assert_eq!(config.background_workers, 12);
        assert_eq!(config.event_capacity, 1024);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: EngineConfig = serde_json::from_str(r#"{"auto_context_budget": 3}"#).unwrap();
        assert_eq!(config.auto_context_budget, 3);
        assert_eq!(config.context_workers, 2);
    }
}
