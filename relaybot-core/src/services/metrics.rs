use dashmap::DashMap;
use tracing::trace;
use relaybot_common::traits::sink_traits::MetricsSink;

pub const COMMAND_SUCCESS: &str = "command.success";
pub const COMMAND_FAIL: &str = "command.fail";
pub const COMMAND_ERROR: &str = "command.error";
pub const COMMAND_FILTERED: &str = "command.filtered";

/// Process-local counters keyed by `(metric, command)`.
#[derive(Debug, Default)]
pub struct CounterMetrics {
    counters: DashMap<(String, String), u64>,
}

impl CounterMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str, command: &str) -> u64 {
        self.counters
            .get(&(name.to_string(), command.to_string()))
            .map(|v| *v)
            .unwrap_or(0)
    }

    /// Sum of `name` over all commands.
    pub fn total(&self, name: &str) -> u64 {
        self.counters
            .iter()
            .filter(|e| e.key().0 == name)
            .map(|e| *e.value())
            .sum()
    }
}

impl MetricsSink for CounterMetrics {
    fn increment(&self, name: &str, command: &str) {
        *self.counters.entry((name.to_string(), command.to_string())).or_insert(0) += 1;
        trace!(metric = name, command, "counter incremented");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_by_command() {
        let m = CounterMetrics::new();
        m.increment(COMMAND_SUCCESS, "ping");
        m.increment(COMMAND_SUCCESS, "ping");
        m.increment(COMMAND_SUCCESS, "echo");
        m.increment(COMMAND_ERROR, "ping");

        assert_eq!(m.get(COMMAND_SUCCESS, "ping"), 2);
        assert_eq!(m.total(COMMAND_SUCCESS), 3);
        assert_eq!(m.get(COMMAND_FILTERED, "ping"), 0);
    }
}
