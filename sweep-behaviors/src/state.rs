use serde::Serialize;
use std::collections::BTreeMap;

/// Named counters a behavior accumulates while it runs ("items", "posts",
/// "comments", ...). Shared with every progress value it emits.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct BehaviorState {
    counters: BTreeMap<String, u64>,
}

impl BehaviorState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one to `name`, returning the new value.
    pub fn incr(&mut self, name: &str) -> u64 {
        let slot = self.counters.entry(name.to_string()).or_insert(0);
        *slot += 1;
        *slot
    }

    pub fn get(&self, name: &str) -> u64 {
        self.counters.get(name).copied().unwrap_or(0)
    }

    pub fn counters(&self) -> &BTreeMap<String, u64> {
        &self.counters
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero_and_increment() {
        let mut state = BehaviorState::new();
        assert_eq!(state.get("items"), 0);
        assert_eq!(state.incr("items"), 1);
        assert_eq!(state.incr("items"), 2);
        assert_eq!(state.get("items"), 2);
    }

    #[test]
    fn serializes_as_a_flat_map() {
        let mut state = BehaviorState::new();
        state.incr("posts");
        state.incr("comments");
        state.incr("comments");
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json, serde_json::json!({ "comments": 2, "posts": 1 }));
    }
}
