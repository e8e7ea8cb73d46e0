// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Update listener surface for the data bus.
//!
//! The bus dispatches channel updates from however many threads it uses;
//! implementations must be cheap, non-blocking, and thread-safe.

/// Callback surface the data bus invokes once per observed channel
/// update.
///
/// `PersistenceService` implements this; a real bus integration holds the
/// service as `Arc<dyn BusListener>` and calls it on every value change.
pub trait BusListener: Send + Sync {
    /// Called when a channel's value changes.
    ///
    /// `config_channel` marks updates originating from configuration
    /// channels, which are never persisted. `value` is `None` when the
    /// channel has become empty. Both cases are rejected silently; they
    /// are not errors.
    fn on_update(&self, channel: &str, config_channel: bool, value: Option<&serde_json::Value>);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct CountingListener {
        calls: AtomicUsize,
    }

    impl BusListener for CountingListener {
        fn on_update(
            &self,
            _channel: &str,
            _config_channel: bool,
            _value: Option<&serde_json::Value>,
        ) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_listener_is_object_safe() {
        let counting = Arc::new(CountingListener::default());
        let listener: Arc<dyn BusListener> = Arc::clone(&counting) as Arc<dyn BusListener>;
        let value = serde_json::json!(1);

        listener.on_update("ess0/ActivePower", false, Some(&value));
        listener.on_update("ess0/ActivePower", false, None);

        assert_eq!(counting.calls.load(Ordering::SeqCst), 2);
    }
}
