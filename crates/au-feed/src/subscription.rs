//! Desired symbol subscriptions.
//!
//! The registry is the client's source of truth for what the server should be
//! streaming. It survives disconnects; only an explicit consumer request
//! removes symbols. Subscribe frames always carry the **full** desired set so
//! that a lost earlier frame cannot leave client and server out of step.

use std::collections::BTreeSet;

use au_core::types::ControlFrame;
use tracing::debug;

#[derive(Debug, Default, Clone)]
pub struct SubscriptionRegistry {
    desired: BTreeSet<String>,
}

impl SubscriptionRegistry {
    pub fn new<I, S>(initial: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { desired: initial.into_iter().map(Into::into).collect() }
    }

    /// Add symbols. Returns the frame to send now if `connected`, carrying the
    /// full updated set; otherwise the change waits for the next connect.
    pub fn subscribe<S: AsRef<str>>(&mut self, symbols: &[S], connected: bool) -> Option<ControlFrame> {
        for s in symbols {
            self.desired.insert(s.as_ref().to_string());
        }
        if connected {
            self.resync_frame()
        } else {
            debug!("[subscriptions] not connected, {} symbol(s) queued for next connect", self.desired.len());
            None
        }
    }

    /// Remove symbols. Returns an unsubscribe frame for the symbols actually
    /// removed, only if `connected`.
    pub fn unsubscribe<S: AsRef<str>>(&mut self, symbols: &[S], connected: bool) -> Option<ControlFrame> {
        let removed: Vec<String> = symbols
            .iter()
            .map(AsRef::as_ref)
            .filter(|s| self.desired.remove(*s))
            .map(str::to_string)
            .collect();
        (connected && !removed.is_empty()).then(|| ControlFrame::unsubscribe(&removed))
    }

    /// Remove every symbol; same frame rule as [`unsubscribe`](Self::unsubscribe).
    pub fn clear(&mut self, connected: bool) -> Option<ControlFrame> {
        let removed: Vec<String> = std::mem::take(&mut self.desired).into_iter().collect();
        (connected && !removed.is_empty()).then(|| ControlFrame::unsubscribe(&removed))
    }

    /// The subscribe frame sent on every transition into `Connected`.
    /// `None` when nothing is desired.
    pub fn resync_frame(&self) -> Option<ControlFrame> {
        if self.desired.is_empty() {
            return None;
        }
        let symbols: Vec<&str> = self.desired.iter().map(String::as_str).collect();
        Some(ControlFrame::subscribe(&symbols))
    }

    pub fn symbols(&self) -> Vec<String> {
        self.desired.iter().cloned().collect()
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.desired.contains(symbol)
    }

    pub fn len(&self) -> usize {
        self.desired.len()
    }

    pub fn is_empty(&self) -> bool {
        self.desired.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use au_core::types::ControlKind;

    #[test]
    fn subscribe_while_connected_sends_full_set() {
        let mut reg = SubscriptionRegistry::new(["AU9999"]);
        let frame = reg.subscribe(&["XAU"], true).unwrap();
        assert_eq!(frame.kind, ControlKind::Subscribe);
        assert_eq!(frame.symbols(), vec!["AU9999", "XAU"]);
    }

    #[test]
    fn subscribe_while_disconnected_is_recorded() {
        let mut reg = SubscriptionRegistry::default();
        assert!(reg.subscribe(&["XAU"], false).is_none());
        assert!(reg.contains("XAU"));
        assert_eq!(reg.resync_frame().unwrap().symbols(), vec!["XAU"]);
    }

    #[test]
    fn unsubscribe_sends_only_removed_symbols() {
        let mut reg = SubscriptionRegistry::new(["AU9999", "XAU"]);
        let frame = reg.unsubscribe(&["XAU", "NOPE"], true).unwrap();
        assert_eq!(frame.kind, ControlKind::Unsubscribe);
        assert_eq!(frame.symbols(), vec!["XAU"]);
        assert_eq!(reg.symbols(), vec!["AU9999"]);
    }

    #[test]
    fn unsubscribe_while_disconnected_sends_nothing() {
        let mut reg = SubscriptionRegistry::new(["XAU"]);
        assert!(reg.unsubscribe(&["XAU"], false).is_none());
        assert!(reg.is_empty());
    }

    #[test]
    fn duplicates_collapse() {
        let mut reg = SubscriptionRegistry::default();
        reg.subscribe(&["XAU", "XAU"], false);
        reg.subscribe(&["XAU"], false);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn empty_registry_has_no_resync_frame() {
        let mut reg = SubscriptionRegistry::new(["XAU"]);
        assert!(reg.clear(true).is_some());
        assert!(reg.resync_frame().is_none());
    }
}
