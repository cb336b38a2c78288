// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Call-state tracking.
//!
//! Pure state machine: it consumes tagged telephony events and returns the
//! actions the caller should carry out. It owns no I/O, which keeps it
//! testable without an event loop or a bus connection.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

/// A telephony observation, normalized from a signal or an RPC reply entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TelephonyEvent {
    /// The telephony service appeared on the bus.
    ServiceAppeared,
    /// The telephony service left the bus. Treated as a clean reset.
    ServiceVanished,
    /// A call object appeared, from a call-added signal or a call-list reply.
    CallAdded {
        path: String,
        state: Option<String>,
    },
    /// A call object reported a new "State" property value.
    CallState { path: String, state: String },
}

/// Ring-alert side effects requested by the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RingAction {
    Start,
    Stop,
}

/// A call-control command to issue to the telephony service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TelephonyCommand {
    Answer { call: Arc<str> },
    Hangup { call: Arc<str> },
    HoldAndAnswer { modem: Arc<str> },
    SwapCalls { modem: Arc<str> },
}

/// Derive the modem path from a call path by truncating at the separator
/// after the leading one: `/modem1/call1` -> `/modem1`.
pub fn modem_of(call_path: &str) -> Option<&str> {
    if call_path.len() < 2 {
        return None;
    }
    call_path[1..].find('/').map(|i| &call_path[..i + 1])
}

/// Tracks every known call and which of them are active, held or incoming.
///
/// The registry holds the canonical path for each call; the active and held
/// sets and the incoming pointer share that identity rather than owning
/// copies, so membership can never diverge from the registry.
#[derive(Debug, Default)]
pub struct CallTracker {
    calls: HashSet<Arc<str>>,
    active: HashSet<Arc<str>>,
    held: HashSet<Arc<str>>,
    incoming: Option<Arc<str>>,
}

impl CallTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Single dispatch entry point for telephony observations.
    pub fn handle(&mut self, event: TelephonyEvent) -> Vec<RingAction> {
        match event {
            TelephonyEvent::ServiceAppeared => Vec::new(),
            TelephonyEvent::ServiceVanished => {
                debug!("telephony service disappeared");
                self.reset();
                Vec::new()
            }
            TelephonyEvent::CallAdded { path, state } => self.call_added(&path, state.as_deref()),
            TelephonyEvent::CallState { path, state } => self.state_changed(&path, &state),
        }
    }

    /// Multi-function-button policy. Evaluated once per press; strict
    /// priority incoming > active > held > no-op, no other side effects.
    pub fn button_press(&self) -> Vec<TelephonyCommand> {
        if let Some(incoming) = &self.incoming {
            if self.calls.len() == 1 {
                debug!("answer incoming {}", incoming);
                return vec![TelephonyCommand::Answer {
                    call: incoming.clone(),
                }];
            }
            debug!("hold active calls and answer incoming {}", incoming);
            return match modem_of(incoming) {
                Some(modem) => vec![TelephonyCommand::HoldAndAnswer {
                    modem: Arc::from(modem),
                }],
                None => Vec::new(),
            };
        }

        if let Some(active) = self.active.iter().next() {
            debug!("hangup active call {}", active);
            let mut commands = vec![TelephonyCommand::Hangup {
                call: active.clone(),
            }];
            if let Some(held) = self.held.iter().next() {
                if let Some(modem) = modem_of(held) {
                    commands.push(TelephonyCommand::SwapCalls {
                        modem: Arc::from(modem),
                    });
                }
            }
            return commands;
        }

        if let Some(held) = self.held.iter().next() {
            debug!("hangup held call {}", held);
            return vec![TelephonyCommand::Hangup { call: held.clone() }];
        }

        Vec::new()
    }

    /// Drop all call state. Used on telephony-service loss and on transport
    /// teardown; not an error path.
    pub fn reset(&mut self) {
        self.active.clear();
        self.held.clear();
        self.calls.clear();
        self.incoming = None;
    }

    fn call_added(&mut self, path: &str, state: Option<&str>) -> Vec<RingAction> {
        debug!("new call {}: {}", path, state.unwrap_or("<none>"));

        let call = self.canonical(path);

        if matches!(state, Some("incoming") | Some("waiting")) {
            self.incoming = Some(call);
            if self.calls.len() == 1 {
                return vec![RingAction::Start];
            }
        } else {
            self.active.insert(call);
        }
        Vec::new()
    }

    fn state_changed(&mut self, path: &str, state: &str) -> Vec<RingAction> {
        debug!("call {} state changed: {}", path, state);

        match state {
            "active" => {
                if self.incoming.as_deref() == Some(path) {
                    self.incoming = None;
                }
                self.held.remove(path);
                self.active.remove(path);
                if let Some(call) = self.calls.get(path).cloned() {
                    self.active.insert(call);
                }
            }
            "held" => {
                self.active.remove(path);
                if let Some(call) = self.calls.get(path).cloned() {
                    self.held.insert(call);
                }
            }
            "disconnected" => {
                if self.incoming.as_deref() == Some(path) {
                    self.incoming = None;
                }
                self.active.remove(path);
                self.held.remove(path);
                self.calls.remove(path);
            }
            _ => {}
        }

        // Any observed state change ends the ring alert, even one that does
        // not touch the collections.
        vec![RingAction::Stop]
    }

    /// Return the registry entry for `path`, inserting it if unknown, so all
    /// views share one identity.
    fn canonical(&mut self, path: &str) -> Arc<str> {
        match self.calls.get(path) {
            Some(call) => call.clone(),
            None => {
                let call: Arc<str> = Arc::from(path);
                self.calls.insert(call.clone());
                call
            }
        }
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.calls.contains(path)
    }

    pub fn is_active(&self, path: &str) -> bool {
        self.active.contains(path)
    }

    pub fn is_held(&self, path: &str) -> bool {
        self.held.contains(path)
    }

    pub fn incoming(&self) -> Option<&str> {
        self.incoming.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn added(path: &str, state: &str) -> TelephonyEvent {
        TelephonyEvent::CallAdded {
            path: path.into(),
            state: Some(state.into()),
        }
    }

    fn changed(path: &str, state: &str) -> TelephonyEvent {
        TelephonyEvent::CallState {
            path: path.into(),
            state: state.into(),
        }
    }

    #[test]
    fn test_modem_of() {
        assert_eq!(modem_of("/modem1/call1"), Some("/modem1"));
        assert_eq!(modem_of("/a/b/c"), Some("/a"));
        assert_eq!(modem_of("/modem1"), None);
        assert_eq!(modem_of("/"), None);
        assert_eq!(modem_of(""), None);
    }

    #[test]
    fn test_incoming_call_rings_when_only_call() {
        let mut tracker = CallTracker::new();
        let actions = tracker.handle(added("/modem1/call1", "incoming"));
        assert_eq!(actions, vec![RingAction::Start]);
        assert_eq!(tracker.incoming(), Some("/modem1/call1"));
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_waiting_call_does_not_ring_beside_existing_call() {
        let mut tracker = CallTracker::new();
        tracker.handle(added("/modem1/call1", "active"));
        let actions = tracker.handle(added("/modem1/call2", "waiting"));
        assert_eq!(actions, Vec::new());
        assert_eq!(tracker.incoming(), Some("/modem1/call2"));
    }

    #[test]
    fn test_non_incoming_states_count_as_active() {
        let mut tracker = CallTracker::new();
        tracker.handle(added("/modem1/call1", "dialing"));
        assert!(tracker.is_active("/modem1/call1"));
        assert_eq!(tracker.incoming(), None);
    }

    #[test]
    fn test_call_is_never_active_and_held_at_once() {
        let mut tracker = CallTracker::new();
        tracker.handle(added("/modem1/call1", "active"));
        tracker.handle(changed("/modem1/call1", "held"));
        assert!(!tracker.is_active("/modem1/call1"));
        assert!(tracker.is_held("/modem1/call1"));

        tracker.handle(changed("/modem1/call1", "active"));
        assert!(tracker.is_active("/modem1/call1"));
        assert!(!tracker.is_held("/modem1/call1"));
    }

    #[test]
    fn test_repeated_state_signals_are_idempotent() {
        let mut tracker = CallTracker::new();
        tracker.handle(added("/modem1/call1", "active"));
        tracker.handle(changed("/modem1/call1", "active"));
        tracker.handle(changed("/modem1/call1", "active"));
        assert_eq!(tracker.len(), 1);
        assert!(tracker.is_active("/modem1/call1"));
    }

    #[test]
    fn test_active_state_clears_matching_incoming_pointer() {
        let mut tracker = CallTracker::new();
        tracker.handle(added("/modem1/call1", "incoming"));
        let actions = tracker.handle(changed("/modem1/call1", "active"));
        assert_eq!(actions, vec![RingAction::Stop]);
        assert_eq!(tracker.incoming(), None);
        assert!(tracker.is_active("/modem1/call1"));
    }

    #[test]
    fn test_any_state_change_stops_ringing() {
        let mut tracker = CallTracker::new();
        tracker.handle(added("/modem1/call1", "incoming"));
        // "alerting" touches no collection but still ends the alert
        let actions = tracker.handle(changed("/modem1/call1", "alerting"));
        assert_eq!(actions, vec![RingAction::Stop]);
        assert_eq!(tracker.incoming(), Some("/modem1/call1"));
    }

    #[test]
    fn test_disconnected_removes_call_everywhere() {
        let mut tracker = CallTracker::new();
        tracker.handle(added("/modem1/call1", "incoming"));
        tracker.handle(changed("/modem1/call1", "disconnected"));
        assert!(!tracker.contains("/modem1/call1"));
        assert!(!tracker.is_active("/modem1/call1"));
        assert!(!tracker.is_held("/modem1/call1"));
        assert_eq!(tracker.incoming(), None);
    }

    #[test]
    fn test_service_vanishing_resets_everything() {
        let mut tracker = CallTracker::new();
        tracker.handle(added("/modem1/call1", "active"));
        tracker.handle(added("/modem1/call2", "incoming"));
        tracker.handle(changed("/modem1/call1", "held"));

        tracker.handle(TelephonyEvent::ServiceVanished);
        assert!(tracker.is_empty());
        assert_eq!(tracker.incoming(), None);
        assert!(!tracker.is_held("/modem1/call1"));
    }

    #[test]
    fn test_button_answers_sole_incoming_call() {
        let mut tracker = CallTracker::new();
        tracker.handle(added("/modem1/call1", "incoming"));
        assert_eq!(
            tracker.button_press(),
            vec![TelephonyCommand::Answer {
                call: Arc::from("/modem1/call1")
            }]
        );
    }

    #[test]
    fn test_button_holds_and_answers_when_other_calls_exist() {
        let mut tracker = CallTracker::new();
        tracker.handle(added("/modem1/call1", "active"));
        tracker.handle(added("/modem1/call2", "waiting"));
        assert_eq!(
            tracker.button_press(),
            vec![TelephonyCommand::HoldAndAnswer {
                modem: Arc::from("/modem1")
            }]
        );
    }

    #[test]
    fn test_button_hangs_up_active_and_swaps_in_held() {
        let mut tracker = CallTracker::new();
        tracker.handle(added("/modem1/call1", "active"));
        tracker.handle(added("/modem1/call2", "active"));
        tracker.handle(changed("/modem1/call2", "held"));

        let commands = tracker.button_press();
        assert_eq!(
            commands,
            vec![
                TelephonyCommand::Hangup {
                    call: Arc::from("/modem1/call1")
                },
                TelephonyCommand::SwapCalls {
                    modem: Arc::from("/modem1")
                },
            ]
        );
    }

    #[test]
    fn test_button_hangs_up_held_call_last() {
        let mut tracker = CallTracker::new();
        tracker.handle(added("/modem1/call1", "active"));
        tracker.handle(changed("/modem1/call1", "held"));
        assert_eq!(
            tracker.button_press(),
            vec![TelephonyCommand::Hangup {
                call: Arc::from("/modem1/call1")
            }]
        );
    }

    #[test]
    fn test_button_is_a_no_op_without_calls() {
        let tracker = CallTracker::new();
        assert_eq!(tracker.button_press(), Vec::new());
    }

    #[test]
    fn test_state_change_for_unknown_call_changes_nothing() {
        let mut tracker = CallTracker::new();
        let actions = tracker.handle(changed("/modem1/ghost", "active"));
        assert_eq!(actions, vec![RingAction::Stop]);
        assert!(tracker.is_empty());
        assert!(!tracker.is_active("/modem1/ghost"));
    }
}
