//! Integration tests for the call-control flow.

use std::sync::Arc;

use hsp_gateway::telephony::{
    modem_of, CallTracker, RingAction, TelephonyCommand, TelephonyEvent,
};

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
fn test_fresh_connection_with_one_incoming_call_rings() {
    // A new connection triggers a refresh; the call list for /modem1 reports
    // one incoming call. The headset must start ringing immediately.
    let mut tracker = CallTracker::new();

    let actions = tracker.handle(added("/modem1/call1", "incoming"));

    assert_eq!(actions, vec![RingAction::Start]);
    assert_eq!(tracker.len(), 1);
    assert_eq!(tracker.incoming(), Some("/modem1/call1"));
}

#[test]
fn test_button_answers_then_ring_stops_on_active_signal() {
    let mut tracker = CallTracker::new();
    tracker.handle(added("/modem1/call1", "incoming"));

    // Button press while the incoming call is the only known call: a plain
    // answer request for that call.
    assert_eq!(
        tracker.button_press(),
        vec![TelephonyCommand::Answer {
            call: Arc::from("/modem1/call1")
        }]
    );

    // The telephony service confirms with a state change; the ring alert
    // ends with it.
    let actions = tracker.handle(changed("/modem1/call1", "active"));
    assert_eq!(actions, vec![RingAction::Stop]);
    assert_eq!(tracker.incoming(), None);
    assert!(tracker.is_active("/modem1/call1"));
}

#[test]
fn test_disconnect_clears_call_and_incoming_pointer() {
    let mut tracker = CallTracker::new();
    tracker.handle(added("/modem1/call1", "incoming"));

    tracker.handle(changed("/modem1/call1", "disconnected"));

    assert!(tracker.is_empty());
    assert_eq!(tracker.incoming(), None);
}

#[test]
fn test_service_loss_clears_everything() {
    let mut tracker = CallTracker::new();
    tracker.handle(added("/modem1/call1", "active"));
    tracker.handle(changed("/modem1/call1", "held"));
    tracker.handle(added("/modem1/call2", "waiting"));

    tracker.handle(TelephonyEvent::ServiceVanished);

    assert!(tracker.is_empty());
    assert_eq!(tracker.incoming(), None);
    assert_eq!(tracker.button_press(), Vec::new());
}

#[test]
fn test_second_call_waits_and_is_answered_with_hold() {
    let mut tracker = CallTracker::new();
    tracker.handle(added("/modem1/call1", "active"));

    // A waiting call must not ring over the ongoing one.
    let actions = tracker.handle(added("/modem1/call2", "waiting"));
    assert_eq!(actions, Vec::new());

    // The button now holds the ongoing call and answers the waiting one,
    // addressed to the modem.
    assert_eq!(
        tracker.button_press(),
        vec![TelephonyCommand::HoldAndAnswer {
            modem: Arc::from("/modem1")
        }]
    );
}

#[test]
fn test_full_swap_cycle() {
    let mut tracker = CallTracker::new();
    tracker.handle(added("/modem1/call1", "active"));
    tracker.handle(added("/modem1/call2", "incoming"));
    tracker.handle(changed("/modem1/call2", "active"));
    tracker.handle(changed("/modem1/call1", "held"));

    // Hang up the current call and swap the held one back in.
    let commands = tracker.button_press();
    assert_eq!(
        commands,
        vec![
            TelephonyCommand::Hangup {
                call: Arc::from("/modem1/call2")
            },
            TelephonyCommand::SwapCalls {
                modem: Arc::from("/modem1")
            },
        ]
    );

    // After both calls end, the button does nothing.
    tracker.handle(changed("/modem1/call2", "disconnected"));
    tracker.handle(changed("/modem1/call1", "disconnected"));
    assert_eq!(tracker.button_press(), Vec::new());
}

#[test]
fn test_refresh_entries_and_signals_share_identity() {
    // Entries learned from a list reply and later signals for the same path
    // must land on the same registry entry, never a duplicate.
    let mut tracker = CallTracker::new();
    tracker.handle(added("/modem1/call1", "active"));
    tracker.handle(added("/modem1/call1", "active"));
    tracker.handle(changed("/modem1/call1", "held"));
    tracker.handle(changed("/modem1/call1", "active"));

    assert_eq!(tracker.len(), 1);
    assert!(tracker.is_active("/modem1/call1"));
    assert!(!tracker.is_held("/modem1/call1"));
}

#[test]
fn test_modem_derivation_for_commands() {
    assert_eq!(modem_of("/ril_0/voicecall01"), Some("/ril_0"));
    assert_eq!(modem_of("/ril_0"), None);
}
