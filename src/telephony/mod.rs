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

//! oFono telephony IPC: proxies, signal subscription and payload parsing.
//!
//! Everything stateful lives in [`calls`]; this module turns bus messages
//! into [`TelephonyEvent`] values and call commands into bus calls.

pub mod calls;

pub use calls::{modem_of, CallTracker, RingAction, TelephonyCommand, TelephonyEvent};

use std::collections::HashMap;

use futures::StreamExt;
use tracing::{debug, error};
use zbus::message::Type as MessageType;
use zbus::zvariant::{OwnedObjectPath, OwnedValue};
use zbus::{MatchRule, Message, MessageStream};

pub const OFONO_SERVICE: &str = "org.ofono";
const DBUS_SERVICE: &str = "org.freedesktop.DBus";
const VOICECALL_INTERFACE: &str = "org.ofono.VoiceCall";
const VOICECALL_MANAGER_INTERFACE: &str = "org.ofono.VoiceCallManager";

/// Object path plus properties, the shape of modem- and call-list entries.
pub type PathProperties = (OwnedObjectPath, HashMap<String, OwnedValue>);

#[zbus::proxy(
    interface = "org.ofono.Manager",
    default_service = "org.ofono",
    default_path = "/",
    gen_blocking = false
)]
pub trait Manager {
    fn get_modems(&self) -> zbus::Result<Vec<PathProperties>>;
}

#[zbus::proxy(
    interface = "org.ofono.VoiceCallManager",
    default_service = "org.ofono",
    gen_blocking = false
)]
pub trait VoiceCallManager {
    fn get_calls(&self) -> zbus::Result<Vec<PathProperties>>;
    fn hold_and_answer(&self) -> zbus::Result<()>;
    fn swap_calls(&self) -> zbus::Result<()>;
}

#[zbus::proxy(
    interface = "org.ofono.VoiceCall",
    default_service = "org.ofono",
    gen_blocking = false
)]
pub trait VoiceCall {
    fn answer(&self) -> zbus::Result<()>;
    fn hangup(&self) -> zbus::Result<()>;
}

/// Issue one call-control command, returning the operation name for the log
/// line alongside the result.
pub async fn execute(
    conn: &zbus::Connection,
    command: TelephonyCommand,
) -> (&'static str, zbus::Result<()>) {
    match command {
        TelephonyCommand::Answer { call } => ("Answer", voice_call(conn, &call, false).await),
        TelephonyCommand::Hangup { call } => ("Hangup", voice_call(conn, &call, true).await),
        TelephonyCommand::HoldAndAnswer { modem } => (
            "HoldAndAnswer",
            call_manager(conn, &modem, false).await,
        ),
        TelephonyCommand::SwapCalls { modem } => ("SwapCalls", call_manager(conn, &modem, true).await),
    }
}

async fn voice_call(conn: &zbus::Connection, call: &str, hangup: bool) -> zbus::Result<()> {
    let proxy = VoiceCallProxy::builder(conn)
        .path(call.to_string())?
        .build()
        .await?;
    if hangup {
        proxy.hangup().await
    } else {
        proxy.answer().await
    }
}

async fn call_manager(conn: &zbus::Connection, modem: &str, swap: bool) -> zbus::Result<()> {
    let proxy = VoiceCallManagerProxy::builder(conn)
        .path(modem.to_string())?
        .build()
        .await?;
    if swap {
        proxy.swap_calls().await
    } else {
        proxy.hold_and_answer().await
    }
}

/// Pull the "State" string out of a property dictionary.
pub fn call_state(properties: &HashMap<String, OwnedValue>) -> Option<String> {
    properties
        .get("State")
        .and_then(|value| value.downcast_ref::<&str>().ok())
        .map(str::to_string)
}

/// The three signal sources the backend watches, merged into one stream of
/// [`TelephonyEvent`] values.
pub struct TelephonySignals {
    name_owner: MessageStream,
    property_changed: MessageStream,
    call_added: MessageStream,
}

impl TelephonySignals {
    pub async fn subscribe(conn: &zbus::Connection) -> zbus::Result<Self> {
        let name_owner = MessageStream::for_match_rule(
            MatchRule::builder()
                .msg_type(MessageType::Signal)
                .sender(DBUS_SERVICE)?
                .interface(DBUS_SERVICE)?
                .member("NameOwnerChanged")?
                .arg(0, OFONO_SERVICE)?
                .build(),
            conn,
            Some(16),
        )
        .await?;

        let property_changed = MessageStream::for_match_rule(
            MatchRule::builder()
                .msg_type(MessageType::Signal)
                .sender(OFONO_SERVICE)?
                .interface(VOICECALL_INTERFACE)?
                .member("PropertyChanged")?
                .build(),
            conn,
            Some(64),
        )
        .await?;

        let call_added = MessageStream::for_match_rule(
            MatchRule::builder()
                .msg_type(MessageType::Signal)
                .sender(OFONO_SERVICE)?
                .interface(VOICECALL_MANAGER_INTERFACE)?
                .member("CallAdded")?
                .build(),
            conn,
            Some(64),
        )
        .await?;

        Ok(Self {
            name_owner,
            property_changed,
            call_added,
        })
    }

    /// Next parsed event. Malformed payloads are logged and skipped.
    pub async fn next(&mut self) -> Option<TelephonyEvent> {
        loop {
            let parsed = tokio::select! {
                message = self.name_owner.next() => match message? {
                    Ok(message) => parse_name_owner_changed(&message),
                    Err(_) => None,
                },
                message = self.property_changed.next() => match message? {
                    Ok(message) => parse_property_changed(&message),
                    Err(_) => None,
                },
                message = self.call_added.next() => match message? {
                    Ok(message) => parse_call_added(&message),
                    Err(_) => None,
                },
            };
            if let Some(event) = parsed {
                return Some(event);
            }
        }
    }
}

fn parse_name_owner_changed(message: &Message) -> Option<TelephonyEvent> {
    let body = message.body();
    let (name, old_owner, new_owner): (String, String, String) = match body.deserialize() {
        Ok(body) => body,
        Err(e) => {
            error!("Failed to parse {}.NameOwnerChanged: {}", DBUS_SERVICE, e);
            return None;
        }
    };

    // The match rule pins arg0 already; recheck against out-of-band senders.
    if name != OFONO_SERVICE {
        return None;
    }
    if !old_owner.is_empty() {
        debug!("oFono disappeared");
        return Some(TelephonyEvent::ServiceVanished);
    }
    if !new_owner.is_empty() {
        debug!("oFono appeared");
        return Some(TelephonyEvent::ServiceAppeared);
    }
    None
}

fn parse_property_changed(message: &Message) -> Option<TelephonyEvent> {
    let header = message.header();
    let path = header.path()?.to_string();

    let body = message.body();
    let (property, value): (String, zbus::zvariant::Value) = match body.deserialize() {
        Ok(body) => body,
        Err(e) => {
            error!("Failed to parse {}.PropertyChanged: {}", VOICECALL_INTERFACE, e);
            return None;
        }
    };

    if property != "State" {
        return None;
    }

    let state = match value.downcast_ref::<&str>() {
        Ok(state) => state.to_string(),
        Err(e) => {
            error!("Failed to parse {}.PropertyChanged: {}", VOICECALL_INTERFACE, e);
            return None;
        }
    };

    Some(TelephonyEvent::CallState { path, state })
}

fn parse_call_added(message: &Message) -> Option<TelephonyEvent> {
    let body = message.body();
    let (path, properties): PathProperties = match body.deserialize() {
        Ok(body) => body,
        Err(e) => {
            error!(
                "Failed to parse {}.CallAdded: {}",
                VOICECALL_MANAGER_INTERFACE, e
            );
            return None;
        }
    };

    Some(TelephonyEvent::CallAdded {
        path: path.to_string(),
        state: call_state(&properties),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use zbus::zvariant::{ObjectPath, Value};

    #[test]
    fn test_parse_name_owner_changes() {
        let build = |old: &str, new: &str| {
            Message::signal("/org/freedesktop/DBus", DBUS_SERVICE, "NameOwnerChanged")
                .unwrap()
                .build(&(OFONO_SERVICE, old, new))
                .unwrap()
        };

        assert_eq!(
            parse_name_owner_changed(&build(":1.7", "")),
            Some(TelephonyEvent::ServiceVanished)
        );
        assert_eq!(
            parse_name_owner_changed(&build("", ":1.8")),
            Some(TelephonyEvent::ServiceAppeared)
        );
        // A restart reports both owners; the reset wins.
        assert_eq!(
            parse_name_owner_changed(&build(":1.7", ":1.8")),
            Some(TelephonyEvent::ServiceVanished)
        );
    }

    #[test]
    fn test_name_owner_change_for_other_services_is_ignored() {
        let message = Message::signal("/org/freedesktop/DBus", DBUS_SERVICE, "NameOwnerChanged")
            .unwrap()
            .build(&("org.bluez", ":1.2", ""))
            .unwrap();
        assert_eq!(parse_name_owner_changed(&message), None);
    }

    #[test]
    fn test_parse_state_change() {
        let message = Message::signal("/modem1/call1", VOICECALL_INTERFACE, "PropertyChanged")
            .unwrap()
            .build(&("State", Value::from("active")))
            .unwrap();

        assert_eq!(
            parse_property_changed(&message),
            Some(TelephonyEvent::CallState {
                path: "/modem1/call1".into(),
                state: "active".into(),
            })
        );
    }

    #[test]
    fn test_non_state_property_is_ignored() {
        let message = Message::signal("/modem1/call1", VOICECALL_INTERFACE, "PropertyChanged")
            .unwrap()
            .build(&("LineIdentification", Value::from("12345")))
            .unwrap();

        assert_eq!(parse_property_changed(&message), None);
    }

    #[test]
    fn test_malformed_state_change_is_ignored() {
        let message = Message::signal("/modem1/call1", VOICECALL_INTERFACE, "PropertyChanged")
            .unwrap()
            .build(&("just-one-string",))
            .unwrap();

        assert_eq!(parse_property_changed(&message), None);
    }

    #[test]
    fn test_parse_call_added() {
        let mut properties: HashMap<String, Value> = HashMap::new();
        properties.insert("State".into(), Value::from("incoming"));
        let body = (
            ObjectPath::try_from("/modem1/call1").unwrap(),
            properties,
        );
        let message = Message::signal("/modem1", VOICECALL_MANAGER_INTERFACE, "CallAdded")
            .unwrap()
            .build(&body)
            .unwrap();

        assert_eq!(
            parse_call_added(&message),
            Some(TelephonyEvent::CallAdded {
                path: "/modem1/call1".into(),
                state: Some("incoming".into()),
            })
        );
    }

    #[test]
    fn test_call_added_without_state_property() {
        let body = (
            ObjectPath::try_from("/modem1/call2").unwrap(),
            HashMap::<String, Value>::new(),
        );
        let message = Message::signal("/modem1", VOICECALL_MANAGER_INTERFACE, "CallAdded")
            .unwrap()
            .build(&body)
            .unwrap();

        assert_eq!(
            parse_call_added(&message),
            Some(TelephonyEvent::CallAdded {
                path: "/modem1/call2".into(),
                state: None,
            })
        );
    }
}
