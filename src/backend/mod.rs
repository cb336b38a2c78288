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

//! The gateway backend: one event loop over four sources.
//!
//! Profile requests, transport events, telephony signals and pending-RPC
//! completions all land here. Every piece of mutable state (the transport
//! handle, the call tracker, the pending set) is confined to this task, so
//! nothing needs a lock.

pub mod pending;

use std::os::fd::OwnedFd;

use tokio::sync::mpsc;
use tracing::{debug, error, info};
use zbus::zvariant::OwnedObjectPath;

use crate::audio::AudioTransport;
use crate::config::Config;
use crate::discovery::DeviceLookup;
use crate::error::{Error, Result};
use crate::events::GatewayEvent;
use crate::profile::{self, NewConnectionRequest};
use crate::telephony::{
    self, CallTracker, ManagerProxy, PathProperties, RingAction, TelephonyEvent, TelephonySignals,
    VoiceCallManagerProxy,
};
use crate::transport::{self, TransportEvent, TransportHandle};

use pending::Pending;

/// Completion of one asynchronous IPC request.
enum Outcome {
    Registered(zbus::Result<()>),
    Modems(zbus::Result<Vec<PathProperties>>),
    Calls {
        modem: OwnedObjectPath,
        result: zbus::Result<Vec<PathProperties>>,
    },
    Command {
        op: &'static str,
        result: zbus::Result<()>,
    },
}

enum Step {
    Connection(NewConnectionRequest),
    Transport(TransportEvent),
    Telephony(TelephonyEvent),
    Completed(Outcome),
}

/// Process-lifetime backend context. Constructed explicitly and consumed by
/// [`Backend::run`]; no ambient globals.
pub struct Backend<D: DeviceLookup> {
    conn: zbus::Connection,
    lookup: D,
    config: Config,
    events: mpsc::UnboundedSender<GatewayEvent>,
    connections: mpsc::Receiver<NewConnectionRequest>,
    transport: Option<ActiveTransport>,
    tracker: CallTracker,
    pending: Pending<Outcome>,
    signals: TelephonySignals,
}

/// The sole active control channel and its event feed. A replaced transport
/// takes its feed with it, so stale events cannot reach the loop.
struct ActiveTransport {
    handle: TransportHandle,
    events: mpsc::Receiver<TransportEvent>,
}

impl<D: DeviceLookup> Backend<D> {
    /// Wire the backend onto the bus: serve the profile object, subscribe to
    /// the telephony signals and dispatch the registration request. Events
    /// for the embedding layer arrive on the returned receiver.
    pub async fn new(
        conn: zbus::Connection,
        lookup: D,
        config: Config,
    ) -> Result<(Self, mpsc::UnboundedReceiver<GatewayEvent>)> {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (connection_tx, connection_rx) = mpsc::channel(8);

        let signals = TelephonySignals::subscribe(&conn).await?;
        profile::serve(&conn, connection_tx).await?;

        let mut backend = Self {
            conn,
            lookup,
            config,
            events: event_tx,
            connections: connection_rx,
            transport: None,
            tracker: CallTracker::new(),
            pending: Pending::new(),
            signals,
        };

        let request = profile::registration_request(&backend.conn);
        backend
            .pending
            .dispatch(async move { Outcome::Registered(request.await) });

        Ok((backend, event_rx))
    }

    /// The event loop. Runs until every source is gone, then force-releases
    /// whatever requests are still in flight.
    pub async fn run(mut self) {
        loop {
            let step = tokio::select! {
                Some(request) = self.connections.recv() => Step::Connection(request),
                Some(event) = transport_recv(&mut self.transport) => Step::Transport(event),
                Some(event) = self.signals.next() => Step::Telephony(event),
                Some(outcome) = self.pending.next() => Step::Completed(outcome),
                else => break,
            };

            match step {
                Step::Connection(request) => self.handle_connection(request).await,
                Step::Transport(event) => self.handle_transport_event(event),
                Step::Telephony(event) => self.handle_telephony_event(event),
                Step::Completed(outcome) => self.handle_outcome(outcome),
            }
        }

        if !self.pending.is_empty() {
            debug!("releasing {} unanswered requests", self.pending.len());
            self.pending.clear();
        }
    }

    async fn handle_connection(&mut self, request: NewConnectionRequest) {
        let NewConnectionRequest { device, fd, reply } = request;
        let result = self.setup_connection(device, fd).await;
        let _ = reply.send(result);
    }

    /// Install the control channel for a freshly connected headset and kick
    /// off a full call-state refresh.
    async fn setup_connection(&mut self, device: OwnedObjectPath, fd: OwnedFd) -> Result<()> {
        let info = match self.lookup.device_by_path(device.as_str()).await? {
            Some(info) => info,
            None => {
                error!("Device doesn't exist for {}", device);
                return Err(Error::UnknownDevice(device.to_string()));
            }
        };

        // Only one headset at a time: an existing channel is torn down
        // before the new one is installed, never silently replaced.
        if self.transport.is_some() {
            info!("replacing existing control channel");
            self.teardown_transport();
        }

        // From here on a failure drops the descriptor, which closes it.
        let stream = transport::stream_from_fd(fd)?;
        let (transport_tx, transport_rx) = mpsc::channel(32);
        let handle = transport::spawn(
            stream,
            self.config.audio.speaker_gain,
            self.config.audio.microphone_gain,
            transport_tx,
        );

        let audio = AudioTransport::new(info.clone(), &handle, self.events.clone());
        self.transport = Some(ActiveTransport {
            handle,
            events: transport_rx,
        });

        info!("Control channel up for {}", info.address);
        let _ = self.events.send(GatewayEvent::HeadsetConnected {
            device: info,
            audio,
        });

        self.refresh_calls();
        Ok(())
    }

    /// Tear the active transport down and drop its event feed. The task
    /// clears its timer and closes the descriptor on its own.
    fn teardown_transport(&mut self) {
        if let Some(active) = self.transport.take() {
            active.handle.shutdown();
        }
        self.tracker.reset();
    }

    fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::SpeakerGain(gain) => {
                let _ = self.events.send(GatewayEvent::SpeakerGainChanged(gain));
            }
            TransportEvent::MicrophoneGain(gain) => {
                let _ = self.events.send(GatewayEvent::MicrophoneGainChanged(gain));
            }
            TransportEvent::ButtonPress => {
                for command in self.tracker.button_press() {
                    self.send_command(command);
                }
            }
            TransportEvent::Closed => {
                self.tracker.reset();
                self.transport = None;
                let _ = self.events.send(GatewayEvent::HeadsetDisconnected);
            }
        }
    }

    fn handle_telephony_event(&mut self, event: TelephonyEvent) {
        // Call state only matters while a headset is connected.
        if self.transport.is_none() {
            return;
        }
        let actions = self.tracker.handle(event);
        self.apply_ring_actions(actions);
    }

    fn handle_outcome(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Registered(Ok(())) => {
                debug!("profile registered with BlueZ");
            }
            Outcome::Registered(Err(e)) if profile::is_not_supported(&e) => {
                info!("Couldn't register profile because it is disabled in BlueZ");
            }
            Outcome::Registered(Err(e)) => {
                error!("RegisterProfile() failed: {}", e);
            }
            Outcome::Modems(Ok(modems)) => {
                for (modem, _properties) in modems {
                    self.request_calls(modem);
                }
            }
            Outcome::Modems(Err(e)) => {
                error!("GetModems() failed: {}", e);
            }
            Outcome::Calls { modem: _, result: Ok(calls) } => {
                for (path, properties) in calls {
                    let event = TelephonyEvent::CallAdded {
                        path: path.to_string(),
                        state: telephony::call_state(&properties),
                    };
                    let actions = self.tracker.handle(event);
                    self.apply_ring_actions(actions);
                }
            }
            Outcome::Calls { modem, result: Err(e) } => {
                error!("GetCalls() failed for {}: {}", modem, e);
            }
            Outcome::Command { op: _, result: Ok(()) } => {}
            Outcome::Command { op, result: Err(e) } => {
                error!("{}() failed: {}", op, e);
            }
        }
    }

    fn apply_ring_actions(&self, actions: Vec<RingAction>) {
        if let Some(active) = &self.transport {
            for action in actions {
                match action {
                    RingAction::Start => active.handle.ring_start(),
                    RingAction::Stop => active.handle.ring_stop(),
                }
            }
        }
    }

    /// Full refresh: list the modems, then fan out one call-list request per
    /// modem from the reply.
    fn refresh_calls(&mut self) {
        let conn = self.conn.clone();
        self.pending.dispatch(async move {
            let result = async {
                let manager = ManagerProxy::new(&conn).await?;
                manager.get_modems().await
            }
            .await;
            Outcome::Modems(result)
        });
    }

    fn request_calls(&mut self, modem: OwnedObjectPath) {
        let conn = self.conn.clone();
        self.pending.dispatch(async move {
            let result = async {
                let proxy = VoiceCallManagerProxy::builder(&conn)
                    .path(modem.as_str())?
                    .build()
                    .await?;
                proxy.get_calls().await
            }
            .await;
            Outcome::Calls { modem, result }
        });
    }

    fn send_command(&mut self, command: telephony::TelephonyCommand) {
        let conn = self.conn.clone();
        self.pending.dispatch(async move {
            let (op, result) = telephony::execute(&conn, command).await;
            Outcome::Command { op, result }
        });
    }
}

async fn transport_recv(transport: &mut Option<ActiveTransport>) -> Option<TransportEvent> {
    match transport {
        Some(active) => active.events.recv().await,
        None => std::future::pending().await,
    }
}
