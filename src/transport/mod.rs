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

//! RFCOMM control-channel transport.
//!
//! One task owns the descriptor, the AT-command state and the ring-alert
//! timer; everything else talks to it over channels. At most one transport
//! exists per backend.

pub mod at;

use std::io;
use std::os::fd::OwnedFd;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::sync::mpsc;
use tokio::time::{self, Instant, Interval};
use tracing::{debug, error, info};

use at::AtCommand;

/// Interval between repeated ring alerts.
const RING_INTERVAL: Duration = Duration::from_secs(3);

/// Commands accepted by the transport task.
#[derive(Debug, Clone, Copy)]
pub(crate) enum TransportCmd {
    SetSpeakerGain(u16),
    SetMicrophoneGain(u16),
    RingStart,
    RingStop,
    Shutdown,
}

/// Events emitted by the transport task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportEvent {
    /// Headset reported its speaker gain.
    SpeakerGain(u16),
    /// Headset reported its microphone gain.
    MicrophoneGain(u16),
    /// Multi-function button pressed.
    ButtonPress,
    /// The control channel is down and the task has finished its teardown.
    Closed,
}

/// Handle to a running transport task.
#[derive(Debug, Clone)]
pub struct TransportHandle {
    cmd: mpsc::UnboundedSender<TransportCmd>,
}

impl TransportHandle {
    pub fn set_speaker_gain(&self, gain: u16) {
        let _ = self.cmd.send(TransportCmd::SetSpeakerGain(gain));
    }

    pub fn set_microphone_gain(&self, gain: u16) {
        let _ = self.cmd.send(TransportCmd::SetMicrophoneGain(gain));
    }

    pub fn ring_start(&self) {
        let _ = self.cmd.send(TransportCmd::RingStart);
    }

    pub fn ring_stop(&self) {
        let _ = self.cmd.send(TransportCmd::RingStop);
    }

    /// Tear the transport down. The task confirms with
    /// [`TransportEvent::Closed`] once the descriptor is shut and closed.
    pub fn shutdown(&self) {
        let _ = self.cmd.send(TransportCmd::Shutdown);
    }

    pub(crate) fn command_sender(&self) -> mpsc::UnboundedSender<TransportCmd> {
        self.cmd.clone()
    }
}

/// Wrap the descriptor received over D-Bus for the tokio reactor.
///
/// The fd is a connected RFCOMM stream socket; readiness registration and
/// read/write/shutdown do not depend on the address family, so the Unix
/// stream wrapper drives it fine.
pub fn stream_from_fd(fd: OwnedFd) -> io::Result<UnixStream> {
    let stream = std::os::unix::net::UnixStream::from(fd);
    stream.set_nonblocking(true)?;
    UnixStream::from_std(stream)
}

/// Spawn the transport task for a connected control channel.
///
/// `speaker_gain` and `microphone_gain` seed the change suppression for
/// outbound gain writes.
pub fn spawn(
    stream: UnixStream,
    speaker_gain: u16,
    microphone_gain: u16,
    events: mpsc::Sender<TransportEvent>,
) -> TransportHandle {
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let task = TransportTask {
        stream,
        events,
        cmd_rx,
        speaker_gain,
        microphone_gain,
        ring: None,
    };
    tokio::spawn(task.run());
    TransportHandle { cmd: cmd_tx }
}

struct TransportTask {
    stream: UnixStream,
    events: mpsc::Sender<TransportEvent>,
    cmd_rx: mpsc::UnboundedReceiver<TransportCmd>,
    speaker_gain: u16,
    microphone_gain: u16,
    ring: Option<Interval>,
}

enum Step {
    Line(usize),
    Hangup(Option<io::Error>),
    Command(TransportCmd),
    Detached,
    RingTick,
}

impl TransportTask {
    async fn run(mut self) {
        let mut buf = [0u8; 511];

        loop {
            let step = tokio::select! {
                result = self.stream.read(&mut buf) => match result {
                    Ok(0) => Step::Hangup(None),
                    Ok(n) => Step::Line(n),
                    Err(e) => Step::Hangup(Some(e)),
                },
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(cmd) => Step::Command(cmd),
                    None => Step::Detached,
                },
                _ = ring_tick(&mut self.ring) => Step::RingTick,
            };

            match step {
                Step::Line(n) => self.handle_line(&buf[..n]).await,
                Step::Hangup(err) => {
                    match err {
                        None => info!("Lost RFCOMM connection."),
                        Some(e) => info!("Lost RFCOMM connection: {}", e),
                    }
                    break;
                }
                Step::Command(TransportCmd::Shutdown) | Step::Detached => break,
                Step::Command(cmd) => self.handle_command(cmd).await,
                Step::RingTick => self.write_ring().await,
            }
        }

        self.teardown().await;
    }

    /// One received line: classify, update local state, notify, acknowledge.
    async fn handle_line(&mut self, data: &[u8]) {
        let line = String::from_utf8_lossy(data);
        let line = line.trim_matches(|c: char| c.is_ascii_whitespace() || c == '\0');
        debug!("RFCOMM << {}", line);

        match at::classify(line) {
            AtCommand::SpeakerGain(gain) => {
                self.speaker_gain = gain;
                self.emit(TransportEvent::SpeakerGain(gain)).await;
            }
            AtCommand::MicrophoneGain(gain) => {
                self.microphone_gain = gain;
                self.emit(TransportEvent::MicrophoneGain(gain)).await;
            }
            AtCommand::ButtonPress => {
                self.emit(TransportEvent::ButtonPress).await;
            }
            AtCommand::Unknown => {}
        }

        debug!("RFCOMM >> OK");
        // Write failures are not fatal here; real trouble surfaces as a read
        // error or hangup.
        if let Err(e) = self.stream.write_all(at::OK_RESPONSE).await {
            error!("RFCOMM write error: {}", e);
        }
    }

    async fn handle_command(&mut self, cmd: TransportCmd) {
        match cmd {
            TransportCmd::SetSpeakerGain(gain) => {
                if gain != self.speaker_gain {
                    // Store before writing so the headset's echo of the new
                    // value does not loop back as another change.
                    self.speaker_gain = gain;
                    debug!("RFCOMM >> +VGS={}", gain);
                    self.write(at::speaker_gain_line(gain).as_bytes()).await;
                }
            }
            TransportCmd::SetMicrophoneGain(gain) => {
                if gain != self.microphone_gain {
                    self.microphone_gain = gain;
                    debug!("RFCOMM >> +VGM={}", gain);
                    self.write(at::microphone_gain_line(gain).as_bytes()).await;
                }
            }
            TransportCmd::RingStart => {
                if self.ring.is_none() {
                    self.write_ring().await;
                    self.ring = Some(time::interval_at(
                        Instant::now() + RING_INTERVAL,
                        RING_INTERVAL,
                    ));
                }
            }
            TransportCmd::RingStop => {
                self.ring = None;
            }
            TransportCmd::Shutdown => unreachable!("handled in run"),
        }
    }

    async fn write_ring(&mut self) {
        debug!("RFCOMM >> RING");
        self.write(at::RING).await;
    }

    async fn write(&mut self, data: &[u8]) {
        if let Err(e) = self.stream.write_all(data).await {
            error!("RFCOMM write error: {}", e);
        }
    }

    async fn emit(&self, event: TransportEvent) {
        let _ = self.events.send(event).await;
    }

    /// Ordered teardown: ring timer first, then the backend is told to clear
    /// call state and detach, then the descriptor leaves the reactor and is
    /// shut down and closed. Nothing can observe a half-dead transport.
    async fn teardown(mut self) {
        self.ring = None;
        let _ = self.events.send(TransportEvent::Closed).await;
        if let Ok(stream) = self.stream.into_std() {
            let _ = stream.shutdown(std::net::Shutdown::Both);
        }
    }
}

async fn ring_tick(ring: &mut Option<Interval>) {
    match ring {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
