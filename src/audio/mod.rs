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

//! Audio-transport contract exposed to the audio-routing collaborator.

pub mod sco;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::discovery::DeviceInfo;
use crate::error::Result;
use crate::events::GatewayEvent;
use crate::transport::{TransportCmd, TransportHandle};

pub use sco::{ScoConnection, SCO_MTU};

/// The profile this transport belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    HeadsetAudioGateway,
}

impl Profile {
    pub fn as_str(&self) -> &'static str {
        match self {
            Profile::HeadsetAudioGateway => "headset-audio-gateway",
        }
    }
}

/// Per-connection audio handle.
///
/// Created together with the control-channel transport and handed to the
/// audio-routing collaborator, which drives the SCO path and the gain
/// levels through it. The SCO socket exists only between [`acquire`] and
/// the owner closing the returned descriptor.
///
/// [`acquire`]: AudioTransport::acquire
#[derive(Debug)]
pub struct AudioTransport {
    device: DeviceInfo,
    commands: mpsc::UnboundedSender<TransportCmd>,
    events: mpsc::UnboundedSender<GatewayEvent>,
}

impl AudioTransport {
    pub(crate) fn new(
        device: DeviceInfo,
        transport: &TransportHandle,
        events: mpsc::UnboundedSender<GatewayEvent>,
    ) -> Self {
        Self {
            device,
            commands: transport.command_sender(),
            events,
        }
    }

    pub fn profile(&self) -> Profile {
        Profile::HeadsetAudioGateway
    }

    pub fn device(&self) -> &DeviceInfo {
        &self.device
    }

    /// Open the SCO audio path towards the headset.
    ///
    /// Returns the connected (or still connecting) socket and the fixed MTU
    /// for both directions. The volume-control collaborator is told the path
    /// is active. The caller owns the descriptor.
    pub fn acquire(&self, optional: bool) -> Result<ScoConnection> {
        debug!(
            "acquiring SCO path to {} (optional: {})",
            self.device.address, optional
        );
        let connection = sco::connect(&self.device.adapter_address, &self.device.address)?;
        let _ = self.events.send(GatewayEvent::AudioPathActive);
        Ok(connection)
    }

    /// Give the audio path up. The SCO descriptor is closed by its owner,
    /// not here.
    pub fn release(&self) {
        info!("audio transport for {} released", self.device.address);
        let _ = self.events.send(GatewayEvent::AudioPathInactive);
    }

    /// Tear down the whole connection, control channel included.
    pub fn destroy(&self) {
        let _ = self.commands.send(TransportCmd::Shutdown);
    }

    /// Push a speaker-gain level to the headset. No-op when unchanged.
    pub fn set_speaker_gain(&self, gain: u16) {
        let _ = self.commands.send(TransportCmd::SetSpeakerGain(gain));
    }

    /// Push a microphone-gain level to the headset. No-op when unchanged.
    pub fn set_microphone_gain(&self, gain: u16) {
        let _ = self.commands.send(TransportCmd::SetMicrophoneGain(gain));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport;
    use tokio::net::UnixStream;

    fn transport_handle() -> TransportHandle {
        let (local, _peer) = UnixStream::pair().unwrap();
        let (event_tx, _event_rx) = mpsc::channel(8);
        transport::spawn(local, 7, 7, event_tx)
    }

    fn device() -> DeviceInfo {
        DeviceInfo {
            adapter: "hci0".into(),
            adapter_address: "00:11:22:33:44:55".into(),
            address: "AA:BB:CC:DD:EE:FF".into(),
            name: None,
        }
    }

    #[tokio::test]
    async fn test_release_notifies_volume_collaborator() {
        let (gateway_tx, mut gateway_rx) = mpsc::unbounded_channel();
        let handle = transport_handle();
        let audio = AudioTransport::new(device(), &handle, gateway_tx);

        audio.release();
        assert!(matches!(
            gateway_rx.recv().await,
            Some(GatewayEvent::AudioPathInactive)
        ));
    }

    #[tokio::test]
    async fn test_acquire_fails_cleanly_on_bad_device_address() {
        let (gateway_tx, mut gateway_rx) = mpsc::unbounded_channel();
        let handle = transport_handle();
        let mut bad = device();
        bad.address = "not-an-address".into();
        let audio = AudioTransport::new(bad, &handle, gateway_tx);

        assert!(audio.acquire(false).is_err());
        // No audio path, no activation notice.
        assert!(gateway_rx.try_recv().is_err());
    }
}
