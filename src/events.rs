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

//! Events emitted to the embedding layer.
//!
//! The audio-routing and volume-control subsystems live outside this crate;
//! they observe the gateway through this stream and drive it back through the
//! [`AudioTransport`](crate::audio::AudioTransport) handle carried by
//! [`GatewayEvent::HeadsetConnected`].

use crate::audio::AudioTransport;
use crate::discovery::DeviceInfo;

/// Events emitted by the gateway backend.
#[derive(Debug)]
pub enum GatewayEvent {
    /// A headset control channel is up. The audio transport handle exposes
    /// the acquire/release/destroy/gain contract for the new connection.
    HeadsetConnected {
        device: DeviceInfo,
        audio: AudioTransport,
    },
    /// The control channel is gone; the audio transport handle is dead.
    HeadsetDisconnected,
    /// The headset reported a new speaker gain (`AT+VGS`).
    SpeakerGainChanged(u16),
    /// The headset reported a new microphone gain (`AT+VGM`).
    MicrophoneGainChanged(u16),
    /// The SCO audio path was acquired.
    AudioPathActive,
    /// The SCO audio path was released.
    AudioPathInactive,
}
