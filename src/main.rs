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

//! HSP Audio-Gateway daemon.

use anyhow::Result;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hsp_gateway::discovery::BluezDeviceLookup;
use hsp_gateway::{Backend, Config, GatewayEvent};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("hsp_gateway=info".parse()?),
        )
        .init();

    info!("Starting HSP audio gateway v{}...", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = Config::load()?;
    info!("Configuration loaded");

    // Shared system bus for BlueZ and oFono
    let conn = zbus::Connection::system().await?;

    // Device lookup through BlueZ
    let lookup = BluezDeviceLookup::new().await?;

    let (backend, mut events) = Backend::new(conn, lookup, config).await?;
    tokio::spawn(backend.run());

    info!("Ready. Waiting for headset connections.");

    // The embedding layer: keep the audio handle of the active connection
    // and surface the gateway's notifications.
    let mut active_audio = None;

    loop {
        tokio::select! {
            Some(event) = events.recv() => match event {
                GatewayEvent::HeadsetConnected { device, audio } => {
                    info!(
                        "Headset connected: {} ({})",
                        device.name.as_deref().unwrap_or("unknown"),
                        device.address
                    );
                    active_audio = Some(audio);
                }
                GatewayEvent::HeadsetDisconnected => {
                    info!("Headset disconnected");
                    active_audio = None;
                }
                GatewayEvent::SpeakerGainChanged(gain) => {
                    info!("Speaker gain changed: {}", gain);
                }
                GatewayEvent::MicrophoneGainChanged(gain) => {
                    info!("Microphone gain changed: {}", gain);
                }
                GatewayEvent::AudioPathActive => {
                    info!("Audio path active");
                }
                GatewayEvent::AudioPathInactive => {
                    info!("Audio path inactive");
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    drop(active_audio);
    info!("HSP audio gateway stopped");
    Ok(())
}
