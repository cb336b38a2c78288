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

//! Errors surfaced at the library seams.

use thiserror::Error;

/// Errors that occur while operating the audio-gateway backend.
#[derive(Debug, Error)]
pub enum Error {
    /// A `NewConnection` named a device the discovery collaborator does not know.
    #[error("device does not exist for {0}")]
    UnknownDevice(String),

    /// A device object path did not follow the `/org/bluez/<adapter>/dev_…` form.
    #[error("malformed device path {0}")]
    InvalidDevicePath(String),

    /// A canonical Bluetooth address string could not be decomposed.
    #[error("malformed Bluetooth address {0}")]
    InvalidAddress(String),

    /// Socket setup failed (SCO path or control-channel registration).
    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),

    /// D-Bus failure on the session shared with BlueZ and oFono.
    #[error("D-Bus: {0}")]
    Dbus(#[from] zbus::Error),

    /// BlueZ session failure in the discovery collaborator.
    #[error("BlueZ: {0}")]
    Bluetooth(#[from] bluer::Error),

    /// The backend task is gone; no new connection can be handed over.
    #[error("backend is not running")]
    BackendClosed,
}

pub type Result<T> = std::result::Result<T, Error>;
