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

//! Device lookup against the BlueZ session.
//!
//! Discovery and pairing themselves happen elsewhere; the backend only needs
//! to resolve the device object path named by a `NewConnection` into the
//! address pair the SCO socket is built from.

use std::future::Future;

use tracing::info;

use crate::error::{Error, Result};

/// What the backend needs to know about a resolved device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Adapter name, e.g. `hci0`.
    pub adapter: String,
    /// Canonical address of the local adapter.
    pub adapter_address: String,
    /// Canonical address of the remote device.
    pub address: String,
    /// Remote name, when BlueZ knows one.
    pub name: Option<String>,
}

/// Resolves device object paths. Mocked in tests.
pub trait DeviceLookup: Send + 'static {
    /// Resolve a `/org/bluez/<adapter>/dev_…` path. `Ok(None)` means the
    /// path is well-formed but the device is not known to the adapter.
    fn device_by_path(
        &self,
        path: &str,
    ) -> impl Future<Output = Result<Option<DeviceInfo>>> + Send;
}

/// Split a BlueZ device path into the adapter name and the canonical
/// device address.
pub fn parse_device_path(path: &str) -> Result<(String, String)> {
    let malformed = || Error::InvalidDevicePath(path.to_string());

    let rest = path.strip_prefix("/org/bluez/").ok_or_else(malformed)?;
    let (adapter, device) = rest.split_once('/').ok_or_else(malformed)?;
    let address = device.strip_prefix("dev_").ok_or_else(malformed)?;
    if adapter.is_empty() || address.len() != 17 {
        return Err(malformed());
    }
    Ok((adapter.to_string(), address.replace('_', ":")))
}

/// Lookup through a live BlueZ session.
pub struct BluezDeviceLookup {
    session: bluer::Session,
}

impl BluezDeviceLookup {
    pub async fn new() -> Result<Self> {
        let session = bluer::Session::new().await?;
        info!("BlueZ session created");
        Ok(Self { session })
    }
}

impl DeviceLookup for BluezDeviceLookup {
    async fn device_by_path(&self, path: &str) -> Result<Option<DeviceInfo>> {
        let (adapter_name, address_text) = parse_device_path(path)?;

        let adapter = self.session.adapter(&adapter_name)?;
        let address: bluer::Address = address_text
            .parse()
            .map_err(|_| Error::InvalidDevicePath(path.to_string()))?;

        if !adapter.device_addresses().await?.contains(&address) {
            return Ok(None);
        }

        let adapter_address = adapter.address().await?.to_string();
        let device = adapter.device(address)?;
        let name = device.name().await.ok().flatten();

        Ok(Some(DeviceInfo {
            adapter: adapter_name,
            adapter_address,
            address: address.to_string(),
            name,
        }))
    }
}
