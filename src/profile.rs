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

//! BlueZ profile registration and the served `org.bluez.Profile1` object.

use std::collections::HashMap;
use std::future::Future;
use std::os::fd::OwnedFd;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error};
use uuid::Uuid;
use zbus::zvariant::{ObjectPath, OwnedObjectPath, OwnedValue, Value};

use crate::error::Result;

/// Fixed object path the profile is served at.
pub const PROFILE_OBJECT_PATH: &str = "/Profile/HSPAGProfile";

/// Headset Profile, Audio-Gateway role.
pub const HSP_AG_UUID: Uuid = Uuid::from_u128(0x00001112_0000_1000_8000_00805F9B34FB);

const BLUEZ_ERROR_NOT_SUPPORTED: &str = "org.bluez.Error.NotSupported";

#[zbus::proxy(
    interface = "org.bluez.ProfileManager1",
    default_service = "org.bluez",
    default_path = "/org/bluez",
    gen_blocking = false
)]
trait ProfileManager1 {
    fn register_profile(
        &self,
        profile: &ObjectPath<'_>,
        uuid: &str,
        options: HashMap<String, Value<'_>>,
    ) -> zbus::Result<()>;
}

/// Error replies produced by the served profile object.
#[derive(Debug, zbus::DBusError)]
#[zbus(prefix = "org.bluez.Error")]
pub enum ProfileError {
    #[zbus(error)]
    ZBus(zbus::Error),
    InvalidArguments(String),
}

/// A control-channel descriptor handed over by BlueZ, awaiting backend
/// acceptance. The descriptor is owned by this process from here on; if the
/// backend rejects the connection it is simply dropped.
pub struct NewConnectionRequest {
    pub device: OwnedObjectPath,
    pub fd: OwnedFd,
    pub reply: oneshot::Sender<Result<()>>,
}

/// The `org.bluez.Profile1` handler. Introspection is answered by the
/// object server from this interface definition.
struct HspAgProfile {
    connections: mpsc::Sender<NewConnectionRequest>,
}

#[zbus::interface(name = "org.bluez.Profile1")]
impl HspAgProfile {
    /// BlueZ unregistered the profile. Nothing to do.
    async fn release(&self) {}

    /// Acknowledge only; the actual teardown rides the I/O hangup on the
    /// control channel, not this call.
    async fn request_disconnection(&self, device: OwnedObjectPath) {
        debug!("RequestDisconnection for {}", device);
    }

    async fn new_connection(
        &self,
        device: OwnedObjectPath,
        fd: zbus::zvariant::OwnedFd,
        _options: HashMap<String, OwnedValue>,
    ) -> std::result::Result<(), ProfileError> {
        // Take ownership of the descriptor away from the D-Bus layer.
        let fd = OwnedFd::from(fd);
        debug!("NewConnection device={} fd={:?}", device, fd);

        let rejected =
            || ProfileError::InvalidArguments("Unable to handle new connection".to_string());

        let (reply_tx, reply_rx) = oneshot::channel();
        self.connections
            .send(NewConnectionRequest {
                device,
                fd,
                reply: reply_tx,
            })
            .await
            .map_err(|_| rejected())?;

        match reply_rx.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                error!("NewConnection rejected: {}", e);
                Err(rejected())
            }
            Err(_) => Err(rejected()),
        }
    }
}

/// Serve the profile object at its fixed path.
pub async fn serve(
    conn: &zbus::Connection,
    connections: mpsc::Sender<NewConnectionRequest>,
) -> zbus::Result<()> {
    conn.object_server()
        .at(PROFILE_OBJECT_PATH, HspAgProfile { connections })
        .await?;
    Ok(())
}

/// Build the asynchronous registration request. The caller dispatches it
/// through its pending-request set and interprets the reply with
/// [`is_not_supported`].
pub fn registration_request(
    conn: &zbus::Connection,
) -> impl Future<Output = zbus::Result<()>> + Send + 'static {
    let conn = conn.clone();
    async move {
        debug!("Registering profile {}", PROFILE_OBJECT_PATH);
        let manager = ProfileManager1Proxy::new(&conn).await?;
        let path = ObjectPath::try_from(PROFILE_OBJECT_PATH).map_err(zbus::Error::from)?;
        manager
            .register_profile(&path, &HSP_AG_UUID.to_string(), HashMap::new())
            .await
    }
}

/// True when the registration reply says the profile is disabled in the
/// Bluetooth daemon. Informational, not a fault.
pub fn is_not_supported(err: &zbus::Error) -> bool {
    matches!(err, zbus::Error::MethodError(name, _, _) if name.as_str() == BLUEZ_ERROR_NOT_SUPPORTED)
}
