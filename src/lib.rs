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

//! Bluetooth HSP audio-gateway backend.
//!
//! Registers with BlueZ as the Headset Profile audio-gateway handler,
//! speaks the AT-command control protocol with the connected headset,
//! acquires the SCO audio path on demand and keeps call state in sync with
//! the oFono telephony service.

pub mod audio;
pub mod backend;
pub mod config;
pub mod discovery;
pub mod error;
pub mod events;
pub mod profile;
pub mod telephony;
pub mod transport;

pub use backend::Backend;
pub use config::Config;
pub use error::{Error, Result};
pub use events::GatewayEvent;
