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

//! SCO audio socket setup.

use std::io;
use std::mem;
use std::os::fd::OwnedFd;

use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use tracing::{debug, error};

use crate::error::{Error, Result};

const BTPROTO_SCO: i32 = 2;

/// The kernel does not expose a negotiated SCO MTU; 48 bytes is what the
/// link actually carries per direction.
pub const SCO_MTU: usize = 48;

/// A freshly connected (or connecting) SCO socket.
///
/// The descriptor is owned by the caller from here on; the connect may still
/// be completing at a lower layer.
#[derive(Debug)]
pub struct ScoConnection {
    pub fd: OwnedFd,
    pub input_mtu: usize,
    pub output_mtu: usize,
}

/// Decompose a canonical `AA:BB:CC:DD:EE:FF` address into the kernel's
/// 6-byte device-address layout (last octet first).
pub fn parse_address(text: &str) -> Result<[u8; 6]> {
    let mut bdaddr = [0u8; 6];
    let mut octets = 0;
    for (i, part) in text.split(':').enumerate() {
        if i >= 6 || part.len() != 2 {
            return Err(Error::InvalidAddress(text.to_string()));
        }
        bdaddr[5 - i] =
            u8::from_str_radix(part, 16).map_err(|_| Error::InvalidAddress(text.to_string()))?;
        octets += 1;
    }
    if octets != 6 {
        return Err(Error::InvalidAddress(text.to_string()));
    }
    Ok(bdaddr)
}

/// Open a SCO socket bound to `adapter_address` and connect it towards
/// `device_address`.
///
/// The connect is non-blocking; an in-progress result counts as success
/// because the link completes asynchronously at the HCI layer. Any other
/// failure closes the partially created socket and is returned.
pub fn connect(adapter_address: &str, device_address: &str) -> Result<ScoConnection> {
    let local = parse_address(adapter_address)?;
    let peer = parse_address(device_address)?;

    let socket = Socket::new(
        Domain::from(libc::AF_BLUETOOTH),
        Type::SEQPACKET,
        Some(Protocol::from(BTPROTO_SCO)),
    )
    .map_err(|e| {
        error!("socket(SEQPACKET, SCO): {}", e);
        e
    })?;

    socket.bind(&sco_sockaddr(local)).map_err(|e| {
        error!("bind(): {}", e);
        e
    })?;

    socket.set_nonblocking(true)?;

    debug!("doing SCO connect");
    match socket.connect(&sco_sockaddr(peer)) {
        Ok(()) => {}
        Err(e) if connect_in_progress(&e) => {}
        Err(e) => {
            error!("connect(): {}", e);
            return Err(e.into());
        }
    }

    Ok(ScoConnection {
        fd: socket.into(),
        input_mtu: SCO_MTU,
        output_mtu: SCO_MTU,
    })
}

fn connect_in_progress(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::WouldBlock
        || matches!(
            e.raw_os_error(),
            Some(libc::EINPROGRESS) | Some(libc::EAGAIN)
        )
}

/// Build the SCO socket address: the family followed by the 6-byte device
/// address, nothing else.
fn sco_sockaddr(bdaddr: [u8; 6]) -> SockAddr {
    let mut storage: libc::sockaddr_storage = unsafe { mem::zeroed() };
    storage.ss_family = libc::AF_BLUETOOTH as libc::sa_family_t;

    let family_len = mem::size_of::<libc::sa_family_t>();
    let bytes = unsafe {
        std::slice::from_raw_parts_mut(
            (&mut storage as *mut libc::sockaddr_storage).cast::<u8>(),
            mem::size_of::<libc::sockaddr_storage>(),
        )
    };
    bytes[family_len..family_len + 6].copy_from_slice(&bdaddr);

    let len = (family_len + 6) as libc::socklen_t;
    unsafe { SockAddr::new(storage, len) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_address_reverses_octets() {
        let bdaddr = parse_address("00:11:22:AA:BB:CC").unwrap();
        assert_eq!(bdaddr, [0xCC, 0xBB, 0xAA, 0x22, 0x11, 0x00]);
    }

    #[test]
    fn test_parse_address_rejects_malformed_text() {
        assert!(parse_address("").is_err());
        assert!(parse_address("00:11:22:AA:BB").is_err());
        assert!(parse_address("00:11:22:AA:BB:CC:DD").is_err());
        assert!(parse_address("00:11:22:AA:BB:GG").is_err());
        assert!(parse_address("0:11:22:AA:BB:CC").is_err());
    }

    #[test]
    fn test_sco_sockaddr_layout() {
        let addr = sco_sockaddr([1, 2, 3, 4, 5, 6]);
        assert_eq!(addr.family(), libc::AF_BLUETOOTH as libc::sa_family_t);
        assert_eq!(
            addr.len() as usize,
            mem::size_of::<libc::sa_family_t>() + 6
        );
    }

    #[test]
    fn test_connect_fails_cleanly_on_bad_address() {
        let err = connect("nonsense", "00:11:22:AA:BB:CC").unwrap_err();
        assert!(matches!(err, Error::InvalidAddress(_)));
    }
}
