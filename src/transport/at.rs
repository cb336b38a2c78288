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

//! HSP AT-command line classification and unsolicited line rendering.

/// Acknowledgment written back for every received line, recognized or not.
pub const OK_RESPONSE: &[u8] = b"\r\nOK\r\n";

/// Unsolicited ring alert line.
pub const RING: &[u8] = b"\r\nRING\r\n";

/// A classified inbound AT line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtCommand {
    /// `AT+VGS=<n>` - headset reports its speaker gain.
    SpeakerGain(u16),
    /// `AT+VGM=<n>` - headset reports its microphone gain.
    MicrophoneGain(u16),
    /// `AT+CKPD=200` - multi-function button press.
    ButtonPress,
    /// Anything else. Still acknowledged with OK.
    Unknown,
}

/// Classify one received line.
///
/// Trailing bytes after the numeric argument are tolerated, matching how
/// headsets terminate lines with `\r` and occasionally append junk.
pub fn classify(line: &str) -> AtCommand {
    let line = line.trim_matches(|c: char| c.is_ascii_whitespace() || c == '\0');

    if let Some(rest) = line.strip_prefix("AT+VGS=") {
        if let Some(gain) = leading_u16(rest) {
            return AtCommand::SpeakerGain(gain);
        }
    } else if let Some(rest) = line.strip_prefix("AT+VGM=") {
        if let Some(gain) = leading_u16(rest) {
            return AtCommand::MicrophoneGain(gain);
        }
    } else if line.starts_with("AT+CKPD=200") {
        return AtCommand::ButtonPress;
    }

    AtCommand::Unknown
}

/// Render the unsolicited speaker-gain line sent to the headset.
pub fn speaker_gain_line(gain: u16) -> String {
    format!("\r\n+VGS={}\r\n", gain)
}

/// Render the unsolicited microphone-gain line sent to the headset.
pub fn microphone_gain_line(gain: u16) -> String {
    format!("\r\n+VGM={}\r\n", gain)
}

/// Parse the decimal prefix of `s`, ignoring anything after it.
fn leading_u16(s: &str) -> Option<u16> {
    let digits: &str = match s.find(|c: char| !c.is_ascii_digit()) {
        Some(0) => return None,
        Some(end) => &s[..end],
        None => s,
    };
    digits.parse().ok()
}
