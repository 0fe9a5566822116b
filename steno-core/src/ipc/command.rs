//! Inbound command schema: `{"cmd": string, ...optional fields}`.

use serde::{Deserialize, Serialize};

/// The raw wire shape: every optional field flattened onto one object,
/// dispatched on `cmd`. Kept distinct from `DaemonCommand` so an
/// unrecognized `cmd` string can still be reported back verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawCommand {
    pub cmd: String,
    pub locale: Option<String>,
    pub device: Option<String>,
    #[serde(rename = "systemAudio")]
    pub system_audio: Option<bool>,
    pub events: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DaemonCommand {
    Start {
        locale: Option<String>,
        device: Option<String>,
        system_audio: Option<bool>,
    },
    Stop,
    Status,
    Devices,
    Subscribe {
        events: Option<Vec<String>>,
    },
    Unknown(String),
}

impl DaemonCommand {
    /// Parse one line of the wire protocol. A JSON decode failure is
    /// reported as the protocol error; any `cmd` value not recognized
    /// below parses successfully into `Unknown(cmd)`.
    pub fn parse(line: &str) -> serde_json::Result<Self> {
        let raw: RawCommand = serde_json::from_str(line)?;
        Ok(match raw.cmd.as_str() {
            "start" => DaemonCommand::Start {
                locale: raw.locale,
                device: raw.device,
                system_audio: raw.system_audio,
            },
            "stop" => DaemonCommand::Stop,
            "status" => DaemonCommand::Status,
            "devices" => DaemonCommand::Devices,
            "subscribe" => DaemonCommand::Subscribe { events: raw.events },
            other => DaemonCommand::Unknown(other.to_string()),
        })
    }
}
