//! Outbound reply schema: exactly one `DaemonResponse` per inbound command.

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DaemonResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recording: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segments: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub devices: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "systemAudio")]
    pub system_audio: Option<bool>,
}

impl DaemonResponse {
    pub fn ok() -> Self {
        Self {
            ok: true,
            session_id: None,
            recording: None,
            segments: None,
            devices: None,
            error: None,
            status: None,
            device: None,
            system_audio: None,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(message.into()),
            ..Self::ok()
        }
    }

    pub fn to_line(&self) -> String {
        let mut s = serde_json::to_string(self).expect("DaemonResponse always serializes");
        s.push('\n');
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_response_omits_absent_optional_fields() {
        let json = serde_json::to_value(DaemonResponse::ok()).unwrap();
        assert_eq!(json, serde_json::json!({"ok": true}));
    }

    #[test]
    fn error_response_carries_the_message() {
        let json = serde_json::to_value(DaemonResponse::err("Invalid JSON")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"ok": false, "error": "Invalid JSON"})
        );
    }

    #[test]
    fn start_reply_shape_matches_the_wire_contract() {
        let response = DaemonResponse {
            session_id: Some("abc".into()),
            recording: Some(true),
            ..DaemonResponse::ok()
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"ok": true, "sessionId": "abc", "recording": true})
        );
    }
}
