//! Wire types for the SFU signaling channel.
//!
//! Requests go out as `{ id, type, payload }`. Responses are flat objects
//! tagged by `type`; servers may or may not echo the request `id`. Errors are
//! `{ type: "error", error }` and cannot be tied to a single request.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::{SessionError, SessionResult};

pub const ERROR_KIND: &str = "error";

/// Field names under which servers place the router capabilities.
pub const CAPABILITY_FIELDS: [&str; 4] = [
    "rtpCapabilities",
    "routerRtpCapabilities",
    "capabilities",
    "data",
];
/// Field names under which servers nest the transport descriptor.
pub const TRANSPORT_FIELDS: [&str; 3] = ["transportInfo", "transport", "data"];
/// Field names under which servers nest the consumer descriptor.
pub const CONSUMER_FIELDS: [&str; 3] = ["consumerInfo", "consumer", "data"];

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RequestKind {
    GetRouterRtpCapabilities,
    CreateWebRtcTransport,
    ConnectWebRtcTransport,
    Consume,
    Resume,
    Custom(String),
}

impl RequestKind {
    pub fn as_str(&self) -> &str {
        match self {
            RequestKind::GetRouterRtpCapabilities => "getRouterRtpCapabilities",
            RequestKind::CreateWebRtcTransport => "createWebRtcTransport",
            RequestKind::ConnectWebRtcTransport => "connectWebRtcTransport",
            RequestKind::Consume => "consume",
            RequestKind::Resume => "resume",
            RequestKind::Custom(name) => name.as_str(),
        }
    }

    /// The `type` the server uses when answering this request.
    pub fn response_kind(&self) -> &str {
        match self {
            RequestKind::GetRouterRtpCapabilities => "routerRtpCapabilities",
            RequestKind::CreateWebRtcTransport => "webRtcTransportCreated",
            RequestKind::ConnectWebRtcTransport => "webRtcTransportConnected",
            RequestKind::Consume => "consumerCreated",
            RequestKind::Resume => "consumerResumed",
            RequestKind::Custom(name) => name.as_str(),
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Serialize)]
pub struct RequestEnvelope<'a> {
    pub id: u64,
    #[serde(rename = "type")]
    pub kind: &'a str,
    pub payload: &'a Value,
}

/// A decoded inbound frame. The body keeps every field, including `type`.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    kind: String,
    id: Option<u64>,
    body: Map<String, Value>,
}

impl InboundMessage {
    pub fn parse(text: &str) -> SessionResult<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|err| SessionError::Protocol(format!("invalid signaling json: {err}")))?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> SessionResult<Self> {
        let Value::Object(body) = value else {
            return Err(SessionError::Protocol(
                "signaling message is not a json object".into(),
            ));
        };
        let kind = body
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| SessionError::Protocol("signaling message missing type".into()))?
            .to_string();
        let id = body.get("id").and_then(parse_request_id);
        Ok(Self { kind, id, body })
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn id(&self) -> Option<u64> {
        self.id
    }

    pub fn body(&self) -> &Map<String, Value> {
        &self.body
    }

    pub fn is_error(&self) -> bool {
        self.kind == ERROR_KIND
    }

    pub fn error_message(&self) -> String {
        match self.body.get("error") {
            Some(Value::String(text)) => text.clone(),
            Some(Value::Object(obj)) => obj
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown server error")
                .to_string(),
            _ => "unknown server error".to_string(),
        }
    }

    /// A field that is present and not `null`.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.body.get(name).filter(|value| !value.is_null())
    }

    pub fn first_field(&self, names: &[&str]) -> Option<&Value> {
        names.iter().find_map(|name| self.field(name))
    }

    /// The nested descriptor under one of `names`, or the body minus its
    /// `type` tag when the server sends the descriptor flat.
    pub fn descriptor(&self, names: &[&str]) -> Value {
        match self.first_field(names) {
            Some(nested) => nested.clone(),
            None => {
                let mut flat = self.body.clone();
                flat.remove("type");
                Value::Object(flat)
            }
        }
    }
}

fn parse_request_id(value: &Value) -> Option<u64> {
    match value {
        Value::Number(num) => num.as_u64(),
        Value::String(text) => text.parse::<u64>().ok(),
        _ => None,
    }
}

/// Server object ids arrive as strings or as numbers.
fn object_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(text) => Ok(text),
        Value::Number(num) => Ok(num.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {other}"
        ))),
    }
}

fn missing_fields(value: &Value, required: &[&'static str]) -> Vec<&'static str> {
    required
        .iter()
        .copied()
        .filter(|name| value.get(name).map(Value::is_null).unwrap_or(true))
        .collect()
}

/// Server-declared router capabilities. Opaque to the session; the media
/// runtime interprets them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RtpCapabilities(pub Value);

impl RtpCapabilities {
    pub fn codecs(&self) -> &[Value] {
        self.0
            .get("codecs")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn mime_types(&self) -> Vec<&str> {
        self.codecs()
            .iter()
            .filter_map(|codec| codec.get("mimeType").and_then(Value::as_str))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RtpParameters(pub Value);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceParameters {
    pub username_fragment: String,
    pub password: String,
    #[serde(default)]
    pub ice_lite: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub foundation: String,
    pub priority: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    pub port: u16,
    pub protocol: String,
    #[serde(rename = "type")]
    pub candidate_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tcp_type: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DtlsRole {
    #[default]
    Auto,
    Client,
    Server,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DtlsFingerprint {
    pub algorithm: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DtlsParameters {
    #[serde(default)]
    pub role: DtlsRole,
    pub fingerprints: Vec<DtlsFingerprint>,
}

/// Connection parameters the server issues for a new WebRTC transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportDescriptor {
    #[serde(deserialize_with = "object_id")]
    pub id: String,
    pub ice_parameters: IceParameters,
    #[serde(default)]
    pub ice_candidates: Vec<IceCandidate>,
    pub dtls_parameters: DtlsParameters,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sctp_parameters: Option<Value>,
}

impl TransportDescriptor {
    pub const REQUIRED_FIELDS: [&'static str; 3] = ["id", "iceParameters", "dtlsParameters"];

    pub fn from_value(value: &Value) -> Result<Self, String> {
        let missing = missing_fields(value, &Self::REQUIRED_FIELDS);
        if !missing.is_empty() {
            return Err(format!("descriptor missing {}", missing.join(", ")));
        }
        serde_json::from_value(value.clone()).map_err(|err| format!("malformed descriptor: {err}"))
    }
}

/// Consumer parameters the server issues for one producer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerDescriptor {
    #[serde(deserialize_with = "object_id")]
    pub id: String,
    #[serde(default, deserialize_with = "object_id")]
    pub producer_id: String,
    pub kind: MediaKind,
    pub rtp_parameters: RtpParameters,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub consumer_type: Option<String>,
    #[serde(default)]
    pub producer_paused: bool,
    #[serde(default)]
    pub paused: bool,
}

impl ConsumerDescriptor {
    pub const REQUIRED_FIELDS: [&'static str; 3] = ["id", "kind", "rtpParameters"];

    pub fn from_value(value: &Value) -> Result<Self, String> {
        let missing = missing_fields(value, &Self::REQUIRED_FIELDS);
        if !missing.is_empty() {
            return Err(format!("descriptor missing {}", missing.join(", ")));
        }
        serde_json::from_value(value.clone()).map_err(|err| format!("malformed descriptor: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_envelope_uses_type_tag() {
        let payload = json!({ "roomId": "dock-4" });
        let envelope = RequestEnvelope {
            id: 7,
            kind: RequestKind::GetRouterRtpCapabilities.as_str(),
            payload: &payload,
        };
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(
            value,
            json!({ "id": 7, "type": "getRouterRtpCapabilities", "payload": { "roomId": "dock-4" } })
        );
    }

    #[test]
    fn response_kinds_follow_server_naming() {
        assert_eq!(
            RequestKind::CreateWebRtcTransport.response_kind(),
            "webRtcTransportCreated"
        );
        assert_eq!(RequestKind::Resume.response_kind(), "consumerResumed");
        assert_eq!(
            RequestKind::Custom("getProducers".into()).response_kind(),
            "getProducers"
        );
    }

    #[test]
    fn inbound_parses_numeric_and_string_ids() {
        let numeric = InboundMessage::parse(r#"{"type":"consumerResumed","id":4}"#).unwrap();
        assert_eq!(numeric.id(), Some(4));
        let text = InboundMessage::parse(r#"{"type":"consumerResumed","id":"9"}"#).unwrap();
        assert_eq!(text.id(), Some(9));
        let none = InboundMessage::parse(r#"{"type":"consumerResumed"}"#).unwrap();
        assert_eq!(none.id(), None);
    }

    #[test]
    fn inbound_rejects_untyped_frames() {
        let err = InboundMessage::parse(r#"{"rtpCapabilities":{}}"#).unwrap_err();
        assert!(matches!(err, SessionError::Protocol(_)));
        let err = InboundMessage::parse("[1,2]").unwrap_err();
        assert!(matches!(err, SessionError::Protocol(_)));
    }

    #[test]
    fn error_message_reads_string_or_object() {
        let flat = InboundMessage::parse(r#"{"type":"error","error":"room not found"}"#).unwrap();
        assert!(flat.is_error());
        assert_eq!(flat.error_message(), "room not found");
        let nested =
            InboundMessage::parse(r#"{"type":"error","error":{"message":"bad transport"}}"#)
                .unwrap();
        assert_eq!(nested.error_message(), "bad transport");
    }

    #[test]
    fn capability_aliases_are_searched_in_order() {
        let message = InboundMessage::from_value(json!({
            "type": "routerRtpCapabilities",
            "rtpCapabilities": null,
            "capabilities": { "codecs": [] }
        }))
        .unwrap();
        assert_eq!(
            message.first_field(&CAPABILITY_FIELDS),
            Some(&json!({ "codecs": [] }))
        );
    }

    #[test]
    fn transport_descriptor_reports_missing_fields() {
        let value = json!({
            "id": "t1",
            "iceParameters": { "usernameFragment": "u", "password": "p" },
            "iceCandidates": []
        });
        let err = TransportDescriptor::from_value(&value).unwrap_err();
        assert_eq!(err, "descriptor missing dtlsParameters");
    }

    #[test]
    fn transport_descriptor_accepts_mediasoup_shape() {
        let value = json!({
            "id": "t1",
            "iceParameters": { "usernameFragment": "u", "password": "p", "iceLite": true },
            "iceCandidates": [{
                "foundation": "udpcandidate",
                "priority": 1076302079u64,
                "ip": "10.0.0.5",
                "address": "10.0.0.5",
                "port": 40000,
                "protocol": "udp",
                "type": "host"
            }],
            "dtlsParameters": {
                "role": "auto",
                "fingerprints": [{ "algorithm": "sha-256", "value": "AB:CD" }]
            }
        });
        let descriptor = TransportDescriptor::from_value(&value).unwrap();
        assert!(descriptor.ice_parameters.ice_lite);
        assert_eq!(descriptor.ice_candidates[0].candidate_type, "host");
        assert_eq!(descriptor.dtls_parameters.role, DtlsRole::Auto);
    }

    #[test]
    fn consumer_descriptor_requires_rtp_parameters() {
        let value = json!({ "id": "c1", "producerId": "p1", "kind": "video" });
        let err = ConsumerDescriptor::from_value(&value).unwrap_err();
        assert_eq!(err, "descriptor missing rtpParameters");
    }

    #[test]
    fn flat_descriptor_drops_the_message_tag() {
        let message = InboundMessage::from_value(json!({
            "type": "consumerCreated",
            "id": 17,
            "producerId": 9,
            "kind": "video",
            "rtpParameters": { "codecs": [] }
        }))
        .unwrap();
        let descriptor =
            ConsumerDescriptor::from_value(&message.descriptor(&CONSUMER_FIELDS)).unwrap();
        assert_eq!(descriptor.id, "17");
        assert_eq!(descriptor.producer_id, "9");
        assert_eq!(descriptor.consumer_type, None);
    }
}
