//! Shared command vocabulary and JSON codec for the session wire protocol.
//!
//! This crate owns the wire representation used by both the `relay` and the
//! `session` engine. Every transport frame is one self-describing JSON
//! object: `{"senderId": …, "command": "TAG", …command-specific fields…}`.
//! Unrecognized command tags decode into [`Command::Unknown`] so a client
//! can log-and-ignore forward-incompatible frames instead of dropping the
//! connection.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

mod math;

pub use math::{Mat4, Rgb, Vec3};

/// Error returned by [`encode`] and [`decode`].
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The raw text could not be parsed as JSON at all.
    #[error("frame is not valid JSON: {0}")]
    Malformed(serde_json::Error),
    /// The frame parsed, but the top level is not a JSON object.
    #[error("frame is not a JSON object")]
    NotAnObject,
    /// A required frame field is absent or of the wrong type.
    #[error("frame missing field `{0}`")]
    MissingField(&'static str),
    /// `senderId` is a number, but not one in the participant id range
    /// (negative, fractional, or past `u32::MAX`).
    #[error("sender id out of range: {0}")]
    SenderOutOfRange(serde_json::Number),
    /// The command tag is known but its payload fields do not deserialize.
    #[error("invalid payload for {command}: {source}")]
    Payload {
        command: String,
        source: serde_json::Error,
    },
    /// [`Command::Unknown`] cannot be re-encoded; clients never originate
    /// frames they do not understand.
    #[error("cannot encode unknown command `{0}`")]
    UnknownCommand(String),
}

// =============================================================================
// PAYLOAD TYPES
// =============================================================================

/// Reference to a scene node by stable name, with the sender's runtime id
/// attached as advisory extras. Receivers resolve by `name`; the runtime id
/// is only meaningful on the client that produced it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRef {
    pub name: String,
    pub extras: NodeExtras,
}

/// Sender-local runtime identifier carried alongside a node name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeExtras {
    pub node_id: u32,
}

/// A node name plus its new local transform.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeTransform {
    pub name: String,
    pub matrix: Mat4,
    pub extras: NodeExtras,
}

/// A pointer annotation ray from `origin` to `end`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointerRay {
    pub origin: Vec3,
    pub end: Vec3,
}

/// An ephemeral marker ray. Ids are assigned by the owning client and are
/// only unique per owner.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Marker {
    pub id: i64,
    pub origin: Vec3,
    pub end: Vec3,
    pub color: Rgb,
}

/// Marker reference used by `DELETE_MARKER`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkerRef {
    pub id: i64,
}

/// Request to create a dynamic scene entity. `name` is assigned by the
/// relay when absent.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrimitiveSpec {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matrix: Option<Mat4>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

// Per-command payload envelopes. Each matches the wire shape of its
// command's fields after `senderId` and `command` are stripped.

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPayload {
    pub user_id: u32,
    pub color: Rgb,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserIdPayload {
    pub user_id: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodesPayload {
    pub nodes: Vec<NodeRef>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformsPayload {
    pub nodes: Vec<NodeTransform>,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraPayload {
    pub view_matrix: Mat4,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointerPayload {
    pub pointer: PointerRay,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkerPayload {
    pub marker: Marker,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkerRefPayload {
    pub marker: MarkerRef,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrimitivePayload {
    pub primitive: PrimitiveSpec,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrimitiveRefPayload {
    pub primitive_id: String,
}

// =============================================================================
// COMMAND VOCABULARY
// =============================================================================

/// The closed command vocabulary, one variant per wire tag. The dispatcher
/// matches exhaustively over this enum, so growing the vocabulary is a
/// compile-time-checked exercise.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// Relay assigns the local identity. First frame after connect.
    SetUser(UserPayload),
    /// Another participant joined (or the roster replay on join).
    NewUser(UserPayload),
    /// A participant left; all of their markers go with them.
    RemoveUser(UserIdPayload),
    Select(NodesPayload),
    Deselect(NodesPayload),
    UpdateTransform(TransformsPayload),
    UpdateCamera(CameraPayload),
    StartPointer,
    UpdatePointer(PointerPayload),
    EndPointer,
    AddMarker(MarkerPayload),
    DeleteMarker(MarkerRefPayload),
    AddPrimitive(PrimitivePayload),
    DeletePrimitive(PrimitiveRefPayload),
    /// Forward-compatibility catch-all: a tag this build does not know,
    /// with its raw payload object preserved for logging.
    Unknown { command: String, payload: Value },
}

impl Command {
    /// The wire tag for this command.
    #[must_use]
    pub fn tag(&self) -> &str {
        match self {
            Self::SetUser(_) => "SET_USER",
            Self::NewUser(_) => "NEW_USER",
            Self::RemoveUser(_) => "REMOVE_USER",
            Self::Select(_) => "SELECT",
            Self::Deselect(_) => "DESELECT",
            Self::UpdateTransform(_) => "UPDATE_TRANSFORM",
            Self::UpdateCamera(_) => "UPDATE_CAMERA",
            Self::StartPointer => "START_POINTER",
            Self::UpdatePointer(_) => "UPDATE_POINTER",
            Self::EndPointer => "END_POINTER",
            Self::AddMarker(_) => "ADD_MARKER",
            Self::DeleteMarker(_) => "DELETE_MARKER",
            Self::AddPrimitive(_) => "ADD_PRIMITIVE",
            Self::DeletePrimitive(_) => "DELETE_PRIMITIVE",
            Self::Unknown { command, .. } => command,
        }
    }
}

/// A single message on the wire: who sent it and what they said.
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    /// Relay-assigned participant id of the sender.
    pub sender_id: u32,
    pub command: Command,
}

impl Message {
    #[must_use]
    pub fn new(sender_id: u32, command: Command) -> Self {
        Self { sender_id, command }
    }
}

// =============================================================================
// CODEC
// =============================================================================

/// Encode a message into one JSON frame.
///
/// # Errors
///
/// Returns [`CodecError::UnknownCommand`] for [`Command::Unknown`]; known
/// payloads always serialize.
pub fn encode(message: &Message) -> Result<String, CodecError> {
    let payload = match &message.command {
        Command::SetUser(p) => to_payload(p),
        Command::NewUser(p) => to_payload(p),
        Command::RemoveUser(p) => to_payload(p),
        Command::Select(p) => to_payload(p),
        Command::Deselect(p) => to_payload(p),
        Command::UpdateTransform(p) => to_payload(p),
        Command::UpdateCamera(p) => to_payload(p),
        Command::StartPointer | Command::EndPointer => Map::new(),
        Command::UpdatePointer(p) => to_payload(p),
        Command::AddMarker(p) => to_payload(p),
        Command::DeleteMarker(p) => to_payload(p),
        Command::AddPrimitive(p) => to_payload(p),
        Command::DeletePrimitive(p) => to_payload(p),
        Command::Unknown { command, .. } => {
            return Err(CodecError::UnknownCommand(command.clone()));
        }
    };

    let mut frame = payload;
    frame.insert("senderId".into(), Value::from(message.sender_id));
    frame.insert("command".into(), Value::from(message.command.tag()));

    serde_json::to_string(&Value::Object(frame)).map_err(CodecError::Malformed)
}

/// Decode one JSON frame into a message.
///
/// # Errors
///
/// Malformed JSON, a non-object frame, missing `senderId`/`command`, and
/// ill-typed payloads for known tags are all [`CodecError`] variants.
/// Unrecognized tags decode *successfully* into [`Command::Unknown`].
pub fn decode(text: &str) -> Result<Message, CodecError> {
    let value: Value = serde_json::from_str(text).map_err(CodecError::Malformed)?;
    let Value::Object(mut frame) = value else {
        return Err(CodecError::NotAnObject);
    };

    let Some(Value::Number(sender)) = frame.remove("senderId") else {
        return Err(CodecError::MissingField("senderId"));
    };
    let sender_id = sender
        .as_u64()
        .and_then(|id| u32::try_from(id).ok())
        .ok_or(CodecError::SenderOutOfRange(sender))?;

    let tag = match frame.remove("command") {
        Some(Value::String(tag)) => tag,
        _ => return Err(CodecError::MissingField("command")),
    };

    let payload = Value::Object(frame);
    let command = match tag.as_str() {
        "SET_USER" => Command::SetUser(from_payload(&tag, payload)?),
        "NEW_USER" => Command::NewUser(from_payload(&tag, payload)?),
        "REMOVE_USER" => Command::RemoveUser(from_payload(&tag, payload)?),
        "SELECT" => Command::Select(from_payload(&tag, payload)?),
        "DESELECT" => Command::Deselect(from_payload(&tag, payload)?),
        "UPDATE_TRANSFORM" => Command::UpdateTransform(from_payload(&tag, payload)?),
        "UPDATE_CAMERA" => Command::UpdateCamera(from_payload(&tag, payload)?),
        "START_POINTER" => Command::StartPointer,
        "UPDATE_POINTER" => Command::UpdatePointer(from_payload(&tag, payload)?),
        "END_POINTER" => Command::EndPointer,
        "ADD_MARKER" => Command::AddMarker(from_payload(&tag, payload)?),
        "DELETE_MARKER" => Command::DeleteMarker(from_payload(&tag, payload)?),
        "ADD_PRIMITIVE" => Command::AddPrimitive(from_payload(&tag, payload)?),
        "DELETE_PRIMITIVE" => Command::DeletePrimitive(from_payload(&tag, payload)?),
        _ => Command::Unknown {
            command: tag,
            payload,
        },
    };

    Ok(Message { sender_id, command })
}

fn to_payload<T: Serialize>(payload: &T) -> Map<String, Value> {
    // Payload envelopes are plain structs; they always serialize to objects.
    match serde_json::to_value(payload) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    }
}

fn from_payload<T: for<'de> Deserialize<'de>>(tag: &str, payload: Value) -> Result<T, CodecError> {
    serde_json::from_value(payload).map_err(|source| CodecError::Payload {
        command: tag.to_owned(),
        source,
    })
}

#[cfg(test)]
#[path = "lib_test.rs"]
mod tests;
