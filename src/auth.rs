//! Command authorization.
//!
//! Administrative commands are accepted from a sender in the local trust
//! list, or from anyone whose payload carries the elevated marker: a
//! structured list whose last element is the string `"sudo"`. The marker is
//! stripped before the handler sees the payload.
//!
//! [`elevate`] adds the marker so that stripping gives back the same payload.
//! A value whose JSON form would come back as a different kind (raw bytes, a
//! bare JSON scalar) is sent as a single `{"tag": <payload tag>, "value": ..}`
//! element.
//!
//! # Example
//!
//! ```
//! use espnow_link::auth::AuthorizationContext;
//! use espnow_link::payload::Payload;
//! use espnow_link::peer::PeerAddress;
//! use serde_json::json;
//!
//! let sender = PeerAddress::new([1, 2, 3, 4, 5, 6]);
//! let payload = Payload::Structured(json!(["Pixel", "sudo"]));
//!
//! let ctx = AuthorizationContext::evaluate(&sender, &[], payload);
//! assert!(ctx.is_authorized());
//! assert_eq!(ctx.payload(), &Payload::from("Pixel"));
//! ```

use crate::payload::{Payload, PayloadTag};
use crate::peer::PeerAddress;
use serde_json::{Map, Value};

/// Last element of a structured payload that requests elevation.
pub const ELEVATED_MARKER: &str = "sudo";

const TAG_KEY: &str = "tag";
const VALUE_KEY: &str = "value";

/// Authorization outcome for one inbound command.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthorizationContext {
    trusted: bool,
    elevated: bool,
    payload: Payload,
}

impl AuthorizationContext {
    /// Evaluate a sender and payload against the trust list.
    pub fn evaluate(sender: &PeerAddress, trust: &[PeerAddress], payload: Payload) -> Self {
        let trusted = trust.contains(sender);
        let (elevated, payload) = strip_marker(payload);
        Self {
            trusted,
            elevated,
            payload,
        }
    }

    /// Sender is in the trust list.
    pub fn is_trusted(&self) -> bool {
        self.trusted
    }

    /// Payload carried the elevated marker.
    pub fn is_elevated(&self) -> bool {
        self.elevated
    }

    /// May run administrative commands.
    pub fn is_authorized(&self) -> bool {
        self.trusted || self.elevated
    }

    /// Payload with the marker removed.
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn into_payload(self) -> Payload {
        self.payload
    }
}

/// Append the elevated marker to a command payload.
pub fn elevate(payload: Payload) -> Payload {
    let marker = Value::String(ELEVATED_MARKER.to_string());
    let mut items = match payload {
        Payload::None => Vec::new(),
        Payload::Structured(Value::Array(items)) if items.len() > 1 => items,
        other => vec![typed_element(other)],
    };
    items.push(marker);
    Payload::Structured(Value::Array(items))
}

/// Remove a trailing `"sudo"` from a structured list.
///
/// A single remaining element is unwrapped into its typed payload, an empty
/// remainder becomes `Payload::None`.
fn strip_marker(payload: Payload) -> (bool, Payload) {
    let Payload::Structured(Value::Array(mut items)) = payload else {
        return (false, payload);
    };
    if items.last().and_then(Value::as_str) != Some(ELEVATED_MARKER) {
        return (false, Payload::Structured(Value::Array(items)));
    }
    items.pop();
    let stripped = match items.len() {
        0 => Payload::None,
        1 => from_element(items.remove(0)),
        _ => Payload::Structured(Value::Array(items)),
    };
    (true, stripped)
}

fn json_form(payload: &Payload) -> Value {
    match payload {
        Payload::None => Value::Null,
        Payload::Raw(bytes) => Value::from(bytes.clone()),
        Payload::Bool(b) => Value::Bool(*b),
        Payload::Int(i) => Value::from(*i),
        Payload::Float(f) => Value::from(*f),
        Payload::Str(s) => Value::String(s.clone()),
        Payload::Structured(value) => value.clone(),
    }
}

/// The list element carrying `payload`, tagged when plain JSON would change its kind.
fn typed_element(payload: Payload) -> Value {
    let value = json_form(&payload);
    if !is_tagged(&value) && Payload::from_json_value(value.clone()) == payload {
        return value;
    }
    let mut tagged = Map::new();
    tagged.insert(TAG_KEY.to_string(), Value::from(payload.tag().as_u8()));
    tagged.insert(VALUE_KEY.to_string(), value);
    Value::Object(tagged)
}

fn is_tagged(value: &Value) -> bool {
    match value {
        Value::Object(map) => {
            map.len() == 2 && map.contains_key(TAG_KEY) && map.contains_key(VALUE_KEY)
        }
        _ => false,
    }
}

fn from_element(element: Value) -> Payload {
    if !is_tagged(&element) {
        return Payload::from_json_value(element);
    }
    let tag = element
        .get(TAG_KEY)
        .and_then(Value::as_u64)
        .and_then(|t| u8::try_from(t).ok())
        .and_then(|t| PayloadTag::try_from(t).ok());
    let value = element.get(VALUE_KEY).cloned().unwrap_or(Value::Null);
    let typed = match tag {
        Some(PayloadTag::None) => Some(Payload::None),
        Some(PayloadTag::Raw) => serde_json::from_value::<Vec<u8>>(value).ok().map(Payload::Raw),
        Some(PayloadTag::Structured) => Some(Payload::Structured(value)),
        Some(PayloadTag::Float) => Some(Payload::Float(
            value.as_f64().map_or(f32::NAN, |f| f as f32),
        )),
        Some(PayloadTag::Bool | PayloadTag::Int | PayloadTag::Str) => {
            Some(Payload::from_json_value(value))
        }
        Some(PayloadTag::Long) | None => None,
    };
    typed.unwrap_or(Payload::Structured(element))
}
