//! Conversion between [`Item`]s and the [`Document`]s persisted in the store.
//!
//! The scheduler owns the control fields (`_id`, `status`, `runDate`, `heartbeat`). A [`Codec`]
//! owns everything else: it turns the user payload into the extra fields stored next to the
//! control fields, and back again.
//!
//! [`JsonCodec`] covers any payload implementing [`Serialize`] and [`DeserializeOwned`].
//!
//! # Example
//!
//! ```
//! # use delayq::codec::{Codec, JsonCodec};
//! # use delayq::document::Document;
//! # use chrono::Utc;
//! #[derive(serde::Serialize, serde::Deserialize, Debug, PartialEq)]
//! struct SendEmail {
//!     to: String,
//! }
//!
//! let codec = JsonCodec::<SendEmail>::new();
//! let fields = codec.encode(&SendEmail { to: "someone@example.com".to_owned() }).unwrap();
//! let document = Document::pending(Utc::now(), fields).with_id("1".into());
//!
//! let item = codec.decode(document).unwrap();
//! assert_eq!(item.payload.to, "someone@example.com");
//! ```
use std::marker::PhantomData;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::{
    document::{fields, Document},
    item::Item,
};

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Document is missing the `{0}` field")]
    MissingField(&'static str),
    #[error("Unknown item status `{0}`")]
    InvalidStatus(String),
    #[error("Payload must serialize to an object, got {0}")]
    NotAnObject(&'static str),
    #[error("Payload field `{0}` clashes with a field owned by the scheduler")]
    ReservedField(String),
    #[error("Error encoding or decoding payload")]
    Payload(#[from] serde_json::Error),
}

pub trait Codec: Send + Sync {
    type Payload: Send;

    /// The payload as document fields.
    fn encode(&self, payload: &Self::Payload) -> Result<Map<String, Value>, CodecError>;

    /// Rebuild the payload from the document's user fields.
    fn decode_payload(&self, fields: Map<String, Value>) -> Result<Self::Payload, CodecError>;

    fn decode(&self, document: Document) -> Result<Item<Self::Payload>, CodecError> {
        let id = document.id.ok_or(CodecError::MissingField(fields::ID))?;
        let status = document
            .status
            .ok_or(CodecError::MissingField(fields::STATUS))?
            .parse()?;
        let run_date = document
            .run_date
            .ok_or(CodecError::MissingField(fields::RUN_DATE))?;
        Ok(Item {
            id,
            status,
            run_date,
            heartbeat: document.heartbeat,
            payload: self.decode_payload(document.payload)?,
        })
    }
}

/// A [`Codec`] for serde payloads.
///
/// Struct and map payloads become top level document fields. Payloads serializing to `null`,
/// such as `()`, add no fields.
pub struct JsonCodec<P> {
    _payload: PhantomData<fn() -> P>,
}

impl<P> JsonCodec<P> {
    pub const fn new() -> Self {
        Self {
            _payload: PhantomData,
        }
    }
}

impl<P> Default for JsonCodec<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> Clone for JsonCodec<P> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<P> std::fmt::Debug for JsonCodec<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonCodec")
            .field("payload", &std::any::type_name::<P>())
            .finish()
    }
}

impl<P> Codec for JsonCodec<P>
where
    P: Serialize + DeserializeOwned + Send,
{
    type Payload = P;

    fn encode(&self, payload: &P) -> Result<Map<String, Value>, CodecError> {
        let fields = match serde_json::to_value(payload)? {
            Value::Object(fields) => fields,
            Value::Null => Map::new(),
            Value::Bool(_) => return Err(CodecError::NotAnObject("a boolean")),
            Value::Number(_) => return Err(CodecError::NotAnObject("a number")),
            Value::String(_) => return Err(CodecError::NotAnObject("a string")),
            Value::Array(_) => return Err(CodecError::NotAnObject("an array")),
        };
        match fields.keys().find(|field| fields::is_reserved(field)) {
            Some(field) => Err(CodecError::ReservedField(field.clone())),
            None => Ok(fields),
        }
    }

    fn decode_payload(&self, fields: Map<String, Value>) -> Result<P, CodecError> {
        if fields.is_empty() {
            if let Ok(payload) = serde_json::from_value(Value::Null) {
                return Ok(payload);
            }
        }
        Ok(serde_json::from_value(Value::Object(fields))?)
    }
}
