//! Transaction envelopes
//!
//! Every transaction submitted to the ordering service travels as an
//! [`Envelope`]: an opaque byte payload that decodes to a [`Payload`] carrying
//! a channel header and a type-dependent body. Configuration machinery nests
//! envelopes inside envelopes (a channel-creation transaction is an
//! `OrdererTransaction` envelope whose body is a `Config` envelope for the
//! new channel), so the model keeps each layer as marshaled bytes rather than
//! flattening the structure.

use crate::error::{Error, Result};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Marshal a value to its canonical byte encoding.
pub fn marshal<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    bincode::serialize(value).map_err(|e| Error::serialization(e.to_string()))
}

/// Unmarshal a value from its canonical byte encoding.
pub fn unmarshal<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    bincode::deserialize(bytes).map_err(|e| Error::serialization(e.to_string()))
}

/// Declared type of a transaction, carried in its channel header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HeaderType {
    /// A normal application transaction, ordered as-is
    Message,
    /// A proposed configuration update, not yet committed
    ConfigUpdate,
    /// A committed configuration transaction
    Config,
    /// A system-channel wrapper around a new channel's config transaction
    OrdererTransaction,
}

/// Channel header naming the channel a transaction targets and its type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelHeader {
    /// Declared transaction type
    pub header_type: HeaderType,
    /// Channel the transaction targets; case-sensitive, opaque
    pub channel_id: String,
    /// Submitter-assigned transaction identifier
    pub tx_id: String,
}

/// Header of a payload. Signature headers are out of scope for this core;
/// only the channel header is modeled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// Channel routing header
    pub channel_header: ChannelHeader,
}

/// Decoded body of an envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    /// Routing and typing header
    pub header: Header,
    /// Type-dependent body, itself marshaled
    pub data: Vec<u8>,
}

/// An opaque, submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Marshaled [`Payload`]
    pub payload: Vec<u8>,
}

impl Envelope {
    /// Wrap a payload into an envelope.
    pub fn wrap(payload: &Payload) -> Result<Self> {
        Ok(Self {
            payload: marshal(payload)?,
        })
    }

    /// Build an envelope of the given type around an already-marshaled body.
    pub fn create(
        header_type: HeaderType,
        channel_id: impl Into<String>,
        tx_id: impl Into<String>,
        data: Vec<u8>,
    ) -> Result<Self> {
        Self::wrap(&Payload {
            header: Header {
                channel_header: ChannelHeader {
                    header_type,
                    channel_id: channel_id.into(),
                    tx_id: tx_id.into(),
                },
            },
            data,
        })
    }

    /// Decode the payload.
    pub fn unwrap_payload(&self) -> Result<Payload> {
        unmarshal(&self.payload)
    }

    /// Decode only the channel header.
    pub fn channel_header(&self) -> Result<ChannelHeader> {
        Ok(self.unwrap_payload()?.header.channel_header)
    }
}
