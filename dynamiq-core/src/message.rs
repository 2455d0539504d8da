use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::num::ParseIntError;
use std::str::FromStr;

/// Upper bound of the message id space. Ids are 63-bit so they fit a signed
/// 64-bit secondary index on every backend.
pub const MAX_ID: u64 = i64::MAX as u64;

/// Content type stored when the producer does not provide one.
pub const DEFAULT_CONTENT_TYPE: &str = "application/json";

// MessageID is drawn uniformly at random from [0, MAX_ID).
// Uniqueness is probabilistic: two producers may draw the same id, the store
// then keeps both writes as siblings and the reader splits them apart again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MessageId(u64);

impl MessageId {
    pub fn new(id: u64) -> Self {
        MessageId(id)
    }

    /// Draw a fresh id from the whole id space.
    pub fn random() -> Self {
        MessageId(rand::thread_rng().gen_range(0..MAX_ID))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Display for MessageId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MessageId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u64>().map(MessageId)
    }
}

impl From<u64> for MessageId {
    fn from(id: u64) -> Self {
        MessageId(id)
    }
}

/// The value kept under one message id in the message store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredObject {
    pub body: Vec<u8>,
    pub content_type: String,
    // true when `body` holds the compressor output rather than the raw payload
    pub compressed: bool,
}

impl StoredObject {
    pub fn new(body: Vec<u8>, content_type: impl Into<String>, compressed: bool) -> Self {
        StoredObject {
            body,
            content_type: content_type.into(),
            compressed,
        }
    }

    /// Empty objects are delete markers left behind by the store.
    pub fn is_tombstone(&self) -> bool {
        self.body.is_empty()
    }
}

/// A message handed to a consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub body: Vec<u8>,
    pub content_type: String,
    // still set when decompression failed and the body is delivered as stored
    pub compressed: bool,
}

impl Message {
    pub fn from_object(id: MessageId, object: StoredObject) -> Self {
        Message {
            id,
            body: object.body,
            content_type: object.content_type,
            compressed: object.compressed,
        }
    }

    pub fn size(&self) -> usize {
        self.body.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_ids_stay_inside_the_id_space() {
        for _ in 0..1000 {
            assert!(MessageId::random().as_u64() < MAX_ID);
        }
    }

    #[test]
    fn message_id_parses_its_display_form() {
        let id = MessageId::new(4_611_686_018_427_387_904);
        let parsed: MessageId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert!("not-a-number".parse::<MessageId>().is_err());
    }

    #[test]
    fn empty_object_is_a_tombstone() {
        assert!(StoredObject::new(Vec::new(), DEFAULT_CONTENT_TYPE, false).is_tombstone());
        assert!(!StoredObject::new(b"x".to_vec(), DEFAULT_CONTENT_TYPE, false).is_tombstone());
    }
}
