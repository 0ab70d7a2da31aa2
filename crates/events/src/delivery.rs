use uuid::Uuid;

/// An inbound message as handed out by a [`Transport`](crate::Transport).
///
/// Notes:
/// - `payload` is opaque here; the relay decodes it.
/// - `id` is assigned locally on receipt (UUIDv7) and only correlates log
///   lines. It is not a broker identity and does not survive a republish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    id: Uuid,
    payload: Vec<u8>,
}

impl Delivery {
    pub fn new(payload: impl Into<Vec<u8>>) -> Self {
        Self::with_id(Uuid::now_v7(), payload)
    }

    pub fn with_id(id: Uuid, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            id,
            payload: payload.into(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Payload rendered for log lines.
    pub fn payload_lossy(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }
}
