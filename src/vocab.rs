//! Bijective mapping between token ids and the byte strings they stand for.

use ahash::AHashMap;

use crate::config::BASE_VOCAB_SIZE;
use crate::error::{BpeError, Result};
use crate::model::TokenId;

/// Immutable id ↔ bytes table consumed by the encoder and decoder.
#[derive(Debug, Clone, Default)]
pub struct Vocabulary {
    id_to_bytes: AHashMap<TokenId, Vec<u8>>,
    bytes_to_id: AHashMap<Vec<u8>, TokenId>,
}

impl Vocabulary {
    /// Builds a vocabulary, rejecting duplicate ids or byte strings.
    pub fn from_entries<I>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (TokenId, Vec<u8>)>,
    {
        let entries = entries.into_iter();
        let (lower, _) = entries.size_hint();
        let mut id_to_bytes = AHashMap::with_capacity(lower);
        let mut bytes_to_id = AHashMap::with_capacity(lower);
        for (id, bytes) in entries {
            if let Some(previous) = bytes_to_id.insert(bytes.clone(), id) {
                return Err(BpeError::Format(format!(
                    "byte string {bytes:?} is assigned to both id {previous} and id {id}"
                )));
            }
            if id_to_bytes.insert(id, bytes).is_some() {
                return Err(BpeError::Format(format!("id {id} is assigned twice")));
            }
        }
        Ok(Self {
            id_to_bytes,
            bytes_to_id,
        })
    }

    /// Returns the 256-entry byte alphabet where id `b` maps to the single byte `b`.
    #[must_use]
    pub fn byte_level() -> Self {
        let mut id_to_bytes = AHashMap::with_capacity(BASE_VOCAB_SIZE);
        let mut bytes_to_id = AHashMap::with_capacity(BASE_VOCAB_SIZE);
        for byte in 0u8..=u8::MAX {
            id_to_bytes.insert(TokenId::from(byte), vec![byte]);
            bytes_to_id.insert(vec![byte], TokenId::from(byte));
        }
        Self {
            id_to_bytes,
            bytes_to_id,
        }
    }

    /// Checks that ids `0..=255` hold the single byte equal to their own value.
    pub fn validate_base_alphabet(&self) -> Result<()> {
        for byte in 0u8..=u8::MAX {
            let id = TokenId::from(byte);
            match self.id_to_bytes.get(&id) {
                Some(bytes) if bytes.as_slice() == [byte] => {}
                Some(bytes) => {
                    return Err(BpeError::Format(format!(
                        "base id {id} must map to byte {byte:#04x}, found {bytes:?}"
                    )))
                }
                None => {
                    return Err(BpeError::Format(format!(
                        "base id {id} is missing from the vocabulary"
                    )))
                }
            }
        }
        Ok(())
    }

    /// Number of entries in the vocabulary.
    #[must_use]
    pub fn len(&self) -> usize {
        self.id_to_bytes.len()
    }

    /// Returns `true` when the vocabulary holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.id_to_bytes.is_empty()
    }

    /// Looks up the bytes of `id`.
    #[must_use]
    pub fn token_bytes(&self, id: TokenId) -> Option<&[u8]> {
        self.id_to_bytes.get(&id).map(Vec::as_slice)
    }

    /// Looks up the id of `bytes`.
    #[must_use]
    pub fn token_id(&self, bytes: &[u8]) -> Option<TokenId> {
        self.bytes_to_id.get(bytes).copied()
    }

    /// Returns all entries ordered by id.
    #[must_use]
    pub fn entries(&self) -> Vec<(TokenId, &[u8])> {
        let mut entries: Vec<(TokenId, &[u8])> = self
            .id_to_bytes
            .iter()
            .map(|(&id, bytes)| (id, bytes.as_slice()))
            .collect();
        entries.sort_unstable_by_key(|(id, _)| *id);
        entries
    }
}
