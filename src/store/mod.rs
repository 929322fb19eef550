//! Backend collaborators: the key directory and the tables this crate reads
//! and writes. Implementations live outside the crate; [`MemoryBackend`]
//! covers tests and embedding.

pub mod error;
pub mod memory;
pub mod traits;
pub mod types;

pub use error::StoreError;
pub use memory::MemoryBackend;
pub use traits::{ConversationKeyStore, KeyDirectory, MessageStore, PinCredentialStore};
pub use types::{ConversationKeyRow, PinCredential, PinWrapPatch, StoredMessage};
