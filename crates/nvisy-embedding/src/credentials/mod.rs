//! Credential resolution for embedding providers.
//!
//! [`ApiKeyResolver`] finds the usable key for a (user, provider) pair by
//! consulting, in order, the [`KeyCache`], the user's own stored key, the
//! system key from configuration, and the least recently used pooled key.

mod cache;
mod key;
mod resolver;
mod store;

pub use cache::KeyCache;
pub use key::{ApiKey, KeySource, ResolvedKey};
pub use resolver::ApiKeyResolver;
pub use store::{ApiKeyRecord, InMemoryKeyStore, KeyStore};
