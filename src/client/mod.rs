//! Client SDK for the CareLink auth service: durable session snapshot
//! handling plus the network calls that mutate it.

pub mod error;
pub mod session;
pub mod store;

pub use error::ClientError;
pub use session::{AuthClient, Session};
pub use store::{FileStore, MemoryStore, SessionStore};
