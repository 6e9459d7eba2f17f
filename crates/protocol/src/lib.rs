//! Wire schema for the SkyVault storage HTTP API.
//!
//! This crate is the single deserialization boundary of the client: every
//! request body is built from these types and every response is decoded
//! into them. Alternate field spellings and response wrappers emitted by the
//! server are normalized here so that the upload core only ever sees one
//! canonical shape.

pub mod constants;
pub mod envelope;
pub mod messages;
pub mod types;

// Re-export primary types for convenience.
pub use constants::{Endpoint, ROOT_FOLDER_ID};
pub use envelope::{ApiErrorBody, decode_data, error_message};
pub use types::FileRecord;
