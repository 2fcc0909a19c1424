//! # Aktar Common
//!
//! Shared types, errors, and constants used by the Aktar API and client.
//!
//! ## Modules
//! - `types` - Wire types (PublicChallenge, UserProfile, ApiResponse, etc.)
//! - `error` - Common error taxonomy
//! - `constants` - Shared configuration constants

pub mod constants;
pub mod error;
pub mod types;

pub use error::AktarError;
pub use types::*;
