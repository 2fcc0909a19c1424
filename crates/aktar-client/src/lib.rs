//! # Aktar Client
//!
//! Client-side state for the storefront: the logged-in session, the guest
//! or member cart, and the theme preference. Each store is an explicit
//! instance over an injected [`Storage`] backend, persists every mutation
//! immediately, and broadcasts changes through a `tokio::sync::watch`
//! channel.
//!
//! ## Modules
//! - `storage` - Key/value persistence (memory, JSON files) and legacy key purge
//! - `session` - `{ token, user }` pair, set and cleared together
//! - `cart` - Line items bounded by last-known stock
//! - `theme` - Light/dark preference
//! - `api` - HTTP client for the captcha and auth endpoints
//! - `stores` - Opens all three stores after purging legacy keys

pub mod api;
pub mod cart;
pub mod error;
pub mod session;
pub mod storage;
pub mod stores;
pub mod theme;

pub use api::ApiClient;
pub use cart::{CartItem, CartStore, Price, Product};
pub use error::ClientError;
pub use session::{SessionData, SessionStore};
pub use storage::{FileStorage, MemoryStorage, Storage, purge_legacy_keys};
pub use stores::ClientStores;
pub use theme::{Theme, ThemeStore};
