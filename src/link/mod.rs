//! Account linking
//!
//! Links a chat identity to a ledger account with a short-lived, single-use
//! token handed out in a chat prompt and redeemed by the web callback.
//!
//! # Flow
//!
//! ```text
//! command → LinkGuard ──unlinked──→ TokenStore::issue → LinkPrompt (URL)
//!                                         ↓
//!   web sign-in → LinkCallback::complete → TokenStore::consume → AccountLinks::link
//! ```

pub mod accounts;
pub mod callback;
pub mod guard;
pub mod tokens;

pub use accounts::{AccountLinks, FileAccountLinks, LinkRecord, LinkRegistry, MemoryAccountLinks};
pub use callback::{LinkCallback, LinkError};
pub use guard::{LinkGuard, LinkPrompt, LinkStatus};
pub use tokens::{generate_token, LinkToken, TokenStore};
