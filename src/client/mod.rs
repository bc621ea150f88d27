//! Client-side core: session tokens and the realtime binding.
//!
//! Everything a UI process embeds to talk to the platform: the
//! [`TokenStore`] holding the current session, the [`SessionTokenManager`]
//! that keeps requests authenticated across access-token expiry with
//! at-most-one refresh in flight, and the [`RealtimeClient`] that joins
//! project rooms over the gateway's WebSocket and streams their events.

pub mod binding;
pub mod session;
pub mod token_manager;

pub use binding::RealtimeClient;
pub use session::{Session, TokenStore};
pub use token_manager::SessionTokenManager;
