// State management module
// Token persistence and the callback server's shared state

/// Shared state of the callback server
pub mod app_state;
/// Token file persistence
pub mod token_store;

pub use app_state::{AppState, PendingLogin, SharedState};
pub use token_store::{
    SamlSession, StoreError, StoredTokens, TokenKind, TokenRecord, TokenStore,
    EXPIRY_BUFFER_SECS,
};
