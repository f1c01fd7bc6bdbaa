//! Session service for the Balanciago editor
//!
//! Loads the identity and spreadsheet SDKs, manages the OAuth2 token
//! lifecycle and gates every remote spreadsheet call on a valid token.

pub mod loader;
pub mod oauth;
pub mod session;
pub mod token_store;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use loader::{LoadedSdks, SdkLoader, TokenSink, load_all};
pub use oauth::{
    ConsentHandler, ConsentResponse, GoogleOAuthConfig, GoogleTokenClient, IdentityProvider,
    Prompt, TokenGrant,
};
pub use session::{
    REFRESH_LOOKAHEAD_MS, SESSION_EXPIRED_MESSAGE, Session, SessionManager, SessionPhase,
};
pub use token_store::{PersistedTokenRecord, TokenStore};
