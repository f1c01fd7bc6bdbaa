//! External SDK loading
//!
//! The identity SDK and the spreadsheet SDK load independently and
//! concurrently; client initialisation waits for both.

use async_trait::async_trait;
use common::{AppError, StatusBoard};
use std::sync::Arc;
use tracing::info;

use crate::oauth::IdentityProvider;

/// Receives the active access token (the spreadsheet client's `setToken`)
pub trait TokenSink: Send + Sync {
    fn set_token(&self, token: Option<&str>);
}

/// Loads the two external SDKs
#[async_trait]
pub trait SdkLoader: Send + Sync {
    /// Load and initialise the identity SDK
    async fn load_identity(&self) -> Result<Arc<dyn IdentityProvider>, AppError>;

    /// Load and initialise the spreadsheet SDK, returning its token slot
    async fn load_sheets(&self) -> Result<Arc<dyn TokenSink>, AppError>;
}

/// Both SDKs, ready for use
#[derive(Clone)]
pub struct LoadedSdks {
    pub identity: Arc<dyn IdentityProvider>,
    pub sheets: Arc<dyn TokenSink>,
}

/// Load both SDKs concurrently, publishing each readiness flag as it lands.
///
/// Fails with the first error; the other SDK's readiness flag may already be
/// set by then.
pub async fn load_all(loader: &dyn SdkLoader, board: &StatusBoard) -> Result<LoadedSdks, AppError> {
    let identity = async {
        let identity = loader.load_identity().await?;
        board.set_identity_ready();
        info!("Identity SDK ready");
        Ok::<_, AppError>(identity)
    };

    let sheets = async {
        let sheets = loader.load_sheets().await?;
        board.set_sheets_ready();
        info!("Spreadsheet SDK ready");
        Ok::<_, AppError>(sheets)
    };

    let (identity, sheets) = tokio::try_join!(identity, sheets)?;
    Ok(LoadedSdks { identity, sheets })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeIdentity, FakeLoader, RecordingSink};

    #[tokio::test]
    async fn test_load_all_sets_both_flags() {
        let board = StatusBoard::new();
        let loader = FakeLoader::new(FakeIdentity::new(), RecordingSink::new());

        assert!(load_all(&loader, &board).await.is_ok());
        let status = board.snapshot();
        assert!(status.identity_ready);
        assert!(status.sheets_ready);
    }

    #[tokio::test]
    async fn test_load_all_fails_if_either_sdk_fails() {
        let board = StatusBoard::new();
        let loader =
            FakeLoader::new(FakeIdentity::new(), RecordingSink::new()).failing_sheets("blocked");

        let err = load_all(&loader, &board).await.err().unwrap();
        assert!(matches!(err, AppError::SdkLoad { .. }));
        assert!(!board.snapshot().sheets_ready);

        let board = StatusBoard::new();
        let loader =
            FakeLoader::new(FakeIdentity::new(), RecordingSink::new()).failing_identity("offline");
        assert!(load_all(&loader, &board).await.is_err());
        assert!(!board.snapshot().identity_ready);
    }
}
