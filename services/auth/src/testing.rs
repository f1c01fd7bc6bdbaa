//! In-process fakes of the identity provider and SDK loader.
//!
//! Available to this crate's tests and, with the `test-util` feature, to
//! dependent crates.

use async_trait::async_trait;
use common::{AppError, IdentityError};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

use crate::loader::{SdkLoader, TokenSink};
use crate::oauth::{IdentityProvider, Prompt, TokenGrant};

/// Scripted identity provider.
///
/// Responses are consumed in order; once the script is empty every request
/// fails with [`IdentityError::InteractionRequired`].
#[derive(Default)]
pub struct FakeIdentity {
    responses: Mutex<VecDeque<Result<TokenGrant, IdentityError>>>,
    requests: Mutex<Vec<Prompt>>,
    revoked: Mutex<Vec<String>>,
    revoke_fails: Mutex<bool>,
    revoke_notify: Notify,
    latency: Mutex<Option<Duration>>,
}

impl FakeIdentity {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_grant(&self, access_token: &str, expires_in: u64) {
        self.responses.lock().push_back(Ok(TokenGrant {
            access_token: access_token.to_string(),
            expires_in,
        }));
    }

    pub fn push_error(&self, err: IdentityError) {
        self.responses.lock().push_back(Err(err));
    }

    /// Delay every token response, to hold requests in flight
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = Some(latency);
    }

    pub fn set_revoke_fails(&self, fails: bool) {
        *self.revoke_fails.lock() = fails;
    }

    /// Prompts of every token request so far
    pub fn requests(&self) -> Vec<Prompt> {
        self.requests.lock().clone()
    }

    pub fn silent_requests(&self) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|p| **p == Prompt::Silent)
            .count()
    }

    pub fn revoked(&self) -> Vec<String> {
        self.revoked.lock().clone()
    }

    /// Wait until a revoke call has been made
    pub async fn wait_for_revoke(&self) {
        loop {
            let notified = self.revoke_notify.notified();
            if !self.revoked.lock().is_empty() {
                return;
            }
            notified.await;
        }
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentity {
    async fn request_access_token(&self, prompt: Prompt) -> Result<TokenGrant, IdentityError> {
        self.requests.lock().push(prompt);
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        self.responses
            .lock()
            .pop_front()
            .unwrap_or(Err(IdentityError::InteractionRequired))
    }

    async fn revoke(&self, access_token: &str) -> Result<(), IdentityError> {
        self.revoked.lock().push(access_token.to_string());
        self.revoke_notify.notify_waiters();
        if *self.revoke_fails.lock() {
            return Err(IdentityError::Provider("revocation endpoint down".into()));
        }
        Ok(())
    }
}

/// Token sink that remembers every token it was given
#[derive(Default)]
pub struct RecordingSink {
    history: Mutex<Vec<Option<String>>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Token currently active, if any
    pub fn current(&self) -> Option<String> {
        self.history.lock().last().cloned().flatten()
    }

    pub fn history(&self) -> Vec<Option<String>> {
        self.history.lock().clone()
    }
}

impl TokenSink for RecordingSink {
    fn set_token(&self, token: Option<&str>) {
        self.history.lock().push(token.map(str::to_string));
    }
}

/// Loader returning the given fakes, optionally failing one side
pub struct FakeLoader {
    identity: Arc<FakeIdentity>,
    sink: Arc<dyn TokenSink>,
    identity_failure: Option<String>,
    sheets_failure: Option<String>,
}

impl FakeLoader {
    pub fn new(identity: Arc<FakeIdentity>, sink: Arc<dyn TokenSink>) -> Self {
        Self {
            identity,
            sink,
            identity_failure: None,
            sheets_failure: None,
        }
    }

    pub fn failing_identity(mut self, reason: &str) -> Self {
        self.identity_failure = Some(reason.to_string());
        self
    }

    pub fn failing_sheets(mut self, reason: &str) -> Self {
        self.sheets_failure = Some(reason.to_string());
        self
    }
}

#[async_trait]
impl SdkLoader for FakeLoader {
    async fn load_identity(&self) -> Result<Arc<dyn IdentityProvider>, AppError> {
        if let Some(reason) = &self.identity_failure {
            return Err(AppError::SdkLoad {
                sdk: "identity client".to_string(),
                reason: reason.clone(),
            });
        }
        Ok(self.identity.clone())
    }

    async fn load_sheets(&self) -> Result<Arc<dyn TokenSink>, AppError> {
        if let Some(reason) = &self.sheets_failure {
            return Err(AppError::SdkLoad {
                sdk: "spreadsheet client".to_string(),
                reason: reason.clone(),
            });
        }
        Ok(self.sink.clone())
    }
}
