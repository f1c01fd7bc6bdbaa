//! Session management
//!
//! [`SessionManager`] owns the OAuth2 token lifecycle: SDK start-up, restoring
//! the persisted token, interactive sign-in, single-flight silent refresh,
//! the validity check that gates every remote call, and sign-out.
//!
//! Phases:
//!
//! ```text
//! Uninitialized -> Initializing -> SignedOut <-> SigningIn -> SignedIn
//!                                     ^                          |  ^
//!                                     +------- Refreshing <------+  |
//!                                                  +----------------+
//! ```
//!
//! The state lock is never held across an `.await`.

use common::{AppError, Clock, KeyValueStore, Operation, Status, StatusBoard, SystemClock};
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::loader::{SdkLoader, TokenSink, load_all};
use crate::oauth::{IdentityProvider, Prompt, TokenGrant};
use crate::token_store::{PersistedTokenRecord, TokenStore};

/// Tokens expiring within this window are refreshed before use
pub const REFRESH_LOOKAHEAD_MS: i64 = 120_000;

/// Message recorded when a remote call finds no usable session
pub const SESSION_EXPIRED_MESSAGE: &str = "Session expired. Please sign in again.";

/// Session manager phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Uninitialized,
    Initializing,
    SignedOut,
    SigningIn,
    SignedIn,
    Refreshing,
}

/// In-memory authentication state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub access_token: Option<String>,
    pub signed_in: bool,
    pub expiry: Option<i64>,
}

impl Session {
    fn signed_in(access_token: String, expiry: i64) -> Self {
        Self {
            access_token: Some(access_token),
            signed_in: true,
            expiry: Some(expiry),
        }
    }
}

struct SessionState {
    phase: SessionPhase,
    /// Bumped whenever the session is cleared; a token request only counts
    /// if the epoch it started in is still current
    epoch: u64,
    session: Session,
    identity: Option<Arc<dyn IdentityProvider>>,
    sheets: Option<Arc<dyn TokenSink>>,
}

type RefreshFuture = Shared<BoxFuture<'static, bool>>;

/// Session manager
#[derive(Clone)]
pub struct SessionManager {
    loader: Arc<dyn SdkLoader>,
    tokens: TokenStore,
    clock: Arc<dyn Clock>,
    board: StatusBoard,
    revoke_on_sign_out: bool,
    state: Arc<Mutex<SessionState>>,
    refresh: Arc<Mutex<Option<RefreshFuture>>>,
}

impl SessionManager {
    /// Create a new session manager
    ///
    /// `token_key` is the storage key of the persisted token record.
    pub fn new(
        loader: Arc<dyn SdkLoader>,
        store: Arc<dyn KeyValueStore>,
        token_key: impl Into<String>,
        board: StatusBoard,
    ) -> Self {
        Self {
            loader,
            tokens: TokenStore::new(store, token_key),
            clock: Arc::new(SystemClock),
            board,
            revoke_on_sign_out: true,
            state: Arc::new(Mutex::new(SessionState {
                phase: SessionPhase::Uninitialized,
                epoch: 0,
                session: Session::default(),
                identity: None,
                sheets: None,
            })),
            refresh: Arc::new(Mutex::new(None)),
        }
    }

    /// Use a custom clock
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Whether sign-out revokes the token with the provider (default: true)
    pub fn with_revoke_on_sign_out(mut self, revoke: bool) -> Self {
        self.revoke_on_sign_out = revoke;
        self
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.lock().phase
    }

    pub fn session(&self) -> Session {
        self.state.lock().session.clone()
    }

    pub fn is_signed_in(&self) -> bool {
        self.state.lock().session.signed_in
    }

    /// Observable status shared with the UI
    pub fn status(&self) -> watch::Receiver<Status> {
        self.board.subscribe()
    }

    pub fn board(&self) -> &StatusBoard {
        &self.board
    }

    pub fn clear_error(&self) {
        self.board.clear_error();
    }

    /// Load both SDKs and restore the previous session.
    ///
    /// Only the first call does anything. Failures are recorded in the
    /// last-error slot and leave the manager signed out.
    pub async fn initialize(&self) {
        {
            let mut state = self.state.lock();
            if state.phase != SessionPhase::Uninitialized {
                debug!("Session manager already initialized ({:?})", state.phase);
                return;
            }
            state.phase = SessionPhase::Initializing;
        }

        info!("Initializing session manager");
        let _loading = self.board.begin_loading();

        match load_all(self.loader.as_ref(), &self.board).await {
            Ok(sdks) => {
                let mut state = self.state.lock();
                state.identity = Some(sdks.identity);
                state.sheets = Some(sdks.sheets);
            }
            Err(e) => {
                self.board.record_error(Operation::Initialize, e);
                self.clear_state().await;
                return;
            }
        }

        self.restore_session().await;
        info!("Session manager initialized, phase {:?}", self.phase());
    }

    /// Adopt a still-valid persisted token, otherwise try a silent refresh
    async fn restore_session(&self) {
        let now = self.clock.now_millis();

        match self.tokens.load().await {
            Ok(Some(record)) if !record.is_expired(now) => {
                info!("Restoring persisted session");
                self.adopt(record);
                return;
            }
            Ok(Some(_)) => info!("Persisted token expired, trying silent refresh"),
            Ok(None) => debug!("No persisted token, trying silent refresh"),
            Err(e) => {
                self.board.record_error(Operation::RestoreSession, e);
                if let Err(e) = self.tokens.clear().await {
                    warn!("Failed to delete malformed token record: {}", e);
                }
            }
        }

        if !self.silent_refresh().await {
            self.clear_state().await;
        }
    }

    /// Interactive sign-in with a visible consent prompt.
    ///
    /// A no-op unless the manager is signed out with the identity SDK loaded.
    /// Returns whether the session is signed in afterwards.
    pub async fn sign_in(&self) -> bool {
        let (identity, epoch) = {
            let mut state = self.state.lock();
            if state.phase != SessionPhase::SignedOut {
                debug!("Ignoring sign-in request in phase {:?}", state.phase);
                return state.session.signed_in;
            }
            let Some(identity) = state.identity.clone() else {
                debug!("Ignoring sign-in request, identity SDK not loaded");
                return false;
            };
            state.phase = SessionPhase::SigningIn;
            (identity, state.epoch)
        };

        info!("Starting interactive sign-in");
        let _loading = self.board.begin_loading();

        match identity.request_access_token(Prompt::Consent).await {
            Ok(grant) => self.accept_grant(grant, epoch, Operation::SignIn).await,
            Err(e) => {
                {
                    let mut state = self.state.lock();
                    if state.epoch != epoch {
                        debug!("Dropping sign-in failure from a cleared session");
                        return false;
                    }
                    state.phase = SessionPhase::SignedOut;
                }
                self.board.record_error(Operation::SignIn, e.into());
                false
            }
        }
    }

    /// Silent token refresh; single-flight.
    ///
    /// Concurrent callers share the outstanding refresh and all observe its
    /// outcome. On failure the session and persisted record are cleared, but
    /// the token is not revoked.
    pub async fn silent_refresh(&self) -> bool {
        let flight = {
            let mut slot = self.refresh.lock();
            match slot.as_ref() {
                Some(flight) => {
                    debug!("Joining in-flight silent refresh");
                    flight.clone()
                }
                None => {
                    let this = self.clone();
                    let flight = async move {
                        let outcome = this.run_silent_refresh().await;
                        *this.refresh.lock() = None;
                        outcome
                    }
                    .boxed()
                    .shared();
                    *slot = Some(flight.clone());
                    flight
                }
            }
        };

        flight.await
    }

    async fn run_silent_refresh(&self) -> bool {
        let (identity, epoch) = {
            let mut state = self.state.lock();
            match state.phase {
                SessionPhase::SignedIn => state.phase = SessionPhase::Refreshing,
                SessionPhase::Initializing | SessionPhase::Refreshing => {}
                phase => {
                    debug!("Skipping silent refresh in phase {:?}", phase);
                    return false;
                }
            }
            (state.identity.clone(), state.epoch)
        };

        let Some(identity) = identity else {
            return false;
        };

        info!("Requesting silent token refresh");
        match identity.request_access_token(Prompt::Silent).await {
            Ok(grant) => {
                self.accept_grant(grant, epoch, Operation::SilentRefresh)
                    .await
            }
            Err(e) => {
                warn!("Silent refresh failed: {}", e);
                if self.is_current(epoch) {
                    self.clear_state().await;
                }
                false
            }
        }
    }

    /// Gate for remote calls.
    ///
    /// Succeeds without any network call while the token has more than the
    /// lookahead window left; otherwise returns the outcome of a silent
    /// refresh.
    pub async fn ensure_valid_token(&self) -> bool {
        match self.phase() {
            SessionPhase::SignedIn | SessionPhase::Refreshing => {}
            _ => return false,
        }

        let record = match self.tokens.load().await {
            Ok(Some(record)) => record,
            Ok(None) => {
                warn!("Token record missing, clearing session");
                self.clear_state().await;
                return false;
            }
            Err(e) => {
                warn!("Token record unreadable, clearing session: {}", e);
                self.clear_state().await;
                return false;
            }
        };

        if record.expiry - self.clock.now_millis() < REFRESH_LOOKAHEAD_MS {
            info!("Token expiring soon, refreshing");
            return self.silent_refresh().await;
        }

        true
    }

    /// Sign out: best-effort revoke, then clear everything locally
    pub async fn sign_out(&self) {
        let (token, identity) = {
            let mut state = self.state.lock();
            let token = state.session.access_token.take();
            (token, state.identity.clone())
        };

        if self.revoke_on_sign_out {
            if let (Some(token), Some(identity)) = (token, identity) {
                tokio::spawn(async move {
                    match identity.revoke(&token).await {
                        Ok(()) => info!("Access token revoked."),
                        Err(e) => warn!("Failed to revoke access token: {}", e),
                    }
                });
            }
        }

        self.clear_state().await;
        info!("Signed out");
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.state.lock().epoch == epoch
    }

    fn adopt(&self, record: PersistedTokenRecord) {
        let sheets = {
            let mut state = self.state.lock();
            state.session = Session::signed_in(record.token.clone(), record.expiry);
            state.phase = SessionPhase::SignedIn;
            state.sheets.clone()
        };

        if let Some(sheets) = sheets {
            sheets.set_token(Some(&record.token));
        }
        self.board.set_signed_in(true);
        self.board.clear_error();
    }

    /// Persist and adopt a grant from a request started in `epoch`.
    ///
    /// A grant that arrives after the session was cleared (sign-out during
    /// the request) is dropped and nothing of it is kept.
    async fn accept_grant(&self, grant: TokenGrant, epoch: u64, context: Operation) -> bool {
        if !self.is_current(epoch) {
            info!("Dropping token from a cleared session ({})", context);
            return false;
        }

        let record = PersistedTokenRecord::from_lifetime(
            grant.access_token,
            self.clock.now_millis(),
            grant.expires_in,
        );

        if let Err(e) = self.tokens.save(&record).await {
            error!("Failed to persist token record: {}", e);
            if self.is_current(epoch) {
                self.board.record_error(context, e);
                self.clear_state().await;
            }
            return false;
        }

        if !self.adopt_if_current(record, epoch) {
            info!("Session cleared while saving token ({}), discarding it", context);
            if let Err(e) = self.tokens.clear().await {
                warn!("Failed to delete discarded token record: {}", e);
            }
            return false;
        }

        info!("Token accepted ({})", context);
        true
    }

    fn adopt_if_current(&self, record: PersistedTokenRecord, epoch: u64) -> bool {
        let sheets = {
            let mut state = self.state.lock();
            if state.epoch != epoch {
                return false;
            }
            state.session = Session::signed_in(record.token.clone(), record.expiry);
            state.phase = SessionPhase::SignedIn;
            state.sheets.clone()
        };

        if let Some(sheets) = sheets {
            sheets.set_token(Some(&record.token));
        }
        self.board.set_signed_in(true);
        self.board.clear_error();
        true
    }

    /// Clear the in-memory session, the persisted record and the downstream token
    async fn clear_state(&self) {
        let sheets = {
            let mut state = self.state.lock();
            state.session = Session::default();
            state.phase = SessionPhase::SignedOut;
            state.epoch += 1;
            state.sheets.clone()
        };

        if let Err(e) = self.tokens.clear().await {
            warn!("Failed to delete token record: {}", e);
        }
        if let Some(sheets) = sheets {
            sheets.set_token(None);
        }
        self.board.set_signed_in(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeIdentity, FakeLoader, RecordingSink};
    use common::{IdentityError, ManualClock, MemoryStore};
    use std::time::Duration;

    const KEY: &str = "test_google_auth_token";
    const NOW: i64 = 1_700_000_000_000;

    struct Harness {
        manager: SessionManager,
        identity: Arc<FakeIdentity>,
        sink: Arc<RecordingSink>,
        store: MemoryStore,
        clock: ManualClock,
    }

    fn harness() -> Harness {
        let identity = FakeIdentity::new();
        let sink = RecordingSink::new();
        let store = MemoryStore::new();
        let clock = ManualClock::new(NOW);
        let loader = FakeLoader::new(identity.clone(), sink.clone());
        let manager = SessionManager::new(
            Arc::new(loader),
            Arc::new(store.clone()),
            KEY,
            StatusBoard::new(),
        )
        .with_clock(Arc::new(clock.clone()));
        Harness {
            manager,
            identity,
            sink,
            store,
            clock,
        }
    }

    async fn persist(store: &MemoryStore, token: &str, expiry: i64) {
        let json = serde_json::to_string(&PersistedTokenRecord {
            token: token.into(),
            expiry,
        })
        .unwrap();
        store.set(KEY, &json).await.unwrap();
    }

    async fn signed_in_harness() -> Harness {
        let h = harness();
        h.manager.initialize().await;
        h.identity.push_grant("interactive-token", 3600);
        assert!(h.manager.sign_in().await);
        h
    }

    #[tokio::test]
    async fn test_initialize_without_record_tries_silent_refresh() {
        let h = harness();
        h.manager.initialize().await;

        assert_eq!(h.identity.requests(), vec![Prompt::Silent]);
        assert_eq!(h.manager.phase(), SessionPhase::SignedOut);
        let status = h.manager.status().borrow().clone();
        assert!(status.identity_ready && status.sheets_ready);
        assert!(!status.signed_in);
        assert!(!status.loading);
        assert!(status.last_error.is_none());
    }

    #[tokio::test]
    async fn test_initialize_adopts_valid_record_without_provider() {
        let h = harness();
        persist(&h.store, "stored-token", NOW + 600_000).await;

        h.manager.initialize().await;

        assert!(h.identity.requests().is_empty());
        assert_eq!(h.manager.phase(), SessionPhase::SignedIn);
        assert_eq!(
            h.manager.session(),
            Session::signed_in("stored-token".into(), NOW + 600_000)
        );
        assert_eq!(h.sink.current().as_deref(), Some("stored-token"));
    }

    #[tokio::test]
    async fn test_initialize_refreshes_expired_record() {
        let h = harness();
        persist(&h.store, "old-token", NOW).await;
        h.identity.push_grant("fresh-token", 3600);

        h.manager.initialize().await;

        assert_eq!(h.identity.requests(), vec![Prompt::Silent]);
        assert!(h.manager.is_signed_in());
        let record = h.manager.tokens.load().await.unwrap().unwrap();
        assert_eq!(record.token, "fresh-token");
        assert_eq!(record.expiry, NOW + 3_600_000);
    }

    #[tokio::test]
    async fn test_initialize_discards_malformed_record() {
        let h = harness();
        h.store.set(KEY, "{broken").await.unwrap();

        h.manager.initialize().await;

        let last = h.manager.board().snapshot().last_error.unwrap();
        assert_eq!(last.context, Operation::RestoreSession);
        assert!(matches!(last.error, AppError::MalformedRecord { .. }));
        assert_eq!(h.store.get(KEY).await.unwrap(), None);
        assert_eq!(h.manager.phase(), SessionPhase::SignedOut);
    }

    #[tokio::test]
    async fn test_initialize_sdk_failure_records_error() {
        let identity = FakeIdentity::new();
        let loader = FakeLoader::new(identity.clone(), RecordingSink::new()).failing_sheets("404");
        let manager = SessionManager::new(
            Arc::new(loader),
            Arc::new(MemoryStore::new()),
            KEY,
            StatusBoard::new(),
        );

        manager.initialize().await;

        assert_eq!(manager.phase(), SessionPhase::SignedOut);
        let last = manager.board().snapshot().last_error.unwrap();
        assert_eq!(last.context, Operation::Initialize);
        assert!(matches!(last.error, AppError::SdkLoad { .. }));

        // Without an identity SDK, sign-in is a no-op
        assert!(!manager.sign_in().await);
        assert!(identity.requests().is_empty());
    }

    #[tokio::test]
    async fn test_initialize_runs_once() {
        let h = harness();
        h.manager.initialize().await;
        h.manager.initialize().await;
        assert_eq!(h.identity.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_sign_in_persists_and_activates_token() {
        let h = signed_in_harness().await;

        assert_eq!(h.manager.phase(), SessionPhase::SignedIn);
        assert_eq!(
            h.identity.requests(),
            vec![Prompt::Silent, Prompt::Consent]
        );
        let record = h.manager.tokens.load().await.unwrap().unwrap();
        assert_eq!(record.token, "interactive-token");
        assert_eq!(record.expiry, NOW + 3_600_000);
        assert_eq!(h.sink.current().as_deref(), Some("interactive-token"));
        assert!(h.manager.status().borrow().signed_in);
    }

    #[tokio::test]
    async fn test_sign_in_is_noop_when_signed_in() {
        let h = signed_in_harness().await;
        assert!(h.manager.sign_in().await);
        assert_eq!(h.identity.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_sign_in_failure_reasons() {
        for reason in [
            IdentityError::Cancelled,
            IdentityError::PopupBlocked,
            IdentityError::Provider("server_error".into()),
        ] {
            let h = harness();
            h.manager.initialize().await;
            h.identity.push_error(reason.clone());

            assert!(!h.manager.sign_in().await);
            assert_eq!(h.manager.phase(), SessionPhase::SignedOut);
            let last = h.manager.board().snapshot().last_error.unwrap();
            assert_eq!(last.context, Operation::SignIn);
            assert_eq!(last.error, AppError::Identity(reason));

            h.manager.clear_error();
            assert!(h.manager.board().snapshot().last_error.is_none());
        }
    }

    #[tokio::test]
    async fn test_concurrent_sign_in_is_single_flight() {
        let h = harness();
        h.manager.initialize().await;
        h.identity.set_latency(Duration::from_millis(20));
        h.identity.push_grant("interactive-token", 3600);

        let (first, second) = tokio::join!(h.manager.sign_in(), h.manager.sign_in());

        assert!(first);
        assert!(!second);
        let consents = h
            .identity
            .requests()
            .into_iter()
            .filter(|p| *p == Prompt::Consent)
            .count();
        assert_eq!(consents, 1);
    }

    #[tokio::test]
    async fn test_valid_token_skips_refresh() {
        let h = signed_in_harness().await;
        h.clock.set(NOW + 3_600_000 - 121_000);

        assert!(h.manager.ensure_valid_token().await);
        assert_eq!(h.identity.silent_requests(), 1);
    }

    #[tokio::test]
    async fn test_expiring_token_triggers_refresh() {
        let h = signed_in_harness().await;
        h.clock.set(NOW + 3_600_000 - 1_000);
        h.identity.push_grant("refreshed-token", 3600);

        assert!(h.manager.ensure_valid_token().await);
        assert_eq!(h.identity.silent_requests(), 2);
        assert_eq!(h.sink.current().as_deref(), Some("refreshed-token"));
        let record = h.manager.tokens.load().await.unwrap().unwrap();
        assert_eq!(record.expiry, NOW + 3_600_000 - 1_000 + 3_600_000);
    }

    #[tokio::test]
    async fn test_failed_refresh_signs_out_without_revoking() {
        let h = signed_in_harness().await;
        h.clock.set(NOW + 3_600_000 - 1_000);

        assert!(!h.manager.ensure_valid_token().await);
        assert_eq!(h.manager.phase(), SessionPhase::SignedOut);
        assert_eq!(h.manager.session(), Session::default());
        assert_eq!(h.store.get(KEY).await.unwrap(), None);
        assert_eq!(h.sink.current(), None);
        assert!(h.identity.revoked().is_empty());
        assert!(!h.manager.status().borrow().signed_in);
    }

    #[tokio::test]
    async fn test_concurrent_validity_checks_share_one_refresh() {
        let h = signed_in_harness().await;
        h.clock.set(NOW + 3_600_000 - 1_000);
        h.identity.set_latency(Duration::from_millis(20));
        h.identity.push_grant("refreshed-token", 3600);

        let (a, b, c) = tokio::join!(
            h.manager.ensure_valid_token(),
            h.manager.ensure_valid_token(),
            h.manager.ensure_valid_token()
        );

        assert!(a && b && c);
        assert_eq!(h.identity.silent_requests(), 2);
    }

    #[tokio::test]
    async fn test_sign_out_during_refresh_stays_signed_out() {
        let h = signed_in_harness().await;
        h.clock.set(NOW + 3_600_000 - 1_000);
        h.identity.set_latency(Duration::from_millis(30));
        h.identity.push_grant("late-token", 3600);

        let (valid, ()) = tokio::join!(h.manager.ensure_valid_token(), async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            h.manager.sign_out().await;
        });

        assert!(!valid);
        assert_eq!(h.identity.silent_requests(), 2);
        assert_eq!(h.manager.phase(), SessionPhase::SignedOut);
        assert_eq!(h.manager.session(), Session::default());
        assert_eq!(h.store.get(KEY).await.unwrap(), None);
        assert_eq!(h.sink.current(), None);
        assert!(!h.manager.status().borrow().signed_in);
    }

    #[tokio::test]
    async fn test_sign_out_during_sign_in_drops_grant() {
        let h = harness();
        h.manager.initialize().await;
        h.identity.set_latency(Duration::from_millis(30));
        h.identity.push_grant("late-token", 3600);

        let (signed_in, ()) = tokio::join!(h.manager.sign_in(), async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            h.manager.sign_out().await;
        });

        assert!(!signed_in);
        assert_eq!(h.manager.phase(), SessionPhase::SignedOut);
        assert!(!h.manager.is_signed_in());
        assert_eq!(h.store.get(KEY).await.unwrap(), None);
        assert!(!h.sink.history().contains(&Some("late-token".to_string())));

        h.identity.set_latency(Duration::ZERO);
        h.identity.push_grant("next-token", 3600);
        assert!(h.manager.sign_in().await);
        assert_eq!(h.sink.current().as_deref(), Some("next-token"));
    }

    #[tokio::test]
    async fn test_concurrent_callers_observe_same_failure() {
        let h = signed_in_harness().await;
        h.clock.set(NOW + 3_600_000 - 1_000);
        h.identity.set_latency(Duration::from_millis(20));
        h.identity.push_error(IdentityError::InteractionRequired);
        h.identity.push_grant("should-not-be-used", 3600);

        let (a, b) = tokio::join!(
            h.manager.ensure_valid_token(),
            h.manager.ensure_valid_token()
        );

        assert!(!a && !b);
        assert_eq!(h.identity.silent_requests(), 2);
    }

    #[tokio::test]
    async fn test_validity_check_requires_sign_in() {
        let h = harness();
        assert!(!h.manager.ensure_valid_token().await);
        h.manager.initialize().await;
        assert!(!h.manager.ensure_valid_token().await);
    }

    #[tokio::test]
    async fn test_missing_record_clears_session() {
        let h = signed_in_harness().await;
        h.store.delete(KEY).await.unwrap();

        assert!(!h.manager.ensure_valid_token().await);
        assert_eq!(h.manager.phase(), SessionPhase::SignedOut);
        assert_eq!(h.sink.current(), None);
    }

    #[tokio::test]
    async fn test_sign_out_revokes_and_clears() {
        let h = signed_in_harness().await;

        h.manager.sign_out().await;

        assert_eq!(h.manager.phase(), SessionPhase::SignedOut);
        assert_eq!(h.store.get(KEY).await.unwrap(), None);
        assert_eq!(h.sink.current(), None);

        h.identity.wait_for_revoke().await;
        assert_eq!(h.identity.revoked(), vec!["interactive-token".to_string()]);
    }

    #[tokio::test]
    async fn test_sign_out_ignores_revoke_failure() {
        let h = signed_in_harness().await;
        h.identity.set_revoke_fails(true);

        h.manager.sign_out().await;
        h.identity.wait_for_revoke().await;

        assert_eq!(h.manager.phase(), SessionPhase::SignedOut);
        assert!(h.manager.board().snapshot().last_error.is_none());

        // Signing in again works after sign-out
        h.identity.push_grant("second-token", 3600);
        assert!(h.manager.sign_in().await);
    }

    #[tokio::test]
    async fn test_sign_out_without_revoke() {
        let h = harness();
        let manager = h.manager.clone().with_revoke_on_sign_out(false);
        manager.initialize().await;
        h.identity.push_grant("interactive-token", 3600);
        assert!(manager.sign_in().await);

        manager.sign_out().await;
        tokio::task::yield_now().await;

        assert!(h.identity.revoked().is_empty());
        assert!(!manager.is_signed_in());
    }

    #[tokio::test]
    async fn test_successful_token_clears_last_error() {
        let h = harness();
        h.manager.initialize().await;
        h.identity.push_error(IdentityError::Cancelled);
        assert!(!h.manager.sign_in().await);
        assert!(h.manager.board().snapshot().last_error.is_some());

        h.identity.push_grant("interactive-token", 3600);
        assert!(h.manager.sign_in().await);
        assert!(h.manager.board().snapshot().last_error.is_none());
    }
}
