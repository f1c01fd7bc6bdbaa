//! Observable status shared with the UI
//!
//! The UI never reads session internals directly; it subscribes to a
//! [`Status`] snapshot published on a watch channel. All errors end up in the
//! single last-error slot here instead of being returned across the public
//! boundary.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::watch;
use tracing::error;

use crate::error::AppError;

/// Operation that produced an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Initialize,
    RestoreSession,
    SignIn,
    SilentRefresh,
    SignOut,
    GetSheetData,
    WriteSheetData,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Initialize => "initialize",
            Operation::RestoreSession => "restore_session",
            Operation::SignIn => "sign_in",
            Operation::SilentRefresh => "silent_refresh",
            Operation::SignOut => "sign_out",
            Operation::GetSheetData => "get_sheet_data",
            Operation::WriteSheetData => "write_sheet_data",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Last recorded error with the operation it came from
#[derive(Debug, Clone, PartialEq)]
pub struct LastError {
    pub context: Operation,
    pub error: AppError,
}

/// Snapshot of everything the UI may observe
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Status {
    pub signed_in: bool,
    pub loading: bool,
    pub identity_ready: bool,
    pub sheets_ready: bool,
    pub last_error: Option<LastError>,
}

/// Publisher side of the status channel
#[derive(Clone)]
pub struct StatusBoard {
    tx: Arc<watch::Sender<Status>>,
    in_flight: Arc<AtomicUsize>,
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusBoard {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Status::default());
        Self {
            tx: Arc::new(tx),
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Subscribe to status changes
    pub fn subscribe(&self) -> watch::Receiver<Status> {
        self.tx.subscribe()
    }

    /// Current status
    pub fn snapshot(&self) -> Status {
        self.tx.borrow().clone()
    }

    pub fn set_signed_in(&self, signed_in: bool) {
        self.tx.send_if_modified(|s| {
            let changed = s.signed_in != signed_in;
            s.signed_in = signed_in;
            changed
        });
    }

    pub fn set_identity_ready(&self) {
        self.tx.send_modify(|s| s.identity_ready = true);
    }

    pub fn set_sheets_ready(&self) {
        self.tx.send_modify(|s| s.sheets_ready = true);
    }

    /// Record an error in the last-error slot
    pub fn record_error(&self, context: Operation, err: AppError) {
        error!("Error in {}: {}", context, err);
        self.tx.send_modify(|s| {
            s.last_error = Some(LastError {
                context,
                error: err,
            })
        });
    }

    pub fn clear_error(&self) {
        self.tx.send_if_modified(|s| s.last_error.take().is_some());
    }

    /// Mark an operation as in flight until the guard drops.
    ///
    /// Guards are counted, so overlapping operations keep `loading` set until
    /// the last one finishes.
    pub fn begin_loading(&self) -> LoadingGuard {
        if self.in_flight.fetch_add(1, Ordering::SeqCst) == 0 {
            self.tx.send_modify(|s| s.loading = true);
        }
        LoadingGuard {
            board: self.clone(),
        }
    }
}

/// Keeps `Status::loading` set while alive
pub struct LoadingGuard {
    board: StatusBoard,
}

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        if self.board.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.board.tx.send_modify(|s| s.loading = false);
        }
    }
}
