//! Transaction guard.

use std::fmt;

use duality_core::SqlSession;
use tracing::{debug, warn};

use crate::error::{TransactionError, TransactionResult};

/// Lifecycle of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Active,
    Committed,
    RolledBack,
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionState::Active => write!(f, "active"),
            TransactionState::Committed => write!(f, "committed"),
            TransactionState::RolledBack => write!(f, "rolled back"),
        }
    }
}

/// An open transaction on a session.
///
/// Dropping an active transaction rolls it back.
pub struct Transaction<'s> {
    session: &'s mut dyn SqlSession,
    state: TransactionState,
}

impl<'s> Transaction<'s> {
    /// Start a transaction.
    pub fn begin(session: &'s mut dyn SqlSession, consistent_snapshot: bool) -> TransactionResult<Self> {
        session.begin(consistent_snapshot)?;
        debug!(consistent_snapshot, "transaction started");
        Ok(Self {
            session,
            state: TransactionState::Active,
        })
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// The session to run statements on.
    pub fn session(&mut self) -> TransactionResult<&mut dyn SqlSession> {
        self.ensure_active()?;
        Ok(&mut *self.session)
    }

    pub fn commit(mut self) -> TransactionResult<()> {
        self.ensure_active()?;
        // Any outcome of COMMIT ends the transaction; drop must not roll back.
        self.state = TransactionState::Committed;
        self.session.commit()?;
        debug!("transaction committed");
        Ok(())
    }

    pub fn rollback(mut self) -> TransactionResult<()> {
        self.ensure_active()?;
        self.state = TransactionState::RolledBack;
        self.session.rollback()?;
        debug!("transaction rolled back");
        Ok(())
    }

    fn ensure_active(&self) -> TransactionResult<()> {
        match self.state {
            TransactionState::Active => Ok(()),
            other => Err(TransactionError::already_finished(other.to_string())),
        }
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.state != TransactionState::Active {
            return;
        }
        self.state = TransactionState::RolledBack;
        match self.session.rollback() {
            Ok(()) => debug!("transaction rolled back on drop"),
            Err(e) => warn!(error = %e, "rollback on drop failed"),
        }
    }
}
