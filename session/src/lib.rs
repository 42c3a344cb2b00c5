//! Duality Session
//!
//! Per-request entry point for reading and writing duality view documents.
//!
//! Responsibilities:
//! - Hold the session configuration and the requesting principal
//! - Validate, plan and run writes inside one transaction
//! - Check client etags against the locked current row
//!
//! # Module Structure
//!
//! - `config` - Session options, loadable from JSON
//! - `session` - The `DualitySession` read and write flows
//! - `error` - Error types for session operations

mod config;
mod error;
mod session;

pub use config::SessionConfig;
pub use error::{SessionError, SessionResult};
pub use session::DualitySession;
