//! Crate-wide error type.
//!
//! A single struct carrying a kind tag and a message, rather than one
//! variant type per failure site. Operator
//! hot paths never panic or throw; every fallible call returns
//! [`GraphResult`].

use std::fmt;

use backtrace::Backtrace;

use crate::txn::TransactionID;

/// The eight error kinds the core surfaces to callers (see spec §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    Io,
    OutOfBuffer,
    OutOfMemory,
    Conflict,
    Interrupted,
    TransactionManager,
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            ErrorKind::InvalidInput => "InvalidInput",
            ErrorKind::Io => "IO",
            ErrorKind::OutOfBuffer => "OutOfBuffer",
            ErrorKind::OutOfMemory => "OutOfMemory",
            ErrorKind::Conflict => "Conflict",
            ErrorKind::Interrupted => "Interrupted",
            ErrorKind::TransactionManager => "TransactionManager",
            ErrorKind::Internal => "Internal",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug)]
pub struct GraphError {
    kind: ErrorKind,
    message: String,
    /// Set for `Conflict` / `TransactionManager`, where the conflicting
    /// transaction id is known.
    conflicting_tx: Option<TransactionID>,
}

impl GraphError {
    pub fn new(kind: ErrorKind, msg: &str) -> Self {
        Self {
            kind,
            message: msg.to_string(),
            conflicting_tx: None,
        }
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidInput, &msg.into())
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Io, &msg.into())
    }

    pub fn out_of_buffer() -> Self {
        Self::new(ErrorKind::OutOfBuffer, "no evictable frame after a full clock sweep")
    }

    pub fn out_of_memory(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::OutOfMemory, &msg.into())
    }

    pub fn conflict(msg: impl Into<String>, tx: TransactionID) -> Self {
        let mut e = Self::new(ErrorKind::Conflict, &msg.into());
        e.conflicting_tx = Some(tx);
        e
    }

    pub fn interrupted() -> Self {
        Self::new(ErrorKind::Interrupted, "query cancelled")
    }

    pub fn transaction_manager(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::TransactionManager, &msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, &msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Print a backtrace to stderr. Called at deadlock/invariant-violation
    /// sites.
    pub fn show_backtrace(&self) {
        eprintln!("{}", Backtrace::new_unresolved().frames().len());
        eprintln!("{}", self);
    }
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.conflicting_tx {
            Some(tx) => write!(f, "[{}] {} (tx_{})", self.kind, self.message, tx),
            None => write!(f, "[{}] {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for GraphError {}

impl From<std::io::Error> for GraphError {
    fn from(e: std::io::Error) -> Self {
        GraphError::io(e.to_string())
    }
}

pub type GraphResult<T> = Result<T, GraphError>;
