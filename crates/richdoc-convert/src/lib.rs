//! # Richdoc Convert
//!
//! Converts DOCX packages to PDF through an external office suite.
//!
//! A [`ConverterSession`] owns one conversion backend. It is opened once,
//! reports whether the backend is ready, and runs the conversions submitted
//! to it one at a time, each under the same time limit.

mod session;
mod soffice;

use core::fmt;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

pub use session::{Conversion, ConversionStatus, ConverterSession, SessionConfig, SessionState};
pub use soffice::SofficeBackend;

/// The result type for richdoc-convert.
pub type Result<T, Err = ConvertError> = std::result::Result<T, Err>;

/// A failed conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConvertError {
    /// The backend could not be started.
    NotReady(String),
    /// The session was closed before the conversion finished.
    Closed,
    /// A conversion with the same correlation id is still pending.
    Duplicate(u64),
    /// The conversion took longer than the session allows.
    TimedOut(Duration),
    /// The backend reported a failure.
    Backend(String),
}

impl fmt::Display for ConvertError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotReady(msg) => write!(f, "converter is not ready: {msg}"),
            Self::Closed => f.write_str("converter session is closed"),
            Self::Duplicate(id) => write!(f, "conversion {id} is already pending"),
            Self::TimedOut(limit) => write!(f, "conversion timed out after {limit:?}"),
            Self::Backend(msg) => write!(f, "conversion failed: {msg}"),
        }
    }
}

impl std::error::Error for ConvertError {}

impl From<std::io::Error> for ConvertError {
    fn from(err: std::io::Error) -> Self {
        Self::Backend(err.to_string())
    }
}

/// Something that turns a DOCX package into a PDF document.
#[async_trait]
pub trait ConvertBackend: Send + Sync + 'static {
    /// Prepares the backend before the first conversion.
    async fn warm_up(&self) -> Result<()> {
        Ok(())
    }

    /// Converts the package `input`, named `name`, to PDF bytes.
    async fn convert(&self, input: Bytes, name: &str) -> Result<Bytes>;
}
