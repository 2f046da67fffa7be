//! sastoken — time-limited, resource-scoped Shared Access Signature tokens.
//!
//! The [`sas`] module holds the token scheme itself. [`connection_string`]
//! turns the usual `HostName=..;SharedAccessKey=..` strings into a key and
//! a resource to sign for.

pub mod config;
pub mod connection_string;
pub mod errors;
pub mod sas;

pub use errors::{ConnectionStringError, SasError};
pub use sas::{SasToken, ScopedSasToken};
