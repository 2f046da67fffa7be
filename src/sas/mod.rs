//! Shared Access Signature tokens.
//!
//! A token authorizes calls against one resource until an expiry instant:
//!
//! ```text
//! SharedAccessSignature sr=<encoded resource>&sig=<signature>&se=<seconds>[&skn=<key name>][&rid=<repository>]
//! ```
//!
//! [`SasToken`] is the plain form, [`ScopedSasToken`] adds a repository id.
//! Both are immutable and safe to share across threads.

pub mod builder;
pub mod grammar;
pub mod parser;
pub mod refresh;
pub mod scoped;
pub mod signing;
pub mod token;

pub use builder::SasTokenBuilder;
pub use grammar::Field;
pub use parser::{extract_fields, TokenFields};
pub use refresh::RefreshPolicy;
pub use scoped::ScopedSasToken;
pub use signing::{canonical_string, sign, verify, HmacSha256, MacAlgorithm, SigningKey};
pub use token::SasToken;
