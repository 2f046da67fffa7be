use clap::{Parser, Subcommand};

/// sastoken — sign, inspect and verify Shared Access Signature tokens
#[derive(Parser)]
#[command(name = "sastoken", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Sign a new token
    Generate {
        /// Connection string carrying HostName and SharedAccessKey
        #[arg(long, env = "SASTOKEN_CONNECTION_STRING", conflicts_with_all = ["resource", "key"])]
        connection_string: Option<String>,
        /// Resource URI to authorize (not URL-encoded)
        #[arg(long, requires = "key")]
        resource: Option<String>,
        /// Base64 shared access key
        #[arg(long, requires = "resource")]
        key: Option<String>,
        /// Policy key name, emitted as `skn`
        #[arg(long, conflicts_with = "connection_string")]
        key_name: Option<String>,
        /// Validity in seconds (defaults to SASTOKEN_TTL_SECS)
        #[arg(long)]
        ttl: Option<i64>,
        /// Bind the token to a repository id (`rid`)
        #[arg(long)]
        repository_id: Option<String>,
    },

    /// Parse a token and print its fields
    Inspect {
        token: String,
        /// Require the repository id field
        #[arg(long)]
        scoped: bool,
        #[arg(long)]
        name: Option<String>,
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Check a token's expiry and signature against a key
    Verify {
        token: String,
        /// Base64 shared access key
        #[arg(long, env = "SASTOKEN_KEY")]
        key: String,
        #[arg(long)]
        name: Option<String>,
    },
}
