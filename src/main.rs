use anyhow::Context;
use chrono::{Duration, Utc};
use clap::Parser;
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sastoken::config::{self, Config};
use sastoken::connection_string::ConnectionString;
use sastoken::sas::{SasToken, SasTokenBuilder, ScopedSasToken, SigningKey};

mod cli;

fn main() -> anyhow::Result<()> {
    let cfg = config::load()?;

    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "sastoken=info".into()),
    );
    let json_logs = std::env::var("SASTOKEN_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
    if json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer.json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .init();
    }

    let args = cli::Cli::parse();

    match args.command {
        cli::Commands::Generate {
            connection_string,
            resource,
            key,
            key_name,
            ttl,
            repository_id,
        } => {
            let time_to_live = match ttl {
                Some(secs) => config::ttl_from_secs(secs).context("invalid --ttl")?,
                None => cfg.time_to_live()?,
            };
            let source = TokenSource::from_args(connection_string, resource, key, key_name)?;
            handle_generate(&cfg, source, time_to_live, repository_id)
        }
        cli::Commands::Inspect {
            token,
            scoped,
            name,
            json,
        } => {
            let name = name.unwrap_or_else(|| cfg.policy_name.clone());
            handle_inspect(&name, &token, scoped, json)
        }
        cli::Commands::Verify { token, key, name } => {
            let name = name.unwrap_or_else(|| cfg.policy_name.clone());
            handle_verify(&name, &token, &key)
        }
    }
}

enum TokenSource {
    ConnectionString(ConnectionString),
    Key {
        resource: String,
        key: SigningKey,
        key_name: Option<String>,
    },
}

impl TokenSource {
    fn from_args(
        connection_string: Option<String>,
        resource: Option<String>,
        key: Option<String>,
        key_name: Option<String>,
    ) -> anyhow::Result<Self> {
        if let Some(raw) = connection_string {
            let cs = ConnectionString::parse(&raw).context("invalid connection string")?;
            return Ok(TokenSource::ConnectionString(cs));
        }
        match (resource, key) {
            (Some(resource), Some(key)) => Ok(TokenSource::Key {
                resource,
                key: SigningKey::from_base64(&key).context("invalid --key")?,
                key_name,
            }),
            _ => anyhow::bail!("either --connection-string or both --resource and --key are required"),
        }
    }
}

fn handle_generate(
    cfg: &Config,
    source: TokenSource,
    time_to_live: Duration,
    repository_id: Option<String>,
) -> anyhow::Result<()> {
    let now = Utc::now();
    let token = match source {
        TokenSource::ConnectionString(cs) => cs.token_at(now, time_to_live)?,
        TokenSource::Key {
            resource,
            key,
            key_name,
        } => {
            let mut builder = SasTokenBuilder::new(resource, key).time_to_live(time_to_live);
            if let Some(key_name) = key_name {
                builder = builder.key_name(key_name);
            }
            builder.build_at(now)?
        }
    };

    let refresh_at = cfg.refresh_policy()?.refresh_at(now, &token);
    tracing::info!(
        policy = token.policy_name(),
        expires_on = %token.expires_on(),
        refresh_at = %refresh_at,
        "generated shared access signature"
    );

    match repository_id {
        Some(repository_id) => {
            let scoped = ScopedSasToken::from_token(token, &repository_id)?;
            println!("{}", scoped.authorization_value());
        }
        None => println!("{}", token.authorization_value()),
    }
    Ok(())
}

#[derive(Serialize)]
struct Inspection<'a> {
    #[serde(flatten)]
    token: &'a SasToken,
    repository_id: Option<&'a str>,
    decoded_audience: Option<String>,
    expired: bool,
    remaining_secs: i64,
}

fn handle_inspect(name: &str, raw: &str, scoped: bool, json: bool) -> anyhow::Result<()> {
    let scoped_token;
    let plain_token;
    let (token, repository_id) = if scoped {
        scoped_token = ScopedSasToken::parse(name, raw)?;
        (scoped_token.token(), Some(scoped_token.scope_id()))
    } else {
        plain_token = SasToken::parse(name, raw)?;
        (&plain_token, None)
    };

    let now = Utc::now();
    let inspection = Inspection {
        token,
        repository_id,
        decoded_audience: token.decoded_audience().ok(),
        expired: token.is_expired(now),
        remaining_secs: token.remaining(now).num_seconds(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&inspection)?);
        return Ok(());
    }

    println!("policy:       {}", token.policy_name());
    println!("audience:     {}", token.encoded_audience());
    if let Some(decoded) = &inspection.decoded_audience {
        println!("resource:     {}", decoded);
    }
    println!("key name:     {}", token.key_name().unwrap_or("-"));
    if let Some(repository_id) = repository_id {
        println!("repository:   {}", repository_id);
    }
    println!("expires on:   {} (se={})", token.expires_on(), token.expiry_raw());
    if inspection.expired {
        println!("status:       expired");
    } else {
        println!("status:       valid for {}s", inspection.remaining_secs);
    }
    Ok(())
}

fn handle_verify(name: &str, raw: &str, key: &str) -> anyhow::Result<()> {
    let token = SasToken::parse(name, raw)?;
    let key = SigningKey::from_base64(key).context("invalid --key")?;

    token
        .authenticate(&key, Utc::now())
        .context("token rejected")?;

    tracing::info!(policy = token.policy_name(), "token verified");
    println!("valid until {}", token.expires_on());
    Ok(())
}
