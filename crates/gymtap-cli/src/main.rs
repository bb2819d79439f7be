use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use gymtap_core::{MemberId, NfcConfig};
use gymtap_nfc::FrontDesk;
use gymtap_storage::{Database, DatabaseConfig, SqliteMemberDirectory};
use serde::Serialize;
use tracing::debug;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod cli;

use cli::{Cli, Commands, GlobalArgs};

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(exit_status(&e))
        }
    }
}

/// 2 for requests the caller can correct, 1 for everything else.
fn exit_status(error: &anyhow::Error) -> u8 {
    let caller_fault = error
        .downcast_ref::<gymtap_core::Error>()
        .is_some_and(gymtap_core::Error::is_caller_fault);
    if caller_fault { 2 } else { 1 }
}

async fn run(cli: Cli) -> Result<()> {
    let json = cli.global.json;

    let db = Database::new(DatabaseConfig::new(cli.global.database_url.clone()))
        .await
        .context("Failed to open database")?;

    let desk = FrontDesk::open(&db, nfc_config(&cli.global)?)?;

    match cli.command {
        Commands::AddMember { name } => {
            let member = SqliteMemberDirectory::new(db.pool().clone())
                .insert(&name)
                .await
                .map_err(gymtap_core::Error::from)?;
            print(json, &member, || format!("Member {} registered: {}", member.id, member.name))
        }

        Commands::Generate { member, ttl_days } => {
            let token = desk.generate_token(MemberId::new(member)?, ttl_days).await?;
            let expiry = token
                .expires_at
                .map_or_else(|| "never".to_string(), |t| t.to_rfc3339());
            print(json, &token, || {
                format!("Token {} for member {} (expires {expiry})", token.value, token.member_id)
            })
        }

        Commands::Validate { token, member } => {
            let member = member.map(MemberId::new).transpose()?;
            let state = desk.validate_token(&token, member).await?;
            print(json, &state, || state.to_string())
        }

        Commands::Revoke { token } => {
            desk.revoke_token(&token).await?;
            print(json, &serde_json::json!({ "revoked": true }), || "Token revoked".to_string())
        }

        Commands::List { member } => {
            let tokens = desk.list_tokens(MemberId::new(member)?).await?;
            print(json, &tokens, || {
                tokens
                    .iter()
                    .map(|t| {
                        format!("{}  issued {}  {}", t.value, t.issued_at.to_rfc3339(), t.state())
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            })
        }

        Commands::Show { token } => {
            let token = desk.get_token(&token).await?;
            print(json, &token, || {
                format!("{} member {} {}", token.value, token.member_id, token.state())
            })
        }

        Commands::Expired => {
            let count = desk.count_expired_tokens().await?;
            print(json, &serde_json::json!({ "expired": count }), || {
                format!("{count} expired token(s)")
            })
        }

        Commands::Write { token, member, timeout_ms } => {
            eprintln!("Place the card on the reader...");
            let result = desk
                .write_to_card(&token, MemberId::new(member)?, timeout_ms)
                .await?;
            print(json, &result, || format!("{} ({})", result.message, result.mode))
        }

        Commands::Read { timeout_ms } => {
            eprintln!("Place the card on the reader...");
            let result = desk.read_card(timeout_ms).await?;
            print(json, &result, || {
                let card = result.card_id.as_deref().unwrap_or("-");
                format!("{}: card {card} ({})", result.message, result.mode)
            })
        }

        Commands::Verify { timeout_ms } => {
            eprintln!("Place the card on the reader...");
            let verification = desk.verify_card(timeout_ms).await?;
            print(json, &verification, || match verification.token_state {
                Some(_) if verification.is_valid() => format!(
                    "Card valid for member {}",
                    verification.member_id.map(|m| m.to_string()).unwrap_or_default()
                ),
                Some(state) => format!("Card token is {state}"),
                None => verification.operation.message.clone(),
            })
        }

        Commands::Status => {
            desk.initialize().await;
            let status = desk.reader_status();
            print(json, &status, || {
                let mut line =
                    format!("Reader mode: {}, available: {}", status.mode, status.available);
                if status.forced {
                    line.push_str(" (forced)");
                }
                if let Some(reason) = &status.last_fallback_reason {
                    line.push_str(&format!("\nFallback reason: {reason}"));
                }
                line
            })
        }
    }
}

fn nfc_config(args: &GlobalArgs) -> Result<NfcConfig> {
    let mut config = NfcConfig::default().force_simulation(args.force_simulation);

    if let Some(secs) = args.nfc_timeout {
        if secs == 0 {
            bail!("NFC_TIMEOUT must be at least 1 second");
        }
        config = config.default_timeout(Duration::from_secs(secs));
    }
    if let Some(index) = args.device_index {
        config = config.device_index(index);
    }
    if let Some(ms) = args.simulation_delay_ms {
        config = config.simulation_delay(Duration::from_millis(ms));
    }

    config.validate()?;
    debug!(?config, "NFC configuration");
    Ok(config)
}

fn print<T: Serialize>(json: bool, value: &T, human: impl FnOnce() -> String) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{}", human());
    }
    Ok(())
}
