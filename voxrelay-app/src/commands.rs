//! Interactive operator commands.
//!
//! Lines are whitespace-delimited; the first token is the case-insensitive
//! command name. Unrecognized commands are silently ignored. While a pairing
//! decision is pending, `r` / `a` lines resolve it instead of being parsed
//! here (see the gate in `main.rs`).

use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info, warn};
use voxrelay_core::{jid, ChatTransport, DeviceStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    PairPhone { number: String },
    Reconnect,
    Logout,
    Send { recipient: String, text: String },
}

/// Parse one input line. `None` for unknown commands and for commands whose
/// usage error has already been logged.
pub fn parse(line: &str) -> Option<Command> {
    let mut tokens = line.split_whitespace();
    let name = tokens.next()?.to_ascii_lowercase();
    let args: Vec<&str> = tokens.collect();

    match name.as_str() {
        "pair-phone" => {
            if args.is_empty() {
                error!("usage: pair-phone <number>");
                return None;
            }
            Some(Command::PairPhone {
                number: args[0].to_string(),
            })
        }
        "reconnect" => Some(Command::Reconnect),
        "logout" => Some(Command::Logout),
        "send" => {
            if args.len() < 2 {
                error!("usage: send <jid> <text>");
                return None;
            }
            Some(Command::Send {
                recipient: args[0].to_string(),
                text: args[1..].join(" "),
            })
        }
        _ => None,
    }
}

/// Execute a parsed command.
///
/// Only a pair-phone transport failure is fatal; everything else is logged
/// and dropped.
pub async fn handle(
    transport: &Arc<dyn ChatTransport>,
    store: &DeviceStore,
    device_id: &str,
    cmd: Command,
) -> anyhow::Result<()> {
    match cmd {
        Command::PairPhone { number } => {
            let code = transport
                .pair_phone(&number)
                .await
                .context("phone pairing failed")?;
            println!("Linking code: {code}");
        }
        Command::Reconnect => {
            transport.disconnect().await;
            if let Err(e) = transport.connect().await {
                error!(error = %e, "failed to connect");
            }
        }
        Command::Logout => match transport.logout().await {
            Ok(()) => {
                if let Err(e) = store.set_paired_jid(device_id, None) {
                    warn!(error = %e, "failed to clear stored pairing");
                }
                info!("successfully logged out");
            }
            Err(e) => error!(error = %e, "error logging out"),
        },
        Command::Send { recipient, text } => {
            let to = match jid::parse_recipient(&recipient) {
                Ok(jid) => jid,
                Err(e) => {
                    error!(error = %e, "invalid recipient");
                    return Ok(());
                }
            };
            match transport.send_text(&to, &text).await {
                Ok(receipt) => {
                    info!(server_timestamp = %receipt.timestamp, "message sent");
                }
                Err(e) => error!(error = %e, "error sending message"),
            }
        }
    }
    Ok(())
}
