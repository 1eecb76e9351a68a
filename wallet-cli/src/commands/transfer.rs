//! Transfer commands - send, request, confirm and inspect transfers

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;
use dialoguer::Confirm;
use uuid::Uuid;

use wallet_core::{Amount, Error, LogEvent, Transfer, TransferStatus, WalletContext};

use super::{current_user, finish, get_context, get_logger, log_event, short_id};
use crate::output;

#[derive(Subcommand)]
pub enum TransferCommands {
    /// Pay someone right away, by tax id
    Send {
        /// Receiver's tax id
        to: String,
        /// Amount, e.g. 30 or 30.50
        amount: String,
        /// Optional note
        #[arg(long)]
        comment: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Create a pending transfer to confirm later
    Request {
        /// Receiver's account id or tax id
        to: String,
        /// Amount, e.g. 30 or 30.50
        amount: String,
        /// Optional note
        #[arg(long)]
        comment: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Confirm one of your pending transfers
    Confirm {
        /// Transfer id
        id: Uuid,
        /// Skip confirmation prompt
        #[arg(long, short)]
        yes: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show one transfer
    Show {
        /// Transfer id
        id: Uuid,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List your transfers, newest first
    List {
        /// Only show transfers with this status (pending, completed, failed)
        #[arg(long)]
        status: Option<String>,
        /// Maximum number of transfers to show
        #[arg(short, long, default_value = "50")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

pub fn run(command: TransferCommands) -> Result<()> {
    let logger = get_logger();
    let ctx = get_context()?;

    match command {
        TransferCommands::Send {
            to,
            amount,
            comment,
            json,
        } => {
            let result = current_user(&ctx).and_then(|sender| {
                let amount = Amount::parse(&amount)?;
                ctx.transfer_service.create_direct(sender, &to, amount, comment)
            });
            if let Ok(transfer) = &result {
                log_event(
                    &logger,
                    LogEvent::new("transfer_created")
                        .with_command("transfer send")
                        .with_transfer(transfer.id()),
                );
            }

            finish(&logger, "transfer send", json, result, |transfer| {
                output::success(&format!("Sent {}", transfer.amount()));
                print_transfer(&ctx, transfer);
            })
        }

        TransferCommands::Request {
            to,
            amount,
            comment,
            json,
        } => {
            let result = current_user(&ctx).and_then(|sender| {
                let amount = Amount::parse(&amount)?;
                let receiver = ctx.account_service.resolve(&to).map_err(|e| match e {
                    Error::NotFound(_) => Error::ReceiverNotFound(to.clone()),
                    other => other,
                })?;
                ctx.transfer_service
                    .create_pending(sender, receiver.id, amount, comment)
            });
            if let Ok(transfer) = &result {
                log_event(
                    &logger,
                    LogEvent::new("transfer_created")
                        .with_command("transfer request")
                        .with_transfer(transfer.id()),
                );
            }

            finish(&logger, "transfer request", json, result, |transfer| {
                output::success(&format!("Created pending transfer {}", transfer.id()));
                output::info(&format!("Confirm it with: wl transfer confirm {}", transfer.id()));
            })
        }

        TransferCommands::Confirm { id, yes, json } => {
            let caller = match current_user(&ctx) {
                Ok(caller) => caller,
                Err(e) => {
                    return finish::<Transfer>(&logger, "transfer confirm", json, Err(e), |_| {})
                }
            };

            if !yes && !json && atty::is(atty::Stream::Stdin) {
                if let Ok(transfer) = ctx.transfer_service.get(id, caller) {
                    print_transfer(&ctx, &transfer);
                    if !Confirm::new()
                        .with_prompt(format!("Pay {}?", transfer.amount()))
                        .default(false)
                        .interact()?
                    {
                        println!("Cancelled.");
                        return Ok(());
                    }
                }
            }

            let result = ctx.transfer_service.confirm(id, caller);
            match &result {
                Ok(_) => log_event(
                    &logger,
                    LogEvent::new("transfer_confirmed")
                        .with_command("transfer confirm")
                        .with_transfer(id),
                ),
                Err(e @ Error::InsufficientFunds) => log_event(
                    &logger,
                    LogEvent::new("transfer_failed")
                        .with_command("transfer confirm")
                        .with_transfer(id)
                        .with_failure(e),
                ),
                Err(_) => {}
            }

            finish(&logger, "transfer confirm", json, result, |transfer| {
                output::success("Transfer completed");
                print_transfer(&ctx, transfer);
            })
        }

        TransferCommands::Show { id, json } => {
            let result = current_user(&ctx).and_then(|caller| ctx.transfer_service.get(id, caller));

            finish(&logger, "transfer show", json, result, |transfer| {
                print_transfer(&ctx, transfer);
            })
        }

        TransferCommands::List {
            status,
            limit,
            json,
        } => {
            let caller = match current_user(&ctx) {
                Ok(caller) => caller,
                Err(e) => {
                    return finish::<Vec<Transfer>>(&logger, "transfer list", json, Err(e), |_| {})
                }
            };

            let result = status
                .map(|s| {
                    s.to_uppercase()
                        .parse::<TransferStatus>()
                        .map_err(|_| Error::validation(format!("unknown status '{}'", s)))
                })
                .transpose()
                .and_then(|status| {
                    Ok(ctx
                        .transfer_service
                        .list_for(caller)?
                        .into_iter()
                        .filter(|t| status.map_or(true, |s| t.status() == s))
                        .take(limit)
                        .collect::<Vec<_>>())
                });

            finish(&logger, "transfer list", json, result, |transfers| {
                if transfers.is_empty() {
                    println!("No transfers found.");
                } else {
                    print_list(&ctx, caller, transfers);
                }
            })
        }
    }
}

fn display_name(ctx: &WalletContext, id: Uuid) -> String {
    ctx.account_service
        .get_account(id)
        .map(|a| a.name)
        .unwrap_or_else(|_| short_id(id))
}

fn status_cell(status: TransferStatus) -> String {
    match status {
        TransferStatus::Pending => status.to_string().yellow().to_string(),
        TransferStatus::Completed => status.to_string().green().to_string(),
        TransferStatus::Failed => status.to_string().red().to_string(),
    }
}

fn print_transfer(ctx: &WalletContext, transfer: &Transfer) {
    let mut table = output::create_table();
    table.add_row(vec!["Id".to_string(), transfer.id().to_string()]);
    table.add_row(vec!["From".to_string(), display_name(ctx, transfer.sender_id())]);
    table.add_row(vec!["To".to_string(), display_name(ctx, transfer.receiver_id())]);
    table.add_row(vec!["Amount".to_string(), transfer.amount().to_string()]);
    table.add_row(vec!["Status".to_string(), status_cell(transfer.status())]);
    if let Some(comment) = &transfer.comment {
        table.add_row(vec!["Comment".to_string(), comment.clone()]);
    }
    table.add_row(vec![
        "Created".to_string(),
        transfer.created_at().format("%Y-%m-%d %H:%M:%S").to_string(),
    ]);
    if let Some(snapshot) = transfer.snapshot() {
        table.add_row(vec![
            "Sender balance".to_string(),
            format!("{} → {}", snapshot.sender_balance_before, snapshot.sender_balance_after),
        ]);
        table.add_row(vec![
            "Receiver balance".to_string(),
            format!(
                "{} → {}",
                snapshot.receiver_balance_before, snapshot.receiver_balance_after
            ),
        ]);
    }
    println!("{}", table);
}

fn print_list(ctx: &WalletContext, caller: Uuid, transfers: &[Transfer]) {
    let mut table = output::create_table();
    table.set_header(vec!["Id", "Date", "Direction", "Counterparty", "Amount", "Status"]);

    for transfer in transfers {
        let (direction, counterparty) = if transfer.sender_id() == caller {
            ("out".red().to_string(), transfer.receiver_id())
        } else {
            ("in".green().to_string(), transfer.sender_id())
        };
        table.add_row(vec![
            short_id(transfer.id()),
            transfer.created_at().format("%Y-%m-%d %H:%M").to_string(),
            direction,
            display_name(ctx, counterparty),
            transfer.amount().to_string(),
            status_cell(transfer.status()),
        ]);
    }

    println!("{}", table);
}
