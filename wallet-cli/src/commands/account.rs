//! Account commands - open, show and look up wallets

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;
use serde::Serialize;
use uuid::Uuid;

use wallet_core::services::NewAccount;
use wallet_core::{Account, Amount, LogEvent};

use super::{current_user, finish, get_context, get_logger, get_wallet_dir, log_event};
use crate::output;

#[derive(Subcommand)]
pub enum AccountCommands {
    /// Open a new account
    Open {
        /// Account holder's name
        name: String,
        /// Email address
        #[arg(long)]
        email: String,
        /// Tax id (XXX.XXX.XXX-XX or 11 digits)
        #[arg(long)]
        tax_id: String,
        /// Phone number
        #[arg(long)]
        phone: Option<String>,
        /// Opening balance
        #[arg(long, default_value = "0")]
        balance: String,
        /// Make this the signed-in account for later commands
        #[arg(long = "use")]
        use_it: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the signed-in account
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Look up who owns a tax id
    Find {
        /// Tax id to look up
        tax_id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Sign in as an account (by id or tax id) for later commands
    Use {
        /// Account id or tax id
        key: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

/// What other people may see about an account
#[derive(Serialize)]
struct PublicAccount {
    id: Uuid,
    name: String,
    tax_id: String,
}

impl From<&Account> for PublicAccount {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id,
            name: account.name.clone(),
            tax_id: account.tax_id.to_string(),
        }
    }
}

pub fn run(command: AccountCommands) -> Result<()> {
    let logger = get_logger();

    match command {
        AccountCommands::Open {
            name,
            email,
            tax_id,
            phone,
            balance,
            use_it,
            json,
        } => {
            let ctx = get_context()?;
            let result = Amount::parse(&balance).and_then(|opening_balance| {
                ctx.account_service.open_account(NewAccount {
                    name,
                    email,
                    tax_id,
                    phone_number: phone,
                    opening_balance,
                })
            });

            if let (Ok(account), true) = (&result, use_it) {
                let mut config = ctx.config.clone();
                config.default_user = Some(account.id);
                config.save(&get_wallet_dir()?)?;
            }
            if result.is_ok() {
                log_event(&logger, LogEvent::new("account_opened").with_command("account open"));
            }

            finish(&logger, "account open", json, result, |account| {
                output::success(&format!("Opened account {}", account.id));
                if use_it {
                    output::info("Signed in as this account.");
                } else {
                    output::info(&format!(
                        "Sign in with: wl account use {}",
                        account.tax_id
                    ));
                }
            })
        }

        AccountCommands::Show { json } => {
            let ctx = get_context()?;
            let result = current_user(&ctx).and_then(|id| ctx.account_service.get_account(id));

            finish(&logger, "account show", json, result, |account| {
                let mut table = output::create_table();
                table.add_row(vec!["Id", &account.id.to_string()]);
                table.add_row(vec!["Name", &account.name]);
                table.add_row(vec!["Email", &account.email]);
                table.add_row(vec!["Tax id", account.tax_id.as_str()]);
                table.add_row(vec!["Phone", account.phone_number.as_deref().unwrap_or("-")]);
                table.add_row(vec![
                    "Opened",
                    &account.created_at.format("%Y-%m-%d %H:%M").to_string(),
                ]);
                println!("{}", table);
                println!();
                println!("Balance: {}", account.balance().to_string().bold());
            })
        }

        AccountCommands::Find { tax_id, json } => {
            let ctx = get_context()?;
            let result = ctx
                .account_service
                .find_by_tax_id(&tax_id)
                .map(|account| PublicAccount::from(&account));

            finish(&logger, "account find", json, result, |account| {
                println!(
                    "{}  {}  {}",
                    account.tax_id,
                    account.name.bold(),
                    account.id.to_string().dimmed()
                );
            })
        }

        AccountCommands::Use { key, json } => {
            let ctx = get_context()?;
            let result = ctx.account_service.resolve(&key);

            if let Ok(account) = &result {
                let mut config = ctx.config.clone();
                config.default_user = Some(account.id);
                config.save(&get_wallet_dir()?)?;
            }

            let result = result.map(|account| PublicAccount::from(&account));
            finish(&logger, "account use", json, result, |account| {
                output::success(&format!("Signed in as {} ({})", account.name, account.tax_id));
            })
        }
    }
}
