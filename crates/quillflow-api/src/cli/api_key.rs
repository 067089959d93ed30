//! API key CLI commands: create, list, revoke.

use anyhow::Result;
use clap::Subcommand;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use uuid::Uuid;

use quillflow_types::access::Capability;

use super::parse_id;
use crate::state::AppState;

#[derive(Subcommand)]
pub enum ApiKeyCommand {
    /// Create a key. The plaintext is printed once.
    Create {
        /// Label recorded as the actor on audit lines.
        #[arg(long)]
        name: String,

        /// Capabilities to grant (repeatable). Defaults to all.
        #[arg(long = "capability", value_name = "CAPABILITY")]
        capabilities: Vec<String>,
    },

    /// List keys for the account.
    #[command(alias = "ls")]
    List,

    /// Revoke a key by id.
    Revoke { id: String },
}

pub async fn run(
    state: &AppState,
    account_id: Uuid,
    command: ApiKeyCommand,
    json: bool,
) -> Result<()> {
    match command {
        ApiKeyCommand::Create { name, capabilities } => {
            let capabilities = parse_capabilities(&capabilities)?;
            let (record, key) = state
                .api_keys
                .create(&name, account_id, &capabilities)
                .await?;

            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({
                        "key": key,
                        "record": record,
                    }))?
                );
                return Ok(());
            }

            println!();
            println!(
                "  {} API key '{}' created (save this -- it won't be shown again):",
                style("🔑").bold(),
                record.name
            );
            println!();
            println!("  {}", style(&key).yellow().bold());
            println!();
            Ok(())
        }
        ApiKeyCommand::List => {
            let records = state.api_keys.list(Some(account_id)).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
                return Ok(());
            }

            let mut table = Table::new();
            table.load_preset(presets::UTF8_FULL_CONDENSED);
            table.set_content_arrangement(ContentArrangement::Dynamic);
            table.set_header(vec![
                Cell::new("Name").fg(Color::White),
                Cell::new("Capabilities").fg(Color::White),
                Cell::new("Last used").fg(Color::White),
                Cell::new("ID").fg(Color::White),
            ]);
            for record in &records {
                let caps = record
                    .capabilities
                    .iter()
                    .map(|c| c.as_str())
                    .collect::<Vec<_>>()
                    .join(", ");
                table.add_row(vec![
                    Cell::new(&record.name).fg(Color::Cyan),
                    Cell::new(caps),
                    Cell::new(record.last_used_at.as_deref().unwrap_or("never")),
                    Cell::new(record.id.to_string()).fg(Color::DarkGrey),
                ]);
            }
            println!();
            println!("{table}");
            println!();
            Ok(())
        }
        ApiKeyCommand::Revoke { id } => {
            let id: Uuid = parse_id(&id, "key")?;
            state.api_keys.revoke(&id).await?;
            if json {
                println!("{}", serde_json::json!({ "revoked": true, "id": id }));
            } else {
                println!("  {} API key revoked.", style("✓").red().bold());
            }
            Ok(())
        }
    }
}

fn parse_capabilities(raw: &[String]) -> Result<Vec<Capability>> {
    if raw.is_empty() {
        return Ok(Capability::ALL.to_vec());
    }
    raw.iter()
        .map(|s| s.parse::<Capability>().map_err(|e| anyhow::anyhow!(e)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_capabilities_means_all() {
        assert_eq!(parse_capabilities(&[]).unwrap().len(), Capability::ALL.len());
    }

    #[test]
    fn test_named_capabilities() {
        let caps = parse_capabilities(&["recipient_act".to_string()]).unwrap();
        assert_eq!(caps, vec![Capability::RecipientAct]);
        assert!(parse_capabilities(&["sudo".to_string()]).is_err());
    }
}
