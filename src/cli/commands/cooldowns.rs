//! Cooldown state CLI commands.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Subcommand};
use comfy_table::{presets, Attribute, Cell, Color, ContentArrangement, Table};
use serde::Serialize;

use crate::adapters::sqlite::{initialize_database, SqliteCooldownRecordStore};
use crate::cli::output::{output, truncate, CommandOutput};
use crate::domain::models::{Config, CooldownStateRecord};
use crate::domain::ports::CooldownRecordStore;

#[derive(Args, Debug)]
pub struct CooldownsArgs {
    #[command(subcommand)]
    pub command: CooldownsCommands,
}

#[derive(Subcommand, Debug)]
pub enum CooldownsCommands {
    /// List persisted cooldowns
    List {
        /// Only show records in this namespace
        #[arg(short, long)]
        namespace: Option<String>,
    },
}

#[derive(Debug, Serialize)]
pub struct CooldownEntryOutput {
    pub namespace: String,
    pub record: String,
    pub key: String,
    pub suppress_until: String,
    pub active: bool,
}

#[derive(Debug, Serialize)]
pub struct CooldownListOutput {
    pub records: usize,
    pub entries: Vec<CooldownEntryOutput>,
}

fn entries_of(record: &CooldownStateRecord, now: DateTime<Utc>) -> Vec<CooldownEntryOutput> {
    record
        .raw_cooldowns()
        .into_iter()
        .map(|(key, until)| {
            let active = DateTime::parse_from_rfc3339(&until)
                .map(|t| now < t.with_timezone(&Utc))
                .unwrap_or(false);
            CooldownEntryOutput {
                namespace: record.metadata.namespace.clone(),
                record: record.metadata.name.clone(),
                key,
                suppress_until: until,
                active,
            }
        })
        .collect()
}

impl CooldownListOutput {
    pub fn from_records(records: &[CooldownStateRecord], now: DateTime<Utc>) -> Self {
        Self {
            records: records.len(),
            entries: records.iter().flat_map(|r| entries_of(r, now)).collect(),
        }
    }
}

impl CommandOutput for CooldownListOutput {
    fn to_human(&self) -> String {
        if self.entries.is_empty() {
            return "No persisted cooldowns found.".to_string();
        }

        let mut table = Table::new();
        table
            .load_preset(presets::UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(vec![
            Cell::new("Namespace").add_attribute(Attribute::Bold),
            Cell::new("Record").add_attribute(Attribute::Bold),
            Cell::new("Key").add_attribute(Attribute::Bold),
            Cell::new("Suppress Until").add_attribute(Attribute::Bold),
            Cell::new("Status").add_attribute(Attribute::Bold),
        ]);

        for entry in &self.entries {
            let status = if entry.active {
                Cell::new("active").fg(Color::Yellow)
            } else {
                Cell::new("expired").fg(Color::DarkGrey)
            };
            table.add_row(vec![
                Cell::new(&entry.namespace),
                Cell::new(truncate(&entry.record, 40)),
                Cell::new(&entry.key),
                Cell::new(&entry.suppress_until),
                status,
            ]);
        }

        format!(
            "{} cooldown(s) in {} record(s):\n{table}",
            self.entries.len(),
            self.records
        )
    }
}

pub async fn execute(args: CooldownsArgs, config: &Config, json_mode: bool) -> Result<()> {
    let pool = initialize_database(&config.persistence.database_path)
        .await
        .with_context(|| format!("Failed to open cooldown store at {}", config.persistence.database_path))?;
    let store = SqliteCooldownRecordStore::new(pool);

    match args.command {
        CooldownsCommands::List { namespace } => {
            let records = store
                .list(namespace.as_deref())
                .await
                .context("Failed to list cooldown records")?;
            output(&CooldownListOutput::from_records(&records, Utc::now()), json_mode);
        }
    }
    Ok(())
}
