//! Subcommands and their execution against an opened registry.

use crate::output::print_json;
use anyhow::{bail, Context};
use chrono::{DateTime, TimeDelta, Utc};
use clap::Subcommand;
use concord_ledger::ChainVerificationReport;
use concord_registry::DeliberationRegistry;
use concord_types::{DecreeId, Payload, ProposalId, VoteValue};
use serde_json::Value;

/// Available commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Create a proposal
    Propose {
        /// Proposal title
        #[arg(long)]
        title: String,

        /// Longer description
        #[arg(long, default_value = "")]
        description: String,

        /// Member submitting the proposal
        #[arg(long)]
        proposer: String,

        /// Voting deadline (RFC3339). Defaults to now plus --ttl-hours.
        #[arg(long)]
        deadline: Option<DateTime<Utc>>,

        /// Hours until the default deadline
        #[arg(long, default_value_t = 24)]
        ttl_hours: i64,

        /// Metadata entries as key=value (value parsed as JSON when possible)
        #[arg(long = "meta", value_parser = parse_key_value)]
        metadata: Vec<(String, Value)>,
    },

    /// Cast or replace a member's vote
    Vote {
        proposal_id: String,
        member_id: String,
        /// "yes", "no", "abstain", ... or a number in [-1, 1]
        #[arg(allow_hyphen_values = true)]
        value: String,
    },

    /// Finalize a proposal into a decree
    Finalize {
        proposal_id: String,

        #[arg(long)]
        outcome: String,

        /// Decree content entries as key=value
        #[arg(long = "content", value_parser = parse_key_value)]
        content: Vec<(String, Value)>,
    },

    /// Operational status store
    Status {
        #[command(subcommand)]
        command: StatusCommands,
    },

    /// List proposals
    Proposals,

    /// List decrees, or show one
    Decrees {
        decree_id: Option<String>,
    },

    /// Ledger blocks recorded for one proposal
    History { proposal_id: String },

    /// Verify the ledger's hash chain
    Verify,
}

#[derive(Debug, Subcommand)]
pub enum StatusCommands {
    /// Overwrite a status entry
    Set {
        key: String,
        /// Value entries as key=value
        #[arg(value_parser = parse_key_value, required = true)]
        entries: Vec<(String, Value)>,
    },

    /// Show one status entry
    Get { key: String },

    /// List all status entries
    List,
}

impl Commands {
    pub async fn execute(self, registry: &DeliberationRegistry) -> anyhow::Result<()> {
        match self {
            Commands::Propose {
                title,
                description,
                proposer,
                deadline,
                ttl_hours,
                metadata,
            } => {
                let deadline = match deadline {
                    Some(deadline) => deadline,
                    None => deadline_in(ttl_hours)?,
                };
                let proposal = registry
                    .create_proposal(&title, &description, &proposer, deadline, to_payload(metadata))
                    .await?;
                print_json(&proposal)
            }
            Commands::Vote {
                proposal_id,
                member_id,
                value,
            } => {
                let vote = registry
                    .cast_vote(
                        &ProposalId::from(proposal_id.as_str()),
                        &member_id,
                        parse_vote_value(&value),
                    )
                    .await?;
                print_json(&vote)
            }
            Commands::Finalize {
                proposal_id,
                outcome,
                content,
            } => {
                let decree = registry
                    .finalize_deliberation(
                        &ProposalId::from(proposal_id.as_str()),
                        &outcome,
                        to_payload(content),
                    )
                    .await?;
                print_json(&decree)
            }
            Commands::Status { command } => match command {
                StatusCommands::Set { key, entries } => {
                    let entry = registry
                        .update_operational_status(&key, to_payload(entries))
                        .await?;
                    print_json(&entry)
                }
                StatusCommands::Get { key } => {
                    print_json(&registry.get_operational_status(&key).await?)
                }
                StatusCommands::List => print_json(&registry.list_operational_status().await),
            },
            Commands::Proposals => print_json(&registry.list_proposals().await),
            Commands::Decrees { decree_id } => match decree_id {
                Some(id) => print_json(&registry.get_decree(&DecreeId::from(id.as_str())).await?),
                None => print_json(&registry.list_decrees().await),
            },
            Commands::History { proposal_id } => {
                let blocks = registry
                    .proposal_history(&ProposalId::from(proposal_id.as_str()))
                    .await?;
                print_json(&blocks)
            }
            Commands::Verify => report_verification(&registry.verification_report().await),
        }
    }

    /// Whether the command changes state.
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Commands::Propose { .. }
                | Commands::Vote { .. }
                | Commands::Finalize { .. }
                | Commands::Status {
                    command: StatusCommands::Set { .. }
                }
        )
    }
}

/// Print a verification report; an invalid chain is an error.
pub fn report_verification(report: &ChainVerificationReport) -> anyhow::Result<()> {
    print_json(report)?;
    if !report.valid {
        bail!(
            "ledger verification failed: {}",
            report.message.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

/// Deadline `ttl_hours` from now.
pub fn deadline_in(ttl_hours: i64) -> anyhow::Result<DateTime<Utc>> {
    TimeDelta::try_hours(ttl_hours)
        .and_then(|ttl| Utc::now().checked_add_signed(ttl))
        .with_context(|| format!("--ttl-hours {ttl_hours} puts the deadline out of range"))
}

/// Parse `key=value`; the value is JSON when it parses as JSON, a string otherwise.
pub fn parse_key_value(raw: &str) -> anyhow::Result<(String, Value)> {
    let (key, value) = raw
        .split_once('=')
        .with_context(|| format!("expected key=value, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        bail!("empty key in '{raw}'");
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

/// Numbers become numeric votes, everything else a text vote.
pub fn parse_vote_value(raw: &str) -> VoteValue {
    match raw.trim().parse::<f64>() {
        Ok(n) if n.is_finite() => VoteValue::Number(n),
        _ => VoteValue::text(raw.trim()),
    }
}

fn to_payload(entries: Vec<(String, Value)>) -> Payload {
    entries.into_iter().collect()
}
