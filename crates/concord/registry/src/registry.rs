//! The deliberation registry.

use crate::config::{CoherencePolicy, DeadlinePolicy, RegistryConfig};
use crate::error::{RegistryError, RegistryResult};
use crate::state::RegistryState;
use chrono::{DateTime, Utc};
use concord_audit::{build_audit_sink, AuditSink};
use concord_ledger::{
    hash_record, Block, ChainVerificationReport, DeliberationFinalized, HashChainLedger,
    LedgerEvent, ProposalCreated, StatusUpdated, VoteCast,
};
use concord_resonance::ResonanceScorer;
use concord_types::{
    now, payload_depth, Decree, DecreeId, Payload, Proposal, ProposalId, ProposalStatus,
    Resonance, StatusEntry, Vote, VoteValue, MAX_PAYLOAD_DEPTH,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{info, instrument, warn};

#[derive(Serialize)]
struct ProposalContent<'a> {
    title: &'a str,
    description: &'a str,
    deadline: &'a DateTime<Utc>,
    metadata: &'a Payload,
}

#[derive(Serialize)]
struct VoteContent<'a> {
    value: &'a VoteValue,
}

#[derive(Serialize)]
struct DecreeContent<'a> {
    proposal_id: &'a ProposalId,
    outcome: &'a str,
    content: &'a Payload,
    resonance: Resonance,
    decision_energy: f64,
    coherent: bool,
}

/// Reject payloads nested too deeply for the ledger file to load again.
fn check_payload_depth(field: &str, payload: &Payload) -> RegistryResult<()> {
    let depth = payload_depth(payload);
    if depth > MAX_PAYLOAD_DEPTH {
        return Err(RegistryError::validation(format!(
            "{field} is nested {depth} levels deep; at most {MAX_PAYLOAD_DEPTH} allowed"
        )));
    }
    Ok(())
}

/// Single-writer registry of proposals, votes, decrees and status entries.
///
/// All state, the ledger included, sits behind one `RwLock`. Mutations hold
/// the write lock from validation until the block is appended; audit
/// notification happens after it is released.
pub struct DeliberationRegistry {
    state: RwLock<RegistryState>,
    scorer: ResonanceScorer,
    config: RegistryConfig,
    audit: Arc<dyn AuditSink>,
    audit_timeout: Duration,
}

impl DeliberationRegistry {
    /// Open the ledger, verify it and rebuild state by replaying every block.
    pub async fn open(config: RegistryConfig, audit: Arc<dyn AuditSink>) -> RegistryResult<Self> {
        config.scorer.validate()?;

        let ledger = HashChainLedger::open(&config.ledger).await?;
        let state = RegistryState::replay(ledger)?;
        info!(
            path = %config.ledger.path.display(),
            blocks = state.ledger.len(),
            proposals = state.proposals.len(),
            decrees = state.decrees.len(),
            statuses = state.statuses.len(),
            audit_sink = audit.name(),
            "registry opened"
        );

        Ok(Self {
            state: RwLock::new(state),
            scorer: ResonanceScorer::new(config.scorer.clone()),
            audit_timeout: Duration::from_millis(config.audit.timeout_ms),
            config,
            audit,
        })
    }

    /// Open with the audit sink described by `config.audit`.
    pub async fn from_config(config: RegistryConfig) -> RegistryResult<Self> {
        let audit = build_audit_sink(&config.audit);
        Self::open(config, audit).await
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn scorer(&self) -> &ResonanceScorer {
        &self.scorer
    }

    // ========== Proposals ==========

    #[instrument(skip(self, description, proposer_id, metadata), fields(proposer = %proposer_id))]
    pub async fn create_proposal(
        &self,
        title: &str,
        description: &str,
        proposer_id: &str,
        deadline: DateTime<Utc>,
        metadata: Payload,
    ) -> RegistryResult<Proposal> {
        if title.trim().is_empty() {
            return Err(RegistryError::validation("proposal title must not be empty"));
        }
        check_payload_depth("metadata", &metadata)?;

        let id = ProposalId::generate();
        let created_at = now();
        let content_hash = hash_record(
            id.as_str(),
            &created_at,
            &ProposalContent {
                title,
                description,
                deadline: &deadline,
                metadata: &metadata,
            },
            proposer_id,
        )?;

        let proposal = Proposal {
            id,
            title: title.to_string(),
            description: description.to_string(),
            proposer_id: proposer_id.to_string(),
            status: ProposalStatus::Open,
            deadline,
            created_at,
            content_hash,
            metadata,
            votes: BTreeMap::new(),
        };

        let block = {
            let mut state = self.state.write().await;
            state
                .commit(LedgerEvent::ProposalCreated(ProposalCreated {
                    proposal: proposal.clone(),
                }))
                .await?
        };

        info!(proposal_id = %proposal.id, title = %proposal.title, "proposal created");
        self.notify(&block).await;
        Ok(proposal)
    }

    /// Record `member_id`'s vote, replacing any earlier one.
    #[instrument(skip(self, proposal_id, member_id, value), fields(proposal_id = %proposal_id, member = %member_id))]
    pub async fn cast_vote(
        &self,
        proposal_id: &ProposalId,
        member_id: &str,
        value: VoteValue,
    ) -> RegistryResult<Vote> {
        if member_id.trim().is_empty() {
            return Err(RegistryError::validation("member id must not be empty"));
        }
        if let VoteValue::Number(n) = &value {
            if !n.is_finite() {
                return Err(RegistryError::validation("numeric vote must be finite"));
            }
        }

        let (vote, block) = {
            let mut state = self.state.write().await;
            let proposal = state
                .proposals
                .get(proposal_id)
                .ok_or_else(|| RegistryError::not_found("proposal", proposal_id))?;

            if !proposal.is_open() {
                return Err(RegistryError::AlreadyFinalized(proposal_id.clone()));
            }

            let cast_at = now();
            if self.config.deadline_policy == DeadlinePolicy::Enforce && cast_at > proposal.deadline
            {
                return Err(RegistryError::DeadlinePassed {
                    proposal_id: proposal_id.clone(),
                    deadline: proposal.deadline,
                });
            }

            let content_hash = hash_record(
                proposal_id.as_str(),
                &cast_at,
                &VoteContent { value: &value },
                member_id,
            )?;
            let vote = Vote {
                member_id: member_id.to_string(),
                value,
                content_hash,
                cast_at,
            };

            let mut votes = proposal.votes.clone();
            let replaced = votes.insert(vote.member_id.clone(), vote.clone()).is_some();
            let vote_list: Vec<Vote> = votes.into_values().collect();
            let (resonance, decision_energy) = self.scorer.aggregate(&vote_list);

            let block = state
                .commit(LedgerEvent::VoteCast(VoteCast {
                    proposal_id: proposal_id.clone(),
                    vote: vote.clone(),
                    replaced,
                    resonance,
                    decision_energy,
                    vote_count: vote_list.len(),
                }))
                .await?;

            info!(
                replaced,
                votes = vote_list.len(),
                %resonance,
                decision_energy,
                "vote cast"
            );
            (vote, block)
        };

        self.notify(&block).await;
        Ok(vote)
    }

    /// Close the proposal and promulgate its decree.
    #[instrument(skip(self, proposal_id, content), fields(proposal_id = %proposal_id))]
    pub async fn finalize_deliberation(
        &self,
        proposal_id: &ProposalId,
        outcome: &str,
        content: Payload,
    ) -> RegistryResult<Decree> {
        if outcome.trim().is_empty() {
            return Err(RegistryError::validation("outcome must not be empty"));
        }
        check_payload_depth("decree content", &content)?;

        let (decree, block) = {
            let mut state = self.state.write().await;
            let proposal = state
                .proposals
                .get(proposal_id)
                .ok_or_else(|| RegistryError::not_found("proposal", proposal_id))?;

            if !proposal.is_open() {
                return Err(RegistryError::AlreadyFinalized(proposal_id.clone()));
            }

            let votes = proposal.vote_list();
            let (resonance, decision_energy) = self.scorer.aggregate(&votes);
            let coherent = self.scorer.is_coherent(resonance);

            if !coherent && self.config.coherence_policy == CoherencePolicy::RequireCoherence {
                return Err(RegistryError::IncoherentOutcome {
                    proposal_id: proposal_id.clone(),
                    resonance,
                    threshold: self.scorer.threshold(),
                });
            }

            let id = DecreeId::generate();
            let promulgated_at = now();
            let content_hash = hash_record(
                id.as_str(),
                &promulgated_at,
                &DecreeContent {
                    proposal_id,
                    outcome,
                    content: &content,
                    resonance,
                    decision_energy,
                    coherent,
                },
                &self.config.author_id,
            )?;

            let decree = Decree {
                id,
                proposal_id: proposal_id.clone(),
                outcome: outcome.to_string(),
                content,
                promulgated_at,
                content_hash,
                resonance,
                decision_energy,
                coherent,
                tally: ResonanceScorer::tally(&votes),
            };

            let block = state
                .commit(LedgerEvent::DeliberationFinalized(DeliberationFinalized {
                    decree: decree.clone(),
                }))
                .await?;
            (decree, block)
        };

        if decree.coherent {
            info!(decree_id = %decree.id, outcome = %decree.outcome, resonance = %decree.resonance, "decree promulgated");
        } else {
            warn!(
                decree_id = %decree.id,
                outcome = %decree.outcome,
                resonance = %decree.resonance,
                threshold = self.scorer.threshold(),
                "decree promulgated without coherence"
            );
        }
        self.notify(&block).await;
        Ok(decree)
    }

    pub async fn get_proposal(&self, proposal_id: &ProposalId) -> RegistryResult<Proposal> {
        self.state
            .read()
            .await
            .proposals
            .get(proposal_id)
            .cloned()
            .ok_or_else(|| RegistryError::not_found("proposal", proposal_id))
    }

    /// All proposals, oldest first.
    pub async fn list_proposals(&self) -> Vec<Proposal> {
        let mut proposals: Vec<Proposal> =
            self.state.read().await.proposals.values().cloned().collect();
        proposals.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        proposals
    }

    pub async fn get_decree(&self, decree_id: &DecreeId) -> RegistryResult<Decree> {
        self.state
            .read()
            .await
            .decrees
            .get(decree_id)
            .cloned()
            .ok_or_else(|| RegistryError::not_found("decree", decree_id))
    }

    /// All decrees, oldest first.
    pub async fn list_decrees(&self) -> Vec<Decree> {
        let mut decrees: Vec<Decree> = self.state.read().await.decrees.values().cloned().collect();
        decrees.sort_by(|a, b| {
            a.promulgated_at
                .cmp(&b.promulgated_at)
                .then(a.id.cmp(&b.id))
        });
        decrees
    }

    // ========== Operational status ==========

    #[instrument(skip(self, value))]
    pub async fn update_operational_status(
        &self,
        key: &str,
        value: Payload,
    ) -> RegistryResult<StatusEntry> {
        if key.trim().is_empty() {
            return Err(RegistryError::validation("status key must not be empty"));
        }
        check_payload_depth("status value", &value)?;

        let updated_at = now();
        let content_hash = hash_record(key, &updated_at, &value, &self.config.author_id)?;
        let entry = StatusEntry {
            key: key.to_string(),
            value,
            content_hash,
            updated_at,
        };

        let block = {
            let mut state = self.state.write().await;
            state
                .commit(LedgerEvent::StatusUpdated(StatusUpdated {
                    entry: entry.clone(),
                }))
                .await?
        };

        info!(key, "operational status updated");
        self.notify(&block).await;
        Ok(entry)
    }

    pub async fn get_operational_status(&self, key: &str) -> RegistryResult<StatusEntry> {
        self.state
            .read()
            .await
            .statuses
            .get(key)
            .cloned()
            .ok_or_else(|| RegistryError::not_found("status", key))
    }

    /// All status entries in key order.
    pub async fn list_operational_status(&self) -> Vec<StatusEntry> {
        self.state.read().await.statuses.values().cloned().collect()
    }

    // ========== Ledger ==========

    pub async fn ledger_snapshot(&self) -> Vec<Block> {
        self.state.read().await.ledger.chain()
    }

    pub async fn ledger_len(&self) -> usize {
        self.state.read().await.ledger.len()
    }

    pub async fn ledger_path(&self) -> PathBuf {
        self.state.read().await.ledger.path().to_path_buf()
    }

    pub async fn verify_ledger(&self) -> RegistryResult<()> {
        Ok(self.state.read().await.ledger.verify()?)
    }

    pub async fn verification_report(&self) -> ChainVerificationReport {
        self.state.read().await.ledger.verification_report()
    }

    /// Every block recorded for one proposal, in chain order.
    pub async fn proposal_history(&self, proposal_id: &ProposalId) -> RegistryResult<Vec<Block>> {
        let state = self.state.read().await;
        if !state.proposals.contains_key(proposal_id) {
            return Err(RegistryError::not_found("proposal", proposal_id));
        }
        Ok(state.ledger.blocks_for(proposal_id))
    }

    /// Whether every block has reached durable storage.
    pub async fn is_durable(&self) -> bool {
        self.state.read().await.ledger.is_durable()
    }

    /// Retry writing the chain after an earlier persistence failure.
    pub async fn persist_ledger(&self) -> RegistryResult<()> {
        self.state.write().await.ledger.persist().await?;
        Ok(())
    }

    async fn notify(&self, block: &Block) {
        let sink = self.audit.name();
        match tokio::time::timeout(
            self.audit_timeout,
            self.audit.notify(&block.event, block.payload.clone()),
        )
        .await
        {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                warn!(sink, event = %block.event, index = block.index, error = %err, "audit notification failed")
            }
            Err(_) => warn!(
                sink,
                event = %block.event,
                index = block.index,
                timeout_ms = self.audit_timeout.as_millis() as u64,
                "audit notification timed out"
            ),
        }
    }
}
