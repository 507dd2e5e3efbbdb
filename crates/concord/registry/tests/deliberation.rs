use async_trait::async_trait;
use chrono::{DateTime, Utc};
use concord_audit::{AuditError, AuditResult, AuditSink, HttpAuditSink, MemoryAuditSink};
use concord_ledger::{verify_chain, LedgerEvent};
use concord_registry::{
    CoherencePolicy, DeadlinePolicy, DeliberationRegistry, RegistryConfig, RegistryError,
};
use concord_types::{Payload, ProposalId, ProposalStatus, VoteValue};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn config_at(path: &Path) -> RegistryConfig {
    RegistryConfig::with_ledger_path(path.join("ledger.json"))
}

async fn open(config: RegistryConfig) -> DeliberationRegistry {
    DeliberationRegistry::open(config, Arc::new(MemoryAuditSink::new()))
        .await
        .unwrap()
}

fn in_hours(hours: i64) -> DateTime<Utc> {
    Utc::now() + chrono::Duration::hours(hours)
}

#[tokio::test]
async fn budget_alpha_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let registry = open(config_at(dir.path())).await;

    let proposal = registry
        .create_proposal(
            "Budget Alpha",
            "Allocate the Q3 budget",
            "treasurer",
            in_hours(24),
            Payload::new(),
        )
        .await
        .unwrap();

    for (member, value) in [("m1", "yes"), ("m2", "yes"), ("m3", "no")] {
        registry
            .cast_vote(&proposal.id, member, value.into())
            .await
            .unwrap();
    }

    let decree = registry
        .finalize_deliberation(&proposal.id, "Approved", Payload::new())
        .await
        .unwrap();

    assert_eq!(registry.ledger_len().await, 6);
    assert_eq!(decree.outcome, "Approved");
    assert_eq!(decree.proposal_id, proposal.id);
    assert!(decree.coherent);
    assert!((decree.resonance.re - 1.5).abs() < 1e-9);
    assert!((decree.decision_energy - 2.25).abs() < 1e-9);
    assert_eq!(decree.tally.approve, 2);
    assert_eq!(decree.tally.reject, 1);
    assert_eq!(decree.content_hash.len(), 64);

    let stored = registry.get_proposal(&proposal.id).await.unwrap();
    assert_eq!(stored.status, ProposalStatus::Finalized);
    assert_eq!(registry.list_decrees().await, vec![decree.clone()]);
    assert_eq!(registry.get_decree(&decree.id).await.unwrap(), decree);

    let events: Vec<String> = registry
        .ledger_snapshot()
        .await
        .into_iter()
        .map(|b| b.event)
        .collect();
    assert_eq!(
        events,
        vec![
            "genesis",
            "create_proposal",
            "cast_vote",
            "cast_vote",
            "cast_vote",
            "finalize_deliberation"
        ]
    );
    registry.verify_ledger().await.unwrap();
}

#[tokio::test]
async fn reopened_registry_replays_the_same_state() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_at(dir.path());

    let (chain, proposals, decrees, status) = {
        let registry = open(config.clone()).await;
        let p = registry
            .create_proposal("Budget Alpha", "", "treasurer", in_hours(24), Payload::new())
            .await
            .unwrap();
        registry
            .cast_vote(&p.id, "m1", VoteValue::Number(0.8))
            .await
            .unwrap();
        registry.cast_vote(&p.id, "m2", "no".into()).await.unwrap();
        registry
            .finalize_deliberation(&p.id, "Approved", Payload::new())
            .await
            .unwrap();

        let open_one = registry
            .create_proposal("Budget Beta", "", "treasurer", in_hours(48), Payload::new())
            .await
            .unwrap();
        registry
            .cast_vote(&open_one.id, "m1", "abstain".into())
            .await
            .unwrap();

        let mut value = Payload::new();
        value.insert("quorum".into(), json!(3));
        registry
            .update_operational_status("council", value)
            .await
            .unwrap();

        assert!(registry.is_durable().await);
        (
            registry.ledger_snapshot().await,
            registry.list_proposals().await,
            registry.list_decrees().await,
            registry.get_operational_status("council").await.unwrap(),
        )
    };

    let reopened = open(config).await;
    assert_eq!(reopened.ledger_snapshot().await, chain);
    assert_eq!(
        serde_json::to_string(&reopened.ledger_snapshot().await).unwrap(),
        serde_json::to_string(&chain).unwrap()
    );
    assert_eq!(reopened.list_proposals().await, proposals);
    assert_eq!(reopened.list_decrees().await, decrees);
    assert_eq!(
        reopened.get_operational_status("council").await.unwrap(),
        status
    );
    reopened.verify_ledger().await.unwrap();

    // The replayed registry keeps working on top of the old chain.
    let beta = proposals
        .iter()
        .find(|p| p.title == "Budget Beta")
        .unwrap();
    reopened.cast_vote(&beta.id, "m2", "yes".into()).await.unwrap();
    assert_eq!(reopened.ledger_len().await, chain.len() + 1);
}

#[tokio::test]
async fn second_vote_from_a_member_replaces_the_first() {
    let dir = tempfile::tempdir().unwrap();
    let registry = open(config_at(dir.path())).await;
    let p = registry
        .create_proposal("Charter", "", "chair", in_hours(24), Payload::new())
        .await
        .unwrap();

    registry.cast_vote(&p.id, "m1", "yes".into()).await.unwrap();
    let before = registry.ledger_len().await;
    let second = registry.cast_vote(&p.id, "m1", "no".into()).await.unwrap();

    assert_eq!(registry.ledger_len().await, before + 1);
    let stored = registry.get_proposal(&p.id).await.unwrap();
    assert_eq!(stored.votes.len(), 1);
    assert_eq!(stored.votes["m1"].value, VoteValue::text("no"));
    assert_eq!(stored.votes["m1"], second);

    let last = registry.ledger_snapshot().await.pop().unwrap();
    match last.decode_event().unwrap() {
        LedgerEvent::VoteCast(cast) => {
            assert!(cast.replaced);
            assert_eq!(cast.vote_count, 1);
        }
        other => panic!("expected a vote event, got {other:?}"),
    }
}

#[tokio::test]
async fn finalizing_twice_is_rejected_without_a_block() {
    let dir = tempfile::tempdir().unwrap();
    let registry = open(config_at(dir.path())).await;
    let p = registry
        .create_proposal("Charter", "", "chair", in_hours(24), Payload::new())
        .await
        .unwrap();
    registry.cast_vote(&p.id, "m1", "yes".into()).await.unwrap();
    registry
        .finalize_deliberation(&p.id, "Adopted", Payload::new())
        .await
        .unwrap();
    let len = registry.ledger_len().await;

    let err = registry
        .finalize_deliberation(&p.id, "Adopted again", Payload::new())
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::AlreadyFinalized(id) if id == p.id));

    let err = registry
        .cast_vote(&p.id, "m2", "yes".into())
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::AlreadyFinalized(_)));

    assert_eq!(registry.ledger_len().await, len);
    assert_eq!(registry.list_decrees().await.len(), 1);
}

#[tokio::test]
async fn unknown_ids_leave_the_ledger_alone() {
    let dir = tempfile::tempdir().unwrap();
    let registry = open(config_at(dir.path())).await;
    let ghost = ProposalId::from("does-not-exist");

    let err = registry
        .cast_vote(&ghost, "m1", "yes".into())
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::NotFound { kind: "proposal", .. }));

    let err = registry
        .finalize_deliberation(&ghost, "Approved", Payload::new())
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    assert!(registry.get_proposal(&ghost).await.unwrap_err().is_not_found());
    assert!(registry.proposal_history(&ghost).await.unwrap_err().is_not_found());
    assert_eq!(registry.ledger_len().await, 1);
}

#[tokio::test]
async fn dissonant_outcome_is_flagged_by_default() {
    let dir = tempfile::tempdir().unwrap();
    let registry = open(config_at(dir.path())).await;
    let p = registry
        .create_proposal("Levy", "", "chair", in_hours(24), Payload::new())
        .await
        .unwrap();
    registry.cast_vote(&p.id, "m1", "no".into()).await.unwrap();
    registry.cast_vote(&p.id, "m2", "no".into()).await.unwrap();

    let decree = registry
        .finalize_deliberation(&p.id, "Rejected", Payload::new())
        .await
        .unwrap();
    assert!(!decree.coherent);
    assert!(decree.resonance.re < 0.0);
}

#[tokio::test]
async fn require_coherence_refuses_dissonant_outcomes() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config_at(dir.path());
    config.coherence_policy = CoherencePolicy::RequireCoherence;
    let registry = open(config).await;

    let p = registry
        .create_proposal("Levy", "", "chair", in_hours(24), Payload::new())
        .await
        .unwrap();
    registry.cast_vote(&p.id, "m1", "no".into()).await.unwrap();
    let len = registry.ledger_len().await;

    let err = registry
        .finalize_deliberation(&p.id, "Approved", Payload::new())
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::IncoherentOutcome { threshold, .. } if threshold == 0.5));
    assert_eq!(registry.ledger_len().await, len);
    assert!(registry.get_proposal(&p.id).await.unwrap().is_open());

    // More support brings it over the threshold.
    registry.cast_vote(&p.id, "m2", "yes".into()).await.unwrap();
    registry.cast_vote(&p.id, "m3", "yes".into()).await.unwrap();
    let decree = registry
        .finalize_deliberation(&p.id, "Approved", Payload::new())
        .await
        .unwrap();
    assert!(decree.coherent);
}

#[tokio::test]
async fn deadline_is_advisory_unless_enforced() {
    let dir = tempfile::tempdir().unwrap();
    let advisory = open(config_at(&dir.path().join("advisory"))).await;
    let p = advisory
        .create_proposal("Late", "", "chair", in_hours(-1), Payload::new())
        .await
        .unwrap();
    advisory.cast_vote(&p.id, "m1", "yes".into()).await.unwrap();

    let mut config = config_at(&dir.path().join("enforced"));
    config.deadline_policy = DeadlinePolicy::Enforce;
    let enforced = open(config).await;
    let p = enforced
        .create_proposal("Late", "", "chair", in_hours(-1), Payload::new())
        .await
        .unwrap();
    let len = enforced.ledger_len().await;

    let err = enforced
        .cast_vote(&p.id, "m1", "yes".into())
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::DeadlinePassed { .. }));
    assert_eq!(enforced.ledger_len().await, len);

    // Finalization stays possible after the deadline.
    enforced
        .finalize_deliberation(&p.id, "Lapsed", Payload::new())
        .await
        .unwrap();
}

#[tokio::test]
async fn vote_order_does_not_change_the_decree() {
    let dir = tempfile::tempdir().unwrap();
    let registry = open(config_at(dir.path())).await;
    let orders = [["A", "B", "C"], ["C", "A", "B"], ["B", "C", "A"]];
    let stance = |member: &str| if member == "B" { "no" } else { "yes" };

    let mut results = Vec::new();
    for order in orders {
        let p = registry
            .create_proposal("Perm", "", "chair", in_hours(24), Payload::new())
            .await
            .unwrap();
        for member in order {
            registry
                .cast_vote(&p.id, member, stance(member).into())
                .await
                .unwrap();
        }
        let decree = registry
            .finalize_deliberation(&p.id, "Approved", Payload::new())
            .await
            .unwrap();
        results.push((decree.resonance, decree.decision_energy));
    }

    assert!(results.windows(2).all(|w| w[0] == w[1]));
}

#[tokio::test]
async fn proposal_history_lists_its_blocks() {
    let dir = tempfile::tempdir().unwrap();
    let registry = open(config_at(dir.path())).await;
    let a = registry
        .create_proposal("A", "", "chair", in_hours(24), Payload::new())
        .await
        .unwrap();
    let b = registry
        .create_proposal("B", "", "chair", in_hours(24), Payload::new())
        .await
        .unwrap();
    registry.cast_vote(&a.id, "m1", "yes".into()).await.unwrap();
    registry.cast_vote(&b.id, "m1", "yes".into()).await.unwrap();
    registry
        .finalize_deliberation(&a.id, "Approved", Payload::new())
        .await
        .unwrap();

    let history: Vec<String> = registry
        .proposal_history(&a.id)
        .await
        .unwrap()
        .into_iter()
        .map(|block| block.event)
        .collect();
    assert_eq!(
        history,
        vec!["create_proposal", "cast_vote", "finalize_deliberation"]
    );

    let proposals = registry.list_proposals().await;
    assert_eq!(proposals.len(), 2);
    assert!(proposals[0].created_at <= proposals[1].created_at);
}

#[tokio::test]
async fn concurrent_voters_are_serialized() {
    let dir = tempfile::tempdir().unwrap();
    let registry = Arc::new(open(config_at(dir.path())).await);
    let p = registry
        .create_proposal("Busy", "", "chair", in_hours(24), Payload::new())
        .await
        .unwrap();

    let mut handles = Vec::new();
    for i in 0..16 {
        let registry = Arc::clone(&registry);
        let id = p.id.clone();
        handles.push(tokio::spawn(async move {
            registry
                .cast_vote(&id, &format!("member-{i:02}"), "yes".into())
                .await
                .unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(registry.ledger_len().await, 18);
    assert_eq!(registry.get_proposal(&p.id).await.unwrap().votes.len(), 16);
    verify_chain(&registry.ledger_snapshot().await).unwrap();

    let report = registry.verification_report().await;
    assert!(report.valid);
    assert_eq!(report.total_blocks, 18);
}

struct FailingSink;

#[async_trait]
impl AuditSink for FailingSink {
    async fn notify(&self, _event_type: &str, _payload: Value) -> AuditResult<()> {
        Err(AuditError::Unavailable("connection refused".into()))
    }

    fn name(&self) -> &'static str {
        "failing"
    }
}

struct StalledSink;

#[async_trait]
impl AuditSink for StalledSink {
    async fn notify(&self, _event_type: &str, _payload: Value) -> AuditResult<()> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "stalled"
    }
}

#[tokio::test]
async fn failing_audit_sink_never_fails_an_operation() {
    let dir = tempfile::tempdir().unwrap();
    let registry = DeliberationRegistry::open(config_at(dir.path()), Arc::new(FailingSink))
        .await
        .unwrap();

    let p = registry
        .create_proposal("Audit", "", "chair", in_hours(24), Payload::new())
        .await
        .unwrap();
    registry.cast_vote(&p.id, "m1", "yes".into()).await.unwrap();
    registry
        .finalize_deliberation(&p.id, "Approved", Payload::new())
        .await
        .unwrap();
    assert_eq!(registry.ledger_len().await, 4);
}

#[tokio::test]
async fn unreachable_http_sink_never_fails_an_operation() {
    let dir = tempfile::tempdir().unwrap();
    let sink = HttpAuditSink::new("http://127.0.0.1:9", Duration::from_millis(300)).unwrap();
    let registry = DeliberationRegistry::open(config_at(dir.path()), Arc::new(sink))
        .await
        .unwrap();

    let p = registry
        .create_proposal("Audit", "", "chair", in_hours(24), Payload::new())
        .await
        .unwrap();
    registry.cast_vote(&p.id, "m1", "yes".into()).await.unwrap();
    assert_eq!(registry.ledger_len().await, 3);
}

#[tokio::test]
async fn stalled_audit_sink_is_cut_off_by_its_timeout() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config_at(dir.path());
    config.audit.timeout_ms = 50;
    let registry = DeliberationRegistry::open(config, Arc::new(StalledSink))
        .await
        .unwrap();

    let started = Instant::now();
    registry
        .create_proposal("Audit", "", "chair", in_hours(24), Payload::new())
        .await
        .unwrap();
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(registry.ledger_len().await, 2);
}

#[tokio::test]
async fn failed_ledger_write_keeps_the_change() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_at(dir.path());
    let path = config.ledger.path.clone();
    let registry = open(config).await;

    // A directory in place of the ledger file makes the rename fail.
    tokio::fs::remove_file(&path).await.unwrap();
    tokio::fs::create_dir(&path).await.unwrap();
    let p = registry
        .create_proposal("Offline", "", "chair", in_hours(24), Payload::new())
        .await
        .unwrap();
    assert!(!registry.is_durable().await);
    assert_eq!(registry.get_proposal(&p.id).await.unwrap().title, "Offline");
    assert_eq!(registry.ledger_len().await, 2);

    tokio::fs::remove_dir(&path).await.unwrap();
    registry.persist_ledger().await.unwrap();
    assert!(registry.is_durable().await);
}

fn nested(levels: usize) -> Value {
    let mut value = json!("core");
    for _ in 0..levels {
        value = Value::Array(vec![value]);
    }
    value
}

#[tokio::test]
async fn deepest_accepted_payloads_survive_a_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_at(dir.path());
    let deepest = nested(concord_types::MAX_PAYLOAD_DEPTH - 1);

    let (len, proposal_id) = {
        let registry = open(config.clone()).await;
        let mut flat = Payload::new();
        flat.insert("ok".into(), json!(true));
        registry.update_operational_status("a", flat).await.unwrap();

        let mut value = Payload::new();
        value.insert("tree".into(), deepest.clone());
        assert_eq!(concord_types::payload_depth(&value), concord_types::MAX_PAYLOAD_DEPTH);
        registry
            .update_operational_status("b", value.clone())
            .await
            .unwrap();
        let p = registry
            .create_proposal("Deep", "", "chair", in_hours(24), value.clone())
            .await
            .unwrap();
        registry.cast_vote(&p.id, "m1", "yes".into()).await.unwrap();
        registry
            .finalize_deliberation(&p.id, "Adopted", value)
            .await
            .unwrap();
        assert!(registry.is_durable().await);
        (registry.ledger_len().await, p.id)
    };

    let reopened = open(config.clone()).await;
    assert_eq!(reopened.ledger_len().await, len);
    assert!(reopened.get_operational_status("a").await.is_ok());
    assert_eq!(
        reopened.get_operational_status("b").await.unwrap().value["tree"],
        deepest
    );
    assert_eq!(
        reopened.get_proposal(&proposal_id).await.unwrap().status,
        ProposalStatus::Finalized
    );
    assert_eq!(reopened.list_decrees().await.len(), 1);
    let corrupt = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(Result::ok)
        .any(|entry| entry.file_name().to_string_lossy().ends_with(".corrupt"));
    assert!(!corrupt);
}

#[tokio::test]
async fn overly_nested_payloads_are_rejected_without_a_block() {
    let dir = tempfile::tempdir().unwrap();
    let registry = open(config_at(dir.path())).await;
    let mut value = Payload::new();
    value.insert("tree".into(), nested(concord_types::MAX_PAYLOAD_DEPTH));

    let err = registry
        .update_operational_status("b", value.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::Validation(_)));

    let err = registry
        .create_proposal("Deep", "", "chair", in_hours(24), value.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::Validation(_)));

    let p = registry
        .create_proposal("Shallow", "", "chair", in_hours(24), Payload::new())
        .await
        .unwrap();
    let err = registry
        .finalize_deliberation(&p.id, "Adopted", value)
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::Validation(_)));

    assert_eq!(registry.ledger_len().await, 2);
    assert!(registry.get_proposal(&p.id).await.unwrap().is_open());
}

#[tokio::test]
async fn tampered_ledger_refuses_to_open() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_at(dir.path());
    {
        let registry = open(config.clone()).await;
        registry
            .create_proposal("Honest", "", "chair", in_hours(24), Payload::new())
            .await
            .unwrap();
    }

    let raw = tokio::fs::read(&config.ledger.path).await.unwrap();
    let mut blocks: Value = serde_json::from_slice(&raw).unwrap();
    blocks[1]["payload"]["proposal"]["title"] = json!("Forged");
    tokio::fs::write(&config.ledger.path, serde_json::to_vec(&blocks).unwrap())
        .await
        .unwrap();

    let err = DeliberationRegistry::open(config, Arc::new(MemoryAuditSink::new()))
        .await
        .err()
        .unwrap();
    assert!(matches!(
        err,
        RegistryError::Ledger(concord_ledger::LedgerError::ChainIntegrity { index: 1, .. })
    ));
}
