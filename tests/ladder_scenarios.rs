//! End-to-end ladder behaviour through `LadderService`.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::Semaphore;

use ladder_arena::executor::scripted::Scripted;
use ladder_arena::ladder::EventEnvelope;
use ladder_arena::store::{JsonHistoryStore, JsonRankingStore, MemoryHistoryStore, MemoryRankingStore};
use ladder_arena::{
    Challenger, ContestOutcome, Entry, EntryId, ExecutionError, HistoryStore, LadderConfig, LadderEvent,
    LadderService, RankingSnapshot, RankingStore, RunResult, ScriptedExecutor, StoreError,
};

// =============================================================================
// HELPERS
// =============================================================================

/// Ladder `r1..rN`, each owned by itself, artifact `rK.py`.
fn seeded_ladder(n: u32) -> RankingSnapshot {
    let entries = (1..=n)
        .map(|k| Entry {
            entry_id: format!("r{k}").as_str().into(),
            owner_id: format!("r{k}").as_str().into(),
            rank: k,
            wins: 0,
            losses: 0,
            artifact: PathBuf::from(format!("r{k}.py")),
            last_updated: Utc::now(),
        })
        .collect();
    RankingSnapshot::from_ordered(entries)
}

/// Strengths where a better rank is always stronger.
fn ranked_strengths(executor: ScriptedExecutor, n: u32) -> ScriptedExecutor {
    (1..=n).fold(executor, |ex, k| ex.with_strength(format!("r{k}.py"), 1000 - k as i64))
}

fn challenger(id: &str) -> Challenger {
    Challenger::new(id.into(), id.into(), format!("{id}.py"))
}

struct Harness {
    service: LadderService,
    executor: Arc<ScriptedExecutor>,
    history: Arc<MemoryHistoryStore>,
}

fn harness(config: LadderConfig, ladder: RankingSnapshot, executor: ScriptedExecutor) -> Harness {
    let executor = Arc::new(executor);
    let history = Arc::new(MemoryHistoryStore::new());
    let service = LadderService::new(
        config,
        Arc::new(MemoryRankingStore::with_snapshot(ladder)),
        history.clone(),
        executor.clone(),
    );
    Harness { service, executor, history }
}

async fn ranked_ids(service: &LadderService) -> Vec<String> {
    service
        .ranking()
        .await
        .unwrap()
        .iter()
        .map(|row| row.entry_id.as_str().to_string())
        .collect()
}

fn drain(rx: &mut tokio::sync::broadcast::Receiver<EventEnvelope>) -> Vec<LadderEvent> {
    let mut events = Vec::new();
    while let Ok(envelope) = rx.try_recv() {
        events.push(envelope.event);
    }
    events
}

/// Block until the run for `entry_id` has started.
async fn wait_for_start(rx: &mut tokio::sync::broadcast::Receiver<EventEnvelope>, entry_id: &str) {
    loop {
        let envelope = rx.recv().await.unwrap();
        if let LadderEvent::RunStarted { entry_id: started, .. } = envelope.event {
            if started.as_str() == entry_id {
                return;
            }
        }
    }
}

fn run_results(events: &[LadderEvent]) -> Vec<RunResult> {
    events
        .iter()
        .filter_map(|event| match event {
            LadderEvent::RunFinished { result, .. } => Some(result.clone()),
            _ => None,
        })
        .collect()
}

// =============================================================================
// SCENARIOS
// =============================================================================

#[tokio::test]
async fn test_first_challenger_takes_empty_ladder() {
    let h = harness(LadderConfig::default(), RankingSnapshot::new(), ScriptedExecutor::new());

    let receipt = h.service.submit(challenger("x")).await.unwrap();
    assert!(receipt.accepted);
    assert_eq!(receipt.queue_position, 1);
    h.service.wait_idle().await;

    assert_eq!(ranked_ids(&h.service).await, vec!["x"]);
    assert!(h.executor.calls().await.is_empty());
    assert!(h.history.all().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_partial_ladder_starts_at_bottom() {
    let executor = ranked_strengths(ScriptedExecutor::new(), 5);
    let h = harness(LadderConfig::default(), seeded_ladder(5), executor);

    h.service.submit(challenger("y")).await.unwrap();
    h.service.wait_idle().await;

    let calls = h.executor.calls().await;
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].defender, PathBuf::from("r5.py"));
    assert_eq!(ranked_ids(&h.service).await, vec!["r1", "r2", "r3", "r4", "r5", "y"]);
}

#[tokio::test]
async fn test_full_ladder_loss_places_below_ceiling() {
    let executor = ranked_strengths(ScriptedExecutor::new(), 10);
    let h = harness(LadderConfig::default(), seeded_ladder(10), executor);

    h.service.submit(challenger("z")).await.unwrap();
    h.service.wait_idle().await;

    let rows = h.service.ranking().await.unwrap();
    assert_eq!(rows.len(), 11);
    assert_eq!(rows[10].entry_id.as_str(), "z");
    assert_eq!(rows[10].rank, 11);
    for (i, row) in rows.iter().take(10).enumerate() {
        assert_eq!(row.entry_id.as_str(), format!("r{}", i + 1));
    }
    assert_eq!(rows[9].wins, 1);
    assert_eq!(rows[10].losses, 1);
}

#[tokio::test]
async fn test_climb_stops_at_first_loss() {
    let executor = ranked_strengths(ScriptedExecutor::new(), 10)
        .with_script("z.py", "r10.py", Scripted::Win)
        .with_script("z.py", "r9.py", Scripted::Win);
    let h = harness(LadderConfig::default(), seeded_ladder(10), executor);
    let mut rx = h.service.subscribe();

    h.service.submit(challenger("z")).await.unwrap();
    h.service.wait_idle().await;

    assert_eq!(
        run_results(&drain(&mut rx)),
        vec![RunResult::Placed { rank: 9, previous: None }]
    );

    let ids = ranked_ids(&h.service).await;
    assert_eq!(
        ids,
        vec!["r1", "r2", "r3", "r4", "r5", "r6", "r7", "r8", "z", "r9", "r10"]
    );

    let defenders: Vec<PathBuf> = h.executor.calls().await.into_iter().map(|c| c.defender).collect();
    assert_eq!(
        defenders,
        vec![PathBuf::from("r10.py"), PathBuf::from("r9.py"), PathBuf::from("r8.py")]
    );

    let z = h.service.ranking().await.unwrap().remove(8);
    assert_eq!((z.wins, z.losses), (2, 1));
}

#[tokio::test]
async fn test_executor_failure_is_defender_win() {
    let executor = ScriptedExecutor::new().with_script(
        "z.py",
        "r3.py",
        Scripted::Fail(ExecutionError::Spawn("no such file".to_string())),
    );
    let h = harness(LadderConfig::default(), seeded_ladder(3), executor);

    h.service.submit(challenger("z")).await.unwrap();
    h.service.wait_idle().await;

    assert_eq!(ranked_ids(&h.service).await, vec!["r1", "r2", "r3", "z"]);

    let history = h.service.history(&"z".into()).await.unwrap();
    assert_eq!(history.len(), 1);
    let record = &history[0];
    assert_eq!(record.outcome, ContestOutcome::DefenderWin);
    assert_eq!(record.defender_wins, LadderConfig::default().games_per_contest);
    assert!(record.is_fail_safe());
    assert!(record.diagnostics.as_deref().unwrap().contains("no such file"));
}

#[tokio::test]
async fn test_worse_rank_for_owner_is_discarded() {
    let mut ladder = seeded_ladder(5).entries().to_vec();
    ladder[2].entry_id = "alice-v1".into();
    ladder[2].owner_id = "alice".into();
    ladder[2].artifact = PathBuf::from("alice-v1.py");
    let ladder = RankingSnapshot::from_entries(ladder).unwrap();

    let executor = ranked_strengths(ScriptedExecutor::new(), 5).with_script("alice-v2.py", "r5.py", Scripted::Win);
    let h = harness(LadderConfig::default(), ladder, executor);
    let mut rx = h.service.subscribe();

    h.service
        .submit(Challenger::new("alice-v2".into(), "alice".into(), "alice-v2.py"))
        .await
        .unwrap();
    h.service.wait_idle().await;

    let ids = ranked_ids(&h.service).await;
    assert_eq!(ids, vec!["r1", "r2", "alice-v1", "r4", "r5"]);
    assert_eq!(
        run_results(&drain(&mut rx)),
        vec![RunResult::Retained { kept_rank: 3, proposed_rank: 5 }]
    );
}

// =============================================================================
// QUEUE PROPERTIES
// =============================================================================

#[tokio::test]
async fn test_runs_resolve_in_admission_order() {
    let executor = ranked_strengths(ScriptedExecutor::new(), 3).with_delay(Duration::from_millis(10));
    let h = harness(LadderConfig::default(), seeded_ladder(3), executor);
    let mut rx = h.service.subscribe();

    for id in ["a", "b", "c"] {
        h.service.submit(challenger(id)).await.unwrap();
    }
    h.service.wait_idle().await;

    let mut started = Vec::new();
    let mut open: Option<String> = None;
    for event in drain(&mut rx) {
        match event {
            LadderEvent::RunStarted { entry_id, .. } => {
                assert!(open.is_none(), "run started while another was in flight");
                open = Some(entry_id.as_str().to_string());
                started.push(entry_id.as_str().to_string());
            }
            LadderEvent::RunFinished { entry_id, .. } => {
                assert_eq!(open.take().as_deref(), Some(entry_id.as_str()));
            }
            _ => {}
        }
    }

    assert_eq!(started, vec!["a", "b", "c"]);
    assert_eq!(h.executor.peak_in_flight(), 1);
}

#[tokio::test]
async fn test_duplicate_submission_reports_position() {
    let gate = Arc::new(Semaphore::new(0));
    let executor = ranked_strengths(ScriptedExecutor::new(), 2).with_gate(gate.clone());
    let h = harness(LadderConfig::default(), seeded_ladder(2), executor);
    let mut rx = h.service.subscribe();

    h.service.submit(challenger("a")).await.unwrap();
    wait_for_start(&mut rx, "a").await;
    h.service.submit(challenger("b")).await.unwrap();
    h.service.submit(challenger("c")).await.unwrap();

    let status = h.service.queue_status().await;
    assert_eq!(status.current, Some(EntryId::new("a")));
    assert_eq!(status.pending, vec![EntryId::new("b"), EntryId::new("c")]);
    assert!(status.busy);

    let receipt = h.service.submit(challenger("c")).await.unwrap();
    assert!(!receipt.accepted);
    assert_eq!(receipt.queue_position, 2);

    gate.close();
    h.service.wait_idle().await;
    assert_eq!(ranked_ids(&h.service).await.len(), 5);
}

#[tokio::test]
async fn test_clear_queue_keeps_in_flight_run() {
    let gate = Arc::new(Semaphore::new(0));
    let executor = ranked_strengths(ScriptedExecutor::new(), 1).with_gate(gate.clone());
    let h = harness(LadderConfig::default(), seeded_ladder(1), executor);
    let mut rx = h.service.subscribe();

    h.service.submit(challenger("a")).await.unwrap();
    h.service.submit(challenger("b")).await.unwrap();
    wait_for_start(&mut rx, "a").await;

    let dropped = h.service.clear_queue().await;
    assert_eq!(dropped, vec![EntryId::new("b")]);
    let status = h.service.queue_status().await;
    assert!(status.pending.is_empty());
    assert!(!status.busy);
    assert_eq!(status.current, Some(EntryId::new("a")));

    gate.close();
    h.service.wait_idle().await;
    assert_eq!(ranked_ids(&h.service).await, vec!["r1", "a"]);
    assert_eq!(h.executor.calls().await.len(), 1);
}

#[tokio::test]
async fn test_ranking_reads_are_idempotent() {
    let executor = ranked_strengths(ScriptedExecutor::new(), 4);
    let h = harness(LadderConfig::default(), seeded_ladder(4), executor);

    h.service.submit(challenger("q")).await.unwrap();
    h.service.wait_idle().await;

    let first = h.service.ranking().await.unwrap();
    let second = h.service.ranking().await.unwrap();
    assert_eq!(first, second);
}

/// Ranking store whose first write fails.
struct FlakyRankingStore {
    inner: MemoryRankingStore,
    failed: AtomicBool,
}

#[async_trait]
impl RankingStore for FlakyRankingStore {
    async fn load(&self) -> Result<RankingSnapshot, StoreError> {
        self.inner.load().await
    }

    async fn replace(&self, snapshot: &RankingSnapshot) -> Result<(), StoreError> {
        if !self.failed.swap(true, Ordering::SeqCst) {
            return Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "disk unavailable",
            )));
        }
        self.inner.replace(snapshot).await
    }
}

#[tokio::test]
async fn test_failed_run_still_advances_queue() {
    let ranking = Arc::new(FlakyRankingStore {
        inner: MemoryRankingStore::new(),
        failed: AtomicBool::new(false),
    });
    let service = LadderService::new(
        LadderConfig::default(),
        ranking,
        Arc::new(MemoryHistoryStore::new()),
        Arc::new(ScriptedExecutor::new()),
    );
    let mut rx = service.subscribe();

    service.submit(challenger("a")).await.unwrap();
    service.submit(challenger("b")).await.unwrap();
    service.wait_idle().await;

    let events = drain(&mut rx);
    assert!(events.iter().any(|e| matches!(
        e,
        LadderEvent::RunFailed { entry_id, error } if entry_id.as_str() == "a" && error.contains("disk unavailable")
    )));
    assert_eq!(ranked_ids(&service).await, vec!["b"]);
    assert!(!service.queue_status().await.busy);
}

#[tokio::test]
async fn test_baseline_gate() {
    let config = LadderConfig {
        baseline: Some(PathBuf::from("baseline.py")),
        ..LadderConfig::default()
    };
    let executor = ScriptedExecutor::new()
        .with_strength("baseline.py", 10)
        .with_strength("weak.py", 1)
        .with_strength("strong.py", 50);
    let h = harness(config, RankingSnapshot::new(), executor);

    h.service.submit(challenger("weak")).await.unwrap();
    h.service.submit(challenger("strong")).await.unwrap();
    h.service.wait_idle().await;

    assert_eq!(ranked_ids(&h.service).await, vec!["strong"]);
    let weak_history = h.service.history(&"weak".into()).await.unwrap();
    assert_eq!(weak_history.len(), 1);
    assert!(weak_history[0].defender.is_none());
}

// =============================================================================
// PERSISTENCE
// =============================================================================

#[tokio::test]
async fn test_json_stores_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let executor = ScriptedExecutor::new().with_strength("a.py", 1).with_strength("b.py", 2);

    let service = LadderService::new(
        LadderConfig::default(),
        Arc::new(JsonRankingStore::in_dir(dir.path())),
        Arc::new(JsonHistoryStore::in_dir(dir.path())),
        Arc::new(executor),
    );
    service.submit(challenger("a")).await.unwrap();
    service.wait_idle().await;
    service.submit(challenger("b")).await.unwrap();
    service.wait_idle().await;
    let before = service.ranking().await.unwrap();
    service.shutdown().await;

    let reopened = JsonRankingStore::in_dir(dir.path()).load().await.unwrap();
    let ids: Vec<&str> = reopened.entries().iter().map(|e| e.entry_id.as_str()).collect();
    assert_eq!(ids, vec!["b", "a"]);
    assert_eq!(reopened.entries()[0].wins, before[0].wins);

    let history = JsonHistoryStore::in_dir(dir.path()).all().await.unwrap();
    assert_eq!(history.len(), 1);
}

// =============================================================================
// RANDOMIZED
// =============================================================================

#[tokio::test]
async fn test_random_runs_keep_ladder_dense() {
    let mut rng = StdRng::seed_from_u64(0x1add_e7);
    let owners: Vec<String> = (0..8).map(|i| format!("owner{i}")).collect();

    let mut executor = ScriptedExecutor::new();
    let mut submissions = Vec::new();
    for round in 0..40 {
        let owner = &owners[rng.gen_range(0..owners.len())];
        let id = format!("{owner}-{round}");
        let artifact = format!("{id}.py");
        executor = executor.with_strength(artifact.clone(), rng.gen_range(0..20));
        submissions.push(Challenger::new(id.as_str().into(), owner.as_str().into(), artifact));
    }

    let config = LadderConfig {
        ceiling: 5,
        games_per_contest: 3,
        ..LadderConfig::default()
    };
    let h = harness(config, RankingSnapshot::new(), executor);

    for challenger in submissions {
        let owner = challenger.owner_id.clone();
        let before = h.service.ranking().await.unwrap();
        let before_rank = before.iter().find(|r| r.owner_id == owner).map(|r| r.rank);

        h.service.submit(challenger).await.unwrap();
        h.service.wait_idle().await;

        let after = h.service.ranking().await.unwrap();
        let snapshot = RankingSnapshot::from_entries(
            after
                .iter()
                .map(|row| Entry {
                    entry_id: row.entry_id.clone(),
                    owner_id: row.owner_id.clone(),
                    rank: row.rank,
                    wins: row.wins,
                    losses: row.losses,
                    artifact: PathBuf::new(),
                    last_updated: row.last_updated,
                })
                .collect(),
        );
        assert!(snapshot.is_ok(), "ladder lost density: {:?}", snapshot.err());

        let after_rank = after.iter().find(|r| r.owner_id == owner).map(|r| r.rank);
        assert!(after_rank.is_some());
        if let (Some(before), Some(after)) = (before_rank, after_rank) {
            assert!(after <= before, "{owner} fell from {before} to {after}");
        }
    }

    assert!(h.service.ranking().await.unwrap().len() <= owners.len());
}
