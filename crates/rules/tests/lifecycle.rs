//! End-to-end rule lifecycle: events in, queries and silences during the
//! rule's life, and every store emptied after it is removed.

mod common;

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use tokio_util::sync::CancellationToken;

use alertwatch_core::RuleStateConfig;
use alertwatch_rules::{MaintenanceCoordinator, PageFlow, RuleEvent, RuleState};

use common::{base_time, ScriptedBackend};

fn config() -> RuleStateConfig {
    RuleStateConfig::from_toml(
        r#"
sweep_interval_secs = 60
hit_buffer_secs = 900
max_pages = 5
"#,
    )
    .unwrap()
}

#[tokio::test(start_paused = true)]
async fn removed_rule_leaves_nothing_behind() {
    let config = config();
    let backend = Arc::new(ScriptedBackend::new());
    let (state, removals) = RuleState::new(backend.clone());
    let coordinator = Arc::new(MaintenanceCoordinator::new(state.clone(), &config));
    let cancel = CancellationToken::new();
    let task = coordinator.clone().spawn(removals, cancel.clone());

    let event: RuleEvent =
        serde_json::from_str(r#"{"action":"added","rule_id":"failed-logins"}"#).unwrap();
    state.registry.apply(&event).unwrap();
    let rule = state.registry.key("failed-logins").unwrap().unwrap();

    backend.script(&["e1", "e2"], Some("scroll-a"));
    backend.script(&["e3"], Some("scroll-a"));
    let query = state.query(config.max_pages);
    let mut matched = 0;
    let outcome = query
        .run(&rule, &"auth-*".to_string(), |hits| {
            matched += hits.len();
            PageFlow::Continue
        })
        .await
        .unwrap();
    assert_eq!(matched, 3);
    assert!(outcome.exhausted);
    assert_eq!(backend.released(), vec!["scroll-a".to_string()]);

    let now = Utc::now();
    let (until, _) = state
        .silences
        .next_alert_time(&rule, Some("alice"), now, Duration::minutes(5), None)
        .unwrap();
    state.silences.silence_for(&rule, Some("alice"), until, 0).unwrap();
    state
        .windows
        .get_or_open_window(&rule, "alice", now, Duration::minutes(2))
        .unwrap();

    state
        .registry
        .apply(&RuleEvent::Removed {
            rule_id: "failed-logins".into(),
        })
        .unwrap();
    tokio::time::sleep(StdDuration::from_millis(10)).await;

    assert!(!state.silences.contains_rule(&rule).unwrap());
    assert!(!state.clients.contains(&rule).unwrap());
    assert!(!state.windows.contains_rule(&rule).unwrap());
    assert!(!state.cursors.is_open(&rule).unwrap());
    assert!(!state.hits.contains_rule(&rule).unwrap());
    assert_eq!(backend.closes(), 1);
    // Cursor was released by the query and never again.
    assert_eq!(backend.released().len(), 1);

    cancel.cancel();
    task.await.unwrap();
}

#[tokio::test]
async fn re_added_rule_starts_with_fresh_state() {
    let backend = Arc::new(ScriptedBackend::new());
    let (state, _removals) = RuleState::new(backend.clone());
    let now = base_time();

    let first = state.registry.add("disk-full").unwrap();
    state.silences.silence(&first, now + Duration::hours(1)).unwrap();
    let old_agg = state
        .windows
        .get_or_open_window(&first, "host-1", now, Duration::minutes(10))
        .unwrap();

    // Removal not yet processed when the name comes back.
    state.registry.remove("disk-full").unwrap();
    let second = state.registry.add("disk-full").unwrap();

    assert_ne!(first, second);
    assert!(!state.silences.is_silenced(&second, now).unwrap());
    let new_agg = state
        .windows
        .get_or_open_window(&second, "host-1", now, Duration::minutes(10))
        .unwrap();
    assert_ne!(old_agg, new_agg);

    // The next sweep reclaims the first lifetime's leftovers.
    let coordinator = MaintenanceCoordinator::new(state.clone(), &RuleStateConfig::default());
    coordinator.sweep_at(now).await;
    assert!(!state.silences.contains_rule(&first).unwrap());
    assert!(!state.windows.contains_rule(&first).unwrap());
    assert!(state.windows.contains_rule(&second).unwrap());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_evaluations_share_one_connection() {
    let backend = Arc::new(ScriptedBackend::new());
    let (state, _removals) = RuleState::new(backend.clone());
    let rule = state.registry.add("cpu-spike").unwrap();

    let mut tasks = Vec::new();
    for _ in 0..16 {
        let clients = Arc::clone(&state.clients);
        let rule = rule.clone();
        tasks.push(tokio::spawn(async move {
            clients.get(&rule, &"metrics-*".to_string()).await.unwrap()
        }));
    }

    let mut handles = Vec::new();
    for task in tasks {
        handles.push(task.await.unwrap());
    }

    assert_eq!(backend.opens(), 1);
    assert!(handles.iter().all(|h| *h == handles[0]));
}
