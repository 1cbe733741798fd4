// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Integration tests for the Workflow State Tracker: listing, detail with
//! substrate reconciliation, signal delivery and step events.

mod common;

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::time::Duration;

use common::{state, Harness};
use goldthread_core::application::{StartWorkflowRequest, StepEvent};
use goldthread_core::domain::error::ErrorKind;
use goldthread_core::domain::repository::WorkflowRepository;
use goldthread_core::domain::workflow::{StepStatus, WorkflowId, WorkflowStatus, WorkflowType};
use goldthread_core::infrastructure::event_bus::DomainEvent;
use goldthread_core::domain::events::WorkflowEvent;
use serde_json::json;

#[tokio::test]
async fn test_approve_on_running_workflow_is_invalid_state() {
    let h = Harness::new();
    h.seed_workflow("wf-123", WorkflowStatus::Running, 0).await;

    let err = h
        .tracker
        .signal(&WorkflowId::from_string("wf-123"), "approve", json!({}))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
    assert_eq!(err.ids(), vec!["wf-123"]);

    let detail = h.tracker.detail(&WorkflowId::from_string("wf-123")).await.unwrap();
    assert_eq!(detail.summary.status, WorkflowStatus::Running);
    assert!(h.substrate.delivered.lock().is_empty(), "rejected signals never reach the substrate");
}

#[tokio::test]
async fn test_list_filters_by_status_most_recent_first() {
    let h = Harness::new();
    h.seed_workflow("wf-a", WorkflowStatus::Waiting, 400).await;
    h.seed_workflow("wf-b", WorkflowStatus::Running, 300).await;
    h.seed_workflow("wf-c", WorkflowStatus::Waiting, 200).await;
    h.seed_workflow("wf-d", WorkflowStatus::Waiting, 100).await;
    h.seed_workflow("wf-e", WorkflowStatus::Completed, 50).await;

    let page = h.tracker.list(Some(WorkflowStatus::Waiting), 2, 0).await.unwrap();
    assert_eq!(page.total, 3);
    let ids: Vec<&str> = page.items.iter().map(|w| w.id.as_str()).collect();
    assert_eq!(ids, vec!["wf-d", "wf-c"]);
    assert!(page.items.iter().all(|w| w.status == WorkflowStatus::Waiting));

    let next = h.tracker.list(Some(WorkflowStatus::Waiting), 2, 2).await.unwrap();
    let ids: Vec<&str> = next.items.iter().map(|w| w.id.as_str()).collect();
    assert_eq!(ids, vec!["wf-a"]);

    let all = h.tracker.list(None, 100, 0).await.unwrap();
    assert_eq!(all.total, 5);
    assert_eq!(all.items[0].id.as_str(), "wf-e");
}

#[tokio::test]
async fn test_list_caps_limit_and_never_queries_substrate() {
    let h = Harness::new();
    for i in 0..3 {
        h.seed_workflow(&format!("wf-{}", i), WorkflowStatus::Running, i).await;
    }
    let page = h.tracker.list(None, 10_000, 0).await.unwrap();
    assert_eq!(page.limit, h.tracker.max_page_size());
    assert_eq!(page.items.len(), 3);
    assert_eq!(h.substrate.query_count(), 0);
}

#[tokio::test]
async fn test_unknown_workflow_is_not_found() {
    let h = Harness::new();
    let err = h.tracker.detail(&WorkflowId::from_string("wf-missing")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = h
        .tracker
        .signal(&WorkflowId::from_string("wf-missing"), "cancel", json!({}))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_approve_waiting_workflow_is_optimistic_until_confirmed() {
    let h = Harness::new();
    let wf = h.seed_workflow("wf-wait", WorkflowStatus::Waiting, 0).await;
    h.substrate.set_state(&wf.id, state(WorkflowStatus::Waiting));

    let outcome = h.tracker.signal(&wf.id, "approve", json!({"by": "alice"})).await.unwrap();
    assert!(outcome.applied);
    assert!(outcome.pending_confirmation);
    assert_eq!(outcome.status, WorkflowStatus::Running);

    // The substrate still reports waiting: the optimistic state holds.
    let detail = h.tracker.detail(&wf.id).await.unwrap();
    assert_eq!(detail.summary.status, WorkflowStatus::Running);
    assert_eq!(detail.pending_confirmation.as_deref(), Some("approve"));
    let review = detail.steps.iter().find(|s| s.name == "review").unwrap();
    assert_eq!(review.status, StepStatus::Completed);

    assert_eq!(h.substrate.delivered.lock().len(), 1);
}

#[tokio::test]
async fn test_cancel_is_idempotent() {
    let h = Harness::new();
    let wf = h.seed_workflow("wf-cancel", WorkflowStatus::Running, 0).await;

    let first = h.tracker.signal(&wf.id, "cancel", json!({})).await.unwrap();
    assert!(first.applied);
    assert_eq!(first.status, WorkflowStatus::Cancelled);

    let second = h.tracker.signal(&wf.id, "cancel", json!({})).await.unwrap();
    assert!(!second.applied);
    assert_eq!(second.status, WorkflowStatus::Cancelled);

    assert_eq!(h.substrate.delivered.lock().len(), 1);
    let detail = h.tracker.detail(&wf.id).await.unwrap();
    assert_eq!(detail.summary.status, WorkflowStatus::Cancelled);
}

#[tokio::test]
async fn test_reject_maps_waiting_to_failed() {
    let h = Harness::new();
    let wf = h.seed_workflow("wf-reject", WorkflowStatus::Waiting, 0).await;

    let outcome = h.tracker.signal(&wf.id, "reject", json!({"reason": "wrong scope"})).await.unwrap();
    assert_eq!(outcome.status, WorkflowStatus::Failed);

    let err = h.tracker.signal(&wf.id, "approve", json!({})).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
}

#[tokio::test]
async fn test_unknown_signal_is_invalid_state() {
    let h = Harness::new();
    let wf = h.seed_workflow("wf-odd", WorkflowStatus::Waiting, 0).await;
    let err = h.tracker.signal(&wf.id, "escalate", json!({})).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
    assert!(err.to_string().contains("escalate"));
}

#[tokio::test]
async fn test_transient_substrate_failures_are_retried() {
    let h = Harness::new();
    let wf = h.seed_workflow("wf-flaky", WorkflowStatus::Waiting, 0).await;
    h.substrate.transient_signal_failures.store(2, Ordering::SeqCst);

    let outcome = h.tracker.signal(&wf.id, "approve", json!({})).await.unwrap();
    assert_eq!(outcome.status, WorkflowStatus::Running);
}

#[tokio::test]
async fn test_substrate_outage_surfaces_upstream_unavailable_without_state_change() {
    let h = Harness::new();
    let wf = h.seed_workflow("wf-down", WorkflowStatus::Waiting, 0).await;
    h.substrate.unavailable.store(true, Ordering::SeqCst);

    let err = h.tracker.signal(&wf.id, "approve", json!({})).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UpstreamUnavailable);
    assert_eq!(err.ids(), vec!["wf-down"]);

    // Detail degrades to the stored state while the substrate is down.
    let detail = h.tracker.detail(&wf.id).await.unwrap();
    assert_eq!(detail.summary.status, WorkflowStatus::Waiting);
}

#[tokio::test]
async fn test_poll_cache_collapses_concurrent_detail_queries() {
    let h = Harness::new();
    let wf = h.seed_workflow("wf-poll", WorkflowStatus::Running, 0).await;
    h.substrate.set_state(&wf.id, state(WorkflowStatus::Running));

    let handles: Vec<_> = (0..10)
        .map(|_| {
            let tracker = h.tracker.clone();
            let id = wf.id.clone();
            tokio::spawn(async move { tracker.detail(&id).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }
    assert_eq!(h.substrate.query_count(), 1);
}

#[tokio::test]
async fn test_terminal_workflow_never_changes_after_reconcile() {
    let h = Harness::new();
    let wf = h.seed_workflow("wf-done", WorkflowStatus::Running, 0).await;
    h.substrate.set_state(&wf.id, state(WorkflowStatus::Completed));

    let detail = h.tracker.detail(&wf.id).await.unwrap();
    assert_eq!(detail.summary.status, WorkflowStatus::Completed);
    assert!(detail.finished_at.is_some());

    // A later contradictory report is ignored.
    h.substrate.set_state(&wf.id, state(WorkflowStatus::Running));
    let detail = h.tracker.detail(&wf.id).await.unwrap();
    assert_eq!(detail.summary.status, WorkflowStatus::Completed);
}

#[tokio::test]
async fn test_start_records_delegation_for_multi_actor_workflows() {
    let h = Harness::new();
    h.substrate.run_pipeline.store(false, Ordering::SeqCst);

    let delegated = h
        .tracker
        .start(StartWorkflowRequest {
            workflow_type: WorkflowType::AgentDelegation,
            input: json!({"task": "summarise"}),
            originating_actor: "planner".into(),
            session_id: "s-1".into(),
            task_summary: "summarise the policy".into(),
            delegation_chain: vec!["planner".into(), "researcher".into(), "writer".into()],
        })
        .await
        .unwrap();
    let summary = delegated.summary();
    assert_eq!(
        summary.delegation_chain,
        Some(vec!["planner".to_string(), "researcher".to_string(), "writer".to_string()])
    );

    let err = h
        .tracker
        .start(StartWorkflowRequest {
            workflow_type: WorkflowType::AgentDelegation,
            input: json!({}),
            originating_actor: "planner".into(),
            session_id: "s-2".into(),
            task_summary: "loop".into(),
            delegation_chain: vec!["planner".into(), "writer".into(), "planner".into()],
        })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
}

#[tokio::test]
async fn test_step_events_drive_lifecycle_and_publish_transitions() {
    let h = Harness::new();
    let wf = h.seed_workflow("wf-steps", WorkflowStatus::Running, 0).await;
    let mut events = h.event_bus.subscribe_workflow(wf.id.clone());

    h.tracker
        .apply_step_event(&wf.id, StepEvent::StepStarted { step: "initialize".into() })
        .await
        .unwrap();
    h.tracker
        .apply_step_event(
            &wf.id,
            StepEvent::StepCompleted {
                step: "initialize".into(),
                metadata: HashMap::from([("tokens".to_string(), json!(42))]),
            },
        )
        .await
        .unwrap();
    h.tracker
        .apply_step_event(&wf.id, StepEvent::StepStarted { step: "validate".into() })
        .await
        .unwrap();
    let waiting = h
        .tracker
        .apply_step_event(
            &wf.id,
            StepEvent::ApprovalRequested {
                step: "validate".into(),
                signals: vec!["approve".into()],
            },
        )
        .await
        .unwrap();
    assert_eq!(waiting.status(), WorkflowStatus::Waiting);
    assert_eq!(waiting.expected_signals(), ["approve".to_string()]);

    match events.recv().await.unwrap() {
        WorkflowEvent::WorkflowTransitioned { from, to, cause, .. } => {
            assert_eq!(from, WorkflowStatus::Running);
            assert_eq!(to, WorkflowStatus::Waiting);
            assert_eq!(cause, "step:validate");
        }
        other => panic!("unexpected event {:?}", other),
    }

    let err = h
        .tracker
        .apply_step_event(&wf.id, StepEvent::WorkflowCompleted)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
}

#[tokio::test]
async fn test_signal_publishes_delivery_and_transition_events() {
    let h = Harness::new();
    let wf = h.seed_workflow("wf-events", WorkflowStatus::Waiting, 0).await;
    let mut events = h.event_bus.subscribe();

    h.tracker.signal(&wf.id, "approve", json!({})).await.unwrap();

    let first = events.recv().await.unwrap();
    assert!(matches!(first, DomainEvent::Workflow(WorkflowEvent::SignalDelivered { .. })));
    let second = events.recv().await.unwrap();
    assert!(matches!(
        second,
        DomainEvent::Workflow(WorkflowEvent::WorkflowTransitioned {
            to: WorkflowStatus::Running,
            ..
        })
    ));
}

#[tokio::test]
async fn test_slow_poll_does_not_undo_signal_applied_meanwhile() {
    let h = Harness::new();
    let wf = h.seed_workflow("wf-race", WorkflowStatus::Waiting, 0).await;
    h.substrate.set_state(&wf.id, state(WorkflowStatus::Waiting));
    *h.substrate.query_delay.lock() = Some(Duration::from_millis(200));

    let poll = {
        let tracker = h.tracker.clone();
        let id = wf.id.clone();
        tokio::spawn(async move { tracker.detail(&id).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let first = h.tracker.signal(&wf.id, "approve", json!({})).await.unwrap();
    assert_eq!(first.status, WorkflowStatus::Running);

    // The poll returns the pre-signal report; it must not roll the signal back.
    let polled = poll.await.unwrap().unwrap();
    assert_eq!(polled.summary.status, WorkflowStatus::Running);

    let stored = h.workflows.find_by_id(&wf.id).await.unwrap().unwrap();
    assert_eq!(stored.status(), WorkflowStatus::Running);
    assert_eq!(stored.pending_confirmation(), Some("approve"));

    let err = h.tracker.signal(&wf.id, "approve", json!({})).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
    assert_eq!(h.substrate.delivered.lock().len(), 1);
}

#[tokio::test]
async fn test_unchanged_poll_leaves_stored_workflow_untouched() {
    let h = Harness::new();
    let wf = h.seed_workflow("wf-quiet", WorkflowStatus::Waiting, 0).await;
    let mut report = state(WorkflowStatus::Waiting);
    report.awaiting_signals = vec!["approve".into(), "reject".into()];
    h.substrate.set_state(&wf.id, report);

    let detail = h.tracker.detail(&wf.id).await.unwrap();
    assert_eq!(detail.summary.status, WorkflowStatus::Waiting);

    let stored = h.workflows.find_by_id(&wf.id).await.unwrap().unwrap();
    assert_eq!(stored.updated_at, wf.updated_at);
}

#[tokio::test]
async fn test_racing_approve_and_cancel_serialize() {
    let h = Harness::new();
    let wf = h.seed_workflow("wf-duel", WorkflowStatus::Waiting, 0).await;

    let (approve, cancel) = tokio::join!(
        h.tracker.signal(&wf.id, "approve", json!({})),
        h.tracker.signal(&wf.id, "cancel", json!({})),
    );

    // Cancel stays valid from running, so it lands whichever signal goes
    // first; approve only lands if it went first.
    let cancel = cancel.unwrap();
    assert!(cancel.applied);
    assert_eq!(cancel.status, WorkflowStatus::Cancelled);
    let delivered: Vec<String> = h.substrate.delivered.lock().iter().map(|(_, s)| s.clone()).collect();
    match approve {
        Ok(outcome) => {
            assert!(outcome.applied);
            assert_eq!(outcome.status, WorkflowStatus::Running);
            assert_eq!(delivered, vec!["approve", "cancel"]);
        }
        Err(err) => {
            assert_eq!(err.kind(), ErrorKind::InvalidState);
            assert_eq!(delivered, vec!["cancel"]);
        }
    }

    let stored = h.workflows.find_by_id(&wf.id).await.unwrap().unwrap();
    assert_eq!(stored.status(), WorkflowStatus::Cancelled);
}

#[tokio::test]
async fn test_racing_approve_and_reject_have_one_winner() {
    let h = Harness::new();
    let wf = h.seed_workflow("wf-split", WorkflowStatus::Waiting, 0).await;

    let (approve, reject) = tokio::join!(
        h.tracker.signal(&wf.id, "approve", json!({})),
        h.tracker.signal(&wf.id, "reject", json!({})),
    );

    let winner = match (approve, reject) {
        (Ok(won), Err(lost)) | (Err(lost), Ok(won)) => {
            assert_eq!(lost.kind(), ErrorKind::InvalidState);
            won
        }
        (a, r) => panic!("expected exactly one winner, got {:?} and {:?}", a, r),
    };
    assert!(winner.applied);
    assert_eq!(h.substrate.delivered.lock().len(), 1);

    let stored = h.workflows.find_by_id(&wf.id).await.unwrap().unwrap();
    assert_eq!(stored.status(), winner.status);
}

#[tokio::test]
async fn test_waiting_report_without_signals_defaults_to_mapped_ones() {
    let h = Harness::new();
    let wf = h.seed_workflow("wf-silent", WorkflowStatus::Running, 0).await;
    h.substrate.set_state(&wf.id, state(WorkflowStatus::Waiting));

    let detail = h.tracker.detail(&wf.id).await.unwrap();
    assert_eq!(detail.summary.status, WorkflowStatus::Waiting);
    assert_eq!(detail.expected_signals, vec!["approve", "cancel", "reject"]);

    let err = h.tracker.signal(&wf.id, "escalate", json!({})).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);

    let other = h.seed_workflow("wf-gate", WorkflowStatus::Running, 0).await;
    h.tracker
        .apply_step_event(&other.id, StepEvent::StepStarted { step: "validate".into() })
        .await
        .unwrap();
    let gated = h
        .tracker
        .apply_step_event(
            &other.id,
            StepEvent::ApprovalRequested {
                step: "validate".into(),
                signals: vec![],
            },
        )
        .await
        .unwrap();
    assert_eq!(gated.expected_signals(), ["approve", "cancel", "reject"]);
}
