#![allow(clippy::disallowed_methods)]

mod common;

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use common::{MB, harness, harness_with, is_admission, sized_file};
use dropq_api::{AdmissionConfig, ApiError, JobAction, OperationAction, Payload, QueueEvent};
use dropq_core::{
    AdmissionError, ControlError, Operation, OperationKind, ProfileId, SupportedStates, TargetId,
    TaskState,
};

#[tokio::test]
async fn test_small_file_filtered_from_multi_drop() -> Result<(), Box<dyn Error>> {
    let h = harness().await?;
    let big = sized_file(h.dir.path(), "a.mp4", 200 * MB)?;
    let small = sized_file(h.dir.path(), "b.txt", 1024)?;

    let outcome = h
        .services
        .handle_drop(Some("tv"), Payload::Paths(vec![big, small]))
        .await?;

    assert_eq!(outcome.jobs.len(), 1);
    assert_eq!(outcome.filtered, 1);
    assert_eq!(outcome.target, TargetId::new("tv"));
    assert_eq!(outcome.profile, ProfileId::new("hd"));
    // One profile: no prompt.
    assert_eq!(h.chooser.prompts(), 0);
    Ok(())
}

#[tokio::test]
async fn test_lone_small_file_is_admitted() -> Result<(), Box<dyn Error>> {
    let h = harness().await?;
    let small = sized_file(h.dir.path(), "b.txt", 1024)?;

    let text = format!("{}\n", small.display());
    let outcome = h.services.handle_text_drop(Some("tv"), &text).await?;
    assert_eq!(outcome.jobs.len(), 1);
    assert_eq!(outcome.filtered, 0);
    Ok(())
}

#[tokio::test]
async fn test_drop_admitting_nothing_never_prompts() -> Result<(), Box<dyn Error>> {
    let h = harness().await?;
    let a = sized_file(h.dir.path(), "a.txt", 10)?;
    let b = sized_file(h.dir.path(), "b.txt", 10)?;

    let err = h
        .services
        .handle_drop(None, Payload::Paths(vec![a, b]))
        .await
        .unwrap_err();
    assert!(is_admission(&err, AdmissionError::NothingAdmitted), "{err}");
    assert_eq!(h.chooser.prompts(), 0);
    assert!(h.services.list_jobs().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_unknown_target_and_unhandled_payload() -> Result<(), Box<dyn Error>> {
    let h = harness().await?;

    let err = h
        .services
        .handle_drop(Some("radio"), Payload::Text("anything".into()))
        .await
        .unwrap_err();
    assert!(is_admission(&err, AdmissionError::UnknownTarget("radio".into())));

    let err = h
        .services
        .handle_text_drop(None, "just some words")
        .await
        .unwrap_err();
    assert!(is_admission(&err, AdmissionError::NotHandled));
    Ok(())
}

#[tokio::test]
async fn test_interactive_drop_prompts_for_target_and_profile() -> Result<(), Box<dyn Error>> {
    let h = harness().await?;
    let file = sized_file(h.dir.path(), "movie.mkv", 5 * MB)?;

    let outcome = h.services.handle_drop(None, Payload::Paths(vec![file])).await?;
    assert_eq!(outcome.jobs.len(), 1);
    // Single-profile targets skip the profile prompt.
    assert!(h.chooser.prompts() >= 1);
    Ok(())
}

#[tokio::test]
async fn test_remove_jobs_reports_vetoes_per_job() -> Result<(), Box<dyn Error>> {
    let h = harness().await?;
    let a = sized_file(h.dir.path(), "a.mp4", MB)?;
    let b = sized_file(h.dir.path(), "b.mp4", MB)?;
    let outcome = h
        .services
        .handle_drop(Some("tv"), Payload::Paths(vec![a, b]))
        .await?;
    let ids: Vec<String> = outcome.jobs.iter().map(|id| id.to_string()).collect();

    *h.engine.veto.lock() = Some("device busy".into());
    let summary = h.services.remove_jobs(&ids, false).await?;
    assert!(summary.removed.is_empty());
    assert_eq!(summary.vetoed.len(), 2);
    assert!(summary.vetoed.iter().all(|(_, reason)| reason == "device busy"));

    *h.engine.veto.lock() = None;
    let summary = h.services.remove_jobs(&ids, true).await?;
    assert!(summary.is_complete());
    assert_eq!(summary.removed.len(), 2);
    assert!(h.services.list_jobs().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_invalid_ids_are_rejected() -> Result<(), Box<dyn Error>> {
    let h = harness().await?;

    let err = h.services.control_job("not-a-ulid", JobAction::Stop).unwrap_err();
    assert!(matches!(err, ApiError::InvalidId { ref id, .. } if id == "not-a-ulid"));

    let err = h.services.batch_predicate(&["also bad"]).unwrap_err();
    assert!(matches!(err, ApiError::InvalidId { .. }));
    Ok(())
}

#[tokio::test]
async fn test_cancel_without_support_is_illegal() -> Result<(), Box<dyn Error>> {
    let h = harness().await?;
    let op = h.services.operations().add(Operation::new(
        "allocate",
        OperationKind::Allocation,
        SupportedStates::of(&[TaskState::Pause, TaskState::Resume]),
    ));
    let id = op.id().to_string();

    let err = h
        .services
        .control_operation(&id, OperationAction::Cancel)
        .unwrap_err();
    assert!(matches!(
        err,
        ApiError::Control(ControlError::IllegalTransition { .. })
    ));

    let paused = h.services.control_operation(&id, OperationAction::Pause)?;
    assert_eq!(paused.state, TaskState::Pause);
    assert!(h.services.operation_controls(&[id])?.can_resume());
    Ok(())
}

#[tokio::test]
async fn test_listener_receives_drop_and_coalesced_operations() -> Result<(), Box<dyn Error>> {
    let h = harness().await?;
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let listener = h
        .services
        .register_listener(move |event: &QueueEvent| sink.lock().push(event.clone()));

    let file = sized_file(h.dir.path(), "clip.mp4", MB)?;
    h.services
        .handle_drop(Some("tv"), Payload::Paths(vec![file]))
        .await?;
    for i in 0..5 {
        h.services.operations().add(Operation::new(
            format!("copy {i}"),
            OperationKind::Copy,
            SupportedStates::ALL,
        ));
    }

    let mut refreshed = 0;
    for _ in 0..100 {
        h.services.flush_notifications().await?;
        refreshed = seen
            .lock()
            .iter()
            .filter_map(|e| match e {
                QueueEvent::OperationsRefreshed { count, .. } => Some(*count),
                _ => None,
            })
            .sum::<usize>();
        if refreshed == 5 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(refreshed, 5);
    assert!(
        seen.lock()
            .iter()
            .any(|e| matches!(e, QueueEvent::JobAdded { .. }))
    );

    assert!(h.services.unregister_listener(listener));
    h.services.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn test_zero_coalesce_window_still_starts() -> Result<(), Box<dyn Error>> {
    let lookup = |key: &str| (key == "DROPQ_COALESCE_WINDOW_MS").then(|| "0".to_string());
    let config = AdmissionConfig::from_lookup(lookup)?;
    assert_eq!(config.coalesce_window_ms, 0);

    let h = harness_with(config).await?;
    h.services.operations().add(Operation::new(
        "verify",
        OperationKind::Verification,
        SupportedStates::ALL,
    ));
    h.services.flush_notifications().await?;
    h.services.shutdown().await?;
    Ok(())
}
