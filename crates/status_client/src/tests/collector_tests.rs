use super::*;
use std::sync::Mutex as StdMutex;

fn status(task_id: &str, action: StatusAction) -> StatusMessage {
    StatusMessage::new(task_id, action)
}

fn recording_notifier() -> (Arc<StdMutex<Vec<bool>>>, impl Fn(bool) + Send + Sync + 'static) {
    let calls = Arc::new(StdMutex::new(Vec::new()));
    let sink = Arc::clone(&calls);
    (calls, move |successful| {
        sink.lock().expect("notifier calls").push(successful);
    })
}

#[test]
fn result_finishes_record_and_stays_finished() {
    let mut table = CorrelationTable::default();
    table.apply(status("T1", StatusAction::Added));
    assert_eq!(
        table.apply(status("T1", StatusAction::Result).with_result("ok")),
        Transition::Finished { successful: true }
    );

    for action in [
        StatusAction::Received,
        StatusAction::Process,
        StatusAction::Changed,
        StatusAction::Error,
        StatusAction::Added,
    ] {
        table.apply(status("T1", action));
        assert!(table.get("T1").expect("record").is_finished());
    }
}

#[test]
fn error_clears_success_and_never_restores_it() {
    let mut table = CorrelationTable::default();
    assert_eq!(table.apply(status("T2", StatusAction::Error)), Transition::Failed);

    table.apply(status("T2", StatusAction::Process).with_progress(80));
    assert_eq!(
        table.apply(status("T2", StatusAction::Result).with_result("ok")),
        Transition::Finished { successful: false }
    );
    let record = table.get("T2").expect("record");
    assert!(!record.is_successful());
    assert_eq!(record.state(), RecordState::FinishedFailed);
}

#[test]
fn messages_without_task_id_are_dropped() {
    let mut table = CorrelationTable::default();
    table.apply(status("T1", StatusAction::Added));
    let before = table.snapshot();

    assert_eq!(table.apply(status("", StatusAction::Result)), Transition::Dropped);
    assert_eq!(table.apply(status("   ", StatusAction::Error)), Transition::Dropped);

    assert_eq!(table.len(), 1);
    assert_eq!(table.snapshot(), before);
}

#[test]
fn dismiss_removes_only_the_named_record() {
    let mut table = CorrelationTable::default();
    table.apply(status("T1", StatusAction::Added));
    table.apply(status("T2", StatusAction::Added));

    assert!(!table.dismiss("missing"));
    assert_eq!(table.len(), 2);

    assert!(table.dismiss("T1"));
    assert_eq!(table.len(), 1);
    assert!(table.get("T1").is_none());
    assert!(table.get("T2").is_some());
}

#[test]
fn same_task_id_accumulates_into_one_record() {
    let mut table = CorrelationTable::default();
    table.apply(status("T5", StatusAction::Added));
    table.apply(status("T5", StatusAction::Changed));

    assert_eq!(table.len(), 1);
    assert_eq!(table.get("T5").expect("record").messages().len(), 2);
}

#[test]
fn duplicate_result_is_idempotent_on_flags() {
    let mut table = CorrelationTable::default();
    let result = status("T6", StatusAction::Result).with_result("ok");
    table.apply(result.clone());
    let second = table.apply(result);

    assert_eq!(second, Transition::Finished { successful: true });
    let record = table.get("T6").expect("record");
    assert!(record.is_finished());
    assert!(record.is_successful());
    assert_eq!(record.messages().len(), 2);
}

#[test]
fn progress_of_one_hundred_is_not_terminal() {
    let mut table = CorrelationTable::default();
    assert_eq!(
        table.apply(status("T7", StatusAction::Process).with_progress(100)),
        Transition::Appended
    );
    let record = table.get("T7").expect("record");
    assert_eq!(record.state(), RecordState::Pending);
    assert_eq!(record.latest_progress(), Some(100));
}

#[test]
fn latest_progress_skips_messages_without_progress() {
    let mut table = CorrelationTable::default();
    table.apply(status("T8", StatusAction::Process).with_progress(40));
    table.apply(status("T8", StatusAction::Changed));
    assert_eq!(table.get("T8").expect("record").latest_progress(), Some(40));
}

#[test]
fn finish_policy_closes_record_on_error() {
    let mut table = CorrelationTable::new(ErrorPolicy::Finish);
    assert_eq!(
        table.apply(status("T9", StatusAction::Error).with_result("failed")),
        Transition::Finished { successful: false }
    );
    assert_eq!(
        table.get("T9").expect("record").state(),
        RecordState::FinishedFailed
    );
}

#[test]
fn dismissed_task_is_recreated_by_a_later_push() {
    let mut table = CorrelationTable::default();
    table.apply(status("T10", StatusAction::Result));
    table.dismiss("T10");

    table.apply(status("T10", StatusAction::Process));
    let record = table.get("T10").expect("record");
    assert_eq!(record.messages().len(), 1);
    assert!(!record.is_finished());
}

#[tokio::test]
async fn deploy_happy_path_notifies_success() {
    let collector = StatusCollector::new();
    let (calls, notifier) = recording_notifier();
    collector.set_finished_notifier(notifier).await;

    collector.add_received_message("deploy requested", "T1").await;
    let records = collector.list().await;
    assert_eq!(records.len(), 1);
    assert!(!records[0].is_finished());

    collector
        .receive_status(status("T1", StatusAction::Process).with_progress(50))
        .await;
    let record = collector.get("T1").await.expect("record");
    assert_eq!(collector.list().await.len(), 1);
    assert_eq!(record.messages().len(), 2);
    assert!(!record.is_finished());

    collector
        .receive_status(
            status("T1", StatusAction::Result)
                .with_result("ok")
                .with_progress(100),
        )
        .await;
    let record = collector.get("T1").await.expect("record");
    assert!(record.is_finished());
    assert!(record.is_successful());
    assert_eq!(*calls.lock().expect("calls"), vec![true]);
}

#[tokio::test]
async fn error_notifies_failure_without_finishing() {
    let collector = StatusCollector::new();
    let (calls, notifier) = recording_notifier();
    collector.set_finished_notifier(notifier).await;

    collector.receive_status(status("T2", StatusAction::Added)).await;
    collector
        .receive_status(status("T2", StatusAction::Error).with_result("failed"))
        .await;

    let record = collector.get("T2").await.expect("record");
    assert!(!record.is_finished());
    assert!(!record.is_successful());
    assert_eq!(*calls.lock().expect("calls"), vec![false]);
}

#[tokio::test]
async fn interleaved_tasks_keep_their_own_history_and_dismiss_one() {
    let collector = StatusCollector::new();
    collector.receive_status(status("T3", StatusAction::Added)).await;
    collector.receive_status(status("T4", StatusAction::Added)).await;
    collector
        .receive_status(status("T3", StatusAction::Process).with_progress(10))
        .await;
    collector
        .receive_status(status("T4", StatusAction::Changed))
        .await;
    collector
        .receive_status(status("T3", StatusAction::Result).with_result("ok"))
        .await;

    let records = collector.list().await;
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].task_id(), "T3");
    assert_eq!(records[1].task_id(), "T4");
    let t3_actions: Vec<_> = records[0].messages().iter().map(|m| m.action).collect();
    assert_eq!(
        t3_actions,
        vec![StatusAction::Added, StatusAction::Process, StatusAction::Result]
    );
    let t4_actions: Vec<_> = records[1].messages().iter().map(|m| m.action).collect();
    assert_eq!(t4_actions, vec![StatusAction::Added, StatusAction::Changed]);

    assert!(collector.dismiss_status("T3").await);
    let records = collector.list().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].task_id(), "T4");
}

#[tokio::test]
async fn last_registered_notifier_wins() {
    let collector = StatusCollector::new();
    let (first_calls, first) = recording_notifier();
    let (second_calls, second) = recording_notifier();
    collector.set_finished_notifier(first).await;
    collector.set_finished_notifier(second).await;

    collector.receive_status(status("T1", StatusAction::Result)).await;

    assert!(first_calls.lock().expect("calls").is_empty());
    assert_eq!(*second_calls.lock().expect("calls"), vec![true]);
}

#[tokio::test]
async fn duplicate_terminal_messages_notify_each_time() {
    let collector = StatusCollector::new();
    let (calls, notifier) = recording_notifier();
    collector.set_finished_notifier(notifier).await;

    let result = status("T1", StatusAction::Result).with_result("ok");
    collector.receive_status(result.clone()).await;
    collector.receive_status(result).await;

    assert_eq!(*calls.lock().expect("calls"), vec![true, true]);
    assert_eq!(collector.list().await.len(), 1);
}

#[tokio::test]
async fn result_broadcasts_reload_but_error_does_not() {
    let collector = StatusCollector::new();
    let mut reload = collector.subscribe_reload();

    collector.receive_status(status("T1", StatusAction::Error)).await;
    assert!(reload.try_recv().is_err());

    collector.receive_status(status("T1", StatusAction::Result)).await;
    assert!(reload.try_recv().is_ok());
}

#[tokio::test]
async fn manual_reload_trigger_reaches_subscribers() {
    let collector = StatusCollector::new();
    let mut first = collector.subscribe_reload();
    let mut second = collector.subscribe_reload();

    collector.trigger_data_reloading_action();

    assert!(first.recv().await.is_ok());
    assert!(second.recv().await.is_ok());
}

#[tokio::test]
async fn updates_describe_each_transition() {
    let collector = StatusCollector::new();
    let mut updates = collector.subscribe_updates();

    collector.add_received_message("undeploy requested", "T1").await;
    collector.receive_status(status("T1", StatusAction::Error)).await;
    collector.receive_status(status("T1", StatusAction::Result)).await;
    collector.receive_status(status("", StatusAction::Result)).await;
    collector.dismiss_status("T1").await;

    let mut seen = Vec::new();
    while let Ok(update) = updates.try_recv() {
        seen.push(update);
    }
    assert_eq!(
        seen,
        vec![
            StatusUpdate::Changed {
                task_id: "T1".to_string()
            },
            StatusUpdate::Failed {
                task_id: "T1".to_string()
            },
            StatusUpdate::Finished {
                task_id: "T1".to_string(),
                successful: false
            },
            StatusUpdate::Dismissed {
                task_id: "T1".to_string()
            },
        ]
    );
}

#[tokio::test]
async fn notifier_may_query_the_collector() {
    let collector = StatusCollector::new();
    let observed = Arc::new(StdMutex::new(None));
    let observer = Arc::clone(&observed);
    let handle = Arc::clone(&collector);
    collector
        .set_finished_notifier(move |successful| {
            let handle = Arc::clone(&handle);
            let observer = Arc::clone(&observer);
            tokio::spawn(async move {
                let count = handle.list().await.len();
                *observer.lock().expect("observer") = Some((successful, count));
            });
        })
        .await;

    collector.receive_status(status("T1", StatusAction::Result)).await;
    for _ in 0..50 {
        if observed.lock().expect("observer").is_some() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert_eq!(*observed.lock().expect("observer"), Some((true, 1)));
}

#[tokio::test]
async fn empty_task_id_placeholder_creates_nothing() {
    let collector = StatusCollector::new();
    assert_eq!(
        collector.add_received_message("deploy requested", "").await,
        Transition::Dropped
    );
    assert!(collector.list().await.is_empty());
}
