use super::*;
use crate::clock::{Clock, ManualClock};
use crate::error::GovernorError;
use crate::lifecycle::{ModuleRegistry, ShutdownExecutor};
use crate::models::{ModuleInfo, ModuleState, ShutdownStrategy, SuspensionReason, SuspensionState};
use crate::resources::{ResourceKind, ResourceMonitor, ResourceMonitorConfig};
use chrono::Duration as ChronoDuration;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

struct Fixture {
    clock: Arc<ManualClock>,
    registry: Arc<ModuleRegistry>,
    manager: Arc<SuspensionManager>,
}

fn fixture(ai_modules: &[&str]) -> Fixture {
    let clock = ManualClock::starting_now();
    let registry = Arc::new(ModuleRegistry::new());
    let executor = Arc::new(ShutdownExecutor::new(registry.clone(), clock.clone()));
    let manager = Arc::new(SuspensionManager::new(
        executor,
        clock.clone(),
        SuspensionConfig::default(),
    ));
    for id in ai_modules {
        manager.register_ai_module(id, &id.to_uppercase()).unwrap();
    }
    Fixture {
        clock,
        registry,
        manager,
    }
}

fn counter(manager: &SuspensionManager, state: SuspensionState) -> Arc<AtomicUsize> {
    let count = Arc::new(AtomicUsize::new(0));
    let c = count.clone();
    manager.register_callback(state, move |_, _, _| {
        c.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    count
}

#[test]
fn test_new_records_are_active() {
    let f = fixture(&["llm"]);
    let record = f.manager.get("llm").unwrap();
    assert_eq!(record.state, SuspensionState::Active);
    assert_eq!(record.name, "LLM");
    assert!(record.reason.is_none());

    let err = f.manager.register_ai_module("llm", "again").unwrap_err();
    assert!(matches!(err, GovernorError::Duplicate { .. }));
}

#[test]
fn test_suspend_resume_round_trip_records_history() {
    let f = fixture(&["llm"]);
    let suspended = counter(&f.manager, SuspensionState::Suspended);
    let active = counter(&f.manager, SuspensionState::Active);

    assert!(f
        .manager
        .suspend("llm", SuspensionReason::Manual, ShutdownStrategy::Graceful, None)
        .unwrap());
    let record = f.manager.get("llm").unwrap();
    assert_eq!(record.state, SuspensionState::Suspended);
    assert_eq!(record.suspended_at, Some(f.clock.now()));

    assert!(f.manager.resume("llm").unwrap());
    assert_eq!(f.manager.get("llm").unwrap().state, SuspensionState::Active);

    let history = f.manager.get_history(None);
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].new_state, SuspensionState::Active);
    assert_eq!(history[1].new_state, SuspensionState::Suspended);
    assert_eq!(suspended.load(Ordering::SeqCst), 1);
    assert_eq!(active.load(Ordering::SeqCst), 1);
}

#[test]
fn test_repeat_suspend_same_reason_is_noop() {
    let f = fixture(&["llm"]);
    let suspended = counter(&f.manager, SuspensionState::Suspended);

    for _ in 0..3 {
        assert!(f
            .manager
            .suspend("llm", SuspensionReason::Manual, ShutdownStrategy::Graceful, None)
            .unwrap());
    }
    assert_eq!(f.manager.get_history(None).len(), 1);
    assert_eq!(suspended.load(Ordering::SeqCst), 1);
}

#[test]
fn test_suspend_with_new_reason_retags() {
    let f = fixture(&["llm"]);
    let suspended = counter(&f.manager, SuspensionState::Suspended);

    f.manager
        .suspend("llm", SuspensionReason::Manual, ShutdownStrategy::Graceful, None)
        .unwrap();
    f.manager
        .suspend(
            "llm",
            SuspensionReason::ResourceCritical,
            ShutdownStrategy::Immediate,
            None,
        )
        .unwrap();

    let record = f.manager.get("llm").unwrap();
    assert_eq!(record.reason, Some(SuspensionReason::ResourceCritical));
    assert_eq!(record.strategy, Some(ShutdownStrategy::Immediate));
    assert_eq!(suspended.load(Ordering::SeqCst), 1);

    let history = f.manager.get_history(None);
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].old_state, SuspensionState::Suspended);
    assert_eq!(history[0].new_state, SuspensionState::Suspended);
    assert_eq!(f.manager.get_stats().total_suspensions, 1);
}

#[test]
fn test_resume_active_is_invalid() {
    let f = fixture(&["llm"]);
    assert!(f.manager.resume("llm").unwrap_err().is_invalid_transition());
    assert!(f.manager.resume("ghost").unwrap_err().is_not_found());
    assert!(f
        .manager
        .suspend("ghost", SuspensionReason::Manual, ShutdownStrategy::Graceful, None)
        .unwrap_err()
        .is_not_found());
}

#[test]
fn test_suspend_pauses_matching_lifecycle_module() {
    let f = fixture(&["llm"]);
    f.registry.register(ModuleInfo::new("llm", "LLM", 3)).unwrap();
    f.registry.start("llm").unwrap();

    f.manager
        .suspend(
            "llm",
            SuspensionReason::ResourceCritical,
            ShutdownStrategy::Graceful,
            None,
        )
        .unwrap();
    assert_eq!(f.registry.state("llm"), Some(ModuleState::Paused));

    f.manager.resume("llm").unwrap();
    assert_eq!(f.registry.state("llm"), Some(ModuleState::Running));

    let records = f.manager.executor().history(None);
    assert_eq!(records.len(), 2);
}

#[test]
fn test_suspend_leaves_stopped_lifecycle_module_alone() {
    let f = fixture(&["llm"]);
    f.registry.register(ModuleInfo::new("llm", "LLM", 3)).unwrap();

    assert!(f
        .manager
        .suspend("llm", SuspensionReason::Manual, ShutdownStrategy::Graceful, None)
        .unwrap());
    assert_eq!(f.registry.state("llm"), Some(ModuleState::Stopped));
    assert!(f.manager.resume("llm").unwrap());
    assert_eq!(f.registry.state("llm"), Some(ModuleState::Stopped));
}

#[test]
fn test_resume_keeps_pause_made_elsewhere() {
    let f = fixture(&["llm"]);
    f.registry.register(ModuleInfo::new("llm", "LLM", 3)).unwrap();
    f.registry.start("llm").unwrap();
    f.registry.pause("llm").unwrap();

    f.manager
        .suspend("llm", SuspensionReason::Manual, ShutdownStrategy::Graceful, None)
        .unwrap();
    assert!(!f.manager.get("llm").unwrap().paused_module);

    assert!(f.manager.resume("llm").unwrap());
    assert_eq!(f.registry.state("llm"), Some(ModuleState::Paused));
    assert!(f.manager.executor().history(None).is_empty());
}

#[test]
fn test_suspension_owns_its_pause_until_resumed() {
    let f = fixture(&["llm"]);
    f.registry.register(ModuleInfo::new("llm", "LLM", 3)).unwrap();
    f.registry.start("llm").unwrap();

    f.manager
        .suspend("llm", SuspensionReason::Manual, ShutdownStrategy::Graceful, None)
        .unwrap();
    assert!(f.manager.get("llm").unwrap().paused_module);

    // retagging keeps ownership of the original pause
    f.manager
        .suspend(
            "llm",
            SuspensionReason::ResourceCritical,
            ShutdownStrategy::Graceful,
            None,
        )
        .unwrap();
    assert!(f.manager.get("llm").unwrap().paused_module);

    f.manager.resume("llm").unwrap();
    assert!(!f.manager.get("llm").unwrap().paused_module);
    assert_eq!(f.registry.state("llm"), Some(ModuleState::Running));
}

#[test]
fn test_racing_suspend_resume_history_matches_final_state() {
    let f = fixture(&["llm"]);

    for _ in 0..200 {
        let barrier = Arc::new(std::sync::Barrier::new(2));
        let suspender = {
            let manager = f.manager.clone();
            let barrier = barrier.clone();
            std::thread::spawn(move || {
                barrier.wait();
                let _ = manager.suspend(
                    "llm",
                    SuspensionReason::Manual,
                    ShutdownStrategy::Graceful,
                    None,
                );
            })
        };
        let resumer = {
            let manager = f.manager.clone();
            let barrier = barrier.clone();
            std::thread::spawn(move || {
                barrier.wait();
                let _ = manager.resume("llm");
            })
        };
        suspender.join().unwrap();
        resumer.join().unwrap();

        let last = f.manager.module_history("llm", Some(1));
        assert_eq!(last[0].new_state, f.manager.get("llm").unwrap().state);
    }
}

#[test]
fn test_failing_callback_reports_false_but_applies() {
    let f = fixture(&["llm"]);
    f.manager
        .register_callback(SuspensionState::Suspended, |_, _, _| anyhow::bail!("webhook down"));

    let ok = f
        .manager
        .suspend("llm", SuspensionReason::Manual, ShutdownStrategy::Graceful, None)
        .unwrap();
    assert!(!ok);
    assert_eq!(f.manager.get("llm").unwrap().state, SuspensionState::Suspended);
}

#[test]
fn test_resume_after_auto_resumes() {
    let f = fixture(&["llm"]);
    f.manager
        .suspend(
            "llm",
            SuspensionReason::Manual,
            ShutdownStrategy::Graceful,
            Some(Duration::from_secs(60)),
        )
        .unwrap();
    assert_eq!(
        f.manager.get("llm").unwrap().resume_at,
        Some(f.clock.now() + ChronoDuration::seconds(60))
    );

    f.clock.advance(ChronoDuration::seconds(30));
    assert_eq!(f.manager.run_pending(), TickSummary::default());

    f.clock.advance(ChronoDuration::seconds(30));
    let summary = f.manager.run_pending();
    assert_eq!(summary.resumed, 1);
    assert_eq!(f.manager.get("llm").unwrap().state, SuspensionState::Active);
    assert_eq!(f.manager.get_history(Some(1))[0].reason, SuspensionReason::Scheduled);
}

#[test]
fn test_manual_resume_clears_auto_resume() {
    let f = fixture(&["llm"]);
    f.manager
        .suspend(
            "llm",
            SuspensionReason::Manual,
            ShutdownStrategy::Graceful,
            Some(Duration::from_secs(5)),
        )
        .unwrap();
    f.manager.resume("llm").unwrap();
    assert!(f.manager.get("llm").unwrap().resume_at.is_none());

    f.clock.advance(ChronoDuration::seconds(10));
    assert_eq!(f.manager.run_pending().resumed, 0);
    assert_eq!(f.manager.get_history(None).len(), 2);
}

#[test]
fn test_scheduled_window_executes_and_resumes() {
    let f = fixture(&["llm"]);
    let start = f.clock.now() + ChronoDuration::minutes(10);
    let end = start + ChronoDuration::minutes(30);
    f.manager
        .schedule_suspension(
            "llm",
            start,
            end,
            SuspensionReason::Scheduled,
            ShutdownStrategy::Graceful,
        )
        .unwrap();

    assert_eq!(f.manager.run_pending().executed, 0);

    f.clock.advance(ChronoDuration::minutes(10));
    let summary = f.manager.run_pending();
    assert_eq!(summary.executed, 1);
    let record = f.manager.get("llm").unwrap();
    assert_eq!(record.state, SuspensionState::Suspended);
    assert_eq!(record.reason, Some(SuspensionReason::Scheduled));
    assert_eq!(record.resume_at, Some(end));
    assert!(f.manager.get_scheduled_suspensions("llm").unwrap().is_empty());

    f.clock.set(end);
    assert_eq!(f.manager.run_pending().resumed, 1);
    assert_eq!(f.manager.get("llm").unwrap().state, SuspensionState::Active);
}

#[test]
fn test_schedule_then_cancel() {
    let f = fixture(&["llm"]);
    let now = f.clock.now();
    for offset in [1, 5] {
        f.manager
            .schedule_suspension(
                "llm",
                now + ChronoDuration::hours(offset),
                now + ChronoDuration::hours(offset + 1),
                SuspensionReason::Scheduled,
                ShutdownStrategy::Graceful,
            )
            .unwrap();
    }
    assert_eq!(f.manager.get_scheduled_suspensions("llm").unwrap().len(), 2);

    assert_eq!(f.manager.cancel_scheduled_suspension("llm").unwrap(), 2);
    assert!(f.manager.get_scheduled_suspensions("llm").unwrap().is_empty());

    f.clock.advance(ChronoDuration::hours(10));
    assert_eq!(f.manager.run_pending(), TickSummary::default());
}

#[test]
fn test_schedule_validation() {
    let f = fixture(&["llm"]);
    let now = f.clock.now();

    let err = f
        .manager
        .schedule_suspension(
            "llm",
            now,
            now,
            SuspensionReason::Scheduled,
            ShutdownStrategy::Graceful,
        )
        .unwrap_err();
    assert!(matches!(err, GovernorError::InvalidArgument(_)));

    let err = f
        .manager
        .schedule_suspension(
            "ghost",
            now,
            now + ChronoDuration::minutes(1),
            SuspensionReason::Scheduled,
            ShutdownStrategy::Graceful,
        )
        .unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn test_overlapping_schedules_fire_in_queue_order() {
    let f = fixture(&["a", "b"]);
    let now = f.clock.now();
    f.manager
        .schedule_suspension(
            "b",
            now,
            now + ChronoDuration::minutes(5),
            SuspensionReason::Scheduled,
            ShutdownStrategy::Graceful,
        )
        .unwrap();
    f.manager
        .schedule_suspension(
            "a",
            now,
            now + ChronoDuration::minutes(5),
            SuspensionReason::Manual,
            ShutdownStrategy::Immediate,
        )
        .unwrap();

    assert_eq!(f.manager.run_pending().executed, 2);
    let order: Vec<String> = f
        .manager
        .get_history(None)
        .into_iter()
        .rev()
        .map(|e| e.ai_module_id)
        .collect();
    assert_eq!(order, vec!["b", "a"]);
}

#[test]
fn test_stats_reflect_current_state() {
    let f = fixture(&["a", "b", "c"]);
    f.manager
        .suspend(
            "a",
            SuspensionReason::ResourceCritical,
            ShutdownStrategy::Graceful,
            None,
        )
        .unwrap();
    f.manager
        .suspend("b", SuspensionReason::Manual, ShutdownStrategy::Immediate, None)
        .unwrap();
    f.manager.resume("b").unwrap();

    let stats = f.manager.get_stats();
    assert_eq!(stats.total_suspensions, 2);
    assert_eq!(stats.suspended_modules, 1);
    assert_eq!(stats.active_modules, 2);
    assert_eq!(
        stats.suspension_reasons,
        BTreeMap::from([(SuspensionReason::ResourceCritical, 1)])
    );
    assert_eq!(
        stats.suspension_strategies,
        BTreeMap::from([(ShutdownStrategy::Graceful, 1)])
    );

    assert_eq!(f.manager.by_state(SuspensionState::Active).len(), 2);
    assert_eq!(f.manager.module_history("b", None).len(), 2);
}

#[test]
fn test_unregister_drops_schedules() {
    let f = fixture(&["llm"]);
    let now = f.clock.now();
    f.manager
        .schedule_suspension(
            "llm",
            now,
            now + ChronoDuration::minutes(1),
            SuspensionReason::Scheduled,
            ShutdownStrategy::Graceful,
        )
        .unwrap();

    f.manager.unregister_ai_module("llm").unwrap();
    assert!(f.manager.all_scheduled().is_empty());
    assert!(f.manager.get("llm").is_none());
    assert!(f.manager.unregister_ai_module("llm").unwrap_err().is_not_found());
}

#[test]
fn test_critical_alert_suspends_attached_module() {
    let f = fixture(&["llm"]);
    let monitor = ResourceMonitor::new(ResourceMonitorConfig::default(), f.clock.clone());
    f.manager.attach_resource_monitor(&monitor);

    let limits = BTreeMap::from([(ResourceKind::Gpu, 90.0)]);
    monitor.register_ai_module("llm", "LLM", Some(limits.clone())).unwrap();
    monitor.register_ai_module("untracked", "Other", Some(limits)).unwrap();

    monitor.update_resources("llm", [(ResourceKind::Gpu, 85.0)]).unwrap();
    assert_eq!(f.manager.get("llm").unwrap().state, SuspensionState::Active);

    assert!(monitor.update_resources("llm", [(ResourceKind::Gpu, 95.0)]).unwrap());
    let record = f.manager.get("llm").unwrap();
    assert_eq!(record.state, SuspensionState::Suspended);
    assert_eq!(record.reason, Some(SuspensionReason::ResourceCritical));
    assert_eq!(record.strategy, Some(ShutdownStrategy::Graceful));

    // Modules unknown to the manager are ignored
    assert!(monitor
        .update_resources("untracked", [(ResourceKind::Gpu, 99.0)])
        .unwrap());
}

#[tokio::test]
async fn test_scheduler_loop_start_stop() {
    let clock = ManualClock::starting_now();
    let registry = Arc::new(ModuleRegistry::new());
    let executor = Arc::new(ShutdownExecutor::new(registry, clock.clone()));
    let manager = Arc::new(SuspensionManager::new(
        executor,
        clock.clone(),
        SuspensionConfig {
            check_interval: Duration::from_millis(10),
            ..Default::default()
        },
    ));
    manager.register_ai_module("llm", "LLM").unwrap();
    manager
        .suspend(
            "llm",
            SuspensionReason::Manual,
            ShutdownStrategy::Graceful,
            Some(Duration::from_secs(1)),
        )
        .unwrap();
    clock.advance(ChronoDuration::seconds(2));

    assert!(manager.start_monitoring());
    assert!(!manager.start_monitoring());
    tokio::time::sleep(Duration::from_millis(50)).await;
    manager.stop_monitoring().await;

    assert!(!manager.is_monitoring());
    assert_eq!(manager.get("llm").unwrap().state, SuspensionState::Active);
}
