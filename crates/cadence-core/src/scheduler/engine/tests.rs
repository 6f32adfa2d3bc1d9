    use super::*;
    use crate::scheduler::notify::MockNotificationSink;
    use crate::scheduler::store::MockTaskStore;
    use crate::scheduler::types::{DependencyBehavior, LegacyFrequency, MAX_DEPENDENCIES};
    use chrono::Duration;
    use tempfile::TempDir;

    struct TestContext {
        engine: Arc<SchedulerEngine>,
        store: Arc<SqliteTaskStore>,
        _dir: TempDir,
    }

    async fn create_test_context() -> TestContext {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test_scheduler.db");
        let store = Arc::new(SqliteTaskStore::from_path(&path).await.unwrap());
        let config = SchedulerConfig::new().with_check_interval(1);
        let engine = Arc::new(SchedulerEngine::new(store.clone(), config));
        TestContext {
            engine,
            store,
            _dir: dir,
        }
    }

    fn command_task(name: &str, command: &str) -> Task {
        Task::new(name).with_action(TaskAction::command(command))
    }

    fn due_task(name: &str, command: &str) -> Task {
        let mut task = command_task(name, command).with_schedule(Schedule::interval(60));
        task.next_run_at = Some(Utc::now() - Duration::seconds(1));
        task
    }

    #[tokio::test]
    async fn test_add_and_list_tasks() {
        let ctx = create_test_context().await;

        let first = ctx.engine.add_task(command_task("first", "true")).await.unwrap();
        let second = ctx.engine.add_task(command_task("second", "true")).await.unwrap();
        assert_eq!(first, 1);
        assert_eq!(second, 2);

        let tasks = ctx.engine.list_tasks().await;
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].name, "first");
        assert!(ctx.store.get_task(2).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_add_task_computes_next_run() {
        let ctx = create_test_context().await;
        let before = Utc::now();

        let interval = ctx
            .engine
            .add_task(command_task("interval", "true").with_schedule(Schedule::interval(5)))
            .await
            .unwrap();
        let next = ctx.engine.get_task(interval).await.unwrap().next_run_at.unwrap();
        assert!(next >= before + Duration::minutes(5));
        assert!(next <= Utc::now() + Duration::minutes(5));

        let manual = ctx.engine.add_task(command_task("manual", "true")).await.unwrap();
        assert!(ctx.engine.get_task(manual).await.unwrap().next_run_at.is_none());

        let disabled = ctx
            .engine
            .add_task(
                command_task("disabled", "true")
                    .with_schedule(Schedule::interval(5))
                    .with_enabled(false),
            )
            .await
            .unwrap();
        assert!(ctx.engine.get_task(disabled).await.unwrap().next_run_at.is_none());
    }

    #[tokio::test]
    async fn test_add_task_rejects_invalid_definitions() {
        let ctx = create_test_context().await;

        let bad_cron = command_task("cron", "true").with_schedule(Schedule::cron("61 * * * *"));
        assert!(matches!(
            ctx.engine.add_task(bad_cron).await,
            Err(SchedulerError::InvalidCron(_))
        ));

        let mut dangling = command_task("dangling", "true");
        dangling.dependencies = vec![42];
        assert!(matches!(
            ctx.engine.add_task(dangling).await,
            Err(SchedulerError::TaskNotFound(42))
        ));

        let legacy = command_task("legacy", "true").with_schedule(Schedule::Legacy {
            frequency: LegacyFrequency::Daily,
            interval: 930,
        });
        assert!(matches!(
            ctx.engine.add_task(legacy).await,
            Err(SchedulerError::InvalidConfig(_))
        ));

        assert!(ctx.engine.list_tasks().await.is_empty());
    }

    #[tokio::test]
    async fn test_legacy_records_are_loaded_and_scheduled() {
        let ctx = create_test_context().await;

        let mut legacy = command_task("nightly", "true").with_schedule(Schedule::Legacy {
            frequency: LegacyFrequency::Custom,
            interval: 90,
        });
        legacy.id = 7;
        ctx.store.save_task(&legacy).await.unwrap();

        assert_eq!(ctx.engine.load().await.unwrap(), 1);
        let task = ctx.engine.get_task(7).await.unwrap();
        let next = task.next_run_at.unwrap();
        assert!(next > Utc::now());
        assert!(next <= Utc::now() + Duration::seconds(90));
    }

    #[tokio::test]
    async fn test_add_task_rolls_back_on_persistence_failure() {
        let mut store = MockTaskStore::new();
        store.expect_next_id().returning(|| Ok(1));
        store
            .expect_save_task()
            .returning(|_| Err(SchedulerError::Storage("disk full".to_string())));
        let engine = SchedulerEngine::new(Arc::new(store), SchedulerConfig::default());

        let result = engine.add_task(command_task("doomed", "true")).await;
        assert!(matches!(result, Err(SchedulerError::Storage(_))));
        assert!(engine.list_tasks().await.is_empty());
    }

    #[tokio::test]
    async fn test_update_preserves_history() {
        let ctx = create_test_context().await;
        let id = ctx
            .engine
            .add_task(command_task("job", "exit 3").with_schedule(Schedule::interval(10)))
            .await
            .unwrap();
        assert_eq!(ctx.engine.execute_task(id).await.unwrap(), 3);
        let ran = ctx.engine.get_task(id).await.unwrap();

        let mut edited = command_task("renamed", "true").with_schedule(Schedule::interval(20));
        edited.id = id;
        ctx.engine.update_task(edited).await.unwrap();

        let task = ctx.engine.get_task(id).await.unwrap();
        assert_eq!(task.name, "renamed");
        assert_eq!(task.last_run_at, ran.last_run_at);
        assert_eq!(task.exit_code, 3);
        assert_eq!(task.created_at, ran.created_at);
        assert_eq!(
            task.next_run_at,
            ran.last_run_at.map(|last| last + Duration::minutes(20))
        );

        let stored = ctx.store.get_task(id).await.unwrap().unwrap();
        assert_eq!(stored.name, "renamed");
        assert_eq!(stored.exit_code, 3);
    }

    #[tokio::test]
    async fn test_update_disabling_with_zeroed_history_keeps_history() {
        let ctx = create_test_context().await;
        let id = ctx
            .engine
            .add_task(command_task("job", "exit 3").with_schedule(Schedule::interval(10)))
            .await
            .unwrap();
        assert_eq!(ctx.engine.execute_task(id).await.unwrap(), 3);
        let ran = ctx.engine.get_task(id).await.unwrap();

        let mut edited = ran.clone().with_enabled(false);
        edited.last_run_at = None;
        edited.exit_code = 0;
        edited.next_run_at = None;
        ctx.engine.update_task(edited).await.unwrap();

        let task = ctx.engine.get_task(id).await.unwrap();
        assert!(!task.enabled);
        assert_eq!(task.last_run_at, ran.last_run_at);
        assert_eq!(task.exit_code, 3);
        assert!(task.next_run_at.is_none());

        let stored = ctx.store.get_task(id).await.unwrap().unwrap();
        assert_eq!(stored.last_run_at, ran.last_run_at);
        assert_eq!(stored.exit_code, 3);
        assert!(stored.next_run_at.is_none());
    }

    #[tokio::test]
    async fn test_update_cannot_switch_to_legacy_schedule() {
        let ctx = create_test_context().await;
        let id = ctx
            .engine
            .add_task(command_task("job", "true").with_schedule(Schedule::interval(10)))
            .await
            .unwrap();

        let legacy = Schedule::Legacy {
            frequency: LegacyFrequency::Weekly,
            interval: 1,
        };
        let edited = ctx.engine.get_task(id).await.unwrap().with_schedule(legacy.clone());
        assert!(matches!(
            ctx.engine.update_task(edited).await,
            Err(SchedulerError::InvalidConfig(_))
        ));
        assert_eq!(
            ctx.engine.get_task(id).await.unwrap().schedule,
            Schedule::interval(10)
        );

        // records that were already legacy can still be edited
        let mut old = command_task("old", "true").with_schedule(legacy);
        old.id = 20;
        ctx.store.save_task(&old).await.unwrap();
        ctx.engine.load().await.unwrap();
        let renamed = Task {
            name: "old-renamed".to_string(),
            ..ctx.engine.get_task(20).await.unwrap()
        };
        ctx.engine.update_task(renamed).await.unwrap();
        assert_eq!(ctx.engine.get_task(20).await.unwrap().name, "old-renamed");
    }

    #[tokio::test]
    async fn test_update_unknown_task() {
        let ctx = create_test_context().await;
        let mut task = command_task("ghost", "true");
        task.id = 9;
        assert!(matches!(
            ctx.engine.update_task(task).await,
            Err(SchedulerError::TaskNotFound(9))
        ));
    }

    #[tokio::test]
    async fn test_disable_is_idempotent_and_keeps_history() {
        let ctx = create_test_context().await;
        let id = ctx
            .engine
            .add_task(command_task("job", "true").with_schedule(Schedule::interval(5)))
            .await
            .unwrap();
        ctx.engine.execute_task(id).await.unwrap();
        let ran = ctx.engine.get_task(id).await.unwrap();

        ctx.engine.set_task_enabled(id, false).await.unwrap();
        let once = ctx.engine.get_task(id).await.unwrap();
        ctx.engine.set_task_enabled(id, false).await.unwrap();
        let twice = ctx.engine.get_task(id).await.unwrap();

        assert_eq!(once, twice);
        assert!(!twice.enabled);
        assert!(twice.next_run_at.is_none());
        assert_eq!(twice.last_run_at, ran.last_run_at);
        assert_eq!(twice.exit_code, 0);

        ctx.engine.set_task_enabled(id, true).await.unwrap();
        let enabled = ctx.engine.get_task(id).await.unwrap();
        assert_eq!(
            enabled.next_run_at,
            ran.last_run_at.map(|last| last + Duration::minutes(5))
        );
    }

    #[tokio::test]
    async fn test_self_dependency_rejected() {
        let ctx = create_test_context().await;
        let id = ctx.engine.add_task(command_task("solo", "true")).await.unwrap();

        let result = ctx.engine.add_dependency(id, id).await;
        assert!(matches!(result, Err(SchedulerError::InvalidConfig(_))));
        assert!(ctx.engine.get_task(id).await.unwrap().dependencies.is_empty());
    }

    #[tokio::test]
    async fn test_add_and_remove_dependency() {
        let ctx = create_test_context().await;
        let a = ctx.engine.add_task(command_task("a", "true")).await.unwrap();
        let b = ctx.engine.add_task(command_task("b", "true")).await.unwrap();

        ctx.engine.add_dependency(b, a).await.unwrap();
        ctx.engine.add_dependency(b, a).await.unwrap();
        assert_eq!(ctx.engine.get_task(b).await.unwrap().dependencies, vec![a]);
        assert_eq!(ctx.store.get_task(b).await.unwrap().unwrap().dependencies, vec![a]);

        assert!(matches!(
            ctx.engine.add_dependency(b, 77).await,
            Err(SchedulerError::TaskNotFound(77))
        ));
        assert!(matches!(
            ctx.engine.add_dependency(77, a).await,
            Err(SchedulerError::TaskNotFound(77))
        ));

        ctx.engine.remove_dependency(b, a).await.unwrap();
        assert!(ctx.engine.get_task(b).await.unwrap().dependencies.is_empty());
    }

    #[tokio::test]
    async fn test_dependency_cap() {
        let ctx = create_test_context().await;
        let target = ctx.engine.add_task(command_task("target", "true")).await.unwrap();
        for i in 0..=MAX_DEPENDENCIES {
            let dep = ctx
                .engine
                .add_task(command_task(&format!("dep{}", i), "true"))
                .await
                .unwrap();
            let result = ctx.engine.add_dependency(target, dep).await;
            if i < MAX_DEPENDENCIES {
                result.unwrap();
            } else {
                assert!(matches!(result, Err(SchedulerError::InvalidConfig(_))));
            }
        }
        let task = ctx.engine.get_task(target).await.unwrap();
        assert_eq!(task.dependencies.len(), MAX_DEPENDENCIES);
    }

    #[tokio::test]
    async fn test_set_exec_mode_replaces_payload() {
        let ctx = create_test_context().await;
        let id = ctx.engine.add_task(command_task("mode", "true")).await.unwrap();

        ctx.engine
            .set_exec_mode(id, TaskAction::script("#!/bin/sh\nexit 0\n"))
            .await
            .unwrap();

        let stored = ctx.store.get_task(id).await.unwrap().unwrap();
        assert_eq!(stored.action, TaskAction::script("#!/bin/sh\nexit 0\n"));
        assert_eq!(stored.action.mode(), "script");
    }

    #[tokio::test]
    async fn test_execute_task_errors() {
        let ctx = create_test_context().await;
        assert!(matches!(
            ctx.engine.execute_task(5).await,
            Err(SchedulerError::TaskNotFound(5))
        ));

        let disabled = ctx
            .engine
            .add_task(command_task("off", "true").with_enabled(false))
            .await
            .unwrap();
        assert!(matches!(
            ctx.engine.execute_task(disabled).await,
            Err(SchedulerError::TaskDisabled(_))
        ));
    }

    #[tokio::test]
    async fn test_execute_respects_all_success() {
        let ctx = create_test_context().await;
        let upstream = ctx.engine.add_task(command_task("up", "exit 1")).await.unwrap();
        let mut downstream = command_task("down", "true");
        downstream.dependencies = vec![upstream];
        let downstream = ctx.engine.add_task(downstream).await.unwrap();

        assert!(matches!(
            ctx.engine.execute_task(downstream).await,
            Err(SchedulerError::DependenciesUnsatisfied(_))
        ));

        assert_eq!(ctx.engine.execute_task(upstream).await.unwrap(), 1);
        assert!(ctx.engine.execute_task(downstream).await.is_err());

        ctx.engine
            .set_exec_mode(upstream, TaskAction::command("true"))
            .await
            .unwrap();
        assert_eq!(ctx.engine.execute_task(upstream).await.unwrap(), 0);
        assert_eq!(ctx.engine.execute_task(downstream).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_removed_dependency_blocks_any_completion() {
        let ctx = create_test_context().await;
        let upstream = ctx.engine.add_task(command_task("up", "true")).await.unwrap();
        let mut downstream = command_task("down", "true")
            .with_dependency_behavior(DependencyBehavior::AnyCompletion);
        downstream.dependencies = vec![upstream];
        let downstream = ctx.engine.add_task(downstream).await.unwrap();

        ctx.engine.execute_task(upstream).await.unwrap();
        ctx.engine.remove_task(upstream).await.unwrap();

        assert_eq!(
            ctx.engine.get_task(downstream).await.unwrap().dependencies,
            vec![upstream]
        );
        assert!(matches!(
            ctx.engine.execute_task(downstream).await,
            Err(SchedulerError::DependenciesUnsatisfied(_))
        ));
        assert!(matches!(
            ctx.engine.remove_task(upstream).await,
            Err(SchedulerError::TaskNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_execute_task_timeout() {
        let ctx = create_test_context().await;
        let id = ctx
            .engine
            .add_task(command_task("slow", "sleep 10").with_max_runtime(1))
            .await
            .unwrap();

        let started = std::time::Instant::now();
        assert_eq!(ctx.engine.execute_task(id).await.unwrap(), -1);
        assert!(started.elapsed() < std::time::Duration::from_secs(5));
        assert_eq!(ctx.engine.get_task(id).await.unwrap().exit_code, -1);
        assert_eq!(ctx.engine.running_count().await, 0);
    }

    #[tokio::test]
    async fn test_single_flight() {
        let ctx = create_test_context().await;
        let id = ctx.engine.add_task(command_task("slow", "sleep 1")).await.unwrap();

        let (first, second) = tokio::join!(ctx.engine.execute_task(id), ctx.engine.execute_task(id));
        assert_eq!(first.unwrap(), 0);
        assert!(matches!(second, Err(SchedulerError::AlreadyRunning(_))));
    }

    #[tokio::test]
    async fn test_run_due_tasks_reschedules() {
        let ctx = create_test_context().await;
        let id = ctx.engine.add_task(due_task("due", "true")).await.unwrap();
        let idle = ctx
            .engine
            .add_task(command_task("idle", "true").with_schedule(Schedule::interval(60)))
            .await
            .unwrap();

        assert_eq!(ctx.engine.run_due_tasks().await, 1);

        let task = ctx.engine.get_task(id).await.unwrap();
        let last = task.last_run_at.unwrap();
        assert_eq!(task.next_run_at, Some(last + Duration::minutes(60)));
        assert!(ctx.engine.get_task(idle).await.unwrap().last_run_at.is_none());

        let stored = ctx.store.get_task(id).await.unwrap().unwrap();
        assert_eq!(stored.last_run_at, task.last_run_at);

        assert_eq!(ctx.engine.run_due_tasks().await, 0);
    }

    #[tokio::test]
    async fn test_run_due_tasks_checks_dependencies_at_scan_time() {
        let ctx = create_test_context().await;
        let upstream = ctx.engine.add_task(due_task("up", "true")).await.unwrap();
        let mut downstream = due_task("down", "true");
        downstream.dependencies = vec![upstream];
        let downstream = ctx.engine.add_task(downstream).await.unwrap();

        assert_eq!(ctx.engine.run_due_tasks().await, 1);
        assert!(ctx.engine.get_task(downstream).await.unwrap().last_run_at.is_none());

        assert_eq!(ctx.engine.run_due_tasks().await, 1);
        assert!(ctx.engine.get_task(downstream).await.unwrap().last_run_at.is_some());
    }

    #[tokio::test]
    async fn test_failing_task_does_not_block_others() {
        let ctx = create_test_context().await;
        let failing = ctx.engine.add_task(due_task("bad", "exit 9")).await.unwrap();
        let ok = ctx.engine.add_task(due_task("good", "true")).await.unwrap();

        assert_eq!(ctx.engine.run_due_tasks().await, 2);
        assert_eq!(ctx.engine.get_task(failing).await.unwrap().exit_code, 9);
        assert!(ctx.engine.get_task(ok).await.unwrap().succeeded());
    }

    #[tokio::test]
    async fn test_notifier_receives_outcome() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(
            SqliteTaskStore::from_path(&dir.path().join("notify.db"))
                .await
                .unwrap(),
        );
        let mut notifier = MockNotificationSink::new();
        notifier
            .expect_notify()
            .withf(|task, code| task.name == "ping" && *code == 4)
            .times(1)
            .returning(|_, _| ());

        let engine = SchedulerEngine::new(store, SchedulerConfig::default())
            .with_notifier(Arc::new(notifier));

        let id = engine.add_task(command_task("ping", "exit 4")).await.unwrap();
        assert_eq!(engine.execute_task(id).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_sync_restores_missing_rows() {
        let ctx = create_test_context().await;
        let id = ctx.engine.add_task(command_task("kept", "true")).await.unwrap();
        ctx.store.delete_task(id).await.unwrap();

        ctx.engine.sync().await.unwrap();
        assert!(ctx.store.get_task(id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_sync_reports_failures() {
        let mut store = MockTaskStore::new();
        store.expect_next_id().returning(|| Ok(1));
        store.expect_save_task().returning(|_| Ok(()));
        store
            .expect_update_task()
            .returning(|_| Err(SchedulerError::Storage("read-only".to_string())));
        let engine = SchedulerEngine::new(Arc::new(store), SchedulerConfig::default());

        engine.add_task(command_task("a", "true")).await.unwrap();
        assert!(matches!(engine.sync().await, Err(SchedulerError::Storage(_))));
    }

    #[tokio::test]
    async fn test_start_stop_idempotent_and_polls() {
        let ctx = create_test_context().await;
        let id = ctx.engine.add_task(due_task("polled", "true")).await.unwrap();

        ctx.engine.start().await;
        ctx.engine.start().await;
        assert!(ctx.engine.poller.lock().await.is_some());

        tokio::time::sleep(std::time::Duration::from_millis(2500)).await;

        ctx.engine.stop().await;
        ctx.engine.stop().await;
        assert!(ctx.engine.poller.lock().await.is_none());

        let task = ctx.engine.get_task(id).await.unwrap();
        assert!(task.last_run_at.is_some());
    }

    #[tokio::test]
    async fn test_open_loads_existing_tasks() {
        let dir = TempDir::new().unwrap();
        let data_dir = dir.path().join("data");
        {
            let engine = SchedulerEngine::open(&data_dir, SchedulerConfig::default())
                .await
                .unwrap();
            engine
                .add_task(command_task("persisted", "true").with_schedule(Schedule::interval(5)))
                .await
                .unwrap();
        }

        let engine = SchedulerEngine::open(&data_dir, SchedulerConfig::default())
            .await
            .unwrap();
        let tasks = engine.list_tasks().await;
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].name, "persisted");
        assert!(tasks[0].next_run_at.is_some());
        assert!(data_dir.join(DB_FILE_NAME).exists());
    }

    #[tokio::test]
    async fn test_load_picks_up_external_edits() {
        let ctx = create_test_context().await;
        let kept = ctx
            .engine
            .add_task(command_task("kept", "true").with_schedule(Schedule::interval(5)))
            .await
            .unwrap();
        let dropped = ctx.engine.add_task(command_task("dropped", "true")).await.unwrap();
        ctx.engine.execute_task(kept).await.unwrap();
        let ran = ctx.engine.get_task(kept).await.unwrap();

        // Another process edits the store; its copy of `kept` predates the run
        let mut stale = ctx.store.get_task(kept).await.unwrap().unwrap();
        stale.name = "renamed".to_string();
        stale.last_run_at = None;
        stale.exit_code = 0;
        ctx.store.update_task(&stale).await.unwrap();
        ctx.store.delete_task(dropped).await.unwrap();
        let mut added = command_task("added", "true");
        added.id = 10;
        ctx.store.save_task(&added).await.unwrap();

        assert_eq!(ctx.engine.load().await.unwrap(), 2);

        let task = ctx.engine.get_task(kept).await.unwrap();
        assert_eq!(task.name, "renamed");
        assert_eq!(task.last_run_at, ran.last_run_at);
        assert_eq!(
            task.next_run_at,
            ran.last_run_at.map(|last| last + Duration::minutes(5))
        );
        assert!(ctx.engine.get_task(dropped).await.is_err());
        assert_eq!(ctx.engine.get_task(10).await.unwrap().name, "added");
    }
