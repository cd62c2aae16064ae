//! End-to-end tests for the analysis engine.

mod common;

use std::time::{Duration, Instant};

use futures::future::join_all;

use analysis_core::engine::{AnalysisContext, AnalysisLabel, AnalyzerError, Payload};
use analysis_core::scheduler::SchedulerPhase;
use analysis_core::shutdown::ShutdownResult;
use analysis_core::{AnalysisEngine, ConfigError, EngineError, Priority};
use common::{harness, joy, test_config, RealTimeMode, StubAnalyzer};

fn text(s: &str) -> Payload {
    Payload::from(s)
}

fn ctx() -> AnalysisContext {
    AnalysisContext::new()
}

#[tokio::test]
async fn hello_world_then_variant_hits_cache() {
    let h = harness(test_config(), StubAnalyzer::new());

    let first = h
        .engine
        .submit(text("hello world"), ctx(), Priority::Medium)
        .await
        .unwrap();
    assert_eq!(first, vec![AnalysisLabel::new("joy", 0.8, 0.7)]);

    let second = h
        .engine
        .submit(text("Hello World!"), ctx(), Priority::Medium)
        .await
        .unwrap();
    assert_eq!(second, first);
    assert_eq!(h.analyzer.calls(), 1);
    assert_eq!(h.metrics.snapshot().counter("requests_cache_ok"), 1);
}

#[tokio::test]
async fn different_context_is_a_separate_entry() {
    let h = harness(test_config(), StubAnalyzer::new());
    let alice = ctx().with("user", "alice");
    let bob = ctx().with("user", "bob");

    h.engine.submit(text("same text"), alice.clone(), Priority::Medium).await.unwrap();
    h.engine.submit(text("same text"), bob, Priority::Medium).await.unwrap();
    h.engine.submit(text("same text"), alice, Priority::Medium).await.unwrap();

    assert_eq!(h.analyzer.calls(), 2);
}

#[tokio::test]
async fn expired_entry_triggers_fresh_call() {
    let mut config = test_config();
    config.cache.ttl = Duration::from_millis(50);
    let h = harness(config, StubAnalyzer::new());

    h.engine.submit(text("short lived"), ctx(), Priority::Low).await.unwrap();
    tokio::time::sleep(Duration::from_millis(80)).await;
    h.engine.submit(text("short lived"), ctx(), Priority::Low).await.unwrap();

    assert_eq!(h.analyzer.calls(), 2);
}

#[tokio::test]
async fn real_time_items_dispatch_first_in_arrival_order() {
    let mut config = test_config();
    config.sizing.initial_batch_size = 10;
    let h = harness(config, StubAnalyzer::new());
    let engine = &h.engine;

    let (low, rt_a, medium, rt_b) = tokio::join!(
        engine.submit(text("low item"), ctx(), Priority::Low),
        engine.submit(text("first urgent"), ctx(), Priority::RealTime),
        engine.submit(text("medium item"), ctx(), Priority::Medium),
        engine.submit(text("second urgent"), ctx(), Priority::RealTime),
    );
    for result in [low, rt_a, medium, rt_b] {
        assert!(result.is_ok());
    }

    let seen = h.analyzer.seen();
    assert_eq!(seen.len(), 4);
    assert_eq!(&seen[..2], &["first urgent".to_string(), "second urgent".to_string()]);
    assert!(seen[2..].contains(&"low item".to_string()));
    assert!(seen[2..].contains(&"medium item".to_string()));
}

#[tokio::test]
async fn one_failure_does_not_affect_siblings() {
    let h = harness(test_config(), StubAnalyzer::new().failing_on("bad input"));
    let engine = &h.engine;

    let (a, bad, b) = tokio::join!(
        engine.submit(text("good one"), ctx(), Priority::Medium),
        engine.submit(text("bad input"), ctx(), Priority::Medium),
        engine.submit(text("good two"), ctx(), Priority::Medium),
    );
    assert_eq!(a.unwrap(), joy());
    assert_eq!(b.unwrap(), joy());
    assert!(matches!(
        bad,
        Err(EngineError::Analyzer(AnalyzerError::Provider(_)))
    ));

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(engine.status().scheduler_phase, SchedulerPhase::Idle);

    let snapshot = h.metrics.snapshot();
    assert_eq!(snapshot.counter("batches_total"), 1);
    assert_eq!(snapshot.counter("batches_with_failures_total"), 1);
    assert_eq!(snapshot.counter("batch_failed_items_total"), 1);
    assert_eq!(snapshot.counter("requests_batched_error"), 1);
    assert_eq!(snapshot.counter("requests_batched_ok"), 2);
}

#[tokio::test]
async fn failed_result_is_not_cached() {
    let h = harness(test_config(), StubAnalyzer::new().failing_on("flaky"));
    assert!(h.engine.submit(text("flaky"), ctx(), Priority::Medium).await.is_err());
    assert!(h.engine.submit(text("flaky"), ctx(), Priority::Medium).await.is_err());
    assert_eq!(h.analyzer.calls(), 2);
    assert_eq!(h.engine.status().cache_size, 0);
}

#[tokio::test]
async fn concurrency_never_exceeds_limit() {
    let mut config = test_config();
    config.sizing.initial_batch_size = 20;
    config.sizing.initial_concurrency = 5;
    let h = harness(
        config,
        StubAnalyzer::new().with_delay(Duration::from_millis(20)),
    );

    let submissions = (0..20).map(|i| {
        h.engine
            .submit(text(&format!("item {i}")), ctx(), Priority::Medium)
    });
    let results = join_all(submissions).await;

    assert!(results.iter().all(|r| r.is_ok()));
    assert_eq!(h.analyzer.calls(), 20);
    assert!(h.analyzer.peak_concurrency() <= 5);
    assert!(h.analyzer.peak_concurrency() >= 2);
}

#[tokio::test]
async fn full_batch_runs_without_waiting_for_timer() {
    let mut config = test_config();
    config.sizing.initial_batch_size = 2;
    config.batch_formation_timeout = Duration::from_secs(10);
    let h = harness(config, StubAnalyzer::new());
    let engine = &h.engine;

    let both = async {
        tokio::join!(
            engine.submit(text("one"), ctx(), Priority::Medium),
            engine.submit(text("two"), ctx(), Priority::Medium),
        )
    };
    let (a, b) = tokio::time::timeout(Duration::from_secs(1), both)
        .await
        .expect("batch should run once full");
    assert!(a.is_ok() && b.is_ok());
}

#[tokio::test]
async fn partial_batch_runs_after_formation_timeout() {
    let mut config = test_config();
    config.batch_formation_timeout = Duration::from_millis(30);
    let h = harness(config, StubAnalyzer::new());

    let pending = h.engine.clone();
    let task = tokio::spawn(async move {
        pending.submit(text("lonely"), ctx(), Priority::Low).await
    });
    tokio::time::sleep(Duration::from_millis(5)).await;
    assert_eq!(h.engine.status().scheduler_phase, SchedulerPhase::Scheduled);
    assert_eq!(h.engine.status().queue_depth, 1);

    assert!(task.await.unwrap().is_ok());
}

#[tokio::test]
async fn real_time_failure_falls_back_to_standard_call() {
    let h = harness(
        test_config(),
        StubAnalyzer::new().with_real_time(RealTimeMode::Fail),
    );

    let result = h.engine.submit_real_time(text("urgent"), ctx()).await.unwrap();

    assert_eq!(result, joy());
    assert_eq!(h.analyzer.real_time_calls(), 1);
    assert_eq!(h.analyzer.calls(), 1);
    let snapshot = h.metrics.snapshot();
    assert_eq!(snapshot.counter("requests_real_time_fallback_ok"), 1);
    assert_eq!(snapshot.counter("requests_real_time_fallback_error"), 0);
    assert_eq!(snapshot.counter("requests_real_time_ok"), 0);
}

#[tokio::test]
async fn real_time_fallback_failure_surfaces_once() {
    let h = harness(
        test_config(),
        StubAnalyzer::new()
            .with_real_time(RealTimeMode::Fail)
            .failing_on("doomed"),
    );

    let err = h.engine.submit_real_time(text("doomed"), ctx()).await.unwrap_err();
    assert!(err.is_analyzer_failure());
    assert_eq!(h.metrics.snapshot().counter("requests_real_time_fallback_error"), 1);
}

#[tokio::test]
async fn real_time_path_bypasses_queue_and_caches() {
    let h = harness(
        test_config(),
        StubAnalyzer::new().with_real_time(RealTimeMode::Succeed),
    );

    let first = h.engine.submit_real_time(text("now please"), ctx()).await.unwrap();
    assert_eq!(first, h.analyzer.real_time_result());
    assert_eq!(h.analyzer.calls(), 0);
    assert_eq!(h.engine.status().batches_completed, 0);

    let again = h.engine.submit_real_time(text("Now, please."), ctx()).await.unwrap();
    assert_eq!(again, first);
    assert_eq!(h.analyzer.real_time_calls(), 1);
}

#[tokio::test]
async fn queued_real_time_item_uses_low_latency_call() {
    let h = harness(
        test_config(),
        StubAnalyzer::new().with_real_time(RealTimeMode::Succeed),
    );

    let result = h
        .engine
        .submit(text("urgent thing"), ctx(), Priority::RealTime)
        .await
        .unwrap();

    assert_eq!(result, h.analyzer.real_time_result());
    assert_eq!(h.analyzer.real_time_calls(), 1);
    assert_eq!(h.analyzer.calls(), 0);
    let snapshot = h.metrics.snapshot();
    assert_eq!(snapshot.counter("requests_real_time_ok"), 1);
    assert_eq!(snapshot.counter("requests_batched_ok"), 0);
}

#[tokio::test]
async fn queued_real_time_item_falls_back_once() {
    let h = harness(
        test_config(),
        StubAnalyzer::new().with_real_time(RealTimeMode::Fail),
    );

    let result = h
        .engine
        .submit(text("urgent thing"), ctx(), Priority::RealTime)
        .await
        .unwrap();

    assert_eq!(result, joy());
    assert_eq!(h.analyzer.real_time_calls(), 1);
    assert_eq!(h.analyzer.calls(), 1);
    let snapshot = h.metrics.snapshot();
    assert_eq!(snapshot.counter("requests_real_time_fallback_ok"), 1);
    assert_eq!(snapshot.counter("requests_real_time_ok"), 0);
    assert_eq!(snapshot.counter("requests_batched_ok"), 0);
}

#[tokio::test]
async fn real_time_items_ignore_concurrency_cap() {
    let mut config = test_config();
    config.sizing.initial_batch_size = 10;
    config.sizing.initial_concurrency = 1;
    let h = harness(
        config,
        StubAnalyzer::new().with_delay(Duration::from_millis(50)),
    );
    let engine = &h.engine;

    let started = Instant::now();
    let results = tokio::join!(
        engine.submit(text("normal one"), ctx(), Priority::Medium),
        engine.submit(text("normal two"), ctx(), Priority::Medium),
        engine.submit(text("normal three"), ctx(), Priority::Low),
        engine.submit(text("urgent one"), ctx(), Priority::RealTime),
        engine.submit(text("urgent two"), ctx(), Priority::RealTime),
        engine.submit(text("urgent three"), ctx(), Priority::RealTime),
    );
    let elapsed = started.elapsed();
    for result in [results.0, results.1, results.2, results.3, results.4, results.5] {
        assert_eq!(result.unwrap(), joy());
    }

    // All three real-time calls overlap with the single normal slot.
    assert_eq!(h.analyzer.peak_concurrency(), 4);
    // Normal items ran one at a time.
    assert!(elapsed >= Duration::from_millis(150));
}

#[tokio::test]
async fn analyzer_without_real_time_path_uses_standard_call() {
    let h = harness(test_config(), StubAnalyzer::new());
    let result = h.engine.submit_real_time(text("plain"), ctx()).await.unwrap();
    assert_eq!(result, joy());
    assert_eq!(h.metrics.snapshot().counter("requests_real_time_ok"), 1);
}

#[tokio::test]
async fn unsafe_and_invalid_inputs_never_reach_analyzer() {
    let mut config = test_config();
    config.input.max_payload_bytes = 32;
    let h = harness(config, StubAnalyzer::new());

    let empty = h.engine.submit(text(""), ctx(), Priority::Medium).await;
    assert!(matches!(empty, Err(EngineError::InputRejected(_))));

    let blank = h.engine.submit(text("   \n "), ctx(), Priority::Medium).await;
    assert!(matches!(blank, Err(EngineError::InputRejected(_))));

    let long = h
        .engine
        .submit(text(&"x".repeat(33)), ctx(), Priority::Medium)
        .await;
    assert!(matches!(long, Err(EngineError::InputRejected(_))));

    let hostile = h
        .engine
        .submit_real_time(text("please jailbreak"), ctx())
        .await;
    assert!(matches!(hostile, Err(EngineError::UnsafeInput { .. })));

    assert_eq!(h.analyzer.calls(), 0);
    assert_eq!(h.engine.status().queue_depth, 0);
}

#[tokio::test]
async fn queue_ceiling_rejects_with_queue_full() {
    let mut config = test_config();
    config.queue.max_depth = 1;
    config.batch_formation_timeout = Duration::from_secs(10);
    let h = harness(config, StubAnalyzer::new());

    let pending = h.engine.clone();
    let _first = tokio::spawn(async move {
        pending.submit(text("first"), ctx(), Priority::Low).await
    });
    tokio::time::sleep(Duration::from_millis(10)).await;

    let second = h.engine.submit(text("second"), ctx(), Priority::Low).await;
    assert!(matches!(
        second,
        Err(EngineError::QueueFull { current: 1, max: 1 })
    ));
    assert!(second.unwrap_err().is_client_error());
}

#[tokio::test]
async fn warm_cache_skips_present_duplicate_and_invalid_entries() {
    let h = harness(test_config(), StubAnalyzer::new());
    h.engine
        .submit(text("already here"), ctx(), Priority::Medium)
        .await
        .unwrap();

    let report = h
        .engine
        .warm_cache(vec![
            (text("alpha"), ctx()),
            (text("ALPHA!"), ctx()),
            (text("beta"), ctx()),
            (text("already here"), ctx()),
            (text(""), ctx()),
        ])
        .await
        .unwrap();

    assert_eq!(report.requested, 5);
    assert_eq!(report.warmed, 2);
    assert_eq!(report.already_cached, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(h.analyzer.calls(), 3);

    h.engine.submit(text("alpha"), ctx(), Priority::Low).await.unwrap();
    assert_eq!(h.analyzer.calls(), 3);
}

#[tokio::test]
async fn warm_cache_counts_analyzer_failures() {
    let h = harness(test_config(), StubAnalyzer::new().failing_on("broken"));
    let report = h
        .engine
        .warm_cache(vec![(text("broken"), ctx()), (text("fine"), ctx())])
        .await
        .unwrap();
    assert_eq!(report.warmed, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(h.engine.status().cache_size, 1);
}

#[tokio::test]
async fn status_reports_sizing_and_cache() {
    let h = harness(test_config(), StubAnalyzer::new());
    h.engine.submit(text("a"), ctx(), Priority::Medium).await.unwrap();
    h.engine.submit(text("a"), ctx(), Priority::Medium).await.unwrap();

    let status = h.engine.status();
    assert_eq!(status.queue_depth, 0);
    assert_eq!(status.current_batch_size, 5);
    assert_eq!(status.current_concurrency_limit, 3);
    assert_eq!(status.cache_size, 1);
    assert!((status.cache_hit_rate - 0.5).abs() < f64::EPSILON);
    assert_eq!(status.in_flight, 0);
    assert_eq!(status.batches_completed, 1);
}

#[tokio::test]
async fn slow_analyzer_times_out_per_item() {
    let mut config = test_config();
    config.analyzer_timeout = Some(Duration::from_millis(20));
    let h = harness(
        config,
        StubAnalyzer::new().with_delay(Duration::from_millis(200)),
    );

    let err = h
        .engine
        .submit(text("slow"), ctx(), Priority::High)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Analyzer(AnalyzerError::Timeout(_))
    ));
}

#[tokio::test]
async fn slow_batches_shrink_batch_size() {
    let mut config = test_config();
    config.adaptive.target_latency = Duration::from_millis(1);
    config.adaptive.interval = Duration::ZERO;
    let h = harness(
        config,
        StubAnalyzer::new().with_delay(Duration::from_millis(20)),
    );

    for i in 0..3 {
        h.engine
            .submit(text(&format!("batch {i}")), ctx(), Priority::Medium)
            .await
            .unwrap();
    }
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(h.engine.status().current_batch_size < 5);
}

#[tokio::test]
async fn shutdown_refuses_new_work() {
    let h = harness(test_config(), StubAnalyzer::new());
    h.engine.submit(text("before"), ctx(), Priority::Medium).await.unwrap();

    let result = h.engine.shutdown(Duration::from_secs(1)).await;
    assert_eq!(result, ShutdownResult::Complete);

    let after = h.engine.submit(text("after"), ctx(), Priority::Medium).await;
    assert!(matches!(after, Err(EngineError::ShuttingDown)));
    let warm = h.engine.warm_cache(vec![(text("late"), ctx())]).await;
    assert!(matches!(warm, Err(EngineError::ShuttingDown)));
}

#[tokio::test]
async fn shutdown_flushes_queued_requests() {
    let mut config = test_config();
    config.batch_formation_timeout = Duration::from_secs(10);
    let h = harness(config, StubAnalyzer::new());

    let pending = h.engine.clone();
    let task = tokio::spawn(async move {
        pending.submit(text("queued"), ctx(), Priority::Low).await
    });
    tokio::time::sleep(Duration::from_millis(10)).await;

    let result = h.engine.shutdown(Duration::from_secs(1)).await;
    assert_eq!(result, ShutdownResult::Complete);
    assert!(task.await.unwrap().is_ok());
}

#[tokio::test]
async fn abandoned_submission_is_drained_by_shutdown() {
    let h = harness(
        test_config(),
        StubAnalyzer::new().with_delay(Duration::from_millis(300)),
    );

    let pending = h.engine.clone();
    let task = tokio::spawn(async move {
        pending.submit(text("slow job"), ctx(), Priority::Medium).await
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    task.abort();
    assert!(task.await.unwrap_err().is_cancelled());

    assert_eq!(h.analyzer.active(), 1);
    assert_eq!(h.engine.status().in_flight, 1);

    let result = h.engine.shutdown(Duration::from_secs(2)).await;
    assert_eq!(result, ShutdownResult::Complete);
    assert_eq!(h.analyzer.active(), 0);
    assert_eq!(h.analyzer.calls(), 1);
    assert_eq!(h.engine.status().in_flight, 0);
}

#[test]
fn inverted_bounds_are_fatal_at_construction() {
    let mut config = test_config();
    config.sizing.min_batch_size = 10;
    config.sizing.max_batch_size = 2;
    let analyzer = std::sync::Arc::new(StubAnalyzer::new());
    let result = AnalysisEngine::new(config, analyzer);
    assert!(matches!(result, Err(ConfigError::Invalid(_))));
}

#[tokio::test]
async fn binary_payloads_are_cached_verbatim() {
    let h = harness(test_config(), StubAnalyzer::new());
    let bytes = vec![0u8, 159, 146, 150];
    h.engine
        .submit(Payload::from(bytes.clone()), ctx(), Priority::Medium)
        .await
        .unwrap();
    h.engine
        .submit(Payload::from(bytes), ctx(), Priority::Medium)
        .await
        .unwrap();
    assert_eq!(h.analyzer.calls(), 1);
}
