mod common;

use mesh_metrics::collectors::{self, MetricKind, MetricSpec};
use mesh_metrics::config::{default_metric_specs, MetricParams};
use mesh_metrics::errors::MetricsError;
use mesh_metrics::registry::MetricRegistry;
use std::sync::Arc;
use std::time::Duration;

#[test]
fn get_succeeds_for_exactly_the_configured_names() {
    let specs = default_metric_specs().unwrap();
    let registry = MetricRegistry::new();
    registry.initialize(&specs).unwrap();

    assert_eq!(registry.len(), 14);
    for spec in &specs {
        let collector = registry.get(&spec.name).unwrap();
        assert_eq!(collector.kind(), spec.kind);
    }
    assert!(matches!(
        registry.get("moleculer_missing_total"),
        Err(MetricsError::UnknownMetric(name)) if name == "moleculer_missing_total"
    ));
}

#[test]
fn unknown_kind_fails_and_registers_nothing() {
    let err = collectors::build("jobs_total", &MetricParams::new("Summary", "jobs")).unwrap_err();
    assert!(matches!(err, MetricsError::Configuration(_)));

    let registry = MetricRegistry::new();
    assert!(registry.gather().is_empty());
    assert!(!registry.is_ready());
}

#[test]
fn duplicate_names_fail_and_leave_nothing_registered() {
    let specs = vec![
        MetricSpec::new("jobs_total", MetricKind::Counter, "jobs"),
        MetricSpec::new("jobs_total", MetricKind::Gauge, "jobs again"),
    ];
    let registry = MetricRegistry::new();
    let err = registry.initialize(&specs).unwrap_err();
    assert!(matches!(err, MetricsError::Configuration(_)));
    assert!(registry.gather().is_empty());
    assert!(!registry.is_ready());
}

#[tokio::test]
async fn waiter_blocks_until_initialized() {
    let registry = Arc::new(MetricRegistry::new());

    let waiter = {
        let registry = Arc::clone(&registry);
        tokio::spawn(async move {
            let collector = registry.collector("jobs_total").await.unwrap();
            collector.name().to_string()
        })
    };

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!waiter.is_finished());

    registry
        .initialize(&[MetricSpec::new("jobs_total", MetricKind::Counter, "jobs")])
        .unwrap();

    let name = tokio::time::timeout(Duration::from_secs(1), waiter)
        .await
        .expect("waiter resumed")
        .unwrap();
    assert_eq!(name, "jobs_total");
}

#[test]
fn counter_counts_each_increment() {
    let registry = MetricRegistry::new();
    registry
        .initialize(&[MetricSpec::new("jobs_total", MetricKind::Counter, "jobs")])
        .unwrap();
    let counter = registry.counter("jobs_total").unwrap();
    for _ in 0..7 {
        counter.inc();
    }
    assert_eq!(counter.get(), 7.0);
}

#[test]
fn labeled_tuples_are_independent() {
    let registry = MetricRegistry::new();
    registry
        .initialize(&[
            MetricSpec::new("jobs_total", MetricKind::Counter, "jobs").with_labels(["queue"]),
            MetricSpec::new("depth", MetricKind::Gauge, "depth").with_labels(["queue"]),
        ])
        .unwrap();

    let jobs = registry.counter_vec("jobs_total").unwrap();
    jobs.with_label_values(&["a"]).inc();
    jobs.with_label_values(&["a"]).inc();
    jobs.with_label_values(&["b"]).inc();
    assert_eq!(common::counter_value(&registry, "jobs_total", &[("queue", "a")]), 2.0);
    assert_eq!(common::counter_value(&registry, "jobs_total", &[("queue", "b")]), 1.0);

    let depth = registry.gauge_vec("depth").unwrap();
    depth.with_label_values(&["a"]).set(3.0);
    depth.with_label_values(&["a"]).set(7.0);
    depth.with_label_values(&["b"]).set(1.0);
    assert_eq!(common::gauge_value(&registry, "depth", &[("queue", "a")]), 7.0);
    assert_eq!(common::gauge_value(&registry, "depth", &[("queue", "b")]), 1.0);
}

#[test]
fn histogram_buckets_are_cumulative() {
    let registry = MetricRegistry::new();
    registry
        .initialize(&[MetricSpec::new("latency_ms", MetricKind::Histogram, "latency")
            .with_buckets(vec![10.0, 100.0])])
        .unwrap();

    let histogram = registry.histogram("latency_ms").unwrap();
    for value in [1.0, 5.0, 50.0] {
        histogram.observe(value);
    }
    assert_eq!(histogram.get_sample_count(), 3);
    assert_eq!(histogram.get_sample_sum(), 56.0);

    let text = registry.encode_text().unwrap();
    assert!(text.contains("latency_ms_bucket{le=\"10\"} 2"), "{text}");
    assert!(text.contains("latency_ms_bucket{le=\"100\"} 3"), "{text}");
    assert!(text.contains("latency_ms_bucket{le=\"+Inf\"} 3"), "{text}");
    assert!(text.contains("latency_ms_sum 56"), "{text}");
    assert!(text.contains("latency_ms_count 3"), "{text}");
}

#[test]
fn exposition_lists_every_unlabeled_metric() {
    let registry = common::default_registry();
    let text = registry.encode_text().unwrap();
    assert!(text.contains("# TYPE moleculer_nodes_total gauge"));
    assert!(text.contains("# TYPE moleculer_all_req_total counter"));
    assert!(text.contains("# TYPE moleculer_all_req_duration_ms histogram"));
}
