use devbot::core::diagnostics::thresholds::{
    evaluate, evaluate_frame_drop, evaluate_memory_pressure, evaluate_memory_usage,
    evaluate_slow_operation, evaluate_slow_query, exceeds,
};
use devbot::core::diagnostics::PerformanceMetric;

#[test]
fn test_equal_never_fires() {
    assert!(!exceeds(100, 100));
    assert!(exceeds(101, 100));

    for metric in [
        PerformanceMetric::MemoryUsage,
        PerformanceMetric::UiThreadBlock,
        PerformanceMetric::FrameDrop,
    ] {
        assert!(evaluate(100, 100, metric).is_none());
        assert_eq!(evaluate(101, 100, metric).unwrap().metric, metric);
    }
}

#[test]
fn test_each_evaluator_boundary() {
    assert!(evaluate_slow_query("SELECT 1", 100).is_none());
    assert!(evaluate_slow_query("SELECT 1", 101).is_some());

    assert!(evaluate_memory_usage(300, 300).is_none());
    assert!(evaluate_memory_usage(301, 300).is_some());

    assert!(evaluate_memory_pressure(85, 100, 85).is_none());
    assert!(evaluate_memory_pressure(86, 100, 85).is_some());

    assert!(evaluate_frame_drop(5).is_none());
    assert!(evaluate_frame_drop(6).is_some());

    assert!(evaluate_slow_operation("load", 100, 100).is_none());
    assert!(evaluate_slow_operation("load", 101, 100).is_some());
}

#[test]
fn test_event_carries_sample_and_threshold() {
    let event = evaluate_memory_usage(512, 300).unwrap();
    assert_eq!(event.value, 512);
    assert_eq!(event.threshold, 300);
    assert_eq!(event.message, "High memory usage detected: 512MB (threshold: 300MB)");
}
