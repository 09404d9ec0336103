use devbot::core::diagnostics::log_parser::{extract_tag, LogStreamParser};
use devbot::core::diagnostics::{LogError, Severity};

fn parse(lines: &[&str]) -> Vec<LogError> {
    let mut parser = LogStreamParser::new();
    let mut records: Vec<LogError> = lines.iter().filter_map(|line| parser.feed(line)).collect();
    records.extend(parser.finish());
    records
}

#[test]
fn test_boundary_flush_example() {
    let records = parse(&[
        "I/x: noise",
        "E/Tag: boom",
        "  at foo()",
        "  at bar()",
        "W/Tag2: warn",
    ]);

    assert_eq!(records.len(), 2);

    assert_eq!(records[0].severity, Severity::High);
    assert_eq!(records[0].tag, "Tag");
    assert_eq!(records[0].message, "boom");
    assert_eq!(
        records[0].stack_trace.as_deref(),
        Some("  at foo()\n  at bar()")
    );

    assert_eq!(records[1].severity, Severity::Medium);
    assert_eq!(records[1].tag, "Tag2");
    assert_eq!(records[1].message, "warn");
    assert!(records[1].stack_trace.is_none());
}

#[test]
fn test_single_line_record_has_no_stack_trace() {
    let records = parse(&["E/Solo: only line"]);
    assert_eq!(records.len(), 1);
    assert!(records[0].stack_trace.is_none());
}

#[test]
fn test_logcat_time_format() {
    let records = parse(&[
        "10-17 09:15:02.114 E/AndroidRuntime( 4242): FATAL EXCEPTION: main",
        "10-17 09:15:02.114 E/AndroidRuntime( 4242): java.lang.IllegalStateException: bad state",
        "\tat com.example.Main.run(Main.kt:12)",
        "10-17 09:15:03.000 F/libc    ( 4242): Fatal signal 6 (SIGABRT)",
    ]);

    assert_eq!(records.len(), 3);
    assert_eq!(records[0].tag, "AndroidRuntime( 4242)");
    assert_eq!(records[0].message, "FATAL EXCEPTION: main");
    assert_eq!(
        records[1].stack_trace.as_deref(),
        Some("\tat com.example.Main.run(Main.kt:12)")
    );
    assert_eq!(records[2].severity, Severity::Critical);
    assert_eq!(records[2].tag, "libc    ( 4242)");
}

#[test]
fn test_marker_precedence_error_over_warning() {
    // Both markers present: E/ is checked first
    let records = parse(&["W/Net: retry after E/Sock: reset"]);
    assert_eq!(records[0].severity, Severity::High);
}

#[test]
fn test_tag_fallback_is_unknown() {
    assert_eq!(extract_tag("E/"), "Unknown");
    let records = parse(&["something E/ without tag"]);
    assert_eq!(records[0].tag, "Unknown");
    assert_eq!(records[0].message, "something E/ without tag");
}

#[test]
fn test_empty_stream_produces_nothing() {
    assert!(parse(&[]).is_empty());
    assert!(parse(&["", "   ", "D/Debug: ignored"]).is_empty());
}
