//! Wire-level behaviour of a session against the virtual target

use picoc_harness::core::report::RunEvent;
use picoc_harness::{
    CorpusError, DirectoryCorpus, LineCollector, RunObserver, SessionConfig, SessionError,
    SessionRunner, TargetHandle, TestStatus, TestUnit, VirtualTarget, DEFAULT_SENTINEL,
};
use std::time::Duration;

fn runner(target: VirtualTarget) -> SessionRunner {
    SessionRunner::new(
        Box::new(target),
        LineCollector::new(DEFAULT_SENTINEL),
        SessionConfig::default(),
    )
}

/// Records each output line with how many lines had been written when it
/// arrived
struct WriteTracker {
    handle: TargetHandle,
    seen: Vec<(String, usize)>,
}

impl RunObserver for WriteTracker {
    fn on_event(&mut self, event: RunEvent) {
        if let RunEvent::Output { line } = event {
            self.seen.push((line, self.handle.lines_received().len()));
        }
    }
}

#[tokio::test(start_paused = true)]
async fn compile_error_is_captured_before_next_line() {
    let target = VirtualTarget::new().reply_to("undefined_fn", "compile error\n");
    let handle = target.handle();
    let mut runner = runner(target);
    let mut tracker = WriteTracker {
        handle: handle.clone(),
        seen: Vec::new(),
    };

    let unit = TestUnit::from_source(
        "66_printf_undefined.c",
        "int x;\nundefined_fn();\nvoid main() {}\n",
    );
    let report = runner.run(&unit, &mut tracker).await.unwrap();

    assert_eq!(report.status, TestStatus::Completed);
    // exit(); int x; undefined_fn(); had been written, nothing after
    assert_eq!(tracker.seen, vec![("compile error".to_string(), 3)]);
}

#[tokio::test(start_paused = true)]
async fn echoed_upload_keeps_source_order() {
    let target = VirtualTarget::new().echo(true).on_run("result 7\n");
    let mut runner = runner(target);
    let mut events: Vec<RunEvent> = Vec::new();

    let unit = TestUnit::from_source("07_function.c", "int f() { return 7; }\n\nvoid main() {}\n");
    runner.run(&unit, &mut events).await.unwrap();

    let lines: Vec<&str> = events
        .iter()
        .filter_map(|e| match e {
            RunEvent::Output { line } => Some(line.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(
        lines,
        vec![
            "exit();",
            "int f() { return 7; }",
            "void main() {}",
            "main();",
            "result 7",
            "printf(\"\\nDONE!!11!1!\\n\");",
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn output_split_across_reads_is_joined() {
    let target = VirtualTarget::new()
        .chunk_size(3)
        .on_run("a fairly long line of output\n");
    let mut runner = runner(target);
    let mut events: Vec<RunEvent> = Vec::new();

    let unit = TestUnit::from_source("02_printf.c", "void main() {}\n");
    let report = runner.run(&unit, &mut events).await.unwrap();

    assert_eq!(report.output_lines, 1);
    assert!(events.contains(&RunEvent::Output {
        line: "a fairly long line of output".to_string()
    }));
}

#[tokio::test(start_paused = true)]
async fn hung_test_is_recovered_by_next_reset() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("15_recursion.c"), "void main() {}\n").unwrap();
    std::fs::write(dir.path().join("16_nesting.c"), "void main() {}\n").unwrap();

    let target = VirtualTarget::new().hang_on_run();
    let handle = target.handle();
    let mut runner = SessionRunner::new(
        Box::new(target),
        LineCollector::default(),
        SessionConfig {
            completion_timeout: Some(Duration::from_secs(5)),
            ..SessionConfig::default()
        },
    );

    let corpus = DirectoryCorpus::new(dir.path())
        .with_tests(vec!["15_recursion.c".to_string(), "16_nesting.c".to_string()]);
    let report = runner
        .run_suite(&corpus, None, &mut Vec::<RunEvent>::new())
        .await
        .unwrap();

    assert_eq!(report.hung(), vec!["15_recursion.c", "16_nesting.c"]);
    assert!(report.skipped.is_empty());
    assert_eq!(handle.resets(), 2);
    assert_eq!(handle.runs(), 2);
}

#[tokio::test(start_paused = true)]
async fn unknown_test_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let target = VirtualTarget::new();
    let handle = target.handle();
    let mut runner = runner(target);

    let corpus = DirectoryCorpus::new(dir.path());
    let result = runner
        .run_suite(&corpus, Some("99_missing.c"), &mut Vec::<RunEvent>::new())
        .await;

    assert!(matches!(
        result,
        Err(SessionError::Corpus(CorpusError::NotFound { .. }))
    ));
    assert!(handle.written().is_empty());
}
