use compile_js::analyze::analyze;
use compile_js::function::Script;
use compile_js::function::SharedFunction;
use compile_js::parse_function;
use compile_js::CompileLimits;
use dispatch_js::BlockingBehavior;
use dispatch_js::CompileDispatcher;
use dispatch_js::DispatcherOptions;
use dispatch_js::JobStatus;
use dispatch_js::MemoryPressureLevel;
use dispatch_js::MockPlatform;
use dispatch_js::Platform;
use dispatch_js::Stage;
use std::sync::Arc;

fn setup_with(options: DispatcherOptions) -> (Arc<MockPlatform>, CompileDispatcher) {
  let platform = Arc::new(MockPlatform::new());
  let dispatcher = CompileDispatcher::new(
    Arc::clone(&platform) as Arc<dyn Platform>,
    options,
  );
  (platform, dispatcher)
}

fn setup() -> (Arc<MockPlatform>, CompileDispatcher) {
  setup_with(DispatcherOptions::default())
}

fn function(source: &str) -> Arc<SharedFunction> {
  SharedFunction::covering(Script::new(source.to_string()))
}

/// Drives a job to `ReadyToCompile` with a compile estimate far too large for the
/// idle budget, so a background task ends up pending.
fn stage_background_compile(
  platform: &MockPlatform,
  dispatcher: &CompileDispatcher,
  func: &Arc<SharedFunction>,
) {
  assert!(dispatcher.enqueue(func));
  assert!(platform.idle_task_pending());
  assert_eq!(
    dispatcher.job_status_for_testing(func),
    Some(JobStatus::Initial)
  );

  dispatcher.tracer().record(Stage::Compile, 50_000.0, 1);
  platform.run_idle_task(10.0, 0.0);
  assert_eq!(
    dispatcher.job_status_for_testing(func),
    Some(JobStatus::ReadyToCompile)
  );
  assert!(dispatcher.is_enqueued(func));
  assert!(!func.is_compiled());
  assert!(!platform.idle_task_pending());
  assert!(platform.background_tasks_pending());
}

#[test]
fn construct() {
  let (_platform, _dispatcher) = setup();
}

#[test]
fn is_enqueued_tracks_membership() {
  let (platform, dispatcher) = setup();
  let func = function("function f1(x) { return x * y; }");

  assert!(!dispatcher.is_enqueued(&func));
  assert!(dispatcher.enqueue(&func));
  assert!(dispatcher.is_enqueued(&func));
  dispatcher.abort_all(BlockingBehavior::Block);
  assert!(!dispatcher.is_enqueued(&func));
  assert!(platform.idle_task_pending());
  platform.clear_idle_task();
}

#[test]
fn double_enqueue_fails_without_state_change() {
  let (platform, dispatcher) = setup();
  let func = function("function f2(x) { return x; }");

  assert!(dispatcher.enqueue(&func));
  assert!(!dispatcher.enqueue(&func));
  assert!(!dispatcher.enqueue_and_step(&func));
  // The refused enqueue_and_step must not have stepped the existing job.
  assert_eq!(
    dispatcher.job_status_for_testing(&func),
    Some(JobStatus::Initial)
  );
  assert_eq!(dispatcher.telemetry().enqueued, 1);
  platform.clear_idle_task();
}

#[test]
fn finish_now_compiles_enqueued_function() {
  let (platform, dispatcher) = setup();
  let func = function("function f2(x) { return x * y; }");

  assert!(!func.is_compiled());
  assert!(dispatcher.enqueue(&func));
  assert!(dispatcher.finish_now(&func));
  assert!(!dispatcher.is_enqueued(&func));
  assert!(func.is_compiled());
  assert!(platform.idle_task_pending());
  platform.clear_idle_task();
}

#[test]
fn finish_now_compiles_unenqueued_function() {
  let (platform, dispatcher) = setup();
  let func = function("function f(x) { return x + 1; }");

  assert!(dispatcher.finish_now(&func));
  assert!(func.is_compiled());
  assert!(!dispatcher.is_enqueued(&func));
  assert!(!platform.idle_task_pending());
  assert!(!platform.background_tasks_pending());
}

// S1: one function, one generous idle slice.
#[test]
fn idle_task_compiles_whole_function() {
  let (platform, dispatcher) = setup();
  let func = function("function f3(x) { return x * y; }");

  assert!(!platform.idle_task_pending());
  assert!(dispatcher.enqueue(&func));
  assert!(platform.idle_task_pending());

  // Time is frozen, so the whole pipeline fits this slice.
  platform.run_idle_task(1000.0, 0.0);

  assert!(!dispatcher.is_enqueued(&func));
  assert!(func.is_compiled());
  assert!(!platform.idle_task_pending());
  assert!(!platform.background_tasks_pending());
}

// S2: a slice whose budget the first step consumes almost entirely.
#[test]
fn small_idle_slice_advances_one_step() {
  let (platform, dispatcher) = setup();
  let func = function("function f4(x) { return x * y; }");

  assert!(dispatcher.enqueue(&func));
  assert_eq!(
    dispatcher.job_status_for_testing(&func),
    Some(JobStatus::Initial)
  );

  // Budget 2.0 with the clock advancing 1.0 per query: one step, then out of time.
  platform.run_idle_task(2.0, 1.0);

  assert!(dispatcher.is_enqueued(&func));
  assert!(!func.is_compiled());
  assert!(platform.idle_task_pending());
  assert_eq!(
    dispatcher.job_status_for_testing(&func),
    Some(JobStatus::ReadyToParse)
  );

  // A generous slice with frozen time finishes the job.
  platform.run_idle_task(1000.0, 0.0);

  assert!(!dispatcher.is_enqueued(&func));
  assert!(func.is_compiled());
  assert!(!platform.idle_task_pending());
}

// S3: an oversized compile estimate moves the compile step to the background.
#[test]
fn expensive_compile_runs_on_background() {
  let (platform, dispatcher) = setup();
  let func = function("function f6(x) { return x * y; }");
  stage_background_compile(&platform, &dispatcher, &func);

  platform.run_background_tasks_and_block();

  assert!(platform.idle_task_pending());
  assert!(!platform.background_tasks_pending());
  assert_eq!(
    dispatcher.job_status_for_testing(&func),
    Some(JobStatus::Compiled)
  );

  platform.run_idle_task(1000.0, 0.0);

  assert!(!dispatcher.is_enqueued(&func));
  assert!(func.is_compiled());
  assert!(!platform.idle_task_pending());
}

// S4: finish_now racing the background compile step.
#[test]
fn finish_now_with_background_task_in_flight() {
  let (platform, dispatcher) = setup();
  let func = function("function f7(x) { return x * y; }");
  stage_background_compile(&platform, &dispatcher, &func);

  // Runs on a detached thread, racing the finish_now call below.
  platform.run_background_tasks();

  assert!(dispatcher.finish_now(&func));
  assert!(!dispatcher.is_enqueued(&func));
  assert!(func.is_compiled());
  if platform.idle_task_pending() {
    platform.clear_idle_task();
  }
  assert!(!platform.background_tasks_pending());
}

#[test]
fn nonblocking_abort_discards_job_pending_for_background() {
  let (platform, dispatcher) = setup();
  let func = function("function f11(x) { return x * y; }");
  stage_background_compile(&platform, &dispatcher, &func);

  // The background task has not started, so the job is discarded inline.
  dispatcher.abort_all(BlockingBehavior::DontBlock);
  assert!(!platform.foreground_tasks_pending());
  assert!(!dispatcher.is_enqueued(&func));
  assert!(!func.is_compiled());

  // The stale background task finds nothing to do.
  platform.run_background_tasks_and_block();
  if platform.idle_task_pending() {
    platform.clear_idle_task();
  }
  assert!(!platform.background_tasks_pending());
  assert!(!platform.foreground_tasks_pending());
}

// S5: non-blocking abort while a background step is mid-flight.
#[test]
fn nonblocking_abort_waits_out_running_background_step() {
  let (platform, dispatcher) = setup();
  let func = function("function f11(x) { return x * y; }");
  let func2 = function("function f12(x) { return x * y; }");
  stage_background_compile(&platform, &dispatcher, &func);

  // Kick the background task off and freeze it right after it reserves the job.
  dispatcher.block_background_for_testing();
  platform.run_background_tasks();
  while dispatcher.background_blocked_for_testing() {
    std::hint::spin_loop();
  }

  dispatcher.abort_all(BlockingBehavior::DontBlock);
  assert!(platform.foreground_tasks_pending());

  // No new work while aborting.
  assert!(!dispatcher.enqueue(&func2));

  // The abort task cannot finish while the worker holds the job; the job stays
  // observably enqueued.
  platform.run_foreground_tasks();
  assert!(dispatcher.is_aborting());
  assert!(dispatcher.is_enqueued(&func));

  dispatcher.release_background_for_testing();
  while dispatcher.is_aborting() {
    platform.run_foreground_tasks();
    std::hint::spin_loop();
  }
  assert!(!dispatcher.is_enqueued(&func));
  assert!(!func.is_compiled());

  // Aborting is over; enqueueing works again.
  assert!(dispatcher.enqueue(&func2));
  assert!(platform.idle_task_pending());
  platform.clear_idle_task();
  assert!(!platform.background_tasks_pending());
}

#[test]
fn finish_now_wins_during_abort() {
  let (platform, dispatcher) = setup();
  let func = function("function f13(x) { return x * y; }");
  stage_background_compile(&platform, &dispatcher, &func);

  dispatcher.block_background_for_testing();
  platform.run_background_tasks();
  while dispatcher.background_blocked_for_testing() {
    std::hint::spin_loop();
  }

  dispatcher.abort_all(BlockingBehavior::DontBlock);
  platform.run_foreground_tasks();
  assert!(dispatcher.is_aborting());
  assert!(dispatcher.is_enqueued(&func));

  dispatcher.release_background_for_testing();

  // Even mid-abort, a synchronous demand completes this one function.
  assert!(dispatcher.finish_now(&func));
  assert!(!dispatcher.is_enqueued(&func));
  assert!(func.is_compiled());

  while dispatcher.is_aborting() {
    platform.run_foreground_tasks();
    std::hint::spin_loop();
  }
  if platform.idle_task_pending() {
    platform.clear_idle_task();
  }
  platform.run_foreground_tasks();
  assert!(!platform.background_tasks_pending());
}

#[test]
fn one_slice_compiles_multiple_jobs() {
  let (platform, dispatcher) = setup();
  let func1 = function("function f8(x) { return x * y; }");
  let func2 = function("function f9(x) { return x * y; }");

  assert!(dispatcher.enqueue(&func1));
  assert!(dispatcher.enqueue(&func2));
  assert!(platform.idle_task_pending());

  platform.run_idle_task(1000.0, 0.0);

  assert!(!dispatcher.is_enqueued(&func1));
  assert!(!dispatcher.is_enqueued(&func2));
  assert!(func1.is_compiled());
  assert!(func2.is_compiled());
}

#[test]
fn multiple_jobs_compile_on_background() {
  let (platform, dispatcher) = setup();
  let func1 = function("function f19(x) { return x * y; }");
  let func2 = function("function f20(x) { return x * y; }");

  assert!(dispatcher.enqueue(&func1));
  assert!(dispatcher.enqueue(&func2));
  dispatcher.tracer().record(Stage::Compile, 50_000.0, 1);
  platform.run_idle_task(10.0, 0.0);

  assert_eq!(
    dispatcher.job_status_for_testing(&func1),
    Some(JobStatus::ReadyToCompile)
  );
  assert_eq!(
    dispatcher.job_status_for_testing(&func2),
    Some(JobStatus::ReadyToCompile)
  );
  assert!(!platform.idle_task_pending());
  assert!(platform.background_tasks_pending());

  platform.run_background_tasks_and_block();

  assert_eq!(
    dispatcher.job_status_for_testing(&func1),
    Some(JobStatus::Compiled)
  );
  assert_eq!(
    dispatcher.job_status_for_testing(&func2),
    Some(JobStatus::Compiled)
  );
  assert!(platform.idle_task_pending());

  platform.run_idle_task(1000.0, 0.0);

  assert!(func1.is_compiled());
  assert!(func2.is_compiled());
  assert!(!platform.idle_task_pending());
}

#[test]
fn finish_now_reports_parse_failure() {
  let (platform, dispatcher) = setup();
  let func = function("function f10( { }");

  assert!(dispatcher.enqueue(&func));
  assert!(!dispatcher.finish_now(&func));
  assert!(!dispatcher.is_enqueued(&func));
  assert!(!func.is_compiled());
  assert_eq!(dispatcher.telemetry().failed, 1);
  platform.clear_idle_task();
}

#[test]
fn idle_task_removes_job_that_fails_to_parse() {
  let (platform, dispatcher) = setup_with(DispatcherOptions {
    stack_size_kb: 50,
    ..Default::default()
  });
  let mut source = String::from("function f5(x) { var a = ");
  for _ in 0..1000 {
    source.push('(');
  }
  source.push('1');
  for _ in 0..1000 {
    source.push(')');
  }
  source.push_str("; }");
  let func = function(&source);

  assert!(dispatcher.enqueue(&func));
  platform.run_idle_task(1000.0, 0.0);

  assert!(!dispatcher.is_enqueued(&func));
  assert!(!func.is_compiled());
  assert_eq!(dispatcher.telemetry().failed, 1);
}

// S6: critical memory pressure refuses new work and cancels existing work.
#[test]
fn memory_pressure_refuses_and_cancels() {
  let (platform, dispatcher) = setup();
  let func = function("function f14(x) { return x * y; }");

  dispatcher.memory_pressure_notification(MemoryPressureLevel::Critical, true);
  assert!(!dispatcher.enqueue(&func));

  dispatcher.memory_pressure_notification(MemoryPressureLevel::None, true);
  assert!(dispatcher.enqueue(&func));

  dispatcher.memory_pressure_notification(MemoryPressureLevel::Critical, true);
  assert!(!dispatcher.is_enqueued(&func));
  platform.clear_idle_task();
}

#[test]
fn memory_pressure_from_background_aborts_via_foreground_task() {
  let (platform, dispatcher) = setup();
  let func = function("function f15(x) { return x * y; }");
  assert!(dispatcher.enqueue(&func));

  let worker = {
    let dispatcher = dispatcher.clone();
    std::thread::spawn(move || {
      dispatcher.memory_pressure_notification(MemoryPressureLevel::Critical, false);
    })
  };
  worker.join().unwrap();

  // Refusal is immediate; the cancellation runs with the posted foreground task.
  assert!(!dispatcher.enqueue(&function("function g() { return 1; }")));
  assert!(platform.foreground_tasks_pending());
  assert!(dispatcher.is_enqueued(&func));
  platform.run_foreground_tasks();
  assert!(!dispatcher.is_enqueued(&func));
  assert!(!func.is_compiled());
  assert!(!platform.foreground_tasks_pending());
  platform.clear_idle_task();
}

#[test]
fn enqueue_and_step_advances_and_considers_background() {
  let (platform, dispatcher) = setup();
  let func = function("function f16(x) { return x * y; }");

  assert!(!dispatcher.is_enqueued(&func));
  assert!(dispatcher.enqueue_and_step(&func));
  assert!(dispatcher.is_enqueued(&func));
  assert_eq!(
    dispatcher.job_status_for_testing(&func),
    Some(JobStatus::ReadyToParse)
  );

  assert!(platform.idle_task_pending());
  platform.clear_idle_task();
  // Parsing is background-eligible, so the inline step handed the job to a worker.
  assert!(platform.background_tasks_pending());
  platform.clear_background_tasks();
}

#[test]
fn enqueue_parsed_starts_at_analyzed() {
  let (platform, dispatcher) = setup();
  let func = function("function f17(x) { return x * y; }");
  let limits = CompileLimits::default();
  let ast = parse_function(func.source(), &limits).unwrap();
  let analysis = analyze(&ast).unwrap();

  assert!(dispatcher.enqueue_parsed(&func, ast, analysis));
  assert_eq!(
    dispatcher.job_status_for_testing(&func),
    Some(JobStatus::Analyzed)
  );
  assert!(platform.idle_task_pending());
  platform.clear_idle_task();
  assert!(!platform.background_tasks_pending());
}

#[test]
fn enqueue_and_step_parsed_reaches_ready_to_compile() {
  let (platform, dispatcher) = setup();
  let func = function("function f18(x) { return x * y; }");
  let limits = CompileLimits::default();
  let ast = parse_function(func.source(), &limits).unwrap();
  let analysis = analyze(&ast).unwrap();

  assert!(dispatcher.enqueue_and_step_parsed(&func, ast, analysis));
  assert_eq!(
    dispatcher.job_status_for_testing(&func),
    Some(JobStatus::ReadyToCompile)
  );
  assert!(platform.idle_task_pending());
  assert!(platform.background_tasks_pending());
  platform.clear_idle_task();
  platform.clear_background_tasks();
}

#[test]
fn disabled_dispatcher_refuses_work() {
  let (platform, dispatcher) = setup_with(DispatcherOptions {
    enabled: false,
    ..Default::default()
  });
  let func = function("function f(x) { return x; }");
  assert!(!dispatcher.enqueue(&func));
  assert!(!platform.idle_task_pending());
}

#[test]
fn zero_stack_budget_keeps_compile_off_workers() {
  let (platform, dispatcher) = setup_with(DispatcherOptions {
    stack_size_kb: 0,
    ..Default::default()
  });
  let func = function("function f(x) { return x * y; }");

  assert!(dispatcher.enqueue(&func));
  dispatcher.tracer().record(Stage::Compile, 50_000.0, 1);
  platform.run_idle_task(10.0, 0.0);

  // The compile step is too expensive for the slice but may not leave the
  // foreground; the job just waits for a bigger slice.
  assert_eq!(
    dispatcher.job_status_for_testing(&func),
    Some(JobStatus::ReadyToCompile)
  );
  assert!(!platform.background_tasks_pending());
  assert!(platform.idle_task_pending());

  assert!(dispatcher.finish_now(&func));
  assert!(func.is_compiled());
  platform.clear_idle_task();
}

#[test]
fn idle_task_over_empty_dispatcher_does_not_repost() {
  let (platform, dispatcher) = setup();
  let func = function("function f(x) { return x; }");

  assert!(dispatcher.enqueue(&func));
  dispatcher.abort_all(BlockingBehavior::Block);
  assert!(!dispatcher.is_enqueued(&func));

  // The idle task posted by the enqueue still sits with the platform; with no jobs
  // left it must not re-post itself.
  assert!(platform.idle_task_pending());
  platform.run_idle_task(10.0, 0.0);
  assert!(!platform.idle_task_pending());

  // And a fresh enqueue posts a fresh idle task.
  assert!(dispatcher.enqueue(&func));
  assert!(platform.idle_task_pending());
  platform.clear_idle_task();
}

#[test]
fn telemetry_counts_outcomes() {
  let (platform, dispatcher) = setup();
  let good = function("function a(x) { return x; }");
  let bad = function("function b( { }");
  let doomed = function("function c(x) { return x; }");

  assert!(dispatcher.enqueue(&good));
  platform.run_idle_task(1000.0, 0.0);
  assert!(dispatcher.enqueue(&bad));
  assert!(!dispatcher.finish_now(&bad));
  assert!(dispatcher.enqueue(&doomed));
  dispatcher.abort_all(BlockingBehavior::Block);

  let telemetry = dispatcher.telemetry();
  assert_eq!(telemetry.enqueued, 3);
  assert_eq!(telemetry.finished, 1);
  assert_eq!(telemetry.failed, 1);
  assert_eq!(telemetry.aborted, 1);
  if platform.idle_task_pending() {
    platform.clear_idle_task();
  }
}

#[test]
fn telemetry_reports_stage_averages() {
  let (_platform, dispatcher) = setup();
  dispatcher.tracer().record(Stage::Parse, 1.0, 10);
  let averages = dispatcher.telemetry().stage_averages;
  assert!((averages.parse - 0.1).abs() < 1e-9);
  assert_eq!(averages.analyze, 0.0);
}
