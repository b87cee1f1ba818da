use crate::job::CompileJob;
use crate::platform::Platform;
use crate::tracer::CompileTracer;
use crate::tracer::StageAverages;
use crate::util::Semaphore;
use crate::DispatcherOptions;
use ahash::HashMap;
use ahash::HashMapExt;
use ahash::HashSet;
use ahash::HashSetExt;
use compile_js::analyze::Analysis;
use compile_js::ast::FunctionLit;
use compile_js::function::FunctionId;
use compile_js::function::SharedFunction;
use compile_js::CompileLimits;
use parking_lot::Condvar;
use parking_lot::Mutex;
use parking_lot::MutexGuard;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Whether a bulk abort may park the calling thread until in-flight background
/// steps drain.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum BlockingBehavior {
  Block,
  DontBlock,
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug)]
pub enum MemoryPressureLevel {
  None,
  Moderate,
  Critical,
}

/// Counter and timing snapshot for embedder telemetry.
#[derive(Copy, Clone, Default, Debug, PartialEq)]
pub struct DispatcherTelemetry {
  pub enqueued: u64,
  pub finished: u64,
  pub failed: u64,
  pub aborted: u64,
  pub stage_averages: StageAverages,
}

struct JobEntry {
  // Taken out while some context steps the job; possession of the value is what
  // makes concurrent steps of one job impossible.
  job: Option<CompileJob>,
  on_background: bool,
}

struct DispatcherState {
  jobs: HashMap<FunctionId, JobEntry>,
  // Jobs reserved for a posted background task that has not picked them up yet.
  pending_background: HashSet<FunctionId>,
  running_background: usize,
  aborting: bool,
  memory_pressure: bool,
  idle_task_posted: bool,
}

struct Inner {
  platform: Arc<dyn Platform>,
  tracer: CompileTracer,
  limits: CompileLimits,
  enabled: bool,
  state: Mutex<DispatcherState>,
  // Signals that a background step finished and its job is back in the table.
  step_done: Condvar,
  enqueued: AtomicU64,
  finished: AtomicU64,
  failed: AtomicU64,
  aborted: AtomicU64,
  block_for_testing: AtomicBool,
  semaphore_for_testing: Semaphore,
}

/// Schedules deferred compilation of enqueued functions across foreground idle time
/// and background workers.
///
/// All state lives behind one mutex; tasks posted to the platform capture a weak
/// reference and re-resolve it, so the dispatcher can be dropped with tasks still
/// queued. The foreground lane is assumed to be single-threaded: `finish_now`,
/// `abort_all` and the idle/abort tasks are foreground calls.
pub struct CompileDispatcher {
  inner: Arc<Inner>,
}

/// Dispatcher handles are cheap shared references to one underlying dispatcher.
impl Clone for CompileDispatcher {
  fn clone(&self) -> CompileDispatcher {
    CompileDispatcher {
      inner: Arc::clone(&self.inner),
    }
  }
}

impl CompileDispatcher {
  pub fn new(platform: Arc<dyn Platform>, options: DispatcherOptions) -> CompileDispatcher {
    CompileDispatcher {
      inner: Arc::new(Inner {
        platform,
        tracer: CompileTracer::new(options.trace),
        limits: CompileLimits {
          stack_size_kb: options.stack_size_kb,
        },
        enabled: options.enabled,
        state: Mutex::new(DispatcherState {
          jobs: HashMap::new(),
          pending_background: HashSet::new(),
          running_background: 0,
          aborting: false,
          memory_pressure: false,
          idle_task_posted: false,
        }),
        step_done: Condvar::new(),
        enqueued: AtomicU64::new(0),
        finished: AtomicU64::new(0),
        failed: AtomicU64::new(0),
        aborted: AtomicU64::new(0),
        block_for_testing: AtomicBool::new(false),
        semaphore_for_testing: Semaphore::new(0),
      }),
    }
  }

  /// Submits a function for deferred compilation. Fails without state change when
  /// the dispatcher is disabled, memory pressure is critical, a bulk abort is in
  /// progress, or the function is already enqueued.
  pub fn enqueue(&self, function: &Arc<SharedFunction>) -> bool {
    let job = CompileJob::new(Arc::clone(function), self.inner.limits);
    self.insert_job(function, job)
  }

  /// Submits a function whose parse and analysis were already produced by the
  /// caller; the job starts at `Analyzed`.
  pub fn enqueue_parsed(
    &self,
    function: &Arc<SharedFunction>,
    ast: FunctionLit,
    analysis: Analysis,
  ) -> bool {
    let job = CompileJob::new_analyzed(Arc::clone(function), self.inner.limits, ast, analysis);
    self.insert_job(function, job)
  }

  /// As [CompileDispatcher::enqueue], then advances the new job by one step on the
  /// calling thread and considers it for background processing.
  pub fn enqueue_and_step(&self, function: &Arc<SharedFunction>) -> bool {
    if !self.enqueue(function) {
      return false;
    }
    self.step_inline(function.id());
    true
  }

  /// As [CompileDispatcher::enqueue_parsed], plus one inline step.
  pub fn enqueue_and_step_parsed(
    &self,
    function: &Arc<SharedFunction>,
    ast: FunctionLit,
    analysis: Analysis,
  ) -> bool {
    if !self.enqueue_parsed(function, ast, analysis) {
      return false;
    }
    self.step_inline(function.id());
    true
  }

  pub fn is_enqueued(&self, function: &Arc<SharedFunction>) -> bool {
    self.inner.state.lock().jobs.contains_key(&function.id())
  }

  /// Compiles the function on the calling thread, right now.
  ///
  /// If the function is enqueued, the dispatcher takes the job over, waiting out an
  /// in-flight background step; otherwise a transient job runs the whole pipeline
  /// here. Either way the function is no longer enqueued afterwards, and a bulk
  /// abort in progress does not stop this one function from finishing. Returns
  /// whether compilation succeeded.
  pub fn finish_now(&self, function: &Arc<SharedFunction>) -> bool {
    let inner = &self.inner;
    let id = function.id();
    tracing::debug!(target: "dispatch_js", ?id, "finish now");
    let mut state = inner.state.lock();
    let job = loop {
      match state.jobs.get_mut(&id) {
        None => break None,
        Some(entry) => {
          if entry.on_background {
            inner.step_done.wait(&mut state);
            continue;
          }
          let job = entry.job.take();
          state.pending_background.remove(&id);
          break job;
        }
      }
    };
    drop(state);

    let (mut job, had_entry) = match job {
      Some(job) => (job, true),
      None => (CompileJob::new(Arc::clone(function), inner.limits), false),
    };
    while !job.status().is_terminal() {
      job.step(&inner.tracer);
    }
    let ok = !job.failed();

    let mut state = inner.state.lock();
    if had_entry {
      state.jobs.remove(&id);
      state.pending_background.remove(&id);
    }
    if ok {
      inner.finished.fetch_add(1, Ordering::Relaxed);
    } else {
      inner.failed.fetch_add(1, Ordering::Relaxed);
    }
    Inner::schedule_idle_task(inner, &mut state);
    ok
  }

  /// Cancels every enqueued job. Jobs whose background step is mid-flight are
  /// removed once that step drains: immediately (after parking) in blocking mode,
  /// via a posted abort task otherwise. While the abort is in progress `enqueue`
  /// fails; `finish_now` still wins for its function.
  pub fn abort_all(&self, blocking: BlockingBehavior) {
    Inner::abort_all(&self.inner, blocking);
  }

  /// On `Critical`, refuses new work until pressure drops and cancels current jobs;
  /// the cancellation runs inline when called from the foreground and is posted to
  /// the foreground otherwise. Lower levels clear the refusal.
  pub fn memory_pressure_notification(&self, level: MemoryPressureLevel, from_foreground: bool) {
    let inner = &self.inner;
    if level != MemoryPressureLevel::Critical {
      inner.state.lock().memory_pressure = false;
      return;
    }
    {
      let mut state = inner.state.lock();
      if state.memory_pressure {
        return;
      }
      state.memory_pressure = true;
    }
    tracing::debug!(target: "dispatch_js", from_foreground, "critical memory pressure");
    if from_foreground {
      Inner::abort_all(inner, BlockingBehavior::DontBlock);
    } else {
      let weak = Arc::downgrade(inner);
      inner.platform.post_foreground(Box::new(move || {
        if let Some(inner) = weak.upgrade() {
          Inner::abort_all(&inner, BlockingBehavior::DontBlock);
        }
      }));
    }
  }

  pub fn telemetry(&self) -> DispatcherTelemetry {
    let inner = &self.inner;
    DispatcherTelemetry {
      enqueued: inner.enqueued.load(Ordering::Relaxed),
      finished: inner.finished.load(Ordering::Relaxed),
      failed: inner.failed.load(Ordering::Relaxed),
      aborted: inner.aborted.load(Ordering::Relaxed),
      stage_averages: inner.tracer.averages(),
    }
  }

  /// The tracer pricing this dispatcher's stages. Exposed so embedders can seed
  /// estimates (and tests can force background hand-off).
  pub fn tracer(&self) -> &CompileTracer {
    &self.inner.tracer
  }

  #[doc(hidden)]
  pub fn is_aborting(&self) -> bool {
    self.inner.state.lock().aborting
  }

  /// The current status of an enqueued job, if it is not checked out by a worker.
  #[doc(hidden)]
  pub fn job_status_for_testing(
    &self,
    function: &Arc<SharedFunction>,
  ) -> Option<crate::job::JobStatus> {
    let state = self.inner.state.lock();
    state
      .jobs
      .get(&function.id())
      .and_then(|entry| entry.job.as_ref())
      .map(|job| job.status())
  }

  /// Makes the next background step park at its start until
  /// [CompileDispatcher::release_background_for_testing]. The flag clears once the
  /// step has reserved its job and parked.
  #[doc(hidden)]
  pub fn block_background_for_testing(&self) {
    self.inner.block_for_testing.store(true, Ordering::SeqCst);
  }

  #[doc(hidden)]
  pub fn background_blocked_for_testing(&self) -> bool {
    self.inner.block_for_testing.load(Ordering::SeqCst)
  }

  #[doc(hidden)]
  pub fn release_background_for_testing(&self) {
    self.inner.semaphore_for_testing.signal();
  }

  fn insert_job(&self, function: &Arc<SharedFunction>, job: CompileJob) -> bool {
    let inner = &self.inner;
    let id = function.id();
    let mut state = inner.state.lock();
    if !inner.enabled
      || state.memory_pressure
      || state.aborting
      || state.jobs.contains_key(&id)
    {
      return false;
    }
    tracing::debug!(target: "dispatch_js", ?id, status = ?job.status(), "enqueue");
    state.jobs.insert(id, JobEntry {
      job: Some(job),
      on_background: false,
    });
    inner.enqueued.fetch_add(1, Ordering::Relaxed);
    Inner::schedule_idle_task(inner, &mut state);
    true
  }

  /// One foreground step for a freshly inserted job, then background consideration.
  fn step_inline(&self, id: FunctionId) {
    let inner = &self.inner;
    let mut state = inner.state.lock();
    let Some(entry) = state.jobs.get_mut(&id) else {
      return;
    };
    debug_assert!(!entry.on_background);
    let Some(mut job) = entry.job.take() else {
      return;
    };
    drop(state);
    job.step(&inner.tracer);
    let mut state = inner.state.lock();
    if let Some(entry) = state.jobs.get_mut(&id) {
      entry.job = Some(job);
      Inner::consider_for_background(inner, &mut state, id);
    }
  }
}

impl Inner {
  /// Posts the idle task if none is outstanding and there is anything to do.
  fn schedule_idle_task(inner: &Arc<Inner>, state: &mut MutexGuard<DispatcherState>) {
    if state.idle_task_posted || state.jobs.is_empty() || !inner.platform.idle_enabled() {
      return;
    }
    state.idle_task_posted = true;
    let weak = Arc::downgrade(inner);
    inner.platform.post_idle(Box::new(move |deadline| {
      if let Some(inner) = weak.upgrade() {
        Inner::do_idle_work(&inner, deadline);
      }
    }));
  }

  /// Reserves the job for a worker and posts one background task for it.
  fn consider_for_background(
    inner: &Arc<Inner>,
    state: &mut MutexGuard<DispatcherState>,
    id: FunctionId,
  ) {
    if inner.limits.stack_size_kb == 0 || inner.platform.background_threads() == 0 {
      return;
    }
    let Some(entry) = state.jobs.get(&id) else {
      return;
    };
    let Some(job) = entry.job.as_ref() else {
      return;
    };
    if !job.next_step_can_run_on_background() {
      return;
    }
    if !state.pending_background.insert(id) {
      return;
    }
    tracing::trace!(target: "dispatch_js", ?id, "job handed to background");
    let weak = Arc::downgrade(inner);
    inner.platform.post_background(Box::new(move || {
      if let Some(inner) = weak.upgrade() {
        Inner::do_background_work(&inner);
      }
    }));
  }

  /// Body of one background task: runs a single step of some reserved job.
  fn do_background_work(inner: &Arc<Inner>) {
    let picked = {
      let mut state = inner.state.lock();
      let id = state.pending_background.iter().next().copied();
      match id {
        None => None,
        Some(id) => {
          state.pending_background.remove(&id);
          let entry = state.jobs.get_mut(&id).expect("reserved job is in the table");
          let job = entry.job.take().expect("reserved job is not checked out");
          entry.on_background = true;
          state.running_background += 1;
          Some((id, job))
        }
      }
    };
    // The foreground may have stolen the job back or aborted it before this task
    // ran; in that case there is nothing to do.
    let Some((id, mut job)) = picked else {
      return;
    };
    if inner.block_for_testing.swap(false, Ordering::SeqCst) {
      inner.semaphore_for_testing.wait();
    }
    job.step(&inner.tracer);

    let mut state = inner.state.lock();
    let entry = state.jobs.get_mut(&id).expect("job entry survives its background step");
    entry.job = Some(job);
    entry.on_background = false;
    state.running_background -= 1;
    inner.step_done.notify_all();
    if state.aborting {
      Inner::post_abort_task(inner);
    } else {
      Inner::schedule_idle_task(inner, &mut state);
    }
  }

  /// Body of the idle task: advance jobs on the foreground while budget remains,
  /// handing oversized background-eligible steps to workers.
  fn do_idle_work(inner: &Arc<Inner>, deadline: f64) {
    let mut state = inner.state.lock();
    state.idle_task_posted = false;
    if state.aborting {
      return;
    }
    let ids: Vec<FunctionId> = state.jobs.keys().copied().collect();
    'jobs: for id in ids {
      loop {
        let (reserved, terminal) = match state.jobs.get(&id) {
          None => break,
          Some(entry) => (
            entry.on_background || entry.job.is_none(),
            entry.job.as_ref().is_some_and(|job| job.status().is_terminal()),
          ),
        };
        if reserved {
          break;
        }
        if terminal {
          Inner::remove_terminal_job(inner, &mut state, id);
          break;
        }
        let now = inner.platform.monotonic_now();
        let remaining = deadline - now;
        if remaining <= 0.0 {
          break 'jobs;
        }
        let (too_expensive, background_eligible) = {
          let entry = state.jobs.get(&id).expect("entry checked above");
          let job = entry.job.as_ref().expect("job checked above");
          (
            job.estimate_next_step(&inner.tracer) > remaining,
            job.next_step_can_run_on_background(),
          )
        };
        if too_expensive {
          if background_eligible {
            Inner::consider_for_background(inner, &mut state, id);
          }
          break;
        }
        // Cheap enough for this slice; run it here even if a worker was lined up.
        state.pending_background.remove(&id);
        let mut job = state
          .jobs
          .get_mut(&id)
          .expect("entry checked above")
          .job
          .take()
          .expect("job checked above");
        drop(state);
        job.step(&inner.tracer);
        state = inner.state.lock();
        match state.jobs.get_mut(&id) {
          // The job was cancelled while being stepped; drop its buffers.
          None => break,
          Some(entry) => entry.job = Some(job),
        }
      }
    }
    let pending = &state.pending_background;
    let advanceable = state
      .jobs
      .iter()
      .any(|(id, entry)| !entry.on_background && !pending.contains(id));
    if advanceable {
      Inner::schedule_idle_task(inner, &mut state);
    }
  }

  fn remove_terminal_job(inner: &Inner, state: &mut MutexGuard<DispatcherState>, id: FunctionId) {
    let Some(entry) = state.jobs.remove(&id) else {
      return;
    };
    state.pending_background.remove(&id);
    match entry.job {
      Some(job) if job.failed() => {
        tracing::debug!(target: "dispatch_js", ?id, error = ?job.error(), "job removed after failure");
        inner.failed.fetch_add(1, Ordering::Relaxed);
      }
      Some(_) => {
        inner.finished.fetch_add(1, Ordering::Relaxed);
      }
      None => {}
    }
  }

  fn abort_all(inner: &Arc<Inner>, blocking: BlockingBehavior) {
    let mut state = inner.state.lock();
    tracing::debug!(
      target: "dispatch_js",
      jobs = state.jobs.len(),
      running = state.running_background,
      ?blocking,
      "abort all"
    );
    Inner::discard_unreserved_jobs(inner, &mut state);
    if state.running_background == 0 {
      // Anything left is held by a finish_now call, which removes it itself.
      debug_assert!(state.jobs.values().all(|entry| entry.job.is_none()));
      return;
    }
    state.aborting = true;
    match blocking {
      BlockingBehavior::Block => {
        while state.running_background > 0 {
          inner.step_done.wait(&mut state);
        }
        Inner::discard_unreserved_jobs(inner, &mut state);
        state.aborting = false;
      }
      BlockingBehavior::DontBlock => {
        Inner::post_abort_task(inner);
      }
    }
  }

  /// Removes every job no step currently holds. Never-installed work has no
  /// externally visible effect, so discarding is all cancellation takes. An entry
  /// whose job is checked out — by a background step or by an in-flight
  /// `finish_now` — is left alone; its holder decides the job's outcome.
  fn discard_unreserved_jobs(inner: &Inner, state: &mut MutexGuard<DispatcherState>) {
    let before = state.jobs.len();
    state.jobs.retain(|_, entry| entry.on_background || entry.job.is_none());
    state.pending_background.clear();
    let discarded = (before - state.jobs.len()) as u64;
    inner.aborted.fetch_add(discarded, Ordering::Relaxed);
  }

  fn post_abort_task(inner: &Arc<Inner>) {
    let weak = Arc::downgrade(inner);
    inner.platform.post_foreground(Box::new(move || {
      let Some(inner) = weak.upgrade() else {
        return;
      };
      let mut state = inner.state.lock();
      if !state.aborting {
        return;
      }
      if state.running_background > 0 {
        // Still racing a worker; try again after it drains.
        Inner::post_abort_task(&inner);
        return;
      }
      Inner::discard_unreserved_jobs(&inner, &mut state);
      state.aborting = false;
    }));
  }
}
