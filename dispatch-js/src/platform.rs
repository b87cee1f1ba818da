use parking_lot::Mutex;

/// A task for parallel execution on a worker thread.
pub type BackgroundTask = Box<dyn FnOnce() + Send + 'static>;
/// A task for the foreground context.
pub type ForegroundTask = Box<dyn FnOnce() + Send + 'static>;
/// A task run during foreground idle periods; receives a monotonic deadline in
/// seconds.
pub type IdleTask = Box<dyn FnOnce(f64) + Send + 'static>;

/// The host scheduling surface the dispatcher programs against.
///
/// Posting is non-blocking and FIFO within a lane; there is no ordering between
/// lanes. The foreground lane belongs to the single thread that owns the script
/// functions; only it may install compiled code.
pub trait Platform: Send + Sync + 'static {
  fn post_background(&self, task: BackgroundTask);
  fn post_foreground(&self, task: ForegroundTask);
  fn post_idle(&self, task: IdleTask);
  fn idle_enabled(&self) -> bool {
    true
  }
  /// Monotonically increasing time in seconds. Idle deadlines are expressed on this
  /// clock.
  fn monotonic_now(&self) -> f64;
  /// How many workers serve the background lane. Zero disables background hand-off.
  fn background_threads(&self) -> usize {
    1
  }
}

#[derive(Default)]
struct MockState {
  time: f64,
  time_step: f64,
  idle: Option<IdleTask>,
  foreground: Vec<ForegroundTask>,
  background: Vec<BackgroundTask>,
}

/// A deterministic [Platform] for tests and examples.
///
/// Holds at most one idle task, queues foreground and background tasks, and advances
/// its virtual clock by a fixed step on every [Platform::monotonic_now] call; tests
/// drive each lane explicitly.
#[derive(Default)]
pub struct MockPlatform {
  state: Mutex<MockState>,
}

impl MockPlatform {
  pub fn new() -> MockPlatform {
    MockPlatform::default()
  }

  /// Runs the posted idle task with the given absolute deadline, advancing the
  /// virtual clock by `time_step` per `monotonic_now` call.
  pub fn run_idle_task(&self, deadline: f64, time_step: f64) {
    let task = {
      let mut state = self.state.lock();
      state.time_step = time_step;
      state.idle.take().expect("no idle task posted")
    };
    task(deadline);
  }

  pub fn idle_task_pending(&self) -> bool {
    self.state.lock().idle.is_some()
  }

  pub fn foreground_tasks_pending(&self) -> bool {
    !self.state.lock().foreground.is_empty()
  }

  pub fn background_tasks_pending(&self) -> bool {
    !self.state.lock().background.is_empty()
  }

  /// Runs the currently queued foreground tasks on the calling thread. Tasks posted
  /// while this batch runs stay queued for the next call.
  pub fn run_foreground_tasks(&self) {
    let tasks = std::mem::take(&mut self.state.lock().foreground);
    for task in tasks {
      task();
    }
  }

  /// Runs the queued background tasks on a worker thread and waits for them.
  pub fn run_background_tasks_and_block(&self) {
    let tasks = std::mem::take(&mut self.state.lock().background);
    std::thread::spawn(move || {
      for task in tasks {
        task();
      }
    })
    .join()
    .expect("background worker panicked");
  }

  /// Runs the queued background tasks on a detached worker thread, racing the
  /// caller.
  pub fn run_background_tasks(&self) {
    let tasks = std::mem::take(&mut self.state.lock().background);
    std::thread::spawn(move || {
      for task in tasks {
        task();
      }
    });
  }

  pub fn clear_idle_task(&self) {
    let task = self.state.lock().idle.take();
    assert!(task.is_some(), "no idle task to clear");
  }

  pub fn clear_foreground_tasks(&self) {
    self.state.lock().foreground.clear();
  }

  pub fn clear_background_tasks(&self) {
    self.state.lock().background.clear();
  }
}

impl Platform for MockPlatform {
  fn post_background(&self, task: BackgroundTask) {
    self.state.lock().background.push(task);
  }

  fn post_foreground(&self, task: ForegroundTask) {
    self.state.lock().foreground.push(task);
  }

  fn post_idle(&self, task: IdleTask) {
    let mut state = self.state.lock();
    debug_assert!(state.idle.is_none(), "idle task already posted");
    state.idle = Some(task);
  }

  fn monotonic_now(&self) -> f64 {
    let mut state = self.state.lock();
    state.time += state.time_step;
    state.time
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::AtomicUsize;
  use std::sync::atomic::Ordering;
  use std::sync::Arc;

  #[test]
  fn clock_advances_per_query() {
    let platform = MockPlatform::new();
    platform.state.lock().time_step = 1.0;
    assert_eq!(platform.monotonic_now(), 1.0);
    assert_eq!(platform.monotonic_now(), 2.0);
  }

  #[test]
  fn idle_task_runs_with_deadline() {
    let platform = MockPlatform::new();
    let seen = Arc::new(AtomicUsize::new(0));
    let task_seen = Arc::clone(&seen);
    platform.post_idle(Box::new(move |deadline| {
      task_seen.store(deadline as usize, Ordering::SeqCst);
    }));
    assert!(platform.idle_task_pending());
    platform.run_idle_task(7.0, 0.0);
    assert!(!platform.idle_task_pending());
    assert_eq!(seen.load(Ordering::SeqCst), 7);
  }

  #[test]
  fn foreground_batches_do_not_chain() {
    let platform = Arc::new(MockPlatform::new());
    let count = Arc::new(AtomicUsize::new(0));
    let inner_count = Arc::clone(&count);
    let inner_platform = Arc::clone(&platform);
    platform.post_foreground(Box::new(move || {
      inner_count.fetch_add(1, Ordering::SeqCst);
      let chained = Arc::clone(&inner_count);
      inner_platform.post_foreground(Box::new(move || {
        chained.fetch_add(1, Ordering::SeqCst);
      }));
    }));
    platform.run_foreground_tasks();
    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert!(platform.foreground_tasks_pending());
    platform.run_foreground_tasks();
    assert_eq!(count.load(Ordering::SeqCst), 2);
  }
}
