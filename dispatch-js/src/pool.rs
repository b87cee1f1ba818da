use crate::platform::BackgroundTask;
use crate::platform::ForegroundTask;
use crate::platform::IdleTask;
use crate::platform::Platform;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Instant;

/// A [Platform] for embedders without a host event loop of their own.
///
/// Background tasks run on a rayon pool. Foreground and idle tasks queue up until
/// the owning thread pumps them with [NativePlatform::pump_foreground] and
/// [NativePlatform::pump_idle]; the pumping thread is thereby the foreground
/// context.
pub struct NativePlatform {
  pool: rayon::ThreadPool,
  queues: Mutex<TaskQueues>,
  epoch: Instant,
}

#[derive(Default)]
struct TaskQueues {
  foreground: VecDeque<ForegroundTask>,
  idle: VecDeque<IdleTask>,
}

impl NativePlatform {
  /// `threads` workers for the background lane (0 picks a core-count default),
  /// each with `stack_size_kb` KiB of stack (0 keeps the pool's default).
  pub fn new(threads: usize, stack_size_kb: usize) -> NativePlatform {
    let threads = if threads == 0 {
      num_cpus::get().saturating_sub(1).max(1)
    } else {
      threads
    };
    let mut builder = rayon::ThreadPoolBuilder::new().num_threads(threads);
    if stack_size_kb > 0 {
      builder = builder.stack_size(stack_size_kb * 1024);
    }
    NativePlatform {
      pool: builder.build().expect("failed to build worker pool"),
      queues: Mutex::new(TaskQueues::default()),
      epoch: Instant::now(),
    }
  }

  /// Runs the queued foreground tasks on the calling thread; returns how many ran.
  pub fn pump_foreground(&self) -> usize {
    let tasks = std::mem::take(&mut self.queues.lock().foreground);
    let count = tasks.len();
    for task in tasks {
      task();
    }
    count
  }

  /// Runs the queued idle tasks on the calling thread, giving each a deadline of
  /// now + `budget` seconds; returns how many ran.
  pub fn pump_idle(&self, budget: f64) -> usize {
    let tasks = std::mem::take(&mut self.queues.lock().idle);
    let count = tasks.len();
    for task in tasks {
      task(self.monotonic_now() + budget);
    }
    count
  }

  pub fn has_queued_tasks(&self) -> bool {
    let queues = self.queues.lock();
    !queues.foreground.is_empty() || !queues.idle.is_empty()
  }
}

impl Platform for NativePlatform {
  fn post_background(&self, task: BackgroundTask) {
    self.pool.spawn(task);
  }

  fn post_foreground(&self, task: ForegroundTask) {
    self.queues.lock().foreground.push_back(task);
  }

  fn post_idle(&self, task: IdleTask) {
    self.queues.lock().idle.push_back(task);
  }

  fn monotonic_now(&self) -> f64 {
    self.epoch.elapsed().as_secs_f64()
  }

  fn background_threads(&self) -> usize {
    self.pool.current_num_threads()
  }
}
