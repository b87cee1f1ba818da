//! Deferred compilation dispatcher.
//!
//! Functions are enqueued as jobs that advance through a fixed pipeline
//! (parse, analyze, compile, finalize) using leftover foreground idle time and
//! background workers, whichever the timing tracer predicts will fit. Embedders can
//! demand a result synchronously ([CompileDispatcher::finish_now]), cancel
//! everything ([CompileDispatcher::abort_all]), or let memory pressure do so.

pub mod dispatcher;
pub mod job;
pub mod platform;
pub mod pool;
pub mod tracer;
mod util;

pub use dispatcher::BlockingBehavior;
pub use dispatcher::CompileDispatcher;
pub use dispatcher::DispatcherTelemetry;
pub use dispatcher::MemoryPressureLevel;
pub use job::JobStatus;
pub use platform::MockPlatform;
pub use platform::Platform;
pub use pool::NativePlatform;
pub use tracer::CompileTracer;
pub use tracer::Stage;

/// Construction-time configuration; the dispatcher keeps no global state.
#[derive(Copy, Clone, Debug)]
pub struct DispatcherOptions {
  /// Master switch; when off every enqueue fails.
  pub enabled: bool,
  /// Stack budget for compilation steps in KiB; zero disables background hand-off
  /// entirely.
  pub stack_size_kb: u32,
  /// Log recorded stage timings.
  pub trace: bool,
}

impl Default for DispatcherOptions {
  fn default() -> Self {
    DispatcherOptions {
      enabled: true,
      stack_size_kb: 984,
      trace: false,
    }
  }
}
