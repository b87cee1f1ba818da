use compile_js::function::{Script, SharedFunction};
use dispatch_js::{CompileDispatcher, DispatcherOptions, NativePlatform, Platform};
use std::sync::Arc;

const SOURCE: &str = "function area(w, h) { return w * h; }";

fn main() {
  let platform = Arc::new(NativePlatform::new(2, 0));
  let dispatcher = CompileDispatcher::new(
    Arc::clone(&platform) as Arc<dyn Platform>,
    DispatcherOptions::default(),
  );

  let function = SharedFunction::covering(Script::new(SOURCE));
  dispatcher.enqueue(&function);

  // Let deferred compilation make whatever progress it can, then demand the rest.
  platform.pump_idle(0.001);
  let ok = dispatcher.finish_now(&function);
  println!("compiled: {ok}");
  if let Some(code) = function.code() {
    println!("ops: {}", code.ops.len());
    println!("locals: {}", code.local_count);
  }

  let telemetry = dispatcher.telemetry();
  println!(
    "enqueued={} finished={} failed={}",
    telemetry.enqueued, telemetry.finished, telemetry.failed
  );
}
