use parking_lot::Mutex;
use std::collections::VecDeque;

/// How many recent observations each stage keeps.
const SAMPLE_WINDOW: usize = 64;

/// With no compile observations yet, assume a compile step costs this many seconds.
/// Realistic idle slices are far shorter, so an unmeasured compile is handed to the
/// background; an effectively unbounded budget still runs it inline.
const DEFAULT_COMPILE_ESTIMATE: f64 = 1.0;

/// The pipeline stages whose durations are worth predicting.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum Stage {
  Parse,
  Analyze,
  Compile,
  Finalize,
}

impl Stage {
  fn index(self) -> usize {
    match self {
      Stage::Parse => 0,
      Stage::Analyze => 1,
      Stage::Compile => 2,
      Stage::Finalize => 3,
    }
  }
}

#[derive(Default)]
struct StageSamples {
  // (seconds, size units) pairs, newest at the back.
  samples: VecDeque<(f64, usize)>,
}

impl StageSamples {
  fn record(&mut self, seconds: f64, size: usize) {
    if self.samples.len() == SAMPLE_WINDOW {
      self.samples.pop_front();
    }
    self.samples.push_back((seconds, size));
  }

  /// Average seconds per size unit over the window.
  fn per_unit(&self) -> Option<f64> {
    if self.samples.is_empty() {
      return None;
    }
    let total: f64 = self.samples.iter().map(|(seconds, _)| seconds).sum();
    let units: usize = self.samples.iter().map(|(_, size)| (*size).max(1)).sum();
    Some(total / units as f64)
  }
}

/// Average per-unit stage durations, as exposed through telemetry.
#[derive(Copy, Clone, Default, Debug, PartialEq)]
pub struct StageAverages {
  pub parse: f64,
  pub analyze: f64,
  pub compile: f64,
  pub finalize: f64,
}

/// Records observed stage durations and predicts whether a stage fits an idle
/// budget.
pub struct CompileTracer {
  stages: Mutex<[StageSamples; 4]>,
  trace: bool,
}

impl CompileTracer {
  pub fn new(trace: bool) -> CompileTracer {
    CompileTracer {
      stages: Mutex::new(Default::default()),
      trace,
    }
  }

  /// Appends an observation. `size` is stage-specific: source bytes for parse, AST
  /// nodes for analyze and compile, 1 for finalize.
  pub fn record(&self, stage: Stage, seconds: f64, size: usize) {
    if self.trace {
      tracing::debug!(target: "dispatch_js", ?stage, seconds, size, "stage timing");
    }
    self.stages.lock()[stage.index()].record(seconds, size);
  }

  /// A conservative prediction of how long the stage will take for `size` units.
  pub fn estimate(&self, stage: Stage, size: usize) -> f64 {
    let per_unit = self.stages.lock()[stage.index()].per_unit();
    match per_unit {
      Some(per_unit) => per_unit * size.max(1) as f64,
      None if stage == Stage::Compile => DEFAULT_COMPILE_ESTIMATE,
      None => 0.0,
    }
  }

  /// Whether the stage is predicted to finish within `remaining` seconds.
  pub fn fits(&self, stage: Stage, size: usize, remaining: f64) -> bool {
    self.estimate(stage, size) <= remaining
  }

  pub fn averages(&self) -> StageAverages {
    let stages = self.stages.lock();
    let avg = |stage: Stage| stages[stage.index()].per_unit().unwrap_or(0.0);
    StageAverages {
      parse: avg(Stage::Parse),
      analyze: avg(Stage::Analyze),
      compile: avg(Stage::Compile),
      finalize: avg(Stage::Finalize),
    }
  }
}
