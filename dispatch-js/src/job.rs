use crate::tracer::CompileTracer;
use crate::tracer::Stage;
use compile_js::analyze::analyze;
use compile_js::analyze::Analysis;
use compile_js::ast::FunctionLit;
use compile_js::codegen::generate;
use compile_js::codegen::CodeArtifact;
use compile_js::error::CompileError;
use compile_js::function::Script;
use compile_js::function::SharedFunction;
use compile_js::loc::Loc;
use compile_js::parse::Parser;
use compile_js::CompileLimits;
use std::sync::Arc;
use std::time::Instant;

/// Where a job is in its pipeline. Statuses only ever advance along
/// `Initial → ReadyToParse → Parsed → Analyzed → ReadyToCompile → Compiled → Done`,
/// with `Failed` reachable from any non-terminal status.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum JobStatus {
  Initial,
  ReadyToParse,
  Parsed,
  Analyzed,
  ReadyToCompile,
  Compiled,
  Done,
  Failed,
}

impl JobStatus {
  pub fn is_terminal(self) -> bool {
    matches!(self, JobStatus::Done | JobStatus::Failed)
  }
}

/// The self-contained input a background parse reads instead of the live function.
struct JobInput {
  script: Arc<Script>,
  span: Loc,
}

/// The compilation state machine for one function.
///
/// A job owns every intermediate artifact. The two background-eligible steps (parse
/// and compile) touch only job-owned buffers; the final step is the only one that
/// mutates the function, so it must run on the foreground.
pub struct CompileJob {
  function: Arc<SharedFunction>,
  limits: CompileLimits,
  status: JobStatus,
  input: Option<JobInput>,
  ast: Option<FunctionLit>,
  ast_size: usize,
  analysis: Option<Analysis>,
  code: Option<Arc<CodeArtifact>>,
  error: Option<CompileError>,
}

impl CompileJob {
  pub fn new(function: Arc<SharedFunction>, limits: CompileLimits) -> CompileJob {
    CompileJob {
      function,
      limits,
      status: JobStatus::Initial,
      input: None,
      ast: None,
      ast_size: 0,
      analysis: None,
      code: None,
      error: None,
    }
  }

  /// Entry path for callers that already parsed and analyzed the function; the job
  /// starts at `Analyzed` and skips the earlier steps.
  pub fn new_analyzed(
    function: Arc<SharedFunction>,
    limits: CompileLimits,
    ast: FunctionLit,
    analysis: Analysis,
  ) -> CompileJob {
    let ast_size = analysis.node_count;
    CompileJob {
      function,
      limits,
      status: JobStatus::Analyzed,
      input: None,
      ast: Some(ast),
      ast_size,
      analysis: Some(analysis),
      code: None,
      error: None,
    }
  }

  pub fn status(&self) -> JobStatus {
    self.status
  }

  pub fn failed(&self) -> bool {
    self.status == JobStatus::Failed
  }

  pub fn error(&self) -> Option<&CompileError> {
    self.error.as_ref()
  }

  pub fn function(&self) -> &Arc<SharedFunction> {
    &self.function
  }

  /// Whether the next step may run on a worker thread.
  pub fn next_step_can_run_on_background(&self) -> bool {
    matches!(self.status, JobStatus::ReadyToParse | JobStatus::ReadyToCompile)
  }

  /// Predicted duration of the next step in seconds.
  pub fn estimate_next_step(&self, tracer: &CompileTracer) -> f64 {
    match self.status {
      JobStatus::ReadyToParse => {
        let len = self.input.as_ref().map(|input| input.span.len()).unwrap_or(0);
        tracer.estimate(Stage::Parse, len)
      }
      JobStatus::Parsed => tracer.estimate(Stage::Analyze, self.ast_size),
      JobStatus::ReadyToCompile => tracer.estimate(Stage::Compile, self.ast_size),
      JobStatus::Compiled => tracer.estimate(Stage::Finalize, 1),
      // Resource setup and input freezing are bookkeeping, not compilation.
      JobStatus::Initial | JobStatus::Analyzed => 0.0,
      JobStatus::Done | JobStatus::Failed => 0.0,
    }
  }

  fn fail(&mut self, error: CompileError) {
    tracing::debug!(target: "dispatch_js", %error, "job failed");
    self.error = Some(error);
    self.status = JobStatus::Failed;
    self.input = None;
    self.ast = None;
    self.analysis = None;
    self.code = None;
  }

  /// Advances the job by exactly one step.
  ///
  /// Step durations are measured on the real clock; the platform clock only prices
  /// idle budget.
  pub fn step(&mut self, tracer: &CompileTracer) {
    let started = Instant::now();
    match self.status {
      JobStatus::Initial => {
        self.input = Some(JobInput {
          script: Arc::clone(self.function.script()),
          span: self.function.span(),
        });
        self.status = JobStatus::ReadyToParse;
      }
      JobStatus::ReadyToParse => {
        let input = self.input.as_ref().expect("input stream prepared");
        let source = &input.script.source()[input.span.0..input.span.1];
        match Parser::new(source, self.limits.max_parse_depth()).parse_function() {
          Ok(ast) => {
            tracer.record(Stage::Parse, started.elapsed().as_secs_f64(), source.len());
            self.ast_size = ast.node_count();
            self.ast = Some(ast);
            self.status = JobStatus::Parsed;
          }
          Err(err) => self.fail(err.into()),
        }
      }
      JobStatus::Parsed => {
        let ast = self.ast.as_ref().expect("parsed AST");
        match analyze(ast) {
          Ok(analysis) => {
            tracer.record(Stage::Analyze, started.elapsed().as_secs_f64(), self.ast_size);
            self.ast_size = analysis.node_count;
            self.analysis = Some(analysis);
            self.status = JobStatus::Analyzed;
          }
          Err(err) => self.fail(err),
        }
      }
      JobStatus::Analyzed => {
        // Inputs are frozen from here on: nothing after this step may look at the
        // live function until finalization.
        debug_assert!(self.ast.is_some() && self.analysis.is_some());
        self.input = None;
        self.status = JobStatus::ReadyToCompile;
      }
      JobStatus::ReadyToCompile => {
        let ast = self.ast.as_ref().expect("frozen AST");
        let analysis = self.analysis.as_ref().expect("frozen analysis");
        match generate(ast, analysis) {
          Ok(code) => {
            tracer.record(Stage::Compile, started.elapsed().as_secs_f64(), self.ast_size);
            self.code = Some(Arc::new(code));
            self.status = JobStatus::Compiled;
          }
          Err(err) => self.fail(err),
        }
      }
      JobStatus::Compiled => {
        let code = self.code.take().expect("compiled artifact");
        self.function.install(code);
        tracer.record(Stage::Finalize, started.elapsed().as_secs_f64(), 1);
        self.ast = None;
        self.analysis = None;
        self.status = JobStatus::Done;
      }
      JobStatus::Done | JobStatus::Failed => {
        debug_assert!(false, "stepping a terminal job");
      }
    }
  }
}
