use crate::analyze::analyze;
use crate::ast::FunctionLit;
use crate::codegen::generate;
use crate::codegen::CodeArtifact;
use crate::error::CompileResult;
use crate::function::SharedFunction;
use crate::parse::Parser;
use std::sync::Arc;

pub mod analyze;
pub mod ast;
pub mod codegen;
pub mod error;
pub mod function;
pub mod lex;
pub mod loc;
pub mod parse;
pub mod token;

/// Resource limits applied to a single compilation.
#[derive(Copy, Clone, Debug)]
pub struct CompileLimits {
  /// Stack budget in KiB; the parser maps it to an explicit recursion limit. Zero
  /// means "no worker hand-off, compile wherever the caller stands" and leaves the
  /// recursion budget unbounded.
  pub stack_size_kb: u32,
}

impl CompileLimits {
  pub fn max_parse_depth(&self) -> usize {
    if self.stack_size_kb == 0 {
      return usize::MAX;
    }
    // One frame per KiB of budget is conservative for this parser's frame sizes.
    self.stack_size_kb as usize
  }
}

impl Default for CompileLimits {
  fn default() -> Self {
    CompileLimits { stack_size_kb: 984 }
  }
}

/// Parses a standalone `function … ( … ) { … }` literal.
pub fn parse_function(source: &str, limits: &CompileLimits) -> CompileResult<FunctionLit> {
  Ok(Parser::new(source, limits.max_parse_depth()).parse_function()?)
}

/// Runs the whole parse → analyze → generate pipeline on the calling thread.
///
/// Does not install the result; the caller decides when (and on which context) to do
/// that.
///
/// # Examples
///
/// ```
/// use compile_js::function::{Script, SharedFunction};
/// use compile_js::{compile_function, CompileLimits};
///
/// let func = SharedFunction::covering(Script::new("function f(x) { return x * 2; }"));
/// let code = compile_function(&func, &CompileLimits::default()).unwrap();
/// assert_eq!(code.param_count, 1);
/// ```
pub fn compile_function(
  func: &SharedFunction,
  limits: &CompileLimits,
) -> CompileResult<Arc<CodeArtifact>> {
  let lit = parse_function(func.source(), limits)?;
  let analysis = analyze(&lit)?;
  Ok(Arc::new(generate(&lit, &analysis)?))
}
