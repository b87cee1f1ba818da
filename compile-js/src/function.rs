use crate::codegen::CodeArtifact;
use crate::loc::Loc;
use once_cell::sync::OnceCell;
use std::fmt;
use std::fmt::Debug;
use std::fmt::Formatter;
use std::sync::Arc;

/// A script owned by the host. Functions reference a byte range of its source.
#[derive(Debug)]
pub struct Script {
  source: Arc<str>,
}

impl Script {
  pub fn new(source: impl Into<Arc<str>>) -> Arc<Script> {
    Arc::new(Script {
      source: source.into(),
    })
  }

  pub fn source(&self) -> &str {
    &self.source
  }
}

/// Identity of a [SharedFunction], derived from its allocation.
///
/// Stable for as long as the host keeps the function alive, which it must while the
/// function is enqueued anywhere.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct FunctionId(usize);

/// The per-function host object compilation is keyed on.
///
/// The compiled-code slot can be installed at most once; the installer is expected to
/// be the foreground context.
pub struct SharedFunction {
  script: Arc<Script>,
  span: Loc,
  code: OnceCell<Arc<CodeArtifact>>,
}

impl SharedFunction {
  pub fn new(script: Arc<Script>, span: Loc) -> Arc<SharedFunction> {
    debug_assert!(span.1 <= script.source().len() && span.0 <= span.1);
    Arc::new(SharedFunction {
      script,
      span,
      code: OnceCell::new(),
    })
  }

  /// A function covering the entire script source.
  pub fn covering(script: Arc<Script>) -> Arc<SharedFunction> {
    let span = Loc(0, script.source().len());
    SharedFunction::new(script, span)
  }

  pub fn id(self: &Arc<Self>) -> FunctionId {
    FunctionId(Arc::as_ptr(self) as usize)
  }

  pub fn script(&self) -> &Arc<Script> {
    &self.script
  }

  pub fn span(&self) -> Loc {
    self.span
  }

  /// The function's slice of the script source.
  pub fn source(&self) -> &str {
    &self.script.source()[self.span.0..self.span.1]
  }

  pub fn is_compiled(&self) -> bool {
    self.code.get().is_some()
  }

  /// Establishes the compilation result. Returns whether this call installed it; at
  /// most one install can ever succeed.
  pub fn install(&self, code: Arc<CodeArtifact>) -> bool {
    self.code.set(code).is_ok()
  }

  pub fn code(&self) -> Option<&Arc<CodeArtifact>> {
    self.code.get()
  }
}

impl Debug for SharedFunction {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    f.debug_struct("SharedFunction")
      .field("span", &self.span)
      .field("compiled", &self.is_compiled())
      .finish()
  }
}
