use crate::loc::Loc;
use crate::token::TT;
use core::fmt;
use core::fmt::Debug;
use core::fmt::Formatter;
use std::error::Error;
use std::fmt::Display;

/// A stable classification of syntax errors produced by the lexer and parser.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum SyntaxErrorType {
  ExpectedSyntax(&'static str),
  NestingTooDeep,
  RequiredTokenNotFound(TT),
  UnexpectedEnd,
  UnterminatedString,
}

#[derive(Clone)]
pub struct SyntaxError {
  pub typ: SyntaxErrorType,
  pub loc: Loc,
  pub actual_token: Option<TT>,
}

impl SyntaxError {
  pub fn new(typ: SyntaxErrorType, loc: Loc, actual_token: Option<TT>) -> SyntaxError {
    SyntaxError {
      typ,
      loc,
      actual_token,
    }
  }
}

impl Debug for SyntaxError {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    write!(f, "{} around loc [{}:{}]", self, self.loc.0, self.loc.1)
  }
}

impl Display for SyntaxError {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    write!(f, "{:?} [token={:?}]", self.typ, self.actual_token)
  }
}

impl Error for SyntaxError {}

impl PartialEq for SyntaxError {
  fn eq(&self, other: &Self) -> bool {
    self.typ == other.typ
  }
}

impl Eq for SyntaxError {}

pub type SyntaxResult<T> = Result<T, SyntaxError>;

impl SyntaxErrorType {
  /// Human-readable message describing this syntax error.
  pub fn message(&self) -> String {
    match self {
      SyntaxErrorType::ExpectedSyntax(expected) => format!("expected {}", expected),
      SyntaxErrorType::NestingTooDeep => "expression nesting exceeds the stack budget".into(),
      SyntaxErrorType::RequiredTokenNotFound(token) => format!("expected token {:?}", token),
      SyntaxErrorType::UnexpectedEnd => "unexpected end of input".into(),
      SyntaxErrorType::UnterminatedString => "unterminated string literal".into(),
    }
  }
}

/// Any failure of the parse → analyze → generate pipeline.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum CompileError {
  Syntax(SyntaxError),
  DuplicateParameter { name: String, loc: Loc },
  TooManyConstants(Loc),
  TooManyLocals(Loc),
}

impl Display for CompileError {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    match self {
      CompileError::Syntax(err) => Display::fmt(err, f),
      CompileError::DuplicateParameter { name, .. } => {
        write!(f, "duplicate parameter name `{}`", name)
      }
      CompileError::TooManyConstants(_) => write!(f, "constant pool exceeds u16 index space"),
      CompileError::TooManyLocals(_) => write!(f, "local slots exceed u16 index space"),
    }
  }
}

impl Error for CompileError {}

impl From<SyntaxError> for CompileError {
  fn from(err: SyntaxError) -> Self {
    CompileError::Syntax(err)
  }
}

pub type CompileResult<T> = Result<T, CompileError>;
