use crate::loc::Loc;
use serde::Serialize;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize)]
pub enum TT {
  // Special token used to represent the end of the source code. Easier than using and handling
  // Option everywhere.
  EOF,
  // Special token used to represent invalid source code. Easier than having to propagate errors
  // from the lexer level, which would make even peeking during parsing require error handling.
  Invalid,

  Asterisk,
  BraceClose,
  BraceOpen,
  Comma,
  Equals,
  Hyphen,
  Identifier,
  KeywordFunction,
  KeywordReturn,
  KeywordVar,
  LiteralNumber,
  LiteralString,
  ParenClose,
  ParenOpen,
  Plus,
  Semicolon,
  Slash,
}

#[derive(Copy, Clone, Debug)]
pub struct Token {
  pub loc: Loc,
  pub tt: TT,
}

impl Token {
  pub fn new(loc: Loc, tt: TT) -> Token {
    Token { loc, tt }
  }
}
