use crate::loc::Loc;
use crate::token::Token;
use crate::token::TT;
use ahash::HashMap;
use ahash::HashMapExt;
use memchr::memchr;
use memchr::memchr3;
use once_cell::sync::Lazy;

pub static KEYWORDS_MAPPING: Lazy<HashMap<&'static [u8], TT>> = Lazy::new(|| {
  let mut map = HashMap::new();
  map.insert(b"function".as_slice(), TT::KeywordFunction);
  map.insert(b"return".as_slice(), TT::KeywordReturn);
  map.insert(b"var".as_slice(), TT::KeywordVar);
  map
});

fn is_id_start(b: u8) -> bool {
  b.is_ascii_alphabetic() || b == b'_' || b == b'$'
}

fn is_id_continue(b: u8) -> bool {
  is_id_start(b) || b.is_ascii_digit()
}

pub struct Lexer<'a> {
  source: &'a [u8],
  next: usize,
}

impl<'a> Lexer<'a> {
  pub fn new(source: &'a str) -> Lexer<'a> {
    Lexer {
      source: source.as_bytes(),
      next: 0,
    }
  }

  fn peek_byte(&self) -> Option<u8> {
    self.source.get(self.next).copied()
  }

  fn skip_trivia(&mut self) {
    while let Some(b) = self.peek_byte() {
      match b {
        b' ' | b'\t' | b'\r' | b'\n' => self.next += 1,
        b'/' if self.source.get(self.next + 1) == Some(&b'/') => {
          match memchr(b'\n', &self.source[self.next..]) {
            Some(rel) => self.next += rel + 1,
            None => self.next = self.source.len(),
          }
        }
        _ => break,
      }
    }
  }

  fn lex_number(&mut self) -> Token {
    let start = self.next;
    while self.peek_byte().is_some_and(|b| b.is_ascii_digit()) {
      self.next += 1;
    }
    if self.peek_byte() == Some(b'.') {
      self.next += 1;
      while self.peek_byte().is_some_and(|b| b.is_ascii_digit()) {
        self.next += 1;
      }
    }
    // A number immediately followed by identifier characters (e.g. `1x`) is not a valid token
    // boundary; surface it as Invalid and let the parser report it.
    if self.peek_byte().is_some_and(is_id_start) {
      while self.peek_byte().is_some_and(is_id_continue) {
        self.next += 1;
      }
      return Token::new(Loc(start, self.next), TT::Invalid);
    }
    Token::new(Loc(start, self.next), TT::LiteralNumber)
  }

  fn lex_string(&mut self) -> Token {
    let start = self.next;
    self.next += 1;
    loop {
      let Some(rel) = memchr3(b'\'', b'\\', b'\n', &self.source[self.next..]) else {
        self.next = self.source.len();
        return Token::new(Loc(start, self.next), TT::Invalid);
      };
      match self.source[self.next + rel] {
        b'\'' => {
          self.next += rel + 1;
          return Token::new(Loc(start, self.next), TT::LiteralString);
        }
        b'\\' if self.next + rel + 1 < self.source.len() => self.next += rel + 2,
        _ => {
          // Line terminator or trailing backslash inside the literal.
          self.next += rel;
          return Token::new(Loc(start, self.next), TT::Invalid);
        }
      }
    }
  }

  fn lex_identifier_or_keyword(&mut self) -> Token {
    let start = self.next;
    while self.peek_byte().is_some_and(is_id_continue) {
      self.next += 1;
    }
    let tt = KEYWORDS_MAPPING
      .get(&self.source[start..self.next])
      .copied()
      .unwrap_or(TT::Identifier);
    Token::new(Loc(start, self.next), tt)
  }

  pub fn next_token(&mut self) -> Token {
    self.skip_trivia();
    let start = self.next;
    let Some(b) = self.peek_byte() else {
      return Token::new(Loc(start, start), TT::EOF);
    };
    let punct = match b {
      b'*' => Some(TT::Asterisk),
      b'}' => Some(TT::BraceClose),
      b'{' => Some(TT::BraceOpen),
      b',' => Some(TT::Comma),
      b'=' => Some(TT::Equals),
      b'-' => Some(TT::Hyphen),
      b')' => Some(TT::ParenClose),
      b'(' => Some(TT::ParenOpen),
      b'+' => Some(TT::Plus),
      b';' => Some(TT::Semicolon),
      b'/' => Some(TT::Slash),
      _ => None,
    };
    if let Some(tt) = punct {
      self.next += 1;
      return Token::new(Loc(start, self.next), tt);
    }
    if b.is_ascii_digit() {
      return self.lex_number();
    }
    if b == b'\'' {
      return self.lex_string();
    }
    if is_id_start(b) {
      return self.lex_identifier_or_keyword();
    }
    self.next += 1;
    Token::new(Loc(start, self.next), TT::Invalid)
  }
}
