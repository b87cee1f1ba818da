use crate::ast::BinOp;
use crate::ast::Expr;
use crate::ast::FunctionLit;
use crate::ast::Node;
use crate::ast::Stmt;
use crate::error::SyntaxErrorType;
use crate::error::SyntaxResult;
use crate::lex::Lexer;
use crate::loc::Loc;
use crate::token::Token;
use crate::token::TT;

pub struct Parser<'a> {
  source: &'a str,
  lexer: Lexer<'a>,
  peeked: Option<Token>,
  depth: usize,
  max_depth: usize,
}

impl<'a> Parser<'a> {
  pub fn new(source: &'a str, max_depth: usize) -> Parser<'a> {
    Parser {
      source,
      lexer: Lexer::new(source),
      peeked: None,
      depth: 0,
      max_depth,
    }
  }

  fn peek(&mut self) -> Token {
    match self.peeked {
      Some(token) => token,
      None => {
        let token = self.lexer.next_token();
        self.peeked = Some(token);
        token
      }
    }
  }

  fn consume(&mut self) -> Token {
    let token = self.peek();
    self.peeked = None;
    token
  }

  fn require(&mut self, tt: TT) -> SyntaxResult<Token> {
    let token = self.consume();
    if token.tt != tt {
      return Err(
        token
          .loc
          .error(SyntaxErrorType::RequiredTokenNotFound(tt), Some(token.tt)),
      );
    }
    Ok(token)
  }

  fn consume_if(&mut self, tt: TT) -> Option<Token> {
    (self.peek().tt == tt).then(|| self.consume())
  }

  fn text(&self, loc: Loc) -> &'a str {
    &self.source[loc.0..loc.1]
  }

  fn enter(&mut self, loc: Loc) -> SyntaxResult<()> {
    self.depth += 1;
    if self.depth > self.max_depth {
      return Err(loc.error(SyntaxErrorType::NestingTooDeep, None));
    }
    Ok(())
  }

  fn exit(&mut self) {
    debug_assert!(self.depth > 0);
    self.depth -= 1;
  }

  /// Parses `function name? ( params ) { stmt* }` and demands end of input after it.
  pub fn parse_function(&mut self) -> SyntaxResult<FunctionLit> {
    let start = self.require(TT::KeywordFunction)?;
    let name = self
      .consume_if(TT::Identifier)
      .map(|token| self.text(token.loc).to_string());
    self.require(TT::ParenOpen)?;
    let mut params = Vec::new();
    if self.peek().tt != TT::ParenClose {
      loop {
        let param = self.require(TT::Identifier)?;
        params.push(Node::new(param.loc, self.text(param.loc).to_string()));
        if self.consume_if(TT::Comma).is_none() {
          break;
        }
      }
    }
    self.require(TT::ParenClose)?;
    self.require(TT::BraceOpen)?;
    let mut body = Vec::new();
    while self.peek().tt != TT::BraceClose {
      if self.peek().tt == TT::EOF {
        return Err(self.peek().loc.error(SyntaxErrorType::UnexpectedEnd, None));
      }
      body.push(self.parse_stmt()?);
    }
    let end = self.require(TT::BraceClose)?;
    let eof = self.peek();
    if eof.tt != TT::EOF {
      return Err(
        eof
          .loc
          .error(SyntaxErrorType::ExpectedSyntax("end of function"), Some(eof.tt)),
      );
    }
    let mut loc = start.loc;
    loc.extend(end.loc);
    Ok(FunctionLit {
      name,
      params,
      body,
      loc,
    })
  }

  fn parse_stmt(&mut self) -> SyntaxResult<Node<Stmt>> {
    match self.peek().tt {
      TT::KeywordVar => {
        let start = self.consume();
        let name = self.require(TT::Identifier)?;
        self.require(TT::Equals)?;
        let init = self.parse_expr()?;
        let end = self.require(TT::Semicolon)?;
        let mut loc = start.loc;
        loc.extend(end.loc);
        Ok(Node::new(loc, Stmt::Var {
          name: self.text(name.loc).to_string(),
          init,
        }))
      }
      TT::KeywordReturn => {
        let start = self.consume();
        let value = if self.peek().tt == TT::Semicolon {
          None
        } else {
          Some(self.parse_expr()?)
        };
        let end = self.require(TT::Semicolon)?;
        let mut loc = start.loc;
        loc.extend(end.loc);
        Ok(Node::new(loc, Stmt::Return { value }))
      }
      _ => {
        let expr = self.parse_expr()?;
        let end = self.require(TT::Semicolon)?;
        let mut loc = expr.loc;
        loc.extend(end.loc);
        Ok(Node::new(loc, Stmt::Expr { expr }))
      }
    }
  }

  fn parse_expr(&mut self) -> SyntaxResult<Node<Expr>> {
    let loc = self.peek().loc;
    self.enter(loc)?;
    let result = self.parse_additive();
    self.exit();
    result
  }

  fn parse_additive(&mut self) -> SyntaxResult<Node<Expr>> {
    let mut left = self.parse_multiplicative()?;
    loop {
      let op = match self.peek().tt {
        TT::Plus => BinOp::Add,
        TT::Hyphen => BinOp::Sub,
        _ => return Ok(left),
      };
      self.consume();
      let right = self.parse_multiplicative()?;
      let mut loc = left.loc;
      loc.extend(right.loc);
      left = Node::new(loc, Expr::Bin {
        op,
        left: Box::new(left),
        right: Box::new(right),
      });
    }
  }

  fn parse_multiplicative(&mut self) -> SyntaxResult<Node<Expr>> {
    let mut left = self.parse_postfix()?;
    loop {
      let op = match self.peek().tt {
        TT::Asterisk => BinOp::Mul,
        TT::Slash => BinOp::Div,
        _ => return Ok(left),
      };
      self.consume();
      let right = self.parse_postfix()?;
      let mut loc = left.loc;
      loc.extend(right.loc);
      left = Node::new(loc, Expr::Bin {
        op,
        left: Box::new(left),
        right: Box::new(right),
      });
    }
  }

  fn parse_postfix(&mut self) -> SyntaxResult<Node<Expr>> {
    let mut expr = self.parse_primary()?;
    while self.peek().tt == TT::ParenOpen {
      self.consume();
      let mut args = Vec::new();
      if self.peek().tt != TT::ParenClose {
        loop {
          args.push(self.parse_expr()?);
          if self.consume_if(TT::Comma).is_none() {
            break;
          }
        }
      }
      let end = self.require(TT::ParenClose)?;
      let mut loc = expr.loc;
      loc.extend(end.loc);
      expr = Node::new(loc, Expr::Call {
        callee: Box::new(expr),
        args,
      });
    }
    Ok(expr)
  }

  fn parse_primary(&mut self) -> SyntaxResult<Node<Expr>> {
    let token = self.consume();
    match token.tt {
      TT::LiteralNumber => {
        // The lexer only emits LiteralNumber for digits with an optional fraction;
        // that always parses as f64.
        let value: f64 = self
          .text(token.loc)
          .parse()
          .expect("lexed number literal parses");
        Ok(Node::new(token.loc, Expr::Num(value)))
      }
      TT::LiteralString => {
        let raw = self.text(token.loc);
        let mut value = String::with_capacity(raw.len());
        let mut chars = raw[1..raw.len() - 1].chars();
        while let Some(c) = chars.next() {
          match c {
            '\\' => value.extend(chars.next()),
            _ => value.push(c),
          }
        }
        Ok(Node::new(token.loc, Expr::Str(value)))
      }
      TT::Identifier => Ok(Node::new(
        token.loc,
        Expr::Ident(self.text(token.loc).to_string()),
      )),
      TT::ParenOpen => {
        self.enter(token.loc)?;
        let inner = self.parse_additive();
        self.exit();
        let inner = inner?;
        let end = self.require(TT::ParenClose)?;
        let mut loc = token.loc;
        loc.extend(end.loc);
        Ok(Node::new(loc, inner.stx))
      }
      TT::EOF => Err(token.loc.error(SyntaxErrorType::UnexpectedEnd, None)),
      TT::Invalid if self.text(token.loc).starts_with('\'') => {
        Err(token.loc.error(SyntaxErrorType::UnterminatedString, None))
      }
      tt => Err(
        token
          .loc
          .error(SyntaxErrorType::ExpectedSyntax("expression"), Some(tt)),
      ),
    }
  }
}
