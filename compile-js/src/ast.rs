use crate::loc::Loc;

/// A syntax value paired with the byte range it was parsed from.
#[derive(Clone, Debug)]
pub struct Node<S> {
  pub loc: Loc,
  pub stx: S,
}

impl<S> Node<S> {
  pub fn new(loc: Loc, stx: S) -> Node<S> {
    Node { loc, stx }
  }
}

#[derive(Clone, Debug)]
pub struct FunctionLit {
  pub name: Option<String>,
  pub params: Vec<Node<String>>,
  pub body: Vec<Node<Stmt>>,
  pub loc: Loc,
}

#[derive(Clone, Debug)]
pub enum Stmt {
  Var { name: String, init: Node<Expr> },
  Return { value: Option<Node<Expr>> },
  Expr { expr: Node<Expr> },
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum BinOp {
  Add,
  Sub,
  Mul,
  Div,
}

#[derive(Clone, Debug)]
pub enum Expr {
  Num(f64),
  Str(String),
  Ident(String),
  Bin {
    op: BinOp,
    left: Box<Node<Expr>>,
    right: Box<Node<Expr>>,
  },
  Call {
    callee: Box<Node<Expr>>,
    args: Vec<Node<Expr>>,
  },
}

impl FunctionLit {
  /// Total count of AST nodes, used as the size unit for compile-time estimates.
  pub fn node_count(&self) -> usize {
    let mut n = 1 + self.params.len();
    for stmt in &self.body {
      n += stmt_node_count(&stmt.stx);
    }
    n
  }
}

fn stmt_node_count(stmt: &Stmt) -> usize {
  match stmt {
    Stmt::Var { init, .. } => 1 + expr_node_count(&init.stx),
    Stmt::Return { value } => {
      1 + value
        .as_ref()
        .map(|value| expr_node_count(&value.stx))
        .unwrap_or(0)
    }
    Stmt::Expr { expr } => 1 + expr_node_count(&expr.stx),
  }
}

fn expr_node_count(expr: &Expr) -> usize {
  match expr {
    Expr::Num(_) | Expr::Str(_) | Expr::Ident(_) => 1,
    Expr::Bin { left, right, .. } => 1 + expr_node_count(&left.stx) + expr_node_count(&right.stx),
    Expr::Call { callee, args } => {
      let mut n = 1 + expr_node_count(&callee.stx);
      for arg in args {
        n += expr_node_count(&arg.stx);
      }
      n
    }
  }
}
