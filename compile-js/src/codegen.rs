use crate::analyze::Analysis;
use crate::ast::BinOp;
use crate::ast::Expr;
use crate::ast::FunctionLit;
use crate::ast::Node;
use crate::ast::Stmt;
use crate::error::CompileError;
use crate::error::CompileResult;
use serde::Serialize;

/// One instruction of the stack machine the artifact targets.
#[derive(Copy, Clone, PartialEq, Debug, Serialize)]
pub enum Op {
  LoadConst(u16),
  LoadLocal(u16),
  StoreLocal(u16),
  LoadFree(u16),
  Add,
  Sub,
  Mul,
  Div,
  Call { argc: u16 },
  Pop,
  Return,
  ReturnUndefined,
}

#[derive(Clone, Debug, Serialize)]
pub enum Const {
  Num(f64),
  Str(String),
}

impl PartialEq for Const {
  fn eq(&self, other: &Self) -> bool {
    match (self, other) {
      // Bit comparison so NaN constants still pool.
      (Const::Num(a), Const::Num(b)) => a.to_bits() == b.to_bits(),
      (Const::Str(a), Const::Str(b)) => a == b,
      _ => false,
    }
  }
}

/// The installable compilation result for one function.
#[derive(Clone, Debug, Serialize)]
pub struct CodeArtifact {
  pub name: Option<String>,
  pub param_count: u16,
  pub local_count: u16,
  pub consts: Vec<Const>,
  pub free_names: Vec<String>,
  pub ops: Vec<Op>,
}

struct Generator<'a> {
  analysis: &'a Analysis,
  consts: Vec<Const>,
  ops: Vec<Op>,
}

impl<'a> Generator<'a> {
  fn const_slot(&mut self, value: Const, node: &Node<Expr>) -> CompileResult<u16> {
    if let Some(existing) = self.consts.iter().position(|c| *c == value) {
      return Ok(existing as u16);
    }
    if self.consts.len() > u16::MAX as usize {
      return Err(CompileError::TooManyConstants(node.loc));
    }
    self.consts.push(value);
    Ok((self.consts.len() - 1) as u16)
  }

  fn free_slot(&self, name: &str) -> u16 {
    // Analysis recorded every free name, so the lookup cannot miss.
    self
      .analysis
      .free
      .iter()
      .position(|free| free == name)
      .unwrap_or_default() as u16
  }

  fn emit_expr(&mut self, expr: &Node<Expr>) -> CompileResult<()> {
    match &expr.stx {
      Expr::Num(value) => {
        let slot = self.const_slot(Const::Num(*value), expr)?;
        self.ops.push(Op::LoadConst(slot));
      }
      Expr::Str(value) => {
        let slot = self.const_slot(Const::Str(value.clone()), expr)?;
        self.ops.push(Op::LoadConst(slot));
      }
      Expr::Ident(name) => match self.analysis.slot_of.get(name) {
        Some(slot) => self.ops.push(Op::LoadLocal(*slot)),
        None => {
          let slot = self.free_slot(name);
          self.ops.push(Op::LoadFree(slot));
        }
      },
      Expr::Bin { op, left, right } => {
        self.emit_expr(left)?;
        self.emit_expr(right)?;
        self.ops.push(match op {
          BinOp::Add => Op::Add,
          BinOp::Sub => Op::Sub,
          BinOp::Mul => Op::Mul,
          BinOp::Div => Op::Div,
        });
      }
      Expr::Call { callee, args } => {
        self.emit_expr(callee)?;
        for arg in args {
          self.emit_expr(arg)?;
        }
        self.ops.push(Op::Call {
          argc: args.len() as u16,
        });
      }
    }
    Ok(())
  }
}

pub fn generate(func: &FunctionLit, analysis: &Analysis) -> CompileResult<CodeArtifact> {
  let mut gen = Generator {
    analysis,
    consts: Vec::new(),
    ops: Vec::new(),
  };
  for stmt in &func.body {
    match &stmt.stx {
      Stmt::Var { name, init } => {
        gen.emit_expr(init)?;
        let slot = analysis.slot_of[name];
        gen.ops.push(Op::StoreLocal(slot));
      }
      Stmt::Return { value } => {
        match value {
          Some(value) => {
            gen.emit_expr(value)?;
            gen.ops.push(Op::Return);
          }
          None => gen.ops.push(Op::ReturnUndefined),
        }
      }
      Stmt::Expr { expr } => {
        gen.emit_expr(expr)?;
        gen.ops.push(Op::Pop);
      }
    }
  }
  if !matches!(gen.ops.last(), Some(Op::Return | Op::ReturnUndefined)) {
    gen.ops.push(Op::ReturnUndefined);
  }
  Ok(CodeArtifact {
    name: func.name.clone(),
    param_count: func.params.len() as u16,
    local_count: analysis.locals.len() as u16,
    consts: gen.consts,
    free_names: analysis.free.clone(),
    ops: gen.ops,
  })
}
