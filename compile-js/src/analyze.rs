use crate::ast::Expr;
use crate::ast::FunctionLit;
use crate::ast::Node;
use crate::ast::Stmt;
use crate::error::CompileError;
use crate::error::CompileResult;
use ahash::HashMap;
use ahash::HashMapExt;

/// Scope analysis output for a single function literal.
///
/// Locals are numbered with parameters first, then `var` declarations in source order.
/// Identifier uses that resolve to neither are free names looked up in the enclosing
/// environment at run time.
#[derive(Clone, Debug)]
pub struct Analysis {
  pub locals: Vec<String>,
  pub slot_of: HashMap<String, u16>,
  pub free: Vec<String>,
  pub node_count: usize,
}

pub fn analyze(func: &FunctionLit) -> CompileResult<Analysis> {
  let mut locals = Vec::new();
  let mut slot_of = HashMap::new();
  for param in &func.params {
    if slot_of.contains_key(&param.stx) {
      return Err(CompileError::DuplicateParameter {
        name: param.stx.clone(),
        loc: param.loc,
      });
    }
    if locals.len() > u16::MAX as usize {
      return Err(CompileError::TooManyLocals(param.loc));
    }
    slot_of.insert(param.stx.clone(), locals.len() as u16);
    locals.push(param.stx.clone());
  }
  // `var` redeclarations share the first slot.
  for stmt in &func.body {
    if let Stmt::Var { name, .. } = &stmt.stx {
      if !slot_of.contains_key(name) {
        if locals.len() > u16::MAX as usize {
          return Err(CompileError::TooManyLocals(stmt.loc));
        }
        slot_of.insert(name.clone(), locals.len() as u16);
        locals.push(name.clone());
      }
    }
  }

  let mut free = Vec::new();
  for stmt in &func.body {
    match &stmt.stx {
      Stmt::Var { init, .. } => collect_free(init, &slot_of, &mut free),
      Stmt::Return { value: Some(value) } => collect_free(value, &slot_of, &mut free),
      Stmt::Return { value: None } => {}
      Stmt::Expr { expr } => collect_free(expr, &slot_of, &mut free),
    }
  }

  Ok(Analysis {
    locals,
    slot_of,
    free,
    node_count: func.node_count(),
  })
}

fn collect_free(expr: &Node<Expr>, slot_of: &HashMap<String, u16>, free: &mut Vec<String>) {
  match &expr.stx {
    Expr::Num(_) | Expr::Str(_) => {}
    Expr::Ident(name) => {
      if !slot_of.contains_key(name) && !free.iter().any(|existing| existing == name) {
        free.push(name.clone());
      }
    }
    Expr::Bin { left, right, .. } => {
      collect_free(left, slot_of, free);
      collect_free(right, slot_of, free);
    }
    Expr::Call { callee, args } => {
      collect_free(callee, slot_of, free);
      for arg in args {
        collect_free(arg, slot_of, free);
      }
    }
  }
}
