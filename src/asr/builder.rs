//! AST to ASR: name resolution and type checking
//!
//! Each top-level item is handled in two phases. The first declares every
//! unit, procedure signature and variable; the second builds statement
//! bodies, so procedures may call each other regardless of order. Modules
//! are finished in the first phase because `use` can only see modules that
//! come earlier in the file.

use super::fold::{Constant, fold};
use super::*;
use crate::ast;
use crate::error::{ErrorRecord, StageResult};
use std::collections::HashMap;

/// Build a fresh ASR from one translation unit
pub fn build(unit: &ast::TranslationUnit) -> StageResult<TranslationUnit> {
    let mut tu = TranslationUnit::new();
    extend(&mut tu, unit)?;
    Ok(tu)
}

/// Merge `unit` into an existing ASR
///
/// On failure `tu` may hold part of the fragment; interactive callers
/// take a [`Checkpoint`] first and roll back.
pub fn extend(tu: &mut TranslationUnit, unit: &ast::TranslationUnit) -> StageResult<()> {
    let mut builder = Builder {
        tu,
        implicit_none: HashMap::new(),
        loop_depth: 0,
        in_procedure: false,
    };
    builder.translation_unit(unit)?;
    tracing::debug!(
        "ASR holds {} symbols in {} scopes",
        builder.tu.symbols.len(),
        builder.tu.scopes.len()
    );
    Ok(())
}

fn semantic<T>(message: impl Into<String>) -> StageResult<T> {
    Err(ErrorRecord::semantic(message))
}

/// Default type of an undeclared name under implicit typing
fn implicit_type(name: &str) -> Type {
    match name.chars().next() {
        Some('i'..='n') => Type::Integer,
        _ => Type::Real,
    }
}

enum Pending<'u> {
    Procedure(SymbolId, &'u ast::Procedure),
    Program(SymbolId, &'u ast::ProgramUnit),
    Statement(&'u ast::Stmt),
    Expression(&'u ast::Expr),
}

struct Builder<'a> {
    tu: &'a mut TranslationUnit,
    /// Scopes that allow implicit typing map to `false`
    implicit_none: HashMap<ScopeId, bool>,
    loop_depth: usize,
    in_procedure: bool,
}

impl<'a> Builder<'a> {
    // ==================== DECLARATIONS ====================

    fn translation_unit(&mut self, unit: &ast::TranslationUnit) -> StageResult<()> {
        let global = self.tu.global_scope;
        let mut pending = Vec::new();

        for item in &unit.items {
            match item {
                ast::Item::Module(m) => self.module(m)?,
                ast::Item::Procedure(p) => {
                    let id = self.declare_procedure(p, global)?;
                    pending.push(Pending::Procedure(id, p));
                }
                ast::Item::Program(p) => {
                    let id = self.declare_program(p)?;
                    pending.push(Pending::Program(id, p));
                }
                ast::Item::Declaration(d) => self.declaration(d, global, &[], None)?,
                ast::Item::Statement(s) => pending.push(Pending::Statement(s)),
                ast::Item::Expression(e) => pending.push(Pending::Expression(e)),
            }
        }

        for item in pending {
            match item {
                Pending::Procedure(id, p) => self.procedure_body(id, p)?,
                Pending::Program(id, p) => self.program_body(id, p)?,
                Pending::Statement(s) => {
                    let stmt = self.stmt(s, global)?;
                    self.tu.items.push(stmt);
                }
                Pending::Expression(e) => {
                    let expr = self.expr(e, global)?;
                    self.tu.items.push(Stmt::Expr(expr));
                }
            }
        }
        Ok(())
    }

    fn insert(&mut self, scope: ScopeId, name: &str, id: SymbolId) -> StageResult<()> {
        if let Some(existing) = self.tu.scopes[scope].symbols.get(name) {
            let kind = self.tu.symbol(*existing).kind_name();
            return Err(ErrorRecord::semantic_with_help(
                format!("Symbol '{}' is already defined", name),
                format!("a {} named '{}' exists in this scope", kind, name),
            ));
        }
        self.tu.scopes[scope].symbols.insert(name.to_string(), id);
        Ok(())
    }

    fn new_unit_scope(&mut self, parent: ScopeId, spec: &ast::SpecificationPart) -> ScopeId {
        let scope = self.tu.new_scope(Some(parent));
        let inherited = self.implicit_none.get(&parent).copied().unwrap_or(false);
        self.implicit_none
            .insert(scope, spec.implicit_none || inherited);
        scope
    }

    fn uses(&mut self, scope: ScopeId, spec: &ast::SpecificationPart) -> StageResult<()> {
        let global = self.tu.global_scope;
        for name in &spec.uses {
            match self.tu.scopes[global].symbols.get(name) {
                Some(id) if matches!(self.tu.symbol(*id), Symbol::Module(_)) => {
                    let id = *id;
                    self.tu.scopes[scope].uses.push(id);
                }
                _ => {
                    return Err(ErrorRecord::semantic_with_help(
                        format!("Module '{}' not declared", name),
                        "modules must be defined earlier in the same file",
                    ));
                }
            }
        }
        Ok(())
    }

    fn module(&mut self, m: &ast::ModuleUnit) -> StageResult<()> {
        let global = self.tu.global_scope;
        let scope = self.new_unit_scope(global, &m.spec);
        let id = self.tu.symbols.alloc(Symbol::Module(Module {
            name: m.name.clone(),
            scope,
            external: false,
        }));
        self.insert(global, &m.name, id)?;
        self.tu.scopes[scope].owner = Some(id);
        self.uses(scope, &m.spec)?;
        for d in &m.spec.decls {
            self.declaration(d, scope, &[], None)?;
        }
        let procs = self.declare_contained(&m.contains, scope)?;
        for (pid, p) in procs {
            self.procedure_body(pid, p)?;
        }
        Ok(())
    }

    fn declare_program(&mut self, p: &ast::ProgramUnit) -> StageResult<SymbolId> {
        let global = self.tu.global_scope;
        let scope = self.new_unit_scope(global, &p.spec);
        let id = self.tu.symbols.alloc(Symbol::Program(Program {
            name: p.name.clone(),
            scope,
            body: Vec::new(),
        }));
        self.insert(global, &p.name, id)?;
        self.tu.scopes[scope].owner = Some(id);
        self.uses(scope, &p.spec)?;
        for d in &p.spec.decls {
            self.declaration(d, scope, &[], None)?;
        }
        Ok(id)
    }

    fn declare_contained<'u>(
        &mut self,
        procs: &'u [ast::Procedure],
        scope: ScopeId,
    ) -> StageResult<Vec<(SymbolId, &'u ast::Procedure)>> {
        let mut out = Vec::with_capacity(procs.len());
        for p in procs {
            out.push((self.declare_procedure(p, scope)?, p));
        }
        Ok(out)
    }

    fn declare_procedure(&mut self, p: &ast::Procedure, parent: ScopeId) -> StageResult<SymbolId> {
        let scope = self.new_unit_scope(parent, &p.spec);
        let id = self.tu.symbols.alloc(Symbol::Procedure(Procedure {
            name: p.name.clone(),
            scope,
            parent,
            args: Vec::new(),
            return_var: None,
            body: Vec::new(),
        }));
        self.insert(parent, &p.name, id)?;
        self.tu.scopes[scope].owner = Some(id);
        self.uses(scope, &p.spec)?;

        let result_name = match &p.kind {
            ast::ProcedureKind::Function { result, .. } => {
                Some(result.clone().unwrap_or_else(|| p.name.clone()))
            }
            ast::ProcedureKind::Subroutine => None,
        };
        if result_name.as_deref().is_some_and(|r| p.args.iter().any(|a| a == r)) {
            return semantic(format!(
                "Result variable of function '{}' clashes with a dummy argument",
                p.name
            ));
        }

        for d in &p.spec.decls {
            self.declaration(d, scope, &p.args, result_name.as_deref())?;
        }

        let implicit_none = self.implicit_none[&scope];
        let mut args = Vec::with_capacity(p.args.len());
        for arg in &p.args {
            let existing = self.tu.scopes[scope].symbols.get(arg).copied();
            let arg_id = match existing {
                Some(a) => a,
                None if implicit_none => {
                    return semantic(format!(
                        "Dummy argument '{}' of '{}' is not declared",
                        arg, p.name
                    ));
                }
                None => self.add_variable(
                    scope,
                    arg,
                    implicit_type(arg),
                    VarIntent::Unspecified,
                    Storage::Default,
                    None,
                )?,
            };
            if args.contains(&arg_id) {
                return semantic(format!("Dummy argument '{}' is listed twice", arg));
            }
            args.push(arg_id);
        }

        let return_var = match (&p.kind, result_name) {
            (ast::ProcedureKind::Function { return_type, .. }, Some(result)) => {
                let declared = self.tu.scopes[scope].symbols.get(&result).copied();
                Some(match (declared, return_type) {
                    (Some(_), Some(_)) => {
                        return semantic(format!(
                            "Return type of function '{}' is given twice",
                            p.name
                        ));
                    }
                    (Some(v), None) => v,
                    (None, Some(ty)) => self.add_variable(
                        scope,
                        &result,
                        Type::from(*ty),
                        VarIntent::ReturnVar,
                        Storage::Default,
                        None,
                    )?,
                    (None, None) if implicit_none => {
                        return semantic(format!(
                            "Return type of function '{}' is not declared",
                            p.name
                        ));
                    }
                    (None, None) => self.add_variable(
                        scope,
                        &result,
                        implicit_type(&result),
                        VarIntent::ReturnVar,
                        Storage::Default,
                        None,
                    )?,
                })
            }
            _ => None,
        };

        if let Symbol::Procedure(proc) = self.tu.symbol_mut(id) {
            proc.args = args;
            proc.return_var = return_var;
        }
        Ok(id)
    }

    fn add_variable(
        &mut self,
        scope: ScopeId,
        name: &str,
        ty: Type,
        intent: VarIntent,
        storage: Storage,
        init: Option<Expr>,
    ) -> StageResult<SymbolId> {
        let id = self.tu.symbols.alloc(Symbol::Variable(Variable {
            name: name.to_string(),
            parent: scope,
            ty,
            intent,
            storage,
            init,
        }));
        self.insert(scope, name, id)?;
        Ok(id)
    }

    fn declaration(
        &mut self,
        d: &ast::Declaration,
        scope: ScopeId,
        dummies: &[String],
        result: Option<&str>,
    ) -> StageResult<()> {
        let ty = Type::from(d.ty);
        let storage = if d.is_parameter() {
            Storage::Parameter
        } else {
            Storage::Default
        };
        for entity in &d.entities {
            let is_dummy = dummies.iter().any(|a| *a == entity.name);
            let intent = match (d.intent(), is_dummy) {
                (Some(_), false) => {
                    return semantic(format!(
                        "'{}' has an intent attribute but is not a dummy argument",
                        entity.name
                    ));
                }
                (Some(ast::Intent::In), true) => VarIntent::In,
                (Some(ast::Intent::Out), true) => VarIntent::Out,
                (Some(ast::Intent::InOut), true) => VarIntent::InOut,
                (None, true) => VarIntent::Unspecified,
                (None, false) if result == Some(entity.name.as_str()) => VarIntent::ReturnVar,
                (None, false) => VarIntent::Local,
            };
            if is_dummy && storage == Storage::Parameter {
                return semantic(format!(
                    "Dummy argument '{}' cannot be a parameter",
                    entity.name
                ));
            }
            if ty == (Type::Character { len: None }) && !is_dummy {
                return semantic(format!(
                    "Only dummy arguments may have assumed length, '{}' is not one",
                    entity.name
                ));
            }
            let init = match &entity.init {
                Some(init) => {
                    if is_dummy {
                        return semantic(format!(
                            "Dummy argument '{}' cannot be initialized",
                            entity.name
                        ));
                    }
                    let value = self.expr(init, scope)?;
                    let value = self.convert(value, ty, &entity.name)?;
                    match fold(self.tu, &value) {
                        Some(c) => Some(self.convert(c.into_expr(), ty, &entity.name)?),
                        None => {
                            return Err(ErrorRecord::semantic_with_help(
                                format!(
                                    "Initialization of '{}' must be a constant expression",
                                    entity.name
                                ),
                                "only literals, parameters and intrinsic operations are allowed",
                            ));
                        }
                    }
                }
                None if storage == Storage::Parameter => {
                    return semantic(format!("Parameter '{}' needs a value", entity.name));
                }
                None => None,
            };
            self.add_variable(scope, &entity.name, ty, intent, storage, init)?;
        }
        Ok(())
    }

    // ==================== BODIES ====================

    fn program_body(&mut self, id: SymbolId, p: &ast::ProgramUnit) -> StageResult<()> {
        let scope = match self.tu.symbol(id) {
            Symbol::Program(prog) => prog.scope,
            _ => return Err(ErrorRecord::internal("AssertFailed", "program symbol expected")),
        };
        let procs = self.declare_contained(&p.contains, scope)?;
        let body = self.block(&p.body, scope)?;
        if let Symbol::Program(prog) = self.tu.symbol_mut(id) {
            prog.body = body;
        }
        for (pid, proc) in procs {
            self.procedure_body(pid, proc)?;
        }
        Ok(())
    }

    fn procedure_body(&mut self, id: SymbolId, p: &ast::Procedure) -> StageResult<()> {
        let scope = match self.tu.symbol(id) {
            Symbol::Procedure(proc) => proc.scope,
            _ => return Err(ErrorRecord::internal("AssertFailed", "procedure symbol expected")),
        };
        let was_in_procedure = std::mem::replace(&mut self.in_procedure, true);
        let body = self.block(&p.body, scope);
        self.in_procedure = was_in_procedure;
        let body = body?;
        if let Symbol::Procedure(proc) = self.tu.symbol_mut(id) {
            proc.body = body;
        }
        Ok(())
    }

    fn block(&mut self, body: &[ast::Stmt], scope: ScopeId) -> StageResult<Vec<Stmt>> {
        body.iter().map(|s| self.stmt(s, scope)).collect()
    }

    fn loop_body(&mut self, body: &[ast::Stmt], scope: ScopeId) -> StageResult<Vec<Stmt>> {
        self.loop_depth += 1;
        let result = self.block(body, scope);
        self.loop_depth -= 1;
        result
    }

    fn stmt(&mut self, s: &ast::Stmt, scope: ScopeId) -> StageResult<Stmt> {
        match s {
            ast::Stmt::Assignment { target, value } => {
                let value = self.expr(value, scope)?;
                let target = self.assignment_target(target, scope, value.ty)?;
                let ty = self.var_type(target);
                let name = self.tu.symbol(target).name().to_string();
                let value = self.convert(value, ty, &name)?;
                Ok(Stmt::Assignment { target, value })
            }
            ast::Stmt::Print(values) => {
                let values = values
                    .iter()
                    .map(|v| self.expr(v, scope))
                    .collect::<StageResult<Vec<_>>>()?;
                Ok(Stmt::Print(values))
            }
            ast::Stmt::Call { name, args } => {
                let sub = match self.tu.lookup(scope, name) {
                    Some(id) => id,
                    None => return semantic(format!("Subroutine '{}' not declared", name)),
                };
                match self.tu.symbol(sub) {
                    Symbol::Procedure(p) if !p.is_function() => {}
                    Symbol::Procedure(_) => {
                        return semantic(format!(
                            "'{}' is a function and cannot be called with 'call'",
                            name
                        ));
                    }
                    other => {
                        return semantic(format!("'{}' is a {}, not a subroutine", name, other.kind_name()));
                    }
                }
                let args = self.call_args(sub, args, scope)?;
                Ok(Stmt::SubroutineCall { sub, args })
            }
            ast::Stmt::If { cond, body, orelse } => {
                let cond = self.condition(cond, scope)?;
                let body = self.block(body, scope)?;
                let orelse = self.block(orelse, scope)?;
                Ok(Stmt::If { cond, body, orelse })
            }
            ast::Stmt::SingleIf { cond, stmt } => {
                let cond = self.condition(cond, scope)?;
                let body = vec![self.stmt(stmt, scope)?];
                Ok(Stmt::If {
                    cond,
                    body,
                    orelse: Vec::new(),
                })
            }
            ast::Stmt::DoLoop {
                var,
                start,
                end,
                step,
                body,
            } => {
                let start = self.expr(start, scope)?;
                let end = self.expr(end, scope)?;
                let step = step.as_ref().map(|e| self.expr(e, scope)).transpose()?;
                let var_id = self.assignment_target(var, scope, Type::Integer)?;
                if self.var_type(var_id) != Type::Integer {
                    return semantic(format!("Loop variable '{}' must be an integer", var));
                }
                for bound in [Some(&start), Some(&end), step.as_ref()].into_iter().flatten() {
                    if bound.ty != Type::Integer {
                        return semantic(format!(
                            "Bounds of the loop over '{}' must be integers, found {}",
                            var, bound.ty
                        ));
                    }
                }
                if let Some(Constant::Integer(0)) = step.as_ref().and_then(|s| fold(self.tu, s)) {
                    return semantic(format!("Step of the loop over '{}' is zero", var));
                }
                let body = self.loop_body(body, scope)?;
                Ok(Stmt::DoLoop {
                    var: var_id,
                    start,
                    end,
                    step,
                    body,
                })
            }
            ast::Stmt::DoWhile { cond, body } => {
                let cond = self.condition(cond, scope)?;
                let body = self.loop_body(body, scope)?;
                Ok(Stmt::WhileLoop { cond, body })
            }
            ast::Stmt::DoForever { body } => {
                let body = self.loop_body(body, scope)?;
                Ok(Stmt::WhileLoop {
                    cond: Expr::logical(true),
                    body,
                })
            }
            ast::Stmt::Exit | ast::Stmt::Cycle if self.loop_depth == 0 => {
                let word = if matches!(s, ast::Stmt::Exit) { "exit" } else { "cycle" };
                semantic(format!("'{}' is only allowed inside a loop", word))
            }
            ast::Stmt::Exit => Ok(Stmt::Exit),
            ast::Stmt::Cycle => Ok(Stmt::Cycle),
            ast::Stmt::Return if !self.in_procedure => {
                semantic("'return' is only allowed inside a function or subroutine")
            }
            ast::Stmt::Return => Ok(Stmt::Return),
        }
    }

    fn var_type(&self, id: SymbolId) -> Type {
        self.tu.variable(id).map(|v| v.ty).unwrap_or(Type::Integer)
    }

    /// Resolve a variable that is about to be defined
    ///
    /// At the top level an unknown name is declared on first assignment
    /// with the type of the assigned value.
    fn assignment_target(&mut self, name: &str, scope: ScopeId, value_ty: Type) -> StageResult<SymbolId> {
        let id = match self.tu.lookup(scope, name) {
            Some(id) => id,
            None if scope == self.tu.global_scope => {
                tracing::debug!("declaring '{}' as {} on first assignment", name, value_ty);
                return self.add_variable(scope, name, value_ty, VarIntent::Local, Storage::Default, None);
            }
            None => return self.undeclared(name, scope),
        };
        match self.tu.symbol(id) {
            Symbol::Variable(v) if v.storage == Storage::Parameter => {
                semantic(format!("Cannot assign to parameter '{}'", name))
            }
            Symbol::Variable(v) if v.intent == VarIntent::In => {
                semantic(format!("Cannot assign to intent(in) argument '{}'", name))
            }
            Symbol::Variable(_) => Ok(id),
            other => semantic(format!("Cannot assign to {} '{}'", other.kind_name(), name)),
        }
    }

    /// Implicitly declare `name` or report it
    fn undeclared(&mut self, name: &str, scope: ScopeId) -> StageResult<SymbolId> {
        match self.implicit_none.get(&scope) {
            Some(false) => self.add_variable(
                scope,
                name,
                implicit_type(name),
                VarIntent::Local,
                Storage::Default,
                None,
            ),
            _ => Err(ErrorRecord::semantic_with_help(
                format!("Variable '{}' is not declared", name),
                format!("declare it first, for example `integer :: {}`", name),
            )),
        }
    }

    fn condition(&mut self, cond: &ast::Expr, scope: ScopeId) -> StageResult<Expr> {
        let cond = self.expr(cond, scope)?;
        if cond.ty != Type::Logical {
            return semantic(format!("Condition must be logical, found {}", cond.ty));
        }
        Ok(cond)
    }

    /// Convert `value` for storage in something of type `target`
    fn convert(&self, value: Expr, target: Type, what: &str) -> StageResult<Expr> {
        match (value.ty, target) {
            (Type::Integer, Type::Real) => Ok(cast(value, CastKind::IntegerToReal)),
            (Type::Real, Type::Integer) => Ok(cast(value, CastKind::RealToInteger)),
            (from, to) if from.same_kind(to) => Ok(value),
            (from, to) => semantic(format!(
                "Type mismatch in assignment to '{}': cannot convert {} to {}",
                what, from, to
            )),
        }
    }

    // ==================== CALLS ====================

    fn call_args(&mut self, proc: SymbolId, args: &[ast::Expr], scope: ScopeId) -> StageResult<Vec<Expr>> {
        let (name, dummies) = match self.tu.procedure(proc) {
            Some(p) => (p.name.clone(), p.args.clone()),
            None => return Err(ErrorRecord::internal("AssertFailed", "procedure symbol expected")),
        };
        if dummies.len() != args.len() {
            return semantic(format!(
                "'{}' takes {} argument(s) but {} were given",
                name,
                dummies.len(),
                args.len()
            ));
        }
        let mut out = Vec::with_capacity(args.len());
        for (dummy, actual) in dummies.iter().zip(args) {
            let actual = self.expr(actual, scope)?;
            let (dummy_name, dummy_ty, intent) = match self.tu.variable(*dummy) {
                Some(v) => (v.name.clone(), v.ty, v.intent),
                None => return Err(ErrorRecord::internal("AssertFailed", "dummy argument expected")),
            };
            if !actual.ty.same_kind(dummy_ty) {
                return semantic(format!(
                    "Argument '{}' of '{}' is {}, but {} was given",
                    dummy_name, name, dummy_ty, actual.ty
                ));
            }
            if intent.requires_variable() {
                let definable = match &actual.kind {
                    ExprKind::Var(id) => self
                        .tu
                        .variable(*id)
                        .is_some_and(|v| v.storage != Storage::Parameter && v.intent != VarIntent::In),
                    _ => false,
                };
                if !definable {
                    return semantic(format!(
                        "Argument '{}' of '{}' is intent({}) and must be a variable",
                        dummy_name,
                        name,
                        if intent == VarIntent::Out { "out" } else { "inout" }
                    ));
                }
            }
            out.push(actual);
        }
        Ok(out)
    }

    // ==================== EXPRESSIONS ====================

    fn expr(&mut self, e: &ast::Expr, scope: ScopeId) -> StageResult<Expr> {
        match e {
            ast::Expr::Integer(n) => Ok(Expr::integer(*n)),
            ast::Expr::Real(text) => {
                let normalized = text.replace(['d', 'D'], "e");
                match normalized.parse::<f64>() {
                    Ok(x) => Ok(Expr::new(ExprKind::RealConstant(x), Type::Real)),
                    Err(_) => semantic(format!("Invalid real literal '{}'", text)),
                }
            }
            ast::Expr::Logical(b) => Ok(Expr::logical(*b)),
            ast::Expr::Str(s) => Ok(Expr::new(
                ExprKind::StringConstant(s.clone()),
                Type::Character {
                    len: Some(s.len() as u32),
                },
            )),
            ast::Expr::Name(name) => {
                let id = match self.tu.lookup(scope, name) {
                    Some(id) => id,
                    None => self.undeclared(name, scope)?,
                };
                match self.tu.symbol(id) {
                    Symbol::Variable(v) => Ok(Expr::var(id, v.ty)),
                    other => semantic(format!(
                        "'{}' is a {} and cannot be used as a value",
                        name,
                        other.kind_name()
                    )),
                }
            }
            ast::Expr::FuncCall { name, args } => self.func_call(name, args, scope),
            ast::Expr::BinOp { op, left, right } => {
                let left = self.expr(left, scope)?;
                let right = self.expr(right, scope)?;
                if !left.ty.is_numeric() || !right.ty.is_numeric() {
                    return semantic(format!(
                        "Operator '{}' needs numeric operands, found {} and {}",
                        op.symbol(),
                        left.ty,
                        right.ty
                    ));
                }
                let (left, right) = promote(left, right);
                Ok(Expr::binop(*op, left, right))
            }
            ast::Expr::UnaryOp { op, operand } => {
                let operand = self.expr(operand, scope)?;
                match op {
                    ast::UnaryOp::Minus if operand.ty.is_numeric() => {
                        let ty = operand.ty;
                        Ok(Expr::new(ExprKind::UnaryMinus(Box::new(operand)), ty))
                    }
                    ast::UnaryOp::Not if operand.ty == Type::Logical => {
                        Ok(Expr::new(ExprKind::Not(Box::new(operand)), Type::Logical))
                    }
                    ast::UnaryOp::Minus => semantic(format!("Cannot negate a {} value", operand.ty)),
                    ast::UnaryOp::Not => semantic(format!(".not. needs a logical operand, found {}", operand.ty)),
                }
            }
            ast::Expr::Compare { op, left, right } => {
                let left = self.expr(left, scope)?;
                let right = self.expr(right, scope)?;
                if !left.ty.is_numeric() || !right.ty.is_numeric() {
                    return semantic(format!(
                        "Comparison '{}' needs numeric operands, found {} and {}",
                        op.symbol(),
                        left.ty,
                        right.ty
                    ));
                }
                let (left, right) = promote(left, right);
                Ok(Expr::compare(*op, left, right))
            }
            ast::Expr::BoolOp { op, left, right } => {
                let left = self.expr(left, scope)?;
                let right = self.expr(right, scope)?;
                if left.ty != Type::Logical || right.ty != Type::Logical {
                    return semantic(format!(
                        "Operator '{}' needs logical operands, found {} and {}",
                        op.symbol(),
                        left.ty,
                        right.ty
                    ));
                }
                Ok(Expr::new(
                    ExprKind::BoolOp {
                        op: *op,
                        left: Box::new(left),
                        right: Box::new(right),
                    },
                    Type::Logical,
                ))
            }
        }
    }

    fn func_call(&mut self, name: &str, args: &[ast::Expr], scope: ScopeId) -> StageResult<Expr> {
        if let Some(id) = self.tu.lookup(scope, name) {
            let ret = match self.tu.symbol(id) {
                Symbol::Procedure(p) => p.return_var,
                other => {
                    return semantic(format!(
                        "'{}' is a {}, not a function (arrays are not supported)",
                        name,
                        other.kind_name()
                    ));
                }
            };
            let Some(ret) = ret else {
                return semantic(format!(
                    "Subroutine '{}' cannot be used in an expression",
                    name
                ));
            };
            let ty = self.var_type(ret);
            let args = self.call_args(id, args, scope)?;
            return Ok(Expr::new(ExprKind::FunctionCall { func: id, args }, ty));
        }

        let intrinsic = Intrinsic::from_name(name);
        if intrinsic.is_none() && name != "real" && name != "int" {
            return Err(ErrorRecord::semantic_with_help(
                format!("Function '{}' not declared", name),
                "arrays are not supported; a name followed by '(' must be a function",
            ));
        }
        let args = args
            .iter()
            .map(|a| self.expr(a, scope))
            .collect::<StageResult<Vec<_>>>()?;
        if let Some(arg) = args.iter().find(|a| !a.ty.is_numeric()) {
            return semantic(format!(
                "Intrinsic '{}' needs numeric arguments, found {}",
                name, arg.ty
            ));
        }
        let arity = |n: usize| -> StageResult<()> {
            if args.len() == n {
                Ok(())
            } else {
                semantic(format!("'{}' takes {} argument(s), {} given", name, n, args.len()))
            }
        };

        match name {
            "real" => {
                arity(1)?;
                Ok(to_real(args.into_iter().next().unwrap_or_else(|| Expr::integer(0))))
            }
            "int" => {
                arity(1)?;
                let arg = args.into_iter().next().unwrap_or_else(|| Expr::integer(0));
                Ok(match arg.ty {
                    Type::Real => cast(arg, CastKind::RealToInteger),
                    _ => arg,
                })
            }
            _ => match intrinsic {
                Some(Intrinsic::Abs) => {
                    arity(1)?;
                    let ty = args[0].ty;
                    Ok(Expr::new(
                        ExprKind::Intrinsic {
                            func: Intrinsic::Abs,
                            args,
                        },
                        ty,
                    ))
                }
                Some(func @ (Intrinsic::Sqrt | Intrinsic::Exp | Intrinsic::Sin | Intrinsic::Cos)) => {
                    arity(1)?;
                    let args = args.into_iter().map(to_real).collect();
                    Ok(Expr::new(ExprKind::Intrinsic { func, args }, Type::Real))
                }
                Some(func @ Intrinsic::Mod) => {
                    arity(2)?;
                    let mut it = args.into_iter();
                    let (a, b) = match (it.next(), it.next()) {
                        (Some(a), Some(b)) => promote(a, b),
                        _ => return Err(ErrorRecord::internal("AssertFailed", "mod arity")),
                    };
                    let ty = a.ty;
                    Ok(Expr::new(ExprKind::Intrinsic { func, args: vec![a, b] }, ty))
                }
                Some(func @ (Intrinsic::Min | Intrinsic::Max)) => {
                    if args.len() < 2 {
                        return semantic(format!("'{}' takes at least 2 arguments", name));
                    }
                    let ty = if args.iter().any(|a| a.ty == Type::Real) {
                        Type::Real
                    } else {
                        Type::Integer
                    };
                    let args = args
                        .into_iter()
                        .map(|a| if ty == Type::Real { to_real(a) } else { a })
                        .collect();
                    Ok(Expr::new(ExprKind::Intrinsic { func, args }, ty))
                }
                None => Err(ErrorRecord::internal(
                    "AssertFailed",
                    format!("'{}' is not an intrinsic", name),
                )),
            },
        }
    }
}

fn cast(value: Expr, kind: CastKind) -> Expr {
    let ty = match kind {
        CastKind::IntegerToReal => Type::Real,
        CastKind::RealToInteger => Type::Integer,
    };
    Expr::new(
        ExprKind::Cast {
            kind,
            arg: Box::new(value),
        },
        ty,
    )
}

fn to_real(value: Expr) -> Expr {
    if value.ty == Type::Integer {
        cast(value, CastKind::IntegerToReal)
    } else {
        value
    }
}

/// Bring two numeric operands to a common type
fn promote(left: Expr, right: Expr) -> (Expr, Expr) {
    match (left.ty, right.ty) {
        (Type::Integer, Type::Real) => (to_real(left), right),
        (Type::Real, Type::Integer) => (left, to_real(right)),
        _ => (left, right),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::lexer::lex;
    use crate::parser::parse;

    fn build_src(src: &str) -> StageResult<TranslationUnit> {
        let tokens = lex(src)?;
        let ast = parse(&tokens, src)?;
        build(&ast)
    }

    fn semantic_error(src: &str) -> String {
        let err = build_src(src).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Semantic, "{}", err.message);
        err.message
    }

    #[test]
    fn test_global_assignment_declares() {
        let tu = build_src("x = 1\ny = 2.5\n").unwrap();
        let x = tu.lookup(tu.global_scope, "x").unwrap();
        let y = tu.lookup(tu.global_scope, "y").unwrap();
        assert_eq!(tu.variable(x).unwrap().ty, Type::Integer);
        assert_eq!(tu.variable(y).unwrap().ty, Type::Real);
        assert_eq!(tu.items.len(), 2);
    }

    #[test]
    fn test_integer_promoted_in_mixed_arithmetic() {
        let tu = build_src("1 + 2.0").unwrap();
        let Stmt::Expr(e) = &tu.items[0] else {
            panic!("expected expression");
        };
        assert_eq!(e.ty, Type::Real);
        let ExprKind::BinOp { left, .. } = &e.kind else {
            panic!("expected binop");
        };
        assert!(matches!(left.kind, ExprKind::Cast { kind: CastKind::IntegerToReal, .. }));
    }

    #[test]
    fn test_undeclared_under_implicit_none() {
        let msg = semantic_error("program p\nimplicit none\nx = 1\nend program\n");
        assert!(msg.contains("'x'"));
    }

    #[test]
    fn test_implicit_typing() {
        let tu = build_src("program p\ni = 1\nx = 2\nend program\n").unwrap();
        let prog = tu.programs()[0];
        let Symbol::Program(p) = tu.symbol(prog) else {
            panic!()
        };
        let i = tu.lookup(p.scope, "i").unwrap();
        let x = tu.lookup(p.scope, "x").unwrap();
        assert_eq!(tu.variable(i).unwrap().ty, Type::Integer);
        assert_eq!(tu.variable(x).unwrap().ty, Type::Real);
    }

    #[test]
    fn test_read_of_unknown_global_fails() {
        semantic_error("print *, y\n");
    }

    #[test]
    fn test_exit_outside_loop() {
        let msg = semantic_error("exit\n");
        assert!(msg.contains("inside a loop"));
    }

    #[test]
    fn test_parameter_is_constant() {
        let tu = build_src("integer, parameter :: n = 2 * 3\n").unwrap();
        let n = tu.lookup(tu.global_scope, "n").unwrap();
        assert_eq!(
            tu.variable(n).unwrap().init.as_ref().map(|e| &e.kind),
            Some(&ExprKind::IntegerConstant(6))
        );
        semantic_error("integer, parameter :: n = 1\nn = 2\n");
    }

    #[test]
    fn test_intent_out_needs_variable() {
        let src = "\
subroutine set(a)
integer, intent(out) :: a
a = 1
end subroutine
call set(5)
";
        let msg = semantic_error(src);
        assert!(msg.contains("intent(out)"));
    }

    #[test]
    fn test_function_call_types() {
        let src = "\
integer function twice(n)
integer, intent(in) :: n
twice = 2 * n
end function
twice(21)
";
        let tu = build_src(src).unwrap();
        let Stmt::Expr(e) = &tu.items[0] else {
            panic!()
        };
        assert_eq!(e.ty, Type::Integer);
        assert!(matches!(e.kind, ExprKind::FunctionCall { .. }));
    }

    #[test]
    fn test_wrong_arity() {
        let src = "subroutine s(a)\ninteger :: a\nend subroutine\ncall s(1, 2)\n";
        assert!(semantic_error(src).contains("takes 1"));
    }

    #[test]
    fn test_use_module() {
        let src = "\
module consts
implicit none
integer, parameter :: answer = 42
end module
program p
use consts
implicit none
print *, answer
end program
";
        let tu = build_src(src).unwrap();
        assert_eq!(tu.modules().len(), 1);
        let Symbol::Module(m) = tu.symbol(tu.modules()[0]) else {
            panic!("expected module");
        };
        let answer = tu.lookup(m.scope, "answer").unwrap();
        assert_eq!(tu.mangled_name(answer), "consts__answer");
    }

    #[test]
    fn test_unknown_module() {
        semantic_error("program p\nuse nowhere\nend program\n");
    }

    #[test]
    fn test_duplicate_definition() {
        let msg = semantic_error("integer :: x\nreal :: x\n");
        assert!(msg.contains("already defined"));
    }
}
