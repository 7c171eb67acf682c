//! Compiled expressions bound to a table schema.

use crate::aggregate::aggregate;
use crate::ast::{ColumnRef, Expr};
use crate::eval::{eval, truth, EvalContext};
use crate::parser::parse;
use tabula_core::{DataType, Error, Result, Value};

/// Schema information an expression binds against.
pub trait ColumnSource {
    /// Table name used in error messages.
    fn table_name(&self) -> &str;
    /// Resolves a column name to its ordinal.
    fn column_index(&self, name: &str) -> Option<usize>;
    /// Returns the declared type of a column.
    fn column_type(&self, index: usize) -> Option<DataType>;
    /// Returns true if the column is itself computed.
    fn is_computed(&self, index: usize) -> bool;
    /// String comparison mode.
    fn is_case_sensitive(&self) -> bool;
}

/// A parsed expression with its columns resolved to ordinals.
#[derive(Clone, Debug, PartialEq)]
pub struct Expression {
    text: String,
    root: Expr,
    ctx_case_sensitive: bool,
}

impl Expression {
    /// Parses and binds `text` against `source`.
    pub fn compile(text: &str, source: &dyn ColumnSource) -> Result<Self> {
        let mut root = parse(text)?;
        bind(&mut root, source)?;
        Ok(Self {
            text: text.to_string(),
            root,
            ctx_case_sensitive: source.is_case_sensitive(),
        })
    }

    /// Compiles an expression for a computed column.
    ///
    /// Computed columns may not use aggregates or read other computed columns.
    pub fn compile_column(text: &str, source: &dyn ColumnSource) -> Result<Self> {
        let expr = Self::compile(text, source)?;
        if expr.root.has_aggregate() {
            return Err(Error::expression("aggregates are not allowed in a column expression", 0));
        }
        let mut nested = None;
        expr.root.for_each_column(&mut |c| {
            if let Some(i) = c.index {
                if source.is_computed(i) && nested.is_none() {
                    nested = Some(c.name.clone());
                }
            }
        });
        if let Some(name) = nested {
            return Err(Error::expression(
                format!("column expression cannot reference computed column '{}'", name),
                0,
            ));
        }
        Ok(expr)
    }

    /// Returns the source text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Returns the syntax tree.
    pub fn root(&self) -> &Expr {
        &self.root
    }

    /// Ordinals of every column the expression reads.
    pub fn columns(&self) -> Vec<usize> {
        let mut out = Vec::new();
        self.root.for_each_column(&mut |c| {
            if let Some(i) = c.index {
                if !out.contains(&i) {
                    out.push(i);
                }
            }
        });
        out
    }

    fn context(&self) -> EvalContext {
        EvalContext {
            case_sensitive: self.ctx_case_sensitive,
        }
    }

    /// Evaluates against one row.
    pub fn eval(&self, row: &[Value]) -> Result<Value> {
        eval(&self.root, row, self.context())
    }

    /// Evaluates as a filter: only a true result matches.
    pub fn matches(&self, row: &[Value]) -> Result<bool> {
        Ok(truth(&self.eval(row)?)? == Some(true))
    }

    /// Evaluates an aggregate expression over a set of rows.
    ///
    /// Column references outside an aggregate are rejected.
    pub fn compute(&self, rows: &[&[Value]]) -> Result<Value> {
        let folded = fold_aggregates(&self.root, rows)?;
        eval(&folded, &[], self.context())
    }
}

fn bind(expr: &mut Expr, source: &dyn ColumnSource) -> Result<()> {
    expr.for_each_column_mut(&mut |c: &mut ColumnRef| {
        let index = source
            .column_index(&c.name)
            .ok_or_else(|| Error::column_not_found(source.table_name(), &c.name))?;
        c.index = Some(index);
        Ok(())
    })
}

/// Replaces each aggregate node with its value over `rows`.
fn fold_aggregates(expr: &Expr, rows: &[&[Value]]) -> Result<Expr> {
    Ok(match expr {
        Expr::Aggregate { func, column } => {
            let index = column
                .index
                .ok_or_else(|| Error::expression(format!("column '{}' is not bound", column.name), 0))?;
            let value = aggregate(*func, rows.iter().filter_map(|r| r.get(index)))?;
            Expr::Literal(value)
        }
        Expr::Column(c) => {
            return Err(Error::expression(
                format!("column '{}' must appear inside an aggregate", c.name),
                0,
            ))
        }
        Expr::Literal(_) | Expr::Type(_) => expr.clone(),
        Expr::BinaryOp { left, op, right } => Expr::BinaryOp {
            left: Box::new(fold_aggregates(left, rows)?),
            op: *op,
            right: Box::new(fold_aggregates(right, rows)?),
        },
        Expr::UnaryOp { op, expr } => Expr::UnaryOp {
            op: *op,
            expr: Box::new(fold_aggregates(expr, rows)?),
        },
        Expr::IsNull { expr, negated } => Expr::IsNull {
            expr: Box::new(fold_aggregates(expr, rows)?),
            negated: *negated,
        },
        Expr::Like {
            expr,
            pattern,
            negated,
        } => Expr::Like {
            expr: Box::new(fold_aggregates(expr, rows)?),
            pattern: Box::new(fold_aggregates(pattern, rows)?),
            negated: *negated,
        },
        Expr::In {
            expr,
            list,
            negated,
        } => Expr::In {
            expr: Box::new(fold_aggregates(expr, rows)?),
            list: list
                .iter()
                .map(|e| fold_aggregates(e, rows))
                .collect::<Result<Vec<_>>>()?,
            negated: *negated,
        },
        Expr::Function { func, args } => Expr::Function {
            func: *func,
            args: args
                .iter()
                .map(|e| fold_aggregates(e, rows))
                .collect::<Result<Vec<_>>>()?,
        },
    })
}
