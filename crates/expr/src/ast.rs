//! Expression AST definitions.

use tabula_core::{DataType, Value};

/// Reference to a column of the row an expression is evaluated against.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ColumnRef {
    /// Column name as written.
    pub name: String,
    /// Column ordinal, filled in by binding.
    pub index: Option<usize>,
}

impl ColumnRef {
    /// Creates an unbound column reference.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            index: None,
        }
    }
}

/// Binary operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    // Comparison
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    // Logical
    And,
    Or,
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl BinaryOp {
    /// Returns true for the comparison operators.
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }
}

/// Unary operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

/// Aggregate functions, usable in `compute`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AggregateFunc {
    Count,
    Sum,
    Avg,
    Min,
    Max,
    StDev,
    Var,
}

impl AggregateFunc {
    /// Looks up an aggregate by its (case-insensitive) name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "count" => Some(AggregateFunc::Count),
            "sum" => Some(AggregateFunc::Sum),
            "avg" => Some(AggregateFunc::Avg),
            "min" => Some(AggregateFunc::Min),
            "max" => Some(AggregateFunc::Max),
            "stdev" => Some(AggregateFunc::StDev),
            "var" => Some(AggregateFunc::Var),
            _ => None,
        }
    }
}

/// Scalar functions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Function {
    /// `Len(s)`: character count.
    Len,
    /// `Trim(s)`: strips surrounding whitespace.
    Trim,
    /// `Substring(s, start, length)`: 1-based substring.
    Substring,
    /// `IsNull(a, b)`: `a` unless it is null, else `b`.
    IsNull,
    /// `Iif(cond, a, b)`.
    Iif,
    /// `Convert(x, 'Type')`.
    Convert,
}

impl Function {
    /// Looks up a function by its (case-insensitive) name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "len" => Some(Function::Len),
            "trim" => Some(Function::Trim),
            "substring" => Some(Function::Substring),
            "isnull" => Some(Function::IsNull),
            "iif" => Some(Function::Iif),
            "convert" => Some(Function::Convert),
            _ => None,
        }
    }

    /// Number of arguments the function takes.
    pub fn arity(&self) -> usize {
        match self {
            Function::Len | Function::Trim => 1,
            Function::IsNull | Function::Convert => 2,
            Function::Substring | Function::Iif => 3,
        }
    }
}

/// Expression node.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    /// Column of the current row.
    Column(ColumnRef),
    /// Constant.
    Literal(Value),
    /// Binary operation.
    BinaryOp {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
    /// Unary operation.
    UnaryOp { op: UnaryOp, expr: Box<Expr> },
    /// `x IS [NOT] NULL`.
    IsNull { expr: Box<Expr>, negated: bool },
    /// `x [NOT] LIKE pattern`.
    Like {
        expr: Box<Expr>,
        pattern: Box<Expr>,
        negated: bool,
    },
    /// `x [NOT] IN (a, b, ...)`.
    In {
        expr: Box<Expr>,
        list: Vec<Expr>,
        negated: bool,
    },
    /// Scalar function call.
    Function { func: Function, args: Vec<Expr> },
    /// `Convert` target, kept apart from literals so binding can check it.
    Type(DataType),
    /// Aggregate over a column of the rows being computed.
    Aggregate { func: AggregateFunc, column: ColumnRef },
}

impl Expr {
    /// Creates a column reference expression.
    pub fn column(name: impl Into<String>) -> Self {
        Expr::Column(ColumnRef::new(name))
    }

    /// Creates a literal expression.
    pub fn literal(value: impl Into<Value>) -> Self {
        Expr::Literal(value.into())
    }

    /// Creates a binary expression.
    pub fn binary(left: Expr, op: BinaryOp, right: Expr) -> Self {
        Expr::BinaryOp {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    /// Visits every column reference, including those inside aggregates.
    pub fn for_each_column(&self, f: &mut dyn FnMut(&ColumnRef)) {
        match self {
            Expr::Column(c) => f(c),
            Expr::Aggregate { column, .. } => f(column),
            Expr::Literal(_) | Expr::Type(_) => {}
            Expr::BinaryOp { left, right, .. } => {
                left.for_each_column(f);
                right.for_each_column(f);
            }
            Expr::UnaryOp { expr, .. } | Expr::IsNull { expr, .. } => expr.for_each_column(f),
            Expr::Like { expr, pattern, .. } => {
                expr.for_each_column(f);
                pattern.for_each_column(f);
            }
            Expr::In { expr, list, .. } => {
                expr.for_each_column(f);
                list.iter().for_each(|e| e.for_each_column(f));
            }
            Expr::Function { args, .. } => args.iter().for_each(|e| e.for_each_column(f)),
        }
    }

    /// Mutable counterpart of [`Expr::for_each_column`].
    pub fn for_each_column_mut(&mut self, f: &mut dyn FnMut(&mut ColumnRef) -> tabula_core::Result<()>) -> tabula_core::Result<()> {
        match self {
            Expr::Column(c) => f(c),
            Expr::Aggregate { column, .. } => f(column),
            Expr::Literal(_) | Expr::Type(_) => Ok(()),
            Expr::BinaryOp { left, right, .. } => {
                left.for_each_column_mut(f)?;
                right.for_each_column_mut(f)
            }
            Expr::UnaryOp { expr, .. } | Expr::IsNull { expr, .. } => expr.for_each_column_mut(f),
            Expr::Like { expr, pattern, .. } => {
                expr.for_each_column_mut(f)?;
                pattern.for_each_column_mut(f)
            }
            Expr::In { expr, list, .. } => {
                expr.for_each_column_mut(f)?;
                list.iter_mut().try_for_each(|e| e.for_each_column_mut(f))
            }
            Expr::Function { args, .. } => args.iter_mut().try_for_each(|e| e.for_each_column_mut(f)),
        }
    }

    /// Returns true if any aggregate appears in the tree.
    pub fn has_aggregate(&self) -> bool {
        match self {
            Expr::Aggregate { .. } => true,
            Expr::Column(_) | Expr::Literal(_) | Expr::Type(_) => false,
            Expr::BinaryOp { left, right, .. } => left.has_aggregate() || right.has_aggregate(),
            Expr::UnaryOp { expr, .. } | Expr::IsNull { expr, .. } => expr.has_aggregate(),
            Expr::Like { expr, pattern, .. } => expr.has_aggregate() || pattern.has_aggregate(),
            Expr::In { expr, list, .. } => expr.has_aggregate() || list.iter().any(Expr::has_aggregate),
            Expr::Function { args, .. } => args.iter().any(Expr::has_aggregate),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_names() {
        assert_eq!(AggregateFunc::from_name("SUM"), Some(AggregateFunc::Sum));
        assert_eq!(AggregateFunc::from_name("median"), None);
        assert_eq!(Function::from_name("IIF"), Some(Function::Iif));
        assert_eq!(Function::Substring.arity(), 3);
    }

    #[test]
    fn test_for_each_column() {
        let expr = Expr::binary(
            Expr::column("a"),
            BinaryOp::And,
            Expr::Like {
                expr: Box::new(Expr::column("b")),
                pattern: Box::new(Expr::literal("x*")),
                negated: false,
            },
        );
        let mut names = Vec::new();
        expr.for_each_column(&mut |c| names.push(c.name.clone()));
        assert_eq!(names, vec!["a", "b"]);
        assert!(!expr.has_aggregate());
    }
}
