//! The boolean expression tree behind a WHERE clause.
//!
//! Leaves are rendered from raw SQL pieces and qualified column references;
//! only comparison values are parameter-bound. Parameters are collected in
//! the tree's in-order traversal order, which matches the order the caller
//! authored them in.

use crate::error::Error;
use crate::value::Value;

/// A fragment of a predicate leaf's left-hand side.
#[derive(Debug, Clone)]
pub(crate) enum Piece {
    /// Raw SQL text, concatenated verbatim (caller-trusted).
    Raw(String),
    /// An alias-qualified column reference.
    Column { alias: String, name: String },
}

/// Comparison operators closing a predicate leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CompareOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    Like,
}

impl CompareOp {
    pub(crate) fn sql(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "<>",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Like => "LIKE",
        }
    }
}

/// A completed comparison leaf.
#[derive(Debug, Clone)]
pub(crate) struct Leaf {
    pub pieces: Vec<Piece>,
    pub op: CompareOp,
    pub value: Value,
}

/// The connective joining the items of one group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Connective {
    And,
    Or,
}

impl Connective {
    fn sql(self) -> &'static str {
        match self {
            Connective::And => " AND ",
            Connective::Or => " OR ",
        }
    }
}

/// A node in the predicate tree.
#[derive(Debug, Clone)]
pub(crate) enum Node {
    Leaf(Leaf),
    Group(Group),
}

/// A parenthesized level of the tree; all items join with one connective.
#[derive(Debug, Clone, Default)]
pub(crate) struct Group {
    pub connective: Option<Connective>,
    pub items: Vec<Node>,
}

impl Group {
    pub(crate) fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub(crate) fn push(&mut self, node: Node) {
        self.items.push(node);
    }

    /// Fix this level's connective; mixing AND and OR without an explicit
    /// subgroup is rejected rather than silently re-associated.
    pub(crate) fn connect(&mut self, connective: Connective) -> Result<(), Error> {
        match self.connective {
            None => {
                self.connective = Some(connective);
                Ok(())
            }
            Some(current) if current == connective => Ok(()),
            Some(_) => Err(Error::AmbiguousPrecedence),
        }
    }

    /// Render this level into `sql`, pushing bound values onto `params`.
    pub(crate) fn render(&self, sql: &mut String, params: &mut Vec<Value>) {
        let connective = self.connective.unwrap_or(Connective::And);
        for (i, item) in self.items.iter().enumerate() {
            if i > 0 {
                sql.push_str(connective.sql());
            }
            match item {
                Node::Leaf(leaf) => render_leaf(leaf, sql, params),
                Node::Group(group) => {
                    sql.push('(');
                    group.render(sql, params);
                    sql.push(')');
                }
            }
        }
    }
}

fn render_leaf(leaf: &Leaf, sql: &mut String, params: &mut Vec<Value>) {
    for piece in &leaf.pieces {
        match piece {
            Piece::Raw(text) => sql.push_str(text),
            Piece::Column { alias, name } => {
                sql.push_str(alias);
                sql.push('.');
                sql.push_str(name);
            }
        }
    }
    sql.push(' ');
    sql.push_str(leaf.op.sql());
    sql.push_str(" ?");
    params.push(leaf.value.clone());
}
