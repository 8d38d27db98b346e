use serde::{Deserialize, Serialize};

use super::{Expression, Identifier, Position};

/// Attribute access `obj.member`.
///
/// Kept distinct from [`Index`]: member reads are lowered through the
/// safe-attribute gate while index reads use ordinary host indexing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub object: Box<Expression>,
    pub property: Identifier,
    pub position: Position,
}

/// Subscript access `obj[index]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Index {
    pub object: Box<Expression>,
    pub index: Box<Expression>,
    pub position: Position,
}

/// Slice access `obj[start:stop:step]` with any component omitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slice {
    pub object: Box<Expression>,
    pub start: Option<Box<Expression>>,
    pub stop: Option<Box<Expression>>,
    pub step: Option<Box<Expression>>,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Call {
    pub callee: Box<Expression>,
    pub args: Vec<Expression>,
    pub position: Position,
}
