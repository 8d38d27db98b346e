use pest::iterators::Pair;
use serde::{Deserialize, Serialize};

use super::{ParseResult, Position, Rule, Statement};

/// A brace-delimited statement list.
///
/// Block structure is carried explicitly from parse through lowering; arms of
/// an `if`/`elif`/`else` chain are never reconstructed from statement counts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub statements: Vec<Statement>,
    pub position: Position,
}

impl Block {
    pub fn from_pair(pair: Pair<Rule>, file: &str) -> ParseResult<Block> {
        let position = Position::from_pair(&pair, file);
        let mut statements = vec![];

        for statement in pair.into_inner() {
            statements.push(Statement::from_pair(statement, file)?);
        }

        Ok(Block {
            statements,
            position,
        })
    }
}
