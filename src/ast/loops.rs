use pest::iterators::Pair;
use serde::{Deserialize, Serialize};

use super::{Block, Expression, Identifier, ParseError, ParseResult, Position, Rule};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct While {
    pub condition: Expression,
    pub body: Block,
    pub position: Position,
}

impl While {
    pub fn from_pair(pair: Pair<Rule>, file: &str) -> ParseResult<While> {
        let position = Position::from_pair(&pair, file);
        let mut inner = pair.into_inner();

        // skip the `while` keyword token
        inner.next();

        let condition_pair = inner
            .next()
            .ok_or_else(|| ParseError::malformed("while loop", position.clone()))?;
        let condition = Expression::from_pair(condition_pair, file)?;

        let body_pair = inner
            .next()
            .ok_or_else(|| ParseError::malformed("while loop", position.clone()))?;
        let body = Block::from_pair(body_pair, file)?;

        Ok(While {
            condition,
            body,
            position,
        })
    }
}

/// `for (x in e)`: iterating an array yields elements, an object yields keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct For {
    pub variable: Identifier,
    pub iterable: Expression,
    pub body: Block,
    pub position: Position,
}

impl For {
    pub fn from_pair(pair: Pair<Rule>, file: &str) -> ParseResult<For> {
        let position = Position::from_pair(&pair, file);
        let mut inner = pair.into_inner();

        // skip the `for` keyword token
        inner.next();

        let variable_pair = inner
            .next()
            .ok_or_else(|| ParseError::malformed("for loop", position.clone()))?;
        let variable = Identifier::from_pair(variable_pair, file)?;

        // skip the `in` keyword token
        inner.next();

        let iterable_pair = inner
            .next()
            .ok_or_else(|| ParseError::malformed("for loop", position.clone()))?;
        let iterable = Expression::from_pair(iterable_pair, file)?;

        let body_pair = inner
            .next()
            .ok_or_else(|| ParseError::malformed("for loop", position.clone()))?;
        let body = Block::from_pair(body_pair, file)?;

        Ok(For {
            variable,
            iterable,
            body,
            position,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Break {
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Continue {
    pub position: Position,
}
