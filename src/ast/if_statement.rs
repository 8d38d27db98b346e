use pest::iterators::Pair;
use serde::{Deserialize, Serialize};

use super::{Block, Expression, ParseError, ParseResult, Position, Rule};

/// A single `elif` arm, visitable on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Elif {
    pub condition: Expression,
    pub block: Block,
    pub position: Position,
}

impl Elif {
    pub fn from_pair(pair: Pair<Rule>, file: &str) -> ParseResult<Elif> {
        let position = Position::from_pair(&pair, file);
        let mut inner = pair.into_inner();

        // skip the `elif` keyword token
        inner.next();

        let condition_pair = inner
            .next()
            .ok_or_else(|| ParseError::malformed("elif clause", position.clone()))?;
        let condition = Expression::from_pair(condition_pair, file)?;

        let block_pair = inner
            .next()
            .ok_or_else(|| ParseError::malformed("elif clause", position.clone()))?;
        let block = Block::from_pair(block_pair, file)?;

        Ok(Elif {
            condition,
            block,
            position,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct If {
    pub condition: Expression,
    pub then_block: Block,
    pub elif_clauses: Vec<Elif>,
    pub else_block: Option<Block>,
    pub position: Position,
}

impl If {
    pub fn from_pair(pair: Pair<Rule>, file: &str) -> ParseResult<If> {
        let position = Position::from_pair(&pair, file);
        let mut inner = pair.into_inner();

        // skip the `if` keyword token
        inner.next();

        let condition_pair = inner
            .next()
            .ok_or_else(|| ParseError::malformed("if statement", position.clone()))?;
        let condition = Expression::from_pair(condition_pair, file)?;

        let block_pair = inner
            .next()
            .ok_or_else(|| ParseError::malformed("if statement", position.clone()))?;
        let then_block = Block::from_pair(block_pair, file)?;

        let mut elif_clauses = vec![];
        let mut else_block = None;

        for clause in inner {
            match clause.as_rule() {
                Rule::elif_clause => elif_clauses.push(Elif::from_pair(clause, file)?),
                Rule::else_clause => {
                    let clause_position = Position::from_pair(&clause, file);
                    let block_pair = clause
                        .into_inner()
                        .nth(1)
                        .ok_or_else(|| ParseError::malformed("else clause", clause_position))?;
                    else_block = Some(Block::from_pair(block_pair, file)?);
                }
                _ => return Err(ParseError::malformed("if statement", position)),
            }
        }

        Ok(If {
            condition,
            then_block,
            elif_clauses,
            else_block,
            position,
        })
    }
}
