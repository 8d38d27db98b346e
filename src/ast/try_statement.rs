use pest::iterators::Pair;
use serde::{Deserialize, Serialize};

use super::{Block, Expression, Identifier, ParseError, ParseResult, Position, Rule};

/// One `except` clause; `binding` is the identifier of the `except (e)` form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Except {
    pub binding: Option<Identifier>,
    pub body: Block,
    pub position: Position,
}

impl Except {
    pub fn from_pair(pair: Pair<Rule>, file: &str) -> ParseResult<Except> {
        let position = Position::from_pair(&pair, file);
        let mut binding = None;
        let mut body = None;

        for pair in pair.into_inner() {
            match pair.as_rule() {
                Rule::kw_except => {}
                Rule::ident => binding = Some(Identifier::from_pair(pair, file)?),
                Rule::block => body = Some(Block::from_pair(pair, file)?),
                _ => return Err(ParseError::malformed("except clause", position)),
            }
        }

        let body = body.ok_or_else(|| ParseError::malformed("except clause", position.clone()))?;

        Ok(Except {
            binding,
            body,
            position,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Try {
    pub body: Block,
    pub except_clauses: Vec<Except>,
    pub finally_block: Option<Block>,
    pub position: Position,
}

impl Try {
    pub fn from_pair(pair: Pair<Rule>, file: &str) -> ParseResult<Try> {
        let position = Position::from_pair(&pair, file);
        let mut inner = pair.into_inner();

        // skip the `try` keyword token
        inner.next();

        let body_pair = inner
            .next()
            .ok_or_else(|| ParseError::malformed("try statement", position.clone()))?;
        let body = Block::from_pair(body_pair, file)?;

        let mut except_clauses = vec![];
        let mut finally_block = None;

        for clause in inner {
            match clause.as_rule() {
                Rule::except_clause => except_clauses.push(Except::from_pair(clause, file)?),
                Rule::finally_clause => {
                    let clause_position = Position::from_pair(&clause, file);
                    let block_pair = clause
                        .into_inner()
                        .nth(1)
                        .ok_or_else(|| ParseError::malformed("finally clause", clause_position))?;
                    finally_block = Some(Block::from_pair(block_pair, file)?);
                }
                _ => return Err(ParseError::malformed("try statement", position)),
            }
        }

        Ok(Try {
            body,
            except_clauses,
            finally_block,
            position,
        })
    }
}

/// `throw expr`; the thrown value is arbitrary, typically an object literal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Throw {
    pub value: Expression,
    pub position: Position,
}

impl Throw {
    pub fn from_pair(pair: Pair<Rule>, file: &str) -> ParseResult<Throw> {
        let position = Position::from_pair(&pair, file);
        let value_pair = pair
            .into_inner()
            .nth(1)
            .ok_or_else(|| ParseError::malformed("throw statement", position.clone()))?;

        Ok(Throw {
            value: Expression::from_pair(value_pair, file)?,
            position,
        })
    }
}
