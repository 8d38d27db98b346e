use pest::iterators::Pair;
use serde::{Deserialize, Serialize};

use super::{Block, Expression, Parameter, ParseError, ParseResult, Position, Rule};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ArrowBody {
    Expression(Box<Expression>),
    Block(Block),
}

/// Anonymous function `(params) => body`.
///
/// Closes over the enclosing scope; mutation of captured names requires a
/// `nonlocal` declaration inside a block body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Arrow {
    pub params: Vec<Parameter>,
    pub body: ArrowBody,
    pub position: Position,
}

impl Arrow {
    pub fn from_pair(pair: Pair<Rule>, file: &str) -> ParseResult<Arrow> {
        let position = Position::from_pair(&pair, file);
        let mut params = vec![];
        let mut body = None;

        for pair in pair.into_inner() {
            match pair.as_rule() {
                Rule::arrow_params => {
                    for param in pair.into_inner() {
                        params.push(Parameter::from_ident(param, file)?);
                    }
                }
                Rule::block => body = Some(ArrowBody::Block(Block::from_pair(pair, file)?)),
                _ => {
                    body = Some(ArrowBody::Expression(Box::new(Expression::from_pair(
                        pair, file,
                    )?)))
                }
            }
        }

        let body = body.ok_or_else(|| ParseError::malformed("arrow function", position.clone()))?;

        Ok(Arrow {
            params,
            body,
            position,
        })
    }
}
