use pest::iterators::Pair;
use serde::{Deserialize, Serialize};

use super::{Block, Identifier, ParseError, ParseResult, Position, Rule};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: Identifier,
    pub position: Position,
}

impl Parameter {
    pub fn from_ident(pair: Pair<Rule>, file: &str) -> ParseResult<Parameter> {
        let position = Position::from_pair(&pair, file);
        Ok(Parameter {
            name: Identifier::from_pair(pair, file)?,
            position,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDef {
    pub name: Identifier,
    pub params: Vec<Parameter>,
    pub body: Block,
    pub position: Position,
}

impl FunctionDef {
    pub fn from_pair(pair: Pair<Rule>, file: &str) -> ParseResult<FunctionDef> {
        let position = Position::from_pair(&pair, file);
        let mut inner = pair.into_inner();

        // skip the `function` keyword token
        inner.next();

        let name_pair = inner
            .next()
            .ok_or_else(|| ParseError::malformed("function definition", position.clone()))?;
        let name = Identifier::from_pair(name_pair, file)?;

        let mut params = vec![];
        let mut body = None;

        for pair in inner {
            match pair.as_rule() {
                Rule::param_list => {
                    for param in pair.into_inner() {
                        params.push(Parameter::from_ident(param, file)?);
                    }
                }
                Rule::block => body = Some(Block::from_pair(pair, file)?),
                _ => return Err(ParseError::malformed("function definition", position)),
            }
        }

        let body =
            body.ok_or_else(|| ParseError::malformed("function definition", position.clone()))?;

        Ok(FunctionDef {
            name,
            params,
            body,
            position,
        })
    }
}
