use pest::iterators::Pair;
use serde::{Deserialize, Serialize};

use super::{Expression, Literal, LiteralValue, ParseError, ParseResult, Position, Rule};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Array {
    pub elements: Vec<Expression>,
    pub position: Position,
}

impl Array {
    pub fn from_pair(pair: Pair<Rule>, file: &str) -> ParseResult<Array> {
        let position = Position::from_pair(&pair, file);
        let mut elements = vec![];

        for element in pair.into_inner() {
            elements.push(Expression::from_pair(element, file)?);
        }

        Ok(Array { elements, position })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectEntry {
    pub key: String,
    pub value: Expression,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Object {
    pub entries: Vec<ObjectEntry>,
    pub position: Position,
}

impl Object {
    pub fn from_pair(pair: Pair<Rule>, file: &str) -> ParseResult<Object> {
        let position = Position::from_pair(&pair, file);
        let mut entries = vec![];

        for entry in pair.into_inner() {
            entries.push(Self::entry_from_pair(entry, file)?);
        }

        Ok(Object { entries, position })
    }

    fn entry_from_pair(pair: Pair<Rule>, file: &str) -> ParseResult<ObjectEntry> {
        let position = Position::from_pair(&pair, file);
        let mut inner = pair.into_inner();

        let key_pair = inner
            .next()
            .ok_or_else(|| ParseError::malformed("object entry", position.clone()))?;
        let key = match key_pair.as_rule() {
            Rule::ident => key_pair.as_str().to_owned(),
            Rule::string => {
                let literal = Literal::from_string(key_pair, file)?;
                match literal.value {
                    LiteralValue::String(value) => value,
                    _ => unreachable!("string literal always yields a string value"),
                }
            }
            _ => return Err(ParseError::malformed("object key", position)),
        };

        let value_pair = inner
            .next()
            .ok_or_else(|| ParseError::malformed("object entry", position.clone()))?;
        let value = Expression::from_pair(value_pair, file)?;

        Ok(ObjectEntry {
            key,
            value,
            position,
        })
    }
}
