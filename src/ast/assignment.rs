use pest::iterators::Pair;
use serde::{Deserialize, Serialize};

use super::{
    Expression, Identifier, Index, Member, ParseError, ParseResult, Position, Rule,
};

/// Left-hand side of a direct assignment: identifier, member or index access.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AssignTarget {
    Identifier(Identifier),
    Member(Member),
    Index(Index),
}

impl AssignTarget {
    pub fn position(&self) -> Position {
        match self {
            AssignTarget::Identifier(node) => node.position.clone(),
            AssignTarget::Member(node) => node.position.clone(),
            AssignTarget::Index(node) => node.position.clone(),
        }
    }

    fn from_pair(pair: Pair<Rule>, file: &str) -> ParseResult<AssignTarget> {
        let position = Position::from_pair(&pair, file);
        let mut inner = pair.into_inner();

        let base_pair = inner
            .next()
            .ok_or_else(|| ParseError::malformed("assignment target", position.clone()))?;
        let mut target = AssignTarget::Identifier(Identifier::from_pair(base_pair, file)?);

        for access in inner {
            let access_position = Position::from_pair(&access, file);
            let object = match target {
                AssignTarget::Identifier(node) => Expression::Identifier(node),
                AssignTarget::Member(node) => Expression::Member(node),
                AssignTarget::Index(node) => Expression::Index(node),
            };

            target = match access.as_rule() {
                Rule::member_access => {
                    let property_pair = access.into_inner().next().ok_or_else(|| {
                        ParseError::malformed("member access", access_position.clone())
                    })?;
                    AssignTarget::Member(Member {
                        object: Box::new(object),
                        property: Identifier::from_pair(property_pair, file)?,
                        position: access_position,
                    })
                }
                Rule::index_access => {
                    let index_pair = access.into_inner().next().ok_or_else(|| {
                        ParseError::malformed("index access", access_position.clone())
                    })?;
                    AssignTarget::Index(Index {
                        object: Box::new(object),
                        index: Box::new(Expression::from_pair(index_pair, file)?),
                        position: access_position,
                    })
                }
                _ => return Err(ParseError::malformed("assignment target", access_position)),
            };
        }

        Ok(target)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub target: AssignTarget,
    pub value: Expression,
    pub position: Position,
}

impl Assignment {
    pub fn from_pair(pair: Pair<Rule>, file: &str) -> ParseResult<Assignment> {
        let position = Position::from_pair(&pair, file);
        let mut inner = pair.into_inner();

        let target_pair = inner
            .next()
            .ok_or_else(|| ParseError::malformed("assignment", position.clone()))?;
        let target = AssignTarget::from_pair(target_pair, file)?;

        let value_pair = inner
            .next()
            .ok_or_else(|| ParseError::malformed("assignment", position.clone()))?;
        let value = Expression::from_pair(value_pair, file)?;

        Ok(Assignment {
            target,
            value,
            position,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PatternKind {
    Array,
    Object,
}

/// `[a, b] = e` or `{a, b} = e`, binding several names at once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Destructure {
    pub kind: PatternKind,
    pub names: Vec<Identifier>,
    pub value: Expression,
    pub position: Position,
}

impl Destructure {
    pub fn from_pair(pair: Pair<Rule>, file: &str) -> ParseResult<Destructure> {
        let position = Position::from_pair(&pair, file);
        let mut inner = pair.into_inner();

        let pattern_pair = inner
            .next()
            .ok_or_else(|| ParseError::malformed("destructuring assignment", position.clone()))?;
        let kind = match pattern_pair.as_rule() {
            Rule::array_pattern => PatternKind::Array,
            Rule::object_pattern => PatternKind::Object,
            _ => {
                return Err(ParseError::malformed(
                    "destructuring pattern",
                    Position::from_pair(&pattern_pair, file),
                ))
            }
        };

        let mut names = vec![];
        for name in pattern_pair.into_inner() {
            names.push(Identifier::from_pair(name, file)?);
        }

        let value_pair = inner
            .next()
            .ok_or_else(|| ParseError::malformed("destructuring assignment", position.clone()))?;
        let value = Expression::from_pair(value_pair, file)?;

        Ok(Destructure {
            kind,
            names,
            value,
            position,
        })
    }
}
