use pest::iterators::Pair;
use serde::{Deserialize, Serialize};

use super::{
    Array, Arrow, Binary, BinaryOp, Call, Compare, CompareOp, Identifier, Index, Literal, Logical,
    LogicalOp, Member, Object, ParseError, ParseResult, Position, Rule, Slice, Ternary, Unary,
    UnaryOp,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expression {
    Literal(Literal),
    Array(Array),
    Object(Object),
    Identifier(Identifier),
    Member(Member),
    Index(Index),
    Slice(Slice),
    Call(Call),
    Unary(Unary),
    Binary(Binary),
    Logical(Logical),
    Compare(Compare),
    Ternary(Ternary),
    Arrow(Arrow),
}

impl Expression {
    pub fn position(&self) -> Position {
        match self {
            Expression::Literal(node) => node.position.clone(),
            Expression::Array(node) => node.position.clone(),
            Expression::Object(node) => node.position.clone(),
            Expression::Identifier(node) => node.position.clone(),
            Expression::Member(node) => node.position.clone(),
            Expression::Index(node) => node.position.clone(),
            Expression::Slice(node) => node.position.clone(),
            Expression::Call(node) => node.position.clone(),
            Expression::Unary(node) => node.position.clone(),
            Expression::Binary(node) => node.position.clone(),
            Expression::Logical(node) => node.position.clone(),
            Expression::Compare(node) => node.position.clone(),
            Expression::Ternary(node) => node.position.clone(),
            Expression::Arrow(node) => node.position.clone(),
        }
    }

    pub fn from_pair(pair: Pair<Rule>, file: &str) -> ParseResult<Expression> {
        match pair.as_rule() {
            Rule::expression => {
                let position = Position::from_pair(&pair, file);
                let inner = pair
                    .into_inner()
                    .next()
                    .ok_or_else(|| ParseError::malformed("expression", position))?;
                Self::from_pair(inner, file)
            }
            Rule::ternary => Self::from_ternary(pair, file),
            Rule::logical_or | Rule::logical_and => Self::from_logical(pair, file),
            Rule::equality | Rule::comparison => Self::from_comparison(pair, file),
            Rule::additive | Rule::multiplicative => Self::from_binary(pair, file),
            Rule::unary => Self::from_unary(pair, file),
            Rule::postfix => Self::from_postfix(pair, file),
            Rule::primary => Self::from_primary(pair, file),
            _ => Err(ParseError::malformed(
                "expression",
                Position::from_pair(&pair, file),
            )),
        }
    }

    fn from_ternary(pair: Pair<Rule>, file: &str) -> ParseResult<Expression> {
        let position = Position::from_pair(&pair, file);
        let mut inner = pair.into_inner();

        let condition_pair = inner
            .next()
            .ok_or_else(|| ParseError::malformed("ternary expression", position.clone()))?;
        let condition = Self::from_pair(condition_pair, file)?;

        let Some(then_pair) = inner.next() else {
            return Ok(condition);
        };
        let then_branch = Self::from_pair(then_pair, file)?;

        let else_pair = inner
            .next()
            .ok_or_else(|| ParseError::malformed("ternary expression", position.clone()))?;
        let else_branch = Self::from_pair(else_pair, file)?;

        Ok(Expression::Ternary(Ternary {
            condition: Box::new(condition),
            then_branch: Box::new(then_branch),
            else_branch: Box::new(else_branch),
            position,
        }))
    }

    fn from_logical(pair: Pair<Rule>, file: &str) -> ParseResult<Expression> {
        let position = Position::from_pair(&pair, file);
        let mut inner = pair.into_inner();

        let first = inner
            .next()
            .ok_or_else(|| ParseError::malformed("logical expression", position.clone()))?;
        let mut lhs = Self::from_pair(first, file)?;

        while let Some(op_pair) = inner.next() {
            let op = match op_pair.as_rule() {
                Rule::and_op => LogicalOp::And,
                Rule::or_op => LogicalOp::Or,
                _ => return Err(ParseError::malformed("logical operator", position)),
            };
            let rhs_pair = inner
                .next()
                .ok_or_else(|| ParseError::malformed("logical expression", position.clone()))?;
            let rhs = Self::from_pair(rhs_pair, file)?;

            let node_position = lhs.position();
            lhs = Expression::Logical(Logical {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                position: node_position,
            });
        }

        Ok(lhs)
    }

    fn from_comparison(pair: Pair<Rule>, file: &str) -> ParseResult<Expression> {
        let position = Position::from_pair(&pair, file);
        let mut inner = pair.into_inner();

        let first = inner
            .next()
            .ok_or_else(|| ParseError::malformed("comparison", position.clone()))?;
        let mut lhs = Self::from_pair(first, file)?;

        while let Some(op_pair) = inner.next() {
            let op = CompareOp::from_str(op_pair.as_str())
                .ok_or_else(|| ParseError::malformed("comparison operator", position.clone()))?;
            let rhs_pair = inner
                .next()
                .ok_or_else(|| ParseError::malformed("comparison", position.clone()))?;
            let rhs = Self::from_pair(rhs_pair, file)?;

            let node_position = lhs.position();
            lhs = Expression::Compare(Compare {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                position: node_position,
            });
        }

        Ok(lhs)
    }

    fn from_binary(pair: Pair<Rule>, file: &str) -> ParseResult<Expression> {
        let position = Position::from_pair(&pair, file);
        let mut inner = pair.into_inner();

        let first = inner
            .next()
            .ok_or_else(|| ParseError::malformed("binary expression", position.clone()))?;
        let mut lhs = Self::from_pair(first, file)?;

        while let Some(op_pair) = inner.next() {
            let op = BinaryOp::from_str(op_pair.as_str())
                .ok_or_else(|| ParseError::malformed("binary operator", position.clone()))?;
            let rhs_pair = inner
                .next()
                .ok_or_else(|| ParseError::malformed("binary expression", position.clone()))?;
            let rhs = Self::from_pair(rhs_pair, file)?;

            let node_position = lhs.position();
            lhs = Expression::Binary(Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                position: node_position,
            });
        }

        Ok(lhs)
    }

    fn from_unary(pair: Pair<Rule>, file: &str) -> ParseResult<Expression> {
        let position = Position::from_pair(&pair, file);
        let mut inner = pair.into_inner();

        let first = inner
            .next()
            .ok_or_else(|| ParseError::malformed("unary expression", position.clone()))?;

        match first.as_rule() {
            Rule::unary_op => {
                let op = match first.as_str() {
                    "-" => UnaryOp::Neg,
                    "!" => UnaryOp::Not,
                    _ => return Err(ParseError::malformed("unary operator", position)),
                };
                let operand_pair = inner
                    .next()
                    .ok_or_else(|| ParseError::malformed("unary expression", position.clone()))?;
                let operand = Self::from_pair(operand_pair, file)?;

                Ok(Expression::Unary(Unary {
                    op,
                    operand: Box::new(operand),
                    position,
                }))
            }
            _ => Self::from_pair(first, file),
        }
    }

    fn from_postfix(pair: Pair<Rule>, file: &str) -> ParseResult<Expression> {
        let position = Position::from_pair(&pair, file);
        let mut inner = pair.into_inner();

        let primary = inner
            .next()
            .ok_or_else(|| ParseError::malformed("postfix expression", position.clone()))?;
        let mut expression = Self::from_pair(primary, file)?;

        for op_pair in inner {
            let op_position = Position::from_pair(&op_pair, file);
            let op = op_pair
                .into_inner()
                .next()
                .ok_or_else(|| ParseError::malformed("postfix operator", op_position.clone()))?;

            expression = match op.as_rule() {
                Rule::call_args => {
                    let mut args = vec![];
                    for arg in op.into_inner() {
                        args.push(Self::from_pair(arg, file)?);
                    }
                    Expression::Call(Call {
                        callee: Box::new(expression),
                        args,
                        position: op_position,
                    })
                }
                Rule::member_access => {
                    let property_pair = op.into_inner().next().ok_or_else(|| {
                        ParseError::malformed("member access", op_position.clone())
                    })?;
                    Expression::Member(Member {
                        object: Box::new(expression),
                        property: Identifier::from_pair(property_pair, file)?,
                        position: op_position,
                    })
                }
                Rule::index_access => {
                    let index_pair = op
                        .into_inner()
                        .next()
                        .ok_or_else(|| ParseError::malformed("index access", op_position.clone()))?;
                    Expression::Index(Index {
                        object: Box::new(expression),
                        index: Box::new(Self::from_pair(index_pair, file)?),
                        position: op_position,
                    })
                }
                Rule::slice_access => {
                    let mut start = None;
                    let mut stop = None;
                    let mut step = None;
                    for component in op.into_inner() {
                        let slot = match component.as_rule() {
                            Rule::slice_start => &mut start,
                            Rule::slice_stop => &mut stop,
                            Rule::slice_step => &mut step,
                            _ => {
                                return Err(ParseError::malformed(
                                    "slice component",
                                    op_position.clone(),
                                ))
                            }
                        };
                        let expression_pair = component.into_inner().next().ok_or_else(|| {
                            ParseError::malformed("slice component", op_position.clone())
                        })?;
                        *slot = Some(Box::new(Self::from_pair(expression_pair, file)?));
                    }
                    Expression::Slice(Slice {
                        object: Box::new(expression),
                        start,
                        stop,
                        step,
                        position: op_position,
                    })
                }
                _ => return Err(ParseError::malformed("postfix operator", op_position)),
            };
        }

        Ok(expression)
    }

    fn from_primary(pair: Pair<Rule>, file: &str) -> ParseResult<Expression> {
        let position = Position::from_pair(&pair, file);
        let inner = pair
            .into_inner()
            .next()
            .ok_or_else(|| ParseError::malformed("primary expression", position))?;

        match inner.as_rule() {
            Rule::number => Ok(Expression::Literal(Literal::from_number(inner, file)?)),
            Rule::string => Ok(Expression::Literal(Literal::from_string(inner, file)?)),
            Rule::boolean => Ok(Expression::Literal(Literal::from_boolean(inner, file)?)),
            Rule::null => Ok(Expression::Literal(Literal::from_null(inner, file)?)),
            Rule::arrow_fn => Ok(Expression::Arrow(Arrow::from_pair(inner, file)?)),
            Rule::array => Ok(Expression::Array(Array::from_pair(inner, file)?)),
            Rule::object => Ok(Expression::Object(Object::from_pair(inner, file)?)),
            Rule::ident => Ok(Expression::Identifier(Identifier::from_pair(inner, file)?)),
            Rule::expression => Self::from_pair(inner, file),
            _ => Err(ParseError::malformed(
                "primary expression",
                Position::from_pair(&inner, file),
            )),
        }
    }
}
