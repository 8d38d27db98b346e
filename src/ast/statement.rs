use pest::iterators::Pair;
use serde::{Deserialize, Serialize};

use super::{
    Assignment, Break, CapabilityDecl, Continue, Destructure, Expression, For, FunctionDef,
    Identifier, If, Import, ParseError, ParseResult, Position, Rule, Throw, Try, While,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Return {
    pub value: Option<Expression>,
    pub position: Position,
}

impl Return {
    pub fn from_pair(pair: Pair<Rule>, file: &str) -> ParseResult<Return> {
        let position = Position::from_pair(&pair, file);
        let value = match pair.into_inner().nth(1) {
            Some(value_pair) => Some(Expression::from_pair(value_pair, file)?),
            None => None,
        };

        Ok(Return { value, position })
    }
}

/// `nonlocal name` rebinds assignments of `name` to the nearest enclosing
/// non-global scope that defines it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Nonlocal {
    pub name: Identifier,
    pub position: Position,
}

impl Nonlocal {
    pub fn from_pair(pair: Pair<Rule>, file: &str) -> ParseResult<Nonlocal> {
        let position = Position::from_pair(&pair, file);
        let name_pair = pair
            .into_inner()
            .nth(1)
            .ok_or_else(|| ParseError::malformed("nonlocal statement", position.clone()))?;

        Ok(Nonlocal {
            name: Identifier::from_pair(name_pair, file)?,
            position,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Statement {
    Expression(Expression),
    Assignment(Assignment),
    Destructure(Destructure),
    FunctionDef(FunctionDef),
    If(If),
    While(While),
    For(For),
    Try(Try),
    Throw(Throw),
    Return(Return),
    Break(Break),
    Continue(Continue),
    Import(Import),
    Nonlocal(Nonlocal),
    Capability(CapabilityDecl),
}

impl Statement {
    pub fn position(&self) -> Position {
        match self {
            Statement::Expression(node) => node.position(),
            Statement::Assignment(node) => node.position.clone(),
            Statement::Destructure(node) => node.position.clone(),
            Statement::FunctionDef(node) => node.position.clone(),
            Statement::If(node) => node.position.clone(),
            Statement::While(node) => node.position.clone(),
            Statement::For(node) => node.position.clone(),
            Statement::Try(node) => node.position.clone(),
            Statement::Throw(node) => node.position.clone(),
            Statement::Return(node) => node.position.clone(),
            Statement::Break(node) => node.position.clone(),
            Statement::Continue(node) => node.position.clone(),
            Statement::Import(node) => node.position.clone(),
            Statement::Nonlocal(node) => node.position.clone(),
            Statement::Capability(node) => node.position.clone(),
        }
    }

    pub fn from_pair(pair: Pair<Rule>, file: &str) -> ParseResult<Statement> {
        let position = Position::from_pair(&pair, file);
        match pair.as_rule() {
            Rule::statement | Rule::simple_stmt => {
                let inner = pair
                    .into_inner()
                    .next()
                    .ok_or_else(|| ParseError::malformed("statement", position))?;
                Self::from_pair(inner, file)
            }
            Rule::function_def => Ok(Statement::FunctionDef(FunctionDef::from_pair(pair, file)?)),
            Rule::if_stmt => Ok(Statement::If(If::from_pair(pair, file)?)),
            Rule::while_stmt => Ok(Statement::While(While::from_pair(pair, file)?)),
            Rule::for_stmt => Ok(Statement::For(For::from_pair(pair, file)?)),
            Rule::try_stmt => Ok(Statement::Try(Try::from_pair(pair, file)?)),
            Rule::capability_decl => Ok(Statement::Capability(CapabilityDecl::from_pair(
                pair, file,
            )?)),
            Rule::import_stmt => Ok(Statement::Import(Import::from_pair(pair, file)?)),
            Rule::nonlocal_stmt => Ok(Statement::Nonlocal(Nonlocal::from_pair(pair, file)?)),
            Rule::throw_stmt => Ok(Statement::Throw(Throw::from_pair(pair, file)?)),
            Rule::return_stmt => Ok(Statement::Return(Return::from_pair(pair, file)?)),
            Rule::break_stmt => Ok(Statement::Break(Break { position })),
            Rule::continue_stmt => Ok(Statement::Continue(Continue { position })),
            Rule::destructure => Ok(Statement::Destructure(Destructure::from_pair(pair, file)?)),
            Rule::assignment => Ok(Statement::Assignment(Assignment::from_pair(pair, file)?)),
            Rule::expression => Ok(Statement::Expression(Expression::from_pair(pair, file)?)),
            _ => Err(ParseError::malformed("statement", position)),
        }
    }
}
