use pest::iterators::Pair;
use serde::{Deserialize, Serialize};

use super::{Identifier, Literal, LiteralValue, ParseError, ParseResult, Position, Rule};

/// `resource "PATTERN";` inside a capability block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRule {
    pub pattern: String,
    pub position: Position,
}

/// `allow OP "TARGET";` inside a capability block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowRule {
    pub operation: Identifier,
    pub target: String,
    pub position: Position,
}

/// `capability NAME { resource "…"; allow op "…"; … }`.
///
/// Lifted by the code generator to a registration side-effect at module load;
/// the runtime materializes the declaration into a capability token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityDecl {
    pub name: Identifier,
    pub resources: Vec<ResourceRule>,
    pub allows: Vec<AllowRule>,
    pub position: Position,
}

impl CapabilityDecl {
    pub fn from_pair(pair: Pair<Rule>, file: &str) -> ParseResult<CapabilityDecl> {
        let position = Position::from_pair(&pair, file);
        let mut inner = pair.into_inner();

        // skip the `capability` keyword token
        inner.next();

        let name_pair = inner
            .next()
            .ok_or_else(|| ParseError::malformed("capability declaration", position.clone()))?;
        if name_pair.as_rule() != Rule::cap_name {
            return Err(ParseError::malformed(
                "capability name",
                Position::from_pair(&name_pair, file),
            ));
        }
        // capability names may be dotted (`regex.match`), unlike identifiers
        let name = Identifier {
            name: name_pair.as_str().to_owned(),
            position: Position::from_pair(&name_pair, file),
        };

        let mut resources = vec![];
        let mut allows = vec![];

        for item in inner {
            let item_position = Position::from_pair(&item, file);
            let item = item
                .into_inner()
                .next()
                .ok_or_else(|| ParseError::malformed("capability item", item_position.clone()))?;

            match item.as_rule() {
                Rule::resource_item => {
                    let string_pair = item.into_inner().nth(1).ok_or_else(|| {
                        ParseError::malformed("resource rule", item_position.clone())
                    })?;
                    resources.push(ResourceRule {
                        pattern: string_value(string_pair, file)?,
                        position: item_position,
                    });
                }
                Rule::allow_item => {
                    let mut parts = item.into_inner();
                    // skip the `allow` keyword token
                    parts.next();
                    let operation_pair = parts.next().ok_or_else(|| {
                        ParseError::malformed("allow rule", item_position.clone())
                    })?;
                    let target_pair = parts.next().ok_or_else(|| {
                        ParseError::malformed("allow rule", item_position.clone())
                    })?;
                    allows.push(AllowRule {
                        operation: Identifier::from_pair(operation_pair, file)?,
                        target: string_value(target_pair, file)?,
                        position: item_position,
                    });
                }
                _ => return Err(ParseError::malformed("capability item", item_position)),
            }
        }

        Ok(CapabilityDecl {
            name,
            resources,
            allows,
            position,
        })
    }
}

fn string_value(pair: Pair<Rule>, file: &str) -> ParseResult<String> {
    let literal = Literal::from_string(pair, file)?;
    match literal.value {
        LiteralValue::String(value) => Ok(value),
        _ => unreachable!("string literal always yields a string value"),
    }
}
