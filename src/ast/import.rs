use pest::iterators::Pair;
use serde::{Deserialize, Serialize};

use super::{Identifier, ParseError, ParseResult, Position, Rule};

/// `import name` or `import name as alias`.
///
/// Binds `alias` (or `name`) in the current scope to the module value handed
/// back by the resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Import {
    pub name: Identifier,
    pub alias: Option<Identifier>,
    pub position: Position,
}

impl Import {
    pub fn from_pair(pair: Pair<Rule>, file: &str) -> ParseResult<Import> {
        let position = Position::from_pair(&pair, file);
        let mut inner = pair.into_inner();

        // skip the `import` keyword token
        inner.next();

        let name_pair = inner
            .next()
            .ok_or_else(|| ParseError::malformed("import statement", position.clone()))?;
        let name = Identifier::from_pair(name_pair, file)?;

        // an `as` keyword token, when present, is followed by the alias
        let alias = match inner.next() {
            Some(_kw_as) => {
                let alias_pair = inner
                    .next()
                    .ok_or_else(|| ParseError::malformed("import alias", position.clone()))?;
                Some(Identifier::from_pair(alias_pair, file)?)
            }
            None => None,
        };

        Ok(Import {
            name,
            alias,
            position,
        })
    }

    /// The name this import binds in scope.
    pub fn binding(&self) -> &Identifier {
        self.alias.as_ref().unwrap_or(&self.name)
    }
}
