use log::trace;
use pest::{iterators::Pairs, Parser};
use pest_derive::Parser;

use super::ParseError;

#[derive(Parser)]
#[grammar = "sly.pest"]
pub struct SlyParser;

impl SlyParser {
    /// Parse a whole (comment-stripped) program into grammar pairs.
    pub fn parse_program<'a>(
        file: &str,
        stripped: &'a str,
    ) -> Result<Pairs<'a, Rule>, Box<ParseError>> {
        trace!("parsing program '{file}'");
        match Self::parse(Rule::program, stripped) {
            Ok(pairs) => Ok(pairs),
            Err(error) => Err(Box::new(ParseError::from((error, file, stripped)))),
        }
    }
}
