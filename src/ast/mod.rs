//! AST for the Sly language.
//!
//! Nodes are built from the grammar pairs produced by [`SlyParser`]; every
//! node carries a [`Position`] into its source unit, preserved through all
//! later passes.

mod arrow;
mod assignment;
mod block;
mod capability_decl;
mod collections;
mod expression;
mod format;
mod function_def;
mod ident;
mod if_statement;
mod import;
mod literal;
mod loops;
mod operators;
mod parse_error;
mod parser;
mod position;
mod postfix;
mod source;
mod statement;
mod try_statement;

pub use self::arrow::{Arrow, ArrowBody};
pub use self::assignment::{AssignTarget, Assignment, Destructure, PatternKind};
pub use self::block::Block;
pub use self::capability_decl::{AllowRule, CapabilityDecl, ResourceRule};
pub use self::collections::{Array, Object, ObjectEntry};
pub use self::expression::Expression;
pub use self::function_def::{FunctionDef, Parameter};
pub use self::ident::Identifier;
pub use self::if_statement::{Elif, If};
pub use self::import::Import;
pub use self::literal::{Literal, LiteralValue};
pub use self::loops::{Break, Continue, For, While};
pub use self::operators::{
    Binary, BinaryOp, Compare, CompareOp, Logical, LogicalOp, Ternary, Unary, UnaryOp,
};
pub use self::parse_error::{ParseError, ParseResult};
pub use self::parser::{Rule, SlyParser};
pub use self::position::Position;
pub use self::postfix::{Call, Index, Member, Slice};
pub use self::source::{strip_comments, SourceUnit};
pub use self::statement::{Nonlocal, Return, Statement};
pub use self::try_statement::{Except, Throw, Try};

use pest::iterators::Pair;
use serde::{Deserialize, Serialize};

/// A parsed module: the root of the AST for one source unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ast {
    pub statements: Vec<Statement>,
    pub position: Position,
}

impl Ast {
    pub fn from_program(program: Pair<Rule>, file: &str) -> ParseResult<Ast> {
        let position = Position::from_pair(&program, file);
        let mut statements = vec![];

        for pair in program.into_inner() {
            if pair.as_rule() == Rule::EOI {
                continue;
            }
            statements.push(Statement::from_pair(pair, file)?);
        }

        Ok(Ast {
            statements,
            position,
        })
    }

    pub fn nodes(&self) -> &[Statement] {
        &self.statements
    }

    /// Every `capability` block declared at any nesting depth.
    pub fn capability_decls(&self) -> Vec<&CapabilityDecl> {
        fn collect<'a>(statements: &'a [Statement], decls: &mut Vec<&'a CapabilityDecl>) {
            for statement in statements {
                match statement {
                    Statement::Capability(decl) => decls.push(decl),
                    Statement::FunctionDef(def) => collect(&def.body.statements, decls),
                    Statement::If(node) => {
                        collect(&node.then_block.statements, decls);
                        for elif in &node.elif_clauses {
                            collect(&elif.block.statements, decls);
                        }
                        if let Some(block) = &node.else_block {
                            collect(&block.statements, decls);
                        }
                    }
                    Statement::While(node) => collect(&node.body.statements, decls),
                    Statement::For(node) => collect(&node.body.statements, decls),
                    Statement::Try(node) => {
                        collect(&node.body.statements, decls);
                        for clause in &node.except_clauses {
                            collect(&clause.body.statements, decls);
                        }
                        if let Some(block) = &node.finally_block {
                            collect(&block.statements, decls);
                        }
                    }
                    _ => {}
                }
            }
        }

        let mut decls = vec![];
        collect(&self.statements, &mut decls);
        decls
    }

    /// Sorted, deduplicated names of every declared capability.
    pub fn declared_capabilities(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .capability_decls()
            .iter()
            .map(|decl| decl.name.name.clone())
            .collect();
        names.sort();
        names.dedup();
        names
    }
}

/// Parse a source unit into an AST.
pub fn parse(unit: &SourceUnit) -> Result<Ast, Box<ParseError>> {
    let mut pairs = SlyParser::parse_program(&unit.file, &unit.stripped)?;
    let program = pairs.next().ok_or_else(|| {
        Box::new(ParseError::malformed(
            "program",
            Position {
                file: unit.file.clone(),
                line: 1,
                column: 1,
                offset: 0,
            },
        ))
    })?;

    Ast::from_program(program, &unit.file).map_err(Box::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_source(source: &str) -> Ast {
        parse(&SourceUnit::new("test.sly", source)).unwrap()
    }

    #[test]
    fn test_parse_empty_program() {
        let ast = parse_source("");
        assert!(ast.statements.is_empty());
    }

    #[test]
    fn test_parse_arithmetic_assignment() {
        let ast = parse_source("x = 1 + 2 * 3;");
        let [Statement::Assignment(assignment)] = ast.nodes() else {
            panic!("expected a single assignment, got {:?}", ast.nodes());
        };
        let AssignTarget::Identifier(target) = &assignment.target else {
            panic!("expected identifier target");
        };
        assert_eq!(target.name, "x");

        // `+` binds looser than `*`
        let Expression::Binary(add) = &assignment.value else {
            panic!("expected binary expression");
        };
        assert_eq!(add.op, BinaryOp::Add);
        let Expression::Binary(mul) = add.rhs.as_ref() else {
            panic!("expected nested multiplication");
        };
        assert_eq!(mul.op, BinaryOp::Mul);
    }

    #[test]
    fn test_parse_function_definition() {
        let ast = parse_source("function f(n) { if (n <= 1) { return n; } return f(n - 1); }");
        let [Statement::FunctionDef(def)] = ast.nodes() else {
            panic!("expected a function definition");
        };
        assert_eq!(def.name.name, "f");
        assert_eq!(def.params.len(), 1);
        assert_eq!(def.body.statements.len(), 2);
    }

    #[test]
    fn test_parse_if_elif_else() {
        let ast = parse_source("if (a) { x = 1; } elif (b) { x = 2; } elif (c) { x = 3; } else { x = 4; }");
        let [Statement::If(node)] = ast.nodes() else {
            panic!("expected an if statement");
        };
        assert_eq!(node.elif_clauses.len(), 2);
        assert!(node.else_block.is_some());
    }

    #[test]
    fn test_parse_try_except_finally() {
        let ast = parse_source("try { throw {code: 1}; } except (e) { log(e); } finally { log(\"done\"); }");
        let [Statement::Try(node)] = ast.nodes() else {
            panic!("expected a try statement");
        };
        assert_eq!(node.except_clauses.len(), 1);
        assert_eq!(
            node.except_clauses[0].binding.as_ref().map(|b| b.name.as_str()),
            Some("e")
        );
        assert!(node.finally_block.is_some());
    }

    #[test]
    fn test_parse_bare_except() {
        let ast = parse_source("try { x = 1; } except { x = 2; }");
        let [Statement::Try(node)] = ast.nodes() else {
            panic!("expected a try statement");
        };
        assert!(node.except_clauses[0].binding.is_none());
    }

    #[test]
    fn test_parse_slice_forms() {
        for source in ["a[1:2];", "a[1:];", "a[:2];", "a[::2];", "a[1:2:3];", "a[:];"] {
            let ast = parse(&SourceUnit::new("test.sly", source)).unwrap();
            let [Statement::Expression(Expression::Slice(_))] = ast.nodes() else {
                panic!("expected a slice for {source}");
            };
        }
    }

    #[test]
    fn test_slice_components_keep_their_slots() {
        let ast = parse_source("a[1:];");
        let [Statement::Expression(Expression::Slice(slice))] = ast.nodes() else {
            panic!("expected a slice");
        };
        assert!(slice.start.is_some());
        assert!(slice.stop.is_none());

        let ast = parse_source("a[:1];");
        let [Statement::Expression(Expression::Slice(slice))] = ast.nodes() else {
            panic!("expected a slice");
        };
        assert!(slice.start.is_none());
        assert!(slice.stop.is_some());
    }

    #[test]
    fn test_parse_destructuring() {
        let ast = parse_source("[a, b] = pair; {x, y} = point;");
        let [Statement::Destructure(array), Statement::Destructure(object)] = ast.nodes() else {
            panic!("expected two destructuring assignments");
        };
        assert_eq!(array.kind, PatternKind::Array);
        assert_eq!(array.names.len(), 2);
        assert_eq!(object.kind, PatternKind::Object);
    }

    #[test]
    fn test_parse_capability_block() {
        let ast = parse_source(
            "capability file_access { resource \"/tmp/**\"; allow read \"*.txt\"; }",
        );
        let [Statement::Capability(decl)] = ast.nodes() else {
            panic!("expected a capability declaration");
        };
        assert_eq!(decl.name.name, "file_access");
        assert_eq!(decl.resources[0].pattern, "/tmp/**");
        assert_eq!(decl.allows[0].operation.name, "read");
        assert_eq!(decl.allows[0].target, "*.txt");
    }

    #[test]
    fn test_parse_arrow_functions() {
        let ast = parse_source("f = (x) => x + 1; g = (a, b) => { return a * b; };");
        let [Statement::Assignment(f), Statement::Assignment(g)] = ast.nodes() else {
            panic!("expected two assignments");
        };
        let Expression::Arrow(f) = &f.value else {
            panic!("expected arrow function");
        };
        assert!(matches!(f.body, ArrowBody::Expression(_)));
        let Expression::Arrow(g) = &g.value else {
            panic!("expected arrow function");
        };
        assert!(matches!(g.body, ArrowBody::Block(_)));
    }

    #[test]
    fn test_parse_member_vs_index() {
        let ast = parse_source("a.b; a[\"b\"];");
        let [Statement::Expression(Expression::Member(_)), Statement::Expression(Expression::Index(_))] =
            ast.nodes()
        else {
            panic!("member and index access must stay distinct node kinds");
        };
    }

    #[test]
    fn test_parse_floor_division_with_comment() {
        let ast = parse_source("// halve it\nx = 7 // 2;");
        let [Statement::Assignment(assignment)] = ast.nodes() else {
            panic!("expected an assignment");
        };
        let Expression::Binary(binary) = &assignment.value else {
            panic!("expected binary expression");
        };
        assert_eq!(binary.op, BinaryOp::FloorDiv);
    }

    #[test]
    fn test_positions_lie_within_source() {
        let source = "x = 1;\ny = x + 2;\n";
        let ast = parse_source(source);
        for statement in ast.nodes() {
            let position = statement.position();
            assert!(position.offset < source.len());
            assert!(position.line >= 1 && position.line <= 2);
        }
    }

    #[test]
    fn test_parse_error_has_position() {
        let error = parse(&SourceUnit::new("bad.sly", "x = ;")).unwrap_err();
        assert_eq!(error.position.file, "bad.sly");
        assert_eq!(error.position.line, 1);
    }

    #[test]
    fn test_keyword_prefix_identifiers() {
        let ast = parse_source("iffy = 1; returned = 2; format = 3;");
        assert_eq!(ast.nodes().len(), 3);
    }

    #[test]
    fn test_declared_capabilities_are_collected() {
        let ast = parse_source(
            "capability net_access { resource \"https://*/**\"; }\nfunction f() { capability tmp { resource \"/tmp/*\"; } }",
        );
        assert_eq!(ast.declared_capabilities(), vec!["net_access", "tmp"]);
    }
}
