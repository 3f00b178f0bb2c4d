//! Path parser: turns expression text into an [`Expr`]

use std::fmt;
use std::str::FromStr;

use crate::ast::*;
use crate::error::{PathError, Result};
use crate::functions;

/// Parse expression text into an AST
pub fn parse(input: &str) -> Result<Expr> {
    let mut parser = Parser::new(input);
    let expr = parser.parse_expr()?;
    parser.skip_whitespace();
    if parser.pos < input.len() {
        return Err(parser.error("unexpected trailing input"));
    }
    Ok(expr)
}

/// An expression compiled once and evaluated many times
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledPath {
    source: String,
    expr: Expr,
}

impl CompiledPath {
    /// Compile expression text
    pub fn compile(source: &str) -> Result<Self> {
        Ok(Self {
            source: source.to_string(),
            expr: parse(source)?,
        })
    }

    /// The original text
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The parsed expression
    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// Whether the expression is an absolute location path
    pub fn is_absolute(&self) -> bool {
        self.expr.as_location_path().is_some_and(|p| p.absolute)
    }
}

impl fmt::Display for CompiledPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl FromStr for CompiledPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self> {
        CompiledPath::compile(s)
    }
}

fn is_name_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-' || c == '.'
}

const NODE_TYPES: [&str; 4] = ["node", "text", "comment", "processing-instruction"];

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn error(&self, message: impl Into<String>) -> PathError {
        PathError::Syntax {
            expression: self.input.to_string(),
            position: self.pos,
            message: message.into(),
        }
    }

    fn remaining(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.remaining().chars().next()
    }

    fn peek_nth(&self, n: usize) -> Option<char> {
        self.remaining().chars().nth(n)
    }

    fn advance(&mut self, n: usize) {
        self.pos += n;
    }

    fn bump(&mut self) {
        if let Some(c) = self.peek() {
            self.advance(c.len_utf8());
        }
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(|c| c.is_whitespace()) {
            self.bump();
        }
    }

    fn expect_char(&mut self, expected: char) -> Result<()> {
        self.skip_whitespace();
        match self.peek() {
            Some(c) if c == expected => {
                self.bump();
                Ok(())
            }
            Some(c) => Err(self.error(format!("expected '{}', got '{}'", expected, c))),
            None => Err(self.error(format!("expected '{}', got end of input", expected))),
        }
    }

    /// Consume an operator keyword (`and`, `or`, `div`, `mod`) when it stands
    /// alone as a word.
    fn eat_keyword(&mut self, keyword: &str) -> bool {
        self.skip_whitespace();
        let rem = self.remaining();
        if rem.starts_with(keyword)
            && !rem[keyword.len()..]
                .chars()
                .next()
                .is_some_and(is_name_char)
        {
            self.advance(keyword.len());
            true
        } else {
            false
        }
    }

    fn eat_symbol(&mut self, symbol: &str) -> bool {
        self.skip_whitespace();
        if self.remaining().starts_with(symbol) {
            self.advance(symbol.len());
            true
        } else {
            false
        }
    }

    fn parse_ncname(&mut self) -> Result<String> {
        let start = self.pos;
        if !self.peek().is_some_and(is_name_start) {
            return Err(self.error("expected name"));
        }
        while self.peek().is_some_and(is_name_char) {
            self.bump();
        }
        Ok(self.input[start..self.pos].to_string())
    }

    // ── Operators, loosest first ─────────────────────────────────────────

    fn parse_expr(&mut self) -> Result<Expr> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut left = self.parse_and()?;
        while self.eat_keyword("or") {
            let right = self.parse_and()?;
            left = binary(BinaryOp::Or, left, right);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut left = self.parse_equality()?;
        while self.eat_keyword("and") {
            let right = self.parse_equality()?;
            left = binary(BinaryOp::And, left, right);
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<Expr> {
        let mut left = self.parse_relational()?;
        loop {
            let op = if self.eat_symbol("!=") {
                BinaryOp::Ne
            } else if self.eat_symbol("=") {
                BinaryOp::Eq
            } else {
                break;
            };
            let right = self.parse_relational()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_relational(&mut self) -> Result<Expr> {
        let mut left = self.parse_additive()?;
        loop {
            let op = if self.eat_symbol("<=") {
                BinaryOp::Le
            } else if self.eat_symbol("<") {
                BinaryOp::Lt
            } else if self.eat_symbol(">=") {
                BinaryOp::Ge
            } else if self.eat_symbol(">") {
                BinaryOp::Gt
            } else {
                break;
            };
            let right = self.parse_additive()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Expr> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = if self.eat_symbol("+") {
                BinaryOp::Add
            } else if self.eat_symbol("-") {
                BinaryOp::Sub
            } else {
                break;
            };
            let right = self.parse_multiplicative()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let op = if self.eat_symbol("*") {
                BinaryOp::Mul
            } else if self.eat_keyword("div") {
                BinaryOp::Div
            } else if self.eat_keyword("mod") {
                BinaryOp::Mod
            } else {
                break;
            };
            let right = self.parse_unary()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        if self.eat_symbol("-") {
            let operand = self.parse_unary()?;
            return Ok(Expr::Negate(Box::new(operand)));
        }
        self.parse_union()
    }

    fn parse_union(&mut self) -> Result<Expr> {
        let mut left = self.parse_path_expr()?;
        while self.eat_symbol("|") {
            let right = self.parse_path_expr()?;
            left = Expr::Union(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    // ── Paths and primaries ──────────────────────────────────────────────

    fn parse_path_expr(&mut self) -> Result<Expr> {
        self.skip_whitespace();
        match self.peek() {
            Some('/') => Ok(Expr::Path(self.parse_absolute_path()?)),
            Some('(') | Some('\'') | Some('"') => self.parse_filter_expr(),
            Some('$') => Err(self.error("variable references are not supported")),
            Some(c) if c.is_ascii_digit() => self.parse_filter_expr(),
            Some('.') if self.peek_nth(1).is_some_and(|c| c.is_ascii_digit()) => {
                self.parse_filter_expr()
            }
            Some(c) if is_name_start(c) && self.at_function_call() => self.parse_filter_expr(),
            Some(_) => Ok(Expr::Path(LocationPath {
                absolute: false,
                steps: self.parse_relative_steps()?,
            })),
            None => Err(self.error("unexpected end of expression")),
        }
    }

    /// A name followed by `(` that is not a node type test
    fn at_function_call(&mut self) -> bool {
        let start = self.pos;
        let name = self.parse_function_name().ok();
        self.skip_whitespace();
        let is_call = self.peek() == Some('(')
            && name.is_some_and(|n| !NODE_TYPES.contains(&n.as_str()));
        self.pos = start;
        is_call
    }

    fn parse_function_name(&mut self) -> Result<String> {
        let first = self.parse_ncname()?;
        if self.peek() == Some(':') && self.peek_nth(1).is_some_and(is_name_start) {
            self.bump();
            let local = self.parse_ncname()?;
            return Ok(format!("{}:{}", first, local));
        }
        Ok(first)
    }

    fn parse_filter_expr(&mut self) -> Result<Expr> {
        let primary = self.parse_primary()?;
        let predicates = self.parse_predicates()?;
        let mut steps = Vec::new();
        self.skip_whitespace();
        if self.remaining().starts_with('/') {
            steps = self.parse_step_continuation()?;
        }
        if predicates.is_empty() && steps.is_empty() {
            return Ok(primary);
        }
        Ok(Expr::Filter {
            primary: Box::new(primary),
            predicates,
            steps,
        })
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        self.skip_whitespace();
        match self.peek() {
            Some('(') => {
                self.bump();
                let expr = self.parse_expr()?;
                self.expect_char(')')?;
                Ok(expr)
            }
            Some('\'') | Some('"') => Ok(Expr::Literal(self.parse_literal()?)),
            Some(c) if c.is_ascii_digit() || c == '.' => Ok(Expr::Number(self.parse_number()?)),
            Some(_) => self.parse_function_call(),
            None => Err(self.error("unexpected end of expression")),
        }
    }

    fn parse_literal(&mut self) -> Result<String> {
        let quote = self
            .peek()
            .ok_or_else(|| self.error("expected string literal"))?;
        self.bump();
        let start = self.pos;
        match self.remaining().find(quote) {
            Some(len) => {
                self.advance(len);
                let s = self.input[start..self.pos].to_string();
                self.bump();
                Ok(s)
            }
            None => Err(self.error("unterminated string literal")),
        }
    }

    fn parse_number(&mut self) -> Result<f64> {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
        }
        if self.peek() == Some('.') {
            self.bump();
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.bump();
            }
        }
        self.input[start..self.pos]
            .parse()
            .map_err(|_| self.error("invalid number"))
    }

    fn parse_function_call(&mut self) -> Result<Expr> {
        let name_pos = self.pos;
        let name = self.parse_function_name()?;
        self.expect_char('(')?;
        let mut args = Vec::new();
        self.skip_whitespace();
        if self.peek() != Some(')') {
            loop {
                args.push(self.parse_expr()?);
                if !self.eat_symbol(",") {
                    break;
                }
            }
        }
        self.expect_char(')')?;

        let (min, max) = functions::arity(&name).ok_or_else(|| PathError::Syntax {
            expression: self.input.to_string(),
            position: name_pos,
            message: format!("unknown function '{}'", name),
        })?;
        if args.len() < min || max.is_some_and(|m| args.len() > m) {
            return Err(PathError::Syntax {
                expression: self.input.to_string(),
                position: name_pos,
                message: format!(
                    "function '{}' does not accept {} argument(s)",
                    name,
                    args.len()
                ),
            });
        }
        Ok(Expr::Function { name, args })
    }

    fn parse_absolute_path(&mut self) -> Result<LocationPath> {
        let mut steps = Vec::new();
        if self.remaining().starts_with("//") {
            self.advance(2);
            steps.push(Step::new(Axis::DescendantOrSelf, NodeTest::Node));
            steps.extend(self.parse_relative_steps()?);
        } else {
            self.advance(1);
            self.skip_whitespace();
            if self.at_step_start() {
                steps = self.parse_relative_steps()?;
            }
        }
        Ok(LocationPath {
            absolute: true,
            steps,
        })
    }

    fn at_step_start(&self) -> bool {
        self.peek()
            .is_some_and(|c| is_name_start(c) || matches!(c, '*' | '@' | '.'))
    }

    fn parse_relative_steps(&mut self) -> Result<Vec<Step>> {
        let mut steps = vec![self.parse_step()?];
        self.skip_whitespace();
        if self.remaining().starts_with('/') {
            steps.extend(self.parse_step_continuation()?);
        }
        Ok(steps)
    }

    /// `(/step | //step)*`
    fn parse_step_continuation(&mut self) -> Result<Vec<Step>> {
        let mut steps = Vec::new();
        loop {
            self.skip_whitespace();
            if self.remaining().starts_with("//") {
                self.advance(2);
                steps.push(Step::new(Axis::DescendantOrSelf, NodeTest::Node));
            } else if self.remaining().starts_with('/') {
                self.advance(1);
            } else {
                break;
            }
            steps.push(self.parse_step()?);
        }
        Ok(steps)
    }

    fn parse_step(&mut self) -> Result<Step> {
        self.skip_whitespace();
        if self.remaining().starts_with("..") {
            self.advance(2);
            return Ok(Step::new(Axis::Parent, NodeTest::Node));
        }
        if self.peek() == Some('.') {
            self.bump();
            return Ok(Step::new(Axis::SelfAxis, NodeTest::Node));
        }

        let axis = if self.peek() == Some('@') {
            self.bump();
            Axis::Attribute
        } else {
            self.parse_axis_specifier()?.unwrap_or(Axis::Child)
        };
        let test = self.parse_node_test()?;
        let predicates = self.parse_predicates()?;
        Ok(Step {
            axis,
            test,
            predicates,
        })
    }

    fn parse_axis_specifier(&mut self) -> Result<Option<Axis>> {
        let start = self.pos;
        let Ok(name) = self.parse_ncname() else {
            self.pos = start;
            return Ok(None);
        };
        self.skip_whitespace();
        if !self.remaining().starts_with("::") {
            self.pos = start;
            return Ok(None);
        }
        let axis = Axis::from_name(&name).ok_or_else(|| PathError::Syntax {
            expression: self.input.to_string(),
            position: start,
            message: format!("unknown axis '{}'", name),
        })?;
        self.advance(2);
        Ok(Some(axis))
    }

    fn parse_node_test(&mut self) -> Result<NodeTest> {
        self.skip_whitespace();
        if self.peek() == Some('*') {
            self.bump();
            return Ok(NodeTest::Wildcard { prefix: None });
        }
        let first = self
            .parse_ncname()
            .map_err(|_| self.error("expected node test"))?;

        if self.peek() == Some(':') && self.peek_nth(1) != Some(':') {
            self.bump();
            if self.peek() == Some('*') {
                self.bump();
                return Ok(NodeTest::Wildcard {
                    prefix: Some(first),
                });
            }
            let local = self.parse_ncname()?;
            return Ok(NodeTest::Name {
                prefix: Some(first),
                local,
            });
        }

        let after_name = self.pos;
        self.skip_whitespace();
        if self.peek() == Some('(') && NODE_TYPES.contains(&first.as_str()) {
            self.bump();
            self.expect_char(')')?;
            return match first.as_str() {
                "node" => Ok(NodeTest::Node),
                "text" => Ok(NodeTest::Text),
                "comment" => Ok(NodeTest::Comment),
                _ => Err(self.error("processing-instruction() is not supported")),
            };
        }
        self.pos = after_name;
        Ok(NodeTest::Name {
            prefix: None,
            local: first,
        })
    }

    fn parse_predicates(&mut self) -> Result<Vec<Expr>> {
        let mut predicates = Vec::new();
        loop {
            self.skip_whitespace();
            if self.peek() != Some('[') {
                break;
            }
            self.bump();
            predicates.push(self.parse_expr()?);
            self.expect_char(']')?;
        }
        Ok(predicates)
    }
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn name(local: &str) -> NodeTest {
        NodeTest::Name {
            prefix: None,
            local: local.into(),
        }
    }

    #[test]
    fn test_parse_absolute_path() {
        let expr = parse("/a/b").unwrap();
        assert_eq!(
            expr,
            Expr::Path(LocationPath {
                absolute: true,
                steps: vec![Step::new(Axis::Child, name("a")), Step::new(Axis::Child, name("b"))],
            })
        );
    }

    #[test]
    fn test_parse_root_only() {
        let path = parse("/").unwrap();
        assert_eq!(
            path,
            Expr::Path(LocationPath {
                absolute: true,
                steps: vec![]
            })
        );
    }

    #[test]
    fn test_parse_attribute_and_abbreviations() {
        let expr = parse("../@id").unwrap();
        let path = expr.as_location_path().unwrap();
        assert_eq!(path.steps[0], Step::new(Axis::Parent, NodeTest::Node));
        assert_eq!(path.steps[1], Step::new(Axis::Attribute, name("id")));
    }

    #[test]
    fn test_parse_descendant_abbreviation() {
        let expr = parse("//item").unwrap();
        let path = expr.as_location_path().unwrap();
        assert!(path.absolute);
        assert_eq!(path.steps[0].axis, Axis::DescendantOrSelf);
        assert_eq!(path.steps[1].test, name("item"));
    }

    #[test]
    fn test_parse_explicit_axis() {
        let expr = parse("following-sibling::b[1]").unwrap();
        let step = &expr.as_location_path().unwrap().steps[0];
        assert_eq!(step.axis, Axis::FollowingSibling);
        assert_eq!(step.predicates, vec![Expr::Number(1.0)]);
    }

    #[test]
    fn test_parse_predicate_equality() {
        let expr = parse("item[@key='x']").unwrap();
        let step = &expr.as_location_path().unwrap().steps[0];
        assert!(matches!(
            &step.predicates[0],
            Expr::Binary {
                op: BinaryOp::Eq,
                ..
            }
        ));
    }

    #[test]
    fn test_star_is_wildcard_or_multiply() {
        let expr = parse("* * 2").unwrap();
        match expr {
            Expr::Binary { op, left, .. } => {
                assert_eq!(op, BinaryOp::Mul);
                let step = &left.as_location_path().unwrap().steps[0];
                assert_eq!(step.test, NodeTest::Wildcard { prefix: None });
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_hyphenated_names() {
        let expr = parse("first-name").unwrap();
        assert_eq!(expr.as_location_path().unwrap().steps[0].test, name("first-name"));
    }

    #[test]
    fn test_keyword_operators() {
        let expr = parse("a div 2 and b mod 3 or c").unwrap();
        assert!(matches!(
            expr,
            Expr::Binary {
                op: BinaryOp::Or,
                ..
            }
        ));
    }

    #[test]
    fn test_function_call_and_node_type() {
        let expr = parse("count(a/text())").unwrap();
        match expr {
            Expr::Function { name, args } => {
                assert_eq!(name, "count");
                let steps = &args[0].as_location_path().unwrap().steps;
                assert_eq!(steps[1].test, NodeTest::Text);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_prefixed_names() {
        let expr = parse("/ns:a/ns:*").unwrap();
        let steps = &expr.as_location_path().unwrap().steps;
        assert_eq!(
            steps[0].test,
            NodeTest::Name {
                prefix: Some("ns".into()),
                local: "a".into()
            }
        );
        assert_eq!(
            steps[1].test,
            NodeTest::Wildcard {
                prefix: Some("ns".into())
            }
        );
    }

    #[test]
    fn test_filter_expression_with_steps() {
        let expr = parse("(a | b)[1]/c").unwrap();
        match expr {
            Expr::Filter {
                predicates, steps, ..
            } => {
                assert_eq!(predicates.len(), 1);
                assert_eq!(steps.len(), 1);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_unknown_function_rejected() {
        let err = parse("frobnicate(1)").unwrap_err();
        assert!(err.is_syntax());
        assert!(err.to_string().contains("frobnicate"));
    }

    #[test]
    fn test_wrong_arity_rejected() {
        assert!(parse("count()").unwrap_err().is_syntax());
        assert!(parse("concat('a')").unwrap_err().is_syntax());
        assert!(parse("true(1)").unwrap_err().is_syntax());
    }

    #[test]
    fn test_malformed_expressions() {
        for bad in ["", "/a[", "a/", "'open", "a b", "bogus::x", "$var", "@"] {
            assert!(parse(bad).unwrap_err().is_syntax(), "accepted {:?}", bad);
        }
    }

    #[test]
    fn test_compiled_path_display() {
        let path: CompiledPath = "/a/b[@c='d']".parse().unwrap();
        assert_eq!(path.to_string(), "/a/b[@c='d']");
        assert!(path.is_absolute());
    }
}
