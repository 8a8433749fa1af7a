//! XPath 1.0 expression tree and its recursive-descent parser.
//!
//! Grammar (abbreviated, matching XPath 1.0 sec 3 plus the YANG/current()
//! additions named in spec.md SS6.3):
//!
//! ```text
//! Expr           ::= OrExpr
//! OrExpr         ::= AndExpr ( 'or' AndExpr )*
//! AndExpr        ::= EqualityExpr ( 'and' EqualityExpr )*
//! EqualityExpr   ::= RelationalExpr ( ('='|'!=') RelationalExpr )*
//! RelationalExpr ::= AdditiveExpr ( ('<'|'>'|'<='|'>=') AdditiveExpr )*
//! AdditiveExpr   ::= MultiplicativeExpr ( ('+'|'-') MultiplicativeExpr )*
//! MultiplicativeExpr ::= UnaryExpr ( ('*'|'div'|'mod') UnaryExpr )*
//! UnaryExpr      ::= '-' UnaryExpr | UnionExpr
//! UnionExpr      ::= PathExpr ( '|' PathExpr )*
//! PathExpr       ::= LocationPath | FilterExpr
//!                   | FilterExpr ('/' | '//') RelativeLocationPath
//! FilterExpr     ::= PrimaryExpr Predicate*
//! PrimaryExpr    ::= '$' VarRef | '(' Expr ')' | Literal | Number | FunctionCall
//! LocationPath   ::= ('/' | '//')? Step (('/' | '//') Step)*
//! Step           ::= '.' | '..' | NodeTest Predicate*
//! ```

use crate::error::XPathError;
use crate::token::{Token, TokenChain, TokenKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Child,
    Descendant,
    DescendantOrSelf,
    Parent,
    SelfAxis,
    Attribute,
    Ancestor,
    AncestorOrSelf,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeTest {
    Name { prefix: Option<String>, local: String },
    Wildcard,
    PrefixWildcard(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepNode {
    pub axis: Axis,
    pub test: NodeTest,
    pub predicates: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PathExpr {
    pub absolute: bool,
    /// `true` when the path starts with `//` (descendant-or-self from root).
    pub leading_descendant: bool,
    pub steps: Vec<StepNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Or(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Compare(CompareOp, Box<Expr>, Box<Expr>),
    Arith(ArithOp, Box<Expr>, Box<Expr>),
    Union(Box<Expr>, Box<Expr>),
    Negate(Box<Expr>),
    Path(PathExpr),
    /// A `FilterExpr` (function call, variable reference, or parenthesized
    /// expression) followed by `/` or `//` and a relative location path
    /// rooted at the filter's result node-set, e.g. `current()/../name`.
    FilterPath(Box<Expr>, PathExpr),
    FunctionCall(String, Vec<Expr>),
    VarRef(String),
    NumberLit(f64),
    StringLit(String),
}

pub fn parse_expr(chain: &TokenChain) -> Result<Expr, XPathError> {
    let mut p = Parser { tokens: chain.tokens(), pos: 0 };
    let expr = p.parse_or()?;
    if p.pos != p.tokens.len() {
        return Err(XPathError::MalformedExpression {
            reason: format!("unexpected trailing token at index {}", p.pos),
        });
    }
    Ok(expr)
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<&'a Token> {
        let t = self.tokens.get(self.pos);
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<&'a Token, XPathError> {
        match self.peek() {
            Some(t) if t.kind == kind => {
                self.pos += 1;
                Ok(t)
            }
            _ => Err(XPathError::MalformedExpression { reason: format!("expected {what}") }),
        }
    }

    fn at_keyword(&self, kw: &str) -> bool {
        matches!(self.peek(), Some(t) if t.kind == TokenKind::Identifier && t.value == kw)
    }

    fn eat_keyword(&mut self, kw: &str) -> bool {
        if self.at_keyword(kw) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn parse_or(&mut self) -> Result<Expr, XPathError> {
        let mut lhs = self.parse_and()?;
        while self.eat_keyword("or") {
            let rhs = self.parse_and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, XPathError> {
        let mut lhs = self.parse_equality()?;
        while self.eat_keyword("and") {
            let rhs = self.parse_equality()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_equality(&mut self) -> Result<Expr, XPathError> {
        let mut lhs = self.parse_relational()?;
        loop {
            let op = match self.peek().map(|t| t.kind) {
                Some(TokenKind::Equal) => CompareOp::Eq,
                Some(TokenKind::NotEqual) => CompareOp::Ne,
                _ => break,
            };
            self.bump();
            let rhs = self.parse_relational()?;
            lhs = Expr::Compare(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_relational(&mut self) -> Result<Expr, XPathError> {
        let mut lhs = self.parse_additive()?;
        loop {
            let op = match self.peek().map(|t| t.kind) {
                Some(TokenKind::Lt) => CompareOp::Lt,
                Some(TokenKind::LEqual) => CompareOp::Le,
                Some(TokenKind::Gt) => CompareOp::Gt,
                Some(TokenKind::GEqual) => CompareOp::Ge,
                _ => break,
            };
            self.bump();
            let rhs = self.parse_additive()?;
            lhs = Expr::Compare(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_additive(&mut self) -> Result<Expr, XPathError> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek().map(|t| t.kind) {
                Some(TokenKind::Plus) => ArithOp::Add,
                Some(TokenKind::Minus) => ArithOp::Sub,
                _ => break,
            };
            self.bump();
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::Arith(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, XPathError> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = if matches!(self.peek().map(|t| t.kind), Some(TokenKind::Star)) {
                ArithOp::Mul
            } else if self.at_keyword("div") {
                ArithOp::Div
            } else if self.at_keyword("mod") {
                ArithOp::Mod
            } else {
                break;
            };
            self.bump();
            let rhs = self.parse_unary()?;
            lhs = Expr::Arith(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, XPathError> {
        if matches!(self.peek().map(|t| t.kind), Some(TokenKind::Minus)) {
            self.bump();
            let inner = self.parse_unary()?;
            return Ok(Expr::Negate(Box::new(inner)));
        }
        self.parse_union()
    }

    fn parse_union(&mut self) -> Result<Expr, XPathError> {
        let mut lhs = self.parse_path_or_primary()?;
        while matches!(self.peek().map(|t| t.kind), Some(TokenKind::Bar)) {
            self.bump();
            let rhs = self.parse_path_or_primary()?;
            lhs = Expr::Union(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    /// Disambiguates a location path from a primary expression: a path
    /// starts with `/`, `//`, `.`, `..`, `@`, or a name test. A primary
    /// expression (function call, variable reference, parenthesized expr)
    /// may still be followed by `/` or `//` and a relative location path,
    /// per XPath 1.0's `FilterExpr ('/' | '//') RelativeLocationPath`.
    fn parse_path_or_primary(&mut self) -> Result<Expr, XPathError> {
        match self.peek().map(|t| t.kind) {
            Some(TokenKind::FSlash) | Some(TokenKind::DblFSlash) => return self.parse_location_path(),
            Some(TokenKind::Period) | Some(TokenKind::AtSign) | Some(TokenKind::RangeSep) => return self.parse_location_path(),
            Some(TokenKind::Identifier) | Some(TokenKind::PrefixedIdentifier)
            | Some(TokenKind::ScopedIdentifier) | Some(TokenKind::Star)
            | Some(TokenKind::NcNameStar) => {
                // A name immediately followed by '(' is a function call,
                // unless it is a recognised axis name followed by '::'.
                if !self.looks_like_function_call() {
                    return self.parse_location_path();
                }
            }
            _ => {}
        }
        let primary = self.parse_primary()?;
        self.parse_filter_path_continuation(primary)
    }

    /// After a `FilterExpr`, consume a trailing `('/' | '//') Step
    /// (('/' | '//') Step)*` if present, yielding a [`Expr::FilterPath`]
    /// rooted at the filter's result rather than at the context node.
    fn parse_filter_path_continuation(&mut self, base: Expr) -> Result<Expr, XPathError> {
        let leading_descendant = match self.peek().map(|t| t.kind) {
            Some(TokenKind::DblFSlash) => true,
            Some(TokenKind::FSlash) => false,
            _ => return Ok(base),
        };
        self.bump();
        let steps = self.parse_step_sequence()?;
        Ok(Expr::FilterPath(Box::new(base), PathExpr { absolute: false, leading_descendant, steps }))
    }

    fn looks_like_function_call(&self) -> bool {
        matches!(self.tokens.get(self.pos + 1).map(|t| t.kind), Some(TokenKind::LParen))
            && !self.axis_name_at(self.pos)
    }

    fn axis_name_at(&self, idx: usize) -> bool {
        matches!(self.tokens.get(idx + 1).map(|t| t.kind), Some(TokenKind::DblColon))
    }

    fn parse_location_path(&mut self) -> Result<Expr, XPathError> {
        let mut absolute = false;
        let mut leading_descendant = false;
        if matches!(self.peek().map(|t| t.kind), Some(TokenKind::DblFSlash)) {
            self.bump();
            absolute = true;
            leading_descendant = true;
        } else if matches!(self.peek().map(|t| t.kind), Some(TokenKind::FSlash)) {
            self.bump();
            absolute = true;
        }

        let steps = if self.at_step_start() { self.parse_step_sequence()? } else { Vec::new() };
        Ok(Expr::Path(PathExpr { absolute, leading_descendant, steps }))
    }

    /// `Step (('/' | '//') Step)*`, shared by [`Self::parse_location_path`]
    /// and [`Self::parse_filter_path_continuation`].
    fn parse_step_sequence(&mut self) -> Result<Vec<StepNode>, XPathError> {
        let mut steps = Vec::new();
        steps.push(self.parse_step()?);
        loop {
            if matches!(self.peek().map(|t| t.kind), Some(TokenKind::DblFSlash)) {
                self.bump();
                let mut step = self.parse_step()?;
                step.axis = match step.axis {
                    Axis::Child => Axis::DescendantOrSelf,
                    other => other,
                };
                steps.push(self.descendant_self_step());
                steps.push(step);
            } else if matches!(self.peek().map(|t| t.kind), Some(TokenKind::FSlash)) {
                self.bump();
                steps.push(self.parse_step()?);
            } else {
                break;
            }
        }
        Ok(steps)
    }

    fn descendant_self_step(&self) -> StepNode {
        StepNode { axis: Axis::DescendantOrSelf, test: NodeTest::Wildcard, predicates: Vec::new() }
    }

    fn at_step_start(&self) -> bool {
        matches!(
            self.peek().map(|t| t.kind),
            Some(TokenKind::Period)
                | Some(TokenKind::RangeSep)
                | Some(TokenKind::AtSign)
                | Some(TokenKind::Identifier)
                | Some(TokenKind::PrefixedIdentifier)
                | Some(TokenKind::ScopedIdentifier)
                | Some(TokenKind::Star)
                | Some(TokenKind::NcNameStar)
        )
    }

    fn parse_step(&mut self) -> Result<StepNode, XPathError> {
        if matches!(self.peek().map(|t| t.kind), Some(TokenKind::RangeSep)) {
            self.bump();
            return Ok(StepNode { axis: Axis::Parent, test: NodeTest::Wildcard, predicates: Vec::new() });
        }
        if matches!(self.peek().map(|t| t.kind), Some(TokenKind::Period)) {
            self.bump();
            if matches!(self.peek().map(|t| t.kind), Some(TokenKind::Period)) {
                // defensive only: the lexer always lexes ".." as a single
                // RangeSep token, handled above.
                self.bump();
                return Ok(StepNode { axis: Axis::Parent, test: NodeTest::Wildcard, predicates: Vec::new() });
            }
            return Ok(StepNode { axis: Axis::SelfAxis, test: NodeTest::Wildcard, predicates: Vec::new() });
        }

        let mut axis = Axis::Child;
        if matches!(self.peek().map(|t| t.kind), Some(TokenKind::AtSign)) {
            self.bump();
            axis = Axis::Attribute;
        } else if self.axis_name_at(self.pos) {
            axis = self.parse_axis_name()?;
            self.expect(TokenKind::DblColon, "'::'")?;
        }

        let test = self.parse_node_test()?;
        let mut predicates = Vec::new();
        while matches!(self.peek().map(|t| t.kind), Some(TokenKind::LBracket)) {
            self.bump();
            let pred = self.parse_or()?;
            self.expect(TokenKind::RBracket, "']'")?;
            predicates.push(pred);
        }
        Ok(StepNode { axis, test, predicates })
    }

    fn parse_axis_name(&mut self) -> Result<Axis, XPathError> {
        let tok = self.bump().expect("checked by caller");
        let axis = match tok.value.as_str() {
            "child" => Axis::Child,
            "descendant" => Axis::Descendant,
            "descendant-or-self" => Axis::DescendantOrSelf,
            "parent" => Axis::Parent,
            "self" => Axis::SelfAxis,
            "attribute" => Axis::Attribute,
            "ancestor" => Axis::Ancestor,
            "ancestor-or-self" => Axis::AncestorOrSelf,
            other => {
                return Err(XPathError::MalformedExpression { reason: format!("unsupported axis {other:?}") })
            }
        };
        Ok(axis)
    }

    fn parse_node_test(&mut self) -> Result<NodeTest, XPathError> {
        match self.peek() {
            Some(t) if t.kind == TokenKind::Star => {
                self.bump();
                Ok(NodeTest::Wildcard)
            }
            Some(t) if t.kind == TokenKind::NcNameStar => {
                let prefix = t.qualifier.clone().unwrap_or_default();
                self.bump();
                Ok(NodeTest::PrefixWildcard(prefix))
            }
            Some(t) if matches!(t.kind, TokenKind::Identifier | TokenKind::PrefixedIdentifier | TokenKind::ScopedIdentifier) => {
                let prefix = t.qualifier.clone();
                let local = t.value.clone();
                self.bump();
                Ok(NodeTest::Name { prefix, local })
            }
            _ => Err(XPathError::MalformedExpression { reason: "expected a node test".into() }),
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, XPathError> {
        match self.peek().map(|t| t.kind) {
            Some(TokenKind::VarBind) => {
                let t = self.bump().unwrap();
                Ok(Expr::VarRef(t.value.clone()))
            }
            Some(TokenKind::QualifiedVarBind) => {
                let t = self.bump().unwrap();
                let name = match &t.qualifier {
                    Some(p) => format!("{p}:{}", t.value),
                    None => t.value.clone(),
                };
                Ok(Expr::VarRef(name))
            }
            Some(TokenKind::LParen) => {
                self.bump();
                let inner = self.parse_or()?;
                self.expect(TokenKind::RParen, "')'")?;
                self.parse_filter_predicates(inner)
            }
            Some(TokenKind::DoubleQuotedString) | Some(TokenKind::SingleQuotedString) => {
                let t = self.bump().unwrap();
                Ok(Expr::StringLit(t.value.clone()))
            }
            Some(TokenKind::DecimalNumber) | Some(TokenKind::RealNumber) => {
                let t = self.bump().unwrap();
                let n: f64 = t.value.parse().map_err(|_| XPathError::MalformedExpression {
                    reason: format!("invalid number literal {:?}", t.value),
                })?;
                Ok(Expr::NumberLit(n))
            }
            Some(TokenKind::HexNumber) => {
                let t = self.bump().unwrap();
                let digits = t.value.trim_start_matches("0x").trim_start_matches("0X");
                let n = i64::from_str_radix(digits, 16).map_err(|_| XPathError::MalformedExpression {
                    reason: format!("invalid hex literal {:?}", t.value),
                })?;
                Ok(Expr::NumberLit(n as f64))
            }
            Some(TokenKind::Identifier) if self.looks_like_function_call() => self.parse_function_call(),
            _ => Err(XPathError::MalformedExpression { reason: "expected a primary expression".into() }),
        }
    }

    fn parse_filter_predicates(&mut self, mut base: Expr) -> Result<Expr, XPathError> {
        // `(expr)[pred]*` is only meaningful when `expr` denotes a
        // node-set; we fold predicates into a synthetic single-step path
        // only when base is already a Path, else predicates on a
        // non-path primary are rejected by the grammar.
        while matches!(self.peek().map(|t| t.kind), Some(TokenKind::LBracket)) {
            self.bump();
            let pred = self.parse_or()?;
            self.expect(TokenKind::RBracket, "']'")?;
            base = match base {
                Expr::Path(mut p) => {
                    if let Some(last) = p.steps.last_mut() {
                        last.predicates.push(pred);
                    }
                    Expr::Path(p)
                }
                other => other,
            };
        }
        Ok(base)
    }

    fn parse_function_call(&mut self) -> Result<Expr, XPathError> {
        let t = self.bump().unwrap();
        let name = t.value.clone();
        self.expect(TokenKind::LParen, "'('")?;
        let mut args = Vec::new();
        if !matches!(self.peek().map(|t| t.kind), Some(TokenKind::RParen)) {
            args.push(self.parse_or()?);
            while matches!(self.peek().map(|t| t.kind), Some(TokenKind::Comma)) {
                self.bump();
                args.push(self.parse_or()?);
            }
        }
        self.expect(TokenKind::RParen, "')'")?;
        Ok(Expr::FunctionCall(name, args))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::{tokenize, SourceKind};

    fn parse(src: &str) -> Expr {
        let chain = tokenize(src, SourceKind::Xpath, false).unwrap();
        parse_expr(&chain).unwrap()
    }

    #[test]
    fn parses_absolute_path() {
        let expr = parse("/interfaces/interface");
        match expr {
            Expr::Path(p) => {
                assert!(p.absolute);
                assert_eq!(p.steps.len(), 2);
            }
            other => panic!("expected Path, got {other:?}"),
        }
    }

    #[test]
    fn parses_predicate_with_literal_key() {
        let expr = parse("/interfaces/interface[name='eth0']");
        match expr {
            Expr::Path(p) => {
                assert_eq!(p.steps[1].predicates.len(), 1);
            }
            other => panic!("expected Path, got {other:?}"),
        }
    }

    #[test]
    fn parses_function_call_with_args() {
        let expr = parse("concat(\"a\", 'b', \"c\")");
        match expr {
            Expr::FunctionCall(name, args) => {
                assert_eq!(name, "concat");
                assert_eq!(args.len(), 3);
            }
            other => panic!("expected FunctionCall, got {other:?}"),
        }
    }

    #[test]
    fn parses_boolean_operators_with_precedence() {
        let expr = parse("1 = 1 and 2 != 3 or false()");
        assert!(matches!(expr, Expr::Or(_, _)));
    }

    #[test]
    fn parses_current_function() {
        let expr = parse("current()/../name");
        match expr {
            Expr::FilterPath(base, path) => {
                assert!(matches!(*base, Expr::FunctionCall(name, _) if name == "current"));
                assert_eq!(path.steps.len(), 2);
                assert_eq!(path.steps[0].axis, Axis::Parent);
            }
            other => panic!("expected FilterPath, got {other:?}"),
        }
    }

    #[test]
    fn parses_parent_axis_step() {
        let expr = parse("../name");
        match expr {
            Expr::Path(p) => {
                assert_eq!(p.steps.len(), 2);
                assert_eq!(p.steps[0].axis, Axis::Parent);
            }
            other => panic!("expected Path, got {other:?}"),
        }
    }
}
