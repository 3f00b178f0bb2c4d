//! Path expression AST (XPath 1.0 subset)

use std::fmt;

/// A parsed path expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Binary operator application
    Binary {
        /// Operator
        op: BinaryOp,
        /// Left operand
        left: Box<Expr>,
        /// Right operand
        right: Box<Expr>,
    },
    /// Unary minus
    Negate(Box<Expr>),
    /// Node-set union `a | b`
    Union(Box<Expr>, Box<Expr>),
    /// Location path
    Path(LocationPath),
    /// Primary expression with predicates, optionally continued by steps
    Filter {
        /// Filtered primary expression
        primary: Box<Expr>,
        /// Predicates applied to the primary's node-set
        predicates: Vec<Expr>,
        /// Relative steps following the filter (`(...)[1]/b`)
        steps: Vec<Step>,
    },
    /// String literal
    Literal(String),
    /// Number literal
    Number(f64),
    /// Function call
    Function {
        /// Function name
        name: String,
        /// Arguments
        args: Vec<Expr>,
    },
}

impl Expr {
    /// The location path, when this expression is nothing but one
    pub fn as_location_path(&self) -> Option<&LocationPath> {
        match self {
            Expr::Path(path) => Some(path),
            _ => None,
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Binary { op, left, right } => write!(f, "{} {} {}", left, op, right),
            Expr::Negate(e) => write!(f, "-{}", e),
            Expr::Union(a, b) => write!(f, "{} | {}", a, b),
            Expr::Path(p) => write!(f, "{}", p),
            Expr::Filter {
                primary,
                predicates,
                steps,
            } => {
                write!(f, "{}", primary)?;
                for p in predicates {
                    write!(f, "[{}]", p)?;
                }
                for s in steps {
                    write!(f, "/{}", s)?;
                }
                Ok(())
            }
            Expr::Literal(s) => {
                if s.contains('\'') {
                    write!(f, "\"{}\"", s)
                } else {
                    write!(f, "'{}'", s)
                }
            }
            Expr::Number(n) => write!(f, "{}", crate::value::format_number(*n)),
            Expr::Function { name, args } => {
                write!(f, "{}(", name)?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", a)?;
                }
                write!(f, ")")
            }
        }
    }
}

/// Binary operators in increasing precedence groups
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// `or`
    Or,
    /// `and`
    And,
    /// `=`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `div`
    Div,
    /// `mod`
    Mod,
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinaryOp::Or => "or",
            BinaryOp::And => "and",
            BinaryOp::Eq => "=",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "div",
            BinaryOp::Mod => "mod",
        };
        f.write_str(s)
    }
}

/// A location path: `/a/b`, `a/@c`, `//d`
#[derive(Debug, Clone, PartialEq)]
pub struct LocationPath {
    /// Starts at the root of the context node's tree
    pub absolute: bool,
    /// Steps in order
    pub steps: Vec<Step>,
}

impl fmt::Display for LocationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.absolute {
            write!(f, "/")?;
        }
        for (i, step) in self.steps.iter().enumerate() {
            if i > 0 {
                write!(f, "/")?;
            }
            write!(f, "{}", step)?;
        }
        Ok(())
    }
}

/// One location step: `axis::test[predicate]...`
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    /// Axis
    pub axis: Axis,
    /// Node test
    pub test: NodeTest,
    /// Predicates in order
    pub predicates: Vec<Expr>,
}

impl Step {
    /// Step without predicates
    pub fn new(axis: Axis, test: NodeTest) -> Self {
        Self {
            axis,
            test,
            predicates: Vec::new(),
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.axis, &self.test) {
            (Axis::Child, test) => write!(f, "{}", test)?,
            (Axis::Attribute, test) => write!(f, "@{}", test)?,
            (Axis::SelfAxis, NodeTest::Node) if self.predicates.is_empty() => {
                return write!(f, ".")
            }
            (Axis::Parent, NodeTest::Node) if self.predicates.is_empty() => {
                return write!(f, "..")
            }
            (axis, test) => write!(f, "{}::{}", axis, test)?,
        }
        for p in &self.predicates {
            write!(f, "[{}]", p)?;
        }
        Ok(())
    }
}

/// Navigation axes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    /// `child::`
    Child,
    /// `descendant::`
    Descendant,
    /// `descendant-or-self::`
    DescendantOrSelf,
    /// `self::`
    SelfAxis,
    /// `parent::`
    Parent,
    /// `ancestor::`
    Ancestor,
    /// `ancestor-or-self::`
    AncestorOrSelf,
    /// `attribute::`
    Attribute,
    /// `following-sibling::`
    FollowingSibling,
    /// `preceding-sibling::`
    PrecedingSibling,
    /// `following::`
    Following,
    /// `preceding::`
    Preceding,
}

impl Axis {
    /// Look up an axis by its name
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "child" => Axis::Child,
            "descendant" => Axis::Descendant,
            "descendant-or-self" => Axis::DescendantOrSelf,
            "self" => Axis::SelfAxis,
            "parent" => Axis::Parent,
            "ancestor" => Axis::Ancestor,
            "ancestor-or-self" => Axis::AncestorOrSelf,
            "attribute" => Axis::Attribute,
            "following-sibling" => Axis::FollowingSibling,
            "preceding-sibling" => Axis::PrecedingSibling,
            "following" => Axis::Following,
            "preceding" => Axis::Preceding,
            _ => return None,
        })
    }

    /// Reverse axes number their nodes in reverse document order
    pub fn is_reverse(self) -> bool {
        matches!(
            self,
            Axis::Parent
                | Axis::Ancestor
                | Axis::AncestorOrSelf
                | Axis::PrecedingSibling
                | Axis::Preceding
        )
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Axis::Child => "child",
            Axis::Descendant => "descendant",
            Axis::DescendantOrSelf => "descendant-or-self",
            Axis::SelfAxis => "self",
            Axis::Parent => "parent",
            Axis::Ancestor => "ancestor",
            Axis::AncestorOrSelf => "ancestor-or-self",
            Axis::Attribute => "attribute",
            Axis::FollowingSibling => "following-sibling",
            Axis::PrecedingSibling => "preceding-sibling",
            Axis::Following => "following",
            Axis::Preceding => "preceding",
        };
        f.write_str(s)
    }
}

/// Node tests
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeTest {
    /// Named test `name` or `prefix:name`
    Name {
        /// Optional prefix
        prefix: Option<String>,
        /// Local name
        local: String,
    },
    /// `*` or `prefix:*`
    Wildcard {
        /// Optional prefix
        prefix: Option<String>,
    },
    /// `node()`
    Node,
    /// `text()`
    Text,
    /// `comment()`
    Comment,
}

impl NodeTest {
    /// The qualified name of a named test
    pub fn qualified_name(&self) -> Option<String> {
        match self {
            NodeTest::Name {
                prefix: Some(p),
                local,
            } => Some(format!("{}:{}", p, local)),
            NodeTest::Name {
                prefix: None,
                local,
            } => Some(local.clone()),
            _ => None,
        }
    }
}

impl fmt::Display for NodeTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeTest::Name { .. } => {
                write!(f, "{}", self.qualified_name().unwrap_or_default())
            }
            NodeTest::Wildcard { prefix: Some(p) } => write!(f, "{}:*", p),
            NodeTest::Wildcard { prefix: None } => write!(f, "*"),
            NodeTest::Node => write!(f, "node()"),
            NodeTest::Text => write!(f, "text()"),
            NodeTest::Comment => write!(f, "comment()"),
        }
    }
}
