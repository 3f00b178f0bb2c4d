//! Expression result values and XPath type conversions

use xbind_tree::{Document, NodeRef};

/// Result of evaluating a path expression
#[derive(Debug, Clone, PartialEq)]
pub enum XPathValue {
    /// Nodes in document order without duplicates
    NodeSet(Vec<NodeRef>),
    /// String
    String(String),
    /// IEEE double
    Number(f64),
    /// Boolean
    Boolean(bool),
}

impl XPathValue {
    /// Name of the value's type, for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            XPathValue::NodeSet(_) => "node-set",
            XPathValue::String(_) => "string",
            XPathValue::Number(_) => "number",
            XPathValue::Boolean(_) => "boolean",
        }
    }

    /// `boolean()` conversion
    pub fn to_boolean(&self) -> bool {
        match self {
            XPathValue::NodeSet(nodes) => !nodes.is_empty(),
            XPathValue::String(s) => !s.is_empty(),
            XPathValue::Number(n) => *n != 0.0 && !n.is_nan(),
            XPathValue::Boolean(b) => *b,
        }
    }

    /// `string()` conversion; a node-set yields the string value of its first node
    pub fn to_string_value(&self, doc: &Document) -> String {
        match self {
            XPathValue::NodeSet(nodes) => nodes
                .first()
                .map(|n| node_string_value(doc, n))
                .unwrap_or_default(),
            XPathValue::String(s) => s.clone(),
            XPathValue::Number(n) => format_number(*n),
            XPathValue::Boolean(b) => b.to_string(),
        }
    }

    /// `number()` conversion
    pub fn to_number(&self, doc: &Document) -> f64 {
        match self {
            XPathValue::Number(n) => *n,
            XPathValue::Boolean(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            XPathValue::String(s) => parse_number(s),
            XPathValue::NodeSet(_) => parse_number(&self.to_string_value(doc)),
        }
    }

    /// The node-set, if this value is one
    pub fn as_node_set(&self) -> Option<&[NodeRef]> {
        match self {
            XPathValue::NodeSet(nodes) => Some(nodes),
            _ => None,
        }
    }
}

/// String value of an element, text node or attribute
pub fn node_string_value(doc: &Document, node: &NodeRef) -> String {
    match node {
        NodeRef::Node(id) => doc.string_value(*id),
        NodeRef::Attribute { owner, name } => {
            doc.attribute(*owner, name).unwrap_or_default().to_string()
        }
    }
}

/// Parse a string the way `number()` does: optional minus, digits, optional
/// fraction, surrounding whitespace. Anything else is NaN.
pub fn parse_number(text: &str) -> f64 {
    let trimmed = text.trim();
    let body = trimmed.strip_prefix('-').unwrap_or(trimmed);
    let mut digits = 0;
    let mut dots = 0;
    for c in body.chars() {
        match c {
            '0'..='9' => digits += 1,
            '.' => dots += 1,
            _ => return f64::NAN,
        }
    }
    if digits == 0 || dots > 1 {
        return f64::NAN;
    }
    trimmed.parse().unwrap_or(f64::NAN)
}

/// Format a number the way `string()` does
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 {
            "Infinity".to_string()
        } else {
            "-Infinity".to_string()
        }
    } else if n == n.trunc() && n.abs() < 1e15 {
        // covers -0 as well
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number(" 42 "), 42.0);
        assert_eq!(parse_number("-1.5"), -1.5);
        assert_eq!(parse_number(".5"), 0.5);
        assert!(parse_number("1e5").is_nan());
        assert!(parse_number("+1").is_nan());
        assert!(parse_number("").is_nan());
        assert!(parse_number("abc").is_nan());
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(3.0), "3");
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(2.5), "2.5");
        assert_eq!(format_number(f64::NAN), "NaN");
        assert_eq!(format_number(f64::NEG_INFINITY), "-Infinity");
    }

    #[test]
    fn test_boolean_conversion() {
        assert!(!XPathValue::NodeSet(vec![]).to_boolean());
        assert!(XPathValue::String("false".into()).to_boolean());
        assert!(!XPathValue::Number(f64::NAN).to_boolean());
    }
}
