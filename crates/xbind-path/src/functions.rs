//! Core function library

use xbind_tree::NodeRef;

use crate::ast::Expr;
use crate::error::Result;
use crate::evaluator::{Evaluator, Focus};
use crate::value::{node_string_value, XPathValue};

/// Accepted argument counts `(min, max)` of a known function; `None` max
/// means variadic.
pub fn arity(name: &str) -> Option<(usize, Option<usize>)> {
    let range = match name {
        "last" | "position" | "true" | "false" => (0, Some(0)),
        "name" | "local-name" | "namespace-uri" | "string" | "string-length"
        | "normalize-space" | "number" => (0, Some(1)),
        "count" | "boolean" | "not" | "sum" | "floor" | "ceiling" | "round" | "upper-case"
        | "lower-case" => (1, Some(1)),
        "starts-with" | "ends-with" | "contains" | "substring-before" | "substring-after" => {
            (2, Some(2))
        }
        "substring" => (2, Some(3)),
        "translate" => (3, Some(3)),
        "concat" => (2, None),
        _ => return None,
    };
    Some(range)
}

impl Evaluator<'_> {
    pub(crate) fn call_function(&self, name: &str, args: &[Expr], focus: &Focus) -> Result<XPathValue> {
        let doc = self.doc;
        let string_arg = |i: usize| -> Result<String> {
            match args.get(i) {
                Some(arg) => Ok(self.eval(arg, focus)?.to_string_value(doc)),
                None => Ok(node_string_value(doc, &focus.node)),
            }
        };
        let number_arg = |i: usize| -> Result<f64> {
            match args.get(i) {
                Some(arg) => Ok(self.eval(arg, focus)?.to_number(doc)),
                None => Ok(XPathValue::NodeSet(vec![focus.node.clone()]).to_number(doc)),
            }
        };

        let value = match name {
            "last" => XPathValue::Number(focus.size as f64),
            "position" => XPathValue::Number(focus.position as f64),
            "count" => XPathValue::Number(self.eval_node_set(&args[0], focus)?.len() as f64),
            "name" | "local-name" | "namespace-uri" => {
                let node = match args.first() {
                    Some(arg) => {
                        let mut nodes = self.eval_node_set(arg, focus)?;
                        self.normalize(&mut nodes);
                        nodes.into_iter().next()
                    }
                    None => Some(focus.node.clone()),
                };
                XPathValue::String(node.map(|n| self.name_part(name, &n)).unwrap_or_default())
            }
            "string" => XPathValue::String(string_arg(0)?),
            "concat" => {
                let mut out = String::new();
                for arg in args {
                    out.push_str(&self.eval(arg, focus)?.to_string_value(doc));
                }
                XPathValue::String(out)
            }
            "starts-with" => XPathValue::Boolean(string_arg(0)?.starts_with(&string_arg(1)?)),
            "ends-with" => XPathValue::Boolean(string_arg(0)?.ends_with(&string_arg(1)?)),
            "contains" => XPathValue::Boolean(string_arg(0)?.contains(&string_arg(1)?)),
            "substring-before" => {
                let s = string_arg(0)?;
                let pattern = string_arg(1)?;
                XPathValue::String(
                    s.split_once(pattern.as_str())
                        .map(|(before, _)| before.to_string())
                        .unwrap_or_default(),
                )
            }
            "substring-after" => {
                let s = string_arg(0)?;
                let pattern = string_arg(1)?;
                XPathValue::String(
                    s.split_once(pattern.as_str())
                        .map(|(_, after)| after.to_string())
                        .unwrap_or_default(),
                )
            }
            "substring" => {
                let s = string_arg(0)?;
                let start = round(number_arg(1)?);
                let length = match args.get(2) {
                    Some(_) => Some(round(number_arg(2)?)),
                    None => None,
                };
                XPathValue::String(substring(&s, start, length))
            }
            "string-length" => XPathValue::Number(string_arg(0)?.chars().count() as f64),
            "normalize-space" => XPathValue::String(
                string_arg(0)?.split_whitespace().collect::<Vec<_>>().join(" "),
            ),
            "translate" => {
                let s = string_arg(0)?;
                let from: Vec<char> = string_arg(1)?.chars().collect();
                let to: Vec<char> = string_arg(2)?.chars().collect();
                XPathValue::String(
                    s.chars()
                        .filter_map(|c| match from.iter().position(|f| *f == c) {
                            Some(i) => to.get(i).copied(),
                            None => Some(c),
                        })
                        .collect(),
                )
            }
            "upper-case" => XPathValue::String(string_arg(0)?.to_uppercase()),
            "lower-case" => XPathValue::String(string_arg(0)?.to_lowercase()),
            "boolean" => XPathValue::Boolean(self.eval(&args[0], focus)?.to_boolean()),
            "not" => XPathValue::Boolean(!self.eval(&args[0], focus)?.to_boolean()),
            "true" => XPathValue::Boolean(true),
            "false" => XPathValue::Boolean(false),
            "number" => XPathValue::Number(number_arg(0)?),
            "sum" => XPathValue::Number(
                self.eval_node_set(&args[0], focus)?
                    .iter()
                    .map(|n| crate::value::parse_number(&node_string_value(doc, n)))
                    .sum(),
            ),
            "floor" => XPathValue::Number(number_arg(0)?.floor()),
            "ceiling" => XPathValue::Number(number_arg(0)?.ceil()),
            "round" => XPathValue::Number(round(number_arg(0)?)),
            // arity() gates every name the parser accepts
            other => {
                return Err(crate::error::PathError::Type(format!(
                    "unknown function '{}'",
                    other
                )))
            }
        };
        Ok(value)
    }

    fn name_part(&self, function: &str, node: &NodeRef) -> String {
        let name = match node {
            NodeRef::Node(id) => self.doc.name(*id),
            NodeRef::Attribute { owner, name } => self
                .doc
                .attributes(*owner)
                .iter()
                .find(|a| a.name.matches(name))
                .map(|a| &a.name),
        };
        let Some(name) = name else {
            return String::new();
        };
        match function {
            "local-name" => name.local.clone(),
            "namespace-uri" => name.namespace.clone().unwrap_or_default(),
            _ => name.qualified(),
        }
    }
}

/// Round half towards positive infinity
fn round(n: f64) -> f64 {
    if n.is_nan() || n.is_infinite() {
        n
    } else {
        (n + 0.5).floor()
    }
}

/// One-based substring over characters, with NaN and infinity handled the
/// way comparisons against them behave.
fn substring(s: &str, start: f64, length: Option<f64>) -> String {
    s.chars()
        .enumerate()
        .filter(|(i, _)| {
            let p = (*i + 1) as f64;
            p >= start && length.map_or(true, |len| p < start + len)
        })
        .map(|(_, c)| c)
        .collect()
}
