//! Notification message templates
//!
//! Supports the subset of the Drone plugin template syntax used by
//! notification steps:
//!
//! - Interpolation: `{{ build.status }}`, `{{repo.name}}`
//! - Helpers: `{{ uppercase build.status }}`, `{{ lowercase x }}`,
//!   `{{ truncate commit.sha 8 }}`
//! - Status blocks: `{{#success build.status}}ok{{else}}broken{{/success}}`
//!   and `{{#failure build.status}}...{{/failure}}`
//!
//! Unknown variables render as empty strings.

use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;
use thiserror::Error;

/// Errors that can occur during template rendering
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("Unknown template helper: {0}")]
    UnknownHelper(String),

    #[error("Unclosed block: {{{{#{0}}}}}")]
    Unclosed(String),

    #[error("Unexpected tag: {{{{{0}}}}}")]
    Unexpected(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Block {
    Success,
    Failure,
}

impl Block {
    fn parse(name: &str) -> Result<Self, TemplateError> {
        match name {
            "success" => Ok(Block::Success),
            "failure" => Ok(Block::Failure),
            other => Err(TemplateError::UnknownHelper(other.to_string())),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Block::Success => "success",
            Block::Failure => "failure",
        }
    }
}

#[derive(Debug)]
enum Node {
    Text(String),
    Expr(String),
    Block {
        block: Block,
        arg: String,
        then: Vec<Node>,
        otherwise: Vec<Node>,
    },
}

struct Frame {
    block: Block,
    arg: String,
    then: Vec<Node>,
    otherwise: Vec<Node>,
    in_else: bool,
}

impl Frame {
    fn push(&mut self, node: Node) {
        if self.in_else {
            self.otherwise.push(node);
        } else {
            self.then.push(node);
        }
    }
}

fn tag_regex() -> &'static Regex {
    static TAG: OnceLock<Regex> = OnceLock::new();
    TAG.get_or_init(|| Regex::new(r"\{\{\s*(.*?)\s*\}\}").expect("tag pattern is valid"))
}

fn parse(template: &str) -> Result<Vec<Node>, TemplateError> {
    let mut root = Vec::new();
    let mut stack: Vec<Frame> = Vec::new();
    let mut last = 0;

    fn push(root: &mut Vec<Node>, stack: &mut [Frame], node: Node) {
        match stack.last_mut() {
            Some(frame) => frame.push(node),
            None => root.push(node),
        }
    }

    for caps in tag_regex().captures_iter(template) {
        let (Some(whole), Some(inner)) = (caps.get(0), caps.get(1)) else {
            continue;
        };

        if whole.start() > last {
            push(&mut root, &mut stack, Node::Text(template[last..whole.start()].to_string()));
        }
        last = whole.end();

        let tag = inner.as_str();
        if let Some(open) = tag.strip_prefix('#') {
            let mut parts = open.split_whitespace();
            let block = Block::parse(parts.next().unwrap_or_default())?;
            let arg = parts.next().unwrap_or("build.status").to_string();
            stack.push(Frame {
                block,
                arg,
                then: Vec::new(),
                otherwise: Vec::new(),
                in_else: false,
            });
        } else if let Some(close) = tag.strip_prefix('/') {
            let frame = match stack.pop() {
                Some(frame) if frame.block.name() == close.trim() => frame,
                _ => return Err(TemplateError::Unexpected(tag.to_string())),
            };
            push(
                &mut root,
                &mut stack,
                Node::Block {
                    block: frame.block,
                    arg: frame.arg,
                    then: frame.then,
                    otherwise: frame.otherwise,
                },
            );
        } else if tag == "else" {
            match stack.last_mut() {
                Some(frame) if !frame.in_else => frame.in_else = true,
                _ => return Err(TemplateError::Unexpected(tag.to_string())),
            }
        } else {
            push(&mut root, &mut stack, Node::Expr(tag.to_string()));
        }
    }

    if last < template.len() {
        push(&mut root, &mut stack, Node::Text(template[last..].to_string()));
    }

    if let Some(frame) = stack.pop() {
        return Err(TemplateError::Unclosed(frame.block.name().to_string()));
    }

    Ok(root)
}

fn evaluate(expr: &str, vars: &HashMap<String, String>) -> Result<String, TemplateError> {
    let lookup = |name: &str| vars.get(name).cloned().unwrap_or_default();
    let parts: Vec<&str> = expr.split_whitespace().collect();

    match parts.as_slice() {
        [name] => Ok(lookup(name)),
        ["uppercase", name] => Ok(lookup(name).to_uppercase()),
        ["lowercase", name] => Ok(lookup(name).to_lowercase()),
        ["truncate", name, len] => {
            let len: usize = len
                .parse()
                .map_err(|_| TemplateError::UnknownHelper(expr.to_string()))?;
            Ok(lookup(name).chars().take(len).collect())
        }
        _ => Err(TemplateError::UnknownHelper(expr.to_string())),
    }
}

fn render_nodes(
    nodes: &[Node],
    vars: &HashMap<String, String>,
    out: &mut String,
) -> Result<(), TemplateError> {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Expr(expr) => out.push_str(&evaluate(expr, vars)?),
            Node::Block {
                block,
                arg,
                then,
                otherwise,
            } => {
                let value = vars.get(arg).map(String::as_str).unwrap_or_default();
                let taken = match block {
                    Block::Success => value == "success",
                    Block::Failure => value == "failure",
                };
                render_nodes(if taken { then } else { otherwise }, vars, out)?;
            }
        }
    }
    Ok(())
}

/// Render a template with the given variables
pub fn render(template: &str, vars: &HashMap<String, String>) -> Result<String, TemplateError> {
    let nodes = parse(template)?;
    let mut out = String::with_capacity(template.len());
    render_nodes(&nodes, vars, &mut out)?;
    Ok(out)
}

/// Whether a string contains template tags at all
pub fn is_template(text: &str) -> bool {
    tag_regex().is_match(text)
}
