//! Atomese reader: tokenization, tree building, and insertion.
//!
//! Reading happens in three passes so that a malformed expression never
//! leaves partial atoms behind:
//! 1. **Tokenize**: parentheses, quoted strings, bare symbols, `;` comments
//! 2. **Tree**: nest tokens into s-expressions with byte offsets
//! 3. **Shape**: validate each s-expression as a node or link, then insert

use std::path::Path;

use crate::error::{HubError, HubResult};

use super::{is_node_type, Atom, AtomSpace, Handle};

/// Truth-value forms accepted inside links and ignored.
const TRUTH_VALUE_FORMS: &[&str] = &["stv", "ctv", "itv"];

/// Deepest parenthesis nesting accepted. Shaping, insertion, matching and
/// rendering all recurse once per level.
pub const MAX_DEPTH: usize = 1024;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Open,
    Close,
    Str(String),
    Sym(String),
}

#[derive(Debug)]
struct ParseFailure {
    offset: usize,
    message: String,
}

fn fail<T>(offset: usize, message: impl Into<String>) -> Result<T, ParseFailure> {
    Err(ParseFailure {
        offset,
        message: message.into(),
    })
}

fn tokenize(input: &str) -> Result<Vec<(usize, Token)>, ParseFailure> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some((at, c)) = chars.next() {
        match c {
            '(' => tokens.push((at, Token::Open)),
            ')' => tokens.push((at, Token::Close)),
            ';' => {
                while let Some((_, c)) = chars.next() {
                    if c == '\n' {
                        break;
                    }
                }
            }
            '"' => {
                let mut text = String::new();
                let mut closed = false;
                while let Some((_, c)) = chars.next() {
                    match c {
                        '"' => {
                            closed = true;
                            break;
                        }
                        '\\' => match chars.next() {
                            Some((_, 'n')) => text.push('\n'),
                            Some((_, 't')) => text.push('\t'),
                            Some((_, 'r')) => text.push('\r'),
                            Some((_, escaped)) => text.push(escaped),
                            None => break,
                        },
                        other => text.push(other),
                    }
                }
                if !closed {
                    return fail(at, "unterminated string");
                }
                tokens.push((at, Token::Str(text)));
            }
            c if c.is_whitespace() => {}
            _ => {
                let mut sym = String::from(c);
                while let Some(&(_, next)) = chars.peek() {
                    if next.is_whitespace() || matches!(next, '(' | ')' | '"' | ';') {
                        break;
                    }
                    sym.push(next);
                    chars.next();
                }
                tokens.push((at, Token::Sym(sym)));
            }
        }
    }

    Ok(tokens)
}

/// A raw s-expression with its source offset.
#[derive(Debug)]
enum SExpr {
    List(usize, Vec<SExpr>),
    Str(usize, String),
    Sym(usize, String),
}

impl SExpr {
    fn offset(&self) -> usize {
        match self {
            SExpr::List(at, _) | SExpr::Str(at, _) | SExpr::Sym(at, _) => *at,
        }
    }
}

fn read_all(input: &str) -> Result<Vec<SExpr>, ParseFailure> {
    let tokens = tokenize(input)?;
    let mut stack: Vec<(usize, Vec<SExpr>)> = Vec::new();
    let mut top = Vec::new();

    for (at, token) in tokens {
        let expr = match token {
            Token::Open => {
                if stack.len() >= MAX_DEPTH {
                    return fail(at, "expression nested too deeply");
                }
                stack.push((at, Vec::new()));
                continue;
            }
            Token::Close => match stack.pop() {
                Some((start, items)) => SExpr::List(start, items),
                None => return fail(at, "unexpected ')'"),
            },
            Token::Str(s) => SExpr::Str(at, s),
            Token::Sym(s) => SExpr::Sym(at, s),
        };
        match stack.last_mut() {
            Some((_, items)) => items.push(expr),
            None => top.push(expr),
        }
    }

    if let Some((start, _)) = stack.pop() {
        return fail(start, "unbalanced parenthesis");
    }
    Ok(top)
}

/// A validated atom tree, not yet inserted.
#[derive(Debug)]
enum AtomTree {
    Node { kind: String, name: String },
    Link { kind: String, children: Vec<AtomTree> },
}

fn shape(expr: &SExpr) -> Result<AtomTree, ParseFailure> {
    let SExpr::List(at, items) = expr else {
        return fail(expr.offset(), "expected a parenthesized atom");
    };
    let Some(SExpr::Sym(_, kind)) = items.first() else {
        return fail(*at, "an atom must start with its type name");
    };
    if !kind.starts_with(|c: char| c.is_ascii_uppercase()) {
        return fail(*at, format!("`{kind}` is not an atom type"));
    }

    let args: Vec<&SExpr> = items[1..]
        .iter()
        .filter(|arg| !is_truth_value(arg))
        .collect();

    if is_node_type(kind) {
        return match args.as_slice() {
            [SExpr::Str(_, name)] => Ok(AtomTree::Node {
                kind: kind.clone(),
                name: name.clone(),
            }),
            _ => fail(*at, format!("{kind} takes exactly one quoted name")),
        };
    }

    let children = args
        .into_iter()
        .map(shape)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(AtomTree::Link {
        kind: kind.clone(),
        children,
    })
}

fn is_truth_value(expr: &SExpr) -> bool {
    match expr {
        SExpr::List(_, items) => matches!(
            items.first(),
            Some(SExpr::Sym(_, head)) if TRUTH_VALUE_FORMS.contains(&head.as_str())
        ),
        _ => false,
    }
}

fn insert_tree(tree: &AtomTree, space: &AtomSpace, fresh: &mut Vec<Handle>) -> Handle {
    let atom = match tree {
        AtomTree::Node { kind, name } => Atom::node(kind.as_str(), name.as_str()),
        AtomTree::Link { kind, children } => {
            let outgoing = children
                .iter()
                .map(|child| insert_tree(child, space, fresh))
                .collect();
            Atom::link(kind.as_str(), outgoing)
        }
    };
    let (handle, created) = space.insert(atom);
    if created {
        fresh.push(handle);
    }
    handle
}

/// An expression parsed into a store.
#[derive(Debug, Clone)]
pub struct Expression {
    /// The outermost atom.
    pub root: Handle,
    /// Atoms this parse created, children before parents.
    pub fresh: Vec<Handle>,
}

impl AtomSpace {
    /// Undo the insertions made by parsing `expr`.
    ///
    /// Atoms that have since gained other references are kept.
    pub fn discard(&self, expr: &Expression) {
        for handle in expr.fresh.iter().rev() {
            self.remove(*handle);
        }
    }
}

/// Parse exactly one Atomese expression and insert it into `space`.
pub fn parse_expression(text: &str, space: &AtomSpace) -> HubResult<Expression> {
    let to_hub = |f: ParseFailure| HubError::Parse {
        offset: f.offset,
        message: f.message,
    };
    let exprs = read_all(text).map_err(to_hub)?;
    let expr = match exprs.as_slice() {
        [single] => single,
        [] => {
            return Err(HubError::Parse {
                offset: 0,
                message: "empty expression".into(),
            });
        }
        [_, second, ..] => {
            return Err(HubError::Parse {
                offset: second.offset(),
                message: "expected a single expression".into(),
            });
        }
    };
    let tree = shape(expr).map_err(to_hub)?;

    let mut fresh = Vec::new();
    let root = insert_tree(&tree, space, &mut fresh);
    Ok(Expression { root, fresh })
}

/// Decode every expression in an Atomese source string into `space`.
///
/// All expressions are validated before any is inserted. Returns the number
/// of top-level expressions read.
pub fn decode_str(source: &str, origin: &str, space: &AtomSpace) -> HubResult<usize> {
    let to_hub = |f: ParseFailure| HubError::Decode {
        path: origin.to_string(),
        line: line_of(source, f.offset),
        message: f.message,
    };
    let exprs = read_all(source).map_err(to_hub)?;
    let trees = exprs
        .iter()
        .map(shape)
        .collect::<Result<Vec<_>, _>>()
        .map_err(to_hub)?;

    let mut fresh = Vec::new();
    for tree in &trees {
        insert_tree(tree, space, &mut fresh);
    }
    Ok(trees.len())
}

/// Decode an Atomese knowledge file into `space`.
pub fn decode_file(path: &Path, space: &AtomSpace) -> HubResult<usize> {
    if !path.is_file() {
        return Err(HubError::FileNotFound {
            path: path.display().to_string(),
        });
    }
    let source = std::fs::read_to_string(path).map_err(|e| HubError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    decode_str(&source, &path.display().to_string(), space)
}

fn line_of(source: &str, offset: usize) -> usize {
    source
        .get(..offset)
        .map(|prefix| prefix.matches('\n').count() + 1)
        .unwrap_or(1)
}
