//! Pattern matcher: unification of query clauses against the atom table.
//!
//! Four query forms are executable:
//!
//! | Form | Shape | Result |
//! |---|---|---|
//! | `GetLink` | `[decl] body` | groundings, realized |
//! | `BindLink` | `[decl] body rewrite` | instantiated rewrites, realized |
//! | `MeetLink` | `[decl] body` | groundings, deferred stream |
//! | `QueryLink` | `[decl] body rewrite` | instantiated rewrites, deferred stream |
//!
//! The body is one clause, or an `AndLink`/`PresentLink` of clauses that
//! must all hold under one consistent binding. Without a declaration, every
//! `VariableNode` in the body is a variable. Candidates are the atoms that
//! contain no variables, tried in insertion order; matching is ordered.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::error::{HubError, HubResult};

use super::queue::QueueValue;
use super::{Atom, AtomSpace, AtomTable, Handle};

const VARIABLE_NODE: &str = "VariableNode";

/// Raw result of executing a query.
#[derive(Debug)]
pub enum ResultValue {
    /// Fully computed, in engine order.
    Realized(Vec<Handle>),
    /// Filled by an engine thread; closed on completion.
    Deferred(QueueValue),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QueryForm {
    Get,
    Bind,
    Meet,
    Query,
}

impl QueryForm {
    fn of(kind: &str) -> Option<Self> {
        match kind {
            "GetLink" => Some(QueryForm::Get),
            "BindLink" => Some(QueryForm::Bind),
            "MeetLink" => Some(QueryForm::Meet),
            "QueryLink" => Some(QueryForm::Query),
            _ => None,
        }
    }

    fn has_rewrite(self) -> bool {
        matches!(self, QueryForm::Bind | QueryForm::Query)
    }

    fn is_deferred(self) -> bool {
        matches!(self, QueryForm::Meet | QueryForm::Query)
    }
}

#[derive(Debug, Clone)]
struct Variable {
    handle: Handle,
    type_restriction: Option<String>,
}

#[derive(Debug, Clone)]
struct CompiledQuery {
    form: QueryForm,
    vars: Vec<Variable>,
    clauses: Vec<Handle>,
    rewrite: Option<Handle>,
}

type Bindings = HashMap<Handle, Handle>;

fn malformed(message: impl Into<String>) -> HubError {
    HubError::Parse {
        offset: 0,
        message: message.into(),
    }
}

/// Whether the atom behind `handle` is an executable query form.
pub fn is_executable(space: &AtomSpace, handle: Handle) -> bool {
    space
        .read()
        .get(handle)
        .is_some_and(|atom| !atom.is_node() && QueryForm::of(atom.kind()).is_some())
}

/// Execute the query rooted at `root`.
///
/// Get/Bind complete before returning. Meet/Query return immediately with a
/// stream that an engine thread fills and closes.
pub fn execute(space: &Arc<AtomSpace>, root: Handle) -> HubResult<ResultValue> {
    let query = compile(&space.read(), root)?;

    if !query.form.is_deferred() {
        return Ok(ResultValue::Realized(run(space, &query, None)));
    }

    let queue = QueueValue::new();
    let producer = queue.clone();
    let space = Arc::clone(space);
    std::thread::Builder::new()
        .name("pattern-stream".into())
        .spawn(move || {
            let _closer = producer.closer();
            for handle in run(&space, &query, Some(&producer)) {
                producer.push(handle);
            }
        })
        .map_err(|e| HubError::Io {
            path: "<pattern-stream thread>".into(),
            source: e,
        })?;
    Ok(ResultValue::Deferred(queue))
}

fn compile(table: &AtomTable, root: Handle) -> HubResult<CompiledQuery> {
    let atom = table
        .get(root)
        .ok_or_else(|| malformed(format!("{root} is not in the atomspace")))?;
    let form = QueryForm::of(atom.kind())
        .ok_or_else(|| malformed(format!("{} is not a query form", atom.kind())))?;
    let parts = atom.outgoing();

    let (decl, body, rewrite) = match (form.has_rewrite(), parts) {
        (true, [decl, body, rewrite]) => (Some(*decl), *body, Some(*rewrite)),
        (true, [body, rewrite]) => (None, *body, Some(*rewrite)),
        (false, [decl, body]) => (Some(*decl), *body, None),
        (false, [body]) => (None, *body, None),
        _ => {
            return Err(malformed(format!(
                "{} has {} members; expected {}",
                atom.kind(),
                parts.len(),
                if form.has_rewrite() {
                    "[vardecl] body rewrite"
                } else {
                    "[vardecl] body"
                }
            )));
        }
    };

    let vars = match decl {
        Some(decl) => declared_variables(table, decl)?,
        None => {
            let mut found = Vec::new();
            free_variables(table, body, &mut found);
            found
                .into_iter()
                .map(|handle| Variable {
                    handle,
                    type_restriction: None,
                })
                .collect()
        }
    };

    let clauses = match table.get(body) {
        Some(Atom::Link { kind, outgoing }) if kind == "AndLink" || kind == "PresentLink" => {
            outgoing.clone()
        }
        Some(_) => vec![body],
        None => return Err(malformed("query body is missing")),
    };

    Ok(CompiledQuery {
        form,
        vars,
        clauses,
        rewrite,
    })
}

fn declared_variables(table: &AtomTable, decl: Handle) -> HubResult<Vec<Variable>> {
    match table.get(decl) {
        Some(Atom::Node { kind, .. }) if kind == VARIABLE_NODE => Ok(vec![Variable {
            handle: decl,
            type_restriction: None,
        }]),
        Some(Atom::Link { kind, outgoing }) if kind == "TypedVariableLink" => {
            let [var, ty] = outgoing.as_slice() else {
                return Err(malformed("TypedVariableLink takes a variable and a type"));
            };
            let type_restriction = match table.get(*ty) {
                Some(Atom::Node { kind, name }) if kind == "TypeNode" => Some(name.clone()),
                _ => return Err(malformed("TypedVariableLink type must be a TypeNode")),
            };
            match table.get(*var) {
                Some(Atom::Node { kind, .. }) if kind == VARIABLE_NODE => Ok(vec![Variable {
                    handle: *var,
                    type_restriction,
                }]),
                _ => Err(malformed("TypedVariableLink must type a VariableNode")),
            }
        }
        Some(Atom::Link { kind, outgoing }) if kind == "VariableList" || kind == "VariableSet" => {
            let mut vars = Vec::new();
            for member in outgoing {
                vars.extend(declared_variables(table, *member)?);
            }
            Ok(vars)
        }
        Some(other) => Err(malformed(format!(
            "{} is not a variable declaration",
            other.kind()
        ))),
        None => Err(malformed("variable declaration is missing")),
    }
}

fn free_variables(table: &AtomTable, handle: Handle, found: &mut Vec<Handle>) {
    match table.get(handle) {
        Some(Atom::Node { kind, .. }) if kind == VARIABLE_NODE => {
            if !found.contains(&handle) {
                found.push(handle);
            }
        }
        Some(Atom::Link { outgoing, .. }) => {
            for child in outgoing {
                free_variables(table, *child, found);
            }
        }
        _ => {}
    }
}

struct Matcher<'a> {
    table: &'a AtomTable,
    vars: HashMap<Handle, Option<&'a str>>,
    candidates: Vec<Handle>,
    stream: Option<&'a QueueValue>,
}

impl<'a> Matcher<'a> {
    fn new(table: &'a AtomTable, vars: &'a [Variable], stream: Option<&'a QueueValue>) -> Self {
        let mut has_var: HashMap<Handle, bool> = HashMap::new();
        let mut candidates = Vec::new();
        for (handle, atom) in table.iter() {
            let var = match atom {
                Atom::Node { kind, .. } => kind == VARIABLE_NODE,
                Atom::Link { outgoing, .. } => outgoing
                    .iter()
                    .any(|c| has_var.get(c).copied().unwrap_or(false)),
            };
            has_var.insert(handle, var);
            if !var {
                candidates.push(handle);
            }
        }

        Self {
            table,
            vars: vars
                .iter()
                .map(|v| (v.handle, v.type_restriction.as_deref()))
                .collect(),
            candidates,
            stream,
        }
    }

    fn cancelled(&self) -> bool {
        self.stream.is_some_and(QueueValue::is_cancelled)
    }

    fn unify(&self, pattern: Handle, candidate: Handle, bindings: &mut Bindings) -> bool {
        if let Some(restriction) = self.vars.get(&pattern) {
            if let Some(bound) = bindings.get(&pattern) {
                return *bound == candidate;
            }
            if let Some(kind) = restriction {
                if self.table.get(candidate).map(Atom::kind) != Some(*kind) {
                    return false;
                }
            }
            bindings.insert(pattern, candidate);
            return true;
        }
        if pattern == candidate {
            return true;
        }
        match (self.table.get(pattern), self.table.get(candidate)) {
            (
                Some(Atom::Link {
                    kind: pk,
                    outgoing: po,
                }),
                Some(Atom::Link {
                    kind: ck,
                    outgoing: co,
                }),
            ) if pk == ck && po.len() == co.len() => po
                .iter()
                .zip(co)
                .all(|(p, c)| self.unify(*p, *c, bindings)),
            _ => false,
        }
    }

    fn solve(&self, clauses: &[Handle], bindings: Bindings, out: &mut Vec<Bindings>) {
        let Some((first, rest)) = clauses.split_first() else {
            out.push(bindings);
            return;
        };
        for candidate in &self.candidates {
            if self.cancelled() {
                return;
            }
            let mut next = bindings.clone();
            if self.unify(*first, *candidate, &mut next) {
                self.solve(rest, next, out);
            }
        }
    }
}

/// Distinct groundings of the declared variables, in discovery order.
fn groundings(
    table: &AtomTable,
    query: &CompiledQuery,
    stream: Option<&QueueValue>,
) -> Vec<Vec<Handle>> {
    let matcher = Matcher::new(table, &query.vars, stream);
    let mut solutions = Vec::new();
    matcher.solve(&query.clauses, Bindings::new(), &mut solutions);

    let mut seen = HashSet::new();
    solutions
        .into_iter()
        .filter_map(|b| {
            query
                .vars
                .iter()
                .map(|v| b.get(&v.handle).copied())
                .collect::<Option<Vec<_>>>()
        })
        .filter(|tuple| seen.insert(tuple.clone()))
        .collect()
}

/// Match and build results. A cancelled `stream` stops the work early and
/// nothing further is written to `space`.
fn run(space: &AtomSpace, query: &CompiledQuery, stream: Option<&QueueValue>) -> Vec<Handle> {
    let tuples = groundings(&space.read(), query, stream);

    let mut seen = HashSet::new();
    let mut results = Vec::with_capacity(tuples.len());
    for tuple in tuples {
        if stream.is_some_and(QueueValue::is_cancelled) {
            break;
        }
        let result = match query.rewrite {
            Some(template) => {
                let bindings: Bindings = query
                    .vars
                    .iter()
                    .map(|v| v.handle)
                    .zip(tuple.iter().copied())
                    .collect();
                instantiate(space, template, &bindings)
            }
            None => match tuple.as_slice() {
                [] => continue,
                [single] => Some(*single),
                many => Some(space.add_link("ListLink", many.to_vec())),
            },
        };
        if let Some(handle) = result {
            if seen.insert(handle) {
                results.push(handle);
            }
        }
    }
    results
}

/// Substitute bound variables into `template`, inserting new links.
fn instantiate(space: &AtomSpace, template: Handle, bindings: &Bindings) -> Option<Handle> {
    if let Some(value) = bindings.get(&template) {
        return Some(*value);
    }
    match space.get(template)? {
        Atom::Node { .. } => Some(template),
        Atom::Link { kind, outgoing } => {
            let grounded = outgoing
                .iter()
                .map(|child| instantiate(space, *child, bindings))
                .collect::<Option<Vec<_>>>()?;
            if grounded == outgoing {
                Some(template)
            } else {
                Some(space.add_link(&kind, grounded))
            }
        }
    }
}
