use std::collections::HashMap;
use std::hash::Hash;

use crate::core::decl::{DeclGraph, DeclId, DeclKind};
use crate::error::{BindsworthError, Result};

/// Items that could not be ordered because they depend on each other
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleError<T> {
    /// The cycle, starting with the first item that was revisited
    pub involved: Vec<T>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    New,
    Active,
    Done,
}

/// Depth-first topological sort.
///
/// `prerequisites(item)` lists the items that must precede `item`; anything
/// not in `items` is ignored. Unconstrained items keep their input order.
pub fn topological_sort<T, F, I>(items: &[T], mut prerequisites: F) -> std::result::Result<Vec<T>, CycleError<T>>
where
    T: Copy + Eq + Hash,
    F: FnMut(T) -> I,
    I: IntoIterator<Item = T>,
{
    let position: HashMap<T, usize> = items.iter().enumerate().map(|(i, &item)| (item, i)).collect();
    let edges: Vec<Vec<usize>> = items
        .iter()
        .map(|&item| {
            let mut targets: Vec<usize> = prerequisites(item)
                .into_iter()
                .filter_map(|dep| position.get(&dep).copied())
                .collect();
            targets.sort_unstable();
            targets.dedup();
            targets
        })
        .collect();

    let mut marks = vec![Mark::New; items.len()];
    let mut order = Vec::with_capacity(items.len());

    for start in 0..items.len() {
        if marks[start] != Mark::New {
            continue;
        }
        marks[start] = Mark::Active;
        let mut stack: Vec<(usize, usize)> = vec![(start, 0)];

        while let Some(frame) = stack.last_mut() {
            let node = frame.0;
            match edges[node].get(frame.1).copied() {
                Some(dep) => {
                    frame.1 += 1;
                    match marks[dep] {
                        Mark::New => {
                            marks[dep] = Mark::Active;
                            stack.push((dep, 0));
                        }
                        Mark::Active => {
                            let from = stack.iter().position(|&(n, _)| n == dep).unwrap_or(0);
                            return Err(CycleError {
                                involved: stack[from..].iter().map(|&(n, _)| items[n]).collect(),
                            });
                        }
                        Mark::Done => {}
                    }
                }
                None => {
                    marks[node] = Mark::Done;
                    order.push(items[node]);
                    stack.pop();
                }
            }
        }
    }
    Ok(order)
}

/// Order classes so that every class follows all of its bases that are in
/// `classes`. Virtual bases are treated like any other base.
pub fn order_classes(graph: &DeclGraph, classes: &[DeclId]) -> Result<Vec<DeclId>> {
    topological_sort(classes, |id| graph.bases_of(id)).map_err(|cycle| {
        let path: Vec<String> = cycle.involved.iter().map(|&id| graph.display_name(id)).collect();
        BindsworthError::InvariantViolation {
            declaration: path.first().cloned().unwrap_or_default(),
            reason: format!("inheritance cycle {}", path.join(" -> ")),
        }
    })
}

/// Enums first, then classes in inheritance order, then typedefs,
/// variables and functions. Each group keeps discovery order.
pub fn emission_order(graph: &DeclGraph, exported: &[DeclId]) -> Result<Vec<DeclId>> {
    let mut enums = Vec::new();
    let mut classes = Vec::new();
    let mut typedefs = Vec::new();
    let mut variables = Vec::new();
    let mut functions = Vec::new();

    for &id in exported {
        match graph.get(id).kind {
            DeclKind::Enum(_) => enums.push(id),
            DeclKind::Class(_) => classes.push(id),
            DeclKind::Typedef { .. } => typedefs.push(id),
            DeclKind::Variable { .. } => variables.push(id),
            DeclKind::Function(_) => functions.push(id),
            DeclKind::Namespace => {}
        }
    }

    let mut order = enums;
    order.extend(order_classes(graph, &classes)?);
    order.extend(typedefs);
    order.extend(variables);
    order.extend(functions);
    Ok(order)
}

/// Reorder the children of one scope so prerequisites come first.
///
/// On a cycle the input order is returned together with the cycle.
pub fn order_siblings<T, F, I>(siblings: &[T], prerequisites: F) -> (Vec<T>, Option<CycleError<T>>)
where
    T: Copy + Eq + Hash,
    F: FnMut(T) -> I,
    I: IntoIterator<Item = T>,
{
    match topological_sort(siblings, prerequisites) {
        Ok(order) => (order, None),
        Err(cycle) => (siblings.to_vec(), Some(cycle)),
    }
}
