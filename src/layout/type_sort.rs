use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

use crate::{common::TypeId, types::TypeEnv};

/// Edges from each type to the types it stores by value.
///
/// Names that do not resolve are left out; they surface as
/// `UnknownType` when the layout is computed.
pub fn dependency_graph(env: &TypeEnv) -> BTreeMap<TypeId, BTreeSet<TypeId>> {
    env.ids()
        .map(|id| {
            let deps = env
                .get(id)
                .variants
                .iter()
                .flat_map(|v| v.fields.iter())
                .flat_map(|f| f.by_value_names())
                .filter_map(|name| env.lookup(name))
                .collect();
            (id, deps)
        })
        .collect()
}

pub fn reverse_graph(
    graph: &BTreeMap<TypeId, BTreeSet<TypeId>>,
) -> BTreeMap<TypeId, BTreeSet<TypeId>> {
    let mut rev: BTreeMap<TypeId, BTreeSet<TypeId>> = BTreeMap::new();

    for node in graph.keys() {
        rev.entry(*node).or_default();
    }

    for (from, tos) in graph {
        for to in tos {
            rev.entry(*to).or_default().insert(*from);
        }
    }

    rev
}

/// Order types so that every type comes after the types it contains.
///
/// Returns the order and the types left over: members of a cycle and
/// everything that contains one.
pub fn topo_sort(graph: &BTreeMap<TypeId, BTreeSet<TypeId>>) -> (Vec<TypeId>, Vec<TypeId>) {
    let n = graph.len();
    let rev = reverse_graph(graph);
    let mut pending: BTreeMap<TypeId, usize> =
        graph.iter().map(|(id, deps)| (*id, deps.len())).collect();

    let mut q: VecDeque<TypeId> = pending
        .iter()
        .filter(|(_, count)| **count == 0)
        .map(|(id, _)| *id)
        .collect();

    let mut order = Vec::with_capacity(n);

    while let Some(node) = q.pop_front() {
        order.push(node);
        for dependent in &rev[&node] {
            if let Some(count) = pending.get_mut(dependent) {
                *count -= 1;
                if *count == 0 {
                    q.push_back(*dependent);
                }
            }
        }
    }

    let left = pending
        .into_iter()
        .filter_map(|(id, count)| (count > 0).then_some(id))
        .collect();
    (order, left)
}

/// Types that reach themselves through by-value fields.
pub fn recursive_types(env: &TypeEnv) -> HashSet<TypeId> {
    let graph = dependency_graph(env);
    let (_, left) = topo_sort(&graph);
    let candidates: HashSet<TypeId> = left.iter().copied().collect();

    left.into_iter()
        .filter(|start| reaches(&graph, &candidates, *start, *start))
        .collect()
}

fn reaches(
    graph: &BTreeMap<TypeId, BTreeSet<TypeId>>,
    within: &HashSet<TypeId>,
    from: TypeId,
    target: TypeId,
) -> bool {
    let mut seen = HashSet::new();
    let mut stack: Vec<TypeId> = graph[&from].iter().copied().collect();
    while let Some(node) = stack.pop() {
        if node == target {
            return true;
        }
        if !within.contains(&node) || !seen.insert(node) {
            continue;
        }
        stack.extend(graph[&node].iter().copied());
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        FieldType, Primitive,
        tests::{prim, sum},
    };

    fn named(n: &str) -> FieldType {
        FieldType::Named(n.into())
    }

    #[test]
    fn orders_dependencies_first() {
        let mut env = TypeEnv::new();
        let outer = env.insert(sum("Outer", vec![("A", vec![named("Inner")]), ("B", vec![])])).unwrap();
        let inner = env.insert(sum("Inner", vec![("X", vec![prim(Primitive::U8)])])).unwrap();
        let (order, left) = topo_sort(&dependency_graph(&env));
        assert_eq!(order, vec![inner, outer]);
        assert!(left.is_empty());
    }

    #[test]
    fn finds_self_and_mutual_recursion() {
        let mut env = TypeEnv::new();
        let list = env
            .insert(sum("List", vec![("Nil", vec![]), ("Cons", vec![prim(Primitive::U8), named("List")])]))
            .unwrap();
        let a = env.insert(sum("A", vec![("X", vec![named("B")]), ("Y", vec![])])).unwrap();
        let b = env.insert(sum("B", vec![("X", vec![FieldType::Tuple(vec![named("A")])])])).unwrap();
        let holder = env.insert(sum("Holder", vec![("H", vec![named("List")])])).unwrap();
        let leaf = env.insert(sum("Leaf", vec![("L", vec![])])).unwrap();
        let cyclic = env
            .insert(sum("Cyclic", vec![("C", vec![named("Cyclic"), named("Leaf")])]))
            .unwrap();

        let rec = recursive_types(&env);
        assert!(rec.contains(&list));
        assert!(rec.contains(&a));
        assert!(rec.contains(&b));
        assert!(rec.contains(&cyclic));
        assert!(!rec.contains(&holder));
        assert!(!rec.contains(&leaf));
    }

    #[test]
    fn pointers_break_cycles() {
        let mut env = TypeEnv::new();
        env.insert(sum(
            "List",
            vec![
                ("Nil", vec![]),
                (
                    "Cons",
                    vec![prim(Primitive::U8), FieldType::Ptr(Box::new(named("List")))],
                ),
            ],
        ))
        .unwrap();
        assert!(recursive_types(&env).is_empty());
    }
}
