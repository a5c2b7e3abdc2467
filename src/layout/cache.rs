use std::{
    collections::{HashMap, HashSet},
    num::NonZeroUsize,
    sync::{
        Arc, OnceLock, PoisonError, RwLock,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
};

use tracing::{debug, trace};

use crate::{
    common::{Position, TypeId},
    error::LayoutError,
    layout::{
        LayoutDescriptor, PayloadShape, compute_layout, type_sort::recursive_types,
        variants::ShapeResolver,
    },
    target::TargetInfo,
    types::TypeEnv,
};

pub type LayoutResult = Result<Arc<LayoutDescriptor>, LayoutError>;

type Slot = Arc<OnceLock<LayoutResult>>;

/// Layouts of one compilation run, computed at most once per type.
///
/// The map lock is only held to find or create the slot of a key. The slot
/// itself serializes computation: the first caller computes, concurrent
/// callers for the same key wait on the slot and read the stored result.
/// Errors are memoized like layouts.
#[derive(Debug)]
pub struct LayoutCache<'env> {
    env: &'env TypeEnv,
    target: TargetInfo,
    recursive: HashSet<TypeId>,
    slots: RwLock<HashMap<TypeId, Slot>>,
    computed: AtomicUsize,
}

impl<'env> LayoutCache<'env> {
    pub fn new(env: &'env TypeEnv, target: TargetInfo) -> Self {
        let recursive = recursive_types(env);
        if !recursive.is_empty() {
            debug!(count = recursive.len(), "recursive sum types found");
        }
        Self {
            env,
            target,
            recursive,
            slots: RwLock::new(HashMap::new()),
            computed: AtomicUsize::new(0),
        }
    }

    pub fn env(&self) -> &'env TypeEnv {
        self.env
    }

    pub fn layout_of(&self, id: TypeId) -> LayoutResult {
        let slot = self.slot(id);
        if let Some(result) = slot.get() {
            trace!(ty = %self.env.get(id).name, "layout cache hit");
            return result.clone();
        }
        slot.get_or_init(|| self.compute(id)).clone()
    }

    pub fn layout_by_name(&self, name: &str, pos: &Position) -> LayoutResult {
        match self.env.lookup(name) {
            Some(id) => self.layout_of(id),
            None => Err(LayoutError::UnknownType {
                name: name.to_string(),
                pos: pos.clone(),
            }),
        }
    }

    /// Compute the layout of every type in the environment on worker threads.
    ///
    /// Results are returned in declaration order.
    pub fn compute_all(&self) -> Vec<(TypeId, LayoutResult)> {
        let ids: Vec<TypeId> = self.env.ids().collect();
        if ids.is_empty() {
            return vec![];
        }
        let workers = thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(1)
            .min(ids.len());
        let chunk = ids.len().div_ceil(workers);

        thread::scope(|s| {
            for part in ids.chunks(chunk) {
                s.spawn(move || {
                    for id in part {
                        let _ = self.layout_of(*id);
                    }
                });
            }
        });

        ids.into_iter().map(|id| (id, self.layout_of(id))).collect()
    }

    /// Number of layouts actually computed, cache hits excluded.
    pub fn computations(&self) -> usize {
        self.computed.load(Ordering::Relaxed)
    }

    fn slot(&self, id: TypeId) -> Slot {
        if let Some(slot) = self
            .slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
        {
            return slot.clone();
        }
        self.slots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(id)
            .or_default()
            .clone()
    }

    fn compute(&self, id: TypeId) -> LayoutResult {
        self.computed.fetch_add(1, Ordering::Relaxed);
        let ty = self.env.get(id);
        if self.recursive.contains(&id) {
            return Err(LayoutError::RecursiveLayoutUnsupported {
                ty: ty.name.data.clone(),
                pos: ty.name.pos.clone(),
            });
        }
        let layout = compute_layout(id, ty, self)?;
        debug!(
            ty = %layout.name,
            size = layout.size,
            align = layout.align,
            discriminant = ?layout.discriminant,
            "computed layout"
        );
        Ok(Arc::new(layout))
    }
}

impl ShapeResolver for LayoutCache<'_> {
    fn target(&self) -> &TargetInfo {
        &self.target
    }

    fn named_shape(&self, name: &str, pos: &Position) -> Result<PayloadShape, LayoutError> {
        self.layout_by_name(name, pos).map(|l| l.shape())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Barrier;

    use super::*;
    use crate::types::{
        FieldType, Primitive,
        tests::{prim, sum, value_type},
    };

    #[test]
    fn concurrent_requests_compute_once() {
        let mut env = TypeEnv::new();
        let id = env.insert(value_type()).unwrap();
        let cache = LayoutCache::new(&env, TargetInfo::default());
        let barrier = Barrier::new(8);

        let layouts: Vec<_> = thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    s.spawn(|| {
                        barrier.wait();
                        cache.layout_of(id).unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(cache.computations(), 1);
        assert!(layouts.iter().all(|l| Arc::ptr_eq(l, &layouts[0])));
    }

    #[test]
    fn nested_types_resolve_through_cache() {
        let mut env = TypeEnv::new();
        let outer = env
            .insert(sum(
                "Outer",
                vec![
                    ("Wrap", vec![FieldType::Named("Value".into())]),
                    ("Flag", vec![prim(Primitive::Bool)]),
                ],
            ))
            .unwrap();
        env.insert(value_type()).unwrap();
        let cache = LayoutCache::new(&env, TargetInfo::default());

        let layout = cache.layout_of(outer).unwrap();
        assert_eq!(layout.max_payload_size, 32);
        assert_eq!(layout.size, 40);
        // Value itself was computed once while resolving Outer
        assert_eq!(cache.computations(), 2);
        cache.layout_by_name("Value", &Position::nowhere()).unwrap();
        assert_eq!(cache.computations(), 2);
    }

    #[test]
    fn errors_are_memoized() {
        let mut env = TypeEnv::new();
        let id = env
            .insert(sum("T", vec![("A", vec![FieldType::Named("Missing".into())])]))
            .unwrap();
        let cache = LayoutCache::new(&env, TargetInfo::default());
        assert!(matches!(
            cache.layout_of(id),
            Err(LayoutError::UnknownType { ref name, .. }) if name == "Missing"
        ));
        assert!(cache.layout_of(id).is_err());
        assert_eq!(cache.computations(), 1);
    }

    #[test]
    fn recursive_types_fail_without_deadlock() {
        let mut env = TypeEnv::new();
        let list = env
            .insert(sum(
                "List",
                vec![("Nil", vec![]), ("Cons", vec![FieldType::Named("List".into())])],
            ))
            .unwrap();
        let holder = env
            .insert(sum("Holder", vec![("H", vec![FieldType::Named("List".into())])]))
            .unwrap();
        let cache = LayoutCache::new(&env, TargetInfo::default());

        let results = cache.compute_all();
        assert!(matches!(
            results[list.get()].1,
            Err(LayoutError::RecursiveLayoutUnsupported { ref ty, .. }) if ty == "List"
        ));
        assert!(matches!(
            results[holder.get()].1,
            Err(LayoutError::RecursiveLayoutUnsupported { ref ty, .. }) if ty == "List"
        ));
    }

    #[test]
    fn oversized_nested_layout_is_an_error() {
        let mut env = TypeEnv::new();
        let chunk = env
            .insert(sum(
                "Chunk",
                vec![(
                    "C",
                    vec![FieldType::Array {
                        elem: Box::new(prim(Primitive::U64)),
                        len: 1 << 28,
                    }],
                )],
            ))
            .unwrap();
        let pair = env
            .insert(sum(
                "Pair",
                vec![(
                    "P",
                    vec![FieldType::Named("Chunk".into()), FieldType::Named("Chunk".into())],
                )],
            ))
            .unwrap();
        let cache = LayoutCache::new(&env, TargetInfo::default());

        let results = cache.compute_all();
        assert_eq!(results[chunk.get()].1.as_ref().unwrap().size, 1 << 31);
        assert!(matches!(
            results[pair.get()].1,
            Err(LayoutError::LayoutTooLarge { ref ty, .. }) if ty == "Pair"
        ));
    }

    #[test]
    fn compute_all_keeps_declaration_order() {
        let mut env = TypeEnv::new();
        for i in 0..20 {
            env.insert(sum(
                &format!("T{i}"),
                vec![("A", vec![prim(Primitive::U64)]), ("B", vec![])],
            ))
            .unwrap();
        }
        let cache = LayoutCache::new(&env, TargetInfo::default());
        let results = cache.compute_all();
        assert_eq!(results.len(), 20);
        for (i, (id, layout)) in results.iter().enumerate() {
            assert_eq!(id.get(), i);
            assert_eq!(layout.as_ref().unwrap().name, format!("T{i}"));
        }
        assert_eq!(cache.computations(), 20);
    }
}
