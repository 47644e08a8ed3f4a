use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Object-safe equality and hashing for a module's private state type.
pub trait StateValue: fmt::Debug + Send + Sync + 'static {
    fn as_any(&self) -> &dyn Any;
    fn eq_dyn(&self, other: &dyn StateValue) -> bool;
    fn hash_dyn(&self, hasher: &mut dyn Hasher);
}

impl<T> StateValue for T
where
    T: Any + fmt::Debug + Eq + Hash + Send + Sync,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn eq_dyn(&self, other: &dyn StateValue) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .is_some_and(|other| other == self)
    }

    fn hash_dyn(&self, mut hasher: &mut dyn Hasher) {
        TypeId::of::<T>().hash(&mut hasher);
        self.hash(&mut hasher);
    }
}

/// Opaque derivation state produced by one stateful module.
///
/// The parser only compares and hashes these; the owning module downcasts
/// its tails' states back to its own type.
#[derive(Clone)]
pub struct DpState(Arc<dyn StateValue>);

impl DpState {
    pub fn new<T>(value: T) -> Self
    where
        T: Any + fmt::Debug + Eq + Hash + Send + Sync,
    {
        Self(Arc::new(value))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        (*self.0).as_any().downcast_ref::<T>()
    }
}

impl PartialEq for DpState {
    fn eq(&self, other: &Self) -> bool {
        (*self.0).eq_dyn(&*other.0)
    }
}

impl Eq for DpState {}

impl Hash for DpState {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (*self.0).hash_dyn(state);
    }
}

impl fmt::Debug for DpState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

/// One state slot per stateful module, in registry order. Compared element-wise.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct CompositeState(Vec<Option<DpState>>);

impl CompositeState {
    pub fn new(slots: Vec<Option<DpState>>) -> Self {
        Self(slots)
    }

    pub fn slot(&self, n: usize) -> Option<&DpState> {
        self.0.get(n).and_then(Option::as_ref)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::hash_map::DefaultHasher;

    use super::*;

    #[derive(Debug, PartialEq, Eq, Hash)]
    struct Words(Vec<u32>);

    #[derive(Debug, PartialEq, Eq, Hash)]
    struct Other(Vec<u32>);

    fn hash_of(s: &DpState) -> u64 {
        let mut h = DefaultHasher::new();
        s.hash(&mut h);
        h.finish()
    }

    #[test]
    fn equal_values_are_equal_and_hash_alike() {
        let a = DpState::new(Words(vec![1, 2]));
        let b = DpState::new(Words(vec![1, 2]));
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
    }

    #[test]
    fn different_types_never_equal() {
        let a = DpState::new(Words(vec![1, 2]));
        let b = DpState::new(Other(vec![1, 2]));
        assert_ne!(a, b);
    }

    #[test]
    fn downcast_round_trips() {
        let a = DpState::new(Words(vec![7]));
        assert_eq!(a.downcast_ref::<Words>(), Some(&Words(vec![7])));
        assert!(a.downcast_ref::<Other>().is_none());
    }

    #[test]
    fn composite_compares_elementwise() {
        let a = CompositeState::new(vec![Some(DpState::new(Words(vec![1]))), None]);
        let b = CompositeState::new(vec![Some(DpState::new(Words(vec![1]))), None]);
        let c = CompositeState::new(vec![Some(DpState::new(Words(vec![2]))), None]);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.slot(1).is_none());
    }
}
