use dashmap::DashMap;

/// Lazily populated map from a name to a resolved handle.
///
/// A name is resolved at most once after it succeeds. Failed resolutions are not remembered,
/// so the next lookup tries again.
pub struct NameCache<V> {
    map: DashMap<String, V, fxhash::FxBuildHasher>,
}

impl<V: Clone> Default for NameCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone> NameCache<V> {
    pub fn new() -> Self {
        Self {
            map: DashMap::with_hasher(fxhash::FxBuildHasher::default()),
        }
    }

    pub fn get_or_resolve<F>(&self, name: &str, resolve: F) -> Option<V>
    where
        F: FnOnce(&str) -> Option<V>,
    {
        if let Some(v) = self.map.get(name) {
            return Some(v.value().clone());
        }

        let v = resolve(name)?;
        Some(
            self.map
                .entry(name.to_owned())
                .or_insert(v)
                .value()
                .clone(),
        )
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
