//! Texture bookkeeping that does not need a device.
//!
//! Every stored texture carries a serial that changes whenever its slot is replaced.
//! A recorded draw snapshots the textures it was issued against, so a later resize in
//! the same frame (glyph atlas growth) cannot change what that draw samples. The
//! serials of a snapshot also key the bind group cache.

use std::collections::{HashMap, HashSet};

use sprig::{TextureId, MAX_TEXTURE_SLOTS};

/// A texture as it was when a draw captured it.
#[derive(Clone, Debug)]
pub(crate) struct Bound<T> {
    pub serial: u64,
    pub value: T,
}

pub(crate) struct TextureRegistry<T> {
    fallback: Bound<T>,
    slots: Vec<Bound<T>>,
    next_serial: u64,
}

impl<T: Clone> TextureRegistry<T> {
    /// `fallback` answers lookups of unknown ids and fills empty tables.
    pub fn new(fallback: T) -> Self {
        Self {
            fallback: Bound {
                serial: 0,
                value: fallback,
            },
            slots: Vec::new(),
            next_serial: 1,
        }
    }

    fn bind(&mut self, value: T) -> Bound<T> {
        let serial = self.next_serial;
        self.next_serial += 1;
        Bound { serial, value }
    }

    pub fn insert(&mut self, value: T) -> TextureId {
        let bound = self.bind(value);
        self.slots.push(bound);
        TextureId(self.slots.len() as u32 - 1)
    }

    /// Swap in a new texture for `id`. Returns `false` for an unknown id.
    pub fn replace(&mut self, id: TextureId, value: T) -> bool {
        if id.0 as usize >= self.slots.len() {
            return false;
        }
        let bound = self.bind(value);
        self.slots[id.0 as usize] = bound;
        true
    }

    pub fn get(&self, id: TextureId) -> Option<&T> {
        self.slots.get(id.0 as usize).map(|bound| &bound.value)
    }

    pub fn resolve(&self, id: TextureId) -> &Bound<T> {
        self.slots.get(id.0 as usize).unwrap_or(&self.fallback)
    }

    /// Full slot table for a draw, padded to [`MAX_TEXTURE_SLOTS`] with its first entry.
    pub fn snapshot(&self, ids: &[TextureId]) -> Vec<Bound<T>> {
        let padding = ids
            .first()
            .map_or(&self.fallback, |id| self.resolve(*id))
            .clone();

        let mut table: Vec<Bound<T>> = ids
            .iter()
            .take(MAX_TEXTURE_SLOTS)
            .map(|id| self.resolve(*id).clone())
            .collect();
        table.resize(MAX_TEXTURE_SLOTS, padding);
        table
    }
}

pub(crate) fn table_key<T>(table: &[Bound<T>]) -> Vec<u64> {
    table.iter().map(|bound| bound.serial).collect()
}

/// Bind groups keyed by texture table. Entries unused for a whole frame are dropped.
pub(crate) struct TableCache<B> {
    entries: HashMap<Vec<u64>, B>,
    used: HashSet<Vec<u64>>,
}

impl<B> TableCache<B> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            used: HashSet::new(),
        }
    }

    pub fn get_or_insert_with(&mut self, key: Vec<u64>, create: impl FnOnce() -> B) -> &B {
        self.used.insert(key.clone());
        self.entries.entry(key).or_insert_with(create)
    }

    pub fn end_frame(&mut self) {
        let used = std::mem::take(&mut self.used);
        self.entries.retain(|key, _| used.contains(key));
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(table: &[Bound<&'static str>]) -> Vec<&'static str> {
        table.iter().map(|bound| bound.value).collect()
    }

    #[test]
    fn test_snapshot_pads_with_first_slot() {
        let mut registry = TextureRegistry::new("fallback");
        let white = registry.insert("white");
        let atlas = registry.insert("atlas");

        let table = registry.snapshot(&[white, atlas]);
        assert_eq!(table.len(), MAX_TEXTURE_SLOTS);
        assert_eq!(&names(&table)[..3], &["white", "atlas", "white"]);

        let empty = registry.snapshot(&[]);
        assert!(names(&empty).iter().all(|name| *name == "fallback"));
    }

    #[test]
    fn test_recorded_table_survives_resize() {
        let mut registry = TextureRegistry::new("fallback");
        let white = registry.insert("white");
        let atlas = registry.insert("atlas 256");

        let before = registry.snapshot(&[white, atlas]);
        assert!(registry.replace(atlas, "atlas 512"));
        let after = registry.snapshot(&[white, atlas]);

        assert_eq!(before[1].value, "atlas 256");
        assert_eq!(after[1].value, "atlas 512");
        assert_ne!(table_key(&before), table_key(&after));
        assert_eq!(registry.get(atlas), Some(&"atlas 512"));
    }

    #[test]
    fn test_replace_unknown_id_is_rejected() {
        let mut registry = TextureRegistry::new("fallback");
        assert!(!registry.replace(TextureId(3), "atlas"));
        assert_eq!(registry.resolve(TextureId(3)).value, "fallback");
    }

    #[test]
    fn test_cache_reuses_tables_and_drops_stale_ones() {
        let mut registry = TextureRegistry::new("fallback");
        let white = registry.insert("white");
        let atlas = registry.insert("atlas");
        let mut cache = TableCache::new();
        let mut created = 0;

        for _ in 0..3 {
            let key = table_key(&registry.snapshot(&[white, atlas]));
            cache.get_or_insert_with(key, || {
                created += 1;
                created
            });
        }
        cache.end_frame();
        assert_eq!(created, 1);
        assert_eq!(cache.len(), 1);

        registry.replace(atlas, "bigger atlas");
        let key = table_key(&registry.snapshot(&[white, atlas]));
        cache.get_or_insert_with(key, || 0);
        cache.end_frame();
        assert_eq!(cache.len(), 1);
    }
}
