/*!
 * Type Tags
 *
 * Word-sized discriminants for the types stored in an `AtomicValue`.
 * Each Rust type gets one tag the first time it is seen; the registry is
 * process-wide so tags compare equal across cells.
 */

use ahash::RandomState;
use dashmap::DashMap;
use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::OnceLock;

/// Tag word of a cell that was never published
pub(crate) const TAG_EMPTY: usize = 0;
/// Tag word while the first publish is between its two stores
pub(crate) const TAG_PUBLISHING: usize = usize::MAX;

/// Discriminant identifying the logical type of a published value
///
/// Never equal to the empty or in-progress markers.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeTag(usize);

struct Registry {
    by_type: DashMap<TypeId, TypeTag, RandomState>,
    names: DashMap<TypeTag, &'static str, RandomState>,
    next: AtomicUsize,
}

fn registry() -> &'static Registry {
    static REGISTRY: OnceLock<Registry> = OnceLock::new();
    REGISTRY.get_or_init(|| Registry {
        by_type: DashMap::with_hasher(RandomState::new()),
        names: DashMap::with_hasher(RandomState::new()),
        next: AtomicUsize::new(TAG_EMPTY + 1),
    })
}

impl TypeTag {
    /// Tag for `T`, registering it on first use
    pub fn of<T: Any>() -> Self {
        let reg = registry();
        let id = TypeId::of::<T>();
        if let Some(tag) = reg.by_type.get(&id) {
            return *tag;
        }

        *reg.by_type.entry(id).or_insert_with(|| {
            let tag = TypeTag(reg.next.fetch_add(1, Ordering::Relaxed));
            reg.names.insert(tag, type_name::<T>());
            tag
        })
    }

    /// Rebuild a tag from a published tag word
    #[inline]
    pub(crate) const fn from_word(word: usize) -> Self {
        Self(word)
    }

    /// Raw tag word
    #[inline]
    pub const fn get(self) -> usize {
        self.0
    }

    /// Name of the tagged type, for diagnostics
    pub fn name(self) -> &'static str {
        registry()
            .names
            .get(&self)
            .map(|name| *name)
            .unwrap_or("<unregistered>")
    }
}

impl fmt::Debug for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeTag({}: {})", self.0, self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_is_stable_per_type() {
        assert_eq!(TypeTag::of::<u64>(), TypeTag::of::<u64>());
        assert_ne!(TypeTag::of::<u64>(), TypeTag::of::<u32>());
        assert_ne!(TypeTag::of::<String>(), TypeTag::of::<&'static str>());
    }

    #[test]
    fn test_tag_avoids_reserved_words() {
        let tag = TypeTag::of::<Vec<u8>>();
        assert_ne!(tag.get(), TAG_EMPTY);
        assert_ne!(tag.get(), TAG_PUBLISHING);
    }

    #[test]
    fn test_tag_name() {
        assert_eq!(TypeTag::of::<u64>().name(), "u64");
        assert_eq!(TypeTag::from_word(TAG_PUBLISHING - 1).name(), "<unregistered>");
    }

    #[test]
    fn test_concurrent_registration_agrees() {
        struct Fresh;
        let tags: Vec<TypeTag> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8).map(|_| s.spawn(TypeTag::of::<Fresh>)).collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert!(tags.windows(2).all(|w| w[0] == w[1]));
    }
}
