use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_ENTITY: AtomicU64 = AtomicU64::new(1);

/// Opaque handle identifying a logical object. Carries no data.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Entity(pub u64);

impl Entity {
    /// Sentinel meaning "no entity".
    pub const INVALID: Entity = Entity(0);

    /// Allocate a fresh handle.
    ///
    /// Handles come from a process-wide counter so that scenes built
    /// independently can be merged without collisions.
    pub fn create() -> Self {
        Self(NEXT_ENTITY.fetch_add(1, Ordering::Relaxed))
    }

    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_valid() {
            write!(f, "#{}", self.0)
        } else {
            write!(f, "#invalid")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn created_entities_are_unique_and_nonzero() {
        let handles: Vec<Entity> = (0..1000).map(|_| Entity::create()).collect();
        let unique: HashSet<Entity> = handles.iter().copied().collect();
        assert_eq!(unique.len(), handles.len());
        assert!(handles.iter().all(|e| e.is_valid()));
    }

    #[test]
    fn created_entities_are_unique_across_threads() {
        let workers: Vec<_> = (0..4)
            .map(|_| std::thread::spawn(|| (0..256).map(|_| Entity::create()).collect::<Vec<_>>()))
            .collect();
        let mut all = HashSet::new();
        for w in workers {
            for e in w.join().unwrap() {
                assert!(all.insert(e));
            }
        }
        assert_eq!(all.len(), 1024);
    }

    #[test]
    fn default_is_invalid() {
        assert_eq!(Entity::default(), Entity::INVALID);
        assert!(!Entity::INVALID.is_valid());
        assert_eq!(Entity::INVALID.to_string(), "#invalid");
    }
}
