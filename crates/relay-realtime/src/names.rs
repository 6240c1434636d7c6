//! Display name allocation for new connections.

use rand::seq::SliceRandom;
use std::collections::HashSet;

/// Names handed out to clients before suffixing kicks in.
pub const DEFAULT_NAMES: &[&str] = &[
    "Gerry", "Rambo", "Katze", "Peter", "Johnny", "Frank", "Arnold", "Hans", "Ivy", "Jack",
    "Kate", "Liam", "Mia", "Noah", "Olivia", "Gonzales",
];

/// Picks human-friendly display names that are unique among the names in use.
///
/// The allocator is stateless: uniqueness is only guaranteed with respect to the
/// `used` set passed to [`NameAllocator::allocate`], so callers must serialize
/// allocation with registration.
#[derive(Debug, Clone)]
pub struct NameAllocator {
    pool: Vec<String>,
}

impl NameAllocator {
    /// Create an allocator over the given candidate pool.
    ///
    /// Duplicates and blank entries are dropped. An empty pool falls back to
    /// [`DEFAULT_NAMES`].
    pub fn new<I, S>(pool: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let pool: Vec<String> = pool
            .into_iter()
            .map(Into::into)
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty() && seen.insert(name.clone()))
            .collect();

        if pool.is_empty() {
            return Self::default();
        }
        Self { pool }
    }

    /// Candidate names.
    pub fn pool(&self) -> &[String] {
        &self.pool
    }

    /// Pick a name not contained in `used`.
    ///
    /// Chooses uniformly among free pool entries. Once the pool is exhausted a
    /// random base name gets the smallest numeric suffix (starting at 1) that
    /// is not in use.
    pub fn allocate(&self, used: &HashSet<String>) -> String {
        let mut rng = rand::thread_rng();

        let available: Vec<&String> = self.pool.iter().filter(|n| !used.contains(*n)).collect();
        if let Some(name) = available.choose(&mut rng) {
            return (*name).clone();
        }

        // pool is never empty, see `new`
        let base = self.pool.choose(&mut rng).map(String::as_str).unwrap_or("Guest");
        let mut suffix: u64 = 1;
        loop {
            let candidate = format!("{base}{suffix}");
            if !used.contains(&candidate) {
                return candidate;
            }
            suffix += 1;
        }
    }
}

impl Default for NameAllocator {
    fn default() -> Self {
        Self {
            pool: DEFAULT_NAMES.iter().map(|n| n.to_string()).collect(),
        }
    }
}
