//! Collision-free alias generation for tables and sub-queries.

use std::collections::HashSet;

/// Issues short unique identifiers of the form `prefix + counter`.
///
/// The counter increases monotonically across prefixes, and identifiers
/// registered as known (generated or external) are never reissued. One
/// generator is created per top-level translation; a multi-statement batch
/// shares a single generator so aliases stay unique across the batch.
#[derive(Debug, Default)]
pub struct UniqueIdentifierGenerator {
    known: HashSet<String>,
    counter: u64,
}

impl UniqueIdentifierGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an identifier that must never be issued.
    pub fn add_known(&mut self, identifier: impl Into<String>) {
        self.known.insert(identifier.into());
    }

    /// Return the next `prefix + counter` identifier, skipping any that is
    /// already known, and mark the returned one as known.
    pub fn unique(&mut self, prefix: &str) -> String {
        loop {
            let candidate = format!("{}{}", prefix, self.counter);
            self.counter += 1;
            if self.known.insert(candidate.clone()) {
                return candidate;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence() {
        let mut generator = UniqueIdentifierGenerator::new();
        for n in 0..5 {
            assert_eq!(generator.unique("t"), format!("t{}", n));
        }
    }

    #[test]
    fn test_known_identifiers_are_skipped() {
        let mut generator = UniqueIdentifierGenerator::new();
        generator.add_known("t1");
        assert_eq!(generator.unique("t"), "t0");
        assert_eq!(generator.unique("t"), "t2");
    }

    #[test]
    fn test_counter_is_shared_across_prefixes() {
        let mut generator = UniqueIdentifierGenerator::new();
        assert_eq!(generator.unique("t"), "t0");
        assert_eq!(generator.unique("q"), "q1");
        assert_eq!(generator.unique("t"), "t2");
    }
}
