// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Per-offset ordinals for synthesized identities.

use std::collections::HashMap;
use std::hash::Hash;

/// Hands out 0, 1, 2, ... for each distinct key, so several entities created
/// at the same syntax offset still get distinct identities.
#[derive(Debug)]
pub struct OrdinalDispenser<K> {
    next: HashMap<K, i32>,
}

impl<K: Hash + Eq> OrdinalDispenser<K> {
    pub fn new() -> Self {
        Self { next: HashMap::new() }
    }

    pub fn assign(&mut self, key: K) -> i32 {
        let slot = self.next.entry(key).or_insert(0);
        let ordinal = *slot;
        *slot += 1;
        ordinal
    }
}

impl<K: Hash + Eq> Default for OrdinalDispenser<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_per_key() {
        let mut d = OrdinalDispenser::new();
        assert_eq!(d.assign(10), 0);
        assert_eq!(d.assign(10), 1);
        assert_eq!(d.assign(20), 0);
        assert_eq!(d.assign(10), 2);
    }
}
