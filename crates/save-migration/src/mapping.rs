// SAVE Storage - key-addressed blob storage
// Copyright (C) 2026 SAVE Contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published
// by the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.

//! Key mappings between the old and new key types of a migration

use std::fmt::{self, Debug};
use std::marker::PhantomData;

/// Pure, invertible mapping between an old and a new key type
pub trait KeyMapping: Send + Sync + Debug + 'static {
    /// Key type of the storage being drained
    type Old: Clone + Debug + Send + Sync + 'static;
    /// Key type of the storage being filled
    type New: Clone + Debug + Send + Sync + 'static;

    /// Old key for a new key
    fn to_old_key(&self, key: &Self::New) -> Self::Old;

    /// New key for an old key
    fn to_new_key(&self, key: &Self::Old) -> Self::New;
}

/// Same key type on both sides
pub struct IdentityMapping<K>(PhantomData<fn() -> K>);

impl<K> IdentityMapping<K> {
    /// Create the mapping
    pub fn new() -> Self {
        IdentityMapping(PhantomData)
    }
}

impl<K> Default for IdentityMapping<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K> Debug for IdentityMapping<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("IdentityMapping")
    }
}

impl<K> KeyMapping for IdentityMapping<K>
where
    K: Clone + Debug + Send + Sync + 'static,
{
    type Old = K;
    type New = K;

    fn to_old_key(&self, key: &K) -> K {
        key.clone()
    }

    fn to_new_key(&self, key: &K) -> K {
        key.clone()
    }
}

/// Mapping given as a pair of functions
pub struct FnMapping<O, N> {
    to_old: fn(&N) -> O,
    to_new: fn(&O) -> N,
}

impl<O, N> FnMapping<O, N> {
    /// Create the mapping; the functions must be inverses of each other
    pub fn new(to_old: fn(&N) -> O, to_new: fn(&O) -> N) -> Self {
        FnMapping { to_old, to_new }
    }
}

impl<O, N> Debug for FnMapping<O, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnMapping")
            .field("old", &std::any::type_name::<O>())
            .field("new", &std::any::type_name::<N>())
            .finish()
    }
}

impl<O, N> KeyMapping for FnMapping<O, N>
where
    O: Clone + Debug + Send + Sync + 'static,
    N: Clone + Debug + Send + Sync + 'static,
{
    type Old = O;
    type New = N;

    fn to_old_key(&self, key: &N) -> O {
        (self.to_old)(key)
    }

    fn to_new_key(&self, key: &O) -> N {
        (self.to_new)(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity() {
        let mapping = IdentityMapping::<String>::new();
        assert_eq!(mapping.to_new_key(&"a".to_string()), "a");
        assert_eq!(mapping.to_old_key(&"b".to_string()), "b");
    }

    #[test]
    fn test_fn_mapping_inverse() {
        let mapping: FnMapping<(String, i64), String> = FnMapping::new(
            |new: &String| {
                let (name, version) = new.split_once('@').unwrap_or((new.as_str(), "0"));
                (name.to_string(), version.parse().unwrap_or_default())
            },
            |old: &(String, i64)| format!("{}@{}", old.0, old.1),
        );

        let old = ("agent".to_string(), 3);
        let new = mapping.to_new_key(&old);
        assert_eq!(new, "agent@3");
        assert_eq!(mapping.to_old_key(&new), old);
    }
}
