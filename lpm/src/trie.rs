// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Longest-prefix-match maps, generic over the address family.

use prefix_trie::PrefixMap;

use crate::prefix::IpPrefix;

/// A prefix-to-value map supporting exact and longest-prefix-match lookups.
/// Insert and remove replace and return prior bindings. Iteration order is
/// lexicographic over (network bits, mask length) and stable for a given
/// set of bindings.
pub trait TrieMap {
    type Prefix: IpPrefix;
    type Value;

    /// Exact-match retrieval; this does not do LPM.
    fn get(&self, prefix: &Self::Prefix) -> Option<&Self::Value>;
    /// Exact-match retrieval; this does not do LPM.
    fn get_mut(&mut self, prefix: &Self::Prefix) -> Option<&mut Self::Value>;

    /// Insert a binding, returning the replaced value if the prefix was bound.
    fn insert(&mut self, prefix: Self::Prefix, value: Self::Value) -> Option<Self::Value>;

    /// Remove the exact binding for a prefix, if any.
    fn remove(&mut self, prefix: &Self::Prefix) -> Option<Self::Value>;

    fn iter(&self) -> impl Iterator<Item = (Self::Prefix, &Self::Value)>;
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool;

    /// Longest-prefix-match: the binding with the longest prefix covering
    /// `addr`, or `None` if no binding covers it.
    fn lookup(
        &self,
        addr: <Self::Prefix as IpPrefix>::Addr,
    ) -> Option<(Self::Prefix, &Self::Value)>;
}

/// [`TrieMap`] over a binary radix trie. Exact lookups, insertion, removal
/// and LPM are all O(W), with W the address width in bits.
pub struct PrefixTrieMap<P, V>(PrefixMap<P::Net, V>)
where
    P: IpPrefix,
    P::Net: prefix_trie::Prefix;

impl<P, V> PrefixTrieMap<P, V>
where
    P: IpPrefix,
    P::Net: prefix_trie::Prefix,
{
    #[must_use]
    pub fn new() -> Self {
        Self(PrefixMap::new())
    }
}

impl<P, V> Default for PrefixTrieMap<P, V>
where
    P: IpPrefix,
    P::Net: prefix_trie::Prefix,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<P, V> TrieMap for PrefixTrieMap<P, V>
where
    P: IpPrefix,
    P::Net: prefix_trie::Prefix,
{
    type Prefix = P;
    type Value = V;

    fn get(&self, prefix: &P) -> Option<&V> {
        self.0.get(&prefix.to_net())
    }

    fn get_mut(&mut self, prefix: &P) -> Option<&mut V> {
        self.0.get_mut(&prefix.to_net())
    }

    fn insert(&mut self, prefix: P, value: V) -> Option<V> {
        self.0.insert(prefix.to_net(), value)
    }

    fn remove(&mut self, prefix: &P) -> Option<V> {
        self.0.remove(&prefix.to_net())
    }

    fn iter(&self) -> impl Iterator<Item = (P, &V)> {
        self.0.iter().map(|(net, v)| (P::from_net(*net), v))
    }

    fn len(&self) -> usize {
        self.0.iter().count()
    }

    fn is_empty(&self) -> bool {
        self.0.iter().next().is_none()
    }

    fn lookup(&self, addr: P::Addr) -> Option<(P, &V)> {
        self.0
            .get_lpm(&P::from_host(addr).to_net())
            .map(|(net, v)| (P::from_net(*net), v))
    }
}
