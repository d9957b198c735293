use rustc_hash::FxHashSet;

use crate::name::QName;

/// The hostname allowlist: a queried name matches when any suffix of its
/// label sequence is in the set.
///
/// Matching is byte-sensitive; callers normalize case beforehand if they
/// need to. A hit memoizes the full queried name so repeat lookups resolve
/// on the first probe.
#[derive(Debug, Clone, Default)]
pub struct HostnameSet {
    names: FxHashSet<QName>,
}

impl HostnameSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: QName) {
        self.names.insert(name);
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Suffix-containment lookup, O(label count) set probes.
    pub fn matches(&mut self, name: &QName) -> bool {
        for level in 0..name.labels().len() {
            if self.names.contains(&name.suffix(level)) {
                if level > 0 {
                    self.names.insert(name.clone());
                }
                return true;
            }
        }
        false
    }
}

impl FromIterator<QName> for HostnameSet {
    fn from_iter<I: IntoIterator<Item = QName>>(iter: I) -> Self {
        Self { names: iter.into_iter().collect() }
    }
}
