use std::fmt;

/// A domain name as an ordered sequence of raw label bytes.
///
/// Labels are kept exactly as they appeared on the wire, including case.
/// Equality and hashing are structural; the empty sequence is the root name.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QName(pub Vec<Vec<u8>>);

impl QName {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn labels(&self) -> &[Vec<u8>] {
        &self.0
    }

    /// Build a name from dotted text, e.g. `"www.example.com"`.
    /// Empty labels (leading/trailing/double dots) are skipped.
    pub fn from_dotted(text: &str) -> Self {
        Self(
            text.split('.')
                .filter(|label| !label.is_empty())
                .map(|label| label.as_bytes().to_vec())
                .collect(),
        )
    }

    /// The name formed by the labels from `level` to the end.
    pub fn suffix(&self, level: usize) -> Self {
        Self(self.0[level..].to_vec())
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, label) in self.0.iter().enumerate() {
            if idx > 0 {
                f.write_str(".")?;
            }
            write!(f, "{}", String::from_utf8_lossy(label))?;
        }
        Ok(())
    }
}

impl<const N: usize> From<[&[u8]; N]> for QName {
    fn from(labels: [&[u8]; N]) -> Self {
        Self(labels.iter().map(|label| label.to_vec()).collect())
    }
}
