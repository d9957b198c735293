use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::Context;
use flate2::read::GzDecoder;
use sr_dns::{HostnameSet, QName};

/// Read a gzip-compressed host list: one UTF-8 hostname per line, labels
/// separated by dots. Blank lines are skipped.
pub fn load(path: &Path) -> anyhow::Result<HostnameSet> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let reader = BufReader::new(GzDecoder::new(file));

    let mut hostnames = HostnameSet::new();
    for line in reader.lines() {
        let line = line.with_context(|| format!("reading {}", path.display()))?;
        let name = line.trim();
        if name.is_empty() {
            continue;
        }
        hostnames.insert(QName::from_dotted(name));
    }
    Ok(hostnames)
}
