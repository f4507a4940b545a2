//! Site-pattern frequency/probability file I/O (spec §6):
//!
//! ```text
//! # SitePat
//! a.0:a.1 0.5
//! ```
//!
//! Input files carry observed frequencies; output files carry the
//! normalized branch-table probabilities produced by a replicate run. Both
//! share the same `<label>:<label>:...  <value>` line format, ordered
//! canonically by bitmask on output (missing patterns are implicitly zero,
//! per [`coalescent::BranchTable::get`]).

use std::{
    fs::File,
    io::{BufRead, BufReader, Write},
    path::Path,
};

use coalescent::BranchTable;
use network::{LabelIndex, TipSet};

use crate::NetIoError;

const HEADER_PREFIX: &str = "# SitePat";

/// Parse a site-pattern file into a [`BranchTable`] keyed by the bitmasks
/// `labels` resolves each pattern's names to. Label order within a pattern
/// is not significant — only set membership is.
///
/// # Errors
/// [`NetIoError::MissingSitePatHeader`] if the first non-blank line isn't a
/// `# SitePat` header; [`NetIoError::UnknownLabel`] on a name absent from
/// `labels`; [`NetIoError::MissingFrequency`] on a data line missing its
/// trailing numeric column.
pub fn read_site_patterns(path: &Path, labels: &LabelIndex) -> Result<BranchTable, NetIoError> {
    let file = File::open(path).map_err(|e| NetIoError::OpenFile(path.display().to_string(), e))?;
    let reader = BufReader::new(file);
    let mut table = BranchTable::new();
    let mut header_seen = false;

    for (i, line) in reader.lines().enumerate() {
        let lineno = i + 1;
        let line = line.map_err(|e| NetIoError::OpenFile(path.display().to_string(), e))?;
        let trimmed = line.trim();
        if trimmed.is_empty() { continue; }
        if trimmed.starts_with(HEADER_PREFIX) { header_seen = true; continue; }
        if trimmed.starts_with('#') { continue; }
        if !header_seen {
            return Err(NetIoError::MissingSitePatHeader(lineno));
        }

        let mut cols = trimmed.split_whitespace();
        let pattern = cols.next().ok_or_else(|| NetIoError::MalformedLine(lineno, trimmed.to_string()))?;
        let value: f64 = cols.next()
            .ok_or(NetIoError::MissingFrequency(lineno))?
            .parse()
            .map_err(|_| NetIoError::BadNumber(lineno, trimmed.to_string()))?;

        let mut mask = TipSet::EMPTY;
        for label in pattern.split(':') {
            let bit = labels.bit_of(label).ok_or_else(|| NetIoError::UnknownLabel(lineno, label.to_string()))?;
            mask = mask.union(TipSet::singleton(bit));
        }
        table.add(mask, value);
    }
    Ok(table)
}

/// Render `table` as the canonical `# SitePat  Prob` text format (spec §6),
/// one line per entry, ordered by bitmask (free, since [`BranchTable::to_arrays`]
/// already returns its keys sorted).
#[must_use]
pub fn format_site_patterns(table: &BranchTable, labels: &LabelIndex) -> String {
    let mut out = String::from("# SitePat  Prob\n");
    let (keys, values) = table.to_arrays();
    for (key, value) in keys.iter().zip(values) {
        let pattern = pattern_name(*key, labels);
        out.push_str(&format!("{pattern} {value}\n"));
    }
    out
}

fn pattern_name(mask: TipSet, labels: &LabelIndex) -> String {
    (0..labels.len() as u32)
        .filter(|&bit| mask.contains(bit))
        .filter_map(|bit| labels.name_of(bit))
        .collect::<Vec<_>>()
        .join(":")
}

/// Write `table` to `path` in the canonical site-pattern text format.
///
/// # Errors
/// [`NetIoError::WriteFailed`] on any I/O failure.
pub fn write_site_patterns(path: &Path, table: &BranchTable, labels: &LabelIndex) -> Result<(), NetIoError> {
    std::fs::write(path, format_site_patterns(table, labels))
        .map_err(|e| NetIoError::WriteFailed(path.display().to_string(), e))
}

/// Write `table` to any [`Write`] sink (used for the CLI's stdout path).
///
/// # Errors
/// Bubbles up the underlying [`std::io::Error`].
pub fn write_site_patterns_to<W: Write>(mut sink: W, table: &BranchTable, labels: &LabelIndex) -> std::io::Result<()> {
    sink.write_all(format_site_patterns(table, labels).as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::approx_eq;

    fn two_tip_labels() -> LabelIndex {
        let mut labels = LabelIndex::new();
        labels.insert("a.0").unwrap();
        labels.insert("a.1").unwrap();
        labels
    }

    #[test]
    fn reads_observed_frequencies_keyed_by_pattern() {
        let labels = two_tip_labels();
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "# SitePat\na.0 0.6\na.1 0.4\n").unwrap();
        let table = read_site_patterns(file.path(), &labels).unwrap();
        assert!(approx_eq!(f64, table.get(TipSet::singleton(0)), 0.6));
        assert!(approx_eq!(f64, table.get(TipSet::singleton(1)), 0.4));
    }

    #[test]
    fn missing_pattern_defaults_to_zero() {
        let labels = two_tip_labels();
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "# SitePat\na.0 1.0\n").unwrap();
        let table = read_site_patterns(file.path(), &labels).unwrap();
        assert!(approx_eq!(f64, table.get(TipSet::singleton(1)), 0.0));
    }

    #[test]
    fn rejects_missing_header() {
        let labels = two_tip_labels();
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "a.0 1.0\n").unwrap();
        let err = read_site_patterns(file.path(), &labels).unwrap_err();
        assert!(matches!(err, NetIoError::MissingSitePatHeader(_)));
    }

    #[test]
    fn rejects_unknown_label() {
        let labels = two_tip_labels();
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "# SitePat\nghost 1.0\n").unwrap();
        let err = read_site_patterns(file.path(), &labels).unwrap_err();
        assert!(matches!(err, NetIoError::UnknownLabel(_, _)));
    }

    #[test]
    fn output_format_is_ordered_by_bitmask() {
        let labels = two_tip_labels();
        let mut table = BranchTable::new();
        table.add(TipSet::singleton(1), 0.4);
        table.add(TipSet::singleton(0), 0.6);
        let text = format_site_patterns(&table, &labels);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "# SitePat  Prob");
        assert!(lines[1].starts_with("a.0"));
        assert!(lines[2].starts_with("a.1"));
    }
}
