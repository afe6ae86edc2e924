//! Record filtering and label remapping.
//!
//! Raw slither labels include a `safe` class at index 4. It is removed and
//! every later index shifts down by one, so the cleaned label space is
//! contiguous.

use super::Record;

/// Bytecode of this length or shorter carries no contract code.
pub const MIN_BYTECODE_LEN: usize = 4;

/// Raw index of the removed class.
pub const REMOVED_CLASS: u32 = 4;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanStats {
    pub input: usize,
    pub kept: usize,
    pub dropped_short: usize,
    pub dropped_labels: usize,
}

#[derive(Debug, Clone, Default)]
pub struct CleanedSplit {
    pub records: Vec<Record>,
    pub stats: CleanStats,
}

pub fn remap_label(index: u32) -> Option<u32> {
    match index {
        i if i > REMOVED_CLASS => Some(i - 1),
        i if i < REMOVED_CLASS => Some(i),
        _ => None,
    }
}

/// Drops short records and remaps labels. Order is preserved.
pub fn clean_split(name: &str, records: &[Record]) -> CleanedSplit {
    let mut stats = CleanStats {
        input: records.len(),
        ..Default::default()
    };
    let mut cleaned = Vec::with_capacity(records.len());

    for record in records {
        if record.bytecode.chars().count() <= MIN_BYTECODE_LEN {
            stats.dropped_short += 1;
            continue;
        }

        let mut slither = Vec::with_capacity(record.slither.len());
        for &label in &record.slither {
            match remap_label(label) {
                Some(mapped) if !slither.contains(&mapped) => slither.push(mapped),
                Some(_) => {}
                None => stats.dropped_labels += 1,
            }
        }

        cleaned.push(Record {
            bytecode: record.bytecode.clone(),
            slither,
        });
    }

    stats.kept = cleaned.len();
    tracing::info!(
        split = name,
        input = stats.input,
        kept = stats.kept,
        dropped_short = stats.dropped_short,
        dropped_labels = stats.dropped_labels,
        "cleaned split"
    );

    CleanedSplit {
        records: cleaned,
        stats,
    }
}
