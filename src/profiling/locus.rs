//! Locus presence profiling.
//!
//! Reference sequences of all loci are searched in one batch against the contigs of a genome.
//! A locus is present if one of its hits has aligned coverage >= coverage threshold
//! and identity >= identity threshold, with
//! aligned coverage = (alignment length - gap opens) / reference length.

use std::collections::BTreeSet;
use std::path::Path;

use fxhash::FxHashMap;

use crate::contigs::NormalizedGenome;
use crate::errors::TypingError;
use crate::profiling::search::{Hit, SearchEngine, SearchMode};
use crate::utils::files::{ScratchDir, SeqRecord};

/// locus id -> reference sequence length
pub type RefLengths = FxHashMap<String, usize>;

pub fn ref_lengths(refs: &[SeqRecord]) -> RefLengths {
    refs.iter().map(|r| (r.id.clone(), r.len())).collect()
}

/// aligned coverage of a reference by a hit, None if the reference is unknown or empty
pub fn aligned_coverage(hit: &Hit, lengths: &RefLengths) -> Option<f64> {
    match lengths.get(&hit.query_id) {
        Some(&len) if len > 0 => Some(hit.aligned_length.saturating_sub(hit.gap_opens) as f64 / len as f64),
        _ => None,
    }
}

/// loci having at least one qualifying hit. Thresholds are inclusive.
pub fn identify_loci(hits: &[Hit], lengths: &RefLengths, coverage: f64, identity: f64) -> BTreeSet<String> {
    let mut present = BTreeSet::<String>::new();
    for hit in hits {
        if present.contains(&hit.query_id) {
            continue;
        }
        match aligned_coverage(hit, lengths) {
            Some(cov) => {
                if cov >= coverage && hit.percent_identity >= identity {
                    present.insert(hit.query_id.clone());
                }
            }
            None => {
                log::debug!("hit on unknown reference {}", hit.query_id);
            }
        }
    }
    present
} // end of identify_loci

/// Searches all references against the contigs of genome.
/// The search index lives in a scratch directory under scratch_parent, removed on return
/// whatever the outcome.
pub fn profile_loci(
    genome: &NormalizedGenome,
    refs: &[SeqRecord],
    lengths: &RefLengths,
    engine: &dyn SearchEngine,
    scratch_parent: &Path,
    coverage: f64,
    identity: f64,
) -> Result<BTreeSet<String>, TypingError> {
    let scratch = ScratchDir::new(scratch_parent, &format!("{}.blastn.", genome.id))?;
    let res = engine.align(refs, &genome.contigs, SearchMode::Nucleotide, scratch.path());
    scratch.close();
    let hits = res?;
    let present = identify_loci(&hits, lengths, coverage, identity);
    log::debug!("genome {} : {} hits, {} loci present", genome.id, hits.len(), present.len());
    Ok(present)
} // end of profile_loci

// end of mod tests
