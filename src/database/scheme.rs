//! Reference allele selection and typing scheme.
//!
//! The reference allele of a locus is its most frequent allele, ties going to the allele
//! discovered first. The scheme keeps the loci present in at least a threshold percentage
//! of the population, with their occurrence and reference allele.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::database::alleles::FrequencyTable;
use crate::database::matrix::LocusMeta;
use crate::utils::files::SeqRecord;

/// Occurrence (in %) of a locus present in num_isolates genomes among total, rounded to 2 decimals.
/// Rounding is done on the exact decimal value of the percentage, ties to even,
/// so 0.125 gives 0.12 and 0.375 gives 0.38.
pub fn occurrence(num_isolates: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.;
    }
    let pct = num_isolates as f64 / total as f64 * 100.;
    format!("{:.2}", pct).parse::<f64>().unwrap_or(pct)
} // end of occurrence

/// reference allele of a locus
#[derive(Clone, Debug, PartialEq)]
pub struct RefAllele {
    pub allele_id: String,
    pub seq: String,
}

/// locus -> reference allele for every locus having at least one allele
pub fn select_references(frequencies: &FrequencyTable) -> BTreeMap<String, RefAllele> {
    let refs: BTreeMap<String, RefAllele> = frequencies
        .sorted_loci()
        .into_iter()
        .filter_map(|(locus, counter)| {
            counter.most_common().map(|(id, tally)| {
                (
                    locus.clone(),
                    RefAllele {
                        allele_id: id.clone(),
                        seq: tally.seq.clone(),
                    },
                )
            })
        })
        .collect();
    log::debug!("select_references nb loci : {}", refs.len());
    refs
} // end of select_references

/// reference sequences as fasta records (id = locus id), in locus order
pub fn reference_records(refs: &BTreeMap<String, RefAllele>) -> Vec<SeqRecord> {
    refs.iter()
        .map(|(locus, r)| SeqRecord::new(locus, &r.seq))
        .collect()
}

/// a row of the scheme
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SchemeEntry {
    pub locus_id: String,
    pub occurrence: f64,
    pub ref_allele: String,
}

/// scheme loci, sorted by locus id
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Scheme {
    entries: Vec<SchemeEntry>,
}

impl Scheme {
    pub fn new(mut entries: Vec<SchemeEntry>) -> Self {
        entries.sort_by(|a, b| a.locus_id.cmp(&b.locus_id));
        Scheme { entries }
    }

    /// loci of metadata whose occurrence in a population of total genomes is >= threshold.
    /// Loci without reference allele cannot be typed and are left out.
    pub fn build(
        metadata: &[LocusMeta],
        refs: &BTreeMap<String, RefAllele>,
        total: usize,
        threshold: f64,
    ) -> Self {
        let mut nb_no_ref = 0;
        let entries: Vec<SchemeEntry> = metadata
            .iter()
            .filter_map(|meta| {
                let occ = occurrence(meta.num_isolates, total);
                if occ < threshold {
                    return None;
                }
                match refs.get(&meta.locus_id) {
                    Some(r) => Some(SchemeEntry {
                        locus_id: meta.locus_id.clone(),
                        occurrence: occ,
                        ref_allele: r.allele_id.clone(),
                    }),
                    None => {
                        nb_no_ref += 1;
                        None
                    }
                }
            })
            .collect();
        if nb_no_ref > 0 {
            log::warn!("{} loci above occurrence threshold have no allele, left out of scheme", nb_no_ref);
        }
        log::info!("scheme threshold {:.2}%, nb loci : {} / {}", threshold, entries.len(), metadata.len());
        Scheme::new(entries)
    } // end of build

    pub fn get_entries(&self) -> &[SchemeEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// loci with occurrence >= level
    pub fn loci_above(&self, level: f64) -> Vec<String> {
        self.entries
            .iter()
            .filter(|e| e.occurrence >= level)
            .map(|e| e.locus_id.clone())
            .collect()
    }
} // end of impl Scheme

// end of mod tests
