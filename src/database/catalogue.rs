//! The allele catalogue shared by all genome workers.
//!
//! Alleles are keyed by their content hash and only appended. An allele id is bound to exactly
//! one locus for its whole life : binding it to another locus is refused with
//! [TypingError::Consistency]. Registration checks and inserts under the same write lock,
//! so two genomes discovering the same novel sequence end up with one row and one id.

use std::collections::{BTreeMap, BTreeSet};

use fxhash::FxHashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::database::alleles::{AlleleTally, FrequencyTable};
use crate::errors::{TypingError, UnitFailure};
use crate::utils::files::SeqRecord;
use crate::utils::seqid::make_seqid;
use crate::utils::seqops::{normalize_seq, translate};

/// a row of the allele table
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AlleleRow {
    pub locus_id: String,
    pub allele_id: String,
    pub dna_seq: String,
    pub peptide_seq: String,
    pub count: usize,
}

/// outcome of a registration
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Registration {
    /// a new row was appended
    New(String),
    /// the sequence was already in the catalogue under the same locus
    Existing(String),
}

impl Registration {
    pub fn get_allele_id(&self) -> &str {
        match self {
            Registration::New(id) | Registration::Existing(id) => id,
        }
    }
}

#[derive(Default)]
struct CatalogueInner {
    alleles: FxHashMap<String, AlleleRow>,
    by_locus: BTreeMap<String, BTreeSet<String>>,
    /// ids appended since load, in registration order
    registered: Vec<String>,
}

impl CatalogueInner {
    fn insert(&mut self, row: AlleleRow) -> Result<bool, TypingError> {
        if let Some(existing) = self.alleles.get(&row.allele_id) {
            if existing.locus_id != row.locus_id {
                return Err(TypingError::Consistency {
                    allele_id: row.allele_id,
                    bound: existing.locus_id.clone(),
                    requested: row.locus_id,
                });
            }
            return Ok(false);
        }
        self.by_locus
            .entry(row.locus_id.clone())
            .or_default()
            .insert(row.allele_id.clone());
        self.alleles.insert(row.allele_id.clone(), row);
        Ok(true)
    } // end of insert
} // end of impl CatalogueInner

/// Append only allele store.
#[derive(Default)]
pub struct Catalogue {
    inner: RwLock<CatalogueInner>,
}

impl Catalogue {
    pub fn new() -> Self {
        Catalogue::default()
    }

    /// Builds the catalogue of a construction population.
    /// A sequence found under several loci stays bound to the first locus in id order,
    /// each other binding is returned as a failure of its locus.
    pub fn from_frequencies(frequencies: &FrequencyTable) -> (Self, Vec<UnitFailure>) {
        let catalogue = Catalogue::new();
        let mut failures = Vec::<UnitFailure>::new();
        for (locus, counter) in frequencies.sorted_loci() {
            for (allele_id, tally) in counter.sorted() {
                let row = AlleleRow {
                    locus_id: locus.clone(),
                    allele_id: allele_id.clone(),
                    dna_seq: tally.seq.clone(),
                    peptide_seq: translate(&tally.seq),
                    count: tally.count,
                };
                if let Err(e) = catalogue.insert_row(row) {
                    log::error!("locus {} : {}", locus, e);
                    failures.push(UnitFailure::new(locus, &e));
                }
            }
        }
        log::info!(
            "catalogue built, nb alleles : {}, nb rejected bindings : {}",
            catalogue.nb_alleles(),
            failures.len()
        );
        (catalogue, failures)
    } // end of from_frequencies

    /// insert a row as is (reload), an already present row is ignored,
    /// a row binding a known allele to another locus is an error
    pub fn insert_row(&self, row: AlleleRow) -> Result<bool, TypingError> {
        self.inner.write().insert(row)
    }

    /// register a sequence as an allele of locus_id.
    /// The check for an existing id and the insertion are done under one write lock.
    pub fn register(&self, locus_id: &str, dna_seq: &str) -> Result<Registration, TypingError> {
        let dna_seq = normalize_seq(dna_seq.as_bytes());
        let allele_id = make_seqid(dna_seq.as_bytes());
        let row = AlleleRow {
            locus_id: locus_id.to_string(),
            allele_id: allele_id.clone(),
            peptide_seq: translate(&dna_seq),
            dna_seq,
            count: 1,
        };
        let mut inner = self.inner.write();
        if inner.insert(row)? {
            inner.registered.push(allele_id.clone());
            log::debug!("registered novel allele {} for locus {}", allele_id, locus_id);
            Ok(Registration::New(allele_id))
        } else {
            Ok(Registration::Existing(allele_id))
        }
    } // end of register

    /// locus of an allele id
    pub fn get_locus(&self, allele_id: &str) -> Option<String> {
        self.inner.read().alleles.get(allele_id).map(|row| row.locus_id.clone())
    }

    pub fn get_row(&self, allele_id: &str) -> Option<AlleleRow> {
        self.inner.read().alleles.get(allele_id).cloned()
    }

    /// alleles of a locus as fasta records (id = allele id), sorted by allele id
    pub fn locus_alleles(&self, locus_id: &str) -> Vec<SeqRecord> {
        let inner = self.inner.read();
        match inner.by_locus.get(locus_id) {
            Some(ids) => ids
                .iter()
                .filter_map(|id| inner.alleles.get(id))
                .map(|row| SeqRecord::new(&row.allele_id, &row.dna_seq))
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn loci(&self) -> Vec<String> {
        self.inner.read().by_locus.keys().cloned().collect()
    }

    pub fn nb_alleles(&self) -> usize {
        self.inner.read().alleles.len()
    }

    /// allele ids registered since creation or reload
    pub fn get_registered(&self) -> Vec<String> {
        self.inner.read().registered.clone()
    }

    /// loci touched by registrations
    pub fn get_registered_loci(&self) -> BTreeSet<String> {
        let inner = self.inner.read();
        inner
            .registered
            .iter()
            .filter_map(|id| inner.alleles.get(id))
            .map(|row| row.locus_id.clone())
            .collect()
    }

    /// all rows sorted by locus then allele id
    pub fn sorted_rows(&self) -> Vec<AlleleRow> {
        let inner = self.inner.read();
        inner
            .by_locus
            .values()
            .flat_map(|ids| ids.iter())
            .filter_map(|id| inner.alleles.get(id))
            .cloned()
            .collect()
    }

    /// frequency table recomputed from the rows
    pub fn frequencies(&self) -> FrequencyTable {
        let mut table = FrequencyTable::new();
        for (rank, row) in self.sorted_rows().into_iter().enumerate() {
            table.insert(
                &row.locus_id,
                &row.allele_id,
                AlleleTally {
                    count: row.count,
                    first_seen: (rank, 0),
                    seq: row.dna_seq,
                },
            );
        }
        table
    } // end of frequencies
} // end of impl Catalogue

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn log_init_test() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    #[test]
    fn register_is_idempotent() {
        log_init_test();
        let catalogue = Catalogue::new();
        let first = catalogue.register("L1", "atgaaataa").unwrap();
        let second = catalogue.register("L1", "ATGAAATAA").unwrap();
        assert!(matches!(first, Registration::New(_)));
        assert_eq!(second, Registration::Existing(first.get_allele_id().to_string()));
        assert_eq!(catalogue.nb_alleles(), 1);
        let row = catalogue.get_row(first.get_allele_id()).unwrap();
        assert_eq!(row.count, 1);
        assert_eq!(row.peptide_seq, "MK*");
        assert_eq!(catalogue.get_registered().len(), 1);
    }

    #[test]
    fn rebinding_is_refused() {
        let catalogue = Catalogue::new();
        let reg = catalogue.register("L1", "ATGAAATAA").unwrap();
        let res = catalogue.register("L2", "ATGAAATAA");
        assert!(matches!(res, Err(TypingError::Consistency { .. })));
        assert_eq!(catalogue.get_locus(reg.get_allele_id()).unwrap(), "L1");
        assert!(catalogue.locus_alleles("L2").is_empty());
    }

    #[test]
    fn concurrent_registration_gives_one_row() {
        log_init_test();
        let catalogue = Arc::new(Catalogue::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let catalogue = Arc::clone(&catalogue);
                std::thread::spawn(move || catalogue.register("L1", "ATGCCCGGGTAA").unwrap())
            })
            .collect();
        let results: Vec<Registration> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let nb_new = results.iter().filter(|r| matches!(r, Registration::New(_))).count();
        assert_eq!(nb_new, 1);
        let ids: BTreeSet<&str> = results.iter().map(|r| r.get_allele_id()).collect();
        assert_eq!(ids.len(), 1);
        assert_eq!(catalogue.nb_alleles(), 1);
    }

    #[test]
    fn from_frequencies_rows_sorted() {
        let mut freq = FrequencyTable::new();
        freq.observe("L2", &make_seqid(b"GGG"), "GGG", (0, 0));
        freq.observe("L1", &make_seqid(b"ATG"), "ATG", (0, 0));
        freq.observe("L1", &make_seqid(b"ATG"), "ATG", (1, 0));
        let (catalogue, failures) = Catalogue::from_frequencies(&freq);
        assert!(failures.is_empty());
        let rows = catalogue.sorted_rows();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].locus_id, "L1");
        assert_eq!(rows[0].count, 2);
        assert_eq!(rows[0].peptide_seq, "M");
        assert!(catalogue.get_registered().is_empty());
        assert_eq!(catalogue.frequencies().get("L1").unwrap().len(), 1);
    }

    #[test]
    fn shared_sequence_fails_second_locus_only() {
        log_init_test();
        let shared = make_seqid(b"ATGAAACCCTAA");
        let mut freq = FrequencyTable::new();
        freq.observe("L2", &shared, "ATGAAACCCTAA", (0, 1));
        freq.observe("L1", &shared, "ATGAAACCCTAA", (0, 0));
        freq.observe("L2", &make_seqid(b"ATGGGGTAA"), "ATGGGGTAA", (1, 0));
        let (catalogue, failures) = Catalogue::from_frequencies(&freq);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].unit, "L2");
        assert_eq!(failures[0].kind, "consistency");
        assert_eq!(catalogue.get_locus(&shared).unwrap(), "L1");
        assert_eq!(catalogue.locus_alleles("L2").len(), 1);
        assert_eq!(catalogue.nb_alleles(), 2);
    }
} // end of mod tests
