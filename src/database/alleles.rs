//! Allele collection over the construction population.
//!
//! Each gene call of the matrix is resolved to its nucleotide sequence in the gene file of its
//! genome, hashed to an allele id and counted in the frequency table of its locus.
//! Genomes are processed in parallel, each one filling its own [FrequencyTable], the tables are
//! then merged. Merging sums counts and keeps the earliest discovery rank of each allele so the
//! result does not depend on the order in which genome tables are merged.

use std::collections::BTreeMap;
use std::path::Path;

use fxhash::FxHashMap;
use rayon::prelude::*;

use crate::database::matrix::PanMatrix;
use crate::errors::{TypingError, UnitFailure};
use crate::profiling::profile::{AlleleCell, ProfileMatrix};
use crate::utils::files::{find_fasta_by_stem, read_fasta};
use crate::utils::seqid::make_seqid;

/// discovery rank of an allele : (genome column, position in the cell)
pub type SeenRank = (usize, usize);

/// observations of one allele
#[derive(Clone, Debug, PartialEq)]
pub struct AlleleTally {
    pub count: usize,
    pub first_seen: SeenRank,
    pub seq: String,
}

/// allele id -> tally, for one locus
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LocusCounter {
    alleles: FxHashMap<String, AlleleTally>,
}

impl LocusCounter {
    pub fn new() -> Self {
        LocusCounter::default()
    }

    /// count one observation of seq (whose id is allele_id)
    pub fn observe(&mut self, allele_id: &str, seq: &str, seen: SeenRank) {
        match self.alleles.get_mut(allele_id) {
            Some(tally) => {
                tally.count += 1;
                tally.first_seen = tally.first_seen.min(seen);
            }
            None => {
                self.alleles.insert(
                    allele_id.to_string(),
                    AlleleTally {
                        count: 1,
                        first_seen: seen,
                        seq: seq.to_string(),
                    },
                );
            }
        }
    } // end of observe

    /// insert a tally with a given count, used when reloading a catalogue
    pub fn insert(&mut self, allele_id: &str, tally: AlleleTally) {
        self.alleles.insert(allele_id.to_string(), tally);
    }

    pub fn merge(mut self, other: LocusCounter) -> Self {
        for (allele_id, tally) in other.alleles {
            match self.alleles.get_mut(&allele_id) {
                Some(mine) => {
                    mine.count += tally.count;
                    mine.first_seen = mine.first_seen.min(tally.first_seen);
                }
                None => {
                    self.alleles.insert(allele_id, tally);
                }
            }
        }
        self
    } // end of merge

    pub fn get(&self, allele_id: &str) -> Option<&AlleleTally> {
        self.alleles.get(allele_id)
    }

    pub fn len(&self) -> usize {
        self.alleles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alleles.is_empty()
    }

    /// alleles sorted by id
    pub fn sorted(&self) -> Vec<(&String, &AlleleTally)> {
        let mut alleles: Vec<(&String, &AlleleTally)> = self.alleles.iter().collect();
        alleles.sort_by(|a, b| a.0.cmp(b.0));
        alleles
    }

    /// most frequent allele, ties broken by first discovery
    pub fn most_common(&self) -> Option<(&String, &AlleleTally)> {
        self.alleles.iter().min_by(|a, b| {
            b.1.count
                .cmp(&a.1.count)
                .then_with(|| a.1.first_seen.cmp(&b.1.first_seen))
                .then_with(|| a.0.cmp(b.0))
        })
    }
} // end of impl LocusCounter

/// locus id -> allele counter
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrequencyTable {
    loci: FxHashMap<String, LocusCounter>,
}

impl FrequencyTable {
    pub fn new() -> Self {
        FrequencyTable::default()
    }

    pub fn observe(&mut self, locus_id: &str, allele_id: &str, seq: &str, seen: SeenRank) {
        self.loci
            .entry(locus_id.to_string())
            .or_default()
            .observe(allele_id, seq, seen);
    }

    pub fn insert(&mut self, locus_id: &str, allele_id: &str, tally: AlleleTally) {
        self.loci.entry(locus_id.to_string()).or_default().insert(allele_id, tally);
    }

    /// associative and commutative combination of two tables
    pub fn merge(mut self, other: FrequencyTable) -> Self {
        for (locus, counter) in other.loci {
            let merged = match self.loci.remove(&locus) {
                Some(mine) => mine.merge(counter),
                None => counter,
            };
            self.loci.insert(locus, merged);
        }
        self
    } // end of merge

    pub fn get(&self, locus_id: &str) -> Option<&LocusCounter> {
        self.loci.get(locus_id)
    }

    pub fn nb_loci(&self) -> usize {
        self.loci.len()
    }

    pub fn nb_alleles(&self) -> usize {
        self.loci.values().map(|c| c.len()).sum()
    }

    /// loci sorted by id
    pub fn sorted_loci(&self) -> Vec<(&String, &LocusCounter)> {
        let mut loci: Vec<(&String, &LocusCounter)> = self.loci.iter().collect();
        loci.sort_by(|a, b| a.0.cmp(b.0));
        loci
    }

    /// nested locus -> allele id -> count map, keys sorted
    pub fn to_count_map(&self) -> BTreeMap<String, BTreeMap<String, usize>> {
        self.loci
            .iter()
            .map(|(locus, counter)| {
                let counts = counter.alleles.iter().map(|(id, t)| (id.clone(), t.count)).collect();
                (locus.clone(), counts)
            })
            .collect()
    }
} // end of impl FrequencyTable

/// result of allele collection
pub struct CollectedAlleles {
    /// genome x locus allele ids
    pub profiles: ProfileMatrix,
    pub frequencies: FrequencyTable,
    /// unresolved gene calls and unreadable gene files
    pub failures: Vec<UnitFailure>,
}

// what a genome worker produces
struct GenomeAlleles {
    genome: String,
    column: BTreeMap<String, AlleleCell>,
    table: FrequencyTable,
    failures: Vec<UnitFailure>,
}

// collect alleles of genome column g
fn collect_genome(matrix: &PanMatrix, g: usize, genes_dir: &Path) -> GenomeAlleles {
    let genome = matrix.genomes[g].clone();
    let mut collected = GenomeAlleles {
        genome: genome.clone(),
        column: BTreeMap::new(),
        table: FrequencyTable::new(),
        failures: Vec::new(),
    };
    //
    let records = match find_fasta_by_stem(genes_dir, &genome) {
        Some(path) => read_fasta(&path),
        None => Err(TypingError::input(genes_dir.join(&genome), "no gene sequence file for genome")),
    };
    let seqs: FxHashMap<String, String> = match records {
        Ok(records) => records.into_iter().map(|r| (r.id, r.seq)).collect(),
        Err(e) => {
            log::error!("genome {} skipped : {}", genome, e);
            collected.failures.push(UnitFailure::new(&genome, &e));
            return collected;
        }
    };
    //
    for calls in matrix.calls.iter() {
        let cell = &calls.cells[g];
        if cell.is_empty() {
            continue;
        }
        let mut ids = Vec::<String>::with_capacity(cell.len());
        for (pos, gene_call) in cell.iter().enumerate() {
            match seqs.get(gene_call) {
                Some(seq) => {
                    let allele_id = make_seqid(seq.as_bytes());
                    collected.table.observe(&calls.locus_id, &allele_id, seq, (g, pos));
                    ids.push(allele_id);
                }
                None => {
                    let unit = format!("{}:{}", genome, calls.locus_id);
                    let e = TypingError::input(genes_dir, format!("gene call {} not found", gene_call));
                    log::warn!("{} : {}", unit, e);
                    collected.failures.push(UnitFailure::new(&unit, &e));
                }
            }
        }
        if ids.len() > 1 {
            log::debug!("genome {} has {} copies of locus {}", genome, ids.len(), calls.locus_id);
        }
        if let Some(cell) = AlleleCell::from_ids(ids) {
            collected.column.insert(calls.locus_id.clone(), cell);
        }
    }
    log::trace!("genome {} nb loci collected : {}", genome, collected.column.len());
    collected
} // end of collect_genome

/// resolve all gene calls of the matrix, in parallel over genomes.
/// Must be called inside the rayon pool the caller wants to use.
pub fn collect_allele_infos(matrix: &PanMatrix, genes_dir: &Path) -> CollectedAlleles {
    log::info!("collect_allele_infos, nb genomes : {}, nb loci : {}", matrix.get_nb_genomes(), matrix.calls.len());
    let by_genome: Vec<GenomeAlleles> = (0..matrix.get_nb_genomes())
        .into_par_iter()
        .map(|g| collect_genome(matrix, g, genes_dir))
        .collect();
    //
    let mut profiles = ProfileMatrix::new();
    for meta in matrix.single_copy.iter() {
        profiles.add_locus(&meta.locus_id);
    }
    let mut failures = Vec::<UnitFailure>::new();
    let mut tables = Vec::<FrequencyTable>::with_capacity(by_genome.len());
    for collected in by_genome {
        profiles.merge_column(&collected.genome, collected.column);
        failures.extend(collected.failures);
        tables.push(collected.table);
    }
    let frequencies = tables
        .into_par_iter()
        .reduce(FrequencyTable::new, FrequencyTable::merge);
    log::info!(
        "collect_allele_infos nb alleles : {}, nb calls : {}, nb failures : {}",
        frequencies.nb_alleles(),
        profiles.nb_calls(),
        failures.len()
    );
    CollectedAlleles {
        profiles,
        frequencies,
        failures,
    }
} // end of collect_allele_infos

// end of mod tests
