//! Allele calling for the present loci of a genome.
//!
//! Three steps, each one only looking at loci left unresolved by the previous ones :
//! 1. exact match : an allele of the catalogue, or its reverse complement, is found in a contig.
//! 2. catalogue lookup : predicted genes of the genome are hashed and looked up in the catalogue.
//! 3. novel alleles : genes unknown to the catalogue are translated and searched against the
//!    reference proteins of the loci. A candidate whose best hit is unique and passes the protein
//!    identity and coverage thresholds is registered as a new allele of that locus.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use fxhash::FxHashMap;

use crate::contigs::NormalizedGenome;
use crate::database::catalogue::{Catalogue, Registration};
use crate::errors::{TypingError, UnitFailure};
use crate::profiling::search::{Hit, SearchEngine, SearchMode};
use crate::utils::files::{ScratchDir, SeqRecord};
use crate::utils::seqid::make_seqid;
use crate::utils::seqops::{reverse_complement, translate};

/// alleles called for a genome
#[derive(Clone, Debug, Default)]
pub struct GenomeAlleles {
    /// locus -> allele id
    pub calls: BTreeMap<String, String>,
    pub nb_exact: usize,
    pub nb_lookup: usize,
    /// alleles this genome added to the catalogue
    pub nb_novel: usize,
    pub failures: Vec<UnitFailure>,
}

// a protein search score, ordered by identity then alignment length
#[derive(Clone, Copy, Debug, PartialEq)]
struct Score {
    identity: f64,
    length: usize,
}

impl Score {
    fn compare(&self, other: &Score) -> Ordering {
        self.identity
            .partial_cmp(&other.identity)
            .unwrap_or(Ordering::Equal)
            .then(self.length.cmp(&other.length))
    }
}

// protein sequence used in searches, the trailing stop is not part of the alignment
fn search_protein(dna: &str) -> String {
    translate(dna).trim_end_matches('*').to_string()
}

/// first allele of the locus (alleles in id order) found in a contig, on either strand
pub fn exact_match(alleles: &[SeqRecord], contigs: &[SeqRecord]) -> Option<String> {
    for allele in alleles.iter().filter(|a| !a.is_empty()) {
        let rev = reverse_complement(&allele.seq);
        if contigs
            .iter()
            .any(|c| c.seq.contains(allele.seq.as_str()) || c.seq.contains(rev.as_str()))
        {
            return Some(allele.id.clone());
        }
    }
    None
} // end of exact_match

/// Unique best qualifying hit of each candidate.
/// candidate_lengths gives protein lengths of candidates, coverage is in % of the candidate.
fn best_hits(
    hits: &[Hit],
    candidate_lengths: &FxHashMap<String, usize>,
    protein_identity: f64,
    protein_coverage: f64,
) -> BTreeMap<String, (String, f64, usize)> {
    // candidate -> (best locus, best score, ambiguous)
    let mut best = BTreeMap::<String, (String, Score, bool)>::new();
    for hit in hits {
        let len = match candidate_lengths.get(&hit.query_id) {
            Some(&len) if len > 0 => len,
            _ => continue,
        };
        let coverage = hit.aligned_length as f64 * 100. / len as f64;
        if hit.percent_identity < protein_identity || coverage < protein_coverage {
            continue;
        }
        let score = Score {
            identity: hit.percent_identity,
            length: hit.aligned_length,
        };
        match best.get_mut(&hit.query_id) {
            None => {
                best.insert(hit.query_id.clone(), (hit.ref_id.clone(), score, false));
            }
            Some(entry) => match score.compare(&entry.1) {
                Ordering::Greater => *entry = (hit.ref_id.clone(), score, false),
                Ordering::Equal => {
                    if entry.0 != hit.ref_id {
                        entry.2 = true;
                    }
                }
                Ordering::Less => {}
            },
        }
    }
    best.into_iter()
        .filter_map(|(candidate, (locus, score, ambiguous))| {
            if ambiguous {
                log::debug!("candidate {} has equally good hits on several loci, left unresolved", candidate);
                None
            } else {
                Some((candidate, (locus, score.identity, score.length)))
            }
        })
        .collect()
} // end of best_hits

/// Calls alleles of genomes against the shared catalogue.
pub struct AlleleCaller<'a> {
    catalogue: &'a Catalogue,
    /// reference protein of each locus, id is the locus id
    ref_proteins: Vec<SeqRecord>,
    engine: &'a dyn SearchEngine,
    protein_identity: f64,
    protein_coverage: f64,
}

impl<'a> AlleleCaller<'a> {
    /// refs are the reference nucleotide sequences, id = locus id
    pub fn new(
        catalogue: &'a Catalogue,
        refs: &[SeqRecord],
        engine: &'a dyn SearchEngine,
        protein_identity: f64,
        protein_coverage: f64,
    ) -> Self {
        let ref_proteins: Vec<SeqRecord> = refs
            .iter()
            .map(|r| SeqRecord::new(&r.id, &search_protein(&r.seq)))
            .filter(|r| !r.is_empty())
            .collect();
        log::debug!("AlleleCaller nb reference proteins : {}", ref_proteins.len());
        AlleleCaller {
            catalogue,
            ref_proteins,
            engine,
            protein_identity,
            protein_coverage,
        }
    }

    /// Calls alleles for the loci of targets (present and selected loci).
    /// genes are the predicted genes of the genome if available.
    /// Only an unreachable search backend is an error, other failures are reported in the result.
    pub fn call_alleles(
        &self,
        genome: &NormalizedGenome,
        targets: &BTreeSet<String>,
        genes: Option<&[SeqRecord]>,
        scratch_parent: &Path,
    ) -> Result<GenomeAlleles, TypingError> {
        let mut result = GenomeAlleles::default();
        //
        for locus in targets.iter() {
            let alleles = self.catalogue.locus_alleles(locus);
            if let Some(allele_id) = exact_match(&alleles, &genome.contigs) {
                result.calls.insert(locus.clone(), allele_id);
                result.nb_exact += 1;
            }
        }
        let mut unresolved: BTreeSet<String> = targets
            .iter()
            .filter(|l| !result.calls.contains_key(*l))
            .cloned()
            .collect();
        log::trace!("genome {} exact matches : {}, unresolved : {}", genome.id, result.nb_exact, unresolved.len());
        let genes = match genes {
            Some(genes) if !unresolved.is_empty() => genes,
            _ => return Ok(result),
        };
        //
        // catalogue lookup, unknown genes become novel allele candidates
        let mut candidates = BTreeMap::<String, &SeqRecord>::new();
        for gene in genes.iter().filter(|g| !g.is_empty()) {
            let allele_id = make_seqid(gene.seq.as_bytes());
            match self.catalogue.get_locus(&allele_id) {
                Some(locus) => {
                    if unresolved.remove(&locus) {
                        result.calls.insert(locus, allele_id);
                        result.nb_lookup += 1;
                    }
                }
                None => {
                    candidates.entry(allele_id).or_insert(gene);
                }
            }
        }
        if candidates.is_empty() || unresolved.is_empty() {
            return Ok(result);
        }
        //
        self.register_novel(genome, &candidates, &unresolved, scratch_parent, &mut result)?;
        log::debug!(
            "genome {} alleles, exact : {}, lookup : {}, novel : {}",
            genome.id,
            result.nb_exact,
            result.nb_lookup,
            result.nb_novel
        );
        Ok(result)
    } // end of call_alleles

    // protein search of candidates and registration of the winners
    fn register_novel(
        &self,
        genome: &NormalizedGenome,
        candidates: &BTreeMap<String, &SeqRecord>,
        unresolved: &BTreeSet<String>,
        scratch_parent: &Path,
        result: &mut GenomeAlleles,
    ) -> Result<(), TypingError> {
        let queries: Vec<SeqRecord> = candidates
            .iter()
            .map(|(id, gene)| SeqRecord::new(id, &search_protein(&gene.seq)))
            .filter(|r| !r.is_empty())
            .collect();
        let lengths: FxHashMap<String, usize> = queries.iter().map(|q| (q.id.clone(), q.len())).collect();
        //
        let scratch = ScratchDir::new(scratch_parent, &format!("{}.blastp.", genome.id))?;
        let res = self
            .engine
            .align(&queries, &self.ref_proteins, SearchMode::Protein, scratch.path());
        scratch.close();
        let hits = match res {
            Ok(hits) => hits,
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(e) => {
                log::warn!("genome {} novel allele search failed : {}", genome.id, e);
                result.failures.push(UnitFailure::new(&genome.id, &TypingError::from(e)));
                return Ok(());
            }
        };
        //
        // locus -> best candidates, winner is the best score then the smallest allele id
        let mut by_locus = BTreeMap::<String, (String, Score)>::new();
        for (candidate, (locus, identity, length)) in best_hits(&hits, &lengths, self.protein_identity, self.protein_coverage) {
            if !unresolved.contains(&locus) {
                continue;
            }
            let score = Score { identity, length };
            match by_locus.get_mut(&locus) {
                None => {
                    by_locus.insert(locus, (candidate, score));
                }
                Some(entry) => {
                    let better = match score.compare(&entry.1) {
                        Ordering::Greater => true,
                        Ordering::Equal => candidate < entry.0,
                        Ordering::Less => false,
                    };
                    if better {
                        *entry = (candidate, score);
                    }
                }
            }
        }
        //
        for (locus, (candidate, _)) in by_locus {
            let gene = match candidates.get(&candidate) {
                Some(gene) => gene,
                None => continue,
            };
            match self.catalogue.register(&locus, &gene.seq) {
                Ok(registration) => {
                    if let Registration::New(_) = registration {
                        result.nb_novel += 1;
                    } else {
                        result.nb_lookup += 1;
                    }
                    result.calls.insert(locus, registration.get_allele_id().to_string());
                }
                Err(e) => {
                    log::error!("genome {} locus {} : {}", genome.id, locus, e);
                    result.failures.push(UnitFailure::new(&format!("{}:{}", genome.id, locus), &e));
                }
            }
        }
        Ok(())
    } // end of register_novel
} // end of impl AlleleCaller

// end of mod tests
