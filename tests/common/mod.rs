//! fixtures shared by integration tests : a small population with its pan-genome matrix and
//! gene files, and an ungapped search engine standing in for BLAST.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use wgmlst::errors::SearchError;
use wgmlst::profiling::search::{Hit, SearchEngine, SearchMode};
use wgmlst::utils::files::SeqRecord;
use wgmlst::utils::seqops::reverse_complement;

pub fn log_init_test() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// codons without stop and without TGG, so that mutating to TGG always changes the protein
const CODONS: [&str; 19] = [
    "GCT", "CGT", "AAC", "GAT", "TGC", "CAA", "GAA", "GGT", "CAT", "ATT", "CTG", "AAA", "ATG", "TTC", "CCG", "TCT",
    "ACC", "TAC", "GTG",
];

struct Lcg(u64);

impl Lcg {
    fn next(&mut self, modulo: usize) -> usize {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        ((self.0 >> 33) % modulo as u64) as usize
    }
}

/// an open reading frame of nb_codons codons after ATG, ending with TAA
pub fn orf(seed: u64, nb_codons: usize) -> String {
    let mut rng = Lcg(seed);
    let mut seq = String::from("ATG");
    for _ in 1..nb_codons {
        seq.push_str(CODONS[rng.next(CODONS.len())]);
    }
    seq.push_str("TAA");
    seq
}

/// random dna
pub fn flank(seed: u64, len: usize) -> String {
    let mut rng = Lcg(seed);
    (0..len).map(|_| ['A', 'C', 'G', 'T'][rng.next(4)]).collect()
}

/// codon k changed to TGG
pub fn mutate(seq: &str, k: usize) -> String {
    let mut mutated = seq.to_string();
    mutated.replace_range(3 * k..3 * k + 3, "TGG");
    mutated
}

/// Sequences of the test population.
/// L1 : s1 in G1 and G3, s2 in G2. L2 : s3 in G1 and G3. P1 is paralogous.
pub struct Population {
    pub matrix: PathBuf,
    pub genes: PathBuf,
    pub s1: String,
    pub s2: String,
    pub s3: String,
}

pub fn write_population(dir: &Path) -> Population {
    let s1 = orf(1, 40);
    let s2 = mutate(&s1, 10);
    let s3 = orf(2, 40);
    let paralog = orf(3, 30);
    //
    let matrix = dir.join("gene_presence_absence.csv");
    let text = "\"Gene\",\"Annotation\",\"No. isolates\",\"No. sequences\",\"G1\",\"G2\",\"G3\"\n\
                \"L1\",\"first locus\",\"3\",\"3\",\"G1_00001\",\"G2_00001\",\"G3_00001\"\n\
                \"L2\",\"second locus\",\"2\",\"2\",\"G1_00002\",\"\",\"G3_00002\"\n\
                \"P1\",\"paralog\",\"2\",\"3\",\"G1_00003\tG1_00004\",\"G2_00003\",\"\"\n";
    fs::write(&matrix, text).unwrap();
    //
    let genes = dir.join("genes");
    fs::create_dir_all(&genes).unwrap();
    let g1 = format!(">G1_00001 L1\n{}\n>G1_00002\n{}\n>G1_00003\n{}\n>G1_00004\n{}\n", s1, s3, paralog, paralog);
    let g2 = format!(">G2_00001\n{}\n>G2_00003\n{}\n", s2, paralog);
    let g3 = format!(">G3_00001\n{}\n>G3_00002\n{}\n", s1, s3);
    fs::write(genes.join("G1.ffn"), g1).unwrap();
    fs::write(genes.join("G2.ffn"), g2).unwrap();
    fs::write(genes.join("G3.ffn"), g3).unwrap();
    //
    Population {
        matrix,
        genes,
        s1,
        s2,
        s3,
    }
} // end of write_population

// identity (%) of the best ungapped placement of query inside subject
fn best_ungapped(query: &[u8], subject: &[u8]) -> Option<f64> {
    if query.is_empty() || subject.len() < query.len() {
        return None;
    }
    let best = (0..=subject.len() - query.len())
        .map(|offset| query.iter().zip(&subject[offset..]).filter(|(a, b)| a == b).count())
        .max()?;
    Some(best as f64 * 100. / query.len() as f64)
}

/// Ungapped search : nucleotide queries are placed at their best offset on both strands of
/// each reference, proteins are compared from their first residue.
#[derive(Default)]
pub struct UngappedSearch {
    pub nb_calls: AtomicUsize,
}

impl SearchEngine for UngappedSearch {
    fn align(
        &self,
        queries: &[SeqRecord],
        references: &[SeqRecord],
        mode: SearchMode,
        scratch: &Path,
    ) -> Result<Vec<Hit>, SearchError> {
        self.nb_calls.fetch_add(1, Ordering::SeqCst);
        assert!(scratch.is_dir());
        let mut hits = Vec::new();
        for q in queries {
            for r in references {
                let (identity, length) = match mode {
                    SearchMode::Nucleotide => {
                        let forward = best_ungapped(q.seq.as_bytes(), r.seq.as_bytes());
                        let rev = reverse_complement(&q.seq);
                        let backward = best_ungapped(rev.as_bytes(), r.seq.as_bytes());
                        match forward.into_iter().chain(backward).reduce(f64::max) {
                            Some(identity) => (identity, q.len()),
                            None => continue,
                        }
                    }
                    SearchMode::Protein => {
                        let length = q.len().min(r.len());
                        if length == 0 {
                            continue;
                        }
                        let matches = q.seq.bytes().zip(r.seq.bytes()).filter(|(a, b)| a == b).count();
                        (matches as f64 * 100. / length as f64, length)
                    }
                };
                if identity >= 30. {
                    hits.push(Hit {
                        query_id: q.id.clone(),
                        ref_id: r.id.clone(),
                        percent_identity: identity,
                        aligned_length: length,
                        gap_opens: 0,
                    });
                }
            }
        }
        Ok(hits)
    } // end of align
} // end of impl SearchEngine for UngappedSearch

/// a backend that cannot be launched
pub struct UnreachableSearch;

impl SearchEngine for UnreachableSearch {
    fn align(&self, _: &[SeqRecord], _: &[SeqRecord], _: SearchMode, scratch: &Path) -> Result<Vec<Hit>, SearchError> {
        fs::write(scratch.join("queries.fa"), ">q\nACGT\n").unwrap();
        Err(SearchError::Unreachable {
            program: "blastn".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
        })
    }
}

/// a backend that runs but leaves unusable output
pub struct FailingSearch;

impl SearchEngine for FailingSearch {
    fn align(&self, _: &[SeqRecord], _: &[SeqRecord], _: SearchMode, scratch: &Path) -> Result<Vec<Hit>, SearchError> {
        fs::write(scratch.join("hits.tsv"), "truncated").unwrap();
        Err(SearchError::Failed("blastn exited with exit status: 2".to_string()))
    }
}

/// scratch directories (tmp.*, *.blastn.*, *.blastp.*) found anywhere under dir
pub fn scratch_leftovers(dir: &Path) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let mut to_visit = vec![dir.to_path_buf()];
    while let Some(current) = to_visit.pop() {
        for entry in fs::read_dir(&current).unwrap().filter_map(|e| e.ok()) {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with("tmp.") || name.contains(".blastn.") || name.contains(".blastp.") {
                found.push(path.clone());
            }
            to_visit.push(path);
        }
    }
    found
}
