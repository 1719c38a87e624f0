//! Local alignment search capability.
//!
//! Profiling only needs scored pairwise hits between a query set and a reference set,
//! nucleotide against nucleotide (locus presence) or protein against protein (novel alleles).
//! [SearchEngine] is that capability, [BlastSearch] implements it by running BLAST+ programs
//! (makeblastdb, blastn, blastp) in a scratch directory and parsing their tabular output.

use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use crate::errors::SearchError;
use crate::utils::files::{write_fasta, SeqRecord};

/// fields asked to blast, in this order
pub const BLAST_COLUMNS: &str = "qseqid sseqid pident length mismatch gapopen qstart qend sstart send evalue bitscore";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SearchMode {
    Nucleotide,
    Protein,
}

/// a pairwise hit
#[derive(Clone, Debug, PartialEq)]
pub struct Hit {
    pub query_id: String,
    /// id of the matched sequence in the reference set
    pub ref_id: String,
    /// in [0, 100]
    pub percent_identity: f64,
    pub aligned_length: usize,
    pub gap_opens: usize,
}

/// Aligns a query set against a reference set.
/// scratch is a directory private to the caller where index and output files can be written,
/// it is removed by the caller.
pub trait SearchEngine: Send + Sync {
    fn align(
        &self,
        queries: &[SeqRecord],
        references: &[SeqRecord],
        mode: SearchMode,
        scratch: &Path,
    ) -> Result<Vec<Hit>, SearchError>;
}

/// parses blast -outfmt 6 output with columns starting as in [BLAST_COLUMNS]
pub fn parse_tabular<R: BufRead>(reader: R) -> Result<Vec<Hit>, SearchError> {
    let mut hits = Vec::<Hit>::new();
    for (num, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| SearchError::Failed(format!("cannot read search output : {}", e)))?;
        if line.trim().is_empty() || line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 6 {
            return Err(SearchError::Failed(format!("line {} has {} fields", num + 1, fields.len())));
        }
        let bad_field = |name: &str| SearchError::Failed(format!("line {} : bad {} field", num + 1, name));
        hits.push(Hit {
            query_id: fields[0].to_string(),
            ref_id: fields[1].to_string(),
            percent_identity: fields[2].trim().parse::<f64>().map_err(|_| bad_field("pident"))?,
            aligned_length: fields[3].trim().parse::<usize>().map_err(|_| bad_field("length"))?,
            gap_opens: fields[5].trim().parse::<usize>().map_err(|_| bad_field("gapopen"))?,
        });
    }
    Ok(hits)
} // end of parse_tabular

/// BLAST+ backend
#[derive(Clone, Debug, Default)]
pub struct BlastSearch {
    /// directory of blast binaries, PATH lookup if None
    bin_dir: Option<PathBuf>,
}

impl BlastSearch {
    pub fn new(bin_dir: Option<PathBuf>) -> Self {
        BlastSearch { bin_dir }
    }

    fn program(&self, name: &str) -> PathBuf {
        match &self.bin_dir {
            Some(dir) => dir.join(name),
            None => PathBuf::from(name),
        }
    }

    // runs a command, a launch failure means the backend is unreachable
    fn run(&self, name: &str, cmd: &mut Command) -> Result<Output, SearchError> {
        log::trace!("running {:?}", cmd);
        let output = cmd.stdin(Stdio::null()).output().map_err(|e| SearchError::Unreachable {
            program: self.program(name).display().to_string(),
            source: e,
        })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            log::debug!("{} failed, status {} : {}", name, output.status, stderr.trim());
            return Err(SearchError::Failed(format!("{} exited with {} : {}", name, output.status, stderr.trim())));
        }
        Ok(output)
    } // end of run

    /// checks that the programs can be launched, so that a missing installation stops a run early
    pub fn check(&self) -> Result<(), SearchError> {
        for name in ["makeblastdb", "blastn", "blastp"] {
            let output = self.run(name, Command::new(self.program(name)).arg("-version"))?;
            let version = String::from_utf8_lossy(&output.stdout);
            log::info!("{}", version.lines().next().unwrap_or(name));
        }
        Ok(())
    }
} // end of impl BlastSearch

impl SearchEngine for BlastSearch {
    fn align(
        &self,
        queries: &[SeqRecord],
        references: &[SeqRecord],
        mode: SearchMode,
        scratch: &Path,
    ) -> Result<Vec<Hit>, SearchError> {
        if queries.is_empty() || references.is_empty() {
            return Ok(Vec::new());
        }
        let (dbtype, search) = match mode {
            SearchMode::Nucleotide => ("nucl", "blastn"),
            SearchMode::Protein => ("prot", "blastp"),
        };
        let query_file = scratch.join("queries.fa");
        let ref_file = scratch.join("references.fa");
        let db_prefix = scratch.join("refdb");
        let out_file = scratch.join("hits.tsv");
        write_fasta(&query_file, queries).map_err(|e| SearchError::Failed(e.to_string()))?;
        write_fasta(&ref_file, references).map_err(|e| SearchError::Failed(e.to_string()))?;
        //
        self.run(
            "makeblastdb",
            Command::new(self.program("makeblastdb"))
                .arg("-in")
                .arg(&ref_file)
                .args(["-dbtype", dbtype])
                .arg("-out")
                .arg(&db_prefix),
        )?;
        self.run(
            search,
            Command::new(self.program(search))
                .arg("-query")
                .arg(&query_file)
                .arg("-db")
                .arg(&db_prefix)
                .arg("-outfmt")
                .arg(format!("6 {}", BLAST_COLUMNS))
                .args(["-num_threads", "1"])
                .arg("-out")
                .arg(&out_file),
        )?;
        //
        let file = std::fs::File::open(&out_file)
            .map_err(|e| SearchError::Failed(format!("no output {:?} : {}", out_file, e)))?;
        let hits = parse_tabular(BufReader::new(file))?;
        log::debug!("{} : {} queries, {} references, {} hits", search, queries.len(), references.len(), hits.len());
        Ok(hits)
    } // end of align
} // end of impl SearchEngine for BlastSearch

// end of mod tests
