//! Renaming of genomes and contigs to synthetic identifiers.
//!
//! Genome files of a directory are enumerated in file name order, the i-th file (from 1)
//! becomes `Genome_i.fa` and its j-th record `Genome_i::Contig_j`. The correspondence
//! between synthetic names and original file names is kept in a [NameMap], dumped as
//! `namemap.json`. A file that cannot be read fails alone, its rank is not reused.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::errors::{TypingError, UnitFailure};
use crate::utils::files::*;

/// name of the name map dump
pub const NAMEMAP_FILE: &str = "namemap.json";

/// synthetic genome name for rank i (from 1)
pub fn genome_name(rank: usize) -> String {
    format!("Genome_{}", rank)
}

/// synthetic contig name for the j-th contig (from 1) of genome i
pub fn contig_name(genome_rank: usize, contig_rank: usize) -> String {
    format!("Genome_{}::Contig_{}", genome_rank, contig_rank)
}

/// bidirectional map synthetic genome name <-> original file stem
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NameMap {
    /// synthetic -> original
    forward: BTreeMap<String, String>,
    /// original -> synthetic
    #[serde(skip)]
    backward: BTreeMap<String, String>,
}

impl NameMap {
    pub fn new() -> Self {
        NameMap::default()
    }

    pub fn insert(&mut self, synthetic: &str, original: &str) {
        self.forward.insert(synthetic.to_string(), original.to_string());
        self.backward.insert(original.to_string(), synthetic.to_string());
    }

    pub fn get_original(&self, synthetic: &str) -> Option<&String> {
        self.forward.get(synthetic)
    }

    pub fn get_synthetic(&self, original: &str) -> Option<&String> {
        self.backward.get(original)
    }

    pub fn len(&self) -> usize {
        self.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }

    /// dumps the synthetic -> original map in dir/namemap.json
    pub fn dump_json(&self, dir: &Path) -> Result<(), TypingError> {
        let path = dir.join(NAMEMAP_FILE);
        log::info!("dumping name map in {:?}", path);
        let writer = BufWriter::new(File::create(&path)?);
        serde_json::to_writer_pretty(writer, &self.forward)?;
        Ok(())
    }

    pub fn reload_json(dir: &Path) -> Result<Self, TypingError> {
        let path = dir.join(NAMEMAP_FILE);
        let file = File::open(&path).map_err(|e| TypingError::input(&path, e.to_string()))?;
        let forward: BTreeMap<String, String> = serde_json::from_reader(BufReader::new(file))?;
        let mut namemap = NameMap::new();
        for (synthetic, original) in forward.iter() {
            namemap.insert(synthetic, original);
        }
        Ok(namemap)
    }
} // end of impl NameMap

/// A genome after renaming
#[derive(Clone, Debug)]
pub struct NormalizedGenome {
    /// synthetic id, Genome_i
    pub id: String,
    /// stem of the original file
    pub original: String,
    /// the renamed fasta file
    pub path: PathBuf,
    /// renamed contigs
    pub contigs: Vec<SeqRecord>,
}

/// result of a directory normalization, genomes in rank order
pub struct Normalized {
    pub genomes: Vec<NormalizedGenome>,
    pub namemap: NameMap,
    pub failures: Vec<UnitFailure>,
}

// rename one genome file
fn normalize_genome(rank: usize, input: &Path, out_dir: &Path) -> Result<NormalizedGenome, TypingError> {
    let original = fasta_stem(input).ok_or_else(|| TypingError::input(input, "not a fasta file name"))?;
    let records = read_fasta(input)?;
    let contigs: Vec<SeqRecord> = records
        .into_iter()
        .enumerate()
        .map(|(j, rec)| SeqRecord {
            id: contig_name(rank, j + 1),
            seq: rec.seq,
        })
        .collect();
    let id = genome_name(rank);
    let path = out_dir.join(format!("{}.fa", id));
    write_fasta(&path, &contigs)?;
    log::debug!("normalized {:?} as {}, nb contigs : {}", input, id, contigs.len());
    Ok(NormalizedGenome {
        id,
        original,
        path,
        contigs,
    })
} // end of normalize_genome

/// renames all fasta files of input_dir into out_dir.
/// Must be called inside the rayon pool the caller wants to use.
pub fn normalize_dir(input_dir: &Path, out_dir: &Path) -> Result<Normalized, TypingError> {
    log::info!("normalize_dir {:?} -> {:?}", input_dir, out_dir);
    create_if_not_exist(out_dir)?;
    let files = list_fasta_files(input_dir)?;
    if files.is_empty() {
        return Err(TypingError::input(input_dir, "no fasta file in directory"));
    }
    let results: Vec<(usize, &PathBuf, Result<NormalizedGenome, TypingError>)> = files
        .par_iter()
        .enumerate()
        .map(|(i, path)| (i + 1, path, normalize_genome(i + 1, path, out_dir)))
        .collect();
    //
    let mut genomes = Vec::<NormalizedGenome>::with_capacity(results.len());
    let mut namemap = NameMap::new();
    let mut failures = Vec::<UnitFailure>::new();
    for (rank, path, res) in results {
        match res {
            Ok(genome) => {
                namemap.insert(&genome.id, &genome.original);
                genomes.push(genome);
            }
            Err(e) => {
                log::error!("genome {:?} (rank {}) failed : {}", path, rank, e);
                let unit = path.display().to_string();
                failures.push(UnitFailure::new(&unit, &e));
            }
        }
    }
    log::info!("normalize_dir nb genomes : {}, nb failures : {}", genomes.len(), failures.len());
    Ok(Normalized {
        genomes,
        namemap,
        failures,
    })
} // end of normalize_dir

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn log_init_test() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    #[test]
    fn rename_and_partial_failure() {
        log_init_test();
        let input = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        fs::write(input.path().join("strainA.fna"), ">NODE_1 len=8\nACGTACGT\n>NODE_2\nGGGG\n").unwrap();
        fs::write(input.path().join("strainB.fna"), "").unwrap();
        fs::write(input.path().join("strainC.fa"), ">x\nTTTT\n").unwrap();
        //
        let normalized = normalize_dir(input.path(), out.path()).unwrap();
        assert_eq!(normalized.genomes.len(), 2);
        assert_eq!(normalized.failures.len(), 1);
        assert_eq!(normalized.failures[0].kind, "input");
        // ranks follow enumeration order, failed genome keeps its rank
        let first = &normalized.genomes[0];
        assert_eq!(first.id, "Genome_1");
        assert_eq!(first.contigs[1].id, "Genome_1::Contig_2");
        assert_eq!(normalized.genomes[1].id, "Genome_3");
        assert_eq!(normalized.namemap.get_original("Genome_3").unwrap(), "strainC");
        assert_eq!(normalized.namemap.get_synthetic("strainA").unwrap(), "Genome_1");
        //
        let reread = read_fasta(&out.path().join("Genome_1.fa")).unwrap();
        assert_eq!(reread[0].id, "Genome_1::Contig_1");
        assert_eq!(reread[0].seq, "ACGTACGT");
    }

    #[test]
    fn namemap_dump_reload() {
        let dir = tempfile::tempdir().unwrap();
        let mut namemap = NameMap::new();
        namemap.insert("Genome_1", "strainA");
        namemap.insert("Genome_2", "strainB");
        namemap.dump_json(dir.path()).unwrap();
        let reloaded = NameMap::reload_json(dir.path()).unwrap();
        assert_eq!(reloaded, namemap);
        assert_eq!(reloaded.get_synthetic("strainB").unwrap(), "Genome_2");
    }
} // end of mod tests
