//! Genome profiling driver.
//!
//! Contigs of the query genomes are renamed, then each genome is a unit of work run in a
//! worker pool : locus presence profiling followed by allele calling. A unit failing does not
//! stop its siblings, only an unreachable search backend stops the run.
//! Results are assembled after all units completed, sorted by locus and genome, and alleles
//! registered during the run are written back to the database.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::time::SystemTime;

use anyhow::Context;
use cpu_time::ProcessTime;
use rayon::prelude::*;

use crate::contigs::{normalize_dir, NormalizedGenome};
use crate::database::makedb::Database;
use crate::errors::{TypingError, UnitFailure};
use crate::profiling::allele::AlleleCaller;
use crate::profiling::locus::{profile_loci, ref_lengths, RefLengths};
use crate::profiling::profile::{AlleleCell, PresenceTable, ProfileMatrix};
use crate::profiling::search::SearchEngine;
use crate::utils::dumpload::{dump_failures, write_back};
use crate::utils::files::{create_if_not_exist, find_fasta_by_stem, read_fasta, ScratchDir, SeqRecord};
use crate::utils::parameters::{LociSelector, ProfilingParams};

pub const QUERY_DIR: &str = "query";
pub const LOCUS_PROFILES_FILE: &str = "locus_profiles.tsv";
pub const WGMLST_FILE: &str = "wgmlst.tsv";

/// Salmonella MLST loci as split by the pan-genome clustering
pub const MLST_LOCI: [&str; 11] = [
    "aroC_1", "aroC_2", "aroC_3", "dnaN", "hemD", "hisD", "purE", "sucA_1", "sucA_2", "thrA_2", "thrA_3",
];

pub const VIRULENCE_LOCI: [&str; 39] = [
    "lpfA", "lpfA_1", "lpfA_2", "lpfA_3", "lpfA_4", "lpfB", "lpfB_1", "lpfB_2", "lpfC", "lpfC_1", "lpfD", "lpfD_1",
    "lpfD_2", "lpfE", "fimA_1", "fimA_2", "fimA_4", "fimA_5", "fimA_6", "fimC_1", "fimC_2", "fimC_3", "fimD_1",
    "fimD_2", "fimD_3", "fimD_4", "fimD_5", "fim_2", "viaA_1", "viaA_2", "fur_1", "fur_2", "rpoS", "rpoS_1",
    "rpoS_2", "spvB", "spvB_1", "spvB_2", "spvC",
];

/// loci of a named preset : mlst or virulence
pub fn preset_loci(name: &str) -> Option<Vec<String>> {
    let loci: &[&str] = match name.to_lowercase().as_str() {
        "mlst" => &MLST_LOCI,
        "virulence" => &VIRULENCE_LOCI,
        _ => return None,
    };
    Some(loci.iter().map(|s| s.to_string()).collect())
}

/// reads a locus list, one locus by line, blank lines and # comments ignored
pub fn read_loci_list(path: &Path) -> Result<Vec<String>, TypingError> {
    let file = File::open(path).map_err(|e| TypingError::input(path, e.to_string()))?;
    let mut loci = Vec::<String>::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        let locus = line.trim();
        if !locus.is_empty() && !locus.starts_with('#') {
            loci.push(locus.to_string());
        }
    }
    if loci.is_empty() {
        return Err(TypingError::input(path, "empty locus list"));
    }
    Ok(loci)
} // end of read_loci_list

/// loci for which alleles are called. Listed loci unknown to the database are dropped.
pub fn select_loci(database: &Database, selector: &LociSelector) -> BTreeSet<String> {
    let known: BTreeSet<&str> = database.refs.iter().map(|r| r.id.as_str()).collect();
    let selected: BTreeSet<String> = match selector {
        LociSelector::Occurrence(level) => database.scheme.loci_above(*level).into_iter().collect(),
        LociSelector::List(loci) => loci.iter().cloned().collect(),
    };
    let (kept, unknown): (BTreeSet<String>, BTreeSet<String>) =
        selected.into_iter().partition(|l| known.contains(l.as_str()));
    if !unknown.is_empty() {
        log::warn!("{} selected loci are not in the database, first one : {:?}", unknown.len(), unknown.iter().next());
    }
    log::info!("nb loci selected for allele calling : {}", kept.len());
    kept
} // end of select_loci

/// what profiling produced
#[derive(Debug)]
pub struct ProfilingSummary {
    pub nb_genomes: usize,
    pub nb_calls: usize,
    pub nb_novel: usize,
    pub failures: Vec<UnitFailure>,
}

// result of a genome unit
struct GenomeTyping {
    genome: String,
    present: BTreeSet<String>,
    calls: Vec<(String, String)>,
    nb_novel: usize,
    failures: Vec<UnitFailure>,
}

// context shared by all genome units
struct TypingContext<'a> {
    database: &'a Database,
    lengths: RefLengths,
    caller: AlleleCaller<'a>,
    engine: &'a dyn SearchEngine,
    selected: &'a BTreeSet<String>,
    genes_dir: Option<&'a Path>,
    scratch: &'a Path,
    params: &'a ProfilingParams,
}

impl<'a> TypingContext<'a> {
    // predicted genes of a genome, a missing file is not an error
    fn genes(&self, genome: &NormalizedGenome, failures: &mut Vec<UnitFailure>) -> Option<Vec<SeqRecord>> {
        let dir = self.genes_dir?;
        let path = match find_fasta_by_stem(dir, &genome.original) {
            Some(path) => path,
            None => {
                log::debug!("no predicted genes for {} ({})", genome.id, genome.original);
                return None;
            }
        };
        match read_fasta(&path) {
            Ok(genes) => Some(genes),
            Err(e) => {
                log::error!("genome {} predicted genes unreadable : {}", genome.id, e);
                failures.push(UnitFailure::new(&genome.id, &e));
                None
            }
        }
    } // end of genes

    // one unit of work. Err only for fatal errors
    fn type_genome(&self, genome: &NormalizedGenome) -> Result<GenomeTyping, TypingError> {
        let mut typing = GenomeTyping {
            genome: genome.id.clone(),
            present: BTreeSet::new(),
            calls: Vec::new(),
            nb_novel: 0,
            failures: Vec::new(),
        };
        let present = profile_loci(
            genome,
            &self.database.refs,
            &self.lengths,
            self.engine,
            self.scratch,
            self.params.get_coverage(),
            self.params.get_identity(),
        );
        typing.present = match present {
            Ok(present) => present,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                log::error!("genome {} locus profiling failed : {}", genome.id, e);
                typing.failures.push(UnitFailure::new(&genome.id, &e));
                return Ok(typing);
            }
        };
        //
        let targets: BTreeSet<String> = typing.present.intersection(self.selected).cloned().collect();
        let genes = self.genes(genome, &mut typing.failures);
        match self.caller.call_alleles(genome, &targets, genes.as_deref(), self.scratch) {
            Ok(alleles) => {
                typing.calls = alleles.calls.into_iter().collect();
                typing.nb_novel = alleles.nb_novel;
                typing.failures.extend(alleles.failures);
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                log::error!("genome {} allele calling failed : {}", genome.id, e);
                typing.failures.push(UnitFailure::new(&genome.id, &e));
            }
        }
        log::info!(
            "genome {} : {} loci present, {} alleles called",
            genome.id,
            typing.present.len(),
            typing.calls.len()
        );
        Ok(typing)
    } // end of type_genome
} // end of impl TypingContext

/// Profiles all genomes of input_dir against the database in db_dir, results in out_dir.
/// genes_dir optionally holds predicted genes of the genomes, named after the genome files.
pub fn profiling(
    input_dir: &Path,
    db_dir: &Path,
    out_dir: &Path,
    genes_dir: Option<&Path>,
    params: &ProfilingParams,
    engine: &dyn SearchEngine,
) -> anyhow::Result<ProfilingSummary> {
    //
    log::info!("profiling {:?} against database {:?}, out : {:?}", input_dir, db_dir, out_dir);
    let start_t = SystemTime::now();
    let cpu_start = ProcessTime::now();
    //
    create_if_not_exist(out_dir).with_context(|| format!("cannot create output directory {:?}", out_dir))?;
    let database = Database::reload(db_dir).with_context(|| format!("cannot reload database {:?}", db_dir))?;
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(params.get_nb_threads())
        .build()
        .context("cannot build thread pool")?;
    //
    let normalized = pool
        .install(|| normalize_dir(input_dir, &out_dir.join(QUERY_DIR)))
        .with_context(|| format!("cannot normalize genomes of {:?}", input_dir))?;
    normalized.namemap.dump_json(out_dir)?;
    let mut failures = normalized.failures.clone();
    //
    let selected = select_loci(&database, params.get_selector());
    let scratch = ScratchDir::new(out_dir, "tmp.")?;
    let context = TypingContext {
        database: &database,
        lengths: ref_lengths(&database.refs),
        caller: AlleleCaller::new(
            &database.catalogue,
            &database.refs,
            engine,
            params.get_protein_identity(),
            params.get_protein_coverage(),
        ),
        engine,
        selected: &selected,
        genes_dir,
        scratch: scratch.path(),
        params,
    };
    let typings: Vec<GenomeTyping> = pool
        .install(|| {
            normalized
                .genomes
                .par_iter()
                .map(|genome| context.type_genome(genome))
                .collect::<Result<Vec<GenomeTyping>, TypingError>>()
        })
        .context("profiling aborted")?;
    scratch.close();
    //
    // assembly, sorted whatever the completion order
    let mut presence = PresenceTable::new(database.refs.iter().map(|r| r.id.clone()));
    let mut profiles = ProfileMatrix::new();
    for locus in selected.iter() {
        profiles.add_locus(locus);
    }
    let mut nb_novel = 0;
    for typing in typings {
        profiles.add_genome(&typing.genome);
        for (locus, allele_id) in typing.calls {
            profiles.set(&locus, &typing.genome, AlleleCell::Single(allele_id));
        }
        presence.insert_genome(&typing.genome, typing.present);
        nb_novel += typing.nb_novel;
        failures.extend(typing.failures);
    }
    presence.dump_tsv(&out_dir.join(LOCUS_PROFILES_FILE))?;
    profiles.dump_tsv(&out_dir.join(WGMLST_FILE))?;
    let written = write_back(db_dir, &database.catalogue).context("catalogue write back failed")?;
    failures.extend(written.failures);
    dump_failures(out_dir, &failures)?;
    //
    let cpu_time = cpu_start.elapsed().as_secs();
    let elapsed_t = start_t.elapsed().map(|d| d.as_secs_f32()).unwrap_or(0.);
    log::info!("profiling : cpu time(s) {}", cpu_time);
    log::info!("profiling : elapsed time(s) {}", elapsed_t);
    //
    let summary = ProfilingSummary {
        nb_genomes: profiles.get_genomes().len(),
        nb_calls: profiles.nb_calls(),
        nb_novel,
        failures,
    };
    log::info!(
        "profiling done, nb genomes : {}, nb calls : {}, nb novel alleles : {}, nb failures : {}",
        summary.nb_genomes,
        summary.nb_calls,
        summary.nb_novel,
        summary.failures.len()
    );
    Ok(summary)
} // end of profiling

// end of mod tests
