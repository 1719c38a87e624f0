//! Database construction driver.
//!
//! From a pan-genome matrix and the gene sequences of its genomes, builds in a database
//! directory the locus metadata tables, the allele catalogue, the reference sequences,
//! the allele frequencies, the scheme and the allele profiles of the population.
//! Re-running on the same inputs gives identical tables.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::Context;
use cpu_time::ProcessTime;

use crate::database::alleles::collect_allele_infos;
use crate::database::annotation::{create_noncds, dump_noncds};
use crate::database::catalogue::Catalogue;
use crate::database::matrix::PanMatrix;
use crate::database::scheme::{reference_records, select_references, Scheme};
use crate::errors::{TypingError, UnitFailure};
use crate::utils::dumpload::*;
use crate::utils::files::{create_if_not_exist, SeqRecord};
use crate::utils::parameters::DatabaseParams;

/// what was built
#[derive(Debug)]
pub struct DatabaseSummary {
    pub nb_genomes: usize,
    pub nb_loci: usize,
    pub nb_paralogs: usize,
    pub nb_alleles: usize,
    pub nb_scheme_loci: usize,
    pub failures: Vec<UnitFailure>,
}

/// Builds the database in out_dir.
/// gff_dir, if given, holds the annotations of the genomes, used to produce the non CDS index.
pub fn make_database(
    matrix_path: &Path,
    genes_dir: &Path,
    gff_dir: Option<&Path>,
    out_dir: &Path,
    params: &mut DatabaseParams,
    nb_threads: usize,
) -> anyhow::Result<DatabaseSummary> {
    //
    log::info!("make_database matrix : {:?}, genes : {:?}, out : {:?}", matrix_path, genes_dir, out_dir);
    let start_t = SystemTime::now();
    let cpu_start = ProcessTime::now();
    //
    create_if_not_exist(out_dir).with_context(|| format!("cannot create database directory {:?}", out_dir))?;
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(nb_threads.max(1))
        .build()
        .context("cannot build thread pool")?;
    //
    let matrix = PanMatrix::from_path(matrix_path, params.get_metadata_columns())
        .with_context(|| format!("cannot ingest pan-genome matrix {:?}", matrix_path))?;
    let mut failures = matrix.failures.clone();
    dump_locus_meta(&out_dir.join(LOCUS_META_FILE), &matrix.single_copy)?;
    dump_locus_meta(&out_dir.join(PARALOG_META_FILE), &matrix.paralogs)?;
    //
    if let Some(gff_dir) = gff_dir {
        let (index, gff_failures) = create_noncds(gff_dir)
            .with_context(|| format!("cannot read annotations in {:?}", gff_dir))?;
        dump_noncds(&index, out_dir)?;
        failures.extend(gff_failures);
    }
    //
    let collected = pool.install(|| collect_allele_infos(&matrix, genes_dir));
    failures.extend(collected.failures);
    //
    let refs = select_references(&collected.frequencies);
    let scheme = Scheme::build(
        &matrix.single_copy,
        &refs,
        matrix.get_nb_genomes(),
        params.get_occurrence_threshold(),
    );
    let (catalogue, binding_failures) = Catalogue::from_frequencies(&collected.frequencies);
    failures.extend(binding_failures);
    //
    let nb_alleles = dump_alleles(out_dir, &catalogue)?;
    dump_locusfiles(out_dir, &catalogue, None)?;
    dump_refseq(out_dir, &reference_records(&refs))?;
    dump_allele_freq(out_dir, &collected.frequencies)?;
    dump_scheme(out_dir, &scheme)?;
    collected.profiles.dump_tsv(&out_dir.join(PROFILES_FILE))?;
    //
    params.set_built(matrix.get_nb_genomes());
    params.dump_json(out_dir)?;
    dump_failures(out_dir, &failures)?;
    //
    let cpu_time = cpu_start.elapsed().as_secs();
    let elapsed_t = start_t.elapsed().map(|d| d.as_secs_f32()).unwrap_or(0.);
    log::info!("make_database : cpu time(s) {}", cpu_time);
    log::info!("make_database : elapsed time(s) {}", elapsed_t);
    //
    let summary = DatabaseSummary {
        nb_genomes: matrix.get_nb_genomes(),
        nb_loci: matrix.single_copy.len(),
        nb_paralogs: matrix.paralogs.len(),
        nb_alleles,
        nb_scheme_loci: scheme.len(),
        failures,
    };
    log::info!("make_database done : {:?}", summary);
    Ok(summary)
} // end of make_database

//======================================================================================

/// A database reloaded for profiling
pub struct Database {
    pub dir: PathBuf,
    pub params: DatabaseParams,
    pub scheme: Scheme,
    /// reference sequence of every locus
    pub refs: Vec<SeqRecord>,
    pub catalogue: Catalogue,
}

impl Database {
    pub fn reload(dir: &Path) -> Result<Self, TypingError> {
        log::info!("reloading database {:?}", dir);
        let params = DatabaseParams::reload_json(dir)?;
        let scheme = reload_scheme(dir)?;
        let refs = reload_refseq(dir)?;
        let catalogue = reload_catalogue(dir)?;
        log::info!(
            "database reloaded, nb reference loci : {}, nb scheme loci : {}, nb alleles : {}",
            refs.len(),
            scheme.len(),
            catalogue.nb_alleles()
        );
        Ok(Database {
            dir: dir.to_path_buf(),
            params,
            scheme,
            refs,
            catalogue,
        })
    } // end of reload

    pub fn get_dir(&self) -> &Path {
        &self.dir
    }
} // end of impl Database
