//! a small module dedicated to dump and reload the tables of a database directory.
//!
//! A database directory holds :
//! - parameters.json : construction parameters
//! - locus_meta.tsv, paralog_meta.tsv : locus metadata, single copy and paralogous loci
//! - alleles.tsv : the allele catalogue
//! - locusfiles/<locus>.fa : alleles of each locus
//! - panRefSeq.fa : reference allele of each locus
//! - allele_freq.json : locus -> allele -> count
//! - scheme.tsv : scheme loci with occurrence and reference allele
//! - allele_profiles.tsv : allele profiles of the construction population
//! - nonCDS.json : non coding features by genome, if annotations were given
//! - .catalogue.lock : present while a profiling run writes its novel alleles back

use std::collections::{BTreeMap, BTreeSet};
use std::fs::OpenOptions;
use std::io::{BufReader, BufWriter, ErrorKind};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::to_writer_pretty;

use crate::database::alleles::FrequencyTable;
use crate::database::catalogue::{AlleleRow, Catalogue};
use crate::database::matrix::LocusMeta;
use crate::database::scheme::{Scheme, SchemeEntry};
use crate::errors::{TypingError, UnitFailure};
use crate::utils::files::{create_if_not_exist, read_fasta, write_fasta, SeqRecord};

pub const LOCUS_META_FILE: &str = "locus_meta.tsv";
pub const PARALOG_META_FILE: &str = "paralog_meta.tsv";
pub const ALLELES_FILE: &str = "alleles.tsv";
pub const LOCUSFILES_DIR: &str = "locusfiles";
pub const REFSEQ_FILE: &str = "panRefSeq.fa";
pub const ALLELE_FREQ_FILE: &str = "allele_freq.json";
pub const SCHEME_FILE: &str = "scheme.tsv";
pub const PROFILES_FILE: &str = "allele_profiles.tsv";
pub const FAILURES_FILE: &str = "failures.tsv";

// a tsv writer
fn tsv_writer(path: &Path) -> Result<csv::Writer<std::fs::File>, TypingError> {
    Ok(csv::WriterBuilder::new().delimiter(b'\t').from_path(path)?)
}

// a tsv reader, missing file is an input error
fn tsv_reader(path: &Path) -> Result<csv::Reader<std::fs::File>, TypingError> {
    if !path.is_file() {
        log::error!("cannot find file {:?}", path);
        return Err(TypingError::input(path, "missing database file"));
    }
    Ok(csv::ReaderBuilder::new().delimiter(b'\t').from_path(path)?)
}

/// dump locus metadata (locus_id, num_isolates, num_sequences, description)
pub fn dump_locus_meta(path: &Path, metadata: &[LocusMeta]) -> Result<(), TypingError> {
    log::info!("dumping {} loci metadata in {:?}", metadata.len(), path);
    let mut writer = tsv_writer(path)?;
    if metadata.is_empty() {
        writer.write_record(["locus_id", "num_isolates", "num_sequences", "description"])?;
    }
    for meta in metadata {
        writer.serialize(meta)?;
    }
    writer.flush()?;
    Ok(())
} // end of dump_locus_meta

pub fn reload_locus_meta(path: &Path) -> Result<Vec<LocusMeta>, TypingError> {
    let mut reader = tsv_reader(path)?;
    let mut metadata = Vec::<LocusMeta>::new();
    for meta in reader.deserialize() {
        metadata.push(meta?);
    }
    log::debug!("reloaded {} loci metadata from {:?}", metadata.len(), path);
    Ok(metadata)
}

/// dump the allele catalogue, rows sorted by locus then allele id
pub fn dump_alleles(dir: &Path, catalogue: &Catalogue) -> Result<usize, TypingError> {
    let path = dir.join(ALLELES_FILE);
    let rows = catalogue.sorted_rows();
    log::info!("dumping {} alleles in {:?}", rows.len(), path);
    let mut writer = tsv_writer(&path)?;
    if rows.is_empty() {
        writer.write_record(["locus_id", "allele_id", "dna_seq", "peptide_seq", "count"])?;
    }
    for row in rows.iter() {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(rows.len())
} // end of dump_alleles

/// reload the catalogue from alleles.tsv
pub fn reload_catalogue(dir: &Path) -> Result<Catalogue, TypingError> {
    let path = dir.join(ALLELES_FILE);
    let mut reader = tsv_reader(&path)?;
    let catalogue = Catalogue::new();
    for row in reader.deserialize() {
        let row: AlleleRow = row?;
        catalogue.insert_row(row)?;
    }
    log::info!("reloaded catalogue from {:?}, nb alleles : {}", path, catalogue.nb_alleles());
    Ok(catalogue)
} // end of reload_catalogue

/// write locusfiles/<locus>.fa for the given loci, all catalogue loci if None
pub fn dump_locusfiles(dir: &Path, catalogue: &Catalogue, loci: Option<&BTreeSet<String>>) -> Result<usize, TypingError> {
    let locus_dir = dir.join(LOCUSFILES_DIR);
    create_if_not_exist(&locus_dir)?;
    let loci: Vec<String> = match loci {
        Some(loci) => loci.iter().cloned().collect(),
        None => catalogue.loci(),
    };
    for locus in loci.iter() {
        let records = catalogue.locus_alleles(locus);
        write_fasta(&locus_dir.join(format!("{}.fa", locus)), &records)?;
    }
    log::info!("dumped {} locus files in {:?}", loci.len(), locus_dir);
    Ok(loci.len())
} // end of dump_locusfiles

/// reference sequences, one record by locus
pub fn dump_refseq(dir: &Path, refs: &[SeqRecord]) -> Result<(), TypingError> {
    let path = dir.join(REFSEQ_FILE);
    log::info!("dumping {} reference sequences in {:?}", refs.len(), path);
    write_fasta(&path, refs)?;
    Ok(())
}

/// reload reference sequences. An empty file (no single copy locus had an allele) gives no loci
pub fn reload_refseq(dir: &Path) -> Result<Vec<SeqRecord>, TypingError> {
    let path = dir.join(REFSEQ_FILE);
    let metadata = std::fs::metadata(&path).map_err(|e| TypingError::input(&path, e.to_string()))?;
    if metadata.len() == 0 {
        log::warn!("reference sequence file {:?} is empty, database has no typable locus", path);
        return Ok(Vec::new());
    }
    read_fasta(&path)
}

/// dump locus -> allele id -> count, keys sorted
pub fn dump_allele_freq(dir: &Path, frequencies: &FrequencyTable) -> Result<(), TypingError> {
    let path = dir.join(ALLELE_FREQ_FILE);
    log::info!("dumping allele frequencies in {:?}", path);
    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&path)
        .map_err(|e| TypingError::input(&path, e.to_string()))?;
    let mut writer = BufWriter::new(file);
    to_writer_pretty(&mut writer, &frequencies.to_count_map())?;
    Ok(())
} // end of dump_allele_freq

pub fn reload_allele_freq(dir: &Path) -> Result<BTreeMap<String, BTreeMap<String, usize>>, TypingError> {
    let path = dir.join(ALLELE_FREQ_FILE);
    let file = OpenOptions::new()
        .read(true)
        .open(&path)
        .map_err(|e| TypingError::input(&path, e.to_string()))?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

/// scheme table, occurrence written with 2 decimals
pub fn dump_scheme(dir: &Path, scheme: &Scheme) -> Result<(), TypingError> {
    let path = dir.join(SCHEME_FILE);
    log::info!("dumping scheme of {} loci in {:?}", scheme.len(), path);
    let mut writer = tsv_writer(&path)?;
    writer.write_record(["locus_id", "occurrence", "ref_allele"])?;
    for entry in scheme.get_entries() {
        let occurrence = format!("{:.2}", entry.occurrence);
        writer.write_record([entry.locus_id.as_str(), occurrence.as_str(), entry.ref_allele.as_str()])?;
    }
    writer.flush()?;
    Ok(())
} // end of dump_scheme

pub fn reload_scheme(dir: &Path) -> Result<Scheme, TypingError> {
    let path = dir.join(SCHEME_FILE);
    let mut reader = tsv_reader(&path)?;
    let mut entries = Vec::<SchemeEntry>::new();
    for entry in reader.deserialize() {
        entries.push(entry?);
    }
    log::info!("reloaded scheme from {:?}, nb loci : {}", path, entries.len());
    Ok(Scheme::new(entries))
}

/// failure summary (unit, kind, message), written only if there are failures
pub fn dump_failures(dir: &Path, failures: &[UnitFailure]) -> Result<(), TypingError> {
    if failures.is_empty() {
        return Ok(());
    }
    let path = dir.join(FAILURES_FILE);
    log::warn!("{} failed units, summary in {:?}", failures.len(), path);
    let mut writer = tsv_writer(&path)?;
    writer.write_record(["unit", "kind", "message"])?;
    for failure in failures {
        log::warn!("failed {} ({}) : {}", failure.unit, failure.kind, failure.msg);
        writer.write_record([failure.unit.as_str(), failure.kind.as_str(), failure.msg.as_str()])?;
    }
    writer.flush()?;
    Ok(())
} // end of dump_failures

/// lock file guarding catalogue writes in a database directory
pub const LOCK_FILE: &str = ".catalogue.lock";

// a waiting writer retries every LOCK_WAIT, at most LOCK_MAX_TRY times
const LOCK_WAIT: Duration = Duration::from_millis(200);
const LOCK_MAX_TRY: usize = 300;

/// Advisory exclusive write access to a database directory, released when dropped.
pub struct DbLock {
    path: PathBuf,
}

impl DbLock {
    pub fn acquire(dir: &Path) -> Result<Self, TypingError> {
        let path = dir.join(LOCK_FILE);
        let mut nb_try = 0;
        loop {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(_) => {
                    log::debug!("database lock {:?} acquired", path);
                    return Ok(DbLock { path });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists && nb_try < LOCK_MAX_TRY => {
                    if nb_try == 0 {
                        log::info!("database locked by another run, waiting for {:?}", path);
                    }
                    nb_try += 1;
                    std::thread::sleep(LOCK_WAIT);
                }
                Err(e) => return Err(TypingError::input(&path, format!("cannot lock database : {}", e))),
            }
        }
    } // end of acquire
} // end of impl DbLock

impl Drop for DbLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            log::warn!("could not remove database lock {:?} : {}", self.path, e);
        }
    }
}

/// what a write back appended to the database
#[derive(Debug, Default)]
pub struct WriteBack {
    pub nb_appended: usize,
    /// registered alleles the database binds to another locus
    pub failures: Vec<UnitFailure>,
}

/// Persists alleles registered during a profiling run.
/// Under the database lock, the catalogue on disk is reloaded and the registered rows are merged
/// into it, so alleles written by other runs since this one started are kept. alleles.tsv is
/// rewritten, so are the locus files of touched loci, and allele frequencies are recomputed.
pub fn write_back(dir: &Path, catalogue: &Catalogue) -> Result<WriteBack, TypingError> {
    let mut written = WriteBack::default();
    let registered = catalogue.get_registered();
    if registered.is_empty() {
        log::info!("no novel allele, catalogue unchanged");
        return Ok(written);
    }
    let _lock = DbLock::acquire(dir)?;
    let on_disk = if dir.join(ALLELES_FILE).is_file() {
        reload_catalogue(dir)?
    } else {
        Catalogue::new()
    };
    let mut loci = BTreeSet::<String>::new();
    for allele_id in registered.iter() {
        let row = match catalogue.get_row(allele_id) {
            Some(row) => row,
            None => continue,
        };
        let locus = row.locus_id.clone();
        match on_disk.insert_row(row) {
            Ok(true) => {
                written.nb_appended += 1;
                loci.insert(locus);
            }
            Ok(false) => log::debug!("allele {} already written by another run", allele_id),
            Err(e) => {
                log::error!("locus {} : {}", locus, e);
                written.failures.push(UnitFailure::new(&locus, &e));
            }
        }
    }
    if written.nb_appended > 0 {
        dump_alleles(dir, &on_disk)?;
        dump_locusfiles(dir, &on_disk, Some(&loci))?;
        dump_allele_freq(dir, &on_disk.frequencies())?;
    }
    log::info!(
        "catalogue write back : {} novel alleles in {} loci, {} refused",
        written.nb_appended,
        loci.len(),
        written.failures.len()
    );
    Ok(written)
} // end of write_back

// end of mod tests
