//! Parsing of gff3 annotation files to index the features that are not coding sequences.
//!
//! For each genome (gff file stem) we keep the ID of features whose type is not CDS.
//! Comment and directive lines are skipped, `##FASTA` ends the feature section,
//! lines without the 9 gff columns are skipped.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter};
use std::path::Path;

use crate::errors::{TypingError, UnitFailure};

/// name of the non CDS index dump
pub const NONCDS_FILE: &str = "nonCDS.json";

/// genome -> ids of its non CDS features, in file order
pub type NonCdsIndex = BTreeMap<String, Vec<String>>;

// extracts ID= value from gff attributes column
fn feature_id(attributes: &str) -> Option<&str> {
    attributes
        .split(';')
        .map(str::trim)
        .find_map(|attr| attr.strip_prefix("ID="))
        .filter(|id| !id.is_empty())
}

/// parse gff lines, returns ids of non CDS features
pub fn parse_noncds<R: BufRead>(reader: R) -> Result<Vec<String>, TypingError> {
    let mut noncds = Vec::<String>::new();
    let mut nb_skipped = 0;
    for line in reader.lines() {
        let line = line?;
        if line.starts_with("##FASTA") {
            break;
        }
        if line.starts_with('#') || line.trim().is_empty() {
            continue;
        }
        let tokens: Vec<&str> = line.split('\t').collect();
        if tokens.len() < 9 {
            nb_skipped += 1;
            continue;
        }
        let (seq_type, attributes) = (tokens[2], tokens[8]);
        match feature_id(attributes) {
            Some(id) => {
                if seq_type != "CDS" {
                    noncds.push(id.to_string());
                }
            }
            None => nb_skipped += 1,
        }
    }
    if nb_skipped > 0 {
        log::debug!("parse_noncds skipped {} malformed lines", nb_skipped);
    }
    Ok(noncds)
} // end of parse_noncds

/// parse all .gff files of a directory. A file that cannot be read is reported, others go on.
pub fn create_noncds(gff_dir: &Path) -> Result<(NonCdsIndex, Vec<UnitFailure>), TypingError> {
    if !gff_dir.is_dir() {
        return Err(TypingError::input(gff_dir, "not a directory"));
    }
    let mut paths: Vec<_> = std::fs::read_dir(gff_dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().map(|ext| ext == "gff" || ext == "gff3").unwrap_or(false))
        .collect();
    paths.sort();
    //
    let mut index = NonCdsIndex::new();
    let mut failures = Vec::<UnitFailure>::new();
    for path in paths {
        let name = match path.file_stem().and_then(|s| s.to_str()) {
            Some(name) => name.to_string(),
            None => continue,
        };
        let res = File::open(&path)
            .map_err(TypingError::from)
            .and_then(|f| parse_noncds(BufReader::new(f)));
        match res {
            Ok(ids) => {
                log::trace!("{} : {} non CDS features", name, ids.len());
                index.insert(name, ids);
            }
            Err(e) => {
                log::error!("annotation file {:?} failed : {}", path, e);
                failures.push(UnitFailure::new(&name, &e));
            }
        }
    }
    log::info!("create_noncds, nb genomes : {}", index.len());
    Ok((index, failures))
} // end of create_noncds

pub fn dump_noncds(index: &NonCdsIndex, dir: &Path) -> Result<(), TypingError> {
    let path = dir.join(NONCDS_FILE);
    log::info!("dumping non CDS index in {:?}", path);
    let writer = BufWriter::new(File::create(&path)?);
    serde_json::to_writer(writer, index)?;
    Ok(())
}

// end of mod tests
