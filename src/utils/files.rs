//! This file contains directory exploration, fasta file selection, fasta reading and writing.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::errors::TypingError;
use crate::utils::seqops::normalize_seq;

/// extensions of fasta files we accept, possibly gzipped
const FASTA_EXT: [&str; 5] = ["fa", "fna", "fasta", "ffn", "fas"];

/// a fasta record, id is the first word of the header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeqRecord {
    pub id: String,
    /// normalized (uppercase) sequence
    pub seq: String,
}

impl SeqRecord {
    pub fn new(id: &str, seq: &str) -> Self {
        SeqRecord {
            id: id.to_string(),
            seq: seq.to_string(),
        }
    }

    pub fn len(&self) -> usize {
        self.seq.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seq.is_empty()
    }
} // end of impl SeqRecord

// strip .gz then look at the fasta extension
fn split_fasta_name(filename: &str) -> Option<(&str, &str)> {
    let name = filename.strip_suffix(".gz").unwrap_or(filename);
    let (stem, ext) = name.rsplit_once('.')?;
    if FASTA_EXT.contains(&ext) && !stem.is_empty() {
        Some((stem, ext))
    } else {
        None
    }
} // end of split_fasta_name

/// returns true if file name is a fasta file name (possibly gzipped)
pub fn is_fasta_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|f| f.to_str())
        .and_then(split_fasta_name)
        .is_some()
} // end of is_fasta_file

/// file name without directory and without fasta (and .gz) extension.
pub fn fasta_stem(path: &Path) -> Option<String> {
    let filename = path.file_name()?.to_str()?;
    split_fasta_name(filename).map(|(stem, _)| stem.to_string())
}

/// list fasta files of a directory (not recursive), sorted by file name to get a reproducible enumeration order
pub fn list_fasta_files(dir: &Path) -> Result<Vec<PathBuf>, TypingError> {
    if !dir.is_dir() {
        return Err(TypingError::input(dir, "not a directory"));
    }
    let mut files = Vec::<PathBuf>::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && is_fasta_file(&path) {
            files.push(path);
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    log::debug!("list_fasta_files {:?} : {} files", dir, files.len());
    Ok(files)
} // end of list_fasta_files

/// look in dir for a fasta file named stem.{ffn,fna,fa,fasta,fas}[.gz]
pub fn find_fasta_by_stem(dir: &Path, stem: &str) -> Option<PathBuf> {
    for ext in ["ffn", "fna", "fa", "fasta", "fas"] {
        for suffix in ["", ".gz"] {
            let path = dir.join(format!("{}.{}{}", stem, ext, suffix));
            if path.is_file() {
                return Some(path);
            }
        }
    }
    None
} // end of find_fasta_by_stem

/// opens and parses a fasta file with needletail, return records in file order.
/// An unreadable or empty file is an input error.
pub fn read_fasta(path: &Path) -> Result<Vec<SeqRecord>, TypingError> {
    log::trace!("read_fasta {:?}", path);
    let mut reader = needletail::parse_fastx_file(path)
        .map_err(|e| TypingError::input(path, format!("cannot parse fasta : {}", e)))?;
    let mut records = Vec::<SeqRecord>::new();
    let mut nb_record = 0;
    while let Some(record) = reader.next() {
        nb_record += 1;
        let seqrec = record.map_err(|e| {
            TypingError::input(path, format!("bad record num {} : {}", nb_record, e))
        })?;
        // needletail gives the whole header, we keep the first word
        let header = String::from_utf8_lossy(seqrec.id()).into_owned();
        let id = header.split_whitespace().next().unwrap_or("").to_string();
        let seq = normalize_seq(&seqrec.seq());
        if seq.is_empty() {
            log::warn!("sequence of null length, file is {:?}, record num : {}", path, nb_record);
        }
        records.push(SeqRecord { id, seq });
    }
    if records.is_empty() {
        return Err(TypingError::input(path, "no fasta record"));
    }
    log::debug!("read_fasta {:?} nb_record : {}", path, records.len());
    Ok(records)
} // end of read_fasta

/// write records in fasta format, sequences on one line
pub fn write_fasta<'a, I>(path: &Path, records: I) -> Result<usize, TypingError>
where
    I: IntoIterator<Item = &'a SeqRecord>,
{
    let mut writer = BufWriter::new(File::create(path)?);
    let mut nb_written = 0;
    for rec in records {
        writeln!(writer, ">{}", rec.id)?;
        writeln!(writer, "{}", rec.seq)?;
        nb_written += 1;
    }
    writer.flush()?;
    log::trace!("write_fasta {:?} nb records : {}", path, nb_written);
    Ok(nb_written)
} // end of write_fasta

/// creates dir if it does not exist
pub fn create_if_not_exist(dir: &Path) -> Result<(), TypingError> {
    if !dir.is_dir() {
        fs::create_dir_all(dir)?;
    }
    Ok(())
}

/// A per unit scratch directory, removed when dropped or closed.
/// Removal failures are only logged.
pub struct ScratchDir {
    dir: Option<tempfile::TempDir>,
}

impl ScratchDir {
    /// creates a fresh directory prefixed by prefix inside parent
    pub fn new(parent: &Path, prefix: &str) -> Result<Self, TypingError> {
        let dir = tempfile::Builder::new()
            .prefix(prefix)
            .tempdir_in(parent)?;
        log::trace!("scratch dir {:?}", dir.path());
        Ok(ScratchDir { dir: Some(dir) })
    }

    pub fn path(&self) -> &Path {
        match &self.dir {
            Some(dir) => dir.path(),
            None => Path::new(""),
        }
    }

    /// remove the directory now, reporting failures in the log
    pub fn close(mut self) {
        self.remove();
    }

    fn remove(&mut self) {
        if let Some(dir) = self.dir.take() {
            let path = dir.path().to_path_buf();
            if let Err(e) = dir.close() {
                log::warn!("could not remove scratch dir {:?} : {}", path, e);
            }
        }
    }
} // end of impl ScratchDir

impl Drop for ScratchDir {
    fn drop(&mut self) {
        self.remove();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log_init_test() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    #[test]
    fn fasta_names() {
        assert_eq!(fasta_stem(Path::new("/a/b/GCF_0001.fna.gz")), Some("GCF_0001".to_string()));
        assert_eq!(fasta_stem(Path::new("x.y.fa")), Some("x.y".to_string()));
        assert!(!is_fasta_file(Path::new("matrix.csv")));
        assert!(!is_fasta_file(Path::new(".fa")));
    }

    #[test]
    fn fasta_read_write() {
        log_init_test();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.fa");
        fs::write(&path, ">c1 some description\nacgt\nAC\n>c2\nTTTT\n").unwrap();
        let records = read_fasta(&path).unwrap();
        assert_eq!(records, vec![SeqRecord::new("c1", "ACGTAC"), SeqRecord::new("c2", "TTTT")]);
        //
        let out = dir.path().join("out.fa");
        assert_eq!(write_fasta(&out, &records).unwrap(), 2);
        assert_eq!(read_fasta(&out).unwrap(), records);
    }

    #[test]
    fn empty_fasta_is_input_error() {
        log_init_test();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.fa");
        fs::write(&path, "").unwrap();
        let res = read_fasta(&path);
        assert!(matches!(res, Err(TypingError::Input { .. })));
    }

    #[test]
    fn listing_is_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.fna", "a.fa", "c.txt", "d.fasta.gz"] {
            fs::write(dir.path().join(name), ">x\nA\n").unwrap();
        }
        let names: Vec<String> = list_fasta_files(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["a.fa", "b.fna", "d.fasta.gz"]);
        assert!(find_fasta_by_stem(dir.path(), "b").is_some());
        assert!(find_fasta_by_stem(dir.path(), "d").is_some());
        assert!(find_fasta_by_stem(dir.path(), "c").is_none());
    }

    #[test]
    fn scratch_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let kept;
        {
            let scratch = ScratchDir::new(dir.path(), "Genome_1.").unwrap();
            kept = scratch.path().to_path_buf();
            fs::write(kept.join("db.nsq"), "x").unwrap();
            assert!(kept.is_dir());
        }
        assert!(!kept.exists());
    }
} // end of mod tests
