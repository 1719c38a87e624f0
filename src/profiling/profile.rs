//! The genome x locus profile matrix.
//!
//! Cells are collected in any order (workers finish when they finish) and always written
//! with loci rows and genome columns sorted lexicographically.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;

use crate::errors::TypingError;

/// content of a profile cell
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AlleleCell {
    Single(String),
    /// a genome with within locus copies, ids in gene call order
    Multi(Vec<String>),
}

impl AlleleCell {
    pub fn from_ids(mut ids: Vec<String>) -> Option<Self> {
        match ids.len() {
            0 => None,
            1 => ids.pop().map(AlleleCell::Single),
            _ => Some(AlleleCell::Multi(ids)),
        }
    }

    pub fn ids(&self) -> Vec<&str> {
        match self {
            AlleleCell::Single(id) => vec![id.as_str()],
            AlleleCell::Multi(ids) => ids.iter().map(|s| s.as_str()).collect(),
        }
    }
} // end of impl AlleleCell

impl fmt::Display for AlleleCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlleleCell::Single(id) => write!(f, "{}", id),
            AlleleCell::Multi(ids) => write!(f, "{}", ids.join("\t")),
        }
    }
}

/// Sparse genome x locus matrix, absent cells are not stored.
#[derive(Clone, Debug, Default)]
pub struct ProfileMatrix {
    genomes: BTreeSet<String>,
    loci: BTreeSet<String>,
    cells: BTreeMap<String, BTreeMap<String, AlleleCell>>,
}

impl ProfileMatrix {
    pub fn new() -> Self {
        ProfileMatrix::default()
    }

    /// declare a genome column, so that a genome without any call still gets its column
    pub fn add_genome(&mut self, genome: &str) {
        self.genomes.insert(genome.to_string());
    }

    /// declare a locus row
    pub fn add_locus(&mut self, locus: &str) {
        self.loci.insert(locus.to_string());
    }

    /// set a cell, returns the previous value if any
    pub fn set(&mut self, locus: &str, genome: &str, cell: AlleleCell) -> Option<AlleleCell> {
        self.add_genome(genome);
        self.add_locus(locus);
        self.cells
            .entry(locus.to_string())
            .or_default()
            .insert(genome.to_string(), cell)
    }

    pub fn get(&self, locus: &str, genome: &str) -> Option<&AlleleCell> {
        self.cells.get(locus).and_then(|row| row.get(genome))
    }

    pub fn get_genomes(&self) -> &BTreeSet<String> {
        &self.genomes
    }

    pub fn get_loci(&self) -> &BTreeSet<String> {
        &self.loci
    }

    /// number of non empty cells
    pub fn nb_calls(&self) -> usize {
        self.cells.values().map(|row| row.len()).sum()
    }

    /// merge a genome column computed elsewhere
    pub fn merge_column(&mut self, genome: &str, column: BTreeMap<String, AlleleCell>) {
        self.add_genome(genome);
        for (locus, cell) in column {
            self.set(&locus, genome, cell);
        }
    }

    /// tab separated dump, first column is locus_id, empty string for absent cells.
    pub fn dump_tsv(&self, path: &Path) -> Result<(), TypingError> {
        log::info!(
            "dumping profile matrix {:?}, nb loci : {}, nb genomes : {}",
            path,
            self.loci.len(),
            self.genomes.len()
        );
        let mut writer = csv::WriterBuilder::new().delimiter(b'\t').from_path(path)?;
        let mut header = vec!["locus_id".to_string()];
        header.extend(self.genomes.iter().cloned());
        writer.write_record(&header)?;
        for locus in self.loci.iter() {
            let row = self.cells.get(locus);
            let mut record = Vec::<String>::with_capacity(self.genomes.len() + 1);
            record.push(locus.clone());
            for genome in self.genomes.iter() {
                let cell = row.and_then(|r| r.get(genome)).map(|c| c.to_string()).unwrap_or_default();
                record.push(cell);
            }
            writer.write_record(&record)?;
        }
        writer.flush()?;
        Ok(())
    } // end of dump_tsv

    /// reload a dump made by dump_tsv
    pub fn reload_tsv(path: &Path) -> Result<Self, TypingError> {
        let mut reader = csv::ReaderBuilder::new().delimiter(b'\t').from_path(path)?;
        let header = reader.headers()?.clone();
        let genomes: Vec<String> = header.iter().skip(1).map(String::from).collect();
        let mut matrix = ProfileMatrix::new();
        for genome in genomes.iter() {
            matrix.add_genome(genome);
        }
        for record in reader.records() {
            let record = record?;
            let locus = record.get(0).unwrap_or("").to_string();
            matrix.add_locus(&locus);
            for (genome, field) in genomes.iter().zip(record.iter().skip(1)) {
                let ids: Vec<String> = field.split('\t').filter(|s| !s.is_empty()).map(String::from).collect();
                if let Some(cell) = AlleleCell::from_ids(ids) {
                    matrix.set(&locus, genome, cell);
                }
            }
        }
        Ok(matrix)
    } // end of reload_tsv
} // end of impl ProfileMatrix

/// Boolean locus presence table, loci rows and genome columns
#[derive(Clone, Debug, Default)]
pub struct PresenceTable {
    loci: BTreeSet<String>,
    present: BTreeMap<String, BTreeSet<String>>,
}

impl PresenceTable {
    /// loci are all the reference loci, so absent ones get a row too
    pub fn new<I: IntoIterator<Item = String>>(loci: I) -> Self {
        PresenceTable {
            loci: loci.into_iter().collect(),
            present: BTreeMap::new(),
        }
    }

    pub fn insert_genome(&mut self, genome: &str, present: BTreeSet<String>) {
        self.present.insert(genome.to_string(), present);
    }

    pub fn is_present(&self, locus: &str, genome: &str) -> bool {
        self.present.get(genome).map(|s| s.contains(locus)).unwrap_or(false)
    }

    pub fn dump_tsv(&self, path: &Path) -> Result<(), TypingError> {
        log::info!("dumping locus presence table {:?}", path);
        let mut writer = csv::WriterBuilder::new().delimiter(b'\t').from_path(path)?;
        let mut header = vec!["locus_id".to_string()];
        header.extend(self.present.keys().cloned());
        writer.write_record(&header)?;
        for locus in self.loci.iter() {
            let mut record = vec![locus.clone()];
            for present in self.present.values() {
                record.push(if present.contains(locus) { "True" } else { "False" }.to_string());
            }
            writer.write_record(&record)?;
        }
        writer.flush()?;
        Ok(())
    }
} // end of impl PresenceTable

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sorted_dump_whatever_insertion_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut matrix = ProfileMatrix::new();
        matrix.set("L2", "Genome_2", AlleleCell::Single("b2".to_string()));
        matrix.set("L1", "Genome_10", AlleleCell::Single("a3".to_string()));
        matrix.set("L1", "Genome_1", AlleleCell::Single("a1".to_string()));
        matrix.add_locus("L3");
        let path = dir.path().join("p.tsv");
        matrix.dump_tsv(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "locus_id\tGenome_1\tGenome_10\tGenome_2");
        assert_eq!(lines[1], "L1\ta1\ta3\t");
        assert_eq!(lines[2], "L2\t\t\tb2");
        assert_eq!(lines[3], "L3\t\t\t");
    }

    #[test]
    fn multi_cell_reload() {
        let dir = tempfile::tempdir().unwrap();
        let mut matrix = ProfileMatrix::new();
        matrix.set("L1", "g1", AlleleCell::Multi(vec!["x".to_string(), "y".to_string()]));
        matrix.set("L1", "g2", AlleleCell::Single("z".to_string()));
        let path = dir.path().join("p.tsv");
        matrix.dump_tsv(&path).unwrap();
        let reloaded = ProfileMatrix::reload_tsv(&path).unwrap();
        assert_eq!(reloaded.get("L1", "g1"), matrix.get("L1", "g1"));
        assert_eq!(reloaded.get("L1", "g2").unwrap().ids(), vec!["z"]);
        assert_eq!(reloaded.nb_calls(), 2);
    }

    #[test]
    fn presence_table() {
        let dir = tempfile::tempdir().unwrap();
        let mut table = PresenceTable::new(vec!["L2".to_string(), "L1".to_string()]);
        table.insert_genome("Genome_1", ["L1".to_string()].into_iter().collect());
        table.insert_genome("Genome_2", BTreeSet::new());
        assert!(table.is_present("L1", "Genome_1"));
        assert!(!table.is_present("L2", "Genome_1"));
        let path = dir.path().join("locus_profiles.tsv");
        table.dump_tsv(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().nth(1).unwrap(), "L1\tTrue\tFalse");
    }
} // end of mod tests
