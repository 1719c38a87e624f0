//! Ingestion of the pan-genome gene presence/absence matrix.
//!
//! The matrix (Roary `gene_presence_absence.csv` layout) has one row by locus. Each row begins
//! with a fixed block of metadata columns (locus id, annotation, number of isolates, number of
//! sequences ...) followed by one column by genome holding the gene call id(s) of the genome for
//! this locus, empty if absent, tab separated if the genome has several copies.
//!
//! Loci whose number of isolates equals their number of sequences are single copy loci and
//! go on to allele collection, the others are paralogous and are only kept as metadata.

use std::io::Read;
use std::path::Path;

use fxhash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::errors::{TypingError, UnitFailure};

// header names looked for in the metadata block
const GENE_COL: &str = "Gene";
const ANNOTATION_COL: &str = "Annotation";
const ISOLATES_COL: &str = "No. isolates";
const SEQUENCES_COL: &str = "No. sequences";

/// locus ids become file names, so '/' is replaced
pub fn sanitize_locus_id(id: &str) -> String {
    id.trim().replace('/', "_")
}

/// A row of the locus metadata tables
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LocusMeta {
    pub locus_id: String,
    pub num_isolates: usize,
    pub num_sequences: usize,
    pub description: String,
}

impl LocusMeta {
    /// true if no genome carries more than one copy of the locus
    pub fn is_single_copy(&self) -> bool {
        self.num_isolates == self.num_sequences
    }
}

/// gene call ids of one locus, one cell by genome column
#[derive(Clone, Debug)]
pub struct LocusCalls {
    pub locus_id: String,
    /// cells[g] are the gene call ids of genome g, empty if the locus is absent
    pub cells: Vec<Vec<String>>,
}

/// The ingested matrix
#[derive(Clone, Debug)]
pub struct PanMatrix {
    /// genome column names, in matrix order
    pub genomes: Vec<String>,
    /// metadata of single copy loci
    pub single_copy: Vec<LocusMeta>,
    /// metadata of paralogous loci
    pub paralogs: Vec<LocusMeta>,
    /// gene calls of single copy loci
    pub calls: Vec<LocusCalls>,
    /// malformed rows
    pub failures: Vec<UnitFailure>,
} // end of PanMatrix

impl PanMatrix {
    /// number of genomes in the population
    pub fn get_nb_genomes(&self) -> usize {
        self.genomes.len()
    }

    pub fn from_path(path: &Path, metadata_columns: usize) -> Result<Self, TypingError> {
        log::info!("reading pan-genome matrix {:?}", path);
        let file = std::fs::File::open(path).map_err(|e| TypingError::input(path, e.to_string()))?;
        let delimiter = match path.extension().and_then(|e| e.to_str()) {
            Some("tsv") | Some("tab") => b'\t',
            _ => b',',
        };
        PanMatrix::from_reader(file, delimiter, metadata_columns).map_err(|e| match e {
            TypingError::Input { msg, .. } => TypingError::input(path, msg),
            other => other,
        })
    } // end of from_path

    /// parse a matrix, validating header shape once. Malformed rows fail alone.
    pub fn from_reader<R: Read>(reader: R, delimiter: u8, metadata_columns: usize) -> Result<Self, TypingError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);
        let header = csv_reader.headers()?.clone();
        if header.len() <= metadata_columns {
            return Err(TypingError::input(
                "",
                format!("matrix has {} columns, no genome column after {} metadata columns", header.len(), metadata_columns),
            ));
        }
        let find_col = |name: &str| -> Result<usize, TypingError> {
            header
                .iter()
                .take(metadata_columns)
                .position(|h| h.trim() == name)
                .ok_or_else(|| TypingError::input("", format!("missing column {:?} in metadata block", name)))
        };
        let gene_col = find_col(GENE_COL)?;
        let annotation_col = find_col(ANNOTATION_COL)?;
        let isolates_col = find_col(ISOLATES_COL)?;
        let sequences_col = find_col(SEQUENCES_COL)?;
        //
        let genomes: Vec<String> = header.iter().skip(metadata_columns).map(|h| h.trim().to_string()).collect();
        let nb_columns = header.len();
        log::info!("matrix nb genomes : {}", genomes.len());
        //
        let mut single_copy = Vec::<LocusMeta>::new();
        let mut paralogs = Vec::<LocusMeta>::new();
        let mut calls = Vec::<LocusCalls>::new();
        let mut failures = Vec::<UnitFailure>::new();
        let mut seen = FxHashSet::<String>::default();
        //
        for (rank, record) in csv_reader.records().enumerate() {
            let row_unit = format!("matrix row {}", rank + 2);
            let record = match record {
                Ok(record) => record,
                Err(e) => {
                    log::error!("{} unreadable : {}", row_unit, e);
                    failures.push(UnitFailure::new(&row_unit, &TypingError::from(e)));
                    continue;
                }
            };
            let locus_id = sanitize_locus_id(record.get(gene_col).unwrap_or(""));
            let unit = if locus_id.is_empty() { row_unit } else { locus_id.clone() };
            let parsed = parse_row(&record, nb_columns, &locus_id, annotation_col, isolates_col, sequences_col)
                .and_then(|meta| {
                    if seen.contains(&meta.locus_id) {
                        Err(TypingError::input("", format!("duplicated locus id {}", meta.locus_id)))
                    } else {
                        Ok(meta)
                    }
                });
            let meta = match parsed {
                Ok(meta) => meta,
                Err(e) => {
                    log::error!("locus {} skipped : {}", unit, e);
                    failures.push(UnitFailure::new(&unit, &e));
                    continue;
                }
            };
            seen.insert(meta.locus_id.clone());
            if meta.is_single_copy() {
                let cells: Vec<Vec<String>> = record
                    .iter()
                    .skip(metadata_columns)
                    .map(|cell| {
                        cell.split('\t')
                            .map(str::trim)
                            .filter(|s| !s.is_empty())
                            .map(String::from)
                            .collect()
                    })
                    .collect();
                calls.push(LocusCalls {
                    locus_id: meta.locus_id.clone(),
                    cells,
                });
                single_copy.push(meta);
            } else {
                paralogs.push(meta);
            }
        }
        log::info!(
            "matrix nb single copy loci : {}, nb paralogous loci : {}, nb malformed rows : {}",
            single_copy.len(),
            paralogs.len(),
            failures.len()
        );
        Ok(PanMatrix {
            genomes,
            single_copy,
            paralogs,
            calls,
            failures,
        })
    } // end of from_reader
} // end of impl PanMatrix

// validate one row against the header
fn parse_row(
    record: &csv::StringRecord,
    nb_columns: usize,
    locus_id: &str,
    annotation_col: usize,
    isolates_col: usize,
    sequences_col: usize,
) -> Result<LocusMeta, TypingError> {
    if record.len() != nb_columns {
        return Err(TypingError::input("", format!("expected {} columns, got {}", nb_columns, record.len())));
    }
    if locus_id.is_empty() {
        return Err(TypingError::input("", "empty locus id"));
    }
    let parse_count = |col: usize| -> Result<usize, TypingError> {
        let field = record.get(col).unwrap_or("").trim();
        field
            .parse::<usize>()
            .map_err(|_| TypingError::input("", format!("bad count {:?} in column {}", field, col + 1)))
    };
    Ok(LocusMeta {
        locus_id: locus_id.to_string(),
        num_isolates: parse_count(isolates_col)?,
        num_sequences: parse_count(sequences_col)?,
        description: record.get(annotation_col).unwrap_or("").trim().to_string(),
    })
} // end of parse_row

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    // a reduced matrix with 4 metadata columns
    const MATRIX: &str = "\"Gene\",\"Annotation\",\"No. isolates\",\"No. sequences\",\"g1\",\"g2\",\"g3\"\n\
\"thrA\",\"aspartokinase\",\"3\",\"3\",\"g1_0001\",\"g2_0001\",\"g3_0007\"\n\
\"group_1/2\",\"hypothetical protein\",\"2\",\"2\",\"g1_0002\",\"\",\"g3_0002\"\n\
\"tnpA\",\"transposase\",\"2\",\"4\",\"g1_0003\tg1_0009\",\"g2_0005\tg2_0006\",\"\"\n\
\"bad\",\"broken\",\"x\",\"2\",\"a\",\"b\",\"\"\n\
\"short\",\"too few\",\"1\"\n";

    #[test]
    fn ingest_matrix() {
        let matrix = PanMatrix::from_reader(Cursor::new(MATRIX), b',', 4).unwrap();
        assert_eq!(matrix.genomes, vec!["g1", "g2", "g3"]);
        assert_eq!(matrix.get_nb_genomes(), 3);
        let single: Vec<&str> = matrix.single_copy.iter().map(|m| m.locus_id.as_str()).collect();
        assert_eq!(single, vec!["thrA", "group_1_2"]);
        assert_eq!(matrix.paralogs.len(), 1);
        assert_eq!(matrix.paralogs[0].locus_id, "tnpA");
        assert_eq!(matrix.paralogs[0].num_sequences, 4);
        // paralogous loci do not go forward
        assert_eq!(matrix.calls.len(), 2);
        assert_eq!(matrix.calls[1].cells[1], Vec::<String>::new());
        assert_eq!(matrix.calls[0].cells[2], vec!["g3_0007".to_string()]);
        // two malformed rows, reported not fatal
        assert_eq!(matrix.failures.len(), 2);
        assert_eq!(matrix.failures[0].unit, "bad");
    }

    #[test]
    fn missing_column_is_fatal() {
        let bad = "\"Gene\",\"Annotation\",\"No. sequences\",\"x\",\"g1\"\n\"a\",\"b\",\"1\",\"\",\"c\"\n";
        let res = PanMatrix::from_reader(Cursor::new(bad), b',', 4);
        assert!(matches!(res, Err(TypingError::Input { .. })));
    }

    #[test]
    fn no_genome_column_is_fatal() {
        let bad = "\"Gene\",\"Annotation\",\"No. isolates\",\"No. sequences\"\n";
        assert!(PanMatrix::from_reader(Cursor::new(bad), b',', 4).is_err());
    }
} // end of mod tests
