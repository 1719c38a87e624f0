//! structures related to processing parameters

use std::fs::OpenOptions;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::to_writer_pretty;

use crate::errors::TypingError;

/// name of the parameters dump in a database directory
pub const PARAMETERS_FILE: &str = "parameters.json";

/// Parameters of database construction.
/// They are dumped in the database directory so profiling knows how the scheme was made.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DatabaseParams {
    /// minimum occurrence (in %) of a locus in the population to enter the scheme
    pub occurrence_threshold: f64,
    /// number of leading metadata columns of the pan-genome matrix, genome columns follow
    pub metadata_columns: usize,
    /// number of genomes the database was built from
    pub nb_genomes: usize,
    /// build date, rfc3339
    pub build_date: String,
} // end of DatabaseParams

impl Default for DatabaseParams {
    fn default() -> Self {
        DatabaseParams {
            occurrence_threshold: 2.0,
            metadata_columns: 14,
            nb_genomes: 0,
            build_date: String::new(),
        }
    }
} // end of default for DatabaseParams

impl DatabaseParams {
    pub fn new(occurrence_threshold: f64, metadata_columns: usize) -> Self {
        DatabaseParams {
            occurrence_threshold,
            metadata_columns,
            ..Default::default()
        }
    }

    pub fn get_occurrence_threshold(&self) -> f64 {
        self.occurrence_threshold
    }

    pub fn get_metadata_columns(&self) -> usize {
        self.metadata_columns
    }

    /// records the number of genomes and stamps the build date
    pub fn set_built(&mut self, nb_genomes: usize) {
        self.nb_genomes = nb_genomes;
        self.build_date = chrono::Local::now().to_rfc3339();
    }

    pub fn dump_json(&self, dirpath: &Path) -> Result<(), TypingError> {
        //
        let filepath = dirpath.join(PARAMETERS_FILE);
        //
        log::info!("dumping DatabaseParams in json file : {:?}", filepath);
        //
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&filepath)
            .map_err(|e| {
                log::error!("DatabaseParams dump : could not open file {:?}", filepath.as_os_str());
                TypingError::input(&filepath, e.to_string())
            })?;
        //
        let mut writer = BufWriter::new(file);
        to_writer_pretty(&mut writer, &self)?;
        //
        Ok(())
    } // end of dump_json

    /// reload from a json dump. Used in profiling to ensure coherence with database constitution
    pub fn reload_json(dirpath: &Path) -> Result<Self, TypingError> {
        log::info!("in DatabaseParams reload_json");
        //
        let filepath = dirpath.join(PARAMETERS_FILE);
        let file = OpenOptions::new().read(true).open(&filepath).map_err(|e| {
            log::error!("DatabaseParams reload_json : could not open file {:?}", filepath.as_os_str());
            TypingError::input(&filepath, e.to_string())
        })?;
        //
        let reader = BufReader::new(file);
        let params: Self = serde_json::from_reader(reader)?;
        //
        log::info!(
            "DatabaseParams reload, occurrence threshold : {}, nb genomes : {}, built : {}",
            params.occurrence_threshold,
            params.nb_genomes,
            params.build_date
        );
        //
        Ok(params)
    } // end of reload_json
} // end of impl DatabaseParams

//======================================================================================

/// How loci to call alleles for are selected
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub enum LociSelector {
    /// scheme loci with occurrence >= level
    Occurrence(f64),
    /// an explicit list of loci
    List(Vec<String>),
}

/// Thresholds and resources used when profiling genomes
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProfilingParams {
    /// minimum aligned coverage of a reference sequence for locus presence
    pub coverage: f64,
    /// minimum nucleotide identity (in %) for locus presence
    pub identity: f64,
    /// minimum protein identity (in %) to assign a novel allele to a locus
    pub protein_identity: f64,
    /// minimum coverage (in %) of the candidate protein to assign a novel allele
    pub protein_coverage: f64,
    /// loci for which alleles are called
    pub selector: LociSelector,
    /// size of the worker pool
    pub nb_threads: usize,
} // end of ProfilingParams

impl Default for ProfilingParams {
    fn default() -> Self {
        ProfilingParams {
            coverage: 0.5,
            identity: 90.,
            protein_identity: 95.,
            protein_coverage: 90.,
            selector: LociSelector::Occurrence(2.0),
            nb_threads: num_cpus::get(),
        }
    }
} // end of default for ProfilingParams

impl ProfilingParams {
    pub fn get_coverage(&self) -> f64 {
        self.coverage
    }

    pub fn get_identity(&self) -> f64 {
        self.identity
    }

    pub fn get_protein_identity(&self) -> f64 {
        self.protein_identity
    }

    pub fn get_protein_coverage(&self) -> f64 {
        self.protein_coverage
    }

    pub fn get_selector(&self) -> &LociSelector {
        &self.selector
    }

    /// number of threads, at least one
    pub fn get_nb_threads(&self) -> usize {
        self.nb_threads.max(1)
    }
} // end of impl ProfilingParams

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let params = ProfilingParams::default();
        assert_eq!(params.get_coverage(), 0.5);
        assert_eq!(params.get_identity(), 90.);
        assert_eq!(params.get_protein_identity(), 95.);
        assert_eq!(params.get_protein_coverage(), 90.);
        assert_eq!(params.get_selector(), &LociSelector::Occurrence(2.0));
        assert!(params.get_nb_threads() >= 1);
        assert_eq!(DatabaseParams::default().get_occurrence_threshold(), 2.0);
    }

    #[test]
    fn dump_reload() {
        let dir = tempfile::tempdir().unwrap();
        let mut params = DatabaseParams::new(5.0, 3);
        params.set_built(12);
        params.dump_json(dir.path()).unwrap();
        let reloaded = DatabaseParams::reload_json(dir.path()).unwrap();
        assert_eq!(reloaded.get_occurrence_threshold(), 5.0);
        assert_eq!(reloaded.get_metadata_columns(), 3);
        assert_eq!(reloaded.nb_genomes, 12);
        assert!(!reloaded.build_date.is_empty());
    }

    #[test]
    fn reload_missing_is_input_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            DatabaseParams::reload_json(dir.path()),
            Err(TypingError::Input { .. })
        ));
    }
} // end of mod tests
