//! Whole genome allele typing.
//!
//! A typing database is built once from a pan-genome presence/absence matrix and the gene
//! sequences of a population of genomes (module [database]). New genomes are then profiled
//! against it (module [profiling]) : loci present in each genome are found by alignment of
//! reference sequences, alleles are called by exact match or catalogue lookup, and novel
//! alleles are registered in the shared catalogue.
//!
//! Alleles are identified by the SHA-256 of their sequence, see [utils::seqid].

pub mod contigs;
pub mod database;
pub mod errors;
pub mod profiling;
pub mod utils;
