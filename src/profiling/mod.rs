//! Genome profiling : locus presence, allele calling and novel allele registration.

pub mod allele;
pub mod locus;
pub mod profile;
pub mod request;
pub mod search;
