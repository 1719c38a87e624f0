//! Database construction : from a pan-genome matrix to an allele catalogue and a typing scheme.

pub mod alleles;
pub mod annotation;
pub mod catalogue;
pub mod makedb;
pub mod matrix;
pub mod scheme;
