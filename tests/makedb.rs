//! database construction on a 3 genomes population

mod common;

use std::fs;

use common::*;
use wgmlst::database::makedb::{make_database, Database};
use wgmlst::profiling::profile::ProfileMatrix;
use wgmlst::utils::dumpload::*;
use wgmlst::utils::parameters::DatabaseParams;
use wgmlst::utils::seqid::make_seqid;

#[test]
fn population_database() {
    log_init_test();
    let dir = tempfile::tempdir().unwrap();
    let population = write_population(dir.path());
    let db_dir = dir.path().join("db");
    let mut params = DatabaseParams::new(2.0, 4);
    let summary = make_database(&population.matrix, &population.genes, None, &db_dir, &mut params, 2).unwrap();
    //
    assert_eq!(summary.nb_genomes, 3);
    assert_eq!(summary.nb_loci, 2);
    assert_eq!(summary.nb_paralogs, 1);
    assert_eq!(summary.nb_alleles, 3);
    assert_eq!(summary.nb_scheme_loci, 2);
    assert!(summary.failures.is_empty());
    //
    let a1 = make_seqid(population.s1.as_bytes());
    let a2 = make_seqid(population.s2.as_bytes());
    let a3 = make_seqid(population.s3.as_bytes());
    let freq = reload_allele_freq(&db_dir).unwrap();
    assert_eq!(freq["L1"][&a1], 2);
    assert_eq!(freq["L1"][&a2], 1);
    assert_eq!(freq["L2"][&a3], 2);
    assert!(!freq.contains_key("P1"));
    //
    let scheme = fs::read_to_string(db_dir.join(SCHEME_FILE)).unwrap();
    assert_eq!(scheme, format!("locus_id\toccurrence\tref_allele\nL1\t100.00\t{}\nL2\t66.67\t{}\n", a1, a3));
    //
    let profiles = ProfileMatrix::reload_tsv(&db_dir.join(PROFILES_FILE)).unwrap();
    assert_eq!(profiles.get("L1", "G1").unwrap().ids(), vec![a1.as_str()]);
    assert_eq!(profiles.get("L1", "G2").unwrap().ids(), vec![a2.as_str()]);
    assert_eq!(profiles.get("L1", "G3").unwrap().ids(), vec![a1.as_str()]);
    assert!(profiles.get("L2", "G2").is_none());
    //
    let paralogs = reload_locus_meta(&db_dir.join(PARALOG_META_FILE)).unwrap();
    assert_eq!(paralogs.len(), 1);
    assert_eq!(paralogs[0].locus_id, "P1");
    assert_eq!(reload_locus_meta(&db_dir.join(LOCUS_META_FILE)).unwrap().len(), 2);
    assert!(db_dir.join(LOCUSFILES_DIR).join("L1.fa").is_file());
    //
    let database = Database::reload(&db_dir).unwrap();
    assert_eq!(database.params.nb_genomes, 3);
    assert_eq!(database.refs.len(), 2);
    assert_eq!(database.refs[0].seq, population.s1);
    assert_eq!(database.catalogue.get_locus(&a2).unwrap(), "L1");
}

#[test]
fn construction_is_deterministic() {
    log_init_test();
    let dir = tempfile::tempdir().unwrap();
    let population = write_population(dir.path());
    let first = dir.path().join("db1");
    let second = dir.path().join("db2");
    make_database(&population.matrix, &population.genes, None, &first, &mut DatabaseParams::new(2.0, 4), 1).unwrap();
    make_database(&population.matrix, &population.genes, None, &second, &mut DatabaseParams::new(2.0, 4), 3).unwrap();
    for file in [SCHEME_FILE, REFSEQ_FILE, ALLELES_FILE, PROFILES_FILE, ALLELE_FREQ_FILE] {
        let a = fs::read(first.join(file)).unwrap();
        let b = fs::read(second.join(file)).unwrap();
        assert_eq!(a, b, "{} differs", file);
    }
}

#[test]
fn missing_gene_file_fails_one_genome() {
    log_init_test();
    let dir = tempfile::tempdir().unwrap();
    let population = write_population(dir.path());
    fs::remove_file(population.genes.join("G2.ffn")).unwrap();
    let db_dir = dir.path().join("db");
    let summary =
        make_database(&population.matrix, &population.genes, None, &db_dir, &mut DatabaseParams::new(50.0, 4), 2).unwrap();
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].unit, "G2");
    assert!(db_dir.join(FAILURES_FILE).is_file());
    // occurrence comes from the matrix, not from resolved calls
    let scheme = reload_scheme(&db_dir).unwrap();
    assert_eq!(scheme.len(), 2);
    let freq = reload_allele_freq(&db_dir).unwrap();
    assert_eq!(freq["L1"].len(), 1);
}

#[test]
fn sequence_shared_by_two_loci_fails_one_locus() {
    log_init_test();
    let dir = tempfile::tempdir().unwrap();
    let matrix = dir.path().join("matrix.csv");
    let text = "\"Gene\",\"Annotation\",\"No. isolates\",\"No. sequences\",\"G1\",\"G2\"\n\
                \"L1\",\"a\",\"2\",\"2\",\"G1_1\",\"G2_1\"\n\
                \"L2\",\"b\",\"1\",\"1\",\"G1_2\",\"\"\n\
                \"L3\",\"c\",\"2\",\"2\",\"G1_3\",\"G2_3\"\n";
    fs::write(&matrix, text).unwrap();
    let genes = dir.path().join("genes");
    fs::create_dir_all(&genes).unwrap();
    let shared = "ATGAAACCCTAA";
    fs::write(
        genes.join("G1.ffn"),
        format!(">G1_1\n{}\n>G1_2\n{}\n>G1_3\nATGGGGTTTTAA\n", shared, shared),
    )
    .unwrap();
    fs::write(genes.join("G2.ffn"), ">G2_1\nATGAAACCGTAA\n>G2_3\nATGGGGTTTTAA\n").unwrap();
    //
    let db_dir = dir.path().join("db");
    let summary = make_database(&matrix, &genes, None, &db_dir, &mut DatabaseParams::new(2.0, 4), 2).unwrap();
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].unit, "L2");
    assert_eq!(summary.failures[0].kind, "consistency");
    assert_eq!(summary.nb_alleles, 3);
    assert_eq!(summary.nb_scheme_loci, 3);
    // the build completed
    assert_eq!(reload_scheme(&db_dir).unwrap().len(), 3);
    assert_eq!(reload_refseq(&db_dir).unwrap().len(), 3);
    let failures = fs::read_to_string(db_dir.join(FAILURES_FILE)).unwrap();
    assert!(failures.contains("L2\tconsistency"));
    let database = Database::reload(&db_dir).unwrap();
    assert_eq!(database.catalogue.get_locus(&make_seqid(shared.as_bytes())).unwrap(), "L1");
    assert!(database.catalogue.locus_alleles("L2").is_empty());
}

#[test]
fn paralogous_only_population_reloads() {
    log_init_test();
    let dir = tempfile::tempdir().unwrap();
    let matrix = dir.path().join("matrix.csv");
    let text = "\"Gene\",\"Annotation\",\"No. isolates\",\"No. sequences\",\"G1\",\"G2\"\n\
                \"P1\",\"transposase\",\"2\",\"3\",\"G1_1\tG1_2\",\"G2_1\"\n";
    fs::write(&matrix, text).unwrap();
    let genes = dir.path().join("genes");
    fs::create_dir_all(&genes).unwrap();
    fs::write(genes.join("G1.ffn"), ">G1_1\nATGAAATAA\n>G1_2\nATGAAATAA\n").unwrap();
    fs::write(genes.join("G2.ffn"), ">G2_1\nATGAAATAA\n").unwrap();
    //
    let db_dir = dir.path().join("db");
    let summary = make_database(&matrix, &genes, None, &db_dir, &mut DatabaseParams::new(2.0, 4), 1).unwrap();
    assert_eq!(summary.nb_loci, 0);
    assert_eq!(summary.nb_paralogs, 1);
    assert_eq!(summary.nb_alleles, 0);
    let database = Database::reload(&db_dir).unwrap();
    assert!(database.refs.is_empty());
    assert!(database.scheme.is_empty());
    assert_eq!(database.catalogue.nb_alleles(), 0);
}
