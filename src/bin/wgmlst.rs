//! wgmlst : whole genome allele typing.
//!
//! Subcommands :
//!
//! - normalize -i dir -o dir : renames genomes and contigs as Genome_i::Contig_j, dumps the name map.
//!
//! - noncds --gff dir -o dir : extracts ids of non coding features from gff3 annotations.
//!
//! - makedb --matrix file --genes dir -o dbdir \[--gff dir\] \[--occurrence f\] \[--metadata-cols n\] \[-t n\]
//!     builds a typing database from a pan-genome presence/absence matrix (Roary layout)
//!     and the gene sequences of its genomes (one fasta file by genome, named after the matrix columns).
//!
//! - profile -i dir -d dbdir -o dir \[--genes dir\] \[--coverage f\] \[--identity f\] \[--protein-identity f\]
//!     \[--protein-coverage f\] \[--occurrence f | --loci file | --preset name\] \[-t n\] \[--blast-bin dir\]
//!     profiles the genomes of a directory against a database. Predicted genes, if given, are searched
//!     in the genes directory under the name of the genome file and allow calling novel alleles.
//!
//! Logging is driven by RUST_LOG.

use std::path::PathBuf;

use anyhow::{anyhow, Context};
use clap::{Arg, ArgAction, ArgGroup, ArgMatches, Command};
use env_logger::Builder;

use wgmlst::contigs::normalize_dir;
use wgmlst::database::annotation::{create_noncds, dump_noncds};
use wgmlst::database::makedb::make_database;
use wgmlst::profiling::request::{preset_loci, profiling, read_loci_list, QUERY_DIR};
use wgmlst::profiling::search::BlastSearch;
use wgmlst::utils::dumpload::dump_failures;
use wgmlst::utils::files::create_if_not_exist;
use wgmlst::utils::parameters::{DatabaseParams, LociSelector, ProfilingParams};

pub fn init_log() -> u64 {
    Builder::from_default_env().init();
    log::info!("logger initialized");
    1
}

// a required directory or file argument
fn path_arg(name: &'static str, short: Option<char>, long: &'static str, help: &'static str) -> Arg {
    let arg = Arg::new(name)
        .long(long)
        .value_name("PATH")
        .help(help)
        .required(true)
        .value_parser(clap::value_parser!(PathBuf))
        .action(ArgAction::Set);
    match short {
        Some(c) => arg.short(c),
        None => arg,
    }
}

fn threads_arg() -> Arg {
    Arg::new("threads")
        .short('t')
        .long("threads")
        .value_name("THREADS")
        .help("number of worker threads, default to number of cpus")
        .value_parser(clap::value_parser!(usize))
        .action(ArgAction::Set)
}

fn get_path(matches: &ArgMatches, name: &str) -> anyhow::Result<PathBuf> {
    matches
        .get_one::<PathBuf>(name)
        .cloned()
        .ok_or_else(|| anyhow!("missing argument {}", name))
}

fn get_threads(matches: &ArgMatches) -> usize {
    matches.get_one::<usize>("threads").copied().unwrap_or_else(num_cpus::get)
}

fn do_normalize(matches: &ArgMatches) -> anyhow::Result<()> {
    let input = get_path(matches, "input")?;
    let output = get_path(matches, "output")?;
    let pool = rayon::ThreadPoolBuilder::new().num_threads(get_threads(matches)).build()?;
    let normalized = pool
        .install(|| normalize_dir(&input, &output.join(QUERY_DIR)))
        .with_context(|| format!("cannot normalize {:?}", input))?;
    normalized.namemap.dump_json(&output)?;
    dump_failures(&output, &normalized.failures)?;
    println!("normalized {} genomes in {:?}", normalized.genomes.len(), output.join(QUERY_DIR));
    Ok(())
} // end of do_normalize

fn do_noncds(matches: &ArgMatches) -> anyhow::Result<()> {
    let gff_dir = get_path(matches, "gff")?;
    let output = get_path(matches, "output")?;
    create_if_not_exist(&output)?;
    let (index, failures) = create_noncds(&gff_dir)?;
    dump_noncds(&index, &output)?;
    dump_failures(&output, &failures)?;
    println!("non CDS features of {} genomes dumped in {:?}", index.len(), output);
    Ok(())
}

fn do_makedb(matches: &ArgMatches) -> anyhow::Result<()> {
    let matrix = get_path(matches, "matrix")?;
    let genes = get_path(matches, "genes")?;
    let output = get_path(matches, "output")?;
    let gff = matches.get_one::<PathBuf>("gff").cloned();
    let defaults = DatabaseParams::default();
    let occurrence = matches
        .get_one::<f64>("occurrence")
        .copied()
        .unwrap_or(defaults.get_occurrence_threshold());
    let metadata_cols = matches
        .get_one::<usize>("metadata_cols")
        .copied()
        .unwrap_or(defaults.get_metadata_columns());
    let mut params = DatabaseParams::new(occurrence, metadata_cols);
    //
    let summary = make_database(&matrix, &genes, gff.as_deref(), &output, &mut params, get_threads(matches))?;
    println!(
        "database {:?} : {} genomes, {} loci ({} paralogous left out), {} alleles, {} scheme loci, {} failures",
        output,
        summary.nb_genomes,
        summary.nb_loci,
        summary.nb_paralogs,
        summary.nb_alleles,
        summary.nb_scheme_loci,
        summary.failures.len()
    );
    Ok(())
} // end of do_makedb

fn do_profile(matches: &ArgMatches) -> anyhow::Result<()> {
    let input = get_path(matches, "input")?;
    let database = get_path(matches, "database")?;
    let output = get_path(matches, "output")?;
    let genes = matches.get_one::<PathBuf>("genes").cloned();
    //
    let mut params = ProfilingParams {
        nb_threads: get_threads(matches),
        ..Default::default()
    };
    if let Some(coverage) = matches.get_one::<f64>("coverage") {
        params.coverage = *coverage;
    }
    if let Some(identity) = matches.get_one::<f64>("identity") {
        params.identity = *identity;
    }
    if let Some(identity) = matches.get_one::<f64>("protein_identity") {
        params.protein_identity = *identity;
    }
    if let Some(coverage) = matches.get_one::<f64>("protein_coverage") {
        params.protein_coverage = *coverage;
    }
    params.selector = if let Some(level) = matches.get_one::<f64>("occurrence") {
        LociSelector::Occurrence(*level)
    } else if let Some(path) = matches.get_one::<PathBuf>("loci") {
        LociSelector::List(read_loci_list(path)?)
    } else if let Some(name) = matches.get_one::<String>("preset") {
        LociSelector::List(preset_loci(name).ok_or_else(|| anyhow!("unknown preset {}, expecting mlst or virulence", name))?)
    } else {
        // scheme threshold of the database
        let db_params = DatabaseParams::reload_json(&database)?;
        LociSelector::Occurrence(db_params.get_occurrence_threshold())
    };
    log::info!("profiling parameters : {:?}", params);
    //
    let engine = BlastSearch::new(matches.get_one::<PathBuf>("blast_bin").cloned());
    engine.check().context("BLAST+ programs cannot be run")?;
    let summary = profiling(&input, &database, &output, genes.as_deref(), &params, &engine)?;
    println!(
        "profiled {} genomes : {} allele calls, {} novel alleles, {} failures, results in {:?}",
        summary.nb_genomes,
        summary.nb_calls,
        summary.nb_novel,
        summary.failures.len(),
        output
    );
    Ok(())
} // end of do_profile

fn main() -> anyhow::Result<()> {
    let _ = init_log();
    //
    let normalize_cmd = Command::new("normalize")
        .about("rename genomes and contigs with synthetic ids")
        .arg(path_arg("input", Some('i'), "input", "directory of genome fasta files"))
        .arg(path_arg("output", Some('o'), "output", "output directory"))
        .arg(threads_arg());
    //
    let noncds_cmd = Command::new("noncds")
        .about("index non coding features of gff3 annotations")
        .arg(path_arg("gff", None, "gff", "directory of gff3 files"))
        .arg(path_arg("output", Some('o'), "output", "output directory"));
    //
    let makedb_cmd = Command::new("makedb")
        .about("build a typing database from a pan-genome matrix")
        .arg(path_arg("matrix", Some('m'), "matrix", "gene presence/absence matrix (csv, or tsv)"))
        .arg(path_arg("genes", Some('g'), "genes", "directory of gene sequences, one fasta file by genome"))
        .arg(path_arg("output", Some('o'), "output", "database directory"))
        .arg(
            Arg::new("gff")
                .long("gff")
                .value_name("GFF_DIR")
                .help("directory of gff3 annotations, to index non coding features")
                .value_parser(clap::value_parser!(PathBuf))
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("occurrence")
                .long("occurrence")
                .value_name("PERCENT")
                .help("minimum occurrence (%) of a locus to enter the scheme [default 2.0]")
                .value_parser(clap::value_parser!(f64))
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("metadata_cols")
                .long("metadata-cols")
                .value_name("NB")
                .help("number of metadata columns before genome columns in the matrix [default 14]")
                .value_parser(clap::value_parser!(usize))
                .action(ArgAction::Set),
        )
        .arg(threads_arg());
    //
    let float_arg = |name: &'static str, long: &'static str, help: &'static str| {
        Arg::new(name)
            .long(long)
            .value_name("VALUE")
            .help(help)
            .value_parser(clap::value_parser!(f64))
            .action(ArgAction::Set)
    };
    let profile_cmd = Command::new("profile")
        .about("profile genomes against a typing database")
        .arg(path_arg("input", Some('i'), "input", "directory of genome fasta files"))
        .arg(path_arg("database", Some('d'), "database", "database directory"))
        .arg(path_arg("output", Some('o'), "output", "output directory"))
        .arg(
            Arg::new("genes")
                .long("genes")
                .value_name("GENES_DIR")
                .help("directory of predicted genes, named after the genome files")
                .value_parser(clap::value_parser!(PathBuf))
                .action(ArgAction::Set),
        )
        .arg(float_arg("coverage", "coverage", "minimum aligned coverage of reference for locus presence [default 0.5]"))
        .arg(float_arg("identity", "identity", "minimum identity (%) for locus presence [default 90]"))
        .arg(float_arg("protein_identity", "protein-identity", "minimum protein identity (%) for novel alleles [default 95]"))
        .arg(float_arg("protein_coverage", "protein-coverage", "minimum protein coverage (%) for novel alleles [default 90]"))
        .arg(float_arg("occurrence", "occurrence", "call alleles of scheme loci above this occurrence (%)"))
        .arg(
            Arg::new("loci")
                .long("loci")
                .value_name("FILE")
                .help("call alleles of the loci listed in file, one by line")
                .value_parser(clap::value_parser!(PathBuf))
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("preset")
                .long("preset")
                .value_name("NAME")
                .help("call alleles of a preset locus set : mlst, virulence")
                .action(ArgAction::Set),
        )
        .group(ArgGroup::new("selection").args(["occurrence", "loci", "preset"]).multiple(false))
        .arg(
            Arg::new("blast_bin")
                .long("blast-bin")
                .value_name("DIR")
                .help("directory of BLAST+ binaries, default is to look in PATH")
                .value_parser(clap::value_parser!(PathBuf))
                .action(ArgAction::Set),
        )
        .arg(threads_arg());
    //
    let matches = Command::new("wgmlst")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Whole genome allele typing : build a typing database, profile genomes against it")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(normalize_cmd)
        .subcommand(noncds_cmd)
        .subcommand(makedb_cmd)
        .subcommand(profile_cmd)
        .get_matches();
    //
    match matches.subcommand() {
        Some(("normalize", sub)) => do_normalize(sub),
        Some(("noncds", sub)) => do_noncds(sub),
        Some(("makedb", sub)) => do_makedb(sub),
        Some(("profile", sub)) => do_profile(sub),
        _ => Err(anyhow!("unknown subcommand")),
    }
} // end of main
