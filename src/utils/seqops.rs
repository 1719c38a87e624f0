//! small sequence operations : normalization, reverse complement and translation
//! with the bacterial genetic code (NCBI table 11).

use fxhash::FxHashMap;
use lazy_static::lazy_static;
use needletail::Sequence;

const BASES: [u8; 4] = [b'T', b'C', b'A', b'G'];

// amino acids in TCAG codon order, table 11 has the standard assignments
const TABLE11_AA: &[u8; 64] = b"FFLLSSSSYY**CC*WLLLLPPPPHHQQRRRRIIIMTTTTNNKKSSRRVVVVAAAADDEEGGGG";

lazy_static! {
    static ref CODON_TABLE: FxHashMap<[u8; 3], u8> = {
        let mut table = FxHashMap::default();
        let mut rank = 0;
        for b1 in BASES.iter() {
            for b2 in BASES.iter() {
                for b3 in BASES.iter() {
                    table.insert([*b1, *b2, *b3], TABLE11_AA[rank]);
                    rank += 1;
                }
            }
        }
        table
    };
}

/// uppercase and strip white spaces, this is the form in which sequences are stored in the catalogue
pub fn normalize_seq(seq: &[u8]) -> String {
    let normalized: String = seq
        .iter()
        .filter(|c| !c.is_ascii_whitespace())
        .map(|c| c.to_ascii_uppercase() as char)
        .collect();
    normalized
} // end of normalize_seq

/// reverse complement of a nucleotide sequence
pub fn reverse_complement(seq: &str) -> String {
    let bytes: &[u8] = seq.as_bytes();
    let revcomp = bytes.reverse_complement();
    String::from_utf8_lossy(&revcomp).into_owned()
}

/// translate a nucleotide sequence with table 11.
/// Stops are kept as '*', a codon with a non ACGT base gives 'X', a trailing incomplete codon is dropped.
pub fn translate(seq: &str) -> String {
    let bytes = seq.as_bytes();
    let mut peptide = String::with_capacity(bytes.len() / 3);
    for codon in bytes.chunks_exact(3) {
        let key = [
            codon[0].to_ascii_uppercase(),
            codon[1].to_ascii_uppercase(),
            codon[2].to_ascii_uppercase(),
        ];
        // U is accepted for T
        let key = key.map(|c| if c == b'U' { b'T' } else { c });
        let aa = CODON_TABLE.get(&key).copied().unwrap_or(b'X');
        peptide.push(aa as char);
    }
    if log::log_enabled!(log::Level::Trace) && bytes.len() % 3 != 0 {
        log::trace!("translate dropping {} trailing bases", bytes.len() % 3);
    }
    peptide
} // end of translate

// end of mod tests
