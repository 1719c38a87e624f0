//! content based identity of sequences.
//!
//! An allele id is the sha256 digest (lowercase hex) of the normalized sequence: bytes are
//! uppercased and white spaces removed before hashing, so the same sequence gets the same
//! id whatever the genome, the file or the process it was read from.

use sha2::{Digest, Sha256};

/// length in chars of an allele id
pub const SEQID_LEN: usize = 64;

/// returns the allele id of a nucleotide (or protein) sequence
pub fn make_seqid(seq: &[u8]) -> String {
    let mut hasher = Sha256::new();
    // hash by chunks to avoid cloning long sequences
    let mut buf = Vec::<u8>::with_capacity(1024.min(seq.len()));
    for chunk in seq.chunks(1024) {
        buf.clear();
        buf.extend(
            chunk
                .iter()
                .filter(|c| !c.is_ascii_whitespace())
                .map(|c| c.to_ascii_uppercase()),
        );
        hasher.update(&buf);
    }
    format!("{:x}", hasher.finalize())
} // end of make_seqid

/// true if s has the shape of an allele id
pub fn is_seqid(s: &str) -> bool {
    s.len() == SEQID_LEN && s.bytes().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fxhash::FxHashSet;

    #[test]
    fn same_content_same_id() {
        let a = make_seqid(b"ATGAAACGCATTAGCACCACCATTACCACCACCATCACCATTACCACAGGTAACGGTGCGGGCTGA");
        let b = make_seqid(b"atgaaacgcattagcaccaccattaccaccaccatcaccattaccacaggtaacggtgcgggctga");
        let c = make_seqid(b"ATGAAACGCATTAGCACCACCATTACC\nACCACCATCACCATTACCACAGGTAACGGTGCGGGCTGA");
        assert_eq!(a, b);
        assert_eq!(a, c);
        assert!(is_seqid(&a));
    }

    #[test]
    fn distinct_content_distinct_id() {
        let corpus: Vec<Vec<u8>> = vec![
            b"ATG".to_vec(),
            b"ATGA".to_vec(),
            b"TAG".to_vec(),
            b"ATGAAATAG".to_vec(),
            b"ATGAAGTAG".to_vec(),
            b"CTATTTCAT".to_vec(),
            vec![b'A'; 3000],
            vec![b'A'; 3001],
        ];
        let ids: FxHashSet<String> = corpus.iter().map(|s| make_seqid(s)).collect();
        assert_eq!(ids.len(), corpus.len());
    }

    #[test]
    fn long_sequence_chunks_do_not_matter() {
        // a sequence crossing the 1024 chunk boundary with a new line exactly on it
        let mut with_nl = vec![b'C'; 1023];
        with_nl.push(b'\n');
        with_nl.extend(vec![b'G'; 500]);
        let mut plain = vec![b'C'; 1023];
        plain.extend(vec![b'G'; 500]);
        assert_eq!(make_seqid(&with_nl), make_seqid(&plain));
    }
} // end of mod tests
