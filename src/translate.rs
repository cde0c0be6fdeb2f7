//! Nucleotide to protein translation for materialized strains

/// Standard genetic code, indexed by codon with bases ordered T, C, A, G
const CODE: &[u8; 64] = b"FFLLSSSSYY**CC*WLLLLPPPPHHQQRRRRIIIMTTTTNNKKSSRRVVVVAAAADDEEGGGG";

fn base_index(base: u8) -> Option<usize> {
    match base.to_ascii_uppercase() {
        b'T' | b'U' => Some(0),
        b'C' => Some(1),
        b'A' => Some(2),
        b'G' => Some(3),
        _ => None,
    }
}

/// Translate one codon. A gap anywhere in the codon gives `-`; any other base
/// outside ACGTU gives `X`.
pub fn translate_codon(codon: &[u8]) -> u8 {
    if codon.contains(&b'-') {
        return b'-';
    }
    let mut index = 0;
    for &base in codon {
        match base_index(base) {
            Some(i) => index = index * 4 + i,
            None => return b'X',
        }
    }
    CODE[index]
}

/// Translate in frame from the first base; a trailing partial codon is dropped.
pub fn translate(bases: &str) -> String {
    bases
        .as_bytes()
        .chunks_exact(3)
        .map(|codon| translate_codon(codon) as char)
        .collect()
}

/// Residue-wise comparison with `X` matching anything
pub fn proteins_match(a: &str, b: &str) -> bool {
    a.len() == b.len()
        && a
            .bytes()
            .zip(b.bytes())
            .all(|(x, y)| x == b'X' || y == b'X' || x.eq_ignore_ascii_case(&y))
}
