use crate::CoreError;

pub const DEFAULT_TRANSLATION_TABLE: u8 = 11;

const AMINO_ACIDS: &[u8; 64] = b"FFLLSSSSYY**CC*WLLLLPPPPHHQQRRRRIIIMTTTTNNKKSSRRVVVVAAAADDEEGGGG";
const STANDARD_STARTS: &[u8; 64] = b"---M------**--*----M---------------M----------------------------";
const BACTERIAL_STARTS: &[u8; 64] = b"---M------**--*----M------------MMMM---------------M------------";

fn base_index(base: u8) -> Option<usize> {
    match base {
        b'T' | b'U' => Some(0),
        b'C' => Some(1),
        b'A' => Some(2),
        b'G' => Some(3),
        _ => None,
    }
}

fn codon_index(codon: &[u8]) -> Option<usize> {
    match codon {
        [first, second, third] => {
            Some(base_index(*first)? * 16 + base_index(*second)? * 4 + base_index(*third)?)
        }
        _ => None,
    }
}

fn starts_for(table: u8) -> Result<&'static [u8; 64], CoreError> {
    match table {
        1 => Ok(STANDARD_STARTS),
        11 => Ok(BACTERIAL_STARTS),
        other => Err(CoreError::Translation(format!("unsupported translation table {other}"))),
    }
}

/// Translate a complete coding sequence.
///
/// The first codon must be a valid start codon for `table` and is always read
/// as methionine; the last codon must be a stop codon and is not included in
/// the result. Codons containing ambiguous bases translate to `X`.
///
/// # Errors
/// Returns [`CoreError::Translation`] when the table is unsupported, the length
/// is not a multiple of three, or the start, stop, or internal stop rules are
/// violated.
pub fn translate_cds(sequence: &str, table: u8) -> Result<String, CoreError> {
    let starts = starts_for(table)?;
    let bases = sequence.trim().to_ascii_uppercase().into_bytes();
    if bases.is_empty() {
        return Err(CoreError::Translation("sequence is empty".to_string()));
    }
    if bases.len() % 3 != 0 {
        return Err(CoreError::Translation(format!(
            "sequence length {} is not a multiple of three",
            bases.len()
        )));
    }

    let codons = bases.chunks(3).collect::<Vec<_>>();
    let last = codons.len() - 1;
    let mut protein = String::with_capacity(last);

    for (position, codon) in codons.iter().enumerate() {
        let index = codon_index(codon);
        if position == 0 {
            match index {
                Some(index) if starts[index] == b'M' => {
                    protein.push('M');
                    continue;
                }
                _ => {
                    return Err(CoreError::Translation(format!(
                        "first codon {} is not a start codon",
                        String::from_utf8_lossy(codon)
                    )))
                }
            }
        }

        let residue = index.map_or(b'X', |index| AMINO_ACIDS[index]);
        if position == last {
            if residue != b'*' {
                return Err(CoreError::Translation(format!(
                    "final codon {} is not a stop codon",
                    String::from_utf8_lossy(codon)
                )));
            }
        } else if residue == b'*' {
            return Err(CoreError::Translation(format!(
                "in-frame stop codon at codon {}",
                position + 1
            )));
        } else {
            protein.push(char::from(residue));
        }
    }

    Ok(protein)
}

fn complement(base: u8) -> u8 {
    match base {
        b'A' => b'T',
        b'T' | b'U' => b'A',
        b'C' => b'G',
        b'G' => b'C',
        b'R' => b'Y',
        b'Y' => b'R',
        b'K' => b'M',
        b'M' => b'K',
        b'B' => b'V',
        b'V' => b'B',
        b'D' => b'H',
        b'H' => b'D',
        b'a' => b't',
        b't' | b'u' => b'a',
        b'c' => b'g',
        b'g' => b'c',
        other => other,
    }
}

#[must_use]
pub fn reverse_complement(sequence: &str) -> String {
    sequence.bytes().rev().map(|base| char::from(complement(base))).collect()
}

/// GC percentage of a nucleotide sequence, rounded to four decimals.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn gc_percent(sequence: &str) -> f64 {
    if sequence.is_empty() {
        return 0.0;
    }
    let gc = sequence.bytes().filter(|base| matches!(base, b'G' | b'C' | b'g' | b'c' | b'S' | b's')).count();
    let percent = gc as f64 / sequence.len() as f64 * 100.0;
    (percent * 10_000.0).round() / 10_000.0
}
