//! Provider code generation.
//!
//! A code is an opaque printable string drawn from a fixed alphabet, grouped
//! with `-` separators. Two historical schemes exist; this deployment runs
//! [`CodeScheme::V2`] (see DESIGN.md for the choice), but `V1` stays compiled
//! in and tested since both appear in the source this was distilled from.

use rand::{rngs::OsRng, RngCore};

const V1_ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const V2_ALPHABET: &[u8] = b"23456789ABCDEFGHJKLMNPQRSTUVWXYZ";

/// The code-minting scheme in effect. `ACTIVE` is what the relay actually
/// uses; `V1` is retained only so its length and alphabet stay tested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeScheme {
    V1,
    V2,
}

impl CodeScheme {
    pub const ACTIVE: CodeScheme = CodeScheme::V2;

    fn alphabet(self) -> &'static [u8] {
        match self {
            CodeScheme::V1 => V1_ALPHABET,
            CodeScheme::V2 => V2_ALPHABET,
        }
    }

    fn group_sizes(self) -> &'static [usize] {
        match self {
            CodeScheme::V1 => &[3, 3, 3],
            CodeScheme::V2 => &[4, 4, 4, 4],
        }
    }

    /// Total character length including `-` separators, e.g. 19 for V2.
    pub fn expected_len(self) -> usize {
        let groups = self.group_sizes();
        let symbols: usize = groups.iter().sum();
        symbols + groups.len() - 1
    }

    /// Mint a fresh code: draw random symbols from a CSPRNG, uniformly over
    /// the alphabet via rejection sampling, and lay them out in groups.
    pub fn generate(self) -> String {
        let alphabet = self.alphabet();
        let groups = self.group_sizes();
        let total_symbols: usize = groups.iter().sum();

        let mut symbols = Vec::with_capacity(total_symbols);
        let mut rng = OsRng;
        while symbols.len() < total_symbols {
            let idx = uniform_index(&mut rng, alphabet.len());
            symbols.push(alphabet[idx]);
        }

        let mut out = String::with_capacity(self.expected_len());
        let mut cursor = 0;
        for (i, &len) in groups.iter().enumerate() {
            if i > 0 {
                out.push('-');
            }
            out.push_str(std::str::from_utf8(&symbols[cursor..cursor + len]).unwrap());
            cursor += len;
        }
        out
    }
}

/// Reject-sample a uniform index in `[0, bound)` from a CSPRNG, avoiding the
/// modulo bias that a plain `rng.next_u32() % bound` would introduce when
/// `bound` isn't a power of two.
fn uniform_index(rng: &mut OsRng, bound: usize) -> usize {
    debug_assert!(bound > 0 && bound <= u32::MAX as usize);
    let bound = bound as u32;
    let zone = (u32::MAX / bound) * bound;
    loop {
        let v = rng.next_u32();
        if v < zone {
            return (v % bound) as usize;
        }
    }
}
