use rand::Rng;
use thiserror::Error;

/// The characters the default append strategy draws from, in order.
pub const DEFAULT_ALPHABET: &[u8] = b"0123456789ABCDEF";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MutatorError {
    #[error("Append alphabet must not be empty")]
    EmptyAlphabet,
}

/// A `Mutator` decides how a decoded payload grows on each `fuzz` call.
///
/// Strategies are append-only: they hand back the bytes to place right after
/// the decoded payload and never rewrite the payload itself. The engine may
/// keep only a prefix of the returned suffix when the host's output cap
/// leaves no room for all of it.
///
/// # Type Parameters
/// * `R`: The type of random number generator used for mutation decisions.
pub trait Mutator<R: Rng + ?Sized> {
    /// A short, stable name used in diagnostics.
    fn name(&self) -> &'static str;

    /// Draws the suffix to append to `payload`.
    ///
    /// # Arguments
    /// * `payload`: The decoded payload about to be mutated.
    /// * `rng`: The instance's random number generator. Implementations must
    ///   draw from it deterministically so a fixed seed replays the same
    ///   mutation sequence.
    fn draw_suffix(&mut self, payload: &[u8], rng: &mut R) -> &[u8];
}

/// Appends the first `k` characters of a fixed alphabet, with `k` drawn
/// uniformly from `[0, alphabet.len())`.
///
/// The characters themselves are never random; only the count is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendAlphabetMutator {
    alphabet: Vec<u8>,
}

impl AppendAlphabetMutator {
    pub fn new(alphabet: impl Into<Vec<u8>>) -> Result<Self, MutatorError> {
        let alphabet = alphabet.into();
        if alphabet.is_empty() {
            return Err(MutatorError::EmptyAlphabet);
        }
        Ok(Self { alphabet })
    }

    pub fn alphabet(&self) -> &[u8] {
        &self.alphabet
    }
}

impl Default for AppendAlphabetMutator {
    fn default() -> Self {
        Self {
            alphabet: DEFAULT_ALPHABET.to_vec(),
        }
    }
}

impl<R: Rng + ?Sized> Mutator<R> for AppendAlphabetMutator {
    fn name(&self) -> &'static str {
        "AppendAlphabetMutator"
    }

    fn draw_suffix(&mut self, _payload: &[u8], rng: &mut R) -> &[u8] {
        let count = rng.random_range(0..self.alphabet.len());
        &self.alphabet[..count]
    }
}
