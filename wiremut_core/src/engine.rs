//! The per-worker mutation engine.
//!
//! A [`WireMutator`] owns one PRNG and one [`ScratchBuffer`] per [`Phase`].
//! Both operations validate first, size the phase's scratch buffer, then
//! decode into it. `fuzz` additionally appends the strategy's suffix and
//! re-encodes in place. Results borrow the scratch buffer and stay valid
//! until the next call on the same instance.

use crate::codec::{self, HEADER_SIZE};
use crate::config::WiremutConfig;
use crate::diagnostics::DiagnosticSink;
use crate::mutator::{AppendAlphabetMutator, Mutator, MutatorError};
use crate::scratch::{Phase, ScratchBuffer, ScratchError};
use crate::validator::{self, MAX_WIRE_SIZE, WireError};
use log::Level;
use rand_chacha::ChaCha8Rng;
use rand_core::SeedableRng;
use thiserror::Error;

/// Why an operation produced no output.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MutationError {
    #[error("Invalid wire encoding: {0}")]
    InvalidInput(#[from] WireError),

    #[error("Scratch buffer allocation failed: {0}")]
    Allocation(#[from] ScratchError),

    /// Even the unmutated input does not fit the host's output cap.
    #[error("Output of {needed} bytes would exceed the maximum of {max} bytes")]
    ExceedsMaxSize { needed: usize, max: usize },
}

/// Mutator state for a single fuzzing worker.
pub struct WireMutator<M = AppendAlphabetMutator> {
    rng: ChaCha8Rng,
    mutator: M,
    fuzz_buf: ScratchBuffer,
    post_process_buf: ScratchBuffer,
    sink: DiagnosticSink,
    fuzz_count: u32,
    last_append: Option<usize>,
}

impl WireMutator<AppendAlphabetMutator> {
    /// Builds an instance with the append strategy described by `config`.
    pub fn new(seed: u32, config: &WiremutConfig) -> Result<Self, MutatorError> {
        let mutator = AppendAlphabetMutator::new(config.mutator.alphabet.as_bytes())?;
        let sink = DiagnosticSink::from_settings(&config.diagnostics);
        Ok(Self::with_mutator(seed, mutator, sink).with_fuzz_count(config.mutator.fuzz_count))
    }
}

impl<M: Mutator<ChaCha8Rng>> WireMutator<M> {
    pub fn with_mutator(seed: u32, mutator: M, sink: DiagnosticSink) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(u64::from(seed)),
            mutator,
            fuzz_buf: ScratchBuffer::new(Phase::Fuzz),
            post_process_buf: ScratchBuffer::new(Phase::PostProcess),
            sink,
            fuzz_count: 1,
            last_append: None,
        }
    }

    pub fn with_fuzz_count(mut self, fuzz_count: u32) -> Self {
        self.fuzz_count = fuzz_count.max(1);
        self
    }

    pub fn sink(&self) -> &DiagnosticSink {
        &self.sink
    }

    pub fn scratch(&self, phase: Phase) -> &ScratchBuffer {
        match phase {
            Phase::Fuzz => &self.fuzz_buf,
            Phase::PostProcess => &self.post_process_buf,
        }
    }

    /// Number of `fuzz` calls the host should make per queue entry.
    pub fn fuzz_count(&self, _wire: &[u8]) -> u32 {
        self.fuzz_count
    }

    /// Describes the most recent successful `fuzz` call, e.g. `append_3`.
    pub fn describe(&self) -> Option<String> {
        self.last_append.map(|count| format!("append_{count}"))
    }

    /// Mutates a wire buffer, returning the re-encoded result or `None`.
    ///
    /// The result never exceeds `max_output_size`.
    pub fn fuzz(&mut self, wire: &[u8], max_output_size: usize) -> Option<&[u8]> {
        match self.run_fuzz(wire, max_output_size) {
            Ok(()) => Some(self.fuzz_buf.as_slice()),
            Err(err) => {
                self.report(Phase::Fuzz, &err);
                None
            }
        }
    }

    pub fn try_fuzz(&mut self, wire: &[u8], max_output_size: usize) -> Result<&[u8], MutationError> {
        self.run_fuzz(wire, max_output_size)?;
        Ok(self.fuzz_buf.as_slice())
    }

    /// Strips the framing from a wire buffer. A zero-length payload is
    /// `Some(&[])`, never `None`.
    pub fn post_process(&mut self, wire: &[u8]) -> Option<&[u8]> {
        match self.run_post_process(wire) {
            Ok(()) => Some(self.post_process_buf.as_slice()),
            Err(err) => {
                self.report(Phase::PostProcess, &err);
                None
            }
        }
    }

    pub fn try_post_process(&mut self, wire: &[u8]) -> Result<&[u8], MutationError> {
        self.run_post_process(wire)?;
        Ok(self.post_process_buf.as_slice())
    }

    fn run_fuzz(&mut self, wire: &[u8], max_output_size: usize) -> Result<(), MutationError> {
        self.fuzz_buf.clear();
        self.sink.emit(
            Level::Debug,
            format_args!("[mutator] Called fuzz with buffer of size {}", wire.len()),
        );
        self.sink.dump(Level::Debug, wire);

        let declared = validator::validate_with(wire, &mut self.sink)? as usize;
        let unmutated = HEADER_SIZE + declared;
        if unmutated > max_output_size {
            return Err(MutationError::ExceedsMaxSize {
                needed: unmutated,
                max: max_output_size,
            });
        }

        let strategy = self.mutator.name();
        let suffix = self.mutator.draw_suffix(codec::payload(wire), &mut self.rng);
        let room = max_output_size.min(MAX_WIRE_SIZE) - unmutated;
        let append = suffix.len().min(room);
        if append < suffix.len() {
            self.sink.emit(
                Level::Debug,
                format_args!(
                    "[mutator] {} append capped from {} to {} bytes by max size {}",
                    strategy,
                    suffix.len(),
                    append,
                    max_output_size
                ),
            );
        }
        let suffix = &suffix[..append];

        let total = unmutated + append;
        self.fuzz_buf.ensure_capacity(total)?;
        let region = &mut self.fuzz_buf.region_mut()[..total];
        let decoded = codec::decode(wire, region);
        region[decoded..decoded + append].copy_from_slice(suffix);
        let encoded = codec::encode_in_place(region, decoded + append);
        self.fuzz_buf.set_len(encoded);
        self.last_append = Some(append);

        self.sink.emit(
            Level::Debug,
            format_args!("[mutator] Generated mutated data of size {encoded}"),
        );
        self.sink.dump(Level::Debug, self.fuzz_buf.as_slice());
        Ok(())
    }

    fn run_post_process(&mut self, wire: &[u8]) -> Result<(), MutationError> {
        self.post_process_buf.clear();
        self.sink.emit(
            Level::Debug,
            format_args!("[mutator] Called post_process with buffer of size {}", wire.len()),
        );
        self.sink.dump(Level::Debug, wire);

        let declared = validator::validate_with(wire, &mut self.sink)? as usize;
        self.post_process_buf.ensure_capacity(declared)?;
        let decoded = codec::decode(wire, self.post_process_buf.region_mut());
        self.post_process_buf.set_len(decoded);

        self.sink.emit(
            Level::Debug,
            format_args!("[mutator] Generated post-process data of size {decoded}"),
        );
        self.sink.dump(Level::Debug, self.post_process_buf.as_slice());
        Ok(())
    }

    fn report(&mut self, phase: Phase, err: &MutationError) {
        // Validation failures were already reported by the validator.
        let level = match err {
            MutationError::InvalidInput(_) => Level::Debug,
            MutationError::Allocation(_) | MutationError::ExceedsMaxSize { .. } => Level::Warn,
        };
        self.sink
            .emit(level, format_args!("[mutator] {phase} produced no output: {err}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::LevelFilter;
    use rand::Rng;

    /// Always appends the first `count` alphabet characters.
    struct FixedAppend {
        inner: AppendAlphabetMutator,
        count: usize,
    }

    impl FixedAppend {
        fn new(count: usize) -> Self {
            Self {
                inner: AppendAlphabetMutator::default(),
                count,
            }
        }
    }

    impl<R: Rng + ?Sized> Mutator<R> for FixedAppend {
        fn name(&self) -> &'static str {
            "FixedAppend"
        }

        fn draw_suffix(&mut self, _payload: &[u8], _rng: &mut R) -> &[u8] {
            &self.inner.alphabet()[..self.count]
        }
    }

    fn fixed(count: usize) -> WireMutator<FixedAppend> {
        WireMutator::with_mutator(0, FixedAppend::new(count), DiagnosticSink::disabled())
    }

    const ABC: [u8; 7] = [0, 0, 0, 3, b'a', b'b', b'c'];

    #[test]
    fn fuzz_appends_alphabet_prefix_and_reencodes() {
        let mut engine = fixed(2);
        let out = engine.fuzz(&ABC, 1024).unwrap();
        assert_eq!(out, &[0, 0, 0, 5, b'a', b'b', b'c', b'0', b'1']);
        assert_eq!(engine.describe().as_deref(), Some("append_2"));
    }

    #[test]
    fn fuzz_output_decodes_to_extended_payload() {
        let mut engine = fixed(2);
        let out = engine.fuzz(&ABC, 1024).unwrap().to_vec();
        assert_eq!(codec::payload(&out), b"abc01");
        assert!(validator::is_valid(&out));
    }

    #[test]
    fn fuzz_rejects_mismatched_prefix() {
        let mut engine = fixed(2);
        let bad = [0, 0, 0, 4, b'a', b'b', b'c'];
        assert!(engine.fuzz(&bad, 1024).is_none());
        assert!(matches!(
            engine.try_fuzz(&bad, 1024),
            Err(MutationError::InvalidInput(WireError::SizeMismatch { .. }))
        ));
        assert_eq!(engine.describe(), None);
    }

    #[test]
    fn post_process_strips_prefix() {
        let mut engine = fixed(0);
        assert_eq!(engine.post_process(&ABC), Some(&b"abc"[..]));
    }

    #[test]
    fn post_process_rejects_mismatched_prefix() {
        let mut engine = fixed(0);
        assert!(engine.post_process(&[0, 0, 0, 4, b'a', b'b', b'c']).is_none());
    }

    #[test]
    fn post_process_of_empty_payload_is_some_empty() {
        let mut engine = fixed(0);
        let out = engine.post_process(&[0, 0, 0, 0]);
        assert_eq!(out, Some(&[][..]));
    }

    #[test]
    fn append_is_capped_by_max_output_size() {
        let mut engine = fixed(10);
        let out = engine.fuzz(&ABC, 9).unwrap();
        assert_eq!(out, &[0, 0, 0, 5, b'a', b'b', b'c', b'0', b'1']);
        assert_eq!(engine.describe().as_deref(), Some("append_2"));
    }

    #[test]
    fn input_larger_than_max_output_size_produces_no_output() {
        let mut engine = fixed(1);
        assert_eq!(
            engine.try_fuzz(&ABC, 6),
            Err(MutationError::ExceedsMaxSize { needed: 7, max: 6 })
        );
        assert!(engine.fuzz(&ABC, 6).is_none());
    }

    #[test]
    fn scratch_buffers_are_reused_and_never_shrink() {
        let mut engine = fixed(3);
        let long = {
            let mut wire = Vec::new();
            codec::encode(&[b'q'; 100], &mut wire);
            wire
        };
        engine.fuzz(&long, 4096).unwrap();
        let grown = engine.scratch(Phase::Fuzz).capacity();
        assert!(grown >= 107);

        let out = engine.fuzz(&ABC, 4096).unwrap().to_vec();
        assert_eq!(out, vec![0, 0, 0, 6, b'a', b'b', b'c', b'0', b'1', b'2']);
        assert_eq!(engine.scratch(Phase::Fuzz).capacity(), grown);
        assert_eq!(engine.scratch(Phase::PostProcess).capacity(), 0);
    }

    #[test]
    fn failed_call_leaves_no_stale_output() {
        let mut engine = fixed(1);
        engine.fuzz(&ABC, 64).unwrap();
        assert!(engine.fuzz(&[0, 0, 0], 64).is_none());
        assert!(engine.scratch(Phase::Fuzz).is_empty());
    }

    #[test]
    fn same_seed_yields_same_outputs() {
        let config = WiremutConfig::default();
        let mut a = WireMutator::new(99, &config).unwrap();
        let mut b = WireMutator::new(99, &config).unwrap();
        let mut wire_a = ABC.to_vec();
        let mut wire_b = ABC.to_vec();

        for _ in 0..32 {
            wire_a = a.fuzz(&wire_a, 1 << 16).unwrap().to_vec();
            wire_b = b.fuzz(&wire_b, 1 << 16).unwrap().to_vec();
            assert_eq!(wire_a, wire_b);
        }
    }

    #[test]
    fn diagnostics_follow_configured_level() {
        let sink = DiagnosticSink::capturing(LevelFilter::Debug, true);
        let mut engine = WireMutator::with_mutator(0, FixedAppend::new(1), sink);
        engine.fuzz(&ABC, 64).unwrap();
        let lines = engine.sink().captured();
        assert!(lines[0].contains("Called fuzz with buffer of size 7"));
        assert!(lines.iter().any(|l| l.contains("Generated mutated data of size 8")));
        assert!(lines.iter().any(|l| l.starts_with("  0000  00 00 00 04 61 62 63 30")));

        let quiet = DiagnosticSink::capturing(LevelFilter::Warn, true);
        let mut engine = WireMutator::with_mutator(0, FixedAppend::new(1), quiet);
        engine.fuzz(&ABC, 64).unwrap();
        assert!(engine.sink().captured().is_empty());
        engine.fuzz(&[0, 0, 0, 9], 64);
        assert_eq!(engine.sink().captured().len(), 1);
    }

    #[test]
    fn configured_fuzz_count_is_reported() {
        let mut config = WiremutConfig::default();
        config.mutator.fuzz_count = 3;
        let engine = WireMutator::new(0, &config).unwrap();
        assert_eq!(engine.fuzz_count(&ABC), 3);
    }
}
