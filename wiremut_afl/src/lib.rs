//! AFL++ custom mutator exposing the length-prefix [`wiremut_core::Plugin`].
//!
//! Load with `AFL_CUSTOM_MUTATOR_LIBRARY=libwiremut_afl.so`. Set
//! `WIREMUT_CONFIG` to a TOML file to change the alphabet or turn on
//! diagnostics.

wiremut_core::export_mutator!(wiremut_core::Plugin);
