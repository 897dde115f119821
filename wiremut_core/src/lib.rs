pub mod codec;
pub mod config;
pub mod diagnostics;
pub mod engine;
pub mod mutator;
pub mod plugin;
pub mod scratch;
pub mod validator;

pub use config::WiremutConfig;
pub use diagnostics::DiagnosticSink;
pub use engine::{MutationError, WireMutator};
pub use mutator::{AppendAlphabetMutator, Mutator, MutatorError};
pub use plugin::{CustomMutator, PLUGIN_API_VERSION, Plugin, PluginError};
pub use scratch::{Phase, ScratchBuffer, ScratchError};
pub use validator::{MAX_WIRE_SIZE, WireError, is_valid, validate};
