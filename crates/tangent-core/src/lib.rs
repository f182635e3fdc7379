pub mod decoder;
pub mod matchers;
pub mod morse_map;
pub mod state;
pub mod types;

pub use decoder::{Decoder, DECODER};
pub use state::{DecoderState, EdgeLog, StateSnapshot};
pub use types::{ControlKey, KeyEdge, KeyLayer, KeyLocks, KeySym, MediaKey, ModifyLayer};
