//! signal-db: message/signal definitions and the pure frame codec
//!
//! A [`SignalDatabase`] is built once (usually from a YAML descriptor) and then shared
//! read-only. [`decode`] and [`encode`] are pure functions over a [`MessageDef`] and a
//! payload; they hold no state and can run concurrently from any thread.

mod types;
pub use types::*;

mod error;
pub use error::{DatabaseError, DecodeError, EncodeError};

mod layout;
pub use layout::{BitLayout, BitSpan};

mod database;
pub use database::{SignalDatabase, FALLBACK_ID_MASKS};

mod loader;
pub use loader::{load_database_dir, load_database_file, parse_database_json, parse_database_yaml};

mod decode;
pub use decode::{decode, decode_signal, decode_values};

mod encode;
pub use encode::{encode, encode_values, physical_to_raw};
