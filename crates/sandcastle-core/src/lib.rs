//! sandcastle-core - wire model for the sandboxed console bridge
//!
//! Everything in this crate is engine-agnostic: the tagged encoding that the
//! sandbox side produces for every logged argument, the correlation metadata
//! stamped on each console event, and the host-side decoder that turns the
//! encoding back into navigable host values.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐   RawConsoleEvent    ┌──────────────────────┐
//! │  sandbox realm       │ ───────────────────▶ │  host relay          │
//! │  EncodedValue per arg│   (serde_json args)  │  decode → DecodedValue│
//! └──────────────────────┘                      └──────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use sandcastle_core::{decode, EncodedValue, Slot};
//!
//! let encoded = EncodedValue::Record {
//!     slot: Slot(0),
//!     entries: vec![
//!         ("nan".to_string(), EncodedValue::number(f64::NAN)),
//!         ("self".to_string(), EncodedValue::Reference { slot: Slot(0) }),
//!     ],
//! };
//!
//! let decoded = decode(&encoded).unwrap();
//! let root = decoded.view();
//! assert!(root.get("nan").unwrap().as_f64().unwrap().is_nan());
//! assert_eq!(root.get("self").unwrap().object_id(), root.object_id());
//! ```

pub mod correlation;
pub mod decode;
pub mod encoded;
pub mod error;
pub mod event;
pub mod host;
pub mod inspect;
pub mod level;

pub use correlation::{CorrelationMeta, Cursor, ExecutionId};
pub use decode::{decode, decode_lossy, decode_wire};
pub use encoded::{ArrayView, EncodedValue, NumberLiteral, Slot};
pub use error::{CoreError, DecodeError};
pub use event::{ConsoleEvent, ConsoleMessage, RawConsoleEvent};
pub use host::{DecodedValue, HostObject, HostValue, ObjectId, ValueView};
pub use level::ConsoleLevel;
