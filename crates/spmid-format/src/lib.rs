//! Binary decoding of the SPMID container format and its raw `Note`/`Track`
//! data model (§4.1, §6.1).
//!
//! ```rust,no_run
//! let bytes: &[u8] = &[];
//! match spmid_format::decode(bytes) {
//!     Ok(tracks) => println!("decoded {} tracks", tracks.len()),
//!     Err(e) => eprintln!("decode failed: {e}"),
//! }
//! ```

pub mod decode;
pub mod note;

pub use decode::{decode, encode, DecodeError};
pub use note::{Note, Sample, Track};
