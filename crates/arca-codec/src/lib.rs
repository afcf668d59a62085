//! Value codec for Arca archives.
//!
//! Converts native field values ([`Value`]) into JSON that survives a trip
//! through an archive unchanged, and back again given the field's declared
//! [`ValueKind`](arca_types::ValueKind). The codec is pure and stateless.
//!
//! | Kind        | Archive form                                   |
//! |-------------|------------------------------------------------|
//! | identifier  | hyphenated UUID string                         |
//! | timestamp   | RFC 3339 with explicit offset, exact fraction  |
//! | date        | `YYYY-MM-DD`                                   |
//! | decimal     | the decimal's own text (never a float)         |
//! | bytes       | standard base64 with padding                   |
//! | list / map  | JSON array / JSON object (keys sorted)         |
//!
//! `null` is accepted for every kind.

pub mod codec;
pub mod error;
pub mod value;

pub use codec::ValueCodec;
pub use error::{CodecError, CodecResult};
pub use value::{Decimal, Value};
