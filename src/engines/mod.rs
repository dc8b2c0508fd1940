//! Engine backends, each behind its own Cargo feature.
//!
//! | feature  | engine                                   |
//! |----------|------------------------------------------|
//! | `kokoro` | Kokoro-82M on ONNX Runtime with espeak-ng |

#[cfg(feature = "kokoro")]
pub mod kokoro;
