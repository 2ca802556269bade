//! Pipeline stages for image-to-PDF generation.
//!
//! Each submodule implements exactly one transformation step, orchestrated
//! by [`crate::generate::Pipeline`].
//!
//! ## Data Flow
//!
//! ```text
//! resolve ──▶ normalize ──▶ cover ──▶ assemble
//! (bytes)     (JPEG)       (browser)  (lopdf)
//! ```
//!
//! 1. [`resolve`]: turn an inline/data/remote/staged reference into bytes
//! 2. [`normalize`]: decode, bound to the max dimension, re-encode as JPEG;
//!    runs in `spawn_blocking`
//! 3. [`cover`]: print the one-page cover with a headless browser
//! 4. [`assemble`]: append two-image content pages to the cover PDF

pub mod assemble;
pub mod cover;
pub mod normalize;
pub mod resolve;
