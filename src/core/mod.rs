//! # Core Protocol Components
//!
//! Low-level packet types and framing.
//!
//! This module provides the foundation for the protocol: the envelope every
//! packet travels in, its payload variants, and the tokio codec that frames
//! envelopes over a byte stream.
//!
//! ## Wire Format
//! ```text
//! [Magic(4)] [Version(1)] [Length(4)] [Payload(N)]
//! ```
//!
//! ## Security
//! - Maximum packet size: 16MB (prevents memory exhaustion)
//! - Magic bytes prevent accidental misinterpretation
//! - Length validation before allocation

pub mod codec;
pub mod packet;
