//! Fixed-layout kernel structures and typed views built on the codec.

pub mod link;
