#![cfg_attr(not(test), no_std)]

//! Storage arbitration and image gallery logic for the e-paper frame.
//!
//! Nothing in here touches hardware directly. Storage, decoding, the panel,
//! the frontlight and time all come in through traits so the whole render
//! loop runs on the host under test.

extern crate alloc;

pub mod arbiter;
pub mod command;
pub mod convert;
pub mod decode;
pub mod frame;
pub mod gallery;
pub mod pipeline;
pub mod splash;
pub mod storage;

#[cfg(test)]
pub(crate) mod testing;
