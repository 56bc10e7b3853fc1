#![no_std]

//! ESP32-S3 adapters for the e-paper frame: SD card storage, the USB card
//! reader mux, the ROM JPEG decoder, the epdiy panel and the frontlight.

pub mod decoder;
pub mod platform;
pub mod storage;
