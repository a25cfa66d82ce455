#![crate_name = "grue"]

//! A Z-machine version 3 interpreter.
//!
//! The engine is the library: byte store, header, ZSCII codec, object
//! table, dictionary, instruction decoder, and the interpreter loop.
//! Terminal rendering lives behind the `Host` trait so the core never
//! touches the screen directly.

#[macro_use]
extern crate lazy_static;

pub mod dictionary;
pub mod display;
pub mod display_headless;
pub mod fault;
pub mod frame;
pub mod header;
pub mod host;
pub mod instruction;
pub mod interpreter;
pub mod memory;
pub mod opcode_tables;
pub mod snapshot;
pub mod text;
pub mod vm;
pub mod zobject;
pub mod zrand;
