//! # stacklang
//! A small PostScript-like, stack-based language.
//!
//! Source text is split into whitespace-separated tokens which are fed one at
//! a time to a [`vm::Machine`]. The machine keeps an operand stack, a chain of
//! lexical scopes and a stack of block literals being captured, and reports
//! every change of that state as an [`vm::Event`], so an embedding
//! application can watch a program evolve one step at a time.
//!
//! ```text
//! /x 10 def
//! /y { 20 } def
//! /xy { x y + } def
//! xy x * puts
//! ```
//!
//! Built-in operations are `+ - * / < if def exch puts`. Everything else is
//! defined with `def`. For running a whole program at once use [`vm::run`];
//! for observing it step by step iterate a [`StackLang`].
pub mod config;
pub mod driver;
pub mod ops;
pub mod parser;
pub mod value;
pub mod vm;

pub use driver::StackLang;
