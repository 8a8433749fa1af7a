//! The XPath 1.0 subsystem: tokenizing is handled by [`crate::token`]; this
//! module owns everything from the expression tree onward.

pub mod ast;
pub mod eval;
pub mod functions;
pub mod pcb;
pub mod result;

pub use eval::evaluate;
pub use pcb::{Pcb, PcbSource};
pub use result::XPathResult;
