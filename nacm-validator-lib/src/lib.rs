//! NACM (RFC 8341) access control plus the XPath 1.0 and YANG tokenizer
//! core it is built on.
//!
//! The public surface mirrors the four layers the design notes describe:
//! lexing ([`token`]) and schema-nodeid resolution ([`schema`]) feed the
//! XPath subsystem ([`xpath`]), which the NACM engine ([`nacm`]) drives
//! against a live datastore ([`value`]) to answer the `*_allowed`
//! questions. [`yin`] and [`runstack`] are the two
//! satellite components: YIN/YANG conversion and the line-oriented
//! scripting shell the CLI uses as a test harness.

pub mod error;
pub mod nacm;
pub mod runstack;
pub mod schema;
pub mod token;
pub mod value;
pub mod xpath;
pub mod yin;

pub use error::Error;
pub use nacm::{Access, AccessMode, EditOp, Engine, NacmCache, NacmConfig, NacmState};
pub use value::{Snapshot, ValueData, ValueId, ValueNode, ValueTree};
pub use xpath::{evaluate, Pcb, PcbSource, XPathResult};
