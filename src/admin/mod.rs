//! Staff commands: parsing, the access guard, invoices, and handlers.

pub mod commands;
pub mod guard;
pub mod invoice;
pub mod parser;

pub use commands::{AdminCommand, CommandContext};
pub use guard::AccessGuard;
pub use invoice::Invoice;
pub use parser::{CommandLine, parse_command};
