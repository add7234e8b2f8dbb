//! Symbolic constant lookups: named enum members and Win32-style flag
//! compositions, loaded from either a host-supplied tuple enumeration or a
//! `.winmd` metadata blob, and queried by value or by call-argument
//! position during lifting and printing.

mod database;
mod desc;
mod error;
mod loaders;

pub use database::ConstantDatabase;
pub use desc::{ConstantMatch, EnumDesc};
pub use error::{ConstDbError, Result};
pub use loaders::{AssemblyEnumLoader, RawEnumDef, WinmdEnumLoader};
