//! Control client for VDWall LVP video-wall processors.

pub mod address;
pub mod command;
pub mod options;
pub mod transport;

pub use address::{AddressError, DeviceAddress};
pub use command::{encode, Action, ActionKind, Command, EncodeError};
pub use options::{resolve_variables, OptionValue, RawOptions, ResolvedOptions, VariableResolver};
pub use transport::{ConnectionState, StatusObserver, Transport};
