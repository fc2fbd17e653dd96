//! Operation dispatch.
//!
//! Each known operation code maps to one [`OperationHandler`] in the
//! [`OperationTable`]. The [`Dispatcher`] runs the discriminant pass, looks the
//! handler up, bounds it with a timeout and turns its result into a sender
//! notification plus a broadcast.

pub mod chat;
pub mod dispatcher;
pub mod group;
pub mod outcome;
pub mod table;
pub mod user;

pub use dispatcher::{Dispatcher, FrameOutcome};
pub use outcome::{Addressing, OperationError, Outcome};
pub use table::{OperationHandler, OperationTable};
