//! # Contracts
//!
//! Frozen interface contracts shared by every crate of the appliance: the
//! decoded meter `Reading`, configuration sections, and the traits at the
//! seams to external collaborators (sources, sinks, actuators).
//! All business crates depend on this crate, reverse dependencies are prohibited.
//!
//! ## Time Model
//! - `Reading::timestamp` is the meter's own wall-clock time (with UTC offset)
//! - Hold timers and file ages use a monotonic [`Clock`], never the meter time

mod actuator;
mod clock;
mod config;
mod error;
mod load;
mod reading;
mod sink;
mod source;
mod units;

pub use actuator::*;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::*;
pub use error::*;
pub use load::*;
pub use reading::*;
pub use sink::*;
pub use source::*;
pub use units::ByteSize;
