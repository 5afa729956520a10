/*!
 * DL/T 645-2007 electricity meters.
 *
 * - [`control`]: meter address, control code and error status.
 * - [`bcd`]: packed BCD values with an optional sign bit.
 * - [`frame`]: the frame with its wake-up preamble, scrambled data field and
 *   byte-sum checksum.
 * - [`tag`]: the `IDENTIFIER[:FORMAT]` address grammar.
 * - [`driver`]: frame detector and [`wireflow_engine::ProtocolDriver`].
 */

pub mod bcd;
pub mod control;
pub mod driver;
pub mod frame;
pub mod tag;

pub use control::{ControlCode, Dlt645Function, ErrorStatus, MeterAddress};
pub use driver::Dlt645Driver;
pub use frame::{Dlt645Body, Dlt645Detector, Dlt645Frame};
pub use tag::{Dlt645Format, Dlt645Tag};
