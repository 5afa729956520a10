/*!
 * Modbus/TCP.
 *
 * - [`adu`]: the MBAP framed application data unit.
 * - [`pdu`]: function and exception PDUs, discriminated on the error flag,
 *   the function code and the direction of travel.
 * - [`tag`]: the `AREA:ADDRESS[:TYPE][[COUNT]]` address grammar.
 * - [`driver`]: frame detector and [`wireflow_engine::ProtocolDriver`].
 */

pub mod adu;
pub mod driver;
pub mod pdu;
pub mod tag;
pub mod values;

pub use adu::ModbusTcpAdu;
pub use driver::{ModbusTcpDetector, ModbusTcpDriver};
pub use pdu::{ExceptionCode, FunctionCode, ModbusPdu};
pub use tag::{ModbusArea, ModbusTag};
