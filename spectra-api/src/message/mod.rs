mod codec;
mod command;

pub use codec::{checksum, CodecError, Message, SEPARATOR};
pub use command::{CommandError, ControllerCommand, DeviceReport, ErrorCode, Keyword};
