//! Background pumps that drive one WebSocket connection.

pub(crate) mod read;
pub(crate) mod write;
