// Path: crates/sdo-api/src/serializer.rs
//! The wire serializer contract (§4.3).
//!
//! The core never touches transport bytes directly; it drives a writer to
//! build each outbound message field by field and a reader to pull the
//! next inbound message off whatever buffering the transport performs.
//! Both traits are object-shaped rather than typed per message: the
//! protocol driver treats every message body as an ordered sequence of
//! tagged fields, matching the original wire encoding's self-describing
//! object/array structure.

use sdo_types::ProtocolError;

/// Builds one outbound protocol message.
///
/// A single `MessageWriter` is used for exactly one message: `begin_block`
/// opens it, the field-writing calls fill it in declaration order, and
/// `end_object` closes the outermost object before the driver hands the
/// message to the transport.
pub trait MessageWriter {
    /// Opens a new nested object. Matches one `end_object` call.
    fn begin_object(&mut self) -> Result<(), ProtocolError>;

    /// Closes the most recently opened object.
    fn end_object(&mut self) -> Result<(), ProtocolError>;

    /// Writes a field tag (key) into the currently open object.
    fn write_tag(&mut self, tag: &str) -> Result<(), ProtocolError>;

    /// Writes an unsigned integer value.
    fn write_uint(&mut self, value: u64) -> Result<(), ProtocolError>;

    /// Writes a UTF-8 string value.
    fn write_string(&mut self, value: &str) -> Result<(), ProtocolError>;

    /// Writes a byte-string value (nonces, signatures, keys).
    fn write_bytes(&mut self, value: &[u8]) -> Result<(), ProtocolError>;

    /// Opens the message body and tags it with its numeric message type
    /// (the original `msgN` discriminant, see [`sdo_types::ProtocolState`]).
    fn begin_block(&mut self, message_type: u32) -> Result<(), ProtocolError>;
}

/// Reads one inbound protocol message at a time.
///
/// `has_buffered_block` lets the driver distinguish "nothing has arrived
/// yet" (suspend, §5) from "a complete message is ready to decode" without
/// blocking on the transport.
pub trait MessageReader {
    /// True if a complete message body is buffered and ready for
    /// `next_block`.
    fn has_buffered_block(&self) -> bool;

    /// Consumes the next buffered message, returning its numeric message
    /// type, or `Ok(None)` if `has_buffered_block` would have returned
    /// `false`.
    fn next_block(&mut self) -> Result<Option<u32>, ProtocolError>;

    /// Opens a nested object within the current message body.
    fn begin_object(&mut self) -> Result<(), ProtocolError>;

    /// Closes the most recently opened object.
    fn end_object(&mut self) -> Result<(), ProtocolError>;

    /// Reads the next field tag (key) from the currently open object.
    fn read_tag(&mut self) -> Result<String, ProtocolError>;

    /// Reads the next field as an unsigned integer.
    fn read_uint(&mut self) -> Result<u64, ProtocolError>;

    /// Reads the next field as a UTF-8 string.
    fn read_string(&mut self) -> Result<String, ProtocolError>;

    /// Reads the next field as a byte string.
    fn read_bytes(&mut self) -> Result<Vec<u8>, ProtocolError>;
}
