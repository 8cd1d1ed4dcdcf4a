// Path: crates/sdo-protocol/src/handlers/mod.rs
//! The twenty message handlers (§4.4's abstract contracts), grouped by
//! phase. Each handler receives the context and the serializer and
//! returns the next state, or suspends by returning the same state it
//! was called with -- see [`crate::driver`] for the convention.

pub mod codec;
pub mod di;
pub mod to1;
pub mod to2;

/// Shorthand used by every handler function.
pub type HandlerResult = Result<sdo_types::ProtocolState, sdo_types::ProtocolError>;

/// True once `reader` has nothing buffered -- the signal a receive
/// handler uses to suspend without transitioning.
pub fn awaiting_input(reader: &dyn sdo_api::MessageReader) -> bool {
    !reader.has_buffered_block()
}
