// Path: crates/sdo-api/src/service_info.rs
//! The service-info module capability interface (§9).
//!
//! A device service-info module produces one or more device-service-info
//! (DSI) payloads during `To2SndNextDsi` and consumes owner-service-info
//! (OSI) payloads during `To2RcvNextOsi`. The driver does not interpret
//! module payloads; it only sequences calls into whichever modules are
//! registered, in a stable order, start to end.

use sdo_types::ProtocolError;

/// The result of one `exec` call into a service-info module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceInfoOutcome {
    /// One payload to send (DSI) or the module's reaction to a received
    /// payload (OSI), plus the cursor value to pass on the next call.
    Payload { bytes: Vec<u8>, next_cursor: u64 },
    /// The module has nothing further to emit or needed nothing further
    /// from the owner; the driver advances to the next module.
    Done,
}

/// A device-side capability participating in TO2's service-info exchange.
pub trait ServiceInfoModule {
    /// The module's name, sent as the `active`/`devmod` key this module
    /// answers under.
    fn name(&self) -> &str;

    /// Called once before the first `exec`, in registration order.
    fn on_start(&mut self) -> Result<(), ProtocolError>;

    /// Produces the next DSI payload (during `To2SndNextDsi`, `inbound`
    /// `None`) or consumes an OSI payload already routed to this module
    /// (during `To2RcvNextOsi`, `inbound` the owner's bytes for this
    /// round), given the cursor this module returned last call (`0` on
    /// the first call). On the OSI path the returned `Payload.bytes` is
    /// ignored; only `next_cursor` and the `Done`/`Payload` distinction
    /// matter.
    fn exec(
        &mut self,
        message_type: &str,
        cursor: u64,
        inbound: Option<&[u8]>,
    ) -> Result<ServiceInfoOutcome, ProtocolError>;

    /// Called once after this module's last `exec`, before the driver
    /// moves on to the next module or to `To2SndDone`.
    fn on_end(&mut self) -> Result<(), ProtocolError>;
}
