// Path: crates/sdo-protocol/src/driver.rs
//! The state machine driver (§4.4).
//!
//! The original implementation dispatches through a function-pointer table
//! indexed by `state - phase_base` and loops internally until a handler
//! suspends or the run reaches a terminal state. `process` instead performs
//! exactly one handler dispatch per call and reports which of four things
//! happened; `run_until_yield` reproduces the original's loop-to-suspension
//! behavior for a caller that prefers it.

use sdo_api::{DeviceSigner, MessageReader, MessageWriter, PlatformCrypto, ServiceInfoModule};
use sdo_types::limits::MAX_TO2_ROUND_TRIPS;
use sdo_types::{ProtocolContext, ProtocolError, ProtocolState, WireErrorCode};

use crate::error_block::{emit_error, parse_error_message};
use crate::handlers::{di, to1, to2};
use crate::outcome::ProcessOutcome;
use sdo_storage::SealedBlobStore;

/// The six TO2 states that open a new request/response round trip, each
/// checked against [`MAX_TO2_ROUND_TRIPS`] before it dispatches.
const TO2_ROUND_TRIP_STATES: [ProtocolState; 6] = [
    ProtocolState::To2Init,
    ProtocolState::To2SndGetOpNextEntry,
    ProtocolState::To2SndProveDevice,
    ProtocolState::To2SndNextDsi,
    ProtocolState::To2SndGetNextOsi,
    ProtocolState::To2SndDone,
];

/// Drives one run of DI, TO1, or TO2, generic over the host's platform
/// crypto services and the registered device service-info modules.
pub struct ProtocolDriver<P> {
    store: SealedBlobStore<P>,
    modules: Vec<Box<dyn ServiceInfoModule>>,
    signer: Box<dyn DeviceSigner>,
    attestation_data: Vec<u8>,
}

impl<P: PlatformCrypto> ProtocolDriver<P> {
    /// Builds a driver over `store`, with `modules` registered for TO2's
    /// service-info exchange and `signer` used for `ProveToSDO`/`ProveDevice`.
    /// `attestation_data` is emitted verbatim by `DI.AppStart`.
    pub fn new(
        store: SealedBlobStore<P>,
        modules: Vec<Box<dyn ServiceInfoModule>>,
        signer: Box<dyn DeviceSigner>,
        attestation_data: Vec<u8>,
    ) -> Self {
        Self {
            store,
            modules,
            signer,
            attestation_data,
        }
    }

    /// Dispatches exactly one handler for `ctx.state`, against the current
    /// contents of `reader`/`writer`.
    pub fn process(
        &mut self,
        ctx: &mut ProtocolContext,
        reader: &mut dyn MessageReader,
        writer: &mut dyn MessageWriter,
    ) -> ProcessOutcome {
        if ctx.state.is_terminal() {
            return terminal_outcome(ctx.state);
        }

        if TO2_ROUND_TRIP_STATES.contains(&ctx.state) {
            ctx.round_trips += 1;
            if ctx.round_trips > MAX_TO2_ROUND_TRIPS {
                let reporting_state = error_reporting_state(ctx.state);
                return self.fail(ctx, writer, WireErrorCode::InternalServerError, reporting_state, ProtocolError::RoundTripExceeded);
            }
        }

        let origin_state = ctx.state;
        let reporting_state = error_reporting_state(origin_state);
        let result = self.dispatch(ctx, reader, writer);
        match result {
            Ok(next_state) => {
                if next_state == origin_state {
                    return ProcessOutcome::Suspended;
                }
                ctx.state = next_state;
                if next_state.is_terminal() {
                    ctx.clear_secrets();
                    terminal_outcome(next_state)
                } else {
                    ProcessOutcome::Progressed
                }
            }
            Err(err) => self.fail(ctx, writer, wire_code_for(&err), reporting_state, err),
        }
    }

    /// Calls `process` repeatedly until it returns something other than
    /// `Progressed`: a transport round trip is needed, or the run ended.
    pub fn run_until_yield(
        &mut self,
        ctx: &mut ProtocolContext,
        reader: &mut dyn MessageReader,
        writer: &mut dyn MessageWriter,
    ) -> ProcessOutcome {
        loop {
            let outcome = self.process(ctx, reader, writer);
            if outcome != ProcessOutcome::Progressed {
                return outcome;
            }
        }
    }

    fn dispatch(
        &mut self,
        ctx: &mut ProtocolContext,
        reader: &mut dyn MessageReader,
        writer: &mut dyn MessageWriter,
    ) -> Result<ProtocolState, ProtocolError> {
        match ctx.state {
            ProtocolState::DiInit => di::app_start(writer, &self.attestation_data),
            ProtocolState::DiAppStart => Err(ProtocolError::Internal(
                "DiAppStart does not suspend and should never be dispatched".to_string(),
            )),
            ProtocolState::DiSetCredentials => di::set_credentials(ctx, reader, &self.store),
            ProtocolState::DiSetHmac => di::set_hmac(ctx, reader, &self.store),
            ProtocolState::DiDone => di::done(ctx, reader),

            ProtocolState::To1Init => to1::hello_sdo(ctx, writer),
            ProtocolState::To1SndHello => Err(ProtocolError::Internal(
                "To1SndHello does not suspend and should never be dispatched".to_string(),
            )),
            ProtocolState::To1RcvHelloAck => to1::hello_sdo_ack(ctx, reader),
            ProtocolState::To1SndProve => to1::prove_to_sdo(ctx, writer, self.signer.as_ref()),
            ProtocolState::To1RcvRedirect => to1::sdo_redirect(ctx, reader),

            ProtocolState::To2Init => to2::hello_device(ctx, writer),
            ProtocolState::To2SndHelloDevice => Err(ProtocolError::Internal(
                "To2SndHelloDevice does not suspend and should never be dispatched".to_string(),
            )),
            ProtocolState::To2RcvProveOvHdr => to2::prove_ov_hdr(ctx, reader),
            ProtocolState::To2SndGetOpNextEntry => to2::get_op_next_entry(writer),
            ProtocolState::To2RcvOpNextEntry => to2::op_next_entry(ctx, reader),
            ProtocolState::To2SndProveDevice => to2::prove_device(ctx, writer, self.signer.as_ref()),
            ProtocolState::To2RcvGetNextDsi => to2::get_next_dsi(ctx, reader, &mut self.modules),
            ProtocolState::To2SndNextDsi => to2::next_dsi(ctx, writer, &mut self.modules),
            ProtocolState::To2RcvSetupDevice => to2::setup_device(ctx, reader),
            ProtocolState::To2SndGetNextOsi => to2::get_next_osi(writer),
            ProtocolState::To2RcvNextOsi => to2::next_osi(ctx, reader, &mut self.modules),
            ProtocolState::To2SndDone => to2::done(ctx, writer),
            ProtocolState::To2RcvDone2 => to2::done2(ctx, reader, &self.store),

            ProtocolState::Done | ProtocolState::Error => Err(ProtocolError::Internal(
                "terminal state reached dispatch".to_string(),
            )),
        }
    }

    fn fail(
        &self,
        ctx: &mut ProtocolContext,
        writer: &mut dyn MessageWriter,
        code: WireErrorCode,
        reporting_state: ProtocolState,
        err: ProtocolError,
    ) -> ProcessOutcome {
        let _ = emit_error(writer, code, reporting_state, &parse_error_message(reporting_state));
        tracing::warn!(state = ?reporting_state, error = %err, "protocol run aborted");
        ctx.state = ProtocolState::Error;
        ctx.clear_secrets();
        ProcessOutcome::Failed
    }
}

fn terminal_outcome(state: ProtocolState) -> ProcessOutcome {
    if state == ProtocolState::Done {
        ProcessOutcome::Completed
    } else {
        ProcessOutcome::Failed
    }
}

/// Maps the three non-dispatching `*Init` pseudostates to the real first
/// message they immediately invoke, so a failure inside `di::app_start`,
/// `to1::hello_sdo`, or `to2::hello_device` reports the message number
/// that was actually being produced (msg10/30/40) rather than the
/// internal pre-state value (9/29/39), which the wire format never
/// carries.
fn error_reporting_state(state: ProtocolState) -> ProtocolState {
    match state {
        ProtocolState::DiInit => ProtocolState::DiAppStart,
        ProtocolState::To1Init => ProtocolState::To1SndHello,
        ProtocolState::To2Init => ProtocolState::To2SndHelloDevice,
        other => other,
    }
}

fn wire_code_for(err: &ProtocolError) -> WireErrorCode {
    match err {
        ProtocolError::Violation(_) | ProtocolError::Crypto(_) => WireErrorCode::MessageBodyError,
        ProtocolError::Storage(_)
        | ProtocolError::RoundTripExceeded
        | ProtocolError::Internal(_)
        | ProtocolError::RemoteAborted => WireErrorCode::InternalServerError,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdo_types::limits::GUID_SIZE;
    use sdo_types::{CryptoError, DeviceCredentials, ManufacturerBlock, RsaPublicKeyWire};

    struct NullPlatform;

    impl PlatformCrypto for NullPlatform {
        fn get_platform_aes_key(&self, out: &mut [u8]) -> Result<(), sdo_types::StorageError> {
            out.fill(0x42);
            Ok(())
        }
        fn compute_storage_mac(&self, _data: &[u8], out: &mut [u8]) -> Result<(), sdo_types::StorageError> {
            out.fill(0x24);
            Ok(())
        }
        fn aes_gcm_encrypt(
            &self,
            plaintext: &[u8],
            _iv: &[u8],
            _key: &[u8],
        ) -> Result<(Vec<u8>, Vec<u8>), sdo_types::StorageError> {
            Ok((plaintext.to_vec(), vec![0u8; 16]))
        }
        fn aes_gcm_decrypt(
            &self,
            ciphertext: &[u8],
            _iv: &[u8],
            _tag: &[u8],
            _key: &[u8],
        ) -> Result<Vec<u8>, sdo_types::StorageError> {
            Ok(ciphertext.to_vec())
        }
    }

    struct StubSigner;
    impl DeviceSigner for StubSigner {
        fn sign(&self, _message: &[u8]) -> Result<Vec<u8>, ProtocolError> {
            Ok(vec![0u8; 8])
        }
    }

    struct NullReader;
    impl MessageReader for NullReader {
        fn has_buffered_block(&self) -> bool {
            false
        }
        fn next_block(&mut self) -> Result<Option<u32>, ProtocolError> {
            Ok(None)
        }
        fn begin_object(&mut self) -> Result<(), ProtocolError> {
            Ok(())
        }
        fn end_object(&mut self) -> Result<(), ProtocolError> {
            Ok(())
        }
        fn read_tag(&mut self) -> Result<String, ProtocolError> {
            Ok(String::new())
        }
        fn read_uint(&mut self) -> Result<u64, ProtocolError> {
            Ok(0)
        }
        fn read_string(&mut self) -> Result<String, ProtocolError> {
            Ok(String::new())
        }
        fn read_bytes(&mut self) -> Result<Vec<u8>, ProtocolError> {
            Ok(Vec::new())
        }
    }

    struct NullWriter;
    impl MessageWriter for NullWriter {
        fn begin_object(&mut self) -> Result<(), ProtocolError> {
            Ok(())
        }
        fn end_object(&mut self) -> Result<(), ProtocolError> {
            Ok(())
        }
        fn write_tag(&mut self, _tag: &str) -> Result<(), ProtocolError> {
            Ok(())
        }
        fn write_uint(&mut self, _value: u64) -> Result<(), ProtocolError> {
            Ok(())
        }
        fn write_string(&mut self, _value: &str) -> Result<(), ProtocolError> {
            Ok(())
        }
        fn write_bytes(&mut self, _value: &[u8]) -> Result<(), ProtocolError> {
            Ok(())
        }
        fn begin_block(&mut self, _message_type: u32) -> Result<(), ProtocolError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct CapturingWriter {
        last_tag: Option<String>,
        captured_emsg: Option<u64>,
    }
    impl MessageWriter for CapturingWriter {
        fn begin_object(&mut self) -> Result<(), ProtocolError> {
            Ok(())
        }
        fn end_object(&mut self) -> Result<(), ProtocolError> {
            Ok(())
        }
        fn write_tag(&mut self, tag: &str) -> Result<(), ProtocolError> {
            self.last_tag = Some(tag.to_string());
            Ok(())
        }
        fn write_uint(&mut self, value: u64) -> Result<(), ProtocolError> {
            if self.last_tag.as_deref() == Some("emsg") {
                self.captured_emsg = Some(value);
            }
            Ok(())
        }
        fn write_string(&mut self, _value: &str) -> Result<(), ProtocolError> {
            Ok(())
        }
        fn write_bytes(&mut self, _value: &[u8]) -> Result<(), ProtocolError> {
            Ok(())
        }
        fn begin_block(&mut self, _message_type: u32) -> Result<(), ProtocolError> {
            Ok(())
        }
    }

    fn manufacturer() -> ManufacturerBlock {
        ManufacturerBlock {
            public_key: RsaPublicKeyWire::new(vec![1, 2, 3], vec![1, 0, 1]),
        }
    }

    #[test]
    fn di_app_start_progresses_without_suspending() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SealedBlobStore::new(dir.path(), NullPlatform);
        let mut driver = ProtocolDriver::new(store, Vec::new(), Box::new(StubSigner), vec![1, 2, 3]);
        let mut creds = DeviceCredentials::unclaimed(manufacturer());
        let mut ctx = ProtocolContext::new(ProtocolState::DiInit, &mut creds);
        let outcome = driver.process(&mut ctx, &mut NullReader, &mut NullWriter);
        assert_eq!(outcome, ProcessOutcome::Progressed);
        assert_eq!(ctx.state, ProtocolState::DiSetCredentials);
    }

    #[test]
    fn di_set_credentials_suspends_awaiting_input() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SealedBlobStore::new(dir.path(), NullPlatform);
        let mut driver = ProtocolDriver::new(store, Vec::new(), Box::new(StubSigner), Vec::new());
        let mut creds = DeviceCredentials::unclaimed(manufacturer());
        let mut ctx = ProtocolContext::new(ProtocolState::DiSetCredentials, &mut creds);
        let outcome = driver.process(&mut ctx, &mut NullReader, &mut NullWriter);
        assert_eq!(outcome, ProcessOutcome::Suspended);
        assert_eq!(ctx.state, ProtocolState::DiSetCredentials);
    }

    #[test]
    fn to1_hello_without_guid_fails_into_error_state() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SealedBlobStore::new(dir.path(), NullPlatform);
        let mut driver = ProtocolDriver::new(store, Vec::new(), Box::new(StubSigner), Vec::new());
        let mut creds = DeviceCredentials::unclaimed(manufacturer());
        let mut ctx = ProtocolContext::new(ProtocolState::To1Init, &mut creds);
        let mut writer = CapturingWriter::default();
        let outcome = driver.process(&mut ctx, &mut NullReader, &mut writer);
        assert_eq!(outcome, ProcessOutcome::Failed);
        assert_eq!(ctx.state, ProtocolState::Error);
        // The failure happens inside `to1::hello_sdo`, which is producing
        // msg30; the emitted emsg must never be the internal To1Init
        // pre-state value (29), which the wire format never carries.
        assert_eq!(writer.captured_emsg, Some(ProtocolState::To1SndHello.msg_number() as u64));
    }

    #[test]
    fn round_trip_limit_trips_before_the_eleventh_to2_round() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SealedBlobStore::new(dir.path(), NullPlatform);
        let mut driver = ProtocolDriver::new(store, Vec::new(), Box::new(StubSigner), Vec::new());
        let mut creds = DeviceCredentials::unclaimed(manufacturer());
        let mut ctx = ProtocolContext::new(ProtocolState::To2SndGetOpNextEntry, &mut creds);
        ctx.g2 = Some([7u8; GUID_SIZE]);
        ctx.round_trips = MAX_TO2_ROUND_TRIPS;
        let outcome = driver.process(&mut ctx, &mut NullReader, &mut NullWriter);
        assert_eq!(outcome, ProcessOutcome::Failed);
        assert_eq!(ctx.state, ProtocolState::Error);
    }

    #[test]
    fn crypto_failure_maps_to_message_body_error_code() {
        let err = ProtocolError::Crypto(CryptoError::SignatureInvalid);
        assert_eq!(wire_code_for(&err), WireErrorCode::MessageBodyError);
    }
}
