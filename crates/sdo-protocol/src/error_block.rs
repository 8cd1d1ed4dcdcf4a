// Path: crates/sdo-protocol/src/error_block.rs
//! The wire-level error block (§4.5, §6): `{ec, emsg, em}`.

use sdo_api::MessageWriter;
use sdo_types::limits::MAX_ERROR_MESSAGE_LEN;
use sdo_types::{ProtocolError, ProtocolState, WireErrorCode};

/// Writes the structured error block the driver emits immediately before
/// transitioning to `ERROR`.
pub fn emit_error(
    writer: &mut dyn MessageWriter,
    code: WireErrorCode,
    origin_state: ProtocolState,
    message: &str,
) -> Result<(), ProtocolError> {
    writer.begin_object()?;
    writer.write_tag("ec")?;
    writer.write_uint(u64::from(code.as_u32()))?;
    writer.write_tag("emsg")?;
    writer.write_uint(u64::from(origin_state.msg_number()))?;
    writer.write_tag("em")?;
    writer.write_string(&truncate_to_byte_limit(message, MAX_ERROR_MESSAGE_LEN))?;
    writer.end_object()?;
    Ok(())
}

/// Builds the `"msgN: message parse error"` string emitted when a
/// handler fails.
pub fn parse_error_message(state: ProtocolState) -> String {
    format!("msg{}: message parse error", state.msg_number())
}

fn truncate_to_byte_limit(message: &str, limit: usize) -> String {
    if message.len() <= limit {
        return message.to_string();
    }
    let mut end = limit;
    while end > 0 && !message.is_char_boundary(end) {
        end -= 1;
    }
    message.get(..end).unwrap_or_default().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaves_short_messages_untouched() {
        assert_eq!(truncate_to_byte_limit("msg41: message parse error", 63), "msg41: message parse error");
    }

    #[test]
    fn truncates_on_a_char_boundary() {
        let long_message = "a".repeat(70);
        let truncated = truncate_to_byte_limit(&long_message, 63);
        assert_eq!(truncated.len(), 63);
    }
}
