//! Maps `Box<dyn Error>` from the channel trait boundary to typed `ActionError`s.
//!
//! `mixer_traits::CommandChannel` returns boxed errors so any transport can
//! plug in; this module classifies them, with a feature-gated path for
//! `mixer_hardware::HwError` downcasting.

use crate::error::ActionError;

/// Classify a rejected `send`.
pub fn map_send_error(e: &(dyn std::error::Error + 'static)) -> ActionError {
    ActionError::CommandSend {
        reason: e.to_string(),
        disconnected: is_disconnect(e),
    }
}

/// Classify a failed read while waiting for an acknowledgment.
///
/// Any read failure ends the wait; the channel is treated as gone.
pub fn map_read_error(e: &(dyn std::error::Error + 'static)) -> ActionError {
    ActionError::ChannelDisconnected(e.to_string())
}

fn is_disconnect(e: &(dyn std::error::Error + 'static)) -> bool {
    #[cfg(feature = "hardware-errors")]
    {
        if let Some(hw) = e.downcast_ref::<mixer_hardware::HwError>() {
            return match hw {
                mixer_hardware::HwError::Disconnected => true,
                mixer_hardware::HwError::Io(io) => matches!(
                    io.kind(),
                    std::io::ErrorKind::BrokenPipe
                        | std::io::ErrorKind::NotConnected
                        | std::io::ErrorKind::ConnectionReset
                ),
                _ => false,
            };
        }
    }

    // Fallback: string-based detection
    let s = e.to_string().to_lowercase();
    s.contains("disconnect") || s.contains("broken pipe")
}
