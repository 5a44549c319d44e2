//! Maps `Box<dyn Error>` from trait boundaries to typed `StageError`.
//!
//! The traits in `xystage_traits` use `Box<dyn Error + Send + Sync>`; this
//! module converts those to our typed error enum, with an optional
//! feature-gated path for `xystage_hardware::HwError` downcasting.

use crate::error::StageError;

/// Map a link or connector error to a typed `StageError`.
///
/// Known hardware error types are downcast first, then string heuristics apply.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> StageError {
    #[cfg(feature = "hardware-errors")]
    {
        use xystage_hardware::HwError;
        if let Some(hw) = e.downcast_ref::<HwError>() {
            return match hw {
                HwError::Timeout => StageError::NoResponse,
                HwError::Open(msg) => StageError::Connection(msg.clone()),
                other => StageError::Link(other.to_string()),
            };
        }
    }

    let s = e.to_string();
    let lower = s.to_lowercase();
    if lower.contains("timeout") || lower.contains("timed out") {
        StageError::NoResponse
    } else {
        StageError::Link(s)
    }
}
