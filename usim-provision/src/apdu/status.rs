//! Status Word (SW) constants for APDU responses
//!
//! ISO 7816-4 / ETSI TS 102 221 status words, plus the GSM 11.11 codes the
//! older SIM command class still returns.

/// Status Word constants
pub struct SW;

impl SW {
    // Success
    pub const SUCCESS: u16 = 0x9000;

    // Execution errors
    pub const MEMORY_FAILURE: u16 = 0x6581;

    // Checking errors
    pub const WRONG_LENGTH: u16 = 0x6700;
    pub const SECURITY_STATUS_NOT_SATISFIED: u16 = 0x6982;
    pub const AUTH_METHOD_BLOCKED: u16 = 0x6983;
    pub const COMMAND_NOT_ALLOWED_NO_EF: u16 = 0x6986;
    pub const FILE_NOT_FOUND: u16 = 0x6A82;
    pub const WRONG_P1_P2: u16 = 0x6B00;
    pub const INS_NOT_SUPPORTED: u16 = 0x6D00;
    pub const CLA_NOT_SUPPORTED: u16 = 0x6E00;

    // GSM 11.11
    pub const GSM_ACCESS_CONDITION_NOT_FULFILLED: u16 = 0x9804;
    pub const GSM_CHV_BLOCKED: u16 = 0x9840;

    /// 63Cx, the ADM1 attempts-left warning
    #[inline]
    pub fn counter_warning(retries: u8) -> u16 {
        0x63C0 | ((retries & 0x0F) as u16)
    }

    /// Check if a status word indicates success (9000, 61xx or 9Fxx)
    #[inline]
    pub fn is_success(sw: u16) -> bool {
        sw == Self::SUCCESS || Self::is_more_data(sw)
    }

    /// Check if a status word indicates more data available (61xx / 9Fxx)
    #[inline]
    pub fn is_more_data(sw: u16) -> bool {
        (sw & 0xFF00) == 0x6100 || (sw & 0xFF00) == 0x9F00
    }

    /// Check if a status word is a counter warning (63Cx)
    #[inline]
    pub fn is_counter_warning(sw: u16) -> bool {
        (sw & 0xFFF0) == 0x63C0
    }

    /// Extract retry count from counter warning (63Cx)
    #[inline]
    pub fn get_retry_count(sw: u16) -> Option<u8> {
        if Self::is_counter_warning(sw) {
            Some((sw & 0x0F) as u8)
        } else {
            None
        }
    }

    /// Check if the key reference is blocked (6983 / GSM 9840)
    #[inline]
    pub fn is_blocked(sw: u16) -> bool {
        sw == Self::AUTH_METHOD_BLOCKED || sw == Self::GSM_CHV_BLOCKED
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_warning() {
        assert_eq!(SW::counter_warning(3), 0x63C3);
        assert_eq!(SW::counter_warning(0), 0x63C0);
    }

    #[test]
    fn test_is_success() {
        assert!(SW::is_success(0x9000));
        assert!(SW::is_success(0x6110));
        assert!(SW::is_success(0x9F22));
        assert!(!SW::is_success(0x6982));
    }

    #[test]
    fn test_get_retry_count() {
        assert_eq!(SW::get_retry_count(0x63C3), Some(3));
        assert_eq!(SW::get_retry_count(0x63C0), Some(0));
        assert_eq!(SW::get_retry_count(0x9000), None);
    }

    #[test]
    fn test_is_blocked() {
        assert!(SW::is_blocked(0x6983));
        assert!(SW::is_blocked(0x9840));
        assert!(!SW::is_blocked(0x63C0));
    }
}
