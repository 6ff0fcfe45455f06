//! Wallet-connection collaborator interface.
//!
//! The wallet layer itself (adapter wiring, signing) lives outside this crate.
//! It reports connection changes as [`WalletEvent`]s, which the session
//! controller turns into admission checks and resets.

use serde::{Deserialize, Serialize};

/// Display info of the connected wallet application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletInfo {
    /// Wallet name or reverse-DNS id (e.g. `io.metamask`).
    pub name: String,
    /// Icon URL (may be empty).
    pub icon: String,
}

/// Connection-changed notification from the wallet layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletEvent {
    /// A wallet connected with the given address.
    Connected {
        /// Connected account address.
        address: String,
        /// Wallet display info, when the adapter reports it.
        info: Option<WalletInfo>,
    },
    /// The wallet disconnected.
    Disconnected,
}

/// Shorten an address for display: `0x1234...cdef`.
///
/// Addresses too short to shorten are returned unchanged.
pub fn format_address(address: &str) -> String {
    let chars: Vec<char> = address.chars().collect();
    if chars.len() <= 10 {
        return address.to_owned();
    }
    let head: String = chars[..6].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_long_address() {
        assert_eq!(
            format_address("0x900709432a8F2C7E65f90aA7CD35D0afe4eB7169"),
            "0x9007...7169"
        );
    }

    #[test]
    fn empty_address_stays_empty() {
        assert_eq!(format_address(""), "");
    }

    #[test]
    fn short_address_unchanged() {
        assert_eq!(format_address("0xabc"), "0xabc");
    }
}
