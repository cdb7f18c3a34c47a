//! Block explorer links.

use alloy_core::primitives::Address;

/// Explorer base URL for a chain, `None` for local and unknown chains.
pub fn explorer_base(chain_id: u64) -> Option<&'static str> {
    match chain_id {
        1 => Some("https://etherscan.io"),
        11155111 => Some("https://sepolia.etherscan.io"),
        137 => Some("https://polygonscan.com"),
        42161 => Some("https://arbiscan.io"),
        _ => None,
    }
}

pub fn explorer_url(address: Address, chain_id: u64) -> Option<String> {
    explorer_base(chain_id).map(|base| format!("{base}/address/{address}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_chains() {
        let address: Address = "0x5FbDB2315678afecb367f032d93F642f64180aa3".parse().unwrap();
        assert_eq!(
            explorer_url(address, 11155111).as_deref(),
            Some("https://sepolia.etherscan.io/address/0x5FbDB2315678afecb367f032d93F642f64180aa3")
        );
        assert_eq!(
            explorer_url(address, 42161).as_deref(),
            Some("https://arbiscan.io/address/0x5FbDB2315678afecb367f032d93F642f64180aa3")
        );
    }

    #[test]
    fn test_local_and_unknown_chains_have_no_explorer() {
        for chain_id in [31337, 1337, 10, 0] {
            assert!(explorer_url(Address::ZERO, chain_id).is_none(), "chain {chain_id}");
        }
    }
}
