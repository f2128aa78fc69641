//! Arbitrum specific gas price precompile methods

use alloy::sol;
use alloy_primitives::{address, Address, Bytes, U256};
use alloy_sol_types::SolCall;

use crate::{client::ChainClient, error::OracleError};

/// The address of the `ArbGasInfo` precompile
pub const ARB_GAS_INFO_ADDRESS: Address = address!("000000000000000000000000000000000000006c");

// The ABI for the `ArbGasInfo` precompile:
// https://docs.arbitrum.io/build-decentralized-apps/precompiles/reference#arbgasinfo
sol! {
    interface ArbGasInfo {
        function getMinimumGasPrice() external view returns (uint256);
    }
}

/// The calldata for `getMinimumGasPrice()`
pub fn minimum_gas_price_calldata() -> Bytes {
    ArbGasInfo::getMinimumGasPriceCall {}.abi_encode().into()
}

/// Read the minimum gas price from the `ArbGasInfo` precompile
pub async fn get_minimum_gas_price<C: ChainClient + ?Sized>(
    client: &C,
) -> Result<U256, OracleError> {
    let ret = client
        .call(ARB_GAS_INFO_ADDRESS, minimum_gas_price_calldata())
        .await
        .map_err(OracleError::gas_price)?;

    decode_big_endian(&ret)
}

/// Interpret raw return data as a big-endian unsigned integer
pub fn decode_big_endian(ret: &[u8]) -> Result<U256, OracleError> {
    if ret.is_empty() {
        return Err(OracleError::gas_price("empty return data from ArbGasInfo"));
    }

    U256::try_from_be_slice(ret).ok_or_else(|| {
        OracleError::gas_price(format!("ArbGasInfo returned {} bytes, expected at most 32", ret.len()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calldata_is_selector_only() {
        // keccak256("getMinimumGasPrice()")[..4]
        assert_eq!(minimum_gas_price_calldata().as_ref(), &[0xf9, 0x18, 0x37, 0x9a]);
    }

    #[test]
    fn test_decode_abi_word() {
        let mut word = [0u8; 32];
        word[24..].copy_from_slice(&100_000_000u64.to_be_bytes());

        assert_eq!(decode_big_endian(&word).unwrap(), U256::from(100_000_000u64));
    }

    #[test]
    fn test_decode_short_slice() {
        assert_eq!(decode_big_endian(&[0x01, 0x00]).unwrap(), U256::from(256u64));
    }

    #[test]
    fn test_decode_rejects_bad_lengths() {
        assert!(decode_big_endian(&[]).is_err());
        assert!(decode_big_endian(&[0u8; 33]).is_err());
    }
}
