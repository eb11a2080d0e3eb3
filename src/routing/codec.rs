//! SwapInfo ABI codec
//!
//! Fixed-capacity Solidity layout (3 paths x 4 hops per direction), the form
//! in which routes travel as entry-point calldata. Unused slots are padded
//! with the sentinel on encode and trimmed on decode.

use alloy_primitives::{Address, U256};
use alloy_sol_types::{sol, SolValue};

use super::types::{PoolOperation, SwapHop, SwapInfo, SwapKind, SwapPath, MAX_PATHS};
use crate::errors::{LeverageError, Result};

sol! {
    /// One routing hop
    #[allow(missing_docs)]
    struct RouteHop {
        address pool;
        uint8 swapKind;
        address fromAsset;
        address toAsset;
        uint8 fromIndex;
        uint8 toIndex;
        uint8 operation;
        uint256 minAmountOut;
    }

    /// One ordered path of up to four hops
    #[allow(missing_docs)]
    struct MultipSwapPath {
        RouteHop[4] hops;
        address swapFrom;
        address swapTo;
        uint256 inAmount;
        uint256 minAmountOut;
    }

    /// Forward and reverse routes for one leverage call
    #[allow(missing_docs)]
    struct SwapInfoParams {
        MultipSwapPath[3] paths;
        MultipSwapPath[3] reversePaths;
        uint256 pathLength;
    }
}

// ============================================
// ENCODE
// ============================================

/// ABI-encodes a validated `SwapInfo`
pub fn encode_swap_info(info: &SwapInfo) -> Result<Vec<u8>> {
    info.validate()?;

    let params = SwapInfoParams {
        paths: pad_paths(&info.paths),
        reversePaths: pad_paths(&info.reverse_paths),
        pathLength: U256::from(info.path_length),
    };

    Ok(params.abi_encode())
}

/// `0x`-prefixed hex form of `encode_swap_info`
pub fn encode_swap_info_hex(info: &SwapInfo) -> Result<String> {
    Ok(format!("0x{}", hex::encode(encode_swap_info(info)?)))
}

fn pad_paths(paths: &[SwapPath]) -> [MultipSwapPath; MAX_PATHS] {
    let sentinel = SwapPath::sentinel();
    std::array::from_fn(|k| to_abi_path(paths.get(k).unwrap_or(&sentinel)))
}

fn to_abi_path(path: &SwapPath) -> MultipSwapPath {
    MultipSwapPath {
        hops: std::array::from_fn(|k| to_abi_hop(path.hops.get(k).unwrap_or(&SwapHop::SENTINEL))),
        swapFrom: path.swap_from,
        swapTo: path.swap_to,
        inAmount: path.in_amount,
        minAmountOut: path.min_amount_out,
    }
}

fn to_abi_hop(hop: &SwapHop) -> RouteHop {
    RouteHop {
        pool: hop.pool,
        swapKind: hop.kind as u8,
        fromAsset: hop.from_asset,
        toAsset: hop.to_asset,
        fromIndex: hop.from_index,
        toIndex: hop.to_index,
        operation: hop.operation as u8,
        minAmountOut: hop.min_amount_out,
    }
}

// ============================================
// DECODE
// ============================================

/// Decodes and validates ABI-encoded `SwapInfo`
pub fn decode_swap_info(data: &[u8]) -> Result<SwapInfo> {
    let params = <SwapInfoParams as SolValue>::abi_decode(data)
        .map_err(|e| LeverageError::InvalidSwapPath(format!("abi decode failed: {}", e)))?;

    if params.pathLength > U256::from(MAX_PATHS) {
        return Err(LeverageError::InvalidSwapPath(format!(
            "path length {} exceeds capacity {}",
            params.pathLength, MAX_PATHS
        )));
    }

    let info = SwapInfo {
        paths: from_abi_paths(&params.paths)?,
        reverse_paths: from_abi_paths(&params.reversePaths)?,
        path_length: params.pathLength.to::<usize>(),
    };
    info.validate()?;

    Ok(info)
}

/// Accepts the hex form, with or without `0x`
pub fn decode_swap_info_hex(data: &str) -> Result<SwapInfo> {
    let bytes = hex::decode(data.trim().trim_start_matches("0x"))
        .map_err(|e| LeverageError::InvalidSwapPath(format!("bad hex: {}", e)))?;
    decode_swap_info(&bytes)
}

fn from_abi_paths(paths: &[MultipSwapPath; MAX_PATHS]) -> Result<Vec<SwapPath>> {
    let mut decoded = paths.iter().map(from_abi_path).collect::<Result<Vec<_>>>()?;
    while decoded.last().is_some_and(SwapPath::is_sentinel) {
        decoded.pop();
    }
    Ok(decoded)
}

fn from_abi_path(path: &MultipSwapPath) -> Result<SwapPath> {
    let mut hops = path.hops.iter().map(from_abi_hop).collect::<Result<Vec<_>>>()?;
    while hops.last().is_some_and(SwapHop::is_sentinel) {
        hops.pop();
    }

    Ok(SwapPath {
        hops,
        swap_from: path.swapFrom,
        swap_to: path.swapTo,
        in_amount: path.inAmount,
        min_amount_out: path.minAmountOut,
    })
}

fn from_abi_hop(hop: &RouteHop) -> Result<SwapHop> {
    let decoded = SwapHop {
        pool: hop.pool,
        kind: SwapKind::from_code(hop.swapKind)?,
        from_asset: hop.fromAsset,
        to_asset: hop.toAsset,
        from_index: hop.fromIndex,
        to_index: hop.toIndex,
        operation: PoolOperation::from_code(hop.operation)?,
        min_amount_out: hop.minAmountOut,
    };

    // A sentinel slot must be entirely empty
    if decoded.kind == SwapKind::None && decoded.pool != Address::ZERO {
        return Err(LeverageError::InvalidSwapPath(format!(
            "slot with pool {} has kind none",
            decoded.pool
        )));
    }

    Ok(decoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    const POOL: Address = address!("00000000000000000000000000000000000000a1");
    const USDC: Address = address!("00000000000000000000000000000000000000c1");
    const LP: Address = address!("00000000000000000000000000000000000000c3");

    fn route() -> SwapInfo {
        let forward = SwapPath::new(
            vec![SwapHop::new(POOL, SwapKind::Curve, USDC, LP, PoolOperation::AddLiquidity)
                .with_indices(1, 0)
                .with_min_out(U256::from(95u64))],
            U256::from(100u64),
            U256::from(95u64),
        );
        let reverse = SwapPath::new(
            vec![SwapHop::new(POOL, SwapKind::Curve, LP, USDC, PoolOperation::RemoveLiquidityOneCoin)
                .with_indices(0, 1)],
            U256::from(95u64),
            U256::ZERO,
        );
        SwapInfo::single(forward, reverse)
    }

    #[test]
    fn test_fixed_layout_size() {
        // hop = 8 words, path = 4 hops + 4 words, info = 6 paths + 1 word
        let encoded = encode_swap_info(&route()).unwrap();
        assert_eq!(encoded.len(), 32 * (6 * (4 * 8 + 4) + 1));
    }

    #[test]
    fn test_decode_trims_padding() {
        let info = route();
        let decoded = decode_swap_info(&encode_swap_info(&info).unwrap()).unwrap();
        assert_eq!(decoded, info);
        assert_eq!(decoded.paths[0].hops.len(), 1);
    }

    #[test]
    fn test_hex_accepts_prefix() {
        let hex_form = encode_swap_info_hex(&route()).unwrap();
        assert!(hex_form.starts_with("0x"));
        assert_eq!(decode_swap_info_hex(&hex_form).unwrap(), route());
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let mut encoded = encode_swap_info(&route()).unwrap();
        // swapKind is the second word of the first hop
        encoded[32 + 31] = 9;
        assert_eq!(decode_swap_info(&encoded).unwrap_err().code(), "116");
    }

    #[test]
    fn test_truncated_input_rejected() {
        let encoded = encode_swap_info(&route()).unwrap();
        assert!(decode_swap_info(&encoded[..64]).is_err());
    }
}
