//! Routing: how borrowed assets become collateral and back
//!
//! - `types`: hops, paths and the forward/reverse `SwapInfo` bundle
//! - `codec`: fixed-capacity ABI layout for routes passed as calldata
//! - `executor`: runs one path hop by hop with per-hop slippage checks
//! - `aggregator`: splits input across parallel forward paths, joins constituents
//! - `reverse`: unwinds collateral into the borrow asset on exit

mod aggregator;
mod codec;
mod executor;
mod reverse;
mod types;

pub use aggregator::{produce_collateral, split_by_declared, AggregateResult};
pub use codec::{decode_swap_info, decode_swap_info_hex, encode_swap_info, encode_swap_info_hex};
pub use executor::{quote_path, HopResult, PathResult, SwapPathExecutor};
pub use reverse::unwind_collateral;
pub use types::{PoolOperation, SwapHop, SwapInfo, SwapKind, SwapPath, MAX_HOPS, MAX_PATHS};
