//! Token definitions
//!
//! Every token the SDK can zap in or out of. Native ETH is represented by
//! the zero address, the same way the router contracts expect it.

use alloy_primitives::{address, Address};

/// Represents a token the SDK can route through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub symbol: &'static str,
    pub address: Address,
    pub decimals: u8,
}

// ============================================
// ADDRESSES
// ============================================

pub const FXUSD: Address = address!("085780639cc2cacd35e474e71f4d000e2405d8f6");
pub const WSTETH: Address = address!("c035a7cf15375ce2706766804551791ad035e0c2");
pub const WBTC: Address = address!("2260fac5e5542a773aa44fbcfedf7c193bc2c599");
pub const ETH: Address = Address::ZERO;
pub const WETH: Address = address!("c02aaa39b223fe8d0a0e5c4f27ead9083c756cc2");
pub const USDC: Address = address!("a0b86991c6218b36c1d19d4a2e9eb0ce3606eb48");
pub const USDT: Address = address!("dac17f958d2ee523a2206206994597c13d831ec7");
pub const STETH: Address = address!("ae7ab96520de3a18e5e111b5eaab095312d7fe84");

/// Placeholder some aggregators use for the native asset
pub const NATIVE_PLACEHOLDER: Address = address!("eeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeee");

// ============================================
// TOKEN TABLE
// ============================================

pub const ALL_TOKENS: [Token; 8] = [
    Token { symbol: "fxUSD", address: FXUSD, decimals: 18 },
    Token { symbol: "wstETH", address: WSTETH, decimals: 18 },
    Token { symbol: "WBTC", address: WBTC, decimals: 8 },
    Token { symbol: "eth", address: ETH, decimals: 18 },
    Token { symbol: "weth", address: WETH, decimals: 18 },
    Token { symbol: "usdc", address: USDC, decimals: 6 },
    Token { symbol: "usdt", address: USDT, decimals: 6 },
    Token { symbol: "stETH", address: STETH, decimals: 18 },
];

/// Case-insensitive lookup by symbol
pub fn by_symbol(symbol: &str) -> Option<Token> {
    ALL_TOKENS
        .iter()
        .find(|t| t.symbol.eq_ignore_ascii_case(symbol))
        .copied()
}

pub fn by_address(address: Address) -> Option<Token> {
    ALL_TOKENS.iter().find(|t| t.address == address).copied()
}

/// Decimals for a known token. Unknown tokens need an on-chain lookup.
pub fn known_decimals(address: Address) -> Option<u8> {
    by_address(address).map(|t| t.decimals)
}

pub fn symbol_of(address: Address) -> String {
    by_address(address)
        .map(|t| t.symbol.to_string())
        .unwrap_or_else(|| address.to_string())
}

pub fn is_native(address: Address) -> bool {
    address == ETH
}

/// Native ETH is converted through the WETH router paths.
pub fn routing_address(address: Address) -> Address {
    if is_native(address) { WETH } else { address }
}

/// Map the aggregator placeholder for native ETH back to the zero address.
pub fn placeholder_to_zero(address: Address) -> Address {
    if address == NATIVE_PLACEHOLDER { Address::ZERO } else { address }
}

/// Parse either a known symbol or a hex address.
pub fn parse_token(input: &str) -> Option<Address> {
    by_symbol(input)
        .map(|t| t.address)
        .or_else(|| input.parse::<Address>().ok())
}
