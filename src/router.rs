//! Static converter paths for the MultiPathConverter
//!
//! Each entry is a list of packed hop words plus an encoding word
//! `1048575 + (hops << 20)`. The V3 table overrides the USDC/WBTC legs with
//! the Uniswap V3 0.05% pool; every other pair is shared.

use crate::error::{Result, SdkError};
use crate::tokens::{FXUSD, STETH, USDC, USDT, WBTC, WETH, WSTETH};
use alloy_primitives::{uint, Address, U256};
use lazy_static::lazy_static;
use std::collections::HashMap;

/// Encoded route for `queryConvert` / `convert`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConvertData {
    pub encoding: U256,
    pub routes: Vec<U256>,
}

impl ConvertData {
    /// Identity conversion (same token in and out)
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Which path table to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RouterTable {
    #[default]
    Legacy,
    V3,
}

struct RouteEntry {
    from: Address,
    to: Address,
    routes: &'static [U256],
    /// Hop count for the encoding word; `None` leaves the encoding at zero
    hops: Option<u64>,
}

impl RouteEntry {
    fn convert_data(&self) -> ConvertData {
        ConvertData {
            encoding: self.hops.map(encoding).unwrap_or(U256::ZERO),
            routes: self.routes.to_vec(),
        }
    }
}

/// `1048575 + (hops << 20)`
pub fn encoding(hops: u64) -> U256 {
    U256::from(1_048_575u64 + (hops << 20))
}

// ============================================
// PATH TABLES
// ============================================

static LEGACY_ROUTES: &[RouteEntry] = &[
    // stETH
    RouteEntry {
        from: STETH,
        to: WETH,
        routes: &[uint!(0x277090c5ae6b80a3c525f09d7ae464a8fa83d9c08804_U256)],
        hops: None,
    },
    RouteEntry {
        from: STETH,
        to: USDC,
        routes: &[
            uint!(0x277090c5ae6b80a3c525f09d7ae464a8fa83d9c08804_U256),
            uint!(0x49fe1afc5df753cd252e1068dfa0428d3755b20a6c08_U256),
        ],
        hops: None,
    },
    RouteEntry {
        from: STETH,
        to: USDT,
        routes: &[
            uint!(0x277090c5ae6b80a3c525f09d7ae464a8fa83d9c08804_U256),
            uint!(0x4bd7d6e5d89150b5caa781bc12012fe06ea8578ad008_U256),
        ],
        hops: None,
    },
    RouteEntry {
        from: STETH,
        to: WSTETH,
        routes: &[uint!(0x1fce71607d656d4f172c66f42cfe369b24d78b2810a_U256)],
        hops: Some(1),
    },
    // wstETH
    RouteEntry {
        from: WSTETH,
        to: STETH,
        routes: &[uint!(0x1fce71607d656d4f172c66f42cfe369b24d78b2820a_U256)],
        hops: Some(1),
    },
    RouteEntry {
        from: WSTETH,
        to: WETH,
        routes: &[
            uint!(0x1fce71607d656d4f172c66f42cfe369b24d78b2820a_U256),
            uint!(0x277090c5ae6b80a3c525f09d7ae464a8fa83d9c08804_U256),
        ],
        hops: Some(2),
    },
    RouteEntry {
        // wstETH/stETH Lido, stETH/WETH Curve, WETH/USDC UniV3 500
        from: WSTETH,
        to: USDC,
        routes: &[
            uint!(0x01fce71607d656d4f172c66f42cfe369b24d78b2820a_U256),
            uint!(0x277090c5ae6b80a3c525f09d7ae464a8fa83d9c08804_U256),
            uint!(0x07d2239a830b7749bfbad93c0e68b104a5bf2cfd590001_U256),
        ],
        hops: Some(3),
    },
    RouteEntry {
        from: WSTETH,
        to: USDT,
        routes: &[
            uint!(0x01fce71607d656d4f172c66f42cfe369b24d78b2820a_U256),
            uint!(0x277090c5ae6b80a3c525f09d7ae464a8fa83d9c08804_U256),
            uint!(0x07d2239a830b7749bfbad93c0e68b104a5bf2cfd590001_U256),
            uint!(0x022afaf111e0b1f6c2869832dbfa5f42d20c0cbfc71c04_U256),
        ],
        hops: Some(4),
    },
    RouteEntry {
        from: WSTETH,
        to: FXUSD,
        routes: &[
            uint!(0x01fce71607d656d4f172c66f42cfe369b24d78b2820a_U256),
            uint!(0x277090c5ae6b80a3c525f09d7ae464a8fa83d9c08804_U256),
            uint!(0x07d2239a830b7749bfbad93c0e68b104a5bf2cfd590001_U256),
            uint!(0x01054062fa20b733978fcbcec244eb8825ae6cfed87c0c_U256),
        ],
        hops: Some(4),
    },
    // WETH
    RouteEntry {
        from: WETH,
        to: WSTETH,
        routes: &[
            uint!(0x2b9eae5948378e863978446d7aaac254c4b5ffa110a_U256),
            uint!(0x1fce71607d656d4f172c66f42cfe369b24d78b2810a_U256),
        ],
        hops: Some(2),
    },
    RouteEntry {
        from: WETH,
        to: USDC,
        routes: &[uint!(0x07d2239a830b7749bfbad93c0e68b104a5bf2cfd590001_U256)],
        hops: Some(1),
    },
    RouteEntry {
        from: WETH,
        to: USDT,
        routes: &[uint!(0x040007d046e057bee3d604652b9e401b493836052dda5fd801_U256)],
        hops: Some(1),
    },
    RouteEntry {
        from: WETH,
        to: FXUSD,
        routes: &[
            uint!(0x07d2239a830b7749bfbad93c0e68b104a5bf2cfd590001_U256),
            uint!(0x01054062fa20b733978fcbcec244eb8825ae6cfed87c0c_U256),
        ],
        hops: Some(2),
    },
    // USDC
    RouteEntry {
        from: USDC,
        to: WSTETH,
        routes: &[
            uint!(0x040007d2239a830b7749bfbad93c0e68b104a5bf2cfd590001_U256),
            uint!(0x02b9eae5948378e863978446d7aaac254c4b5ffa110a_U256),
            uint!(0x01fce71607d656d4f172c66f42cfe369b24d78b2810a_U256),
        ],
        hops: Some(3),
    },
    RouteEntry {
        from: USDC,
        to: FXUSD,
        routes: &[uint!(0x01054062fa20b733978fcbcec244eb8825ae6cfed87c0c_U256)],
        hops: Some(1),
    },
    RouteEntry {
        from: USDC,
        to: WETH,
        routes: &[uint!(0x040007d2239a830b7749bfbad93c0e68b104a5bf2cfd590001_U256)],
        hops: Some(1),
    },
    RouteEntry {
        // UniV3 3000
        from: USDC,
        to: WBTC,
        routes: &[uint!(0x2ee266b2329c21fe928a87ed8d5c9a659688052af0d401_U256)],
        hops: Some(1),
    },
    // USDT
    RouteEntry {
        // USDT/USDC Curve, USDC/WETH UniV3 500, WETH/stETH Lido, stETH/wstETH Lido
        from: USDT,
        to: WSTETH,
        routes: &[
            uint!(0x014afaf111e0b1f6c2869832dbfa5f42d20c0cbfc71c04_U256),
            uint!(0x040007d2239a830b7749bfbad93c0e68b104a5bf2cfd590001_U256),
            uint!(0x02b9eae5948378e863978446d7aaac254c4b5ffa110a_U256),
            uint!(0x01fce71607d656d4f172c66f42cfe369b24d78b2810a_U256),
        ],
        hops: Some(4),
    },
    RouteEntry {
        from: USDT,
        to: WETH,
        routes: &[uint!(0x07d046e057bee3d604652b9e401b493836052dda5fd801_U256)],
        hops: Some(1),
    },
    RouteEntry {
        from: USDT,
        to: WBTC,
        routes: &[
            uint!(0x014afaf111e0b1f6c2869832dbfa5f42d20c0cbfc71c04_U256),
            uint!(0x2ee266b2329c21fe928a87ed8d5c9a659688052af0d401_U256),
        ],
        hops: Some(2),
    },
    RouteEntry {
        from: USDT,
        to: FXUSD,
        routes: &[
            uint!(0x014afaf111e0b1f6c2869832dbfa5f42d20c0cbfc71c04_U256),
            uint!(0x01054062fa20b733978fcbcec244eb8825ae6cfed87c0c_U256),
        ],
        hops: Some(2),
    },
    // WBTC
    RouteEntry {
        from: WBTC,
        to: USDC,
        routes: &[uint!(0x04002ee266b2329c21fe928a87ed8d5c9a659688052af0d401_U256)],
        hops: Some(1),
    },
    RouteEntry {
        from: WBTC,
        to: USDT,
        routes: &[
            uint!(0x04002ee266b2329c21fe928a87ed8d5c9a659688052af0d401_U256),
            uint!(0x022afaf111e0b1f6c2869832dbfa5f42d20c0cbfc71c04_U256),
        ],
        hops: Some(2),
    },
    RouteEntry {
        from: WBTC,
        to: FXUSD,
        routes: &[
            uint!(0x04002ee266b2329c21fe928a87ed8d5c9a659688052af0d401_U256),
            uint!(0x01054062fa20b733978fcbcec244eb8825ae6cfed87c0c_U256),
        ],
        hops: Some(2),
    },
    // fxUSD
    RouteEntry {
        from: FXUSD,
        to: USDC,
        routes: &[uint!(0x254062fa20b733978fcbcec244eb8825ae6cfed87c0c_U256)],
        hops: Some(1),
    },
    RouteEntry {
        from: FXUSD,
        to: USDT,
        routes: &[
            uint!(0x254062fa20b733978fcbcec244eb8825ae6cfed87c0c_U256),
            uint!(0x022afaf111e0b1f6c2869832dbfa5f42d20c0cbfc71c04_U256),
        ],
        hops: Some(2),
    },
    RouteEntry {
        // fxUSD/USDC Curve SN193, USDC/WETH UniV3 500, WETH/stETH Lido, stETH/wstETH Lido
        from: FXUSD,
        to: WSTETH,
        routes: &[
            uint!(0x254062fa20b733978fcbcec244eb8825ae6cfed87c0c_U256),
            uint!(0x040007d2239a830b7749bfbad93c0e68b104a5bf2cfd590001_U256),
            uint!(0x02b9eae5948378e863978446d7aaac254c4b5ffa110a_U256),
            uint!(0x01fce71607d656d4f172c66f42cfe369b24d78b2810a_U256),
        ],
        hops: Some(4),
    },
    RouteEntry {
        from: FXUSD,
        to: WETH,
        routes: &[
            uint!(0x254062fa20b733978fcbcec244eb8825ae6cfed87c0c_U256),
            uint!(0x040007d2239a830b7749bfbad93c0e68b104a5bf2cfd590001_U256),
        ],
        hops: Some(2),
    },
    RouteEntry {
        from: FXUSD,
        to: WBTC,
        routes: &[
            uint!(0x254062fa20b733978fcbcec244eb8825ae6cfed87c0c_U256),
            uint!(0x2ee266b2329c21fe928a87ed8d5c9a659688052af0d401_U256),
        ],
        hops: Some(2),
    },
];

static V3_OVERRIDES: &[RouteEntry] = &[
    RouteEntry {
        // UniV3 500
        from: USDC,
        to: WBTC,
        routes: &[uint!(0x07d269dc8063ef5dff34b49595f97151eebfcff5f45801_U256)],
        hops: Some(1),
    },
    RouteEntry {
        from: WBTC,
        to: USDC,
        routes: &[uint!(0x040007d269dc8063ef5dff34b49595f97151eebfcff5f45801_U256)],
        hops: Some(1),
    },
    RouteEntry {
        from: FXUSD,
        to: WBTC,
        routes: &[
            uint!(0x254062fa20b733978fcbcec244eb8825ae6cfed87c0c_U256),
            uint!(0x07d269dc8063ef5dff34b49595f97151eebfcff5f45801_U256),
        ],
        hops: Some(2),
    },
    RouteEntry {
        from: WBTC,
        to: FXUSD,
        routes: &[
            uint!(0x040007d269dc8063ef5dff34b49595f97151eebfcff5f45801_U256),
            uint!(0x01054062fa20b733978fcbcec244eb8825ae6cfed87c0c_U256),
        ],
        hops: Some(2),
    },
];

lazy_static! {
    static ref LEGACY_TABLE: HashMap<(Address, Address), &'static RouteEntry> =
        LEGACY_ROUTES.iter().map(|e| ((e.from, e.to), e)).collect();

    static ref V3_TABLE: HashMap<(Address, Address), &'static RouteEntry> = LEGACY_ROUTES
        .iter()
        .chain(V3_OVERRIDES.iter())
        .map(|e| ((e.from, e.to), e))
        .collect();
}

/// Look up the converter path from `from` to `to`.
///
/// Identical tokens resolve to an empty route with encoding zero.
pub fn resolve(from: Address, to: Address, table: RouterTable) -> Result<ConvertData> {
    if from == to {
        return Ok(ConvertData::empty());
    }
    let table = match table {
        RouterTable::Legacy => &*LEGACY_TABLE,
        RouterTable::V3 => &*V3_TABLE,
    };
    table
        .get(&(from, to))
        .map(|entry| entry.convert_data())
        .ok_or(SdkError::RouterNotFound { from, to })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_route() {
        let data = resolve(WSTETH, WSTETH, RouterTable::Legacy).unwrap();
        assert!(data.is_empty());
        assert_eq!(data.encoding, U256::ZERO);
    }

    #[test]
    fn test_encoding_word() {
        let data = resolve(FXUSD, WSTETH, RouterTable::Legacy).unwrap();
        assert_eq!(data.routes.len(), 4);
        assert_eq!(data.encoding, U256::from(1_048_575u64 + (4 << 20)));
    }

    #[test]
    fn test_steth_legs_have_no_encoding() {
        let data = resolve(STETH, USDC, RouterTable::Legacy).unwrap();
        assert_eq!(data.routes.len(), 2);
        assert_eq!(data.encoding, U256::ZERO);
    }

    #[test]
    fn test_v3_overrides_only_wbtc_legs() {
        let legacy = resolve(FXUSD, WBTC, RouterTable::Legacy).unwrap();
        let v3 = resolve(FXUSD, WBTC, RouterTable::V3).unwrap();
        assert_ne!(legacy.routes, v3.routes);
        assert_eq!(legacy.routes[0], v3.routes[0]);

        let legacy = resolve(FXUSD, WSTETH, RouterTable::Legacy).unwrap();
        let v3 = resolve(FXUSD, WSTETH, RouterTable::V3).unwrap();
        assert_eq!(legacy, v3);
    }

    #[test]
    fn test_missing_pair() {
        let err = resolve(WBTC, WSTETH, RouterTable::Legacy).unwrap_err();
        assert!(matches!(err, SdkError::RouterNotFound { .. }));
        assert!(err.to_string().starts_with("Router not found for"));
    }
}
