//! Deployed contracts and their ABIs
//!
//! Addresses are Ethereum mainnet. Interfaces only declare what the SDK
//! reads or encodes.

use alloy_primitives::{address, Address};
use alloy_sol_types::sol;

// ============================================
// ADDRESSES
// ============================================

/// Multicall3 (same address on all EVM chains)
pub const MULTICALL3: Address = address!("cA11bde05977b3631167028862bE2a173976CA11");

pub const MULTI_PATH_CONVERTER: Address = address!("12AF4529129303D7FbD2563E242C4a2890525912");

/// Diamond proxy hosting the flash-loan position facets
pub const ROUTER_DIAMOND: Address = address!("33636D49FbefBE798e15e7F356E8DBef543CC708");

/// Diamond hosting the plain borrow/repay facet
pub const FX_MINT_ROUTER: Address = address!("B753366082466c4B5984312f0c4Bb97554be067E");

pub const POOL_MANAGER: Address = address!("250893CA4Ba5d05626C785e8da758026928FCD24");
pub const SHORT_POOL_MANAGER: Address = address!("aCDc0AB51178d0Ae8F70c1EAd7d3cF5421FDd66D");
pub const POOL_CONFIGURATION: Address = address!("16b334f2644cc00b85DB1A1efF0C2C395e00C28d");

/// wstETH -> stETH exchange rate
pub const RATE_PROVIDER: Address = address!("81A777c4aB65229d1Bf64DaE4c831bDf628Ccc7f");

pub const WSTETH_LONG_POOL: Address = address!("6Ecfa38FeE8a5277B91eFdA204c235814F0122E8");
pub const WBTC_LONG_POOL: Address = address!("AB709e26Fa6B0A30c119D8c55B887DeD24952473");
pub const WSTETH_SHORT_POOL: Address = address!("25707b9e6690B52C60aE6744d711cf9C1dFC1876");
pub const WBTC_SHORT_POOL: Address = address!("A0cC8162c523998856D59065fAa254F87D20A5b0");

pub const STETH_PRICE_ORACLE: Address = address!("0C5C61025f047cB7e3e85852dC8eAFd7b9a4Abfb");
pub const WBTC_PRICE_ORACLE: Address = address!("b3c90e64EB6f456A5F5C17Aa99b6aecA6f4a6390");
pub const INVERSE_WSTETH_PRICE_ORACLE: Address = address!("222786833b5fd5eE21532d8b576391bAbeFdAAd1");
pub const INVERSE_WBTC_PRICE_ORACLE: Address = address!("5d2c6215555B36889ef235c6d5cCDE22E9964e6a");

// ============================================
// MULTICALL3 INTERFACE
// ============================================

sol! {
    /// Multicall3 - deployed at same address on all EVM chains
    interface IMulticall3 {
        struct Call3 {
            address target;
            bool allowFailure;
            bytes callData;
        }

        struct Result {
            bool success;
            bytes returnData;
        }

        function aggregate3(Call3[] calldata calls)
            external payable returns (Result[] memory returnData);
    }
}

// ============================================
// TOKEN / CONVERTER INTERFACES
// ============================================

sol! {
    interface IERC20 {
        function decimals() external view returns (uint8);
        function allowance(address owner, address spender) external view returns (uint256);
        function approve(address spender, uint256 amount) external returns (bool);
    }

    /// On-chain multi-hop converter used by the FxRoute provider
    interface IMultiPathConverter {
        function queryConvert(uint256 amountIn, uint256 encoding, uint256[] memory routes)
            external returns (uint256 amountOut);
        function convert(address tokenIn, uint256 amountIn, uint256 encoding, uint256[] memory routes)
            external payable returns (uint256 amountOut);
    }
}

// ============================================
// POOL INTERFACES
// ============================================

sol! {
    interface IPoolManager {
        function getPoolInfo(address pool) external view returns (
            uint256 collateralCapacity,
            uint256 collateralBalance,
            uint256 rawCollateral,
            uint256 debtCapacity,
            uint256 debtBalance
        );
        function paused() external view returns (bool);
    }

    /// Pool positions are ERC721 tokens
    interface IPool {
        function getDebtRatioRange() external view returns (uint256 minDebtRatio, uint256 maxDebtRatio);
        function getPosition(uint256 tokenId) external view returns (uint256 rawColls, uint256 rawDebts);
        function ownerOf(uint256 tokenId) external view returns (address);
        function getApproved(uint256 tokenId) external view returns (address);
        function isApprovedForAll(address owner, address operator) external view returns (bool);
        function approve(address to, uint256 tokenId) external;
        function setApprovalForAll(address operator, bool approved) external;
    }

    interface IPoolConfiguration {
        function getPoolFeeRatio(address pool, address recipient) external view returns (
            uint256 supplyRatio,
            uint256 withdrawRatio,
            uint256 borrowRatio,
            uint256 repayRatio
        );
    }

    interface IRateProvider {
        function getRate() external view returns (uint256);
    }

    interface IPriceOracle {
        function getPrice() external view returns (uint256 anchorPrice, uint256 minPrice, uint256 maxPrice);
    }
}

// ============================================
// ROUTER FACETS
// ============================================

sol! {
    #[derive(Debug)]
    struct ConvertInParams {
        address tokenIn;
        uint256 amount;
        address target;
        bytes data;
        uint256 minOut;
        bytes signature;
    }

    #[derive(Debug)]
    struct ConvertOutParams {
        address tokenOut;
        address converter;
        uint256 encodings;
        uint256[] routes;
        uint256 minOut;
        bytes signature;
    }

    interface IPositionOperateFlashLoanFacetV2 {
        function openOrAddPositionFlashLoanV2(
            ConvertInParams memory params,
            address pool,
            uint256 positionId,
            uint256 borrowAmount,
            bytes calldata data
        ) external payable;

        function closeOrRemovePositionFlashLoanV2(
            ConvertOutParams memory params,
            address pool,
            uint256 positionId,
            int256 amountOut,
            uint256 borrowAmount,
            bytes calldata data
        ) external;
    }

    interface IShortPositionOperateFlashLoanFacet {
        function openOrAddShortPositionFlashLoan(
            ConvertInParams memory params,
            address pool,
            uint256 positionId,
            uint256 borrowAmount,
            bytes calldata data
        ) external payable;

        function closeOrRemoveShortPositionFlashLoan(
            ConvertOutParams memory params,
            address pool,
            uint256 positionId,
            int256 amountOut,
            uint256 borrowAmount,
            bytes calldata data
        ) external;
    }

    interface IPositionOperateFacet {
        struct BorrowParams {
            address pool;
            uint256 positionId;
            uint256 borrowAmount;
        }

        struct RepayParams {
            address pool;
            uint256 positionId;
            uint256 withdrawAmount;
        }

        function borrowFromLong(ConvertInParams memory params, BorrowParams memory borrowParams)
            external payable;

        function repayToLong(ConvertInParams memory params, RepayParams memory repayParams)
            external;

        function repayToLongAndZapOut(
            ConvertInParams memory params,
            RepayParams memory repayParams,
            ConvertOutParams memory convertOut
        ) external;
    }
}
