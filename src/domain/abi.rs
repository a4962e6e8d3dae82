//! Contract ABI Surface - BNPL and ERC-20 Bindings
//!
//! The deployed contracts are consumed only through these `sol!`
//! declarations. Calldata is encoded with `SolCall::abi_encode` and
//! return data / logs are decoded with the generated types, so no
//! hand-packed selectors live anywhere else in the crate.

use alloy::sol;

sol! {
    /// BNPL lending contract: orders, quotes, tiers, liquidity.
    #[derive(Debug, PartialEq, Eq)]
    interface IBnpl {
        struct Order {
            address buyer;
            address merchant;
            uint256 principal;
            uint256 collateral;
            uint256 totalFee;
            uint256 createdAt;
            uint256 dueAt;
            uint256 installments;
            uint256 nominalPrincipal;
            uint256 nominalFee;
            uint256 paidPrincipal;
            uint256 paidFee;
            uint256 paidInstallments;
            bool closed;
        }

        struct Tier {
            uint256 minScore;
            uint16 collateralBps;
            uint16 feeBps;
            uint256 maxLoan;
        }

        // Views
        function getOrder(uint256 id) external view returns (Order memory);
        function quote(uint256 purchaseAmount, address buyer) external view returns (uint256 collateralRequired, uint256 totalFee);
        function creditScore(address who) external view returns (uint16);
        function availableLiquidity() external view returns (uint256);
        function totalDue(uint256 id) external view returns (uint256);
        function tiers(uint256 index) external view returns (Tier memory);
        function getTiersCount() external view returns (uint256);
        function nominalInstallment(uint256 id) external view returns (uint256 principalPart, uint256 feePart);

        // Borrower writes
        function createOrder(uint256 purchaseAmount, address merchant, uint256 dueAt, uint256 installments) external returns (uint256);
        function repayInstallment(uint256 id, uint256 amount) external;
        function repayFull(uint256 id) external;
        function liquidate(uint256 id) external;

        // Admin writes
        function fundLiquidity(uint256 amount) external;
        function withdrawLiquidity(address to, uint256 amount) external;
        function setCreditScore(address who, uint16 score) external;
        function setTier(uint256 idx, uint256 minScore, uint16 collateralBps, uint16 feeBps, uint256 maxLoan) external;

        event OrderCreated(uint256 indexed id, address indexed buyer, address indexed merchant, uint256 principal, uint256 collateral, uint256 totalFee, uint256 dueAt, uint256 installments);
        event InstallmentPaid(uint256 indexed id, address indexed payer, uint256 amount, uint256 paidPrincipal, uint256 paidFee);
        event OrderFullyRepaid(uint256 indexed id, address indexed payer, uint256 totalPaid, uint256 feeDiscount);
        event OrderLiquidated(uint256 indexed id, uint256 seizedCollateral);
        event CreditScoreUpdated(address indexed who, uint16 oldScore, uint16 newScore);
        event LiquidityFunded(address indexed funder, uint256 amount);
        event LiquidityWithdrawn(address indexed to, uint256 amount);
    }
}

sol! {
    /// ERC-20 stablecoin used for collateral, fees and repayments.
    #[derive(Debug, PartialEq, Eq)]
    interface IErc20 {
        function name() external view returns (string);
        function symbol() external view returns (string);
        function decimals() external view returns (uint8);
        function totalSupply() external view returns (uint256);
        function balanceOf(address account) external view returns (uint256);
        function allowance(address owner, address spender) external view returns (uint256);
        function approve(address spender, uint256 amount) external returns (bool);

        event Transfer(address indexed from, address indexed to, uint256 value);
        event Approval(address indexed owner, address indexed spender, uint256 value);
    }
}
