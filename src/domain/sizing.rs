//! Risk sizing: order size and limit price from portfolio state.
//!
//! Pure and deterministic. Sizes are a fixed fraction of the portfolio's
//! max withdrawal, scaled by leverage and converted to base units at the
//! market price. Both size and price are floored to the instrument step so
//! an order never requests more buying power than the cap allows.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::domain::trade::PortfolioSummary;
use crate::error::{EngineError, Result};

/// Floor `value` to a multiple of `step`.
///
/// Idempotent: flooring an already floored value returns it unchanged.
pub fn floor_to_step(value: Decimal, step: Decimal) -> Result<Decimal> {
    if step <= Decimal::ZERO {
        return Err(EngineError::InvalidInput(format!(
            "step must be positive, got {step}"
        )));
    }
    let steps = value
        .checked_div(step)
        .ok_or_else(|| EngineError::InvalidInput(format!("{value} / {step} overflows")))?
        .floor();
    steps
        .checked_mul(step)
        .map(|d| d.normalize())
        .ok_or_else(|| EngineError::InvalidInput(format!("{steps} * {step} overflows")))
}

/// Order parameters produced by the calculator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizedOrder {
    /// Quantity in base units, floored to the size step.
    pub base_size: Decimal,
    /// Buy-side limit price, floored to the price step.
    pub limit_price: Decimal,
    /// Notional cap the size was derived from.
    pub notional_cap: Decimal,
}

impl SizedOrder {
    /// Whether the floored size is too small to submit.
    pub fn is_empty(&self) -> bool {
        self.base_size <= Decimal::ZERO
    }
}

/// Fixed fraction-of-max-withdrawal sizing rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RiskSizer {
    /// Share of max withdrawal committed per order (0.5 = half).
    allocation_fraction: Decimal,
    /// Multiplier on market price for buy-side limits (< 1 bids below market).
    price_slippage_factor: Decimal,
    /// Instrument base-size increment.
    size_step: Decimal,
    /// Instrument price increment.
    price_step: Decimal,
}

impl RiskSizer {
    /// Default allocation: commit at most half of max withdrawal per order.
    pub const DEFAULT_ALLOCATION_FRACTION: Decimal = dec!(0.5);
    /// Default buy-side slippage: bid 0.5% below market.
    pub const DEFAULT_PRICE_SLIPPAGE_FACTOR: Decimal = dec!(0.995);

    /// Create a sizer, validating every policy parameter.
    pub fn new(
        allocation_fraction: Decimal,
        price_slippage_factor: Decimal,
        size_step: Decimal,
        price_step: Decimal,
    ) -> Result<Self> {
        if allocation_fraction <= Decimal::ZERO || allocation_fraction > Decimal::ONE {
            return Err(EngineError::InvalidInput(format!(
                "allocation_fraction must be in (0, 1], got {allocation_fraction}"
            )));
        }
        if price_slippage_factor <= Decimal::ZERO || price_slippage_factor > Decimal::ONE {
            return Err(EngineError::InvalidInput(format!(
                "price_slippage_factor must be in (0, 1], got {price_slippage_factor}"
            )));
        }
        if size_step <= Decimal::ZERO || price_step <= Decimal::ZERO {
            return Err(EngineError::InvalidInput(format!(
                "steps must be positive, got size_step={size_step} price_step={price_step}"
            )));
        }
        Ok(Self {
            allocation_fraction,
            price_slippage_factor,
            size_step,
            price_step,
        })
    }

    /// Default policy with the given instrument steps.
    pub fn with_steps(size_step: Decimal, price_step: Decimal) -> Result<Self> {
        Self::new(
            Self::DEFAULT_ALLOCATION_FRACTION,
            Self::DEFAULT_PRICE_SLIPPAGE_FACTOR,
            size_step,
            price_step,
        )
    }

    pub const fn allocation_fraction(&self) -> Decimal {
        self.allocation_fraction
    }

    pub const fn price_slippage_factor(&self) -> Decimal {
        self.price_slippage_factor
    }

    /// Compute size and limit price.
    ///
    ///   base_size   = floor(leverage * max_withdrawal * allocation / price, size_step)
    ///   limit_price = floor(price * slippage, price_step)
    pub fn size(
        &self,
        summary: &PortfolioSummary,
        market_price: Decimal,
        leverage: Decimal,
    ) -> Result<SizedOrder> {
        if market_price <= Decimal::ZERO {
            return Err(EngineError::InvalidInput(format!(
                "market price must be positive, got {market_price}"
            )));
        }
        if leverage <= Decimal::ZERO {
            return Err(EngineError::InvalidInput(format!(
                "leverage must be positive, got {leverage}"
            )));
        }

        let overflow = || EngineError::InvalidInput("order sizing overflowed".to_string());

        let notional_cap = leverage
            .checked_mul(summary.max_withdrawal.max(Decimal::ZERO))
            .and_then(|v| v.checked_mul(self.allocation_fraction))
            .ok_or_else(overflow)?;
        let raw_size = notional_cap.checked_div(market_price).ok_or_else(overflow)?;
        let base_size = floor_to_step(raw_size, self.size_step)?;

        let raw_price = market_price
            .checked_mul(self.price_slippage_factor)
            .ok_or_else(overflow)?;
        let limit_price = floor_to_step(raw_price, self.price_step)?;

        Ok(SizedOrder {
            base_size,
            limit_price,
            notional_cap,
        })
    }
}

impl Default for RiskSizer {
    /// Half of max withdrawal, 0.995 slippage, BTC-PERP-INTX steps.
    fn default() -> Self {
        Self {
            allocation_fraction: Self::DEFAULT_ALLOCATION_FRACTION,
            price_slippage_factor: Self::DEFAULT_PRICE_SLIPPAGE_FACTOR,
            size_step: dec!(0.001),
            price_step: dec!(0.1),
        }
    }
}
