#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PointsError {
    #[error("bill amount must be positive")]
    NonPositiveBill,
    #[error("points rate must be positive")]
    NonPositiveRate,
    #[error("points for bill {bill_amount} at rate {points_rate} exceed the supported range")]
    Overflow { bill_amount: u64, points_rate: u32 },
    #[error("balance of {balance} cannot absorb {awarded} more points")]
    BalanceOverflow { balance: u64, awarded: u64 },
}

/// Points earned for a bill: `bill_amount * points_rate`, both in whole units.
pub fn award_points(bill_amount: u64, points_rate: u32) -> Result<u64, PointsError> {
    if bill_amount == 0 {
        return Err(PointsError::NonPositiveBill);
    }
    if points_rate == 0 {
        return Err(PointsError::NonPositiveRate);
    }

    bill_amount
        .checked_mul(u64::from(points_rate))
        .ok_or(PointsError::Overflow {
            bill_amount,
            points_rate,
        })
}

pub(crate) fn credit_balance(balance: u64, awarded: u64) -> Result<u64, PointsError> {
    balance
        .checked_add(awarded)
        .ok_or(PointsError::BalanceOverflow { balance, awarded })
}
