use super::identity::Amount;
use crate::error::{EscrowError, Result};

/// How a disputed escrow is divided between the parties.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Split {
    pub buyer_share: Amount,
    pub seller_share: Amount,
}

/// Divides `amount` giving the buyer `floor(amount * pct / 100)` and the
/// seller the exact remainder.
pub fn split_by_percentage(amount: Amount, buyer_percentage: u8) -> Result<Split> {
    if buyer_percentage > 100 {
        return Err(EscrowError::BadParameter(format!(
            "Buyer percentage must be within 0..=100, got {buyer_percentage}"
        )));
    }
    // Widened so the product cannot overflow for any u64 amount.
    let buyer_share = (u128::from(amount) * u128::from(buyer_percentage) / 100) as Amount;
    Ok(Split {
        buyer_share,
        seller_share: amount - buyer_share,
    })
}

/// Checks that `amount` can be paid out in `tranches` equal parts.
pub fn check_tranches(amount: Amount, tranches: u8, max_tranches: u8) -> Result<()> {
    if tranches == 0 || tranches > max_tranches {
        return Err(EscrowError::BadParameter(format!(
            "Tranche count must be within 1..={max_tranches}, got {tranches}"
        )));
    }
    if tranches > 1 && amount % u64::from(tranches) != 0 {
        return Err(EscrowError::BadParameter(format!(
            "Amount {amount} does not divide evenly into {tranches} tranches"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_split_examples() {
        assert_eq!(
            split_by_percentage(1000, 30).unwrap(),
            Split { buyer_share: 300, seller_share: 700 }
        );
        assert_eq!(
            split_by_percentage(1000, 0).unwrap(),
            Split { buyer_share: 0, seller_share: 1000 }
        );
        assert_eq!(
            split_by_percentage(1000, 100).unwrap(),
            Split { buyer_share: 1000, seller_share: 0 }
        );
    }

    #[test]
    fn test_split_rounds_down_for_buyer() {
        let split = split_by_percentage(999, 33).unwrap();
        assert_eq!(split.buyer_share, 329);
        assert_eq!(split.seller_share, 670);
    }

    #[test]
    fn test_split_rejects_over_hundred() {
        assert!(matches!(
            split_by_percentage(10, 101),
            Err(EscrowError::BadParameter(_))
        ));
    }

    #[test]
    fn test_tranche_checks() {
        assert!(check_tranches(7, 1, 5).is_ok());
        assert!(check_tranches(1000, 4, 5).is_ok());
        assert!(check_tranches(1000, 3, 5).is_err());
        assert!(check_tranches(1000, 0, 5).is_err());
        assert!(check_tranches(1000, 6, 5).is_err());
    }

    proptest! {
        #[test]
        fn prop_split_conserves_amount(amount in any::<u64>(), pct in 0u8..=100) {
            let split = split_by_percentage(amount, pct).unwrap();
            prop_assert_eq!(split.buyer_share + split.seller_share, amount);
            prop_assert!(split.buyer_share <= amount);
        }
    }
}
