// 📉 Dilution Calculator - ownership before/after a share issuance
//
// Formula:
//   total_after   = total_before + new_shares
//   new_ownership = current_shares / total_after * 100
//   dilution      = current_ownership - new_ownership   (pp, positive = lost ground)
//
// Dilution comes from the denominator growing; share counts never shrink.

use crate::severity::{get_dilution_severity, DilutionSeverity};
use serde::{Deserialize, Serialize};

/// Relative dilution alarm thresholds (|dilution_percent|)
pub const FOUNDER_WARNING_THRESHOLD: f64 = 10.0;
pub const STAKEHOLDER_WARNING_THRESHOLD: f64 = 20.0;

// ============================================================================
// CAP TABLE ROW
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stakeholder {
    pub id: String,
    pub name: String,
    pub current_shares: u64,
    /// 0-100, should equal current_shares / total outstanding * 100
    pub current_ownership: f64,
}

impl Stakeholder {
    pub fn new(id: &str, name: &str, current_shares: u64, current_ownership: f64) -> Self {
        Stakeholder {
            id: id.to_string(),
            name: name.to_string(),
            current_shares,
            current_ownership,
        }
    }
}

/// Dollar value of a stake before and after the round
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueChange {
    pub current_value: f64,
    pub new_value: f64,
    /// Can be positive under dilution when the valuation step-up outpaces the loss
    pub actual_change: f64,
}

/// A stakeholder with the fields derived by a dilution computation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StakeholderDilution {
    #[serde(flatten)]
    pub stakeholder: Stakeholder,
    pub new_shares: u64,
    pub new_ownership: f64,
    pub dilution: f64,
    pub dilution_percent: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<ValueChange>,
}

impl StakeholderDilution {
    pub fn severity(&self) -> DilutionSeverity {
        get_dilution_severity(self.dilution_percent)
    }

    /// Stakeholder was added by this round (no prior stake)
    pub fn is_new_investor(&self) -> bool {
        self.stakeholder.current_shares == 0 && self.new_shares > 0
    }
}

// ============================================================================
// AGGREGATE RESULT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DilutionImpact {
    pub stakeholders: Vec<StakeholderDilution>,
    pub total_shares_before: u64,
    pub total_shares_after: u64,
    pub new_shares_issued: u64,
}

impl DilutionImpact {
    pub fn total_ownership_after(&self) -> f64 {
        self.stakeholders.iter().map(|s| s.new_ownership).sum()
    }

    /// Ownership left over for the incoming (unlisted) investors
    pub fn issued_ownership(&self) -> f64 {
        if self.total_shares_after == 0 {
            return 0.0;
        }
        self.new_shares_issued as f64 / self.total_shares_after as f64 * 100.0
    }

    pub fn most_diluted(&self) -> Option<&StakeholderDilution> {
        self.stakeholders
            .iter()
            .filter(|s| !s.is_new_investor())
            .max_by(|a, b| a.dilution.total_cmp(&b.dilution))
    }

    pub fn summary(&self) -> String {
        format!(
            "{} stakeholders: {} → {} shares (+{} issued, {:.2}% of post-round)",
            self.stakeholders.len(),
            self.total_shares_before,
            self.total_shares_after,
            self.new_shares_issued,
            self.issued_ownership()
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValuationImpact {
    pub pre_money_valuation: f64,
    pub post_money_valuation: f64,
    pub price_per_share_before: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_per_share_after: Option<f64>,
}

/// A brand-new investor joining the cap table this round
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewInvestment {
    pub id: String,
    pub name: String,
    pub shares: u64,
    #[serde(default)]
    pub amount: Option<f64>,
}

// ============================================================================
// CALCULATIONS
// ============================================================================

/// Sum of share counts, pinned at `u64::MAX` instead of wrapping
pub fn sum_shares(shares: impl IntoIterator<Item = u64>) -> u64 {
    shares.into_iter().fold(0, u64::saturating_add)
}

fn dilute(
    stakeholder: &Stakeholder,
    total_after: u64,
    valuations: Option<(f64, f64)>,
) -> StakeholderDilution {
    let new_ownership = shares_to_percentage(stakeholder.current_shares, total_after);
    let dilution = stakeholder.current_ownership - new_ownership;

    // No prior stake: relative dilution is defined as zero
    let dilution_percent = if stakeholder.current_ownership == 0.0 {
        0.0
    } else {
        dilution / stakeholder.current_ownership * 100.0
    };

    let value = valuations.map(|(pre, post)| {
        let current_value = stakeholder.current_ownership / 100.0 * pre;
        let new_value = new_ownership / 100.0 * post;
        ValueChange {
            current_value,
            new_value,
            actual_change: new_value - current_value,
        }
    });

    StakeholderDilution {
        stakeholder: stakeholder.clone(),
        new_shares: stakeholder.current_shares,
        new_ownership,
        dilution,
        dilution_percent,
        value,
    }
}

/// Post-issuance ownership for every stakeholder.
///
/// Dollar values are only computed when both valuations are supplied.
pub fn calculate_dilution(
    current_cap_table: &[Stakeholder],
    new_shares: u64,
    valuation_pre: Option<f64>,
    valuation_post: Option<f64>,
) -> DilutionImpact {
    let total_shares_before = sum_shares(current_cap_table.iter().map(|s| s.current_shares));
    let total_shares_after = total_shares_before.saturating_add(new_shares);
    let valuations = valuation_pre.zip(valuation_post);

    let stakeholders = current_cap_table
        .iter()
        .map(|s| dilute(s, total_shares_after, valuations))
        .collect();

    tracing::debug!(
        total_shares_before,
        total_shares_after,
        new_shares,
        "dilution calculated"
    );

    DilutionImpact {
        stakeholders,
        total_shares_before,
        total_shares_after,
        new_shares_issued: new_shares,
    }
}

/// Fold new investors into the cap table.
///
/// Existing holders are diluted by the combined issuance; each new investor
/// appears with no prior stake.
pub fn calculate_ownership_with_new_investors(
    current_cap_table: &[Stakeholder],
    new_investments: &[NewInvestment],
) -> DilutionImpact {
    let new_shares = sum_shares(new_investments.iter().map(|i| i.shares));
    let mut impact = calculate_dilution(current_cap_table, new_shares, None, None);

    for investment in new_investments {
        let new_ownership = shares_to_percentage(investment.shares, impact.total_shares_after);
        impact.stakeholders.push(StakeholderDilution {
            stakeholder: Stakeholder::new(&investment.id, &investment.name, 0, 0.0),
            new_shares: investment.shares,
            new_ownership,
            dilution: -new_ownership,
            dilution_percent: 0.0,
            value: None,
        });
    }

    impact
}

pub fn calculate_valuation_impact(
    pre_money_valuation: f64,
    investment: f64,
    total_shares_before: u64,
    new_shares: u64,
) -> ValuationImpact {
    let post_money_valuation = pre_money_valuation + investment;
    let total_after = total_shares_before.saturating_add(new_shares);

    let price_per_share_before = if total_shares_before == 0 {
        0.0
    } else {
        pre_money_valuation / total_shares_before as f64
    };
    let price_per_share_after =
        (total_after > 0).then(|| post_money_valuation / total_after as f64);

    ValuationImpact {
        pre_money_valuation,
        post_money_valuation,
        price_per_share_before,
        price_per_share_after,
    }
}

// ============================================================================
// CONVERTERS + WARNINGS
// ============================================================================

pub fn percentage_to_shares(percentage: f64, total_shares: u64) -> u64 {
    if total_shares == 0 || percentage <= 0.0 {
        return 0;
    }
    (percentage / 100.0 * total_shares as f64).round() as u64
}

pub fn shares_to_percentage(shares: u64, total_shares: u64) -> f64 {
    if total_shares == 0 {
        return 0.0;
    }
    shares as f64 / total_shares as f64 * 100.0
}

/// Founders get the more sensitive alarm.
pub fn requires_special_warning(stakeholder: &StakeholderDilution, is_founder: bool) -> bool {
    let threshold = if is_founder {
        FOUNDER_WARNING_THRESHOLD
    } else {
        STAKEHOLDER_WARNING_THRESHOLD
    };
    stakeholder.dilution_percent.abs() >= threshold
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn two_holder_table() -> Vec<Stakeholder> {
        vec![
            Stakeholder::new("a", "Alice", 600, 60.0),
            Stakeholder::new("b", "Bob", 400, 40.0),
        ]
    }

    #[test]
    fn test_proportional_issuance_dilutes_equally() {
        let impact = calculate_dilution(&two_holder_table(), 1000, None, None);

        assert_eq!(impact.total_shares_before, 1000);
        assert_eq!(impact.total_shares_after, 2000);
        assert_eq!(impact.new_shares_issued, 1000);

        let a = &impact.stakeholders[0];
        assert!((a.new_ownership - 30.0).abs() < EPS);
        assert!((a.dilution - 30.0).abs() < EPS);
        assert!((a.dilution_percent - 50.0).abs() < EPS);
        assert_eq!(a.new_shares, 600);

        let b = &impact.stakeholders[1];
        assert!((b.new_ownership - 20.0).abs() < EPS);
        assert!((b.dilution - 20.0).abs() < EPS);
        assert!((b.dilution_percent - 50.0).abs() < EPS);
        assert!(a.value.is_none());
    }

    #[test]
    fn test_zero_new_shares_is_identity() {
        let impact = calculate_dilution(&two_holder_table(), 0, None, None);

        for s in &impact.stakeholders {
            assert!((s.new_ownership - s.stakeholder.current_ownership).abs() < EPS);
            assert!(s.dilution.abs() < EPS);
            assert!(s.dilution_percent.abs() < EPS);
        }
        assert!((impact.total_ownership_after() - 100.0).abs() < EPS);
    }

    #[test]
    fn test_value_change_with_step_up() {
        // 1M pre, 4M post: stake halves but valuation quadruples
        let impact = calculate_dilution(
            &two_holder_table(),
            1000,
            Some(1_000_000.0),
            Some(4_000_000.0),
        );

        let a = impact.stakeholders[0].value.unwrap();
        assert!((a.current_value - 600_000.0).abs() < 1e-6);
        assert!((a.new_value - 1_200_000.0).abs() < 1e-6);
        assert!(a.actual_change > 0.0);
    }

    #[test]
    fn test_value_requires_both_valuations() {
        let impact = calculate_dilution(&two_holder_table(), 500, Some(1_000_000.0), None);
        assert!(impact.stakeholders.iter().all(|s| s.value.is_none()));
    }

    #[test]
    fn test_new_investors_fold_in() {
        let investments = vec![
            NewInvestment {
                id: "vc".to_string(),
                name: "Venture Fund".to_string(),
                shares: 750,
                amount: Some(1_500_000.0),
            },
            NewInvestment {
                id: "angel".to_string(),
                name: "Angel".to_string(),
                shares: 250,
                amount: None,
            },
        ];

        let impact = calculate_ownership_with_new_investors(&two_holder_table(), &investments);

        assert_eq!(impact.new_shares_issued, 1000);
        assert_eq!(impact.total_shares_after, 2000);
        assert_eq!(impact.stakeholders.len(), 4);

        let vc = &impact.stakeholders[2];
        assert!(vc.is_new_investor());
        assert_eq!(vc.stakeholder.current_shares, 0);
        assert_eq!(vc.stakeholder.current_ownership, 0.0);
        assert_eq!(vc.new_shares, 750);
        assert!((vc.new_ownership - 37.5).abs() < EPS);
        assert_eq!(vc.dilution_percent, 0.0);
        assert!(!vc.dilution_percent.is_nan());

        assert!((impact.total_ownership_after() - 100.0).abs() < EPS);
        assert_eq!(impact.most_diluted().unwrap().stakeholder.id, "a");
    }

    #[test]
    fn test_empty_cap_table() {
        let impact = calculate_dilution(&[], 100, None, None);
        assert!(impact.stakeholders.is_empty());
        assert_eq!(impact.total_shares_after, 100);
        assert!((impact.issued_ownership() - 100.0).abs() < EPS);
    }

    #[test]
    fn test_percentage_share_round_trip() {
        let total = 10_000_000;
        for p in [0.0, 0.5, 12.345, 33.3333, 50.0, 99.99, 100.0] {
            let shares = percentage_to_shares(p, total);
            let back = shares_to_percentage(shares, total);
            assert!((back - p).abs() <= 100.0 / total as f64, "p={p} back={back}");
        }
    }

    #[test]
    fn test_converters_guard_zero_total() {
        assert_eq!(percentage_to_shares(50.0, 0), 0);
        assert_eq!(shares_to_percentage(10, 0), 0.0);
    }

    #[test]
    fn test_huge_share_counts_saturate() {
        let table = vec![
            Stakeholder::new("a", "Alice", u64::MAX, 100.0),
            Stakeholder::new("b", "Bob", 10, 0.0),
        ];

        let impact = calculate_dilution(&table, 1, None, None);
        assert_eq!(impact.total_shares_before, u64::MAX);
        assert_eq!(impact.total_shares_after, u64::MAX);
        assert!(impact.stakeholders[0].new_ownership <= 100.0);

        let investments = vec![
            NewInvestment {
                id: "x".to_string(),
                name: "X".to_string(),
                shares: u64::MAX,
                amount: None,
            },
            NewInvestment {
                id: "y".to_string(),
                name: "Y".to_string(),
                shares: u64::MAX,
                amount: None,
            },
        ];
        let impact = calculate_ownership_with_new_investors(&[], &investments);
        assert_eq!(impact.new_shares_issued, u64::MAX);

        let v = calculate_valuation_impact(1_000.0, 0.0, u64::MAX, 5);
        assert!(v.price_per_share_after.is_some());
    }

    fn row_with_relative_dilution(dilution_percent: f64) -> StakeholderDilution {
        StakeholderDilution {
            stakeholder: Stakeholder::new("s", "Holder", 100, 10.0),
            new_shares: 100,
            new_ownership: 10.0 * (1.0 - dilution_percent / 100.0),
            dilution: 10.0 * dilution_percent / 100.0,
            dilution_percent,
            value: None,
        }
    }

    #[test]
    fn test_special_warning_founder_boundary() {
        assert!(requires_special_warning(&row_with_relative_dilution(10.0), true));
        assert!(!requires_special_warning(&row_with_relative_dilution(9.99), true));
        assert!(!requires_special_warning(&row_with_relative_dilution(10.0), false));
    }

    #[test]
    fn test_special_warning_stakeholder_boundary() {
        assert!(requires_special_warning(&row_with_relative_dilution(20.0), false));
        assert!(!requires_special_warning(&row_with_relative_dilution(19.99), false));
        assert!(requires_special_warning(&row_with_relative_dilution(19.99), true));
        // Magnitude counts, not direction
        assert!(requires_special_warning(&row_with_relative_dilution(-20.0), false));
    }

    #[test]
    fn test_special_warning_thresholds() {
        let mut table = vec![Stakeholder::new("f", "Founder", 880, 88.0)];
        table.push(Stakeholder::new("o", "Other", 120, 12.0));

        // 1000 → 1136: everyone loses ~12% relative
        let impact = calculate_dilution(&table, 136, None, None);
        let founder = &impact.stakeholders[0];

        assert!(requires_special_warning(founder, true));
        assert!(!requires_special_warning(founder, false));
    }

    #[test]
    fn test_valuation_impact() {
        let v = calculate_valuation_impact(8_000_000.0, 2_000_000.0, 1_000_000, 250_000);

        assert_eq!(v.post_money_valuation, 10_000_000.0);
        assert_eq!(v.price_per_share_before, 8.0);
        assert_eq!(v.price_per_share_after, Some(8.0));

        let empty = calculate_valuation_impact(1_000.0, 0.0, 0, 0);
        assert_eq!(empty.price_per_share_before, 0.0);
        assert_eq!(empty.price_per_share_after, None);
    }

    #[test]
    fn test_serialized_row_is_flat() {
        let impact = calculate_dilution(&two_holder_table(), 1000, None, None);
        let json = serde_json::to_value(&impact.stakeholders[0]).unwrap();

        assert_eq!(json["id"], "a");
        assert_eq!(json["current_shares"], 600);
        assert!(json.get("value").is_none());
    }
}
