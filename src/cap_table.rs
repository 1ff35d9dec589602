// ⚖️ Cap Table - import + reconciliation
// A closed cap table satisfies:
//   Σ ownership = 100%   and   ownership_i = shares_i / Σ shares * 100
//
// Dilution math assumes both hold; reconcile before computing.

use crate::dilution::{shares_to_percentage, sum_shares, Stakeholder};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

// ============================================================================
// CSV IMPORT
// ============================================================================

/// CSV row: `id,name,shares[,ownership]`
#[derive(Debug, Deserialize)]
struct CapTableRow {
    id: String,
    name: String,
    shares: u64,
    #[serde(default)]
    ownership: Option<f64>,
}

/// Load a cap table from CSV. Rows without ownership get it from shares.
pub fn load_cap_table_csv(csv_path: &Path) -> Result<Vec<Stakeholder>> {
    let mut rdr = csv::Reader::from_path(csv_path)
        .with_context(|| format!("Failed to open cap table CSV: {:?}", csv_path))?;

    let mut rows = Vec::new();
    for (line, result) in rdr.deserialize().enumerate() {
        let row: CapTableRow =
            result.with_context(|| format!("Failed to parse cap table row {}", line + 1))?;
        rows.push(row);
    }

    let total = rows
        .iter()
        .try_fold(0u64, |acc, r| acc.checked_add(r.shares))
        .context("Cap table share total exceeds the supported range")?;
    let stakeholders = rows
        .into_iter()
        .map(|r| Stakeholder {
            current_ownership: r
                .ownership
                .unwrap_or_else(|| shares_to_percentage(r.shares, total)),
            id: r.id,
            name: r.name,
            current_shares: r.shares,
        })
        .collect::<Vec<_>>();

    tracing::info!(rows = stakeholders.len(), total_shares = total, "cap table loaded");

    Ok(stakeholders)
}

/// Overwrite every ownership with shares / total * 100
pub fn recompute_ownership(stakeholders: &mut [Stakeholder]) {
    let total = sum_shares(stakeholders.iter().map(|s| s.current_shares));
    for s in stakeholders.iter_mut() {
        s.current_ownership = shares_to_percentage(s.current_shares, total);
    }
}

// ============================================================================
// RECONCILIATION RESULT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CapTableResult {
    /// Ownership sums to 100% within tolerance
    Balanced { total_ownership: f64 },

    /// Off by less than the major threshold (rounding in source data)
    MinorDiscrepancy { total_ownership: f64, difference: f64 },

    /// Off by the major threshold or more, or the table is empty
    MajorDiscrepancy { total_ownership: f64, difference: f64 },
}

impl CapTableResult {
    pub fn is_balanced(&self) -> bool {
        matches!(self, CapTableResult::Balanced { .. })
    }

    pub fn difference(&self) -> f64 {
        match self {
            CapTableResult::Balanced { .. } => 0.0,
            CapTableResult::MinorDiscrepancy { difference, .. } => *difference,
            CapTableResult::MajorDiscrepancy { difference, .. } => *difference,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DiscrepancyCategory {
    EmptyTable,
    DuplicateStakeholder,
    OwnershipMismatch,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Discrepancy {
    pub stakeholder_id: Option<String>,
    pub description: String,
    pub category: DiscrepancyCategory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapTableReport {
    pub result: CapTableResult,
    pub stakeholder_count: usize,
    pub total_shares: u64,
    pub total_ownership: f64,
    pub discrepancies: Vec<Discrepancy>,
    pub reconciled_at: chrono::DateTime<chrono::Utc>,
}

impl CapTableReport {
    /// Balanced and every row matches its share count
    pub fn is_clean(&self) -> bool {
        self.result.is_balanced() && self.discrepancies.is_empty()
    }

    pub fn summary(&self) -> String {
        format!(
            "Cap table: {} stakeholders, {} shares, {:.4}% total ownership, {} discrepancies",
            self.stakeholder_count,
            self.total_shares,
            self.total_ownership,
            self.discrepancies.len()
        )
    }
}

// ============================================================================
// RECONCILER
// ============================================================================

pub struct CapTableReconciler {
    /// Per-row and total tolerance in percentage points (default: 0.01)
    pub tolerance: f64,

    /// Minor vs major threshold in percentage points (default: 1.0)
    pub major_discrepancy_threshold: f64,
}

impl CapTableReconciler {
    pub fn new() -> Self {
        CapTableReconciler {
            tolerance: 0.01,
            major_discrepancy_threshold: 1.0,
        }
    }

    pub fn with_thresholds(tolerance: f64, major_threshold: f64) -> Self {
        CapTableReconciler {
            tolerance,
            major_discrepancy_threshold: major_threshold,
        }
    }

    pub fn reconcile(&self, stakeholders: &[Stakeholder]) -> CapTableReport {
        let total_shares = sum_shares(stakeholders.iter().map(|s| s.current_shares));
        let total_ownership: f64 = stakeholders.iter().map(|s| s.current_ownership).sum();
        let mut discrepancies = Vec::new();

        if stakeholders.is_empty() {
            discrepancies.push(Discrepancy {
                stakeholder_id: None,
                description: "Cap table has no stakeholders".to_string(),
                category: DiscrepancyCategory::EmptyTable,
            });
        }

        let mut seen = HashSet::new();
        for s in stakeholders {
            if !seen.insert(s.id.as_str()) {
                discrepancies.push(Discrepancy {
                    stakeholder_id: Some(s.id.clone()),
                    description: format!("Stakeholder {} appears more than once", s.id),
                    category: DiscrepancyCategory::DuplicateStakeholder,
                });
            }

            let expected = shares_to_percentage(s.current_shares, total_shares);
            if (expected - s.current_ownership).abs() >= self.tolerance {
                discrepancies.push(Discrepancy {
                    stakeholder_id: Some(s.id.clone()),
                    description: format!(
                        "{} holds {} shares ({:.4}%) but lists {:.4}% ownership",
                        s.name, s.current_shares, expected, s.current_ownership
                    ),
                    category: DiscrepancyCategory::OwnershipMismatch,
                });
            }
        }

        let difference = (total_ownership - 100.0).abs();
        let result = if stakeholders.is_empty() || difference >= self.major_discrepancy_threshold
        {
            CapTableResult::MajorDiscrepancy {
                total_ownership,
                difference,
            }
        } else if difference >= self.tolerance {
            CapTableResult::MinorDiscrepancy {
                total_ownership,
                difference,
            }
        } else {
            CapTableResult::Balanced { total_ownership }
        };

        if !result.is_balanced() || !discrepancies.is_empty() {
            tracing::warn!(
                difference,
                discrepancies = discrepancies.len(),
                "cap table does not reconcile"
            );
        }

        CapTableReport {
            result,
            stakeholder_count: stakeholders.len(),
            total_shares,
            total_ownership,
            discrepancies,
            reconciled_at: chrono::Utc::now(),
        }
    }
}

impl Default for CapTableReconciler {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn balanced_table() -> Vec<Stakeholder> {
        vec![
            Stakeholder::new("founder", "Founder", 7_000, 70.0),
            Stakeholder::new("pool", "Option Pool", 2_000, 20.0),
            Stakeholder::new("seed", "Seed Investor", 1_000, 10.0),
        ]
    }

    #[test]
    fn test_balanced_cap_table() {
        let report = CapTableReconciler::new().reconcile(&balanced_table());

        println!("{}", report.summary());

        assert!(report.is_clean());
        assert_eq!(report.total_shares, 10_000);
        assert_eq!(report.result.difference(), 0.0);
    }

    #[test]
    fn test_minor_rounding_discrepancy() {
        let table = vec![
            Stakeholder::new("a", "A", 1, 33.3),
            Stakeholder::new("b", "B", 1, 33.3),
            Stakeholder::new("c", "C", 1, 33.3),
        ];

        let report = CapTableReconciler::new().reconcile(&table);

        assert!(matches!(report.result, CapTableResult::MinorDiscrepancy { .. }));
        assert!((report.result.difference() - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_major_discrepancy_and_mismatch() {
        let mut table = balanced_table();
        table[2].current_ownership = 25.0;

        let report = CapTableReconciler::new().reconcile(&table);

        assert!(matches!(report.result, CapTableResult::MajorDiscrepancy { .. }));
        assert!(report
            .discrepancies
            .iter()
            .any(|d| d.category == DiscrepancyCategory::OwnershipMismatch
                && d.stakeholder_id.as_deref() == Some("seed")));
    }

    #[test]
    fn test_duplicate_and_empty() {
        let mut table = balanced_table();
        table.push(table[0].clone());
        recompute_ownership(&mut table);

        let report = CapTableReconciler::new().reconcile(&table);
        assert!(report
            .discrepancies
            .iter()
            .any(|d| d.category == DiscrepancyCategory::DuplicateStakeholder));

        let empty = CapTableReconciler::new().reconcile(&[]);
        assert!(!empty.result.is_balanced());
        assert_eq!(empty.discrepancies[0].category, DiscrepancyCategory::EmptyTable);
    }

    #[test]
    fn test_recompute_ownership() {
        let mut table = vec![
            Stakeholder::new("a", "A", 600, 0.0),
            Stakeholder::new("b", "B", 400, 0.0),
        ];
        recompute_ownership(&mut table);

        assert_eq!(table[0].current_ownership, 60.0);
        assert_eq!(table[1].current_ownership, 40.0);
    }

    #[test]
    fn test_load_csv_fills_missing_ownership() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "id,name,shares,ownership").unwrap();
        writeln!(file, "a,Alice,750,").unwrap();
        writeln!(file, "b,Bob,250,25.0").unwrap();
        file.flush().unwrap();

        let table = load_cap_table_csv(file.path()).unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(table[0].name, "Alice");
        assert_eq!(table[0].current_ownership, 75.0);
        assert_eq!(table[1].current_ownership, 25.0);
        assert!(CapTableReconciler::new().reconcile(&table).is_clean());
    }

    #[test]
    fn test_load_csv_rejects_bad_shares() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "id,name,shares").unwrap();
        writeln!(file, "a,Alice,lots").unwrap();
        file.flush().unwrap();

        let err = load_cap_table_csv(file.path()).unwrap_err();
        assert!(err.to_string().contains("row 1"));
    }

    #[test]
    fn test_load_csv_rejects_overflowing_total() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "id,name,shares").unwrap();
        writeln!(file, "a,Alice,{}", u64::MAX).unwrap();
        writeln!(file, "b,Bob,1").unwrap();
        file.flush().unwrap();

        let err = load_cap_table_csv(file.path()).unwrap_err();
        assert!(err.to_string().contains("share total"));
    }

    #[test]
    fn test_reconcile_huge_share_counts() {
        let table = vec![
            Stakeholder::new("a", "A", u64::MAX, 100.0),
            Stakeholder::new("b", "B", u64::MAX, 0.0),
        ];

        let report = CapTableReconciler::new().reconcile(&table);
        assert_eq!(report.total_shares, u64::MAX);
    }
}
