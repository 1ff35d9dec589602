// 🏛️ Accreditation Classifier - Rules as Data
// Maps an investor's financial/professional attributes to a regulatory tier
//
// Rules are an ordered table of predicate → tier entries.
// Qualified Purchaser rules run first; Accredited rules only run if none fired.
// Every rule that fires contributes its own reasoning line + evidence.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// THRESHOLDS
// ============================================================================

pub const INDIVIDUAL_INCOME_THRESHOLD: f64 = 200_000.0;
pub const JOINT_INCOME_THRESHOLD: f64 = 300_000.0;
pub const NET_WORTH_THRESHOLD: f64 = 1_000_000.0;
pub const ENTITY_ASSETS_THRESHOLD: f64 = 5_000_000.0;
pub const TRUST_ASSETS_THRESHOLD: f64 = 5_000_000.0;
pub const QUALIFIED_PURCHASER_THRESHOLD: f64 = 5_000_000.0;

/// Non-accredited investment ceiling (crowdfunding limits)
pub const INVESTMENT_LIMIT_FLOOR: f64 = 2_500.0;
pub const INVESTMENT_LIMIT_CAP: f64 = 124_000.0;

// ============================================================================
// INPUT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvestorType {
    Individual,
    Entity,
    Trust,
}

impl InvestorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvestorType::Individual => "individual",
            InvestorType::Entity => "entity",
            InvestorType::Trust => "trust",
        }
    }
}

/// Snapshot of an investor's attributes.
///
/// Missing figures (`None`) never qualify; they are not an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccreditationCriteria {
    pub investor_type: InvestorType,

    #[serde(default)]
    pub annual_income: Option<f64>,

    #[serde(default)]
    pub joint_income: Option<f64>,

    /// Net worth excluding primary residence
    #[serde(default)]
    pub net_worth: Option<f64>,

    #[serde(default)]
    pub entity_assets: Option<f64>,

    #[serde(default)]
    pub trust_assets: Option<f64>,

    /// Series 7, 65 or 82 in good standing
    #[serde(default)]
    pub has_professional_license: bool,

    #[serde(default)]
    pub all_owners_accredited: bool,

    /// 501(c)(3) or similar tax-exempt organization
    #[serde(default)]
    pub is_qualifying_nonprofit: bool,

    /// Revocable trust whose settlor is accredited
    #[serde(default)]
    pub settlor_accredited: bool,
}

impl AccreditationCriteria {
    /// Blank criteria for the given investor type
    pub fn new(investor_type: InvestorType) -> Self {
        AccreditationCriteria {
            investor_type,
            annual_income: None,
            joint_income: None,
            net_worth: None,
            entity_assets: None,
            trust_assets: None,
            has_professional_license: false,
            all_owners_accredited: false,
            is_qualifying_nonprofit: false,
            settlor_accredited: false,
        }
    }
}

fn at_least(value: Option<f64>, threshold: f64) -> bool {
    matches!(value, Some(v) if v >= threshold)
}

// ============================================================================
// OUTPUT
// ============================================================================

/// Ordered: NonAccredited < Accredited < QualifiedPurchaser
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccreditationStatus {
    NonAccredited,
    Accredited,
    QualifiedPurchaser,
}

impl AccreditationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccreditationStatus::NonAccredited => "non_accredited",
            AccreditationStatus::Accredited => "accredited",
            AccreditationStatus::QualifiedPurchaser => "qualified_purchaser",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AccreditationStatus::NonAccredited => "Non-Accredited",
            AccreditationStatus::Accredited => "Accredited Investor",
            AccreditationStatus::QualifiedPurchaser => "Qualified Purchaser",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccreditationResult {
    pub status: AccreditationStatus,
    pub reasoning: Vec<String>,
    pub meets_requirements: bool,
    pub required_documents: Vec<String>,
}

impl AccreditationResult {
    pub fn summary(&self) -> String {
        format!(
            "{}: {} reason(s), {} document(s) required",
            self.status.label(),
            self.reasoning.len(),
            self.required_documents.len()
        )
    }
}

// ============================================================================
// RULE TABLE
// ============================================================================

/// One qualifying rule: predicate → tier, with its reasoning and evidence.
pub struct AccreditationRule {
    pub id: &'static str,
    pub tier: AccreditationStatus,
    /// `None` = applies to every investor type
    pub applies_to: Option<InvestorType>,
    pub check: fn(&AccreditationCriteria) -> bool,
    pub reason: &'static str,
    pub documents: &'static [&'static str],
}

impl AccreditationRule {
    pub fn matches(&self, criteria: &AccreditationCriteria) -> bool {
        let type_ok = self
            .applies_to
            .map_or(true, |t| t == criteria.investor_type);
        type_ok && (self.check)(criteria)
    }
}

const FINANCIAL_STATEMENTS: &str = "Audited financial statements";
const BROKERAGE_STATEMENTS: &str = "Bank and brokerage statements (last 3 months)";
const TAX_RETURNS: &str = "Tax returns (W-2, 1099 or 1040) for the past two years";
const JOINT_TAX_RETURNS: &str = "Joint tax returns for the past two years";
const CREDIT_REPORT: &str = "Credit report (liabilities verification)";
const LICENSE_VERIFICATION: &str = "FINRA BrokerCheck license verification";
const FORMATION_DOCUMENTS: &str = "Entity formation documents";
const OWNER_VERIFICATIONS: &str = "Accreditation verification for each equity owner";
const TAX_EXEMPT_LETTER: &str = "IRS tax-exempt determination letter";
const TRUST_AGREEMENT: &str = "Trust agreement";
const SETTLOR_VERIFICATION: &str = "Settlor accreditation verification";

/// Qualified Purchaser rules, evaluated before everything else.
pub static QUALIFIED_PURCHASER_RULES: &[AccreditationRule] = &[
    AccreditationRule {
        id: "qp_net_worth",
        tier: AccreditationStatus::QualifiedPurchaser,
        applies_to: Some(InvestorType::Individual),
        check: |c| at_least(c.net_worth, QUALIFIED_PURCHASER_THRESHOLD),
        reason: "Net worth of $5,000,000 or more qualifies as a Qualified Purchaser",
        documents: &[FINANCIAL_STATEMENTS, BROKERAGE_STATEMENTS],
    },
    AccreditationRule {
        id: "qp_entity_assets",
        tier: AccreditationStatus::QualifiedPurchaser,
        applies_to: Some(InvestorType::Entity),
        check: |c| at_least(c.entity_assets, QUALIFIED_PURCHASER_THRESHOLD),
        reason: "Entity investments of $5,000,000 or more qualify as a Qualified Purchaser",
        documents: &[FINANCIAL_STATEMENTS],
    },
];

/// Accredited-tier rules, grouped by investor type, in evaluation order.
pub static ACCREDITED_RULES: &[AccreditationRule] = &[
    // Individual
    AccreditationRule {
        id: "individual_income",
        tier: AccreditationStatus::Accredited,
        applies_to: Some(InvestorType::Individual),
        check: |c| at_least(c.annual_income, INDIVIDUAL_INCOME_THRESHOLD),
        reason: "Individual income of $200,000 or more in each of the past two years",
        documents: &[TAX_RETURNS],
    },
    AccreditationRule {
        id: "joint_income",
        tier: AccreditationStatus::Accredited,
        applies_to: Some(InvestorType::Individual),
        check: |c| at_least(c.joint_income, JOINT_INCOME_THRESHOLD),
        reason: "Joint income with spouse of $300,000 or more in each of the past two years",
        documents: &[JOINT_TAX_RETURNS],
    },
    AccreditationRule {
        id: "individual_net_worth",
        tier: AccreditationStatus::Accredited,
        applies_to: Some(InvestorType::Individual),
        check: |c| at_least(c.net_worth, NET_WORTH_THRESHOLD),
        reason: "Net worth over $1,000,000, excluding primary residence",
        documents: &[BROKERAGE_STATEMENTS, CREDIT_REPORT],
    },
    AccreditationRule {
        id: "professional_license",
        tier: AccreditationStatus::Accredited,
        applies_to: Some(InvestorType::Individual),
        check: |c| c.has_professional_license,
        reason: "Holds a qualifying professional license (Series 7, 65 or 82)",
        documents: &[LICENSE_VERIFICATION],
    },
    // Entity
    AccreditationRule {
        id: "entity_assets",
        tier: AccreditationStatus::Accredited,
        applies_to: Some(InvestorType::Entity),
        check: |c| at_least(c.entity_assets, ENTITY_ASSETS_THRESHOLD),
        reason: "Entity with total assets exceeding $5,000,000",
        documents: &[FINANCIAL_STATEMENTS, FORMATION_DOCUMENTS],
    },
    AccreditationRule {
        id: "entity_owners_accredited",
        tier: AccreditationStatus::Accredited,
        applies_to: Some(InvestorType::Entity),
        check: |c| c.all_owners_accredited,
        reason: "All equity owners are accredited investors",
        documents: &[OWNER_VERIFICATIONS, FORMATION_DOCUMENTS],
    },
    AccreditationRule {
        id: "qualifying_nonprofit",
        tier: AccreditationStatus::Accredited,
        applies_to: Some(InvestorType::Entity),
        check: |c| {
            c.is_qualifying_nonprofit && at_least(c.entity_assets, ENTITY_ASSETS_THRESHOLD)
        },
        reason: "Tax-exempt organization with assets exceeding $5,000,000",
        documents: &[TAX_EXEMPT_LETTER, FINANCIAL_STATEMENTS],
    },
    // Trust
    AccreditationRule {
        id: "trust_assets",
        tier: AccreditationStatus::Accredited,
        applies_to: Some(InvestorType::Trust),
        check: |c| at_least(c.trust_assets, TRUST_ASSETS_THRESHOLD),
        reason: "Trust with total assets exceeding $5,000,000",
        documents: &[TRUST_AGREEMENT, FINANCIAL_STATEMENTS],
    },
    AccreditationRule {
        id: "settlor_accredited",
        tier: AccreditationStatus::Accredited,
        applies_to: Some(InvestorType::Trust),
        check: |c| c.settlor_accredited,
        reason: "Revocable trust whose settlor is an accredited investor",
        documents: &[TRUST_AGREEMENT, SETTLOR_VERIFICATION],
    },
];

// ============================================================================
// CLASSIFIER
// ============================================================================

/// Classify an investor. Never fails.
pub fn determine_accreditation(criteria: &AccreditationCriteria) -> AccreditationResult {
    let mut status = AccreditationStatus::NonAccredited;
    let mut reasoning = Vec::new();
    let mut required_documents: Vec<String> = Vec::new();

    let mut fired: Vec<&AccreditationRule> = matching_rules(QUALIFIED_PURCHASER_RULES, criteria);
    if fired.is_empty() {
        fired = matching_rules(ACCREDITED_RULES, criteria);
    }

    for rule in fired {
        status = status.max(rule.tier);
        reasoning.push(rule.reason.to_string());
        for doc in rule.documents {
            if !required_documents.iter().any(|d| d == doc) {
                required_documents.push(doc.to_string());
            }
        }
    }

    if status == AccreditationStatus::NonAccredited {
        reasoning.push("Does not meet accreditation requirements".to_string());
        if criteria.investor_type == InvestorType::Individual {
            reasoning.extend(individual_shortfalls(criteria));
        }
    }

    tracing::debug!(
        investor_type = criteria.investor_type.as_str(),
        status = status.as_str(),
        reasons = reasoning.len(),
        "accreditation determined"
    );

    AccreditationResult {
        status,
        meets_requirements: status != AccreditationStatus::NonAccredited,
        reasoning,
        required_documents,
    }
}

fn matching_rules<'a>(
    rules: &'a [AccreditationRule],
    criteria: &AccreditationCriteria,
) -> Vec<&'a AccreditationRule> {
    rules.iter().filter(|r| r.matches(criteria)).collect()
}

// Entities and trusts only get the generic line above.
fn individual_shortfalls(criteria: &AccreditationCriteria) -> Vec<String> {
    let mut gaps = Vec::new();

    if !at_least(criteria.annual_income, INDIVIDUAL_INCOME_THRESHOLD) {
        gaps.push("Annual income below $200,000".to_string());
    }
    if !at_least(criteria.joint_income, JOINT_INCOME_THRESHOLD) {
        gaps.push("Joint income below $300,000".to_string());
    }
    if !at_least(criteria.net_worth, NET_WORTH_THRESHOLD) {
        gaps.push("Net worth below $1,000,000 (excluding primary residence)".to_string());
    }
    if !criteria.has_professional_license {
        gaps.push("No qualifying professional license (Series 7, 65 or 82)".to_string());
    }

    gaps
}

// ============================================================================
// NET WORTH
// ============================================================================

/// Net worth excluding the primary residence.
///
/// An underwater mortgage (mortgage > home value) still counts the excess
/// against net worth.
pub fn calculate_net_worth(
    total_assets: f64,
    total_liabilities: f64,
    primary_residence_value: f64,
    primary_residence_mortgage: f64,
) -> f64 {
    let assets_excluding_home = total_assets - primary_residence_value;
    let underwater = (primary_residence_mortgage - primary_residence_value).max(0.0);
    let liabilities_excluding_mortgage =
        total_liabilities - primary_residence_mortgage + underwater;

    assets_excluding_home - liabilities_excluding_mortgage
}

// ============================================================================
// INCOME HISTORY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomeHistoryCheck {
    /// At least two distinct years of history
    pub is_consistent: bool,
    /// Both of the two most recent years clear $200,000
    pub meets_requirement: bool,
    /// Most recent first
    pub years_checked: Vec<i32>,
    pub average_income: Option<f64>,
}

pub fn validate_income_history(income_by_year: &BTreeMap<i32, f64>) -> IncomeHistoryCheck {
    if income_by_year.len() < 2 {
        return IncomeHistoryCheck {
            is_consistent: false,
            meets_requirement: false,
            years_checked: Vec::new(),
            average_income: None,
        };
    }

    let recent: Vec<(i32, f64)> = income_by_year
        .iter()
        .rev()
        .take(2)
        .map(|(year, income)| (*year, *income))
        .collect();

    let meets_requirement = recent
        .iter()
        .all(|(_, income)| *income >= INDIVIDUAL_INCOME_THRESHOLD);
    let average = recent.iter().map(|(_, income)| income).sum::<f64>() / recent.len() as f64;

    IncomeHistoryCheck {
        is_consistent: true,
        meets_requirement,
        years_checked: recent.iter().map(|(year, _)| *year).collect(),
        average_income: Some(average),
    }
}

// ============================================================================
// INVESTMENT LIMIT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "amount", rename_all = "snake_case")]
pub enum InvestmentLimit {
    Unlimited,
    /// Maximum aggregate investment over a 12-month period
    Capped(f64),
}

impl InvestmentLimit {
    pub fn allows(&self, amount: f64) -> bool {
        match self {
            InvestmentLimit::Unlimited => true,
            InvestmentLimit::Capped(limit) => amount <= *limit,
        }
    }
}

/// Investment ceiling that follows from the accreditation tier.
///
/// Accredited investors are unlimited. Everyone else gets the crowdfunding
/// ceiling computed from the greater of annual income and net worth.
pub fn annual_investment_limit(
    criteria: &AccreditationCriteria,
    status: AccreditationStatus,
) -> InvestmentLimit {
    if status != AccreditationStatus::NonAccredited {
        return InvestmentLimit::Unlimited;
    }

    let income = criteria.annual_income.unwrap_or(0.0).max(0.0);
    let net_worth = criteria.net_worth.unwrap_or(0.0).max(0.0);
    let greater = income.max(net_worth);

    let limit = if income < INVESTMENT_LIMIT_CAP || net_worth < INVESTMENT_LIMIT_CAP {
        (greater * 0.05).max(INVESTMENT_LIMIT_FLOOR)
    } else {
        greater * 0.10
    };

    InvestmentLimit::Capped(limit.min(INVESTMENT_LIMIT_CAP))
}

// ============================================================================
// TESTS
// ============================================================================
