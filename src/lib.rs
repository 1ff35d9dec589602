// Nexus Equity - Core Library
// Ownership & accreditation calculators, exposed for the CLI, API server, and tests

pub mod accreditation;
pub mod dilution;
pub mod severity;
pub mod format;
pub mod cap_table;
pub mod db;
pub mod config;

#[cfg(feature = "server")]
pub mod api;

// Re-export commonly used types
pub use accreditation::{
    AccreditationCriteria, AccreditationResult, AccreditationRule, AccreditationStatus,
    IncomeHistoryCheck, InvestmentLimit, InvestorType,
    annual_investment_limit, calculate_net_worth, determine_accreditation,
    validate_income_history,
};
pub use dilution::{
    DilutionImpact, NewInvestment, Stakeholder, StakeholderDilution, ValuationImpact,
    ValueChange,
    calculate_dilution, calculate_ownership_with_new_investors, calculate_valuation_impact,
    percentage_to_shares, requires_special_warning, shares_to_percentage, sum_shares,
};
pub use severity::{DilutionSeverity, SeverityBadge, get_dilution_severity};
pub use format::{
    format_currency, format_percentage, format_shares, format_signed_percentage_points,
};
pub use cap_table::{
    CapTableReconciler, CapTableReport, CapTableResult, Discrepancy, DiscrepancyCategory,
    load_cap_table_csv, recompute_ownership,
};
pub use db::{
    CapTableSummary, Event, Scenario,
    setup_database, save_cap_table, load_cap_table, list_cap_tables,
    record_scenario, find_recorded_scenario_id, get_scenarios, insert_event,
    get_events_for_entity,
};
pub use config::{AppConfig, init_tracing};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
