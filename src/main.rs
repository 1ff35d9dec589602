// Only compile UI module when TUI feature is enabled
#[cfg(feature = "tui")]
mod ui;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rusqlite::Connection;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use nexus_equity::{
    annual_investment_limit, calculate_dilution, calculate_net_worth, determine_accreditation,
    format_currency, format_percentage, format_shares, format_signed_percentage_points,
    init_tracing, load_cap_table, load_cap_table_csv, record_scenario, requires_special_warning,
    save_cap_table, setup_database, validate_income_history, AccreditationCriteria, AppConfig,
    CapTableReconciler, DilutionImpact, InvestmentLimit, Scenario,
};

#[derive(Parser)]
#[command(name = "nexus-equity", version, about = "Cap table dilution and investor accreditation")]
struct Cli {
    /// JSON config file (env vars still override)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Scenario store path (overrides config)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Classify an investor from a JSON criteria file
    Accredit { criteria: PathBuf },

    /// Net worth excluding primary residence
    NetWorth {
        #[arg(long)]
        assets: f64,
        #[arg(long)]
        liabilities: f64,
        #[arg(long, default_value_t = 0.0)]
        residence: f64,
        #[arg(long, default_value_t = 0.0)]
        mortgage: f64,
    },

    /// Check two-year income history, e.g. `2023=250000 2024=260000`
    IncomeHistory { entries: Vec<String> },

    /// Import a cap table CSV (id,name,shares[,ownership]) into the store
    Import {
        csv: PathBuf,
        #[arg(long)]
        name: String,
    },

    /// Dilution of a stored cap table
    Dilute {
        name: String,
        #[arg(long)]
        new_shares: u64,
        #[arg(long)]
        pre: Option<f64>,
        #[arg(long)]
        post: Option<f64>,
        /// Stakeholder id to treat as founder (repeatable)
        #[arg(long = "founder")]
        founders: Vec<String>,
        /// Record the scenario in the store
        #[arg(long)]
        record: bool,
    },

    /// Interactive dilution view
    Ui {
        name: String,
        #[arg(long)]
        new_shares: u64,
        #[arg(long)]
        pre: Option<f64>,
        #[arg(long)]
        post: Option<f64>,
        #[arg(long = "founder")]
        founders: Vec<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(db) = cli.db {
        config.db_path = db;
    }
    init_tracing(&config);

    match cli.command {
        Command::Accredit { criteria } => run_accredit(&criteria),
        Command::NetWorth {
            assets,
            liabilities,
            residence,
            mortgage,
        } => {
            let net_worth = calculate_net_worth(assets, liabilities, residence, mortgage);
            println!("Net worth (excluding primary residence): {}", format_currency(net_worth));
            Ok(())
        }
        Command::IncomeHistory { entries } => run_income_history(&entries),
        Command::Import { csv, name } => run_import(&config, &csv, &name),
        Command::Dilute {
            name,
            new_shares,
            pre,
            post,
            founders,
            record,
        } => run_dilute(&config, &name, new_shares, pre, post, &founders, record),
        Command::Ui {
            name,
            new_shares,
            pre,
            post,
            founders,
        } => run_ui_mode(&config, &name, new_shares, pre, post, founders),
    }
}

fn open_store(config: &AppConfig) -> Result<Connection> {
    let conn = Connection::open(&config.db_path)
        .with_context(|| format!("Failed to open scenario store {:?}", config.db_path))?;
    setup_database(&conn)?;
    Ok(conn)
}

fn run_accredit(path: &Path) -> Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read criteria file: {:?}", path))?;
    let criteria: AccreditationCriteria =
        serde_json::from_str(&content).context("Failed to parse criteria JSON")?;

    let result = determine_accreditation(&criteria);

    println!("🏛️  {}", result.status.label());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for reason in &result.reasoning {
        println!("  • {}", reason);
    }

    if !result.required_documents.is_empty() {
        println!("\nDocuments required:");
        for doc in &result.required_documents {
            println!("  - {}", doc);
        }
    }

    match annual_investment_limit(&criteria, result.status) {
        InvestmentLimit::Unlimited => println!("\nInvestment limit: none"),
        InvestmentLimit::Capped(limit) => {
            println!("\nInvestment limit (12 months): {}", format_currency(limit))
        }
    }

    Ok(())
}

fn run_income_history(entries: &[String]) -> Result<()> {
    let mut history = BTreeMap::new();
    for entry in entries {
        let (year, income) = entry
            .split_once('=')
            .with_context(|| format!("Expected YEAR=INCOME, got {:?}", entry))?;
        let year: i32 = year.trim().parse().context("Invalid year")?;
        let income: f64 = income.trim().parse().context("Invalid income")?;
        history.insert(year, income);
    }

    let check = validate_income_history(&history);
    if !check.is_consistent {
        println!("✗ At least two years of income history are required");
        return Ok(());
    }

    println!(
        "{} Years {:?}: average {}",
        if check.meets_requirement { "✓" } else { "✗" },
        check.years_checked,
        format_currency(check.average_income.unwrap_or(0.0))
    );

    Ok(())
}

fn run_import(config: &AppConfig, csv: &Path, name: &str) -> Result<()> {
    let stakeholders = load_cap_table_csv(csv)?;

    let report = CapTableReconciler::new().reconcile(&stakeholders);
    println!("{}", report.summary());
    for d in &report.discrepancies {
        println!("  ⚠ {}", d.description);
    }

    let conn = open_store(config)?;
    let saved = save_cap_table(&conn, name, &stakeholders)?;
    println!("✓ Saved {} stakeholders to cap table '{}'", saved, name);

    Ok(())
}

fn load_existing(conn: &Connection, name: &str) -> Result<Vec<nexus_equity::Stakeholder>> {
    let stakeholders = load_cap_table(conn, name)?;
    if stakeholders.is_empty() {
        bail!("Cap table '{}' not found. Run: nexus-equity import <csv> --name {}", name, name);
    }
    Ok(stakeholders)
}

fn print_impact(impact: &DilutionImpact, founders: &HashSet<&str>) {
    println!(
        "{:<24} {:>14} {:>9} {:>9} {:>10} {:>9}  {}",
        "Stakeholder", "Shares", "Before", "After", "Δ", "Relative", "Severity"
    );

    for s in &impact.stakeholders {
        let warn = requires_special_warning(s, founders.contains(s.stakeholder.id.as_str()));
        println!(
            "{:<24} {:>14} {:>9} {:>9} {:>10} {:>9}  {}{}",
            s.stakeholder.name,
            format_shares(s.new_shares),
            format_percentage(s.stakeholder.current_ownership, 2),
            format_percentage(s.new_ownership, 2),
            format_signed_percentage_points(-s.dilution),
            format_percentage(s.dilution_percent, 1),
            s.severity().as_str(),
            if warn { " ⚠" } else { "" }
        );
        if let Some(value) = s.value {
            println!(
                "{:<24} {} → {} ({})",
                "",
                format_currency(value.current_value),
                format_currency(value.new_value),
                format_currency(value.actual_change)
            );
        }
    }

    println!("\n{}", impact.summary());
}

fn run_dilute(
    config: &AppConfig,
    name: &str,
    new_shares: u64,
    pre: Option<f64>,
    post: Option<f64>,
    founders: &[String],
    record: bool,
) -> Result<()> {
    let conn = open_store(config)?;
    let stakeholders = load_existing(&conn, name)?;

    let impact = calculate_dilution(&stakeholders, new_shares, pre, post);
    let founder_ids: HashSet<&str> = founders.iter().map(String::as_str).collect();
    print_impact(&impact, &founder_ids);

    if record {
        let scenario = Scenario::new(name, new_shares, pre, post, impact);
        if record_scenario(&conn, &scenario)? {
            println!("✓ Scenario recorded: {}", scenario.id);
        } else {
            println!("✓ Scenario already recorded (skipped duplicate)");
        }
    }

    Ok(())
}

#[cfg(feature = "tui")]
fn run_ui_mode(
    config: &AppConfig,
    name: &str,
    new_shares: u64,
    pre: Option<f64>,
    post: Option<f64>,
    founders: Vec<String>,
) -> Result<()> {
    let conn = open_store(config)?;
    let stakeholders = load_existing(&conn, name)?;
    let impact = calculate_dilution(&stakeholders, new_shares, pre, post);

    let mut app = ui::App::new(name, impact, founders.into_iter().collect());
    ui::run_ui(&mut app)
}

#[cfg(not(feature = "tui"))]
fn run_ui_mode(
    _config: &AppConfig,
    _name: &str,
    _new_shares: u64,
    _pre: Option<f64>,
    _post: Option<f64>,
    _founders: Vec<String>,
) -> Result<()> {
    bail!("TUI mode not available. Rebuild with: cargo build --features tui")
}
