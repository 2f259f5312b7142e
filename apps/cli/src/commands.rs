//! CLI command definitions, routing, and tracing setup.

use std::fs::File;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use staffload_core::{
    ImportOptions, ProgressReporter, SilentProgress, import_employees, validate_employees,
    validate_fields,
};
use staffload_shared::{
    AppConfig, Employee, EmployeeRecord, ImportReport, ImportRow, StaffloadError, init_config,
    load_config, resolve_db_path,
};
use staffload_storage::{RecordStore, Storage};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Staffload: import personnel records from CSV into a local database.
#[derive(Parser)]
#[command(
    name = "staffload",
    version,
    about = "Validate and import personnel records from CSV exports.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Database file (overrides `[database] path` from the config file).
    #[arg(long, global = true, env = "STAFFLOAD_DB")]
    pub db: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Import every valid row of a CSV file as one batch.
    Import {
        /// CSV file to import.
        file: PathBuf,

        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Check a CSV file without importing anything.
    Validate {
        /// CSV file to check.
        file: PathBuf,

        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// List all employees.
    List {
        #[arg(long)]
        json: bool,
    },

    /// Find employees by payroll number or name.
    Search {
        /// Case-insensitive substring to look for.
        term: String,

        #[arg(long)]
        json: bool,
    },

    /// Show one employee.
    Show {
        /// Record id.
        id: i64,
    },

    /// Change fields of an existing employee. An empty value clears an optional field.
    Edit {
        /// Record id.
        id: i64,

        #[command(flatten)]
        changes: EditArgs,
    },

    /// Delete an employee.
    Delete {
        /// Record id.
        id: i64,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Field overrides accepted by `edit`.
#[derive(clap::Args, Debug, Default)]
pub(crate) struct EditArgs {
    #[arg(long)]
    pub forenames: Option<String>,
    #[arg(long)]
    pub surname: Option<String>,
    #[arg(long)]
    pub telephone: Option<String>,
    #[arg(long)]
    pub mobile: Option<String>,
    /// First address line.
    #[arg(long)]
    pub address: Option<String>,
    /// Second address line.
    #[arg(long)]
    pub address2: Option<String>,
    #[arg(long)]
    pub postcode: Option<String>,
    #[arg(long)]
    pub email: Option<String>,
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
///
/// Logs go to stderr so `--json` output on stdout stays machine-readable.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "staffload=info",
        1 => "staffload=debug",
        _ => "staffload=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let db = cli.db;
    match cli.command {
        Command::Import { file, json } => cmd_import(db, &file, json).await,
        Command::Validate { file, json } => cmd_validate(db, &file, json).await,
        Command::List { json } => cmd_list(db, json).await,
        Command::Search { term, json } => cmd_search(db, &term, json).await,
        Command::Show { id } => cmd_show(db, id).await,
        Command::Edit { id, changes } => cmd_edit(db, id, changes).await,
        Command::Delete { id } => cmd_delete(db, id).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

/// Load config and resolve the database path, honouring `--db`.
fn resolve(db: Option<PathBuf>) -> Result<(AppConfig, PathBuf)> {
    let config = load_config()?;
    let path = match db {
        Some(path) => path,
        None => resolve_db_path(&config)?,
    };
    Ok((config, path))
}

async fn open_store(db: Option<PathBuf>) -> Result<(AppConfig, Storage)> {
    let (config, path) = resolve(db)?;
    info!(db = %path.display(), "opening database");
    let storage = Storage::open(&path).await?;
    Ok((config, storage))
}

/// Read-only handle for commands that never write.
async fn open_store_readonly(db: Option<PathBuf>) -> Result<Storage> {
    let (_, path) = resolve(db)?;
    if !path.exists() {
        return Err(eyre!(
            "no database at '{}'; run `staffload import <FILE>` first",
            path.display()
        ));
    }
    Ok(Storage::open_readonly(&path).await?)
}

fn open_csv(path: &Path) -> Result<File> {
    File::open(path).wrap_err_with(|| format!("cannot open '{}'", path.display()))
}

// ---------------------------------------------------------------------------
// Import / validate
// ---------------------------------------------------------------------------

async fn cmd_import(db: Option<PathBuf>, file: &Path, json: bool) -> Result<()> {
    let (config, storage) = open_store(db).await?;
    let input = open_csv(file)?;
    let options = ImportOptions::from(&config);

    info!(file = %file.display(), "importing employees");

    let report = if json {
        import_employees(&storage, input, &options, &SilentProgress).await
    } else {
        let reporter = CliProgress::new();
        import_employees(&storage, input, &options, &reporter).await
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_import_report(&report);
    }

    if report.success_count == 0 && report.total_rows > 0 {
        return Err(eyre!("no rows were imported"));
    }
    Ok(())
}

fn print_import_report(report: &ImportReport) {
    println!();
    if report.is_success() {
        println!("  Import completed successfully!");
    } else {
        println!("  Import finished with problems.");
    }
    println!("  Rows:     {}", report.total_rows);
    println!("  Imported: {}", report.success_count);
    println!("  Failed:   {}", report.failure_count);

    if !report.errors.is_empty() {
        println!();
        println!("  Errors:");
        for error in &report.errors {
            println!("    - {error}");
        }
    }

    if !report.imported_records.is_empty() {
        println!();
        print_records(&report.imported_records);
    }
    println!();
}

async fn cmd_validate(db: Option<PathBuf>, file: &Path, json: bool) -> Result<()> {
    let (config, storage) = open_store(db).await?;
    let input = open_csv(file)?;
    let options = ImportOptions::from(&config);

    info!(file = %file.display(), "validating employees");
    let report = validate_employees(&storage, input, &options).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!();
    if report.is_valid {
        println!("  File is valid and ready to import.");
    } else {
        println!("  File has problems.");
    }
    println!("  Valid rows:   {}", report.valid_row_count);
    println!("  Invalid rows: {}", report.invalid_row_count);

    if !report.validation_errors.is_empty() {
        println!();
        println!("  Errors:");
        for error in &report.validation_errors {
            println!("    - {error}");
        }
    }

    if !report.preview_rows.is_empty() {
        println!();
        println!("  Preview (first {}):", report.preview_rows.len());
        for row in &report.preview_rows {
            println!(
                "    {:>4}  {:<12} {}, {}",
                row.row_number,
                row.payroll_number.as_deref().unwrap_or_default(),
                row.surname.as_deref().unwrap_or_default(),
                row.forenames.as_deref().unwrap_or_default(),
            );
        }
    }
    println!();
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn row_checked(&self, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Checking for existing records [{current}/{total}]"));
    }

    fn done(&self, _report: &ImportReport) {
        self.spinner.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// Record commands
// ---------------------------------------------------------------------------

fn print_records(records: &[EmployeeRecord]) {
    println!(
        "  {:>5}  {:<12} {:<28} {:<10} {:<10}",
        "ID", "PAYROLL", "NAME", "POSTCODE", "STARTED"
    );
    for record in records {
        let e = &record.employee;
        println!(
            "  {:>5}  {:<12} {:<28} {:<10} {:<10}",
            record.id,
            e.payroll_number,
            format!("{}, {}", e.surname, e.forenames),
            e.postcode,
            e.start_date.format("%d/%m/%Y"),
        );
    }
}

fn print_record_list(records: &[EmployeeRecord], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(records)?);
    } else if records.is_empty() {
        println!("No employees found.");
    } else {
        print_records(records);
        println!();
        println!("  {} employee(s)", records.len());
    }
    Ok(())
}

async fn cmd_list(db: Option<PathBuf>, json: bool) -> Result<()> {
    let storage = open_store_readonly(db).await?;
    let records = storage.get_all().await?;
    print_record_list(&records, json)
}

async fn cmd_search(db: Option<PathBuf>, term: &str, json: bool) -> Result<()> {
    let storage = open_store_readonly(db).await?;
    info!(term, "searching employees");
    let records = storage.search(term).await?;
    print_record_list(&records, json)
}

async fn cmd_show(db: Option<PathBuf>, id: i64) -> Result<()> {
    let storage = open_store_readonly(db).await?;
    let record = storage
        .get_by_id(id)
        .await?
        .ok_or(StaffloadError::NotFound(id))?;
    let e = &record.employee;

    println!();
    println!("  ID:             {}", record.id);
    println!("  Payroll number: {}", e.payroll_number);
    println!("  Name:           {} {}", e.forenames, e.surname);
    println!("  Date of birth:  {}", e.date_of_birth.format("%d/%m/%Y"));
    println!("  Start date:     {}", e.start_date.format("%d/%m/%Y"));
    println!("  Telephone:      {}", e.telephone.as_deref().unwrap_or("-"));
    println!("  Mobile:         {}", e.mobile.as_deref().unwrap_or("-"));
    println!("  Address:        {}", e.address_line1);
    if let Some(line2) = &e.address_line2 {
        println!("                  {line2}");
    }
    println!("  Postcode:       {}", e.postcode);
    println!("  Email:          {}", e.email);
    println!("  Created:        {}", e.created_at.format("%Y-%m-%d %H:%M:%S UTC"));
    println!();
    Ok(())
}

/// `Some("")` clears an optional field; `None` leaves it alone.
fn apply_optional(field: &mut Option<String>, value: Option<String>) {
    if let Some(v) = value {
        let v = v.trim();
        *field = (!v.is_empty()).then(|| v.to_string());
    }
}

fn apply_required(field: &mut String, value: Option<String>) {
    if let Some(v) = value {
        *field = v.trim().to_string();
    }
}

/// Re-check the editable fields. Dates are not editable, so the age and
/// service windows are not re-applied against today.
fn check_edit(employee: &Employee) -> staffload_shared::Result<()> {
    let mut row = ImportRow::from_employee(0, employee);
    validate_fields(&mut row);
    if row.is_valid() {
        Ok(())
    } else {
        Err(StaffloadError::validation(row.errors().join("; ")))
    }
}

async fn cmd_edit(db: Option<PathBuf>, id: i64, changes: EditArgs) -> Result<()> {
    let (_, storage) = open_store(db).await?;
    let mut record = storage
        .get_by_id(id)
        .await?
        .ok_or(StaffloadError::NotFound(id))?;

    let e = &mut record.employee;
    apply_required(&mut e.forenames, changes.forenames);
    apply_required(&mut e.surname, changes.surname);
    apply_optional(&mut e.telephone, changes.telephone);
    apply_optional(&mut e.mobile, changes.mobile);
    apply_required(&mut e.address_line1, changes.address);
    apply_optional(&mut e.address_line2, changes.address2);
    apply_required(&mut e.postcode, changes.postcode);
    apply_required(&mut e.email, changes.email);

    check_edit(&record.employee)?;

    if !storage.update(&record).await? {
        return Err(StaffloadError::NotFound(id).into());
    }
    info!(id, "employee updated");
    println!("Updated employee {id}.");
    Ok(())
}

async fn cmd_delete(db: Option<PathBuf>, id: i64) -> Result<()> {
    let (_, storage) = open_store(db).await?;
    if !storage.delete(id).await? {
        return Err(StaffloadError::NotFound(id).into());
    }
    info!(id, "employee deleted");
    println!("Deleted employee {id}.");
    Ok(())
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
