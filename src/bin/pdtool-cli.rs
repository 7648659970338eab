//! Thin CLI over the `pdtool_core` library API (`SPEC_FULL.md` §10),
//! mirroring the teacher's `src/main.rs` + `clap` usage. Exists so the
//! core is exercisable without the (out-of-scope) HTTP layer.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};

use pdtool_core::catalog::TemplateCatalog;
use pdtool_core::config::Settings;
use pdtool_core::error::{PdError, PdResult};
use pdtool_core::plan::TestPlan;
use pdtool_core::pool::ConnectionPool;
use pdtool_core::registry::InstrumentRegistry;
use pdtool_core::session::{SessionEngine, SessionState};
use std::collections::HashMap;

#[derive(Parser)]
#[command(name = "pdtool-cli", about = "Run a test plan through the execution core")]
struct Cli {
    /// Path to a TOML settings file (defaults + `PDTOOL_*` env still apply).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Path to the instrument configuration JSON file.
    #[arg(long, global = true)]
    instruments: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a test plan (a JSON-encoded `TestPlan`) end to end.
    RunSession {
        plan: PathBuf,
        #[arg(long)]
        dut_serial: Option<String>,
    },
    /// Print the known `(test_type, switch_mode)` templates.
    ListTemplates,
    /// Print the full value-type/limit-type vocabulary.
    ListValidationTypes,
    /// Validate a JSON parameter bag against a template.
    ValidateParams {
        test_type: String,
        switch_mode: String,
        params: PathBuf,
    },
    /// Run a single measurement ad hoc, without a session.
    ExecuteMeasurement {
        test_type: String,
        switch_mode: String,
        params: PathBuf,
    },
}

#[tokio::main]
async fn main() -> PdResult<()> {
    let cli = Cli::parse();
    let settings = Arc::new(Settings::load(cli.config.as_deref())?);
    pdtool_core::init_tracing(&settings.log_level);

    let registry = match &cli.instruments {
        Some(path) => InstrumentRegistry::from_file(path)?,
        None => InstrumentRegistry::with_builtins(),
    };
    let pool = Arc::new(
        ConnectionPool::new(Arc::new(registry)).with_idle_timeout(settings.pool_idle_timeout),
    );
    let catalog = Arc::new(TemplateCatalog::new());

    match cli.command {
        Command::RunSession { plan, dut_serial } => {
            run_session(pool, catalog, settings, &plan, dut_serial).await
        }
        Command::ListTemplates => {
            for (test_type, modes) in catalog.list() {
                for (switch_mode, template) in modes {
                    println!(
                        "{test_type}/{switch_mode}: required={:?} optional={:?}",
                        template.required, template.optional
                    );
                }
            }
            Ok(())
        }
        Command::ListValidationTypes => {
            let types = pdtool_core::api::list_validation_types();
            println!("value_types={:?}", types.value_types);
            println!("limit_types={:?}", types.limit_types);
            Ok(())
        }
        Command::ValidateParams {
            test_type,
            switch_mode,
            params,
        } => validate_params(&catalog, &test_type, &switch_mode, &params),
        Command::ExecuteMeasurement {
            test_type,
            switch_mode,
            params,
        } => {
            execute_measurement(
                &pool,
                catalog.as_ref(),
                settings.as_ref(),
                &test_type,
                &switch_mode,
                &params,
            )
            .await
        }
    }
}

async fn run_session(
    pool: Arc<ConnectionPool>,
    catalog: Arc<TemplateCatalog>,
    settings: Arc<Settings>,
    plan_path: &std::path::Path,
    dut_serial: Option<String>,
) -> PdResult<()> {
    let raw = std::fs::read_to_string(plan_path)?;
    let plan: TestPlan = serde_json::from_str(&raw)
        .map_err(|e| PdError::Configuration(format!("invalid plan file: {e}")))?;

    let engine = SessionEngine::new(pool, catalog, settings);
    let id = engine.start_session(plan, dut_serial).await?;
    println!("session {id} started");

    let mut progress = engine
        .subscribe_progress(&id)
        .await
        .expect("session was just created");
    tokio::spawn(async move {
        while let Ok(event) = progress.recv().await {
            println!("{event:?}");
        }
    });

    loop {
        let snapshot = engine.get_session(&id).await.expect("session exists");
        if matches!(
            snapshot.state,
            SessionState::Completed | SessionState::Aborted | SessionState::Failed
        ) {
            println!(
                "session {id} finished: state={:?} aggregate={:?}",
                snapshot.state, snapshot.aggregate_outcome
            );
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    Ok(())
}

fn validate_params(
    catalog: &TemplateCatalog,
    test_type: &str,
    switch_mode: &str,
    params_path: &std::path::Path,
) -> PdResult<()> {
    let raw = std::fs::read_to_string(params_path)?;
    let params: HashMap<String, serde_json::Value> = serde_json::from_str(&raw)
        .map_err(|e| PdError::Configuration(format!("invalid params file: {e}")))?;

    match pdtool_core::api::validate_parameters(catalog, test_type, switch_mode, &params) {
        Ok(result) => {
            println!(
                "valid={} missing={:?} unknown={:?} suggestions={:?}",
                result.valid, result.missing, result.unknown, result.suggestions
            );
            Ok(())
        }
        Err(PdError::UnknownMeasurement { test_type, switch_mode }) => {
            println!("unknown measurement type/mode: {test_type}/{switch_mode}");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

async fn execute_measurement(
    pool: &Arc<ConnectionPool>,
    catalog: &TemplateCatalog,
    settings: &Settings,
    test_type: &str,
    switch_mode: &str,
    params_path: &std::path::Path,
) -> PdResult<()> {
    let raw = std::fs::read_to_string(params_path)?;
    let params: HashMap<String, serde_json::Value> = serde_json::from_str(&raw)
        .map_err(|e| PdError::Configuration(format!("invalid params file: {e}")))?;

    let result = pdtool_core::api::execute_measurement(
        test_type,
        switch_mode,
        params,
        pool,
        catalog,
        &settings.scripts_dir,
    )
    .await;

    println!(
        "outcome={:?} value={:?} error={:?}",
        result.outcome, result.measured_value, result.error_message
    );
    Ok(())
}
