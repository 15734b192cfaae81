//! Learning MCP - command line entry point
//!
//! Wires simulated handlers into an orchestrator so the dispatch core can be
//! exercised end to end without the surrounding application.

use clap::{Parser, Subcommand};
use learning_mcp::agent::{Handler, SimulatedHandler, SIMULATE_FAILURE_KEY};
use learning_mcp::config::McpConfig;
use learning_mcp::observability::{init_default_logging, init_logging, LogFormat};
use learning_mcp::orchestrator::Orchestrator;
use learning_mcp::profile::InMemoryProfileRepository;
use learning_mcp::protocol::{HandlerType, Priority, Task, TaskType};
use learning_mcp::testing::{DistributionTestHarness, HarnessProgress, ReportingHandler, TestOptions};
use serde_json::{json, Map};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, Level};

const DEFAULT_CONFIG_PATHS: [&str; 2] = ["learning-mcp.toml", "config/learning-mcp.toml"];
const SIMULATED_LATENCY: Duration = Duration::from_millis(25);

/// Task orchestration core for the adaptive learning assistant
#[derive(Parser)]
#[command(name = "learning-mcp")]
#[command(about = "Task orchestration core for the adaptive learning assistant")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", env = "LEARNING_MCP_CONFIG")]
    config: Option<PathBuf>,

    /// Verbose logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize an owner and push one task of every type through simulated handlers
    Demo {
        /// Owner (learner) id
        #[arg(long, default_value = "demo-learner")]
        owner: String,
    },
    /// Run one distribution test and print its outcome
    Test {
        #[arg(long)]
        owner: Option<String>,
        /// Task type, e.g. profiling or multi-handler-coordination
        #[arg(long)]
        task_type: Option<TaskType>,
        #[arg(long)]
        priority: Option<Priority>,
        /// Explicit handler targets
        #[arg(long = "target", value_name = "HANDLER")]
        targets: Vec<HandlerType>,
        /// Context tags
        #[arg(long = "context", value_name = "TAG")]
        context: Vec<String>,
        /// Handler types that should fail
        #[arg(long = "fail", value_name = "HANDLER")]
        fail: Vec<HandlerType>,
        /// Override the harness timeout
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
    /// Validate configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_cli_logging(cli.verbose);

    info!("Starting learning-mcp v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_configuration(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Demo { owner } => run_demo(config, owner).await,
        Commands::Test {
            owner,
            task_type,
            priority,
            targets,
            context,
            fail,
            timeout_ms,
        } => {
            let mut payload = Map::new();
            if !fail.is_empty() {
                payload.insert(SIMULATE_FAILURE_KEY.to_string(), json!(fail));
            }
            let options = TestOptions {
                owner_id: owner,
                task_type,
                target_handlers: (!targets.is_empty()).then_some(targets),
                priority,
                context: (!context.is_empty()).then_some(context),
                payload: Some(payload),
                timeout: timeout_ms.map(Duration::from_millis),
            };
            run_distribution_test(config, options).await
        }
        Commands::Config { show } => handle_config_command(&config, show),
    };

    match result {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            error!("Command failed: {}", e);
            process::exit(1);
        }
    }
}

fn init_cli_logging(verbose: u8) {
    let level = match verbose {
        0 => return init_default_logging(),
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());
    init_logging(level, LogFormat::parse(&format), false);
}

fn load_configuration(config_path: Option<&Path>) -> Result<McpConfig, Box<dyn std::error::Error>> {
    if let Some(path) = config_path {
        info!("Loading configuration from: {}", path.display());
        return Ok(McpConfig::load_from_file(path)?);
    }

    for path_str in DEFAULT_CONFIG_PATHS {
        let path = Path::new(path_str);
        if path.exists() {
            info!("Loading configuration from: {}", path.display());
            return Ok(McpConfig::load_from_file(path)?);
        }
    }

    info!("No configuration file found, using defaults");
    Ok(McpConfig::default())
}

async fn run_demo(config: McpConfig, owner: String) -> Result<bool, Box<dyn std::error::Error>> {
    let profiles = Arc::new(InMemoryProfileRepository::new());
    profiles.insert(
        owner.clone(),
        json!({ "learning_style": "visual", "level": "beginner" }),
    );

    let orchestrator = Orchestrator::builder(config)
        .profile_repository(profiles)
        .build();
    for handler_type in HandlerType::ALL {
        orchestrator.register_handler(Arc::new(SimulatedHandler::with_latency(
            handler_type,
            SIMULATED_LATENCY,
        )));
    }

    let mut handles = vec![orchestrator.initialize_for_owner(&owner).await?];
    for task_type in TaskType::KNOWN {
        let mut task = Task::new(&owner, task_type.clone(), format!("Demo {task_type} task"));
        if task_type == TaskType::MultiHandlerCoordination {
            task = task.with_context(["quiz", "study_plan", "motivation"]);
        }
        handles.push(orchestrator.submit(task)?);
    }

    let mut all_succeeded = true;
    for handle in handles {
        let outcome = handle.wait().await?;
        all_succeeded &= outcome.succeeded();
        info!(
            task_id = %outcome.task.id,
            task_type = %outcome.task.task_type,
            status = %outcome.status(),
            "Demo task finished"
        );
    }

    let report = json!({
        "system_state": orchestrator.system_state(),
        "monitor_stats": orchestrator.monitor().stats(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(all_succeeded)
}

async fn run_distribution_test(
    config: McpConfig,
    options: TestOptions,
) -> Result<bool, Box<dyn std::error::Error>> {
    let progress = HarnessProgress::new();
    let harness_settings = config.harness.clone();

    let orchestrator = Orchestrator::builder(config).build();
    for handler_type in HandlerType::ALL {
        let simulated: Arc<dyn Handler> =
            Arc::new(SimulatedHandler::with_latency(handler_type, SIMULATED_LATENCY));
        orchestrator.register_handler(Arc::new(ReportingHandler::new(simulated, progress.clone())));
    }

    let harness = DistributionTestHarness::new(Arc::new(orchestrator), progress, &harness_settings);
    let outcome = harness.run_test(options).await;

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(outcome.success)
}

fn handle_config_command(config: &McpConfig, show: bool) -> Result<bool, Box<dyn std::error::Error>> {
    config.validate()?;

    if show {
        println!("Current configuration:");
        println!("{}", toml::to_string_pretty(config)?);
    }

    info!("Configuration validation complete");
    Ok(true)
}
