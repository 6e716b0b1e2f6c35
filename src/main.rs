use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use lakehouse_clients::{
    Backend, ClientRegistry, Configuration, HealthReport, HealthStatus, logging,
};

#[derive(Parser)]
#[command(name = "lakehouse")]
#[command(author, version, about = "Lakehouse client utilities", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Connect to every backend and report its health
    HealthCheck {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the resolved configuration
    Info,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = match Configuration::load() {
        Ok(config) => Arc::new(config),
        Err(err) => {
            eprintln!("configuration error: {err}");
            return ExitCode::from(2);
        }
    };

    logging::init(&config.log_level, cli.verbose);

    let result = match cli.command {
        Command::HealthCheck { json } => health_check(config, json).await,
        Command::Info => {
            print_info(&config);
            Ok(true)
        }
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(1)
        }
    }
}

async fn health_check(config: Arc<Configuration>, json: bool) -> anyhow::Result<bool> {
    let registry = ClientRegistry::new(Arc::clone(&config));

    for err in registry.connect_all().await {
        tracing::debug!(error = %err, "connect failed");
    }
    let report = registry.health_check().await;

    if let Err(err) = registry.close_all().await {
        tracing::warn!(error = %err, "teardown after health check failed");
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&config, &report);
    }
    Ok(report.all_healthy())
}

fn print_report(config: &Configuration, report: &HealthReport) {
    println!("{:<14} {:<16} ENDPOINT", "SERVICE", "STATUS");
    for (backend, status) in report.iter() {
        let marker = match status {
            HealthStatus::Healthy => "ok",
            HealthStatus::Unhealthy => "FAIL",
            HealthStatus::NotInitialized => "--",
        };
        println!(
            "{:<14} {:<16} {}",
            backend.service_name(),
            format!("{marker} {status}"),
            config.endpoint(backend)
        );
    }

    let failing = report.failing();
    if failing.is_empty() {
        println!("\nall services healthy");
    } else {
        let names: Vec<&str> = failing.iter().map(Backend::service_name).collect();
        println!("\nunhealthy: {}", names.join(", "));
    }
}

fn print_info(config: &Configuration) {
    println!("{} ({})", config.app_name, config.environment);
    println!("  log level        {}", config.log_level);
    println!();
    for backend in Backend::all() {
        println!("  {:<16} {}", backend.service_name(), config.endpoint(backend));
    }
    println!();
    println!("processing");
    println!("  batch size       {}", config.processing.batch_size);
    println!("  max retries      {}", config.processing.max_retries);
    println!("  timeout          {}s", config.processing.timeout.as_secs());
    println!("  parallel workers {}", config.processing.parallel_workers);
    println!();
    let flags = &config.flags;
    println!("feature flags");
    println!("  send_email_alerts      {}", flags.send_email_alerts);
    println!("  enable_data_validation {}", flags.enable_data_validation);
    println!("  dry_run_mode           {}", flags.dry_run_mode);
    println!("  auto_create_tables     {}", flags.auto_create_tables);
    println!("  enable_cache           {}", flags.enable_cache);
    if flags.send_email_alerts {
        let email = &config.email;
        println!();
        println!("email alerts");
        println!("  smtp             {}:{}", email.smtp_host, email.smtp_port);
        println!("  from             {}", email.from);
        println!("  recipients       {}", email.recipients_list().join(", "));
    }
}
