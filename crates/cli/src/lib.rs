pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "agentpay",
    about = "Agentpay operator CLI",
    long_about = "Run payment instructions and paid page summaries locally, smoke-test a running server, and inspect configuration.",
    after_help = "Examples:\n  agentpay pay \"Create a payment link for 'Lawn mowing' for $25\"\n  agentpay summarize https://example.com\n  agentpay smoke --attempts 3\n  agentpay config"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Interpret a natural-language payment instruction and execute it")]
    Pay {
        #[arg(help = "Payment instruction; prompted for when omitted")]
        query: Option<String>,
        #[arg(long, help = "Customer object as JSON, e.g. '{\"id\":\"cus_..\",\"payment_method_id\":\"pm_..\"}'")]
        customer: Option<String>,
    },
    #[command(about = "Charge a test customer and summarize a web page")]
    Summarize {
        #[arg(help = "Absolute URL to summarize; prompted for when omitted")]
        url: Option<String>,
    },
    #[command(about = "Post a payment event to a running server, retrying until it answers")]
    Smoke {
        #[arg(long, default_value = commands::smoke::DEFAULT_ENDPOINT)]
        endpoint: String,
        #[arg(long, default_value = commands::smoke::DEFAULT_QUERY)]
        query: String,
        #[arg(long, default_value_t = 5)]
        attempts: u32,
        #[arg(long, default_value_t = 1000, help = "Base backoff delay, doubled after each attempt")]
        delay_ms: u64,
    },
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
}

pub fn run() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Pay { query, customer } => commands::pay::run(query, customer.as_deref()),
        Command::Summarize { url } => commands::summarize::run(url),
        Command::Smoke { endpoint, query, attempts, delay_ms } => {
            commands::smoke::run(&commands::smoke::SmokeOptions {
                endpoint,
                query,
                attempts,
                delay_ms,
            })
        }
        Command::Config => commands::config::run(),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
