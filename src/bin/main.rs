use clap::Parser;
use market_insights_analyst::{analyst::Analyst, config::AnalystConfig, logging::init_tracing};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "analyst", about = "Run one market research query and print the report")]
struct Args {
    /// Research question, e.g. "How has NVDA traded after its earnings?"
    #[arg(required = true)]
    query: Vec<String>,

    /// Print the reasoning trace before the report
    #[arg(long)]
    trace: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let args = Args::parse();
    let query = args.query.join(" ");

    let config = AnalystConfig::from_env()?;
    let analyst = Analyst::from_config(&config).await?;

    info!(query = %query, "Running analyst");

    match analyst.analyze(&query).await {
        Ok(result) => {
            if args.trace {
                println!("\n=== REASONING TRACE ===");
                for (i, step) in result.reasoning_trace.iter().enumerate() {
                    println!("  {}: {}", i + 1, step);
                }
            }
            println!("\n=== REPORT ({} ms) ===\n", result.execution_time_ms);
            println!("{}", result.report);
            Ok(())
        }
        Err(e) => {
            eprintln!("Analysis failed: {}", e);
            if let Some(partial) = e.partial_conversation() {
                eprintln!("Partial research ({} messages):", partial.len());
                for message in partial.messages() {
                    eprintln!("  [{}] {}", message.role, message.content);
                }
            }
            Err(Box::new(e) as Box<dyn std::error::Error>)
        }
    }
}
