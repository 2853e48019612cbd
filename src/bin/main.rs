use rag_orchestrator::{
    agent::build_orchestrator, config::AppConfig, models::SessionOutcome, SessionRequest,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: orchestrator \"<question>\" [--max-retries N]";

fn parse_args(args: &[String]) -> Result<SessionRequest, String> {
    let mut question: Option<String> = None;
    let mut max_retries: Option<u32> = None;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--max-retries" {
            let value = iter.next().ok_or_else(|| USAGE.to_string())?;
            let parsed = value
                .parse()
                .map_err(|_| format!("--max-retries expects a non-negative integer, got '{}'", value))?;
            max_retries = Some(parsed);
        } else if question.is_none() {
            question = Some(arg.clone());
        } else {
            return Err(USAGE.to_string());
        }
    }

    let mut request = SessionRequest::new(question.ok_or_else(|| USAGE.to_string())?);
    request.max_retries = max_retries;
    Ok(request)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let request = parse_args(&args)?;

    let config = AppConfig::from_env()?;
    let orchestrator = build_orchestrator(&config).await?;

    info!(question = %request.question, "Running orchestrator");

    match orchestrator.run(request).await {
        Ok(report) => {
            match &report.outcome {
                SessionOutcome::Answered { answer } => {
                    println!("{}", answer);
                }
                SessionOutcome::NoAnswer { reason } => {
                    println!("No answer: {}", reason);
                }
            }

            println!("\nSession: {}", report.session_id);
            println!("Loop steps: {}, retrievals: {}", report.loop_step, report.retrievals);
            println!("\nReasoning Trace:");
            for (i, trace) in report.reasoning_trace.iter().enumerate() {
                println!("  {}: {}", i + 1, trace);
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("Session failed ({}): {}", e.kind().as_str(), e);
            Err(Box::new(e) as Box<dyn std::error::Error>)
        }
    }
}
