use colored::Colorize;
use gst_query_orchestrator::{
    agent::Orchestrator,
    bootstrap::{build_orchestrator, init_tracing},
    config::AppConfig,
    models::{QueryAnswer, Verdict},
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::info;

const EXIT_COMMANDS: [&str; 3] = ["quit", "exit", "q"];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::from_env()?;
    init_tracing("warn");

    let orchestrator = build_orchestrator(&config)?;
    info!("GST query orchestrator shell starting");

    // One-shot mode: the question is the command line
    let args: Vec<String> = std::env::args().skip(1).collect();
    if !args.is_empty() {
        answer(&orchestrator, &args.join(" ")).await;
        return Ok(());
    }

    print_banner(&orchestrator).await;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"\nquestion> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let question = line.trim();

        if question.is_empty() {
            continue;
        }
        if EXIT_COMMANDS.contains(&question.to_lowercase().as_str()) {
            break;
        }

        answer(&orchestrator, question).await;
    }

    println!("{}", "Goodbye.".dimmed());
    Ok(())
}

async fn print_banner(orchestrator: &Orchestrator) {
    println!("{}", "=".repeat(64).cyan());
    println!("{}", "  GST Compliance Assistant".bold().cyan());
    println!("{}", "=".repeat(64).cyan());

    match orchestrator.executor().ping().await {
        Ok(()) => println!("  {} invoice database", "✓".green()),
        Err(e) => println!("  {} invoice database: {}", "✗".red(), e),
    }
    match orchestrator.retriever().chunk_count().await {
        Ok(Some(count)) => println!("  {} rule store ({} chunks)", "✓".green(), count),
        Ok(None) => println!("  {} rule store", "✓".green()),
        Err(e) => println!("  {} rule store: {}", "✗".red(), e),
    }

    println!(
        "\n{}",
        "Ask about invoices, vendors or GST rules. Type 'quit' to leave.".dimmed()
    );
}

async fn answer(orchestrator: &Orchestrator, question: &str) {
    match orchestrator.handle_query(question).await {
        Ok(result) => print_answer(&result),
        Err(e) => {
            let hint = if e.kind().is_retryable() {
                " (try again later)"
            } else {
                ""
            };
            eprintln!("{} {}{}", "error:".red().bold(), e, hint.dimmed());
        }
    }
}

fn print_answer(result: &QueryAnswer) {
    println!("\n{} {}", "Intent:".bold(), result.intent.to_string().yellow());

    println!("\n{}", "ANSWER".bold().green());
    println!("{}", "-".repeat(64).green());
    println!("{}", result.answer);

    if let Some(query) = &result.access_query {
        println!("\n{}", "ACCESS-QUERY".bold().blue());
        println!("{}", "-".repeat(64).blue());
        println!("{}", query);
        match &result.verdict {
            Some(Verdict::Accepted { .. }) => {
                println!("{} ({} rows)", "accepted".green(), result.row_count)
            }
            Some(Verdict::Rejected(rejection)) => {
                println!("{} {}", "rejected:".red(), rejection.kind)
            }
            None => {}
        }
    }

    println!("\n{}", "STRUCTURED".bold().magenta());
    println!("{}", "-".repeat(64).magenta());
    match serde_json::to_string_pretty(result) {
        Ok(json) => println!("{}", json.dimmed()),
        Err(e) => eprintln!("could not render result: {}", e),
    }
}
