use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use sqlpilot::config::AppConfig;
use sqlpilot::db::{self, QueryOutput};
use sqlpilot::error::{AppError, AppResult};
use sqlpilot::services::{EmbeddingIndex, GeminiClient, QueryReport, RepairOutcome, SqlAgent};

#[tokio::main]
async fn main() -> AppResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sqlpilot=info")),
        )
        .init();

    let db_path = std::env::args().nth(1).map(PathBuf::from).ok_or_else(|| {
        AppError::Config("usage: sqlpilot <database.sqlite>".to_string())
    })?;

    let config = AppConfig::load()?;
    let pool = db::init_pool(&db_path).await?;
    let client = Arc::new(GeminiClient::from_config(&config)?);
    let index = Arc::new(EmbeddingIndex::new(pool.clone(), client.clone(), &config.vector)?);
    let agent = SqlAgent::new(pool, client, index, &config);

    println!("connected to {}", db_path.display());
    println!("ask a question, or type 'exit' to quit");

    let stdin = io::stdin();
    loop {
        print!("?> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if question.eq_ignore_ascii_case("exit") || question.eq_ignore_ascii_case("quit") {
            break;
        }

        match agent.answer(question).await {
            Ok(report) => print_report(&report),
            Err(error) => eprintln!("error: {}", error),
        }
        println!();
    }

    Ok(())
}

fn print_report(report: &QueryReport) {
    for step in &report.steps {
        println!("  {}", step);
    }
    match &report.report.outcome {
        RepairOutcome::Succeeded { sql, output } => {
            println!("\n{}\n", sql);
            print_table(output);
            println!("{} row(s)", output.row_count);
        }
        RepairOutcome::Exhausted { error, kind, .. } => {
            println!(
                "\ngave up after {} attempt(s): {} ({})",
                report.report.attempts.len(),
                error,
                kind
            );
        }
    }
}

fn print_table(output: &QueryOutput) {
    if output.columns.is_empty() {
        return;
    }
    let mut widths: Vec<usize> = output.columns.iter().map(|c| c.len()).collect();
    for row in &output.rows {
        for (i, cell) in row.iter().enumerate() {
            if let Some(width) = widths.get_mut(i) {
                *width = (*width).max(cell.len());
            }
        }
    }

    let render = |cells: &[String]| {
        cells
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{:<width$}", cell, width = *width))
            .collect::<Vec<_>>()
            .join(" | ")
    };

    let header = render(&output.columns);
    println!("{}", header);
    println!("{}", "-".repeat(header.len()));
    for row in &output.rows {
        println!("{}", render(row));
    }
}
