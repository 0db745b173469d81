use crate::error::CliError;
use engine_runtime::{check::CheckReport, summary::PipelineSummary};
use model::execution::dead_letter::{DeadLetterEntry, DeadLetterPayload};
use serde::Serialize;

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), CliError> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{json}");
    Ok(())
}

pub fn print_summary(summary: &PipelineSummary, as_json: bool) -> Result<(), CliError> {
    if as_json {
        return print_json(summary);
    }

    println!("Pipeline {}", summary.outcome);
    println!("-----------------------------");
    println!("{:<22} {}", "Records received", summary.records_received);
    println!("{:<22} {}", "Records written", summary.records_written);
    println!("{:<22} {}", "Batches written", summary.batches_written);
    println!("{:<22} {}", "Bytes written", summary.bytes_written);
    println!("{:<22} {}", "Records dead-lettered", summary.records_dead_lettered);
    println!("{:<22} {}", "Dead-letter entries", summary.dead_letter_entries);
    println!("{:<22} {}", "Duplicates dropped", summary.duplicates_dropped);
    println!("{:<22} {}", "Retrying", summary.retrying);
    println!("{:<22} {}", "In flight", summary.in_flight);
    println!("{:<22} {}", "Retries", summary.retries);
    println!("{:<22} {}", "Failures", summary.failures);
    println!("{:<22} {:.2}s", "Elapsed", summary.elapsed_ms as f64 / 1000.0);
    Ok(())
}

pub fn print_check(report: &CheckReport, as_json: bool) -> Result<(), CliError> {
    if as_json {
        return print_json(report);
    }

    println!("{:<10} {}", "Valid", report.valid);
    println!("{:<10} {}", "Invalid", report.invalid);
    if !report.first_errors.is_empty() {
        println!();
        println!("First error per kind:");
        for (kind, message) in &report.first_errors {
            println!("  {kind:<32} {message}");
        }
    }
    Ok(())
}

pub fn print_dead_letters(entries: &[DeadLetterEntry], as_json: bool) -> Result<(), CliError> {
    if as_json {
        return print_json(entries);
    }

    if entries.is_empty() {
        println!("No dead-letter entries");
        return Ok(());
    }

    println!(
        "{:<25} {:<10} {:<34} {:>8} {:>8}  {}",
        "Dead-lettered at", "Stage", "Kind", "Records", "Attempts", "Subject"
    );
    for entry in entries {
        let subject = match &entry.payload {
            DeadLetterPayload::Record(raw) => format!("record from {}", raw.source_key),
            DeadLetterPayload::Batch { location, .. } => location.clone(),
        };
        println!(
            "{:<25} {:<10} {:<34} {:>8} {:>8}  {}",
            entry
                .dead_lettered_at
                .format("%Y-%m-%dT%H:%M:%S%.3fZ")
                .to_string(),
            entry.stage.to_string(),
            entry.kind.to_string(),
            entry.record_count(),
            entry.attempts(),
            subject
        );
    }
    Ok(())
}
