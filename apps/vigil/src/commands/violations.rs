use std::io::{self, Write};

use vigil_sdk::{BulkUpdate, Violation, ViolationClient};

use crate::cli::{BulkUpdateArgs, ExportArgs, ListArgs, NotesArgs, ViolationsCommand};
use crate::error::CliError;

pub async fn run(client: &ViolationClient, command: ViolationsCommand) -> Result<(), CliError> {
    match command {
        ViolationsCommand::List(args) => list(client, args).await,
        ViolationsCommand::Get { id, json } => {
            let violation = client.get(id).await?;
            if json {
                print_json(&violation)
            } else {
                print_detail(&violation);
                Ok(())
            }
        }
        ViolationsCommand::Ack(NotesArgs { id, notes }) => {
            let violation = client.acknowledge(id, notes.as_deref()).await?;
            println!("violation {} acknowledged ({})", violation.id, violation.status);
            Ok(())
        }
        ViolationsCommand::Resolve(NotesArgs { id, notes }) => {
            let violation = client.resolve(id, notes.as_deref()).await?;
            println!("violation {} resolved", violation.id);
            Ok(())
        }
        ViolationsCommand::FalsePositive(NotesArgs { id, notes }) => {
            let violation = client.mark_false_positive(id, notes.as_deref()).await?;
            println!("violation {} marked as false positive", violation.id);
            Ok(())
        }
        ViolationsCommand::BulkUpdate(args) => bulk_update(client, args).await,
        ViolationsCommand::Export(args) => export(client, args).await,
        ViolationsCommand::Stats => stats(client).await,
    }
}

async fn list(client: &ViolationClient, args: ListArgs) -> Result<(), CliError> {
    let page = client.list(&args.to_filter()).await?;
    if args.json {
        return print_json(&page.violations);
    }
    if page.violations.is_empty() {
        println!("no violations match");
        return Ok(());
    }
    println!(
        "{:>6}  {:<20}  {:<8}  {:<14}  {:>6}  {:>6}  {}",
        "ID", "TYPE", "SEVERITY", "STATUS", "CONF", "CAMERA", "TIME"
    );
    for violation in &page.violations {
        println!(
            "{:>6}  {:<20}  {:<8}  {:<14}  {:>5.1}%  {:>6}  {}",
            violation.id,
            violation.violation_type,
            violation.severity,
            violation.status,
            violation.ai_confidence,
            violation.camera_id,
            occurred_at(violation)
        );
    }
    println!("showing {} of {}", page.count, page.total);
    Ok(())
}

async fn bulk_update(client: &ViolationClient, args: BulkUpdateArgs) -> Result<(), CliError> {
    let outcome = client
        .bulk_update(&BulkUpdate {
            violation_ids: args.ids,
            status: args.status,
            investigator_id: args.investigator,
            notes: args.notes,
        })
        .await?;
    match outcome.message {
        Some(message) => println!("{message}"),
        None => println!("{} violations updated", outcome.updated_count),
    }
    Ok(())
}

async fn export(client: &ViolationClient, args: ExportArgs) -> Result<(), CliError> {
    let csv = client.export_csv(&args.filter.to_filter()).await?;
    match args.output {
        Some(path) => {
            std::fs::write(&path, csv.as_bytes())?;
            eprintln!("wrote {} rows to {}", csv.lines().count().saturating_sub(1), path.display());
        }
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(csv.as_bytes())?;
            stdout.flush()?;
        }
    }
    Ok(())
}

async fn stats(client: &ViolationClient) -> Result<(), CliError> {
    let stats = client.stats().await?;
    println!("total      {}", stats.total);
    println!("today      {}", stats.today);
    println!("this week  {}", stats.this_week);
    for (title, counts) in [
        ("by type", &stats.by_type),
        ("by severity", &stats.by_severity),
        ("by status", &stats.by_status),
    ] {
        if counts.is_empty() {
            continue;
        }
        println!("{title}:");
        for (key, count) in counts {
            println!("  {key:<20} {count}");
        }
    }
    Ok(())
}

fn print_detail(violation: &Violation) {
    println!("violation {}", violation.id);
    println!("  type        {}", violation.violation_type);
    println!("  severity    {}", violation.severity);
    println!("  status      {}", violation.status);
    println!("  confidence  {:.1}%", violation.ai_confidence);
    println!("  camera      {}", violation.camera_id);
    println!("  time        {}", occurred_at(violation));
    let optional = [
        ("description", violation.description.as_deref()),
        ("notes", violation.notes.as_deref()),
        ("model", violation.ai_model_id.as_deref()),
        ("image", violation.full_image_url.as_deref()),
        ("resolved at", violation.resolution_date.as_deref()),
    ];
    for (label, value) in optional {
        if let Some(value) = value {
            println!("  {label:<11} {value}");
        }
    }
    if let Some(investigator) = violation.investigator_id {
        println!("  investigator {investigator}");
    }
}

fn occurred_at(violation: &Violation) -> &str {
    violation
        .timestamp
        .as_deref()
        .or(violation.created_at.as_deref())
        .unwrap_or("-")
}

pub(crate) fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<(), CliError> {
    let text = serde_json::to_string_pretty(value).map_err(io::Error::from)?;
    println!("{text}");
    Ok(())
}
