use anyhow::Result;

use crate::orchestrator::Orchestrator;

pub async fn list_sources(orchestrator: &Orchestrator) -> Result<()> {
    let statuses = orchestrator.statuses().await?;

    println!(
        "{:<14} {:<24} {:<11} {:<21} {:>9} {:>8} {:>9}  {}",
        "CONNECTOR", "SPIDER", "MODE", "LAST RUN", "EXTRACTED", "CREATED", "FAILURES", "LAST ERROR"
    );

    for (connector, status) in statuses {
        let last_run = status
            .last_run
            .map(|at| at.format("%Y-%m-%dT%H:%M:%SZ").to_string())
            .unwrap_or_else(|| "never".to_string());
        let mode = match connector.parsing_mode {
            surplus_harvest_core::models::ParsingMode::Raw => "raw",
            surplus_harvest_core::models::ParsingMode::Normalized => "normalized",
        };

        println!(
            "{:<14} {:<24} {:<11} {:<21} {:>9} {:>8} {:>9}  {}",
            connector.key.canonical(),
            connector.spider_name,
            mode,
            last_run,
            status.extracted,
            status.created,
            status.failures,
            status.last_error.as_deref().unwrap_or("-")
        );
    }

    Ok(())
}
