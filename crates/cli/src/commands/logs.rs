//! `aria logs`: Recent execution logs.

use aria_core::action::ExecutionLog;
use aria_memory::success_rate;

use super::{load_config, preview};

pub async fn run(limit: usize) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    let memory = aria_memory::from_config(&config.memory);
    let logs = memory.execution_logs(limit).await?;

    if logs.is_empty() {
        println!("No executions recorded yet.");
        return Ok(());
    }

    for log in &logs {
        println!("{}", summarize(log));
    }
    println!(
        "\n{} shown, {:.0}% successful",
        logs.len(),
        success_rate(&logs) * 100.0
    );
    Ok(())
}

pub fn summarize(log: &ExecutionLog) -> String {
    let mark = if log.success { "✅" } else { "❌" };
    let mut line = format!(
        "{mark} {} [{}] {} steps, {} ms, via {}\n   task:   {}\n   result: {}",
        log.timestamp.format("%Y-%m-%d %H:%M:%S"),
        &log.id[..log.id.len().min(8)],
        log.steps.len(),
        log.duration_ms,
        log.provider.as_deref().unwrap_or("-"),
        preview(&log.task, 70),
        preview(&log.result, 70),
    );
    if let Some(error) = &log.error {
        line.push_str(&format!("\n   error:  {}", preview(error, 70)));
    }
    line
}
