//! `aria run`: Single task or interactive session.
//!
//! Ctrl-C while a task is running pulls the kill switch: the run stops at the
//! next iteration boundary. Ctrl-C at the prompt exits.

use std::io::Write;
use std::sync::Arc;

use aria_agent::AgentExecutor;
use aria_config::AppConfig;
use aria_core::action::{ExecutionLog, Step};
use aria_providers::{ProviderStatus, build_from_config, free_alternatives};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

use super::logs::summarize;
use super::{load_config, preview};

/// One line of REPL input.
#[derive(Debug, PartialEq, Eq)]
pub enum ReplCommand {
    Help,
    Tools,
    Providers,
    Usage,
    Logs(usize),
    Alternatives(String),
    Unblock(String),
    Remember(String),
    Clear,
    Exit,
    Empty,
    Unknown(String),
    Task(String),
}

impl ReplCommand {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Self::Empty;
        }
        if matches!(line, "exit" | "quit") {
            return Self::Exit;
        }
        let Some(command) = line.strip_prefix('/') else {
            return Self::Task(line.to_string());
        };

        let (name, arg) = match command.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (command, ""),
        };

        match (name, arg) {
            ("help", _) => Self::Help,
            ("tools", _) => Self::Tools,
            ("providers", _) => Self::Providers,
            ("usage", _) => Self::Usage,
            ("logs", "") => Self::Logs(5),
            ("logs", n) => n.parse().map(Self::Logs).unwrap_or(Self::Unknown(line.to_string())),
            ("alternatives", s) if !s.is_empty() => Self::Alternatives(s.to_string()),
            ("unblock", p) if !p.is_empty() => Self::Unblock(p.to_string()),
            ("remember", t) if !t.is_empty() => Self::Remember(t.to_string()),
            ("clear", _) => Self::Clear,
            ("exit" | "quit", _) => Self::Exit,
            _ => Self::Unknown(line.to_string()),
        }
    }
}

const HELP: &str = "\
  /help                   Show this help
  /tools                  List available tools
  /providers              Provider status
  /usage                  Provider usage statistics
  /logs [n]               Recent execution logs
  /alternatives <service> Free alternatives to a paid service
  /unblock <provider>     Reset a blocked provider
  /remember <note>        Store a long-term note
  /clear                  Clear the conversation
  /exit                   Quit";

pub async fn run(message: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    let executor = build_executor(&config);

    if executor.engine().provider_count() == 0 && !executor.engine().has_emergency() {
        return Err("No providers enabled and the emergency fallback is disabled. Edit ~/.aria/config.toml.".into());
    }

    if let Some(task) = message {
        let log = run_task(&executor, &task).await;
        println!("{}", log.result);
        if !log.success {
            std::process::exit(1);
        }
        return Ok(());
    }

    repl(&executor).await
}

fn build_executor(config: &AppConfig) -> AgentExecutor {
    let engine = Arc::new(build_from_config(config));
    let memory = aria_memory::from_config(&config.memory);
    let tools = Arc::new(aria_tools::default_registry(&config.tools));
    debug!(
        providers = engine.provider_count(),
        emergency = engine.has_emergency(),
        memory = memory.name(),
        tools = tools.len(),
        "Executor ready"
    );
    AgentExecutor::new(engine, memory, tools).with_config(&config.agent)
}

fn print_step(step: &Step) {
    eprintln!(
        "  ⚙  {} → {}",
        step.action.tool,
        preview(&step.observation, 80)
    );
}

/// Run one task, turning Ctrl-C into the kill switch.
async fn run_task(executor: &AgentExecutor, task: &str) -> ExecutionLog {
    let run = executor.run(task, print_step);
    tokio::pin!(run);

    loop {
        tokio::select! {
            log = &mut run => return log,
            signal = tokio::signal::ctrl_c() => {
                if signal.is_ok() && executor.is_running() {
                    executor.stop();
                    eprintln!("\n  🛑 Kill switch activated, stopping after the current step...");
                }
            }
        }
    }
}

async fn repl(executor: &AgentExecutor) -> Result<(), Box<dyn std::error::Error>> {
    println!();
    println!("  Aria: Interactive Mode");
    println!("  Tools:     {}", executor.tools().names().join(", "));
    println!("  Providers: {} (+ emergency fallback: {})",
        executor.engine().provider_count(),
        if executor.engine().has_emergency() { "yes" } else { "no" });
    println!("  Type a task, /help for commands, /exit to quit.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };

        match ReplCommand::parse(&line) {
            ReplCommand::Empty => continue,
            ReplCommand::Exit => break,
            ReplCommand::Help => println!("{HELP}"),
            ReplCommand::Tools => {
                for def in executor.tools().definitions() {
                    println!("  {:<22} {}", def.name, def.description);
                }
            }
            ReplCommand::Providers => {
                for report in executor.engine().provider_status() {
                    let error = report
                        .last_error
                        .as_deref()
                        .map(|e| format!("  ({})", preview(e, 60)))
                        .unwrap_or_default();
                    println!(
                        "  [{}] {:<28} {:<12}{error}",
                        report.priority, report.name, report.status
                    );
                }
            }
            ReplCommand::Usage => {
                let stats = executor.engine().usage_stats();
                println!("  {} calls, {} successful", stats.total, stats.successful);
                for (provider, count) in &stats.by_provider {
                    println!("    {provider:<28} {count}");
                }
            }
            ReplCommand::Logs(limit) => match executor.memory().execution_logs(limit).await {
                Ok(logs) if logs.is_empty() => println!("  No executions recorded yet."),
                Ok(logs) => logs.iter().for_each(|l| println!("{}", summarize(l))),
                Err(e) => eprintln!("  [Error] {e}"),
            },
            ReplCommand::Alternatives(service) => {
                for (i, alt) in free_alternatives(&service).iter().enumerate() {
                    println!("  {}. {alt}", i + 1);
                }
            }
            ReplCommand::Unblock(name) => {
                match executor.engine().set_status(&name, ProviderStatus::Unknown) {
                    Some(matched) => println!("  {matched} reset"),
                    None => println!("  No provider matches '{name}'"),
                }
            }
            ReplCommand::Remember(note) => match executor.memory().remember(&note).await {
                Ok(()) => println!("  Noted."),
                Err(e) => eprintln!("  [Error] {e}"),
            },
            ReplCommand::Clear => match executor.memory().clear().await {
                Ok(()) => println!("  Conversation cleared."),
                Err(e) => eprintln!("  [Error] {e}"),
            },
            ReplCommand::Unknown(input) => println!("  Unknown command: {input} (try /help)"),
            ReplCommand::Task(task) => {
                let log = run_task(executor, &task).await;
                println!();
                for line in log.result.lines() {
                    println!("  Aria > {line}");
                }
                println!();
            }
        }
    }

    println!("\n  Goodbye!\n");
    Ok(())
}
