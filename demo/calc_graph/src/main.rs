mod config;
use config::{CalcGraphConfig, OutputFormat};
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::mpsc;
use topicflow_core::{Deployment, Engine, Graph, LoadReport, TopicRow};
use tracing::{error, info, warn};

type DemoResult<T> = Result<T, Box<dyn std::error::Error>>;

const HELP: &str = "\
commands:
  <topic> <value>   publish a value (e.g. `A 5`)
  table             last value, subscribers and publishers per topic
  graph             print the current topology
  load <file>       replace the running graph configuration
  help              this text
  quit              exit";

#[derive(Debug, PartialEq)]
enum Command {
    Publish { topic: String, value: String },
    Table,
    Graph,
    Load(PathBuf),
    Help,
    Quit,
}

impl Command {
    fn parse(line: &str) -> Option<Command> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let (head, rest) = match line.split_once(char::is_whitespace) {
            Some((head, rest)) => (head, rest.trim()),
            None => (line, ""),
        };
        let cmd = match (head, rest) {
            ("table", "") => Command::Table,
            ("graph", "") => Command::Graph,
            ("help", "") | ("?", "") => Command::Help,
            ("quit", "") | ("exit", "") => Command::Quit,
            ("load", path) if !path.is_empty() => Command::Load(PathBuf::from(path)),
            (topic, value) => Command::Publish {
                topic: topic.to_string(),
                value: value.to_string(),
            },
        };
        Some(cmd)
    }
}

#[tokio::main]
async fn main() -> DemoResult<()> {
    topicflow_core::telemetry::init_tracing("info,topicflow_core=info,calc_graph=info");
    info!(target = "calc_graph", "Starting calc_graph demo");

    // Defaults + env + optional TOML overlay; a path argument wins
    let mut cfg = CalcGraphConfig::load();
    if let Some(path) = std::env::args().nth(1) {
        cfg.graph = Some(PathBuf::from(path));
    }

    let engine = Arc::new(Engine::new(cfg.engine.clone()));
    let report = match cfg.graph.clone() {
        Some(path) => load_file(&engine, path).await?,
        None => {
            info!(target = "calc_graph", "No graph file given; running the math example");
            let engine = Arc::clone(&engine);
            tokio::task::spawn_blocking(move || {
                engine.load_with(|topics, _, settings| Deployment::math_example(topics, settings))
            })
            .await??
        }
    };
    print_report(&report, cfg.output)?;
    println!("{}", HELP);

    // Dedicated reader thread: blocking stdin must not hold up runtime shutdown
    let (line_tx, mut line_rx) = mpsc::unbounded_channel::<String>();
    std::thread::Builder::new()
        .name("stdin-reader".into())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if line_tx.send(line).is_err() {
                    break;
                }
            }
        })?;

    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                info!(target = "calc_graph", "Shutting down...");
                break;
            }
            line = line_rx.recv() => {
                let Some(line) = line else {
                    info!(target = "calc_graph", "Input closed");
                    break;
                };
                match Command::parse(&line) {
                    None => {}
                    Some(Command::Quit) => break,
                    Some(cmd) => {
                        if let Err(e) = run_command(&engine, cmd, cfg.output).await {
                            error!(target = "calc_graph", error = %e, "Command failed");
                        }
                    }
                }
            }
        }
    }

    let engine = Arc::clone(&engine);
    tokio::task::spawn_blocking(move || engine.shutdown()).await?;
    Ok(())
}

async fn run_command(engine: &Arc<Engine>, cmd: Command, output: OutputFormat) -> DemoResult<()> {
    match cmd {
        Command::Publish { topic, value } => {
            // Publishing can block on a full mailbox
            let engine = Arc::clone(engine);
            tokio::task::spawn_blocking(move || engine.publish(&topic, &value)).await?;
        }
        Command::Table => print_table(&engine.table()),
        Command::Graph => {
            let graph = engine.graph();
            print_graph(&graph, output)?;
            warn_on_cycle(&graph);
        }
        Command::Load(path) => {
            let report = load_file(engine, path).await?;
            print_report(&report, output)?;
        }
        Command::Help => println!("{}", HELP),
        Command::Quit => {}
    }
    Ok(())
}

async fn load_file(engine: &Arc<Engine>, path: PathBuf) -> DemoResult<LoadReport> {
    let text = tokio::fs::read_to_string(&path).await?;
    info!(target = "calc_graph", path = %path.display(), "Loading graph file");
    let engine = Arc::clone(engine);
    let report = tokio::task::spawn_blocking(move || engine.load(&text)).await??;
    Ok(report)
}

fn print_report(report: &LoadReport, output: OutputFormat) -> DemoResult<()> {
    println!("agents: {}", report.agents.join(", "));
    print_graph(&report.graph, output)?;
    warn_on_cycle(&report.graph);
    Ok(())
}

fn print_graph(graph: &Graph, output: OutputFormat) -> DemoResult<()> {
    match output {
        OutputFormat::Json => println!("{}", graph.to_json()?),
        OutputFormat::Text => {
            for node in graph.nodes() {
                println!("{} -> [{}]", node.name(), graph.edge_names(node).join(", "));
            }
        }
    }
    Ok(())
}

fn warn_on_cycle(graph: &Graph) {
    if let Some(cycle) = graph.find_cycle() {
        warn!(target = "calc_graph", cycle = %cycle.join(" -> "), "Graph contains a cycle");
        println!("WARNING: cycle detected: {}", cycle.join(" -> "));
    }
}

fn print_table(rows: &[TopicRow]) {
    println!("{:<16} {:>14} {:>6} {:>6}", "topic", "value", "subs", "pubs");
    for row in rows {
        println!(
            "{:<16} {:>14} {:>6} {:>6}",
            row.topic,
            row.value.as_deref().unwrap_or("-"),
            row.subscribers,
            row.publishers
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands() {
        assert_eq!(Command::parse("   "), None);
        assert_eq!(Command::parse("table"), Some(Command::Table));
        assert_eq!(Command::parse(" quit "), Some(Command::Quit));
        assert_eq!(
            Command::parse("load graphs/chain.txt"),
            Some(Command::Load(PathBuf::from("graphs/chain.txt")))
        );
        assert_eq!(
            Command::parse("A  5.5"),
            Some(Command::Publish {
                topic: "A".into(),
                value: "5.5".into()
            })
        );
    }

    #[test]
    fn bare_topic_publishes_empty_text() {
        assert_eq!(
            Command::parse("load"),
            Some(Command::Publish {
                topic: "load".into(),
                value: String::new()
            })
        );
    }
}
