use anyhow::Result;
use clap::{Parser, Subcommand};
use graphcore::{ExecutionEvent, NodeSpec, Value, Workflow};
use graphruntime::{GraphRuntime, NodeRegistry, RuntimeConfig};
use std::collections::HashMap;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "graphflow")]
#[command(about = "Workflow graph engine CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a workflow file
    Run {
        /// Path to workflow JSON file
        #[arg(short, long)]
        file: PathBuf,

        /// Initial run variables as a JSON object
        #[arg(short, long)]
        variables: Option<String>,

        /// Show verbose output
        #[arg(short = 'V', long)]
        verbose: bool,
    },

    /// Validate a workflow file without running it
    Validate {
        /// Path to workflow JSON file
        file: PathBuf,
    },

    /// List available node types
    Nodes,

    /// Create a new example workflow
    Init {
        /// Output file path
        #[arg(short, long, default_value = "workflow.json")]
        output: PathBuf,
    },
}

fn build_runtime() -> GraphRuntime {
    let mut registry = NodeRegistry::new();
    graphnodes::register_all(&mut registry);
    GraphRuntime::with_registry(std::sync::Arc::new(registry), RuntimeConfig::default())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            file,
            variables,
            verbose,
        } => {
            let level = if verbose {
                tracing::Level::DEBUG
            } else {
                tracing::Level::INFO
            };
            tracing_subscriber::fmt().with_max_level(level).init();

            run_workflow(file, variables).await?;
        }

        Commands::Validate { file } => {
            validate_workflow(file)?;
        }

        Commands::Nodes => {
            list_nodes();
        }

        Commands::Init { output } => {
            create_example_workflow(output)?;
        }
    }

    Ok(())
}

async fn run_workflow(file: PathBuf, variables: Option<String>) -> Result<()> {
    println!("Loading workflow from: {}", file.display());

    let workflow_json = std::fs::read_to_string(&file)?;
    let workflow: Workflow = serde_json::from_str(&workflow_json)?;

    println!("Workflow: {}", workflow.name);
    println!("  nodes: {}", workflow.nodes.len());
    println!("  edges: {}", workflow.edges.len());
    println!();

    let variables: HashMap<String, Value> = if let Some(raw) = variables {
        let json: serde_json::Value = serde_json::from_str(&raw)?;
        if let serde_json::Value::Object(obj) = json {
            obj.into_iter()
                .map(|(k, v)| (k, Value::from_json(v)))
                .collect()
        } else {
            return Err(anyhow::anyhow!("--variables must be a JSON object"));
        }
    } else {
        HashMap::new()
    };

    let runtime = build_runtime();
    let mut events = runtime.subscribe_events();

    let event_task = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                ExecutionEvent::WorkflowStarted { .. } => {
                    println!("workflow started");
                }
                ExecutionEvent::NodeStarted {
                    node_id, node_type, ..
                } => {
                    println!("  > {} ({})", node_id, node_type);
                }
                ExecutionEvent::NodeCompleted {
                    node_id,
                    duration_ms,
                    ..
                } => {
                    println!("  + {} completed in {}ms", node_id, duration_ms);
                }
                ExecutionEvent::NodeFailed { node_id, error, .. } => {
                    println!("  ! {} failed: {}", node_id, error);
                }
                ExecutionEvent::NodeSkipped { node_id, .. } => {
                    println!("  - {} skipped (branch not taken)", node_id);
                }
                ExecutionEvent::NodeEvent { node_id, event, .. } => match event {
                    graphcore::NodeEvent::Info { message } => {
                        println!("    [{}] {}", node_id, message);
                    }
                    graphcore::NodeEvent::Warning { message } => {
                        println!("    [{}] warning: {}", node_id, message);
                    }
                    graphcore::NodeEvent::Progress { percent, message } => {
                        match message {
                            Some(msg) => println!("    [{}] {}% - {}", node_id, percent, msg),
                            None => println!("    [{}] {}%", node_id, percent),
                        }
                    }
                },
                ExecutionEvent::WorkflowCompleted {
                    success,
                    duration_ms,
                    ..
                } => {
                    if success {
                        println!("workflow completed in {}ms", duration_ms);
                    } else {
                        println!("workflow failed after {}ms", duration_ms);
                    }
                }
            }
        }
    });

    let result = runtime.execute(&workflow, variables).await;

    // Let the event listener drain before printing the summary.
    tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    event_task.abort();

    match result {
        Ok(run) => {
            println!();
            println!("Run {}:", run.execution_id);
            println!(
                "  completed {}/{} nodes ({} skipped)",
                run.completed_nodes,
                run.total_nodes,
                run.skipped.len()
            );
            if !run.outputs.is_empty() {
                println!("  outputs:");
                let mut ids: Vec<_> = run.outputs.keys().collect();
                ids.sort();
                for id in ids {
                    println!("    {}: {}", id, run.outputs[id].to_json());
                }
            }
            Ok(())
        }
        Err(e) => {
            if let Some(node_id) = e.failing_node() {
                eprintln!("run failed at node '{}'", node_id);
            }
            Err(e.into())
        }
    }
}

fn validate_workflow(file: PathBuf) -> Result<()> {
    println!("Validating workflow: {}", file.display());

    let workflow_json = std::fs::read_to_string(&file)?;
    let workflow: Workflow = serde_json::from_str(&workflow_json)?;

    build_runtime().validate(&workflow)?;

    println!("Workflow is valid:");
    println!("  name: {}", workflow.name);
    println!("  nodes: {}", workflow.nodes.len());
    println!("  edges: {}", workflow.edges.len());

    Ok(())
}

fn list_nodes() {
    println!("Available node types:");
    println!();

    let mut registry = NodeRegistry::new();
    graphnodes::register_all(&mut registry);

    for node_type in registry.list_node_types() {
        match registry.get_metadata(&node_type) {
            Some(info) => {
                println!("  {} ({})", node_type, info.category);
                println!("    {}", info.description);
            }
            None => println!("  {}", node_type),
        }
    }
}

fn create_example_workflow(output: PathBuf) -> Result<()> {
    let mut workflow = Workflow::new("Example chunking workflow");
    workflow.description = Some("Chunks a greeting's words and renders the result".to_string());
    workflow.set_constant("greeting", "hello world");

    workflow.add_node(
        NodeSpec::new("greet", "input.text")
            .with_name("Greeting")
            .with_config("value", "{{greeting}}"),
    );
    workflow.add_node(
        NodeSpec::new("show", "visualize.passthrough").with_name("Show result"),
    );
    workflow.connect("greet", "show");

    let json = serde_json::to_string_pretty(&workflow)?;
    std::fs::write(&output, json)?;

    println!("Created example workflow: {}", output.display());
    println!();
    println!("Run it with:");
    println!("  graphflow run --file {}", output.display());

    Ok(())
}
