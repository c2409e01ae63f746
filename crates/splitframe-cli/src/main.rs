//! splitframe CLI: validate, explain, and lower YAML pipelines.

use std::fs;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use splitframe_frame::dsl::parse_pipeline;
use splitframe_frame::Frame;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "splitframe")]
#[command(about = "Logical-plan front end for partitioned dataframe pipelines", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a pipeline YAML file (parse and schema-check)
    Validate {
        /// Path to the pipeline YAML file
        #[arg(short, long)]
        pipeline: PathBuf,
    },

    /// Show the plan tree before and after optimization
    Explain {
        /// Path to the pipeline YAML file
        #[arg(short, long)]
        pipeline: PathBuf,
    },

    /// Optimize and lower a pipeline, printing the task graph as JSON
    Lower {
        /// Path to the pipeline YAML file
        #[arg(short, long)]
        pipeline: PathBuf,

        /// Lower the plan as written, skipping optimization
        #[arg(long)]
        no_optimize: bool,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Validate { pipeline } => validate(&pipeline),
        Commands::Explain { pipeline } => explain(&pipeline),
        Commands::Lower {
            pipeline,
            no_optimize,
        } => lower(&pipeline, no_optimize),
    };
    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn load(pipeline_path: &PathBuf) -> Result<Frame, Box<dyn std::error::Error>> {
    let yaml_content = fs::read_to_string(pipeline_path)?;
    Ok(parse_pipeline(&yaml_content)?)
}

fn validate(pipeline_path: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let frame = load(pipeline_path)?;
    println!("✓ Pipeline is valid");
    println!("  Output columns: {:?}", frame.schema().names());
    match frame.npartitions() {
        Some(n) => println!("  Output partitions: {}", n),
        None => println!("  Output partitions: unknown"),
    }
    Ok(())
}

fn explain(pipeline_path: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let frame = load(pipeline_path)?;
    println!("Logical plan");
    println!("============");
    print!("{}", frame.explain());
    println!();

    let (optimized, report) = frame.optimize();
    println!("Optimized plan");
    println!("==============");
    print!("{}", optimized.explain());
    println!();
    println!("Passes:");
    for pass in &report.passes {
        println!(
            "  {:<20} iterations={} changed={}{}",
            pass.name,
            pass.iterations,
            pass.changed,
            if pass.stalled { " (stalled)" } else { "" }
        );
    }
    Ok(())
}

fn lower(pipeline_path: &PathBuf, no_optimize: bool) -> Result<(), Box<dyn std::error::Error>> {
    let frame = load(pipeline_path)?;
    let frame = if no_optimize {
        frame
    } else {
        frame.optimize().0
    };
    let graph = frame.lower()?;
    graph.validate()?;
    println!("{}", serde_json::to_string_pretty(&graph)?);
    Ok(())
}
