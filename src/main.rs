use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use slithercat::{
    data::{load_split, load_splits, DataSource, Split},
    inference::{Detector, DEFAULT_THRESHOLD},
    Config,
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch, clean, train, evaluate and save model + vectorizer
    Train {
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Read train/validation/test .jsonl files instead of the Hub dataset
        #[arg(short, long, value_name = "DIR")]
        data_dir: Option<PathBuf>,

        #[arg(short, long, value_name = "FILE")]
        report: Option<PathBuf>,
    },

    /// Score saved artifacts on the test split
    Evaluate {
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,

        #[arg(short, long, value_name = "DIR")]
        data_dir: Option<PathBuf>,

        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Predict vulnerability classes for one bytecode file
    Detect {
        #[arg(short, long, value_name = "FILE")]
        bytecode: PathBuf,

        /// Class names are taken from `data.class_names`
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,

        #[arg(short, long, value_name = "FILE")]
        model: PathBuf,

        #[arg(short, long, value_name = "FILE")]
        vectorizer: PathBuf,

        #[arg(short, long)]
        threshold: Option<f32>,
    },
}

fn load_config(path: Option<PathBuf>, data_dir: Option<PathBuf>) -> Result<Config> {
    let mut config: Config = if let Some(config_path) = path {
        let config_str = std::fs::read_to_string(config_path)?;
        serde_json::from_str(&config_str)?
    } else {
        Config::default()
    };

    if let Some(dir) = data_dir {
        config.data.source = DataSource::Local { dir };
    }

    Ok(config)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Train { config, data_dir, report } => {
            let config = load_config(config, data_dir)?;
            let splits = load_splits(&config.data.source)?;

            let output = slithercat::run_pipeline(&splits, &config)?;
            output.report.print_table();

            if let Some(path) = report.or(config.artifacts.report_path.clone()) {
                output.report.save_to_file(path)?;
            }

            Ok(())
        }

        Commands::Evaluate { config, data_dir, output } => {
            let config = load_config(config, data_dir)?;
            let test = load_split(&config.data.source, Split::Test)?;

            let report = slithercat::evaluate_saved(&test, &config)?;
            report.print_table();

            if let Some(path) = output {
                report.save_to_file(path)?;
            }

            Ok(())
        }

        Commands::Detect { bytecode, config, model, vectorizer, threshold } => {
            let config = load_config(config, None)?;
            let detector = Detector::from_files(
                model,
                vectorizer,
                &config.data.class_names,
                threshold.unwrap_or(DEFAULT_THRESHOLD),
            )?;

            let bytecode = std::fs::read_to_string(bytecode)?;
            let scores = detector.detect(bytecode.trim())?;
            println!("{}", serde_json::to_string_pretty(&scores)?);

            Ok(())
        }
    }
}
