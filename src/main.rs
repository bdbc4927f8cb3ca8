//! Malaria Detector command line
//!
//! Analyse blood-smear images and browse the local analysis history.

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use malaria_detector::models::Gender;
use malaria_detector::{
    AnalysisResult, AnalysisService, AppError, FileStorage, HistoryQuery, ImageUpload,
    PatientInfo, Prediction, Settings, SortOrder,
};

#[derive(Debug, Parser)]
#[command(name = "malaria-detector", version, about = "Blood smear analysis client")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Analyse a blood smear image
    Analyze(AnalyzeArgs),
    /// Browse and manage saved analyses
    #[command(subcommand)]
    History(HistoryCommand),
}

#[derive(Debug, Args)]
struct AnalyzeArgs {
    /// JPEG, PNG or TIFF image of the smear
    image: PathBuf,

    /// Save the result to history
    #[arg(long)]
    save: bool,

    /// Download a PDF report into this directory
    #[arg(long, value_name = "DIR")]
    report: Option<PathBuf>,

    #[command(flatten)]
    patient: PatientArgs,
}

#[derive(Debug, Args)]
struct PatientArgs {
    #[arg(long)]
    patient_id: Option<String>,

    #[arg(long)]
    age: Option<u32>,

    /// male, female or other
    #[arg(long)]
    gender: Option<Gender>,

    /// YYYY-MM-DD
    #[arg(long)]
    collection_date: Option<NaiveDate>,

    #[arg(long)]
    notes: Option<String>,
}

impl PatientArgs {
    fn into_patient_info(self) -> Option<PatientInfo> {
        let info = PatientInfo {
            patient_id: self.patient_id,
            age: self.age,
            gender: self.gender,
            collection_date: self.collection_date,
            notes: self.notes,
        };

        (info != PatientInfo::default()).then_some(info)
    }
}

#[derive(Debug, Subcommand)]
enum HistoryCommand {
    /// List saved analyses
    List {
        /// Match against patient ID or analysis ID
        #[arg(long)]
        search: Option<String>,

        /// positive, negative or uncertain
        #[arg(long)]
        prediction: Option<Prediction>,

        /// newest, oldest or confidence
        #[arg(long, default_value_t = SortOrder::Newest)]
        sort: SortOrder,
    },
    /// Show one saved analysis
    Show { id: String },
    /// Delete one saved analysis
    Delete { id: String },
    /// Delete all saved analyses
    Clear,
    /// Summary of saved analyses
    Stats,
}

/// What the analyze command prints
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AnalysisOutput<'a> {
    predictor: &'a str,
    results: &'a AnalysisResult,
    recommendations: [&'static str; 3],
    #[serde(skip_serializing_if = "Option::is_none")]
    saved_as: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    report: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env
    dotenv::dotenv().ok();

    // Logging
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,malaria_detector=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().json().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            match error.downcast_ref::<AppError>() {
                Some(app_error) => eprintln!("{}", app_error.report()),
                None => eprintln!("error: {:#}", error),
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let settings = Settings::from_env().context("Failed to load configuration")?;
    let service = AnalysisService::from_settings(&settings);

    info!(predictor = service.predictor_name(), "Malaria detector ready");

    match cli.command {
        Command::Analyze(args) => analyze(&service, args).await,
        Command::History(command) => history(&service, command),
    }
}

async fn analyze(service: &AnalysisService<FileStorage>, args: AnalyzeArgs) -> anyhow::Result<()> {
    let upload = ImageUpload::from_path(&args.image).await?;
    let patient_info = args.patient.into_patient_info();

    let results = service
        .analyze(&upload)
        .await?
        .context("Analysis was superseded by a newer request")?;

    let saved_as = if args.save {
        let item = service.save(&upload, results.clone(), patient_info.clone())?;
        Some(item.id)
    } else {
        None
    };

    let report = match &args.report {
        Some(dir) => Some(
            service
                .download_report(upload.to_data_url(), &results, patient_info.as_ref(), dir)
                .await?,
        ),
        None => None,
    };

    print_json(&AnalysisOutput {
        predictor: service.predictor_name(),
        results: &results,
        recommendations: results.recommendations(),
        saved_as,
        report,
    })
}

fn history(service: &AnalysisService<FileStorage>, command: HistoryCommand) -> anyhow::Result<()> {
    let history = service.history();

    match command {
        HistoryCommand::List {
            search,
            prediction,
            sort,
        } => {
            let items = history.query(&HistoryQuery {
                search,
                prediction,
                sort,
            });
            print_json(&items)
        }
        HistoryCommand::Show { id } => {
            let item = history
                .get(&id)
                .ok_or_else(|| AppError::NotFound(format!("No saved analysis with id {}", id)))?;
            print_json(&item)
        }
        HistoryCommand::Delete { id } => {
            history.remove(&id)?;
            Ok(())
        }
        HistoryCommand::Clear => {
            history.clear()?;
            Ok(())
        }
        HistoryCommand::Stats => print_json(&history.statistics()),
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
