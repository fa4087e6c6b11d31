#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

use chrono::NaiveDate;
use clap::{Args, CommandFactory, Parser, Subcommand};
use rayon::prelude::*;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process;

use pe_ruleout::features::AssessmentInput;
use pe_ruleout::model::{Decision, ModelArtifact};
use pe_ruleout::pipeline::{PatientReport, assess_patient};

/// Exit status when required features are missing and no prediction was made.
const EXIT_REJECTED: i32 = 2;

#[derive(Args)]
pub struct ModelArgs {
    /// Path to the trained model file (.toml). Without one, or if it cannot be
    /// loaded, a rule-based fallback with reduced fidelity is used.
    #[arg(long, env = "PE_RULEOUT_MODEL", value_name = "MODEL_PATH")]
    pub model: Option<PathBuf>,
}

#[derive(Args)]
pub struct AssessArgs {
    /// Path to an assessment document (JSON) with demographics, records and features
    #[arg(value_name = "INPUT_JSON")]
    pub input: PathBuf,

    #[command(flatten)]
    pub model: ModelArgs,

    /// Date ages are computed against (defaults to today)
    #[arg(long, value_name = "YYYY-MM-DD")]
    pub as_of: Option<NaiveDate>,

    /// Print single-line JSON instead of pretty-printed output
    #[arg(long)]
    pub compact: bool,
}

#[derive(Args)]
pub struct BatchArgs {
    /// Path to a JSON array of assessment documents
    #[arg(value_name = "INPUTS_JSON")]
    pub inputs: PathBuf,

    #[command(flatten)]
    pub model: ModelArgs,

    /// Date ages are computed against (defaults to today)
    #[arg(long, value_name = "YYYY-MM-DD")]
    pub as_of: Option<NaiveDate>,

    /// Where to write the TSV summary (defaults to stdout)
    #[arg(long, value_name = "OUTPUT_TSV")]
    pub output: Option<PathBuf>,
}

#[derive(Parser)]
#[command(
    name = "pe-ruleout",
    about = "Pulmonary embolism rule-out decision support",
    long_about = "Maps clinical records to model features, scores them with a trained \
                 classifier, and reports whether PE can be ruled out without imaging. \
                 This is a decision support tool, not a diagnostic test."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Assess one patient and print the full report as JSON
    Assess(AssessArgs),
    /// Assess many patients in parallel and write a TSV summary
    Batch(BatchArgs),
    /// Describe the loaded model
    Describe(ModelArgs),
}

fn main() {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let cli = Cli::parse();
    let result = match cli.command {
        Some(Commands::Assess(args)) => assess(args),
        Some(Commands::Batch(args)) => batch(args),
        Some(Commands::Describe(args)) => describe(args),
        None => {
            let mut command = Cli::command();
            command
                .print_help()
                .map(|_| {
                    println!();
                    0
                })
                .map_err(Into::into)
        }
    };

    match result {
        Ok(code) if code != 0 => process::exit(code),
        Ok(_) => {}
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}

fn load_model(args: &ModelArgs) -> ModelArtifact {
    ModelArtifact::load_or_fallback(args.model.as_deref())
}

fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

fn assess(args: AssessArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let artifact = load_model(&args.model);
    let input = AssessmentInput::from_json_file(&args.input)?;
    let report = assess_patient(&artifact, &input, args.as_of.unwrap_or_else(today));

    let json = if args.compact {
        serde_json::to_string(&report)?
    } else {
        serde_json::to_string_pretty(&report)?
    };
    println!("{json}");

    Ok(if report.is_rejected() { EXIT_REJECTED } else { 0 })
}

fn batch(args: BatchArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let artifact = load_model(&args.model);
    let inputs = AssessmentInput::batch_from_json_file(&args.inputs)?;
    let as_of = args.as_of.unwrap_or_else(today);
    log::info!("Assessing {} patients", inputs.len());

    let reports: Vec<PatientReport> = inputs
        .par_iter()
        .map(|input| assess_patient(&artifact, input, as_of))
        .collect();

    let rejected = reports.iter().filter(|r| r.is_rejected()).count();
    let ruled_out = reports
        .iter()
        .filter(|r| r.decision() == Some(Decision::RuleOut))
        .count();
    log::info!(
        "Assessed {} patients: {} ruled out, {} rejected for missing features",
        reports.len(),
        ruled_out,
        rejected
    );

    match &args.output {
        Some(path) => {
            write_batch_tsv(&reports, std::fs::File::create(path)?)?;
            log::info!("Batch results saved to: {}", path.display());
        }
        None => write_batch_tsv(&reports, io::stdout().lock())?,
    }
    Ok(0)
}

/// One row per patient: id, probability, decision, confidence, status, fidelity.
/// Rejected patients have empty prediction columns.
fn write_batch_tsv<W: Write>(reports: &[PatientReport], sink: W) -> Result<(), csv::Error> {
    let mut writer = csv::WriterBuilder::new().delimiter(b'\t').from_writer(sink);
    writer.write_record([
        "patient_id",
        "probability",
        "decision",
        "confidence",
        "status",
        "reduced_fidelity",
    ])?;
    for report in reports {
        let patient_id = report.patient_id.as_deref().unwrap_or("");
        match report.result() {
            Some(result) => writer.write_record([
                patient_id,
                format!("{:.4}", result.probability).as_str(),
                result.decision.as_str(),
                result.confidence.as_str(),
                "assessed",
                if result.reduced_fidelity { "true" } else { "false" },
            ])?,
            None => writer.write_record([patient_id, "", "", "", "rejected", ""])?,
        }
    }
    writer.flush()?;
    Ok(())
}

fn describe(args: ModelArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let artifact = load_model(&args);
    println!("{}", serde_json::to_string_pretty(&artifact.info())?);
    Ok(0)
}
