use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{bail, Context};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;

mod band;
mod config;
mod eligibility;
mod error;
mod layout;
mod models;
mod normalize;
mod report;
mod rollup;
mod sheet_name;
mod workbook;

use band::{BandTable, BandTableId};
use config::AnalysisConfig;
use models::{
    Batch, ClassStats, CohortReport, FileFailure, GroupSummary, SchoolKpis, SheetWarning,
    StudentOverallFacts,
};
use sheet_name::SheetNameOrder;

#[derive(Parser)]
#[command(name = "completion-bands")]
#[command(about = "Assessment completion facts and bands from weekly LMS exports", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct AnalysisArgs {
    /// Workbooks (.xlsx, .xls, .xlsm, .xlsb, .ods) or CSV exports
    #[arg(required = true)]
    files: Vec<PathBuf>,
    /// Count assessments due on or before this date (defaults to today)
    #[arg(long, env = "COMPLETION_CUTOFF")]
    cutoff: Option<NaiveDate>,
    /// Only count assessments due on or after this date
    #[arg(long)]
    since: Option<NaiveDate>,
    /// Stop counting at this date, earlier than the cutoff
    #[arg(long)]
    until: Option<NaiveDate>,
    /// Read numeric dates like 03/04/2025 as month/day
    #[arg(long)]
    month_first: bool,
    /// Threshold table: legacy-2024 or revised-2025
    #[arg(long, default_value = "revised-2025")]
    bands: BandTableId,
    /// Grade/section order in sheet names: auto, grade-first or section-first
    #[arg(long, default_value = "auto")]
    sheet_order: SheetNameOrder,
    /// Limit the cohort to subjects containing this text (repeatable)
    #[arg(long)]
    subject: Vec<String>,
    /// Limit the cohort to sheets with this exact name (repeatable)
    #[arg(long)]
    sheet: Vec<String>,
}

impl AnalysisArgs {
    fn config(&self) -> anyhow::Result<AnalysisConfig> {
        let config = AnalysisConfig {
            cutoff: self.cutoff.unwrap_or_else(config::today),
            window_start: self.since,
            window_end: self.until,
            day_first: !self.month_first,
            band_table: self.bands,
            sheet_name_order: self.sheet_order,
        };
        config.validate()?;
        Ok(config)
    }

    fn has_filters(&self) -> bool {
        !self.subject.is_empty() || !self.sheet.is_empty()
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Print school KPIs, per-class stats and warnings
    Analyze {
        #[command(flatten)]
        args: AnalysisArgs,
    },
    /// Write a markdown digest
    Report {
        #[command(flatten)]
        args: AnalysisArgs,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Write the structured facts as JSON
    Export {
        #[command(flatten)]
        args: AnalysisArgs,
        #[arg(long, default_value = "facts.json")]
        out: PathBuf,
    },
}

#[derive(Serialize)]
struct FactsExport<'a> {
    config: &'a AnalysisConfig,
    overall: BTreeMap<String, StudentOverallFacts>,
    classes: Vec<ClassStats>,
    kpis: SchoolKpis,
    unassessed_students: Vec<String>,
    grades: Vec<GroupSummary>,
    subjects: Vec<GroupSummary>,
    cohort: Option<CohortReport>,
    warnings: &'a [SheetWarning],
    failures: &'a [FileFailure],
}

fn load(args: &AnalysisArgs) -> anyhow::Result<(AnalysisConfig, Batch)> {
    let config = args.config().context("invalid analysis settings")?;
    let batch = workbook::ingest_files(&args.files, &config);
    let batch = eligibility::apply_window_end(batch, &config);

    for failure in &batch.failures {
        eprintln!("skipped {}: {}", failure.file, failure.message);
    }
    if batch.sheets.is_empty() {
        bail!(
            "no usable data: none of the {} files contained a readable sheet",
            args.files.len()
        );
    }
    Ok((config, batch))
}

fn cohort(args: &AnalysisArgs, batch: &Batch, table: &BandTable) -> Option<CohortReport> {
    if !args.has_filters() {
        return None;
    }
    let selection = batch.find_sheets(&args.subject, &args.sheet);
    if selection.is_empty() {
        log::warn!("no sheets matched the subject/sheet filters");
    }
    Some(rollup::cohort_report(batch, &selection, table))
}

fn print_analysis(batch: &Batch, table: &BandTable, cohort: Option<&CohortReport>) {
    let kpis = rollup::school_kpis(batch, table);
    println!(
        "{} sheets, {} students with work due ({} with nothing due)",
        kpis.sheet_count, kpis.total_students, kpis.unassessed_students
    );
    println!(
        "Completion: mean {:.2}%, weighted {:.2}% ({} of {} assessments)",
        kpis.mean_completion,
        kpis.weighted_completion,
        kpis.total_completed,
        kpis.total_eligible_assessments
    );
    for (band, count) in kpis.band_distribution.iter() {
        println!("- {}: {}", band.label(), count);
    }

    println!();
    println!("Classes:");
    for sheet in &batch.sheets {
        let stats = rollup::class_stats(sheet, table);
        println!(
            "- {} ({} {}): {:.2}% mean, {} of {} with work due, {} need attention",
            stats.sheet_name,
            stats.identity.subject,
            stats.identity.class_code,
            stats.mean_completion,
            stats.eligible_students,
            stats.total_students,
            stats.needs_attention.len()
        );
    }

    if let Some(cohort) = cohort {
        println!();
        println!(
            "Cohort of {} sheets: {} students, {:.2}% weighted ({} of {})",
            cohort.sheets.len(),
            cohort.total_students,
            cohort.weighted_completion,
            cohort.total_completed,
            cohort.total_due
        );
        for (band, names) in &cohort.students_by_band {
            if !names.is_empty() {
                println!("- {}: {}", band.label(), names.join(", "));
            }
        }
    }

    if !batch.warnings.is_empty() {
        println!();
        println!("Warnings:");
        for warning in &batch.warnings {
            println!(
                "- {} / {}: {}",
                warning.file,
                warning.sheet.as_deref().unwrap_or("-"),
                warning.message
            );
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Analyze { args } => {
            let (config, batch) = load(&args)?;
            let table = BandTable::for_id(config.band_table);
            let cohort = cohort(&args, &batch, &table);
            print_analysis(&batch, &table, cohort.as_ref());
        }
        Commands::Report { args, out } => {
            let (config, batch) = load(&args)?;
            let table = BandTable::for_id(config.band_table);
            let mut output = report::build_report(&config, &batch);
            if let Some(cohort) = cohort(&args, &batch, &table) {
                output.push_str(&report::build_cohort_section(&cohort));
            }
            std::fs::write(&out, output)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
        Commands::Export { args, out } => {
            let (config, batch) = load(&args)?;
            let table = BandTable::for_id(config.band_table);
            let export = FactsExport {
                config: &config,
                overall: rollup::student_overall(&batch, &table),
                classes: batch
                    .sheets
                    .iter()
                    .map(|sheet| rollup::class_stats(sheet, &table))
                    .collect(),
                kpis: rollup::school_kpis(&batch, &table),
                unassessed_students: rollup::unassessed_students(&batch),
                grades: rollup::grade_summaries(&batch),
                subjects: rollup::subject_summaries(&batch),
                cohort: cohort(&args, &batch, &table),
                warnings: &batch.warnings,
                failures: &batch.failures,
            };
            let json = serde_json::to_string_pretty(&export).context("failed to encode facts")?;
            std::fs::write(&out, json)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!(
                "Facts for {} sheets written to {}.",
                batch.sheets.len(),
                out.display()
            );
        }
    }

    Ok(())
}
