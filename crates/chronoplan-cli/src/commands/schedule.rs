use chrono::NaiveDate;
use chronoplan_core::Plan;
use clap::Args;
use std::path::{Path, PathBuf};

#[derive(Args)]
pub struct ScheduleArgs {
    /// Declaration file (.toml or .json)
    declaration: PathBuf,
    /// First date to plan from (YYYY-MM-DD, defaults to today)
    #[arg(long)]
    start: Option<NaiveDate>,
    /// Lay out a saved plan instead of deriving one
    #[arg(long)]
    plan: Option<PathBuf>,
    /// Only show this date
    #[arg(long)]
    date: Option<NaiveDate>,
    /// Write the schedules to this file instead of stdout
    #[arg(long, short)]
    output: Option<PathBuf>,
}

pub fn run(args: ScheduleArgs, config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let engine = super::engine(&args.declaration, args.start, config_path)?;
    let schedules = match &args.plan {
        Some(path) => engine.schedule(&Plan::load(path)?)?,
        None => engine.derive_schedules()?,
    };

    if let Some(date) = args.date {
        let schedule = schedules
            .get(date)
            .ok_or_else(|| format!("nothing scheduled on {date}"))?;
        return super::emit(schedule, args.output.as_deref());
    }
    match args.output {
        Some(path) => {
            schedules.save(&path)?;
            eprintln!("{} day(s) written to {}", schedules.len(), path.display());
        }
        None => super::emit(&schedules, None)?,
    }
    Ok(())
}
