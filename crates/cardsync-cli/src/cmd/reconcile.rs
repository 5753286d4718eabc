use crate::exit::StepFailed;
use crate::output::print_json;
use anyhow::Context;
use cardsync_core::{
    config::Config,
    reconcile::{Cancellation, ExecutionReport, Mode, Plan, ReconcileRequest, Reconciler, StepOutcome},
    status::{Authority, Status},
    tracker,
};
use std::path::Path;

pub fn run(
    root: &Path,
    id: &str,
    execute: bool,
    to: Option<&str>,
    authority: Option<&str>,
    json: bool,
) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    let request = ReconcileRequest {
        id: id.to_string(),
        target: to
            .map(str::parse::<Status>)
            .transpose()
            .with_context(|| format!("invalid --to status '{}'", to.unwrap_or_default()))?,
        authority: authority.map(str::parse::<Authority>).transpose()?,
    };
    let tracker = tracker::open(root, &config.tracker).context("failed to open tracker")?;

    let mode = if execute { Mode::Execute } else { Mode::Plan };
    let cancel = Cancellation::new();
    if execute {
        watch_ctrl_c(cancel.clone());
    }

    let outcome = Reconciler::new(root, &config, tracker.as_ref())
        .run(&request, mode, &cancel)
        .with_context(|| format!("reconciliation of {id} failed"))?;

    if json {
        print_json(&outcome)?;
    } else {
        print_plan(&outcome.plan, execute);
        if let Some(report) = &outcome.report {
            print_report(report);
        }
    }

    if let Some(failed) = outcome.report.as_ref().and_then(ExecutionReport::failure) {
        if let StepOutcome::Failed { error, class } = &failed.outcome {
            return Err(StepFailed {
                index: failed.index,
                description: failed.description.clone(),
                error: error.clone(),
                class: *class,
            }
            .into());
        }
    }
    Ok(())
}

/// Flip `cancel` on Ctrl-C. The running step finishes; later steps are
/// reported as not reached.
fn watch_ctrl_c(cancel: Cancellation) {
    std::thread::spawn(move || {
        let rt = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(rt) => rt,
            Err(e) => {
                tracing::warn!(error = %e, "ctrl-c handler unavailable");
                return;
            }
        };
        rt.block_on(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("interrupt: finishing the current step");
                cancel.cancel();
            }
        });
    });
}

fn print_plan(plan: &Plan, execute: bool) {
    let status = if plan.status_before == plan.status_after {
        plan.status_after.to_string()
    } else {
        format!("{} -> {}", plan.status_before, plan.status_after)
    };
    println!("Card:     {} (revision {})", plan.id, plan.base_revision);
    println!("Status:   {status}");

    if !plan.sub_issues.is_empty() {
        let done = plan.sub_issues.iter().filter(|r| r.completed).count();
        println!("Children: {done}/{} complete", plan.sub_issues.len());
    }
    for note in &plan.notes {
        println!("note: {note}");
    }

    if plan.is_empty() {
        println!("\nNothing to do.");
        return;
    }
    println!("\nPlan ({} steps):", plan.steps.len());
    for (i, step) in plan.steps.iter().enumerate() {
        println!("  {}. {}", i + 1, step.describe());
    }
    if !execute {
        println!("\nDry run. Re-run with --execute to apply.");
    }
}

fn print_report(report: &ExecutionReport) {
    if report.steps.is_empty() {
        return;
    }
    println!("\nResult:");
    for step in &report.steps {
        let outcome = match &step.outcome {
            StepOutcome::Succeeded => "ok".to_string(),
            StepOutcome::Failed { error, .. } => format!("FAILED: {error}"),
            StepOutcome::NotReached => "not reached".to_string(),
        };
        println!("  {}. {:<40} {outcome}", step.index + 1, step.description);
    }
    if report.cancelled {
        println!("\nCancelled: re-run the pass to finish.");
    }
}
