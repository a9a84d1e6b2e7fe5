//! Run report output.

use std::io::Write;

use widepack_core::RunReport;

/// Print the report as pretty JSON.
pub fn print_json(report: &RunReport, out: &mut impl Write) -> anyhow::Result<()> {
    serde_json::to_writer_pretty(&mut *out, report)?;
    writeln!(out)?;
    Ok(())
}

/// Print a short human readable summary.
pub fn print_summary(report: &RunReport, out: &mut impl Write) -> anyhow::Result<()> {
    let prefix = if report.dry_run { "[dry-run] " } else { "" };
    let action = match (report.dry_run, report.index.created) {
        (true, _) => "would update",
        (false, true) => "created",
        (false, false) => "updated",
    };
    writeln!(
        out,
        "{prefix}Package {}: {} component(s), {} file(s)",
        report.package_id, report.components, report.files
    )?;
    writeln!(
        out,
        "{prefix}Index {} {action} ({} package record(s))",
        report.index.path.display(),
        report.index.packages
    )?;

    if let Some(deployment) = &report.deployment {
        match &deployment.summary {
            Some(summary) => writeln!(
                out,
                "Staged {} file(s), {} bytes into {}",
                summary.files,
                summary.bytes,
                deployment.package_root.display()
            )?,
            None => writeln!(
                out,
                "{prefix}Would stage {} file(s) into {}",
                deployment.mappings.len(),
                deployment.package_root.display()
            )?,
        }
        if let Some(published) = &deployment.published_index {
            writeln!(out, "Published index to {}", published.display())?;
        }
    }

    if !report.diagnostics.is_empty() {
        writeln!(out, "{} item(s) skipped:", report.diagnostics.len())?;
        for diagnostic in &report.diagnostics {
            writeln!(out, "  - {diagnostic}")?;
        }
    }
    Ok(())
}
