//! Plain-text rendering of dashboard views for the terminal.

use std::io::Write;

use logdash_core::summary::{AnalysisSummary, RankedEntry};
use tabwriter::TabWriter;

use crate::buffer::TailLine;
use crate::state::{DisplayView, EntityView};
use crate::types::{BrowseListing, HistoryEntry};

fn io_err(err: std::io::Error) -> String {
    err.to_string()
}

/// Full analysis report: totals, status codes, ranked lists, threats.
pub fn write_report(view: &DisplayView, top: usize, out: &mut dyn Write) -> Result<(), String> {
    let Some(summary) = view.summary.as_deref() else {
        writeln!(out, "No analysis loaded.").map_err(io_err)?;
        return Ok(());
    };
    if let Some(context) = &view.context {
        writeln!(out, "Access log analysis: {}", context.source).map_err(io_err)?;
        writeln!(out).map_err(io_err)?;
    }

    write_totals(summary, out)?;
    write_status_codes(summary, out)?;
    write_clients(&view.entities, top, out)?;
    write_ranked("Top paths", "Path", &summary.top_paths, top, out)?;
    write_ranked("Top user agents", "User agent", &summary.top_user_agents, top, out)?;
    write_ranked("Top referers", "Referer", &summary.top_referers, top, out)?;
    write_threats(summary, top, out)?;
    Ok(())
}

fn write_totals(summary: &AnalysisSummary, out: &mut dyn Write) -> Result<(), String> {
    let mut tw = TabWriter::new(&mut *out).padding(2);
    writeln!(tw, "Total requests\t{}", summary.total_requests).map_err(io_err)?;
    writeln!(tw, "Unique clients\t{}", summary.unique_clients).map_err(io_err)?;
    writeln!(tw, "Data transferred\t{}", summary.transfer()).map_err(io_err)?;
    writeln!(tw, "Error rate\t{:.1}%", summary.error_rate_percent()).map_err(io_err)?;
    writeln!(tw, "Threats detected\t{}", summary.threat_total()).map_err(io_err)?;
    tw.flush().map_err(io_err)?;
    writeln!(out).map_err(io_err)
}

fn write_status_codes(summary: &AnalysisSummary, out: &mut dyn Write) -> Result<(), String> {
    if summary.status_codes.is_empty() {
        return Ok(());
    }
    writeln!(out, "Status codes").map_err(io_err)?;
    let mut tw = TabWriter::new(&mut *out).padding(2);
    writeln!(tw, "CODE\tCOUNT\tSHARE").map_err(io_err)?;
    for (code, count) in &summary.status_codes {
        let share = if summary.total_requests == 0 {
            0.0
        } else {
            *count as f64 / summary.total_requests as f64 * 100.0
        };
        writeln!(tw, "{code}\t{count}\t{share:.1}%").map_err(io_err)?;
    }
    tw.flush().map_err(io_err)?;
    writeln!(out).map_err(io_err)
}

/// Ranked client table with each client's resolution column.
pub fn write_clients(entities: &[EntityView], top: usize, out: &mut dyn Write) -> Result<(), String> {
    if entities.is_empty() {
        return Ok(());
    }
    writeln!(out, "Top clients").map_err(io_err)?;
    let mut tw = TabWriter::new(&mut *out).padding(2);
    writeln!(tw, "#\tCLIENT\tREQUESTS\tRESOLVED").map_err(io_err)?;
    for entity in entities.iter().take(top) {
        writeln!(
            tw,
            "{}\t{}\t{}\t{}",
            entity.slot + 1,
            entity.identifier,
            entity.count,
            entity.record.label()
        )
        .map_err(io_err)?;
    }
    tw.flush().map_err(io_err)?;
    writeln!(out).map_err(io_err)
}

fn write_ranked(
    title: &str,
    column: &str,
    entries: &[RankedEntry],
    top: usize,
    out: &mut dyn Write,
) -> Result<(), String> {
    if entries.is_empty() {
        return Ok(());
    }
    writeln!(out, "{title}").map_err(io_err)?;
    let mut tw = TabWriter::new(&mut *out).padding(2);
    writeln!(tw, "#\t{}\tREQUESTS", column.to_uppercase()).map_err(io_err)?;
    for (rank, entry) in entries.iter().take(top).enumerate() {
        writeln!(tw, "{}\t{}\t{}", rank + 1, entry.value(), entry.count()).map_err(io_err)?;
    }
    tw.flush().map_err(io_err)?;
    writeln!(out).map_err(io_err)
}

fn write_threats(summary: &AnalysisSummary, top: usize, out: &mut dyn Write) -> Result<(), String> {
    let Some(security) = &summary.security else {
        return Ok(());
    };
    if security.top_threats.is_empty() && security.stats.is_empty() {
        return Ok(());
    }
    writeln!(out, "Security").map_err(io_err)?;
    let mut tw = TabWriter::new(&mut *out).padding(2);
    for (kind, count) in &security.stats {
        writeln!(tw, "{kind}\t{count}").map_err(io_err)?;
    }
    if !security.top_threats.is_empty() {
        writeln!(tw, "TIME\tCLIENT\tTYPE\tRISK").map_err(io_err)?;
        for threat in security.top_threats.iter().take(top) {
            writeln!(
                tw,
                "{}\t{}\t{}\t{}",
                threat.time, threat.client, threat.kind, threat.risk
            )
            .map_err(io_err)?;
        }
    }
    tw.flush().map_err(io_err)?;
    writeln!(out).map_err(io_err)
}

pub fn write_history(client: &str, entries: &[HistoryEntry], out: &mut dyn Write) -> Result<(), String> {
    if entries.is_empty() {
        writeln!(out, "No requests recorded for {client}.").map_err(io_err)?;
        return Ok(());
    }
    writeln!(out, "Requests from {client} ({})", entries.len()).map_err(io_err)?;
    let mut tw = TabWriter::new(&mut *out).padding(2);
    writeln!(tw, "TIME\tSTATUS\tREQUEST\tREFERER").map_err(io_err)?;
    for entry in entries {
        let referer = if entry.referer.is_empty() { "-" } else { entry.referer.as_str() };
        writeln!(
            tw,
            "{}\t{}\t{}\t{}",
            entry.time, entry.status, entry.request, referer
        )
        .map_err(io_err)?;
    }
    tw.flush().map_err(io_err)
}

pub fn write_listing(listing: &BrowseListing, out: &mut dyn Write) -> Result<(), String> {
    writeln!(out, "{}", listing.current_path).map_err(io_err)?;
    let mut tw = TabWriter::new(&mut *out).padding(2);
    if !listing.parent_path.is_empty() && listing.parent_path != listing.current_path {
        writeln!(tw, "..\t{}", listing.parent_path).map_err(io_err)?;
    }
    for item in &listing.items {
        let name = if item.is_dir {
            format!("{}/", item.name)
        } else {
            item.name.clone()
        };
        writeln!(tw, "{name}\t{}", item.path).map_err(io_err)?;
    }
    tw.flush().map_err(io_err)
}

/// One tail line prefixed with its status family.
pub fn format_tail_line(line: &TailLine) -> String {
    format!("[{:>5}] {}", line.status.as_str(), line.text)
}
