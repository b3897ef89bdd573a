//! Result rendering for the CLI: aligned text columns or JSON.

use std::fmt::Write;

use anyhow::Result;
use serde::Serialize;

use openfdd_core::{Action, Device, Param};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

/// A device with its actions, as produced by the `tree` walk.
#[derive(Debug, Serialize)]
pub struct DeviceTree {
    #[serde(flatten)]
    pub device: Device,
    pub actions: Vec<ActionTree>,
}

#[derive(Debug, Serialize)]
pub struct ActionTree {
    #[serde(flatten)]
    pub action: Action,
    pub params: Vec<Param>,
}

#[derive(Serialize)]
struct RunReport<'a> {
    device: &'a str,
    action: &'a str,
    values: &'a [String],
    status: &'static str,
}

pub fn devices(devices: &[Device], format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => json(devices),
        OutputFormat::Text => Ok(columns(
            ["ID", "NAME"],
            devices.iter().map(|d| [d.id.as_str(), d.name.as_str()]),
        )),
    }
}

pub fn actions(actions: &[Action], format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => json(actions),
        OutputFormat::Text => Ok(columns(
            ["ID", "NAME", "DESCRIPTION"],
            actions
                .iter()
                .map(|a| [a.id.as_str(), a.name.as_str(), a.description.as_str()]),
        )),
    }
}

pub fn params(params: &[Param], format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => json(params),
        OutputFormat::Text => {
            let info: Vec<String> = params.iter().map(type_summary).collect();
            Ok(columns(
                ["NAME", "TYPE", "DESCRIPTION"],
                params
                    .iter()
                    .zip(&info)
                    .map(|(p, info)| [p.name.as_str(), info.as_str(), p.description.as_str()]),
            ))
        }
    }
}

pub fn ran(device: &str, action: &str, values: &[String], format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => json(&RunReport {
            device,
            action,
            values,
            status: "done",
        }),
        OutputFormat::Text => Ok(format!("{device}/{action}: done\n")),
    }
}

pub fn tree(tree: &[DeviceTree], format: OutputFormat) -> Result<String> {
    if format == OutputFormat::Json {
        return json(tree);
    }

    let mut out = String::new();
    for node in tree {
        writeln!(out, "{} ({})", node.device.name, node.device.id)?;
        for entry in &node.actions {
            writeln!(
                out,
                "  {} ({}): {}",
                entry.action.name, entry.action.id, entry.action.description
            )?;
            for param in &entry.params {
                writeln!(
                    out,
                    "    {} [{}]: {}",
                    param.name,
                    type_summary(param),
                    param.description
                )?;
            }
        }
    }
    Ok(out)
}

/// `int 0 100` style summary: the type followed by its metadata.
fn type_summary(param: &Param) -> String {
    param.type_info.join(" ")
}

fn json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    let mut s = serde_json::to_string_pretty(value)?;
    s.push('\n');
    Ok(s)
}

/// Left-aligned columns; the last column is not padded.
fn columns<'a, const N: usize>(
    header: [&'a str; N],
    rows: impl Iterator<Item = [&'a str; N]>,
) -> String {
    let rows: Vec<[&str; N]> = std::iter::once(header).chain(rows).collect();
    let mut widths = [0usize; N];
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    for row in &rows {
        let mut line = String::new();
        for (i, cell) in row.iter().enumerate() {
            if i + 1 == N {
                line.push_str(cell);
            } else {
                line.push_str(&format!("{cell:<width$}  ", width = widths[i]));
            }
        }
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out
}
