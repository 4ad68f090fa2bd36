//! Read-only status table for the `show` command

use crate::package::PackageKind;
use crate::state::{Bucket, State};
use comfy_table::{Table, presets};
use strum::Display;

/// User-facing status of a package
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Status {
    WaitingInstall,
    WaitingUpdate,
    WaitingUninstall,
    Installed,
}

impl From<Bucket> for Status {
    fn from(bucket: Bucket) -> Self {
        match bucket {
            Bucket::Additions => Self::WaitingInstall,
            Bucket::Changes => Self::WaitingUpdate,
            Bucket::Deletions => Self::WaitingUninstall,
            Bucket::NoChanges => Self::Installed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub name: String,
    pub kind: PackageKind,
    pub status: Status,
}

/// One row per known package, sorted by name
pub fn rows(state: &State) -> Vec<Row> {
    state
        .buckets()
        .iter()
        .map(|(bucket, r)| Row {
            name: r.name.clone(),
            kind: r.kind,
            status: bucket.into(),
        })
        .collect()
}

/// Borderless NAME / TYPE / STATUS table
pub fn render(rows: &[Row]) -> String {
    let mut table = Table::new();
    table
        .load_preset(presets::NOTHING)
        .set_header(vec!["NAME", "TYPE", "STATUS"]);
    for row in rows {
        table.add_row(vec![
            row.name.clone(),
            row.kind.to_string(),
            row.status.to_string(),
        ]);
    }

    table
        .to_string()
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_from_bucket() {
        assert_eq!(Status::from(Bucket::Additions), Status::WaitingInstall);
        assert_eq!(Status::from(Bucket::Changes), Status::WaitingUpdate);
        assert_eq!(Status::from(Bucket::Deletions), Status::WaitingUninstall);
        assert_eq!(Status::from(Bucket::NoChanges), Status::Installed);
    }

    #[test]
    fn test_render_has_header_and_rows() {
        let rows = vec![Row {
            name: "enhancd".to_string(),
            kind: PackageKind::GitHub,
            status: Status::Installed,
        }];
        let out = render(&rows);
        let lines: Vec<Vec<&str>> = out.lines().map(|l| l.split_whitespace().collect()).collect();
        assert_eq!(lines[0], vec!["NAME", "TYPE", "STATUS"]);
        assert_eq!(lines[1], vec!["enhancd", "GitHub", "Installed"]);
        assert_eq!(lines.len(), 2);
    }
}
