use std::collections::HashMap;
use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use chrono::{DateTime, Local, NaiveDate, Utc};
use unicode_width::UnicodeWidthStr;

use crate::change::{Mutation, PendingChange};
use crate::config::Config;
use crate::coordinator::SyncReport;
use crate::model::{Label, Project, Section, Task};

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color_cfg = cfg.get("color").unwrap_or_else(|| "on".to_string());
        let color = match color_cfg.to_ascii_lowercase().as_str() {
            "on" | "yes" | "true" | "1" => true,
            "off" | "no" | "false" | "0" => false,
            other => return Err(anyhow!("invalid color setting: {other}")),
        };

        Ok(Self {
            color: color && io::stdout().is_terminal(),
        })
    }

    pub fn plain() -> Self {
        Self { color: false }
    }

    #[tracing::instrument(skip_all, fields(count = tasks.len()))]
    pub fn write_tasks<W: Write>(
        &self,
        out: &mut W,
        tasks: &[Task],
        projects: &[Project],
        today: NaiveDate,
    ) -> anyhow::Result<()> {
        let project_names: HashMap<&str, &str> = projects
            .iter()
            .map(|project| (project.id.as_str(), project.name.as_str()))
            .collect();

        let headers = ["ID", "P", "Due", "Project", "Content", "Labels"];
        let mut rows = Vec::with_capacity(tasks.len());

        for task in tasks {
            let id = if task.is_completed {
                self.paint(&task.id, "90")
            } else {
                self.paint(&task.id, "33")
            };

            let priority = match task.priority {
                4 => self.paint("4", "31"),
                p => p.to_string(),
            };

            let due = match &task.due {
                Some(due) if !due.date.is_empty() => {
                    let overdue = NaiveDate::parse_from_str(&due.date, "%Y-%m-%d")
                        .is_ok_and(|date| date < today);
                    if overdue && !task.is_completed {
                        self.paint(&due.date, "31")
                    } else {
                        due.date.clone()
                    }
                }
                Some(due) => due.string.clone(),
                None => String::new(),
            };

            let project = task
                .project_id
                .as_deref()
                .map(|id| project_names.get(id).copied().unwrap_or(id).to_string())
                .unwrap_or_default();

            let labels = task
                .labels
                .iter()
                .map(|label| format!("@{label}"))
                .collect::<Vec<_>>()
                .join(" ");

            rows.push(vec![id, priority, due, project, task.content.clone(), labels]);
        }

        write_table(out, &headers, rows)
    }

    pub fn write_projects<W: Write>(&self, out: &mut W, projects: &[Project]) -> anyhow::Result<()> {
        let rows = projects
            .iter()
            .map(|project| {
                let mut name = project.name.clone();
                if project.is_inbox_project {
                    name.push_str(" (inbox)");
                }
                vec![
                    self.paint(&project.id, "33"),
                    name,
                    project.parent_id.clone().unwrap_or_default(),
                ]
            })
            .collect();
        write_table(out, &["ID", "Name", "Parent"], rows)
    }

    pub fn write_labels<W: Write>(&self, out: &mut W, labels: &[Label]) -> anyhow::Result<()> {
        let rows = labels
            .iter()
            .map(|label| vec![self.paint(&label.id, "33"), format!("@{}", label.name)])
            .collect();
        write_table(out, &["ID", "Name"], rows)
    }

    pub fn write_sections<W: Write>(
        &self,
        out: &mut W,
        sections: &[Section],
        projects: &[Project],
    ) -> anyhow::Result<()> {
        let rows = sections
            .iter()
            .map(|section| {
                let project = projects
                    .iter()
                    .find(|project| project.id == section.project_id)
                    .map_or(section.project_id.clone(), |project| project.name.clone());
                vec![self.paint(&section.id, "33"), section.name.clone(), project]
            })
            .collect();
        write_table(out, &["ID", "Name", "Project"], rows)
    }

    /// One row per queued change, oldest first.
    pub fn write_pending<W: Write>(
        &self,
        out: &mut W,
        changes: &[PendingChange],
    ) -> anyhow::Result<()> {
        if changes.is_empty() {
            writeln!(out, "No pending changes.")?;
            return Ok(());
        }

        let rows = changes
            .iter()
            .map(|change| {
                vec![
                    change.timestamp.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string(),
                    self.paint(change.kind().as_str(), "36"),
                    describe(&change.mutation),
                ]
            })
            .collect();
        write_table(out, &["Queued", "Kind", "Target"], rows)
    }

    pub fn write_sync_report<W: Write>(
        &self,
        out: &mut W,
        report: &SyncReport,
        remaining: usize,
    ) -> anyhow::Result<()> {
        if report.is_empty() {
            writeln!(out, "Nothing synced; {remaining} change(s) pending.")?;
            return Ok(());
        }
        let failed = report.failed_count.to_string();
        let failed = if report.failed_count > 0 {
            self.paint(&failed, "31")
        } else {
            failed
        };
        writeln!(
            out,
            "Synced {} change(s), {failed} failed; {remaining} still pending.",
            report.success_count
        )?;
        Ok(())
    }

    pub fn write_status<W: Write>(
        &self,
        out: &mut W,
        last_sync: Option<DateTime<Utc>>,
        pending: usize,
    ) -> anyhow::Result<()> {
        let last = last_sync
            .map(|at| at.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "never".to_string());
        let pending_text = pending.to_string();
        let pending_text = if pending > 0 {
            self.paint(&pending_text, "33")
        } else {
            pending_text
        };
        writeln!(out, "Last sync: {last}. Pending: {pending_text}.")?;
        Ok(())
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn describe(mutation: &Mutation) -> String {
    match mutation {
        Mutation::CreateTask { task, .. } => task.content.clone(),
        Mutation::UpdateTask { task_id, patch } => {
            let mut fields = Vec::new();
            if patch.content.is_some() {
                fields.push("content");
            }
            if patch.description.is_some() {
                fields.push("description");
            }
            if patch.labels.is_some() {
                fields.push("labels");
            }
            if patch.priority.is_some() {
                fields.push("priority");
            }
            if patch.due_string.is_some() {
                fields.push("due");
            }
            format!("{task_id} ({})", fields.join(", "))
        }
        Mutation::DeleteTask { task_id }
        | Mutation::CompleteTask { task_id }
        | Mutation::ReopenTask { task_id } => task_id.clone(),
    }
}

fn write_table<W: Write>(
    writer: &mut W,
    headers: &[&str],
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(*header));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    let header_line = headers
        .iter()
        .zip(&widths)
        .map(|(header, &width)| format!("{header:width$}"))
        .collect::<Vec<_>>()
        .join(" ");
    writeln!(writer, "{}", header_line.trim_end())?;

    let rule = widths
        .iter()
        .map(|width| "-".repeat(*width))
        .collect::<Vec<_>>()
        .join(" ");
    writeln!(writer, "{rule}")?;

    for row in rows {
        let mut line = String::new();
        for (idx, cell) in row.iter().enumerate() {
            if idx > 0 {
                line.push(' ');
            }
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            line.push_str(cell);
            line.push_str(&" ".repeat(widths[idx].saturating_sub(visible_width)));
        }
        writeln!(writer, "{}", line.trim_end())?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Due, NewTask};

    fn render<F>(write: F) -> String
    where
        F: FnOnce(&mut Vec<u8>) -> anyhow::Result<()>,
    {
        let mut buf = Vec::new();
        write(&mut buf).expect("render");
        String::from_utf8(buf).expect("utf8")
    }

    #[test]
    fn task_table_resolves_project_names() {
        let mut task = Task::provisional(
            "7".to_string(),
            &NewTask {
                project_id: Some("p1".to_string()),
                labels: vec!["home".to_string()],
                ..NewTask::new("water plants")
            },
        );
        task.due = Some(Due {
            string: "tomorrow".to_string(),
            date: "2030-01-02".to_string(),
            is_recurring: false,
            datetime: None,
            timezone: None,
        });
        let projects = vec![Project {
            id: "p1".to_string(),
            name: "Chores".to_string(),
            color: None,
            parent_id: None,
            order: 0,
            is_favorite: false,
            is_inbox_project: false,
        }];
        let today = NaiveDate::from_ymd_opt(2030, 1, 1).expect("date");

        let text = render(|out| Renderer::plain().write_tasks(out, &[task], &projects, today));
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("ID"));
        assert!(lines[2].contains("2030-01-02"));
        assert!(lines[2].contains("Chores"));
        assert!(lines[2].contains("@home"));
    }

    #[test]
    fn pending_listing_names_the_target() {
        let change = PendingChange::new(
            Mutation::CompleteTask {
                task_id: "42".to_string(),
            },
            Utc::now(),
        );
        let text = render(|out| Renderer::plain().write_pending(out, &[change]));
        assert!(text.contains("complete_task"));
        assert!(text.contains("42"));

        let empty = render(|out| Renderer::plain().write_pending(out, &[]));
        assert_eq!(empty.trim(), "No pending changes.");
    }

    #[test]
    fn strip_ansi_keeps_visible_text() {
        assert_eq!(strip_ansi("\x1b[31mlate\x1b[0m"), "late");
    }
}
