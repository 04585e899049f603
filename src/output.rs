//! Rendering of command results as text tables or JSON.

use std::io::{self, Write};

use serde::Serialize;
use serde_json::{Value, json};

use crate::catalog::{SizeEntry, Template};
use crate::services::{DeployOutcome, Project, ResizeOutcome, Service};
use crate::session::SessionStatus;

const MISSING: &str = "-";

/// Writes command results either as aligned text or as pretty JSON.
#[derive(Debug)]
pub struct Presenter<W> {
    writer: W,
    json: bool,
}

impl<W: Write> Presenter<W> {
    /// Creates a presenter writing to `writer`.
    #[must_use]
    pub const fn new(writer: W, json: bool) -> Self {
        Self { writer, json }
    }

    /// Returns whether output is rendered as JSON.
    #[must_use]
    pub const fn is_json(&self) -> bool {
        self.json
    }

    /// Consumes the presenter and returns the writer.
    #[must_use]
    pub fn into_inner(self) -> W {
        self.writer
    }

    fn emit_json<T: Serialize + ?Sized>(&mut self, value: &T) -> io::Result<()> {
        serde_json::to_writer_pretty(&mut self.writer, value)?;
        writeln!(self.writer)
    }

    fn emit_table(&mut self, headers: &[&str], rows: &[Vec<String>]) -> io::Result<()> {
        let mut widths: Vec<usize> = headers.iter().map(|header| header.len()).collect();
        for row in rows {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(cell.chars().count());
            }
        }
        let header_cells: Vec<String> = headers.iter().map(|header| (*header).to_owned()).collect();
        self.emit_row(&widths, &header_cells)?;
        for row in rows {
            self.emit_row(&widths, row)?;
        }
        Ok(())
    }

    fn emit_row(&mut self, widths: &[usize], cells: &[String]) -> io::Result<()> {
        let line = widths
            .iter()
            .zip(cells)
            .map(|(width, cell)| format!("{cell:<width$}"))
            .collect::<Vec<_>>()
            .join("  ");
        writeln!(self.writer, "{}", line.trim_end())
    }

    /// Writes a plain message. JSON mode wraps it in `{"message": ...}`.
    ///
    /// # Errors
    ///
    /// Propagates write failures.
    pub fn message(&mut self, text: &str) -> io::Result<()> {
        if self.json {
            return self.emit_json(&json!({ "message": text }));
        }
        writeln!(self.writer, "{text}")
    }

    /// Writes an API response verbatim.
    ///
    /// # Errors
    ///
    /// Propagates write failures.
    pub fn raw(&mut self, value: &Value) -> io::Result<()> {
        self.emit_json(value)
    }

    /// Writes the local authentication state.
    ///
    /// # Errors
    ///
    /// Propagates write failures.
    pub fn session_status(&mut self, status: &SessionStatus) -> io::Result<()> {
        if self.json {
            return self.emit_json(&json!({
                "identity": status.identity,
                "tokenPresent": status.token_present,
                "expiry": status.expiry,
                "valid": status.valid,
            }));
        }
        let identity = status.identity.as_deref().unwrap_or("not configured");
        writeln!(self.writer, "Identity: {identity}")?;
        match status.expiry {
            Some(expiry) if status.valid => writeln!(self.writer, "Session:  valid until {expiry}"),
            Some(expiry) => writeln!(self.writer, "Session:  expired ({expiry})"),
            None => writeln!(self.writer, "Session:  none"),
        }
    }

    /// Writes the projects of the account.
    ///
    /// # Errors
    ///
    /// Propagates write failures.
    pub fn projects(&mut self, projects: &[Project]) -> io::Result<()> {
        if self.json {
            return self.emit_json(projects);
        }
        let rows: Vec<Vec<String>> = projects
            .iter()
            .map(|project| vec![project.id.clone(), cell(project.name.as_deref())])
            .collect();
        self.emit_table(&["ID", "NAME"], &rows)
    }

    /// Writes a service listing.
    ///
    /// # Errors
    ///
    /// Propagates write failures.
    pub fn services(&mut self, project_id: &str, services: &[Service]) -> io::Result<()> {
        if self.json {
            return self.emit_json(services);
        }
        if services.is_empty() {
            return writeln!(self.writer, "No services in project {project_id}");
        }
        let rows: Vec<Vec<String>> = services
            .iter()
            .map(|service| {
                vec![
                    cell(service.display_name.as_deref()),
                    cell(service.template_name.as_deref()),
                    cell(service.status.as_deref()),
                    cell(service.deployment_status.as_deref()),
                    cell(service.vm_id.as_deref()),
                    cell(service.ipv4.as_deref()),
                ]
            })
            .collect();
        writeln!(
            self.writer,
            "Services in project {project_id} ({})",
            services.len()
        )?;
        self.emit_table(&["NAME", "SOFTWARE", "STATUS", "DEPLOY", "VMID", "IP"], &rows)
    }

    /// Writes one service record.
    ///
    /// # Errors
    ///
    /// Propagates write failures.
    pub fn service(&mut self, service: &Service) -> io::Result<()> {
        if self.json {
            return self.emit_json(service);
        }
        let fields = [
            ("Name", service.display_name.as_deref()),
            ("Software", service.template_name.as_deref()),
            ("vmID", service.vm_id.as_deref()),
            ("Status", service.status.as_deref()),
            ("Deploy", service.deployment_status.as_deref()),
            ("Size", service.server_type.as_deref()),
            ("Provider", service.provider()),
            ("Region", service.datacenter.as_deref()),
            ("IPv4", service.ipv4.as_deref()),
        ];
        for (label, value) in fields {
            writeln!(self.writer, "{label:<10}{}", cell(value))?;
        }
        Ok(())
    }

    /// Writes a size listing.
    ///
    /// # Errors
    ///
    /// Propagates write failures.
    pub fn sizes(&mut self, sizes: &[&SizeEntry]) -> io::Result<()> {
        if self.json {
            return self.emit_json(sizes);
        }
        let rows: Vec<Vec<String>> = sizes
            .iter()
            .map(|size| {
                vec![
                    size.provider.clone(),
                    size.title.clone(),
                    size.region.clone(),
                    cell(size.city.as_deref()),
                    size.cpu.map_or_else(|| MISSING.to_owned(), |cpu| cpu.to_string()),
                    size.ram_gb.map_or_else(|| MISSING.to_owned(), |ram| ram.to_string()),
                    size.price_per_hour
                        .map_or_else(|| MISSING.to_owned(), |price| format!("${price:.4}/h")),
                ]
            })
            .collect();
        self.emit_table(
            &["PROVIDER", "SIZE", "REGION", "CITY", "VCPU", "RAM GB", "PRICE"],
            &rows,
        )
    }

    /// Writes a template listing.
    ///
    /// # Errors
    ///
    /// Propagates write failures.
    pub fn templates(&mut self, templates: &[&Template]) -> io::Result<()> {
        if self.json {
            let summary: Vec<Value> = templates
                .iter()
                .map(|template| {
                    json!({
                        "id": template.id,
                        "title": template.title,
                        "category": template.category,
                        "version": template.version.as_deref().unwrap_or("latest"),
                    })
                })
                .collect();
            return self.emit_json(&summary);
        }
        let rows: Vec<Vec<String>> = templates
            .iter()
            .map(|template| {
                vec![
                    template.id.clone(),
                    template.title.clone(),
                    cell(template.category.as_deref()),
                    template
                        .version
                        .clone()
                        .unwrap_or_else(|| String::from("latest")),
                ]
            })
            .collect();
        writeln!(self.writer, "Templates ({})", templates.len())?;
        self.emit_table(&["ID", "NAME", "CATEGORY", "VERSION"], &rows)
    }

    /// Writes the result of a deployment.
    ///
    /// # Errors
    ///
    /// Propagates write failures.
    pub fn deployment(&mut self, outcome: &DeployOutcome) -> io::Result<()> {
        match outcome {
            DeployOutcome::DryRun(plan) => {
                if self.json {
                    let mut preview = serde_json::to_value(plan).map_err(io::Error::other)?;
                    if let Some(fields) = preview.as_object_mut() {
                        fields.insert(String::from("dryRun"), Value::Bool(true));
                    }
                    return self.emit_json(&preview);
                }
                writeln!(self.writer, "Deployment preview (dry run)")?;
                let fields = [
                    ("Software", format!("{} (ID: {})", plan.template, plan.template_id)),
                    ("Version", plan.version.clone()),
                    ("Project", plan.project_id.clone()),
                    ("Name", plan.server_name.clone()),
                    ("Provider", plan.provider.clone()),
                    ("Region", plan.datacenter.clone()),
                    ("Size", plan.server_type.clone()),
                    ("Support", plan.support.clone()),
                    ("Admin", plan.admin_email.clone()),
                ];
                for (label, value) in fields {
                    writeln!(self.writer, "  {label:<10}{value}")?;
                }
                writeln!(self.writer, "Run the same command without --dry-run to deploy.")
            }
            DeployOutcome::Started {
                plan,
                provider_server_id,
                response,
            } => {
                if self.json {
                    return self.emit_json(response);
                }
                writeln!(
                    self.writer,
                    "Deployment of {} started (provider server id: {})",
                    plan.server_name,
                    cell(provider_server_id.as_deref())
                )
            }
            DeployOutcome::Completed { service, .. } => {
                if !self.json {
                    writeln!(self.writer, "Deployment of {} complete", service.label())?;
                }
                self.service(service)
            }
        }
    }

    /// Writes the result of a resize.
    ///
    /// # Errors
    ///
    /// Propagates write failures.
    pub fn resize(&mut self, vm_id: &str, outcome: &ResizeOutcome) -> io::Result<()> {
        match outcome {
            ResizeOutcome::AlreadySized { size } => {
                if self.json {
                    return self.emit_json(&json!({ "status": "unchanged", "size": size }));
                }
                writeln!(self.writer, "Service {vm_id} is already {size}")
            }
            ResizeOutcome::Requested {
                from,
                to,
                downgrade,
                response,
            } => {
                if self.json {
                    return self.emit_json(response);
                }
                let kind = if *downgrade { "downgrade" } else { "resize" };
                writeln!(self.writer, "Service {vm_id} {kind} initiated: {from} -> {to}")
            }
        }
    }
}

fn cell(value: Option<&str>) -> String {
    value
        .filter(|text| !text.is_empty())
        .unwrap_or(MISSING)
        .to_owned()
}
