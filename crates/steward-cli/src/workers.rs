//! Template-based reference workers
//!
//! These fill fixed templates from the step input. They exist so a plan
//! file can be run end to end from the console without any model backend.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use steward_engine::{RegistryError, Worker, WorkerContext, WorkerOutcome, WorkerRegistry};
use steward_types::{Step, WorkerId};

/// Register the three reference workers
pub fn register_templates(registry: &WorkerRegistry) -> Result<(), RegistryError> {
    registry.register(Arc::new(ProjectManager))?;
    registry.register(Arc::new(DocumentMaker))?;
    registry.register(Arc::new(EmailDrafter))?;
    Ok(())
}

fn parse_input<T: for<'de> Deserialize<'de> + Default>(step: &Step) -> Result<T, String> {
    if step.input.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(step.input.clone())
        .map_err(|e| format!("invalid input for step {}: {}", step.id, e))
}

// ── Project manager ──────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
struct EstimateInput {
    #[serde(default)]
    items: Vec<CostItem>,
    #[serde(default)]
    contingency_pct: Option<f64>,
    #[serde(default)]
    timeline_weeks: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CostItem {
    category: String,
    description: String,
    cost: f64,
}

/// Totals cost line items per category and adds a contingency
pub struct ProjectManager;

#[async_trait]
impl Worker for ProjectManager {
    fn id(&self) -> WorkerId {
        WorkerId::new("project_manager")
    }

    fn description(&self) -> String {
        "Cost and timeline estimates from line items".to_string()
    }

    async fn invoke(&self, step: &Step, ctx: &WorkerContext) -> WorkerOutcome {
        let input: EstimateInput = match parse_input(step) {
            Ok(input) => input,
            Err(e) => return WorkerOutcome::Error(e),
        };
        if input.items.iter().any(|item| item.cost < 0.0) {
            return WorkerOutcome::error("cost items must not be negative");
        }

        let mut by_category: Vec<(String, f64)> = Vec::new();
        for item in &input.items {
            match by_category.iter_mut().find(|(c, _)| c == &item.category) {
                Some((_, total)) => *total += item.cost,
                None => by_category.push((item.category.clone(), item.cost)),
            }
        }
        let subtotal: f64 = input.items.iter().map(|item| item.cost).sum();
        let contingency_pct = input.contingency_pct.unwrap_or(15.0);
        let total = subtotal + subtotal * contingency_pct / 100.0;
        ctx.progress
            .report(format!("estimated {} line items", input.items.len()));

        WorkerOutcome::Result(json!({
            "task": step.description,
            "timeline_weeks": input.timeline_weeks,
            "items": input.items,
            "by_category": by_category
                .into_iter()
                .map(|(category, total)| json!({"category": category, "total": total}))
                .collect::<Vec<_>>(),
            "subtotal": subtotal,
            "contingency_pct": contingency_pct,
            "total_estimated_cost": total,
        }))
    }
}

// ── Document maker ───────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
struct DocumentInput {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    document_type: Option<String>,
    #[serde(default)]
    sections: Vec<String>,
    #[serde(default)]
    file_name: Option<String>,
}

/// Renders a markdown skeleton and saves it in the workspace
pub struct DocumentMaker;

impl DocumentMaker {
    fn render(title: &str, document_type: &str, sections: &[String], goal: &str) -> String {
        let mut doc = format!(
            "# {title}\n\n- Type: {document_type}\n- Version: 1.0\n- Date: {}\n- Purpose: {goal}\n",
            chrono::Utc::now().format("%Y-%m-%d"),
        );
        for section in sections {
            doc.push_str(&format!("\n## {section}\n\n[PLACEHOLDER: {section}]\n"));
        }
        doc
    }
}

#[async_trait]
impl Worker for DocumentMaker {
    fn id(&self) -> WorkerId {
        WorkerId::new("document_maker")
    }

    fn description(&self) -> String {
        "Markdown document skeletons saved to the workspace".to_string()
    }

    async fn invoke(&self, step: &Step, ctx: &WorkerContext) -> WorkerOutcome {
        let input: DocumentInput = match parse_input(step) {
            Ok(input) => input,
            Err(e) => return WorkerOutcome::Error(e),
        };
        let title = input.title.unwrap_or_else(|| step.description.clone());
        let document_type = input.document_type.unwrap_or_else(|| "document".to_string());
        let file_name = input
            .file_name
            .unwrap_or_else(|| format!("{}.md", step.id.as_str()));
        if file_name.contains("..") || file_name.contains('/') || file_name.contains('\\') {
            return WorkerOutcome::error(format!(
                "file name {file_name:?} must not leave the workspace"
            ));
        }

        let content = Self::render(&title, &document_type, &input.sections, &ctx.goal);
        let path = ctx.workspace.join(&file_name);
        if let Err(e) = tokio::fs::create_dir_all(&ctx.workspace).await {
            return WorkerOutcome::error(format!("cannot create workspace: {e}"));
        }
        if let Err(e) = tokio::fs::write(&path, &content).await {
            return WorkerOutcome::error(format!("cannot write {}: {e}", path.display()));
        }
        ctx.progress.report(format!("saved {}", path.display()));

        WorkerOutcome::Result(json!({
            "document_type": document_type,
            "title": title,
            "file_path": path.display().to_string(),
            "sections": input.sections,
            "content": content,
        }))
    }
}

// ── Email drafter ────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
struct EmailInput {
    #[serde(default)]
    to: Vec<String>,
    #[serde(default)]
    cc: Vec<String>,
    #[serde(default)]
    subject: Option<String>,
    #[serde(default)]
    body: Option<String>,
}

/// Drafts an email and always asks before it counts as sent
pub struct EmailDrafter;

#[async_trait]
impl Worker for EmailDrafter {
    fn id(&self) -> WorkerId {
        WorkerId::new("email_drafter")
    }

    fn description(&self) -> String {
        "Email drafts, sent only after approval".to_string()
    }

    async fn invoke(&self, step: &Step, ctx: &WorkerContext) -> WorkerOutcome {
        let input: EmailInput = match parse_input(step) {
            Ok(input) => input,
            Err(e) => return WorkerOutcome::Error(e),
        };
        if input.to.is_empty() {
            return WorkerOutcome::error("email draft has no recipients");
        }

        let subject = input.subject.unwrap_or_else(|| step.description.clone());
        let mut body = input.body.unwrap_or_else(|| format!("Hello,\n\n{}.\n", step.description));
        let attachments: Vec<String> = ctx
            .dependency_results(step)
            .into_iter()
            .filter_map(|(_, result)| result.get("file_path").and_then(|p| p.as_str()))
            .map(str::to_string)
            .collect();
        if !attachments.is_empty() {
            body.push_str(&format!("\nAttached: {}\n", attachments.join(", ")));
        }

        let draft = json!({
            "to": input.to,
            "cc": input.cc,
            "subject": subject,
            "body": body,
            "attachments": attachments,
        });
        WorkerOutcome::needs_approval(
            format!("Send email \"{}\" to {}", subject, input.to.join(", ")),
            draft,
        )
    }
}
