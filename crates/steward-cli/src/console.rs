//! Console rendering and approval prompts

use std::io::{self, BufRead, Write};

use steward_types::{
    ApprovalRequest, ApprovalResolution, Notification, NotificationEnvelope, TaskPlan,
};

/// What the operator decided at an approval prompt
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Resolve(ApprovalResolution),
    CancelRun,
}

/// Renders notifications as plain text lines
#[derive(Default)]
pub struct Console {
    plan_shown: bool,
    last_plan: Option<TaskPlan>,
}

impl Console {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn show<W: Write>(
        &mut self,
        envelope: &NotificationEnvelope,
        out: &mut W,
    ) -> io::Result<()> {
        match &envelope.notification {
            Notification::MessageProduced { text } => writeln!(out, "· {text}"),
            Notification::PlanUpdated { plan } => {
                self.last_plan = Some(plan.clone());
                if self.plan_shown {
                    return Ok(());
                }
                self.plan_shown = true;
                write_plan(plan, out)
            }
            Notification::StatusChanged { step_id, status } => {
                writeln!(out, "  [{step_id}] {status}")
            }
            Notification::ApprovalRequested { request } => write_request(request, out),
            Notification::ErrorReported {
                step_id,
                kind,
                message,
            } => match step_id {
                Some(step_id) => writeln!(out, "! error ({kind}) in step {step_id}: {message}"),
                None => writeln!(out, "! error ({kind}): {message}"),
            },
            Notification::RunFinished { status, .. } => {
                if let Some(plan) = &self.last_plan {
                    write_plan(plan, out)?;
                }
                writeln!(out, "Run finished: {status}")
            }
        }
    }
}

fn write_plan<W: Write>(plan: &TaskPlan, out: &mut W) -> io::Result<()> {
    writeln!(out, "Plan {} ({}): {}", plan.id.short(), plan.status, plan.goal)?;
    for (index, step) in plan.steps.iter().enumerate() {
        let gate = if step.requires_approval { " [approval]" } else { "" };
        writeln!(
            out,
            "  {:>2}. {:<18} {:<17} {} ({}){}",
            index + 1,
            step.id.as_str(),
            step.status.to_string(),
            step.description,
            step.worker,
            gate
        )?;
    }
    Ok(())
}

fn write_request<W: Write>(request: &ApprovalRequest, out: &mut W) -> io::Result<()> {
    let payload = serde_json::to_string_pretty(&request.proposed_payload)
        .unwrap_or_else(|_| request.proposed_payload.to_string());
    writeln!(out, "Approval needed for step {}", request.step_id)?;
    writeln!(out, "  {}", request.description)?;
    for line in payload.lines() {
        writeln!(out, "    {line}")?;
    }
    Ok(())
}

/// Ask the operator to decide on `request`.
///
/// End of input cancels the run: nobody is left to answer.
pub fn prompt_approval<R: BufRead, W: Write>(
    input: &mut R,
    out: &mut W,
    request: &ApprovalRequest,
) -> io::Result<Decision> {
    loop {
        write!(out, "Approve step {}? [y]es/[n]o/[e]dit/[c]ancel run: ", request.step_id)?;
        out.flush()?;
        let Some(answer) = read_line(input)? else {
            return Ok(Decision::CancelRun);
        };

        let resolution = match answer.to_lowercase().as_str() {
            "y" | "yes" => ApprovalResolution::approve(),
            "n" | "no" => ApprovalResolution::reject(),
            "e" | "edit" => {
                write!(out, "Replacement payload (one line of JSON): ")?;
                out.flush()?;
                let Some(raw) = read_line(input)? else {
                    return Ok(Decision::CancelRun);
                };
                match serde_json::from_str(&raw) {
                    Ok(payload) => ApprovalResolution::approve_with_edits(payload),
                    Err(e) => {
                        writeln!(out, "Not valid JSON: {e}")?;
                        continue;
                    }
                }
            }
            "c" | "cancel" => return Ok(Decision::CancelRun),
            _ => continue,
        };

        write!(out, "Notes (optional): ")?;
        out.flush()?;
        let notes = read_line(input)?.unwrap_or_default();
        return Ok(Decision::Resolve(resolution.with_notes(notes)));
    }
}

/// One trimmed line, `None` at end of input
fn read_line<R: BufRead>(input: &mut R) -> io::Result<Option<String>> {
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}
