use std::fmt::Write as _;

use client_core::TemplateView;
use shared::protocol::{Instance, Template};

pub fn render_template(template: &Template) -> String {
    let mut line = template.id.to_string();
    if !template.description.is_empty() {
        let _ = write!(line, " - {}", template.description);
    }
    if !template.parameters.is_empty() {
        let _ = write!(line, " [{}]", template.parameters.join(", "));
    }
    line
}

pub fn render_instance(instance: &Instance) -> String {
    format!("{:<24} {}", instance.id.as_str(), instance.status)
}

/// Renders every template followed by its instances, one per line.
///
/// With `with_poll_time` unset the output only changes when the data does.
pub fn render_snapshot(views: &[TemplateView], with_poll_time: bool) -> String {
    let mut out = String::new();
    for view in views {
        out.push_str(&render_template(&view.template));
        if with_poll_time {
            match view.last_polled_at {
                Some(at) => {
                    let _ = write!(out, " (polled {})", at.format("%H:%M:%S"));
                }
                None => out.push_str(" (not polled yet)"),
            }
        }
        out.push('\n');
        if view.instances.is_empty() {
            out.push_str("  no instances\n");
        }
        for instance in &view.instances {
            let _ = writeln!(out, "  {}", render_instance(instance));
        }
    }
    out
}
