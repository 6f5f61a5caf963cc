//! Notification bodies. Every template yields a subject, an HTML part and a plain text part.

use serde::Serialize;

#[derive(Debug, Clone, PartialEq)]
pub struct Rendered {
    pub subject: String,
    pub html: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmissionReviewed {
    pub student_name: String,
    pub resource_title: String,
    pub approved: bool,
    pub grade: Option<String>,
    pub comments: Option<String>,
    pub dashboard_url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModuleReviewed {
    pub student_name: String,
    pub module_title: String,
    pub pathway_title: String,
    pub comments: Option<String>,
    pub dashboard_url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModuleSubmitted {
    pub student_name: String,
    pub student_email: String,
    pub module_title: String,
    pub pathway_title: String,
    pub time_spent_minutes: i32,
    pub review_url: String,
}

pub const SUBMISSION_REVIEWED: &str = "submission_reviewed";
pub const MODULE_APPROVED: &str = "module_approved";
pub const MODULE_REJECTED: &str = "module_rejected";
pub const MODULE_SUBMITTED: &str = "module_submitted";

pub(crate) fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn layout(title: &str, body: &str, link: &str, link_label: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<body style="font-family: Arial, sans-serif; color: #1f2933; max-width: 600px; margin: 0 auto;">
<h2>{title}</h2>
{body}
<p><a href="{link}" style="background: #2563eb; color: #ffffff; padding: 10px 16px; border-radius: 4px; text-decoration: none;">{link_label}</a></p>
<p style="color: #6b7280; font-size: 12px;">Learnpath</p>
</body>
</html>"#,
        title = escape(title),
        link = escape(link),
        link_label = escape(link_label),
    )
}

fn comments_block(comments: Option<&str>) -> (String, String) {
    match comments.map(str::trim).filter(|c| !c.is_empty()) {
        Some(c) => (
            format!(
                "<p><strong>Reviewer comments:</strong></p><blockquote>{}</blockquote>",
                escape(c)
            ),
            format!("\nReviewer comments:\n{c}\n"),
        ),
        None => (String::new(), String::new()),
    }
}

pub fn submission_reviewed(ctx: &SubmissionReviewed) -> Rendered {
    let verdict = if ctx.approved { "approved" } else { "rejected" };
    let subject = format!("Submission {}: {}", verdict, ctx.resource_title);
    let grade = ctx
        .grade
        .as_deref()
        .map(|g| g.to_uppercase())
        .unwrap_or_else(|| String::from("-"));
    let (comments_html, comments_text) = comments_block(ctx.comments.as_deref());

    let body = format!(
        "<p>Hi {name},</p><p>Your submission for <strong>{resource}</strong> was {verdict}.</p><p>Grade: {grade}</p>{comments_html}",
        name = escape(&ctx.student_name),
        resource = escape(&ctx.resource_title),
        grade = escape(&grade),
    );
    let text = format!(
        "Hi {},\n\nYour submission for {} was {}.\nGrade: {}\n{}\nView it here: {}\n",
        ctx.student_name, ctx.resource_title, verdict, grade, comments_text, ctx.dashboard_url
    );

    Rendered {
        html: layout(&subject, &body, &ctx.dashboard_url, "Open dashboard"),
        subject,
        text,
    }
}

pub fn module_approved(ctx: &ModuleReviewed) -> Rendered {
    let subject = format!("Module approved: {}", ctx.module_title);
    let (comments_html, comments_text) = comments_block(ctx.comments.as_deref());
    let body = format!(
        "<p>Hi {name},</p><p>Congratulations! Your work on <strong>{module}</strong> in {pathway} has been approved.</p>{comments_html}",
        name = escape(&ctx.student_name),
        module = escape(&ctx.module_title),
        pathway = escape(&ctx.pathway_title),
    );
    let text = format!(
        "Hi {},\n\nCongratulations! Your work on {} in {} has been approved.\n{}\nContinue learning: {}\n",
        ctx.student_name, ctx.module_title, ctx.pathway_title, comments_text, ctx.dashboard_url
    );

    Rendered {
        html: layout(&subject, &body, &ctx.dashboard_url, "Continue learning"),
        subject,
        text,
    }
}

pub fn module_rejected(ctx: &ModuleReviewed) -> Rendered {
    let subject = format!("Revision requested: {}", ctx.module_title);
    let (comments_html, comments_text) = comments_block(ctx.comments.as_deref());
    let body = format!(
        "<p>Hi {name},</p><p>Your instructor has asked for changes to <strong>{module}</strong> in {pathway}.</p>{comments_html}",
        name = escape(&ctx.student_name),
        module = escape(&ctx.module_title),
        pathway = escape(&ctx.pathway_title),
    );
    let text = format!(
        "Hi {},\n\nYour instructor has asked for changes to {} in {}.\n{}\nOpen the module: {}\n",
        ctx.student_name, ctx.module_title, ctx.pathway_title, comments_text, ctx.dashboard_url
    );

    Rendered {
        html: layout(&subject, &body, &ctx.dashboard_url, "Open module"),
        subject,
        text,
    }
}

pub fn module_submitted(ctx: &ModuleSubmitted) -> Rendered {
    let subject = format!(
        "New module submission: {} by {}",
        ctx.module_title, ctx.student_name
    );
    let body = format!(
        "<p><strong>{name}</strong> ({email}) completed <strong>{module}</strong> in {pathway}.</p><p>Time spent: {minutes} minutes</p>",
        name = escape(&ctx.student_name),
        email = escape(&ctx.student_email),
        module = escape(&ctx.module_title),
        pathway = escape(&ctx.pathway_title),
        minutes = ctx.time_spent_minutes,
    );
    let text = format!(
        "{} ({}) completed {} in {}.\nTime spent: {} minutes\n\nReview: {}\n",
        ctx.student_name,
        ctx.student_email,
        ctx.module_title,
        ctx.pathway_title,
        ctx.time_spent_minutes,
        ctx.review_url
    );

    Rendered {
        html: layout(&subject, &body, &ctx.review_url, "Review submission"),
        subject,
        text,
    }
}
