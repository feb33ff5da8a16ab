//! `{{placeholder}}` substitution for subjects and bodies.

use std::sync::LazyLock;

use regex::{Captures, Regex};

static RE_PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*([A-Za-z_]+)\s*\}\}").unwrap());

/// Values available to a template.
#[derive(Debug, Clone, Copy)]
pub struct TemplateVars<'a> {
    pub teacher_name: &'a str,
    pub project_name: &'a str,
    pub project_code: &'a str,
}

impl TemplateVars<'_> {
    fn lookup(&self, key: &str) -> Option<&str> {
        match key.to_ascii_lowercase().as_str() {
            "teacher_name" | "recipient_name" => Some(self.teacher_name),
            "project_name" | "request_name" => Some(self.project_name),
            "project_code" | "request_code" => Some(self.project_code),
            _ => None,
        }
    }
}

/// Replaces known placeholders, matched case-insensitively and tolerant of
/// inner whitespace. Unknown placeholders are left as written.
pub fn render(template: &str, vars: &TemplateVars<'_>) -> String {
    RE_PLACEHOLDER
        .replace_all(template, |caps: &Captures<'_>| match vars.lookup(&caps[1]) {
            Some(value) => value.to_string(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Subject line for a reminder.
pub fn reminder_subject(subject: &str) -> String {
    format!("Reminder: {}", subject)
}

/// Reminder body: a short nudge followed by the original message.
pub fn reminder_body(vars: &TemplateVars<'_>, original_body: &str) -> String {
    format!(
        "Dear {},\n\nThis is a friendly reminder about: {}\n\n\
         Please complete it and reply to this email as soon as possible. Thank you!\n\n\
         Original message:\n{}",
        vars.teacher_name, vars.project_name, original_body
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const VARS: TemplateVars<'static> = TemplateVars {
        teacher_name: "Ann Lee",
        project_name: "Q1 Grades",
        project_code: "G-01",
    };

    #[test]
    fn test_render_variants() {
        assert_eq!(
            render("Dear {{teacher_name}}, re {{Project_Name}}", &VARS),
            "Dear Ann Lee, re Q1 Grades"
        );
        assert_eq!(
            render("{{ recipient_name }} / {{REQUEST_NAME}} / {{project_code}}", &VARS),
            "Ann Lee / Q1 Grades / G-01"
        );
    }

    #[test]
    fn test_unknown_placeholder_kept() {
        assert_eq!(render("{{deadline}} {{", &VARS), "{{deadline}} {{");
    }

    #[test]
    fn test_values_are_not_re_expanded() {
        let vars = TemplateVars {
            teacher_name: "{{project_name}}",
            ..VARS
        };
        assert_eq!(render("{{teacher_name}}", &vars), "{{project_name}}");
    }

    #[test]
    fn test_reminder_wrapping() {
        assert_eq!(reminder_subject("Grades"), "Reminder: Grades");
        let body = reminder_body(&VARS, "Please fill the sheet.");
        assert!(body.starts_with("Dear Ann Lee,"));
        assert!(body.contains("Q1 Grades"));
        assert!(body.ends_with("Original message:\nPlease fill the sheet."));
    }
}
