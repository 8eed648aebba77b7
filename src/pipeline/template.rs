// src/pipeline/template.rs

/// Values available to commit message templates as `{{name}}`.
#[derive(Debug, Clone)]
pub struct TemplateContext<'a> {
    pub timestamp: &'a str,
    pub repo_id: &'a str,
    pub save_count: u32,
    pub change_count: usize,
    pub change_summary: &'a str,
}

impl TemplateContext<'_> {
    fn lookup(&self, name: &str) -> Option<String> {
        match name {
            "timestamp" => Some(self.timestamp.to_string()),
            "repo_id" => Some(self.repo_id.to_string()),
            "save_count" => Some(self.save_count.to_string()),
            "change_count" => Some(self.change_count.to_string()),
            "change_summary" => Some(self.change_summary.to_string()),
            _ => None,
        }
    }
}

/// Substitute `{{name}}` placeholders. Unknown placeholders are kept verbatim.
pub fn render(template: &str, ctx: &TemplateContext<'_>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            out.push_str(&rest[start..]);
            return out;
        };
        let name = after[..end].trim();
        match ctx.lookup(name) {
            Some(value) => out.push_str(&value),
            None => out.push_str(&rest[start..start + 2 + end + 2]),
        }
        rest = &after[end + 2..];
    }
    out.push_str(rest);

    // Templates ending in an empty summary shouldn't leave trailing blank lines.
    let trimmed = out.trim_end().len();
    out.truncate(trimmed);
    out
}
