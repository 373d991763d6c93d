use serde::Serialize;
use serde_json::Value;

use super::UserEmail;

/// One outbound email, written once to the mail queue and consumed by the
/// external dispatcher. Mirrors the dispatcher's document shape:
///
/// ```json
/// { "to": "john@foo.com", "template": { "name": "...", "data": { ... } } }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MailTask {
    pub to: String,
    pub template: MailTemplate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MailTemplate {
    pub name: String,
    /// Always a JSON object
    pub data: Value,
}

impl MailTask {
    pub fn new(
        to: &UserEmail,
        template_name: &str,
        data: serde_json::Map<String, Value>,
    ) -> Self {
        Self {
            to: to.as_ref().to_string(),
            template: MailTemplate {
                name: template_name.to_string(),
                data: Value::Object(data),
            },
        }
    }

    /// Convenience for tests and logs
    pub fn data_str(
        &self,
        key: &str,
    ) -> Option<&str> {
        self.template.data.get(key).and_then(Value::as_str)
    }
}
