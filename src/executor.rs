//! Action executor: the side effect performed on an accepted item.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::model::ItemSnapshot;

/// What gets posted against the item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionPayload {
    pub text: String,
}

/// Renders an [`ActionPayload`] from `{tag}`, `{contact}`, `{author}` and `{id}`.
#[derive(Debug, Clone)]
pub struct PayloadTemplate {
    template: String,
}

impl PayloadTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    pub fn render(&self, item: &ItemSnapshot, tag: u32, contact: Option<&str>) -> ActionPayload {
        let text = self
            .template
            .replace("{tag}", &tag.to_string())
            .replace("{contact}", contact.unwrap_or(""))
            .replace("{author}", &item.author)
            .replace("{id}", &item.id.to_string());
        ActionPayload { text }
    }
}

/// Performs the action. Returning `false` means the action surface was not
/// in the expected shape; the item is then not recorded as completed.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    fn name(&self) -> &str;

    async fn perform(&self, item: &ItemSnapshot, payload: &ActionPayload) -> bool;
}

/// Logs the action and reports success. Used when no real surface is wired.
pub struct LogExecutor;

#[async_trait]
impl ActionExecutor for LogExecutor {
    fn name(&self) -> &str {
        "log"
    }

    async fn perform(&self, item: &ItemSnapshot, payload: &ActionPayload) -> bool {
        info!(
            item_id = item.id,
            author = %item.author,
            payload = %payload.text,
            "Action performed"
        );
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_all_placeholders() {
        let template = PayloadTemplate::new("[{tag}] for {author} <{contact}> #{id}");
        let item = ItemSnapshot::new(101, "[5] (ann@example.com)", "ann");
        let payload = template.render(&item, 5, Some("ann@example.com"));
        assert_eq!(payload.text, "[5] for ann <ann@example.com> #101");
    }

    #[test]
    fn missing_contact_renders_empty() {
        let template = PayloadTemplate::new("{tag}:{contact}");
        let item = ItemSnapshot::new(1, "[3]", "bob");
        assert_eq!(template.render(&item, 3, None).text, "3:");
    }

    #[tokio::test]
    async fn log_executor_always_succeeds() {
        let item = ItemSnapshot::new(1, "[3]", "bob");
        let payload = ActionPayload { text: "[3]".into() };
        assert!(LogExecutor.perform(&item, &payload).await);
    }
}
