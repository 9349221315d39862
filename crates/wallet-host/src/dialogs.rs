use async_trait::async_trait;
use tracing::info;

/// Host surface for `alert`/`confirm`/`prompt` requests raised by a page.
#[async_trait]
pub trait DialogSurface: Send + Sync {
    async fn alert(&self, origin: &str, message: &str);

    async fn confirm(&self, origin: &str, message: &str) -> bool;

    async fn prompt(&self, origin: &str, message: &str) -> Option<String>;
}

/// Dialogs for headless sessions: alerts are logged, confirms answer with a
/// fixed value and prompts are dismissed.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeadlessDialogs {
    pub confirm_answer: bool,
}

#[async_trait]
impl DialogSurface for HeadlessDialogs {
    async fn alert(&self, origin: &str, message: &str) {
        info!(%origin, %message, "page alert");
    }

    async fn confirm(&self, origin: &str, message: &str) -> bool {
        info!(%origin, %message, answer = self.confirm_answer, "page confirm");
        self.confirm_answer
    }

    async fn prompt(&self, origin: &str, message: &str) -> Option<String> {
        info!(%origin, %message, "page prompt dismissed");
        None
    }
}
