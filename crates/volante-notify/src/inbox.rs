use std::sync::Arc;

use tracing::warn;
use uuid::Uuid;

use volante_core::error::Result;
use volante_core::models::Notification;
use volante_core::store::{EntityStore, Predicate, Repository};

/// Read/unread surface exposed to the UI layer.
pub struct NotificationInbox {
    notifications: Repository<Notification>,
}

impl NotificationInbox {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        NotificationInbox {
            notifications: Repository::new(store),
        }
    }

    pub async fn list(&self, recipient: &str) -> Result<Vec<Notification>> {
        let predicate = Predicate::default().field("recipient_user_id", recipient);
        let mut items = self.notifications.filter(&predicate).await?;
        items.sort_by(|a, b| b.created_date.cmp(&a.created_date));
        Ok(items)
    }

    pub async fn unread(&self, recipient: &str) -> Result<Vec<Notification>> {
        let predicate = Predicate::default()
            .field("recipient_user_id", recipient)
            .field("is_read", false);
        self.notifications.filter(&predicate).await
    }

    /// Badge count. A store outage degrades to zero rather than failing the
    /// read path; the outage is still logged.
    pub async fn unread_count(&self, recipient: &str) -> usize {
        match self.unread(recipient).await {
            Ok(items) => items.len(),
            Err(err) => {
                warn!("unread count degraded to 0: {err}");
                0
            }
        }
    }

    pub async fn mark_read(&self, id: Uuid) -> Result<Notification> {
        let mut notification = self.notifications.get(id).await?;
        notification.is_read = true;
        self.notifications.update(&notification).await
    }

    pub async fn mark_all_read(&self, recipient: &str) -> Result<usize> {
        let unread = self.unread(recipient).await?;
        let count = unread.len();
        for mut notification in unread {
            notification.is_read = true;
            self.notifications.update(&notification).await?;
        }
        Ok(count)
    }

    pub async fn delete(&self, id: Uuid) -> Result<()> {
        self.notifications.delete(id).await
    }
}
