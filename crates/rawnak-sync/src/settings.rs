//! # Branch Settings
//!
//! Notification and invoice preferences of a branch, stored in
//! `branches/{id}/data/settings`. A missing document is created with the
//! defaults the first time a branch is watched.
//!
//! Updates merge the patch into the current section and write the whole
//! section back with a merge, so the other section is never touched.

use std::sync::Arc;

use rawnak_core::{
    BranchScope, BranchSettings, InvoiceSettings, InvoiceSettingsPatch, NotificationSettings,
    NotificationSettingsPatch,
};
use rawnak_db::LocalCache;
use serde_json::json;
use tokio::sync::watch;
use tracing::info;

use crate::document::{DocumentSync, DocumentView, SyncDocument};
use crate::error::SyncResult;
use crate::store::{AtomicUpdate, RemoteStore, WriteOp};

pub struct SettingsStore {
    doc: DocumentSync<BranchSettings>,
}

impl SettingsStore {
    pub fn new(store: Option<Arc<dyn RemoteStore>>, cache: Arc<dyn LocalCache>) -> Self {
        SettingsStore {
            doc: DocumentSync::new(store, cache),
        }
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.doc = self.doc.with_max_attempts(attempts);
        self
    }

    pub fn watch(&self) -> watch::Receiver<DocumentView<BranchSettings>> {
        self.doc.watch()
    }

    pub fn current(&self) -> DocumentView<BranchSettings> {
        self.doc.current()
    }

    pub fn settings(&self) -> BranchSettings {
        self.doc.value()
    }

    pub async fn subscribe(&self, scope: &BranchScope) -> SyncResult<()> {
        self.doc.subscribe(scope).await
    }

    pub async fn unsubscribe(&self) {
        self.doc.unsubscribe().await
    }

    pub async fn update_notification_settings(
        &self,
        scope: &BranchScope,
        patch: NotificationSettingsPatch,
    ) -> SyncResult<NotificationSettings> {
        let settings = self
            .update(scope, |settings| patch.apply(&mut settings.notification_settings))
            .await?;
        info!(branch_id = %scope, "Notification settings updated");
        Ok(settings.notification_settings)
    }

    pub async fn update_invoice_settings(
        &self,
        scope: &BranchScope,
        patch: InvoiceSettingsPatch,
    ) -> SyncResult<InvoiceSettings> {
        let settings = self
            .update(scope, |settings| patch.apply(&mut settings.invoice_settings))
            .await?;
        info!(branch_id = %scope, "Invoice settings updated");
        Ok(settings.invoice_settings)
    }

    /// Applies `change` to the freshest stored settings.
    async fn update<F>(&self, scope: &BranchScope, change: F) -> SyncResult<BranchSettings>
    where
        F: Fn(&mut BranchSettings) + Send + Sync,
    {
        let Some(store) = self.doc.store() else {
            return self
                .doc
                .modify_local(scope, |current| {
                    let mut next = current.clone();
                    change(&mut next);
                    Ok(Some(next))
                })
                .await;
        };

        let path = BranchSettings::path(scope.branch_id());
        AtomicUpdate::new(vec![path.clone()])
            .max_attempts(self.doc.max_attempts())
            .run(store.as_ref(), |snapshot| {
                let mut settings = match snapshot.get(&path) {
                    Some(data) => BranchSettings::from_body(data.clone())?,
                    None => BranchSettings::default(),
                };
                change(&mut settings);
                let body = json!({
                    "notificationSettings": serde_json::to_value(&settings.notification_settings)?,
                    "invoiceSettings": serde_json::to_value(&settings.invoice_settings)?,
                });
                Ok((vec![WriteOp::merge(path.clone(), body)], settings))
            })
            .await
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ViewSource;
    use crate::store::MemoryStore;
    use crate::testing::wait_for;
    use rawnak_core::InvoiceTemplate;
    use rawnak_db::MemoryCache;

    #[tokio::test]
    async fn test_update_keeps_other_fields() {
        let store = Arc::new(MemoryStore::new());
        let settings = SettingsStore::new(
            Some(store.clone() as Arc<dyn RemoteStore>),
            Arc::new(MemoryCache::new()),
        );
        let scope = BranchScope::new("b2");
        let mut rx = settings.watch();
        settings.subscribe(&scope).await.unwrap();
        wait_for(&mut rx, |v| v.source == ViewSource::Remote).await;

        let updated = settings
            .update_notification_settings(
                &scope,
                NotificationSettingsPatch {
                    debt_reminders: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(updated.debt_reminders);
        assert!(updated.low_stock_alerts);
        assert_eq!(updated.updates_email, "owner@rawnak.com");

        settings
            .update_invoice_settings(
                &scope,
                InvoiceSettingsPatch {
                    template: Some(InvoiceTemplate::Compact),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let view = wait_for(&mut rx, |v| v.value.invoice_settings.template == InvoiceTemplate::Compact).await;
        assert!(view.value.notification_settings.debt_reminders);
        assert_eq!(
            view.value.invoice_settings.footer_text,
            InvoiceSettings::default().footer_text
        );
    }

    #[tokio::test]
    async fn test_offline_update_is_local() {
        let settings = SettingsStore::new(None, Arc::new(MemoryCache::new()));
        let scope = BranchScope::default_branch();
        settings.subscribe(&scope).await.unwrap();

        settings
            .update_invoice_settings(
                &scope,
                InvoiceSettingsPatch {
                    footer_text: Some("Shukran".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let view = settings.current();
        assert_eq!(view.source, ViewSource::Local);
        assert_eq!(view.value.invoice_settings.footer_text, "Shukran");
        assert_eq!(view.value.notification_settings, NotificationSettings::default());
    }
}
