use std::sync::Arc;
use rocket::serde::Serialize;
use rocket::tokio::sync::Mutex;
use crate::identity::IdentityKey;
use crate::model::NormalizedClass;
use crate::store::ClassStore;

#[derive(Serialize, Clone, Copy, PartialEq, Eq, Debug)]
pub enum Outcome {
    Inserted,
    Updated,
}

/// Serializes every write of scraped classes into the store, so overlapping
/// retrievals each see the latest state of a key before deciding insert or update.
pub struct Reconciler {
    store: Arc<dyn ClassStore>,
    write_lock: Mutex<()>,
}
pub type SharedReconciler = Arc<Reconciler>;

impl Reconciler {
    pub fn new(store: Arc<dyn ClassStore>) -> Self {
        Self { store, write_lock: Mutex::new(()) }
    }
    pub fn store(&self) -> &dyn ClassStore {
        self.store.as_ref()
    }
    pub async fn reconcile(&self, class: &NormalizedClass) -> anyhow::Result<Outcome> {
        let key = IdentityKey::new(class.gym, class.class_id.clone());
        let _guard = self.write_lock.lock().await;
        match self.store.get(&key).await? {
            Some(mut record) => {
                record.apply_scrape(class);
                self.store.update(&record).await?;
                debug!("updated {key} '{}'", record.name);
                Ok(Outcome::Updated)
            }
            None => {
                let id = self.store.insert(class).await?;
                debug!("inserted {key} '{}' as #{id}", class.name);
                Ok(Outcome::Inserted)
            }
        }
    }
}
