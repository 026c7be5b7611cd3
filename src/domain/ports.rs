use async_trait::async_trait;

use crate::domain::errors::{IdentityError, StoreError};
use crate::domain::identity::Identity;

// Port for the keyed persistence layer used by the lobby registry.
pub trait Repository<T>: Send + Sync {
    fn create(&self, id: &str, record: T) -> Result<(), StoreError>;
    fn get_by_id(&self, id: &str) -> Result<T, StoreError>;
    fn get_all(&self) -> Result<Vec<T>, StoreError>;
    fn update(&self, id: &str, record: T) -> Result<(), StoreError>;
    fn remove(&self, id: &str) -> Result<(), StoreError>;
    fn is_valid(&self) -> bool;
}

// Port for resolving a session token into a participant identity.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn verify(&self, token: &str) -> Result<Identity, IdentityError>;
}
