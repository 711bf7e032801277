use std::sync::Arc;

use tracing::info;

use crate::store::{KeyValueStore, StoreError};

pub const TOKEN_KEY: &str = "auth.token";

/// Where `ferry login` keeps the bearer token. Plain file storage; the
/// platform keychain is not used.
#[derive(Clone)]
pub struct TokenStore {
    store: Arc<dyn KeyValueStore>,
}

impl TokenStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn load(&self) -> Result<Option<String>, StoreError> {
        Ok(self
            .store
            .get(TOKEN_KEY)?
            .map(|raw| raw.trim().to_string())
            .filter(|token| !token.is_empty()))
    }

    pub fn save(&self, token: &str) -> Result<(), StoreError> {
        self.store.set(TOKEN_KEY, token.trim())?;
        info!("saved API token");
        Ok(())
    }

    pub fn clear(&self) -> Result<(), StoreError> {
        self.store.remove(TOKEN_KEY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn blank_tokens_read_as_missing() {
        let tokens = TokenStore::new(Arc::new(MemoryStore::new()));
        assert_eq!(tokens.load().expect("load"), None);

        tokens.save("  \n").expect("save");
        assert_eq!(tokens.load().expect("load"), None);

        tokens.save("0123abcd\n").expect("save");
        assert_eq!(tokens.load().expect("load").as_deref(), Some("0123abcd"));

        tokens.clear().expect("clear");
        assert_eq!(tokens.load().expect("load"), None);
    }
}
