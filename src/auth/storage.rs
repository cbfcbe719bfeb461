// Token storage
// Named token pairs plus a default alias pointer

use dashmap::DashMap;
use parking_lot::RwLock;

use super::types::Tokens;
use crate::error::Result;

/// Backend that keeps token pairs by alias
///
/// Implementations are injected into the token manager; only the manager
/// writes to them.
pub trait TokenStorage: Send + Sync {
    /// Tokens stored under `alias`, or under the default alias when `None`
    fn get_tokens(&self, alias: Option<&str>) -> Result<Option<Tokens>>;

    /// Store tokens under `alias`, optionally making it the default
    fn set_tokens(&self, alias: &str, tokens: &Tokens, make_default: bool) -> Result<()>;

    /// Point the default alias at `alias`
    fn set_default(&self, alias: &str) -> Result<()>;

    /// Remove every pair and the default pointer
    fn clear(&self) -> Result<()>;
}

/// In-process storage, lost when the process exits
#[derive(Default)]
pub struct MemoryTokenStorage {
    tokens: DashMap<String, Tokens>,
    default_alias: RwLock<Option<String>>,
}

impl MemoryTokenStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl TokenStorage for MemoryTokenStorage {
    fn get_tokens(&self, alias: Option<&str>) -> Result<Option<Tokens>> {
        let alias = match alias {
            Some(alias) => alias.to_string(),
            None => match self.default_alias.read().clone() {
                Some(alias) => alias,
                None => return Ok(None),
            },
        };

        Ok(self.tokens.get(&alias).map(|entry| entry.value().clone()))
    }

    fn set_tokens(&self, alias: &str, tokens: &Tokens, make_default: bool) -> Result<()> {
        self.tokens.insert(alias.to_string(), tokens.clone());
        if make_default {
            *self.default_alias.write() = Some(alias.to_string());
        }
        Ok(())
    }

    fn set_default(&self, alias: &str) -> Result<()> {
        *self.default_alias.write() = Some(alias.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.tokens.clear();
        *self.default_alias.write() = None;
        Ok(())
    }
}
