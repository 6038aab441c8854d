use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

#[derive(Debug, Clone, Default)]
pub struct ApiKey(Arc<RwLock<Option<String>>>);

impl ApiKey {
    pub fn new(key: Option<String>) -> Self {
        Self(Arc::new(RwLock::new(key.filter(|k| !k.is_empty()))))
    }

    pub fn get(&self) -> Option<String> {
        self.0.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn set(&self, key: impl Into<String>) {
        let key = key.into();
        let mut guard = self.0.write().unwrap_or_else(|e| e.into_inner());
        *guard = if key.is_empty() { None } else { Some(key) };
    }

    pub fn is_set(&self) -> bool {
        self.0.read().unwrap_or_else(|e| e.into_inner()).is_some()
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CredentialSelector: Send + Sync {
    async fn has_selected_credential(&self) -> bool;

    async fn prompt_for_credential(&self) -> Result<()>;
}

#[derive(Debug, Clone, Default)]
pub struct CredentialGate(Arc<AtomicBool>);

impl CredentialGate {
    pub fn is_ready(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn mark_ready(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct TerminalKeySelector {
    key: ApiKey,
}

impl TerminalKeySelector {
    pub fn new(key: ApiKey) -> Self {
        Self { key }
    }
}

#[async_trait]
impl CredentialSelector for TerminalKeySelector {
    async fn has_selected_credential(&self) -> bool {
        self.key.is_set()
    }

    async fn prompt_for_credential(&self) -> Result<()> {
        let line = tokio::task::spawn_blocking(|| {
            let mut stdout = std::io::stdout();
            stdout.write_all(b"Video generation is billed to your key. Paste a Gemini API key: ")?;
            stdout.flush()?;
            let mut line = String::new();
            std::io::stdin().read_line(&mut line)?;
            Ok::<_, std::io::Error>(line)
        })
        .await
        .map_err(|e| PipelineError::InvalidInput(e.to_string()))?
        .map_err(|e| PipelineError::InvalidInput(e.to_string()))?;

        let key = line.trim();
        if key.is_empty() {
            return Err(PipelineError::InvalidInput("No API key entered.".to_string()));
        }
        self.key.set(key);
        Ok(())
    }
}
