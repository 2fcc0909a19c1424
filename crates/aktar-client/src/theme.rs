//! Light/dark preference, stored as a bare scalar.

use std::sync::Arc;

use aktar_common::constants::storage_keys;
use tokio::sync::watch;

use crate::error::ClientError;
use crate::storage::{Storage, heal, read_present};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    pub fn as_str(self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "light" => Some(Theme::Light),
            "dark" => Some(Theme::Dark),
            _ => None,
        }
    }
}

pub struct ThemeStore {
    storage: Arc<dyn Storage>,
    theme: watch::Sender<Theme>,
}

impl ThemeStore {
    pub fn load(storage: Arc<dyn Storage>) -> Self {
        let initial = read_present(storage.as_ref(), storage_keys::THEME)
            .and_then(|raw| {
                let parsed = Theme::parse(&raw);
                if parsed.is_none() {
                    heal(storage.as_ref(), storage_keys::THEME, "unknown theme");
                }
                parsed
            })
            .unwrap_or_default();

        let (theme, _) = watch::channel(initial);
        Self { storage, theme }
    }

    pub fn current(&self) -> Theme {
        *self.theme.borrow()
    }

    pub fn set(&self, theme: Theme) -> Result<(), ClientError> {
        self.storage.set(storage_keys::THEME, theme.as_str())?;
        self.theme.send_replace(theme);
        Ok(())
    }

    pub fn toggle(&self) -> Result<Theme, ClientError> {
        let next = match self.current() {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        };
        self.set(next)?;
        Ok(next)
    }

    pub fn subscribe(&self) -> watch::Receiver<Theme> {
        self.theme.subscribe()
    }
}
