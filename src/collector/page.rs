//! Host page context: location, title and visibility.

use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Page visibility as reported by the host.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Visibility {
    /// Page is shown to the user.
    #[default]
    Visible,
    /// Page is being hidden or torn down.
    Hidden,
}

/// Source of the page address and title captured with each event.
pub trait PageContext: Send + Sync + 'static {
    /// Full current page address.
    fn url(&self) -> String;

    /// Current page title.
    fn title(&self) -> String;
}

/// Page context backed by values the host updates on navigation.
#[derive(Debug, Default)]
pub struct StaticPage {
    location: RwLock<(String, String)>,
}

impl StaticPage {
    pub fn new(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            location: RwLock::new((url.into(), title.into())),
        }
    }

    /// Record a navigation to a new page.
    pub fn navigate(&self, url: impl Into<String>, title: impl Into<String>) {
        let mut location = self.location.write().unwrap_or_else(PoisonError::into_inner);
        *location = (url.into(), title.into());
    }
}

impl PageContext for StaticPage {
    fn url(&self) -> String {
        self.location
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .0
            .clone()
    }

    fn title(&self) -> String {
        self.location
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .1
            .clone()
    }
}
