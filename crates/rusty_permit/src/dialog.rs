//! Dialog state shared by the flow controllers.
//!
//! [`DialogState`] is the controllers' internal tagged state. Renderers only
//! ever see the flattened [`DialogUiState`] projection, in which "rationale"
//! and "settings guide" can never both be shown.

use serde::{Deserialize, Serialize};

use crate::identity::Permission;

/// Dialog state machine of one controller
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DialogState {
    /// Nothing shown, no request in flight
    #[default]
    Idle,
    /// A native prompt is up; the engine shows nothing of its own
    Awaiting,
    /// Explaining why the permission is needed before asking again
    Rationale {
        /// Caller-supplied rationale text
        message: Option<String>,
    },
    /// Directing the user to the OS settings screen
    SettingsGuide {
        /// Caller-supplied settings guide text
        message: Option<String>,
    },
}

impl DialogState {
    /// Whether a dialog of the engine's own is on screen
    pub fn is_visible(&self) -> bool {
        matches!(
            self,
            DialogState::Rationale { .. } | DialogState::SettingsGuide { .. }
        )
    }
}

/// Read-only view of a controller's dialog for the rendering layer
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DialogUiState {
    /// A dialog should be on screen
    pub visible: bool,
    /// The rationale dialog should be shown
    pub show_rationale: bool,
    /// The settings guide dialog should be shown
    pub show_settings_guide: bool,
    /// Rationale text, when showing the rationale
    pub rationale_message: Option<String>,
    /// Settings guide text, when showing the settings guide
    pub settings_message: Option<String>,
}

impl From<&DialogState> for DialogUiState {
    fn from(state: &DialogState) -> Self {
        match state {
            DialogState::Idle | DialogState::Awaiting => DialogUiState::default(),
            DialogState::Rationale { message } => DialogUiState {
                visible: true,
                show_rationale: true,
                rationale_message: message.clone(),
                ..DialogUiState::default()
            },
            DialogState::SettingsGuide { message } => DialogUiState {
                visible: true,
                show_settings_guide: true,
                settings_message: message.clone(),
                ..DialogUiState::default()
            },
        }
    }
}

/// Read-only view of a group controller's dialog
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GroupUiState {
    /// Identity that halted the sequence, if any
    pub active: Option<Permission>,
    /// Dialog for the active identity
    pub dialog: DialogUiState,
}
