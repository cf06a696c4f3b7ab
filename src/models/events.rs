use serde::Serialize;

use crate::models::image::GenerationResult;
use crate::models::params::ParamEntry;

pub type SessionId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusKind {
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusMessage {
    pub kind: StatusKind,
    pub text: String,
}

impl StatusMessage {
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            kind: StatusKind::Success,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            kind: StatusKind::Error,
            text: text.into(),
        }
    }
}

/// Everything a presentation layer needs to mirror one session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ControllerEvent {
    Started {
        session: SessionId,
    },
    Progress {
        session: SessionId,
        percent: u8,
    },
    Succeeded {
        session: SessionId,
        result: Box<GenerationResult>,
    },
    Failed {
        session: SessionId,
        message: String,
        timed_out: bool,
    },
    ProgressHidden {
        session: SessionId,
    },
    Cancelled {
        session: SessionId,
    },
}

impl ControllerEvent {
    pub fn session(&self) -> SessionId {
        match self {
            ControllerEvent::Started { session }
            | ControllerEvent::Progress { session, .. }
            | ControllerEvent::Succeeded { session, .. }
            | ControllerEvent::Failed { session, .. }
            | ControllerEvent::ProgressHidden { session }
            | ControllerEvent::Cancelled { session } => *session,
        }
    }
}

/// Snapshot of what the form's result area shows.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ViewState {
    pub session: Option<SessionId>,
    /// `None` while the indicator is hidden.
    pub progress: Option<u8>,
    pub busy: bool,
    pub status: Option<StatusMessage>,
    pub result: Option<GenerationResult>,
    pub params_panel: Vec<ParamEntry>,
}

impl ViewState {
    pub fn apply(&mut self, event: &ControllerEvent) {
        match event {
            ControllerEvent::Started { session } => {
                *self = ViewState {
                    session: Some(*session),
                    progress: Some(0),
                    busy: true,
                    ..ViewState::default()
                };
            }
            ControllerEvent::Progress { percent, .. } => {
                if let Some(current) = self.progress {
                    if *percent > current {
                        self.progress = Some(*percent);
                    }
                }
            }
            ControllerEvent::Succeeded { session, result } => {
                self.session = Some(*session);
                self.progress = Some(100);
                self.busy = false;
                self.status = Some(StatusMessage::success(result.status_line()));
                self.params_panel = result.params.panel();
                self.result = Some((**result).clone());
            }
            ControllerEvent::Failed {
                session, message, ..
            } => {
                *self = ViewState {
                    session: Some(*session),
                    status: Some(StatusMessage::error(message.clone())),
                    ..ViewState::default()
                };
            }
            ControllerEvent::ProgressHidden { .. } => {
                self.progress = None;
            }
            ControllerEvent::Cancelled { .. } => {
                *self = ViewState::default();
            }
        }
    }
}
