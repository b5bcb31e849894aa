//! Meeting participant roster, fed by the meeting platform's join/leave events.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::info;

/// Platform participant id. The platform sends numbers; strings are accepted too.
#[derive(Serialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct ParticipantId(pub String);

impl<'de> Deserialize<'de> for ParticipantId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(i64),
            Text(String),
        }
        Ok(match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Self(n.to_string()),
            Raw::Text(s) => Self(s),
        })
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantStatus {
    Joined,
    Left,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Participant {
    pub id: ParticipantId,
    pub name: String,
    pub is_host: bool,
    pub platform: String,
    pub status: ParticipantStatus,
    pub extra_data: Value,
}

/// Participant as described by a platform event.
#[derive(Deserialize, Debug, Clone)]
pub struct ParticipantInfo {
    pub id: ParticipantId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub is_host: bool,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub extra_data: Option<Value>,
}

impl ParticipantInfo {
    fn into_joined(self) -> Participant {
        Participant {
            id: self.id,
            name: self.name.unwrap_or_default(),
            is_host: self.is_host,
            platform: self.platform.unwrap_or_else(|| "unknown".to_string()),
            status: ParticipantStatus::Joined,
            extra_data: self
                .extra_data
                .unwrap_or_else(|| Value::Object(Default::default())),
        }
    }
}

/// Shared participant list, upserted by id.
#[derive(Clone, Debug, Default)]
pub struct Roster {
    participants: Arc<RwLock<Vec<Participant>>>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Participant>> {
        self.participants.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Participant>> {
        self.participants.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Records a join. Returns `true` when the participant was not known before.
    pub fn upsert_joined(&self, info: ParticipantInfo) -> bool {
        let joined = info.into_joined();
        let mut participants = self.write();
        match participants.iter_mut().find(|p| p.id == joined.id) {
            Some(existing) => {
                info!(participant = %joined.name, id = %joined.id, "Updated participant");
                *existing = joined;
                false
            }
            None => {
                info!(participant = %joined.name, id = %joined.id, "Added new participant");
                participants.push(joined);
                true
            }
        }
    }

    /// Flags a participant as gone. Unknown ids are ignored.
    pub fn mark_left(&self, id: &ParticipantId) -> Option<Participant> {
        let mut participants = self.write();
        let participant = participants.iter_mut().find(|p| &p.id == id)?;
        participant.status = ParticipantStatus::Left;
        Some(participant.clone())
    }

    /// Replaces the whole list.
    pub fn update_participants(&self, list: Vec<Participant>) {
        let count = list.len();
        *self.write() = list;
        info!(count, "Updated participants list");
    }

    /// Everyone seen in this meeting, including those who left.
    pub fn all(&self) -> Vec<Participant> {
        self.read().clone()
    }

    /// Participants currently in the meeting.
    pub fn active(&self) -> Vec<Participant> {
        self.read()
            .iter()
            .filter(|p| p.status == ParticipantStatus::Joined)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}
