use crate::config::Config;
use crate::engine::ids::IdSource;
use crate::engine::{CommandResult, Evaluator};
use crate::error::{Error, Result};
use crate::parser::parse;
use crate::schema;
use crate::state::EngineContext;
use crate::workspace::WorkspaceFiles;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const SESSION_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub version: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<DateTime<Utc>>,
    pub engine: EngineContext,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            version: SESSION_VERSION,
            saved_at: None,
            engine: EngineContext::default(),
        }
    }
}

impl Session {
    /// Load the session from the state directory, or start empty
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::session_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "no saved session");
            return Ok(Session::default());
        }

        let content = fs::read_to_string(path)?;
        let session: Session =
            serde_json::from_str(&content).map_err(|e| Error::StateCorrupted(format!("invalid JSON: {e}")))?;
        if session.version != SESSION_VERSION {
            return Err(Error::SessionVersion {
                found: session.version,
                expected: SESSION_VERSION,
            });
        }
        schema::check_context(&session.engine).map_err(|e| Error::StateCorrupted(e.to_string()))?;

        info!(
            path = %path.display(),
            images = session.engine.images.len(),
            containers = session.engine.containers.len(),
            "loaded session"
        );
        Ok(session)
    }

    /// Save the session atomically
    pub fn save(&mut self) -> Result<()> {
        self.save_to(&Self::session_path()?)
    }

    pub fn save_to(&mut self, path: &Path) -> Result<()> {
        self.engine.pending_command = None;
        self.engine.last_error = None;
        self.saved_at = Some(Utc::now());

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Write to temp file first, then rename (atomic)
        let temp_path = path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(self)?;
        fs::write(&temp_path, content)?;
        fs::rename(&temp_path, path)?;

        info!(path = %path.display(), events = self.engine.event_log.len(), "saved session");
        Ok(())
    }

    /// Delete the saved session; returns whether there was one
    pub fn remove() -> Result<bool> {
        let path = Self::session_path()?;
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path)?;
        info!(path = %path.display(), "removed session");
        Ok(true)
    }

    pub fn session_path() -> Result<PathBuf> {
        Ok(Config::state_dir()?.join("session.json"))
    }

    /// Run one command against the store: evaluate, merge the delta, append
    /// the events and track the last error.
    pub fn submit<G: IdSource>(
        &mut self,
        raw: &str,
        files: Option<&WorkspaceFiles>,
        evaluator: &mut Evaluator<G>,
    ) -> CommandResult {
        let cmd = parse(raw);
        self.engine.pending_command = Some(cmd.clone());

        let result = evaluator.evaluate(&self.engine, &cmd, files);
        self.engine.apply(result.state_delta.clone());
        self.engine.record(result.events.iter().cloned());
        self.engine.last_error = result.error_message().map(str::to_string);
        self.engine.pending_command = None;

        debug!(
            command = %raw.trim(),
            succeeded = result.succeeded,
            events = self.engine.event_log.len(),
            "command submitted"
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ids::SequentialIds;
    use crate::state::{ContainerStatus, EventKind};

    fn temp_path() -> PathBuf {
        std::env::temp_dir()
            .join(format!("dockyard-session-{}", uuid::Uuid::new_v4()))
            .join("session.json")
    }

    fn evaluator() -> Evaluator<SequentialIds> {
        Evaluator::with_ids(SequentialIds::new())
    }

    #[test]
    fn test_submit_merges_and_records() {
        let mut session = Session::default();
        let mut ev = evaluator();

        session.submit("docker pull nginx", None, &mut ev);
        let run = session.submit("docker run -d -p 8080:80 --name web nginx", None, &mut ev);
        assert!(run.succeeded);
        assert_eq!(session.engine.images.len(), 1);
        assert_eq!(session.engine.active_containers().count(), 1);
        assert_eq!(session.engine.event_log.len(), 2 + 3);
        assert_eq!(session.engine.event_log[0].kind, EventKind::ImagePullStarted);
        assert!(session.engine.pending_command.is_none());
        assert!(session.engine.last_error.is_none());
    }

    #[test]
    fn test_submit_tracks_last_error() {
        let mut session = Session::default();
        let mut ev = evaluator();

        session.submit("docker stop ghost", None, &mut ev);
        assert_eq!(
            session.engine.last_error.as_deref(),
            Some("Error response from daemon: No such container: ghost")
        );

        session.submit("docker ps", None, &mut ev);
        assert!(session.engine.last_error.is_none());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let path = temp_path();
        let mut session = Session::default();
        let mut ev = evaluator();
        session.submit("docker pull redis:7", None, &mut ev);
        session.submit("docker run -d --name cache redis:7", None, &mut ev);
        session.submit("docker stop cache", None, &mut ev);
        session.submit("docker stop cache", None, &mut ev);
        assert!(session.engine.last_error.is_some());

        session.save_to(&path).unwrap();
        let loaded = Session::load_from(&path).unwrap();
        assert!(loaded.saved_at.is_some());
        assert!(loaded.engine.last_error.is_none());
        assert_eq!(loaded.engine.images, session.engine.images);
        assert_eq!(loaded.engine.event_log.len(), session.engine.event_log.len());
        let cache = loaded.engine.active_containers().next().unwrap();
        assert_eq!(cache.status, ContainerStatus::Stopped);

        fs::remove_dir_all(path.parent().unwrap()).unwrap();
    }

    #[test]
    fn test_missing_file_is_empty_session() {
        let session = Session::load_from(&temp_path()).unwrap();
        assert_eq!(session.version, SESSION_VERSION);
        assert!(session.engine.images.is_empty());
    }

    #[test]
    fn test_corrupted_file() {
        let path = temp_path();
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(Session::load_from(&path), Err(Error::StateCorrupted(_))));

        fs::write(&path, r#"{"version": 99, "engine": {}}"#).unwrap();
        assert!(matches!(
            Session::load_from(&path),
            Err(Error::SessionVersion { found: 99, expected: 1 })
        ));

        fs::write(&path, r#"{"version": 1, "engine": {"boundPorts": {"80": "nobody"}}}"#).unwrap();
        let err = Session::load_from(&path).unwrap_err();
        assert!(matches!(err, Error::StateCorrupted(_)));

        fs::remove_dir_all(path.parent().unwrap()).unwrap();
    }
}
