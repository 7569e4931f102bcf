use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Paths {
    pub base: PathBuf,
}

impl Paths {
    pub fn new() -> Self {
        let base = dirs::home_dir()
            .map(|h| h.join(".trafficlens"))
            .unwrap_or_else(|| PathBuf::from(".trafficlens"));
        Self { base }
    }

    pub fn with_base(base: PathBuf) -> Self {
        Self { base }
    }

    pub fn config_file(&self) -> PathBuf {
        self.base.join("config.json")
    }

    /// Persisted toggles, currently just the recording flag.
    pub fn flags_file(&self) -> PathBuf {
        self.base.join("flags.json")
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.base.join("sessions")
    }

    pub fn session_file(&self, session_key: &str) -> PathBuf {
        let safe_key = session_key.replace([':', '/', '\\'], "_");
        self.sessions_dir().join(format!("{}.jsonl", safe_key))
    }

    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.base)?;
        std::fs::create_dir_all(self.sessions_dir())?;
        Ok(())
    }
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}
