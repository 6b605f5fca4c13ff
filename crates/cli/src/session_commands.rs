use {anyhow::Result, clap::Subcommand, wagate_config::WagateConfig, wagate_whatsapp::SessionStore};

#[derive(Subcommand)]
pub enum SessionAction {
    /// Show whether a saved WhatsApp session exists.
    Status,
    /// Delete the saved session so the next start asks for a QR scan.
    Clear,
}

pub fn handle_session(action: SessionAction, config: &WagateConfig) -> Result<()> {
    let store = SessionStore::new(&config.session.path);
    match action {
        SessionAction::Status => {
            println!("{}", status_line(&store));
            Ok(())
        },
        SessionAction::Clear => {
            if store.clear()? {
                println!("Removed saved session {}.", store.path().display());
            } else {
                println!("No saved session at {}.", store.path().display());
            }
            Ok(())
        },
    }
}

fn status_line(store: &SessionStore) -> String {
    let path = store.path().display();
    match store.load() {
        Some(_) => format!("{path} [saved, will resume without QR]"),
        None => format!("{path} [none, QR login required]"),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_reflects_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("whatsapp-session.json");
        let store = SessionStore::new(&path);
        assert!(status_line(&store).ends_with("[none, QR login required]"));

        std::fs::write(&path, br#"{"WAToken1":"t"}"#).unwrap();
        assert!(status_line(&store).ends_with("[saved, will resume without QR]"));
    }

    #[test]
    fn clear_removes_saved_session() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("whatsapp-session.json");
        std::fs::write(&path, br#"{"WAToken1":"t"}"#).unwrap();

        let mut config = WagateConfig::default();
        config.session.path = path.clone();
        handle_session(SessionAction::Clear, &config).unwrap();
        assert!(!path.exists());
        handle_session(SessionAction::Clear, &config).unwrap();
    }
}
