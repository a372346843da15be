//! Listing of previously produced 3D assets

use chrono::{DateTime, Local, TimeZone};
use std::fmt::Display;

use crate::api::ModelEntry;
use crate::effect::UiEffect;
use crate::error::ClientError;

/// Where listed assets are served from
pub const MODELS_DIR: &str = "static/models";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One listed asset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelAsset {
    pub name: String,
    /// Seconds since the epoch
    pub created_at: i64,
    /// Used both to display and to download the asset
    pub path: String,
}

impl From<ModelEntry> for ModelAsset {
    fn from(entry: ModelEntry) -> Self {
        let path = format!("{}/{}", MODELS_DIR, entry.name);
        Self {
            name: entry.name,
            created_at: entry.created_at.floor() as i64,
            path,
        }
    }
}

impl ModelAsset {
    pub fn local_timestamp(&self) -> String {
        format_local_timestamp(self.created_at)
    }
}

/// Format epoch seconds as `YYYY-MM-DD HH:MM:SS` in the given zone
pub fn format_timestamp_in<Tz>(secs: i64, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    match DateTime::from_timestamp(secs, 0) {
        Some(utc) => utc.with_timezone(tz).format(TIMESTAMP_FORMAT).to_string(),
        None => secs.to_string(),
    }
}

/// Format epoch seconds in the browser's (or host's) local zone
pub fn format_local_timestamp(secs: i64) -> String {
    format_timestamp_in(secs, &Local)
}

/// What a click on a library row means
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LibraryClick {
    None,
    Select(usize),
    Download(usize),
}

impl LibraryClick {
    /// Download is nested inside the row; when it is hit the row click must
    /// not also select.
    pub fn resolve(index: usize, row_clicked: bool, download_clicked: bool) -> Self {
        if download_clicked {
            LibraryClick::Download(index)
        } else if row_clicked {
            LibraryClick::Select(index)
        } else {
            LibraryClick::None
        }
    }
}

/// Token for one `/models` fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshTicket {
    pub token: u64,
}

#[derive(Debug, Clone, Default)]
pub struct ModelLibrary {
    assets: Vec<ModelAsset>,
    last_token: u64,
    applied_token: u64,
}

impl ModelLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assets in server order
    pub fn assets(&self) -> &[ModelAsset] {
        &self.assets
    }

    pub fn begin_refresh(&mut self) -> RefreshTicket {
        self.last_token += 1;
        RefreshTicket {
            token: self.last_token,
        }
    }

    /// Replace the list with a fetched listing. Returns whether it was applied.
    ///
    /// A listing older than the one already shown is ignored, and a failed
    /// fetch keeps the current list.
    pub fn finish_refresh(
        &mut self,
        ticket: RefreshTicket,
        result: Result<Vec<ModelEntry>, ClientError>,
    ) -> bool {
        if ticket.token <= self.applied_token {
            tracing::debug!(token = ticket.token, "Dropping stale model listing");
            return false;
        }

        match result {
            Ok(entries) => {
                self.assets = entries.into_iter().map(ModelAsset::from).collect();
                self.applied_token = ticket.token;
                tracing::info!("Model library refreshed: {} assets", self.assets.len());
                true
            }
            Err(e) => {
                tracing::error!("Error fetching models: {}", e);
                false
            }
        }
    }

    /// Display the asset at `index`
    pub fn select(&self, index: usize) -> Option<UiEffect> {
        self.assets
            .get(index)
            .map(|asset| UiEffect::DisplayModel(asset.path.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::parse_models;
    use chrono::{FixedOffset, Utc};

    #[test]
    fn test_timestamp_formatting_is_zero_padded() {
        assert_eq!(format_timestamp_in(1_700_000_000, &Utc), "2023-11-14 22:13:20");
        assert_eq!(format_timestamp_in(0, &Utc), "1970-01-01 00:00:00");

        let tokyo = FixedOffset::east_opt(9 * 3600).unwrap();
        assert_eq!(format_timestamp_in(1_700_000_000, &tokyo), "2023-11-15 07:13:20");
    }

    #[test]
    fn test_local_timestamp_matches_local_zone() {
        let expected = Local
            .timestamp_opt(1_700_000_000, 0)
            .unwrap()
            .format(TIMESTAMP_FORMAT)
            .to_string();
        assert_eq!(format_local_timestamp(1_700_000_000), expected);
    }

    #[test]
    fn test_refresh_builds_paths_in_server_order() {
        let mut library = ModelLibrary::new();
        let ticket = library.begin_refresh();
        let entries = parse_models(
            r#"[{"name": "b.glb", "created_at": 1700000100}, {"name": "a.glb", "created_at": 1700000000.9}]"#,
        );

        assert!(library.finish_refresh(ticket, entries));
        let names: Vec<_> = library.assets().iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["b.glb", "a.glb"]);
        assert_eq!(library.assets()[1].path, "static/models/a.glb");
        assert_eq!(library.assets()[1].created_at, 1_700_000_000);
    }

    #[test]
    fn test_stale_listing_never_overwrites_newer() {
        let mut library = ModelLibrary::new();
        let older = library.begin_refresh();
        let newer = library.begin_refresh();

        assert!(library.finish_refresh(newer, parse_models(r#"[{"name": "new.glb", "created_at": 2}]"#)));
        assert!(!library.finish_refresh(older, parse_models(r#"[{"name": "old.glb", "created_at": 1}]"#)));
        assert_eq!(library.assets()[0].name, "new.glb");
    }

    #[test]
    fn test_failed_refresh_keeps_list() {
        let mut library = ModelLibrary::new();
        let ticket = library.begin_refresh();
        library.finish_refresh(ticket, parse_models(r#"[{"name": "m1.glb", "created_at": 1}]"#));

        let ticket = library.begin_refresh();
        assert!(!library.finish_refresh(ticket, Err(ClientError::Transport("offline".into()))));
        assert_eq!(library.assets().len(), 1);
    }

    #[test]
    fn test_select_displays_asset_path() {
        let mut library = ModelLibrary::new();
        let ticket = library.begin_refresh();
        library.finish_refresh(ticket, parse_models(r#"[{"name": "m1.glb", "created_at": 1}]"#));

        assert_eq!(library.select(0), Some(UiEffect::DisplayModel("static/models/m1.glb".into())));
        assert_eq!(library.select(5), None);
    }

    #[test]
    fn test_download_click_never_selects() {
        assert_eq!(LibraryClick::resolve(3, true, true), LibraryClick::Download(3));
        assert_eq!(LibraryClick::resolve(3, true, false), LibraryClick::Select(3));
        assert_eq!(LibraryClick::resolve(3, false, false), LibraryClick::None);
    }
}
