//! Backend addressing and viewer constants

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Backend connection configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientConfig {
    /// HTTP(S) base URL for the API (e.g., "http://192.168.1.100:5000").
    /// Empty means same-origin relative requests.
    pub http_url: String,
    /// Push channel URL without the session query (e.g., "ws://192.168.1.100:5000/ws")
    pub ws_url: String,
    /// Backend lives on another origin than the page, so assets must be
    /// fetched by absolute URL
    pub cross_origin: bool,
}

impl ClientConfig {
    /// Create config from a server address (host:port or full URL)
    pub fn from_server_address(addr: &str) -> Self {
        let addr = addr.trim_end_matches('/');
        let (http_url, ws_url) = if addr.starts_with("https://") || addr.starts_with("http://") {
            let ws = addr.replacen("https://", "wss://", 1).replacen("http://", "ws://", 1);
            (addr.to_string(), format!("{}/ws", ws))
        } else {
            (format!("http://{}", addr), format!("ws://{}/ws", addr))
        };

        Self { http_url, ws_url, cross_origin: true }
    }

    /// Config for the page's own origin
    pub fn same_origin(protocol: &str, host: &str) -> Self {
        let secure = protocol == "https:";
        Self {
            http_url: format!("{}://{}", if secure { "https" } else { "http" }, host),
            ws_url: format!("{}://{}/ws", if secure { "wss" } else { "ws" }, host),
            cross_origin: false,
        }
    }

    /// Resolve from a page's `location.search`, falling back to its origin.
    /// `decode` percent-decodes the raw query value.
    pub fn from_location<D>(search: &str, protocol: &str, host: &str, decode: D) -> Self
    where
        D: Fn(&str) -> Option<String>,
    {
        let server = parse_query_param(search, "server")
            .and_then(|raw| decode(&raw))
            .filter(|value| !value.is_empty());
        match server {
            Some(server) => {
                tracing::info!("Using server from URL parameter: {}", server);
                Self::from_server_address(&server)
            }
            None => Self::same_origin(protocol, host),
        }
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.http_url, path.trim_start_matches('/'))
    }

    /// Where the asset loader should fetch a backend asset path from:
    /// page-relative on the same origin, absolute on another one.
    pub fn asset_url(&self, path: &str) -> String {
        let path = path.trim();
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        if self.cross_origin {
            self.endpoint(path)
        } else {
            path.trim_start_matches('/').to_string()
        }
    }

    /// Push channel URL bound to one client session
    pub fn ws_url_with_session(&self, session_id: &str) -> String {
        format!("{}?sid={}", self.ws_url, session_id)
    }
}

/// Raw (still percent-encoded) value of a query parameter
pub fn parse_query_param(search: &str, param: &str) -> Option<String> {
    search
        .trim_start_matches('?')
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == param)
        .map(|(_, value)| value.to_string())
        .filter(|value| !value.is_empty())
}

/// One directional light of the fixed rig
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DirectionalLightSpec {
    pub position: [f32; 3],
    pub intensity: f32,
}

/// Viewer constants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerSettings {
    pub fov_degrees: f32,
    pub near: f32,
    pub far: f32,
    /// Canvas edge in device-independent pixels
    pub canvas_size: f32,
    /// Checkerboard tiles along each backdrop axis
    pub checker_repeat: f32,
    pub camera_distance: f32,
    pub ambient_intensity: f32,
    pub directional_lights: Vec<DirectionalLightSpec>,
    pub notification_secs: u64,
}

impl Default for ViewerSettings {
    fn default() -> Self {
        Self {
            fov_degrees: 75.0,
            near: 0.1,
            far: 1000.0,
            canvas_size: 800.0,
            checker_repeat: 50.0,
            camera_distance: 3.0,
            ambient_intensity: 4.0,
            directional_lights: vec![
                DirectionalLightSpec { position: [5.0, 5.0, 5.0], intensity: 4.0 },
                DirectionalLightSpec { position: [-5.0, 5.0, -5.0], intensity: 2.0 },
                DirectionalLightSpec { position: [0.0, -5.0, 0.0], intensity: 2.0 },
            ],
            notification_secs: 5,
        }
    }
}

impl ViewerSettings {
    pub fn notification_duration(&self) -> Duration {
        Duration::from_secs(self.notification_secs)
    }

    /// Centered square viewport in physical pixels: `canvas_size` logical
    /// pixels at the given scale factor, clamped to the window.
    /// Returns `(x, y, edge)`.
    pub fn viewport_rect(&self, window_width: u32, window_height: u32, scale_factor: f32) -> (u32, u32, u32) {
        let wanted = (self.canvas_size * scale_factor).round().max(1.0) as u32;
        let edge = wanted.min(window_width).min(window_height).max(1);
        let x = window_width.saturating_sub(edge) / 2;
        let y = window_height.saturating_sub(edge) / 2;
        (x, y, edge)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_address_without_scheme() {
        let config = ClientConfig::from_server_address("192.168.1.100:5000");
        assert_eq!(config.http_url, "http://192.168.1.100:5000");
        assert_eq!(config.ws_url, "ws://192.168.1.100:5000/ws");
    }

    #[test]
    fn test_server_address_with_https() {
        let config = ClientConfig::from_server_address("https://gen.example.com/");
        assert_eq!(config.http_url, "https://gen.example.com");
        assert_eq!(config.ws_url, "wss://gen.example.com/ws");
        assert_eq!(config.endpoint("/convert"), "https://gen.example.com/convert");
    }

    /// Enough of `decodeURIComponent` for these tests
    fn decode(raw: &str) -> Option<String> {
        Some(raw.replace("%3A", ":").replace("%2F", "/").replace("%2D", "-"))
    }

    #[test]
    fn test_location_prefers_query_param() {
        let config = ClientConfig::from_location("?foo=1&server=10.0.0.2%3A5000", "https:", "page.example.com", decode);
        assert_eq!(config.http_url, "http://10.0.0.2:5000");

        let config = ClientConfig::from_location("", "https:", "page.example.com", decode);
        assert_eq!(config.http_url, "https://page.example.com");
        assert_eq!(config.ws_url_with_session("abc"), "wss://page.example.com/ws?sid=abc");
    }

    #[test]
    fn test_server_param_goes_through_decoder() {
        let search = "?server=https%3A%2F%2Fgen%2Dbox.example.com";
        assert_eq!(
            parse_query_param(search, "server").as_deref(),
            Some("https%3A%2F%2Fgen%2Dbox.example.com")
        );

        let config = ClientConfig::from_location(search, "http:", "page.example.com", decode);
        assert_eq!(config.http_url, "https://gen-box.example.com");
        assert_eq!(config.ws_url, "wss://gen-box.example.com/ws");

        // Undecodable values fall back to the page origin
        let config = ClientConfig::from_location(search, "http:", "page.example.com", |_| None);
        assert_eq!(config.http_url, "http://page.example.com");
    }

    #[test]
    fn test_asset_urls_follow_server_override() {
        let remote = ClientConfig::from_server_address("10.0.0.2:5000");
        assert_eq!(remote.asset_url("/static/models/a.glb"), "http://10.0.0.2:5000/static/models/a.glb");

        let local = ClientConfig::same_origin("https:", "page.example.com");
        assert_eq!(local.asset_url("/static/images/a.png"), "static/images/a.png");
        assert_eq!(local.asset_url("https://cdn.example.com/a.glb"), "https://cdn.example.com/a.glb");
    }

    #[test]
    fn test_parse_query_param_ignores_empty_value() {
        assert_eq!(parse_query_param("?server=", "server"), None);
        assert_eq!(parse_query_param("?a=b", "server"), None);
    }

    #[test]
    fn test_viewer_settings_partial_json_keeps_defaults() {
        let settings: ViewerSettings = serde_json::from_str(r#"{"fov_degrees": 60.0}"#).unwrap();
        assert_eq!(settings.fov_degrees, 60.0);
        assert_eq!(settings.far, 1000.0);
        assert_eq!(settings.directional_lights.len(), 3);
        assert_eq!(settings.notification_duration(), Duration::from_secs(5));
    }

    #[test]
    fn test_viewport_is_centered_and_clamped() {
        let settings = ViewerSettings::default();
        assert_eq!(settings.viewport_rect(1920, 1080, 1.0), (560, 140, 800));
        assert_eq!(settings.viewport_rect(3840, 2160, 2.0), (1120, 280, 1600));
        assert_eq!(settings.viewport_rect(600, 1000, 1.0), (0, 200, 600));
    }
}
