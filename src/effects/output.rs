//! Requests handed to the renderer and the plugin bridge dispatcher.

use serde::{Deserialize, Serialize};

/// Text drawn on screen for one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextRequest {
    pub text: String,
    pub position: [f32; 2],
    pub color: String,
}

/// Image drawn on screen for one tick. `path` is relative to the image directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphicRequest {
    pub path: String,
    pub position: [f32; 2],
    pub size: [f32; 2],
    pub tint: String,
}

/// Progress bar drawn on screen for one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressBarRequest {
    pub text: String,
    pub position: [f32; 2],
    pub size: [f32; 2],
    /// Filled portion, clamped to `0.0..=1.0`.
    pub fraction: f32,
    pub color: String,
    pub background_color: String,
    pub text_color: String,
}

impl ProgressBarRequest {
    /// Clamp the fill fraction so renderers never see values outside the bar.
    pub fn normalized(mut self) -> Self {
        self.fraction = if self.fraction.is_nan() {
            0.0
        } else {
            self.fraction.clamp(0.0, 1.0)
        };
        self
    }
}

/// Named invocation for a downstream plugin, with an untyped payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeCall {
    pub method: String,
    pub payload: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_bar_fraction_is_clamped() {
        let bar = ProgressBarRequest {
            text: "charges".to_string(),
            position: [0.0, 0.0],
            size: [100.0, 10.0],
            fraction: 1.7,
            color: "green".to_string(),
            background_color: "black".to_string(),
            text_color: "white".to_string(),
        };
        assert_eq!(bar.clone().normalized().fraction, 1.0);

        let nan = ProgressBarRequest {
            fraction: f32::NAN,
            ..bar
        };
        assert_eq!(nan.normalized().fraction, 0.0);
    }
}
