//! Outputs the controllers hand back to the host UI

/// A side effect requested by a controller. The host applies them in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEffect {
    /// Show a transient message on the notification bus
    Notify(String),
    /// Drop the rendered image/3D stage (new submission started)
    ClearStage,
    /// Show a freshly generated or uploaded image
    ShowSourceImage(String),
    /// Replace the live viewer session with the asset at this path
    DisplayModel(String),
    /// Re-fetch the model listing
    RefreshLibrary,
}

/// A button whose enabled state and label follow a request lifecycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Affordance {
    pub enabled: bool,
    pub label: &'static str,
    idle_label: &'static str,
    busy_label: &'static str,
}

impl Affordance {
    pub fn new(idle_label: &'static str, busy_label: &'static str) -> Self {
        Self {
            enabled: true,
            label: idle_label,
            idle_label,
            busy_label,
        }
    }

    pub fn set_busy(&mut self) {
        self.enabled = false;
        self.label = self.busy_label;
    }

    pub fn restore(&mut self) {
        self.enabled = true;
        self.label = self.idle_label;
    }

    pub fn is_busy(&self) -> bool {
        !self.enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_affordance_round_trip_restores_idle_label() {
        let mut button = Affordance::new("Generate", "Generating...");
        button.set_busy();
        assert!(button.is_busy());
        assert_eq!(button.label, "Generating...");
        button.restore();
        assert!(button.enabled);
        assert_eq!(button.label, "Generate");
    }
}
