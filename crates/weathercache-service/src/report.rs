//! Decoding and rendering of cached weather reports.
use std::fmt;

use serde::Deserialize;

/// Offset between Kelvin, as reported upstream, and degrees Celsius.
pub const KELVIN_TO_CELSIUS_DIFF: f64 = 273.0;

/// The parts of an OpenWeatherMap "current weather" document that are rendered.
///
/// Everything else in the document is ignored, and every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WeatherReport {
    pub main: MainReadings,
    pub sys: SystemInfo,
    pub name: String,
    /// Set by the upstream instead of the readings when it could not answer the query.
    message: serde_json::Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MainReadings {
    /// Temperature in Kelvin.
    pub temp: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SystemInfo {
    pub country: String,
}

impl WeatherReport {
    pub fn from_slice(data: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(data)
    }

    pub fn celsius(&self) -> f64 {
        self.main.temp - KELVIN_TO_CELSIUS_DIFF
    }

    /// The error message sent by the upstream, if any.
    ///
    /// Single characters are not considered a message.
    pub fn message(&self) -> Option<&str> {
        self.message.as_str().filter(|msg| msg.chars().count() > 1)
    }
}

/// Renders the one-line report, or the upstream's message if the report carries one.
impl fmt::Display for WeatherReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.message() {
            Some(message) => f.write_str(message),
            None => write!(
                f,
                "Current temperature in {} ({}) is {:.1} °C",
                self.name,
                self.sys.country,
                self.celsius()
            ),
        }
    }
}
