//! Parsing of FFmpeg `-progress` output.

use regex_lite::Regex;

/// What a single line of engine output means.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressLine {
    /// Fraction of the input processed, 0.0 to 1.0.
    Progress(f32),
    /// The engine reported the end of processing.
    End,
    /// A progress key we do not track (`frame=`, `bitrate=`, ...).
    Ignored,
    /// A regular log line.
    Log,
}

/// Turns engine progress output into fractions of the input duration.
pub struct ProgressParser {
    duration_secs: Option<f64>,
    key_value: Option<Regex>,
    duration_banner: Option<Regex>,
}

impl ProgressParser {
    /// Creates a parser for an input of the given duration, if known.
    pub fn new(duration_secs: Option<f64>) -> Self {
        Self {
            duration_secs: duration_secs.filter(|d| d.is_finite() && *d > 0.0),
            key_value: Regex::new(r"^([a-z_0-9]+)=(\S*)$").ok(),
            duration_banner: Regex::new(r"Duration: (\d+):(\d{2}):(\d{2}(?:\.\d+)?)").ok(),
        }
    }

    /// Input duration used for the fraction, if known.
    pub fn duration_secs(&self) -> Option<f64> {
        self.duration_secs
    }

    /// Classifies one line of output.
    pub fn parse_line(&mut self, line: &str) -> ProgressLine {
        let line = line.trim();

        let Some(caps) = self.key_value.as_ref().and_then(|re| re.captures(line)) else {
            if self.duration_secs.is_none() {
                self.duration_secs = self.parse_duration_banner(line);
            }
            return ProgressLine::Log;
        };

        let value = &caps[2];
        match &caps[1] {
            // Both keys carry microseconds.
            "out_time_us" | "out_time_ms" => match (value.parse::<f64>(), self.duration_secs) {
                (Ok(micros), Some(duration)) if micros >= 0.0 => {
                    let fraction = (micros / 1_000_000.0 / duration).clamp(0.0, 1.0);
                    ProgressLine::Progress(fraction as f32)
                }
                _ => ProgressLine::Ignored,
            },
            "progress" if value == "end" => ProgressLine::End,
            _ => ProgressLine::Ignored,
        }
    }

    fn parse_duration_banner(&self, line: &str) -> Option<f64> {
        let caps = self.duration_banner.as_ref()?.captures(line)?;
        let hours: f64 = caps[1].parse().ok()?;
        let minutes: f64 = caps[2].parse().ok()?;
        let seconds: f64 = caps[3].parse().ok()?;
        let total = hours * 3600.0 + minutes * 60.0 + seconds;
        (total > 0.0).then_some(total)
    }
}
