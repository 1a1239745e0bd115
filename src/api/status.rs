use std::fmt;
use std::str::FromStr;

/// Response format of the `status` endpoint
///
/// `Text` returns the literal `OK` on success; `Json` returns an object with
/// the status code, message and data/software versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusFormat {
    #[default]
    Text,
    Json,
}

impl StatusFormat {
    /// Value sent as the `format` parameter
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusFormat::Text => "text",
            StatusFormat::Json => "json",
        }
    }
}

impl fmt::Display for StatusFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StatusFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(StatusFormat::Text),
            "json" => Ok(StatusFormat::Json),
            _ => Err(format!("Invalid status format: '{}'. Valid formats: text, json", s)),
        }
    }
}
