use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::HarvestError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    /// FlavorGraph repository files.
    Fg,
    /// FlavorDB entity API.
    Fdb,
}

impl Source {
    pub const ALL: [Source; 2] = [Source::Fg, Source::Fdb];

    pub fn display_name(self) -> &'static str {
        match self {
            Source::Fg => "FlavorGraph",
            Source::Fdb => "FlavorDB",
        }
    }

    pub fn dir_name(self) -> &'static str {
        match self {
            Source::Fg => "flavorgraph",
            Source::Fdb => "flavordb",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Fg => write!(f, "fg"),
            Source::Fdb => write!(f, "fdb"),
        }
    }
}

impl FromStr for Source {
    type Err = HarvestError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "fg" | "flavorgraph" => Ok(Source::Fg),
            "fdb" | "flavordb" => Ok(Source::Fdb),
            _ => Err(HarvestError::InvalidSource(value.to_string())),
        }
    }
}

/// Inclusive range of FlavorDB entity ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IdRange {
    start: u32,
    end: u32,
}

impl IdRange {
    pub fn new(start: u32, end: u32) -> Result<Self, HarvestError> {
        if end < start {
            return Err(HarvestError::InvalidRange(format!(
                "end {end} is below start {start}"
            )));
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> u32 {
        self.start
    }

    pub fn end(&self) -> u32 {
        self.end
    }

    pub fn len(&self) -> u64 {
        u64::from(self.end - self.start) + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn iter(&self) -> std::ops::RangeInclusive<u32> {
        self.start..=self.end
    }
}

impl fmt::Display for IdRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.start, self.end)
    }
}

impl FromStr for IdRange {
    type Err = HarvestError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let (start, end) = trimmed
            .split_once("..=")
            .or_else(|| trimmed.split_once('-'))
            .ok_or_else(|| HarvestError::InvalidRange(value.to_string()))?;
        let start = start
            .trim()
            .parse::<u32>()
            .map_err(|_| HarvestError::InvalidRange(value.to_string()))?;
        let end = end
            .trim()
            .parse::<u32>()
            .map_err(|_| HarvestError::InvalidRange(value.to_string()))?;
        Self::new(start, end)
    }
}
