use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Output proportions the expander can target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AspectRatio {
    #[default]
    #[serde(rename = "1:1")]
    Square,
    #[serde(rename = "3:4")]
    Portrait,
    #[serde(rename = "9:16")]
    Story,
}

impl AspectRatio {
    pub const ALL: [AspectRatio; 3] = [AspectRatio::Square, AspectRatio::Portrait, AspectRatio::Story];

    pub fn as_str(self) -> &'static str {
        match self {
            AspectRatio::Square => "1:1",
            AspectRatio::Portrait => "3:4",
            AspectRatio::Story => "9:16",
        }
    }

    /// Width and height terms of the ratio.
    pub fn terms(self) -> (u32, u32) {
        match self {
            AspectRatio::Square => (1, 1),
            AspectRatio::Portrait => (3, 4),
            AspectRatio::Story => (9, 16),
        }
    }

    /// Smallest canvas of this ratio that contains a `width` x `height`
    /// original without scaling it. The difference is the border region the
    /// model is asked to fill.
    pub fn frame_for(self, width: u32, height: u32) -> (u32, u32) {
        if width == 0 || height == 0 {
            return (width, height);
        }
        let (rw, rh) = self.terms();
        let (w, h, rw, rh) = (width as u64, height as u64, rw as u64, rh as u64);
        // Keep the height and grow the width; if the original is already wider, keep the width.
        let by_height = (h * rw).div_ceil(rh);
        if by_height >= w {
            return (saturate(by_height), height);
        }
        let by_width = (w * rh).div_ceil(rw);
        (width, saturate(by_width))
    }
}

fn saturate(value: u64) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownAspectRatio(pub String);

impl fmt::Display for UnknownAspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let expected = AspectRatio::ALL
            .iter()
            .map(|ratio| ratio.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        write!(
            f,
            "unsupported aspect ratio '{}' (expected one of {expected})",
            self.0
        )
    }
}

impl std::error::Error for UnknownAspectRatio {}

impl FromStr for AspectRatio {
    type Err = UnknownAspectRatio;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase().replace(['x', '/'], ":");
        match normalized.as_str() {
            "1:1" | "square" => Ok(AspectRatio::Square),
            "3:4" | "portrait" => Ok(AspectRatio::Portrait),
            "9:16" | "story" | "tall" => Ok(AspectRatio::Story),
            _ => Err(UnknownAspectRatio(raw.trim().to_string())),
        }
    }
}
