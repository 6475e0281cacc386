use std::fmt;

use serde::{Deserialize, Serialize};

/// A platform comments are read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SourcePlatform {
    #[serde(rename = "facebook", alias = "Facebook")]
    Facebook,
    #[serde(rename = "ea-forum", alias = "EA Forum")]
    EaForum,
}

impl SourcePlatform {
    /// Human readable name used in the attribution line.
    pub fn display_name(self) -> &'static str {
        match self {
            SourcePlatform::Facebook => "Facebook",
            SourcePlatform::EaForum => "EA Forum",
        }
    }
}

impl fmt::Display for SourcePlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}
