//! Enforcement strength of the sync checkpoint during block acceptance.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointPolicy {
    /// Reject blocks that conflict with the sync checkpoint.
    #[default]
    Strict,
    /// Log conflicting blocks but admit them.
    Advisory,
    /// Do not consult the sync checkpoint at all.
    Permissive,
}

impl CheckpointPolicy {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Strict => "strict",
            Self::Advisory => "advisory",
            Self::Permissive => "permissive",
        }
    }
}

impl fmt::Display for CheckpointPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CheckpointPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "advisory" => Ok(Self::Advisory),
            "permissive" => Ok(Self::Permissive),
            other => Err(format!("unknown checkpoint policy: {other}")),
        }
    }
}
